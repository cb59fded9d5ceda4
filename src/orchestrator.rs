//! One scan run, end to end.
//!
//! `FetchingRule -> Compiling -> Scanning -> Done`. Only a failure to obtain
//! a usable rule ends in `Aborted`; everything that goes wrong on a single
//! file, process or report is absorbed by the engines and counted.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::client::{HttpReporter, MatchReporter, RuleClient, RuleSource, ServerEndpoint};
use crate::config::{Config, ScanConfig};
use crate::error::Result;
use crate::matcher::{RuleCompiler, YaraCompiler};
use crate::scan::process::{ProcessTable, SystemProcessTable};
use crate::scan::{FileScanEngine, MatchResult, Module, ProcessScanEngine, ScanStats};

/// What to sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanMode {
    /// Every file under `root`.
    Disk { root: PathBuf },
    /// Every running process.
    Memory,
}

impl ScanMode {
    pub fn module(&self) -> Module {
        match self {
            Self::Disk { .. } => Module::FileScan,
            Self::Memory => Module::ProcessScan,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Idle,
    FetchingRule,
    Compiling,
    Scanning,
    Done,
    Aborted,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::FetchingRule => write!(f, "fetching rule"),
            Self::Compiling => write!(f, "compiling"),
            Self::Scanning => write!(f, "scanning"),
            Self::Done => write!(f, "done"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Outcome of a run that reached `Done`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    pub rule: String,
    pub module: Module,
    pub stats: ScanStats,
    pub matches: Vec<MatchResult>,
    pub reports_sent: usize,
    pub reports_failed: usize,
}

impl ScanSummary {
    fn new(rule: &str, module: Module) -> Self {
        Self {
            rule: rule.to_string(),
            module,
            stats: ScanStats::default(),
            matches: Vec::new(),
            reports_sent: 0,
            reports_failed: 0,
        }
    }
}

/// Composes rule retrieval, compilation, an engine and the reporter.
pub struct ScanOrchestrator {
    rules: Box<dyn RuleSource>,
    compiler: Box<dyn RuleCompiler>,
    reporter: Box<dyn MatchReporter>,
    processes: Box<dyn ProcessTable>,
    scan: ScanConfig,
    phase: ScanPhase,
}

impl ScanOrchestrator {
    pub fn new(
        rules: Box<dyn RuleSource>,
        compiler: Box<dyn RuleCompiler>,
        reporter: Box<dyn MatchReporter>,
        processes: Box<dyn ProcessTable>,
        scan: ScanConfig,
    ) -> Self {
        Self {
            rules,
            compiler,
            reporter,
            processes,
            scan,
            phase: ScanPhase::Idle,
        }
    }

    /// Wire up the real server client, `yara-x` and the OS process table.
    pub fn connect(endpoint: ServerEndpoint, config: &Config, hostname: String) -> Self {
        let timeout = config.server.timeout();
        Self::new(
            Box::new(RuleClient::new(endpoint.clone(), timeout)),
            Box::new(YaraCompiler::new(config.scan.max_region_size)),
            Box::new(HttpReporter::new(endpoint, hostname, timeout)),
            Box::new(SystemProcessTable),
            config.scan.clone(),
        )
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    fn enter(&mut self, phase: ScanPhase) {
        tracing::debug!(from = %self.phase, to = %phase, "phase change");
        self.phase = phase;
    }

    /// Fetch `rule_name`, compile it and sweep according to `mode`,
    /// reporting each match as it is found.
    pub fn run(&mut self, rule_name: &str, mode: &ScanMode) -> Result<ScanSummary> {
        self.enter(ScanPhase::FetchingRule);
        tracing::info!(rule = rule_name, "pulling rule");
        let rule = match self.rules.fetch(rule_name) {
            Ok(rule) => rule,
            Err(e) => {
                self.enter(ScanPhase::Aborted);
                return Err(e);
            }
        };
        tracing::info!(rule = %rule.name, bytes = rule.source.len(), "rule received");
        tracing::debug!(rule = %rule.name, "\n{}", rule.source);

        self.enter(ScanPhase::Compiling);
        let matcher = match self.compiler.compile(&rule) {
            Ok(matcher) => matcher,
            Err(e) => {
                self.enter(ScanPhase::Aborted);
                return Err(e);
            }
        };
        drop(rule);

        self.enter(ScanPhase::Scanning);
        let mut summary = ScanSummary::new(rule_name, mode.module());
        let reporter = self.reporter.as_ref();

        match mode {
            ScanMode::Disk { root } => {
                tracing::info!(root = %root.display(), "scanning files");
                let engine = FileScanEngine::new(matcher.as_ref()).with_config(&self.scan);
                let mut sweep = engine.scan(root);
                for result in sweep.by_ref() {
                    submit(reporter, result, &mut summary);
                }
                summary.stats = sweep.stats();
            }
            ScanMode::Memory => {
                tracing::info!("scanning running processes in memory");
                let engine = ProcessScanEngine::new(matcher.as_ref(), self.processes.as_ref());
                let mut sweep = engine.scan();
                for result in sweep.by_ref() {
                    submit(reporter, result, &mut summary);
                }
                summary.stats = sweep.stats();
            }
        }

        self.enter(ScanPhase::Done);
        tracing::info!(
            scanned = summary.stats.scanned,
            skipped = summary.stats.skipped,
            matched = summary.stats.matched,
            reported = summary.reports_sent,
            "scan finished"
        );
        Ok(summary)
    }
}

fn submit(reporter: &dyn MatchReporter, result: MatchResult, summary: &mut ScanSummary) {
    tracing::info!(
        module = %result.module,
        rules = ?result.rules,
        location = %result.location(),
        "match found"
    );
    match reporter.report(&result) {
        Ok(()) => summary.reports_sent += 1,
        Err(e) => {
            tracing::warn!(error = %e, location = %result.location(), "report failed, continuing");
            summary.reports_failed += 1;
        }
    }
    summary.matches.push(result);
}
