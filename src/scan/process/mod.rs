//! Process memory sweep.

pub mod memory;
pub mod table;

use crate::error::AgentError;
use crate::matcher::Matcher;

use super::{MatchResult, ScanStats, ScanTarget};

pub use table::{ProcessInfo, ProcessTable, SystemProcessTable};

/// Runs a matcher against the memory of every process on the host except
/// the agent's own.
pub struct ProcessScanEngine<'a> {
    matcher: &'a dyn Matcher,
    table: &'a dyn ProcessTable,
    self_pid: u32,
}

impl<'a> ProcessScanEngine<'a> {
    pub fn new(matcher: &'a dyn Matcher, table: &'a dyn ProcessTable) -> Self {
        Self {
            matcher,
            table,
            self_pid: std::process::id(),
        }
    }

    /// Treat `pid` as the agent's own process.
    pub fn with_self_pid(mut self, pid: u32) -> Self {
        self.self_pid = pid;
        self
    }

    /// Take a snapshot of the process table and scan it lazily.
    ///
    /// A failed snapshot yields an empty sweep.
    pub fn scan(&self) -> ProcessMatches<'a> {
        let pids = match self.table.snapshot() {
            Ok(pids) => pids,
            Err(e) => {
                tracing::warn!(error = %e, "failed to enumerate processes");
                Vec::new()
            }
        };
        tracing::debug!(count = pids.len(), "process snapshot taken");

        ProcessMatches {
            matcher: self.matcher,
            table: self.table,
            self_pid: self.self_pid,
            pids: pids.into_iter(),
            stats: ScanStats::default(),
        }
    }
}

/// Lazy sequence of process matches. See [`ProcessScanEngine::scan`].
pub struct ProcessMatches<'a> {
    matcher: &'a dyn Matcher,
    table: &'a dyn ProcessTable,
    self_pid: u32,
    pids: std::vec::IntoIter<u32>,
    stats: ScanStats,
}

impl ProcessMatches<'_> {
    pub fn stats(&self) -> ScanStats {
        self.stats
    }
}

impl Iterator for ProcessMatches<'_> {
    type Item = MatchResult;

    fn next(&mut self) -> Option<MatchResult> {
        for pid in self.pids.by_ref() {
            if pid == self.self_pid {
                continue;
            }

            let info = match self.table.inspect(pid) {
                Ok(info) => info,
                Err(AgentError::ProcessGone(_)) => {
                    tracing::trace!(pid, "process exited before inspection");
                    continue;
                }
                Err(e) => {
                    tracing::debug!(pid, error = %e, "process metadata unavailable");
                    self.stats.skipped += 1;
                    continue;
                }
            };

            tracing::debug!(
                pid,
                name = info.display_name(),
                path = ?info.path,
                cmdline = ?info.command_line,
                "scanning process"
            );

            let target = ScanTarget::ProcessMemory {
                pid,
                process: &info,
            };
            match self.matcher.scan(&target) {
                Ok(rules) => {
                    self.stats.scanned += 1;
                    if !rules.is_empty() {
                        self.stats.matched += 1;
                        return Some(MatchResult::process(&info, rules));
                    }
                }
                Err(e) => {
                    tracing::debug!(pid, error = %e, "failed scanning process");
                    self.stats.skipped += 1;
                }
            }
        }
        None
    }
}
