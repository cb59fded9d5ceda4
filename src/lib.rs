//! Rastrea — on-demand YARA sweep agent.
//!
//! Pulls one rule from a central rule server, runs it over the files under a
//! directory (office documents are opened and their members scanned) or over
//! the memory of every running process, and posts each match back to the
//! server.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::PathBuf;
//! use rastrea::{scan, AgentOptions, ScanMode};
//!
//! let mode = ScanMode::Disk { root: PathBuf::from("/data") };
//! let summary = scan(&mode, "10.0.0.5", "R1", &AgentOptions::default()).unwrap();
//! println!("Scanned: {}, Matches: {}", summary.stats.scanned, summary.matches.len());
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod matcher;
pub mod orchestrator;
pub mod output;
pub mod scan;

#[cfg(test)]
mod test_support;

use std::path::PathBuf;

use client::ServerEndpoint;
use config::{Config, DEFAULT_CONFIG_FILE};
use error::Result;
use output::OutputFormat;

pub use orchestrator::{ScanMode, ScanOrchestrator, ScanPhase, ScanSummary};

/// Options for a scan invocation.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Path to config file (defaults to `rastrea.toml` in the working directory).
    pub config_path: Option<PathBuf>,
    /// Host identifier override.
    pub hostname: Option<String>,
    /// CLI override for `[server] port`.
    pub port: Option<u16>,
    /// Output format.
    pub format: OutputFormat,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            hostname: None,
            port: None,
            format: OutputFormat::Console,
        }
    }
}

/// Run a complete scan: load config, fetch and compile the rule, sweep,
/// report every match.
pub fn scan(mode: &ScanMode, server: &str, rule: &str, options: &AgentOptions) -> Result<ScanSummary> {
    let config_path = options
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut config = Config::load(&config_path)?;

    if let Some(port) = options.port {
        config.server.port = port;
    }

    let endpoint = ServerEndpoint::parse(server, config.server.port)?;
    let hostname = config.resolve_hostname(options.hostname.as_deref());
    tracing::debug!(server = %endpoint, hostname = %hostname, "agent configured");

    let mut orchestrator = ScanOrchestrator::connect(endpoint, &config, hostname);
    orchestrator.run(rule, mode)
}

/// Render a scan summary in the specified format.
pub fn render_report(summary: &ScanSummary, format: OutputFormat) -> Result<String> {
    output::render(summary, format)
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::error::AgentError;
    use crate::test_support::{write_zip, MockRuleServer};

    const R1: &str = r#"rule R1 { strings: $a = "RASTREA_TEST_MARKER" condition: $a }"#;

    fn options(dir: &std::path::Path) -> AgentOptions {
        AgentOptions {
            config_path: Some(dir.join("absent.toml")),
            hostname: Some("WKS-0042".into()),
            ..AgentOptions::default()
        }
    }

    #[test]
    fn disk_scan_reports_matching_document() {
        let server = MockRuleServer::start(&[("R1", R1)]);
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir(&data).unwrap();
        std::fs::write(data.join("a.txt"), "nothing here").unwrap();
        write_zip(
            &data.join("b.docx"),
            &[("word/document.xml", b"RASTREA_TEST_MARKER".as_slice())],
        );

        let mode = ScanMode::Disk { root: data.clone() };
        let summary = scan(&mode, server.addr(), "R1", &options(dir.path())).unwrap();

        assert_eq!(summary.module, crate::scan::Module::FileScan);
        assert_eq!(summary.matches.len(), 1);
        assert_eq!(summary.stats.scanned, 2);
        assert_eq!(server.paths(), vec!["/getrule", "/putfile"]);
        assert_eq!(server.requests()[1].field("hostname"), Some("WKS-0042"));

        let rendered = render_report(&summary, OutputFormat::Json).unwrap();
        assert!(rendered.contains("b.docx"));
    }

    #[test]
    fn unknown_rule_is_fatal() {
        let server = MockRuleServer::start(&[]);
        let dir = tempfile::tempdir().unwrap();
        let mode = ScanMode::Disk {
            root: dir.path().to_path_buf(),
        };

        let err = scan(&mode, server.addr(), "ghost", &options(dir.path())).unwrap_err();
        assert!(matches!(err, AgentError::RuleNotFound(_)));
        assert!(err.is_fatal());
        assert_eq!(server.paths(), vec!["/getrule"]);
    }

    #[test]
    fn malformed_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rastrea.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();

        let opts = AgentOptions {
            config_path: Some(path),
            ..AgentOptions::default()
        };
        let err = scan(&ScanMode::Memory, "127.0.0.1", "R1", &opts).unwrap_err();
        assert!(matches!(err, AgentError::Toml(_)));
    }
}
