//! Scan targets, match results and the two scan engines.
//!
//! Both engines hand every target to the same `Matcher` through
//! [`ScanTarget`], and both yield [`MatchResult`]s lazily so the caller can
//! report each hit as soon as it is found.

pub mod classify;
pub mod file;
pub mod process;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use classify::{classify, ContentKind};
pub use file::FileScanEngine;
pub use process::{ProcessInfo, ProcessScanEngine};

/// Which engine produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Module {
    FileScan,
    ProcessScan,
}

impl Module {
    /// Value of the `module` field in a report.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::FileScan => "yaradisk",
            Self::ProcessScan => "yaramem",
        }
    }

    /// Server path a match from this module is posted to.
    pub fn report_path(self) -> &'static str {
        match self {
            Self::FileScan => "/putfile",
            Self::ProcessScan => "/putpid",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileScan => write!(f, "file-scan"),
            Self::ProcessScan => write!(f, "process-scan"),
        }
    }
}

/// Anything a matcher can be run against.
#[derive(Debug, Clone, Copy)]
pub enum ScanTarget<'a> {
    /// A plain file on disk, scanned by path.
    File { path: &'a Path },
    /// One decompressed entry of a container, never written to disk.
    ArchiveMember {
        archive: &'a Path,
        member: &'a str,
        data: &'a [u8],
    },
    /// The memory image of a running process.
    ProcessMemory { pid: u32, process: &'a ProcessInfo },
}

impl fmt::Display for ScanTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { path } => write!(f, "{}", path.display()),
            Self::ArchiveMember {
                archive, member, ..
            } => write!(f, "{}!{}", archive.display(), member),
            Self::ProcessMemory { pid, process } => {
                write!(f, "pid {} ({})", pid, process.display_name())
            }
        }
    }
}

/// What a match was found in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchSubject {
    File {
        path: PathBuf,
    },
    Process {
        pid: u32,
        name: Option<String>,
        path: Option<PathBuf>,
        command_line: Option<String>,
    },
}

/// A positive scan outcome for one target. Never built with an empty rule list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub module: Module,
    /// Matching rule identifiers, first match first.
    pub rules: Vec<String>,
    pub subject: MatchSubject,
}

impl MatchResult {
    pub fn file(path: PathBuf, rules: Vec<String>) -> Self {
        Self {
            module: Module::FileScan,
            rules,
            subject: MatchSubject::File { path },
        }
    }

    pub fn process(info: &ProcessInfo, rules: Vec<String>) -> Self {
        Self {
            module: Module::ProcessScan,
            rules,
            subject: MatchSubject::Process {
                pid: info.pid,
                name: info.name.clone(),
                path: info.path.clone(),
                command_line: info.command_line.clone(),
            },
        }
    }

    /// Short human-readable location: the file path or `pid N`.
    pub fn location(&self) -> String {
        match &self.subject {
            MatchSubject::File { path } => path.display().to_string(),
            MatchSubject::Process { pid, path, .. } => match path {
                Some(p) => format!("pid {} ({})", pid, p.display()),
                None => format!("pid {}", pid),
            },
        }
    }
}

/// Per-run counters kept by the engines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Targets the matcher ran to completion on.
    pub scanned: usize,
    /// Targets dropped because of a recoverable error.
    pub skipped: usize,
    /// Targets that produced a match.
    pub matched: usize,
}
