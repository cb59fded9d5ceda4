//! Rule compilation and matching capabilities.
//!
//! The scan engines only see [`Matcher`]; [`yara`] binds it to `yara-x`.

pub mod yara;

use std::path::Path;

use crate::error::Result;
use crate::scan::ScanTarget;

pub use yara::{YaraCompiler, YaraMatcher};

/// A named detection rule as served by the rule server.
///
/// Fetched fresh for every run and dropped once compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub source: String,
}

impl Rule {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

/// A compiled, read-only rule set that can be applied to many targets.
///
/// Every method returns the identifiers of the matching rules; an empty
/// list means no match.
pub trait Matcher: Send + Sync {
    /// Match an in-memory buffer.
    fn match_bytes(&self, data: &[u8]) -> Result<Vec<String>>;

    /// Match a file on disk.
    fn match_file(&self, path: &Path) -> Result<Vec<String>> {
        let data = std::fs::read(path)?;
        self.match_bytes(&data)
    }

    /// Match the memory of a running process.
    fn match_process(&self, pid: u32) -> Result<Vec<String>>;

    /// Dispatch on the kind of target.
    fn scan(&self, target: &ScanTarget<'_>) -> Result<Vec<String>> {
        match *target {
            ScanTarget::File { path } => self.match_file(path),
            ScanTarget::ArchiveMember { data, .. } => self.match_bytes(data),
            ScanTarget::ProcessMemory { pid, .. } => self.match_process(pid),
        }
    }
}

/// Turns rule source text into a [`Matcher`].
pub trait RuleCompiler: Send + Sync {
    fn compile(&self, rule: &Rule) -> Result<Box<dyn Matcher>>;
}
