use std::path::Path;

use yara_x::{Compiler, Rules, Scanner};

use super::{Matcher, Rule, RuleCompiler};
use crate::error::{AgentError, Result};
use crate::scan::process::memory;

/// Compiles rule text with `yara-x`.
#[derive(Debug, Clone)]
pub struct YaraCompiler {
    max_region_size: u64,
}

impl YaraCompiler {
    /// `max_region_size` bounds the process memory regions the matchers read.
    pub fn new(max_region_size: u64) -> Self {
        Self { max_region_size }
    }
}

impl RuleCompiler for YaraCompiler {
    fn compile(&self, rule: &Rule) -> Result<Box<dyn Matcher>> {
        let matcher = YaraMatcher::compile(rule, self.max_region_size)?;
        Ok(Box::new(matcher))
    }
}

/// A compiled `yara-x` rule set.
pub struct YaraMatcher {
    rules: Rules,
    max_region_size: u64,
}

impl YaraMatcher {
    pub fn compile(rule: &Rule, max_region_size: u64) -> Result<Self> {
        let mut compiler = Compiler::new();
        compiler
            .add_source(rule.source.as_str())
            .map_err(|e| AgentError::RuleCompile {
                rule: rule.name.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            rules: compiler.build(),
            max_region_size,
        })
    }
}

impl Matcher for YaraMatcher {
    fn match_bytes(&self, data: &[u8]) -> Result<Vec<String>> {
        let mut scanner = Scanner::new(&self.rules);
        let results = scanner
            .scan(data)
            .map_err(|e| AgentError::Scan(e.to_string()))?;
        Ok(results
            .matching_rules()
            .map(|r| r.identifier().to_string())
            .collect())
    }

    fn match_file(&self, path: &Path) -> Result<Vec<String>> {
        let mut scanner = Scanner::new(&self.rules);
        let results = scanner
            .scan_file(path)
            .map_err(|e| AgentError::Scan(format!("{}: {}", path.display(), e)))?;
        Ok(results
            .matching_rules()
            .map(|r| r.identifier().to_string())
            .collect())
    }

    fn match_process(&self, pid: u32) -> Result<Vec<String>> {
        let mut scanner = Scanner::new(&self.rules);
        let mut matched: Vec<String> = Vec::new();

        memory::read_regions(pid, self.max_region_size, |region, data| {
            match scanner.scan(data) {
                Ok(results) => {
                    for rule in results.matching_rules() {
                        let id = rule.identifier();
                        if !matched.iter().any(|m| m == id) {
                            matched.push(id.to_string());
                        }
                    }
                }
                Err(e) => {
                    tracing::trace!(pid, base = region.base, error = %e, "region scan failed");
                }
            }
        })?;

        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::ScanTarget;

    const MARKER_RULE: &str = r#"
rule R1 {
    strings:
        $a = "RASTREA_TEST_MARKER"
    condition:
        $a
}
"#;

    fn matcher() -> YaraMatcher {
        YaraMatcher::compile(&Rule::new("R1", MARKER_RULE), 1024 * 1024).unwrap()
    }

    #[test]
    fn matches_buffer_containing_marker() {
        let m = matcher();
        let hits = m.match_bytes(b"xx RASTREA_TEST_MARKER yy").unwrap();
        assert_eq!(hits, vec!["R1".to_string()]);
    }

    #[test]
    fn clean_buffer_has_no_match() {
        let m = matcher();
        assert!(m.match_bytes(b"nothing to see").unwrap().is_empty());
    }

    #[test]
    fn matches_file_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        std::fs::write(&path, b"\x00\x01RASTREA_TEST_MARKER\x02").unwrap();
        let m = matcher();
        let hits = m.scan(&ScanTarget::File { path: &path }).unwrap();
        assert_eq!(hits, vec!["R1".to_string()]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let m = matcher();
        assert!(m.match_file(Path::new("/nonexistent/sample.bin")).is_err());
    }

    #[test]
    fn broken_source_fails_to_compile() {
        let err = YaraMatcher::compile(&Rule::new("bad", "rule { condition: }"), 1024)
            .err()
            .unwrap();
        assert!(matches!(err, AgentError::RuleCompile { ref rule, .. } if rule == "bad"));
    }

    #[test]
    fn compiler_produces_boxed_matcher() {
        let compiler = YaraCompiler::new(1024);
        let boxed = compiler.compile(&Rule::new("R1", MARKER_RULE)).unwrap();
        assert_eq!(
            boxed.match_bytes(b"RASTREA_TEST_MARKER").unwrap(),
            vec!["R1".to_string()]
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn vanished_process_is_an_error() {
        let m = matcher();
        // Above the default pid_max, so never a live process.
        assert!(m.match_process(0x7fff_fff0).is_err());
    }
}
