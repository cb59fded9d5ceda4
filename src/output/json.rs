use crate::error::Result;
use crate::orchestrator::ScanSummary;

/// Render a summary as pretty-printed JSON.
pub fn render(summary: &ScanSummary) -> Result<String> {
    let json = serde_json::to_string_pretty(summary)?;
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::{MatchResult, Module, ScanStats};
    use std::path::PathBuf;

    #[test]
    fn summary_is_machine_readable() {
        let summary = ScanSummary {
            rule: "R1".into(),
            module: Module::FileScan,
            stats: ScanStats {
                scanned: 1,
                skipped: 0,
                matched: 1,
            },
            matches: vec![MatchResult::file(PathBuf::from("/data/b.docx"), vec!["R1".into()])],
            reports_sent: 1,
            reports_failed: 0,
        };

        let value: serde_json::Value = serde_json::from_str(&render(&summary).unwrap()).unwrap();
        assert_eq!(value["module"], "file-scan");
        assert_eq!(value["rule"], "R1");
        assert!(value.get("phase").is_none());
        assert_eq!(value["matches"][0]["subject"]["kind"], "file");
        assert_eq!(value["matches"][0]["subject"]["path"], "/data/b.docx");
        assert_eq!(value["stats"]["scanned"], 1);
    }
}
