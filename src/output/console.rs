use crate::orchestrator::ScanSummary;

/// Render a summary as plain console text, one line per match.
pub fn render(summary: &ScanSummary) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "\n  {} with rule '{}' complete\n",
        summary.module, summary.rule
    ));
    output.push_str(&format!(
        "  {} target(s) scanned, {} skipped\n\n",
        summary.stats.scanned, summary.stats.skipped
    ));

    if summary.matches.is_empty() {
        output.push_str("  No matches.\n\n");
        return output;
    }

    output.push_str(&format!("  {} match(es):\n\n", summary.matches.len()));
    for result in &summary.matches {
        output.push_str(&format!(
            "  [MATCH] {} {}\n",
            result.rules.join(","),
            result.location()
        ));
    }

    output.push_str(&format!(
        "\n  Reports: {} sent, {} failed\n\n",
        summary.reports_sent, summary.reports_failed
    ));
    output
}
