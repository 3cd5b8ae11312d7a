//! Formats and saves the final `ScanResults` for the CLI.

use modreaper::text_scanner::ScanResults;
use colored::Colorize;
use std::fs::write;

/// Colorized, human-readable table of discovered keywords and their offsets.
pub fn format_results(results: &ScanResults) -> String {
    if results.results.is_empty() {
        return "No blocking keywords discovered.".dimmed().to_string();
    }

    let mut output = String::new();
    for (keyword, positions) in &results.results {
        output.push_str(&format!("{}\n", keyword.red().bold()));
        for (start, end) in positions {
            output.push_str(&format!("  {}", format!("[{start}..{end}]").cyan()));
            output.push('\n');
        }
    }
    output
}

/// Colorized final summary line: a bold/underlined section header plus a
/// labeled key-value block.
pub fn format_summary(results: &ScanResults) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n{}\n", "Summary:".bold().underline().blue()));
    out.push_str(&format!(
        "{:<22}{}\n",
        "Sensitive matches:".bold(),
        results.sensitive_count.to_string().red()
    ));
    out.push_str(&format!(
        "{:<22}{}\n",
        "API calls:".bold(),
        results.api_calls.to_string().white()
    ));
    out.push_str(&format!(
        "{:<22}{}\n",
        "Unknown status codes:".bold(),
        format!("{:?}", results.unknown_status_codes).yellow()
    ));
    out.push_str(&format!(
        "{:<22}{:.2}s\n",
        "Elapsed:".bold(),
        results.elapsed_seconds
    ));
    out
}

/// Writes the full results (keyword → offsets, plus summary fields) as
/// pretty-printed JSON.
pub fn save_results_json(results: &ScanResults, output_file: &str) -> Result<(), Box<dyn std::error::Error>> {
    let payload = serde_json::json!({
        "results": results.results_as_json(),
        "sensitive_count": results.sensitive_count,
        "api_calls": results.api_calls,
        "unknown_status_codes": results.unknown_status_codes,
        "unknown_status_code_counts": results.unknown_status_code_counts,
        "elapsed_seconds": results.elapsed_seconds,
    });
    write(output_file, serde_json::to_string_pretty(&payload)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    fn sample_results() -> ScanResults {
        let mut results = BTreeMap::new();
        results.insert("forbidden".to_string(), vec![(4, 13)]);
        ScanResults {
            results,
            sensitive_count: 1,
            api_calls: 2,
            unknown_status_codes: vec![418],
            unknown_status_code_counts: HashMap::from([(418, 1)]),
            elapsed_seconds: 1.23,
            evidence: Vec::new(),
        }
    }

    #[test]
    fn save_results_json_writes_readable_file() {
        let file = tempfile::NamedTempFile::new().expect("create scratch file");
        let path = file.path().to_str().expect("utf8 path").to_string();

        save_results_json(&sample_results(), &path).expect("save succeeds");

        let written = std::fs::read_to_string(&path).expect("read back");
        let parsed: serde_json::Value = serde_json::from_str(&written).expect("valid json");
        assert_eq!(parsed["sensitive_count"], 1);
        assert_eq!(parsed["api_calls"], 2);
        assert_eq!(parsed["results"]["forbidden"][0]["start"], 4);
    }

    #[test]
    fn format_results_reports_no_matches() {
        let results = ScanResults {
            results: BTreeMap::new(),
            sensitive_count: 0,
            api_calls: 1,
            unknown_status_codes: Vec::new(),
            unknown_status_code_counts: HashMap::new(),
            elapsed_seconds: 0.5,
            evidence: Vec::new(),
        };
        assert!(format_results(&results).contains("No blocking keywords"));
    }
}
