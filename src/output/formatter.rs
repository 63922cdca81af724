use std::fmt::Write;

use colored::Colorize;

use crate::domain::{Finding, Severity};
use crate::output::SeverityTally;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            _ => Err(format!("Unknown format: {s}. Valid options: json, table")),
        }
    }
}

#[must_use]
pub fn format_findings(findings: &[Finding], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format_json(findings),
        OutputFormat::Table => format_table(findings),
    }
}

/// Batch JSON: a single array of findings.
#[must_use]
pub fn format_json(findings: &[Finding]) -> String {
    serde_json::to_string_pretty(findings).unwrap_or_else(|_| "[]".to_string())
}

#[must_use]
pub fn format_table(findings: &[Finding]) -> String {
    let mut out = String::new();

    if findings.is_empty() {
        let _ = writeln!(out, "{}", "No secrets found.".green().bold());
        return out;
    }

    let _ = writeln!(
        out,
        "{:<10} {:<34} {:<6} {:<44} {}",
        "SEVERITY".bold(),
        "RULE".bold(),
        "LINE".bold(),
        "FILE".bold(),
        "MATCH".bold()
    );
    let _ = writeln!(out, "{}", "-".repeat(120));

    for finding in findings {
        let severity = match finding.severity {
            Severity::Critical => "CRITICAL".red().bold(),
            Severity::High => "HIGH".red(),
            Severity::Medium => "MEDIUM".yellow(),
            Severity::Low => "LOW".normal(),
        };
        let line = finding
            .starting_line_number
            .map_or_else(|| "-".to_string(), |n| n.to_string());
        let file = if finding.layer_id.is_empty() {
            finding.full_filename.clone()
        } else {
            format!("{}:{}", shorten(&finding.layer_id, 12), finding.full_filename)
        };
        let _ = writeln!(
            out,
            "{:<10} {:<34} {:<6} {:<44} {}",
            severity,
            shorten(&finding.rule_name, 34),
            line,
            shorten(&file, 44),
            shorten(finding.match_line.trim(), 60)
        );
    }

    let tally = SeverityTally::count(findings);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} finding(s): {} high, {} medium, {} low",
        tally.total(),
        tally.high.to_string().red(),
        tally.medium.to_string().yellow(),
        tally.low
    );
    out
}

fn shorten(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let kept: String = s.chars().take(width.saturating_sub(1)).collect();
    format!("{kept}\u{2026}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MatchFile;
    use std::path::Path;
    use std::str::FromStr;

    fn finding(rel: &str) -> Finding {
        let file = MatchFile::new(Path::new(rel), rel, "layerabc123456".to_string(), 0);
        Finding::from_metadata(3, "SSH private key file", Severity::High, &file)
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("json").unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::from_str("TABLE").unwrap(), OutputFormat::Table);
        assert!(OutputFormat::from_str("xml").is_err());
    }

    #[test]
    fn test_format_json_is_array() {
        let rendered = format_json(&[finding(".ssh/id_rsa")]);
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert!(parsed.is_array());
        assert_eq!(parsed[0]["rule"], "SSH private key file");
    }

    #[test]
    fn test_format_table_lists_findings_and_summary() {
        let rendered = format_table(&[finding(".ssh/id_rsa"), finding(".ssh/id_dsa")]);
        assert!(rendered.contains("SSH private key file"));
        assert!(rendered.contains("id_rsa"));
        assert!(rendered.contains("2 finding(s)"));
    }

    #[test]
    fn test_format_table_empty() {
        let rendered = format_table(&[]);
        assert!(rendered.contains("No secrets found"));
    }

    #[test]
    fn test_shorten_truncates_long_values() {
        assert_eq!(shorten("short", 10), "short");
        let long = "a".repeat(50);
        let cut = shorten(&long, 10);
        assert!(cut.chars().count() <= 10);
        assert!(cut.ends_with('\u{2026}'));
    }
}
