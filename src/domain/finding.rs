use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::rule::normalize_extension;
use crate::domain::Severity;

/// Per-candidate-file record handed from the traversal driver to the
/// matchers. Ephemeral; never leaves a scan.
#[derive(Debug, Clone)]
pub struct MatchFile {
    pub path: PathBuf,
    /// Path relative to the scan root (or to the layer root in image mode).
    pub rel_path: String,
    pub filename: String,
    /// Lower-cased extension without the leading dot; empty when absent.
    pub extension: String,
    /// Layer identifier; empty for local directory scans.
    pub layer: String,
    pub size: u64,
}

impl MatchFile {
    #[must_use]
    pub fn new(path: &Path, rel_path: &str, layer: String, size: u64) -> Self {
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| normalize_extension(&e.to_string_lossy()))
            .unwrap_or_default();
        Self {
            path: path.to_path_buf(),
            rel_path: rel_path.to_string(),
            filename,
            extension,
            layer,
            size,
        }
    }
}

/// A single hit: rule x file x offset, with excerpt and severity.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    #[serde(skip_serializing)]
    pub rule_id: u32,
    #[serde(rename = "rule")]
    pub rule_name: String,
    pub severity: Severity,
    pub score: f64,
    pub layer_id: String,
    pub full_filename: String,
    pub filename: String,
    pub file_extension: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starting_line_number: Option<usize>,
    #[serde(rename = "match")]
    pub matched_content: String,
    pub match_line: String,
    pub match_from_byte: usize,
    pub match_to_byte: usize,
}

impl Finding {
    /// A finding for a metadata rule: no contents were read, so the match
    /// line, excerpt and offsets are all empty.
    #[must_use]
    pub fn from_metadata(rule_id: u32, rule_name: &str, severity: Severity, file: &MatchFile) -> Self {
        Self {
            rule_id,
            rule_name: rule_name.to_string(),
            severity,
            score: severity.score(),
            layer_id: file.layer.clone(),
            full_filename: file.rel_path.clone(),
            filename: file.filename.clone(),
            file_extension: file.extension.clone(),
            starting_line_number: None,
            matched_content: String::new(),
            match_line: String::new(),
            match_from_byte: 0,
            match_to_byte: 0,
        }
    }
}

/// On-wire enrichment of a finding with its scan id. Only the boundary
/// serializer builds these.
#[derive(Debug, Clone, Serialize)]
pub struct SecretScanDoc {
    #[serde(flatten)]
    pub finding: Finding,
    pub scan_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_file_extracts_name_and_extension() {
        let f = MatchFile::new(
            Path::new("/base/app/Config.JSON"),
            "app/Config.JSON",
            String::new(),
            42,
        );
        assert_eq!(f.filename, "Config.JSON");
        assert_eq!(f.extension, "json");
        assert_eq!(f.size, 42);
    }

    #[test]
    fn test_match_file_without_extension() {
        let f = MatchFile::new(Path::new("/base/.netrc"), ".netrc", "layer1".into(), 0);
        assert_eq!(f.filename, ".netrc");
        assert_eq!(f.extension, "");
        assert_eq!(f.layer, "layer1");
    }

    #[test]
    fn test_finding_json_field_names() {
        let file = MatchFile::new(Path::new("/b/creds.txt"), "creds.txt", String::new(), 1);
        let finding = Finding::from_metadata(7, "Netrc file", Severity::Medium, &file);
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["rule"], "Netrc file");
        assert_eq!(json["severity"], "medium");
        assert_eq!(json["score"], 3.0);
        assert_eq!(json["full_filename"], "creds.txt");
        assert!(json.get("rule_id").is_none());
        assert!(json.get("starting_line_number").is_none());
        assert_eq!(json["match"], "");
    }

    #[test]
    fn test_secret_scan_doc_flattens_finding() {
        let file = MatchFile::new(Path::new("/b/x"), "x", String::new(), 1);
        let doc = SecretScanDoc {
            finding: Finding::from_metadata(1, "r", Severity::Low, &file),
            scan_id: "scan-1".to_string(),
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["scan_id"], "scan-1");
        assert_eq!(json["rule"], "r");
    }
}
