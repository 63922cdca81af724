mod doc;
mod formatter;

pub use doc::DocWriter;
pub use formatter::{format_findings, format_json, format_table, OutputFormat};

use crate::domain::{Finding, Severity};

/// Severity tallies used by the `fail-on-*` thresholds. Critical folds into
/// the high bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeverityTally {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

impl SeverityTally {
    #[must_use]
    pub fn count(findings: &[Finding]) -> Self {
        let mut tally = Self::default();
        for finding in findings {
            tally.add(finding.severity);
        }
        tally
    }

    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::High | Severity::Critical => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.high + self.medium + self.low
    }
}

/// Strip the host mount prefix from a reported path, once, the way the
/// boundary serializer does before findings leave the process.
pub fn strip_host_mount(finding: &mut Finding, host_mount_path: &str) {
    if host_mount_path.is_empty() {
        return;
    }
    if let Some(rest) = finding.full_filename.strip_prefix(host_mount_path) {
        finding.full_filename = rest.to_string();
    }
}
