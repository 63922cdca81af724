use crate::domain::{Finding, MatchFile};
use crate::engine::catalog::Catalog;
use crate::engine::context::{Claim, ScanCounters};
use crate::engine::matcher::MatchOutcome;

/// Evaluate the filename/extension/path rules against one candidate file.
/// Runs before the content matcher and never reads the file. Metadata
/// findings carry no match line or excerpt but count toward the global cap
/// exactly like content findings.
pub fn match_metadata(
    catalog: &Catalog,
    file: &MatchFile,
    counters: &ScanCounters,
) -> (Vec<Finding>, MatchOutcome) {
    let mut findings = Vec::new();
    for rule in catalog.metadata_rules() {
        if !rule.matches_metadata(file) {
            continue;
        }
        match counters.claim() {
            Claim::Denied => return (findings, MatchOutcome::Stop),
            Claim::Granted { at_cap } => {
                findings.push(Finding::from_metadata(
                    rule.id,
                    &rule.name,
                    rule.severity,
                    file,
                ));
                if at_cap {
                    return (findings, MatchOutcome::Stop);
                }
            }
        }
    }
    (findings, MatchOutcome::Continue)
}
