mod finding;
mod rule;

pub use finding::{Finding, MatchFile, SecretScanDoc};
pub use rule::{normalize_extension, Part, Rule, Severity, Signature};
