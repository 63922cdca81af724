use std::collections::HashMap;

use aho_corasick::AhoCorasickBuilder;
use glob::Pattern;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::config::Options;
use crate::domain::{normalize_extension, Part, Rule, Severity, Signature};
use crate::error::{Result, ScanError};

/// Catalog shipped with the binary; always available.
const DEFAULT_RULES: &str = include_str!("../../rules/default.yaml");

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<RuleEntry>,
}

/// Raw rule entry as written in a YAML catalog. Exactly one of the five
/// signature fields must be present.
#[derive(Debug, Deserialize)]
struct RuleEntry {
    name: String,
    part: String,
    severity: Option<String>,
    regex: Option<String>,
    #[serde(rename = "match")]
    literal: Option<String>,
    extension: Option<String>,
    filename: Option<String>,
    path: Option<String>,
    #[serde(default)]
    extensions: Vec<String>,
}

/// The compiled, immutable rule set for a scan. Content rules are bucketed
/// by extension filter so ineligible rules are skipped without a scan.
#[derive(Debug)]
pub struct Catalog {
    content: Vec<Rule>,
    metadata: Vec<Rule>,
    by_extension: HashMap<String, Vec<usize>>,
    unfiltered: Vec<usize>,
}

impl Catalog {
    /// Load the catalog for the given options: the embedded default, unless
    /// user rule files replace it; with `merge_configs` user files are
    /// appended after the default instead.
    pub fn load(options: &Options) -> Result<Self> {
        let mut sources: Vec<(String, String)> = Vec::new();
        if options.config_paths.is_empty() || options.merge_configs {
            sources.push(("<default>".to_string(), DEFAULT_RULES.to_string()));
        }
        for path in &options.config_paths {
            let text = std::fs::read_to_string(path).map_err(|e| {
                ScanError::Config(format!("cannot read rule file {}: {e}", path.display()))
            })?;
            sources.push((path.display().to_string(), text));
        }
        Self::from_sources(&sources)
    }

    /// Compile rules from (label, yaml) pairs. Ids are assigned in load
    /// order across all sources; duplicate names are kept.
    pub fn from_sources(sources: &[(String, String)]) -> Result<Self> {
        let mut content = Vec::new();
        let mut metadata = Vec::new();
        let mut next_id: u32 = 1;

        for (label, text) in sources {
            let file: RuleFile = serde_yaml::from_str(text)
                .map_err(|e| ScanError::Config(format!("rule file {label}: {e}")))?;
            for entry in file.rules {
                let rule = compile_entry(entry, next_id)?;
                next_id += 1;
                match rule.part {
                    Part::Contents => content.push(rule),
                    _ => metadata.push(rule),
                }
            }
        }

        let mut by_extension: HashMap<String, Vec<usize>> = HashMap::new();
        let mut unfiltered = Vec::new();
        for (idx, rule) in content.iter().enumerate() {
            if rule.extensions.is_empty() {
                unfiltered.push(idx);
            } else {
                for ext in &rule.extensions {
                    by_extension.entry(ext.clone()).or_default().push(idx);
                }
            }
        }

        debug!(
            content = content.len(),
            metadata = metadata.len(),
            "catalog compiled"
        );
        Ok(Self {
            content,
            metadata,
            by_extension,
            unfiltered,
        })
    }

    /// Content rules eligible for a file with the given (normalized)
    /// extension, in id order.
    #[must_use]
    pub fn content_rules_for(&self, extension: &str) -> Vec<&Rule> {
        let mut indices: Vec<usize> = self.unfiltered.clone();
        if let Some(bucket) = self.by_extension.get(extension) {
            indices.extend_from_slice(bucket);
        }
        indices.sort_unstable();
        indices.iter().map(|&i| &self.content[i]).collect()
    }

    #[must_use]
    pub fn metadata_rules(&self) -> &[Rule] {
        &self.metadata
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len() + self.metadata.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn compile_entry(entry: RuleEntry, id: u32) -> Result<Rule> {
    let part = Part::parse(&entry.part).ok_or_else(|| ScanError::InvalidRule {
        name: entry.name.clone(),
        message: format!("unknown part '{}'", entry.part),
    })?;
    let severity = Severity::parse(entry.severity.as_deref().unwrap_or("low"));

    let mut signatures = 0;
    for field in [
        entry.regex.as_ref(),
        entry.literal.as_ref(),
        entry.extension.as_ref(),
        entry.filename.as_ref(),
        entry.path.as_ref(),
    ] {
        if field.is_some() {
            signatures += 1;
        }
    }
    if signatures != 1 {
        return Err(ScanError::InvalidRule {
            name: entry.name,
            message: format!(
                "expected exactly one of regex/match/extension/filename/path, found {signatures}"
            ),
        });
    }

    let signature = if let Some(pattern) = entry.regex {
        let re = Regex::new(&pattern).map_err(|e| ScanError::InvalidRule {
            name: entry.name.clone(),
            message: e.to_string(),
        })?;
        Signature::Regex(re)
    } else if let Some(source) = entry.literal {
        let finder = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build([source.as_str()])
            .map_err(|e| ScanError::InvalidRule {
                name: entry.name.clone(),
                message: e.to_string(),
            })?;
        Signature::Literal { finder, source }
    } else if let Some(ext) = entry.extension {
        Signature::ExtensionExact(normalize_extension(&ext))
    } else if let Some(pattern) = entry.filename {
        let glob = Pattern::new(&pattern).map_err(|e| ScanError::InvalidRule {
            name: entry.name.clone(),
            message: e.to_string(),
        })?;
        Signature::FilenameGlob(glob)
    } else {
        // signature count was checked above, path is the only field left
        Signature::PathContains(entry.path.unwrap_or_default())
    };

    Ok(Rule {
        id,
        name: entry.name,
        part,
        severity,
        signature,
        extensions: entry
            .extensions
            .iter()
            .map(|e| normalize_extension(e))
            .collect(),
    })
}

/// Convenience used by tests and the library surface: the embedded default
/// catalog with no user files.
pub fn default_catalog() -> Result<Catalog> {
    Catalog::from_sources(&[("<default>".to_string(), DEFAULT_RULES.to_string())])
}
