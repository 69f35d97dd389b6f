use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::admin::util::open_store;
use crate::admin::Result;
use crate::types::Node;

const MAX_FINDINGS: usize = 64;

/// Indicates the severity level of a verification finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Informational message about the verification process.
    Info,
    /// Suspicious but readable state.
    Warning,
    /// Data that cannot be served as stored.
    Error,
}

/// A single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// The severity level of this finding.
    pub severity: VerifySeverity,
    /// Human-readable description of the issue.
    pub message: String,
}

/// Counters gathered while verifying.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    /// Entries in the index.
    pub indexed: u64,
    /// Node files read and parsed.
    pub files_checked: u64,
    /// Node files no index entry points at.
    pub orphans: u64,
    /// File names shared by more than one soul.
    pub shared_files: u64,
}

/// Complete report of a verification run.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// False when any finding is an error.
    pub success: bool,
    /// Issues discovered, capped.
    pub findings: Vec<VerifyFinding>,
    /// Counters.
    pub counts: VerifyCounts,
}

/// Checks that the index and node files under `root` agree.
///
/// Missing, unreadable or unparsable files and an unreadable index are
/// errors. Size drift, orphaned files, a soul stored under another soul's
/// entry and souls that sanitize to the same file name are warnings: the
/// store still loads, but not everything indexed reads back as written.
pub fn verify(root: impl AsRef<Path>) -> Result<VerifyReport> {
    let store = open_store(root.as_ref())?;
    let mut findings = Findings::default();
    let mut counts = VerifyCounts::default();
    let files = store.node_files()?;

    let index = match store.try_load() {
        Ok(Some(index)) => index,
        Ok(None) => {
            if files.is_empty() {
                findings.push(VerifySeverity::Info, "store is empty");
            } else {
                findings.push(
                    VerifySeverity::Error,
                    format!("index.json missing but {} node files exist", files.len()),
                );
            }
            Default::default()
        }
        Err(err) => {
            findings.push(
                VerifySeverity::Error,
                format!("index.json unreadable: {err}"),
            );
            Default::default()
        }
    };
    counts.indexed = index.len() as u64;

    let mut by_file: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (soul, entry) in &index {
        by_file
            .entry(entry.file_name.as_str())
            .or_default()
            .push(soul.as_str());
    }
    for (file, souls) in &by_file {
        if souls.len() > 1 {
            counts.shared_files += 1;
            findings.push(
                VerifySeverity::Warning,
                format!("souls {} share file {file}", souls.join(", ")),
            );
        }
    }

    for (soul, entry) in &index {
        let path = store.node_path(entry);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                findings.push(
                    VerifySeverity::Error,
                    format!("soul {soul}: cannot read {}: {err}", entry.file_name),
                );
                continue;
            }
        };
        let node = match Node::from_file_bytes(&bytes) {
            Ok(node) => node,
            Err(err) => {
                findings.push(
                    VerifySeverity::Error,
                    format!("soul {soul}: {} does not parse: {err}", entry.file_name),
                );
                continue;
            }
        };
        counts.files_checked += 1;
        if bytes.len() as u64 != entry.size {
            findings.push(
                VerifySeverity::Warning,
                format!(
                    "soul {soul}: indexed size {} but {} holds {} bytes",
                    entry.size,
                    entry.file_name,
                    bytes.len()
                ),
            );
        }
        if node.soul() != soul {
            findings.push(
                VerifySeverity::Warning,
                format!(
                    "soul {soul}: {} holds node {}",
                    entry.file_name,
                    node.soul()
                ),
            );
        }
    }

    let referenced: BTreeSet<&str> = by_file.keys().copied().collect();
    for path in &files {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !referenced.contains(name) {
            counts.orphans += 1;
            findings.push(
                VerifySeverity::Warning,
                format!("{name} is not referenced by the index"),
            );
        }
    }

    Ok(VerifyReport {
        success: findings.errors == 0,
        findings: findings.items,
        counts,
    })
}

#[derive(Default)]
struct Findings {
    items: Vec<VerifyFinding>,
    errors: usize,
}

impl Findings {
    fn push(&mut self, severity: VerifySeverity, message: impl Into<String>) {
        if severity == VerifySeverity::Error {
            self.errors += 1;
        }
        if self.items.len() < MAX_FINDINGS {
            self.items.push(VerifyFinding {
                severity,
                message: message.into(),
            });
        }
    }
}
