//! Append-only store of sent comments and their verified outcomes.
//!
//! One JSON object per line. Success rates computed from the store feed back
//! into the style weights at the start of the next run.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::action::AttemptOutcome;

/// One sent comment and how the attempt ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentEntry {
    pub snapshot_summary: String,
    pub comment: String,
    pub style: String,
    pub outcome: AttemptOutcome,
    pub at_ms: u64,
}

/// JSONL-backed comment history.
#[derive(Debug, Clone)]
pub struct CommentStore {
    path: PathBuf,
}

impl CommentStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append one entry, creating the file (and parent directory) on first use.
    pub fn append(&self, entry: &CommentEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create comment store dir {}", parent.display()))?;
        }
        let mut line = serde_json::to_string(entry).context("serialize comment entry")?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open comment store {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append comment store {}", self.path.display()))?;
        Ok(())
    }

    /// Verified fraction per style. A missing store means no history yet;
    /// malformed lines are skipped rather than poisoning the whole store.
    pub fn success_rates(&self) -> Result<BTreeMap<String, f64>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("read comment store {}", self.path.display()));
            }
        };

        let mut verified: BTreeMap<String, (u32, u32)> = BTreeMap::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            let Ok(entry) = serde_json::from_str::<CommentEntry>(line) else {
                debug!("skipping malformed comment store line");
                continue;
            };
            let slot = verified.entry(entry.style).or_insert((0, 0));
            slot.1 += 1;
            if entry.outcome == AttemptOutcome::Verified {
                slot.0 += 1;
            }
        }
        Ok(verified
            .into_iter()
            .map(|(style, (ok, total))| (style, f64::from(ok) / f64::from(total)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::snapshot::now_ms;

    fn entry(style: &str, outcome: AttemptOutcome) -> CommentEntry {
        CommentEntry {
            snapshot_summary: "Jess: loves hiking".to_string(),
            comment: "love that trail".to_string(),
            style: style.to_string(),
            outcome,
            at_ms: now_ms(),
        }
    }

    #[test]
    fn missing_store_has_no_rates() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = CommentStore::new(temp.path().join("comments.jsonl"));
        assert!(store.success_rates().expect("rates").is_empty());
    }

    #[test]
    fn rates_are_verified_over_total_per_style() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = CommentStore::new(temp.path().join("comments.jsonl"));
        store
            .append(&entry("playful", AttemptOutcome::Verified))
            .expect("append");
        store
            .append(&entry("playful", AttemptOutcome::Mismatched))
            .expect("append");
        store
            .append(&entry("direct", AttemptOutcome::Verified))
            .expect("append");

        let rates = store.success_rates().expect("rates");
        assert_eq!(rates["playful"], 0.5);
        assert_eq!(rates["direct"], 1.0);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("comments.jsonl");
        let store = CommentStore::new(path.clone());
        store
            .append(&entry("playful", AttemptOutcome::Verified))
            .expect("append");
        fs::write(
            &path,
            format!("{}not json\n", fs::read_to_string(&path).expect("read")),
        )
        .expect("write");

        let rates = store.success_rates().expect("rates");
        assert_eq!(rates["playful"], 1.0);
    }
}
