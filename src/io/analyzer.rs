//! Analysis oracle abstraction.
//!
//! The [`Analyzer`] trait decouples the session loop from the vision backend.
//! The production backend is an external oracle command that receives the raw
//! capture on stdin and prints a snapshot JSON document on stdout. Tests use
//! scripted analyzers that return predetermined snapshots.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::snapshot::{ContentSnapshot, now_ms};
use crate::io::device::RawCapture;
use crate::io::process::run_checked;

/// Snapshot document schema, enforced on every oracle response.
pub const SNAPSHOT_SCHEMA: &str = include_str!("../../schemas/snapshot.schema.json");

/// Abstraction over screen analysis backends.
pub trait Analyzer {
    /// Normalize one raw capture into a content snapshot.
    fn analyze(&self, capture: &RawCapture) -> Result<ContentSnapshot>;
}

/// Analyzer that pipes the capture through an external oracle command.
pub struct OracleAnalyzer {
    /// Command and arguments, e.g. `["profile-oracle", "--mode", "snapshot"]`.
    pub command: Vec<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl Analyzer for OracleAnalyzer {
    #[instrument(skip_all, fields(bytes = capture.0.len()))]
    fn analyze(&self, capture: &RawCapture) -> Result<ContentSnapshot> {
        if capture.0.is_empty() {
            return Err(anyhow!("empty capture"));
        }
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("analyzer command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args);

        let stdout = run_checked(
            cmd,
            "analysis oracle",
            Some(&capture.0),
            self.timeout,
            self.output_limit_bytes,
        )?;
        let mut snapshot = parse_snapshot(&stdout)?;
        snapshot.captured_at = now_ms();
        debug!(summary = %snapshot.summary(), "analyzed capture");
        Ok(snapshot)
    }
}

/// Parse and schema-validate an oracle response.
pub fn parse_snapshot(bytes: &[u8]) -> Result<ContentSnapshot> {
    let value: Value = serde_json::from_slice(bytes).context("parse oracle output")?;
    validate_schema(&value)?;
    serde_json::from_value(value).context("deserialize snapshot")
}

fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(SNAPSHOT_SCHEMA).context("parse snapshot schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {err}"))?;
    if !compiled.is_valid(instance) {
        let messages = compiled
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "snapshot schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_snapshot_document() {
        let doc = br#"{
            "identity": {"name": "Jess", "age": "29"},
            "body_text": ["loves hiking"],
            "media": ["m1"],
            "regions": {"like_button": {"x": 0.9, "y": 0.8, "confidence": 0.9}},
            "signals": {"quality": 8, "conversation_potential": 7, "red_flags": [], "positive_indicators": ["outdoorsy"]},
            "comment_field_visible": false
        }"#;
        let snapshot = parse_snapshot(doc).expect("parse");
        assert_eq!(snapshot.identity["name"], "Jess");
        assert_eq!(snapshot.signals.quality, 8);
        assert!(snapshot.regions.contains_key("like_button"));
    }

    #[test]
    fn missing_fields_default() {
        let snapshot = parse_snapshot(b"{}").expect("parse");
        assert!(snapshot.is_transitional());
        assert!(!snapshot.comment_field_visible);
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert!(parse_snapshot(br#"{"body_text": "not a list"}"#).is_err());
        assert!(parse_snapshot(br#"{"signals": {"quality": "high"}}"#).is_err());
    }

    #[test]
    fn non_json_is_rejected() {
        assert!(parse_snapshot(b"oracle crashed").is_err());
    }
}
