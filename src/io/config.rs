//! Runner configuration (TOML).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::policy::DecisionConfig;
use crate::io::gestures::GestureConfig;

/// Runner configuration.
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Wall-clock budget per device command in seconds.
    pub command_timeout_secs: u64,

    /// Wall-clock budget per oracle invocation (analysis or comment) in
    /// seconds.
    pub oracle_timeout_secs: u64,

    /// Truncate child process output beyond this many bytes. Screen captures
    /// must fit under it.
    pub output_limit_bytes: usize,

    /// Wait this long for animations to settle before recapturing.
    pub settle_delay_ms: u64,

    /// Longer wait used by the settle recovery strategy.
    pub recovery_settle_ms: u64,

    /// Re-verification retries after a mismatch or timeout (total tries =
    /// retries + 1).
    pub retry_budget: u32,

    /// Scroll passes that reveal more profile content before deciding
    /// (0 disables gathering).
    pub gather_passes: u32,

    /// Consecutive failed verifications that trigger recovery.
    pub failure_threshold: u32,

    /// Total recovery invocations allowed per run.
    pub recovery_ceiling: u32,

    /// Recent attempts kept for stuck-pattern detection.
    pub history_window: usize,

    /// Case-insensitive phrases that mark the end of the profile stack.
    pub end_of_stack_markers: Vec<String>,

    /// Body-text similarity below this counts as a different profile.
    pub text_similarity_cutoff: f64,

    /// Analysis oracle command (receives the capture on stdin).
    pub analyzer_command: Vec<String>,

    /// Comment oracle command (receives the rendered prompt on stdin).
    pub generator_command: Vec<String>,

    /// Application package to foreground at run start.
    pub app_package: String,

    pub gestures: GestureConfig,

    /// Named decision presets selectable with `--preset`.
    pub presets: BTreeMap<String, PresetConfig>,
}

/// One selectable decision preset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PresetConfig {
    pub like_threshold: f64,
    pub comment_probability: f64,
    pub style_weights: BTreeMap<String, f64>,
    pub min_detailed_text_len: usize,
}

impl Default for PresetConfig {
    fn default() -> Self {
        let d = DecisionConfig::default();
        Self {
            like_threshold: d.like_threshold,
            comment_probability: d.comment_probability,
            style_weights: d.style_weights,
            min_detailed_text_len: d.min_detailed_text_len,
        }
    }
}

impl PresetConfig {
    pub fn to_decision_config(&self) -> DecisionConfig {
        DecisionConfig {
            like_threshold: self.like_threshold,
            comment_probability: self.comment_probability,
            style_weights: self.style_weights.clone(),
            min_detailed_text_len: self.min_detailed_text_len,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 20,
            oracle_timeout_secs: 120,
            output_limit_bytes: 20_000_000,
            settle_delay_ms: 1_500,
            recovery_settle_ms: 6_000,
            retry_budget: 2,
            gather_passes: 2,
            failure_threshold: 3,
            recovery_ceiling: 5,
            history_window: 4,
            end_of_stack_markers: vec![
                "you've seen everyone for now".to_string(),
                "no more profiles".to_string(),
            ],
            text_similarity_cutoff: 0.3,
            analyzer_command: vec!["profile-oracle".to_string(), "snapshot".to_string()],
            generator_command: vec!["profile-oracle".to_string(), "comment".to_string()],
            app_package: "co.match.android".to_string(),
            gestures: GestureConfig::default(),
            presets: default_presets(),
        }
    }
}

fn default_presets() -> BTreeMap<String, PresetConfig> {
    let styles = |weights: &[(&str, f64)]| {
        weights
            .iter()
            .map(|(name, w)| ((*name).to_string(), *w))
            .collect::<BTreeMap<String, f64>>()
    };
    BTreeMap::from([
        (
            "balanced".to_string(),
            PresetConfig {
                like_threshold: 0.55,
                comment_probability: 0.4,
                style_weights: styles(&[("playful", 1.0), ("direct", 1.0), ("curious", 1.0)]),
                min_detailed_text_len: 200,
            },
        ),
        (
            "selective".to_string(),
            PresetConfig {
                like_threshold: 0.7,
                comment_probability: 0.6,
                style_weights: styles(&[("direct", 1.5), ("curious", 1.0)]),
                min_detailed_text_len: 150,
            },
        ),
        (
            "generous".to_string(),
            PresetConfig {
                like_threshold: 0.45,
                comment_probability: 0.25,
                style_weights: styles(&[("playful", 1.5), ("curious", 1.0)]),
                min_detailed_text_len: 250,
            },
        ),
    ])
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.oracle_timeout_secs == 0 {
            return Err(anyhow!("oracle_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.history_window == 0 {
            return Err(anyhow!("history_window must be > 0"));
        }
        if self.recovery_settle_ms < self.settle_delay_ms {
            return Err(anyhow!("recovery_settle_ms must be >= settle_delay_ms"));
        }
        if self.failure_threshold == 0 {
            return Err(anyhow!("failure_threshold must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.text_similarity_cutoff) {
            return Err(anyhow!("text_similarity_cutoff must be in 0..=1"));
        }
        if self.analyzer_command.is_empty() || self.analyzer_command[0].trim().is_empty() {
            return Err(anyhow!("analyzer_command must be a non-empty array"));
        }
        if self.generator_command.is_empty() || self.generator_command[0].trim().is_empty() {
            return Err(anyhow!("generator_command must be a non-empty array"));
        }
        if self.presets.is_empty() {
            return Err(anyhow!("at least one preset is required"));
        }
        for (name, preset) in &self.presets {
            if !(0.0..=1.0).contains(&preset.like_threshold) {
                return Err(anyhow!("preset {name}: like_threshold must be in 0..=1"));
            }
            if !(0.0..=1.0).contains(&preset.comment_probability) {
                return Err(anyhow!(
                    "preset {name}: comment_probability must be in 0..=1"
                ));
            }
            if preset.style_weights.is_empty() {
                return Err(anyhow!("preset {name}: style_weights must not be empty"));
            }
        }
        Ok(())
    }

    /// Look up a preset by name.
    pub fn preset(&self, name: &str) -> Result<&PresetConfig> {
        self.presets.get(name).ok_or_else(|| {
            anyhow!(
                "unknown preset {name:?} (available: {})",
                self.presets.keys().cloned().collect::<Vec<_>>().join(", ")
            )
        })
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunnerConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        let cfg = RunnerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RunnerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RunnerConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = RunnerConfig::default();
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn default_presets_validate() {
        let cfg = RunnerConfig::default();
        cfg.validate().expect("validate");
        for name in ["balanced", "selective", "generous"] {
            cfg.preset(name).expect("preset");
        }
    }

    #[test]
    fn unknown_preset_is_an_error() {
        let cfg = RunnerConfig::default();
        let err = cfg.preset("reckless").unwrap_err();
        assert!(err.to_string().contains("unknown preset"));
    }

    #[test]
    fn recovery_settle_is_longer_than_the_normal_settle() {
        let cfg = RunnerConfig::default();
        assert!(cfg.recovery_settle_ms > cfg.settle_delay_ms);

        let mut cfg = RunnerConfig::default();
        cfg.recovery_settle_ms = cfg.settle_delay_ms - 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn out_of_range_threshold_fails_validation() {
        let mut cfg = RunnerConfig::default();
        cfg.presets.get_mut("balanced").expect("preset").like_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }
}
