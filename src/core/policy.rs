//! Decision policy: pure function of the current snapshot and static
//! configuration.
//!
//! The policy decides the action kind and (for comments) the style; comment
//! text generation happens in the orchestrator so two calls with the same
//! snapshot and config always yield the same decision.

use std::collections::BTreeMap;

use crate::core::snapshot::ContentSnapshot;

/// Static policy tuning, selected by preset name at run start.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionConfig {
    /// Compatibility cutoff in 0.0–1.0; below it the profile is disliked.
    pub like_threshold: f64,
    /// Fraction of likes that attempt a comment.
    pub comment_probability: f64,
    /// Comment style name to selection weight.
    pub style_weights: BTreeMap<String, f64>,
    /// Total body-text length that counts as a detailed profile.
    pub min_detailed_text_len: usize,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            like_threshold: 0.55,
            comment_probability: 0.4,
            style_weights: BTreeMap::from([
                ("playful".to_string(), 1.0),
                ("direct".to_string(), 1.0),
                ("curious".to_string(), 1.0),
            ]),
            min_detailed_text_len: 200,
        }
    }
}

/// Outcome of the decision policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Empty body text: treated as an analysis failure, not a dislike.
    Unreadable,
    Dislike { reason: String },
    /// Like; `comment_style` is set when a comment should be attempted.
    Like { comment_style: Option<String> },
}

/// Decide the next intended action for the snapshot.
pub fn decide(snapshot: &ContentSnapshot, config: &DecisionConfig) -> Decision {
    if snapshot.body_text.is_empty() {
        return Decision::Unreadable;
    }

    let score = compatibility_score(snapshot, config);
    if score < config.like_threshold {
        let reason = if snapshot.signals.red_flags.is_empty() {
            format!("score {score:.2} below threshold {:.2}", config.like_threshold)
        } else {
            format!("red flags: {}", snapshot.signals.red_flags.join(", "))
        };
        return Decision::Dislike { reason };
    }

    let comment_style = if comment_fraction(snapshot) < config.comment_probability {
        pick_style(snapshot, &config.style_weights)
    } else {
        None
    };
    Decision::Like { comment_style }
}

/// Compatibility in 0.0–1.0. Red flags zero the score; otherwise a weighted
/// blend of quality, conversation potential, positive indicators, and a
/// detailed-text bonus.
pub fn compatibility_score(snapshot: &ContentSnapshot, config: &DecisionConfig) -> f64 {
    let signals = &snapshot.signals;
    if !signals.red_flags.is_empty() {
        return 0.0;
    }
    let quality = f64::from(signals.quality.min(10)) / 10.0;
    let potential = f64::from(signals.conversation_potential.min(10)) / 10.0;
    let positives = signals.positive_indicators.len().min(4) as f64 / 4.0;
    let text_len: usize = snapshot.body_text.iter().map(String::len).sum();
    let detailed = if text_len >= config.min_detailed_text_len {
        0.1
    } else {
        0.0
    };
    (quality * 0.5 + potential * 0.3 + positives * 0.2 + detailed).min(1.0)
}

/// Blend persisted per-style success rates into the configured weights.
/// A style with no history keeps its configured weight.
pub fn fold_success_rates(weights: &mut BTreeMap<String, f64>, rates: &BTreeMap<String, f64>) {
    for (style, weight) in weights.iter_mut() {
        if let Some(rate) = rates.get(style) {
            *weight *= 0.5 + rate;
        }
    }
}

/// Deterministic per-profile fraction in [0, 1) derived from the content
/// hash, so the comment decision is stable for a given snapshot.
fn comment_fraction(snapshot: &ContentSnapshot) -> f64 {
    (snapshot.content_hash() % 10_000) as f64 / 10_000.0
}

/// Deterministic weighted style selection over the same hash.
fn pick_style(snapshot: &ContentSnapshot, weights: &BTreeMap<String, f64>) -> Option<String> {
    let total: f64 = weights.values().filter(|w| **w > 0.0).sum();
    if total <= 0.0 {
        return None;
    }
    // Rotate the hash so style selection is independent of the comment gate.
    let point = ((snapshot.content_hash().rotate_left(17)) % 10_000) as f64 / 10_000.0 * total;
    let mut cursor = 0.0;
    for (style, weight) in weights {
        if *weight <= 0.0 {
            continue;
        }
        cursor += *weight;
        if point < cursor {
            return Some(style.clone());
        }
    }
    weights.keys().next_back().cloned()
}
