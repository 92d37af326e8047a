//! Normalized screen content captured at one point in time.
//!
//! Snapshots are compared only by content (identity fields, body text, media
//! fingerprints), never by raw pixels, so cosmetic re-renders do not register
//! as a change.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A UI element located by the analysis oracle, in fractional screen
/// coordinates. Regions feed gesture execution only; verification never
/// reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiRegion {
    /// Horizontal center as a fraction of screen width (0.0–1.0).
    pub x: f64,
    /// Vertical center as a fraction of screen height (0.0–1.0).
    pub y: f64,
    /// Oracle confidence (0.0–1.0).
    pub confidence: f64,
}

/// Analysis-provided profile quality signals consumed by the decision policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSignals {
    /// Overall profile quality, 0–10.
    pub quality: u8,
    /// Conversation potential, 0–10.
    pub conversation_potential: u8,
    pub red_flags: Vec<String>,
    pub positive_indicators: Vec<String>,
}

/// Immutable content snapshot derived from one screen capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSnapshot {
    /// Semantic identity fields (name, age, location, ...), possibly empty.
    #[serde(default)]
    pub identity: BTreeMap<String, String>,
    /// Ordered extracted text segments (prompts, captions, bio lines).
    #[serde(default)]
    pub body_text: Vec<String>,
    /// Lightweight fingerprints of visible media, order-irrelevant.
    #[serde(default)]
    pub media: BTreeSet<String>,
    /// Detected UI regions keyed by element name (e.g. `like_button`).
    #[serde(default)]
    pub regions: BTreeMap<String, UiRegion>,
    #[serde(default)]
    pub signals: ProfileSignals,
    /// Whether the comment composer is currently on screen.
    #[serde(default)]
    pub comment_field_visible: bool,
    /// Capture time, milliseconds since the Unix epoch.
    #[serde(default)]
    pub captured_at: u64,
}

impl ContentSnapshot {
    /// An empty snapshot stamped with the current time.
    pub fn empty_now() -> Self {
        Self {
            identity: BTreeMap::new(),
            body_text: Vec::new(),
            media: BTreeSet::new(),
            regions: BTreeMap::new(),
            signals: ProfileSignals::default(),
            comment_field_visible: false,
            captured_at: now_ms(),
        }
    }

    /// A transitional/loading screen: no identity fields and no body text.
    /// Verification defers on these rather than reporting a mismatch.
    pub fn is_transitional(&self) -> bool {
        self.identity.is_empty() && self.body_text.is_empty()
    }

    /// Explicit end-of-stack sentinel: a recognized marker phrase appears in
    /// the body text. Emptiness alone is never the sentinel (that is the
    /// transitional case).
    pub fn is_end_of_stack(&self, markers: &[String]) -> bool {
        self.body_text.iter().any(|segment| {
            let lower = segment.to_lowercase();
            markers.iter().any(|m| lower.contains(&m.to_lowercase()))
        })
    }

    /// Short human-readable summary for attempt records and the comment store.
    pub fn summary(&self) -> String {
        let name = self
            .identity
            .get("name")
            .map(String::as_str)
            .unwrap_or("<unknown>");
        let first_line = self.body_text.first().map(String::as_str).unwrap_or("");
        format!("{name}: {first_line}")
    }

    /// Fold a capture taken after scrolling into this snapshot: unseen text
    /// segments and media are appended, missing identity fields are filled
    /// in, and the regions are replaced by the latest screen's (gestures act
    /// on the current screen). Returns whether anything new was learned.
    pub fn merge_scrolled(&mut self, fresh: ContentSnapshot) -> bool {
        let mut changed = false;
        for segment in fresh.body_text {
            if !self.body_text.contains(&segment) {
                self.body_text.push(segment);
                changed = true;
            }
        }
        for item in fresh.media {
            changed |= self.media.insert(item);
        }
        for (key, value) in fresh.identity {
            if !self.identity.contains_key(&key) {
                self.identity.insert(key, value);
                changed = true;
            }
        }
        self.comment_field_visible |= fresh.comment_field_visible;
        self.regions = fresh.regions;
        changed
    }

    /// Stable content hash over identity fields and body text. Used by the
    /// decision policy to derive deterministic per-profile fractions.
    pub fn content_hash(&self) -> u64 {
        let mut hash = FNV_OFFSET;
        for (key, value) in &self.identity {
            hash = fnv_step(hash, key.as_bytes());
            hash = fnv_step(hash, value.as_bytes());
        }
        for segment in &self.body_text {
            hash = fnv_step(hash, segment.as_bytes());
        }
        hash
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv_step(mut hash: u64, bytes: &[u8]) -> u64 {
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    // Separator so ("ab","c") and ("a","bc") hash differently.
    hash ^= 0xff;
    hash.wrapping_mul(FNV_PRIME)
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Structural difference between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotDiff {
    /// No identity field key shares the same value across both snapshots.
    pub identity_disjoint: bool,
    /// The media fingerprint sets share no element.
    pub media_disjoint: bool,
    /// Word-overlap similarity of the body text, 0.0 (unrelated) to 1.0
    /// (identical word sets).
    pub text_similarity: f64,
}

/// Compute the structural diff used by the verification engine.
pub fn diff(pre: &ContentSnapshot, post: &ContentSnapshot) -> SnapshotDiff {
    let identity_disjoint = pre.identity.iter().all(|(key, value)| {
        post.identity
            .get(key)
            .map(|other| other != value)
            .unwrap_or(true)
    });
    let media_disjoint = pre.media.is_disjoint(&post.media);
    SnapshotDiff {
        identity_disjoint,
        media_disjoint,
        text_similarity: text_similarity(&pre.body_text, &post.body_text),
    }
}

/// Word-set overlap between two text bodies: `|a ∩ b| / max(|a|, |b|)`.
/// Returns 1.0 when both are empty (nothing changed).
pub fn text_similarity(pre: &[String], post: &[String]) -> f64 {
    let a = word_set(pre);
    let b = word_set(post);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let overlap = a.intersection(&b).count();
    overlap as f64 / a.len().max(b.len()) as f64
}

fn word_set(segments: &[String]) -> BTreeSet<String> {
    segments
        .iter()
        .flat_map(|s| s.split_whitespace())
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::profile_snapshot;

    #[test]
    fn transitional_requires_empty_identity_and_text() {
        let blank = ContentSnapshot::empty_now();
        assert!(blank.is_transitional());

        let mut named = ContentSnapshot::empty_now();
        named.identity.insert("name".to_string(), "Jess".to_string());
        assert!(!named.is_transitional());

        let mut texty = ContentSnapshot::empty_now();
        texty.body_text.push("loves hiking".to_string());
        assert!(!texty.is_transitional());
    }

    #[test]
    fn end_of_stack_matches_marker_not_emptiness() {
        let markers = vec!["you've seen everyone".to_string()];
        let blank = ContentSnapshot::empty_now();
        assert!(!blank.is_end_of_stack(&markers));

        let mut sentinel = ContentSnapshot::empty_now();
        sentinel
            .body_text
            .push("You've seen everyone for now".to_string());
        assert!(sentinel.is_end_of_stack(&markers));
    }

    #[test]
    fn diff_reports_disjoint_profiles() {
        let pre = profile_snapshot("Jess", &["loves hiking"], &["m1", "m2"]);
        let post = profile_snapshot("Morgan", &["dog lover"], &["m3"]);
        let d = diff(&pre, &post);
        assert!(d.identity_disjoint);
        assert!(d.media_disjoint);
        assert!(d.text_similarity < 0.3);
    }

    #[test]
    fn diff_reports_identical_profiles() {
        let pre = profile_snapshot("Jess", &["loves hiking"], &["m1"]);
        let post = pre.clone();
        let d = diff(&pre, &post);
        assert!(!d.identity_disjoint);
        assert!(!d.media_disjoint);
        assert_eq!(d.text_similarity, 1.0);
    }

    #[test]
    fn text_similarity_of_empty_bodies_is_one() {
        assert_eq!(text_similarity(&[], &[]), 1.0);
    }

    #[test]
    fn merge_scrolled_adds_unseen_content_only() {
        let mut top = profile_snapshot("Jess", &["coffee snob"], &["m1"]);
        let scrolled = profile_snapshot("Jess", &["coffee snob", "weekend climber"], &["m2"]);

        assert!(top.merge_scrolled(scrolled.clone()));
        assert_eq!(top.body_text, vec!["coffee snob", "weekend climber"]);
        assert!(top.media.contains("m1") && top.media.contains("m2"));
        assert_eq!(top.identity["name"], "Jess");

        // A second pass over the same content learns nothing.
        assert!(!top.merge_scrolled(scrolled));
    }

    #[test]
    fn content_hash_is_stable_and_content_sensitive() {
        let a = profile_snapshot("Jess", &["loves hiking"], &[]);
        let b = profile_snapshot("Jess", &["loves hiking"], &[]);
        let c = profile_snapshot("Morgan", &["loves hiking"], &[]);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
    }
}
