//! Verification engine: did an action actually change application state?
//!
//! Works only on pre/post content snapshots. Fixed screen coordinates and
//! success toasts are unreliable across application versions and are never
//! consulted.

use crate::core::action::{ExpectedOutcome, IntendedAction};
use crate::core::snapshot::{ContentSnapshot, diff};

/// Verdict for one pre/post snapshot pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Verified,
    Mismatched,
    /// A snapshot looks transitional (blank loading frame); recapture once
    /// after the settle delay and re-evaluate.
    Deferred,
    /// Comment stage one passed (composer closed); the orchestrator must
    /// capture again and check for a profile transition.
    CommentPendingAdvance,
}

/// Content-comparison verifier. Thresholds and sentinel markers come from
/// configuration.
#[derive(Debug, Clone)]
pub struct Verifier {
    /// Body-text word-overlap below this counts as different content.
    pub text_similarity_cutoff: f64,
    /// Case-insensitive end-of-stack marker phrases.
    pub end_of_stack_markers: Vec<String>,
}

impl Default for Verifier {
    fn default() -> Self {
        Self {
            text_similarity_cutoff: 0.3,
            end_of_stack_markers: vec![
                "you've seen everyone for now".to_string(),
                "no more profiles".to_string(),
            ],
        }
    }
}

impl Verifier {
    /// Evaluate the action's expected-outcome predicate against the
    /// structural diff of the two snapshots.
    pub fn verify(
        &self,
        action: &IntendedAction,
        pre: &ContentSnapshot,
        post: &ContentSnapshot,
    ) -> Verdict {
        match action.expected_outcome() {
            ExpectedOutcome::ExecutionOnly => Verdict::Verified,
            ExpectedOutcome::ProfileAdvanced => {
                if post.is_end_of_stack(&self.end_of_stack_markers) {
                    return Verdict::Verified;
                }
                if pre.is_transitional() || post.is_transitional() {
                    return Verdict::Deferred;
                }
                if self.profile_advanced(pre, post) {
                    Verdict::Verified
                } else {
                    Verdict::Mismatched
                }
            }
            ExpectedOutcome::ComposerClosedThenAdvanced => {
                if post.is_transitional() {
                    return Verdict::Deferred;
                }
                if post.comment_field_visible {
                    Verdict::Mismatched
                } else {
                    Verdict::CommentPendingAdvance
                }
            }
        }
    }

    /// The Like/Dislike advancement criterion. Fully disjoint identity fields
    /// and media fingerprints are decisive on their own (two people can share
    /// bio phrasing); body text breaks the tie when exactly one of the two
    /// signals moved. Also used for comment stage two.
    pub fn profile_advanced(&self, pre: &ContentSnapshot, post: &ContentSnapshot) -> bool {
        if post.is_end_of_stack(&self.end_of_stack_markers) {
            return true;
        }
        let d = diff(pre, post);
        if d.identity_disjoint && d.media_disjoint {
            return true;
        }
        (d.identity_disjoint || d.media_disjoint)
            && d.text_similarity < self.text_similarity_cutoff
    }
}
