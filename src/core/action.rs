//! Actions the orchestrator can request, and the records of attempting them.

use serde::{Deserialize, Serialize};

/// Kind of an intended action, independent of payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Like,
    Dislike,
    Comment,
    RecoverySwipe,
    Noop,
}

/// A requested state transition on the device.
#[derive(Debug, Clone, PartialEq)]
pub enum IntendedAction {
    Like,
    Dislike,
    Comment { text: String, style: String },
    RecoverySwipe,
    Noop,
}

/// What verification must observe for the action to count as done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedOutcome {
    /// A materially different profile must now be shown (or the stack is
    /// exhausted).
    ProfileAdvanced,
    /// The comment composer must close, then the profile must advance.
    ComposerClosedThenAdvanced,
    /// No content change required; execution success is enough.
    ExecutionOnly,
}

impl IntendedAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Like => ActionKind::Like,
            Self::Dislike => ActionKind::Dislike,
            Self::Comment { .. } => ActionKind::Comment,
            Self::RecoverySwipe => ActionKind::RecoverySwipe,
            Self::Noop => ActionKind::Noop,
        }
    }

    /// The predicate the verification engine evaluates for this action.
    pub fn expected_outcome(&self) -> ExpectedOutcome {
        match self {
            Self::Like | Self::Dislike => ExpectedOutcome::ProfileAdvanced,
            Self::Comment { .. } => ExpectedOutcome::ComposerClosedThenAdvanced,
            Self::RecoverySwipe | Self::Noop => ExpectedOutcome::ExecutionOnly,
        }
    }

    /// Whether a verified execution moves the run to the next profile.
    pub fn advances_profile(&self) -> bool {
        matches!(self.expected_outcome(), ExpectedOutcome::ProfileAdvanced)
            || matches!(self, Self::Comment { .. })
    }
}

/// Result class of one executed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The expected effect was observed.
    Verified,
    /// The action executed but the expected effect is absent.
    Mismatched,
    /// The action itself (or a capture around it) errored.
    ExecutionFailed,
    /// A collaborator call exceeded its budget.
    Timeout,
}

/// One entry in the run's append-only audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub action: ActionKind,
    pub outcome: AttemptOutcome,
    /// Summary of the snapshot the action was decided against.
    pub pre_summary: String,
    /// Summary of the post-action snapshot, when one was captured.
    pub post_summary: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub at_ms: u64,
}
