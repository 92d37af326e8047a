//! Mutable per-run bookkeeping, owned exclusively by the session orchestrator.

use std::collections::VecDeque;

use crate::core::action::{ActionKind, AttemptOutcome, AttemptRecord};

/// Current state-machine phase, tracked for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Capture,
    Decide,
    Execute,
    Verify,
    Advance,
    Retry,
    Recover,
    Terminate,
}

/// Orchestrator-owned run state. Created at run start, mutated only by the
/// session loop, discarded at run end.
#[derive(Debug)]
pub struct RunState {
    pub profiles_processed: u32,
    pub profiles_limit: u32,
    /// Failed-verification streak; reset to 0 only on a Verified outcome.
    pub consecutive_failures: u32,
    /// Total recovery invocations this run (bounded by the global ceiling).
    pub recovery_attempts: u32,
    /// Recovery invocations since the last Verified outcome; drives
    /// escalation to the reset strategy.
    pub recoveries_since_verified: u32,
    pub phase: Phase,
    /// Bounded window of recent attempts used for stuck-pattern detection.
    /// The full audit trail lives with the session, not here.
    window: VecDeque<AttemptRecord>,
    window_cap: usize,
}

impl RunState {
    pub fn new(profiles_limit: u32, window_cap: usize) -> Self {
        Self {
            profiles_processed: 0,
            profiles_limit,
            consecutive_failures: 0,
            recovery_attempts: 0,
            recoveries_since_verified: 0,
            phase: Phase::Start,
            window: VecDeque::with_capacity(window_cap),
            window_cap,
        }
    }

    pub fn limit_reached(&self) -> bool {
        self.profiles_processed >= self.profiles_limit
    }

    /// Fold one attempt into the streak counters and the stuck window.
    pub fn record(&mut self, record: AttemptRecord) {
        match record.outcome {
            AttemptOutcome::Verified => {
                self.consecutive_failures = 0;
                // Only real progress clears the escalation counter; a verified
                // recovery probe or noop does not.
                if matches!(
                    record.action,
                    ActionKind::Like | ActionKind::Dislike | ActionKind::Comment
                ) {
                    self.recoveries_since_verified = 0;
                }
            }
            AttemptOutcome::Mismatched
            | AttemptOutcome::ExecutionFailed
            | AttemptOutcome::Timeout => {
                self.consecutive_failures += 1;
            }
        }
        if self.window.len() == self.window_cap {
            self.window.pop_front();
        }
        self.window.push_back(record);
    }

    /// Recent attempts, oldest first.
    pub fn window(&self) -> impl Iterator<Item = &AttemptRecord> {
        self.window.iter()
    }

    /// Discard the stuck-detection window after a stack reset. The next
    /// snapshot becomes a fresh baseline; the audit trail is unaffected.
    pub fn clear_window(&mut self) {
        self.window.clear();
    }
}
