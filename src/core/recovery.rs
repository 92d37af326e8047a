//! Stuck-state recovery planning.
//!
//! The controller never invents new swipe decisions; it only picks one of a
//! small set of un-stick strategies from the recent attempt window.

use crate::core::action::{ActionKind, AttemptOutcome, AttemptRecord};

/// Which un-stick strategy to run next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPlan {
    /// A small scroll that must not change the current profile, to dismiss
    /// overlays or partially rendered states.
    NeutralProbe,
    /// Wait out animations or a slow device, then recapture.
    SettleAndRecapture,
    /// Navigate back to a known-good screen and start fresh.
    ResetToTop,
}

/// Plans recovery from the bounded attempt window.
#[derive(Debug, Clone, Default)]
pub struct RecoveryController;

impl RecoveryController {
    /// Pick a strategy for the current stuck state.
    ///
    /// Two recoveries without an intervening verified attempt mean the mild
    /// strategies are not working, so escalate to a reset regardless of the
    /// window contents.
    pub fn plan(&self, window: &[&AttemptRecord], recoveries_since_verified: u32) -> RecoveryPlan {
        if recoveries_since_verified >= 2 {
            return RecoveryPlan::ResetToTop;
        }
        if trailing_streak(window, |r| r.outcome == AttemptOutcome::Mismatched)
            .is_some_and(|(len, kind)| len >= 2 && kind.is_some())
        {
            return RecoveryPlan::NeutralProbe;
        }
        if trailing_streak(window, |r| {
            matches!(
                r.outcome,
                AttemptOutcome::ExecutionFailed | AttemptOutcome::Timeout
            )
        })
        .is_some_and(|(len, _)| len >= 2)
        {
            return RecoveryPlan::SettleAndRecapture;
        }
        RecoveryPlan::NeutralProbe
    }
}

/// Length of the trailing run of records matching `pred`, plus the shared
/// action kind if every record in the run has the same one.
fn trailing_streak(
    window: &[&AttemptRecord],
    pred: impl Fn(&AttemptRecord) -> bool,
) -> Option<(usize, Option<ActionKind>)> {
    let mut len = 0;
    let mut kind: Option<ActionKind> = None;
    let mut uniform = true;
    for record in window.iter().rev() {
        if !pred(record) {
            break;
        }
        len += 1;
        match kind {
            None => kind = Some(record.action),
            Some(k) if k != record.action => uniform = false,
            Some(_) => {}
        }
    }
    if len == 0 {
        None
    } else {
        Some((len, if uniform { kind } else { None }))
    }
}
