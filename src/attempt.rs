//! Single execute→settle→capture→verify cycle, with bounded retries.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::core::action::{AttemptOutcome, AttemptRecord, IntendedAction};
use crate::core::snapshot::{ContentSnapshot, now_ms};
use crate::core::verify::{Verdict, Verifier};
use crate::io::analyzer::Analyzer;
use crate::io::device::{DeviceControl, RawCapture};
use crate::io::gestures::Gestures;
use crate::io::process::OperationTimedOut;

/// Collaborators and tuning shared by every attempt in a run.
pub struct AttemptDeps<'a, D: DeviceControl + ?Sized, A: Analyzer + ?Sized> {
    pub device: &'a D,
    pub analyzer: &'a A,
    pub gestures: &'a Gestures,
    pub verifier: &'a Verifier,
    /// Wait for animations before every post-action capture.
    pub settle_delay: Duration,
    /// Re-execution retries after a mismatch (total tries = retries + 1).
    pub retry_budget: u32,
}

/// One try's record plus the post snapshot it was judged against.
#[derive(Debug, Clone)]
pub struct AttemptTrace {
    pub record: AttemptRecord,
    pub post: Option<ContentSnapshot>,
    /// Raw capture behind `post`, for optional screenshot persistence.
    pub raw: Option<RawCapture>,
}

/// Everything the session needs from one attempt: every try's record (the
/// stuck window sees each of them) and the final post snapshot, which becomes
/// the next profile's baseline when the attempt verified.
#[derive(Debug, Clone)]
pub struct AttemptReport {
    pub traces: Vec<AttemptTrace>,
    pub outcome: AttemptOutcome,
    pub final_post: Option<ContentSnapshot>,
}

/// Capture the screen and normalize it into a snapshot.
pub fn capture_snapshot<D: DeviceControl + ?Sized, A: Analyzer + ?Sized>(
    device: &D,
    analyzer: &A,
) -> Result<(RawCapture, ContentSnapshot)> {
    let raw = device.capture()?;
    let snapshot = analyzer.analyze(&raw)?;
    Ok((raw, snapshot))
}

/// Execute the action and verify its effect, retrying on mismatch or timeout
/// up to the retry budget. Execution failures end the attempt immediately;
/// their classification feeds the recovery window.
#[instrument(skip_all, fields(action = ?action.kind()))]
pub fn run_attempt<D: DeviceControl + ?Sized, A: Analyzer + ?Sized>(
    deps: &AttemptDeps<'_, D, A>,
    pre: &ContentSnapshot,
    action: &IntendedAction,
) -> AttemptReport {
    let mut traces = Vec::new();
    let total_tries = deps.retry_budget + 1;
    let mut outcome = AttemptOutcome::Mismatched;
    let mut final_post = None;

    for try_index in 0..total_tries {
        let trace = run_try(deps, pre, action);
        outcome = trace.record.outcome;
        final_post = trace.post.clone();
        traces.push(trace);

        match outcome {
            AttemptOutcome::Verified => break,
            AttemptOutcome::Mismatched | AttemptOutcome::Timeout
                if try_index + 1 < total_tries =>
            {
                debug!(try_index, ?outcome, "retrying");
            }
            // Execution failures are not retried here; the recovery
            // controller decides what happens next.
            _ => break,
        }
    }

    AttemptReport {
        traces,
        outcome,
        final_post,
    }
}

fn run_try<D: DeviceControl + ?Sized, A: Analyzer + ?Sized>(
    deps: &AttemptDeps<'_, D, A>,
    pre: &ContentSnapshot,
    action: &IntendedAction,
) -> AttemptTrace {
    if let Err(err) = deps.gestures.execute(deps.device, action, pre) {
        warn!(err = %err, "action execution failed");
        return trace_without_post(action, pre, classify(&err));
    }

    settle(deps.settle_delay);
    let (raw, post) = match capture_snapshot(deps.device, deps.analyzer) {
        Ok(pair) => pair,
        Err(err) => {
            warn!(err = %err, "post-action capture failed");
            return trace_without_post(action, pre, classify(&err));
        }
    };

    let (outcome, post, raw) = judge(deps, pre, action, post, raw);
    AttemptTrace {
        record: AttemptRecord {
            action: action.kind(),
            outcome,
            pre_summary: pre.summary(),
            post_summary: Some(post.summary()),
            at_ms: now_ms(),
        },
        post: Some(post),
        raw: Some(raw),
    }
}

/// Resolve a verdict into a final outcome, recapturing once for deferrals and
/// for the comment advance check.
fn judge<D: DeviceControl + ?Sized, A: Analyzer + ?Sized>(
    deps: &AttemptDeps<'_, D, A>,
    pre: &ContentSnapshot,
    action: &IntendedAction,
    post: ContentSnapshot,
    raw: RawCapture,
) -> (AttemptOutcome, ContentSnapshot, RawCapture) {
    match deps.verifier.verify(action, pre, &post) {
        Verdict::Verified => (AttemptOutcome::Verified, post, raw),
        Verdict::Mismatched => (AttemptOutcome::Mismatched, post, raw),
        Verdict::Deferred => {
            settle(deps.settle_delay);
            match capture_snapshot(deps.device, deps.analyzer) {
                Ok((second_raw, second)) => match deps.verifier.verify(action, pre, &second) {
                    Verdict::Verified => (AttemptOutcome::Verified, second, second_raw),
                    Verdict::CommentPendingAdvance => advance_check(deps, pre, second, second_raw),
                    // A second transitional capture counts as a mismatch
                    // rather than deferring forever.
                    Verdict::Mismatched | Verdict::Deferred => {
                        (AttemptOutcome::Mismatched, second, second_raw)
                    }
                },
                Err(err) => {
                    warn!(err = %err, "recapture after deferral failed");
                    (classify(&err), post, raw)
                }
            }
        }
        Verdict::CommentPendingAdvance => advance_check(deps, pre, post, raw),
    }
}

/// Comment stage two: the composer closed; now the profile itself must move.
fn advance_check<D: DeviceControl + ?Sized, A: Analyzer + ?Sized>(
    deps: &AttemptDeps<'_, D, A>,
    pre: &ContentSnapshot,
    post: ContentSnapshot,
    raw: RawCapture,
) -> (AttemptOutcome, ContentSnapshot, RawCapture) {
    if deps.verifier.profile_advanced(pre, &post) {
        return (AttemptOutcome::Verified, post, raw);
    }
    settle(deps.settle_delay);
    match capture_snapshot(deps.device, deps.analyzer) {
        Ok((second_raw, second)) => {
            if deps.verifier.profile_advanced(pre, &second) {
                (AttemptOutcome::Verified, second, second_raw)
            } else {
                (AttemptOutcome::Mismatched, second, second_raw)
            }
        }
        Err(err) => {
            warn!(err = %err, "comment advance capture failed");
            (classify(&err), post, raw)
        }
    }
}

fn trace_without_post(
    action: &IntendedAction,
    pre: &ContentSnapshot,
    outcome: AttemptOutcome,
) -> AttemptTrace {
    AttemptTrace {
        record: AttemptRecord {
            action: action.kind(),
            outcome,
            pre_summary: pre.summary(),
            post_summary: None,
            at_ms: now_ms(),
        },
        post: None,
        raw: None,
    }
}

/// Timeouts are recoverable waits; everything else is an execution failure.
pub fn classify(err: &anyhow::Error) -> AttemptOutcome {
    if err.downcast_ref::<OperationTimedOut>().is_some() {
        AttemptOutcome::Timeout
    } else {
        AttemptOutcome::ExecutionFailed
    }
}

fn settle(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}
