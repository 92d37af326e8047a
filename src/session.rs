//! Bounded run loop: capture, decide, act, verify, recover.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::attempt::{AttemptDeps, AttemptReport, capture_snapshot, classify, run_attempt};
use crate::core::action::{ActionKind, AttemptOutcome, AttemptRecord, IntendedAction};
use crate::core::policy::{Decision, DecisionConfig, decide, fold_success_rates};
use crate::core::recovery::{RecoveryController, RecoveryPlan};
use crate::core::run_state::{Phase, RunState};
use crate::core::snapshot::{ContentSnapshot, now_ms};
use crate::core::verify::Verifier;
use crate::io::analyzer::Analyzer;
use crate::io::attempt_log::AttemptLogger;
use crate::io::comment_store::{CommentEntry, CommentStore};
use crate::io::device::{DeviceControl, RawCapture};
use crate::io::generator::CommentGenerator;
use crate::io::gestures::Gestures;

/// Reason why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The configured profile count was processed.
    LimitReached,
    /// The end-of-stack sentinel appeared.
    StackExhausted,
    /// The recovery ceiling was exhausted without progress.
    Stuck { recovery_attempts: u32 },
    /// A cooperative stop was requested.
    Cancelled,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub profiles_processed: u32,
    pub likes_sent: u32,
    pub comments_sent: u32,
    pub dislikes_sent: u32,
    pub stop: StopReason,
    /// Full audit trail, oldest first.
    pub records: Vec<AttemptRecord>,
}

/// Loop bounds and timing, resolved from config and CLI before the run.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub profiles_limit: u32,
    pub settle_delay: Duration,
    /// Longer wait used by the settle recovery strategy.
    pub recovery_settle: Duration,
    pub retry_budget: u32,
    /// Scroll passes that reveal more profile content before deciding
    /// (0 disables gathering).
    pub gather_passes: u32,
    /// Consecutive failed attempts that trigger recovery.
    pub failure_threshold: u32,
    /// Total recovery invocations allowed per run.
    pub recovery_ceiling: u32,
    /// Recent attempts kept for stuck-pattern detection.
    pub history_window: usize,
}

/// One run against one device. Owns all mutable run state; collaborators are
/// borrowed so tests can script them.
pub struct Session<'a, D, A, G>
where
    D: DeviceControl + ?Sized,
    A: Analyzer + ?Sized,
    G: CommentGenerator + ?Sized,
{
    pub device: &'a D,
    pub analyzer: &'a A,
    pub generator: &'a G,
    pub gestures: Gestures,
    pub verifier: Verifier,
    pub recovery: RecoveryController,
    pub decision: DecisionConfig,
    pub config: SessionConfig,
    pub comment_store: Option<CommentStore>,
    pub logger: Option<AttemptLogger>,
    /// Cooperative stop flag, checked at phase boundaries.
    pub stop: Arc<AtomicBool>,
}

impl<D, A, G> Session<'_, D, A, G>
where
    D: DeviceControl + ?Sized,
    A: Analyzer + ?Sized,
    G: CommentGenerator + ?Sized,
{
    /// Run until the profile limit, the end of the stack, a stuck state, or a
    /// stop request. All of those are ordinary outcomes returned in `Ok`;
    /// `Err` means a broken invariant (config, store, or logger failure).
    #[instrument(skip_all, fields(profiles_limit = self.config.profiles_limit))]
    pub fn run(&mut self) -> Result<SessionOutcome> {
        let mut state = RunState::new(self.config.profiles_limit, self.config.history_window);
        let mut audit: Vec<AttemptRecord> = Vec::new();
        let mut likes = 0u32;
        let mut comments = 0u32;
        let mut dislikes = 0u32;

        if let Some(store) = &self.comment_store {
            let rates = store.success_rates()?;
            if !rates.is_empty() {
                info!(styles = rates.len(), "folding comment history into style weights");
                fold_success_rates(&mut self.decision.style_weights, &rates);
            }
        }

        // Post snapshot carried over from a verified attempt, so one capture
        // serves as both verification evidence and the next baseline.
        let mut baseline: Option<ContentSnapshot> = None;

        let stop = loop {
            if self.cancelled() {
                break StopReason::Cancelled;
            }
            if state.limit_reached() {
                break StopReason::LimitReached;
            }

            state.phase = Phase::Capture;
            let pre = match baseline.take() {
                Some(snapshot) => snapshot,
                None => match capture_snapshot(self.device, self.analyzer) {
                    Ok((_, snapshot)) => snapshot,
                    Err(err) => {
                        warn!(err = %err, "baseline capture failed");
                        let record = noop_failure(classify(&err));
                        self.log_record(&record, &ContentSnapshot::empty_now(), None, None)?;
                        audit.push(record.clone());
                        state.record(record);
                        match self.maybe_recover(&mut state, &mut audit)? {
                            RecoveryStatus::NotNeeded => continue,
                            RecoveryStatus::Recovered(post) => {
                                baseline = post;
                                continue;
                            }
                            RecoveryStatus::Stuck => {
                                break StopReason::Stuck {
                                    recovery_attempts: state.recovery_attempts,
                                };
                            }
                        }
                    }
                },
            };

            if pre.is_end_of_stack(&self.verifier.end_of_stack_markers) {
                info!("end of stack reached");
                break StopReason::StackExhausted;
            }

            let pre = self.gather_profile_content(pre);

            state.phase = Phase::Decide;
            let action = match decide(&pre, &self.decision) {
                Decision::Unreadable => {
                    warn!(summary = %pre.summary(), "unreadable snapshot");
                    let record = noop_failure(AttemptOutcome::ExecutionFailed);
                    self.log_record(&record, &pre, None, None)?;
                    audit.push(record.clone());
                    state.record(record);
                    match self.maybe_recover(&mut state, &mut audit)? {
                        RecoveryStatus::NotNeeded => continue,
                        RecoveryStatus::Recovered(post) => {
                            baseline = post;
                            continue;
                        }
                        RecoveryStatus::Stuck => {
                            break StopReason::Stuck {
                                recovery_attempts: state.recovery_attempts,
                            };
                        }
                    }
                }
                Decision::Dislike { reason } => {
                    info!(summary = %pre.summary(), reason, "disliking");
                    IntendedAction::Dislike
                }
                Decision::Like { comment_style } => self.like_action(&pre, comment_style),
            };

            state.phase = Phase::Execute;
            let report = run_attempt(&self.attempt_deps(), &pre, &action);
            self.log_report(&pre, &report)?;
            for trace in &report.traces {
                audit.push(trace.record.clone());
                state.record(trace.record.clone());
            }
            self.record_comment(&pre, &action, report.outcome)?;

            if report.outcome == AttemptOutcome::Verified {
                state.phase = Phase::Advance;
                state.profiles_processed += 1;
                match action.kind() {
                    ActionKind::Like => likes += 1,
                    ActionKind::Comment => comments += 1,
                    ActionKind::Dislike => dislikes += 1,
                    ActionKind::RecoverySwipe | ActionKind::Noop => {}
                }
                baseline = report.final_post;
                continue;
            }

            baseline = report.final_post;
            match self.maybe_recover(&mut state, &mut audit)? {
                RecoveryStatus::NotNeeded => {}
                RecoveryStatus::Recovered(post) => baseline = post,
                RecoveryStatus::Stuck => {
                    break StopReason::Stuck {
                        recovery_attempts: state.recovery_attempts,
                    };
                }
            }
        };

        state.phase = Phase::Terminate;
        info!(
            profiles = state.profiles_processed,
            likes, comments, dislikes, stop = ?stop, "run finished"
        );
        Ok(SessionOutcome {
            profiles_processed: state.profiles_processed,
            likes_sent: likes,
            comments_sent: comments,
            dislikes_sent: dislikes,
            stop,
            records: audit,
        })
    }

    fn cancelled(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn attempt_deps(&self) -> AttemptDeps<'_, D, A> {
        AttemptDeps {
            device: self.device,
            analyzer: self.analyzer,
            gestures: &self.gestures,
            verifier: &self.verifier,
            settle_delay: self.config.settle_delay,
            retry_budget: self.config.retry_budget,
        }
    }

    /// Scroll through the profile a bounded number of times, folding newly
    /// revealed content into the decision snapshot. Gathering stops early
    /// when a pass reveals nothing new; errors are not fatal, deciding on
    /// partial content beats not deciding at all.
    fn gather_profile_content(&self, mut pre: ContentSnapshot) -> ContentSnapshot {
        for _ in 0..self.config.gather_passes {
            if let Err(err) = self.gestures.gather_scroll(self.device) {
                warn!(err = %err, "gather scroll failed");
                break;
            }
            match capture_snapshot(self.device, self.analyzer) {
                Ok((_, fresh)) => {
                    if fresh.is_transitional() || !pre.merge_scrolled(fresh) {
                        break;
                    }
                }
                Err(err) => {
                    warn!(err = %err, "gather capture failed");
                    break;
                }
            }
        }
        pre
    }

    /// Turn a like decision into an action, falling back to a plain like when
    /// comment generation fails.
    fn like_action(&self, pre: &ContentSnapshot, comment_style: Option<String>) -> IntendedAction {
        let Some(style) = comment_style else {
            info!(summary = %pre.summary(), "liking");
            return IntendedAction::Like;
        };
        match self.generator.generate(pre, &style) {
            Ok(text) => {
                info!(summary = %pre.summary(), style, "liking with comment");
                IntendedAction::Comment { text, style }
            }
            Err(err) => {
                warn!(err = %err, "comment generation failed, liking without comment");
                IntendedAction::Like
            }
        }
    }

    /// Run recovery if the failure streak warrants it. Returns `Stuck` once
    /// the ceiling is exhausted.
    fn maybe_recover(
        &mut self,
        state: &mut RunState,
        audit: &mut Vec<AttemptRecord>,
    ) -> Result<RecoveryStatus> {
        if state.consecutive_failures < self.config.failure_threshold {
            return Ok(RecoveryStatus::NotNeeded);
        }
        if self.cancelled() {
            return Ok(RecoveryStatus::NotNeeded);
        }
        if state.recovery_attempts >= self.config.recovery_ceiling {
            warn!(
                attempts = state.recovery_attempts,
                "recovery ceiling exhausted"
            );
            return Ok(RecoveryStatus::Stuck);
        }

        state.phase = Phase::Recover;
        state.recovery_attempts += 1;
        state.recoveries_since_verified += 1;
        let window: Vec<&AttemptRecord> = state.window().collect();
        let plan = self.recovery.plan(&window, state.recoveries_since_verified);
        info!(?plan, attempt = state.recovery_attempts, "recovering");

        let action = match plan {
            RecoveryPlan::NeutralProbe => IntendedAction::RecoverySwipe,
            RecoveryPlan::SettleAndRecapture => {
                if !self.config.recovery_settle.is_zero() {
                    thread::sleep(self.config.recovery_settle);
                }
                IntendedAction::Noop
            }
            RecoveryPlan::ResetToTop => {
                if let Err(err) = self.gestures.reset_to_top(self.device) {
                    warn!(err = %err, "reset gesture failed");
                }
                // The reset invalidates the window; the next capture is a
                // fresh baseline.
                state.clear_window();
                IntendedAction::Noop
            }
        };

        // Run the recovery action through the normal attempt machinery so it
        // lands in the audit trail and resets the failure streak on success.
        let baseline = ContentSnapshot::empty_now();
        let report = run_attempt(
            &AttemptDeps {
                retry_budget: 0,
                ..self.attempt_deps()
            },
            &baseline,
            &action,
        );
        self.log_report(&baseline, &report)?;
        for trace in &report.traces {
            audit.push(trace.record.clone());
            state.record(trace.record.clone());
        }
        Ok(RecoveryStatus::Recovered(report.final_post))
    }

    fn record_comment(
        &self,
        pre: &ContentSnapshot,
        action: &IntendedAction,
        outcome: AttemptOutcome,
    ) -> Result<()> {
        let IntendedAction::Comment { text, style } = action else {
            return Ok(());
        };
        let Some(store) = &self.comment_store else {
            return Ok(());
        };
        store.append(&CommentEntry {
            snapshot_summary: pre.summary(),
            comment: text.clone(),
            style: style.clone(),
            outcome,
            at_ms: now_ms(),
        })
    }

    fn log_report(&mut self, pre: &ContentSnapshot, report: &AttemptReport) -> Result<()> {
        for trace in &report.traces {
            self.log_record(&trace.record, pre, trace.post.as_ref(), trace.raw.as_ref())?;
        }
        Ok(())
    }

    fn log_record(
        &mut self,
        record: &AttemptRecord,
        pre: &ContentSnapshot,
        post: Option<&ContentSnapshot>,
        raw: Option<&RawCapture>,
    ) -> Result<()> {
        if let Some(logger) = &mut self.logger {
            logger.write(record, pre, post, raw.map(|r| r.0.as_slice()))?;
        }
        Ok(())
    }
}

enum RecoveryStatus {
    /// The failure streak is below the threshold; keep going as-is.
    NotNeeded,
    /// A recovery ran; its capture (if any) replaces the baseline.
    Recovered(Option<ContentSnapshot>),
    Stuck,
}

fn noop_failure(outcome: AttemptOutcome) -> AttemptRecord {
    AttemptRecord {
        action: ActionKind::Noop,
        outcome,
        pre_summary: "<no snapshot>".to_string(),
        post_summary: None,
        at_ms: now_ms(),
    }
}
