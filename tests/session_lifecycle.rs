//! Session-level tests for full run lifecycle scenarios.
//!
//! These tests drive `Session::run` with scripted collaborators to verify
//! end-to-end behavior: verified advancement, retry and recovery escalation,
//! comment handling, and loop termination.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use swipe_runner::core::action::{ActionKind, AttemptOutcome};
use swipe_runner::core::policy::DecisionConfig;
use swipe_runner::core::recovery::RecoveryController;
use swipe_runner::core::snapshot::{ContentSnapshot, ProfileSignals};
use swipe_runner::core::verify::Verifier;
use swipe_runner::io::attempt_log::AttemptLogger;
use swipe_runner::io::comment_store::CommentStore;
use swipe_runner::io::gestures::Gestures;
use swipe_runner::session::{Session, SessionConfig, StopReason};
use swipe_runner::test_support::{
    DeviceEvent, Scripted, ScriptedAnalyzer, ScriptedDevice, ScriptedGenerator, profile_snapshot,
};

fn strong_profile(name: &str, text: &str, media: &str) -> ContentSnapshot {
    let mut snapshot = profile_snapshot(name, &[text], &[media]);
    snapshot.signals = ProfileSignals {
        quality: 8,
        conversation_potential: 7,
        red_flags: Vec::new(),
        positive_indicators: Vec::new(),
    };
    snapshot
}

fn session_config(profiles_limit: u32) -> SessionConfig {
    SessionConfig {
        profiles_limit,
        settle_delay: Duration::ZERO,
        recovery_settle: Duration::ZERO,
        retry_budget: 2,
        gather_passes: 0,
        failure_threshold: 3,
        recovery_ceiling: 5,
        history_window: 4,
    }
}

fn decision(like_threshold: f64, comment_probability: f64) -> DecisionConfig {
    DecisionConfig {
        like_threshold,
        comment_probability,
        style_weights: BTreeMap::from([("playful".to_string(), 1.0)]),
        min_detailed_text_len: 200,
    }
}

fn session<'a>(
    device: &'a ScriptedDevice,
    analyzer: &'a ScriptedAnalyzer,
    generator: &'a ScriptedGenerator,
    decision: DecisionConfig,
    config: SessionConfig,
) -> Session<'a, ScriptedDevice, ScriptedAnalyzer, ScriptedGenerator> {
    Session {
        device,
        analyzer,
        generator,
        gestures: Gestures::default(),
        verifier: Verifier::default(),
        recovery: RecoveryController,
        decision,
        config,
        comment_store: None,
        logger: None,
        stop: Arc::new(AtomicBool::new(false)),
    }
}

/// A strong profile is liked, the post capture shows a different profile, and
/// the processed count advances to the limit.
#[test]
fn verified_like_advances_to_the_limit() {
    let device = ScriptedDevice::new((1080, 2340));
    let analyzer = ScriptedAnalyzer::new(vec![
        Scripted::Ok(strong_profile("Jess", "loves hiking", "m1")),
        Scripted::Ok(strong_profile("Morgan", "dog lover", "m2")),
    ]);
    let generator = ScriptedGenerator::new(Vec::new());

    let mut session = session(
        &device,
        &analyzer,
        &generator,
        decision(0.55, 0.0),
        session_config(1),
    );
    let outcome = session.run().expect("run");

    assert_eq!(outcome.stop, StopReason::LimitReached);
    assert_eq!(outcome.profiles_processed, 1);
    assert_eq!(outcome.likes_sent, 1);
    assert_eq!(outcome.comments_sent, 0);
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].outcome, AttemptOutcome::Verified);
    assert_eq!(analyzer.remaining(), 0);
}

/// The end-of-stack sentinel stops the run before any further action.
#[test]
fn sentinel_stops_the_run() {
    let device = ScriptedDevice::new((1080, 2340));
    let analyzer = ScriptedAnalyzer::new(vec![Scripted::Ok(profile_snapshot(
        "",
        &["You've seen everyone for now"],
        &[],
    ))]);
    let generator = ScriptedGenerator::new(Vec::new());

    let mut session = session(
        &device,
        &analyzer,
        &generator,
        decision(0.55, 0.0),
        session_config(10),
    );
    let outcome = session.run().expect("run");

    assert_eq!(outcome.stop, StopReason::StackExhausted);
    assert_eq!(outcome.profiles_processed, 0);
    assert!(outcome.records.is_empty());
    assert!(device.events().is_empty());
}

/// Three mismatched dislikes in a row trigger the neutral-probe strategy,
/// after which the run resumes and finishes normally.
#[test]
fn repeated_mismatch_recovers_with_probe() {
    let device = ScriptedDevice::new((1080, 2340));
    let same = profile_snapshot("Jess", &["loves hiking"], &["m1"]);
    let analyzer = ScriptedAnalyzer::new(vec![
        Scripted::Ok(same.clone()),
        // Three tries, all showing the unchanged profile.
        Scripted::Ok(same.clone()),
        Scripted::Ok(same.clone()),
        Scripted::Ok(same.clone()),
        // Probe capture, then the dislike finally lands.
        Scripted::Ok(same.clone()),
        Scripted::Ok(profile_snapshot("Morgan", &["dog lover"], &["m2"])),
    ]);
    let generator = ScriptedGenerator::new(Vec::new());

    // like_threshold 1.0 forces a dislike on every profile.
    let mut session = session(
        &device,
        &analyzer,
        &generator,
        decision(1.0, 0.0),
        session_config(1),
    );
    let outcome = session.run().expect("run");

    assert_eq!(outcome.stop, StopReason::LimitReached);
    assert_eq!(outcome.profiles_processed, 1);
    assert_eq!(outcome.dislikes_sent, 1);

    let mismatches = outcome
        .records
        .iter()
        .filter(|r| r.outcome == AttemptOutcome::Mismatched)
        .count();
    assert_eq!(mismatches, 3);
    assert!(
        outcome
            .records
            .iter()
            .any(|r| r.action == ActionKind::RecoverySwipe
                && r.outcome == AttemptOutcome::Verified)
    );
    // Exactly one swipe: the probe. Everything else is a tap.
    let swipes = device
        .events()
        .iter()
        .filter(|e| matches!(e, DeviceEvent::Swipe { .. }))
        .count();
    assert_eq!(swipes, 1);
    assert_eq!(analyzer.remaining(), 0);
}

/// Two capture timeouts in a row pick the settle-and-recapture strategy,
/// which performs no gesture at all.
#[test]
fn repeated_timeouts_recover_by_settling() {
    let device = ScriptedDevice::new((1080, 2340));
    let analyzer = ScriptedAnalyzer::new(vec![
        Scripted::Ok(profile_snapshot("Jess", &["loves hiking"], &["m1"])),
        Scripted::Timeout,
        Scripted::Ok(profile_snapshot("Jess", &["loves hiking"], &["m1"])),
        Scripted::Timeout,
        // Settle recovery recaptures without a gesture.
        Scripted::Ok(profile_snapshot("Morgan", &["dog lover"], &["m2"])),
        Scripted::Ok(profile_snapshot("", &["You've seen everyone for now"], &[])),
    ]);
    let generator = ScriptedGenerator::new(Vec::new());

    let mut session = session(
        &device,
        &analyzer,
        &generator,
        decision(1.0, 0.0),
        SessionConfig {
            retry_budget: 0,
            failure_threshold: 2,
            ..session_config(5)
        },
    );
    let outcome = session.run().expect("run");

    assert_eq!(outcome.profiles_processed, 1);
    let timeouts = outcome
        .records
        .iter()
        .filter(|r| r.outcome == AttemptOutcome::Timeout)
        .count();
    assert_eq!(timeouts, 2);
    assert!(
        outcome
            .records
            .iter()
            .any(|r| r.action == ActionKind::Noop && r.outcome == AttemptOutcome::Verified)
    );
    // Settle strategy performs no probe swipe and no reset.
    assert!(
        !device
            .events()
            .iter()
            .any(|e| matches!(e, DeviceEvent::Swipe { .. } | DeviceEvent::KeyBack))
    );
    assert_eq!(analyzer.remaining(), 0);
}

/// A second recovery without verified progress escalates to reset-to-top, and
/// the recovery ceiling eventually ends the run as stuck.
#[test]
fn unrecoverable_mismatch_escalates_then_sticks() {
    let device = ScriptedDevice::new((1080, 2340));
    let same = profile_snapshot("Jess", &["loves hiking"], &["m1"]);
    // The profile never changes no matter what the runner does.
    let analyzer = ScriptedAnalyzer::new(vec![Scripted::Ok(same.clone()); 16]);
    let generator = ScriptedGenerator::new(Vec::new());

    let mut session = session(
        &device,
        &analyzer,
        &generator,
        decision(1.0, 0.0),
        SessionConfig {
            retry_budget: 0,
            failure_threshold: 1,
            recovery_ceiling: 2,
            ..session_config(5)
        },
    );
    let outcome = session.run().expect("run");

    assert_eq!(
        outcome.stop,
        StopReason::Stuck {
            recovery_attempts: 2
        }
    );
    assert_eq!(outcome.profiles_processed, 0);
    // The second recovery escalated to a reset: back key plus pull-down swipe.
    assert!(
        device
            .events()
            .iter()
            .any(|e| matches!(e, DeviceEvent::KeyBack))
    );
}

/// Comment flow: generation, two-stage verification, and the comment store.
#[test]
fn verified_comment_lands_in_the_store() {
    let temp = tempfile::tempdir().expect("tempdir");
    let device = ScriptedDevice::new((1080, 2340));
    let pre = strong_profile("Jess", "loves hiking", "m1");
    let analyzer = ScriptedAnalyzer::new(vec![
        Scripted::Ok(pre.clone()),
        // Stage one: composer closed, same profile. Stage two: advanced.
        Scripted::Ok(pre.clone()),
        Scripted::Ok(strong_profile("Morgan", "dog lover", "m2")),
    ]);
    let generator = ScriptedGenerator::new(vec![Scripted::Ok("love that trail".to_string())]);
    let store = CommentStore::new(temp.path().join("comments.jsonl"));

    let mut session = session(
        &device,
        &analyzer,
        &generator,
        decision(0.55, 1.0),
        session_config(1),
    );
    session.comment_store = Some(store.clone());
    let outcome = session.run().expect("run");

    assert_eq!(outcome.stop, StopReason::LimitReached);
    assert_eq!(outcome.comments_sent, 1);
    assert_eq!(outcome.likes_sent, 0);
    assert!(
        device
            .events()
            .iter()
            .any(|e| *e == DeviceEvent::Text("love that trail".to_string()))
    );
    let rates = store.success_rates().expect("rates");
    assert_eq!(rates["playful"], 1.0);
}

/// With capture persistence on, each attempt's raw screenshot lands next to
/// its metadata.
#[test]
fn keep_captures_writes_raw_screenshots() {
    let temp = tempfile::tempdir().expect("tempdir");
    let device = ScriptedDevice::new((1080, 2340));
    let analyzer = ScriptedAnalyzer::new(vec![
        Scripted::Ok(strong_profile("Jess", "loves hiking", "m1")),
        Scripted::Ok(strong_profile("Morgan", "dog lover", "m2")),
    ]);
    let generator = ScriptedGenerator::new(Vec::new());

    let mut session = session(
        &device,
        &analyzer,
        &generator,
        decision(0.55, 0.0),
        session_config(1),
    );
    session.logger = Some(AttemptLogger::new(temp.path().to_path_buf(), true));
    let outcome = session.run().expect("run");

    assert_eq!(outcome.stop, StopReason::LimitReached);
    assert!(temp.path().join("attempts/0/meta.json").is_file());
    assert!(temp.path().join("attempts/0/raw.png").is_file());
}

/// Scrolling gathers more of the profile before deciding, stopping early once
/// a pass reveals nothing new.
#[test]
fn gather_merges_scrolled_content_before_deciding() {
    let device = ScriptedDevice::new((1080, 2340));
    let scrolled = strong_profile("Jess", "weekend climber", "m2");
    let analyzer = ScriptedAnalyzer::new(vec![
        Scripted::Ok(strong_profile("Jess", "coffee snob", "m1")),
        Scripted::Ok(scrolled.clone()),
        // Nothing new on the second pass, so gathering stops.
        Scripted::Ok(scrolled),
        Scripted::Ok(strong_profile("Morgan", "dog lover", "m3")),
    ]);
    let generator = ScriptedGenerator::new(Vec::new());

    let mut session = session(
        &device,
        &analyzer,
        &generator,
        decision(0.55, 0.0),
        SessionConfig {
            gather_passes: 3,
            ..session_config(1)
        },
    );
    let outcome = session.run().expect("run");

    assert_eq!(outcome.stop, StopReason::LimitReached);
    assert_eq!(outcome.likes_sent, 1);
    // The decision and the audit record see the merged top-of-profile view.
    assert_eq!(outcome.records[0].pre_summary, "Jess: coffee snob");
    let swipes = device
        .events()
        .iter()
        .filter(|e| matches!(e, DeviceEvent::Swipe { .. }))
        .count();
    assert_eq!(swipes, 2);
    assert_eq!(analyzer.remaining(), 0);
}

/// Comment generation failure falls back to a plain like rather than failing
/// the attempt.
#[test]
fn generation_failure_falls_back_to_plain_like() {
    let device = ScriptedDevice::new((1080, 2340));
    let analyzer = ScriptedAnalyzer::new(vec![
        Scripted::Ok(strong_profile("Jess", "loves hiking", "m1")),
        Scripted::Ok(strong_profile("Morgan", "dog lover", "m2")),
    ]);
    let generator = ScriptedGenerator::new(vec![Scripted::Fail("oracle unavailable".to_string())]);

    let mut session = session(
        &device,
        &analyzer,
        &generator,
        decision(0.55, 1.0),
        session_config(1),
    );
    let outcome = session.run().expect("run");

    assert_eq!(outcome.stop, StopReason::LimitReached);
    assert_eq!(outcome.likes_sent, 1);
    assert_eq!(outcome.comments_sent, 0);
    assert!(
        !device
            .events()
            .iter()
            .any(|e| matches!(e, DeviceEvent::Text(_)))
    );
}

/// Five clean advances stop exactly at a limit of five.
#[test]
fn run_stops_exactly_at_the_profile_limit() {
    let device = ScriptedDevice::new((1080, 2340));
    let profiles = [
        ("Jess", "loves hiking trails"),
        ("Morgan", "dog park regular"),
        ("Riley", "amateur chef here"),
        ("Sam", "marathon training season"),
        ("Alex", "board game nights"),
        ("Drew", "jazz vinyl collector"),
    ];
    let scripts: Vec<Scripted<ContentSnapshot>> = profiles
        .iter()
        .enumerate()
        .map(|(i, (name, bio))| Scripted::Ok(strong_profile(name, bio, &format!("m{i}"))))
        .collect();
    let analyzer = ScriptedAnalyzer::new(scripts);
    let generator = ScriptedGenerator::new(Vec::new());

    let mut session = session(
        &device,
        &analyzer,
        &generator,
        decision(0.55, 0.0),
        session_config(5),
    );
    let outcome = session.run().expect("run");

    assert_eq!(outcome.stop, StopReason::LimitReached);
    assert_eq!(outcome.profiles_processed, 5);
    assert_eq!(outcome.likes_sent, 5);
    assert_eq!(outcome.records.len(), 5);
    assert_eq!(analyzer.remaining(), 0);
}

/// A stop request before the first capture ends the run with no actions.
#[test]
fn stop_flag_cancels_before_any_action() {
    let device = ScriptedDevice::new((1080, 2340));
    let analyzer = ScriptedAnalyzer::new(Vec::new());
    let generator = ScriptedGenerator::new(Vec::new());

    let mut session = session(
        &device,
        &analyzer,
        &generator,
        decision(0.55, 0.0),
        session_config(10),
    );
    session.stop.store(true, Ordering::Relaxed);
    let outcome = session.run().expect("run");

    assert_eq!(outcome.stop, StopReason::Cancelled);
    assert!(outcome.records.is_empty());
    assert!(device.events().is_empty());
}
