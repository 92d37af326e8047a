//! Verified swipe automation runner.
//!
//! Drives one device through a bounded capture → decide → act → verify loop,
//! writing per-attempt artifacts under the output directory and a JSON run
//! summary to stdout.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use swipe_runner::core::recovery::RecoveryController;
use swipe_runner::core::verify::Verifier;
use swipe_runner::exit_codes;
use swipe_runner::io::analyzer::OracleAnalyzer;
use swipe_runner::io::attempt_log::AttemptLogger;
use swipe_runner::io::comment_store::CommentStore;
use swipe_runner::io::config::{RunnerConfig, load_config};
use swipe_runner::io::device::AdbDevice;
use swipe_runner::io::generator::OracleGenerator;
use swipe_runner::io::gestures::Gestures;
use swipe_runner::logging;
use swipe_runner::session::{Session, SessionConfig, SessionOutcome, StopReason};

#[derive(Parser)]
#[command(name = "swipe-runner", version, about = "Verified swipe automation runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the swipe loop against a connected device.
    Run {
        /// Number of profiles to process before stopping (must be positive).
        #[arg(short, long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
        profiles: u32,
        /// Decision preset name from the config.
        #[arg(long, default_value = "balanced")]
        preset: String,
        /// Device serial (defaults to the only connected device).
        #[arg(long)]
        device: Option<String>,
        /// Output directory for attempt artifacts and the comment store.
        #[arg(long, default_value = "out")]
        out: PathBuf,
        /// Config file path.
        #[arg(long, default_value = "swipe-runner.toml")]
        config: PathBuf,
        /// Keep raw screen captures alongside attempt artifacts.
        #[arg(long)]
        keep_captures: bool,
        /// Log at info level by default instead of warn.
        #[arg(short, long)]
        verbose: bool,
    },
    /// List the decision presets available in the config.
    Presets {
        /// Config file path.
        #[arg(long, default_value = "swipe-runner.toml")]
        config: PathBuf,
    },
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            profiles,
            preset,
            device,
            out,
            config,
            keep_captures,
            verbose,
        } => {
            logging::init(verbose);
            cmd_run(profiles, &preset, device, out, &config, keep_captures)
        }
        Command::Presets { config } => {
            logging::init(false);
            cmd_presets(&config)
        }
    }
}

fn cmd_run(
    profiles: u32,
    preset: &str,
    serial: Option<String>,
    out: PathBuf,
    config_path: &std::path::Path,
    keep_captures: bool,
) -> Result<i32> {
    let config = load_config(config_path)
        .with_context(|| format!("load config {}", config_path.display()))?;
    let decision = config.preset(preset)?.to_decision_config();

    let command_timeout = Duration::from_secs(config.command_timeout_secs);
    let device = AdbDevice::connect(serial, command_timeout, config.output_limit_bytes)
        .context("connect to device")?;
    device
        .launch_app(&config.app_package)
        .with_context(|| format!("launch {}", config.app_package))?;

    let oracle_timeout = Duration::from_secs(config.oracle_timeout_secs);
    let analyzer = OracleAnalyzer {
        command: config.analyzer_command.clone(),
        timeout: oracle_timeout,
        output_limit_bytes: config.output_limit_bytes,
    };
    let generator = OracleGenerator {
        command: config.generator_command.clone(),
        timeout: oracle_timeout,
        output_limit_bytes: config.output_limit_bytes,
    };

    let mut session = Session {
        device: &device,
        analyzer: &analyzer,
        generator: &generator,
        gestures: Gestures::new(config.gestures.clone()),
        verifier: Verifier {
            text_similarity_cutoff: config.text_similarity_cutoff,
            end_of_stack_markers: config.end_of_stack_markers.clone(),
        },
        recovery: RecoveryController,
        decision,
        config: SessionConfig {
            profiles_limit: profiles,
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            recovery_settle: Duration::from_millis(config.recovery_settle_ms),
            retry_budget: config.retry_budget,
            gather_passes: config.gather_passes,
            failure_threshold: config.failure_threshold,
            recovery_ceiling: config.recovery_ceiling,
            history_window: config.history_window,
        },
        comment_store: Some(CommentStore::new(out.join("comments.jsonl"))),
        logger: Some(AttemptLogger::new(out.clone(), keep_captures)),
        stop: Arc::new(AtomicBool::new(false)),
    };

    let outcome = session.run()?;
    print_summary(&outcome)?;
    Ok(stop_exit_code(&outcome))
}

fn cmd_presets(config_path: &std::path::Path) -> Result<i32> {
    let config: RunnerConfig = load_config(config_path)
        .with_context(|| format!("load config {}", config_path.display()))?;
    for (name, preset) in &config.presets {
        println!(
            "{name}: like_threshold={} comment_probability={} styles=[{}]",
            preset.like_threshold,
            preset.comment_probability,
            preset
                .style_weights
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(exit_codes::OK)
}

fn print_summary(outcome: &SessionOutcome) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(outcome).context("serialize summary")?;
    payload.push('\n');
    print!("{payload}");
    Ok(())
}

fn stop_exit_code(outcome: &SessionOutcome) -> i32 {
    match &outcome.stop {
        StopReason::LimitReached | StopReason::Cancelled => exit_codes::OK,
        StopReason::StackExhausted => exit_codes::EXHAUSTED,
        StopReason::Stuck { .. } => {
            // Surface the tail of the audit trail for diagnosis.
            for record in outcome.records.iter().rev().take(5).rev() {
                eprintln!(
                    "{:?} {:?} pre={}",
                    record.action, record.outcome, record.pre_summary
                );
            }
            exit_codes::STUCK
        }
    }
}
