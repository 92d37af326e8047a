//! Translation of intended actions into device gestures.
//!
//! Targets come from oracle-detected regions when confident enough, falling
//! back to configured fractional coordinates. All coordinates here are
//! fractions of the screen; conversion to pixels happens at dispatch time.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::core::action::IntendedAction;
use crate::core::snapshot::ContentSnapshot;
use crate::io::device::DeviceControl;

/// A screen point in fractional coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointFraction {
    pub x: f64,
    pub y: f64,
}

/// A swipe in fractional coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwipeFraction {
    pub from: PointFraction,
    pub to: PointFraction,
    pub duration_ms: u32,
}

/// Fallback targets and tuning for gesture dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Detected regions below this confidence are ignored in favor of the
    /// fallback coordinates.
    pub region_confidence_cutoff: f64,
    pub like_fallback: PointFraction,
    pub dislike_fallback: PointFraction,
    pub comment_field_fallback: PointFraction,
    pub send_fallback: PointFraction,
    /// Small scroll that must not change the current profile.
    pub probe_swipe: SwipeFraction,
    /// Scroll that reveals more profile content while gathering.
    pub gather_swipe: SwipeFraction,
    /// Downward pull used after a reset to return to the top of the profile.
    pub reset_swipe: SwipeFraction,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            region_confidence_cutoff: 0.5,
            like_fallback: PointFraction { x: 0.85, y: 0.8 },
            dislike_fallback: PointFraction { x: 0.15, y: 0.85 },
            comment_field_fallback: PointFraction { x: 0.5, y: 0.65 },
            send_fallback: PointFraction { x: 0.75, y: 0.82 },
            probe_swipe: SwipeFraction {
                from: PointFraction { x: 0.5, y: 0.6 },
                to: PointFraction { x: 0.5, y: 0.45 },
                duration_ms: 200,
            },
            gather_swipe: SwipeFraction {
                from: PointFraction { x: 0.5, y: 0.75 },
                to: PointFraction { x: 0.5, y: 0.3 },
                duration_ms: 250,
            },
            reset_swipe: SwipeFraction {
                from: PointFraction { x: 0.5, y: 0.3 },
                to: PointFraction { x: 0.5, y: 0.85 },
                duration_ms: 300,
            },
        }
    }
}

/// Dispatches intended actions as taps and swipes.
#[derive(Debug, Clone, Default)]
pub struct Gestures {
    pub config: GestureConfig,
}

impl Gestures {
    pub fn new(config: GestureConfig) -> Self {
        Self { config }
    }

    /// Execute the action against the device, using regions from `snapshot`
    /// where available.
    #[instrument(skip_all, fields(action = ?action.kind()))]
    pub fn execute<D: DeviceControl + ?Sized>(
        &self,
        device: &D,
        action: &IntendedAction,
        snapshot: &ContentSnapshot,
    ) -> Result<()> {
        match action {
            IntendedAction::Like => {
                let target = self.target(snapshot, "like_button", self.config.like_fallback);
                tap_fraction(device, target).context("like tap")
            }
            IntendedAction::Dislike => {
                let target = self.target(snapshot, "dislike_button", self.config.dislike_fallback);
                tap_fraction(device, target).context("dislike tap")
            }
            IntendedAction::Comment { text, .. } => self.execute_comment(device, snapshot, text),
            IntendedAction::RecoverySwipe => {
                swipe_fraction(device, self.config.probe_swipe).context("probe swipe")
            }
            IntendedAction::Noop => Ok(()),
        }
    }

    /// Open the composer, type the comment, dismiss the keyboard, send.
    fn execute_comment<D: DeviceControl + ?Sized>(
        &self,
        device: &D,
        snapshot: &ContentSnapshot,
        text: &str,
    ) -> Result<()> {
        if text.is_empty() {
            return Err(anyhow!("refusing to send an empty comment"));
        }
        let field = self.target(snapshot, "comment_field", self.config.comment_field_fallback);
        tap_fraction(device, field).context("open composer")?;
        device.input_text(text).context("type comment")?;
        // Dismiss the keyboard so the send button is reachable.
        device.key_back().context("dismiss keyboard")?;
        let send = self.target(snapshot, "send_button", self.config.send_fallback);
        tap_fraction(device, send).context("send tap")
    }

    /// Scroll down one step to reveal more of the profile.
    pub fn gather_scroll<D: DeviceControl + ?Sized>(&self, device: &D) -> Result<()> {
        swipe_fraction(device, self.config.gather_swipe).context("gather scroll")
    }

    /// Back out of any overlay, then pull back to the top of the profile.
    pub fn reset_to_top<D: DeviceControl + ?Sized>(&self, device: &D) -> Result<()> {
        device.key_back().context("back out of overlay")?;
        swipe_fraction(device, self.config.reset_swipe).context("pull to top")
    }

    fn target(
        &self,
        snapshot: &ContentSnapshot,
        region: &str,
        fallback: PointFraction,
    ) -> PointFraction {
        match snapshot.regions.get(region) {
            Some(r) if r.confidence >= self.config.region_confidence_cutoff => {
                debug!(region, x = r.x, y = r.y, "using detected region");
                PointFraction { x: r.x, y: r.y }
            }
            Some(r) => {
                warn!(
                    region,
                    confidence = r.confidence,
                    "region below confidence cutoff, using fallback"
                );
                fallback
            }
            None => fallback,
        }
    }
}

fn tap_fraction<D: DeviceControl + ?Sized>(device: &D, point: PointFraction) -> Result<()> {
    let (x, y) = to_pixels(device.resolution(), point);
    device.tap(x, y)
}

fn swipe_fraction<D: DeviceControl + ?Sized>(device: &D, swipe: SwipeFraction) -> Result<()> {
    let (x1, y1) = to_pixels(device.resolution(), swipe.from);
    let (x2, y2) = to_pixels(device.resolution(), swipe.to);
    device.swipe(x1, y1, x2, y2, swipe.duration_ms)
}

fn to_pixels((width, height): (u32, u32), point: PointFraction) -> (u32, u32) {
    let clamp = |v: f64| v.clamp(0.0, 1.0);
    (
        (clamp(point.x) * f64::from(width)) as u32,
        (clamp(point.y) * f64::from(height)) as u32,
    )
}
