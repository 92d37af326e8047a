//! Device abstraction for screen capture and gesture input.
//!
//! The [`DeviceControl`] trait decouples the session loop from the actual
//! transport (currently `adb`). Tests use scripted devices that return
//! predetermined captures without touching hardware.

use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use regex::Regex;
use tracing::{debug, info, instrument};

use crate::io::process::run_checked;

/// Raw screen capture bytes (PNG).
#[derive(Debug, Clone)]
pub struct RawCapture(pub Vec<u8>);

/// Abstraction over the device transport.
pub trait DeviceControl {
    /// Capture the current screen.
    fn capture(&self) -> Result<RawCapture>;
    /// Tap at absolute pixel coordinates.
    fn tap(&self, x: u32, y: u32) -> Result<()>;
    /// Swipe between absolute pixel coordinates over `duration_ms`.
    fn swipe(&self, x1: u32, y1: u32, x2: u32, y2: u32, duration_ms: u32) -> Result<()>;
    /// Type text into the focused field.
    fn input_text(&self, text: &str) -> Result<()>;
    /// Press the hardware back key.
    fn key_back(&self) -> Result<()>;
    /// Screen resolution in pixels.
    fn resolution(&self) -> (u32, u32);
}

/// Device driven over `adb shell`.
pub struct AdbDevice {
    serial: Option<String>,
    width: u32,
    height: u32,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl AdbDevice {
    /// Connect to the device and read its resolution from `wm size`.
    #[instrument(skip_all, fields(serial = serial.as_deref().unwrap_or("<default>")))]
    pub fn connect(
        serial: Option<String>,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Result<Self> {
        let mut device = Self {
            serial,
            width: 0,
            height: 0,
            timeout,
            output_limit_bytes,
        };
        let out = device.shell(&["wm", "size"], "query screen size")?;
        let text = String::from_utf8_lossy(&out);
        let (width, height) = parse_wm_size(&text)
            .ok_or_else(|| anyhow!("could not parse screen size from {text:?}"))?;
        device.width = width;
        device.height = height;
        info!(width, height, "connected to device");
        Ok(device)
    }

    /// Bring the target application to the foreground.
    pub fn launch_app(&self, package: &str) -> Result<()> {
        self.shell(
            &[
                "monkey",
                "-p",
                package,
                "-c",
                "android.intent.category.LAUNCHER",
                "1",
            ],
            "launch app",
        )?;
        Ok(())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("adb");
        if let Some(serial) = &self.serial {
            cmd.arg("-s").arg(serial);
        }
        cmd
    }

    fn shell(&self, args: &[&str], operation: &str) -> Result<Vec<u8>> {
        let mut cmd = self.command();
        cmd.arg("shell").args(args);
        run_checked(cmd, operation, None, self.timeout, self.output_limit_bytes)
    }
}

impl DeviceControl for AdbDevice {
    fn capture(&self) -> Result<RawCapture> {
        let mut cmd = self.command();
        cmd.arg("exec-out").arg("screencap").arg("-p");
        let bytes = run_checked(
            cmd,
            "screen capture",
            None,
            self.timeout,
            self.output_limit_bytes,
        )?;
        if bytes.is_empty() {
            return Err(anyhow!("screen capture returned no data"));
        }
        debug!(bytes = bytes.len(), "captured screen");
        Ok(RawCapture(bytes))
    }

    fn tap(&self, x: u32, y: u32) -> Result<()> {
        let (x, y) = (x.to_string(), y.to_string());
        self.shell(&["input", "tap", &x, &y], "tap")?;
        Ok(())
    }

    fn swipe(&self, x1: u32, y1: u32, x2: u32, y2: u32, duration_ms: u32) -> Result<()> {
        let args: Vec<String> = [x1, y1, x2, y2, duration_ms]
            .iter()
            .map(ToString::to_string)
            .collect();
        let mut shell_args = vec!["input", "swipe"];
        shell_args.extend(args.iter().map(String::as_str));
        self.shell(&shell_args, "swipe")?;
        Ok(())
    }

    fn input_text(&self, text: &str) -> Result<()> {
        // `input text` treats spaces as argument separators.
        let escaped = text.replace(' ', "%s");
        self.shell(&["input", "text", &escaped], "type text")?;
        Ok(())
    }

    fn key_back(&self) -> Result<()> {
        self.shell(&["input", "keyevent", "KEYCODE_BACK"], "press back")?;
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Parse `Physical size: 1080x2340` (preferring `Override size` when present).
fn parse_wm_size(text: &str) -> Option<(u32, u32)> {
    let re = Regex::new(r"(Override|Physical) size:\s*(\d+)x(\d+)").ok()?;
    let mut physical = None;
    for caps in re.captures_iter(text) {
        let width = caps[2].parse().ok()?;
        let height = caps[3].parse().ok()?;
        if &caps[1] == "Override" {
            return Some((width, height));
        }
        physical = Some((width, height));
    }
    physical
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_physical_size() {
        assert_eq!(
            parse_wm_size("Physical size: 1080x2340\n"),
            Some((1080, 2340))
        );
    }

    #[test]
    fn override_size_wins() {
        let text = "Physical size: 1080x2340\nOverride size: 720x1560\n";
        assert_eq!(parse_wm_size(text), Some((720, 1560)));
    }

    #[test]
    fn garbage_yields_none() {
        assert_eq!(parse_wm_size("no size here"), None);
    }
}
