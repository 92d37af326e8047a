//! Test-only helpers: snapshot builders and scripted collaborator doubles.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::core::snapshot::ContentSnapshot;
use crate::io::analyzer::Analyzer;
use crate::io::device::{DeviceControl, RawCapture};
use crate::io::generator::CommentGenerator;
use crate::io::process::OperationTimedOut;

/// Create a deterministic profile snapshot.
pub fn profile_snapshot(name: &str, texts: &[&str], media: &[&str]) -> ContentSnapshot {
    let mut snapshot = ContentSnapshot::empty_now();
    if !name.is_empty() {
        snapshot
            .identity
            .insert("name".to_string(), name.to_string());
    }
    snapshot.body_text = texts.iter().map(|t| (*t).to_string()).collect();
    snapshot.media = media.iter().map(|m| (*m).to_string()).collect();
    snapshot
}

/// One scripted collaborator response.
#[derive(Debug, Clone)]
pub enum Scripted<T> {
    Ok(T),
    Fail(String),
    Timeout,
}

impl<T> Scripted<T> {
    fn resolve(self, operation: &str) -> Result<T> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Fail(message) => Err(anyhow!("{message}")),
            Self::Timeout => Err(anyhow::Error::new(OperationTimedOut {
                operation: operation.to_string(),
                timeout: Duration::from_secs(1),
            })),
        }
    }
}

/// A recorded device interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Tap { x: u32, y: u32 },
    Swipe { x1: u32, y1: u32, x2: u32, y2: u32 },
    Text(String),
    KeyBack,
}

/// Device double that records gestures and replays scripted captures.
/// When the capture script runs out it keeps returning a placeholder capture.
pub struct ScriptedDevice {
    resolution: (u32, u32),
    captures: Mutex<VecDeque<Scripted<Vec<u8>>>>,
    events: Mutex<Vec<DeviceEvent>>,
}

impl ScriptedDevice {
    pub fn new(resolution: (u32, u32)) -> Self {
        Self {
            resolution,
            captures: Mutex::new(VecDeque::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn push_capture(&self, capture: Scripted<Vec<u8>>) {
        self.captures.lock().expect("captures lock").push_back(capture);
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.events.lock().expect("events lock").clone()
    }

    fn record(&self, event: DeviceEvent) {
        self.events.lock().expect("events lock").push(event);
    }
}

impl DeviceControl for ScriptedDevice {
    fn capture(&self) -> Result<RawCapture> {
        let scripted = self.captures.lock().expect("captures lock").pop_front();
        match scripted {
            Some(scripted) => scripted.resolve("screen capture").map(RawCapture),
            None => Ok(RawCapture(vec![0x89])),
        }
    }

    fn tap(&self, x: u32, y: u32) -> Result<()> {
        self.record(DeviceEvent::Tap { x, y });
        Ok(())
    }

    fn swipe(&self, x1: u32, y1: u32, x2: u32, y2: u32, _duration_ms: u32) -> Result<()> {
        self.record(DeviceEvent::Swipe { x1, y1, x2, y2 });
        Ok(())
    }

    fn input_text(&self, text: &str) -> Result<()> {
        self.record(DeviceEvent::Text(text.to_string()));
        Ok(())
    }

    fn key_back(&self) -> Result<()> {
        self.record(DeviceEvent::KeyBack);
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }
}

/// Analyzer double that replays scripted snapshots in order.
pub struct ScriptedAnalyzer {
    snapshots: Mutex<VecDeque<Scripted<ContentSnapshot>>>,
}

impl ScriptedAnalyzer {
    pub fn new(snapshots: Vec<Scripted<ContentSnapshot>>) -> Self {
        Self {
            snapshots: Mutex::new(snapshots.into()),
        }
    }

    pub fn push(&self, snapshot: Scripted<ContentSnapshot>) {
        self.snapshots
            .lock()
            .expect("snapshots lock")
            .push_back(snapshot);
    }

    pub fn remaining(&self) -> usize {
        self.snapshots.lock().expect("snapshots lock").len()
    }
}

impl Analyzer for ScriptedAnalyzer {
    fn analyze(&self, _capture: &RawCapture) -> Result<ContentSnapshot> {
        let scripted = self.snapshots.lock().expect("snapshots lock").pop_front();
        match scripted {
            Some(scripted) => scripted.resolve("analysis oracle"),
            None => Err(anyhow!("analyzer script exhausted")),
        }
    }
}

/// Generator double that replays scripted comments in order.
pub struct ScriptedGenerator {
    comments: Mutex<VecDeque<Scripted<String>>>,
}

impl ScriptedGenerator {
    pub fn new(comments: Vec<Scripted<String>>) -> Self {
        Self {
            comments: Mutex::new(comments.into()),
        }
    }
}

impl CommentGenerator for ScriptedGenerator {
    fn generate(&self, _snapshot: &ContentSnapshot, _style: &str) -> Result<String> {
        let scripted = self.comments.lock().expect("comments lock").pop_front();
        match scripted {
            Some(scripted) => scripted.resolve("comment oracle"),
            None => Err(anyhow!("generator script exhausted")),
        }
    }
}
