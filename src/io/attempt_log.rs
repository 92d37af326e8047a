//! Per-attempt logging helpers for the run output directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::action::AttemptRecord;
use crate::core::snapshot::ContentSnapshot;

#[derive(Debug, Clone)]
pub struct AttemptPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub pre_path: PathBuf,
    pub post_path: PathBuf,
    pub raw_path: PathBuf,
}

impl AttemptPaths {
    pub fn new(out_dir: &Path, seq: u32) -> Self {
        let dir = out_dir.join("attempts").join(seq.to_string());
        Self {
            dir: dir.clone(),
            meta_path: dir.join("meta.json"),
            pre_path: dir.join("pre.json"),
            post_path: dir.join("post.json"),
            raw_path: dir.join("raw.png"),
        }
    }
}

/// Writes one directory per attempt under `<out>/attempts/<seq>/`.
#[derive(Debug, Clone)]
pub struct AttemptLogger {
    out_dir: PathBuf,
    /// Also keep the raw capture for each attempt.
    keep_captures: bool,
    next_seq: u32,
}

impl AttemptLogger {
    pub fn new(out_dir: PathBuf, keep_captures: bool) -> Self {
        Self {
            out_dir,
            keep_captures,
            next_seq: 0,
        }
    }

    /// Write one attempt's artifacts and advance the sequence number.
    pub fn write(
        &mut self,
        record: &AttemptRecord,
        pre: &ContentSnapshot,
        post: Option<&ContentSnapshot>,
        raw: Option<&[u8]>,
    ) -> Result<AttemptPaths> {
        let paths = AttemptPaths::new(&self.out_dir, self.next_seq);
        self.next_seq += 1;
        fs::create_dir_all(&paths.dir)
            .with_context(|| format!("create attempt dir {}", paths.dir.display()))?;

        // Write in deterministic order to keep logs stable.
        write_json(&paths.meta_path, record)?;
        write_json(&paths.pre_path, pre)?;
        if let Some(post) = post {
            write_json(&paths.post_path, post)?;
        }
        if self.keep_captures
            && let Some(raw) = raw
        {
            fs::write(&paths.raw_path, raw)
                .with_context(|| format!("write {}", paths.raw_path.display()))?;
        }
        Ok(paths)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}
