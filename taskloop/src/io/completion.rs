//! Completion sinks receive the final deliverable once the goal is satisfied.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::core::types::CompletionPayload;

const MAX_FILE_STEM_CHARS: usize = 100;

/// Delivery point for the final artifact. Called exactly once per completed goal.
pub trait CompletionSink {
    fn on_complete(&self, goal: &str, payload: &CompletionPayload) -> Result<()>;
}

/// Writes the payload to `<dir>/<sanitized goal>.result.json`.
#[derive(Debug, Clone)]
pub struct ResultFileSink {
    dir: PathBuf,
}

impl ResultFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, goal: &str) -> PathBuf {
        self.dir.join(format!("{}.result.json", sanitize_goal(goal)))
    }
}

impl CompletionSink for ResultFileSink {
    fn on_complete(&self, goal: &str, payload: &CompletionPayload) -> Result<()> {
        let path = self.path_for(goal);
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create directory {}", self.dir.display()))?;
        let mut buf = serde_json::to_string_pretty(payload).context("serialize result")?;
        buf.push('\n');
        write_file(&path, &buf)?;
        info!(path = %path.display(), "final result written");
        Ok(())
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

/// File-name-safe form of a goal: runs of characters outside `[A-Za-z0-9._-]`
/// collapse to one `_`, capped at 100 characters, `goal` when nothing remains.
pub fn sanitize_goal(goal: &str) -> String {
    let mut out = String::new();
    for ch in goal.trim().chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let out: String = out.chars().take(MAX_FILE_STEM_CHARS).collect();
    let out = out.trim_matches(|c| c == '_' || c == '.').to_string();
    if out.is_empty() { "goal".to_string() } else { out }
}
