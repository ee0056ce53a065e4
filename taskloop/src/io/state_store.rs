//! Snapshot storage for the queue and accumulated knowledge.
//!
//! The snapshot is a single JSON object with exactly four keys:
//! `stored_info`, `final_result`, `current_tasks`, `completed_tasks`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::types::{CompletedTasks, JsonObject};

/// Persisted engine state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PersistedState {
    pub stored_info: JsonObject,
    pub final_result: JsonObject,
    pub current_tasks: Vec<String>,
    pub completed_tasks: CompletedTasks,
}

/// Result of reading a snapshot file. Never an error: a first run simply has no file.
#[derive(Debug, Clone, PartialEq)]
pub enum StateLoad {
    Loaded(PersistedState),
    Missing,
    /// The file exists but could not be read or decoded; treated as empty.
    Unreadable { reason: String },
}

impl StateLoad {
    pub fn into_state(self) -> PersistedState {
        match self {
            StateLoad::Loaded(state) => state,
            StateLoad::Missing | StateLoad::Unreadable { .. } => PersistedState::default(),
        }
    }
}

/// Snapshot file location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> StateLoad {
        load_state(&self.path)
    }

    pub fn save(&self, state: &PersistedState) -> Result<()> {
        save_state(&self.path, state)
    }
}

/// Load a snapshot from disk.
pub fn load_state(path: &Path) -> StateLoad {
    debug!(path = %path.display(), "loading state");
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return StateLoad::Missing,
        Err(err) => {
            warn!(path = %path.display(), err = %err, "state file unreadable");
            return StateLoad::Unreadable {
                reason: err.to_string(),
            };
        }
    };
    match serde_json::from_str::<PersistedState>(&contents) {
        Ok(state) => {
            debug!(
                pending = state.current_tasks.len(),
                completed = state.completed_tasks.len(),
                "state loaded"
            );
            StateLoad::Loaded(state)
        }
        Err(err) => {
            warn!(path = %path.display(), err = %err, "state file is not a valid snapshot");
            StateLoad::Unreadable {
                reason: err.to_string(),
            }
        }
    }
}

/// Write a snapshot, replacing prior content (temp file + rename).
pub fn save_state(path: &Path, state: &PersistedState) -> Result<()> {
    debug!(path = %path.display(), pending = state.current_tasks.len(), "writing state");
    let mut buf = serde_json::to_string_pretty(state).context("serialize state")?;
    buf.push('\n');
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write temp state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace state {}", path.display()))?;
    Ok(())
}
