//! Executor abstraction for carrying out a single task.
//!
//! The [`TaskExecutor`] trait decouples the loop from whatever agent actually
//! uses the capability tools. Its result is free text: a failed run is not
//! distinguished from a successful one at this boundary, the refinement step
//! reads the text and decides.

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::io::config::CommandConfig;
use crate::io::process::run_with_stdin;

/// Runs one task prompt and returns its textual result.
pub trait TaskExecutor {
    fn run(&self, prompt: &str) -> Result<String>;
}

/// Executor that spawns an agent CLI and feeds it the task prompt on stdin.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    argv: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandExecutor {
    pub fn new(config: &CommandConfig) -> Self {
        Self {
            argv: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

impl TaskExecutor for CommandExecutor {
    /// Only a failure to spawn is an error; exit status and timeouts become text.
    #[instrument(skip_all, fields(timeout_secs = self.timeout.as_secs()))]
    fn run(&self, prompt: &str) -> Result<String> {
        info!(program = ?self.argv.first(), "starting executor");
        let output = run_with_stdin(
            &self.argv,
            prompt.as_bytes(),
            self.timeout,
            self.output_limit_bytes,
        )?;

        let mut text = output.stdout_text().trim_end().to_string();
        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "executor timed out");
            text.push_str(&format!(
                "\n[executor timed out after {}s]",
                self.timeout.as_secs()
            ));
        } else if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "executor failed");
            text.push_str(&format!(
                "\n[executor exited with status {:?}]\n{}",
                output.status.code(),
                output.stderr_text().trim()
            ));
        }
        if output.truncated > 0 {
            text.push_str(&format!("\n[truncated {} bytes]", output.truncated));
        }

        debug!(result_bytes = text.len(), "executor finished");
        Ok(text.trim().to_string())
    }
}
