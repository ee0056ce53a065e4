//! Text-completion oracle abstraction.
//!
//! The engine treats the language model as a stateless `complete(text) -> text`
//! function with no structural guarantee on its output. [`CommandOracle`]
//! pipes the prompt to an external CLI; tests use scripted oracles.

use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::config::CommandConfig;
use crate::io::process::run_with_stdin;

/// Stateless text completion.
pub trait Oracle {
    fn complete(&self, prompt: &str) -> Result<String>;
}

/// Oracle backed by a CLI that reads the prompt on stdin and answers on stdout.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    argv: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandOracle {
    pub fn new(config: &CommandConfig) -> Self {
        Self {
            argv: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

impl Oracle for CommandOracle {
    #[instrument(skip_all, fields(prompt_bytes = prompt.len()))]
    fn complete(&self, prompt: &str) -> Result<String> {
        info!(program = ?self.argv.first(), "calling oracle");
        let output = run_with_stdin(
            &self.argv,
            prompt.as_bytes(),
            self.timeout,
            self.output_limit_bytes,
        )?;
        if output.timed_out {
            return Err(anyhow!("oracle timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "oracle command failed");
            return Err(anyhow!(
                "oracle failed with status {:?}: {}",
                output.status.code(),
                output.stderr_text().trim()
            ));
        }
        let text = output.stdout_text();
        debug!(response_bytes = text.len(), "oracle responded");
        Ok(text)
    }
}
