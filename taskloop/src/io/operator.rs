//! Operator channel: advisory output and synchronous line input.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, anyhow};

/// Human-facing advisories and confirmations.
pub trait Operator {
    /// Emit an advisory line (product output, not diagnostics).
    fn output(&self, message: &str);
    /// Show `prompt` and block for one line of input, without the line ending.
    fn input(&self, prompt: &str) -> Result<String>;
}

/// Operator on the process's stdout/stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleOperator;

impl Operator for ConsoleOperator {
    fn output(&self, message: &str) {
        println!("{message}");
    }

    fn input(&self, prompt: &str) -> Result<String> {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{prompt}").context("write prompt")?;
        stdout.flush().context("flush stdout")?;
        drop(stdout);

        let mut line = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut line)
            .context("read operator input")?;
        if read == 0 {
            return Err(anyhow!("operator input closed"));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}
