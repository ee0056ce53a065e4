//! Turns raw oracle text into a validated outcome.
//!
//! The cascade stops at the first step that succeeds:
//!
//! 1. strip known corruption and decode directly;
//! 2. close a truncated document and decode again;
//! 3. ask the oracle to reformat the text, then run 1–2 on its answer
//!    (bounded by `repair_retries`);
//! 4. give up with [`ParseError::Unparseable`].
//!
//! "Decode" means JSON parsing, validation against the outcome's JSON Schema,
//! and deserialization into the typed outcome.

use jsonschema::Draft;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::repair::{close_truncated, strip_corruption};
use crate::core::types::OracleOutcome;
use crate::io::oracle::Oracle;
use crate::io::prompt::PromptBuilder;

#[derive(Debug, Error)]
pub enum ParseError {
    /// The repair budget is spent. `raw` is the last text that failed.
    #[error("{kind} response unparseable after {repairs} repair attempt(s): {error}")]
    Unparseable {
        kind: &'static str,
        raw: String,
        error: String,
        repairs: u32,
    },
    /// The repair call itself failed (oracle or prompt rendering).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseParser {
    repair_retries: u32,
}

impl ResponseParser {
    pub fn new(repair_retries: u32) -> Self {
        Self { repair_retries }
    }

    /// Parse `raw`, spending at most `repair_retries` extra oracle calls.
    #[instrument(skip_all, fields(kind = T::KIND, raw_bytes = raw.len()))]
    pub fn parse<T: OracleOutcome>(
        &self,
        oracle: &dyn Oracle,
        prompts: &PromptBuilder,
        raw: &str,
    ) -> Result<T, ParseError> {
        let mut text = raw.to_string();
        let mut repairs = 0u32;
        loop {
            let error = match decode::<T>(&text) {
                Ok(outcome) => {
                    if repairs > 0 {
                        info!(repairs, "response repaired by oracle");
                    }
                    return Ok(outcome);
                }
                Err(error) => error,
            };
            if repairs >= self.repair_retries {
                warn!(repairs, error = %error, "response unparseable, giving up");
                return Err(ParseError::Unparseable {
                    kind: T::KIND,
                    raw: text,
                    error,
                    repairs,
                });
            }
            repairs += 1;
            warn!(attempt = repairs, error = %error, "response unparseable, requesting repair");
            let prompt = prompts.render_repair(T::KIND, &text, &error)?;
            text = oracle.complete(&prompt)?;
        }
    }
}

/// Deterministic decode (steps 1–2). Returns the last decode error on failure.
pub fn decode<T: OracleOutcome>(text: &str) -> Result<T, String> {
    let stripped = strip_corruption(text);
    let value = match serde_json::from_str::<Value>(&stripped) {
        Ok(value) => value,
        Err(direct) => {
            let Some(closed) = close_truncated(&stripped) else {
                return Err(direct.to_string());
            };
            debug!(added = closed.len().saturating_sub(stripped.len()), "closing truncated response");
            serde_json::from_str::<Value>(&closed)
                .map_err(|err| format!("{direct} (after closing delimiters: {err})"))?
        }
    };

    validate_schema::<T>(&value)?;
    let outcome: T = serde_json::from_value(value).map_err(|err| err.to_string())?;
    let unknown = outcome.unknown_keys();
    if !unknown.is_empty() {
        warn!(kind = T::KIND, keys = ?unknown, "ignoring unknown outcome keys");
    }
    Ok(outcome)
}

fn validate_schema<T: OracleOutcome>(instance: &Value) -> Result<(), String> {
    let schema: Value = serde_json::from_str(T::SCHEMA)
        .map_err(|err| format!("invalid {} schema: {err}", T::KIND))?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| format!("compile {} schema: {err}", T::KIND))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(format!("schema validation failed: {}", messages.join("; ")));
    }
    Ok(())
}
