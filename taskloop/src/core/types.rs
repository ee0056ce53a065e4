//! Shared deterministic types for the engine core.
//!
//! Oracle outcomes are decoded into these structs only after the raw text has
//! been validated against the matching JSON Schema in `schemas/`. Keys the
//! oracle invents are kept in `unknown` instead of being silently dropped.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arbitrary JSON object used for stored info and the final result.
pub type JsonObject = Map<String, Value>;

/// Ledger of attempted tasks, keyed by task description.
pub type CompletedTasks = BTreeMap<String, Value>;

/// Descriptive metadata for a capability tool, rendered verbatim into prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
}

/// A structured oracle outcome with a schema the raw text must satisfy.
pub trait OracleOutcome: DeserializeOwned {
    /// Short label used in logs and repair prompts.
    const KIND: &'static str;
    /// JSON Schema (Draft 2020-12) the decoded document must satisfy.
    const SCHEMA: &'static str;

    /// Top-level keys the engine does not recognize.
    fn unknown_keys(&self) -> Vec<&str>;
}

/// Initial plan: `{"current_tasks": [..]}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlanOutcome {
    pub current_tasks: Vec<String>,
    #[serde(default)]
    pub thoughts: Option<String>,
    #[serde(flatten)]
    pub unknown: BTreeMap<String, Value>,
}

/// Outcome of a refinement call made after a task executed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RefinementOutcome {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub thoughts: Option<String>,
    #[serde(default)]
    pub goal_complete: Option<bool>,
    #[serde(default)]
    pub current_tasks: Option<Vec<String>>,
    #[serde(default)]
    pub stored_info: Option<JsonObject>,
    #[serde(default)]
    pub final_result: Option<JsonObject>,
    #[serde(flatten)]
    pub unknown: BTreeMap<String, Value>,
}

/// Outcome of a goal-satisfaction assessment made when the queue drains.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AssessmentOutcome {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub thoughts: Option<String>,
    #[serde(default)]
    pub goal_complete: Option<bool>,
    #[serde(default)]
    pub current_tasks: Option<Vec<String>>,
    #[serde(default)]
    pub final_result: Option<JsonObject>,
    #[serde(flatten)]
    pub unknown: BTreeMap<String, Value>,
}

impl OracleOutcome for PlanOutcome {
    const KIND: &'static str = "plan";
    const SCHEMA: &'static str = include_str!("../../schemas/plan_outcome.schema.json");

    fn unknown_keys(&self) -> Vec<&str> {
        self.unknown.keys().map(String::as_str).collect()
    }
}

impl OracleOutcome for RefinementOutcome {
    const KIND: &'static str = "refine";
    const SCHEMA: &'static str = include_str!("../../schemas/refine_outcome.schema.json");

    fn unknown_keys(&self) -> Vec<&str> {
        self.unknown.keys().map(String::as_str).collect()
    }
}

impl OracleOutcome for AssessmentOutcome {
    const KIND: &'static str = "assess";
    const SCHEMA: &'static str = include_str!("../../schemas/assess_outcome.schema.json");

    fn unknown_keys(&self) -> Vec<&str> {
        self.unknown.keys().map(String::as_str).collect()
    }
}

impl RefinementOutcome {
    /// Sentinel used when a response could not be parsed and nobody repaired it.
    pub fn unparseable() -> Self {
        Self {
            error: Some(UNPARSEABLE.to_string()),
            ..Self::default()
        }
    }
}

impl AssessmentOutcome {
    pub fn unparseable() -> Self {
        Self {
            error: Some(UNPARSEABLE.to_string()),
            ..Self::default()
        }
    }
}

/// Error text carried by the sentinel outcomes.
pub const UNPARSEABLE: &str = "could not parse";

/// Payload delivered to the completion sink once the goal is satisfied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionPayload {
    pub final_result: JsonObject,
    pub completed_tasks: CompletedTasks,
    pub stored_info: JsonObject,
}

/// Which entries of a candidate task list entered the queue and which did not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    /// Entries now in the queue, in oracle order.
    pub kept: Vec<String>,
    /// Entries dropped because they were already completed (or blank).
    pub skipped: Vec<String>,
}
