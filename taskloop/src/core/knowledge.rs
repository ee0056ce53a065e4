//! Accumulated knowledge: working memory, the deliverable, and the task ledger.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::types::{CompletedTasks, CompletionPayload, JsonObject};

/// Which knowledge blobs are shown to the executor for a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextPolicy {
    /// Both stored info and the final result.
    #[default]
    Both,
    /// Whichever of the two serializes larger.
    Larger,
    FinalResult,
    StoredInfo,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnowledgeStore {
    stored_info: JsonObject,
    final_result: JsonObject,
    completed_tasks: CompletedTasks,
}

impl KnowledgeStore {
    pub fn new(
        stored_info: JsonObject,
        final_result: JsonObject,
        completed_tasks: CompletedTasks,
    ) -> Self {
        Self {
            stored_info,
            final_result,
            completed_tasks,
        }
    }

    pub fn stored_info(&self) -> &JsonObject {
        &self.stored_info
    }

    pub fn final_result(&self) -> &JsonObject {
        &self.final_result
    }

    pub fn completed_tasks(&self) -> &CompletedTasks {
        &self.completed_tasks
    }

    /// Record an attempted task and its result, overwriting earlier attempts.
    pub fn record_completed(&mut self, task: &str, result: &str) {
        self.completed_tasks
            .insert(task.to_string(), Value::String(result.to_string()));
    }

    /// Shallow-merge `patch` into stored info. Returns whether anything was merged.
    pub fn merge_stored_info(&mut self, patch: JsonObject) -> bool {
        merge_shallow(&mut self.stored_info, patch)
    }

    /// Shallow-merge `patch` into the final result. Returns whether anything was merged.
    pub fn merge_final_result(&mut self, patch: JsonObject) -> bool {
        merge_shallow(&mut self.final_result, patch)
    }

    pub fn completion_payload(&self) -> CompletionPayload {
        CompletionPayload {
            final_result: self.final_result.clone(),
            completed_tasks: self.completed_tasks.clone(),
            stored_info: self.stored_info.clone(),
        }
    }

    /// Context blob handed to the executor alongside a task.
    pub fn task_context(&self, policy: ContextPolicy) -> Value {
        match policy {
            ContextPolicy::Both => json!({
                "final_result": self.final_result,
                "stored_info": self.stored_info,
            }),
            ContextPolicy::Larger => {
                if serialized_len(&self.final_result) > serialized_len(&self.stored_info) {
                    json!({ "final_result": self.final_result })
                } else {
                    json!({ "stored_info": self.stored_info })
                }
            }
            ContextPolicy::FinalResult => json!({ "final_result": self.final_result }),
            ContextPolicy::StoredInfo => json!({ "stored_info": self.stored_info }),
        }
    }
}

fn merge_shallow(target: &mut JsonObject, patch: JsonObject) -> bool {
    let changed = !patch.is_empty();
    for (key, value) in patch {
        target.insert(key, value);
    }
    changed
}

fn serialized_len(value: &JsonObject) -> usize {
    serde_json::to_string(value).map(|s| s.len()).unwrap_or(0)
}
