//! The engine owns the goal, the task queue, and the knowledge store.
//!
//! Planning, refinement, and assessment ([`crate::plan`], [`crate::refine`],
//! [`crate::assess`]) are implemented as further `impl Engine` blocks; this
//! module holds construction, the shared outcome application path, and the
//! finalize/persist plumbing they all go through.

use std::path::{Path, PathBuf};

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::core::knowledge::{ContextPolicy, KnowledgeStore};
use crate::core::queue::{RepeatPolicy, TaskQueue};
use crate::core::types::{CompletedTasks, JsonObject, OracleOutcome, TaskUpdate, Tool};
use crate::io::completion::CompletionSink;
use crate::io::config::EngineConfig;
use crate::io::operator::Operator;
use crate::io::oracle::Oracle;
use crate::io::prompt::{OracleView, PromptBuilder, TaskPromptInputs};
use crate::io::state_store::{PersistedState, StateLoad, StateStore};
use crate::response::{ParseError, ResponseParser, decode};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("goal must not be empty")]
    EmptyGoal,
}

/// Behavior switches fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub allow_repeat_tasks: bool,
    pub repair_retries: u32,
    pub manual_repair: bool,
    pub verbose: bool,
    pub prompt_budget_bytes: usize,
    pub context_policy: ContextPolicy,
    pub include_completed_tasks: bool,
    /// Snapshot location; `None` keeps state in memory only.
    pub state_path: Option<PathBuf>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl EngineOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            allow_repeat_tasks: config.allow_repeat_tasks,
            repair_retries: config.repair_retries,
            manual_repair: config.manual_repair,
            verbose: config.verbose,
            prompt_budget_bytes: config.prompt_budget_bytes,
            context_policy: config.context.policy,
            include_completed_tasks: config.context.include_completed_tasks,
            state_path: config.state_path.clone(),
        }
    }
}

/// External collaborators borrowed for the engine's lifetime.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub oracle: &'a dyn Oracle,
    pub operator: &'a dyn Operator,
    pub sink: &'a dyn CompletionSink,
}

/// Construction-time overrides. Non-empty values replace what was loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Seed {
    pub current_tasks: Vec<String>,
    pub final_result: JsonObject,
    pub completed_tasks: CompletedTasks,
}

/// State changes requested by a refinement or assessment outcome.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct OutcomeEffects {
    pub goal_complete: bool,
    pub current_tasks: Option<Vec<String>>,
    pub stored_info: Option<JsonObject>,
    pub final_result: Option<JsonObject>,
}

/// What applying an outcome changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    pub goal_complete: bool,
    /// Present when the outcome carried a task list (and the goal is not complete).
    pub tasks: Option<TaskUpdate>,
    /// Whether a snapshot was written.
    pub persisted: bool,
}

pub struct Engine<'a> {
    goal: String,
    tools: Vec<Tool>,
    pub(crate) oracle: &'a dyn Oracle,
    pub(crate) operator: &'a dyn Operator,
    sink: &'a dyn CompletionSink,
    parser: ResponseParser,
    pub(crate) prompts: PromptBuilder,
    queue: TaskQueue,
    knowledge: KnowledgeStore,
    store: Option<StateStore>,
    /// Last snapshot known to be on disk.
    on_disk: Option<PersistedState>,
    goal_complete: bool,
    options: EngineOptions,
}

impl<'a> Engine<'a> {
    /// Build an engine, restoring persisted state when a state path is configured.
    ///
    /// A missing or unreadable snapshot is an empty first run. Non-empty
    /// `seed` values then overwrite the restored ones; the restored queue is
    /// filtered through the repeat policy like any other task list.
    pub fn new(
        goal: impl Into<String>,
        tools: Vec<Tool>,
        collaborators: Collaborators<'a>,
        options: EngineOptions,
        seed: Seed,
    ) -> Result<Self, EngineError> {
        let goal = goal.into();
        if goal.trim().is_empty() {
            return Err(EngineError::EmptyGoal);
        }

        let store = options.state_path.clone().map(StateStore::new);
        let (restored, on_disk) = match &store {
            Some(store) => {
                let load = store.load();
                collaborators
                    .operator
                    .output(&load_advisory(store.path(), &load));
                let on_disk = match &load {
                    StateLoad::Loaded(state) => Some(state.clone()),
                    _ => None,
                };
                (load.into_state(), on_disk)
            }
            None => (PersistedState::default(), None),
        };

        let completed_tasks = if seed.completed_tasks.is_empty() {
            restored.completed_tasks
        } else {
            seed.completed_tasks
        };
        let final_result = if seed.final_result.is_empty() {
            restored.final_result
        } else {
            seed.final_result
        };
        let current_tasks = if seed.current_tasks.is_empty() {
            restored.current_tasks
        } else {
            seed.current_tasks
        };

        let mut queue = TaskQueue::new(RepeatPolicy::from_allow(options.allow_repeat_tasks));
        let restored_queue = queue.replace(current_tasks, &completed_tasks);
        debug!(
            pending = restored_queue.kept.len(),
            dropped = restored_queue.skipped.len(),
            completed = completed_tasks.len(),
            "engine state restored"
        );

        Ok(Self {
            goal,
            tools,
            oracle: collaborators.oracle,
            operator: collaborators.operator,
            sink: collaborators.sink,
            parser: ResponseParser::new(options.repair_retries),
            prompts: PromptBuilder::new(options.prompt_budget_bytes),
            queue,
            knowledge: KnowledgeStore::new(restored.stored_info, final_result, completed_tasks),
            store,
            on_disk,
            goal_complete: false,
            options,
        })
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn knowledge(&self) -> &KnowledgeStore {
        &self.knowledge
    }

    pub fn is_goal_complete(&self) -> bool {
        self.goal_complete
    }

    /// Take the next task off the front of the queue.
    pub fn next_task(&mut self) -> Option<String> {
        self.queue.pop_front()
    }

    /// Replace the queue with `candidates` under the repeat policy.
    pub fn add_tasks(&mut self, candidates: Vec<String>) -> TaskUpdate {
        let update = self
            .queue
            .replace(candidates, self.knowledge.completed_tasks());
        info!(
            kept = update.kept.len(),
            skipped = update.skipped.len(),
            "task queue replaced"
        );
        if !update.kept.is_empty() {
            self.advise(&format!("[system] New tasks: {:?}", update.kept));
        }
        if !update.skipped.is_empty() {
            self.advise(&format!(
                "[system] Skipped already completed tasks: {:?}",
                update.skipped
            ));
        }
        update
    }

    /// Executor prompt for `task`, with context chosen by the configured policy.
    pub fn task_prompt(&self, task: &str) -> Result<String> {
        let completed = self
            .options
            .include_completed_tasks
            .then(|| self.knowledge.completed_tasks());
        self.prompts.render_task(&TaskPromptInputs {
            goal: &self.goal,
            task,
            upcoming: self.queue.to_vec(),
            context: self.knowledge.task_context(self.options.context_policy),
            completed,
        })
    }

    /// Current snapshot of the persisted fields.
    pub fn snapshot(&self) -> PersistedState {
        PersistedState {
            stored_info: self.knowledge.stored_info().clone(),
            final_result: self.knowledge.final_result().clone(),
            current_tasks: self.queue.to_vec(),
            completed_tasks: self.knowledge.completed_tasks().clone(),
        }
    }

    /// Write a snapshot if persistence is configured. Returns whether one was written.
    pub fn persist(&mut self) -> Result<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        let snapshot = self.snapshot();
        store.save(&snapshot)?;
        debug!(path = %store.path().display(), "state persisted");
        self.on_disk = Some(snapshot);
        Ok(true)
    }

    /// Persist only when memory has drifted from the last written snapshot.
    ///
    /// The drift includes the popped task and its ledger entry, which change
    /// before an outcome is applied.
    fn persist_if_changed(&mut self) -> Result<bool> {
        if self.store.is_none() || self.on_disk.as_ref() == Some(&self.snapshot()) {
            return Ok(false);
        }
        self.persist()
    }

    pub(crate) fn record_completed(&mut self, task: &str, result: &str) {
        self.knowledge.record_completed(task, result);
    }

    /// Apply the effects of a decoded outcome, then finalize and persist as needed.
    #[instrument(skip_all, fields(goal_complete = effects.goal_complete))]
    pub(crate) fn apply(&mut self, effects: OutcomeEffects) -> Result<Applied> {
        let tasks = match effects.current_tasks {
            Some(candidates) if !effects.goal_complete => Some(self.add_tasks(candidates)),
            Some(_) => {
                debug!("ignoring task list on a completed goal");
                None
            }
            None => None,
        };
        if let Some(patch) = effects.stored_info {
            if self.knowledge.merge_stored_info(patch) {
                self.advise(&format!(
                    "[system] New stored info: {}",
                    compact_json(self.knowledge.stored_info())
                ));
            }
        }
        if let Some(patch) = effects.final_result {
            if self.knowledge.merge_final_result(patch) {
                self.advise(&format!(
                    "[system] New final result: {}",
                    compact_json(self.knowledge.final_result())
                ));
            }
        }
        if effects.goal_complete {
            self.finalize()?;
        }

        let persisted = self.persist_if_changed()?;

        Ok(Applied {
            goal_complete: self.goal_complete,
            tasks,
            persisted,
        })
    }

    /// Deliver the payload, then clear the queue and raise the completion flag.
    ///
    /// Does nothing once the goal is already complete, so the sink sees at most
    /// one delivery per engine. A failed delivery leaves the queue untouched.
    pub fn finalize(&mut self) -> Result<()> {
        if self.goal_complete {
            return Ok(());
        }
        self.sink
            .on_complete(&self.goal, &self.knowledge.completion_payload())?;
        self.queue.clear();
        self.goal_complete = true;
        info!("goal complete");
        self.advise("[system] Goal complete.");
        Ok(())
    }

    /// Parse `raw` through the repair cascade, escalating to the operator when
    /// `manual_repair` is enabled and the cascade gives up.
    pub(crate) fn parse_outcome<T: OracleOutcome>(&self, raw: &str) -> Result<T, ParseError> {
        match self.parser.parse::<T>(self.oracle, &self.prompts, raw) {
            Err(ParseError::Unparseable {
                kind,
                raw,
                error,
                repairs,
            }) if self.options.manual_repair => self.manual_repair(kind, raw, error, repairs),
            other => other,
        }
    }

    fn manual_repair<T: OracleOutcome>(
        &self,
        kind: &'static str,
        raw: String,
        error: String,
        repairs: u32,
    ) -> Result<T, ParseError> {
        self.operator.output(&format!(
            "[system] Could not parse the {kind} response ({error}):\n{raw}"
        ));
        let answer = self
            .operator
            .input("[system] Enter corrected JSON on one line (empty to give up): ")?;
        if answer.trim().is_empty() {
            return Err(ParseError::Unparseable {
                kind,
                raw,
                error,
                repairs,
            });
        }
        decode::<T>(&answer).map_err(|error| ParseError::Unparseable {
            kind,
            raw: answer,
            error,
            repairs,
        })
    }

    pub(crate) fn oracle_view<'s>(&'s self, current_tasks: &'s [String]) -> OracleView<'s> {
        OracleView {
            goal: &self.goal,
            tools: &self.tools,
            current_tasks,
            stored_info: self.knowledge.stored_info(),
            final_result: self.knowledge.final_result(),
        }
    }

    /// Informational advisory, shown only when verbose.
    pub(crate) fn advise(&self, message: &str) {
        if self.options.verbose {
            self.operator.output(message);
        }
    }
}

fn load_advisory(path: &Path, load: &StateLoad) -> String {
    match load {
        StateLoad::Loaded(_) => format!("[system] Loaded stored info from: {}", path.display()),
        StateLoad::Missing => format!(
            "[system] No state at {}, starting fresh. It will be created on the first write.",
            path.display()
        ),
        StateLoad::Unreadable { reason } => format!(
            "[system] Could not read {} ({reason}), starting fresh.",
            path.display()
        ),
    }
}

fn compact_json(value: &JsonObject) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
