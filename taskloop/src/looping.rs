//! The driver loop: plan, then execute/refine until the goal is met.

use anyhow::Result;
use tracing::{debug, info, instrument};

use crate::engine::Engine;
use crate::io::executor::TaskExecutor;
use crate::plan::PlanReport;
use crate::refine::RefineReport;

const CONFIRM_PROMPT: &str = "Continue? [Y]es/[n]o/[e]dit: ";
const EDIT_PROMPT: &str = "New task description: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Upper bound on executions plus assessments.
    pub max_cycles: u32,
    /// Ask the operator before running each task.
    pub confirm_tasks: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_cycles: 100,
            confirm_tasks: false,
        }
    }
}

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The goal completion flag is set.
    Complete,
    /// The initial plan could not be parsed; nothing was executed.
    PlanningFailed { error: String },
    /// `max_cycles` executions/assessments ran without completing the goal.
    CycleLimit { max_cycles: u32 },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub cycles: u32,
    pub stop: LoopStop,
}

/// Progress notifications for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    Planned(PlanReport),
    /// The operator declined the task; it was neither executed nor recorded.
    TaskSkipped { task: String },
    TaskExecuted { task: String, result: String },
    Refined(RefineReport),
    Assessed { complete: bool },
}

/// Operator answer to the per-task confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskDecision {
    Run,
    Skip,
    Edit,
}

impl TaskDecision {
    /// `n`/`no` skips, `e`/`edit` edits, anything else (including empty) runs.
    pub fn from_answer(answer: &str) -> Self {
        match answer.trim().to_ascii_lowercase().as_str() {
            "n" | "no" => Self::Skip,
            "e" | "edit" => Self::Edit,
            _ => Self::Run,
        }
    }
}

/// Plan (or resume), then alternate execution and refinement, assessing the
/// goal whenever the queue drains.
///
/// Stops on completion, on an unparseable plan, or at the cycle limit. Any
/// other error (oracle, executor spawn, persistence) aborts the loop.
#[instrument(skip_all, fields(max_cycles = config.max_cycles))]
pub fn run_loop<X: TaskExecutor + ?Sized, F: FnMut(&LoopEvent)>(
    engine: &mut Engine<'_>,
    executor: &X,
    config: &LoopConfig,
    mut on_event: F,
) -> Result<LoopOutcome> {
    let plan = engine.ensure_planned()?;
    if let PlanReport::Unparseable { error } = &plan {
        return Ok(LoopOutcome {
            cycles: 0,
            stop: LoopStop::PlanningFailed {
                error: error.clone(),
            },
        });
    }
    on_event(&LoopEvent::Planned(plan));

    let mut cycles = 0u32;
    loop {
        if engine.is_goal_complete() {
            info!(cycles, "loop finished");
            return Ok(LoopOutcome {
                cycles,
                stop: LoopStop::Complete,
            });
        }
        if cycles >= config.max_cycles {
            info!(cycles, "cycle limit reached");
            return Ok(LoopOutcome {
                cycles,
                stop: LoopStop::CycleLimit {
                    max_cycles: config.max_cycles,
                },
            });
        }

        let Some(task) = engine.next_task() else {
            cycles += 1;
            let complete = engine.ensure_goal_complete()?;
            on_event(&LoopEvent::Assessed { complete });
            continue;
        };

        let task = if config.confirm_tasks {
            match confirm_task(engine, &task)? {
                Some(task) => task,
                None => {
                    on_event(&LoopEvent::TaskSkipped { task });
                    continue;
                }
            }
        } else {
            task
        };

        cycles += 1;
        debug!(cycle = cycles, task = %task, "executing task");
        engine.advise(&format!("[system] Running task: {task}"));
        let prompt = engine.task_prompt(&task)?;
        let result = executor.run(&prompt)?;
        engine.advise(&format!("[system] Task result: {result}"));
        on_event(&LoopEvent::TaskExecuted {
            task: task.clone(),
            result: result.clone(),
        });

        let report = engine.refine(&task, &result)?;
        on_event(&LoopEvent::Refined(report));
    }
}

/// Ask the operator about `task`. `Ok(None)` means skip it.
fn confirm_task(engine: &Engine<'_>, task: &str) -> Result<Option<String>> {
    engine.operator.output(&format!("[system] Next task: {task}"));
    match TaskDecision::from_answer(&engine.operator.input(CONFIRM_PROMPT)?) {
        TaskDecision::Run => Ok(Some(task.to_string())),
        TaskDecision::Skip => {
            info!(task = %task, "task skipped by operator");
            Ok(None)
        }
        TaskDecision::Edit => {
            let edited = engine.operator.input(EDIT_PROMPT)?;
            let edited = edited.trim();
            if edited.is_empty() {
                Ok(Some(task.to_string()))
            } else {
                Ok(Some(edited.to_string()))
            }
        }
    }
}
