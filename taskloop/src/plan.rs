//! Initial planning: seed the queue from the goal with one oracle call.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::types::{PlanOutcome, TaskUpdate};
use crate::engine::Engine;
use crate::response::ParseError;

/// What [`Engine::ensure_planned`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanReport {
    /// Restored or seeded tasks were already queued; no oracle call was made.
    Resumed { pending: usize },
    /// The oracle's plan went through the repeat policy into the queue.
    Planned(TaskUpdate),
    /// Every planned task was already completed, so nothing was queued. The
    /// driver moves straight to assessment.
    AllCompleted { skipped: Vec<String> },
    /// The plan could not be parsed; the queue is left empty.
    Unparseable { error: String },
}

impl Engine<'_> {
    /// Plan unless there is already work queued.
    #[instrument(skip_all)]
    pub fn ensure_planned(&mut self) -> Result<PlanReport> {
        if !self.queue().is_empty() {
            let pending = self.queue().len();
            info!(pending, "resuming queued tasks, skipping planning");
            self.advise(&format!("[system] Resuming {pending} queued task(s)."));
            return Ok(PlanReport::Resumed { pending });
        }
        self.plan()
    }

    /// Ask the oracle for an ordered task list and queue it.
    pub fn plan(&mut self) -> Result<PlanReport> {
        let current_tasks = self.queue().to_vec();
        let prompt = self.prompts.render_plan(&self.oracle_view(&current_tasks))?;
        let raw = self.oracle.complete(&prompt)?;

        let outcome = match self.parse_outcome::<PlanOutcome>(&raw) {
            Ok(outcome) => outcome,
            Err(ParseError::Unparseable { error, .. }) => {
                warn!(error = %error, "planning response unparseable");
                self.operator
                    .output(&format!("[system] Could not parse the plan: {error}"));
                return Ok(PlanReport::Unparseable { error });
            }
            Err(ParseError::Other(err)) => return Err(err),
        };

        if let Some(thoughts) = outcome.thoughts.as_deref().filter(|t| !t.trim().is_empty()) {
            self.advise(&format!("[ai] {thoughts}"));
        }
        let update = self.add_tasks(outcome.current_tasks);
        self.persist()?;
        if update.kept.is_empty() {
            warn!(skipped = update.skipped.len(), "plan yielded no new tasks");
            self.operator
                .output("[system] Every planned task was already completed.");
            return Ok(PlanReport::AllCompleted {
                skipped: update.skipped,
            });
        }
        Ok(PlanReport::Planned(update))
    }
}
