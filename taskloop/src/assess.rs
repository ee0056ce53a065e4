//! Goal assessment when the queue runs dry.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::types::AssessmentOutcome;
use crate::engine::{Engine, OutcomeEffects};
use crate::response::ParseError;

impl Engine<'_> {
    /// Ask the oracle whether the goal is met.
    ///
    /// Returns `true` once the goal is complete. On `false`, any tasks the
    /// oracle added are queued for the next cycle. Meant for an empty queue on
    /// an unfinished goal; a finished goal returns `true` without a call.
    #[instrument(skip_all)]
    pub fn ensure_goal_complete(&mut self) -> Result<bool> {
        if self.is_goal_complete() {
            return Ok(true);
        }
        if !self.queue().is_empty() {
            warn!(pending = self.queue().len(), "assessing with tasks still queued");
        }

        let current_tasks = self.queue().to_vec();
        let prompt = self.prompts.render_assess(&self.oracle_view(&current_tasks))?;
        let raw = self.oracle.complete(&prompt)?;
        let outcome = match self.parse_outcome::<AssessmentOutcome>(&raw) {
            Ok(outcome) => outcome,
            Err(ParseError::Unparseable { error, .. }) => {
                warn!(error = %error, "assessment unparseable, using sentinel");
                AssessmentOutcome::unparseable()
            }
            Err(ParseError::Other(err)) => return Err(err),
        };

        if let Some(reason) = outcome.error {
            warn!(reason = %reason, "assessment aborted by oracle error");
            self.operator
                .output(&format!("[system] Assessment skipped: {reason}"));
            return Ok(false);
        }
        if let Some(thoughts) = outcome.thoughts.as_deref().filter(|t| !t.trim().is_empty()) {
            self.advise(&format!("[ai] {thoughts}"));
        }

        let applied = self.apply(OutcomeEffects {
            goal_complete: outcome.goal_complete.unwrap_or(false),
            current_tasks: outcome.current_tasks,
            stored_info: None,
            final_result: outcome.final_result,
        })?;
        info!(
            goal_complete = applied.goal_complete,
            pending = self.queue().len(),
            "assessment applied"
        );
        Ok(applied.goal_complete)
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::{Collaborators, Engine, EngineOptions, Seed};
    use crate::test_support::{RecordingSink, ScriptedOperator, ScriptedOracle, sample_tools};
    use serde_json::json;

    fn assess(oracle: &ScriptedOracle, sink: &RecordingSink) -> (bool, Vec<String>) {
        let operator = ScriptedOperator::silent();
        let mut engine = Engine::new(
            "list files",
            sample_tools(),
            Collaborators {
                oracle,
                operator: &operator,
                sink,
            },
            EngineOptions::default(),
            Seed::default(),
        )
        .expect("engine");
        let complete = engine.ensure_goal_complete().expect("assess");
        (complete, engine.queue().to_vec())
    }

    #[test]
    fn complete_assessment_finalizes() {
        let oracle = ScriptedOracle::new([
            r#"{"goal_complete": true, "final_result": {"files": ["a.txt"]}, "current_tasks": []}"#,
        ]);
        let sink = RecordingSink::default();
        let (complete, queue) = assess(&oracle, &sink);

        assert!(complete);
        assert!(queue.is_empty());
        let deliveries = sink.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(
            deliveries[0].1.final_result.get("files"),
            Some(&json!(["a.txt"]))
        );
    }

    #[test]
    fn incomplete_assessment_queues_new_tasks() {
        let oracle = ScriptedOracle::new([
            r#"{"goal_complete": false, "current_tasks": ["double-check hidden files"]}"#,
        ]);
        let sink = RecordingSink::default();
        let (complete, queue) = assess(&oracle, &sink);

        assert!(!complete);
        assert_eq!(queue, vec!["double-check hidden files"]);
        assert!(sink.deliveries().is_empty());
    }

    #[test]
    fn error_assessment_is_not_complete() {
        let oracle = ScriptedOracle::new([r#"{"error": "cannot tell"}"#]);
        let sink = RecordingSink::default();
        let (complete, queue) = assess(&oracle, &sink);

        assert!(!complete);
        assert!(queue.is_empty());
    }
}
