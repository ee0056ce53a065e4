//! Refinement: revise queue and knowledge after a task executed.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::types::RefinementOutcome;
use crate::engine::{Applied, Engine, OutcomeEffects};
use crate::response::ParseError;

/// What [`Engine::refine`] did with the oracle's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefineReport {
    Applied(Applied),
    /// The oracle reported an error (or its answer was unparseable); nothing
    /// besides the completed-task ledger changed and nothing was persisted.
    Skipped { reason: String },
}

impl Engine<'_> {
    /// Record `task`'s result, then apply the oracle's refinement of the plan.
    #[instrument(skip_all, fields(task = %task))]
    pub fn refine(&mut self, task: &str, result: &str) -> Result<RefineReport> {
        self.record_completed(task, result);

        let current_tasks = self.queue().to_vec();
        let prompt =
            self.prompts
                .render_refine(&self.oracle_view(&current_tasks), task, result)?;
        let raw = self.oracle.complete(&prompt)?;
        let outcome = match self.parse_outcome::<RefinementOutcome>(&raw) {
            Ok(outcome) => outcome,
            Err(ParseError::Unparseable { error, .. }) => {
                warn!(error = %error, "refinement unparseable, using sentinel");
                RefinementOutcome::unparseable()
            }
            Err(ParseError::Other(err)) => return Err(err),
        };

        if let Some(reason) = outcome.error {
            warn!(reason = %reason, "refinement aborted by oracle error");
            self.operator
                .output(&format!("[system] Refinement skipped: {reason}"));
            return Ok(RefineReport::Skipped { reason });
        }
        if let Some(thoughts) = outcome.thoughts.as_deref().filter(|t| !t.trim().is_empty()) {
            self.advise(&format!("[ai] {thoughts}"));
        }

        let applied = self.apply(OutcomeEffects {
            goal_complete: outcome.goal_complete.unwrap_or(false),
            current_tasks: outcome.current_tasks,
            stored_info: outcome.stored_info,
            final_result: outcome.final_result,
        })?;
        info!(
            goal_complete = applied.goal_complete,
            persisted = applied.persisted,
            pending = self.queue().len(),
            "refinement applied"
        );
        Ok(RefineReport::Applied(applied))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::UNPARSEABLE;
    use crate::engine::{Collaborators, EngineOptions, Seed};
    use crate::io::state_store::{StateLoad, load_state};
    use crate::test_support::{
        RecordingSink, ScriptedOperator, ScriptedOracle, TestWorkspace, sample_tools,
    };
    use serde_json::{Value, json};

    struct Fixture {
        workspace: TestWorkspace,
        operator: ScriptedOperator,
        sink: RecordingSink,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                workspace: TestWorkspace::new().expect("workspace"),
                operator: ScriptedOperator::silent(),
                sink: RecordingSink::default(),
            }
        }

        fn engine<'a>(&'a self, oracle: &'a ScriptedOracle, tasks: &[&str]) -> Engine<'a> {
            Engine::new(
                "list files",
                sample_tools(),
                Collaborators {
                    oracle,
                    operator: &self.operator,
                    sink: &self.sink,
                },
                EngineOptions {
                    state_path: Some(self.workspace.state_path()),
                    ..EngineOptions::default()
                },
                Seed {
                    current_tasks: tasks.iter().map(|t| t.to_string()).collect(),
                    ..Seed::default()
                },
            )
            .expect("engine")
        }
    }

    /// An `error` outcome changes nothing but the ledger and writes no snapshot.
    #[test]
    fn error_outcome_leaves_state_untouched() {
        let fixture = Fixture::new();
        let oracle = ScriptedOracle::new([r#"{"error": "x", "current_tasks": ["other"]}"#]);
        let mut engine = fixture.engine(&oracle, &["report results"]);
        let before = engine.snapshot();

        let report = engine.refine("list files in current dir", "a.txt").expect("refine");

        assert_eq!(
            report,
            RefineReport::Skipped {
                reason: "x".to_string()
            }
        );
        let after = engine.snapshot();
        assert_eq!(after.current_tasks, before.current_tasks);
        assert_eq!(after.stored_info, before.stored_info);
        assert_eq!(after.final_result, before.final_result);
        assert!(
            after
                .completed_tasks
                .contains_key("list files in current dir")
        );
        assert!(!fixture.workspace.state_path().exists());
        assert!(fixture.operator.saw("Refinement skipped: x"));
    }

    #[test]
    fn goal_complete_finalizes_once() {
        let fixture = Fixture::new();
        let oracle = ScriptedOracle::new([r#"{"goal_complete": true, "final_result": {"k": "v"}}"#]);
        let mut engine = fixture.engine(&oracle, &["report results"]);

        let report = engine.refine("list files in current dir", "a.txt").expect("refine");

        let RefineReport::Applied(applied) = report else {
            panic!("expected applied refinement");
        };
        assert!(applied.goal_complete);
        assert!(applied.persisted);
        assert!(engine.is_goal_complete());
        assert!(engine.queue().is_empty());
        assert_eq!(
            Value::Object(engine.knowledge().final_result().clone()),
            json!({"k": "v"})
        );

        let deliveries = fixture.sink.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(
            Value::Object(deliveries[0].1.final_result.clone()),
            json!({"k": "v"})
        );
        assert!(
            deliveries[0]
                .1
                .completed_tasks
                .contains_key("list files in current dir")
        );
    }

    #[test]
    fn list_files_scenario_updates_queue_and_stored_info() {
        let fixture = Fixture::new();
        let oracle = ScriptedOracle::new([
            r#"{"current_tasks": ["report results"], "stored_info": {"files": ["a.txt","b.txt"]}}"#,
        ]);
        let mut engine = fixture.engine(&oracle, &["report results"]);

        let report = engine
            .refine("list files in current dir", "a.txt, b.txt")
            .expect("refine");

        assert!(matches!(report, RefineReport::Applied(Applied { persisted: true, .. })));
        assert_eq!(engine.queue().to_vec(), vec!["report results"]);
        assert_eq!(
            engine.knowledge().stored_info().get("files"),
            Some(&json!(["a.txt", "b.txt"]))
        );
        let prompt = &oracle.prompts()[0];
        assert!(prompt.contains("task: list files in current dir"));
        assert!(prompt.contains("result: a.txt, b.txt"));
    }

    #[test]
    fn unparseable_refinement_falls_back_to_sentinel() {
        let fixture = Fixture::new();
        let oracle = ScriptedOracle::new(["garbage", "more garbage"]);
        let mut engine = fixture.engine(&oracle, &["report results"]);

        let report = engine.refine("t", "r").expect("refine");

        assert_eq!(
            report,
            RefineReport::Skipped {
                reason: UNPARSEABLE.to_string()
            }
        );
        assert_eq!(engine.queue().to_vec(), vec!["report results"]);
    }

    #[test]
    fn completed_goal_ignores_task_list_in_same_outcome() {
        let fixture = Fixture::new();
        let oracle =
            ScriptedOracle::new([r#"{"goal_complete": true, "current_tasks": ["more"]}"#]);
        let mut engine = fixture.engine(&oracle, &[]);

        engine.refine("t", "r").expect("refine");

        assert!(engine.is_goal_complete());
        assert!(engine.queue().is_empty());
    }

    #[test]
    fn applied_refinement_checkpoints_the_popped_task_and_its_result() {
        let fixture = Fixture::new();
        let oracle = ScriptedOracle::new([
            r#"{"current_tasks": ["list files in current dir", "report results"]}"#,
            r#"{"current_tasks": ["report results"], "thoughts": "ok"}"#,
        ]);
        let mut engine = fixture.engine(&oracle, &[]);
        engine.ensure_planned().expect("plan");
        let task = engine.next_task().expect("planned task");

        let report = engine.refine(&task, "a.txt, b.txt").expect("refine");

        assert!(matches!(report, RefineReport::Applied(Applied { persisted: true, .. })));
        let StateLoad::Loaded(on_disk) = load_state(&fixture.workspace.state_path()) else {
            panic!("expected a state file");
        };
        assert_eq!(on_disk, engine.snapshot());
        assert_eq!(on_disk.current_tasks, vec!["report results"]);
        assert_eq!(
            on_disk.completed_tasks.get("list files in current dir"),
            Some(&json!("a.txt, b.txt"))
        );
    }

    #[test]
    fn refinement_with_nothing_new_skips_the_write() {
        let fixture = Fixture::new();
        let oracle = ScriptedOracle::new([
            r#"{"stored_info": {}, "thoughts": "first pass"}"#,
            r#"{"stored_info": {}, "thoughts": "nothing new"}"#,
        ]);
        let mut engine = fixture.engine(&oracle, &["report results"]);

        let first = engine.refine("t", "r").expect("refine");
        let second = engine.refine("t", "r").expect("refine again");

        assert!(matches!(first, RefineReport::Applied(Applied { persisted: true, .. })));
        assert!(matches!(second, RefineReport::Applied(Applied { persisted: false, .. })));
        assert!(fixture.operator.saw("[ai] nothing new"));
    }
}
