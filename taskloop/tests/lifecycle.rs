//! End-to-end engine lifecycle with scripted collaborators.
//!
//! Runs the "list files" goal across two processes' worth of engines: the
//! first stops at the cycle limit after one task, the second resumes from the
//! persisted snapshot and completes the goal.

use serde_json::json;

use taskloop::engine::{Collaborators, Engine, EngineOptions, Seed};
use taskloop::io::completion::ResultFileSink;
use taskloop::io::state_store::{StateLoad, load_state};
use taskloop::looping::{LoopConfig, LoopEvent, LoopStop, run_loop};
use taskloop::plan::PlanReport;
use taskloop::test_support::{
    ScriptedExecutor, ScriptedOperator, ScriptedOracle, TestWorkspace, sample_tools,
};

fn options(workspace: &TestWorkspace) -> EngineOptions {
    EngineOptions {
        state_path: Some(workspace.state_path()),
        ..EngineOptions::default()
    }
}

#[test]
fn interrupted_run_resumes_from_snapshot_and_completes() {
    let workspace = TestWorkspace::new().expect("workspace");
    let sink = ResultFileSink::new(workspace.root());

    // First run: plan, execute one task, refine, then hit the cycle limit.
    {
        let oracle = ScriptedOracle::new([
            r#"{"current_tasks": ["list files in current dir", "report results"], "thoughts": "simple"}"#,
            r#"{"current_tasks": ["list files in current dir", "report results"], "stored_info": {"files": ["a.txt","b.txt"]}}"#,
        ]);
        let operator = ScriptedOperator::silent();
        let executor = ScriptedExecutor::new(["a.txt, b.txt"]);
        let mut engine = Engine::new(
            "list files",
            sample_tools(),
            Collaborators {
                oracle: &oracle,
                operator: &operator,
                sink: &sink,
            },
            options(&workspace),
            Seed::default(),
        )
        .expect("engine");

        let outcome = run_loop(
            &mut engine,
            &executor,
            &LoopConfig {
                max_cycles: 1,
                confirm_tasks: false,
            },
            |_| {},
        )
        .expect("first run");

        assert_eq!(outcome.stop, LoopStop::CycleLimit { max_cycles: 1 });
        assert!(operator.saw("[ai] simple"));
        assert!(operator.saw("Skipped already completed tasks"));
    }

    let StateLoad::Loaded(snapshot) = load_state(&workspace.state_path()) else {
        panic!("snapshot should exist after the first run");
    };
    assert_eq!(snapshot.current_tasks, vec!["report results"]);
    assert_eq!(snapshot.stored_info.get("files"), Some(&json!(["a.txt", "b.txt"])));
    assert_eq!(
        snapshot.completed_tasks.get("list files in current dir"),
        Some(&json!("a.txt, b.txt"))
    );

    // Second run: resume without planning and finish.
    let oracle = ScriptedOracle::new([
        r#"{"goal_complete": true, "final_result": {"files": ["a.txt","b.txt"], "count": 2}}"#,
    ]);
    let operator = ScriptedOperator::silent();
    let executor = ScriptedExecutor::new(["There are 2 files: a.txt, b.txt"]);
    let mut engine = Engine::new(
        "list files",
        sample_tools(),
        Collaborators {
            oracle: &oracle,
            operator: &operator,
            sink: &sink,
        },
        options(&workspace),
        Seed::default(),
    )
    .expect("engine");

    let mut events = Vec::new();
    let outcome = run_loop(&mut engine, &executor, &LoopConfig::default(), |event| {
        events.push(event.clone());
    })
    .expect("second run");

    assert_eq!(outcome.stop, LoopStop::Complete);
    assert_eq!(events[0], LoopEvent::Planned(PlanReport::Resumed { pending: 1 }));
    assert_eq!(oracle.calls(), 1, "no planning call on resume");
    assert!(engine.is_goal_complete());
    assert!(engine.queue().is_empty());

    let result_path = workspace.root().join("list_files.result.json");
    let delivered: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(&result_path).expect("result file"),
    )
    .expect("result json");
    assert_eq!(delivered["final_result"]["count"], json!(2));
    assert_eq!(delivered["stored_info"]["files"], json!(["a.txt", "b.txt"]));
    assert_eq!(
        delivered["completed_tasks"]["report results"],
        json!("There are 2 files: a.txt, b.txt")
    );

    let StateLoad::Loaded(final_snapshot) = load_state(&workspace.state_path()) else {
        panic!("snapshot should exist after completion");
    };
    assert!(final_snapshot.current_tasks.is_empty());
    assert_eq!(final_snapshot.final_result.get("count"), Some(&json!(2)));
}
