//! Test-only collaborators with scripted behavior.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::core::types::{CompletionPayload, Tool};
use crate::io::completion::CompletionSink;
use crate::io::executor::TaskExecutor;
use crate::io::operator::Operator;
use crate::io::oracle::Oracle;

/// Oracle that replays canned responses in order and records every prompt.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    responses: RefCell<VecDeque<String>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: RefCell::new(responses.into_iter().map(Into::into).collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }

    pub fn remaining(&self) -> usize {
        self.responses.borrow().len()
    }
}

impl Oracle for ScriptedOracle {
    fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted oracle has no response left"))
    }
}

/// Executor that returns canned results and records each task prompt.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    results: RefCell<VecDeque<String>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new<I, S>(results: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            results: RefCell::new(results.into_iter().map(Into::into).collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl TaskExecutor for ScriptedExecutor {
    fn run(&self, prompt: &str) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.results
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted executor has no result left"))
    }
}

/// Operator that records advisories and answers prompts from a script.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    answers: RefCell<VecDeque<String>>,
    outputs: RefCell<Vec<String>>,
    questions: RefCell<Vec<String>>,
}

impl ScriptedOperator {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: RefCell::new(answers.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn outputs(&self) -> Vec<String> {
        self.outputs.borrow().clone()
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.borrow().clone()
    }

    /// Whether any advisory contains `needle`.
    pub fn saw(&self, needle: &str) -> bool {
        self.outputs.borrow().iter().any(|line| line.contains(needle))
    }
}

impl Operator for ScriptedOperator {
    fn output(&self, message: &str) {
        self.outputs.borrow_mut().push(message.to_string());
    }

    fn input(&self, prompt: &str) -> Result<String> {
        self.questions.borrow_mut().push(prompt.to_string());
        self.answers
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted operator has no answer left"))
    }
}

/// Completion sink that keeps every delivered payload.
#[derive(Debug, Default)]
pub struct RecordingSink {
    deliveries: RefCell<Vec<(String, CompletionPayload)>>,
}

impl RecordingSink {
    pub fn deliveries(&self) -> Vec<(String, CompletionPayload)> {
        self.deliveries.borrow().clone()
    }
}

impl CompletionSink for RecordingSink {
    fn on_complete(&self, goal: &str, payload: &CompletionPayload) -> Result<()> {
        self.deliveries
            .borrow_mut()
            .push((goal.to_string(), payload.clone()));
        Ok(())
    }
}

/// Temporary directory holding a state file and results.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.path().join("state.json")
    }
}

/// The two-tool catalog used across tests.
pub fn sample_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: "Shell".to_string(),
            description: "Runs a shell command and returns its output.".to_string(),
        },
        Tool {
            name: "DDGSearch".to_string(),
            description: "Searches the web and returns the top results.".to_string(),
        },
    ]
}
