//! Prompt rendering for the oracle and the executor.

use std::sync::LazyLock;

use anyhow::Result;
use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::core::types::{CompletedTasks, JsonObject, Tool};

const BASE_TEMPLATE: &str = include_str!("prompts/base.md");
const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");
const REFINE_TEMPLATE: &str = include_str!("prompts/refine.md");
const ASSESS_TEMPLATE: &str = include_str!("prompts/assess.md");
const REPAIR_TEMPLATE: &str = include_str!("prompts/repair.md");
const TASK_TEMPLATE: &str = include_str!("prompts/task.md");

/// Worked example of a valid outcome, shown in repair prompts.
pub const GOOD_JSON_EXAMPLE: &str = r#"{"current_tasks": ["Research Amjad Masad's career and background.", "Create a CSV called \"career.csv\" and write his careers to it."], "stored_info": {"username": "amasad"}, "thoughts": "I will research his career and background, and then save the results to \"career.csv\"."}"#;

/// Engine state shown to the oracle in planning, refinement, and assessment prompts.
#[derive(Debug, Clone, Copy)]
pub struct OracleView<'a> {
    pub goal: &'a str,
    pub tools: &'a [Tool],
    pub current_tasks: &'a [String],
    pub stored_info: &'a JsonObject,
    pub final_result: &'a JsonObject,
}

/// Inputs for the prompt handed to the executor for one task.
#[derive(Debug, Clone)]
pub struct TaskPromptInputs<'a> {
    pub goal: &'a str,
    pub task: &'a str,
    /// Tasks queued after this one.
    pub upcoming: Vec<String>,
    /// Knowledge blob(s) selected by the context policy.
    pub context: Value,
    /// Ledger of attempted tasks; `None` leaves the section out.
    pub completed: Option<&'a CompletedTasks>,
}

/// Renders every prompt the engine sends. Templates are compiled once.
pub struct PromptBuilder {
    env: Environment<'static>,
    budget_bytes: usize,
}

impl PromptBuilder {
    /// Create a builder; `budget_bytes` bounds executor task prompts.
    pub fn new(budget_bytes: usize) -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("base", BASE_TEMPLATE),
            ("plan", PLAN_TEMPLATE),
            ("refine", REFINE_TEMPLATE),
            ("assess", ASSESS_TEMPLATE),
            ("repair", REPAIR_TEMPLATE),
            ("task", TASK_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("bundled prompt templates should be valid");
        }
        Self { env, budget_bytes }
    }

    pub fn render_plan(&self, view: &OracleView<'_>) -> Result<String> {
        let template = self.env.get_template("plan")?;
        let rendered = template.render(ViewContext::from_view(view)?)?;
        Ok(render_sections(&parse_sections(&rendered)))
    }

    pub fn render_refine(&self, view: &OracleView<'_>, task: &str, result: &str) -> Result<String> {
        let template = self.env.get_template("refine")?;
        let rendered = template.render(ViewContext {
            task: Some(task.trim()),
            result: Some(result.trim()),
            ..ViewContext::from_view(view)?
        })?;
        Ok(render_sections(&parse_sections(&rendered)))
    }

    pub fn render_assess(&self, view: &OracleView<'_>) -> Result<String> {
        let template = self.env.get_template("assess")?;
        let rendered = template.render(ViewContext::from_view(view)?)?;
        Ok(render_sections(&parse_sections(&rendered)))
    }

    /// Prompt asking the oracle to reformat `bad_json` that failed with `error`.
    pub fn render_repair(&self, kind: &str, bad_json: &str, error: &str) -> Result<String> {
        let template = self.env.get_template("repair")?;
        let rendered = template.render(context! {
            kind => kind,
            example => GOOD_JSON_EXAMPLE,
            bad_json => bad_json,
            error => error,
        })?;
        Ok(render_sections(&parse_sections(&rendered)))
    }

    /// Executor prompt, trimmed to the byte budget.
    pub fn render_task(&self, input: &TaskPromptInputs<'_>) -> Result<String> {
        let template = self.env.get_template("task")?;
        let completed = match input.completed {
            Some(ledger) if !ledger.is_empty() => Some(serde_json::to_string(ledger)?),
            _ => None,
        };
        let rendered = template.render(context! {
            goal => input.goal.trim(),
            task => input.task.trim(),
            upcoming => &input.upcoming,
            context => serde_json::to_string(&input.context)?,
            completed => completed,
        })?;

        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        Ok(render_sections(&sections))
    }
}

/// Template context shared by the oracle prompts. Knowledge is pre-serialized
/// so the oracle sees compact JSON.
#[derive(Debug, Clone, Serialize)]
struct ViewContext<'a> {
    goal: &'a str,
    tools: String,
    current_tasks: String,
    stored_info: String,
    final_result: String,
    task: Option<&'a str>,
    result: Option<&'a str>,
}

impl<'a> ViewContext<'a> {
    fn from_view(view: &OracleView<'a>) -> Result<Self> {
        Ok(Self {
            goal: view.goal.trim(),
            tools: render_tool_catalog(view.tools),
            current_tasks: serde_json::to_string(view.current_tasks)?,
            stored_info: serde_json::to_string(view.stored_info)?,
            final_result: serde_json::to_string(view.final_result)?,
            task: None,
            result: None,
        })
    }
}

/// Render the catalog as `name: ..` / `description: ..` blocks separated by `-----`.
pub fn render_tool_catalog(tools: &[Tool]) -> String {
    tools
        .iter()
        .map(|tool| format!("name: {}\ndescription: {}", tool.name, tool.description))
        .collect::<Vec<_>>()
        .join("\n-----\n")
}

#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

/// Split rendered output on `<!-- section:KEY required|droppable -->` markers.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
            .expect("section marker regex should compile")
    });

    let markers: Vec<(usize, usize, String, bool)> = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let key = caps.get(1)?.as_str().to_string();
            let required = caps.get(2)?.as_str() == "required";
            Some((whole.start(), whole.end(), key, required))
        })
        .collect();

    let mut sections = Vec::new();
    for (i, (_, start, key, required)) in markers.iter().enumerate() {
        let end = markers
            .get(i + 1)
            .map_or(rendered.len(), |(next_start, ..)| *next_start);
        let content = rendered[*start..end].trim().to_string();
        if !content.is_empty() || *required {
            sections.push(ParsedSection {
                key: key.clone(),
                required: *required,
                content,
            });
        }
    }
    sections
}

/// Drop order: completed -> upcoming -> context, then truncate the last section.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len = |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    if total_len(sections) <= budget {
        return;
    }

    for key in ["completed", "upcoming", "context"] {
        if total_len(sections) <= budget {
            break;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    if total_len(sections) <= budget {
        return;
    }
    let Some((last, rest)) = sections.split_last_mut() else {
        return;
    };
    let other_len: usize = rest.iter().map(|s| s.content.len()).sum();
    let allowed = budget.saturating_sub(other_len);
    let before_len = last.content.len();
    if before_len > allowed {
        const MARKER: &str = "\n[truncated]";
        let keep = floor_char_boundary(&last.content, allowed.saturating_sub(MARKER.len()));
        last.content.truncate(keep);
        if allowed > MARKER.len() {
            last.content.push_str(MARKER);
        }
        debug!(
            section = last.key,
            before_len,
            after_len = last.content.len(),
            "truncated section for budget"
        );
    }
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tools() -> Vec<Tool> {
        vec![
            Tool {
                name: "Shell".to_string(),
                description: "Runs a shell command.".to_string(),
            },
            Tool {
                name: "DDGSearch".to_string(),
                description: "Searches the web.".to_string(),
            },
        ]
    }

    #[test]
    fn tool_catalog_is_rendered_verbatim_in_order() {
        assert_eq!(
            render_tool_catalog(&tools()),
            "name: Shell\ndescription: Runs a shell command.\n-----\nname: DDGSearch\ndescription: Searches the web."
        );
    }

    #[test]
    fn refine_prompt_contains_state_and_task_result() {
        let tools = tools();
        let tasks = vec!["report results".to_string()];
        let stored = JsonObject::new();
        let result = JsonObject::new();
        let view = OracleView {
            goal: "list files",
            tools: &tools,
            current_tasks: &tasks,
            stored_info: &stored,
            final_result: &result,
        };

        let prompt = PromptBuilder::new(10_000)
            .render_refine(&view, "list files in current dir", "a.txt, b.txt")
            .expect("render");

        assert!(prompt.contains("<goal>\nlist files\n</goal>"));
        assert!(prompt.contains(r#"current_tasks: ["report results"]"#));
        assert!(prompt.contains("name: DDGSearch"));
        assert!(prompt.contains("task: list files in current dir"));
        assert!(prompt.contains("result: a.txt, b.txt"));
        assert!(!prompt.contains("<!--"), "markers are stripped");
        let goal_pos = prompt.find("### Final Goal").expect("goal");
        let result_pos = prompt.find("### Task Result").expect("result");
        assert!(goal_pos < result_pos);
    }

    #[test]
    fn repair_prompt_carries_bad_text_error_and_example() {
        let prompt = PromptBuilder::new(10_000)
            .render_repair("plan", "{\"current_tasks\": [", "EOF while parsing")
            .expect("render");
        assert!(prompt.contains("The following plan response"));
        assert!(prompt.contains("{\"current_tasks\": ["));
        assert!(prompt.contains("EOF while parsing"));
        assert!(prompt.contains(GOOD_JSON_EXAMPLE));
    }

    fn task_inputs<'a>(completed: Option<&'a CompletedTasks>, context: Value) -> TaskPromptInputs<'a> {
        TaskPromptInputs {
            goal: "list files",
            task: "report results",
            upcoming: vec!["show results and terminate".to_string()],
            context,
            completed,
        }
    }

    #[test]
    fn task_prompt_orders_sections() {
        let mut ledger = CompletedTasks::new();
        ledger.insert("list files in current dir".to_string(), json!("a.txt"));
        let prompt = PromptBuilder::new(10_000)
            .render_task(&task_inputs(Some(&ledger), json!({"stored_info": {"files": 2}})))
            .expect("render");

        let positions: Vec<usize> = [
            "### Executor Contract",
            "### Final Goal",
            "### Upcoming Tasks",
            "### Context From Previous Results",
            "### Completed Tasks",
            "### Your Task",
        ]
        .iter()
        .map(|header| prompt.find(header).expect(header))
        .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(prompt.contains("- show results and terminate"));
    }

    #[test]
    fn task_prompt_omits_empty_optional_sections() {
        let inputs = TaskPromptInputs {
            upcoming: Vec::new(),
            ..task_inputs(None, json!({}))
        };
        let prompt = PromptBuilder::new(10_000).render_task(&inputs).expect("render");
        assert!(!prompt.contains("### Upcoming Tasks"));
        assert!(!prompt.contains("### Completed Tasks"));
    }

    /// With a tight budget the ledger goes first and required sections survive.
    #[test]
    fn budget_drops_completed_before_context() {
        let mut ledger = CompletedTasks::new();
        ledger.insert("old task".to_string(), json!("x".repeat(2_000)));
        let prompt = PromptBuilder::new(900)
            .render_task(&task_inputs(Some(&ledger), json!({"stored_info": {"k": "v"}})))
            .expect("render");

        assert!(!prompt.contains("### Completed Tasks"));
        assert!(prompt.contains("### Context From Previous Results"));
        assert!(prompt.contains("### Executor Contract"));
        assert!(prompt.contains("### Your Task"));
    }

    #[test]
    fn budget_truncates_when_dropping_is_not_enough() {
        let long_task = "t".repeat(5_000);
        let inputs = TaskPromptInputs {
            task: &long_task,
            ..task_inputs(None, json!({}))
        };
        let budget = 1_000;
        let prompt = PromptBuilder::new(budget).render_task(&inputs).expect("render");

        assert!(!prompt.contains("### Context From Previous Results"));
        assert!(prompt.ends_with("[truncated]"));
        assert!(prompt.len() <= budget + 2 * 4, "only separators exceed the budget");
    }
}
