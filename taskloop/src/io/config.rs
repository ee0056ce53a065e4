//! Engine configuration stored in `taskloop.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::knowledge::ContextPolicy;
use crate::core::types::Tool;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "taskloop.toml";

/// Engine configuration (TOML).
///
/// Meant to be edited by humans. Missing fields fall back to the defaults
/// below; CLI flags override individual fields at run time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Let the oracle schedule tasks that were already attempted.
    pub allow_repeat_tasks: bool,

    /// Extra oracle calls spent repairing one unparseable response.
    pub repair_retries: u32,

    /// Upper bound on executions plus assessments in one `run`.
    pub max_cycles: u32,

    /// Ask the operator before each task (run / skip / edit).
    pub confirm_tasks: bool,

    /// Ask the operator for corrected JSON when repair gives up.
    pub manual_repair: bool,

    /// Emit advisories for new tasks, info, and results.
    pub verbose: bool,

    /// Maximum bytes for a task prompt before dropping sections.
    pub prompt_budget_bytes: usize,

    /// Snapshot file; persistence is disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,

    /// Directory receiving `<goal>.result.json` on completion.
    pub results_dir: PathBuf,

    pub context: ContextConfig,
    pub oracle: CommandConfig,
    pub executor: CommandConfig,
    pub tools: Vec<Tool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContextConfig {
    pub policy: ContextPolicy,
    pub include_completed_tasks: bool,
}

/// External command used as the oracle or the executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandConfig {
    /// Argv, e.g. `["llm", "-m", "gpt-4"]`. The prompt is written to stdin.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            policy: ContextPolicy::Both,
            include_completed_tasks: true,
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            command: vec!["llm".to_string()],
            timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            allow_repeat_tasks: false,
            repair_retries: 1,
            max_cycles: 100,
            confirm_tasks: true,
            manual_repair: false,
            verbose: true,
            prompt_budget_bytes: 40_000,
            state_path: None,
            results_dir: PathBuf::from("."),
            context: ContextConfig::default(),
            oracle: CommandConfig::default(),
            executor: CommandConfig {
                command: vec![
                    "codex".to_string(),
                    "exec".to_string(),
                    "--skip-git-repo-check".to_string(),
                    "-".to_string(),
                ],
                timeout_secs: 30 * 60,
                output_limit_bytes: 100_000,
            },
            tools: default_tools(),
        }
    }
}

fn default_tools() -> Vec<Tool> {
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

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_cycles == 0 {
            return Err(anyhow!("max_cycles must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        self.oracle.validate("oracle")?;
        self.executor.validate("executor")?;
        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                return Err(anyhow!("tools[].name must not be empty"));
            }
        }
        Ok(())
    }
}

impl CommandConfig {
    fn validate(&self, label: &str) -> Result<()> {
        if self.command.is_empty() || self.command[0].trim().is_empty() {
            return Err(anyhow!("{label}.command must be a non-empty array"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("{label}.timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("{label}.output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("taskloop.toml");
        let cfg = EngineConfig {
            allow_repeat_tasks: true,
            state_path: Some(PathBuf::from("state.json")),
            context: ContextConfig {
                policy: ContextPolicy::Larger,
                include_completed_tasks: false,
            },
            ..EngineConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("taskloop.toml");
        fs::write(
            &path,
            "repair_retries = 3\n\n[oracle]\ncommand = [\"ollama\", \"run\", \"llama3\"]\n\n[[tools]]\nname = \"ReadFile\"\ndescription = \"Reads a file.\"\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.repair_retries, 3);
        assert_eq!(cfg.oracle.command, vec!["ollama", "run", "llama3"]);
        assert_eq!(cfg.oracle.timeout_secs, CommandConfig::default().timeout_secs);
        assert_eq!(cfg.tools.len(), 1);
        assert_eq!(cfg.max_cycles, 100);
    }

    #[test]
    fn validate_rejects_empty_command() {
        let mut cfg = EngineConfig::default();
        cfg.executor.command.clear();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("executor.command"));
    }
}
