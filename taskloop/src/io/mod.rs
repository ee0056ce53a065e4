//! Side-effecting collaborators: child processes, prompts, files, the operator.

pub mod completion;
pub mod config;
pub mod executor;
pub mod operator;
pub mod oracle;
pub mod process;
pub mod prompt;
pub mod state_store;
