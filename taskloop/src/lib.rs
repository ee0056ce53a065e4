//! Goal-driven task orchestration around an unreliable text oracle.
//!
//! A free-form goal is turned into a queue of subtasks by a language-model
//! oracle, each task is carried out by an executor, and after every task the
//! oracle refines the queue and the accumulated knowledge until it declares
//! the goal complete. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (outcome types, repair
//!   heuristics, queue policy, knowledge merging). No I/O.
//! - **[`io`]**: Side-effecting collaborators (oracle and executor processes,
//!   prompts, persistence, config, operator console, completion sink).
//!
//! Orchestration modules ([`engine`], [`plan`], [`refine`], [`assess`],
//! [`looping`]) coordinate the two; [`response`] turns raw oracle text into
//! typed outcomes with a bounded repair cascade.

pub mod assess;
pub mod core;
pub mod engine;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod plan;
pub mod refine;
pub mod response;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
