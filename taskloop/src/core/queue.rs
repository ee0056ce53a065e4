//! Pending task queue and the policy for replacing it with oracle candidates.

use std::collections::VecDeque;

use crate::core::types::{CompletedTasks, TaskUpdate};

/// Whether the oracle may schedule a task that was already attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatPolicy {
    /// Trust the oracle's list as-is.
    Allow,
    /// Drop candidates that already appear in the completed-task ledger.
    Skip,
}

impl RepeatPolicy {
    pub fn from_allow(allow_repeat_tasks: bool) -> Self {
        if allow_repeat_tasks {
            Self::Allow
        } else {
            Self::Skip
        }
    }
}

/// Ordered pending task descriptions; front is executed next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskQueue {
    tasks: VecDeque<String>,
    policy: RepeatPolicy,
}

impl TaskQueue {
    pub fn new(policy: RepeatPolicy) -> Self {
        Self {
            tasks: VecDeque::new(),
            policy,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn pop_front(&mut self) -> Option<String> {
        self.tasks.pop_front()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.tasks.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    /// Replace the queue with `candidates` filtered through the repeat policy.
    ///
    /// Blank descriptions are never queued. Under [`RepeatPolicy::Skip`] no
    /// entry that is a key of `completed` at call time enters the queue.
    pub fn replace(&mut self, candidates: Vec<String>, completed: &CompletedTasks) -> TaskUpdate {
        let update = filter_candidates(self.policy, candidates, completed);
        self.tasks = update.kept.iter().cloned().collect();
        update
    }
}

/// Split candidates into kept and skipped entries, preserving oracle order.
pub fn filter_candidates(
    policy: RepeatPolicy,
    candidates: Vec<String>,
    completed: &CompletedTasks,
) -> TaskUpdate {
    let mut update = TaskUpdate::default();
    for candidate in candidates {
        let blank = candidate.trim().is_empty();
        let repeated = policy == RepeatPolicy::Skip && completed.contains_key(&candidate);
        if blank || repeated {
            update.skipped.push(candidate);
        } else {
            update.kept.push(candidate);
        }
    }
    update
}
