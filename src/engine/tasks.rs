//! Inference task variants and priority ordering.

use std::sync::Arc;

use crate::base::Priority;
use crate::kb::Assertion;
use crate::unify::Bindings;

use super::rules::Rule;

/// A unit of inference work consumed by the worker pool.
#[derive(Clone)]
pub enum InferenceTask {
    /// Complete the antecedent of `rule` starting from the bindings obtained
    /// by unifying one clause against the triggering assertion.
    MatchAntecedent {
        rule: Arc<Rule>,
        trigger: Arc<Assertion>,
        /// Index of the antecedent clause consumed by the trigger.
        clause_index: usize,
        bindings: Bindings,
    },
    /// Rewrite `target` with the oriented equality `rewrite_rule`.
    ApplyOrderedRewrite {
        rewrite_rule: Arc<Assertion>,
        target: Arc<Assertion>,
    },
}

impl InferenceTask {
    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            InferenceTask::MatchAntecedent { rule, trigger, .. } => {
                format!("match {} against {}", rule.id, trigger.id)
            }
            InferenceTask::ApplyOrderedRewrite {
                rewrite_rule,
                target,
            } => format!("rewrite {} with {}", target.id, rewrite_rule.id),
        }
    }
}

/// A task with scheduling metadata: highest priority first, FIFO within
/// equal priority via a monotonic sequence number.
pub struct PrioritizedTask {
    pub priority: Priority,
    pub seq: u64,
    pub task: InferenceTask,
}

impl PartialEq for PrioritizedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for PrioritizedTask {}

impl PartialOrd for PrioritizedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioritizedTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then(other.seq.cmp(&self.seq))
    }
}
