//! Rule set runner
//!
//! Applies an ordered list of rules to one participant for one event. Each rule
//! is a top-level action; its output state is the input of the next rule.

use crate::context::ActionData;
use crate::engine::StudyEngine;
use crate::error::{Result, RuntimeError};
use serde::{Deserialize, Serialize};
use studyflow_core::{Expression, StudyEvent};
use tracing::{debug, warn};

/// What happens when a single rule fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleErrorPolicy {
    /// Keep the state from before the failing rule and go on with the next
    #[default]
    Continue,
    /// Stop and return the error
    Abort,
}

/// A rule that failed under `RuleErrorPolicy::Continue`
#[derive(Debug)]
pub struct RuleFailure {
    /// Position of the rule in the rule set
    pub index: usize,
    /// Name of the rule's top-level action
    pub rule: String,
    pub error: RuntimeError,
}

/// Result of applying a rule set
#[derive(Debug)]
pub struct RuleSetOutcome {
    pub state: ActionData,
    pub failures: Vec<RuleFailure>,
}

impl RuleSetOutcome {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl StudyEngine {
    /// Apply `rules` in order, starting from `state`
    ///
    /// A submission is recorded in `lastSubmissions` before the first rule,
    /// so it is kept even when every rule fails.
    pub async fn apply_rules(
        &self,
        rules: &[Expression],
        state: ActionData,
        event: &StudyEvent,
        policy: RuleErrorPolicy,
    ) -> Result<RuleSetOutcome> {
        let mut current = self.record_last_submission(&state, event);
        let mut failures = Vec::new();

        for (index, rule) in rules.iter().enumerate() {
            match self.eval_action(rule, &current, event).await {
                Ok(next) => current = next,
                Err(error) => match policy {
                    RuleErrorPolicy::Abort => {
                        return Err(RuntimeError::RuleFailed {
                            index,
                            source: Box::new(error),
                        })
                    }
                    RuleErrorPolicy::Continue => {
                        warn!(
                            index,
                            rule = %rule.name,
                            participant = %current.participant_state.participant_id,
                            error = %error,
                            "rule failed, continuing with next rule"
                        );
                        failures.push(RuleFailure {
                            index,
                            rule: rule.name.clone(),
                            error,
                        });
                    }
                },
            }
        }

        debug!(
            rules = rules.len(),
            failed = failures.len(),
            event_type = %event.event_type,
            "rule set applied"
        );

        Ok(RuleSetOutcome {
            state: current,
            failures,
        })
    }
}
