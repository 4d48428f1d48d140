//! Evaluation context and the state threaded through actions

use crate::error::{Result, RuntimeError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use studyflow_core::{Participant, Report, StudyEvent};

/// Which participant state a participant-introspection expression reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateSource {
    /// The authoritative participant state
    Current,
    /// `event.merge_with_participant`, selected by the `incomingState:` prefix
    Incoming,
}

/// Read-only context for expression evaluation
///
/// Borrowed and `Copy`; nested evaluation passes it down with an increased
/// depth so malformed or cyclic rule data fails instead of overflowing the
/// stack.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub event: &'a StudyEvent,
    pub participant_state: &'a Participant,
    depth: usize,
}

impl<'a> EvalContext<'a> {
    pub fn new(event: &'a StudyEvent, participant_state: &'a Participant) -> Self {
        Self {
            event,
            participant_state,
            depth: 0,
        }
    }

    /// Nesting depth of the node currently evaluated
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn at_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Context for one level deeper, failing past `max_depth`
    pub(crate) fn descend(&self, max_depth: usize) -> Result<Self> {
        let depth = self.depth + 1;
        if depth > max_depth {
            return Err(RuntimeError::DepthLimitExceeded(max_depth));
        }
        Ok(self.at_depth(depth))
    }

    /// Same participant and depth, different event
    pub(crate) fn with_event<'b>(&self, event: &'b StudyEvent) -> EvalContext<'b>
    where
        'a: 'b,
    {
        EvalContext {
            event,
            participant_state: self.participant_state,
            depth: self.depth,
        }
    }

    /// Participant state selected by `source`
    pub fn state(&self, source: StateSource, expression: &str) -> Result<&'a Participant> {
        match source {
            StateSource::Current => Ok(self.participant_state),
            StateSource::Incoming => self
                .event
                .merge_with_participant
                .as_ref()
                .ok_or_else(|| RuntimeError::MissingIncomingState(expression.to_string())),
        }
    }
}

/// Working value threaded through action evaluation
///
/// Every action takes the previous `ActionData` by reference and returns a
/// new one; the input is never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionData {
    #[serde(rename = "pState")]
    pub participant_state: Participant,

    /// At most one report per key
    #[serde(rename = "reportsToCreate", default)]
    pub reports_to_create: HashMap<String, Report>,
}

impl ActionData {
    pub fn new(participant_state: Participant) -> Self {
        Self {
            participant_state,
            reports_to_create: HashMap::new(),
        }
    }

    /// Context for evaluating expressions against this state
    pub fn eval_context<'a>(&'a self, event: &'a StudyEvent) -> EvalContext<'a> {
        EvalContext::new(event, &self.participant_state)
    }
}
