//! # Workflow Errors
//!
//! The error taxonomy every workflow operation reports through. Messages
//! carry full detail; deciding what a party may see is the API layer's job.

use collab_core::CollaborationId;
use collab_state::{Action, CounterTransitionError, TransitionError};
use thiserror::Error;

/// Errors from proposal, counter, and moderation operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Malformed input: missing field, short reason, wrong value kind.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A counter responded to a field the parent payload does not have.
    #[error("unknown field {field:?}: not present in the original proposal")]
    UnknownField {
        field: String,
    },

    /// The action is not legal from the current state for this actor.
    #[error("invalid transition: cannot {action} from state {state}")]
    InvalidTransition {
        /// Current state name.
        state: String,
        /// Attempted action.
        action: Action,
    },

    /// An active counter already exists for the collaboration.
    #[error("collaboration {collaboration_id} already has a counter awaiting review")]
    DuplicateActiveCounter {
        collaboration_id: CollaborationId,
    },

    /// Unknown id.
    #[error("{kind} {id} not found")]
    NotFound {
        kind: &'static str,
        id: String,
    },

    /// The acting party is not the party this operation requires.
    #[error("{actor} is not a party permitted to perform this action")]
    NotParty {
        actor: String,
    },
}

impl WorkflowError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn collaboration_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind: "collaboration",
            id: id.to_string(),
        }
    }

    pub fn counter_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind: "counter proposal",
            id: id.to_string(),
        }
    }
}

impl From<TransitionError> for WorkflowError {
    fn from(err: TransitionError) -> Self {
        Self::InvalidTransition {
            state: err.from.as_str().to_string(),
            action: err.action,
        }
    }
}

impl From<CounterTransitionError> for WorkflowError {
    fn from(err: CounterTransitionError) -> Self {
        Self::InvalidTransition {
            state: format!("counter:{}", err.from.as_str()),
            action: err.action,
        }
    }
}
