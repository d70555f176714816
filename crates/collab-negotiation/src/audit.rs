//! # Audit Records
//!
//! Who did what, and when. Every transition on a Collaboration or a
//! CounterProposal appends a [`TransitionRecord`]; records are never
//! deleted, so terminal items keep their full history.

use collab_core::{ModeratorId, PartyRef, Timestamp};
use collab_state::Action;
use serde::{Deserialize, Serialize};

/// The actor behind a transition. Always passed explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    Party {
        party: PartyRef,
    },
    Moderator {
        moderator_id: ModeratorId,
    },
    /// The service itself.
    System,
}

impl Actor {
    pub fn party(party: PartyRef) -> Self {
        Self::Party { party }
    }

    pub fn moderator(moderator_id: ModeratorId) -> Self {
        Self::Moderator { moderator_id }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Party { party } => write!(f, "{party}"),
            Self::Moderator { moderator_id } => write!(f, "moderator:{moderator_id}"),
            Self::System => f.write_str("system"),
        }
    }
}

/// One committed state change. `from_state` and `to_state` are wire names so
/// the same record type serves collaborations and counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub from_state: String,
    pub to_state: String,
    pub action: Action,
    pub actor: Actor,
    pub timestamp: Timestamp,
}

/// Whether a call changed state or found it already applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Transitioned,
    /// The same actor already moved the record to the requested state.
    AlreadyApplied,
}

impl TransitionOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, Self::Transitioned)
    }
}
