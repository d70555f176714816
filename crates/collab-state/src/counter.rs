//! # Counter Status
//!
//! A CounterProposal moves through a restricted subset of the Collaboration
//! vocabulary. Its moderator actions drive the parent's
//! `approve_counter` / `reject_counter` transitions; flagging a counter
//! leaves the parent in `counter_pending_review`.

use serde::{Deserialize, Serialize};

use crate::status::{Action, ActorRole};

/// Lifecycle status of a CounterProposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterStatus {
    PendingAdminReview,
    Flagged,
    /// Delivered; the parent renders this as `counter_delivered`.
    ApprovedDelivered,
    Rejected,
}

impl CounterStatus {
    pub const ALL: [CounterStatus; 4] = [
        Self::PendingAdminReview,
        Self::Flagged,
        Self::ApprovedDelivered,
        Self::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingAdminReview => "pending_admin_review",
            Self::Flagged => "flagged",
            Self::ApprovedDelivered => "approved_delivered",
            Self::Rejected => "rejected",
        }
    }

    /// Still awaiting a moderator decision. At most one active counter may
    /// exist per collaboration.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::PendingAdminReview | Self::Flagged)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Display for CounterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CounterStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("unknown counter status: {s:?}"))
    }
}

/// One row of the counter transition table. All counter transitions are
/// performed by a moderator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterTransitionRule {
    pub from: CounterStatus,
    pub action: Action,
    pub to: CounterStatus,
    /// Parent transition triggered alongside, if any.
    pub parent_action: Option<Action>,
}

pub const COUNTER_TRANSITIONS: &[CounterTransitionRule] = &[
    CounterTransitionRule {
        from: CounterStatus::PendingAdminReview,
        action: Action::Approve,
        to: CounterStatus::ApprovedDelivered,
        parent_action: Some(Action::ApproveCounter),
    },
    CounterTransitionRule {
        from: CounterStatus::PendingAdminReview,
        action: Action::Reject,
        to: CounterStatus::Rejected,
        parent_action: Some(Action::RejectCounter),
    },
    CounterTransitionRule {
        from: CounterStatus::PendingAdminReview,
        action: Action::Flag,
        to: CounterStatus::Flagged,
        parent_action: None,
    },
    CounterTransitionRule {
        from: CounterStatus::Flagged,
        action: Action::ApproveAnyway,
        to: CounterStatus::ApprovedDelivered,
        parent_action: Some(Action::ApproveCounter),
    },
    CounterTransitionRule {
        from: CounterStatus::Flagged,
        action: Action::Reject,
        to: CounterStatus::Rejected,
        parent_action: Some(Action::RejectCounter),
    },
];

/// Error for a counter transition the table does not allow.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid transition: {actor} cannot {action} a counter proposal in state {from}")]
pub struct CounterTransitionError {
    pub from: CounterStatus,
    pub action: Action,
    pub actor: ActorRole,
}

/// Look up a counter transition performed by a moderator.
pub fn counter_transition(
    from: CounterStatus,
    action: Action,
) -> Result<&'static CounterTransitionRule, CounterTransitionError> {
    COUNTER_TRANSITIONS
        .iter()
        .find(|r| r.from == from && r.action == action)
        .ok_or(CounterTransitionError {
            from,
            action,
            actor: ActorRole::Moderator,
        })
}
