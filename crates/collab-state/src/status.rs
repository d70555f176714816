//! # Collaboration Status and Transition Table

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Internal lifecycle status of a Collaboration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CollaborationStatus {
    /// Saved by the proposer, not yet submitted.
    Draft,
    /// Awaiting moderator review.
    PendingAdminReview,
    /// Moderator approved; visible to the recipient.
    ApprovedDelivered,
    /// Moderator blocked it before delivery (terminal).
    Rejected,
    /// Moderator set it aside for closer review.
    Flagged,
    /// Recipient countered; counter awaits moderator review.
    CounterPendingReview,
    /// Counter approved and delivered to the proposer.
    CounterDelivered,
    /// Both sides agreed (terminal).
    Confirmed,
    /// The counterpart saw it and chose not to proceed (terminal).
    Declined,
    /// Deadline passed while non-terminal (terminal).
    Expired,
}

impl CollaborationStatus {
    /// All statuses in declaration order.
    pub const ALL: [CollaborationStatus; 10] = [
        Self::Draft,
        Self::PendingAdminReview,
        Self::ApprovedDelivered,
        Self::Rejected,
        Self::Flagged,
        Self::CounterPendingReview,
        Self::CounterDelivered,
        Self::Confirmed,
        Self::Declined,
        Self::Expired,
    ];

    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingAdminReview => "pending_admin_review",
            Self::ApprovedDelivered => "approved_delivered",
            Self::Rejected => "rejected",
            Self::Flagged => "flagged",
            Self::CounterPendingReview => "counter_pending_review",
            Self::CounterDelivered => "counter_delivered",
            Self::Confirmed => "confirmed",
            Self::Declined => "declined",
            Self::Expired => "expired",
        }
    }

    /// Parse a stored or submitted status name.
    ///
    /// Accepts the canonical names and the legacy names found on historical
    /// records (`pending`, `approved`, `accepted`, `countered`, `counter_pending`).
    pub fn from_wire(s: &str) -> Option<Self> {
        let canonical = Self::ALL.into_iter().find(|st| st.as_str() == s);
        canonical.or(match s {
            "pending" => Some(Self::PendingAdminReview),
            "approved" => Some(Self::ApprovedDelivered),
            "accepted" => Some(Self::Confirmed),
            "counter_pending" => Some(Self::CounterPendingReview),
            "countered" => Some(Self::CounterDelivered),
            _ => None,
        })
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Declined | Self::Confirmed | Self::Expired
        )
    }

    /// Whether the recipient has ever been shown the proposal in this status.
    pub fn is_delivered(&self) -> bool {
        matches!(
            self,
            Self::ApprovedDelivered
                | Self::CounterPendingReview
                | Self::CounterDelivered
                | Self::Confirmed
                | Self::Declined
        )
    }

    /// Actions the table allows from this status.
    pub fn valid_actions(&self) -> Vec<Action> {
        TRANSITIONS
            .iter()
            .filter(|r| r.from == *self)
            .map(|r| r.action)
            .collect()
    }
}

impl std::fmt::Display for CollaborationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CollaborationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wire(s).ok_or_else(|| format!("unknown collaboration status: {s:?}"))
    }
}

impl Serialize for CollaborationStatus {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CollaborationStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// An action named in the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Submit,
    Approve,
    Reject,
    Flag,
    ApproveAnyway,
    Accept,
    Decline,
    SubmitCounter,
    ApproveCounter,
    RejectCounter,
    AcceptCounter,
    DeclineCounter,
    Expire,
}

impl Action {
    /// All actions in declaration order.
    pub const ALL: [Action; 13] = [
        Self::Submit,
        Self::Approve,
        Self::Reject,
        Self::Flag,
        Self::ApproveAnyway,
        Self::Accept,
        Self::Decline,
        Self::SubmitCounter,
        Self::ApproveCounter,
        Self::RejectCounter,
        Self::AcceptCounter,
        Self::DeclineCounter,
        Self::Expire,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Flag => "flag",
            Self::ApproveAnyway => "approve_anyway",
            Self::Accept => "accept",
            Self::Decline => "decline",
            Self::SubmitCounter => "submit_counter",
            Self::ApproveCounter => "approve_counter",
            Self::RejectCounter => "reject_counter",
            Self::AcceptCounter => "accept_counter",
            Self::DeclineCounter => "decline_counter",
            Self::Expire => "expire",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is allowed to perform a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Proposer,
    Recipient,
    Moderator,
    /// The service itself (persisted expiry sweep).
    System,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposer => "proposer",
            Self::Recipient => "recipient",
            Self::Moderator => "moderator",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: CollaborationStatus,
    pub action: Action,
    pub to: CollaborationStatus,
    pub actor: ActorRole,
}

const fn rule(
    from: CollaborationStatus,
    action: Action,
    to: CollaborationStatus,
    actor: ActorRole,
) -> TransitionRule {
    TransitionRule {
        from,
        action,
        to,
        actor,
    }
}

use ActorRole as R;
use CollaborationStatus as S;

/// The complete Collaboration transition table.
pub const TRANSITIONS: &[TransitionRule] = &[
    rule(S::Draft, Action::Submit, S::PendingAdminReview, R::Proposer),
    rule(S::PendingAdminReview, Action::Approve, S::ApprovedDelivered, R::Moderator),
    rule(S::PendingAdminReview, Action::Reject, S::Rejected, R::Moderator),
    rule(S::PendingAdminReview, Action::Flag, S::Flagged, R::Moderator),
    rule(S::Flagged, Action::ApproveAnyway, S::ApprovedDelivered, R::Moderator),
    rule(S::Flagged, Action::Reject, S::Rejected, R::Moderator),
    rule(S::ApprovedDelivered, Action::Accept, S::Confirmed, R::Recipient),
    rule(S::ApprovedDelivered, Action::Decline, S::Declined, R::Recipient),
    rule(S::ApprovedDelivered, Action::SubmitCounter, S::CounterPendingReview, R::Recipient),
    rule(S::CounterPendingReview, Action::ApproveCounter, S::CounterDelivered, R::Moderator),
    rule(S::CounterPendingReview, Action::RejectCounter, S::ApprovedDelivered, R::Moderator),
    rule(S::CounterDelivered, Action::AcceptCounter, S::Confirmed, R::Proposer),
    rule(S::CounterDelivered, Action::DeclineCounter, S::Declined, R::Proposer),
    rule(S::Draft, Action::Expire, S::Expired, R::System),
    rule(S::PendingAdminReview, Action::Expire, S::Expired, R::System),
    rule(S::Flagged, Action::Expire, S::Expired, R::System),
    rule(S::ApprovedDelivered, Action::Expire, S::Expired, R::System),
    rule(S::CounterPendingReview, Action::Expire, S::Expired, R::System),
    rule(S::CounterDelivered, Action::Expire, S::Expired, R::System),
];

/// A transition the table does not allow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid transition: {actor} cannot {action} a collaboration in state {from}")]
pub struct TransitionError {
    pub from: CollaborationStatus,
    pub action: Action,
    pub actor: ActorRole,
}

/// Look up the target status for `action` performed by `actor` from `from`.
pub fn transition(
    from: CollaborationStatus,
    action: Action,
    actor: ActorRole,
) -> Result<CollaborationStatus, TransitionError> {
    TRANSITIONS
        .iter()
        .find(|r| r.from == from && r.action == action && r.actor == actor)
        .map(|r| r.to)
        .ok_or(TransitionError {
            from,
            action,
            actor,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_no_duplicate_keys() {
        for (i, a) in TRANSITIONS.iter().enumerate() {
            for b in &TRANSITIONS[i + 1..] {
                assert!(
                    !(a.from == b.from && a.action == b.action),
                    "duplicate rule for ({}, {})",
                    a.from,
                    a.action
                );
            }
        }
    }

    #[test]
    fn terminal_states_have_no_outgoing_rules() {
        for st in CollaborationStatus::ALL {
            if st.is_terminal() {
                assert!(st.valid_actions().is_empty(), "{st} has outgoing rules");
            }
        }
    }

    #[test]
    fn every_non_terminal_state_can_expire() {
        for st in CollaborationStatus::ALL {
            if !st.is_terminal() {
                assert_eq!(
                    transition(st, Action::Expire, ActorRole::System),
                    Ok(CollaborationStatus::Expired)
                );
            }
        }
    }

    #[test]
    fn wrong_actor_is_invalid_transition() {
        let err = transition(
            CollaborationStatus::ApprovedDelivered,
            Action::Accept,
            ActorRole::Proposer,
        )
        .unwrap_err();
        assert_eq!(err.from, CollaborationStatus::ApprovedDelivered);
        assert_eq!(err.action, Action::Accept);
        assert!(err.to_string().contains("approved_delivered"));
        assert!(err.to_string().contains("accept"));
    }

    #[test]
    fn counter_rejection_reopens_original() {
        assert_eq!(
            transition(
                CollaborationStatus::CounterPendingReview,
                Action::RejectCounter,
                ActorRole::Moderator
            ),
            Ok(CollaborationStatus::ApprovedDelivered)
        );
    }

    #[test]
    fn status_serde_is_snake_case() {
        let json = serde_json::to_string(&CollaborationStatus::CounterPendingReview).unwrap();
        assert_eq!(json, "\"counter_pending_review\"");
        for st in CollaborationStatus::ALL {
            let back: CollaborationStatus =
                serde_json::from_str(&format!("\"{}\"", st.as_str())).unwrap();
            assert_eq!(back, st);
        }
    }

    #[test]
    fn legacy_status_names_map_to_canonical() {
        assert_eq!(
            CollaborationStatus::from_wire("pending"),
            Some(CollaborationStatus::PendingAdminReview)
        );
        assert_eq!(
            CollaborationStatus::from_wire("accepted"),
            Some(CollaborationStatus::Confirmed)
        );
        let back: CollaborationStatus = serde_json::from_str("\"approved\"").unwrap();
        assert_eq!(back, CollaborationStatus::ApprovedDelivered);
        assert_eq!(
            serde_json::to_string(&back).unwrap(),
            "\"approved_delivered\""
        );
        assert!(CollaborationStatus::from_wire("archived").is_none());
    }

    #[test]
    fn rejected_and_declined_are_distinct_terminals() {
        assert_ne!(CollaborationStatus::Rejected, CollaborationStatus::Declined);
        assert!(CollaborationStatus::Rejected.is_terminal());
        assert!(CollaborationStatus::Declined.is_terminal());
        assert!(!CollaborationStatus::Rejected.is_delivered());
        assert!(CollaborationStatus::Declined.is_delivered());
    }
}
