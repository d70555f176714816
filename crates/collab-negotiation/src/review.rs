//! # Moderator Review
//!
//! The moderator's decision on a collaboration or counter. `notes` and
//! `flag_reason` are always private. `rejection_reason` is retained for the
//! audit trail and analytics; the rejected party only ever sees the fixed
//! notice from `collab_state::REJECTION_NOTICE`.

use collab_core::{ModeratorId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// Minimum length of a rejection reason, in characters after trimming.
pub const MIN_REJECTION_REASON: usize = 10;
/// Minimum length of a flag reason, in characters after trimming.
pub const MIN_FLAG_REASON: usize = 5;
/// Maximum length of any moderator-authored text.
pub const MAX_REVIEW_TEXT: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
    Flagged,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Flagged => "flagged",
        }
    }
}

/// The latest moderator review of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminReview {
    pub reviewer_id: ModeratorId,
    pub reviewed_at: Timestamp,
    pub decision: ReviewDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Survives a later approve-anyway so the flag stays on the audit record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag_reason: Option<String>,
}

impl AdminReview {
    /// Whether this review is `decision` by `moderator`.
    pub fn is(&self, moderator: ModeratorId, decision: ReviewDecision) -> bool {
        self.reviewer_id == moderator && self.decision == decision
    }
}

/// A moderator action with its inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationAction {
    Approve {
        notes: Option<String>,
    },
    Reject {
        rejection_reason: String,
        notes: Option<String>,
    },
    Flag {
        flag_reason: String,
        notes: Option<String>,
    },
}

impl ModerationAction {
    pub fn decision(&self) -> ReviewDecision {
        match self {
            Self::Approve { .. } => ReviewDecision::Approved,
            Self::Reject { .. } => ReviewDecision::Rejected,
            Self::Flag { .. } => ReviewDecision::Flagged,
        }
    }

    /// Enforce the reason-length contract server-side.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        let notes = match self {
            Self::Approve { notes } => notes,
            Self::Reject {
                rejection_reason,
                notes,
            } => {
                require_len("rejectionReason", rejection_reason, MIN_REJECTION_REASON)?;
                notes
            }
            Self::Flag { flag_reason, notes } => {
                require_len("flagReason", flag_reason, MIN_FLAG_REASON)?;
                notes
            }
        };
        if let Some(n) = notes {
            if n.chars().count() > MAX_REVIEW_TEXT {
                return Err(WorkflowError::validation(format!(
                    "adminNotes must be at most {MAX_REVIEW_TEXT} characters"
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn notes(&self) -> Option<String> {
        match self {
            Self::Approve { notes } | Self::Reject { notes, .. } | Self::Flag { notes, .. } => {
                notes.clone()
            }
        }
    }

    /// Build the review this action records, carrying a prior flag reason forward.
    pub(crate) fn to_review(
        &self,
        moderator: ModeratorId,
        previous: Option<&AdminReview>,
        now: Timestamp,
    ) -> AdminReview {
        let prior_flag = previous.and_then(|r| r.flag_reason.clone());
        let (rejection_reason, flag_reason) = match self {
            Self::Approve { .. } => (None, prior_flag),
            Self::Reject {
                rejection_reason, ..
            } => (Some(rejection_reason.trim().to_string()), prior_flag),
            Self::Flag { flag_reason, .. } => (None, Some(flag_reason.trim().to_string())),
        };
        AdminReview {
            reviewer_id: moderator,
            reviewed_at: now,
            decision: self.decision(),
            notes: self.notes(),
            rejection_reason,
            flag_reason,
        }
    }
}

fn require_len(field: &str, value: &str, min: usize) -> Result<(), WorkflowError> {
    let len = value.trim().chars().count();
    if len < min {
        return Err(WorkflowError::validation(format!(
            "{field} must be at least {min} characters (got {len})"
        )));
    }
    if len > MAX_REVIEW_TEXT {
        return Err(WorkflowError::validation(format!(
            "{field} must be at most {MAX_REVIEW_TEXT} characters"
        )));
    }
    Ok(())
}
