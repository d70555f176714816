//! # Moderation Engine
//!
//! Moderator decisions on collaborations and counter proposals. Each call is
//! one read-modify-commit cycle against the record version:
//!
//! 1. Load the current record (and, for counters, its parent).
//! 2. Apply the domain transition to a copy. Repeating the decision that
//!    produced the current state, by the same moderator, short-circuits to
//!    `AlreadyApplied` and writes nothing.
//! 3. Commit with the versions read in step 1. A lost race re-reads and
//!    re-evaluates, so a competing decision that already moved the record
//!    surfaces as `InvalidTransition` rather than being overwritten.
//!
//! After [`MAX_CAS_ATTEMPTS`] lost races the call fails with `Conflict`.

use collab_core::{CollaborationId, CounterId, ModeratorId, Timestamp};
use collab_negotiation::{Collaboration, CounterProposal, ModerationAction, TransitionOutcome};

use crate::error::AppError;
use crate::state::{AppState, ChangeSet, CommitOutcome, MAX_CAS_ATTEMPTS};

/// A moderated collaboration and whether this call changed it.
#[derive(Debug, Clone)]
pub struct CollaborationDecision {
    pub collaboration: Collaboration,
    pub outcome: TransitionOutcome,
}

/// A moderated counter, its parent after the decision, and whether this
/// call changed them.
#[derive(Debug, Clone)]
pub struct CounterDecision {
    pub collaboration: Collaboration,
    pub counter: CounterProposal,
    pub outcome: TransitionOutcome,
}

/// Approve, reject or flag a collaboration.
pub async fn moderate_collaboration(
    state: &AppState,
    id: CollaborationId,
    moderator: ModeratorId,
    action: &ModerationAction,
) -> Result<CollaborationDecision, AppError> {
    action.validate()?;

    for attempt in 1..=MAX_CAS_ATTEMPTS {
        let current = state.load_collaboration(id).await?;
        let mut next = current.clone();
        let outcome = next.moderate(moderator, action, Timestamp::now())?;

        if !outcome.changed() {
            tracing::info!(
                collaboration_id = %id,
                moderator_id = %moderator,
                decision = action.decision().as_str(),
                "moderation decision already applied"
            );
            return Ok(CollaborationDecision {
                collaboration: current,
                outcome,
            });
        }

        let appended = &next.transitions[current.transitions.len()..];
        let changes = ChangeSet::update_collaboration(next.clone(), current.version)
            .with_transitions("collaboration", *id.as_uuid(), appended);
        match state.commit(changes).await? {
            CommitOutcome::Committed => {
                state.record_committed("collaboration", *id.as_uuid(), appended);
                return Ok(CollaborationDecision {
                    collaboration: next,
                    outcome,
                });
            }
            CommitOutcome::VersionConflict => {
                state.note_conflict("moderate_collaboration", id, attempt)
            }
        }
    }

    Err(retries_exhausted("collaboration", id))
}

/// Approve, reject or flag a counter proposal. Approve and reject also
/// move the parent collaboration, in the same commit.
pub async fn moderate_counter(
    state: &AppState,
    id: CounterId,
    moderator: ModeratorId,
    action: &ModerationAction,
) -> Result<CounterDecision, AppError> {
    action.validate()?;

    for attempt in 1..=MAX_CAS_ATTEMPTS {
        let counter = state.load_counter(id).await?;
        let parent = state.load_collaboration(counter.collaboration_id).await?;
        let mut next_counter = counter.clone();
        let mut next_parent = parent.clone();
        let outcome = next_counter.moderate(&mut next_parent, moderator, action, Timestamp::now())?;

        if !outcome.changed() {
            tracing::info!(
                counter_id = %id,
                moderator_id = %moderator,
                decision = action.decision().as_str(),
                "moderation decision already applied"
            );
            return Ok(CounterDecision {
                collaboration: parent,
                counter,
                outcome,
            });
        }

        let counter_appended = &next_counter.transitions[counter.transitions.len()..];
        let parent_appended = &next_parent.transitions[parent.transitions.len()..];
        let parent_uuid = *parent.id.as_uuid();

        let mut changes = if next_parent.version != parent.version {
            ChangeSet::update_collaboration(next_parent.clone(), parent.version)
        } else {
            ChangeSet::default()
        };
        changes = changes
            .with_counter(next_counter.clone(), counter.version)
            .with_transitions("counter_proposal", *id.as_uuid(), counter_appended)
            .with_transitions("collaboration", parent_uuid, parent_appended);

        match state.commit(changes).await? {
            CommitOutcome::Committed => {
                state.record_committed("counter_proposal", *id.as_uuid(), counter_appended);
                state.record_committed("collaboration", parent_uuid, parent_appended);
                return Ok(CounterDecision {
                    collaboration: next_parent,
                    counter: next_counter,
                    outcome,
                });
            }
            CommitOutcome::VersionConflict => state.note_conflict("moderate_counter", id, attempt),
        }
    }

    Err(retries_exhausted("counter proposal", id))
}

pub(crate) fn retries_exhausted(kind: &str, id: impl std::fmt::Display) -> AppError {
    tracing::warn!(
        kind,
        id = %id,
        max_attempts = MAX_CAS_ATTEMPTS,
        "gave up after repeated version conflicts"
    );
    AppError::Conflict(format!(
        "{kind} {id} was modified concurrently; re-read and retry"
    ))
}
