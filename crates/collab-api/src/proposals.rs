//! # Party Workflow
//!
//! Proposer and recipient operations: drafting, submission, responses, and
//! counter proposals. Free text is scanned at every write that carries it;
//! flags route the payload to review and never block the write.
//!
//! Updates follow the same read-modify-commit discipline as
//! [`crate::moderation`]. `submit_counter` commits the new counter and the
//! parent transition together, so two concurrent counters cannot both land:
//! the loser re-reads a parent already in `counter_pending_review` and
//! fails with `DuplicateActiveCounter`.

use collab_compliance::ComplianceFlags;
use collab_core::{CollaborationId, PartyRef, Timestamp};
use collab_negotiation::{
    original_terms, reconcile, Collaboration, CounterDraft, CounterProposal, FinalTerms, FormData,
};
use collab_state::{Action, CollaborationStatus};

use crate::auth::CallerIdentity;
use crate::db::audit::AuditEvent;
use crate::error::AppError;
use crate::moderation::retries_exhausted;
use crate::state::{AppState, ChangeSet, CommitOutcome, MAX_CAS_ATTEMPTS};

/// A party's response to a delivered proposal or counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyAction {
    Accept,
    Decline,
    AcceptCounter,
    DeclineCounter,
}

impl PartyAction {
    pub fn action(&self) -> Action {
        match self {
            Self::Accept => Action::Accept,
            Self::Decline => Action::Decline,
            Self::AcceptCounter => Action::AcceptCounter,
            Self::DeclineCounter => Action::DeclineCounter,
        }
    }
}

/// Scan the free-text fields of a payload.
pub fn scan_payload(state: &AppState, payload: &FormData) -> ComplianceFlags {
    let fields = payload.free_text();
    state
        .scanner
        .scan(fields.iter().map(|(path, text)| (*path, text.as_str())))
        .flags
}

/// Create a collaboration as a draft, or submit it straight away.
pub async fn create(
    state: &AppState,
    proposer: PartyRef,
    recipient: PartyRef,
    payload: FormData,
    submit: bool,
) -> Result<Collaboration, AppError> {
    let now = Timestamp::now();
    let mut record = Collaboration::new_draft(proposer, recipient, payload, now)?;
    if submit {
        let flags = scan_payload(state, &record.payload);
        record.submit(&proposer, flags, state.expiry_from(now)?, now)?;
    }

    let id = *record.id.as_uuid();
    let changes = ChangeSet::insert_collaboration(record.clone())
        .with_audit(AuditEvent::created("collaboration", id, proposer))
        .with_transitions("collaboration", id, &record.transitions);
    match state.commit(changes).await? {
        CommitOutcome::Committed => {}
        CommitOutcome::VersionConflict => {
            return Err(AppError::Internal(format!("collaboration id {id} already exists")))
        }
    }

    tracing::info!(
        collaboration_id = %record.id,
        collaboration_type = %record.collaboration_type(),
        proposer = %proposer,
        recipient = %recipient,
        status = %record.status,
        "collaboration created"
    );
    state.record_committed("collaboration", id, &record.transitions);
    state.metrics.record_flags(&record.compliance_flags);
    Ok(record)
}

/// Replace the payload of a draft.
pub async fn edit_draft(
    state: &AppState,
    id: CollaborationId,
    proposer: PartyRef,
    payload: FormData,
) -> Result<Collaboration, AppError> {
    update(state, id, "edit_draft", |record, now| {
        record.edit_draft(&proposer, payload.clone(), now)?;
        Ok(vec![AuditEvent::edited(*id.as_uuid(), proposer)])
    })
    .await
}

/// Scan a draft and send it to review.
pub async fn submit(
    state: &AppState,
    id: CollaborationId,
    proposer: PartyRef,
) -> Result<Collaboration, AppError> {
    let record = update(state, id, "submit", |record, now| {
        let flags = scan_payload(state, &record.payload);
        record.submit(&proposer, flags, state.expiry_from(now)?, now)?;
        Ok(Vec::new())
    })
    .await?;
    state.metrics.record_flags(&record.compliance_flags);
    Ok(record)
}

/// Accept or decline a delivered proposal or counter. The message is
/// scanned for the moderator record and relayed unmodified.
pub async fn respond(
    state: &AppState,
    id: CollaborationId,
    party: PartyRef,
    action: PartyAction,
    message: Option<String>,
) -> Result<Collaboration, AppError> {
    let flags = message
        .as_deref()
        .map(|m| state.scanner.scan_text(m))
        .unwrap_or_default();

    let record = update(state, id, action.action().as_str(), |record, now| {
        let (message, flags) = (message.clone(), flags.clone());
        match action {
            PartyAction::Accept => record.accept(&party, message, flags, now)?,
            PartyAction::Decline => record.decline(&party, message, flags, now)?,
            PartyAction::AcceptCounter => record.accept_counter(&party, message, flags, now)?,
            PartyAction::DeclineCounter => record.decline_counter(&party, message, flags, now)?,
        }
        Ok(Vec::new())
    })
    .await?;
    state.metrics.record_flags(&flags);
    Ok(record)
}

/// Validate, scan and store a counter, moving the parent to
/// `counter_pending_review` in the same commit.
pub async fn submit_counter(
    state: &AppState,
    id: CollaborationId,
    responder: PartyRef,
    draft: CounterDraft,
) -> Result<(Collaboration, CounterProposal), AppError> {
    for attempt in 1..=MAX_CAS_ATTEMPTS {
        let current = state.load_collaboration(id).await?;
        let now = Timestamp::now();
        let data = draft.clone().validate_for(&current, &responder, &now)?;

        let text = data.free_text();
        let flags = state
            .scanner
            .scan(text.iter().map(|(path, t)| (path.as_str(), t.as_str())))
            .flags;

        let mut parent = current.clone();
        let counter = CounterProposal::submit(&mut parent, &responder, data, flags, now)?;
        let appended = &parent.transitions[current.transitions.len()..];
        let changes = ChangeSet::update_collaboration(parent.clone(), current.version)
            .with_new_counter(counter.clone())
            .with_audit(AuditEvent::created(
                "counter_proposal",
                *counter.id.as_uuid(),
                responder,
            ))
            .with_transitions("collaboration", *id.as_uuid(), appended);

        match state.commit(changes).await? {
            CommitOutcome::Committed => {
                tracing::info!(
                    collaboration_id = %id,
                    counter_id = %counter.id,
                    responder = %responder,
                    flags = counter.compliance_flags.len(),
                    "counter proposal submitted"
                );
                state.record_committed("collaboration", *id.as_uuid(), appended);
                state.metrics.record_flags(&counter.compliance_flags);
                return Ok((parent, counter));
            }
            CommitOutcome::VersionConflict => state.note_conflict("submit_counter", id, attempt),
        }
    }

    Err(retries_exhausted("collaboration", id))
}

/// Agreed terms of a confirmed collaboration, for either party or a
/// moderator.
pub async fn final_terms(
    state: &AppState,
    id: CollaborationId,
    caller: &CallerIdentity,
) -> Result<FinalTerms, AppError> {
    let record = state.load_collaboration(id).await?;
    if let CallerIdentity::Party(party) = caller {
        if record.role_of(party).is_none() {
            return Err(not_visible(id));
        }
    }

    let status = record.effective_status(&Timestamp::now());
    if status != CollaborationStatus::Confirmed {
        return Err(AppError::InvalidTransition(format!(
            "final terms exist only for confirmed collaborations; {id} is {status}"
        )));
    }

    let via_counter = record
        .response
        .as_ref()
        .is_some_and(|r| r.action == Action::AcceptCounter);
    match (via_counter, record.latest_counter_id) {
        (true, Some(counter_id)) => {
            let counter = state.load_counter(counter_id).await?;
            Ok(reconcile(&record, &counter)?)
        }
        (true, None) => Err(AppError::Internal(format!(
            "collaboration {id} confirmed via counter but has no counter id"
        ))),
        (false, _) => Ok(original_terms(&record)),
    }
}

/// Persist every lazily-observed expiry. Returns the number converted.
pub async fn expire_due(state: &AppState, now: Timestamp) -> usize {
    let due: Vec<CollaborationId> = state
        .collaborations
        .list()
        .into_iter()
        .filter(|c| {
            c.status != CollaborationStatus::Expired
                && c.effective_status(&now) == CollaborationStatus::Expired
        })
        .map(|c| c.id)
        .collect();

    let mut expired = 0;
    for id in due {
        let result = update(state, id, "expire", |record, _| {
            record.expire_if_due(now)?;
            Ok(Vec::new())
        })
        .await;
        match result {
            Ok(record) if record.status == CollaborationStatus::Expired => expired += 1,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(collaboration_id = %id, error = %e, "expiry sweep skipped record")
            }
        }
    }
    if expired > 0 {
        tracing::info!(expired, "expiry sweep persisted expired collaborations");
    }
    expired
}

/// Not-found for a record that exists but is not the caller's to see.
pub(crate) fn not_visible(id: CollaborationId) -> AppError {
    AppError::NotFound(format!("collaboration {id} not found"))
}

/// Read-modify-commit a single collaboration. `apply` returns extra audit
/// events; appended transitions are audited automatically. An `apply` that
/// leaves the version unchanged commits nothing.
async fn update<F>(
    state: &AppState,
    id: CollaborationId,
    operation: &str,
    mut apply: F,
) -> Result<Collaboration, AppError>
where
    F: FnMut(&mut Collaboration, Timestamp) -> Result<Vec<AuditEvent>, AppError>,
{
    for attempt in 1..=MAX_CAS_ATTEMPTS {
        let current = state.load_collaboration(id).await?;
        let mut next = current.clone();
        let events = apply(&mut next, Timestamp::now())?;
        if next.version == current.version {
            return Ok(current);
        }

        let appended = &next.transitions[current.transitions.len()..];
        let mut changes = ChangeSet::update_collaboration(next.clone(), current.version)
            .with_transitions("collaboration", *id.as_uuid(), appended);
        changes.audit.extend(events);

        match state.commit(changes).await? {
            CommitOutcome::Committed => {
                state.record_committed("collaboration", *id.as_uuid(), appended);
                return Ok(next);
            }
            CommitOutcome::VersionConflict => state.note_conflict(operation, id, attempt),
        }
    }

    Err(retries_exhausted("collaboration", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::moderate_counter;
    use crate::test_support::{
        community, delivered_collaboration, moderator, pending_counter, venue, venue_payload,
    };
    use collab_compliance::{FlagCode, Priority};
    use collab_negotiation::{FieldResponse, ModerationAction, WorkflowError};
    use collab_state::CounterStatus;

    #[tokio::test]
    async fn create_draft_then_submit_scans_payload() {
        let state = AppState::try_new().unwrap();
        let (proposer, recipient) = (community(), venue());
        let draft = create(&state, proposer, recipient, venue_payload("Hello there"), false)
            .await
            .unwrap();
        assert_eq!(draft.status, CollaborationStatus::Draft);
        assert!(draft.expires_at.is_none());

        let edited = edit_draft(
            &state,
            draft.id,
            proposer,
            venue_payload("Call me at 9876543210"),
        )
        .await
        .unwrap();
        assert_eq!(edited.version, draft.version + 1);

        let submitted = submit(&state, draft.id, proposer).await.unwrap();
        assert_eq!(submitted.status, CollaborationStatus::PendingAdminReview);
        assert!(submitted.compliance_flags.contains(FlagCode::ContainsPhone));
        assert_eq!(submitted.priority, Priority::High);
        assert!(submitted.expires_at.is_some());
    }

    #[tokio::test]
    async fn contact_details_in_budget_are_flagged() {
        let state = AppState::try_new().unwrap();
        let mut payload = venue_payload("Looking forward to it");
        if let FormData::CommunityToVenue(p) = &mut payload {
            p.venue_request.budget_range = "call me at 9876543210".into();
        }
        let c = create(&state, community(), venue(), payload, true)
            .await
            .unwrap();
        assert!(c.compliance_flags.contains(FlagCode::ContainsPhone));
        assert_eq!(c.priority, Priority::High);
    }

    #[tokio::test]
    async fn only_the_proposer_may_submit() {
        let state = AppState::try_new().unwrap();
        let (proposer, recipient) = (community(), venue());
        let draft = create(&state, proposer, recipient, venue_payload("Hello"), false)
            .await
            .unwrap();
        let err = submit(&state, draft.id, recipient).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn decline_relays_message_and_keeps_flags() {
        let state = AppState::try_new().unwrap();
        let c = delivered_collaboration(&state).await;
        let message = "Not this month, email me at host@example.com".to_string();

        let declined = respond(
            &state,
            c.id,
            c.recipient,
            PartyAction::Decline,
            Some(message.clone()),
        )
        .await
        .unwrap();
        assert_eq!(declined.status, CollaborationStatus::Declined);
        let response = declined.response.unwrap();
        assert_eq!(response.message.as_deref(), Some(message.as_str()));
        assert!(response.compliance_flags.contains(FlagCode::ContainsEmail));
    }

    #[tokio::test]
    async fn proposer_cannot_accept_own_proposal() {
        let state = AppState::try_new().unwrap();
        let c = delivered_collaboration(&state).await;
        let err = respond(&state, c.id, c.proposer, PartyAction::Accept, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)), "{err}");
    }

    #[tokio::test]
    async fn second_counter_is_duplicate() {
        let state = AppState::try_new().unwrap();
        let (parent, _) = pending_counter(&state).await;
        let mut draft = CounterDraft::default();
        draft
            .field_responses
            .insert("timeSlot".into(), FieldResponse::modify("18:00-21:00"));

        let err = submit_counter(&state, parent.id, parent.recipient, draft)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateActiveCounter(_)), "{err}");
    }

    #[tokio::test]
    async fn unknown_counter_field_is_rejected() {
        let state = AppState::try_new().unwrap();
        let c = delivered_collaboration(&state).await;
        let mut draft = CounterDraft::default();
        draft
            .field_responses
            .insert("parkingSpots".into(), FieldResponse::accept());

        let err = submit_counter(&state, c.id, c.recipient, draft)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err: AppError = WorkflowError::UnknownField {
            field: "parkingSpots".into(),
        }
        .into();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn final_terms_follow_the_accepted_counter() {
        let state = AppState::try_new().unwrap();
        let (parent, counter) = pending_counter(&state).await;
        moderate_counter(
            &state,
            counter.id,
            moderator(),
            &ModerationAction::Approve { notes: None },
        )
        .await
        .unwrap();

        let caller = CallerIdentity::Party(parent.proposer);
        let err = final_terms(&state, parent.id, &caller).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        respond(&state, parent.id, parent.proposer, PartyAction::AcceptCounter, None)
            .await
            .unwrap();
        let terms = final_terms(&state, parent.id, &caller).await.unwrap();
        assert_eq!(terms.counter_id, Some(counter.id));
        assert_eq!(
            terms.get(collab_negotiation::FormField::BudgetRange),
            Some(&serde_json::json!("$900"))
        );
        assert_eq!(
            state.counters.get(counter.id.as_uuid()).unwrap().status,
            CounterStatus::ApprovedDelivered
        );

        let outsider = CallerIdentity::Party(community());
        let err = final_terms(&state, parent.id, &outsider).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn final_terms_without_counter_are_original() {
        let state = AppState::try_new().unwrap();
        let c = delivered_collaboration(&state).await;
        respond(&state, c.id, c.recipient, PartyAction::Accept, None)
            .await
            .unwrap();
        let terms = final_terms(&state, c.id, &CallerIdentity::Moderator(moderator()))
            .await
            .unwrap();
        assert_eq!(terms.counter_id, None);
        assert!(terms.removed_fields.is_empty());
    }

    #[tokio::test]
    async fn sweep_persists_lazy_expiry() {
        let state = AppState::try_new().unwrap();
        let c = delivered_collaboration(&state).await;
        let deadline = c.expires_at.unwrap();

        assert_eq!(expire_due(&state, deadline).await, 0);
        let later = deadline.plus_hours(1).unwrap();
        assert_eq!(expire_due(&state, later).await, 1);
        let stored = state.collaborations.get(c.id.as_uuid()).unwrap();
        assert_eq!(stored.status, CollaborationStatus::Expired);
        assert_eq!(expire_due(&state, later).await, 0);
    }
}
