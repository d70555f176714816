//! # Collaboration — the ProposalStore Record
//!
//! The authoritative record of one proposal between two parties. Every
//! mutation goes through a method here, each of which consults the
//! transition table, appends a [`TransitionRecord`], and bumps `version`.
//! Persistence commits the mutated copy only if the stored `version` still
//! equals the one it was read at.
//!
//! Expiry is lazy: [`Collaboration::effective_status`] reports `expired` for
//! a non-terminal record past `expires_at` without any write, and every
//! transition is checked against the effective status.

use collab_compliance::{ComplianceFlags, Priority};
use collab_core::{CollaborationId, CounterId, ModeratorId, PartyRef, Timestamp};
use collab_state::{transition, Action, ActorRole, CollaborationStatus, ViewerRole};
use serde::{Deserialize, Serialize};

use crate::audit::{Actor, TransitionOutcome, TransitionRecord};
use crate::error::WorkflowError;
use crate::payload::{CollaborationType, FormData};
use crate::review::{AdminReview, ModerationAction, ReviewDecision};

/// Maximum length of a party response message.
pub const MAX_RESPONSE_MESSAGE: usize = 2_000;

/// A party's direct answer to the other side. Relayed unmodified; the
/// compliance flags are kept for moderators only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyResponse {
    pub responder: PartyRef,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub compliance_flags: ComplianceFlags,
    pub responded_at: Timestamp,
}

/// The proposal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaboration {
    pub id: CollaborationId,
    pub proposer: PartyRef,
    pub recipient: PartyRef,
    pub payload: FormData,
    pub status: CollaborationStatus,
    pub compliance_flags: ComplianceFlags,
    /// Base priority from compliance severity at submission.
    pub priority: Priority,
    pub has_counter: bool,
    pub latest_counter_id: Option<CounterId>,
    pub admin_review: Option<AdminReview>,
    pub response: Option<PartyResponse>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub submitted_at: Option<Timestamp>,
    pub delivered_at: Option<Timestamp>,
    pub expires_at: Option<Timestamp>,
    /// Optimistic-concurrency counter, incremented by every transition.
    pub version: u64,
    pub transitions: Vec<TransitionRecord>,
}

impl Collaboration {
    /// Create a draft. Checks party distinctness, that the parties match the
    /// payload's direction, and payload business rules.
    pub fn new_draft(
        proposer: PartyRef,
        recipient: PartyRef,
        payload: FormData,
        now: Timestamp,
    ) -> Result<Self, WorkflowError> {
        check_parties(&proposer, &recipient, payload.collaboration_type())?;
        payload.validate()?;
        Ok(Self {
            id: CollaborationId::new(),
            proposer,
            recipient,
            payload,
            status: CollaborationStatus::Draft,
            compliance_flags: ComplianceFlags::new(),
            priority: Priority::Low,
            has_counter: false,
            latest_counter_id: None,
            admin_review: None,
            response: None,
            created_at: now,
            updated_at: now,
            submitted_at: None,
            delivered_at: None,
            expires_at: None,
            version: 0,
            transitions: Vec::new(),
        })
    }

    pub fn collaboration_type(&self) -> CollaborationType {
        self.payload.collaboration_type()
    }

    /// Status as any reader must present it: `expired` once a non-terminal
    /// record is past its deadline.
    pub fn effective_status(&self, now: &Timestamp) -> CollaborationStatus {
        match self.expires_at {
            Some(deadline) if !self.status.is_terminal() && *now > deadline => {
                CollaborationStatus::Expired
            }
            _ => self.status,
        }
    }

    /// Which side `party` is on, if either.
    pub fn role_of(&self, party: &PartyRef) -> Option<ViewerRole> {
        if *party == self.proposer {
            Some(ViewerRole::Submitter)
        } else if *party == self.recipient {
            Some(ViewerRole::Recipient)
        } else {
            None
        }
    }

    /// Whether the recipient has ever been shown this proposal.
    pub fn was_delivered(&self) -> bool {
        self.delivered_at.is_some()
    }

    // ── Proposer operations ──────────────────────────────────────────

    /// Replace the payload of a draft.
    pub fn edit_draft(
        &mut self,
        proposer: &PartyRef,
        payload: FormData,
        now: Timestamp,
    ) -> Result<(), WorkflowError> {
        self.require_proposer(proposer)?;
        if self.effective_status(&now) != CollaborationStatus::Draft {
            return Err(WorkflowError::validation("only drafts can be edited"));
        }
        check_parties(&self.proposer, &self.recipient, payload.collaboration_type())?;
        payload.validate()?;
        self.payload = payload;
        self.updated_at = now;
        self.version += 1;
        Ok(())
    }

    /// DRAFT → PENDING_ADMIN_REVIEW. Attaches the scan result and deadline.
    pub fn submit(
        &mut self,
        proposer: &PartyRef,
        flags: ComplianceFlags,
        expires_at: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<(), WorkflowError> {
        self.require_proposer(proposer)?;
        self.payload.validate()?;
        self.apply(Action::Submit, ActorRole::Proposer, Actor::party(*proposer), now)?;
        self.priority = Priority::from_severity(flags.severity());
        self.compliance_flags = flags;
        self.submitted_at = Some(now);
        if self.expires_at.is_none() {
            self.expires_at = expires_at;
        }
        Ok(())
    }

    // ── Moderator operations ─────────────────────────────────────────

    /// Apply a moderator decision. Repeating the decision that produced the
    /// current state, by the same moderator, returns `AlreadyApplied`.
    pub fn moderate(
        &mut self,
        moderator: ModeratorId,
        action: &ModerationAction,
        now: Timestamp,
    ) -> Result<TransitionOutcome, WorkflowError> {
        action.validate()?;
        let current = self.effective_status(&now);
        let (table_action, target) = match (action, current) {
            (ModerationAction::Approve { .. }, CollaborationStatus::Flagged) => {
                (Action::ApproveAnyway, CollaborationStatus::ApprovedDelivered)
            }
            (ModerationAction::Approve { .. }, _) => {
                (Action::Approve, CollaborationStatus::ApprovedDelivered)
            }
            (ModerationAction::Reject { .. }, _) => (Action::Reject, CollaborationStatus::Rejected),
            (ModerationAction::Flag { .. }, _) => (Action::Flag, CollaborationStatus::Flagged),
        };

        if current == target
            && self
                .admin_review
                .as_ref()
                .is_some_and(|r| r.is(moderator, action.decision()))
        {
            return Ok(TransitionOutcome::AlreadyApplied);
        }

        self.apply(table_action, ActorRole::Moderator, Actor::moderator(moderator), now)?;
        self.admin_review = Some(action.to_review(moderator, self.admin_review.as_ref(), now));
        if action.decision() == ReviewDecision::Approved {
            self.delivered_at = Some(now);
        }
        Ok(TransitionOutcome::Transitioned)
    }

    // ── Recipient operations ─────────────────────────────────────────

    /// APPROVED_DELIVERED → CONFIRMED.
    pub fn accept(
        &mut self,
        party: &PartyRef,
        message: Option<String>,
        flags: ComplianceFlags,
        now: Timestamp,
    ) -> Result<(), WorkflowError> {
        self.respond(Action::Accept, party, message, flags, now)
    }

    /// APPROVED_DELIVERED → DECLINED.
    pub fn decline(
        &mut self,
        party: &PartyRef,
        message: Option<String>,
        flags: ComplianceFlags,
        now: Timestamp,
    ) -> Result<(), WorkflowError> {
        self.respond(Action::Decline, party, message, flags, now)
    }

    /// APPROVED_DELIVERED → COUNTER_PENDING_REVIEW, recording the counter.
    ///
    /// Fails with `DuplicateActiveCounter` while a counter is awaiting review.
    pub fn begin_counter(
        &mut self,
        party: &PartyRef,
        counter_id: CounterId,
        now: Timestamp,
    ) -> Result<(), WorkflowError> {
        let role = self.actor_role(party)?;
        if self.effective_status(&now) == CollaborationStatus::CounterPendingReview {
            return Err(WorkflowError::DuplicateActiveCounter {
                collaboration_id: self.id,
            });
        }
        self.apply(Action::SubmitCounter, role, Actor::party(*party), now)?;
        self.has_counter = true;
        self.latest_counter_id = Some(counter_id);
        Ok(())
    }

    /// Parent side of a counter decision (`approve_counter` / `reject_counter`).
    pub fn apply_counter_decision(
        &mut self,
        action: Action,
        counter_id: CounterId,
        moderator: ModeratorId,
        now: Timestamp,
    ) -> Result<(), WorkflowError> {
        if self.latest_counter_id != Some(counter_id) {
            return Err(WorkflowError::validation(format!(
                "counter {counter_id} is not the latest counter of collaboration {}",
                self.id
            )));
        }
        self.apply(action, ActorRole::Moderator, Actor::moderator(moderator), now)?;
        Ok(())
    }

    // ── Proposer responses to a counter ──────────────────────────────

    /// COUNTER_DELIVERED → CONFIRMED.
    pub fn accept_counter(
        &mut self,
        party: &PartyRef,
        message: Option<String>,
        flags: ComplianceFlags,
        now: Timestamp,
    ) -> Result<(), WorkflowError> {
        self.respond(Action::AcceptCounter, party, message, flags, now)
    }

    /// COUNTER_DELIVERED → DECLINED.
    pub fn decline_counter(
        &mut self,
        party: &PartyRef,
        message: Option<String>,
        flags: ComplianceFlags,
        now: Timestamp,
    ) -> Result<(), WorkflowError> {
        self.respond(Action::DeclineCounter, party, message, flags, now)
    }

    // ── Expiry ───────────────────────────────────────────────────────

    /// Persist a lazily-observed expiry. Returns `false` if not yet due.
    pub fn expire_if_due(&mut self, now: Timestamp) -> Result<bool, WorkflowError> {
        if self.effective_status(&now) != CollaborationStatus::Expired
            || self.status == CollaborationStatus::Expired
        {
            return Ok(false);
        }
        let to = transition(self.status, Action::Expire, ActorRole::System)?;
        self.record_transition(self.status, to, Action::Expire, Actor::System, now);
        Ok(true)
    }

    // ── Internals ────────────────────────────────────────────────────

    fn respond(
        &mut self,
        action: Action,
        party: &PartyRef,
        message: Option<String>,
        flags: ComplianceFlags,
        now: Timestamp,
    ) -> Result<(), WorkflowError> {
        let role = self.actor_role(party)?;
        let message = normalize_message(message)?;
        self.apply(action, role, Actor::party(*party), now)?;
        self.response = Some(PartyResponse {
            responder: *party,
            action,
            message,
            compliance_flags: flags,
            responded_at: now,
        });
        Ok(())
    }

    fn require_proposer(&self, party: &PartyRef) -> Result<(), WorkflowError> {
        match self.role_of(party) {
            Some(ViewerRole::Submitter) => Ok(()),
            _ => Err(WorkflowError::NotParty {
                actor: party.to_string(),
            }),
        }
    }

    fn actor_role(&self, party: &PartyRef) -> Result<ActorRole, WorkflowError> {
        match self.role_of(party) {
            Some(ViewerRole::Submitter) => Ok(ActorRole::Proposer),
            Some(ViewerRole::Recipient) => Ok(ActorRole::Recipient),
            None => Err(WorkflowError::NotParty {
                actor: party.to_string(),
            }),
        }
    }

    fn apply(
        &mut self,
        action: Action,
        role: ActorRole,
        actor: Actor,
        now: Timestamp,
    ) -> Result<(), WorkflowError> {
        let from = self.effective_status(&now);
        let to = transition(from, action, role)?;
        self.record_transition(from, to, action, actor, now);
        Ok(())
    }

    fn record_transition(
        &mut self,
        from: CollaborationStatus,
        to: CollaborationStatus,
        action: Action,
        actor: Actor,
        now: Timestamp,
    ) {
        self.transitions.push(TransitionRecord {
            from_state: from.as_str().to_string(),
            to_state: to.as_str().to_string(),
            action,
            actor,
            timestamp: now,
        });
        self.status = to;
        self.updated_at = now;
        self.version += 1;
    }
}

fn check_parties(
    proposer: &PartyRef,
    recipient: &PartyRef,
    ty: CollaborationType,
) -> Result<(), WorkflowError> {
    if proposer.party_id == recipient.party_id {
        return Err(WorkflowError::validation(
            "proposer and recipient must be different parties",
        ));
    }
    let (from, to) = ty.parties();
    if proposer.party_type != from || recipient.party_type != to {
        return Err(WorkflowError::validation(format!(
            "{ty} requires a {from} proposer and a {to} recipient, got {} and {}",
            proposer.party_type, recipient.party_type
        )));
    }
    Ok(())
}

fn normalize_message(message: Option<String>) -> Result<Option<String>, WorkflowError> {
    let Some(message) = message else {
        return Ok(None);
    };
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_RESPONSE_MESSAGE {
        return Err(WorkflowError::validation(format!(
            "responseMessage must be at most {MAX_RESPONSE_MESSAGE} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::payload::tests::venue_request_payload;
    use collab_compliance::FlagCode;
    use collab_core::PartyId;

    pub(crate) fn t(hours: i64) -> Timestamp {
        Timestamp::parse("2026-10-01T08:00:00Z").unwrap().plus_hours(hours).unwrap()
    }

    pub(crate) fn parties() -> (PartyRef, PartyRef) {
        (
            PartyRef::community(PartyId::new()),
            PartyRef::venue(PartyId::new()),
        )
    }

    pub(crate) fn submitted() -> Collaboration {
        let (p, r) = parties();
        let mut c = Collaboration::new_draft(p, r, venue_request_payload(), t(0)).unwrap();
        c.submit(&p, ComplianceFlags::new(), Some(t(24 * 30)), t(0))
            .unwrap();
        c
    }

    pub(crate) fn delivered() -> Collaboration {
        let mut c = submitted();
        c.moderate(ModeratorId::new(), &ModerationAction::Approve { notes: None }, t(1))
            .unwrap();
        c
    }

    fn reject_action() -> ModerationAction {
        ModerationAction::Reject {
            rejection_reason: "contains a phone number".into(),
            notes: Some("private note".into()),
        }
    }

    #[test]
    fn draft_requires_distinct_parties() {
        let p = PartyRef::community(PartyId::new());
        let err = Collaboration::new_draft(p, p, venue_request_payload(), t(0)).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn draft_requires_parties_matching_direction() {
        let err = Collaboration::new_draft(
            PartyRef::brand(PartyId::new()),
            PartyRef::venue(PartyId::new()),
            venue_request_payload(),
            t(0),
        )
        .unwrap_err();
        assert!(err.to_string().contains("communityToVenue"));
    }

    #[test]
    fn submit_moves_to_review_and_sets_priority() {
        let (p, r) = parties();
        let mut c = Collaboration::new_draft(p, r, venue_request_payload(), t(0)).unwrap();
        let flags: ComplianceFlags = [FlagCode::ContainsPhone].into_iter().collect();
        c.submit(&p, flags, None, t(0)).unwrap();
        assert_eq!(c.status, CollaborationStatus::PendingAdminReview);
        assert_eq!(c.priority, Priority::High);
        assert_eq!(c.version, 1);
        assert_eq!(c.transitions.len(), 1);
        assert_eq!(c.transitions[0].action, Action::Submit);
    }

    #[test]
    fn recipient_cannot_submit() {
        let (p, r) = parties();
        let mut c = Collaboration::new_draft(p, r, venue_request_payload(), t(0)).unwrap();
        let err = c.submit(&r, ComplianceFlags::new(), None, t(0)).unwrap_err();
        assert!(matches!(err, WorkflowError::NotParty { .. }));
    }

    #[test]
    fn approve_delivers_and_is_idempotent_for_same_moderator() {
        let mut c = submitted();
        let m = ModeratorId::new();
        let approve = ModerationAction::Approve {
            notes: Some("looks fine".into()),
        };
        assert_eq!(c.moderate(m, &approve, t(1)).unwrap(), TransitionOutcome::Transitioned);
        let after_first = c.clone();
        assert_eq!(
            c.moderate(m, &approve, t(2)).unwrap(),
            TransitionOutcome::AlreadyApplied
        );
        assert_eq!(c, after_first);
        assert_eq!(c.status, CollaborationStatus::ApprovedDelivered);
        assert_eq!(c.delivered_at, Some(t(1)));
    }

    #[test]
    fn approve_by_other_moderator_after_approval_is_invalid() {
        let mut c = submitted();
        let approve = ModerationAction::Approve { notes: None };
        c.moderate(ModeratorId::new(), &approve, t(1)).unwrap();
        let err = c.moderate(ModeratorId::new(), &approve, t(2)).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    }

    #[test]
    fn approving_a_rejected_proposal_fails() {
        let mut c = submitted();
        let m = ModeratorId::new();
        c.moderate(m, &reject_action(), t(1)).unwrap();
        let err = c
            .moderate(m, &ModerationAction::Approve { notes: None }, t(2))
            .unwrap_err();
        assert_eq!(
            err,
            WorkflowError::InvalidTransition {
                state: "rejected".into(),
                action: Action::Approve
            }
        );
    }

    #[test]
    fn flag_then_approve_anyway_keeps_flag_reason() {
        let mut c = submitted();
        let m = ModeratorId::new();
        c.moderate(
            m,
            &ModerationAction::Flag {
                flag_reason: "phone number".into(),
                notes: None,
            },
            t(1),
        )
        .unwrap();
        assert_eq!(c.status, CollaborationStatus::Flagged);
        assert!(c.delivered_at.is_none());

        c.moderate(m, &ModerationAction::Approve { notes: None }, t(2))
            .unwrap();
        assert_eq!(c.status, CollaborationStatus::ApprovedDelivered);
        assert_eq!(c.transitions.last().unwrap().action, Action::ApproveAnyway);
        let review = c.admin_review.as_ref().unwrap();
        assert_eq!(review.flag_reason.as_deref(), Some("phone number"));
    }

    #[test]
    fn flag_only_from_pending() {
        let mut c = delivered();
        let err = c
            .moderate(
                ModeratorId::new(),
                &ModerationAction::Flag {
                    flag_reason: "late flag".into(),
                    notes: None,
                },
                t(3),
            )
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    }

    #[test]
    fn short_rejection_reason_rejected_before_state_check() {
        let mut c = submitted();
        let err = c
            .moderate(
                ModeratorId::new(),
                &ModerationAction::Reject {
                    rejection_reason: "no".into(),
                    notes: None,
                },
                t(1),
            )
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert_eq!(c.status, CollaborationStatus::PendingAdminReview);
    }

    #[test]
    fn recipient_accepts_with_message() {
        let mut c = delivered();
        let r = c.recipient;
        c.accept(&r, Some("  See you there!  ".into()), ComplianceFlags::new(), t(5))
            .unwrap();
        assert_eq!(c.status, CollaborationStatus::Confirmed);
        let resp = c.response.as_ref().unwrap();
        assert_eq!(resp.message.as_deref(), Some("See you there!"));
        assert_eq!(resp.action, Action::Accept);
    }

    #[test]
    fn proposer_cannot_accept_own_proposal() {
        let mut c = delivered();
        let p = c.proposer;
        let err = c.accept(&p, None, ComplianceFlags::new(), t(5)).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    }

    #[test]
    fn stranger_cannot_decline() {
        let mut c = delivered();
        let stranger = PartyRef::venue(PartyId::new());
        let err = c
            .decline(&stranger, None, ComplianceFlags::new(), t(5))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotParty { .. }));
    }

    #[test]
    fn lazy_expiry_blocks_transitions_without_write() {
        let mut c = delivered();
        let deadline = c.expires_at.unwrap();
        let after = deadline.plus_hours(1).unwrap();
        assert_eq!(c.status, CollaborationStatus::ApprovedDelivered);
        assert_eq!(c.effective_status(&after), CollaborationStatus::Expired);
        assert_eq!(c.effective_status(&deadline), CollaborationStatus::ApprovedDelivered);

        let r = c.recipient;
        let err = c.accept(&r, None, ComplianceFlags::new(), after).unwrap_err();
        assert_eq!(
            err,
            WorkflowError::InvalidTransition {
                state: "expired".into(),
                action: Action::Accept
            }
        );
    }

    #[test]
    fn expire_if_due_persists_once() {
        let mut c = delivered();
        let after = c.expires_at.unwrap().plus_hours(1).unwrap();
        assert!(!c.expire_if_due(t(2)).unwrap());
        assert!(c.expire_if_due(after).unwrap());
        assert_eq!(c.status, CollaborationStatus::Expired);
        assert!(!c.expire_if_due(after).unwrap());
        assert_eq!(c.transitions.last().unwrap().actor, Actor::System);
    }

    #[test]
    fn terminal_records_never_expire() {
        let mut c = delivered();
        let r = c.recipient;
        c.decline(&r, Some("Booked that week".into()), ComplianceFlags::new(), t(3))
            .unwrap();
        let later = c.expires_at.unwrap().plus_days(10).unwrap();
        assert_eq!(c.effective_status(&later), CollaborationStatus::Declined);
    }

    #[test]
    fn begin_counter_twice_is_duplicate() {
        let mut c = delivered();
        let r = c.recipient;
        c.begin_counter(&r, CounterId::new(), t(3)).unwrap();
        assert!(c.has_counter);
        let err = c.begin_counter(&r, CounterId::new(), t(3)).unwrap_err();
        assert!(matches!(err, WorkflowError::DuplicateActiveCounter { .. }));
    }

    #[test]
    fn counter_decision_must_target_latest_counter() {
        let mut c = delivered();
        let r = c.recipient;
        let counter = CounterId::new();
        c.begin_counter(&r, counter, t(3)).unwrap();
        let err = c
            .apply_counter_decision(Action::ApproveCounter, CounterId::new(), ModeratorId::new(), t(4))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        c.apply_counter_decision(Action::RejectCounter, counter, ModeratorId::new(), t(4))
            .unwrap();
        assert_eq!(c.status, CollaborationStatus::ApprovedDelivered);
    }

    #[test]
    fn version_tracks_transitions() {
        let c = delivered();
        assert_eq!(c.version, c.transitions.len() as u64);
    }
}
