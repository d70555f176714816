//! # Counter Proposals — the CounterStore Record
//!
//! A recipient's structured response to a delivered collaboration. Field
//! responses arrive keyed by strings ([`CounterDraft`]) and are resolved
//! against the parent's typed payload into [`CounterData`] keyed by
//! [`FormField`]; a key the parent does not carry is `UnknownField`.
//!
//! At most one counter per collaboration is active at a time. The parent's
//! status is the single source of truth for that: while it sits in
//! `counter_pending_review` a new counter is `DuplicateActiveCounter`, and
//! because the parent's transition to that state is committed with a
//! version check, two racing submissions cannot both win.

use std::collections::BTreeMap;

use collab_compliance::{ComplianceFlags, Priority};
use collab_core::{CollaborationId, CounterId, ModeratorId, PartyRef, Timestamp};
use collab_state::{counter_transition, Action, CollaborationStatus, CounterStatus, ViewerRole};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audit::{Actor, TransitionOutcome, TransitionRecord};
use crate::collaboration::Collaboration;
use crate::error::WorkflowError;
use crate::payload::{FieldKind, FormField};
use crate::review::{AdminReview, ModerationAction};

const MAX_NOTE: usize = 2_000;

/// What the responder does with one original field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldAction {
    Accept,
    Modify,
    Reject,
}

impl FieldAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Modify => "modify",
            Self::Reject => "reject",
        }
    }
}

/// Response to one field. `modified_value` is present iff `action` is modify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldResponse {
    pub action: FieldAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl FieldResponse {
    pub fn accept() -> Self {
        Self {
            action: FieldAction::Accept,
            modified_value: None,
            note: None,
        }
    }

    pub fn modify(value: impl Into<Value>) -> Self {
        Self {
            action: FieldAction::Modify,
            modified_value: Some(value.into()),
            note: None,
        }
    }

    pub fn reject() -> Self {
        Self {
            action: FieldAction::Reject,
            modified_value: None,
            note: None,
        }
    }

    fn check(&self, field: FormField) -> Result<(), WorkflowError> {
        match (self.action, &self.modified_value) {
            (FieldAction::Modify, None) => {
                return Err(WorkflowError::validation(format!(
                    "{field}: modifiedValue is required when action is modify"
                )))
            }
            (FieldAction::Modify, Some(v)) if !field.kind().accepts(v) => {
                return Err(WorkflowError::validation(format!(
                    "{field}: modifiedValue must be a {}",
                    field.kind().as_str()
                )))
            }
            (FieldAction::Accept | FieldAction::Reject, Some(_)) => {
                return Err(WorkflowError::validation(format!(
                    "{field}: modifiedValue is only allowed when action is modify"
                )))
            }
            _ => {}
        }
        check_note(field.as_str(), self.note.as_deref())
    }
}

/// A single counter-offer on commercial terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommercialCounter {
    pub model: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// `counterData` as submitted, before resolution against the parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterDraft {
    #[serde(default)]
    pub field_responses: BTreeMap<String, FieldResponse>,
    #[serde(default)]
    pub house_rules: BTreeMap<String, Value>,
    #[serde(default)]
    pub commercial_counter: Option<CommercialCounter>,
    #[serde(default)]
    pub general_notes: Option<String>,
}

/// Validated `counterData`, keyed by fields of the parent payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterData {
    #[serde(default)]
    pub field_responses: BTreeMap<FormField, FieldResponse>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub house_rules: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commercial_counter: Option<CommercialCounter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general_notes: Option<String>,
}

impl CounterDraft {
    /// Resolve against `parent` on behalf of `responder`.
    ///
    /// Checks, in order: the responder is the recipient, no counter is
    /// already active, then every field response.
    pub fn validate_for(
        self,
        parent: &Collaboration,
        responder: &PartyRef,
        now: &Timestamp,
    ) -> Result<CounterData, WorkflowError> {
        if parent.role_of(responder).is_none() {
            return Err(WorkflowError::NotParty {
                actor: responder.to_string(),
            });
        }
        let status = parent.effective_status(now);
        if status == CollaborationStatus::CounterPendingReview {
            return Err(WorkflowError::DuplicateActiveCounter {
                collaboration_id: parent.id,
            });
        }
        if parent.role_of(responder) != Some(ViewerRole::Recipient) {
            return Err(WorkflowError::InvalidTransition {
                state: status.as_str().to_string(),
                action: Action::SubmitCounter,
            });
        }
        self.resolve(parent)
    }

    /// Field-level resolution only.
    pub fn resolve(self, parent: &Collaboration) -> Result<CounterData, WorkflowError> {
        let mut field_responses = BTreeMap::new();
        for (key, response) in self.field_responses {
            let field = FormField::parse(&key)
                .filter(|f| parent.payload.has_field(*f))
                .ok_or_else(|| WorkflowError::UnknownField { field: key.clone() })?;
            response.check(field)?;
            if field_responses.insert(field, response).is_some() {
                return Err(WorkflowError::validation(format!(
                    "{field} has more than one response"
                )));
            }
        }

        for key in self.house_rules.keys() {
            if key.trim().is_empty() {
                return Err(WorkflowError::validation("houseRules keys must not be empty"));
            }
        }
        if let Some(cc) = &self.commercial_counter {
            if cc.model.trim().is_empty() {
                return Err(WorkflowError::validation(
                    "commercialCounter.model must not be empty",
                ));
            }
            check_note("commercialCounter", cc.note.as_deref())?;
        }
        check_note("generalNotes", self.general_notes.as_deref())?;

        let data = CounterData {
            field_responses,
            house_rules: self.house_rules,
            commercial_counter: self.commercial_counter,
            general_notes: self
                .general_notes
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        };
        if data.is_empty() {
            return Err(WorkflowError::validation(
                "a counter must respond to at least one field or carry terms or notes",
            ));
        }
        Ok(data)
    }
}

impl CounterData {
    pub fn is_empty(&self) -> bool {
        self.field_responses.is_empty()
            && self.house_rules.is_empty()
            && self.commercial_counter.is_none()
            && self.general_notes.is_none()
    }

    /// Prose the responder wrote, as (path, text) pairs for the scanner.
    pub fn free_text(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (field, response) in &self.field_responses {
            if let Some(note) = &response.note {
                out.push((format!("fieldResponses.{field}.note"), note.clone()));
            }
            if field.kind() == FieldKind::Text {
                if let Some(Value::String(s)) = &response.modified_value {
                    out.push((format!("fieldResponses.{field}.modifiedValue"), s.clone()));
                }
            }
        }
        for (rule, value) in &self.house_rules {
            if let Value::String(s) = value {
                out.push((format!("houseRules.{rule}"), s.clone()));
            }
        }
        if let Some(cc) = &self.commercial_counter {
            if let Some(note) = &cc.note {
                out.push(("commercialCounter.note".to_string(), note.clone()));
            }
        }
        if let Some(notes) = &self.general_notes {
            out.push(("generalNotes".to_string(), notes.clone()));
        }
        out
    }
}

fn check_note(path: &str, note: Option<&str>) -> Result<(), WorkflowError> {
    match note {
        Some(n) if n.chars().count() > MAX_NOTE => Err(WorkflowError::validation(format!(
            "{path} note must be at most {MAX_NOTE} characters"
        ))),
        _ => Ok(()),
    }
}

/// The counter record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterProposal {
    pub id: CounterId,
    pub collaboration_id: CollaborationId,
    pub responder: PartyRef,
    pub counter_data: CounterData,
    pub status: CounterStatus,
    pub compliance_flags: ComplianceFlags,
    pub priority: Priority,
    pub admin_review: Option<AdminReview>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub version: u64,
    pub transitions: Vec<TransitionRecord>,
}

impl CounterProposal {
    /// Create a counter at `pending_admin_review` and move the parent to
    /// `counter_pending_review`. Both records change; callers commit both
    /// or neither.
    pub fn submit(
        parent: &mut Collaboration,
        responder: &PartyRef,
        data: CounterData,
        flags: ComplianceFlags,
        now: Timestamp,
    ) -> Result<Self, WorkflowError> {
        let id = CounterId::new();
        parent.begin_counter(responder, id, now)?;
        Ok(Self {
            id,
            collaboration_id: parent.id,
            responder: *responder,
            counter_data: data,
            status: CounterStatus::PendingAdminReview,
            priority: Priority::from_severity(flags.severity()),
            compliance_flags: flags,
            admin_review: None,
            created_at: now,
            updated_at: now,
            version: 0,
            transitions: Vec::new(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Apply a moderator decision to this counter and the parent transition
    /// it drives. Repeating the decision that produced the current state, by
    /// the same moderator, returns `AlreadyApplied` and changes neither.
    pub fn moderate(
        &mut self,
        parent: &mut Collaboration,
        moderator: ModeratorId,
        action: &ModerationAction,
        now: Timestamp,
    ) -> Result<TransitionOutcome, WorkflowError> {
        action.validate()?;
        if parent.id != self.collaboration_id {
            return Err(WorkflowError::validation(format!(
                "counter {} does not belong to collaboration {}",
                self.id, parent.id
            )));
        }

        let (table_action, target) = match (action, self.status) {
            (ModerationAction::Approve { .. }, CounterStatus::Flagged) => {
                (Action::ApproveAnyway, CounterStatus::ApprovedDelivered)
            }
            (ModerationAction::Approve { .. }, _) => {
                (Action::Approve, CounterStatus::ApprovedDelivered)
            }
            (ModerationAction::Reject { .. }, _) => (Action::Reject, CounterStatus::Rejected),
            (ModerationAction::Flag { .. }, _) => (Action::Flag, CounterStatus::Flagged),
        };

        if self.status == target
            && self
                .admin_review
                .as_ref()
                .is_some_and(|r| r.is(moderator, action.decision()))
        {
            return Ok(TransitionOutcome::AlreadyApplied);
        }

        let rule = counter_transition(self.status, table_action)?;
        match rule.parent_action {
            Some(parent_action) => {
                parent.apply_counter_decision(parent_action, self.id, moderator, now)?
            }
            None => {
                let parent_status = parent.effective_status(&now);
                if parent_status != CollaborationStatus::CounterPendingReview {
                    return Err(WorkflowError::InvalidTransition {
                        state: parent_status.as_str().to_string(),
                        action: table_action,
                    });
                }
            }
        }

        self.transitions.push(TransitionRecord {
            from_state: self.status.as_str().to_string(),
            to_state: rule.to.as_str().to_string(),
            action: table_action,
            actor: Actor::moderator(moderator),
            timestamp: now,
        });
        self.admin_review = Some(action.to_review(moderator, self.admin_review.as_ref(), now));
        self.status = rule.to;
        self.updated_at = now;
        self.version += 1;
        Ok(TransitionOutcome::Transitioned)
    }
}
