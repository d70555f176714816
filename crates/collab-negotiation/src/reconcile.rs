//! # NegotiationReconciler
//!
//! Builds the read-only "final terms" of a collaboration from its original
//! payload and the delivered counter. For each original field: `accept` keeps
//! the value, `modify` substitutes `modifiedValue`, `reject` drops it into
//! `removed_fields`. Fields the counter did not address are kept. House
//! rules and the commercial counter are folded in verbatim. Neither input is
//! mutated.

use std::collections::BTreeMap;

use collab_core::{CollaborationId, CounterId};
use collab_state::CounterStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collaboration::Collaboration;
use crate::counter::{CommercialCounter, CounterData, CounterProposal, FieldAction};
use crate::error::WorkflowError;
use crate::payload::{CollaborationType, FormData, FormField};

/// The agreed terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalTerms {
    pub collaboration_id: CollaborationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter_id: Option<CounterId>,
    pub collaboration_type: CollaborationType,
    pub fields: BTreeMap<FormField, Value>,
    /// Original fields the counter rejected; not part of the agreement.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_fields: Vec<FormField>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub house_rules: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commercial_counter: Option<CommercialCounter>,
}

impl FinalTerms {
    /// Merge `data` into `payload`. Responses to fields the payload lacks
    /// are ignored; [`crate::CounterDraft::resolve`] already rejects them.
    pub fn merge(
        collaboration_id: CollaborationId,
        counter_id: Option<CounterId>,
        payload: &FormData,
        data: &CounterData,
    ) -> Self {
        let mut fields = BTreeMap::new();
        let mut removed_fields = Vec::new();
        for (field, original) in payload.fields() {
            match data.field_responses.get(&field) {
                Some(r) if r.action == FieldAction::Reject => removed_fields.push(field),
                Some(r) if r.action == FieldAction::Modify => {
                    let value = r.modified_value.clone().unwrap_or(original);
                    fields.insert(field, value);
                }
                _ => {
                    fields.insert(field, original);
                }
            }
        }
        Self {
            collaboration_id,
            counter_id,
            collaboration_type: payload.collaboration_type(),
            fields,
            removed_fields,
            house_rules: data.house_rules.clone(),
            commercial_counter: data.commercial_counter.clone(),
        }
    }

    /// Value of one agreed field.
    pub fn get(&self, field: FormField) -> Option<&Value> {
        self.fields.get(&field)
    }
}

/// Final terms of `parent` with its delivered `counter` applied.
pub fn reconcile(
    parent: &Collaboration,
    counter: &CounterProposal,
) -> Result<FinalTerms, WorkflowError> {
    if counter.collaboration_id != parent.id {
        return Err(WorkflowError::validation(format!(
            "counter {} does not belong to collaboration {}",
            counter.id, parent.id
        )));
    }
    if counter.status != CounterStatus::ApprovedDelivered {
        return Err(WorkflowError::validation(format!(
            "counter {} has not been delivered (status {})",
            counter.id, counter.status
        )));
    }
    Ok(FinalTerms::merge(
        parent.id,
        Some(counter.id),
        &parent.payload,
        &counter.counter_data,
    ))
}

/// Final terms of a collaboration accepted without a counter.
pub fn original_terms(parent: &Collaboration) -> FinalTerms {
    FinalTerms::merge(parent.id, None, &parent.payload, &CounterData::default())
}
