//! # Read Models
//!
//! What each audience is allowed to see.
//!
//! - **Party views** are projected through [`StatusProjector`]. They never
//!   carry the internal status, compliance flags, priority, admin review,
//!   or a moderator's rejection reason. A recipient sees nothing that was
//!   never delivered, and a proposer sees a counter only once delivered.
//! - **Admin views** carry the full record with effective status and
//!   SLA-escalated priority.
//!
//! Expiry is applied lazily here: every view uses the effective status at
//! the time of the read.

use std::collections::BTreeMap;

use collab_compliance::{ComplianceFlags, Priority, SlaPolicy};
use collab_core::{CollaborationId, CounterId, PartyRef, Timestamp};
use collab_negotiation::{
    Collaboration, CounterData, CounterProposal, ReviewDecision,
};
use collab_state::{
    Action, CollaborationStatus, CounterStatus, StatusProjector, ViewerRole, REJECTION_NOTICE,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::AppState;

// -- Party views --------------------------------------------------------------

/// Which side of the caller's collaborations to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Sent,
    Received,
}

/// A collaboration as one of its parties sees it.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PartyCollaborationView {
    #[schema(value_type = String, format = Uuid)]
    pub id: CollaborationId,
    #[serde(rename = "type")]
    pub collaboration_type: String,
    #[schema(value_type = Object)]
    pub proposer: PartyRef,
    #[schema(value_type = Object)]
    pub recipient: PartyRef,
    #[schema(value_type = Object)]
    pub form_data: serde_json::Value,
    #[schema(value_type = String)]
    pub viewer_role: ViewerRole,
    pub user_facing_status: String,
    /// Set only for the submitter of a moderator-rejected proposal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_notice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<PartyResponseView>,
    /// Counters this viewer may see, oldest first.
    pub counters: Vec<PartyCounterView>,
    #[schema(value_type = String)]
    pub created_at: Timestamp,
    #[schema(value_type = String)]
    pub updated_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub expires_at: Option<Timestamp>,
}

/// A party's accept/decline message, relayed as written.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PartyResponseView {
    #[schema(value_type = Object)]
    pub responder: PartyRef,
    #[schema(value_type = String)]
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_message: Option<String>,
    #[schema(value_type = String)]
    pub responded_at: Timestamp,
}

/// A counter as a party sees it.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PartyCounterView {
    #[schema(value_type = String, format = Uuid)]
    pub id: CounterId,
    #[schema(value_type = Object)]
    pub responder: PartyRef,
    #[schema(value_type = Object)]
    pub counter_data: CounterData,
    pub user_facing_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_notice: Option<String>,
    #[schema(value_type = String)]
    pub created_at: Timestamp,
}

/// Whether `viewer` may see `record` at all.
pub fn visible_to(record: &Collaboration, viewer: &PartyRef) -> Option<ViewerRole> {
    match record.role_of(viewer)? {
        ViewerRole::Submitter => Some(ViewerRole::Submitter),
        ViewerRole::Recipient if record.was_delivered() => Some(ViewerRole::Recipient),
        ViewerRole::Recipient => None,
    }
}

/// Project `record` for `viewer`, or `None` if hidden from them.
pub fn party_view(
    record: &Collaboration,
    counters: &[CounterProposal],
    viewer: &PartyRef,
    now: &Timestamp,
) -> Option<PartyCollaborationView> {
    let role = visible_to(record, viewer)?;
    let status = record.effective_status(now);

    let rejection_notice = (role == ViewerRole::Submitter
        && status == CollaborationStatus::Rejected)
        .then(|| REJECTION_NOTICE.to_string());

    let counters = counters
        .iter()
        .filter_map(|c| party_counter_view(c, viewer))
        .collect();

    Some(PartyCollaborationView {
        id: record.id,
        collaboration_type: record.collaboration_type().as_str().to_string(),
        proposer: record.proposer,
        recipient: record.recipient,
        form_data: record.payload.to_json(),
        viewer_role: role,
        user_facing_status: StatusProjector::label(status, role).to_string(),
        rejection_notice,
        response: record.response.as_ref().map(|r| PartyResponseView {
            responder: r.responder,
            action: r.action,
            response_message: r.message.clone(),
            responded_at: r.responded_at,
        }),
        counters,
        created_at: record.created_at,
        updated_at: record.updated_at,
        expires_at: record.expires_at,
    })
}

/// The author sees their counter throughout; the other party only once
/// a moderator delivered it.
fn party_counter_view(counter: &CounterProposal, viewer: &PartyRef) -> Option<PartyCounterView> {
    let is_author = counter.responder == *viewer;
    let (label, rejection_notice) = match (counter.status, is_author) {
        (CounterStatus::PendingAdminReview | CounterStatus::Flagged, true) => {
            ("Under Review", None)
        }
        (CounterStatus::Rejected, true) => ("Not Delivered", Some(REJECTION_NOTICE.to_string())),
        (CounterStatus::ApprovedDelivered, true) => ("Counter Offer Sent", None),
        (CounterStatus::ApprovedDelivered, false) => ("Counter Offer Received", None),
        (_, false) => return None,
    };
    Some(PartyCounterView {
        id: counter.id,
        responder: counter.responder,
        counter_data: counter.counter_data.clone(),
        user_facing_status: label.to_string(),
        rejection_notice,
        created_at: counter.created_at,
    })
}

/// Whether `record` matches a party's status filter. Statuses compare by
/// the label the viewer would see, so a filter can never single out a
/// status the projection hides.
pub fn matches_status_filter(
    record: &Collaboration,
    role: ViewerRole,
    filter: CollaborationStatus,
    now: &Timestamp,
) -> bool {
    StatusProjector::label(record.effective_status(now), role)
        == StatusProjector::label(filter, role)
}

/// The caller's collaborations, newest activity first.
pub fn party_list(
    state: &AppState,
    viewer: &PartyRef,
    direction: Option<Direction>,
    status: Option<CollaborationStatus>,
    now: &Timestamp,
) -> Vec<PartyCollaborationView> {
    let mut records: Vec<Collaboration> = state
        .collaborations
        .list()
        .into_iter()
        .filter(|c| match direction {
            Some(Direction::Sent) => c.proposer == *viewer,
            Some(Direction::Received) => c.recipient == *viewer,
            None => true,
        })
        .filter(|c| match (visible_to(c, viewer), status) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(role), Some(filter)) => matches_status_filter(c, role, filter, now),
        })
        .collect();
    records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    records
        .iter()
        .filter_map(|c| party_view(c, &state.counters_for(c.id), viewer, now))
        .collect()
}

// -- Admin views --------------------------------------------------------------

/// A collaboration as a moderator sees it.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminCollaborationView {
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub collaboration: Collaboration,
    #[schema(value_type = String)]
    pub effective_status: CollaborationStatus,
    #[schema(value_type = String)]
    pub effective_priority: Priority,
    #[schema(value_type = String)]
    pub severity: collab_compliance::Severity,
    #[schema(value_type = Vec<Object>)]
    pub counters: Vec<CounterProposal>,
}

pub fn admin_view(
    record: Collaboration,
    counters: Vec<CounterProposal>,
    now: &Timestamp,
    sla: &SlaPolicy,
) -> AdminCollaborationView {
    AdminCollaborationView {
        effective_status: record.effective_status(now),
        effective_priority: effective_priority(record.priority, record.submitted_at, now, sla),
        severity: record.compliance_flags.severity(),
        collaboration: record,
        counters,
    }
}

fn effective_priority(
    base: Priority,
    submitted_at: Option<Timestamp>,
    now: &Timestamp,
    sla: &SlaPolicy,
) -> Priority {
    match submitted_at {
        Some(at) => base.escalated(&at, now, sla),
        None => base,
    }
}

/// Kind of item in a moderation queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemKind {
    Collaboration,
    Counter,
}

/// One entry of a moderation queue.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub kind: QueueItemKind,
    /// Collaboration id or counter id, per `kind`.
    pub id: uuid::Uuid,
    #[schema(value_type = String, format = Uuid)]
    pub collaboration_id: CollaborationId,
    #[serde(rename = "type")]
    pub collaboration_type: String,
    #[schema(value_type = Object)]
    pub proposer: PartyRef,
    #[schema(value_type = Object)]
    pub recipient: PartyRef,
    pub status: String,
    #[schema(value_type = Vec<String>)]
    pub compliance_flags: ComplianceFlags,
    #[schema(value_type = String)]
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag_reason: Option<String>,
    #[schema(value_type = String)]
    pub submitted_at: Timestamp,
    pub waiting_seconds: i64,
}

fn collaboration_item(c: &Collaboration, now: &Timestamp, sla: &SlaPolicy) -> QueueItem {
    let submitted_at = c.submitted_at.unwrap_or(c.created_at);
    QueueItem {
        kind: QueueItemKind::Collaboration,
        id: *c.id.as_uuid(),
        collaboration_id: c.id,
        collaboration_type: c.collaboration_type().as_str().to_string(),
        proposer: c.proposer,
        recipient: c.recipient,
        status: c.effective_status(now).as_str().to_string(),
        compliance_flags: c.compliance_flags.clone(),
        priority: effective_priority(c.priority, Some(submitted_at), now, sla),
        flag_reason: c.admin_review.as_ref().and_then(|r| r.flag_reason.clone()),
        submitted_at,
        waiting_seconds: now.seconds_since(&submitted_at),
    }
}

fn counter_item(
    counter: &CounterProposal,
    parent: &Collaboration,
    now: &Timestamp,
    sla: &SlaPolicy,
) -> QueueItem {
    QueueItem {
        kind: QueueItemKind::Counter,
        id: *counter.id.as_uuid(),
        collaboration_id: parent.id,
        collaboration_type: parent.collaboration_type().as_str().to_string(),
        proposer: parent.proposer,
        recipient: parent.recipient,
        status: counter.status.as_str().to_string(),
        compliance_flags: counter.compliance_flags.clone(),
        priority: counter.priority.escalated(&counter.created_at, now, sla),
        flag_reason: counter.admin_review.as_ref().and_then(|r| r.flag_reason.clone()),
        submitted_at: counter.created_at,
        waiting_seconds: now.seconds_since(&counter.created_at),
    }
}

/// Highest priority first, then longest waiting.
fn sort_queue(items: &mut [QueueItem]) {
    items.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.submitted_at.cmp(&b.submitted_at))
    });
}

/// Counters awaiting a decision whose parent is still open for one.
/// A counter whose parent expired is excluded.
fn reviewable_counters(
    state: &AppState,
    now: &Timestamp,
    status: CounterStatus,
) -> Vec<(CounterProposal, Collaboration)> {
    state
        .counters
        .list()
        .into_iter()
        .filter(|c| c.status == status)
        .filter_map(|c| {
            let parent = state.collaborations.get(c.collaboration_id.as_uuid())?;
            (parent.effective_status(now) == CollaborationStatus::CounterPendingReview)
                .then_some((c, parent))
        })
        .collect()
}

/// Proposals awaiting a first moderator decision.
pub fn pending_collaborations(state: &AppState, now: &Timestamp) -> Vec<QueueItem> {
    let sla = &state.config.sla;
    let mut items: Vec<QueueItem> = state
        .collaborations
        .list()
        .iter()
        .filter(|c| c.effective_status(now) == CollaborationStatus::PendingAdminReview)
        .map(|c| collaboration_item(c, now, sla))
        .collect();
    sort_queue(&mut items);
    items
}

/// Counters awaiting a first moderator decision.
pub fn pending_counters(state: &AppState, now: &Timestamp) -> Vec<QueueItem> {
    let sla = &state.config.sla;
    let pending = reviewable_counters(state, now, CounterStatus::PendingAdminReview);
    let mut items: Vec<QueueItem> = pending
        .iter()
        .map(|(c, parent)| counter_item(c, parent, now, sla))
        .collect();
    sort_queue(&mut items);
    items
}

/// Flagged collaborations and counters.
pub fn flagged_items(state: &AppState, now: &Timestamp) -> Vec<QueueItem> {
    let sla = &state.config.sla;
    let mut items: Vec<QueueItem> = state
        .collaborations
        .list()
        .iter()
        .filter(|c| c.effective_status(now) == CollaborationStatus::Flagged)
        .map(|c| collaboration_item(c, now, sla))
        .collect();
    items.extend(
        reviewable_counters(state, now, CounterStatus::Flagged)
            .iter()
            .map(|(c, parent)| counter_item(c, parent, now, sla)),
    );
    sort_queue(&mut items);
    items
}

// -- Analytics ----------------------------------------------------------------

/// Aggregate moderation statistics.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total: usize,
    /// Counts by effective status.
    pub by_status: BTreeMap<String, usize>,
    /// Counts by canonical type.
    pub by_type: BTreeMap<String, usize>,
    pub approved: usize,
    pub rejected: usize,
    /// `approved / (approved + rejected)`; absent before any decision.
    pub approval_rate: Option<f64>,
    /// Mean seconds from submission to the latest collaboration decision.
    pub average_review_latency_seconds: Option<f64>,
    pub pending_counters: usize,
    pub flagged_counters: usize,
}

pub fn analytics(state: &AppState, now: &Timestamp) -> Analytics {
    let records = state.collaborations.list();
    let mut by_status = BTreeMap::new();
    let mut by_type = BTreeMap::new();
    let (mut approved, mut rejected) = (0usize, 0usize);
    let mut latencies = Vec::new();

    for c in &records {
        *by_status
            .entry(c.effective_status(now).as_str().to_string())
            .or_insert(0) += 1;
        *by_type
            .entry(c.collaboration_type().as_str().to_string())
            .or_insert(0) += 1;

        let Some(review) = &c.admin_review else { continue };
        match review.decision {
            ReviewDecision::Approved => approved += 1,
            ReviewDecision::Rejected => rejected += 1,
            ReviewDecision::Flagged => continue,
        }
        if let Some(submitted_at) = c.submitted_at {
            latencies.push(review.reviewed_at.seconds_since(&submitted_at));
        }
    }

    let decided = approved + rejected;
    let counters = state.counters.list();
    Analytics {
        total: records.len(),
        by_status,
        by_type,
        approved,
        rejected,
        approval_rate: (decided > 0).then(|| approved as f64 / decided as f64),
        average_review_latency_seconds: (!latencies.is_empty())
            .then(|| latencies.iter().sum::<i64>() as f64 / latencies.len() as f64),
        pending_counters: counters
            .iter()
            .filter(|c| c.status == CounterStatus::PendingAdminReview)
            .count(),
        flagged_counters: counters
            .iter()
            .filter(|c| c.status == CounterStatus::Flagged)
            .count(),
    }
}

/// Refresh the `collab_collaborations{status}` gauge from the store.
pub fn refresh_status_gauge(state: &AppState, now: &Timestamp) {
    let gauge = state.metrics.collaborations();
    for status in CollaborationStatus::ALL {
        gauge.with_label_values(&[status.as_str()]).set(0);
    }
    for c in state.collaborations.list() {
        gauge
            .with_label_values(&[c.effective_status(now).as_str()])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::moderate_collaboration;
    use crate::proposals::{self, PartyAction};
    use crate::test_support::{
        community, delivered_collaboration, moderator, pending_counter, submitted_collaboration,
        venue,
    };
    use collab_negotiation::ModerationAction;

    #[tokio::test]
    async fn recipient_never_sees_undelivered_records() {
        let state = AppState::try_new().unwrap();
        let c = submitted_collaboration(&state, "Monthly slam").await;
        let now = Timestamp::now();

        assert!(party_view(&c, &[], &c.recipient, &now).is_none());
        let view = party_view(&c, &[], &c.proposer, &now).unwrap();
        assert_eq!(view.user_facing_status, "Under Review");
        assert!(party_list(&state, &c.recipient, None, None, &now).is_empty());
        assert!(party_view(&c, &[], &community(), &now).is_none());
    }

    #[tokio::test]
    async fn rejection_view_hides_reason_and_notes() {
        let state = AppState::try_new().unwrap();
        let c = submitted_collaboration(&state, "Monthly slam").await;
        let rejected = moderate_collaboration(
            &state,
            c.id,
            moderator(),
            &ModerationAction::Reject {
                rejection_reason: "reason text here".into(),
                notes: Some("private note".into()),
            },
        )
        .await
        .unwrap()
        .collaboration;

        let view = party_view(&rejected, &[], &rejected.proposer, &Timestamp::now()).unwrap();
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("reason text here"));
        assert!(!json.contains("private note"));
        assert!(!json.contains("rejected"));
        assert_eq!(view.rejection_notice.as_deref(), Some(REJECTION_NOTICE));
        assert_eq!(view.user_facing_status, "Not Delivered");
    }

    #[tokio::test]
    async fn proposer_sees_counter_only_after_delivery() {
        let state = AppState::try_new().unwrap();
        let (parent, counter) = pending_counter(&state).await;
        let now = Timestamp::now();
        let counters = vec![counter];

        let proposer_view = party_view(&parent, &counters, &parent.proposer, &now).unwrap();
        assert_eq!(proposer_view.user_facing_status, "Sent");
        assert!(proposer_view.counters.is_empty());

        let recipient_view = party_view(&parent, &counters, &parent.recipient, &now).unwrap();
        assert_eq!(recipient_view.counters.len(), 1);
        assert_eq!(recipient_view.counters[0].user_facing_status, "Under Review");
    }

    #[tokio::test]
    async fn status_filter_cannot_single_out_flagged() {
        let state = AppState::try_new().unwrap();
        let flagged = submitted_collaboration(&state, "Call me at 9876543210").await;
        moderate_collaboration(
            &state,
            flagged.id,
            moderator(),
            &ModerationAction::Flag {
                flag_reason: "phone number".into(),
                notes: None,
            },
        )
        .await
        .unwrap();
        let now = Timestamp::now();
        let proposer = flagged.proposer;

        let pending = party_list(
            &state,
            &proposer,
            Some(Direction::Sent),
            Some(CollaborationStatus::PendingAdminReview),
            &now,
        );
        let by_flag = party_list(
            &state,
            &proposer,
            Some(Direction::Sent),
            Some(CollaborationStatus::Flagged),
            &now,
        );
        assert_eq!(pending.len(), 1);
        assert_eq!(by_flag.len(), 1);
        assert_eq!(pending[0].user_facing_status, "Under Review");
    }

    #[tokio::test]
    async fn queues_sort_by_priority_then_age() {
        let state = AppState::try_new().unwrap();
        let clean = submitted_collaboration(&state, "Monthly slam").await;
        let risky = submitted_collaboration(&state, "email me at a@b.co").await;
        let now = Timestamp::now();

        let queue = pending_collaborations(&state, &now);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].id, *risky.id.as_uuid());
        assert_eq!(queue[0].priority, Priority::High);
        assert_eq!(queue[1].id, *clean.id.as_uuid());

        let later = now.plus_hours(49).unwrap();
        let queue = pending_collaborations(&state, &later);
        assert!(queue.iter().all(|i| i.priority == Priority::High));
    }

    #[tokio::test]
    async fn counter_queue_lists_pending_counters() {
        let state = AppState::try_new().unwrap();
        let (parent, counter) = pending_counter(&state).await;
        let now = Timestamp::now();
        let queue = pending_counters(&state, &now);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, *counter.id.as_uuid());
        assert_eq!(queue[0].collaboration_id, parent.id);

        let after_expiry = parent.expires_at.unwrap().plus_hours(1).unwrap();
        assert!(pending_counters(&state, &after_expiry).is_empty());
    }

    #[tokio::test]
    async fn analytics_counts_decisions_and_latency() {
        let state = AppState::try_new().unwrap();
        let delivered = delivered_collaboration(&state).await;
        let rejected = submitted_collaboration(&state, "Monthly slam").await;
        moderate_collaboration(
            &state,
            rejected.id,
            moderator(),
            &ModerationAction::Reject {
                rejection_reason: "Not a fit for the platform".into(),
                notes: None,
            },
        )
        .await
        .unwrap();
        submitted_collaboration(&state, "Still waiting").await;
        proposals::respond(&state, delivered.id, delivered.recipient, PartyAction::Accept, None)
            .await
            .unwrap();

        let stats = analytics(&state, &Timestamp::now());
        assert_eq!(stats.total, 3);
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.approval_rate, Some(0.5));
        assert!(stats.average_review_latency_seconds.is_some());
        assert_eq!(stats.by_status.get("confirmed"), Some(&1));
        assert_eq!(stats.by_status.get("pending_admin_review"), Some(&1));
        assert_eq!(stats.by_type.get("communityToVenue"), Some(&3));
    }

    #[tokio::test]
    async fn sent_and_received_directions() {
        let state = AppState::try_new().unwrap();
        let c = delivered_collaboration(&state).await;
        let now = Timestamp::now();
        assert_eq!(
            party_list(&state, &c.proposer, Some(Direction::Sent), None, &now).len(),
            1
        );
        assert!(party_list(&state, &c.proposer, Some(Direction::Received), None, &now).is_empty());
        let received = party_list(&state, &c.recipient, Some(Direction::Received), None, &now);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].user_facing_status, "Awaiting Your Response");
        assert!(party_list(&state, &venue(), None, None, &now).is_empty());
    }
}
