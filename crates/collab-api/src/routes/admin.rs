//! # Moderation Console API
//!
//! Moderator-only surface. Handlers see full records, including compliance
//! flags, admin review notes and the internal status.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET | `/v1/admin/collaborations/pending` | [`pending_collaborations`] |
//! | GET | `/v1/admin/counters/pending` | [`pending_counters`] |
//! | GET | `/v1/admin/flagged` | [`flagged_items`] |
//! | GET | `/v1/admin/analytics` | [`analytics`] |
//! | GET | `/v1/admin/collaborations/{id}` | [`get_collaboration`] |
//! | POST | `/v1/admin/collaborations/{id}/approve` | [`approve_collaboration`] |
//! | POST | `/v1/admin/collaborations/{id}/reject` | [`reject_collaboration`] |
//! | POST | `/v1/admin/collaborations/{id}/flag` | [`flag_collaboration`] |
//! | POST | `/v1/admin/counters/{id}/approve` | [`approve_counter`] |
//! | POST | `/v1/admin/counters/{id}/reject` | [`reject_counter`] |
//! | POST | `/v1/admin/counters/{id}/flag` | [`flag_counter`] |
//! | GET | `/v1/admin/collaborations/{id}/audit` | [`collaboration_audit`] |
//! | GET | `/v1/admin/audit/verify` | [`verify_audit_chain`] |
//!
//! Moderation actions are idempotent: repeating an action that already
//! produced the current state returns the record with `applied: false`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use collab_core::{CollaborationId, CounterId, Timestamp};
use collab_negotiation::{Collaboration, CounterProposal, ModerationAction, TransitionRecord};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::db::audit::{self, AuditEventRow, ChainIntegrityResult};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::moderation;
use crate::state::AppState;
use crate::views::{self, AdminCollaborationView, Analytics, QueueItem};

// ── Request/Response DTOs ───────────────────────────────────────────

/// Approve a pending or flagged item.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    /// Private moderator notes.
    pub admin_notes: Option<String>,
}

/// Reject an item before delivery.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequest {
    /// Retained for the audit trail; never shown to the submitter.
    pub rejection_reason: String,
    pub admin_notes: Option<String>,
}

/// Hold an item for closer review.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlagRequest {
    pub flag_reason: String,
    pub admin_notes: Option<String>,
}

impl From<ApproveRequest> for ModerationAction {
    fn from(req: ApproveRequest) -> Self {
        Self::Approve {
            notes: req.admin_notes,
        }
    }
}

impl From<RejectRequest> for ModerationAction {
    fn from(req: RejectRequest) -> Self {
        Self::Reject {
            rejection_reason: req.rejection_reason,
            notes: req.admin_notes,
        }
    }
}

impl From<FlagRequest> for ModerationAction {
    fn from(req: FlagRequest) -> Self {
        Self::Flag {
            flag_reason: req.flag_reason,
            notes: req.admin_notes,
        }
    }
}

fn validate_action(action: ModerationAction) -> Result<(), String> {
    action.validate().map_err(|e| e.to_string())
}

impl Validate for ApproveRequest {
    fn validate(&self) -> Result<(), String> {
        validate_action(ModerationAction::Approve {
            notes: self.admin_notes.clone(),
        })
    }
}

impl Validate for RejectRequest {
    fn validate(&self) -> Result<(), String> {
        validate_action(ModerationAction::Reject {
            rejection_reason: self.rejection_reason.clone(),
            notes: self.admin_notes.clone(),
        })
    }
}

impl Validate for FlagRequest {
    fn validate(&self) -> Result<(), String> {
        validate_action(ModerationAction::Flag {
            flag_reason: self.flag_reason.clone(),
            notes: self.admin_notes.clone(),
        })
    }
}

/// Result of a moderation action.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModerationResponse {
    pub collaboration: AdminCollaborationView,
    /// The counter acted on, for counter actions.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub counter: Option<CounterProposal>,
    /// `false` when the action had already been applied.
    pub applied: bool,
}

/// Transition history of a collaboration and its counters, plus the
/// persisted audit events when a database is configured.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditTrailResponse {
    #[schema(value_type = Vec<Object>)]
    pub transitions: Vec<TransitionRecord>,
    pub events: Vec<AuditEventRow>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub limit: Option<i64>,
}

const DEFAULT_VERIFY_LIMIT: i64 = 10_000;

// ── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/admin/collaborations/pending",
            get(pending_collaborations),
        )
        .route("/v1/admin/counters/pending", get(pending_counters))
        .route("/v1/admin/flagged", get(flagged_items))
        .route("/v1/admin/analytics", get(analytics))
        .route("/v1/admin/collaborations/{id}", get(get_collaboration))
        .route(
            "/v1/admin/collaborations/{id}/approve",
            post(approve_collaboration),
        )
        .route(
            "/v1/admin/collaborations/{id}/reject",
            post(reject_collaboration),
        )
        .route(
            "/v1/admin/collaborations/{id}/flag",
            post(flag_collaboration),
        )
        .route("/v1/admin/counters/{id}/approve", post(approve_counter))
        .route("/v1/admin/counters/{id}/reject", post(reject_counter))
        .route("/v1/admin/counters/{id}/flag", post(flag_counter))
        .route(
            "/v1/admin/collaborations/{id}/audit",
            get(collaboration_audit),
        )
        .route("/v1/admin/audit/verify", get(verify_audit_chain))
}

// ── Helpers ─────────────────────────────────────────────────────────

fn admin_view(state: &AppState, record: Collaboration) -> AdminCollaborationView {
    let counters = state.counters_for(record.id);
    views::admin_view(record, counters, &Timestamp::now(), &state.config.sla)
}

async fn act_on_collaboration(
    state: &AppState,
    caller: CallerIdentity,
    id: Uuid,
    action: ModerationAction,
) -> Result<Json<ModerationResponse>, AppError> {
    let moderator = caller.require_moderator()?;
    let decision = moderation::moderate_collaboration(
        state,
        CollaborationId::from_uuid(id),
        moderator,
        &action,
    )
    .await?;
    Ok(Json(ModerationResponse {
        applied: decision.outcome.changed(),
        collaboration: admin_view(state, decision.collaboration),
        counter: None,
    }))
}

async fn act_on_counter(
    state: &AppState,
    caller: CallerIdentity,
    id: Uuid,
    action: ModerationAction,
) -> Result<Json<ModerationResponse>, AppError> {
    let moderator = caller.require_moderator()?;
    let decision =
        moderation::moderate_counter(state, CounterId::from_uuid(id), moderator, &action).await?;
    Ok(Json(ModerationResponse {
        applied: decision.outcome.changed(),
        collaboration: admin_view(state, decision.collaboration),
        counter: Some(decision.counter),
    }))
}

// ── Queue Handlers ──────────────────────────────────────────────────

/// GET /v1/admin/collaborations/pending — Proposals awaiting review.
#[utoipa::path(
    get,
    path = "/v1/admin/collaborations/pending",
    responses(
        (status = 200, description = "Pending proposals, highest priority first", body = Vec<QueueItem>),
        (status = 403, description = "Moderator role required", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn pending_collaborations(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Vec<QueueItem>>, AppError> {
    caller.require_moderator()?;
    Ok(Json(views::pending_collaborations(&state, &Timestamp::now())))
}

/// GET /v1/admin/counters/pending — Counters awaiting review.
#[utoipa::path(
    get,
    path = "/v1/admin/counters/pending",
    responses(
        (status = 200, description = "Pending counters, highest priority first", body = Vec<QueueItem>),
        (status = 403, description = "Moderator role required", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn pending_counters(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Vec<QueueItem>>, AppError> {
    caller.require_moderator()?;
    Ok(Json(views::pending_counters(&state, &Timestamp::now())))
}

/// GET /v1/admin/flagged — Flagged proposals and counters.
#[utoipa::path(
    get,
    path = "/v1/admin/flagged",
    responses(
        (status = 200, description = "Flagged items, highest priority first", body = Vec<QueueItem>),
        (status = 403, description = "Moderator role required", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn flagged_items(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Vec<QueueItem>>, AppError> {
    caller.require_moderator()?;
    Ok(Json(views::flagged_items(&state, &Timestamp::now())))
}

/// GET /v1/admin/analytics — Counts, approval rate and review latency.
#[utoipa::path(
    get,
    path = "/v1/admin/analytics",
    responses(
        (status = 200, description = "Moderation statistics", body = Analytics),
        (status = 403, description = "Moderator role required", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn analytics(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Analytics>, AppError> {
    caller.require_moderator()?;
    Ok(Json(views::analytics(&state, &Timestamp::now())))
}

/// GET /v1/admin/collaborations/{id} — Full record with counters.
#[utoipa::path(
    get,
    path = "/v1/admin/collaborations/{id}",
    params(("id" = Uuid, Path, description = "Collaboration ID")),
    responses(
        (status = 200, description = "Collaboration found", body = AdminCollaborationView),
        (status = 404, description = "Collaboration not found", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn get_collaboration(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<AdminCollaborationView>, AppError> {
    caller.require_moderator()?;
    let record = state
        .load_collaboration(CollaborationId::from_uuid(id))
        .await?;
    Ok(Json(admin_view(&state, record)))
}

// ── Collaboration Actions ───────────────────────────────────────────

/// POST /v1/admin/collaborations/{id}/approve — Deliver to the recipient.
#[utoipa::path(
    post,
    path = "/v1/admin/collaborations/{id}/approve",
    params(("id" = Uuid, Path, description = "Collaboration ID")),
    request_body = ApproveRequest,
    responses(
        (status = 200, description = "Approved", body = ModerationResponse),
        (status = 409, description = "Invalid transition", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn approve_collaboration(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ApproveRequest>, JsonRejection>,
) -> Result<Json<ModerationResponse>, AppError> {
    let req = extract_validated_json(body)?;
    act_on_collaboration(&state, caller, id, req.into()).await
}

/// POST /v1/admin/collaborations/{id}/reject — Block before delivery.
#[utoipa::path(
    post,
    path = "/v1/admin/collaborations/{id}/reject",
    params(("id" = Uuid, Path, description = "Collaboration ID")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Rejected", body = ModerationResponse),
        (status = 409, description = "Invalid transition", body = crate::error::ErrorBody),
        (status = 422, description = "Reason too short", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn reject_collaboration(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<RejectRequest>, JsonRejection>,
) -> Result<Json<ModerationResponse>, AppError> {
    let req = extract_validated_json(body)?;
    act_on_collaboration(&state, caller, id, req.into()).await
}

/// POST /v1/admin/collaborations/{id}/flag — Hold for closer review.
#[utoipa::path(
    post,
    path = "/v1/admin/collaborations/{id}/flag",
    params(("id" = Uuid, Path, description = "Collaboration ID")),
    request_body = FlagRequest,
    responses(
        (status = 200, description = "Flagged", body = ModerationResponse),
        (status = 409, description = "Invalid transition", body = crate::error::ErrorBody),
        (status = 422, description = "Reason too short", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn flag_collaboration(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<FlagRequest>, JsonRejection>,
) -> Result<Json<ModerationResponse>, AppError> {
    let req = extract_validated_json(body)?;
    act_on_collaboration(&state, caller, id, req.into()).await
}

// ── Counter Actions ─────────────────────────────────────────────────

/// POST /v1/admin/counters/{id}/approve — Deliver a counter to the proposer.
#[utoipa::path(
    post,
    path = "/v1/admin/counters/{id}/approve",
    params(("id" = Uuid, Path, description = "Counter ID")),
    request_body = ApproveRequest,
    responses(
        (status = 200, description = "Approved", body = ModerationResponse),
        (status = 409, description = "Invalid transition", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn approve_counter(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ApproveRequest>, JsonRejection>,
) -> Result<Json<ModerationResponse>, AppError> {
    let req = extract_validated_json(body)?;
    act_on_counter(&state, caller, id, req.into()).await
}

/// POST /v1/admin/counters/{id}/reject — Drop a counter; the original proposal stands.
#[utoipa::path(
    post,
    path = "/v1/admin/counters/{id}/reject",
    params(("id" = Uuid, Path, description = "Counter ID")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Rejected", body = ModerationResponse),
        (status = 409, description = "Invalid transition", body = crate::error::ErrorBody),
        (status = 422, description = "Reason too short", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn reject_counter(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<RejectRequest>, JsonRejection>,
) -> Result<Json<ModerationResponse>, AppError> {
    let req = extract_validated_json(body)?;
    act_on_counter(&state, caller, id, req.into()).await
}

/// POST /v1/admin/counters/{id}/flag — Hold a counter for closer review.
#[utoipa::path(
    post,
    path = "/v1/admin/counters/{id}/flag",
    params(("id" = Uuid, Path, description = "Counter ID")),
    request_body = FlagRequest,
    responses(
        (status = 200, description = "Flagged", body = ModerationResponse),
        (status = 409, description = "Invalid transition", body = crate::error::ErrorBody),
        (status = 422, description = "Reason too short", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn flag_counter(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<FlagRequest>, JsonRejection>,
) -> Result<Json<ModerationResponse>, AppError> {
    let req = extract_validated_json(body)?;
    act_on_counter(&state, caller, id, req.into()).await
}

// ── Audit ───────────────────────────────────────────────────────────

/// GET /v1/admin/collaborations/{id}/audit — Transition history.
#[utoipa::path(
    get,
    path = "/v1/admin/collaborations/{id}/audit",
    params(("id" = Uuid, Path, description = "Collaboration ID")),
    responses(
        (status = 200, description = "Audit trail", body = AuditTrailResponse),
        (status = 404, description = "Collaboration not found", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn collaboration_audit(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<AuditTrailResponse>, AppError> {
    caller.require_moderator()?;
    let record = state
        .load_collaboration(CollaborationId::from_uuid(id))
        .await?;

    let counters = state.counters_for(record.id);
    let mut transitions = record.transitions.clone();
    for counter in &counters {
        transitions.extend(counter.transitions.iter().cloned());
    }
    transitions.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    let mut events = Vec::new();
    if let Some(pool) = &state.db_pool {
        events.extend(audit::events_for_resource(pool, "collaboration", id).await?);
        for counter in &counters {
            let counter_id = *counter.id.as_uuid();
            let counter_events =
                audit::events_for_resource(pool, "counter_proposal", counter_id).await?;
            events.extend(counter_events);
        }
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    }
    Ok(Json(AuditTrailResponse {
        transitions,
        events,
    }))
}

/// GET /v1/admin/audit/verify — Recompute the audit hash chain.
#[utoipa::path(
    get,
    path = "/v1/admin/audit/verify",
    params(("limit" = Option<i64>, Query, description = "Maximum events to check")),
    responses(
        (status = 200, description = "Chain integrity result", body = ChainIntegrityResult),
        (status = 422, description = "No database configured", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn verify_audit_chain(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<ChainIntegrityResult>, AppError> {
    caller.require_moderator()?;
    let pool = state.db_pool.as_ref().ok_or_else(|| {
        AppError::Validation("audit chain verification requires DATABASE_URL".into())
    })?;
    let limit = query.limit.unwrap_or(DEFAULT_VERIFY_LIMIT).clamp(1, DEFAULT_VERIFY_LIMIT);
    Ok(Json(audit::verify_chain_integrity(pool, limit).await?))
}
