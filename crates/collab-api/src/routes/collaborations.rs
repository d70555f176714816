//! # Collaborations — Party API
//!
//! The proposer and recipient side of the workflow. Callers must hold a
//! community, venue or brand role; the parsed identity is the actor of
//! every call.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | POST | `/v1/collaborations` | [`create_collaboration`] |
//! | GET | `/v1/collaborations` | [`list_collaborations`] |
//! | GET | `/v1/collaborations/{id}` | [`get_collaboration`] |
//! | PUT | `/v1/collaborations/{id}` | [`update_draft`] |
//! | POST | `/v1/collaborations/{id}/submit` | [`submit_draft`] |
//! | POST | `/v1/collaborations/{id}/accept` | [`accept_collaboration`] |
//! | POST | `/v1/collaborations/{id}/decline` | [`decline_collaboration`] |
//! | POST | `/v1/collaborations/{id}/counter` | [`submit_counter`] |
//! | POST | `/v1/collaborations/{id}/accept-counter` | [`accept_counter`] |
//! | POST | `/v1/collaborations/{id}/decline-counter` | [`decline_counter`] |
//! | GET | `/v1/collaborations/{id}/final-terms` | [`get_final_terms`] |

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use collab_core::{CollaborationId, PartyRef, Timestamp};
use collab_negotiation::{
    Collaboration, CollaborationType, CounterDraft, FinalTerms, FormData,
};
use collab_state::CollaborationStatus;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, Validate};
use crate::proposals::{self, not_visible, PartyAction};
use crate::state::AppState;
use crate::views::{self, Direction, PartyCollaborationView};

// ── Request DTOs ────────────────────────────────────────────────────

/// Request to create a collaboration.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCollaborationRequest {
    /// One of the four canonical types, e.g. `communityToVenue`.
    #[serde(rename = "type")]
    pub collaboration_type: String,
    #[schema(value_type = Object)]
    pub recipient: PartyRef,
    /// Payload for `type`.
    #[schema(value_type = Object)]
    pub form_data: serde_json::Value,
    /// `false` stores a draft. Defaults to submitting straight away.
    #[serde(default = "default_submit")]
    pub submit: bool,
}

fn default_submit() -> bool {
    true
}

impl Validate for CreateCollaborationRequest {
    fn validate(&self) -> Result<(), String> {
        require_canonical_type(&self.collaboration_type)
    }
}

/// Replacement payload for a draft.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDraftRequest {
    #[serde(rename = "type")]
    pub collaboration_type: String,
    #[schema(value_type = Object)]
    pub form_data: serde_json::Value,
}

impl Validate for UpdateDraftRequest {
    fn validate(&self) -> Result<(), String> {
        require_canonical_type(&self.collaboration_type)
    }
}

/// Legacy aliases are readable but never written.
fn require_canonical_type(raw: &str) -> Result<(), String> {
    if CollaborationType::ALL.iter().any(|t| t.as_str() == raw) {
        Ok(())
    } else {
        Err(format!("type must be one of the canonical values, got {raw:?}"))
    }
}

/// Accept or decline, with an optional message for the other party.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RespondRequest {
    pub response_message: Option<String>,
}

/// A field-by-field counter to a delivered proposal.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitCounterRequest {
    #[schema(value_type = Object)]
    pub counter_data: CounterDraft,
}

/// Filters for the caller's collaboration list.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ListQuery {
    pub direction: Option<Direction>,
    /// Internal status name; compared by the label the caller would see.
    pub status: Option<String>,
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/collaborations",
            get(list_collaborations).post(create_collaboration),
        )
        .route(
            "/v1/collaborations/{id}",
            get(get_collaboration).put(update_draft),
        )
        .route("/v1/collaborations/{id}/submit", post(submit_draft))
        .route("/v1/collaborations/{id}/accept", post(accept_collaboration))
        .route("/v1/collaborations/{id}/decline", post(decline_collaboration))
        .route("/v1/collaborations/{id}/counter", post(submit_counter))
        .route("/v1/collaborations/{id}/accept-counter", post(accept_counter))
        .route(
            "/v1/collaborations/{id}/decline-counter",
            post(decline_counter),
        )
        .route("/v1/collaborations/{id}/final-terms", get(get_final_terms))
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Project `record` for `party`, as 404 when it is hidden from them.
fn project(
    state: &AppState,
    record: &Collaboration,
    party: &PartyRef,
) -> Result<Json<PartyCollaborationView>, AppError> {
    views::party_view(
        record,
        &state.counters_for(record.id),
        party,
        &Timestamp::now(),
    )
    .map(Json)
    .ok_or_else(|| not_visible(record.id))
}

async fn respond(
    state: &AppState,
    caller: CallerIdentity,
    id: Uuid,
    action: PartyAction,
    body: Result<Json<RespondRequest>, JsonRejection>,
) -> Result<Json<PartyCollaborationView>, AppError> {
    let party = caller.require_party()?;
    let req = extract_json(body)?;
    let id = CollaborationId::from_uuid(id);
    // Never confirm the existence of a record the caller cannot see.
    let current = state.load_collaboration(id).await?;
    if views::visible_to(&current, &party).is_none() {
        return Err(not_visible(id));
    }
    let record = proposals::respond(state, id, party, action, req.response_message).await?;
    project(state, &record, &party)
}

// ── Handlers ────────────────────────────────────────────────────────

/// POST /v1/collaborations — Create a proposal, submitting it unless
/// `submit` is false.
#[utoipa::path(
    post,
    path = "/v1/collaborations",
    request_body = CreateCollaborationRequest,
    responses(
        (status = 201, description = "Collaboration created", body = PartyCollaborationView),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "collaborations"
)]
async fn create_collaboration(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateCollaborationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PartyCollaborationView>), AppError> {
    async {
        let proposer = caller.require_party()?;
        let req = extract_validated_json(body)?;
        let payload =
            FormData::from_wire(&req.collaboration_type, proposer.party_type, req.form_data)?;
        let record =
            proposals::create(&state, proposer, req.recipient, payload, req.submit).await?;
        Ok::<_, AppError>((StatusCode::CREATED, project(&state, &record, &proposer)?))
    }
    .await
    .map_err(AppError::party_facing)
}

/// GET /v1/collaborations — The caller's collaborations, newest first.
#[utoipa::path(
    get,
    path = "/v1/collaborations",
    params(
        ("direction" = Option<String>, Query, description = "sent or received"),
        ("status" = Option<String>, Query, description = "Status filter"),
    ),
    responses(
        (status = 200, description = "Collaborations visible to the caller", body = Vec<PartyCollaborationView>),
    ),
    tag = "collaborations"
)]
async fn list_collaborations(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<PartyCollaborationView>>, AppError> {
    let party = caller.require_party()?;
    let status = query
        .status
        .as_deref()
        .map(|s| {
            CollaborationStatus::from_wire(s)
                .ok_or_else(|| AppError::Validation(format!("unknown status {s:?}")))
        })
        .transpose()
        .map_err(AppError::party_facing)?;
    Ok(Json(views::party_list(
        &state,
        &party,
        query.direction,
        status,
        &Timestamp::now(),
    )))
}

/// GET /v1/collaborations/{id} — One collaboration, projected for the caller.
#[utoipa::path(
    get,
    path = "/v1/collaborations/{id}",
    params(("id" = Uuid, Path, description = "Collaboration ID")),
    responses(
        (status = 200, description = "Collaboration found", body = PartyCollaborationView),
        (status = 404, description = "Not found or not visible", body = crate::error::ErrorBody),
    ),
    tag = "collaborations"
)]
async fn get_collaboration(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<PartyCollaborationView>, AppError> {
    let party = caller.require_party()?;
    let record = state
        .load_collaboration(CollaborationId::from_uuid(id))
        .await?;
    project(&state, &record, &party)
}

/// PUT /v1/collaborations/{id} — Replace a draft's payload.
#[utoipa::path(
    put,
    path = "/v1/collaborations/{id}",
    params(("id" = Uuid, Path, description = "Collaboration ID")),
    request_body = UpdateDraftRequest,
    responses(
        (status = 200, description = "Draft updated", body = PartyCollaborationView),
        (status = 409, description = "No longer a draft", body = crate::error::ErrorBody),
    ),
    tag = "collaborations"
)]
async fn update_draft(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateDraftRequest>, JsonRejection>,
) -> Result<Json<PartyCollaborationView>, AppError> {
    async {
        let proposer = caller.require_party()?;
        let req = extract_validated_json(body)?;
        let payload =
            FormData::from_wire(&req.collaboration_type, proposer.party_type, req.form_data)?;
        let record =
            proposals::edit_draft(&state, CollaborationId::from_uuid(id), proposer, payload)
                .await?;
        project(&state, &record, &proposer)
    }
    .await
    .map_err(AppError::party_facing)
}

/// POST /v1/collaborations/{id}/submit — Scan a draft and send it for review.
#[utoipa::path(
    post,
    path = "/v1/collaborations/{id}/submit",
    params(("id" = Uuid, Path, description = "Collaboration ID")),
    responses(
        (status = 200, description = "Submitted", body = PartyCollaborationView),
        (status = 409, description = "No longer a draft", body = crate::error::ErrorBody),
    ),
    tag = "collaborations"
)]
async fn submit_draft(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<PartyCollaborationView>, AppError> {
    async {
        let proposer = caller.require_party()?;
        let record = proposals::submit(&state, CollaborationId::from_uuid(id), proposer).await?;
        project(&state, &record, &proposer)
    }
    .await
    .map_err(AppError::party_facing)
}

/// POST /v1/collaborations/{id}/accept — Recipient accepts a delivered proposal.
#[utoipa::path(
    post,
    path = "/v1/collaborations/{id}/accept",
    params(("id" = Uuid, Path, description = "Collaboration ID")),
    request_body = RespondRequest,
    responses(
        (status = 200, description = "Confirmed", body = PartyCollaborationView),
        (status = 409, description = "Action not available", body = crate::error::ErrorBody),
    ),
    tag = "collaborations"
)]
async fn accept_collaboration(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<RespondRequest>, JsonRejection>,
) -> Result<Json<PartyCollaborationView>, AppError> {
    respond(&state, caller, id, PartyAction::Accept, body)
        .await
        .map_err(AppError::party_facing)
}

/// POST /v1/collaborations/{id}/decline — Recipient declines a delivered proposal.
#[utoipa::path(
    post,
    path = "/v1/collaborations/{id}/decline",
    params(("id" = Uuid, Path, description = "Collaboration ID")),
    request_body = RespondRequest,
    responses(
        (status = 200, description = "Declined", body = PartyCollaborationView),
        (status = 409, description = "Action not available", body = crate::error::ErrorBody),
    ),
    tag = "collaborations"
)]
async fn decline_collaboration(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<RespondRequest>, JsonRejection>,
) -> Result<Json<PartyCollaborationView>, AppError> {
    respond(&state, caller, id, PartyAction::Decline, body)
        .await
        .map_err(AppError::party_facing)
}

/// POST /v1/collaborations/{id}/counter — Recipient submits a counter.
#[utoipa::path(
    post,
    path = "/v1/collaborations/{id}/counter",
    params(("id" = Uuid, Path, description = "Collaboration ID")),
    request_body = SubmitCounterRequest,
    responses(
        (status = 201, description = "Counter submitted", body = PartyCollaborationView),
        (status = 409, description = "A response is already pending", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "collaborations"
)]
async fn submit_counter(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<SubmitCounterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PartyCollaborationView>), AppError> {
    async {
        let responder = caller.require_party()?;
        let req = extract_json(body)?;
        let id = CollaborationId::from_uuid(id);
        let current = state.load_collaboration(id).await?;
        if views::visible_to(&current, &responder).is_none() {
            return Err(not_visible(id));
        }
        let (record, _) =
            proposals::submit_counter(&state, id, responder, req.counter_data).await?;
        Ok::<_, AppError>((StatusCode::CREATED, project(&state, &record, &responder)?))
    }
    .await
    .map_err(AppError::party_facing)
}

/// POST /v1/collaborations/{id}/accept-counter — Proposer accepts a delivered counter.
#[utoipa::path(
    post,
    path = "/v1/collaborations/{id}/accept-counter",
    params(("id" = Uuid, Path, description = "Collaboration ID")),
    request_body = RespondRequest,
    responses(
        (status = 200, description = "Confirmed", body = PartyCollaborationView),
        (status = 409, description = "Action not available", body = crate::error::ErrorBody),
    ),
    tag = "collaborations"
)]
async fn accept_counter(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<RespondRequest>, JsonRejection>,
) -> Result<Json<PartyCollaborationView>, AppError> {
    respond(&state, caller, id, PartyAction::AcceptCounter, body)
        .await
        .map_err(AppError::party_facing)
}

/// POST /v1/collaborations/{id}/decline-counter — Proposer declines a delivered counter.
#[utoipa::path(
    post,
    path = "/v1/collaborations/{id}/decline-counter",
    params(("id" = Uuid, Path, description = "Collaboration ID")),
    request_body = RespondRequest,
    responses(
        (status = 200, description = "Declined", body = PartyCollaborationView),
        (status = 409, description = "Action not available", body = crate::error::ErrorBody),
    ),
    tag = "collaborations"
)]
async fn decline_counter(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<RespondRequest>, JsonRejection>,
) -> Result<Json<PartyCollaborationView>, AppError> {
    respond(&state, caller, id, PartyAction::DeclineCounter, body)
        .await
        .map_err(AppError::party_facing)
}

/// GET /v1/collaborations/{id}/final-terms — Agreed terms of a confirmed collaboration.
#[utoipa::path(
    get,
    path = "/v1/collaborations/{id}/final-terms",
    params(("id" = Uuid, Path, description = "Collaboration ID")),
    responses(
        (status = 200, description = "Reconciled final terms"),
        (status = 409, description = "Not confirmed", body = crate::error::ErrorBody),
    ),
    tag = "collaborations"
)]
async fn get_final_terms(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<FinalTerms>, AppError> {
    proposals::final_terms(&state, CollaborationId::from_uuid(id), &caller)
        .await
        .map(Json)
        .map_err(AppError::party_facing)
}
