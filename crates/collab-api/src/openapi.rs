//! # OpenAPI Specification Assembly
//!
//! Assembles the utoipa-documented routes into one OpenAPI document,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the workflow API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Collaboration Workflow API",
        version = "0.1.0",
        description = "Proposal, counter-offer and moderation workflow between communities, venues and brands."
    ),
    paths(
        // Party workflow
        crate::routes::collaborations::create_collaboration,
        crate::routes::collaborations::list_collaborations,
        crate::routes::collaborations::get_collaboration,
        crate::routes::collaborations::update_draft,
        crate::routes::collaborations::submit_draft,
        crate::routes::collaborations::accept_collaboration,
        crate::routes::collaborations::decline_collaboration,
        crate::routes::collaborations::submit_counter,
        crate::routes::collaborations::accept_counter,
        crate::routes::collaborations::decline_counter,
        crate::routes::collaborations::get_final_terms,
        // Moderation console
        crate::routes::admin::pending_collaborations,
        crate::routes::admin::pending_counters,
        crate::routes::admin::flagged_items,
        crate::routes::admin::analytics,
        crate::routes::admin::get_collaboration,
        crate::routes::admin::approve_collaboration,
        crate::routes::admin::reject_collaboration,
        crate::routes::admin::flag_collaboration,
        crate::routes::admin::approve_counter,
        crate::routes::admin::reject_counter,
        crate::routes::admin::flag_counter,
        crate::routes::admin::collaboration_audit,
        crate::routes::admin::verify_audit_chain,
    ),
    components(schemas(
        // Error types
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        // Read models
        crate::views::PartyCollaborationView,
        crate::views::PartyResponseView,
        crate::views::PartyCounterView,
        crate::views::AdminCollaborationView,
        crate::views::QueueItem,
        crate::views::QueueItemKind,
        crate::views::Analytics,
        crate::views::Direction,
        // Party DTOs
        crate::routes::collaborations::CreateCollaborationRequest,
        crate::routes::collaborations::UpdateDraftRequest,
        crate::routes::collaborations::RespondRequest,
        crate::routes::collaborations::SubmitCounterRequest,
        // Moderation DTOs
        crate::routes::admin::ApproveRequest,
        crate::routes::admin::RejectRequest,
        crate::routes::admin::FlagRequest,
        crate::routes::admin::ModerationResponse,
        crate::routes::admin::AuditTrailResponse,
        crate::db::audit::AuditEventRow,
        crate::db::audit::ChainIntegrityResult,
    )),
    tags(
        (name = "collaborations", description = "Party-facing proposal workflow"),
        (name = "admin", description = "Moderation console"),
    )
)]
pub struct ApiDoc;

/// Serves the OpenAPI JSON spec at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json — Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_lists_party_and_admin_paths() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| *p == "/v1/collaborations/{id}/counter"));
        assert!(paths.iter().any(|p| *p == "/v1/admin/counters/{id}/approve"));
        assert!(paths.iter().any(|p| *p == "/v1/admin/audit/verify"));
    }
}
