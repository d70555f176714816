//! # Authentication & Authorization Middleware
//!
//! Bearer token middleware. Every request to the workflow API carries the
//! caller's role and identity:
//!
//! ```text
//! Bearer {role}:{id}:{secret}
//! ```
//!
//! `role` is one of `community`, `venue`, `brand` or `moderator`; `id` is a
//! UUID. The secret is compared in constant time against `AUTH_TOKEN`. When
//! no token is configured (development mode) the secret is not checked, but
//! the identity is still parsed: workflow operations always need an actor.
//!
//! The parsed [`CallerIdentity`] is injected into request extensions and
//! extracted by handlers via `FromRequestParts`.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use collab_core::{ModeratorId, PartyId, PartyRef, PartyType};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody, ErrorDetail};

// ── Role ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Community,
    Venue,
    Brand,
    Moderator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Community => "community",
            Self::Venue => "venue",
            Self::Brand => "brand",
            Self::Moderator => "moderator",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "community" => Some(Self::Community),
            "venue" => Some(Self::Venue),
            "brand" => Some(Self::Brand),
            "moderator" => Some(Self::Moderator),
            _ => None,
        }
    }

    fn party_type(&self) -> Option<PartyType> {
        match self {
            Self::Community => Some(PartyType::Community),
            Self::Venue => Some(PartyType::Venue),
            Self::Brand => Some(PartyType::Brand),
            Self::Moderator => None,
        }
    }
}

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller, passed explicitly into every
/// workflow operation as its actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerIdentity {
    Party(PartyRef),
    Moderator(ModeratorId),
}

impl CallerIdentity {
    pub fn role(&self) -> Role {
        match self {
            Self::Party(p) => match p.party_type {
                PartyType::Community => Role::Community,
                PartyType::Venue => Role::Venue,
                PartyType::Brand => Role::Brand,
            },
            Self::Moderator(_) => Role::Moderator,
        }
    }

    /// The caller as a party, or 403.
    pub fn require_party(&self) -> Result<PartyRef, AppError> {
        match self {
            Self::Party(p) => Ok(*p),
            Self::Moderator(_) => Err(AppError::Forbidden(
                "a community, venue or brand role is required".into(),
            )),
        }
    }

    /// The caller as a moderator, or 403.
    pub fn require_moderator(&self) -> Result<ModeratorId, AppError> {
        match self {
            Self::Moderator(m) => Ok(*m),
            Self::Party(_) => Err(AppError::Forbidden(format!(
                "role '{}' required, caller has '{}'",
                Role::Moderator.as_str(),
                self.role().as_str()
            ))),
        }
    }
}

impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .copied()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer secrets.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse `{role}:{id}:{secret}`. With `expected_secret == None` the secret
/// segment is optional and unchecked.
pub fn parse_bearer_token(
    provided: &str,
    expected_secret: Option<&str>,
) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();
    let (role_str, id_str, secret) = match (parts.as_slice(), expected_secret) {
        ([role, id, secret], _) => (*role, *id, Some(*secret)),
        ([role, id], None) => (*role, *id, None),
        _ => return Err("invalid token format, expected {role}:{id}:{secret}".into()),
    };

    if let Some(expected) = expected_secret {
        if !constant_time_token_eq(secret.unwrap_or_default(), expected) {
            return Err("invalid bearer token".into());
        }
    }

    let role = Role::parse(role_str).ok_or_else(|| format!("unknown role: {role_str}"))?;
    let id = id_str
        .parse::<Uuid>()
        .map_err(|e| format!("invalid caller id: {e}"))?;

    Ok(match role.party_type() {
        Some(party_type) => {
            CallerIdentity::Party(PartyRef::new(PartyId::from_uuid(id), party_type))
        }
        None => CallerIdentity::Moderator(ModeratorId::from_uuid(id)),
    })
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Extract the bearer token, parse the caller identity, and inject it into
/// request extensions.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AuthConfig>()
        .and_then(|c| c.token.clone());

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let provided = match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(token) => token.to_string(),
            None => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                return unauthorized_response("authorization header must use Bearer scheme");
            }
        },
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            return unauthorized_response("missing authorization header");
        }
    };

    match parse_bearer_token(&provided, expected.as_deref()) {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(msg) => {
            tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
            unauthorized_response(&msg)
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app(token: Option<String>) -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|caller: CallerIdentity| async move { caller.role().as_str() }),
            )
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(AuthConfig { token }))
    }

    async fn call(app: Router, auth: Option<&str>) -> (StatusCode, String) {
        let mut req = Request::builder().uri("/whoami");
        if let Some(a) = auth {
            req = req.header("authorization", a);
        }
        let resp = app.oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn parses_party_and_moderator_tokens() {
        let id = Uuid::new_v4();
        let caller = parse_bearer_token(&format!("venue:{id}:s3cret"), Some("s3cret")).unwrap();
        assert_eq!(
            caller,
            CallerIdentity::Party(PartyRef::venue(PartyId::from_uuid(id)))
        );
        let caller = parse_bearer_token(&format!("moderator:{id}:s3cret"), Some("s3cret")).unwrap();
        assert_eq!(caller, CallerIdentity::Moderator(ModeratorId::from_uuid(id)));
    }

    #[test]
    fn rejects_wrong_secret_and_unknown_role() {
        let id = Uuid::new_v4();
        assert!(parse_bearer_token(&format!("brand:{id}:nope"), Some("s3cret")).is_err());
        assert!(parse_bearer_token(&format!("admin:{id}:s3cret"), Some("s3cret")).is_err());
        assert!(parse_bearer_token(&format!("brand:{id}"), Some("s3cret")).is_err());
        assert!(parse_bearer_token("brand:not-a-uuid:s3cret", Some("s3cret")).is_err());
    }

    #[test]
    fn development_mode_skips_secret() {
        let id = Uuid::new_v4();
        assert!(parse_bearer_token(&format!("community:{id}"), None).is_ok());
        assert!(parse_bearer_token(&format!("community:{id}:anything"), None).is_ok());
    }

    #[test]
    fn role_requirements() {
        let party = CallerIdentity::Party(PartyRef::brand(PartyId::new()));
        let moderator = CallerIdentity::Moderator(ModeratorId::new());
        assert!(party.require_party().is_ok());
        assert!(party.require_moderator().is_err());
        assert!(moderator.require_moderator().is_ok());
        assert!(moderator.require_party().is_err());
    }

    #[test]
    fn auth_config_debug_redacts() {
        let dbg = format!("{:?}", AuthConfig { token: Some("hunter2".into()) });
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("REDACTED"));
    }

    #[tokio::test]
    async fn middleware_injects_identity() {
        let id = Uuid::new_v4();
        let (status, body) = call(
            test_app(Some("s3cret".into())),
            Some(&format!("Bearer moderator:{id}:s3cret")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "moderator");
    }

    #[tokio::test]
    async fn middleware_rejects_missing_header() {
        let (status, _) = call(test_app(Some("s3cret".into())), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(test_app(None), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn middleware_rejects_basic_scheme() {
        let (status, _) = call(test_app(None), Some("Basic dXNlcjpwYXNz")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
