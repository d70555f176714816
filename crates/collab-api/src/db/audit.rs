//! Audit event persistence — immutable hash chain.
//!
//! Every committed transition on a collaboration or counter appends an audit
//! event whose SHA-256 hash chains to the previous event, forming a
//! tamper-evident log. Appends run inside the commit transaction and are
//! serialized with a transaction-scoped advisory lock so the chain never
//! forks.

use chrono::{DateTime, Utc};
use collab_negotiation::TransitionRecord;
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Advisory lock key guarding the chain head.
const CHAIN_LOCK_KEY: i64 = 0x636f_6c6c_6162;

/// An audit event to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub event_type: String,
    pub actor: String,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub action: String,
    pub metadata: serde_json::Value,
}

impl AuditEvent {
    /// Event for a committed state transition of `resource_type`.
    pub fn transition(resource_type: &str, resource_id: Uuid, record: &TransitionRecord) -> Self {
        Self {
            event_type: format!("{resource_type}.transition"),
            actor: record.actor.to_string(),
            resource_type: resource_type.to_string(),
            resource_id,
            action: record.action.as_str().to_string(),
            metadata: json!({
                "from": record.from_state,
                "to": record.to_state,
                "at": record.timestamp,
            }),
        }
    }

    /// Event for a newly created record.
    pub fn created(resource_type: &str, resource_id: Uuid, actor: impl ToString) -> Self {
        Self {
            event_type: format!("{resource_type}.created"),
            actor: actor.to_string(),
            resource_type: resource_type.to_string(),
            resource_id,
            action: "create".to_string(),
            metadata: json!({}),
        }
    }

    /// Event for a draft payload edit.
    pub fn edited(resource_id: Uuid, actor: impl ToString) -> Self {
        Self {
            event_type: "collaboration.edited".to_string(),
            actor: actor.to_string(),
            resource_type: "collaboration".to_string(),
            resource_id,
            action: "edit_draft".to_string(),
            metadata: json!({}),
        }
    }
}

/// Append an audit event to the immutable log.
///
/// Computes the event hash by chaining with the previous event's hash.
/// If no previous event exists, the chain starts with a zero hash.
pub async fn append(conn: &mut PgConnection, event: &AuditEvent) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(CHAIN_LOCK_KEY)
        .execute(&mut *conn)
        .await?;

    let previous_hash: Option<String> =
        sqlx::query_scalar("SELECT event_hash FROM audit_events ORDER BY seq DESC LIMIT 1")
            .fetch_optional(&mut *conn)
            .await?;
    let prev = previous_hash.as_deref().unwrap_or(GENESIS_HASH);
    let event_hash = event_hash(prev, event);

    sqlx::query(
        "INSERT INTO audit_events (id, event_type, actor, resource_type, resource_id,
         action, metadata, previous_hash, event_hash, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())",
    )
    .bind(id)
    .bind(&event.event_type)
    .bind(&event.actor)
    .bind(&event.resource_type)
    .bind(event.resource_id)
    .bind(&event.action)
    .bind(&event.metadata)
    .bind(prev)
    .bind(&event_hash)
    .execute(&mut *conn)
    .await?;

    Ok(id)
}

/// Query audit events for a specific resource, oldest first.
pub async fn events_for_resource(
    pool: &PgPool,
    resource_type: &str,
    resource_id: Uuid,
) -> Result<Vec<AuditEventRow>, sqlx::Error> {
    sqlx::query_as::<_, AuditEventRow>(
        "SELECT id, event_type, actor, resource_type, resource_id,
         action, metadata, previous_hash, event_hash, created_at
         FROM audit_events
         WHERE resource_type = $1 AND resource_id = $2
         ORDER BY seq ASC",
    )
    .bind(resource_type)
    .bind(resource_id)
    .fetch_all(pool)
    .await
}

/// Verify audit chain integrity: hash continuity and recomputed hashes.
pub async fn verify_chain_integrity(
    pool: &PgPool,
    limit: i64,
) -> Result<ChainIntegrityResult, sqlx::Error> {
    let events = sqlx::query_as::<_, AuditEventRow>(
        "SELECT id, event_type, actor, resource_type, resource_id,
         action, metadata, previous_hash, event_hash, created_at
         FROM audit_events ORDER BY seq ASC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(check_chain(&events))
}

fn check_chain(events: &[AuditEventRow]) -> ChainIntegrityResult {
    let mut broken_links = 0;
    let mut tampered = 0;
    let mut last_hash: Option<&str> = None;

    for row in events {
        if let Some(expected_prev) = last_hash {
            if row.previous_hash.as_deref() != Some(expected_prev) {
                broken_links += 1;
            }
        }
        let prev = row.previous_hash.as_deref().unwrap_or(GENESIS_HASH);
        if event_hash(prev, &row.to_event()) != row.event_hash {
            tampered += 1;
        }
        last_hash = Some(&row.event_hash);
    }

    ChainIntegrityResult {
        total_events: events.len(),
        broken_links,
        tampered_events: tampered,
        chain_valid: broken_links == 0 && tampered == 0,
    }
}

/// Result of chain integrity verification.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChainIntegrityResult {
    pub total_events: usize,
    pub broken_links: usize,
    pub tampered_events: usize,
    pub chain_valid: bool,
}

/// Database row for audit events.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditEventRow {
    pub id: Uuid,
    pub event_type: String,
    pub actor: String,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub action: String,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub previous_hash: Option<String>,
    pub event_hash: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEventRow {
    fn to_event(&self) -> AuditEvent {
        AuditEvent {
            event_type: self.event_type.clone(),
            actor: self.actor.clone(),
            resource_type: self.resource_type.clone(),
            resource_id: self.resource_id,
            action: self.action.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// SHA-256(previous_hash || event_type || actor || resource_type || resource_id || action || metadata)
fn event_hash(prev: &str, event: &AuditEvent) -> String {
    sha256_hex(&format!(
        "{}{}{}{}{}{}{}",
        prev,
        event.event_type,
        event.actor,
        event.resource_type,
        event.resource_id,
        event.action,
        event.metadata,
    ))
}

/// Compute SHA-256 hex digest of input string.
fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    result.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use collab_core::{ModeratorId, Timestamp};
    use collab_negotiation::Actor;
    use collab_state::Action;

    fn row(prev: Option<&str>, event: &AuditEvent) -> AuditEventRow {
        AuditEventRow {
            id: Uuid::new_v4(),
            event_type: event.event_type.clone(),
            actor: event.actor.clone(),
            resource_type: event.resource_type.clone(),
            resource_id: event.resource_id,
            action: event.action.clone(),
            metadata: event.metadata.clone(),
            previous_hash: prev.map(String::from),
            event_hash: event_hash(prev.unwrap_or(GENESIS_HASH), event),
            created_at: Utc::now(),
        }
    }

    fn approve_event() -> AuditEvent {
        AuditEvent::transition(
            "collaboration",
            Uuid::new_v4(),
            &TransitionRecord {
                from_state: "pending_admin_review".into(),
                to_state: "approved_delivered".into(),
                action: Action::Approve,
                actor: Actor::moderator(ModeratorId::new()),
                timestamp: Timestamp::now(),
            },
        )
    }

    #[test]
    fn transition_event_carries_states_and_actor() {
        let event = approve_event();
        assert_eq!(event.event_type, "collaboration.transition");
        assert_eq!(event.action, "approve");
        assert!(event.actor.starts_with("moderator:"));
        assert_eq!(event.metadata["to"], "approved_delivered");
    }

    #[test]
    fn sha256_hex_is_64_lowercase_chars() {
        let h = sha256_hex("collab");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn intact_chain_verifies() {
        let first = row(None, &approve_event());
        let second = row(Some(&first.event_hash.clone()), &approve_event());
        let result = check_chain(&[first, second]);
        assert!(result.chain_valid);
        assert_eq!(result.total_events, 2);
    }

    #[test]
    fn edited_metadata_is_detected() {
        let first = row(None, &approve_event());
        let mut second = row(Some(&first.event_hash.clone()), &approve_event());
        second.metadata = json!({"to": "rejected"});
        let result = check_chain(&[first, second]);
        assert!(!result.chain_valid);
        assert_eq!(result.tampered_events, 1);
        assert_eq!(result.broken_links, 0);
    }

    #[test]
    fn broken_link_is_detected() {
        let first = row(None, &approve_event());
        let second = row(Some(GENESIS_HASH), &approve_event());
        let result = check_chain(&[first, second]);
        assert_eq!(result.broken_links, 1);
    }
}
