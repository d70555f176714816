//! Counter proposal persistence operations.
//!
//! The partial unique index `uq_counter_proposals_active` backs the
//! one-active-counter rule: a second active insert fails the same way a
//! stale version does.

use chrono::{DateTime, Utc};
use collab_core::{CollaborationId, CounterId, PartyId, PartyRef, PartyType, Timestamp};
use collab_negotiation::{CounterProposal, TransitionRecord};
use collab_state::CounterStatus;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{
    enum_from_text, enum_to_text, from_json, is_unique_violation, to_json, version_from_db,
    version_to_db,
};

const COLUMNS: &str = "id, collaboration_id, responder_id, responder_type, counter_data, \
     status, compliance_flags, priority, admin_review, created_at, updated_at, version, \
     transitions";

/// Insert a new counter. Returns `false` if the id exists or the
/// collaboration already has an active counter.
pub async fn insert(
    conn: &mut PgConnection,
    record: &CounterProposal,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO counter_proposals (id, collaboration_id, responder_id, responder_type,
         counter_data, status, compliance_flags, priority, admin_review, created_at,
         updated_at, version, transitions)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(record.id.as_uuid())
    .bind(record.collaboration_id.as_uuid())
    .bind(record.responder.party_id.as_uuid())
    .bind(record.responder.party_type.as_str())
    .bind(to_json(&record.counter_data, "counter_data")?)
    .bind(record.status.as_str())
    .bind(to_json(&record.compliance_flags, "compliance_flags")?)
    .bind(enum_to_text(&record.priority, "priority")?)
    .bind(record.admin_review.as_ref().map(|r| to_json(r, "admin_review")).transpose()?)
    .bind(*record.created_at.as_datetime())
    .bind(*record.updated_at.as_datetime())
    .bind(version_to_db(record.version)?)
    .bind(to_json(&record.transitions, "transitions")?)
    .execute(conn)
    .await;

    match result {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Overwrite a counter if it is still at `expected_version`.
pub async fn update_versioned(
    conn: &mut PgConnection,
    record: &CounterProposal,
    expected_version: u64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE counter_proposals SET status = $3, compliance_flags = $4, priority = $5,
         admin_review = $6, updated_at = $7, version = $8, transitions = $9
         WHERE id = $1 AND version = $2",
    )
    .bind(record.id.as_uuid())
    .bind(version_to_db(expected_version)?)
    .bind(record.status.as_str())
    .bind(to_json(&record.compliance_flags, "compliance_flags")?)
    .bind(enum_to_text(&record.priority, "priority")?)
    .bind(record.admin_review.as_ref().map(|r| to_json(r, "admin_review")).transpose()?)
    .bind(*record.updated_at.as_datetime())
    .bind(version_to_db(record.version)?)
    .bind(to_json(&record.transitions, "transitions")?)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Fetch a counter by ID.
pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<CounterProposal>, sqlx::Error> {
    let row = sqlx::query_as::<_, CounterRow>(&format!(
        "SELECT {COLUMNS} FROM counter_proposals WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(CounterRow::into_record).transpose()
}

/// Load all counters on startup. Undecodable rows are logged and skipped.
pub async fn load_all(pool: &PgPool) -> Result<Vec<CounterProposal>, sqlx::Error> {
    let rows = sqlx::query_as::<_, CounterRow>(&format!(
        "SELECT {COLUMNS} FROM counter_proposals ORDER BY created_at"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id;
            row.into_record()
                .map_err(|e| {
                    tracing::error!(
                        id = %id,
                        error = %e,
                        "skipping undecodable counter row; investigate for data corruption"
                    );
                })
                .ok()
        })
        .collect())
}

#[derive(sqlx::FromRow)]
struct CounterRow {
    id: Uuid,
    collaboration_id: Uuid,
    responder_id: Uuid,
    responder_type: String,
    counter_data: serde_json::Value,
    status: String,
    compliance_flags: serde_json::Value,
    priority: String,
    admin_review: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
    transitions: serde_json::Value,
}

impl CounterRow {
    fn into_record(self) -> Result<CounterProposal, sqlx::Error> {
        let responder_type: PartyType = enum_from_text(&self.responder_type, "responder_type")?;
        let status: CounterStatus = enum_from_text(&self.status, "status")?;
        let transitions: Vec<TransitionRecord> = from_json(self.transitions, "transitions")
            .unwrap_or_else(|e| {
                tracing::error!(
                    id = %self.id,
                    error = %e,
                    "failed to decode counter transitions; defaulting to empty"
                );
                Vec::new()
            });

        Ok(CounterProposal {
            id: CounterId::from_uuid(self.id),
            collaboration_id: CollaborationId::from_uuid(self.collaboration_id),
            responder: PartyRef::new(PartyId::from_uuid(self.responder_id), responder_type),
            counter_data: from_json(self.counter_data, "counter_data")?,
            status,
            compliance_flags: from_json(self.compliance_flags, "compliance_flags")?,
            priority: enum_from_text(&self.priority, "priority")?,
            admin_review: self
                .admin_review
                .map(|v| from_json(v, "admin_review"))
                .transpose()?,
            created_at: Timestamp::from_utc(self.created_at),
            updated_at: Timestamp::from_utc(self.updated_at),
            version: version_from_db(self.version)?,
            transitions,
        })
    }
}
