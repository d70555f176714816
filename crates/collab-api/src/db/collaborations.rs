//! Collaboration persistence operations.
//!
//! All writes take a `&mut PgConnection` so they can run inside the commit
//! transaction. Transition legality is enforced in `collab-negotiation`, not
//! in SQL; SQL enforces only the version check.

use chrono::{DateTime, Utc};
use collab_core::{CollaborationId, CounterId, PartyId, PartyRef, PartyType, Timestamp};
use collab_negotiation::{Collaboration, CollaborationType, FormData, TransitionRecord};
use collab_state::CollaborationStatus;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{
    enum_from_text, enum_to_text, from_json, is_unique_violation, to_json, version_from_db,
    version_to_db,
};

const COLUMNS: &str = "id, proposer_id, proposer_type, recipient_id, recipient_type, \
     collaboration_type, form_data, status, compliance_flags, priority, has_counter, \
     latest_counter_id, admin_review, response, created_at, updated_at, submitted_at, \
     delivered_at, expires_at, version, transitions";

fn dt(ts: &Timestamp) -> DateTime<Utc> {
    *ts.as_datetime()
}

/// Insert a new collaboration. Returns `false` if the id already exists.
pub async fn insert(conn: &mut PgConnection, record: &Collaboration) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO collaborations (id, proposer_id, proposer_type, recipient_id, recipient_type,
         collaboration_type, form_data, status, compliance_flags, priority, has_counter,
         latest_counter_id, admin_review, response, created_at, updated_at, submitted_at,
         delivered_at, expires_at, version, transitions)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
         $18, $19, $20, $21)",
    )
    .bind(record.id.as_uuid())
    .bind(record.proposer.party_id.as_uuid())
    .bind(record.proposer.party_type.as_str())
    .bind(record.recipient.party_id.as_uuid())
    .bind(record.recipient.party_type.as_str())
    .bind(record.collaboration_type().as_str())
    .bind(record.payload.to_json())
    .bind(record.status.as_str())
    .bind(to_json(&record.compliance_flags, "compliance_flags")?)
    .bind(enum_to_text(&record.priority, "priority")?)
    .bind(record.has_counter)
    .bind(record.latest_counter_id.map(|id| *id.as_uuid()))
    .bind(record.admin_review.as_ref().map(|r| to_json(r, "admin_review")).transpose()?)
    .bind(record.response.as_ref().map(|r| to_json(r, "response")).transpose()?)
    .bind(dt(&record.created_at))
    .bind(dt(&record.updated_at))
    .bind(record.submitted_at.as_ref().map(dt))
    .bind(record.delivered_at.as_ref().map(dt))
    .bind(record.expires_at.as_ref().map(dt))
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

/// Overwrite a collaboration if it is still at `expected_version`.
///
/// Returns `false` if another writer committed first.
pub async fn update_versioned(
    conn: &mut PgConnection,
    record: &Collaboration,
    expected_version: u64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE collaborations SET collaboration_type = $3, form_data = $4, status = $5,
         compliance_flags = $6, priority = $7, has_counter = $8, latest_counter_id = $9,
         admin_review = $10, response = $11, updated_at = $12, submitted_at = $13,
         delivered_at = $14, expires_at = $15, version = $16, transitions = $17
         WHERE id = $1 AND version = $2",
    )
    .bind(record.id.as_uuid())
    .bind(version_to_db(expected_version)?)
    .bind(record.collaboration_type().as_str())
    .bind(record.payload.to_json())
    .bind(record.status.as_str())
    .bind(to_json(&record.compliance_flags, "compliance_flags")?)
    .bind(enum_to_text(&record.priority, "priority")?)
    .bind(record.has_counter)
    .bind(record.latest_counter_id.map(|id| *id.as_uuid()))
    .bind(record.admin_review.as_ref().map(|r| to_json(r, "admin_review")).transpose()?)
    .bind(record.response.as_ref().map(|r| to_json(r, "response")).transpose()?)
    .bind(dt(&record.updated_at))
    .bind(record.submitted_at.as_ref().map(dt))
    .bind(record.delivered_at.as_ref().map(dt))
    .bind(record.expires_at.as_ref().map(dt))
    .bind(version_to_db(record.version)?)
    .bind(to_json(&record.transitions, "transitions")?)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Fetch a collaboration by ID.
pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Collaboration>, sqlx::Error> {
    let row = sqlx::query_as::<_, CollaborationRow>(&format!(
        "SELECT {COLUMNS} FROM collaborations WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(CollaborationRow::into_record).transpose()
}

/// Load all collaborations on startup. Rows that cannot be decoded are
/// logged and skipped.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Collaboration>, sqlx::Error> {
    let rows = sqlx::query_as::<_, CollaborationRow>(&format!(
        "SELECT {COLUMNS} FROM collaborations ORDER BY created_at"
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
                        "skipping undecodable collaboration row; investigate for data corruption"
                    );
                })
                .ok()
        })
        .collect())
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct CollaborationRow {
    id: Uuid,
    proposer_id: Uuid,
    proposer_type: String,
    recipient_id: Uuid,
    recipient_type: String,
    collaboration_type: String,
    form_data: serde_json::Value,
    status: String,
    compliance_flags: serde_json::Value,
    priority: String,
    has_counter: bool,
    latest_counter_id: Option<Uuid>,
    admin_review: Option<serde_json::Value>,
    response: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    version: i64,
    transitions: serde_json::Value,
}

impl CollaborationRow {
    /// Decode a row. Legacy type and status names resolve to their
    /// canonical forms.
    fn into_record(self) -> Result<Collaboration, sqlx::Error> {
        let proposer_type: PartyType = enum_from_text(&self.proposer_type, "proposer_type")?;
        let recipient_type: PartyType = enum_from_text(&self.recipient_type, "recipient_type")?;

        let collaboration_type =
            CollaborationType::from_wire(&self.collaboration_type, proposer_type)
                .ok_or_else(|| decode_error("collaboration_type", &self.collaboration_type))?;
        let payload = FormData::from_wire(
            collaboration_type.as_str(),
            proposer_type,
            self.form_data,
        )
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: "form_data".to_string(),
            source: Box::new(e),
        })?;
        let status = CollaborationStatus::from_wire(&self.status)
            .ok_or_else(|| decode_error("status", &self.status))?;

        let transitions: Vec<TransitionRecord> = from_json(self.transitions, "transitions")
            .unwrap_or_else(|e| {
                tracing::error!(
                    id = %self.id,
                    error = %e,
                    "failed to decode collaboration transitions; defaulting to empty"
                );
                Vec::new()
            });

        Ok(Collaboration {
            id: CollaborationId::from_uuid(self.id),
            proposer: PartyRef::new(PartyId::from_uuid(self.proposer_id), proposer_type),
            recipient: PartyRef::new(PartyId::from_uuid(self.recipient_id), recipient_type),
            payload,
            status,
            compliance_flags: from_json(self.compliance_flags, "compliance_flags")?,
            priority: enum_from_text(&self.priority, "priority")?,
            has_counter: self.has_counter,
            latest_counter_id: self.latest_counter_id.map(CounterId::from_uuid),
            admin_review: self
                .admin_review
                .map(|v| from_json(v, "admin_review"))
                .transpose()?,
            response: self.response.map(|v| from_json(v, "response")).transpose()?,
            created_at: Timestamp::from_utc(self.created_at),
            updated_at: Timestamp::from_utc(self.updated_at),
            submitted_at: self.submitted_at.map(Timestamp::from_utc),
            delivered_at: self.delivered_at.map(Timestamp::from_utc),
            expires_at: self.expires_at.map(Timestamp::from_utc),
            version: version_from_db(self.version)?,
            transitions,
        })
    }
}

fn decode_error(column: &str, raw: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unrecognized value {raw:?}").into(),
    }
}
