//! # Database Persistence Layer
//!
//! Postgres persistence for collaborations, counter proposals and the audit
//! log via SQLx.
//!
//! The database layer is **optional**. When `DATABASE_URL` is set, the API
//! persists every committed transition and uses row versions for
//! optimistic concurrency. When absent, the API operates in in-memory-only
//! mode (suitable for development and testing).

pub mod audit;
pub mod collaborations;
pub mod counters;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::state::ChangeSet;

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if no database URL is configured (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool(
    url: Option<&str>,
    max_connections: u32,
) -> Result<Option<PgPool>, sqlx::Error> {
    let url = match url {
        Some(url) => url,
        None => {
            tracing::warn!(
                "DATABASE_URL not set — running in-memory only mode. \
                 State will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(2.min(max_connections))
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!(max_connections, "Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// Write every record of `changes` and its audit events in one transaction.
///
/// Returns `Ok(false)` without writing anything when a record is no longer
/// at its expected version, an inserted id already exists, or a second
/// active counter would be created.
pub async fn commit(pool: &PgPool, changes: &ChangeSet) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    if let Some(staged) = &changes.collaboration {
        let written = match staged.expected_version {
            None => collaborations::insert(&mut *tx, &staged.record).await?,
            Some(v) => collaborations::update_versioned(&mut *tx, &staged.record, v).await?,
        };
        if !written {
            tx.rollback().await?;
            return Ok(false);
        }
    }

    if let Some(staged) = &changes.counter {
        let written = match staged.expected_version {
            None => counters::insert(&mut *tx, &staged.record).await?,
            Some(v) => counters::update_versioned(&mut *tx, &staged.record, v).await?,
        };
        if !written {
            tx.rollback().await?;
            return Ok(false);
        }
    }

    for event in &changes.audit {
        audit::append(&mut *tx, event).await?;
    }

    tx.commit().await?;
    Ok(true)
}

/// Whether `err` is a unique-constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Serialize a value for a JSONB column.
pub(crate) fn to_json<T: Serialize>(
    value: &T,
    column: &str,
) -> Result<serde_json::Value, sqlx::Error> {
    serde_json::to_value(value).map_err(|e| {
        tracing::error!(error = %e, column, "failed to serialize column");
        sqlx::Error::Encode(Box::new(e))
    })
}

/// Decode a JSONB or text column into a typed value.
pub(crate) fn from_json<T: DeserializeOwned>(
    value: serde_json::Value,
    column: &str,
) -> Result<T, sqlx::Error> {
    serde_json::from_value(value).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

/// Decode a snake_case enum stored as text.
pub(crate) fn enum_from_text<T: DeserializeOwned>(
    raw: &str,
    column: &str,
) -> Result<T, sqlx::Error> {
    from_json(serde_json::Value::String(raw.to_string()), column)
}

/// Encode a snake_case enum as text.
pub(crate) fn enum_to_text<T: Serialize>(value: &T, column: &str) -> Result<String, sqlx::Error> {
    let json = to_json(value, column)?;
    json.as_str().map(String::from).ok_or_else(|| {
        tracing::error!(value = ?json, column, "enum did not serialize to a JSON string");
        sqlx::Error::Encode(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{column} did not serialize to a string"),
        )))
    })
}

fn version_to_db(version: u64) -> Result<i64, sqlx::Error> {
    i64::try_from(version).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

fn version_from_db(version: i64) -> Result<u64, sqlx::Error> {
    u64::try_from(version).map_err(|e| sqlx::Error::ColumnDecode {
        index: "version".to_string(),
        source: Box::new(e),
    })
}
