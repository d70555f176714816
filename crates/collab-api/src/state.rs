//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers via
//! the `State` extractor.
//!
//! ## Concurrency
//!
//! Every record carries a `version`. Services read a record, apply a domain
//! transition to a copy, and hand the copy to [`AppState::commit`] together
//! with the version they read. The commit succeeds only if the stored
//! version is unchanged:
//!
//! - with a database, as `UPDATE ... WHERE id = $1 AND version = $2` inside
//!   one transaction for every record in the [`ChangeSet`];
//! - in memory-only mode, under the write locks of both stores, always
//!   taken collaborations first, then counters.
//!
//! A miss returns [`CommitOutcome::VersionConflict`]; the caller re-reads
//! and re-evaluates.

use std::collections::HashMap;
use std::sync::Arc;

use collab_compliance::{ComplianceScanner, ScannerError, SlaPolicy};
use collab_core::{CollaborationId, CounterId, Timestamp};
use collab_negotiation::{Collaboration, CounterProposal, TransitionRecord, WorkflowError};
use parking_lot::{RwLock, RwLockWriteGuard};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::db::audit::AuditEvent;
use crate::error::AppError;
use crate::middleware::metrics::ApiMetrics;

// -- Generic In-Memory Store --------------------------------------------------

/// Records with an optimistic-concurrency version.
pub trait Versioned {
    fn version(&self) -> u64;
}

impl Versioned for Collaboration {
    fn version(&self) -> u64 {
        self.version
    }
}

impl Versioned for CounterProposal {
    fn version(&self) -> u64 {
        self.version
    }
}

/// Thread-safe, cloneable in-memory key-value store.
///
/// The lock is `parking_lot` and is never held across an `.await`.
#[derive(Debug)]
pub struct Store<T: Clone + Send + Sync> {
    data: Arc<RwLock<HashMap<Uuid, T>>>,
}

impl<T: Clone + Send + Sync> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: Clone + Send + Sync> Store<T> {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, id: Uuid, value: T) -> Option<T> {
        self.data.write().insert(id, value)
    }

    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<T> {
        self.data.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, T>> {
        self.data.write()
    }
}

impl<T: Clone + Send + Sync + Versioned> Store<T> {
    /// Insert or replace, unless the stored copy is already at least as new.
    pub fn upsert_newer(&self, id: Uuid, value: T) {
        let mut guard = self.data.write();
        match guard.get(&id) {
            Some(existing) if existing.version() >= value.version() => {}
            _ => {
                guard.insert(id, value);
            }
        }
    }
}

impl<T: Clone + Send + Sync> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn version_matches<T: Versioned>(current: Option<&T>, expected: Option<u64>) -> bool {
    match (current, expected) {
        (None, None) => true,
        (Some(record), Some(v)) => record.version() == v,
        _ => false,
    }
}

// -- Change sets --------------------------------------------------------------

/// A record to write, with the version it was read at (`None` = new record).
#[derive(Debug, Clone)]
pub struct Staged<T> {
    pub record: T,
    pub expected_version: Option<u64>,
}

/// Records that commit together or not at all.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub collaboration: Option<Staged<Collaboration>>,
    pub counter: Option<Staged<CounterProposal>>,
    /// Appended to the audit log in the same database transaction.
    pub audit: Vec<AuditEvent>,
}

impl ChangeSet {
    pub fn insert_collaboration(record: Collaboration) -> Self {
        Self {
            collaboration: Some(Staged {
                record,
                expected_version: None,
            }),
            ..Self::default()
        }
    }

    pub fn update_collaboration(record: Collaboration, expected_version: u64) -> Self {
        Self {
            collaboration: Some(Staged {
                record,
                expected_version: Some(expected_version),
            }),
            ..Self::default()
        }
    }

    pub fn with_new_counter(mut self, record: CounterProposal) -> Self {
        self.counter = Some(Staged {
            record,
            expected_version: None,
        });
        self
    }

    pub fn with_counter(mut self, record: CounterProposal, expected_version: u64) -> Self {
        self.counter = Some(Staged {
            record,
            expected_version: Some(expected_version),
        });
        self
    }

    pub fn with_audit(mut self, event: AuditEvent) -> Self {
        self.audit.push(event);
        self
    }

    /// Audit each of `transitions`, the records appended since the read.
    pub fn with_transitions(
        mut self,
        resource_type: &str,
        resource_id: Uuid,
        transitions: &[TransitionRecord],
    ) -> Self {
        self.audit.extend(
            transitions
                .iter()
                .map(|t| AuditEvent::transition(resource_type, resource_id, t)),
        );
        self
    }
}

/// Read-modify-commit attempts before a write gives up with 409.
pub const MAX_CAS_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// Another writer changed a record since it was read.
    VersionConflict,
}

// -- Configuration ------------------------------------------------------------

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Invalid environment configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid value for {var}: {value:?}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
}

/// Longest accepted `COLLAB_EXPIRY_DAYS`, ten years.
pub const MAX_EXPIRY_DAYS: i64 = 3650;

/// Longest accepted SLA threshold, one year in hours.
pub const MAX_SLA_HOURS: i64 = 8760;

/// Application configuration, read once at startup.
///
/// Custom `Debug` redacts `auth_token`.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Shared bearer secret. `None` disables secret checking.
    pub auth_token: Option<String>,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Default lifetime of a submitted proposal. `None` disables expiry.
    pub expiry_days: Option<i64>,
    pub sla: SlaPolicy,
    /// Interval of the persisted-expiry sweep. `None` disables it.
    pub expiry_sweep_secs: Option<u64>,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("db_max_connections", &self.db_max_connections)
            .field("expiry_days", &self.expiry_days)
            .field("sla", &self.sla)
            .field("expiry_sweep_secs", &self.expiry_sweep_secs)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            database_url: None,
            db_max_connections: 20,
            expiry_days: Some(30),
            sla: SlaPolicy::default(),
            expiry_sweep_secs: None,
            log_format: LogFormat::Text,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup`, unset variables taking defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            var: &'static str,
        ) -> Result<Option<T>, ConfigError> {
            match lookup(var).filter(|v| !v.trim().is_empty()) {
                None => Ok(None),
                Some(value) => value
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| ConfigError { var, value }),
            }
        }

        fn in_range(
            var: &'static str,
            value: Option<i64>,
            range: std::ops::RangeInclusive<i64>,
        ) -> Result<Option<i64>, ConfigError> {
            match value {
                Some(v) if !range.contains(&v) => Err(ConfigError {
                    var,
                    value: v.to_string(),
                }),
                other => Ok(other),
            }
        }

        let defaults = Self::default();
        let expiry_days = match in_range(
            "COLLAB_EXPIRY_DAYS",
            parsed(&lookup, "COLLAB_EXPIRY_DAYS")?,
            0..=MAX_EXPIRY_DAYS,
        )? {
            Some(0) => None,
            Some(days) => Some(days),
            None => defaults.expiry_days,
        };
        let sla = SlaPolicy {
            medium_after_hours: in_range(
                "SLA_MEDIUM_HOURS",
                parsed(&lookup, "SLA_MEDIUM_HOURS")?,
                1..=MAX_SLA_HOURS,
            )?
            .unwrap_or(defaults.sla.medium_after_hours),
            high_after_hours: in_range(
                "SLA_HIGH_HOURS",
                parsed(&lookup, "SLA_HIGH_HOURS")?,
                1..=MAX_SLA_HOURS,
            )?
            .unwrap_or(defaults.sla.high_after_hours),
        };
        if sla.medium_after_hours > sla.high_after_hours {
            return Err(ConfigError {
                var: "SLA_MEDIUM_HOURS",
                value: format!(
                    "{} (exceeds SLA_HIGH_HOURS={})",
                    sla.medium_after_hours, sla.high_after_hours
                ),
            });
        }
        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError {
                    var: "LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            port: parsed(&lookup, "PORT")?.unwrap_or(defaults.port),
            auth_token: lookup("AUTH_TOKEN").filter(|t| !t.is_empty()),
            database_url: lookup("DATABASE_URL").filter(|u| !u.is_empty()),
            db_max_connections: parsed(&lookup, "DB_MAX_CONNECTIONS")?
                .unwrap_or(defaults.db_max_connections),
            expiry_days,
            sla,
            expiry_sweep_secs: parsed::<u64>(&lookup, "EXPIRY_SWEEP_SECS")?.filter(|s| *s > 0),
            log_format,
        })
    }
}

// -- Application State --------------------------------------------------------

/// Failure building [`AppState`].
#[derive(thiserror::Error, Debug)]
pub enum StateInitError {
    #[error("compliance scanner: {0}")]
    Scanner(#[from] ScannerError),
    #[error("metrics registry: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Shared application state accessible to all route handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub collaborations: Store<Collaboration>,
    pub counters: Store<CounterProposal>,
    pub scanner: Arc<ComplianceScanner>,
    pub metrics: ApiMetrics,
    /// When `Some`, PostgreSQL is the authority for version checks and the
    /// stores are a cache of committed rows.
    pub db_pool: Option<PgPool>,
    pub config: AppConfig,
}

impl AppState {
    /// In-memory state with default configuration.
    pub fn try_new() -> Result<Self, StateInitError> {
        Self::try_with_config(AppConfig::default(), None)
    }

    pub fn try_with_config(
        config: AppConfig,
        db_pool: Option<PgPool>,
    ) -> Result<Self, StateInitError> {
        Ok(Self {
            collaborations: Store::new(),
            counters: Store::new(),
            scanner: Arc::new(ComplianceScanner::new()?),
            metrics: ApiMetrics::try_new()?,
            db_pool,
            config,
        })
    }

    /// Load persisted records into the in-memory stores. Called once on
    /// startup when a database pool is available.
    pub async fn hydrate_from_db(&self) -> Result<(), String> {
        let pool = match &self.db_pool {
            Some(pool) => pool,
            None => return Ok(()),
        };

        let collaborations = db::collaborations::load_all(pool)
            .await
            .map_err(|e| format!("failed to load collaborations: {e}"))?;
        let collaboration_count = collaborations.len();
        for record in collaborations {
            self.collaborations.insert(*record.id.as_uuid(), record);
        }

        let counters = db::counters::load_all(pool)
            .await
            .map_err(|e| format!("failed to load counter proposals: {e}"))?;
        let counter_count = counters.len();
        for record in counters {
            self.counters.insert(*record.id.as_uuid(), record);
        }

        tracing::info!(
            collaborations = collaboration_count,
            counters = counter_count,
            "Hydrated in-memory stores from database"
        );
        Ok(())
    }

    /// Current record for a write. Reads the database when present so a
    /// stale cache costs a retry at most once.
    pub async fn load_collaboration(&self, id: CollaborationId) -> Result<Collaboration, AppError> {
        if let Some(pool) = &self.db_pool {
            let record = db::collaborations::get_by_id(pool, *id.as_uuid())
                .await?
                .ok_or_else(|| WorkflowError::collaboration_not_found(id))?;
            self.collaborations
                .upsert_newer(*record.id.as_uuid(), record.clone());
            return Ok(record);
        }
        self.collaborations
            .get(id.as_uuid())
            .ok_or_else(|| WorkflowError::collaboration_not_found(id).into())
    }

    pub async fn load_counter(&self, id: CounterId) -> Result<CounterProposal, AppError> {
        if let Some(pool) = &self.db_pool {
            let record = db::counters::get_by_id(pool, *id.as_uuid())
                .await?
                .ok_or_else(|| WorkflowError::counter_not_found(id))?;
            self.counters.upsert_newer(*record.id.as_uuid(), record.clone());
            return Ok(record);
        }
        self.counters
            .get(id.as_uuid())
            .ok_or_else(|| WorkflowError::counter_not_found(id).into())
    }

    /// All counters of a collaboration, oldest first.
    pub fn counters_for(&self, id: CollaborationId) -> Vec<CounterProposal> {
        let mut counters: Vec<_> = self
            .counters
            .list()
            .into_iter()
            .filter(|c| c.collaboration_id == id)
            .collect();
        counters.sort_by_key(|c| c.created_at);
        counters
    }

    /// Commit `changes` if every record is still at the version it was read at.
    pub async fn commit(&self, changes: ChangeSet) -> Result<CommitOutcome, AppError> {
        let Some(pool) = &self.db_pool else {
            return Ok(self.commit_in_memory(changes));
        };

        if !db::commit(pool, &changes).await? {
            return Ok(CommitOutcome::VersionConflict);
        }
        if let Some(staged) = changes.collaboration {
            self.collaborations
                .upsert_newer(*staged.record.id.as_uuid(), staged.record);
        }
        if let Some(staged) = changes.counter {
            self.counters
                .upsert_newer(*staged.record.id.as_uuid(), staged.record);
        }
        Ok(CommitOutcome::Committed)
    }

    fn commit_in_memory(&self, changes: ChangeSet) -> CommitOutcome {
        let mut collaborations = self.collaborations.write();
        let mut counters = self.counters.write();

        if let Some(staged) = &changes.collaboration {
            let current = collaborations.get(staged.record.id.as_uuid());
            if !version_matches(current, staged.expected_version) {
                return CommitOutcome::VersionConflict;
            }
        }
        if let Some(staged) = &changes.counter {
            let current = counters.get(staged.record.id.as_uuid());
            if !version_matches(current, staged.expected_version) {
                return CommitOutcome::VersionConflict;
            }
        }

        if let Some(staged) = changes.collaboration {
            collaborations.insert(*staged.record.id.as_uuid(), staged.record);
        }
        if let Some(staged) = changes.counter {
            counters.insert(*staged.record.id.as_uuid(), staged.record);
        }
        CommitOutcome::Committed
    }

    /// Count committed transitions and log each one.
    pub fn record_committed(
        &self,
        resource_type: &str,
        resource_id: Uuid,
        transitions: &[TransitionRecord],
    ) {
        for t in transitions {
            self.metrics.record_transition(t.action);
            tracing::info!(
                resource_type,
                resource_id = %resource_id,
                action = %t.action,
                from = %t.from_state,
                to = %t.to_state,
                actor = %t.actor,
                "transition committed"
            );
        }
    }

    /// Record a lost version race before the caller re-reads.
    pub fn note_conflict(
        &self,
        operation: &str,
        resource_id: impl std::fmt::Display,
        attempt: usize,
    ) {
        self.metrics.record_cas_conflict();
        tracing::warn!(
            operation,
            resource_id = %resource_id,
            attempt,
            max_attempts = MAX_CAS_ATTEMPTS,
            "version conflict on commit, retrying"
        );
    }

    /// Deadline for a proposal submitted at `now`.
    pub fn expiry_from(&self, now: Timestamp) -> Result<Option<Timestamp>, AppError> {
        self.config
            .expiry_days
            .map(|days| now.plus_days(days))
            .transpose()
            .map_err(|e| AppError::Internal(e.to_string()))
    }
}
