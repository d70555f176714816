//! # Timestamps
//!
//! `Timestamp` is UTC with seconds precision. Expiry checks, review latency
//! and SLA ageing all compare `Timestamp`s, so sub-second jitter between
//! the API process and the database never changes an outcome.

use chrono::{DateTime, Duration, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A point in time on every record: creation, review, delivery, deadline.
///
/// Always UTC, always whole seconds. Serialized as the inner `DateTime<Utc>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// Drops any sub-second part of `dt`.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse a timestamp from an RFC 3339 string with a `Z` suffix.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTimestamp`] if the string is not valid
    /// RFC 3339 or uses an explicit offset.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if !s.ends_with('Z') {
            return Err(CoreError::InvalidTimestamp(format!(
                "timestamp must use Z suffix (UTC only), got: {s:?}"
            )));
        }
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| CoreError::InvalidTimestamp(format!("{s:?}: {e}")))?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Unix epoch seconds.
    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// This instant shifted forward by `days` (negative shifts back).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TimestampOutOfRange`] when the result is not
    /// representable.
    pub fn plus_days(&self, days: i64) -> Result<Self, CoreError> {
        self.shifted(Duration::try_days(days), || format!("{self} + {days} days"))
    }

    /// This instant shifted forward by `hours` (negative shifts back).
    pub fn plus_hours(&self, hours: i64) -> Result<Self, CoreError> {
        self.shifted(Duration::try_hours(hours), || format!("{self} + {hours} hours"))
    }

    fn shifted(
        &self,
        delta: Option<Duration>,
        describe: impl FnOnce() -> String,
    ) -> Result<Self, CoreError> {
        delta
            .and_then(|d| self.0.checked_add_signed(d))
            .map(Self)
            .ok_or_else(|| CoreError::TimestampOutOfRange(describe()))
    }

    /// Whole seconds elapsed from `earlier` to `self`. Negative if `earlier` is later.
    pub fn seconds_since(&self, earlier: &Timestamp) -> i64 {
        self.epoch_secs() - earlier.epoch_secs()
    }

    /// `YYYY-MM-DDTHH:MM:SSZ`, the form [`Timestamp::parse`] accepts.
    pub fn to_iso8601(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt - Duration::nanoseconds(i64::from(dt.nanosecond()))
}
