//! # Review Priority
//!
//! Queue priority for the moderation console. The base comes from the
//! compliance severity; items waiting past the SLA thresholds are
//! escalated regardless of severity.

use collab_core::Timestamp;
use serde::{Deserialize, Serialize};

use crate::flags::Severity;

/// Moderation queue priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Base priority for a severity tier.
    pub fn from_severity(severity: Severity) -> Self {
        match severity {
            Severity::Clean => Self::Low,
            Severity::Medium => Self::Medium,
            Severity::High => Self::High,
        }
    }

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Priority after SLA escalation for an item submitted at `submitted_at`.
    pub fn escalated(self, submitted_at: &Timestamp, now: &Timestamp, sla: &SlaPolicy) -> Self {
        self.max(sla.age_priority(submitted_at, now))
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review-age thresholds, in hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaPolicy {
    /// Waiting at least this long raises priority to medium.
    pub medium_after_hours: i64,
    /// Waiting at least this long raises priority to high.
    pub high_after_hours: i64,
}

impl SlaPolicy {
    /// Priority implied by waiting time alone.
    pub fn age_priority(&self, submitted_at: &Timestamp, now: &Timestamp) -> Priority {
        let waited = now.seconds_since(submitted_at);
        if waited >= self.high_after_hours.saturating_mul(3600) {
            Priority::High
        } else if waited >= self.medium_after_hours.saturating_mul(3600) {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}

impl Default for SlaPolicy {
    fn default() -> Self {
        Self {
            medium_after_hours: 24,
            high_after_hours: 48,
        }
    }
}
