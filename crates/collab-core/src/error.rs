//! # Error Types
//!
//! Parse and construction failures for the foundational types. Workflow
//! errors live in `collab-negotiation`.

use thiserror::Error;

/// Error constructing or parsing a core type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Timestamp string was malformed or not UTC.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Identifier string was not a UUID.
    #[error("invalid identifier {value:?}: {reason}")]
    InvalidIdentifier {
        /// The rejected input.
        value: String,
        /// Parser message.
        reason: String,
    },

    /// Party type outside {community, venue, brand}.
    #[error("unknown party type: {0:?}")]
    UnknownPartyType(String),

    /// Timestamp arithmetic left chrono's representable range.
    #[error("timestamp out of range: {0}")]
    TimestampOutOfRange(String),
}
