//! # API Route Modules
//!
//! - `collaborations` — party-facing proposal workflow: drafts,
//!   submission, accept/decline, counters, final terms. Every response is
//!   role-projected and every error passes through
//!   [`AppError::party_facing`](crate::error::AppError::party_facing).
//! - `admin` — moderation console: review queues, full records, analytics,
//!   approve/reject/flag for proposals and counters, audit trail.

pub mod admin;
pub mod collaborations;
