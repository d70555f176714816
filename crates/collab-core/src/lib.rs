//! # collab-core — Foundational Types for the Collaboration Workflow
//!
//! Every other crate in the workspace depends on `collab-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `CollaborationId`, `CounterId`,
//!    `PartyId`, `ModeratorId`. A counter id cannot be passed where a
//!    collaboration id is expected.
//!
//! 2. **Explicit parties.** A [`PartyRef`] pairs a party id with its
//!    [`PartyType`]. Workflow operations take the acting party as an
//!    argument; there is no ambient "current user".
//!
//! 3. **UTC-only timestamps.** [`Timestamp`] is UTC with seconds precision.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `collab-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod party;
pub mod temporal;

pub use error::CoreError;
pub use identity::{CollaborationId, CounterId, ModeratorId, PartyId};
pub use party::{PartyRef, PartyType};
pub use temporal::Timestamp;
