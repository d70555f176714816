//! # collab-state — Collaboration Lifecycle
//!
//! The internal status vocabulary and the transition table every write path
//! goes through, plus the pure projection from internal status to the label
//! a party sees.
//!
//! ## Lifecycle
//!
//! ```text
//! draft ──▶ pending_admin_review ──▶ approved_delivered ──▶ confirmed
//!                 │    │                 │    ▲    │
//!                 │    └─▶ flagged ──────┤    │    └──▶ declined
//!                 ▼            │         ▼    │
//!              rejected ◀──────┘   counter_pending_review
//!                                        │
//!                                        ▼
//!                                 counter_delivered ──▶ confirmed | declined
//! ```
//!
//! Every non-terminal status can additionally lapse into `expired`.
//!
//! ## Design
//!
//! The table is data ([`TRANSITIONS`]), not scattered `match` arms, so the
//! exhaustive matrix test and the runtime share one definition. Statuses are
//! runtime enums because they round-trip through storage and HTTP.

pub mod counter;
pub mod projection;
pub mod status;

pub use counter::{
    counter_transition, CounterStatus, CounterTransitionError, CounterTransitionRule,
    COUNTER_TRANSITIONS,
};
pub use projection::{Projection, StatusProjector, ViewerRole, REJECTION_NOTICE};
pub use status::{
    transition, Action, ActorRole, CollaborationStatus, TransitionError, TransitionRule,
    TRANSITIONS,
};
