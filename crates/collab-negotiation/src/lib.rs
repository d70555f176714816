//! # collab-negotiation — Proposals, Counters, Final Terms
//!
//! The domain records of the collaboration workflow and every transition on
//! them. Pure and synchronous: callers pass the actor and the clock
//! explicitly, and persistence decides whether a mutated copy commits.
//!
//! - [`Collaboration`]: a proposal between two parties, with its moderated
//!   lifecycle, lazy expiry, and audit log.
//! - [`CounterProposal`]: a recipient's field-by-field response, validated
//!   against the parent's typed [`FormData`].
//! - [`reconcile`]: the final terms once a counter is delivered.
//!
//! Every mutating method bumps the record's `version` exactly once per
//! committed transition. Idempotent repeats return
//! [`TransitionOutcome::AlreadyApplied`] and leave the record untouched.

pub mod audit;
pub mod collaboration;
pub mod counter;
pub mod error;
pub mod payload;
pub mod reconcile;
pub mod review;

pub use audit::{Actor, TransitionOutcome, TransitionRecord};
pub use collaboration::{Collaboration, PartyResponse, MAX_RESPONSE_MESSAGE};
pub use counter::{
    CommercialCounter, CounterData, CounterDraft, CounterProposal, FieldAction, FieldResponse,
};
pub use error::WorkflowError;
pub use payload::{
    BrandOffer, BrandSponsorship, BrandToCommunity, CollaborationType, CommunityToBrand,
    CommunityToVenue, EventDetails, FieldKind, FormData, FormField, VenueOffer, VenueRequest,
    VenueToCommunity,
};
pub use reconcile::{original_terms, reconcile, FinalTerms};
pub use review::{
    AdminReview, ModerationAction, ReviewDecision, MAX_REVIEW_TEXT, MIN_FLAG_REASON,
    MIN_REJECTION_REASON,
};
