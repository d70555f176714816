//! # collab-compliance — Contact-Leakage Scanner
//!
//! Inspects the free-text fields of a proposal, counter or party response
//! for contact details that would let the parties move the conversation
//! off-platform and around the moderator.
//!
//! The scanner is heuristic and deterministic. It never blocks a
//! submission: flags only direct moderator attention. Moderators may
//! approve flagged items anyway.
//!
//! ## Severity tiers
//!
//! | Flags present | Severity |
//! |---|---|
//! | `contains_phone`, `contains_email`, or any `auto_reject` rule | high |
//! | anything else | medium |
//! | none | clean |
//!
//! Severity is always recomputed from the flag set, never stored.

pub mod flags;
pub mod priority;
pub mod scanner;

pub use flags::{ComplianceFlags, FlagCode, Severity};
pub use priority::{Priority, SlaPolicy};
pub use scanner::{ComplianceScanner, FlagHit, PhraseRule, ScanReport, ScannerError};
