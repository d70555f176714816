//! # collab-cli — Operator CLI for the Collaboration Workflow
//!
//! ## Subcommands
//!
//! - `collab scan` — run the compliance scanner over text or a file.
//! - `collab statuses` — print the status projection table for both viewers.
//! - `collab reconcile` — compute final terms from a collaboration and a
//!   counter exported as JSON.
//!
//! ```bash
//! collab scan "call me at 9876543210"
//! collab scan --file message.txt --json
//! collab statuses
//! collab reconcile --collaboration collab.json --counter counter.json
//! ```
//!
//! Handlers return the process exit code: 0 on success, 1 when the input
//! was examined and found wanting (flags present, reconciliation refused).

pub mod reconcile;
pub mod scan;
pub mod statuses;
