//! # Statuses Subcommand
//!
//! Prints what each party sees for every internal status, so support staff
//! can translate between a user's screen and the moderation console.

use anyhow::Result;
use clap::Args;
use collab_state::{CollaborationStatus, StatusProjector, ViewerRole};
use serde::Serialize;

/// Arguments for the `collab statuses` subcommand.
#[derive(Args, Debug)]
pub struct StatusesArgs {
    /// Print the table as JSON.
    #[arg(long)]
    pub json: bool,
}

/// One row of the projection table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRow {
    pub status: &'static str,
    pub terminal: bool,
    pub submitter: &'static str,
    pub recipient: &'static str,
    pub recipient_visible: bool,
}

pub fn rows() -> Vec<StatusRow> {
    CollaborationStatus::ALL
        .into_iter()
        .map(|status| {
            let recipient = StatusProjector::project(status, ViewerRole::Recipient);
            StatusRow {
                status: status.as_str(),
                terminal: status.is_terminal(),
                submitter: StatusProjector::label(status, ViewerRole::Submitter),
                recipient: recipient.label,
                recipient_visible: recipient.visible,
            }
        })
        .collect()
}

pub fn run_statuses(args: &StatusesArgs) -> Result<u8> {
    let rows = rows();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(0);
    }

    let width = rows.iter().map(|r| r.status.len()).max().unwrap_or(0);
    println!("{:width$}  {:24}  RECIPIENT", "STATUS", "SUBMITTER");
    for row in &rows {
        let recipient = if row.recipient_visible {
            row.recipient.to_string()
        } else {
            format!("({})", row.recipient)
        };
        println!("{:width$}  {:24}  {}", row.status, row.submitter, recipient);
    }
    Ok(0)
}
