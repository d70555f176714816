//! # Reconcile Subcommand
//!
//! Computes final terms offline from a collaboration record and one of its
//! counters, as exported from the moderation console. Extra fields in the
//! export (effective status, priority) are ignored.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use collab_negotiation::{reconcile, Collaboration, CounterProposal, FinalTerms};
use serde::de::DeserializeOwned;

/// Arguments for the `collab reconcile` subcommand.
#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Collaboration record as JSON.
    #[arg(long, value_name = "JSON")]
    pub collaboration: PathBuf,

    /// Delivered counter proposal as JSON.
    #[arg(long, value_name = "JSON")]
    pub counter: PathBuf,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Load both records and reconcile them.
pub fn reconcile_files(collaboration: &Path, counter: &Path) -> Result<FinalTerms> {
    let parent: Collaboration = read_json(collaboration)?;
    let counter: CounterProposal = read_json(counter)?;
    tracing::debug!(
        collaboration_id = %parent.id,
        counter_id = %counter.id,
        "reconciling"
    );
    Ok(reconcile(&parent, &counter)?)
}

/// Exit code 1 when the pair cannot be reconciled.
pub fn run_reconcile(args: &ReconcileArgs) -> Result<u8> {
    match reconcile_files(&args.collaboration, &args.counter) {
        Ok(terms) => {
            println!("{}", serde_json::to_string_pretty(&terms)?);
            Ok(0)
        }
        Err(e) if e.downcast_ref::<collab_negotiation::WorkflowError>().is_some() => {
            println!("cannot reconcile: {e}");
            Ok(1)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use collab_compliance::ComplianceFlags;
    use collab_core::{ModeratorId, PartyId, PartyRef, Timestamp};
    use collab_negotiation::{
        CommunityToVenue, CounterDraft, EventDetails, FieldResponse, FormData, FormField,
        ModerationAction, VenueRequest,
    };

    fn delivered_counter() -> (Collaboration, CounterProposal) {
        let community = PartyRef::community(PartyId::new());
        let venue = PartyRef::venue(PartyId::new());
        let moderator = ModeratorId::new();
        let now = Timestamp::now();
        let payload = FormData::CommunityToVenue(CommunityToVenue {
            event: EventDetails {
                event_name: "Poetry Slam".into(),
                event_date: NaiveDate::from_ymd_opt(2026, 11, 20).unwrap(),
                message: "Monthly slam".into(),
            },
            venue_request: VenueRequest {
                expected_attendees: 80,
                time_slot: "19:00-22:00".into(),
                budget_range: "$500-$800".into(),
                special_requirements: None,
            },
        });

        let mut parent = Collaboration::new_draft(community, venue, payload, now).unwrap();
        parent
            .submit(&community, ComplianceFlags::new(), None, now)
            .unwrap();
        let approve = ModerationAction::Approve { notes: None };
        parent.moderate(moderator, &approve, now).unwrap();

        let mut draft = CounterDraft::default();
        draft
            .field_responses
            .insert("budgetRange".into(), FieldResponse::modify("$900"));
        let data = draft.validate_for(&parent, &venue, &now).unwrap();
        let mut counter =
            CounterProposal::submit(&mut parent, &venue, data, ComplianceFlags::new(), now)
                .unwrap();
        counter.moderate(&mut parent, moderator, &approve, now).unwrap();
        (parent, counter)
    }

    fn write(dir: &Path, name: &str, value: &impl serde::Serialize) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
        path
    }

    #[test]
    fn reconciles_exported_records() {
        let (parent, counter) = delivered_counter();
        let dir = tempfile::tempdir().unwrap();
        let c = write(dir.path(), "collab.json", &parent);
        let k = write(dir.path(), "counter.json", &counter);

        let terms = reconcile_files(&c, &k).unwrap();
        assert_eq!(
            terms.get(FormField::BudgetRange),
            Some(&serde_json::Value::from("$900"))
        );
        assert_eq!(
            terms.get(FormField::TimeSlot),
            Some(&serde_json::Value::from("19:00-22:00"))
        );
    }

    #[test]
    fn mismatched_pair_exits_with_one() {
        let (_, counter) = delivered_counter();
        let (other_parent, _) = delivered_counter();
        let dir = tempfile::tempdir().unwrap();
        let args = ReconcileArgs {
            collaboration: write(dir.path(), "collab.json", &other_parent),
            counter: write(dir.path(), "counter.json", &counter),
        };
        assert_eq!(run_reconcile(&args).unwrap(), 1);
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let args = ReconcileArgs {
            collaboration: PathBuf::from("/nonexistent/collab.json"),
            counter: PathBuf::from("/nonexistent/counter.json"),
        };
        assert!(run_reconcile(&args).is_err());
    }
}
