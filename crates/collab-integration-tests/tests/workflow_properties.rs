//! # Workflow Properties
//!
//! Random operation sequences against a single collaboration. Whatever the
//! order, the transition log stays a connected chain, the version tracks
//! it, terminal states stick, and delivery is never revoked.

use chrono::NaiveDate;
use collab_compliance::{ComplianceFlags, ComplianceScanner};
use collab_core::{ModeratorId, PartyId, PartyRef, Timestamp};
use collab_negotiation::{
    Collaboration, CommunityToVenue, CounterDraft, CounterProposal, EventDetails, FieldResponse,
    FormData, ModerationAction, VenueRequest,
};
use collab_state::{CollaborationStatus, StatusProjector, ViewerRole};
use proptest::prelude::*;

fn payload() -> FormData {
    FormData::CommunityToVenue(CommunityToVenue {
        event: EventDetails {
            event_name: "Film Club".into(),
            event_date: NaiveDate::from_ymd_opt(2027, 1, 15).unwrap(),
            message: "Screening and discussion.".into(),
        },
        venue_request: VenueRequest {
            expected_attendees: 30,
            time_slot: "20:00-22:30".into(),
            budget_range: "$150".into(),
            special_requirements: Some("Projector".into()),
        },
    })
}

struct Run {
    c: Collaboration,
    counter: Option<CounterProposal>,
    moderator: ModeratorId,
}

impl Run {
    fn new(now: Timestamp) -> Self {
        let proposer = PartyRef::community(PartyId::new());
        let recipient = PartyRef::venue(PartyId::new());
        Self {
            c: Collaboration::new_draft(proposer, recipient, payload(), now).unwrap(),
            counter: None,
            moderator: ModeratorId::new(),
        }
    }

    /// Attempt operation `op`; refusals are expected and ignored.
    fn step(&mut self, op: u8, now: Timestamp) {
        let (proposer, recipient) = (self.c.proposer, self.c.recipient);
        let none = ComplianceFlags::new;
        let approve = ModerationAction::Approve { notes: None };
        let reject = ModerationAction::Reject {
            rejection_reason: "Outside the venue's remit".into(),
            notes: None,
        };
        let flag = ModerationAction::Flag {
            flag_reason: "Spot check".into(),
            notes: None,
        };
        let _ = match op {
            0 => self.c.submit(&proposer, none(), Some(now.plus_days(30).unwrap()), now),
            1 => self.c.moderate(self.moderator, &approve, now).map(|_| ()),
            2 => self.c.moderate(self.moderator, &reject, now).map(|_| ()),
            3 => self.c.moderate(self.moderator, &flag, now).map(|_| ()),
            4 => self.c.accept(&recipient, None, none(), now),
            5 => self.c.decline(&recipient, None, none(), now),
            6 => {
                let mut draft = CounterDraft::default();
                draft
                    .field_responses
                    .insert("budgetRange".into(), FieldResponse::modify("$200"));
                draft
                    .validate_for(&self.c, &recipient, &now)
                    .and_then(|data| {
                        CounterProposal::submit(&mut self.c, &recipient, data, none(), now)
                    })
                    .map(|k| self.counter = Some(k))
            }
            7 | 8 => match self.counter.as_mut() {
                Some(k) => {
                    let action = if op == 7 { &approve } else { &reject };
                    k.moderate(&mut self.c, self.moderator, action, now).map(|_| ())
                }
                None => Ok(()),
            },
            9 => self.c.accept_counter(&proposer, None, none(), now),
            10 => self.c.decline_counter(&proposer, None, none(), now),
            _ => self.c.expire_if_due(now.plus_days(31).unwrap()).map(|_| ()),
        };
    }
}

proptest! {
    #[test]
    fn transition_log_is_a_connected_chain(ops in prop::collection::vec(0u8..12, 0..24)) {
        let now = Timestamp::now();
        let mut run = Run::new(now);
        let mut delivered = false;
        let mut terminal: Option<CollaborationStatus> = None;

        for op in ops {
            run.step(op, now);
            let c = &run.c;

            prop_assert_eq!(c.version as usize, c.transitions.len());
            let mut expected_from = CollaborationStatus::Draft.as_str();
            for t in &c.transitions {
                prop_assert_eq!(t.from_state.as_str(), expected_from);
                expected_from = t.to_state.as_str();
            }
            prop_assert_eq!(expected_from, c.status.as_str());

            if let Some(end) = terminal {
                prop_assert_eq!(c.status, end);
            } else if c.status.is_terminal() {
                terminal = Some(c.status);
            }

            prop_assert!(!delivered || c.was_delivered());
            delivered = c.was_delivered();

            let k_active = run.counter.as_ref().is_some_and(|k| k.is_active());
            if c.status == CollaborationStatus::CounterPendingReview {
                prop_assert!(k_active);
            }
        }
    }

    #[test]
    fn party_labels_never_name_moderation(status_idx in 0usize..10, recipient in any::<bool>()) {
        let status = CollaborationStatus::ALL[status_idx];
        let viewer = if recipient { ViewerRole::Recipient } else { ViewerRole::Submitter };
        let label = StatusProjector::label(status, viewer).to_lowercase();
        for word in ["admin", "moderat", "flag", "reject", "review queue"] {
            prop_assert!(!label.contains(word));
        }
    }

    #[test]
    fn scanner_never_panics_on_arbitrary_text(text in ".{0,400}") {
        let scanner = ComplianceScanner::new().unwrap();
        let flags = scanner.scan_text(&text);
        prop_assert!(flags.len() <= 5);
    }
}
