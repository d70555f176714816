//! # Concurrent Writers
//!
//! Races between parties and moderators on the same record. Each test runs
//! on a multi-threaded runtime so the spawned tasks genuinely interleave.

use chrono::NaiveDate;
use collab_api::error::AppError;
use collab_api::moderation::{moderate_collaboration, moderate_counter};
use collab_api::proposals;
use collab_api::state::AppState;
use collab_core::{ModeratorId, PartyId, PartyRef, Timestamp};
use collab_negotiation::{
    Collaboration, CommunityToVenue, CounterDraft, EventDetails, FieldResponse, FormData,
    ModerationAction, TransitionOutcome, VenueRequest,
};
use collab_state::{CollaborationStatus, CounterStatus};

fn payload() -> FormData {
    FormData::CommunityToVenue(CommunityToVenue {
        event: EventDetails {
            event_name: "Board Game Night".into(),
            event_date: NaiveDate::from_ymd_opt(2026, 11, 27).unwrap(),
            message: "Around forty players, we bring the games.".into(),
        },
        venue_request: VenueRequest {
            expected_attendees: 40,
            time_slot: "19:00-23:00".into(),
            budget_range: "$200-$350".into(),
            special_requirements: None,
        },
    })
}

async fn delivered(state: &AppState) -> Collaboration {
    let c = proposals::create(
        state,
        PartyRef::community(PartyId::new()),
        PartyRef::venue(PartyId::new()),
        payload(),
        true,
    )
    .await
    .unwrap();
    moderate_collaboration(
        state,
        c.id,
        ModeratorId::new(),
        &ModerationAction::Approve { notes: None },
    )
    .await
    .unwrap()
    .collaboration
}

fn counter_with_budget(budget: &str) -> CounterDraft {
    let mut draft = CounterDraft::default();
    draft
        .field_responses
        .insert("budgetRange".into(), FieldResponse::modify(budget));
    draft
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_counters_admit_exactly_one() {
    let state = AppState::try_new().unwrap();
    let c = delivered(&state).await;
    let (id, recipient) = (c.id, c.recipient);

    let handles: Vec<_> = ["$300", "$320", "$340", "$360"]
        .into_iter()
        .map(|budget| {
            let state = state.clone();
            let draft = counter_with_budget(budget);
            tokio::spawn(async move {
                proposals::submit_counter(&state, id, recipient, draft).await
            })
        })
        .collect();

    let mut winners = Vec::new();
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok((_, counter)) => winners.push(counter),
            Err(AppError::DuplicateActiveCounter(_)) => duplicates += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(duplicates, 3);

    let active: Vec<_> = state
        .counters
        .list()
        .into_iter()
        .filter(|k| k.collaboration_id == c.id && k.is_active())
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, winners[0].id);

    let parent = state.collaborations.get(c.id.as_uuid()).unwrap();
    assert_eq!(parent.status, CollaborationStatus::CounterPendingReview);
    assert_eq!(parent.latest_counter_id, Some(winners[0].id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_approval_by_one_moderator_transitions_once() {
    let state = AppState::try_new().unwrap();
    let c = proposals::create(
        &state,
        PartyRef::community(PartyId::new()),
        PartyRef::venue(PartyId::new()),
        payload(),
        true,
    )
    .await
    .unwrap();
    let (id, moderator) = (c.id, ModeratorId::new());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let state = state.clone();
            tokio::spawn(async move {
                moderate_collaboration(
                    &state,
                    id,
                    moderator,
                    &ModerationAction::Approve { notes: None },
                )
                .await
            })
        })
        .collect();

    let mut transitioned = 0;
    for handle in handles {
        let decision = handle.await.unwrap().unwrap();
        assert_eq!(decision.collaboration.status, CollaborationStatus::ApprovedDelivered);
        if decision.outcome == TransitionOutcome::Transitioned {
            transitioned += 1;
        }
    }
    assert_eq!(transitioned, 1);

    let stored = state.collaborations.get(c.id.as_uuid()).unwrap();
    let approvals = stored
        .transitions
        .iter()
        .filter(|t| t.to_state == "approved_delivered")
        .count();
    assert_eq!(approvals, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn competing_decisions_leave_one_winner() {
    let state = AppState::try_new().unwrap();
    let c = delivered(&state).await;
    let (_, counter) =
        proposals::submit_counter(&state, c.id, c.recipient, counter_with_budget("$250"))
            .await
            .unwrap();
    let counter_id = counter.id;

    let approve = {
        let state = state.clone();
        tokio::spawn(async move {
            moderate_counter(
                &state,
                counter_id,
                ModeratorId::new(),
                &ModerationAction::Approve { notes: None },
            )
            .await
        })
    };
    let reject = {
        let state = state.clone();
        tokio::spawn(async move {
            moderate_counter(
                &state,
                counter_id,
                ModeratorId::new(),
                &ModerationAction::Reject {
                    rejection_reason: "Budget outside community norms".into(),
                    notes: None,
                },
            )
            .await
        })
    };

    let results = [approve.await.unwrap(), reject.await.unwrap()];
    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "exactly one decision lands: {results:?}");
    for r in &results {
        if let Err(e) = r {
            assert!(matches!(e, AppError::InvalidTransition(_)), "got {e:?}");
        }
    }

    let stored_counter = state.counters.get(counter_id.as_uuid()).unwrap();
    let parent = state.collaborations.get(c.id.as_uuid()).unwrap();
    match stored_counter.status {
        CounterStatus::ApprovedDelivered => {
            assert_eq!(parent.status, CollaborationStatus::CounterDelivered)
        }
        CounterStatus::Rejected => {
            assert_eq!(parent.status, CollaborationStatus::ApprovedDelivered)
        }
        other => panic!("counter left at {other}"),
    }
    assert_ne!(
        parent.effective_status(&Timestamp::now()),
        CollaborationStatus::CounterPendingReview
    );
}
