//! Fixtures shared by the service and route tests.

use chrono::NaiveDate;
use collab_core::{ModeratorId, PartyId, PartyRef};
use collab_negotiation::{
    Collaboration, CommunityToVenue, CounterDraft, CounterProposal, EventDetails, FieldResponse,
    FormData, ModerationAction, VenueRequest,
};

use crate::moderation::moderate_collaboration;
use crate::proposals;
use crate::state::AppState;

pub(crate) fn community() -> PartyRef {
    PartyRef::community(PartyId::new())
}

pub(crate) fn venue() -> PartyRef {
    PartyRef::venue(PartyId::new())
}

pub(crate) fn moderator() -> ModeratorId {
    ModeratorId::new()
}

/// A community-to-venue payload whose `message` is `message`.
pub(crate) fn venue_payload(message: &str) -> FormData {
    FormData::CommunityToVenue(CommunityToVenue {
        event: EventDetails {
            event_name: "Poetry Slam".into(),
            event_date: NaiveDate::from_ymd_opt(2026, 11, 20).unwrap(),
            message: message.into(),
        },
        venue_request: VenueRequest {
            expected_attendees: 80,
            time_slot: "19:00-22:00".into(),
            budget_range: "$500-$800".into(),
            special_requirements: None,
        },
    })
}

/// A community-to-venue proposal at `pending_admin_review`.
pub(crate) async fn submitted_collaboration(state: &AppState, message: &str) -> Collaboration {
    proposals::create(state, community(), venue(), venue_payload(message), true)
        .await
        .unwrap()
}

/// A clean proposal approved and delivered to its venue.
pub(crate) async fn delivered_collaboration(state: &AppState) -> Collaboration {
    let c = submitted_collaboration(state, "Monthly slam, all ages welcome.").await;
    moderate_collaboration(
        state,
        c.id,
        moderator(),
        &ModerationAction::Approve { notes: None },
    )
    .await
    .unwrap()
    .collaboration
}

/// A delivered proposal with a counter awaiting review that modifies
/// `budgetRange` to `$900`.
pub(crate) async fn pending_counter(state: &AppState) -> (Collaboration, CounterProposal) {
    let c = delivered_collaboration(state).await;
    let mut draft = CounterDraft::default();
    draft
        .field_responses
        .insert("budgetRange".into(), FieldResponse::modify("$900"));
    draft
        .field_responses
        .insert("timeSlot".into(), FieldResponse::accept());
    proposals::submit_counter(state, c.id, c.recipient, draft)
        .await
        .unwrap()
}
