//! # Collaboration Payloads
//!
//! `formData` is a tagged union keyed by collaboration type, one struct per
//! proposal direction. Counter responses address fields through the closed
//! [`FormField`] enum, so "is this a field of the original proposal" is a
//! lookup against the payload variant rather than a free-form string match.
//!
//! ## Legacy types
//!
//! Historical records carry `venue_request`, `brand_sponsorship` and
//! `community_partnership`. [`CollaborationType::from_wire`] maps them to a
//! canonical type once, at the read boundary; `community_partnership` is
//! resolved from the proposer's party type. Only canonical names are ever
//! written.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use collab_core::PartyType;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::WorkflowError;

const MAX_EVENT_NAME: usize = 200;
const MAX_TEXT: usize = 5_000;

// ─── Collaboration Type ──────────────────────────────────────────────

/// Direction of a collaboration proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollaborationType {
    CommunityToVenue,
    CommunityToBrand,
    BrandToCommunity,
    VenueToCommunity,
}

impl CollaborationType {
    pub const ALL: [CollaborationType; 4] = [
        Self::CommunityToVenue,
        Self::CommunityToBrand,
        Self::BrandToCommunity,
        Self::VenueToCommunity,
    ];

    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CommunityToVenue => "communityToVenue",
            Self::CommunityToBrand => "communityToBrand",
            Self::BrandToCommunity => "brandToCommunity",
            Self::VenueToCommunity => "venueToCommunity",
        }
    }

    /// (proposer, recipient) party types this direction implies.
    pub fn parties(&self) -> (PartyType, PartyType) {
        match self {
            Self::CommunityToVenue => (PartyType::Community, PartyType::Venue),
            Self::CommunityToBrand => (PartyType::Community, PartyType::Brand),
            Self::BrandToCommunity => (PartyType::Brand, PartyType::Community),
            Self::VenueToCommunity => (PartyType::Venue, PartyType::Community),
        }
    }

    /// Resolve a stored or submitted type name, canonical or legacy.
    pub fn from_wire(raw: &str, proposer: PartyType) -> Option<Self> {
        match raw {
            "communityToVenue" | "venue_request" => Some(Self::CommunityToVenue),
            "communityToBrand" | "brand_sponsorship" => Some(Self::CommunityToBrand),
            "brandToCommunity" => Some(Self::BrandToCommunity),
            "venueToCommunity" => Some(Self::VenueToCommunity),
            "community_partnership" => match proposer {
                PartyType::Brand => Some(Self::BrandToCommunity),
                PartyType::Venue => Some(Self::VenueToCommunity),
                PartyType::Community => None,
            },
            _ => None,
        }
    }
}

impl std::fmt::Display for CollaborationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Field addressing ────────────────────────────────────────────────

/// Kind of value a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Date,
}

impl FieldKind {
    /// Whether `value` is acceptable for a field of this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Text => value.as_str().is_some_and(|s| !s.trim().is_empty()),
            Self::Integer => value.as_u64().is_some_and(|n| n > 0),
            Self::Date => value
                .as_str()
                .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "positive integer",
            Self::Date => "date (YYYY-MM-DD)",
        }
    }
}

/// Every addressable field across all payload variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FormField {
    EventName,
    EventDate,
    Message,
    ExpectedAttendees,
    TimeSlot,
    BudgetRange,
    SpecialRequirements,
    ExpectedReach,
    BudgetProposed,
    SponsorshipDeliverables,
    OfferDescription,
    BudgetOffered,
    ExpectedDeliverables,
    Capacity,
    AvailableSlots,
    Pricing,
    Amenities,
}

impl FormField {
    pub const ALL: [FormField; 17] = [
        Self::EventName,
        Self::EventDate,
        Self::Message,
        Self::ExpectedAttendees,
        Self::TimeSlot,
        Self::BudgetRange,
        Self::SpecialRequirements,
        Self::ExpectedReach,
        Self::BudgetProposed,
        Self::SponsorshipDeliverables,
        Self::OfferDescription,
        Self::BudgetOffered,
        Self::ExpectedDeliverables,
        Self::Capacity,
        Self::AvailableSlots,
        Self::Pricing,
        Self::Amenities,
    ];

    /// Canonical path within `formData`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EventName => "eventName",
            Self::EventDate => "eventDate",
            Self::Message => "message",
            Self::ExpectedAttendees => "venueRequest.expectedAttendees",
            Self::TimeSlot => "venueRequest.timeSlot",
            Self::BudgetRange => "venueRequest.budgetRange",
            Self::SpecialRequirements => "venueRequest.specialRequirements",
            Self::ExpectedReach => "brandSponsorship.expectedReach",
            Self::BudgetProposed => "brandSponsorship.budgetProposed",
            Self::SponsorshipDeliverables => "brandSponsorship.deliverables",
            Self::OfferDescription => "brandOffer.offerDescription",
            Self::BudgetOffered => "brandOffer.budgetOffered",
            Self::ExpectedDeliverables => "brandOffer.expectedDeliverables",
            Self::Capacity => "venueOffer.capacity",
            Self::AvailableSlots => "venueOffer.availableSlots",
            Self::Pricing => "venueOffer.pricing",
            Self::Amenities => "venueOffer.amenities",
        }
    }

    /// Parse a field key. Accepts the full path or the bare leaf name.
    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| {
            let path = f.as_str();
            path == key || path.rsplit('.').next() == Some(key)
        })
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Self::EventDate => FieldKind::Date,
            Self::ExpectedAttendees | Self::ExpectedReach | Self::Capacity => FieldKind::Integer,
            _ => FieldKind::Text,
        }
    }

    /// Whether a party types this field freely, and so whether it is scanned.
    /// Every text field qualifies, including budgets and slots.
    pub fn is_free_text(&self) -> bool {
        self.kind() == FieldKind::Text
    }
}

impl std::fmt::Display for FormField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FormField {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FormField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("unknown field {raw:?}")))
    }
}

fn put_opt(out: &mut BTreeMap<FormField, Value>, field: FormField, value: &Option<String>) {
    if let Some(v) = value {
        out.insert(field, Value::from(v.clone()));
    }
}

// ─── Payload structs ─────────────────────────────────────────────────

/// Fields common to every direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    pub event_name: String,
    pub event_date: NaiveDate,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueRequest {
    pub expected_attendees: u32,
    pub time_slot: String,
    pub budget_range: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_requirements: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandSponsorship {
    pub expected_reach: u64,
    pub budget_proposed: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deliverables: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandOffer {
    pub offer_description: String,
    pub budget_offered: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_deliverables: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueOffer {
    pub capacity: u32,
    pub available_slots: String,
    pub pricing: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amenities: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityToVenue {
    #[serde(flatten)]
    pub event: EventDetails,
    pub venue_request: VenueRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityToBrand {
    #[serde(flatten)]
    pub event: EventDetails,
    pub brand_sponsorship: BrandSponsorship,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandToCommunity {
    #[serde(flatten)]
    pub event: EventDetails,
    pub brand_offer: BrandOffer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueToCommunity {
    #[serde(flatten)]
    pub event: EventDetails,
    pub venue_offer: VenueOffer,
}

/// The typed `formData` of a collaboration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "formData", rename_all = "camelCase")]
pub enum FormData {
    CommunityToVenue(CommunityToVenue),
    CommunityToBrand(CommunityToBrand),
    BrandToCommunity(BrandToCommunity),
    VenueToCommunity(VenueToCommunity),
}

impl FormData {
    /// Build a payload from a raw type name and untyped `formData`.
    pub fn from_wire(
        raw_type: &str,
        proposer: PartyType,
        form_data: Value,
    ) -> Result<Self, WorkflowError> {
        let ty = CollaborationType::from_wire(raw_type, proposer).ok_or_else(|| {
            WorkflowError::validation(format!(
                "unknown collaboration type {raw_type:?} for a {proposer} proposer"
            ))
        })?;
        let bad_shape =
            |e: serde_json::Error| WorkflowError::validation(format!("formData for {ty}: {e}"));
        Ok(match ty {
            CollaborationType::CommunityToVenue => {
                Self::CommunityToVenue(serde_json::from_value(form_data).map_err(bad_shape)?)
            }
            CollaborationType::CommunityToBrand => {
                Self::CommunityToBrand(serde_json::from_value(form_data).map_err(bad_shape)?)
            }
            CollaborationType::BrandToCommunity => {
                Self::BrandToCommunity(serde_json::from_value(form_data).map_err(bad_shape)?)
            }
            CollaborationType::VenueToCommunity => {
                Self::VenueToCommunity(serde_json::from_value(form_data).map_err(bad_shape)?)
            }
        })
    }

    pub fn collaboration_type(&self) -> CollaborationType {
        match self {
            Self::CommunityToVenue(_) => CollaborationType::CommunityToVenue,
            Self::CommunityToBrand(_) => CollaborationType::CommunityToBrand,
            Self::BrandToCommunity(_) => CollaborationType::BrandToCommunity,
            Self::VenueToCommunity(_) => CollaborationType::VenueToCommunity,
        }
    }

    pub fn event(&self) -> &EventDetails {
        match self {
            Self::CommunityToVenue(p) => &p.event,
            Self::CommunityToBrand(p) => &p.event,
            Self::BrandToCommunity(p) => &p.event,
            Self::VenueToCommunity(p) => &p.event,
        }
    }

    /// The untyped `formData` object, as the UI sends and receives it.
    pub fn to_json(&self) -> Value {
        match self {
            Self::CommunityToVenue(p) => serde_json::to_value(p),
            Self::CommunityToBrand(p) => serde_json::to_value(p),
            Self::BrandToCommunity(p) => serde_json::to_value(p),
            Self::VenueToCommunity(p) => serde_json::to_value(p),
        }
        .unwrap_or(Value::Null)
    }

    /// Present fields and their values, keyed by field.
    pub fn fields(&self) -> BTreeMap<FormField, Value> {
        let mut out = BTreeMap::new();
        let event = self.event();
        out.insert(FormField::EventName, Value::from(event.event_name.clone()));
        out.insert(
            FormField::EventDate,
            Value::from(event.event_date.format("%Y-%m-%d").to_string()),
        );
        out.insert(FormField::Message, Value::from(event.message.clone()));

        match self {
            Self::CommunityToVenue(p) => {
                let r = &p.venue_request;
                put_opt(&mut out, FormField::SpecialRequirements, &r.special_requirements);
                out.insert(FormField::ExpectedAttendees, Value::from(r.expected_attendees));
                out.insert(FormField::TimeSlot, Value::from(r.time_slot.clone()));
                out.insert(FormField::BudgetRange, Value::from(r.budget_range.clone()));
            }
            Self::CommunityToBrand(p) => {
                let r = &p.brand_sponsorship;
                put_opt(&mut out, FormField::SponsorshipDeliverables, &r.deliverables);
                out.insert(FormField::ExpectedReach, Value::from(r.expected_reach));
                out.insert(FormField::BudgetProposed, Value::from(r.budget_proposed.clone()));
            }
            Self::BrandToCommunity(p) => {
                let r = &p.brand_offer;
                put_opt(&mut out, FormField::ExpectedDeliverables, &r.expected_deliverables);
                out.insert(
                    FormField::OfferDescription,
                    Value::from(r.offer_description.clone()),
                );
                out.insert(FormField::BudgetOffered, Value::from(r.budget_offered.clone()));
            }
            Self::VenueToCommunity(p) => {
                let r = &p.venue_offer;
                put_opt(&mut out, FormField::Amenities, &r.amenities);
                out.insert(FormField::Capacity, Value::from(r.capacity));
                out.insert(
                    FormField::AvailableSlots,
                    Value::from(r.available_slots.clone()),
                );
                out.insert(FormField::Pricing, Value::from(r.pricing.clone()));
            }
        }
        out
    }

    /// Whether the payload carries `field`.
    pub fn has_field(&self, field: FormField) -> bool {
        self.fields().contains_key(&field)
    }

    /// Free-text fields for the compliance scanner, as (path, text).
    pub fn free_text(&self) -> Vec<(&'static str, String)> {
        self.fields()
            .into_iter()
            .filter(|(f, _)| f.is_free_text())
            .filter_map(|(f, v)| v.as_str().map(|s| (f.as_str(), s.to_string())))
            .collect()
    }

    /// Business-rule validation beyond what deserialization checks.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        let event = self.event();
        let name = event.event_name.trim();
        if name.is_empty() {
            return Err(WorkflowError::validation("eventName must not be empty"));
        }
        if name.chars().count() > MAX_EVENT_NAME {
            return Err(WorkflowError::validation(format!(
                "eventName must be at most {MAX_EVENT_NAME} characters"
            )));
        }
        if event.message.trim().is_empty() {
            return Err(WorkflowError::validation("message must not be empty"));
        }
        for (field, value) in self.fields() {
            if !field.kind().accepts(&value) {
                return Err(WorkflowError::validation(format!(
                    "{field} must be a {}",
                    field.kind().as_str()
                )));
            }
            if value.as_str().is_some_and(|s| s.chars().count() > MAX_TEXT) {
                return Err(WorkflowError::validation(format!(
                    "{field} must be at most {MAX_TEXT} characters"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn venue_request_payload() -> FormData {
        FormData::CommunityToVenue(CommunityToVenue {
            event: EventDetails {
                event_name: "Poetry Slam".into(),
                event_date: NaiveDate::from_ymd_opt(2026, 11, 20).unwrap(),
                message: "We'd love to host our monthly slam at your space.".into(),
            },
            venue_request: VenueRequest {
                expected_attendees: 80,
                time_slot: "19:00-22:00".into(),
                budget_range: "$500-$800".into(),
                special_requirements: None,
            },
        })
    }

    #[test]
    fn legacy_types_resolve_to_canonical() {
        assert_eq!(
            CollaborationType::from_wire("venue_request", PartyType::Community),
            Some(CollaborationType::CommunityToVenue)
        );
        assert_eq!(
            CollaborationType::from_wire("brand_sponsorship", PartyType::Community),
            Some(CollaborationType::CommunityToBrand)
        );
        assert_eq!(
            CollaborationType::from_wire("community_partnership", PartyType::Venue),
            Some(CollaborationType::VenueToCommunity)
        );
        assert_eq!(
            CollaborationType::from_wire("community_partnership", PartyType::Brand),
            Some(CollaborationType::BrandToCommunity)
        );
        assert_eq!(
            CollaborationType::from_wire("community_partnership", PartyType::Community),
            None
        );
    }

    #[test]
    fn canonical_type_serializes_camel_case() {
        assert_eq!(
            serde_json::to_value(CollaborationType::BrandToCommunity).unwrap(),
            json!("brandToCommunity")
        );
    }

    #[test]
    fn from_wire_reads_legacy_record() {
        let fd = FormData::from_wire(
            "venue_request",
            PartyType::Community,
            json!({
                "eventName": "Film Club",
                "eventDate": "2026-12-01",
                "message": "Screening night",
                "venueRequest": {"expectedAttendees": 40, "timeSlot": "evening", "budgetRange": "$200"}
            }),
        )
        .unwrap();
        assert_eq!(fd.collaboration_type(), CollaborationType::CommunityToVenue);
        assert_eq!(
            serde_json::to_value(&fd).unwrap()["type"],
            json!("communityToVenue")
        );
    }

    #[test]
    fn from_wire_rejects_mismatched_shape() {
        let err = FormData::from_wire(
            "communityToBrand",
            PartyType::Community,
            json!({"eventName": "x", "eventDate": "2026-12-01", "message": "m"}),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn fields_cover_present_optionals_only() {
        let fd = venue_request_payload();
        assert!(fd.has_field(FormField::BudgetRange));
        assert!(!fd.has_field(FormField::SpecialRequirements));
        assert!(!fd.has_field(FormField::Capacity));
        assert_eq!(fd.fields()[&FormField::ExpectedAttendees], json!(80));
    }

    #[test]
    fn field_keys_accept_path_or_leaf() {
        assert_eq!(
            FormField::parse("venueRequest.budgetRange"),
            Some(FormField::BudgetRange)
        );
        assert_eq!(FormField::parse("budgetRange"), Some(FormField::BudgetRange));
        assert_eq!(FormField::parse("eventName"), Some(FormField::EventName));
        assert_eq!(FormField::parse("parking"), None);
    }

    #[test]
    fn leaf_names_are_unique() {
        for (i, a) in FormField::ALL.iter().enumerate() {
            for b in &FormField::ALL[i + 1..] {
                assert_ne!(
                    a.as_str().rsplit('.').next(),
                    b.as_str().rsplit('.').next()
                );
            }
        }
    }

    #[test]
    fn free_text_covers_every_text_field() {
        let keys: Vec<_> = venue_request_payload()
            .free_text()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(
            keys,
            vec![
                "eventName",
                "message",
                "venueRequest.timeSlot",
                "venueRequest.budgetRange",
            ]
        );
    }

    #[test]
    fn only_dates_and_counts_escape_the_scan() {
        for field in FormField::ALL {
            let structured = matches!(
                field,
                FormField::EventDate
                    | FormField::ExpectedAttendees
                    | FormField::ExpectedReach
                    | FormField::Capacity
            );
            assert_eq!(field.is_free_text(), !structured, "{field}");
        }
    }

    #[test]
    fn validate_rejects_blank_message_and_zero_attendees() {
        let mut fd = venue_request_payload();
        if let FormData::CommunityToVenue(p) = &mut fd {
            p.event.message = "   ".into();
        }
        assert!(fd.validate().is_err());

        let mut fd = venue_request_payload();
        if let FormData::CommunityToVenue(p) = &mut fd {
            p.venue_request.expected_attendees = 0;
        }
        assert!(fd.validate().is_err());

        assert!(venue_request_payload().validate().is_ok());
    }

    #[test]
    fn field_kinds_check_values() {
        assert!(FieldKind::Date.accepts(&json!("2026-01-31")));
        assert!(!FieldKind::Date.accepts(&json!("31/01/2026")));
        assert!(FieldKind::Integer.accepts(&json!(12)));
        assert!(!FieldKind::Integer.accepts(&json!("12")));
        assert!(!FieldKind::Text.accepts(&json!("")));
    }
}
