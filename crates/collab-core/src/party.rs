//! # Parties
//!
//! The three account kinds that can propose or receive a collaboration.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::identity::PartyId;

/// Kind of account taking part in a collaboration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyType {
    /// Community organizer.
    Community,
    /// Venue operator.
    Venue,
    /// Brand sponsor.
    Brand,
}

impl PartyType {
    /// All party types, in declaration order.
    pub const ALL: [PartyType; 3] = [Self::Community, Self::Venue, Self::Brand];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Community => "community",
            Self::Venue => "venue",
            Self::Brand => "brand",
        }
    }
}

impl std::fmt::Display for PartyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PartyType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "community" => Ok(Self::Community),
            "venue" => Ok(Self::Venue),
            "brand" => Ok(Self::Brand),
            other => Err(CoreError::UnknownPartyType(other.to_string())),
        }
    }
}

/// A (party id, party type) pair identifying one side of a collaboration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyRef {
    /// Account id.
    pub party_id: PartyId,
    /// Account kind.
    pub party_type: PartyType,
}

impl PartyRef {
    /// Build a party reference.
    pub fn new(party_id: PartyId, party_type: PartyType) -> Self {
        Self {
            party_id,
            party_type,
        }
    }

    /// Convenience constructor for a community party.
    pub fn community(party_id: PartyId) -> Self {
        Self::new(party_id, PartyType::Community)
    }

    /// Convenience constructor for a venue party.
    pub fn venue(party_id: PartyId) -> Self {
        Self::new(party_id, PartyType::Venue)
    }

    /// Convenience constructor for a brand party.
    pub fn brand(party_id: PartyId) -> Self {
        Self::new(party_id, PartyType::Brand)
    }
}

impl std::fmt::Display for PartyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.party_type, self.party_id)
    }
}
