use core::fmt::{self, Display};
use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rand::{thread_rng, Rng as _};
use serde::{Deserialize, Serialize};

use crate::SLOTS_PER_RAFFLE;

const GENERATED_ID_LENGTH: usize = 20;

fn generate_id() -> String {
    thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(GENERATED_ID_LENGTH)
        .map(char::from)
        .collect()
}

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(RaffleId);
string_id!(UserId);
string_id!(ActivityId);

impl RaffleId {
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_id())
    }
}

impl ActivityId {
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_id())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("slot number {0} is outside of 1..=100")]
pub struct InvalidSlotNumber(pub i64);

/// Position of a slot on the board. Always in `1..=100`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct SlotNumber(u8);

impl SlotNumber {
    #[must_use]
    pub fn new(value: i64) -> Option<Self> {
        u8::try_from(value)
            .ok()
            .filter(|value| (1..=SLOTS_PER_RAFFLE).contains(value))
            .map(Self)
    }

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = Self> {
        (1..=SLOTS_PER_RAFFLE).map(Self)
    }
}

impl TryFrom<i64> for SlotNumber {
    type Error = InvalidSlotNumber;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidSlotNumber(value))
    }
}

impl From<SlotNumber> for i64 {
    fn from(value: SlotNumber) -> Self {
        value.0.into()
    }
}

impl From<SlotNumber> for i16 {
    fn from(value: SlotNumber) -> Self {
        value.0.into()
    }
}

impl Display for SlotNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown {what} {value:?}")]
pub struct UnknownVariant {
    pub what: &'static str,
    pub value: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    #[default]
    Available,
    Reserved,
    Paid,
}

impl SlotStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Reserved => "reserved",
            Self::Paid => "paid",
        }
    }
}

impl FromStr for SlotStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "available" => Ok(Self::Available),
            "reserved" => Ok(Self::Reserved),
            "paid" => Ok(Self::Paid),
            _ => Err(UnknownVariant {
                what: "slot status",
                value: value.to_owned(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaffleStatus {
    Active,
    Finalized,
}

impl RaffleStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Finalized => "finalized",
        }
    }
}

impl FromStr for RaffleStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "finalized" => Ok(Self::Finalized),
            _ => Err(UnknownVariant {
                what: "raffle status",
                value: value.to_owned(),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub slot_number: SlotNumber,
    pub participant_name: String,
    pub status: SlotStatus,
}

impl Slot {
    #[must_use]
    pub const fn empty(slot_number: SlotNumber) -> Self {
        Self {
            slot_number,
            participant_name: String::new(),
            status: SlotStatus::Available,
        }
    }

    /// The complete set of slots a raffle starts with.
    #[must_use]
    pub fn full_board() -> Vec<Self> {
        SlotNumber::all().map(Self::empty).collect()
    }
}

/// Where a raffle is in its lifecycle. The winner and the finalization
/// timestamp only exist together with the finalized state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaffleState {
    Active,
    Finalized {
        winner_slot_number: SlotNumber,
        finalized_at: DateTime<Utc>,
    },
}

impl RaffleState {
    #[must_use]
    pub const fn status(&self) -> RaffleStatus {
        match self {
            Self::Active => RaffleStatus::Active,
            Self::Finalized { .. } => RaffleStatus::Finalized,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "RaffleDocument", try_from = "RaffleDocument")]
pub struct Raffle {
    pub id: RaffleId,
    pub owner_id: UserId,
    pub name: String,
    pub description: String,
    pub terms: String,
    pub slot_price: i64,
    pub state: RaffleState,
    pub finalization_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub image_urls: Vec<String>,
}

impl Raffle {
    #[must_use]
    pub const fn status(&self) -> RaffleStatus {
        self.state.status()
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.state, RaffleState::Active)
    }

    #[must_use]
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.owner_id == user
    }

    #[must_use]
    pub const fn winner_slot_number(&self) -> Option<SlotNumber> {
        match self.state {
            RaffleState::Active => None,
            RaffleState::Finalized {
                winner_slot_number, ..
            } => Some(winner_slot_number),
        }
    }

    #[must_use]
    pub const fn finalized_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            RaffleState::Active => None,
            RaffleState::Finalized { finalized_at, .. } => Some(finalized_at),
        }
    }
}

/// Flat shape of a raffle as it is stored and sent over the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaffleDocument {
    pub id: RaffleId,
    pub owner_id: UserId,
    pub name: String,
    pub description: String,
    pub terms: String,
    pub slot_price: i64,
    pub status: RaffleStatus,
    pub winner_slot_number: Option<SlotNumber>,
    pub finalization_date: Option<NaiveDate>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("raffle document {id} is inconsistent: {reason}")]
pub struct InconsistentDocument {
    pub id: RaffleId,
    pub reason: &'static str,
}

impl TryFrom<RaffleDocument> for Raffle {
    type Error = InconsistentDocument;

    fn try_from(document: RaffleDocument) -> Result<Self, Self::Error> {
        let state = match (
            document.status,
            document.winner_slot_number,
            document.finalized_at,
        ) {
            (RaffleStatus::Active, None, None) => RaffleState::Active,
            (RaffleStatus::Finalized, Some(winner_slot_number), Some(finalized_at)) => {
                RaffleState::Finalized {
                    winner_slot_number,
                    finalized_at,
                }
            }
            (RaffleStatus::Active, _, _) => {
                return Err(InconsistentDocument {
                    id: document.id,
                    reason: "active raffle carries finalization fields",
                });
            }
            (RaffleStatus::Finalized, _, _) => {
                return Err(InconsistentDocument {
                    id: document.id,
                    reason: "finalized raffle is missing its winner or timestamp",
                });
            }
        };
        Ok(Self {
            id: document.id,
            owner_id: document.owner_id,
            name: document.name,
            description: document.description,
            terms: document.terms,
            slot_price: document.slot_price,
            state,
            finalization_date: document.finalization_date,
            created_at: document.created_at,
            image_urls: document.image_urls,
        })
    }
}

impl From<Raffle> for RaffleDocument {
    fn from(raffle: Raffle) -> Self {
        Self {
            status: raffle.status(),
            winner_slot_number: raffle.winner_slot_number(),
            finalized_at: raffle.finalized_at(),
            id: raffle.id,
            owner_id: raffle.owner_id,
            name: raffle.name,
            description: raffle.description,
            terms: raffle.terms,
            slot_price: raffle.slot_price,
            finalization_date: raffle.finalization_date,
            created_at: raffle.created_at,
            image_urls: raffle.image_urls,
        }
    }
}

/// Input for creating a raffle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRaffle {
    pub name: String,
    pub description: String,
    pub terms: String,
    pub slot_price: i64,
    #[serde(default)]
    pub finalization_date: Option<NaiveDate>,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

/// Owner edits to an active raffle. Absent fields stay untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaffleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub terms: Option<String>,
    pub finalization_date: Option<NaiveDate>,
    pub image_urls: Option<Vec<String>>,
}

impl RaffleUpdate {
    #[must_use]
    pub fn changed_fields(&self) -> Vec<String> {
        [
            ("name", self.name.is_some()),
            ("description", self.description.is_some()),
            ("terms", self.terms.is_some()),
            ("finalization_date", self.finalization_date.is_some()),
            ("image_urls", self.image_urls.is_some()),
        ]
        .into_iter()
        .filter(|(_, changed)| *changed)
        .map(|(field, _)| field.to_owned())
        .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    pub fn apply_to(&self, raffle: &mut Raffle) {
        if let Some(name) = &self.name {
            raffle.name.clone_from(name);
        }
        if let Some(description) = &self.description {
            raffle.description.clone_from(description);
        }
        if let Some(terms) = &self.terms {
            raffle.terms.clone_from(terms);
        }
        if let Some(finalization_date) = self.finalization_date {
            raffle.finalization_date = Some(finalization_date);
        }
        if let Some(image_urls) = &self.image_urls {
            raffle.image_urls.clone_from(image_urls);
        }
    }
}

/// A raffle together with its slots, ordered by slot number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaffleBoard {
    pub raffle: Raffle,
    pub slots: Vec<Slot>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    RaffleCreated,
    SlotUpdated,
    RaffleUpdated,
    RaffleFinalized,
}

impl ActivityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RaffleCreated => "raffle_created",
            Self::SlotUpdated => "slot_updated",
            Self::RaffleUpdated => "raffle_updated",
            Self::RaffleFinalized => "raffle_finalized",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityDetails {
    RaffleCreated {
        slot_price: i64,
    },
    SlotUpdated {
        slot_number: SlotNumber,
        previous_status: SlotStatus,
        new_status: SlotStatus,
        previous_participant_name: String,
        participant_name: String,
    },
    RaffleUpdated {
        changed_fields: Vec<String>,
    },
    RaffleFinalized {
        winner_slot_number: SlotNumber,
        drawn: bool,
    },
}

impl ActivityDetails {
    #[must_use]
    pub const fn kind(&self) -> ActivityKind {
        match self {
            Self::RaffleCreated { .. } => ActivityKind::RaffleCreated,
            Self::SlotUpdated { .. } => ActivityKind::SlotUpdated,
            Self::RaffleUpdated { .. } => ActivityKind::RaffleUpdated,
            Self::RaffleFinalized { .. } => ActivityKind::RaffleFinalized,
        }
    }
}

/// Append-only log entry for one mutating event on a raffle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: ActivityId,
    pub raffle_id: RaffleId,
    pub actor: UserId,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub details: ActivityDetails,
}

impl ActivityRecord {
    #[must_use]
    pub fn new(
        raffle_id: RaffleId,
        actor: UserId,
        at: DateTime<Utc>,
        details: ActivityDetails,
    ) -> Self {
        Self {
            id: ActivityId::generate(),
            raffle_id,
            actor,
            at,
            details,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ActivityKind {
        self.details.kind()
    }
}
