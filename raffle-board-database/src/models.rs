use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use raffle_board_lifecycle::{
    ActivityRecord, Raffle, RaffleDocument, RaffleUpdate, Slot, SlotNumber,
};

use crate::error::DatabaseError;
use crate::schema::{raffle_activity, raffle_slots, raffles};

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = raffles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RaffleRow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub terms: String,
    pub slot_price: i64,
    pub status: String,
    pub winner_slot_number: Option<i16>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub finalization_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub image_urls: Vec<String>,
}

impl From<&Raffle> for RaffleRow {
    fn from(raffle: &Raffle) -> Self {
        let document = RaffleDocument::from(raffle.clone());
        Self {
            id: document.id.into(),
            owner_id: document.owner_id.into(),
            name: document.name,
            description: document.description,
            terms: document.terms,
            slot_price: document.slot_price,
            status: document.status.as_str().to_owned(),
            winner_slot_number: document.winner_slot_number.map(i16::from),
            finalized_at: document.finalized_at,
            finalization_date: document.finalization_date,
            created_at: document.created_at,
            image_urls: document.image_urls,
        }
    }
}

impl TryFrom<RaffleRow> for Raffle {
    type Error = DatabaseError;

    fn try_from(row: RaffleRow) -> Result<Self, Self::Error> {
        let document = RaffleDocument {
            id: row.id.into(),
            owner_id: row.owner_id.into(),
            name: row.name,
            description: row.description,
            terms: row.terms,
            slot_price: row.slot_price,
            status: row.status.parse()?,
            winner_slot_number: row
                .winner_slot_number
                .map(|number| SlotNumber::try_from(i64::from(number)))
                .transpose()?,
            finalization_date: row.finalization_date,
            finalized_at: row.finalized_at,
            created_at: row.created_at,
            image_urls: row.image_urls,
        };
        Ok(Self::try_from(document)?)
    }
}

/// Owner edits. `None` columns are left out of the `UPDATE`.
#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = raffles)]
pub struct RaffleChangeset {
    pub name: Option<String>,
    pub description: Option<String>,
    pub terms: Option<String>,
    pub finalization_date: Option<NaiveDate>,
    pub image_urls: Option<Vec<String>>,
}

impl From<&RaffleUpdate> for RaffleChangeset {
    fn from(update: &RaffleUpdate) -> Self {
        Self {
            name: update.name.clone(),
            description: update.description.clone(),
            terms: update.terms.clone(),
            finalization_date: update.finalization_date,
            image_urls: update.image_urls.clone(),
        }
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = raffle_slots)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SlotRow {
    pub raffle_id: String,
    pub slot_number: i16,
    pub participant_name: String,
    pub status: String,
}

impl SlotRow {
    #[must_use]
    pub fn new(raffle_id: &str, slot: &Slot) -> Self {
        Self {
            raffle_id: raffle_id.to_owned(),
            slot_number: slot.slot_number.into(),
            participant_name: slot.participant_name.clone(),
            status: slot.status.as_str().to_owned(),
        }
    }
}

impl TryFrom<SlotRow> for Slot {
    type Error = DatabaseError;

    fn try_from(row: SlotRow) -> Result<Self, Self::Error> {
        Ok(Self {
            slot_number: SlotNumber::try_from(i64::from(row.slot_number))?,
            participant_name: row.participant_name,
            status: row.status.parse()?,
        })
    }
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = raffle_activity)]
pub struct NewActivityRow {
    pub id: String,
    pub raffle_id: String,
    pub actor: String,
    pub at: DateTime<Utc>,
    pub kind: String,
    pub details: serde_json::Value,
}

impl TryFrom<&ActivityRecord> for NewActivityRow {
    type Error = DatabaseError;

    fn try_from(record: &ActivityRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id.as_str().to_owned(),
            raffle_id: record.raffle_id.as_str().to_owned(),
            actor: record.actor.as_str().to_owned(),
            at: record.at,
            kind: record.kind().as_str().to_owned(),
            details: serde_json::to_value(&record.details)?,
        })
    }
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = raffle_activity)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ActivityRow {
    pub id: String,
    pub raffle_id: String,
    pub actor: String,
    pub at: DateTime<Utc>,
    pub details: serde_json::Value,
}

impl TryFrom<ActivityRow> for ActivityRecord {
    type Error = DatabaseError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            raffle_id: row.raffle_id.into(),
            actor: row.actor.into(),
            at: row.at,
            details: serde_json::from_value(row.details)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;
    use raffle_board_lifecycle::{ActivityDetails, RaffleState, SlotStatus};

    use super::*;

    fn raffle(state: RaffleState) -> Raffle {
        Raffle {
            id: "raffle-1".into(),
            owner_id: "alice".into(),
            name: "Bike".to_owned(),
            description: "A red bike".to_owned(),
            terms: "Paid slots only".to_owned(),
            slot_price: 500,
            state,
            finalization_date: NaiveDate::from_ymd_opt(2026, 6, 1),
            created_at: Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap(),
            image_urls: vec!["https://images.example/bike.png".to_owned()],
        }
    }

    #[test]
    fn finalized_raffle_survives_a_row() {
        let finalized = raffle(RaffleState::Finalized {
            winner_slot_number: SlotNumber::new(42).unwrap(),
            finalized_at: Utc.with_ymd_and_hms(2026, 6, 1, 18, 0, 0).unwrap(),
        });
        let row = RaffleRow::from(&finalized);
        assert_eq!(row.status, "finalized");
        assert_eq!(row.winner_slot_number, Some(42));
        assert_eq!(Raffle::try_from(row).unwrap(), finalized);
    }

    #[test]
    fn rows_breaking_the_finalized_invariant_are_rejected() {
        let mut row = RaffleRow::from(&raffle(RaffleState::Active));
        row.winner_slot_number = Some(7);
        assert!(matches!(
            Raffle::try_from(row),
            Err(DatabaseError::InvalidRow(_))
        ));

        let mut row = RaffleRow::from(&raffle(RaffleState::Active));
        row.status = "cancelled".to_owned();
        assert!(matches!(
            Raffle::try_from(row),
            Err(DatabaseError::InvalidRow(_))
        ));
    }

    #[test]
    fn slot_rows_are_checked() {
        let slot = Slot {
            slot_number: SlotNumber::new(100).unwrap(),
            participant_name: "Jane".to_owned(),
            status: SlotStatus::Paid,
        };
        let row = SlotRow::new("raffle-1", &slot);
        assert_eq!(row.status, "paid");
        assert_eq!(Slot::try_from(row.clone()).unwrap(), slot);

        let out_of_range = SlotRow {
            slot_number: 101,
            ..row
        };
        assert!(Slot::try_from(out_of_range).is_err());
    }

    #[test]
    fn activity_details_are_stored_as_tagged_json() {
        let record = ActivityRecord::new(
            "raffle-1".into(),
            "alice".into(),
            Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap(),
            ActivityDetails::RaffleFinalized {
                winner_slot_number: SlotNumber::new(3).unwrap(),
                drawn: true,
            },
        );
        let row = NewActivityRow::try_from(&record).unwrap();
        assert_eq!(row.kind, "raffle_finalized");
        assert_eq!(row.details["kind"], "raffle_finalized");
        assert_eq!(row.details["winner_slot_number"], 3);

        let read_back = ActivityRecord::try_from(ActivityRow {
            id: row.id,
            raffle_id: row.raffle_id,
            actor: row.actor,
            at: row.at,
            details: row.details,
        })
        .unwrap();
        assert_eq!(read_back, record);
    }
}
