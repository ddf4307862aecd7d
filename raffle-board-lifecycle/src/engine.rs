use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate, Offset as _, Utc};
use rand::seq::SliceRandom as _;
use rand::thread_rng;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use crate::clock::{Clock, SystemClock};
use crate::error::{RaffleError, StoreError};
use crate::identity::IdentityProvider;
use crate::model::{
    ActivityDetails, ActivityRecord, NewRaffle, Raffle, RaffleBoard, RaffleId, RaffleState,
    RaffleUpdate, Slot, SlotNumber, SlotStatus, UserId,
};
use crate::store::{RaffleChange, RaffleStore};
use crate::{MAX_ACTIVE_RAFFLES, MAX_IMAGE_URLS};

/// Guards every state transition of a raffle.
///
/// Preconditions are all checked before the first write, so a rejected call
/// never leaves anything behind in the store.
pub struct Engine {
    store: Arc<dyn RaffleStore>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    local_offset: FixedOffset,
}

fn require_text(field: &str, value: &str) -> Result<(), RaffleError> {
    if value.trim().is_empty() {
        return Err(RaffleError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn validate_image_urls(image_urls: &[String]) -> Result<(), RaffleError> {
    if image_urls.len() > MAX_IMAGE_URLS {
        return Err(RaffleError::validation(format!(
            "a raffle can have at most {MAX_IMAGE_URLS} images"
        )));
    }
    Ok(())
}

fn validate_new_raffle(input: &NewRaffle) -> Result<(), RaffleError> {
    require_text("name", &input.name)?;
    require_text("description", &input.description)?;
    require_text("terms", &input.terms)?;
    if input.slot_price <= 0 {
        return Err(RaffleError::validation("slot price must be positive"));
    }
    validate_image_urls(&input.image_urls)
}

fn validate_update(update: &RaffleUpdate) -> Result<(), RaffleError> {
    if update.is_empty() {
        return Err(RaffleError::validation("nothing to update"));
    }
    if let Some(name) = &update.name {
        require_text("name", name)?;
    }
    if let Some(description) = &update.description {
        require_text("description", description)?;
    }
    if let Some(terms) = &update.terms {
        require_text("terms", terms)?;
    }
    if let Some(image_urls) = &update.image_urls {
        validate_image_urls(image_urls)?;
    }
    Ok(())
}

fn trimmed(update: RaffleUpdate) -> RaffleUpdate {
    let trim = |value: String| value.trim().to_owned();
    RaffleUpdate {
        name: update.name.map(trim),
        description: update.description.map(trim),
        terms: update.terms.map(trim),
        ..update
    }
}

fn parse_slot_number(value: i64) -> Result<SlotNumber, RaffleError> {
    SlotNumber::new(value).ok_or_else(|| {
        RaffleError::validation(format!("slot number {value} is outside of 1..=100"))
    })
}

impl Engine {
    #[must_use]
    pub fn new(store: Arc<dyn RaffleStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            store,
            identity,
            clock: Arc::new(SystemClock),
            local_offset: Utc.fix(),
        }
    }

    #[must_use]
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self { clock, ..self }
    }

    /// Offset from UTC used to decide which calendar day it is.
    #[must_use]
    pub fn with_local_offset(self, local_offset: FixedOffset) -> Self {
        Self {
            local_offset,
            ..self
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RaffleChange> {
        self.store.subscribe()
    }

    /// Verifies the bearer token and returns who presented it.
    pub async fn authenticate(&self, token: &str) -> Result<UserId, RaffleError> {
        Ok(self.identity.verify_token(token).await?)
    }

    fn today(&self) -> NaiveDate {
        self.clock
            .now()
            .with_timezone(&self.local_offset)
            .date_naive()
    }

    async fn load_raffle(&self, raffle_id: &RaffleId) -> Result<Raffle, RaffleError> {
        self.store
            .get_raffle(raffle_id)
            .await?
            .ok_or_else(|| RaffleError::NotFound(raffle_id.clone()))
    }

    async fn load_owned_raffle(
        &self,
        caller: &UserId,
        raffle_id: &RaffleId,
    ) -> Result<Raffle, RaffleError> {
        let raffle = self.load_raffle(raffle_id).await?;
        if !raffle.is_owned_by(caller) {
            debug!("{caller} is not the owner of raffle {raffle_id}");
            return Err(RaffleError::Forbidden(raffle_id.clone()));
        }
        Ok(raffle)
    }

    #[instrument(skip_all)]
    pub async fn create_raffle(&self, token: &str, input: NewRaffle) -> Result<RaffleId, RaffleError> {
        let owner = self.authenticate(token).await?;
        validate_new_raffle(&input)?;

        let now = self.clock.now();
        let raffle = Raffle {
            id: RaffleId::generate(),
            owner_id: owner.clone(),
            name: input.name.trim().to_owned(),
            description: input.description.trim().to_owned(),
            terms: input.terms.trim().to_owned(),
            slot_price: input.slot_price,
            state: RaffleState::Active,
            finalization_date: input.finalization_date,
            created_at: now,
            image_urls: input.image_urls,
        };
        let activity = ActivityRecord::new(
            raffle.id.clone(),
            owner,
            now,
            ActivityDetails::RaffleCreated {
                slot_price: raffle.slot_price,
            },
        );
        if !self
            .store
            .insert_raffle(&raffle, &Slot::full_board(), &activity, MAX_ACTIVE_RAFFLES)
            .await?
        {
            debug!("{} already owns {MAX_ACTIVE_RAFFLES} active raffles", raffle.owner_id);
            return Err(RaffleError::QuotaExceeded {
                limit: MAX_ACTIVE_RAFFLES,
            });
        }
        info!(raffle_id = %raffle.id, owner = %raffle.owner_id, "created raffle");
        Ok(raffle.id)
    }

    #[instrument(skip_all, fields(raffle_id = %raffle_id))]
    pub async fn update_slot(
        &self,
        token: &str,
        raffle_id: &RaffleId,
        slot_number: i64,
        participant_name: String,
        status: SlotStatus,
    ) -> Result<Slot, RaffleError> {
        let caller = self.authenticate(token).await?;
        let raffle = self.load_owned_raffle(&caller, raffle_id).await?;
        let slot_number = parse_slot_number(slot_number)?;
        if !raffle.is_active() {
            return Err(RaffleError::AlreadyFinalized(raffle.id));
        }

        let previous = self
            .store
            .get_slot(raffle_id, slot_number)
            .await?
            .ok_or_else(|| {
                StoreError::new(format!("raffle {raffle_id} is missing slot {slot_number}"))
            })?;
        let slot = Slot {
            slot_number,
            participant_name: participant_name.trim().to_owned(),
            status,
        };
        let activity = ActivityRecord::new(
            raffle_id.clone(),
            caller,
            self.clock.now(),
            ActivityDetails::SlotUpdated {
                slot_number,
                previous_status: previous.status,
                new_status: slot.status,
                previous_participant_name: previous.participant_name,
                participant_name: slot.participant_name.clone(),
            },
        );
        if !self.store.write_slot(raffle_id, &slot, &activity).await? {
            debug!("raffle {raffle_id} was finalized before slot {slot_number} was written");
            return Err(RaffleError::AlreadyFinalized(raffle.id));
        }
        info!(
            "slot {slot_number} went from {} to {}",
            previous.status.as_str(),
            slot.status.as_str()
        );
        Ok(slot)
    }

    #[instrument(skip_all, fields(raffle_id = %raffle_id))]
    pub async fn update_raffle(
        &self,
        token: &str,
        raffle_id: &RaffleId,
        update: RaffleUpdate,
    ) -> Result<Raffle, RaffleError> {
        let caller = self.authenticate(token).await?;
        let mut raffle = self.load_owned_raffle(&caller, raffle_id).await?;
        validate_update(&update)?;
        if !raffle.is_active() {
            return Err(RaffleError::AlreadyFinalized(raffle.id));
        }

        let update = trimmed(update);
        let activity = ActivityRecord::new(
            raffle_id.clone(),
            caller,
            self.clock.now(),
            ActivityDetails::RaffleUpdated {
                changed_fields: update.changed_fields(),
            },
        );
        if !self
            .store
            .update_raffle(raffle_id, &update, &activity)
            .await?
        {
            return Err(RaffleError::AlreadyFinalized(raffle.id));
        }
        update.apply_to(&mut raffle);
        info!("updated raffle details");
        Ok(raffle)
    }

    /// Checks that the raffle may be finalized today.
    fn ensure_finalizable(&self, raffle: &Raffle) -> Result<(), RaffleError> {
        if !raffle.is_active() {
            return Err(RaffleError::AlreadyFinalized(raffle.id.clone()));
        }
        let Some(finalization_date) = raffle.finalization_date else {
            return Err(RaffleError::NoScheduledDate(raffle.id.clone()));
        };
        if self.today() < finalization_date {
            return Err(RaffleError::TooEarly { finalization_date });
        }
        Ok(())
    }

    async fn commit_finalization(
        &self,
        caller: UserId,
        mut raffle: Raffle,
        winner_slot_number: SlotNumber,
        drawn: bool,
    ) -> Result<Raffle, RaffleError> {
        let finalized_at = self.clock.now();
        let activity = ActivityRecord::new(
            raffle.id.clone(),
            caller,
            finalized_at,
            ActivityDetails::RaffleFinalized {
                winner_slot_number,
                drawn,
            },
        );
        if !self
            .store
            .finalize_raffle(&raffle.id, winner_slot_number, finalized_at, &activity)
            .await?
        {
            debug!("raffle {} was finalized concurrently", raffle.id);
            return Err(RaffleError::AlreadyFinalized(raffle.id));
        }
        raffle.state = RaffleState::Finalized {
            winner_slot_number,
            finalized_at,
        };
        info!(raffle_id = %raffle.id, "raffle finalized, slot {winner_slot_number} wins");
        Ok(raffle)
    }

    /// Finalizes the raffle with a winner chosen by its owner.
    #[instrument(skip_all, fields(raffle_id = %raffle_id))]
    pub async fn finalize_raffle(
        &self,
        token: &str,
        raffle_id: &RaffleId,
        winner_slot_number: i64,
    ) -> Result<Raffle, RaffleError> {
        let caller = self.authenticate(token).await?;
        let raffle = self.load_owned_raffle(&caller, raffle_id).await?;
        self.ensure_finalizable(&raffle)?;
        let winner_slot_number = parse_slot_number(winner_slot_number)?;
        self.commit_finalization(caller, raffle, winner_slot_number, false)
            .await
    }

    /// Finalizes the raffle with a winner drawn uniformly from the paid slots.
    #[instrument(skip_all, fields(raffle_id = %raffle_id))]
    pub async fn draw_winner(
        &self,
        token: &str,
        raffle_id: &RaffleId,
    ) -> Result<Raffle, RaffleError> {
        let caller = self.authenticate(token).await?;
        let raffle = self.load_owned_raffle(&caller, raffle_id).await?;
        self.ensure_finalizable(&raffle)?;

        let paid: Vec<SlotNumber> = self
            .store
            .list_slots(raffle_id)
            .await?
            .into_iter()
            .filter(|slot| slot.status == SlotStatus::Paid)
            .map(|slot| slot.slot_number)
            .collect();
        let winner_slot_number = paid
            .choose(&mut thread_rng())
            .copied()
            .ok_or_else(|| RaffleError::validation("there are no paid slots to draw from"))?;
        self.commit_finalization(caller, raffle, winner_slot_number, true)
            .await
    }

    /// Number of raffles `owner` currently has in the active state. Always
    /// read from the store so a raffle created just before is counted.
    pub async fn count_active_raffles(&self, owner: &UserId) -> Result<u64, RaffleError> {
        Ok(self.store.count_active_raffles(owner).await?)
    }

    pub async fn get_raffle(&self, raffle_id: &RaffleId) -> Result<RaffleBoard, RaffleError> {
        let raffle = self.load_raffle(raffle_id).await?;
        let slots = self.store.list_slots(raffle_id).await?;
        Ok(RaffleBoard { raffle, slots })
    }

    pub async fn list_my_raffles(&self, token: &str) -> Result<Vec<Raffle>, RaffleError> {
        let caller = self.authenticate(token).await?;
        Ok(self.store.list_raffles_by_owner(&caller).await?)
    }

    pub async fn list_activity(
        &self,
        token: &str,
        raffle_id: &RaffleId,
    ) -> Result<Vec<ActivityRecord>, RaffleError> {
        let caller = self.authenticate(token).await?;
        self.load_owned_raffle(&caller, raffle_id).await?;
        Ok(self.store.list_activity(raffle_id).await?)
    }
}
