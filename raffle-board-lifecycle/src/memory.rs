use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};

use crate::error::StoreError;
use crate::model::{
    ActivityRecord, Raffle, RaffleId, RaffleState, RaffleUpdate, Slot, SlotNumber, UserId,
};
use crate::store::{ChangeFeed, ChangeKind, RaffleChange, RaffleStore};

#[derive(Default)]
struct Documents {
    raffles: HashMap<RaffleId, Raffle>,
    slots: HashMap<RaffleId, BTreeMap<SlotNumber, Slot>>,
    activity: HashMap<RaffleId, Vec<ActivityRecord>>,
}

#[derive(thiserror::Error, Debug)]
enum MemoryStoreError {
    #[error("raffle {0} already exists")]
    DuplicateRaffle(RaffleId),
    #[error("raffle {0} has no slot {1}")]
    MissingSlot(RaffleId, SlotNumber),
}

/// Store that keeps every document in process memory.
///
/// A single lock guards all documents so each operation is atomic.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<Documents>,
    feed: ChangeFeed,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RaffleStore for MemoryStore {
    async fn get_raffle(&self, raffle_id: &RaffleId) -> Result<Option<Raffle>, StoreError> {
        Ok(self.documents.lock().await.raffles.get(raffle_id).cloned())
    }

    async fn get_slot(
        &self,
        raffle_id: &RaffleId,
        slot_number: SlotNumber,
    ) -> Result<Option<Slot>, StoreError> {
        Ok(self
            .documents
            .lock()
            .await
            .slots
            .get(raffle_id)
            .and_then(|slots| slots.get(&slot_number))
            .cloned())
    }

    async fn list_slots(&self, raffle_id: &RaffleId) -> Result<Vec<Slot>, StoreError> {
        Ok(self
            .documents
            .lock()
            .await
            .slots
            .get(raffle_id)
            .map(|slots| slots.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_raffles_by_owner(&self, owner: &UserId) -> Result<Vec<Raffle>, StoreError> {
        let documents = self.documents.lock().await;
        let mut raffles: Vec<Raffle> = documents
            .raffles
            .values()
            .filter(|raffle| raffle.is_owned_by(owner))
            .cloned()
            .collect();
        raffles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(raffles)
    }

    async fn list_activity(
        &self,
        raffle_id: &RaffleId,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        Ok(self
            .documents
            .lock()
            .await
            .activity
            .get(raffle_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn count_active_raffles(&self, owner: &UserId) -> Result<u64, StoreError> {
        let documents = self.documents.lock().await;
        let count = documents
            .raffles
            .values()
            .filter(|raffle| raffle.is_owned_by(owner) && raffle.is_active())
            .count();
        u64::try_from(count).map_err(StoreError::new)
    }

    async fn insert_raffle(
        &self,
        raffle: &Raffle,
        slots: &[Slot],
        activity: &ActivityRecord,
        active_limit: u64,
    ) -> Result<bool, StoreError> {
        let mut documents = self.documents.lock().await;
        if documents.raffles.contains_key(&raffle.id) {
            return Err(StoreError::new(MemoryStoreError::DuplicateRaffle(
                raffle.id.clone(),
            )));
        }
        let active = documents
            .raffles
            .values()
            .filter(|stored| stored.is_owned_by(&raffle.owner_id) && stored.is_active())
            .count();
        if u64::try_from(active).map_err(StoreError::new)? >= active_limit {
            return Ok(false);
        }
        documents.raffles.insert(raffle.id.clone(), raffle.clone());
        documents.slots.insert(
            raffle.id.clone(),
            slots
                .iter()
                .map(|slot| (slot.slot_number, slot.clone()))
                .collect(),
        );
        documents
            .activity
            .insert(raffle.id.clone(), vec![activity.clone()]);
        drop(documents);
        self.feed.publish(&raffle.id, ChangeKind::Created);
        Ok(true)
    }

    async fn write_slot(
        &self,
        raffle_id: &RaffleId,
        slot: &Slot,
        activity: &ActivityRecord,
    ) -> Result<bool, StoreError> {
        let mut documents = self.documents.lock().await;
        if !documents
            .raffles
            .get(raffle_id)
            .is_some_and(Raffle::is_active)
        {
            return Ok(false);
        }
        let stored = documents
            .slots
            .get_mut(raffle_id)
            .and_then(|slots| slots.get_mut(&slot.slot_number))
            .ok_or_else(|| {
                StoreError::new(MemoryStoreError::MissingSlot(
                    raffle_id.clone(),
                    slot.slot_number,
                ))
            })?;
        stored.clone_from(slot);
        documents
            .activity
            .entry(raffle_id.clone())
            .or_default()
            .push(activity.clone());
        drop(documents);
        self.feed.publish(
            raffle_id,
            ChangeKind::SlotUpdated {
                slot_number: slot.slot_number,
            },
        );
        Ok(true)
    }

    async fn update_raffle(
        &self,
        raffle_id: &RaffleId,
        update: &RaffleUpdate,
        activity: &ActivityRecord,
    ) -> Result<bool, StoreError> {
        let mut documents = self.documents.lock().await;
        let Some(raffle) = documents.raffles.get_mut(raffle_id) else {
            return Ok(false);
        };
        if !raffle.is_active() {
            return Ok(false);
        }
        update.apply_to(raffle);
        documents
            .activity
            .entry(raffle_id.clone())
            .or_default()
            .push(activity.clone());
        drop(documents);
        self.feed.publish(raffle_id, ChangeKind::RaffleUpdated);
        Ok(true)
    }

    async fn finalize_raffle(
        &self,
        raffle_id: &RaffleId,
        winner_slot_number: SlotNumber,
        finalized_at: DateTime<Utc>,
        activity: &ActivityRecord,
    ) -> Result<bool, StoreError> {
        let mut documents = self.documents.lock().await;
        let Some(raffle) = documents.raffles.get_mut(raffle_id) else {
            return Ok(false);
        };
        if !raffle.is_active() {
            return Ok(false);
        }
        raffle.state = RaffleState::Finalized {
            winner_slot_number,
            finalized_at,
        };
        documents
            .activity
            .entry(raffle_id.clone())
            .or_default()
            .push(activity.clone());
        drop(documents);
        self.feed
            .publish(raffle_id, ChangeKind::Finalized { winner_slot_number });
        Ok(true)
    }

    fn subscribe(&self) -> broadcast::Receiver<RaffleChange> {
        self.feed.subscribe()
    }
}
