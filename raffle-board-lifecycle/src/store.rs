use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::StoreError;
use crate::model::{
    ActivityRecord, Raffle, RaffleId, RaffleUpdate, Slot, SlotNumber, UserId,
};

/// Persistence for raffles, their slots and their activity log.
///
/// Every method is a single atomic unit: either all of its writes become
/// visible or none of them do. The conditional writes (`write_slot`,
/// `update_raffle`, `finalize_raffle`) compare against the stored status at
/// write time and report `false` when the raffle was no longer active.
#[async_trait]
pub trait RaffleStore: Send + Sync {
    async fn get_raffle(&self, raffle_id: &RaffleId) -> Result<Option<Raffle>, StoreError>;

    async fn get_slot(
        &self,
        raffle_id: &RaffleId,
        slot_number: SlotNumber,
    ) -> Result<Option<Slot>, StoreError>;

    /// Slots ordered by slot number.
    async fn list_slots(&self, raffle_id: &RaffleId) -> Result<Vec<Slot>, StoreError>;

    /// Raffles of one owner, newest first.
    async fn list_raffles_by_owner(&self, owner: &UserId) -> Result<Vec<Raffle>, StoreError>;

    /// Activity of one raffle, oldest first.
    async fn list_activity(&self, raffle_id: &RaffleId)
        -> Result<Vec<ActivityRecord>, StoreError>;

    async fn count_active_raffles(&self, owner: &UserId) -> Result<u64, StoreError>;

    /// Inserts the raffle unless its owner already has `active_limit` active
    /// raffles, in which case nothing is written and `false` is returned.
    async fn insert_raffle(
        &self,
        raffle: &Raffle,
        slots: &[Slot],
        activity: &ActivityRecord,
        active_limit: u64,
    ) -> Result<bool, StoreError>;

    async fn write_slot(
        &self,
        raffle_id: &RaffleId,
        slot: &Slot,
        activity: &ActivityRecord,
    ) -> Result<bool, StoreError>;

    async fn update_raffle(
        &self,
        raffle_id: &RaffleId,
        update: &RaffleUpdate,
        activity: &ActivityRecord,
    ) -> Result<bool, StoreError>;

    async fn finalize_raffle(
        &self,
        raffle_id: &RaffleId,
        winner_slot_number: SlotNumber,
        finalized_at: DateTime<Utc>,
        activity: &ActivityRecord,
    ) -> Result<bool, StoreError>;

    /// Live feed of committed changes.
    fn subscribe(&self) -> broadcast::Receiver<RaffleChange>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    SlotUpdated { slot_number: SlotNumber },
    RaffleUpdated,
    Finalized { winner_slot_number: SlotNumber },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RaffleChange {
    pub raffle_id: RaffleId,
    #[serde(flatten)]
    pub kind: ChangeKind,
}

const CHANGE_FEED_CAPACITY: usize = 256;

/// Fan-out of committed changes to every live subscriber.
#[derive(Clone, Debug)]
pub struct ChangeFeed {
    sender: broadcast::Sender<RaffleChange>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, raffle_id: &RaffleId, kind: ChangeKind) {
        let change = RaffleChange {
            raffle_id: raffle_id.clone(),
            kind,
        };
        if self.sender.send(change).is_err() {
            trace!("no subscribers for change on {raffle_id}");
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RaffleChange> {
        self.sender.subscribe()
    }
}
