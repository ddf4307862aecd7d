pub mod error;
pub mod models;
pub mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel_async::pooled_connection::deadpool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use diesel_async::{AsyncConnection as _, AsyncPgConnection, RunQueryDsl, SimpleAsyncConnection as _};
use error::DatabaseError;
use raffle_board_lifecycle::{
    ActivityRecord, ChangeFeed, ChangeKind, Raffle, RaffleChange, RaffleId, RaffleStatus,
    RaffleStore, RaffleUpdate, Slot, SlotNumber, StoreError, UserId,
};
use schema::{raffle_activity, raffle_slots, raffles};
use tokio::sync::broadcast;
use tracing::info;

use crate::models::{ActivityRow, NewActivityRow, RaffleChangeset, RaffleRow, SlotRow};

pub type Pool = deadpool::Pool<AsyncPgConnection>;

const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_create_raffles",
    include_str!("../migrations/0001_create_raffles.sql"),
)];

pub fn get_database_connection(database_url: &str) -> Result<Pool, DatabaseError> {
    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    Ok(Pool::builder(config).build()?)
}

pub fn get_database_connection_from_env() -> Result<Pool, DatabaseError> {
    let database_url = std::env::var("DATABASE_URL")?;
    get_database_connection(&database_url)
}

/// Creates missing tables. Every statement is idempotent.
pub async fn run_migrations(pool: &Pool) -> Result<(), DatabaseError> {
    let mut connection = pool.get().await?;
    for (name, sql) in MIGRATIONS {
        info!("applying migration {name}");
        connection.batch_execute(sql).await?;
    }
    Ok(())
}

const ACTIVE: &str = RaffleStatus::Active.as_str();

/// Raffle storage in postgres.
///
/// Every mutation runs in one transaction together with its activity row.
/// Changes are only announced to subscribers of this process.
// TODO: forward changes through LISTEN/NOTIFY so several server instances can share one database.
pub struct PostgresStore {
    pool: Pool,
    feed: ChangeFeed,
}

impl PostgresStore {
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            feed: ChangeFeed::new(),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, DatabaseError> {
        let pool = get_database_connection(database_url)?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    async fn load_raffle(&self, raffle_id: &RaffleId) -> Result<Option<Raffle>, DatabaseError> {
        let mut connection = self.pool.get().await?;
        raffles::table
            .find(raffle_id.as_str())
            .select(RaffleRow::as_select())
            .first(&mut connection)
            .await
            .optional()?
            .map(Raffle::try_from)
            .transpose()
    }

    async fn load_slot(
        &self,
        raffle_id: &RaffleId,
        slot_number: SlotNumber,
    ) -> Result<Option<Slot>, DatabaseError> {
        let mut connection = self.pool.get().await?;
        raffle_slots::table
            .find((raffle_id.as_str(), i16::from(slot_number)))
            .select(SlotRow::as_select())
            .first(&mut connection)
            .await
            .optional()?
            .map(Slot::try_from)
            .transpose()
    }

    async fn load_slots(&self, raffle_id: &RaffleId) -> Result<Vec<Slot>, DatabaseError> {
        let mut connection = self.pool.get().await?;
        raffle_slots::table
            .filter(raffle_slots::raffle_id.eq(raffle_id.as_str()))
            .order(raffle_slots::slot_number.asc())
            .select(SlotRow::as_select())
            .load(&mut connection)
            .await?
            .into_iter()
            .map(Slot::try_from)
            .collect()
    }

    async fn load_raffles_by_owner(&self, owner: &UserId) -> Result<Vec<Raffle>, DatabaseError> {
        let mut connection = self.pool.get().await?;
        raffles::table
            .filter(raffles::owner_id.eq(owner.as_str()))
            .order(raffles::created_at.desc())
            .select(RaffleRow::as_select())
            .load(&mut connection)
            .await?
            .into_iter()
            .map(Raffle::try_from)
            .collect()
    }

    async fn load_activity(
        &self,
        raffle_id: &RaffleId,
    ) -> Result<Vec<ActivityRecord>, DatabaseError> {
        let mut connection = self.pool.get().await?;
        raffle_activity::table
            .filter(raffle_activity::raffle_id.eq(raffle_id.as_str()))
            .order(raffle_activity::seq.asc())
            .select(ActivityRow::as_select())
            .load(&mut connection)
            .await?
            .into_iter()
            .map(ActivityRecord::try_from)
            .collect()
    }

    async fn count_active(&self, owner: &UserId) -> Result<u64, DatabaseError> {
        let mut connection = self.pool.get().await?;
        let count: i64 = raffles::table
            .filter(raffles::owner_id.eq(owner.as_str()))
            .filter(raffles::status.eq(ACTIVE))
            .count()
            .get_result(&mut connection)
            .await?;
        u64::try_from(count).map_err(|err| DatabaseError::InvalidRow(err.to_string()))
    }

    async fn insert(
        &self,
        raffle: &Raffle,
        slots: &[Slot],
        activity: &ActivityRecord,
        active_limit: u64,
    ) -> Result<bool, DatabaseError> {
        let raffle_row = RaffleRow::from(raffle);
        let active_limit =
            i64::try_from(active_limit).map_err(|err| DatabaseError::InvalidRow(err.to_string()))?;
        let slot_rows: Vec<SlotRow> = slots
            .iter()
            .map(|slot| SlotRow::new(raffle.id.as_str(), slot))
            .collect();
        let activity_row = NewActivityRow::try_from(activity)?;

        let mut connection = self.pool.get().await?;
        connection
            .transaction::<_, DatabaseError, _>(|connection| {
                async move {
                    // creations of one owner queue up here until commit
                    diesel::sql_query("SELECT pg_advisory_xact_lock(hashtext($1))")
                        .bind::<Text, _>(raffle_row.owner_id.as_str())
                        .execute(connection)
                        .await?;
                    let active: i64 = raffles::table
                        .filter(raffles::owner_id.eq(raffle_row.owner_id.as_str()))
                        .filter(raffles::status.eq(ACTIVE))
                        .count()
                        .get_result(connection)
                        .await?;
                    if active >= active_limit {
                        return Ok(false);
                    }
                    diesel::insert_into(raffles::table)
                        .values(&raffle_row)
                        .execute(connection)
                        .await?;
                    diesel::insert_into(raffle_slots::table)
                        .values(&slot_rows)
                        .execute(connection)
                        .await?;
                    diesel::insert_into(raffle_activity::table)
                        .values(&activity_row)
                        .execute(connection)
                        .await?;
                    Ok(true)
                }
                .scope_boxed()
            })
            .await
    }

    async fn overwrite_slot(
        &self,
        raffle_id: &RaffleId,
        slot: &Slot,
        activity: &ActivityRecord,
    ) -> Result<bool, DatabaseError> {
        let row = SlotRow::new(raffle_id.as_str(), slot);
        let activity_row = NewActivityRow::try_from(activity)?;

        let mut connection = self.pool.get().await?;
        connection
            .transaction::<_, DatabaseError, _>(|connection| {
                async move {
                    // holds off a finalization until the slot is written
                    let active: Option<String> = raffles::table
                        .filter(raffles::id.eq(row.raffle_id.as_str()))
                        .filter(raffles::status.eq(ACTIVE))
                        .select(raffles::id)
                        .for_update()
                        .first(connection)
                        .await
                        .optional()?;
                    if active.is_none() {
                        return Ok(false);
                    }
                    let updated = diesel::update(
                        raffle_slots::table.find((row.raffle_id.as_str(), row.slot_number)),
                    )
                    .set((
                        raffle_slots::participant_name.eq(&row.participant_name),
                        raffle_slots::status.eq(&row.status),
                    ))
                    .execute(connection)
                    .await?;
                    if updated == 0 {
                        return Err(DatabaseError::InvalidRow(format!(
                            "raffle {} has no slot {}",
                            row.raffle_id, row.slot_number
                        )));
                    }
                    diesel::insert_into(raffle_activity::table)
                        .values(&activity_row)
                        .execute(connection)
                        .await?;
                    Ok(true)
                }
                .scope_boxed()
            })
            .await
    }

    async fn update_active(
        &self,
        raffle_id: &RaffleId,
        update: &RaffleUpdate,
        activity: &ActivityRecord,
    ) -> Result<bool, DatabaseError> {
        let changeset = RaffleChangeset::from(update);
        let activity_row = NewActivityRow::try_from(activity)?;

        let mut connection = self.pool.get().await?;
        connection
            .transaction::<_, DatabaseError, _>(|connection| {
                async move {
                    let updated = diesel::update(
                        raffles::table
                            .filter(raffles::id.eq(raffle_id.as_str()))
                            .filter(raffles::status.eq(ACTIVE)),
                    )
                    .set(&changeset)
                    .execute(connection)
                    .await?;
                    if updated == 0 {
                        return Ok(false);
                    }
                    diesel::insert_into(raffle_activity::table)
                        .values(&activity_row)
                        .execute(connection)
                        .await?;
                    Ok(true)
                }
                .scope_boxed()
            })
            .await
    }

    async fn finalize_active(
        &self,
        raffle_id: &RaffleId,
        winner_slot_number: SlotNumber,
        finalized_at: DateTime<Utc>,
        activity: &ActivityRecord,
    ) -> Result<bool, DatabaseError> {
        let activity_row = NewActivityRow::try_from(activity)?;

        let mut connection = self.pool.get().await?;
        connection
            .transaction::<_, DatabaseError, _>(|connection| {
                async move {
                    let updated = diesel::update(
                        raffles::table
                            .filter(raffles::id.eq(raffle_id.as_str()))
                            .filter(raffles::status.eq(ACTIVE)),
                    )
                    .set((
                        raffles::status.eq(RaffleStatus::Finalized.as_str()),
                        raffles::winner_slot_number.eq(i16::from(winner_slot_number)),
                        raffles::finalized_at.eq(finalized_at),
                    ))
                    .execute(connection)
                    .await?;
                    if updated == 0 {
                        return Ok(false);
                    }
                    diesel::insert_into(raffle_activity::table)
                        .values(&activity_row)
                        .execute(connection)
                        .await?;
                    Ok(true)
                }
                .scope_boxed()
            })
            .await
    }
}

#[async_trait]
impl RaffleStore for PostgresStore {
    async fn get_raffle(&self, raffle_id: &RaffleId) -> Result<Option<Raffle>, StoreError> {
        Ok(self.load_raffle(raffle_id).await?)
    }

    async fn get_slot(
        &self,
        raffle_id: &RaffleId,
        slot_number: SlotNumber,
    ) -> Result<Option<Slot>, StoreError> {
        Ok(self.load_slot(raffle_id, slot_number).await?)
    }

    async fn list_slots(&self, raffle_id: &RaffleId) -> Result<Vec<Slot>, StoreError> {
        Ok(self.load_slots(raffle_id).await?)
    }

    async fn list_raffles_by_owner(&self, owner: &UserId) -> Result<Vec<Raffle>, StoreError> {
        Ok(self.load_raffles_by_owner(owner).await?)
    }

    async fn list_activity(
        &self,
        raffle_id: &RaffleId,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        Ok(self.load_activity(raffle_id).await?)
    }

    async fn count_active_raffles(&self, owner: &UserId) -> Result<u64, StoreError> {
        Ok(self.count_active(owner).await?)
    }

    async fn insert_raffle(
        &self,
        raffle: &Raffle,
        slots: &[Slot],
        activity: &ActivityRecord,
        active_limit: u64,
    ) -> Result<bool, StoreError> {
        let inserted = self.insert(raffle, slots, activity, active_limit).await?;
        if inserted {
            self.feed.publish(&raffle.id, ChangeKind::Created);
        }
        Ok(inserted)
    }

    async fn write_slot(
        &self,
        raffle_id: &RaffleId,
        slot: &Slot,
        activity: &ActivityRecord,
    ) -> Result<bool, StoreError> {
        let written = self.overwrite_slot(raffle_id, slot, activity).await?;
        if written {
            self.feed.publish(
                raffle_id,
                ChangeKind::SlotUpdated {
                    slot_number: slot.slot_number,
                },
            );
        }
        Ok(written)
    }

    async fn update_raffle(
        &self,
        raffle_id: &RaffleId,
        update: &RaffleUpdate,
        activity: &ActivityRecord,
    ) -> Result<bool, StoreError> {
        let updated = self.update_active(raffle_id, update, activity).await?;
        if updated {
            self.feed.publish(raffle_id, ChangeKind::RaffleUpdated);
        }
        Ok(updated)
    }

    async fn finalize_raffle(
        &self,
        raffle_id: &RaffleId,
        winner_slot_number: SlotNumber,
        finalized_at: DateTime<Utc>,
        activity: &ActivityRecord,
    ) -> Result<bool, StoreError> {
        let finalized = self
            .finalize_active(raffle_id, winner_slot_number, finalized_at, activity)
            .await?;
        if finalized {
            self.feed
                .publish(raffle_id, ChangeKind::Finalized { winner_slot_number });
        }
        Ok(finalized)
    }

    fn subscribe(&self) -> broadcast::Receiver<RaffleChange> {
        self.feed.subscribe()
    }
}
