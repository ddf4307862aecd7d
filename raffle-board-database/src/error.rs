use std::env::VarError;

use diesel_async::pooled_connection::deadpool;
use raffle_board_lifecycle::model::{InconsistentDocument, InvalidSlotNumber, UnknownVariant};
use raffle_board_lifecycle::StoreError;
use thiserror::Error;

#[allow(clippy::module_name_repetitions)]
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database url not set in env variable DATABASE_URL")]
    DatabaseEnvUrl(#[from] VarError),
    #[error("Failed to create database pool {0}")]
    PoolBuild(#[from] deadpool::BuildError),
    #[error("Database pool failed {0}")]
    Pool(#[from] deadpool::PoolError),
    #[error("Database query failed {0}")]
    Database(#[from] diesel::result::Error),
    #[error("Activity details could not be converted {0}")]
    ActivityDetails(#[from] serde_json::Error),
    #[error("Stored row is invalid {0}")]
    InvalidRow(String),
}

impl From<UnknownVariant> for DatabaseError {
    fn from(value: UnknownVariant) -> Self {
        Self::InvalidRow(value.to_string())
    }
}

impl From<InvalidSlotNumber> for DatabaseError {
    fn from(value: InvalidSlotNumber) -> Self {
        Self::InvalidRow(value.to_string())
    }
}

impl From<InconsistentDocument> for DatabaseError {
    fn from(value: InconsistentDocument) -> Self {
        Self::InvalidRow(value.to_string())
    }
}

impl From<DatabaseError> for StoreError {
    fn from(value: DatabaseError) -> Self {
        Self::new(value)
    }
}
