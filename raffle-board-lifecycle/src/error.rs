use chrono::NaiveDate;
use serde::Serialize;

use crate::identity::IdentityError;
use crate::model::RaffleId;

/// Failure of the underlying store. The concrete cause stays opaque to the
/// lifecycle rules.
#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct StoreError(#[source] Box<dyn std::error::Error + Send + Sync>);

impl StoreError {
    pub fn new(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(error.into())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RaffleError {
    #[error("not authenticated: {0}")]
    Unauthenticated(#[from] IdentityError),
    #[error("only the owner of raffle {0} may do this")]
    Forbidden(RaffleId),
    #[error("raffle {0} does not exist")]
    NotFound(RaffleId),
    #[error("{0}")]
    Validation(String),
    #[error("you already own {limit} active raffles, finalize one of them first")]
    QuotaExceeded { limit: u64 },
    #[error("raffle {0} is already finalized")]
    AlreadyFinalized(RaffleId),
    #[error("raffle {0} has no scheduled finalization date")]
    NoScheduledDate(RaffleId),
    #[error("raffle can not be finalized before {finalization_date}")]
    TooEarly { finalization_date: NaiveDate },
    #[error("storage failed: {0}")]
    Storage(#[from] StoreError),
}

impl RaffleError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            Self::AlreadyFinalized(_) => ErrorKind::AlreadyFinalized,
            Self::NoScheduledDate(_) => ErrorKind::NoScheduledDate,
            Self::TooEarly { .. } => ErrorKind::TooEarly,
            Self::Storage(_) => ErrorKind::StorageError,
        }
    }
}

/// Closed set of failure categories reported to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    ValidationError,
    QuotaExceeded,
    AlreadyFinalized,
    NoScheduledDate,
    TooEarly,
    StorageError,
}
