//! Lifecycle rules for 100-slot raffles.
//!
//! A raffle is created together with its 100 slots, only its owner may touch
//! the slots or finish it, and finishing it is a one-way transition that fixes
//! the winner. All state lives behind a [`RaffleStore`]; callers are identified
//! through an [`IdentityProvider`].

pub mod clock;
pub mod content;
pub mod engine;
pub mod error;
pub mod identity;
pub mod memory;
pub mod model;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::Engine;
pub use error::{ErrorKind, RaffleError, StoreError};
pub use identity::{IdentityError, IdentityProvider, StaticTokens};
pub use memory::MemoryStore;
pub use model::{
    ActivityDetails, ActivityId, ActivityKind, ActivityRecord, NewRaffle, Raffle, RaffleBoard,
    RaffleDocument, RaffleId, RaffleState, RaffleStatus, RaffleUpdate, Slot, SlotNumber,
    SlotStatus, UserId,
};
pub use store::{ChangeFeed, ChangeKind, RaffleChange, RaffleStore};

/// Every raffle has exactly this many slots, numbered from 1.
pub const SLOTS_PER_RAFFLE: u8 = 100;

/// How many raffles a single user may have in the active state at once.
pub const MAX_ACTIVE_RAFFLES: u64 = 2;

/// Upper bound for the prize images attached to a raffle.
pub const MAX_IMAGE_URLS: usize = 3;
