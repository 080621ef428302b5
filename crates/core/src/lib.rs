//! Verdict Core Library
//!
//! Decision rooms: a group submits options, votes, and gets one final
//! decision, with ties settled by a dice, coin or spinner draw.
//!
//! Every client runs its own engine against a shared store. Agreement between
//! clients comes from the store's atomic operations (unique constraints,
//! compare-and-swap phase moves, a single transactional finalize), never from
//! an in-process lock.

pub mod clock;
pub mod code;
pub mod config;
pub mod error;
pub mod identity;
pub mod invariants;
pub mod models;
pub mod phase;
pub mod service;
pub mod storage;
pub mod submission;
pub mod tally;
pub mod tiebreak;

pub use clock::{ClockHandle, ClockStatus, ExpirationClock};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use identity::{Identity, LocalSession};
pub use models::*;
pub use phase::PhaseController;
pub use service::{HistoryEntry, RoomService};
pub use storage::{
    ChangeFeed, ChangeStream, Database, FinalizeOutcome, Notification, Relation, RoomFilter,
    SqliteStore, Store,
};
pub use submission::SubmissionTracker;
pub use tally::{Outcome, Tally, VoteTally};
pub use tiebreak::{CoinSide, Draw, TieBreak, TieBreaker};
