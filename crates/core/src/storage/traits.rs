//! Storage repository traits
//!
//! These traits define the store the engine talks to. Every call may
//! suspend; consistency across clients comes from the atomic operations
//! below, not from any in-process lock.

use async_trait::async_trait;
use uuid::Uuid;

use super::decisions::FinalizeOutcome;
use super::feed::ChangeStream;
use super::rooms::RoomFilter;
use crate::error::Result;
use crate::models::{Decision, Participant, Phase, Room, RoomOption, Vote};

/// Room repository operations
#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// Produce an unused share code, `None` if the store cannot
    async fn generate_room_code(&self) -> Result<Option<String>>;

    /// Create a room. Duplicate codes are `Conflict`.
    async fn insert_room(&self, room: &Room) -> Result<()>;

    async fn find_room(&self, room_id: Uuid) -> Result<Option<Room>>;

    /// Look up by normalized share code
    async fn find_room_by_code(&self, code: &str) -> Result<Option<Room>>;

    /// Compare-and-swap the phase; false if the room was not in `from`
    async fn advance_phase(&self, room_id: Uuid, from: Phase, to: Phase) -> Result<bool>;

    /// Rooms the user participates in
    async fn list_rooms_for_user(&self, user_id: Uuid, filter: RoomFilter) -> Result<Vec<Room>>;
}

/// Participant repository operations
#[async_trait]
pub trait ParticipantRepository: Send + Sync {
    /// Insert unless the room already holds `cap` participants
    async fn insert_participant(&self, participant: &Participant, cap: Option<u32>) -> Result<()>;

    async fn find_participant(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<Participant>>;

    async fn list_participants(&self, room_id: Uuid) -> Result<Vec<Participant>>;

    async fn set_ready(&self, room_id: Uuid, user_id: Uuid, ready: bool) -> Result<bool>;

    /// True only on the first false -> true flip
    async fn mark_submitted(&self, room_id: Uuid, user_id: Uuid) -> Result<bool>;

    /// True only on the first false -> true flip
    async fn mark_voted(&self, room_id: Uuid, user_id: Uuid) -> Result<bool>;
}

/// Option repository operations
#[async_trait]
pub trait OptionRepository: Send + Sync {
    async fn insert_option(&self, option: &RoomOption) -> Result<()>;

    async fn find_option(&self, option_id: Uuid) -> Result<Option<RoomOption>>;

    async fn list_options(&self, room_id: Uuid) -> Result<Vec<RoomOption>>;

    async fn update_option_text(&self, option: &RoomOption, text: &str) -> Result<bool>;

    async fn delete_option(&self, option: &RoomOption) -> Result<bool>;
}

/// Vote repository operations
#[async_trait]
pub trait VoteRepository: Send + Sync {
    /// Insert while the room is in Voting. Second vote by a user is `Conflict`.
    async fn insert_vote(&self, vote: &Vote) -> Result<()>;

    async fn list_votes(&self, room_id: Uuid) -> Result<Vec<Vote>>;
}

/// Decision repository operations
#[async_trait]
pub trait DecisionRepository: Send + Sync {
    async fn find_decision(&self, room_id: Uuid) -> Result<Option<Decision>>;

    /// Atomically move the room to Results and write its decision
    async fn finalize(&self, decision: &Decision, expected_votes: usize) -> Result<FinalizeOutcome>;
}

/// Subscription to store writes
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, room_id: Uuid) -> ChangeStream;
}

/// Combined storage interface
///
/// Provides access to all repository operations plus the change-feed.
pub trait Store:
    RoomRepository
    + ParticipantRepository
    + OptionRepository
    + VoteRepository
    + DecisionRepository
    + ChangeFeed
{
}

// Blanket implementation: any type implementing all traits implements Store
impl<T> Store for T where
    T: RoomRepository
        + ParticipantRepository
        + OptionRepository
        + VoteRepository
        + DecisionRepository
        + ChangeFeed
{
}
