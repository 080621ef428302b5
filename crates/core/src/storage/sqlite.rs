//! Store implementation over a local SQLite database
//!
//! Stands in for the shared relational store: the connection is guarded by an
//! async mutex, and each committed write is announced on the change-feed.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

use super::decisions::FinalizeOutcome;
use super::feed::{ChangeStream, FeedHub, Relation};
use super::rooms::RoomFilter;
use super::traits::{
    ChangeFeed, DecisionRepository, OptionRepository, ParticipantRepository, RoomRepository,
    VoteRepository,
};
use super::Database;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{Decision, Participant, Phase, Room, RoomOption, Vote};

pub struct SqliteStore {
    db: Mutex<Database>,
    feed: FeedHub,
    code_attempts: u32,
}

impl SqliteStore {
    pub fn new(db: Database, config: &EngineConfig) -> Self {
        Self {
            db: Mutex::new(db),
            feed: FeedHub::new(config.feed_capacity),
            code_attempts: config.code_attempts,
        }
    }

    /// Open the database named by the configuration
    pub fn open(config: &EngineConfig) -> Result<Self> {
        let path = config.database_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self::new(Database::open(&path)?, config))
    }

    /// Fresh in-memory store with default settings
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(
            Database::open_in_memory()?,
            &EngineConfig::default(),
        ))
    }

    fn notify(&self, room_id: Uuid, relation: Relation) {
        self.feed.publish(room_id, relation);
    }
}

#[async_trait]
impl RoomRepository for SqliteStore {
    async fn generate_room_code(&self) -> Result<Option<String>> {
        let db = self.db.lock().await;
        db.rooms().generate_code(self.code_attempts)
    }

    #[instrument(skip(self, room), fields(room_id = %room.id))]
    async fn insert_room(&self, room: &Room) -> Result<()> {
        self.db.lock().await.rooms().create(room)?;
        self.notify(room.id, Relation::Rooms);
        Ok(())
    }

    async fn find_room(&self, room_id: Uuid) -> Result<Option<Room>> {
        self.db.lock().await.rooms().find_by_id(room_id)
    }

    async fn find_room_by_code(&self, code: &str) -> Result<Option<Room>> {
        self.db.lock().await.rooms().find_by_code(code)
    }

    async fn advance_phase(&self, room_id: Uuid, from: Phase, to: Phase) -> Result<bool> {
        let changed = self.db.lock().await.rooms().advance_phase(room_id, from, to)?;
        if changed {
            self.notify(room_id, Relation::Rooms);
        }
        Ok(changed)
    }

    async fn list_rooms_for_user(&self, user_id: Uuid, filter: RoomFilter) -> Result<Vec<Room>> {
        self.db.lock().await.rooms().list_for_user(user_id, filter)
    }
}

#[async_trait]
impl ParticipantRepository for SqliteStore {
    async fn insert_participant(&self, participant: &Participant, cap: Option<u32>) -> Result<()> {
        self.db
            .lock()
            .await
            .participants()
            .insert_capped(participant, cap)?;
        self.notify(participant.room_id, Relation::Participants);
        Ok(())
    }

    async fn find_participant(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<Participant>> {
        self.db.lock().await.participants().find(room_id, user_id)
    }

    async fn list_participants(&self, room_id: Uuid) -> Result<Vec<Participant>> {
        self.db.lock().await.participants().list(room_id)
    }

    async fn set_ready(&self, room_id: Uuid, user_id: Uuid, ready: bool) -> Result<bool> {
        let changed = self
            .db
            .lock()
            .await
            .participants()
            .set_ready(room_id, user_id, ready)?;
        if changed {
            self.notify(room_id, Relation::Participants);
        }
        Ok(changed)
    }

    async fn mark_submitted(&self, room_id: Uuid, user_id: Uuid) -> Result<bool> {
        let changed = self
            .db
            .lock()
            .await
            .participants()
            .mark_submitted(room_id, user_id)?;
        if changed {
            self.notify(room_id, Relation::Participants);
        }
        Ok(changed)
    }

    async fn mark_voted(&self, room_id: Uuid, user_id: Uuid) -> Result<bool> {
        let changed = self
            .db
            .lock()
            .await
            .participants()
            .mark_voted(room_id, user_id)?;
        if changed {
            self.notify(room_id, Relation::Participants);
        }
        Ok(changed)
    }
}

#[async_trait]
impl OptionRepository for SqliteStore {
    async fn insert_option(&self, option: &RoomOption) -> Result<()> {
        self.db.lock().await.options().create(option)?;
        self.notify(option.room_id, Relation::Options);
        Ok(())
    }

    async fn find_option(&self, option_id: Uuid) -> Result<Option<RoomOption>> {
        self.db.lock().await.options().find_by_id(option_id)
    }

    async fn list_options(&self, room_id: Uuid) -> Result<Vec<RoomOption>> {
        self.db.lock().await.options().list_for_room(room_id)
    }

    async fn update_option_text(&self, option: &RoomOption, text: &str) -> Result<bool> {
        let changed = self.db.lock().await.options().update_text(option.id, text)?;
        if changed {
            self.notify(option.room_id, Relation::Options);
        }
        Ok(changed)
    }

    async fn delete_option(&self, option: &RoomOption) -> Result<bool> {
        let changed = self.db.lock().await.options().delete(option.id)?;
        if changed {
            self.notify(option.room_id, Relation::Options);
        }
        Ok(changed)
    }
}

#[async_trait]
impl VoteRepository for SqliteStore {
    async fn insert_vote(&self, vote: &Vote) -> Result<()> {
        self.db.lock().await.votes().insert_while_voting(vote)?;
        self.notify(vote.room_id, Relation::Votes);
        Ok(())
    }

    async fn list_votes(&self, room_id: Uuid) -> Result<Vec<Vote>> {
        self.db.lock().await.votes().list_for_room(room_id)
    }
}

#[async_trait]
impl DecisionRepository for SqliteStore {
    async fn find_decision(&self, room_id: Uuid) -> Result<Option<Decision>> {
        self.db.lock().await.decisions().find_for_room(room_id)
    }

    async fn finalize(&self, decision: &Decision, expected_votes: usize) -> Result<FinalizeOutcome> {
        let outcome = self
            .db
            .lock()
            .await
            .decisions()
            .finalize(decision, expected_votes)?;
        if outcome == FinalizeOutcome::Finalized {
            self.notify(decision.room_id, Relation::Rooms);
            self.notify(decision.room_id, Relation::Decisions);
        }
        Ok(outcome)
    }
}

impl ChangeFeed for SqliteStore {
    fn subscribe(&self, room_id: Uuid) -> ChangeStream {
        self.feed.subscribe(room_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DecisionType, RoomDraft};
    use crate::storage::Notification;

    #[tokio::test]
    async fn test_writes_are_announced() {
        let store = SqliteStore::in_memory().unwrap();
        let room = Room::from_draft(
            &RoomDraft::new("Feed", DecisionType::Coin),
            "FEED01".into(),
            Uuid::new_v4(),
            chrono::Duration::minutes(30),
        );
        let mut stream = store.subscribe(room.id);

        store.insert_room(&room).await.unwrap();
        store
            .insert_participant(&Participant::new(room.id, room.created_by), None)
            .await
            .unwrap();

        assert_eq!(
            stream.next().await,
            Some(Notification::Changed(Relation::Rooms))
        );
        assert_eq!(
            stream.next().await,
            Some(Notification::Changed(Relation::Participants))
        );
    }

    #[tokio::test]
    async fn test_failed_write_is_silent() {
        let store = SqliteStore::in_memory().unwrap();
        let room = Room::from_draft(
            &RoomDraft::new("Quiet", DecisionType::Dice),
            "QUIET1".into(),
            Uuid::new_v4(),
            chrono::Duration::minutes(30),
        );
        store.insert_room(&room).await.unwrap();
        let mut stream = store.subscribe(room.id);

        // Phase CAS from the wrong phase changes nothing and publishes nothing
        assert!(!store
            .advance_phase(room.id, Phase::Voting, Phase::Results)
            .await
            .unwrap());
        assert!(store
            .advance_phase(room.id, Phase::Lobby, Phase::Submission)
            .await
            .unwrap());

        assert_eq!(
            stream.next().await,
            Some(Notification::Changed(Relation::Rooms))
        );
        let room = store.find_room(room.id).await.unwrap().unwrap();
        assert_eq!(room.phase, Phase::Submission);
    }
}
