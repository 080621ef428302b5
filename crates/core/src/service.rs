//! Action and query surface for one client
//!
//! `RoomService` resolves the acting user through the identity seam and
//! routes each action to the component that owns it.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::clock::{ClockHandle, ClockStatus, ExpirationClock};
use crate::code;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::invariants;
use crate::models::{Decision, Participant, Room, RoomDraft, RoomOption, Vote};
use crate::phase::{require_room, PhaseController};
use crate::storage::{RoomFilter, Store};
use crate::submission::SubmissionTracker;
use crate::tally::{Tally, VoteTally};
use crate::tiebreak::TieBreaker;

/// Longest room name accepted
pub const MAX_NAME_LEN: usize = 100;

/// A finished room with its outcome
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub room: Room,
    pub decision: Option<Decision>,
    pub options: Vec<RoomOption>,
}

impl HistoryEntry {
    pub fn winning_option(&self) -> Option<&RoomOption> {
        let winner = self.decision.as_ref()?.winning_option_id?;
        self.options.iter().find(|o| o.id == winner)
    }
}

pub struct RoomService {
    store: Arc<dyn Store>,
    identity: Arc<dyn Identity>,
    config: EngineConfig,
    submissions: SubmissionTracker,
    votes: VoteTally,
    phases: Arc<PhaseController>,
    clock: Arc<ExpirationClock>,
}

impl RoomService {
    pub fn new(store: Arc<dyn Store>, identity: Arc<dyn Identity>, config: EngineConfig) -> Self {
        Self::with_tie_breaker(store, identity, config, TieBreaker::from_entropy())
    }

    pub fn with_tie_breaker(
        store: Arc<dyn Store>,
        identity: Arc<dyn Identity>,
        config: EngineConfig,
        breaker: TieBreaker,
    ) -> Self {
        let phases = Arc::new(PhaseController::new(
            store.clone(),
            Arc::new(breaker),
            config.finalize_attempts,
        ));
        Self {
            submissions: SubmissionTracker::new(store.clone()),
            votes: VoteTally::new(store.clone()),
            clock: Arc::new(ExpirationClock::new(store.clone(), phases.clone())),
            phases,
            store,
            identity,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ===== Room lifecycle =====

    /// Create a room owned by the current user, who joins it straight away
    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create_room(&self, draft: RoomDraft) -> Result<Room> {
        let user_id = self.identity.current_user_id()?;
        validate_draft(&draft)?;

        let mut created = None;
        for attempt in 1..=self.config.code_attempts {
            let code = self.next_code().await;
            let room = Room::from_draft(
                &draft,
                code,
                user_id,
                self.config.default_room_duration(),
            );
            match self.store.insert_room(&room).await {
                Ok(()) => {
                    created = Some(room);
                    break;
                }
                Err(Error::Conflict(_)) => {
                    warn!(attempt, "Room code collision, drawing another");
                }
                Err(e) => return Err(e),
            }
        }
        let room = created
            .ok_or_else(|| Error::Conflict("could not allocate a unique room code".into()))?;
        invariants::assert_room_invariants(&room);

        self.store
            .insert_participant(&Participant::new(room.id, user_id), room.max_participants)
            .await?;

        info!(room_id = %room.id, code = %room.code, phase = %room.phase, "Room created");
        Ok(room)
    }

    /// Store-side code if available, else a local draw
    async fn next_code(&self) -> String {
        match self.store.generate_room_code().await {
            Ok(Some(code)) => return code,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Store code generator failed"),
        }
        code::fresh_code()
    }

    /// Join a room. Joining twice returns the existing seat.
    #[instrument(skip(self))]
    pub async fn join_room(&self, room_id: Uuid) -> Result<Participant> {
        let user_id = self.identity.current_user_id()?;
        let room = require_room(self.store.as_ref(), room_id).await?;

        if let Some(existing) = self.store.find_participant(room_id, user_id).await? {
            return Ok(existing);
        }
        if room.phase.is_terminal() {
            return Err(Error::WrongPhase {
                expected: "lobby, submission or voting",
                actual: room.phase,
            });
        }
        if room.is_expired(Utc::now()) {
            return Err(Error::Expired);
        }

        let participant = Participant::new(room_id, user_id);
        self.store
            .insert_participant(&participant, room.max_participants)
            .await?;
        info!(user_id = %user_id, "Joined room");
        Ok(participant)
    }

    /// Join by share code, case-insensitive
    #[instrument(skip(self))]
    pub async fn join_by_code(&self, code: &str) -> Result<(Room, Participant)> {
        let room = self.room_by_code(code).await?;
        let participant = self.join_room(room.id).await?;
        Ok((room, participant))
    }

    pub async fn start_submission(&self, room_id: Uuid) -> Result<Room> {
        self.identity.current_user_id()?;
        self.phases.start_submission(room_id).await?;
        self.room(room_id).await
    }

    pub async fn set_ready(&self, room_id: Uuid, ready: bool) -> Result<()> {
        let user_id = self.identity.current_user_id()?;
        let room = require_room(self.store.as_ref(), room_id).await?;
        self.submissions.set_ready(&room, user_id, ready).await
    }

    pub async fn submit_option(&self, room_id: Uuid, text: &str) -> Result<RoomOption> {
        let user_id = self.identity.current_user_id()?;
        let room = require_room(self.store.as_ref(), room_id).await?;
        self.submissions.submit_option(&room, user_id, text).await
    }

    pub async fn update_option(
        &self,
        room_id: Uuid,
        option_id: Uuid,
        text: &str,
    ) -> Result<RoomOption> {
        let user_id = self.identity.current_user_id()?;
        let room = require_room(self.store.as_ref(), room_id).await?;
        self.submissions
            .update_option(&room, user_id, option_id, text)
            .await
    }

    pub async fn delete_option(&self, room_id: Uuid, option_id: Uuid) -> Result<()> {
        let user_id = self.identity.current_user_id()?;
        let room = require_room(self.store.as_ref(), room_id).await?;
        self.submissions
            .delete_option(&room, user_id, option_id)
            .await
    }

    pub async fn request_voting(&self, room_id: Uuid) -> Result<Room> {
        let user_id = self.identity.current_user_id()?;
        self.phases.request_voting(room_id, user_id).await?;
        self.room(room_id).await
    }

    /// Cast the current user's vote. The last vote in closes the room.
    pub async fn cast_vote(&self, room_id: Uuid, option_id: Uuid) -> Result<Vote> {
        let user_id = self.identity.current_user_id()?;
        let room = require_room(self.store.as_ref(), room_id).await?;
        let vote = self.votes.cast_vote(&room, user_id, option_id).await?;

        // The vote already stands; a failed close is retried by the next voter or the clock
        if let Err(e) = self.phases.after_vote(room_id).await {
            warn!(room_id = %room_id, error = %e, "Could not close room after final vote");
        }
        Ok(vote)
    }

    /// End the room now. Allowed for the creator, after the deadline, or
    /// once everyone has voted.
    #[instrument(skip(self))]
    pub async fn force_results(&self, room_id: Uuid) -> Result<Decision> {
        let user_id = self.identity.current_user_id()?;
        let room = require_room(self.store.as_ref(), room_id).await?;

        let allowed = room.phase.is_terminal()
            || room.is_creator(user_id)
            || room.is_expired(Utc::now())
            || self.votes.all_voted(room_id).await?;
        if !allowed {
            return Err(Error::NotAuthorized(
                "only the creator can end the room before time runs out".into(),
            ));
        }
        self.phases.force_results(room_id).await
    }

    /// One deadline check against the current time
    pub async fn check_expiry(&self, room_id: Uuid) -> Result<ClockStatus> {
        self.clock.check(room_id, Utc::now()).await
    }

    /// Keep a background clock on this room while the handle lives
    pub fn watch_expiry(&self, room_id: Uuid) -> ClockHandle {
        self.clock.spawn(room_id)
    }

    // ===== Queries =====

    pub async fn room(&self, room_id: Uuid) -> Result<Room> {
        require_room(self.store.as_ref(), room_id).await
    }

    pub async fn room_by_code(&self, code: &str) -> Result<Room> {
        let code = code::normalize(code)?;
        self.store
            .find_room_by_code(&code)
            .await?
            .ok_or_else(|| Error::NotFound(format!("room with code {code}")))
    }

    pub async fn time_remaining(&self, room_id: Uuid) -> Result<Duration> {
        let room = self.room(room_id).await?;
        Ok(ExpirationClock::time_remaining(&room, Utc::now()))
    }

    pub async fn participants(&self, room_id: Uuid) -> Result<Vec<Participant>> {
        let participants = self.store.list_participants(room_id).await?;
        if cfg!(debug_assertions) {
            let room = self.room(room_id).await?;
            invariants::assert_participant_invariants(&participants, &room);
        }
        Ok(participants)
    }

    pub async fn options(&self, room_id: Uuid) -> Result<Vec<RoomOption>> {
        self.store.list_options(room_id).await
    }

    /// Votes, or `None` while the room keeps them hidden
    pub async fn votes(&self, room_id: Uuid) -> Result<Option<Vec<Vote>>> {
        let room = self.room(room_id).await?;
        if !room.votes_visible() {
            return Ok(None);
        }
        self.store.list_votes(room_id).await.map(Some)
    }

    /// Per-option counts, or `None` while the room keeps votes hidden
    pub async fn vote_counts(&self, room_id: Uuid) -> Result<Option<Tally>> {
        let room = self.room(room_id).await?;
        if !room.votes_visible() {
            return Ok(None);
        }
        self.votes.tally(room_id).await.map(Some)
    }

    pub async fn decision(&self, room_id: Uuid) -> Result<Option<Decision>> {
        self.store.find_decision(room_id).await
    }

    pub async fn submission_progress(&self, room_id: Uuid) -> Result<f64> {
        self.submissions.submission_progress(room_id).await
    }

    pub async fn ready_progress(&self, room_id: Uuid) -> Result<f64> {
        self.submissions.ready_progress(room_id).await
    }

    /// The current user's rooms
    pub async fn list_rooms(&self, filter: RoomFilter) -> Result<Vec<Room>> {
        let user_id = self.identity.current_user_id()?;
        self.store.list_rooms_for_user(user_id, filter).await
    }

    /// Finished rooms of the current user with their outcomes
    pub async fn history(&self) -> Result<Vec<HistoryEntry>> {
        let rooms = self.list_rooms(RoomFilter::Finished).await?;
        let mut entries = Vec::with_capacity(rooms.len());
        for room in rooms {
            let decision = self.store.find_decision(room.id).await?;
            let options = self.store.list_options(room.id).await?;
            entries.push(HistoryEntry {
                room,
                decision,
                options,
            });
        }
        Ok(entries)
    }
}

fn validate_draft(draft: &RoomDraft) -> Result<()> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(Error::Validation("room name cannot be empty".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "room name is limited to {MAX_NAME_LEN} characters"
        )));
    }
    if draft.max_participants == Some(0) {
        return Err(Error::Validation(
            "a room needs room for at least one participant".into(),
        ));
    }
    if let Some(duration) = draft.duration {
        if duration <= Duration::zero() {
            return Err(Error::Validation("room duration must be positive".into()));
        }
    }
    Ok(())
}
