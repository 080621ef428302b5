//! Client-side snapshot of one room

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use verdict_core::storage::{Relation, Store};
use verdict_core::{ratio, Decision, ExpirationClock, Participant, Room, RoomOption, Tally, Vote};

use crate::error::{Error, Result};

/// Everything a client shows about a room. Never mutated in place; a change
/// produces a new snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    pub room: Room,
    pub participants: Vec<Participant>,
    pub options: Vec<RoomOption>,
    /// `None` while the room hides votes until the end
    pub votes: Option<Vec<Vote>>,
    pub decision: Option<Decision>,
}

impl Projection {
    /// Read every relation of the room
    pub async fn load(store: &dyn Store, room_id: Uuid) -> Result<Self> {
        let room = fetch_room(store, room_id).await?;
        let participants = store.list_participants(room_id).await?;
        let options = store.list_options(room_id).await?;
        let votes = fetch_votes(store, &room).await?;
        let decision = store.find_decision(room_id).await?;

        Ok(Self {
            room,
            participants,
            options,
            votes,
            decision,
        })
    }

    /// A copy with `relation` re-read from the store
    pub async fn refresh(&self, store: &dyn Store, relation: Relation) -> Result<Self> {
        let room_id = self.room.id;
        let mut next = self.clone();

        match relation {
            Relation::Rooms => {
                next.room = fetch_room(store, room_id).await?;
                // Visibility follows the phase; re-read votes when it may have flipped
                if next.room.phase != self.room.phase
                    || next.room.votes_visible() != self.room.votes_visible()
                {
                    next.votes = fetch_votes(store, &next.room).await?;
                }
            }
            Relation::Participants => next.participants = store.list_participants(room_id).await?,
            Relation::Options => next.options = store.list_options(room_id).await?,
            Relation::Votes => next.votes = fetch_votes(store, &next.room).await?,
            Relation::Decisions => next.decision = store.find_decision(room_id).await?,
        }

        Ok(next)
    }

    pub fn participant(&self, user_id: Uuid) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn submission_progress(&self) -> f64 {
        ratio(&self.participants, |p| p.has_submitted)
    }

    pub fn ready_progress(&self) -> f64 {
        ratio(&self.participants, |p| p.is_ready)
    }

    pub fn voting_progress(&self) -> f64 {
        ratio(&self.participants, |p| p.has_voted)
    }

    /// Counts per option, when votes are visible
    pub fn tally(&self) -> Option<Tally> {
        self.votes
            .as_ref()
            .map(|votes| Tally::from_votes(&self.options, votes))
    }

    pub fn winning_option(&self) -> Option<&RoomOption> {
        let winner = self.decision.as_ref()?.winning_option_id?;
        self.options.iter().find(|o| o.id == winner)
    }

    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        ExpirationClock::time_remaining(&self.room, now)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::from)
    }
}

async fn fetch_room(store: &dyn Store, room_id: Uuid) -> Result<Room> {
    store
        .find_room(room_id)
        .await?
        .ok_or_else(|| verdict_core::Error::NotFound(format!("room {room_id}")).into())
}

async fn fetch_votes(store: &dyn Store, room: &Room) -> Result<Option<Vec<Vote>>> {
    if !room.votes_visible() {
        return Ok(None);
    }
    Ok(Some(store.list_votes(room.id).await?))
}
