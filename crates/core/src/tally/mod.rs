//! Vote casting and counting

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Phase, Room, RoomOption, Vote};
use crate::storage::Store;

/// Winner of a tally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Unique(Uuid),
    /// Two or more options share the top count, in option order
    Tie(Vec<Uuid>),
    /// Nobody voted
    None,
}

/// Vote counts per option, in option order, zero counts included
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    counts: Vec<(Uuid, usize)>,
    /// Number of vote rows the counts were built from
    votes: usize,
}

impl Tally {
    pub fn from_votes(options: &[RoomOption], votes: &[Vote]) -> Self {
        let mut by_option: HashMap<Uuid, usize> = HashMap::new();
        for vote in votes {
            *by_option.entry(vote.option_id).or_default() += 1;
        }

        let counts = options
            .iter()
            .map(|o| (o.id, by_option.get(&o.id).copied().unwrap_or(0)))
            .collect();

        Self {
            counts,
            votes: votes.len(),
        }
    }

    pub fn counts(&self) -> &[(Uuid, usize)] {
        &self.counts
    }

    pub fn count(&self, option_id: Uuid) -> usize {
        self.counts
            .iter()
            .find(|(id, _)| *id == option_id)
            .map_or(0, |(_, n)| *n)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, n)| n).sum()
    }

    pub fn vote_rows(&self) -> usize {
        self.votes
    }

    pub fn as_map(&self) -> HashMap<Uuid, usize> {
        self.counts.iter().copied().collect()
    }

    pub fn winner(&self) -> Outcome {
        let max = self.counts.iter().map(|(_, n)| *n).max().unwrap_or(0);
        if max == 0 {
            return Outcome::None;
        }

        let mut top: Vec<Uuid> = self
            .counts
            .iter()
            .filter(|(_, n)| *n == max)
            .map(|(id, _)| *id)
            .collect();

        if top.len() == 1 {
            Outcome::Unique(top.remove(0))
        } else {
            Outcome::Tie(top)
        }
    }
}

pub struct VoteTally {
    store: Arc<dyn Store>,
}

impl VoteTally {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Record `actor`'s single vote for `option_id`
    #[instrument(skip(self, room), fields(room_id = %room.id, user_id = %actor))]
    pub async fn cast_vote(&self, room: &Room, actor: Uuid, option_id: Uuid) -> Result<Vote> {
        if room.phase != Phase::Voting {
            return Err(Error::WrongPhase {
                expected: "voting",
                actual: room.phase,
            });
        }
        if room.is_expired(Utc::now()) {
            return Err(Error::Expired);
        }

        let participant = self
            .store
            .find_participant(room.id, actor)
            .await?
            .ok_or_else(|| Error::NotAuthorized("only participants can vote".into()))?;
        if participant.has_voted {
            return Err(Error::Conflict("already voted in this room".into()));
        }

        match self.store.find_option(option_id).await? {
            Some(option) if option.room_id == room.id => {}
            _ => return Err(Error::NotFound(format!("option {option_id} in this room"))),
        }

        let vote = Vote::new(room.id, option_id, actor);
        self.store.insert_vote(&vote).await?;

        if let Err(e) = self.store.mark_voted(room.id, actor).await {
            warn!(error = %e, "Could not flag participant as voted");
        }

        Ok(vote)
    }

    pub async fn tally(&self, room_id: Uuid) -> Result<Tally> {
        let options = self.store.list_options(room_id).await?;
        let votes = self.store.list_votes(room_id).await?;
        Ok(Tally::from_votes(&options, &votes))
    }

    /// Whether every participant has a vote on record
    pub async fn all_voted(&self, room_id: Uuid) -> Result<bool> {
        let participants = self.store.list_participants(room_id).await?;
        if participants.is_empty() {
            return Ok(false);
        }
        let votes = self.store.list_votes(room_id).await?;
        Ok(participants
            .iter()
            .all(|p| p.has_voted || votes.iter().any(|v| v.user_id == p.user_id)))
    }
}
