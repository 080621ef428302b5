//! Change-feed for store writes
//!
//! Every committed write publishes "relation X of room Y changed". No payload
//! is carried; subscribers re-read whatever they need.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// The five relations a room is spread across
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Rooms,
    Participants,
    Options,
    Votes,
    Decisions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub room_id: Uuid,
    pub relation: Relation,
}

/// What a subscriber should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// One relation changed
    Changed(Relation),
    /// Events were dropped; treat every relation as changed
    Resync,
}

/// Fan-out hub owned by a store
pub struct FeedHub {
    tx: broadcast::Sender<ChangeEvent>,
}

impl FeedHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, room_id: Uuid, relation: Relation) {
        let event = ChangeEvent { room_id, relation };
        if self.tx.send(event).is_err() {
            debug!(room_id = %room_id, ?relation, "No feed subscribers");
        }
    }

    pub fn subscribe(&self, room_id: Uuid) -> ChangeStream {
        ChangeStream {
            room_id,
            rx: self.tx.subscribe(),
        }
    }
}

/// A subscription filtered to a single room
pub struct ChangeStream {
    room_id: Uuid,
    rx: broadcast::Receiver<ChangeEvent>,
}

impl ChangeStream {
    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    /// Wait for the next notification for this room. `None` once the store is gone.
    pub async fn next(&mut self) -> Option<Notification> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.room_id == self.room_id => {
                    return Some(Notification::Changed(event.relation));
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(room_id = %self.room_id, missed, "Change feed lagged");
                    return Some(Notification::Resync);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
