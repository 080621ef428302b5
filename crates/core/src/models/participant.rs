//! Participant model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's seat in a room. One per (room_id, user_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
    pub has_submitted: bool,
    pub has_voted: bool,
    pub is_ready: bool,
}

impl Participant {
    pub fn new(room_id: Uuid, user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            user_id,
            joined_at: Utc::now(),
            has_submitted: false,
            has_voted: false,
            is_ready: false,
        }
    }
}

/// Fraction of `participants` matching `pred`, 0 when there are none
pub fn ratio<F>(participants: &[Participant], pred: F) -> f64
where
    F: Fn(&Participant) -> bool,
{
    if participants.is_empty() {
        return 0.0;
    }
    let hits = participants.iter().filter(|p| pred(p)).count();
    hits as f64 / participants.len() as f64
}
