//! Decision model - the final outcome of a room

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DecisionType;

/// Written exactly once, when the room enters Results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: Uuid,
    pub room_id: Uuid,
    pub winning_option_id: Option<Uuid>,
    pub tie_breaker_used: bool,
    pub tie_breaker_type: Option<DecisionType>,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    /// Outright winner, or no winner when nobody voted
    pub fn plain(room_id: Uuid, winning_option_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            winning_option_id,
            tie_breaker_used: false,
            tie_breaker_type: None,
            decided_at: Utc::now(),
        }
    }

    /// Winner picked by a tie-break
    pub fn tie_broken(room_id: Uuid, winning_option_id: Uuid, kind: DecisionType) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            winning_option_id: Some(winning_option_id),
            tie_breaker_used: true,
            tie_breaker_type: Some(kind),
            decided_at: Utc::now(),
        }
    }
}
