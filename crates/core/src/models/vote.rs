//! Vote model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single ballot. At most one per (room_id, user_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub id: Uuid,
    pub room_id: Uuid,
    pub option_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Vote {
    pub fn new(room_id: Uuid, option_id: Uuid, user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            option_id,
            user_id,
            created_at: Utc::now(),
        }
    }
}
