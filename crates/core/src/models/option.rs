//! Option model - a candidate answer in a room

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomOption {
    pub id: Uuid,
    pub room_id: Uuid,
    pub text: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl RoomOption {
    pub fn new(room_id: Uuid, created_by: Uuid, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            text,
            created_by,
            created_at: Utc::now(),
        }
    }
}
