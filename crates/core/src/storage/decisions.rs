//! Decision storage operations
//!
//! A decision is only ever written together with the room's move to
//! Results, inside one transaction.

use rusqlite::{params, Connection, Row};
use tracing::{info, instrument};
use uuid::Uuid;

use super::parse::{
    parse_datetime, parse_decision_type_opt, parse_phase, parse_uuid, parse_uuid_opt, OptionalExt,
};
use crate::error::{Error, Result};
use crate::models::{Decision, Phase};

/// Result of an attempt to close a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// This call moved the room to Results and wrote the decision
    Finalized,
    /// Someone else already did
    AlreadyFinal,
    /// Votes changed since the tally was taken
    Stale,
    /// Room is in a phase that cannot jump to Results
    NotEligible(Phase),
}

pub struct DecisionStore<'a> {
    conn: &'a Connection,
}

impl<'a> DecisionStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Find the decision for a room
    #[instrument(skip(self))]
    pub fn find_for_room(&self, room_id: Uuid) -> Result<Option<Decision>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, room_id, winning_option_id, tie_breaker_used, tie_breaker_type, decided_at
             FROM decisions WHERE room_id = ?1",
        )?;
        let decision = stmt
            .query_row(params![room_id.to_string()], Self::map_decision)
            .optional()?;
        Ok(decision)
    }

    /// Move the room to Results and record `decision`, provided the room is
    /// still in flight and exactly `expected_votes` votes exist.
    #[instrument(skip(self, decision), fields(room_id = %decision.room_id))]
    pub fn finalize(&self, decision: &Decision, expected_votes: usize) -> Result<FinalizeOutcome> {
        let room_id = decision.room_id.to_string();
        let tx = self.conn.unchecked_transaction()?;

        let phase = tx
            .query_row(
                "SELECT phase FROM rooms WHERE id = ?1",
                params![room_id],
                |row| parse_phase(&row.get::<_, String>(0)?),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("room {}", decision.room_id)))?;

        if phase == Phase::Results {
            return Ok(FinalizeOutcome::AlreadyFinal);
        }
        if !phase.is_in_flight() {
            return Ok(FinalizeOutcome::NotEligible(phase));
        }

        let votes: i64 = tx.query_row(
            "SELECT COUNT(*) FROM votes WHERE room_id = ?1",
            params![room_id],
            |row| row.get(0),
        )?;
        if votes as usize != expected_votes {
            return Ok(FinalizeOutcome::Stale);
        }

        if let Some(option_id) = decision.winning_option_id {
            let option_room: Option<String> = tx
                .query_row(
                    "SELECT room_id FROM options WHERE id = ?1",
                    params![option_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            if option_room.as_deref() != Some(room_id.as_str()) {
                return Err(Error::NotFound(format!(
                    "option {option_id} in room {room_id}"
                )));
            }
        }

        let changed = tx.execute(
            "UPDATE rooms SET phase = ?1 WHERE id = ?2 AND phase = ?3",
            params![Phase::Results.as_str(), room_id, phase.as_str()],
        )?;
        if changed != 1 {
            return Ok(FinalizeOutcome::Stale);
        }

        tx.execute(
            "INSERT INTO decisions (id, room_id, winning_option_id, tie_breaker_used, tie_breaker_type, decided_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                decision.id.to_string(),
                room_id,
                decision.winning_option_id.map(|id| id.to_string()),
                decision.tie_breaker_used as i32,
                decision.tie_breaker_type.map(|t| t.as_str()),
                decision.decided_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::from_insert(e, "decision"))?;

        tx.commit()?;
        info!(from = %phase, votes, "Room finalized");
        Ok(FinalizeOutcome::Finalized)
    }

    fn map_decision(row: &Row<'_>) -> rusqlite::Result<Decision> {
        Ok(Decision {
            id: parse_uuid(&row.get::<_, String>(0)?)?,
            room_id: parse_uuid(&row.get::<_, String>(1)?)?,
            winning_option_id: parse_uuid_opt(row.get::<_, Option<String>>(2)?)?,
            tie_breaker_used: row.get::<_, i32>(3)? != 0,
            tie_breaker_type: parse_decision_type_opt(row.get::<_, Option<String>>(4)?)?,
            decided_at: parse_datetime(&row.get::<_, String>(5)?)?,
        })
    }
}
