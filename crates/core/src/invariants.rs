//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use uuid::Uuid;

use crate::models::{Decision, Participant, Phase, Room, RoomOption};

/// Validate that a Room's state is internally consistent
pub fn assert_room_invariants(room: &Room) {
    debug_assert!(
        !room.name.trim().is_empty(),
        "Room {} has empty name",
        room.id
    );

    debug_assert!(
        room.expires_at >= room.created_at,
        "Room {} expires before it was created",
        room.id
    );

    debug_assert!(
        room.max_participants != Some(0),
        "Room {} has a zero participant cap",
        room.id
    );
}

/// Validate a phase move. Phases never go backwards.
pub fn assert_phase_advance(room_id: Uuid, from: Phase, to: Phase) {
    debug_assert!(
        from < to,
        "Room {} moving from {} to {} is not forward",
        room_id,
        from,
        to
    );
}

/// Validate a participant list against the room's cap
pub fn assert_participant_invariants(participants: &[Participant], room: &Room) {
    if let Some(max) = room.max_participants {
        debug_assert!(
            participants.len() <= max as usize,
            "Room {} has {} participants over a cap of {}",
            room.id,
            participants.len(),
            max
        );
    }

    // One row per user
    for (i, p) in participants.iter().enumerate() {
        debug_assert!(
            participants[..i].iter().all(|q| q.user_id != p.user_id),
            "Room {} lists user {} twice",
            room.id,
            p.user_id
        );
    }
}

/// Validate a freshly written decision
pub fn assert_decision_invariants(decision: &Decision, room: &Room, options: &[RoomOption]) {
    debug_assert!(
        decision.room_id == room.id,
        "Decision {} belongs to room {}, not {}",
        decision.id,
        decision.room_id,
        room.id
    );

    if let Some(winner) = decision.winning_option_id {
        debug_assert!(
            options.iter().any(|o| o.id == winner && o.room_id == room.id),
            "Decision {} names option {} from another room",
            decision.id,
            winner
        );
    }

    debug_assert!(
        decision.tie_breaker_used == decision.tie_breaker_type.is_some(),
        "Decision {} tie-break flag and type disagree",
        decision.id
    );

    if decision.tie_breaker_used {
        debug_assert!(
            decision.tie_breaker_type == Some(room.decision_type),
            "Decision {} broke a tie with {:?} in a {} room",
            decision.id,
            decision.tie_breaker_type,
            room.decision_type
        );
    }
}
