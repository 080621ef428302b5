//! Room model - a single decision session

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle phases in order. `Results` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Lobby,
    Submission,
    Voting,
    Results,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Lobby => "lobby",
            Phase::Submission => "submission",
            Phase::Voting => "voting",
            Phase::Results => "results",
        }
    }

    pub fn parse(s: &str) -> Option<Phase> {
        match s {
            "lobby" => Some(Phase::Lobby),
            "submission" => Some(Phase::Submission),
            "voting" => Some(Phase::Voting),
            "results" => Some(Phase::Results),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == Phase::Results
    }

    /// Phases in which the room's deadline forces results
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Phase::Submission | Phase::Voting)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a tie is broken. Each variant carries its natural arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionType {
    Dice,
    Coin,
    Spinner,
}

impl DecisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::Dice => "dice",
            DecisionType::Coin => "coin",
            DecisionType::Spinner => "spinner",
        }
    }

    pub fn parse(s: &str) -> Option<DecisionType> {
        match s {
            "dice" => Some(DecisionType::Dice),
            "coin" => Some(DecisionType::Coin),
            "spinner" => Some(DecisionType::Spinner),
            _ => None,
        }
    }

    /// Number of outcomes the device can show, `None` for unbounded (spinner sectors)
    pub fn arity(&self) -> Option<usize> {
        match self {
            DecisionType::Dice => Some(6),
            DecisionType::Coin => Some(2),
            DecisionType::Spinner => None,
        }
    }

    /// Can this device represent a draw among `n` candidates directly?
    pub fn covers(&self, n: usize) -> bool {
        self.arity().map_or(true, |max| n <= max)
    }
}

impl std::fmt::Display for DecisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A decision room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub decision_type: DecisionType,
    pub phase: Phase,
    pub allow_everyone_to_submit: bool,
    pub hide_results_until_end: bool,
    pub max_participants: Option<u32>,
    pub expires_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// Build a room from a validated draft. `default_duration` applies when
    /// the draft does not set its own lifetime.
    pub fn from_draft(
        draft: &RoomDraft,
        code: String,
        created_by: Uuid,
        default_duration: Duration,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            code,
            name: draft.name.trim().to_string(),
            description: draft.description.clone(),
            decision_type: draft.decision_type,
            phase: if draft.open_submission {
                Phase::Submission
            } else {
                Phase::Lobby
            },
            allow_everyone_to_submit: draft.allow_everyone_to_submit,
            hide_results_until_end: draft.hide_results_until_end,
            max_participants: draft.max_participants,
            expires_at: created_at + draft.duration.unwrap_or(default_duration),
            created_by,
            created_at,
        }
    }

    pub fn is_creator(&self, user_id: Uuid) -> bool {
        self.created_by == user_id
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether this user may add options
    pub fn accepts_submissions_from(&self, user_id: Uuid) -> bool {
        self.allow_everyone_to_submit || self.is_creator(user_id)
    }

    /// Votes are hidden mid-flight when the room asks for suspense
    pub fn votes_visible(&self) -> bool {
        !self.hide_results_until_end || self.phase.is_terminal()
    }
}

/// Parameters for creating a room
#[derive(Debug, Clone)]
pub struct RoomDraft {
    pub name: String,
    pub description: Option<String>,
    pub decision_type: DecisionType,
    pub allow_everyone_to_submit: bool,
    pub hide_results_until_end: bool,
    pub max_participants: Option<u32>,
    pub duration: Option<Duration>,
    /// Skip the lobby and open submissions immediately
    pub open_submission: bool,
}

impl RoomDraft {
    pub fn new(name: impl Into<String>, decision_type: DecisionType) -> Self {
        Self {
            name: name.into(),
            description: None,
            decision_type,
            allow_everyone_to_submit: true,
            hide_results_until_end: false,
            max_participants: None,
            duration: None,
            open_submission: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn creator_only_submissions(mut self) -> Self {
        self.allow_everyone_to_submit = false;
        self
    }

    pub fn hide_results(mut self) -> Self {
        self.hide_results_until_end = true;
        self
    }

    pub fn with_max_participants(mut self, max: u32) -> Self {
        self.max_participants = Some(max);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn open_submission(mut self) -> Self {
        self.open_submission = true;
        self
    }
}
