//! Tie-break resolution
//!
//! A tie is resolved by drawing one index uniformly over the tied options.
//! The decision type only decides how that draw is presented (die face, coin
//! side or spinner sector); it never changes which option wins.

use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::DecisionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoinSide {
    Heads,
    Tails,
}

/// What the presentation layer should animate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Draw {
    /// 1..=6
    DieFace(u8),
    Coin(CoinSide),
    /// Sector `index` of a wheel cut into `sectors` equal parts
    Sector { index: usize, sectors: usize },
}

impl Draw {
    /// Map a drawn index onto the device. A tied set larger than the device
    /// can show falls back to spinner sectors so every option stays reachable.
    pub fn for_index(kind: DecisionType, index: usize, tied: usize) -> Self {
        if !kind.covers(tied) {
            return Draw::Sector {
                index,
                sectors: tied,
            };
        }
        match kind {
            DecisionType::Dice => Draw::DieFace(index as u8 + 1),
            DecisionType::Coin if index == 0 => Draw::Coin(CoinSide::Heads),
            DecisionType::Coin => Draw::Coin(CoinSide::Tails),
            DecisionType::Spinner => Draw::Sector {
                index,
                sectors: tied,
            },
        }
    }
}

/// Result of a tie-break
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieBreak {
    pub winner: Uuid,
    /// Always the room's decision type, even when the draw fell back to sectors
    pub kind: DecisionType,
    pub draw: Draw,
}

/// Owns the only randomness source used to pick winners
pub struct TieBreaker {
    rng: Mutex<StdRng>,
}

impl TieBreaker {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic breaker for tests and replays
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Pick one of `tied` uniformly at random
    #[instrument(skip(self, tied), fields(tied = tied.len(), kind = %kind))]
    pub fn resolve(&self, tied: &[Uuid], kind: DecisionType) -> Result<TieBreak> {
        if tied.is_empty() {
            return Err(Error::Validation("no tied options to choose from".into()));
        }

        let index = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            rng.gen_range(0..tied.len() as u32) as usize
        };
        let draw = Draw::for_index(kind, index, tied.len());
        debug!(index, ?draw, "Tie broken");

        Ok(TieBreak {
            winner: tied[index],
            kind,
            draw,
        })
    }
}

impl Default for TieBreaker {
    fn default() -> Self {
        Self::from_entropy()
    }
}
