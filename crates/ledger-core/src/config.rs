//! Chain configuration.

use crate::constants::{DEFAULT_DIFFICULTY, MAX_DIFFICULTY};
use crate::error::{ChainError, Result};
use crate::pow::DifficultyRule;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Required number of leading `'0'` hex characters in a mined hash.
    pub difficulty: usize,
    pub difficulty_rule: DifficultyRule,
    /// Upper bound on a single nonce search. `None` searches until found.
    pub mining_timeout_secs: Option<u64>,
    /// Deadline for `validate_chain` to join every per-block check.
    pub validation_timeout_secs: Option<u64>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            difficulty_rule: DifficultyRule::default(),
            mining_timeout_secs: None,
            validation_timeout_secs: None,
        }
    }
}

impl ChainConfig {
    pub fn with_difficulty(mut self, difficulty: usize) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn mining_timeout(&self) -> Option<Duration> {
        self.mining_timeout_secs.map(Duration::from_secs)
    }

    pub fn validation_timeout(&self) -> Option<Duration> {
        self.validation_timeout_secs.map(Duration::from_secs)
    }

    /// Reject difficulties no hash can satisfy. `Exact` needs a non-zero
    /// character after the run, so it tops out one below the hash length.
    pub fn validate(&self) -> Result<()> {
        let limit = match self.difficulty_rule {
            DifficultyRule::Exact => MAX_DIFFICULTY - 1,
            DifficultyRule::AtLeast => MAX_DIFFICULTY,
        };
        if self.difficulty > limit {
            return Err(ChainError::InvalidConfig(format!(
                "difficulty {} is above {} for the {:?} rule",
                self.difficulty, limit, self.difficulty_rule
            )));
        }
        Ok(())
    }
}
