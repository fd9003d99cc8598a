use crate::constants::NONCES_PER_CANCEL_CHECK;
use crate::Block;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How the leading run of `'0'` hex characters is matched against the
/// difficulty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyRule {
    /// The run must be exactly `difficulty` long: the next character is not `'0'`.
    #[default]
    Exact,
    /// The run must be at least `difficulty` long.
    AtLeast,
}

impl DifficultyRule {
    pub fn accepts(self, hash_hex: &str, difficulty: usize) -> bool {
        let zeros = count_leading_zero_chars(hash_hex);
        match self {
            DifficultyRule::Exact => zeros == difficulty,
            DifficultyRule::AtLeast => zeros >= difficulty,
        }
    }
}

pub fn count_leading_zero_chars(hash_hex: &str) -> usize {
    hash_hex.bytes().take_while(|b| *b == b'0').count()
}

/// Result of a nonce search.
#[derive(Debug)]
pub enum MineResult {
    Found(Block),
    Cancelled,
}

/// Search nonces from 0 upwards until the block hash satisfies `rule` at
/// `difficulty`, then seal the block with that nonce.
///
/// CPU bound; run it on a blocking thread. The token is polled every
/// [`NONCES_PER_CANCEL_CHECK`] attempts.
pub fn mine_block(
    mut block: Block,
    difficulty: usize,
    rule: DifficultyRule,
    cancel: &CancellationToken,
) -> MineResult {
    let start = Instant::now();
    block.nonce = 0;
    loop {
        if block.nonce % NONCES_PER_CANCEL_CHECK == 0 && cancel.is_cancelled() {
            debug!(
                height = block.height,
                tried = block.nonce,
                "nonce search cancelled"
            );
            return MineResult::Cancelled;
        }

        let hash = block.compute_hash();
        if rule.accepts(&hash, difficulty) {
            info!(
                "Mined block {} with nonce {} and hash {} in {:?}",
                block.height,
                block.nonce,
                hash,
                start.elapsed()
            );
            block.hash = hash;
            return MineResult::Found(block);
        }
        block.nonce = block.nonce.wrapping_add(1);
    }
}
