use crate::constants::GENESIS_BODY;
use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// One ledger entry.
///
/// Field order here is the stored JSON field order. `hash` comes last and is
/// never part of its own hash input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub previous_hash: String,
    pub timestamp: u64,
    pub body: String,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    /// An unsealed candidate stamped with the current time.
    pub fn new(height: u64, previous_hash: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            height,
            previous_hash: previous_hash.into(),
            timestamp: now_secs(),
            body: body.into(),
            nonce: 0,
            hash: String::new(),
        }
    }

    /// The sealed height-0 block. No proof-of-work is applied to it.
    pub fn genesis() -> Self {
        let mut block = Self::new(0, "", GENESIS_BODY);
        block.seal();
        block
    }

    /// Canonical hash input: height, previous_hash, timestamp, body, nonce.
    /// Integers are little-endian u64; strings are length-prefixed.
    pub fn hash_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(
            8 + 8 + self.previous_hash.len() + 8 + 8 + self.body.len() + 8,
        );
        bytes.extend_from_slice(&self.height.to_le_bytes());
        push_str(&mut bytes, &self.previous_hash);
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        push_str(&mut bytes, &self.body);
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    /// Hex SHA-256 of [`Block::hash_bytes`]. Ignores the stored `hash`.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.hash_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn seal(&mut self) {
        self.hash = self.compute_hash();
    }

    /// Stored value encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ChainError::Corrupt {
            height: self.height,
            reason: e.to_string(),
        })
    }

    /// Decode a stored value read from key `height`.
    pub fn from_bytes(height: u64, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| ChainError::Corrupt {
            height,
            reason: e.to_string(),
        })
    }
}

fn push_str(bytes: &mut Vec<u8>, s: &str) {
    bytes.extend_from_slice(&(s.len() as u64).to_le_bytes());
    bytes.extend_from_slice(s.as_bytes());
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
