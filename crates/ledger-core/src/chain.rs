//! The append / retrieve / validate protocol over a [`KeyValueStore`].

use crate::config::ChainConfig;
use crate::error::{ChainError, Result};
use crate::pow::{self, MineResult};
use crate::store::KeyValueStore;
use crate::Block;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of re-deriving one stored block's hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockValidation {
    pub is_valid: bool,
    /// The block as stored, including its original hash.
    pub block: Block,
}

/// Chain façade that delegates persistence to a [`KeyValueStore`].
///
/// The store is the only copy of the chain. Clones share the store and the
/// append lock, so appends through any clone are serialized.
pub struct Blockchain<S: KeyValueStore> {
    store: Arc<S>,
    config: ChainConfig,
    append_lock: Arc<Mutex<()>>,
}

impl<S: KeyValueStore> Clone for Blockchain<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            append_lock: Arc::clone(&self.append_lock),
        }
    }
}

impl<S: KeyValueStore + 'static> Blockchain<S> {
    /// Fails with [`ChainError::InvalidConfig`] when the difficulty can
    /// never be mined.
    pub fn new(store: Arc<S>, config: ChainConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            append_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Build a chain and make sure its genesis block exists.
    pub async fn open(store: Arc<S>, config: ChainConfig) -> Result<Self> {
        let chain = Self::new(store, config)?;
        chain.generate_genesis_block().await?;
        Ok(chain)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Persist the genesis block if the store is empty. Idempotent; returns
    /// the new block only when one was written.
    pub async fn generate_genesis_block(&self) -> Result<Option<Block>> {
        let _append = self.append_lock.lock().await;
        if self.store.count().await? > 0 {
            debug!("genesis block already present");
            return Ok(None);
        }

        let genesis = Block::genesis();
        self.store.put(0, genesis.to_bytes()?).await?;
        self.store.flush().await?;
        info!(hash = %genesis.hash, "created genesis block");
        Ok(Some(genesis))
    }

    /// Number of persisted blocks. This is a count, not an index: the last
    /// block lives at [`Blockchain::last_height`].
    pub async fn block_count(&self) -> Result<u64> {
        Ok(self.store.count().await?)
    }

    /// Height of the newest block, `None` for an empty chain.
    pub async fn last_height(&self) -> Result<Option<u64>> {
        Ok(self.block_count().await?.checked_sub(1))
    }

    pub async fn tip(&self) -> Result<Option<Block>> {
        match self.last_height().await? {
            Some(height) => self.get_block(height).await.map(Some),
            None => Ok(None),
        }
    }

    /// Mine `body` onto the chain and return its height.
    pub async fn add_block(&self, body: impl Into<String>) -> Result<u64> {
        self.add_block_with_cancel(body, CancellationToken::new()).await
    }

    /// Like [`Blockchain::add_block`], but the nonce search stops with
    /// [`ChainError::Cancelled`] once `cancel` fires. Nothing is written
    /// unless the search succeeds.
    pub async fn add_block_with_cancel(
        &self,
        body: impl Into<String>,
        cancel: CancellationToken,
    ) -> Result<u64> {
        let _append = self.append_lock.lock().await;

        let height = self.store.count().await?;
        let previous_hash = match height.checked_sub(1) {
            Some(prev) => self.get_block(prev).await?.hash,
            None => String::new(),
        };
        let candidate = Block::new(height, previous_hash, body);

        let sealed = self.mine(candidate, cancel).await?;
        self.store.put(height, sealed.to_bytes()?).await?;
        self.store.flush().await?;
        debug!(height, hash = %sealed.hash, "block committed");
        Ok(height)
    }

    async fn mine(&self, candidate: Block, cancel: CancellationToken) -> Result<Block> {
        let difficulty = self.config.difficulty;
        let rule = self.config.difficulty_rule;
        // Stops the worker if this future is dropped mid-search.
        let worker_token = cancel.child_token();
        let _stop_worker = worker_token.clone().drop_guard();

        let search = task::spawn_blocking(move || {
            pow::mine_block(candidate, difficulty, rule, &worker_token)
        });
        let joined = match self.config.mining_timeout() {
            Some(limit) => match timeout(limit, search).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(?limit, difficulty, "nonce search timed out");
                    return Err(ChainError::Timeout(limit));
                }
            },
            None => search.await,
        };

        match joined.map_err(join_failure)? {
            MineResult::Found(block) => Ok(block),
            MineResult::Cancelled => Err(ChainError::Cancelled),
        }
    }

    pub async fn get_block(&self, height: u64) -> Result<Block> {
        let bytes = self.store.get(height).await?;
        Block::from_bytes(height, &bytes)
    }

    /// Recompute the hash of the block at `height` with its hash blanked and
    /// compare it to the stored one. A mismatch is reported, not raised.
    pub async fn validate_block(&self, height: u64) -> Result<BlockValidation> {
        let mut block = self.get_block(height).await?;
        let stored_hash = std::mem::take(&mut block.hash);
        let recomputed = block.compute_hash();
        block.hash = stored_hash;

        let is_valid = recomputed == block.hash && block.height == height;
        if !is_valid {
            warn!(
                height,
                stored = %block.hash,
                %recomputed,
                "block failed validation"
            );
        }
        Ok(BlockValidation { is_valid, block })
    }

    /// Check every persisted block and every link between neighbours.
    /// Returns the sorted heights that failed; empty means the chain is valid.
    ///
    /// Bounded by `validation_timeout_secs` when configured.
    pub async fn validate_chain(&self) -> Result<Vec<u64>> {
        match self.config.validation_timeout() {
            Some(deadline) => self.validate_chain_with_deadline(deadline).await,
            None => self.collect_invalid_heights().await,
        }
    }

    /// [`Blockchain::validate_chain`] that gives up with
    /// [`ChainError::Timeout`] if the checks have not all finished by
    /// `deadline`. Outstanding checks are aborted.
    pub async fn validate_chain_with_deadline(&self, deadline: Duration) -> Result<Vec<u64>> {
        timeout(deadline, self.collect_invalid_heights())
            .await
            .map_err(|_| {
                warn!(?deadline, "chain validation did not finish in time");
                ChainError::Timeout(deadline)
            })?
    }

    async fn collect_invalid_heights(&self) -> Result<Vec<u64>> {
        let count = self.block_count().await?;
        let mut checks = JoinSet::new();
        for height in 0..count {
            let chain = self.clone();
            checks.spawn(async move {
                let ok = chain.check_height(height, count).await?;
                Ok::<_, ChainError>((height, ok))
            });
        }

        let mut invalid = BTreeSet::new();
        while let Some(joined) = checks.join_next().await {
            let (height, ok) = joined.map_err(join_failure)??;
            if !ok {
                invalid.insert(height);
            }
        }

        if invalid.is_empty() {
            info!(blocks = count, "chain is valid");
        } else {
            warn!(blocks = count, ?invalid, "chain is not valid");
        }
        Ok(invalid.into_iter().collect())
    }

    /// Block `height` is sound and, if it has a successor, the successor
    /// points back at its hash.
    async fn check_height(&self, height: u64, count: u64) -> Result<bool> {
        let validation = self.validate_block(height).await?;
        let mut ok = validation.is_valid;

        if height + 1 < count {
            let next = self.get_block(height + 1).await?;
            if next.previous_hash != validation.block.hash {
                warn!(
                    height,
                    hash = %validation.block.hash,
                    next_previous_hash = %next.previous_hash,
                    "broken link to next block"
                );
                ok = false;
            }
        }
        Ok(ok)
    }
}

fn join_failure(err: JoinError) -> ChainError {
    if err.is_panic() {
        std::panic::resume_unwind(err.into_panic());
    }
    ChainError::Cancelled
}
