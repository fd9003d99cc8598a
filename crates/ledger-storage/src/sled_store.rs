use async_trait::async_trait;
use ledger_core::{KeyValueStore, StoreError};
use sled::{Db, Tree};
use std::path::Path;
use tokio::task;
use tracing::{debug, info};

const TREE_BLOCKS: &str = "blocks";

/// Sled-backed store. Keys are big-endian heights so the tree iterates in
/// chain order.
#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
    let path = path.as_ref();
    let db = sled::open(path).map_err(io_error)?;
    let blocks = db.open_tree(TREE_BLOCKS).map_err(io_error)?;
    info!(path = %path.display(), "sled store opened");
    Ok(Self { db, blocks })
  }

  /// Drop every stored block.
  pub fn clear(&self) -> Result<(), StoreError> {
    self.blocks.clear().map_err(io_error)?;
    self.db.flush().map_err(io_error)?;
    Ok(())
  }

  /// Flush synchronously, for callers about to drop the store.
  pub fn close(&self) -> Result<(), StoreError> {
    self.db.flush().map_err(io_error)?;
    debug!("sled store flushed on close");
    Ok(())
  }
}

#[async_trait]
impl KeyValueStore for SledStore {
  /// Heights are dense from 0, so the count is one past the last key.
  /// `Tree::len` would walk the whole tree.
  async fn count(&self) -> Result<u64, StoreError> {
    let blocks = self.blocks.clone();
    task::spawn_blocking(move || match blocks.last().map_err(io_error)? {
      Some((key, _)) => Ok(decode_height(&key)? + 1),
      None => Ok(0),
    })
    .await
    .map_err(join_error)?
  }

  async fn get(&self, height: u64) -> Result<Vec<u8>, StoreError> {
    let blocks = self.blocks.clone();
    task::spawn_blocking(move || {
      blocks
        .get(height.to_be_bytes())
        .map_err(io_error)?
        .map(|ivec| ivec.to_vec())
        .ok_or(StoreError::NotFound(height))
    })
    .await
    .map_err(join_error)?
  }

  async fn put(&self, height: u64, value: Vec<u8>) -> Result<(), StoreError> {
    let blocks = self.blocks.clone();
    // Blocking sled I/O stays off the async executor.
    task::spawn_blocking(move || {
      blocks.insert(height.to_be_bytes(), value).map_err(io_error)?;
      Ok(())
    })
    .await
    .map_err(join_error)?
  }

  async fn flush(&self) -> Result<(), StoreError> {
    let db = self.db.clone();
    task::spawn_blocking(move || {
      db.flush().map_err(io_error)?;
      Ok(())
    })
    .await
    .map_err(join_error)?
  }
}

fn decode_height(key: &[u8]) -> Result<u64, StoreError> {
  let bytes: [u8; 8] = key
    .try_into()
    .map_err(|_| StoreError::Io(format!("malformed height key of {} bytes", key.len())))?;
  Ok(u64::from_be_bytes(bytes))
}

fn io_error(err: sled::Error) -> StoreError {
  StoreError::Io(err.to_string())
}

fn join_error(err: task::JoinError) -> StoreError {
  StoreError::Io(format!("storage worker failed: {err}"))
}
