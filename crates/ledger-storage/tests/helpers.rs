#![allow(dead_code)]

use std::{fs, sync::Arc};

use ledger_core::{Blockchain, ChainConfig};
use ledger_storage::SledStore;
use tempfile::{tempdir, TempDir};

pub fn create_temp_store() -> (TempDir, SledStore) {
    // Create a temporary directory for the sled database
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().to_path_buf();
    (
        temp_dir,
        SledStore::open(db_path).expect("Failed to open SledStore"),
    )
}

pub fn create_temp_chain(difficulty: usize) -> (TempDir, Blockchain<SledStore>) {
    let (temp_dir, store) = create_temp_store();
    let chain = Blockchain::new(
        Arc::new(store),
        ChainConfig::default().with_difficulty(difficulty),
    )
    .expect("Invalid chain config");
    (temp_dir, chain)
}

pub fn teardown_store(temp_dir: TempDir, store: &SledStore) {
    let db_path = temp_dir.path().to_path_buf();
    store.clear().expect("Failed to clear the store");
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&db_path);
    // Verify the directory is removed
    assert!(!db_path.exists(), "Database directory should be removed");
}
