//! Append-only ledger with hash chaining and proof-of-work admission.
//!
//! Blocks are persisted through a [`store::KeyValueStore`]; the
//! [`chain::Blockchain`] never keeps its own copy of the chain.

pub mod block;
pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod pow;
pub mod store;

pub use block::Block;
pub use chain::{BlockValidation, Blockchain};
pub use config::ChainConfig;
pub use error::{ChainError, Result, StoreError};
pub use pow::DifficultyRule;
pub use store::{KeyValueStore, MemoryStore};
pub use tokio_util::sync::CancellationToken;
