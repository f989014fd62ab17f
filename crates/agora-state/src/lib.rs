//! Durable state for the forum ledger.
//!
//! The consensus core only talks to [`ForumStore`]; every mutation goes
//! through a [`WriteSet`] that the backend applies atomically and durably.

pub mod memory_store;
#[cfg(feature = "rocksdb")]
pub mod rocks_store;
pub mod store;

pub use memory_store::MemoryStore;
#[cfg(feature = "rocksdb")]
pub use rocks_store::{RocksDbConfig, RocksStore};
pub use store::{ForumStore, StoreError, WriteOp, WriteSet};
