//! # ERS Key-Value Substrate
//!
//! A minimal transactional key-value abstraction: named maps, ordered
//! byte-string keys, cursors, and read-only or read-write transactions.
//!
//! ## Engines
//!
//! - [`MemoryKvStorage`] - in-process maps, for tests and scratch storages
//! - [`LmdbKvStorage`] - memory-mapped copy-on-write B-tree (LMDB via `heed`)
//! - [`RedbKvStorage`] - B-tree with MVCC snapshots (`redb`)
//! - `RocksKvStorage` - LSM tree (`rocksdb`, behind the `rocksdb` feature)
//!
//! Engines only implement [`KvTransaction`]; cursors and scans are derived
//! from [`KvTransaction::seek`].
//!
//! ## Example
//!
//! ```rust
//! use ers_kv::{Cursor, KeyValueStorage, MemoryKvStorage};
//!
//! let storage = MemoryKvStorage::new();
//! let mut txn = storage.begin_transaction().unwrap();
//! let map = txn.named_map("ids", true).unwrap().unwrap();
//! txn.put(&map, b"b", b"2").unwrap();
//! txn.put(&map, b"a", b"1").unwrap();
//!
//! let mut cursor = txn.navigate_to(&map, None).unwrap();
//! assert!(cursor.move_next().unwrap());
//! assert_eq!(cursor.key().unwrap(), b"a");
//! drop(cursor);
//! txn.commit().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod engine;
mod error;
mod lmdb;
mod memory;
mod redb_engine;
#[cfg(feature = "rocksdb")]
mod rocks;
mod storage;

pub use cursor::{Cursor, Scan, SeekCursor};
pub use engine::{
    open_kv_storage, KvEngine, KvSettings, LMDB_ENGINE_ID, MEMORY_ENGINE_ID, REDB_ENGINE_ID,
    ROCKSDB_ENGINE_ID,
};
pub use error::{KvError, KvResult};
pub use lmdb::LmdbKvStorage;
pub use memory::{MemoryKvStorage, MemoryKvTransaction};
pub use redb_engine::{RedbKvStorage, REDB_FILE_NAME};
#[cfg(feature = "rocksdb")]
pub use rocks::RocksKvStorage;
pub use storage::{Direction, Entry, KeyValueStorage, KvTransaction, NamedMap};
