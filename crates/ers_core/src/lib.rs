//! # ERS Core
//!
//! An embedded entity-relationship storage: typed entities carrying
//! properties, blobs and named links, stored in one of three interchangeable
//! backends.
//!
//! - `ram`: in-memory versioned containers with optimistic commits, frozen
//!   snapshots and snapshot dumps
//! - `sql`: one SQLite table per type, property, blob and link
//! - `kv`: named maps of any [`ers_kv`] engine (LMDB, redb, RocksDB, memory)
//!
//! The [`typed`] module layers compile-time checked entity types, property
//! descriptors and links over the untyped API.
//!
//! All backends pass the same conformance suite. Property values are byte
//! strings compared as unsigned bytes; [`ers_codec`] provides the
//! order-preserving encodings that make range queries meaningful.
//!
//! ## Quick Start
//!
//! ```rust
//! use ers_core::{EntityRelationshipStorage, ValueExt};
//!
//! let storage = EntityRelationshipStorage::ram();
//! storage.transactional(false, |txn| {
//!     let group = txn.new_entity("Group")?;
//!     for i in 0..3i32 {
//!         let user = txn.new_entity("User")?;
//!         user.set("login", format!("user{i}"))?;
//!         user.set("age", (20 + i).compressed())?;
//!         group.add_link("members", &user)?;
//!     }
//!     Ok(())
//! })?;
//!
//! storage.transactional(true, |txn| {
//!     let adults = txn.find_gt("User", "age", 20i32.compressed())?;
//!     assert_eq!(adults.size()?, 2);
//!     if let Some(group) = txn.all("Group")?.first()? {
//!         assert_eq!(group.get_links("members")?.size()?, 3);
//!     }
//!     Ok(())
//! })?;
//! # Ok::<(), ers_core::ErsError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod dir;
mod entity;
mod error;
mod iterable;
mod kv;
mod ram;
mod registry;
mod schema;
mod settings;
mod sql;
mod storage;
mod transaction;
pub mod typed;
mod types;

pub use backend::{BackendTransaction, StorageBackend};
pub use dir::{write_atomically, StorageDir};
pub use entity::Entity;
pub use error::{ErsError, ErsResult};
pub use iterable::EntityIterable;
pub use kv::KV_BACKEND_ID;
pub use ram::RAM_BACKEND_ID;
pub use registry::{BackendConstructor, BackendRegistry};
pub use settings::{ErsSettings, KvErsSettings, RamErsSettings, SqlErsSettings};
pub use sql::SQL_BACKEND_ID;
pub use storage::{EntityRelationshipStorage, DEFAULT_OPTIMISTIC_ATTEMPTS};
pub use transaction::Transaction;
pub use types::{AttributeKind, EntityId, FindOption};

pub use ers_codec::{Binding, PropertyValue, Value, ValueExt};
pub use ers_kv::{KvEngine, KvSettings};
