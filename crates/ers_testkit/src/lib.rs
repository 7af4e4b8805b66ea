//! # ERS Testkit
//!
//! Test utilities shared by the ERS crates:
//! - [`fixtures`]: a storage for every backend and key-value engine
//! - [`scenarios`]: populated storages with known query answers
//! - [`generators`]: proptest strategies for values and operation scripts
//!
//! The cross-backend conformance suite lives in this crate's `tests/`
//! directory and runs every assertion against every [`StorageKind`].
//!
//! ## Usage
//!
//! ```rust
//! use ers_testkit::{for_each_storage, scenarios};
//!
//! for_each_storage(|kind, storage| {
//!     scenarios::populate_users(storage, 10).unwrap();
//!     let users = storage
//!         .transactional(true, |txn| txn.all("User")?.size())
//!         .unwrap();
//!     assert_eq!(users, 10, "{kind}");
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod scenarios;

pub use fixtures::{for_each_storage, StorageKind, TestStorage};
