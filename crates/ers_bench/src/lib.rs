//! Benchmark utilities shared by the `benches/` targets.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use ers_core::{
    EntityRelationshipStorage, ErsResult, KvEngine, KvErsSettings, SqlErsSettings, ValueExt,
};
use rand::Rng;
use tempfile::TempDir;

/// Type name used by the benchmark entities.
pub const ITEM_TYPE: &str = "Item";

/// Generate random data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Backends exercised by the storage benchmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchBackend {
    /// In-memory backend.
    Ram,
    /// Relational backend in a temporary directory.
    Sql,
    /// Key-value backend on LMDB in a temporary directory.
    KvLmdb,
}

impl BenchBackend {
    /// All benchmarked backends.
    pub const ALL: [BenchBackend; 3] = [BenchBackend::Ram, BenchBackend::Sql, BenchBackend::KvLmdb];

    /// Label used in benchmark ids.
    pub const fn label(self) -> &'static str {
        match self {
            BenchBackend::Ram => "ram",
            BenchBackend::Sql => "sql",
            BenchBackend::KvLmdb => "kv-lmdb",
        }
    }

    /// Opens a fresh storage. The directory must outlive the storage.
    pub fn open(self) -> (EntityRelationshipStorage, Option<TempDir>) {
        match self {
            BenchBackend::Ram => (EntityRelationshipStorage::ram(), None),
            BenchBackend::Sql => {
                let dir = tempfile::tempdir().unwrap();
                let storage =
                    EntityRelationshipStorage::sql(Some(dir.path()), &SqlErsSettings::default())
                        .unwrap();
                (storage, Some(dir))
            }
            BenchBackend::KvLmdb => {
                let dir = tempfile::tempdir().unwrap();
                let settings = KvErsSettings::new(KvEngine::Lmdb).lmdb_map_size(256 << 20);
                let storage = EntityRelationshipStorage::kv(Some(dir.path()), &settings).unwrap();
                (storage, Some(dir))
            }
        }
    }
}

/// Creates `count` items with a compressed `rank`, a `name` and a
/// `payload` blob of `payload_size` random bytes.
pub fn populate(
    storage: &EntityRelationshipStorage,
    count: usize,
    payload_size: usize,
) -> ErsResult<()> {
    storage.transactional(false, |txn| {
        for i in 0..count {
            let item = txn.new_entity(ITEM_TYPE)?;
            item.set("rank", (i as i64).compressed())?;
            item.set("name", format!("item{i}"))?;
            item.set_raw_blob("payload", Some(random_data(payload_size).as_slice()))?;
        }
        Ok(())
    })
}
