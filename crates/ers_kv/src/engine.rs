//! Engine selection.

use crate::error::{KvError, KvResult};
use crate::lmdb::LmdbKvStorage;
use crate::memory::MemoryKvStorage;
use crate::redb_engine::RedbKvStorage;
use crate::storage::KeyValueStorage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Engine id of [`MemoryKvStorage`].
pub const MEMORY_ENGINE_ID: &str = "memory";
/// Engine id of the LMDB engine.
pub const LMDB_ENGINE_ID: &str = "lmdb";
/// Engine id of the redb engine.
pub const REDB_ENGINE_ID: &str = "redb";
/// Engine id of the RocksDB engine.
pub const ROCKSDB_ENGINE_ID: &str = "rocksdb";

/// The key-value engines this crate knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KvEngine {
    /// In-process maps, nothing persisted.
    #[default]
    Memory,
    /// Memory-mapped copy-on-write B-tree.
    Lmdb,
    /// B-tree with its own MVCC model.
    Redb,
    /// LSM tree. Requires the `rocksdb` feature.
    Rocksdb,
}

impl KvEngine {
    /// All engines, in declaration order.
    pub const ALL: [KvEngine; 4] = [
        KvEngine::Memory,
        KvEngine::Lmdb,
        KvEngine::Redb,
        KvEngine::Rocksdb,
    ];

    /// Stable string id.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            KvEngine::Memory => MEMORY_ENGINE_ID,
            KvEngine::Lmdb => LMDB_ENGINE_ID,
            KvEngine::Redb => REDB_ENGINE_ID,
            KvEngine::Rocksdb => ROCKSDB_ENGINE_ID,
        }
    }

    /// Whether the engine writes to disk.
    #[must_use]
    pub const fn is_persistent(self) -> bool {
        !matches!(self, KvEngine::Memory)
    }

    /// Whether the engine was compiled into this build.
    #[must_use]
    pub const fn is_available(self) -> bool {
        match self {
            KvEngine::Rocksdb => cfg!(feature = "rocksdb"),
            _ => true,
        }
    }
}

impl fmt::Display for KvEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for KvEngine {
    type Err = KvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KvEngine::ALL
            .into_iter()
            .find(|engine| engine.id() == s)
            .ok_or_else(|| KvError::UnknownEngine { id: s.to_string() })
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KvSettings {
    /// Maximum size of the LMDB memory map in bytes.
    pub lmdb_map_size: usize,
    /// Maximum number of LMDB named databases.
    pub lmdb_max_maps: u32,
    /// Maximum number of concurrent LMDB readers.
    pub lmdb_max_readers: u32,
}

impl Default for KvSettings {
    fn default() -> Self {
        Self {
            lmdb_map_size: 1 << 30,
            lmdb_max_maps: 10_000,
            lmdb_max_readers: 126,
        }
    }
}

impl KvSettings {
    /// Sets the LMDB map size.
    #[must_use]
    pub const fn lmdb_map_size(mut self, bytes: usize) -> Self {
        self.lmdb_map_size = bytes;
        self
    }

    /// Sets the maximum number of LMDB named databases.
    #[must_use]
    pub const fn lmdb_max_maps(mut self, maps: u32) -> Self {
        self.lmdb_max_maps = maps;
        self
    }
}

/// Opens a storage for `engine`.
///
/// Persistent engines require a `location` directory; the memory engine
/// ignores it.
pub fn open_kv_storage(
    engine: KvEngine,
    location: Option<&Path>,
    settings: &KvSettings,
) -> KvResult<Box<dyn KeyValueStorage>> {
    let location = match (engine.is_persistent(), location) {
        (false, _) => None,
        (true, Some(path)) => Some(path),
        (true, None) => {
            return Err(KvError::MissingLocation {
                engine: engine.id(),
            })
        }
    };
    info!(engine = %engine, location = ?location, "opening key-value storage");
    match (engine, location) {
        (KvEngine::Memory, _) => Ok(Box::new(MemoryKvStorage::new())),
        (KvEngine::Lmdb, Some(path)) => Ok(Box::new(LmdbKvStorage::open(path, settings)?)),
        (KvEngine::Redb, Some(path)) => Ok(Box::new(RedbKvStorage::open(path)?)),
        #[cfg(feature = "rocksdb")]
        (KvEngine::Rocksdb, Some(path)) => {
            Ok(Box::new(crate::rocks::RocksKvStorage::open(path)?))
        }
        (other, _) => Err(KvError::UnknownEngine {
            id: other.id().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_ids_parse_back() {
        for engine in KvEngine::ALL {
            assert_eq!(engine.id().parse::<KvEngine>().unwrap(), engine);
        }
        assert!(matches!(
            "xodus".parse::<KvEngine>(),
            Err(KvError::UnknownEngine { .. })
        ));
    }

    #[test]
    fn persistent_engine_needs_location() {
        let result = open_kv_storage(KvEngine::Lmdb, None, &KvSettings::default());
        assert!(matches!(result, Err(KvError::MissingLocation { engine: "lmdb" })));
    }

    #[test]
    fn opens_memory_and_redb() {
        let dir = tempfile::tempdir().unwrap();
        let memory = open_kv_storage(KvEngine::Memory, None, &KvSettings::default()).unwrap();
        assert_eq!(memory.engine(), "memory");
        let redb = open_kv_storage(KvEngine::Redb, Some(dir.path()), &KvSettings::default()).unwrap();
        assert_eq!(redb.engine(), "redb");
    }

    #[cfg(not(feature = "rocksdb"))]
    #[test]
    fn rocksdb_without_feature_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let result = open_kv_storage(KvEngine::Rocksdb, Some(dir.path()), &KvSettings::default());
        assert!(matches!(result, Err(KvError::UnknownEngine { .. })));
    }
}
