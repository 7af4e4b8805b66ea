//! Storage fixtures.
//!
//! One [`StorageKind`] per backend configuration; on-disk kinds live in a
//! temporary directory removed when the [`TestStorage`] is dropped.

use ers_core::{EntityRelationshipStorage, KvEngine, KvErsSettings, SqlErsSettings};
use std::fmt;
use std::path::Path;
use tempfile::TempDir;

/// LMDB reserves its whole map up front; keep test environments small.
const TEST_LMDB_MAP_SIZE: usize = 64 << 20;

/// A backend configuration under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// The in-memory backend.
    Ram,
    /// The relational backend on a scratch database.
    SqlMemory,
    /// The relational backend in a storage directory.
    SqlFile,
    /// The key-value backend on the given engine.
    Kv(KvEngine),
}

impl StorageKind {
    /// Every kind compiled into this build.
    #[must_use]
    pub fn all() -> Vec<Self> {
        let mut kinds = vec![Self::Ram, Self::SqlMemory, Self::SqlFile];
        kinds.extend(
            KvEngine::ALL
                .into_iter()
                .filter(|engine| engine.is_available())
                .map(Self::Kv),
        );
        kinds
    }

    /// Kinds whose data survives a reopen.
    #[must_use]
    pub fn persistent() -> Vec<Self> {
        Self::all()
            .into_iter()
            .filter(|kind| kind.is_persistent())
            .collect()
    }

    /// Whether the kind keeps its data in a directory.
    #[must_use]
    pub const fn is_persistent(self) -> bool {
        match self {
            Self::Ram | Self::SqlMemory => false,
            Self::SqlFile => true,
            Self::Kv(engine) => engine.is_persistent(),
        }
    }

    /// Opens a fresh storage of this kind.
    #[must_use]
    pub fn open(self) -> TestStorage {
        TestStorage::open(self)
    }

    fn open_at(self, location: Option<&Path>) -> EntityRelationshipStorage {
        let opened = match self {
            Self::Ram => Ok(EntityRelationshipStorage::ram()),
            Self::SqlMemory => EntityRelationshipStorage::sql(None, &SqlErsSettings::default()),
            Self::SqlFile => EntityRelationshipStorage::sql(location, &SqlErsSettings::default()),
            Self::Kv(engine) => EntityRelationshipStorage::kv(
                location,
                &KvErsSettings::new(engine).lmdb_map_size(TEST_LMDB_MAP_SIZE),
            ),
        };
        opened.unwrap_or_else(|e| panic!("failed to open {self} storage: {e}"))
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ram => f.write_str("ram"),
            Self::SqlMemory => f.write_str("sql (scratch)"),
            Self::SqlFile => f.write_str("sql (file)"),
            Self::Kv(engine) => write!(f, "kv ({engine})"),
        }
    }
}

/// A storage with automatic cleanup.
pub struct TestStorage {
    /// The configuration this storage was opened with.
    pub kind: StorageKind,
    /// The storage instance.
    pub storage: EntityRelationshipStorage,
    // Dropped after the storage, which may hold files inside it.
    temp_dir: Option<TempDir>,
}

impl TestStorage {
    /// Opens a fresh storage of `kind`.
    #[must_use]
    pub fn open(kind: StorageKind) -> Self {
        let temp_dir = kind
            .is_persistent()
            .then(|| TempDir::new().expect("failed to create temp directory"));
        let storage = kind.open_at(temp_dir.as_ref().map(TempDir::path));
        Self {
            kind,
            storage,
            temp_dir,
        }
    }

    /// The storage directory of a persistent kind.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Closes the storage and opens it again on the same directory.
    ///
    /// In-memory kinds come back empty.
    #[must_use]
    pub fn reopen(self) -> Self {
        let Self {
            kind,
            storage,
            temp_dir,
        } = self;
        drop(storage);
        let storage = kind.open_at(temp_dir.as_ref().map(TempDir::path));
        Self {
            kind,
            storage,
            temp_dir,
        }
    }
}

impl std::ops::Deref for TestStorage {
    type Target = EntityRelationshipStorage;

    fn deref(&self) -> &Self::Target {
        &self.storage
    }
}

/// Runs `f` once against a fresh storage of every kind.
pub fn for_each_storage<F>(mut f: F)
where
    F: FnMut(StorageKind, &EntityRelationshipStorage),
{
    for kind in StorageKind::all() {
        let storage = kind.open();
        f(kind, &storage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_opens() {
        for kind in StorageKind::all() {
            let storage = kind.open();
            assert_eq!(storage.path().is_some(), kind.is_persistent());
            assert!(!storage.is_immutable());
        }
    }

    #[test]
    fn persistent_kinds_exclude_memory() {
        let kinds = StorageKind::persistent();
        assert!(kinds.contains(&StorageKind::SqlFile));
        assert!(kinds.contains(&StorageKind::Kv(KvEngine::Redb)));
        assert!(!kinds.contains(&StorageKind::Ram));
        assert!(!kinds.contains(&StorageKind::Kv(KvEngine::Memory)));
    }

    #[test]
    fn kinds_display_backend_and_engine() {
        assert_eq!(StorageKind::Kv(KvEngine::Lmdb).to_string(), "kv (lmdb)");
        assert_eq!(StorageKind::Ram.to_string(), "ram");
    }
}
