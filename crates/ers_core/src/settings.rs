//! Backend settings.
//!
//! Settings are plain configuration structs. They are passed to
//! [`crate::BackendRegistry::open`] together with a backend id and can be
//! loaded from JSON.

use ers_kv::{KvEngine, KvSettings};
use serde::{Deserialize, Serialize};
use crate::error::{ErsError, ErsResult};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Settings for the in-memory backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RamErsSettings {
    /// Directory where immutable snapshots are dumped, one file per
    /// storage id. Without it, immutable storages live only in memory.
    pub immutable_dumps_path: Option<PathBuf>,
}

impl RamErsSettings {
    /// Creates settings without a dump directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the dump directory.
    #[must_use]
    pub fn immutable_dumps_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.immutable_dumps_path = Some(path.into());
        self
    }

    /// Path of the dump file for `storage_id`, if dumps are configured.
    ///
    /// The id must name a plain file inside the dump directory: empty ids,
    /// `.`, `..` and ids containing path separators are rejected.
    pub fn dump_file(&self, storage_id: &str) -> ErsResult<Option<PathBuf>> {
        let Some(dir) = self.immutable_dumps_path.as_deref() else {
            return Ok(None);
        };
        let plain = matches!(
            Path::new(storage_id).components().collect::<Vec<_>>().as_slice(),
            [Component::Normal(name)] if *name == storage_id
        );
        if !plain || storage_id.contains(['/', '\\']) {
            return Err(ErsError::invalid_settings(format!(
                "storage id {storage_id:?} is not a plain file name"
            )));
        }
        Ok(Some(dir.join(storage_id)))
    }
}

/// Settings for the key-value backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KvErsSettings {
    /// Which key-value engine to run on.
    pub engine: KvEngine,
    /// Engine tuning.
    pub engine_settings: KvSettings,
}

impl KvErsSettings {
    /// Creates settings for `engine` with default tuning.
    #[must_use]
    pub fn new(engine: KvEngine) -> Self {
        Self {
            engine,
            engine_settings: KvSettings::default(),
        }
    }

    /// Sets the LMDB map size.
    #[must_use]
    pub fn lmdb_map_size(mut self, bytes: usize) -> Self {
        self.engine_settings = self.engine_settings.lmdb_map_size(bytes);
        self
    }
}

/// Settings for the relational backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlErsSettings {
    /// How long a connection waits on a locked database file, in
    /// milliseconds, before reporting a conflict.
    pub busy_timeout_ms: u64,
}

impl Default for SqlErsSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
        }
    }
}

impl SqlErsSettings {
    /// Sets the busy timeout.
    #[must_use]
    pub const fn busy_timeout_ms(mut self, millis: u64) -> Self {
        self.busy_timeout_ms = millis;
        self
    }

    /// The busy timeout as a duration.
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Settings for any backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum ErsSettings {
    /// Use the backend's defaults.
    #[default]
    Empty,
    /// In-memory backend settings.
    Ram(RamErsSettings),
    /// Key-value backend settings.
    Kv(KvErsSettings),
    /// Relational backend settings.
    Sql(SqlErsSettings),
}

impl From<RamErsSettings> for ErsSettings {
    fn from(settings: RamErsSettings) -> Self {
        ErsSettings::Ram(settings)
    }
}

impl From<KvErsSettings> for ErsSettings {
    fn from(settings: KvErsSettings) -> Self {
        ErsSettings::Kv(settings)
    }
}

impl From<SqlErsSettings> for ErsSettings {
    fn from(settings: SqlErsSettings) -> Self {
        ErsSettings::Sql(settings)
    }
}
