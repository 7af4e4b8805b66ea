//! Backend registry.
//!
//! Maps backend ids to constructors. Registries are plain values: build one
//! with [`BackendRegistry::with_builtins`] and register additional backends
//! on it.

use crate::backend::StorageBackend;
use crate::error::{ErsError, ErsResult};
use crate::kv::{KvErsStorage, KV_BACKEND_ID};
use crate::ram::{RamStorage, RAM_BACKEND_ID};
use crate::settings::{ErsSettings, KvErsSettings, RamErsSettings, SqlErsSettings};
use crate::sql::{SqlStorage, SQL_BACKEND_ID};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Opens a backend at an optional location.
pub type BackendConstructor =
    fn(Option<&Path>, &ErsSettings) -> ErsResult<Box<dyn StorageBackend>>;

/// Backend constructors keyed by backend id.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    constructors: BTreeMap<String, BackendConstructor>,
}

impl BackendRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the `ram`, `sql` and `kv` backends.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(RAM_BACKEND_ID, open_ram);
        registry.register(SQL_BACKEND_ID, open_sql);
        registry.register(KV_BACKEND_ID, open_kv);
        registry
    }

    /// Registers a constructor, returning the one it replaces.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        constructor: BackendConstructor,
    ) -> Option<BackendConstructor> {
        self.constructors.insert(id.into(), constructor)
    }

    /// Whether a backend is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.constructors.contains_key(id)
    }

    /// Registered backend ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Opens the backend registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ErsError::UnknownBackend`] for unregistered ids and
    /// [`ErsError::InvalidSettings`] when `settings` belong to another
    /// backend.
    pub fn open(
        &self,
        id: &str,
        location: Option<&Path>,
        settings: &ErsSettings,
    ) -> ErsResult<Box<dyn StorageBackend>> {
        let constructor = self
            .constructors
            .get(id)
            .ok_or_else(|| ErsError::UnknownBackend { id: id.to_string() })?;
        debug!(backend = id, location = ?location, "opening backend");
        constructor(location, settings)
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.constructors.keys()).finish()
    }
}

fn mismatch(backend: &str, settings: &ErsSettings) -> ErsError {
    let given = match settings {
        ErsSettings::Empty => "empty",
        ErsSettings::Ram(_) => RAM_BACKEND_ID,
        ErsSettings::Kv(_) => KV_BACKEND_ID,
        ErsSettings::Sql(_) => SQL_BACKEND_ID,
    };
    ErsError::invalid_settings(format!("{given} settings given to the {backend} backend"))
}

fn open_ram(location: Option<&Path>, settings: &ErsSettings) -> ErsResult<Box<dyn StorageBackend>> {
    let settings = match settings {
        ErsSettings::Empty => RamErsSettings::default(),
        ErsSettings::Ram(settings) => settings.clone(),
        other => return Err(mismatch(RAM_BACKEND_ID, other)),
    };
    Ok(Box::new(RamStorage::open(location, settings)?))
}

fn open_sql(location: Option<&Path>, settings: &ErsSettings) -> ErsResult<Box<dyn StorageBackend>> {
    let settings = match settings {
        ErsSettings::Empty => SqlErsSettings::default(),
        ErsSettings::Sql(settings) => settings.clone(),
        other => return Err(mismatch(SQL_BACKEND_ID, other)),
    };
    Ok(Box::new(SqlStorage::open(location, &settings)?))
}

fn open_kv(location: Option<&Path>, settings: &ErsSettings) -> ErsResult<Box<dyn StorageBackend>> {
    let settings = match settings {
        ErsSettings::Empty => KvErsSettings::default(),
        ErsSettings::Kv(settings) => settings.clone(),
        other => return Err(mismatch(KV_BACKEND_ID, other)),
    };
    Ok(Box::new(KvErsStorage::open(location, &settings)?))
}
