//! In-memory backend.
//!
//! Data lives in a versioned container behind an `Arc`. Transactions read
//! the version current when they began and commit by swapping in a new one,
//! which fails with a conflict if another writer got there first. Freezing
//! shares the committed version with an immutable storage, and immutable
//! storages can be dumped to and loaded from a snapshot file.

mod data;
mod dump;
mod transaction;

use crate::backend::{BackendTransaction, StorageBackend};
use crate::dir::write_atomically;
use crate::error::{ErsError, ErsResult};
use crate::settings::RamErsSettings;
use crate::types::AttributeKind;
use parking_lot::Mutex;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub(crate) use data::RamData;
use transaction::RamTransaction;

/// Backend id of the in-memory backend.
pub const RAM_BACKEND_ID: &str = "ram";

pub(crate) struct RamStorage {
    current: Mutex<Arc<RamData>>,
    frozen: bool,
    settings: RamErsSettings,
}

impl RamStorage {
    pub(crate) fn new(settings: RamErsSettings) -> Self {
        Self {
            current: Mutex::new(Arc::new(RamData::default())),
            frozen: false,
            settings,
        }
    }

    pub(crate) fn open(location: Option<&Path>, settings: RamErsSettings) -> ErsResult<Self> {
        if let Some(location) = location {
            return Err(ErsError::invalid_settings(format!(
                "ram backend cannot be persisted to {}",
                location.display()
            )));
        }
        Ok(Self::new(settings))
    }

    pub(crate) fn frozen(data: Arc<RamData>, settings: RamErsSettings) -> Self {
        Self {
            current: Mutex::new(data),
            frozen: true,
            settings,
        }
    }

    /// Reads a frozen storage from its dump file, if one exists.
    pub(crate) fn try_load(settings: &RamErsSettings, storage_id: &str) -> ErsResult<Option<Self>> {
        let Some(path) = settings.dump_file(storage_id)? else {
            return Ok(None);
        };
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let data = dump::decode(&bytes)?;
        info!(path = %path.display(), "loaded immutable ram storage");
        Ok(Some(Self::frozen(Arc::new(data), settings.clone())))
    }

    /// Reads a frozen storage from a dump stream.
    pub(crate) fn load(bytes: &[u8], settings: RamErsSettings) -> ErsResult<Self> {
        Ok(Self::frozen(Arc::new(dump::decode(bytes)?), settings))
    }

    pub(crate) fn current(&self) -> Arc<RamData> {
        Arc::clone(&*self.current.lock())
    }

    pub(crate) fn is_frozen(&self) -> bool {
        self.frozen
    }
}

impl StorageBackend for RamStorage {
    fn backend_id(&self) -> &'static str {
        RAM_BACKEND_ID
    }

    fn is_in_ram(&self) -> bool {
        true
    }

    fn is_immutable(&self) -> bool {
        self.frozen
    }

    fn begin(&self, readonly: bool) -> ErsResult<Box<dyn BackendTransaction + '_>> {
        Ok(Box::new(RamTransaction::new(self, readonly)))
    }

    fn freeze(&self, storage_id: &str) -> ErsResult<Option<Box<dyn StorageBackend>>> {
        if self.frozen {
            return Ok(Some(Box::new(Self::frozen(
                self.current(),
                self.settings.clone(),
            ))));
        }
        if let Some(loaded) = Self::try_load(&self.settings, storage_id)? {
            return Ok(Some(Box::new(loaded)));
        }
        let data = self.current();
        if let Some(path) = self.settings.dump_file(storage_id)? {
            write_atomically(&path, &dump::encode(&data))?;
            info!(path = %path.display(), "dumped immutable ram storage");
        }
        Ok(Some(Box::new(Self::frozen(data, self.settings.clone()))))
    }

    fn dump(&self, out: &mut dyn Write) -> ErsResult<()> {
        if !self.frozen {
            return Err(ErsError::unsupported("dump of a mutable ram storage"));
        }
        out.write_all(&dump::encode(&self.current()))?;
        Ok(())
    }

    fn close(&self) -> ErsResult<()> {
        *self.current.lock() = Arc::new(RamData::default());
        debug!("closed ram storage");
        Ok(())
    }
}

/// Copies the committed state of any backend into a RAM container.
///
/// Entity ids are preserved. Links to deleted entities are not copied.
pub(crate) fn snapshot_of(backend: &dyn StorageBackend) -> ErsResult<RamData> {
    let txn = backend.begin(true)?;
    let mut data = RamData::default();
    for (type_name, type_id) in txn.types()? {
        data.next_type_id = data.next_type_id.max(type_id + 1);
        data.types.insert(type_name, type_id);

        let entities = txn.all(type_id)?;
        for id in &entities {
            data.insert_entity(*id);
        }
        for name in txn.attribute_names(type_id, AttributeKind::Property)? {
            for id in &entities {
                if let Some(value) = txn.property(*id, &name)? {
                    data.set_property(*id, &name, Some(&value));
                }
            }
        }
        for name in txn.attribute_names(type_id, AttributeKind::Blob)? {
            for id in &entities {
                if let Some(value) = txn.blob(*id, &name)? {
                    data.set_blob(*id, &name, Some(&value));
                }
            }
        }
        for name in txn.attribute_names(type_id, AttributeKind::Link)? {
            for id in &entities {
                for target in txn.links(*id, &name)? {
                    data.add_link(*id, &name, target);
                }
            }
        }
    }
    txn.abort()?;
    Ok(data)
}
