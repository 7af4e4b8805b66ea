//! Key-value backend.
//!
//! Entities, attributes and links are encoded into named maps of any
//! [`ers_kv`] engine; see [`keys`] for the layout. Writers are serialized by
//! the engine. The schema cache lists which attribute maps exist, so
//! attribute names and entity deletion never scan the engine's map list.

mod keys;
mod transaction;

use crate::backend::{BackendTransaction, StorageBackend};
use crate::dir::StorageDir;
use crate::error::ErsResult;
use crate::schema::{SchemaCache, SchemaView};
use crate::settings::KvErsSettings;
use ers_kv::{open_kv_storage, KeyValueStorage};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use keys::{parse_schema_key, SCHEMA_MAP};
use transaction::KvErsTransaction;

/// Backend id of the key-value backend.
pub const KV_BACKEND_ID: &str = "kv";

pub(crate) struct KvErsStorage {
    kv: Box<dyn KeyValueStorage>,
    schema: RwLock<Arc<SchemaCache>>,
    // Declared after the engine: the lock must outlive open engine files.
    dir: Option<StorageDir>,
}

impl KvErsStorage {
    pub(crate) fn open(location: Option<&Path>, settings: &KvErsSettings) -> ErsResult<Self> {
        let dir = match location {
            Some(path) if settings.engine.is_persistent() => Some(StorageDir::open(path)?),
            _ => None,
        };
        let kv = open_kv_storage(
            settings.engine,
            dir.as_ref().map(StorageDir::path),
            &settings.engine_settings,
        )?;

        let mut schema = SchemaCache::new();
        for (key, _) in kv.all(SCHEMA_MAP)? {
            schema.insert(parse_schema_key(&key)?);
        }
        info!(
            engine = %settings.engine,
            schema_items = schema.iter().count(),
            "opened kv entity storage"
        );

        Ok(Self {
            kv,
            schema: RwLock::new(Arc::new(schema)),
            dir,
        })
    }
}

impl StorageBackend for KvErsStorage {
    fn backend_id(&self) -> &'static str {
        KV_BACKEND_ID
    }

    fn is_in_ram(&self) -> bool {
        self.dir.is_none()
    }

    fn begin(&self, readonly: bool) -> ErsResult<Box<dyn BackendTransaction + '_>> {
        // Readers pin the schema under the lock writers publish with. Writers
        // pin it after the engine admits them, so earlier commits are in.
        let (kv, schema) = if readonly {
            let committed = self.schema.read();
            let kv = self.kv.begin_readonly_transaction()?;
            (kv, Arc::clone(&*committed))
        } else {
            let kv = self.kv.begin_transaction()?;
            (kv, Arc::clone(&*self.schema.read()))
        };
        Ok(Box::new(KvErsTransaction::new(self, kv, SchemaView::new(schema), readonly)))
    }

    fn close(&self) -> ErsResult<()> {
        self.kv.close()?;
        debug!(engine = self.kv.engine(), "closed kv entity storage");
        Ok(())
    }
}
