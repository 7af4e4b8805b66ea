//! Relational backend on SQLite.
//!
//! Every entity type gets its own table, as does every property, blob and
//! `(source type, target type, link name)` triple:
//!
//! ```text
//! ers_types        name -> type id
//! ers_sequences    type and entity id counters
//! ers_schema       one row per table below
//! ent_<t>          (id)
//! prop_<t>_<hex>   (id, value) indexed on (value, id)
//! blob_<t>_<hex>   (id, value)
//! link_<s>_<t>_<hex>  (source_id, target_id)
//! ```
//!
//! `<hex>` encodes the attribute name; see `schema.rs` for the layout.
//!
//! Attribute and link rows reference their entity with `ON DELETE CASCADE`,
//! so deleting an entity row removes everything attached to it. Storages
//! without a location use a scratch database that is deleted on drop; it
//! runs in WAL mode like a persistent one, so readers never wait on a writer.

mod error;
mod schema;
mod transaction;

use crate::backend::{BackendTransaction, StorageBackend};
use crate::dir::StorageDir;
use crate::error::ErsResult;
use crate::schema::SchemaCache;
use crate::settings::SqlErsSettings;
use parking_lot::{Mutex, RwLock};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};

use schema::{parse_schema_row, METADATA_SCHEMA};
use transaction::SqlTransaction;

/// Backend id of the relational backend.
pub const SQL_BACKEND_ID: &str = "sql";

const DATABASE_FILE: &str = "ers.sqlite";
const MAX_IDLE_CONNECTIONS: usize = 8;

pub(crate) struct SqlStorage {
    target: PathBuf,
    settings: SqlErsSettings,
    idle: Mutex<Vec<Connection>>,
    schema: RwLock<Arc<SchemaCache>>,
    dir: Option<StorageDir>,
    scratch: Option<TempDir>,
}

impl SqlStorage {
    pub(crate) fn open(location: Option<&Path>, settings: &SqlErsSettings) -> ErsResult<Self> {
        let (target, dir, scratch) = match location {
            Some(path) => {
                let dir = StorageDir::open(path)?;
                (dir.file(DATABASE_FILE), Some(dir), None)
            }
            None => {
                let scratch = tempfile::Builder::new().prefix("ers-sql-").tempdir()?;
                (scratch.path().join(DATABASE_FILE), None, Some(scratch))
            }
        };
        let storage = Self {
            target,
            settings: settings.clone(),
            idle: Mutex::new(Vec::new()),
            schema: RwLock::new(Arc::default()),
            dir,
            scratch,
        };

        let conn = storage.connect()?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(journal_mode = %mode, "configured sqlite journal");
        conn.execute_batch(METADATA_SCHEMA)?;
        let schema = load_schema(&conn)?;
        info!(
            path = %storage.target.display(),
            scratch = storage.scratch.is_some(),
            schema_items = schema.iter().count(),
            "opened sql entity storage"
        );
        *storage.schema.write() = Arc::new(schema);
        storage.checkin(conn);
        Ok(storage)
    }

    fn connect(&self) -> ErsResult<Connection> {
        let conn = Connection::open(&self.target)?;
        conn.busy_timeout(self.settings.busy_timeout())?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    /// Takes an idle connection, or opens a new one.
    fn checkout(&self) -> ErsResult<Connection> {
        if let Some(conn) = self.idle.lock().pop() {
            return Ok(conn);
        }
        self.connect()
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE_CONNECTIONS {
            idle.push(conn);
        }
    }
}

fn load_schema(conn: &Connection) -> ErsResult<SchemaCache> {
    let mut statement = conn.prepare("SELECT type_id, kind, name, target_type FROM ers_schema")?;
    let rows = statement.query_map([], |row| {
        Ok((
            row.get::<_, u32>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;
    let mut schema = SchemaCache::new();
    for row in rows {
        let (type_id, kind, name, target) = row?;
        schema.insert(parse_schema_row(type_id, &kind, name, target)?);
    }
    Ok(schema)
}

impl StorageBackend for SqlStorage {
    fn backend_id(&self) -> &'static str {
        SQL_BACKEND_ID
    }

    fn is_in_ram(&self) -> bool {
        self.dir.is_none()
    }

    fn begin(&self, readonly: bool) -> ErsResult<Box<dyn BackendTransaction + '_>> {
        Ok(Box::new(SqlTransaction::begin(self, readonly)?))
    }

    fn close(&self) -> ErsResult<()> {
        let idle = std::mem::take(&mut *self.idle.lock());
        for conn in idle {
            conn.close().map_err(|(_, e)| e)?;
        }
        debug!(path = %self.target.display(), "closed sql entity storage");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErsError;
    use crate::types::{AttributeKind, FindOption};

    fn memory() -> SqlStorage {
        SqlStorage::open(None, &SqlErsSettings::default()).unwrap()
    }

    #[test]
    fn writes_are_isolated_until_commit() {
        let storage = memory();
        let writer = storage.begin(false).unwrap();
        let user = writer.new_entity("User").unwrap();
        writer.set_property(user, "age", Some(b"\x05".as_slice())).unwrap();

        let reader = storage.begin(true).unwrap();
        assert_eq!(reader.type_id("User").unwrap(), None);
        reader.abort().unwrap();
        drop(reader);

        writer.commit().unwrap();
        drop(writer);
        let reader = storage.begin(true).unwrap();
        assert!(reader.entity_exists(user).unwrap());
        assert_eq!(
            reader.find(user.type_id, "age", b"\x05", FindOption::Eq).unwrap(),
            vec![user]
        );
    }

    #[test]
    fn memory_storages_are_separate() {
        let first = memory();
        let second = memory();
        let txn = first.begin(false).unwrap();
        txn.new_entity("User").unwrap();
        txn.commit().unwrap();
        drop(txn);

        let txn = second.begin(true).unwrap();
        assert!(txn.types().unwrap().is_empty());
    }

    #[test]
    fn find_orders_by_value_then_id() {
        let storage = memory();
        let txn = storage.begin(false).unwrap();
        let a = txn.new_entity("User").unwrap();
        let b = txn.new_entity("User").unwrap();
        let c = txn.new_entity("User").unwrap();
        txn.set_property(a, "rank", Some(b"\x02".as_slice())).unwrap();
        txn.set_property(b, "rank", Some(b"\x01".as_slice())).unwrap();
        txn.set_property(c, "rank", Some(b"\x02".as_slice())).unwrap();

        let found = txn.find(a.type_id, "rank", b"\x01", FindOption::EqOrGt).unwrap();
        assert_eq!(found, vec![b, a, c]);
        let found = txn.find(a.type_id, "rank", b"\x02", FindOption::Lt).unwrap();
        assert_eq!(found, vec![b]);
    }

    #[test]
    fn deleting_an_entity_cascades() {
        let storage = memory();
        let txn = storage.begin(false).unwrap();
        let user = txn.new_entity("User").unwrap();
        let group = txn.new_entity("Group").unwrap();
        txn.set_property(user, "login", Some(b"u".as_slice())).unwrap();
        txn.set_blob(user, "avatar", Some(b"png".as_slice())).unwrap();
        assert!(txn.add_link(group, "members", user).unwrap());
        assert!(!txn.add_link(group, "members", user).unwrap());

        assert!(txn.delete_entity(user).unwrap());
        assert!(!txn.delete_entity(user).unwrap());
        assert_eq!(txn.property(user, "login").unwrap(), None);
        assert_eq!(txn.blob(user, "avatar").unwrap(), None);
        assert!(txn.links(group, "members").unwrap().is_empty());
        assert!(txn
            .find(user.type_id, "login", b"u", FindOption::Eq)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn links_span_target_types() {
        let storage = memory();
        let txn = storage.begin(false).unwrap();
        let group = txn.new_entity("Group").unwrap();
        let user = txn.new_entity("User").unwrap();
        let admin = txn.new_entity("Admin").unwrap();
        txn.add_link(group, "members", admin).unwrap();
        txn.add_link(group, "members", user).unwrap();

        assert_eq!(txn.links(group, "members").unwrap(), vec![user, admin]);
        assert!(txn.delete_link(group, "members", user).unwrap());
        assert_eq!(txn.links(group, "members").unwrap(), vec![admin]);
        let names = txn.attribute_names(group.type_id, AttributeKind::Link).unwrap();
        assert!(names.contains("members"));
    }

    #[test]
    fn data_and_schema_survive_reopen() {
        let temp = tempfile::tempdir().unwrap();
        let settings = SqlErsSettings::default();
        let user = {
            let storage = SqlStorage::open(Some(temp.path()), &settings).unwrap();
            let txn = storage.begin(false).unwrap();
            let user = txn.new_entity("User").unwrap();
            txn.set_property(user, "login", Some(b"root".as_slice())).unwrap();
            txn.commit().unwrap();
            drop(txn);
            storage.close().unwrap();
            user
        };

        let storage = SqlStorage::open(Some(temp.path()), &settings).unwrap();
        let txn = storage.begin(true).unwrap();
        assert_eq!(txn.type_id("User").unwrap(), Some(user.type_id));
        assert_eq!(txn.property(user, "login").unwrap(), Some(b"root".to_vec()));
        let names = txn.attribute_names(user.type_id, AttributeKind::Property).unwrap();
        assert!(names.contains("login"));
    }

    #[test]
    fn locked_directory_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let _storage = SqlStorage::open(Some(temp.path()), &SqlErsSettings::default()).unwrap();
        let second = SqlStorage::open(Some(temp.path()), &SqlErsSettings::default());
        assert!(matches!(second, Err(ErsError::StorageLocked)));
    }

    #[test]
    fn drop_all_keeps_sequences() {
        let storage = memory();
        let txn = storage.begin(false).unwrap();
        let first = txn.new_entity("User").unwrap();
        txn.set_property(first, "login", Some(b"a".as_slice())).unwrap();
        txn.drop_all().unwrap();
        assert!(txn.types().unwrap().is_empty());
        assert!(txn.all(first.type_id).unwrap().is_empty());

        let second = txn.new_entity("User").unwrap();
        assert!(second.instance_id > first.instance_id);
        txn.commit().unwrap();
    }

    #[test]
    fn readonly_transactions_reject_writes() {
        let storage = memory();
        let txn = storage.begin(true).unwrap();
        assert!(matches!(txn.new_entity("User"), Err(ErsError::ReadOnly)));
        txn.commit().unwrap();
        assert!(matches!(txn.types(), Err(ErsError::TransactionFinished)));
    }
}
