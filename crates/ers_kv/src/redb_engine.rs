//! redb engine.

use crate::error::{KvError, KvResult};
use crate::storage::{
    ensure_active, ensure_writable, Direction, Entry, KeyValueStorage, KvTransaction, NamedMap,
};
use redb::{
    Database, ReadTransaction, ReadableTable, ReadableTableMetadata, TableDefinition, TableError,
    TableHandle, WriteTransaction,
};
use std::fs;
use std::ops::Bound;
use std::path::Path;
use tracing::debug;

const ENGINE: &str = crate::REDB_ENGINE_ID;

/// File name of the database inside the storage directory.
pub const REDB_FILE_NAME: &str = "data.redb";

type Key = &'static [u8];
type Value = &'static [u8];

fn table(name: &str) -> TableDefinition<'_, Key, Value> {
    TableDefinition::new(name)
}

fn redb_err(error: impl Into<redb::Error>) -> KvError {
    KvError::engine(ENGINE, error.into())
}

/// A B-tree engine with its own MVCC transaction model.
///
/// Each named map is a redb table. redb runs one writer at a time and
/// gives every reader a stable snapshot.
pub struct RedbKvStorage {
    db: Database,
}

impl RedbKvStorage {
    /// Opens (or creates) `data.redb` inside `dir`.
    pub fn open(dir: &Path) -> KvResult<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(REDB_FILE_NAME);
        let db = Database::create(&path).map_err(redb_err)?;
        debug!(path = %path.display(), "opened redb database");
        Ok(Self { db })
    }
}

impl KeyValueStorage for RedbKvStorage {
    fn engine(&self) -> &'static str {
        ENGINE
    }

    fn begin_transaction(&self) -> KvResult<Box<dyn KvTransaction + '_>> {
        let txn = self.db.begin_write().map_err(redb_err)?;
        Ok(Box::new(RedbKvTransaction {
            txn: Some(RedbTxn::Write(txn)),
            readonly: false,
        }))
    }

    fn begin_readonly_transaction(&self) -> KvResult<Box<dyn KvTransaction + '_>> {
        let txn = self.db.begin_read().map_err(redb_err)?;
        Ok(Box::new(RedbKvTransaction {
            txn: Some(RedbTxn::Read(txn)),
            readonly: true,
        }))
    }

    fn close(&self) -> KvResult<()> {
        Ok(())
    }
}

enum RedbTxn {
    Read(ReadTransaction),
    Write(WriteTransaction),
}

struct RedbKvTransaction {
    txn: Option<RedbTxn>,
    readonly: bool,
}

fn seek_in<T: ReadableTable<Key, Value>>(
    table: &T,
    from: Bound<&[u8]>,
    direction: Direction,
) -> KvResult<Option<Entry>> {
    let found = match direction {
        Direction::Forward => table
            .range::<&[u8]>((from, Bound::Unbounded))
            .map_err(redb_err)?
            .next(),
        Direction::Backward => table
            .range::<&[u8]>((Bound::Unbounded, from))
            .map_err(redb_err)?
            .next_back(),
    };
    match found {
        Some(item) => {
            let (key, value) = item.map_err(redb_err)?;
            Ok(Some((key.value().to_vec(), value.value().to_vec())))
        }
        None => Ok(None),
    }
}

impl RedbKvTransaction {
    fn active(&self) -> KvResult<&RedbTxn> {
        self.txn.as_ref().ok_or(KvError::TransactionFinished)
    }

    fn writer(&mut self) -> KvResult<&mut WriteTransaction> {
        ensure_writable(self.txn.is_none(), self.readonly)?;
        match &mut self.txn {
            Some(RedbTxn::Write(txn)) => Ok(txn),
            _ => Err(KvError::ReadOnly),
        }
    }

    fn exists(&self, name: &str) -> KvResult<bool> {
        Ok(self.map_names()?.iter().any(|n| n == name))
    }

    /// Runs `f` against the table, or returns `default` if it does not exist.
    fn with_table<R>(
        &self,
        map: &NamedMap,
        default: R,
        f: impl FnOnce(&dyn ReadableLookup) -> KvResult<R>,
    ) -> KvResult<R> {
        match self.active()? {
            RedbTxn::Read(txn) => match txn.open_table(table(map.name())) {
                Ok(t) => f(&t),
                Err(TableError::TableDoesNotExist(_)) => Ok(default),
                Err(e) => Err(redb_err(e)),
            },
            RedbTxn::Write(txn) => {
                if !self.exists(map.name())? {
                    return Ok(default);
                }
                let t = txn.open_table(table(map.name())).map_err(redb_err)?;
                f(&t)
            }
        }
    }
}

/// Object-safe read surface shared by read-only and writable tables.
trait ReadableLookup {
    fn lookup(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>>;
    fn count(&self) -> KvResult<u64>;
    fn seek(&self, from: Bound<&[u8]>, direction: Direction) -> KvResult<Option<Entry>>;
}

impl<T: ReadableTable<Key, Value> + ReadableTableMetadata> ReadableLookup for T {
    fn lookup(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        Ok(self
            .get(key)
            .map_err(redb_err)?
            .map(|guard| guard.value().to_vec()))
    }

    fn count(&self) -> KvResult<u64> {
        self.len().map_err(redb_err)
    }

    fn seek(&self, from: Bound<&[u8]>, direction: Direction) -> KvResult<Option<Entry>> {
        seek_in(self, from, direction)
    }
}

impl KvTransaction for RedbKvTransaction {
    fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn is_finished(&self) -> bool {
        self.txn.is_none()
    }

    fn named_map(&mut self, name: &str, create: bool) -> KvResult<Option<NamedMap>> {
        if self.exists(name)? {
            return Ok(Some(NamedMap::new(name)));
        }
        if !create {
            return Ok(None);
        }
        self.writer()?.open_table(table(name)).map_err(redb_err)?;
        Ok(Some(NamedMap::new(name)))
    }

    fn map_names(&self) -> KvResult<Vec<String>> {
        let mut names: Vec<String> = match self.active()? {
            RedbTxn::Read(txn) => txn
                .list_tables()
                .map_err(redb_err)?
                .map(|h| h.name().to_string())
                .collect(),
            RedbTxn::Write(txn) => txn
                .list_tables()
                .map_err(redb_err)?
                .map(|h| h.name().to_string())
                .collect(),
        };
        names.sort();
        Ok(names)
    }

    fn map_size(&self, map: &NamedMap) -> KvResult<u64> {
        self.with_table(map, 0, |t| t.count())
    }

    fn get(&self, map: &NamedMap, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        self.with_table(map, None, |t| t.lookup(key))
    }

    fn put(&mut self, map: &NamedMap, key: &[u8], value: &[u8]) -> KvResult<bool> {
        let mut t = self.writer()?.open_table(table(map.name())).map_err(redb_err)?;
        let previous = t.insert(key, value).map_err(redb_err)?;
        Ok(previous.map_or(true, |guard| guard.value() != value))
    }

    fn delete(&mut self, map: &NamedMap, key: &[u8]) -> KvResult<bool> {
        ensure_writable(self.txn.is_none(), self.readonly)?;
        if !self.exists(map.name())? {
            return Ok(false);
        }
        let mut t = self.writer()?.open_table(table(map.name())).map_err(redb_err)?;
        let removed = t.remove(key).map_err(redb_err)?;
        Ok(removed.is_some())
    }

    fn clear_map(&mut self, map: &NamedMap) -> KvResult<()> {
        let txn = self.writer()?;
        txn.delete_table(table(map.name())).map_err(redb_err)?;
        txn.open_table(table(map.name())).map_err(redb_err)?;
        Ok(())
    }

    fn seek(
        &self,
        map: &NamedMap,
        from: Bound<&[u8]>,
        direction: Direction,
    ) -> KvResult<Option<Entry>> {
        ensure_active(self.txn.is_none())?;
        self.with_table(map, None, |t| t.seek(from, direction))
    }

    fn commit(&mut self) -> KvResult<()> {
        match self.txn.take() {
            Some(RedbTxn::Write(txn)) => txn.commit().map_err(redb_err),
            Some(RedbTxn::Read(_)) => Ok(()),
            None => Err(KvError::TransactionFinished),
        }
    }

    fn abort(&mut self) -> KvResult<()> {
        match self.txn.take() {
            Some(RedbTxn::Write(txn)) => txn.abort().map_err(redb_err),
            Some(RedbTxn::Read(_)) => Ok(()),
            None => Err(KvError::TransactionFinished),
        }
    }
}
