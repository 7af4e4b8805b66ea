//! RocksDB engine, enabled with the `rocksdb` feature.
//!
//! RocksDB has a single keyspace, so every named map is a key prefix:
//! `len(name) as u16 BE ++ name ++ key`. The zero-length prefix holds the
//! map registry.

use crate::error::{KvError, KvResult};
use crate::storage::{
    ensure_active, ensure_writable, Direction, Entry, KeyValueStorage, KvTransaction, NamedMap,
};
use rocksdb::{
    ErrorKind, Options, ReadOptions, SnapshotWithThreadMode, Transaction, TransactionDB,
    TransactionDBOptions, TransactionOptions, WriteOptions,
};
use std::ops::Bound;
use std::path::Path;
use tracing::debug;

const ENGINE: &str = crate::ROCKSDB_ENGINE_ID;
const REGISTRY: &[u8] = &[0, 0];

fn rocks_err(error: rocksdb::Error) -> KvError {
    match error.kind() {
        ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain => {
            KvError::conflict(error.to_string())
        }
        _ => KvError::engine(ENGINE, error),
    }
}

fn map_prefix(name: &str) -> Vec<u8> {
    let len = u16::try_from(name.len()).unwrap_or(u16::MAX);
    let mut prefix = Vec::with_capacity(2 + name.len());
    prefix.extend_from_slice(&len.to_be_bytes());
    prefix.extend_from_slice(name.as_bytes());
    prefix
}

fn registry_key(name: &str) -> Vec<u8> {
    let mut key = REGISTRY.to_vec();
    key.extend_from_slice(name.as_bytes());
    key
}

/// Smallest byte string greater than every string starting with `prefix`.
fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// An LSM-tree engine.
pub struct RocksKvStorage {
    db: TransactionDB,
}

impl RocksKvStorage {
    /// Opens (or creates) a database in `path`.
    pub fn open(path: &Path) -> KvResult<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = TransactionDB::open(&options, &TransactionDBOptions::default(), path)
            .map_err(rocks_err)?;
        debug!(path = %path.display(), "opened RocksDB database");
        Ok(Self { db })
    }

    fn begin(&self, readonly: bool) -> RocksKvTransaction<'_> {
        let mut options = TransactionOptions::default();
        options.set_snapshot(true);
        RocksKvTransaction {
            txn: Some(self.db.transaction_opt(&WriteOptions::default(), &options)),
            snapshot: self.db.snapshot(),
            readonly,
        }
    }
}

impl KeyValueStorage for RocksKvStorage {
    fn engine(&self) -> &'static str {
        ENGINE
    }

    fn begin_transaction(&self) -> KvResult<Box<dyn KvTransaction + '_>> {
        Ok(Box::new(self.begin(false)))
    }

    fn begin_readonly_transaction(&self) -> KvResult<Box<dyn KvTransaction + '_>> {
        Ok(Box::new(self.begin(true)))
    }

    fn close(&self) -> KvResult<()> {
        Ok(())
    }
}

/// Reads go through `snapshot`, so a transaction sees the state at its
/// start plus its own writes. Writes are validated against the same
/// snapshot and fail with a conflict if another transaction got there first.
struct RocksKvTransaction<'db> {
    txn: Option<Transaction<'db, TransactionDB>>,
    snapshot: SnapshotWithThreadMode<'db, TransactionDB>,
    readonly: bool,
}

impl<'db> RocksKvTransaction<'db> {
    fn active(&self) -> KvResult<&Transaction<'db, TransactionDB>> {
        self.txn.as_ref().ok_or(KvError::TransactionFinished)
    }

    fn read_options(&self) -> ReadOptions {
        let mut options = ReadOptions::default();
        options.set_snapshot(&self.snapshot);
        options
    }

    fn writer(&self) -> KvResult<&Transaction<'db, TransactionDB>> {
        ensure_writable(self.txn.is_none(), self.readonly)?;
        self.active()
    }

    fn full_key(map: &NamedMap, key: &[u8]) -> Vec<u8> {
        let mut full = map_prefix(map.name());
        full.extend_from_slice(key);
        full
    }

    fn keys_with_prefix(&self, prefix: &[u8]) -> KvResult<Vec<Vec<u8>>> {
        let txn = self.active()?;
        let mut iter = txn.raw_iterator_opt(self.read_options());
        iter.seek(prefix);
        let mut keys = Vec::new();
        while let Some(key) = iter.key() {
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key.to_vec());
            iter.next();
        }
        iter.status().map_err(rocks_err)?;
        Ok(keys)
    }
}

impl KvTransaction for RocksKvTransaction<'_> {
    fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn is_finished(&self) -> bool {
        self.txn.is_none()
    }

    fn named_map(&mut self, name: &str, create: bool) -> KvResult<Option<NamedMap>> {
        let registered = self
            .active()?
            .get_opt(registry_key(name), &self.read_options())
            .map_err(rocks_err)?
            .is_some();
        if registered {
            return Ok(Some(NamedMap::new(name)));
        }
        if !create {
            return Ok(None);
        }
        self.writer()?
            .put(registry_key(name), b"")
            .map_err(rocks_err)?;
        Ok(Some(NamedMap::new(name)))
    }

    fn map_names(&self) -> KvResult<Vec<String>> {
        self.keys_with_prefix(REGISTRY)?
            .into_iter()
            .map(|key| {
                String::from_utf8(key[REGISTRY.len()..].to_vec())
                    .map_err(|e| KvError::engine(ENGINE, e))
            })
            .collect()
    }

    fn map_size(&self, map: &NamedMap) -> KvResult<u64> {
        Ok(self.keys_with_prefix(&map_prefix(map.name()))?.len() as u64)
    }

    fn get(&self, map: &NamedMap, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        self.active()?
            .get_opt(Self::full_key(map, key), &self.read_options())
            .map_err(rocks_err)
    }

    fn put(&mut self, map: &NamedMap, key: &[u8], value: &[u8]) -> KvResult<bool> {
        let full = Self::full_key(map, key);
        let options = self.read_options();
        let txn = self.writer()?;
        let previous = txn
            .get_for_update_opt(&full, true, &options)
            .map_err(rocks_err)?;
        if previous.as_deref() == Some(value) {
            return Ok(false);
        }
        txn.put(&full, value).map_err(rocks_err)?;
        Ok(true)
    }

    fn delete(&mut self, map: &NamedMap, key: &[u8]) -> KvResult<bool> {
        let full = Self::full_key(map, key);
        let options = self.read_options();
        let txn = self.writer()?;
        if txn
            .get_for_update_opt(&full, true, &options)
            .map_err(rocks_err)?
            .is_none()
        {
            return Ok(false);
        }
        txn.delete(&full).map_err(rocks_err)?;
        Ok(true)
    }

    fn clear_map(&mut self, map: &NamedMap) -> KvResult<()> {
        let keys = self.keys_with_prefix(&map_prefix(map.name()))?;
        let txn = self.writer()?;
        for key in keys {
            txn.delete(key).map_err(rocks_err)?;
        }
        Ok(())
    }

    fn seek(
        &self,
        map: &NamedMap,
        from: Bound<&[u8]>,
        direction: Direction,
    ) -> KvResult<Option<Entry>> {
        ensure_active(self.txn.is_none())?;
        let prefix = map_prefix(map.name());
        let txn = self.active()?;
        let mut iter = txn.raw_iterator_opt(self.read_options());
        match (direction, from) {
            (Direction::Forward, Bound::Unbounded) => iter.seek(&prefix),
            (Direction::Forward, Bound::Included(key) | Bound::Excluded(key)) => {
                let target = Self::full_key(map, key);
                iter.seek(&target);
                if matches!(from, Bound::Excluded(_)) && iter.key() == Some(target.as_slice()) {
                    iter.next();
                }
            }
            (Direction::Backward, Bound::Unbounded) => match prefix_end(&prefix) {
                Some(end) => {
                    iter.seek_for_prev(&end);
                    if iter.key() == Some(end.as_slice()) {
                        iter.prev();
                    }
                }
                None => iter.seek_to_last(),
            },
            (Direction::Backward, Bound::Included(key) | Bound::Excluded(key)) => {
                let target = Self::full_key(map, key);
                iter.seek_for_prev(&target);
                if matches!(from, Bound::Excluded(_)) && iter.key() == Some(target.as_slice()) {
                    iter.prev();
                }
            }
        }
        iter.status().map_err(rocks_err)?;
        match (iter.key(), iter.value()) {
            (Some(key), Some(value)) if key.starts_with(&prefix) => {
                Ok(Some((key[prefix.len()..].to_vec(), value.to_vec())))
            }
            _ => Ok(None),
        }
    }

    fn commit(&mut self) -> KvResult<()> {
        let txn = self.txn.take().ok_or(KvError::TransactionFinished)?;
        if self.readonly {
            return txn.rollback().map_err(rocks_err);
        }
        txn.commit().map_err(rocks_err)
    }

    fn abort(&mut self) -> KvResult<()> {
        let txn = self.txn.take().ok_or(KvError::TransactionFinished)?;
        txn.rollback().map_err(rocks_err)
    }
}
