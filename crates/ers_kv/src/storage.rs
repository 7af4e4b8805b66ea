//! Key-value storage and transaction traits.

use crate::error::{KvError, KvResult};
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

/// Handle to a named map inside a key-value storage.
///
/// Handles are plain names; engines resolve them on every access, so a
/// handle stays valid across transactions.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamedMap {
    name: Arc<str>,
}

impl NamedMap {
    pub(crate) fn new(name: &str) -> Self {
        Self { name: name.into() }
    }

    /// Returns the map name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for NamedMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamedMap({})", self.name)
    }
}

/// Scan direction for [`KvTransaction::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending key order.
    Forward,
    /// Descending key order.
    Backward,
}

/// An owned key/value pair.
pub type Entry = (Vec<u8>, Vec<u8>);

/// A transaction over a key-value storage.
///
/// Keys are compared as unsigned byte strings. Engines implement this
/// narrow contract; cursors and scans are built on top of [`KvTransaction::seek`].
///
/// Every method fails with [`KvError::TransactionFinished`] once the
/// transaction has been committed or aborted, and writes fail with
/// [`KvError::ReadOnly`] in read-only transactions.
pub trait KvTransaction {
    /// Whether the transaction rejects writes.
    fn is_readonly(&self) -> bool;

    /// Whether the transaction was committed or aborted.
    fn is_finished(&self) -> bool;

    /// Resolves a map by name, creating it if `create` is set.
    ///
    /// Returns `None` if the map does not exist and `create` is false.
    fn named_map(&mut self, name: &str, create: bool) -> KvResult<Option<NamedMap>>;

    /// Names of all maps, sorted.
    fn map_names(&self) -> KvResult<Vec<String>>;

    /// Number of entries in a map.
    fn map_size(&self, map: &NamedMap) -> KvResult<u64>;

    /// Reads the value stored under `key`.
    fn get(&self, map: &NamedMap, key: &[u8]) -> KvResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`. Returns true if the map changed.
    fn put(&mut self, map: &NamedMap, key: &[u8], value: &[u8]) -> KvResult<bool>;

    /// Removes `key`. Returns true if it was present.
    fn delete(&mut self, map: &NamedMap, key: &[u8]) -> KvResult<bool>;

    /// Removes every entry of a map, keeping the map itself.
    fn clear_map(&mut self, map: &NamedMap) -> KvResult<()>;

    /// Finds the first entry at or after `from` (forward), or at or before
    /// `from` (backward), honoring the bound's inclusivity.
    fn seek(
        &self,
        map: &NamedMap,
        from: Bound<&[u8]>,
        direction: Direction,
    ) -> KvResult<Option<Entry>>;

    /// Makes all writes durable and visible. Fails with
    /// [`KvError::Conflict`] if the engine detected contention.
    fn commit(&mut self) -> KvResult<()>;

    /// Discards all writes.
    fn abort(&mut self) -> KvResult<()>;
}

/// A key-value storage engine.
pub trait KeyValueStorage: Send + Sync {
    /// Engine id, e.g. `"lmdb"`.
    fn engine(&self) -> &'static str;

    /// Starts a read-write transaction. Blocks while another writer is active.
    fn begin_transaction(&self) -> KvResult<Box<dyn KvTransaction + '_>>;

    /// Starts a read-only transaction.
    fn begin_readonly_transaction(&self) -> KvResult<Box<dyn KvTransaction + '_>>;

    /// Flushes and releases engine resources.
    fn close(&self) -> KvResult<()>;

    /// Reads a single value in its own read-only transaction.
    fn get(&self, map: &str, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        let mut txn = self.begin_readonly_transaction()?;
        let value = match txn.named_map(map, false)? {
            Some(handle) => txn.get(&handle, key)?,
            None => None,
        };
        txn.abort()?;
        Ok(value)
    }

    /// Stores a single value in its own committed transaction.
    fn put(&self, map: &str, key: &[u8], value: &[u8]) -> KvResult<bool> {
        let mut txn = self.begin_transaction()?;
        let handle = txn
            .named_map(map, true)?
            .ok_or_else(|| KvError::engine(self.engine(), format!("map {map} was not created")))?;
        let changed = txn.put(&handle, key, value)?;
        txn.commit()?;
        Ok(changed)
    }

    /// Deletes a single key in its own committed transaction.
    fn delete(&self, map: &str, key: &[u8]) -> KvResult<bool> {
        let mut txn = self.begin_transaction()?;
        let deleted = match txn.named_map(map, false)? {
            Some(handle) => txn.delete(&handle, key)?,
            None => false,
        };
        txn.commit()?;
        Ok(deleted)
    }

    /// Counts the entries of a map; missing maps are empty.
    fn map_size(&self, map: &str) -> KvResult<u64> {
        let mut txn = self.begin_readonly_transaction()?;
        let size = match txn.named_map(map, false)? {
            Some(handle) => txn.map_size(&handle)?,
            None => 0,
        };
        txn.abort()?;
        Ok(size)
    }

    /// Reads every entry of a map in key order.
    fn all(&self, map: &str) -> KvResult<Vec<Entry>> {
        let mut txn = self.begin_readonly_transaction()?;
        let entries = match txn.named_map(map, false)? {
            Some(handle) => txn.scan(&handle, None).collect::<KvResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        txn.abort()?;
        Ok(entries)
    }
}

pub(crate) fn ensure_active(finished: bool) -> KvResult<()> {
    if finished {
        Err(KvError::TransactionFinished)
    } else {
        Ok(())
    }
}

pub(crate) fn ensure_writable(finished: bool, readonly: bool) -> KvResult<()> {
    ensure_active(finished)?;
    if readonly {
        Err(KvError::ReadOnly)
    } else {
        Ok(())
    }
}
