//! In-memory key-value engine.

use crate::error::{KvError, KvResult};
use crate::storage::{
    ensure_active, ensure_writable, Direction, Entry, KeyValueStorage, KvTransaction, NamedMap,
};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

type Map = BTreeMap<Vec<u8>, Vec<u8>>;
type Maps = BTreeMap<String, Arc<Map>>;

/// A key-value engine that keeps every map in memory.
///
/// Readers work on the snapshot that was committed when they started.
/// Writers are serialized by a lock and publish a new snapshot on commit.
/// Maps are copied on first write within a transaction, so commits never
/// disturb running readers.
///
/// # Example
///
/// ```rust
/// use ers_kv::{KeyValueStorage, MemoryKvStorage};
///
/// let storage = MemoryKvStorage::new();
/// storage.put("users", b"alice", b"1").unwrap();
/// assert_eq!(storage.get("users", b"alice").unwrap(), Some(b"1".to_vec()));
/// ```
#[derive(Debug, Default)]
pub struct MemoryKvStorage {
    committed: RwLock<Arc<Maps>>,
    write_lock: Mutex<()>,
}

impl MemoryKvStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn begin(&self, readonly: bool) -> MemoryKvTransaction<'_> {
        let guard = (!readonly).then(|| self.write_lock.lock());
        MemoryKvTransaction {
            storage: self,
            maps: Arc::clone(&self.committed.read()),
            readonly,
            finished: false,
            guard,
        }
    }
}

impl KeyValueStorage for MemoryKvStorage {
    fn engine(&self) -> &'static str {
        crate::MEMORY_ENGINE_ID
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

/// Transaction over a [`MemoryKvStorage`].
pub struct MemoryKvTransaction<'s> {
    storage: &'s MemoryKvStorage,
    maps: Arc<Maps>,
    readonly: bool,
    finished: bool,
    guard: Option<MutexGuard<'s, ()>>,
}

impl MemoryKvTransaction<'_> {
    fn map(&self, map: &NamedMap) -> Option<&Map> {
        self.maps.get(map.name()).map(Arc::as_ref)
    }

    fn map_mut(&mut self, map: &NamedMap) -> KvResult<&mut Map> {
        ensure_writable(self.finished, self.readonly)?;
        let maps = Arc::make_mut(&mut self.maps);
        let entry = maps.entry(map.name().to_string()).or_default();
        Ok(Arc::make_mut(entry))
    }

    fn finish(&mut self) {
        self.finished = true;
        self.guard = None;
    }
}

impl KvTransaction for MemoryKvTransaction<'_> {
    fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn named_map(&mut self, name: &str, create: bool) -> KvResult<Option<NamedMap>> {
        ensure_active(self.finished)?;
        if self.maps.contains_key(name) {
            return Ok(Some(NamedMap::new(name)));
        }
        if !create {
            return Ok(None);
        }
        let handle = NamedMap::new(name);
        self.map_mut(&handle)?;
        Ok(Some(handle))
    }

    fn map_names(&self) -> KvResult<Vec<String>> {
        ensure_active(self.finished)?;
        Ok(self.maps.keys().cloned().collect())
    }

    fn map_size(&self, map: &NamedMap) -> KvResult<u64> {
        ensure_active(self.finished)?;
        Ok(self.map(map).map_or(0, |m| m.len() as u64))
    }

    fn get(&self, map: &NamedMap, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        ensure_active(self.finished)?;
        Ok(self.map(map).and_then(|m| m.get(key)).cloned())
    }

    fn put(&mut self, map: &NamedMap, key: &[u8], value: &[u8]) -> KvResult<bool> {
        let m = self.map_mut(map)?;
        let previous = m.insert(key.to_vec(), value.to_vec());
        Ok(previous.as_deref() != Some(value))
    }

    fn delete(&mut self, map: &NamedMap, key: &[u8]) -> KvResult<bool> {
        ensure_writable(self.finished, self.readonly)?;
        if self.map(map).map_or(true, |m| !m.contains_key(key)) {
            return Ok(false);
        }
        Ok(self.map_mut(map)?.remove(key).is_some())
    }

    fn clear_map(&mut self, map: &NamedMap) -> KvResult<()> {
        self.map_mut(map)?.clear();
        Ok(())
    }

    fn seek(
        &self,
        map: &NamedMap,
        from: Bound<&[u8]>,
        direction: Direction,
    ) -> KvResult<Option<Entry>> {
        ensure_active(self.finished)?;
        let Some(m) = self.map(map) else {
            return Ok(None);
        };
        let found = match direction {
            Direction::Forward => m.range::<[u8], _>((from, Bound::Unbounded)).next(),
            Direction::Backward => m.range::<[u8], _>((Bound::Unbounded, from)).next_back(),
        };
        Ok(found.map(|(k, v)| (k.clone(), v.clone())))
    }

    fn commit(&mut self) -> KvResult<()> {
        ensure_active(self.finished)?;
        if !self.readonly {
            *self.storage.committed.write() = Arc::clone(&self.maps);
        }
        self.finish();
        Ok(())
    }

    fn abort(&mut self) -> KvResult<()> {
        if self.finished {
            return Err(KvError::TransactionFinished);
        }
        self.finish();
        Ok(())
    }
}

impl Drop for MemoryKvTransaction<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Cursor;

    fn filled(keys: &[&[u8]]) -> MemoryKvStorage {
        let storage = MemoryKvStorage::new();
        {
            let mut txn = storage.begin_transaction().unwrap();
            let map = txn.named_map("m", true).unwrap().unwrap();
            for key in keys {
                txn.put(&map, key, b"v").unwrap();
            }
            txn.commit().unwrap();
        }
        storage
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let storage = filled(&[b"a"]);
        let mut reader = storage.begin_readonly_transaction().unwrap();
        let map = reader.named_map("m", false).unwrap().unwrap();

        storage.put("m", b"b", b"v").unwrap();

        assert_eq!(reader.map_size(&map).unwrap(), 1);
        assert_eq!(storage.map_size("m").unwrap(), 2);
        reader.abort().unwrap();
    }

    #[test]
    fn abort_discards_writes() {
        let storage = filled(&[b"a"]);
        let mut txn = storage.begin_transaction().unwrap();
        let map = txn.named_map("m", false).unwrap().unwrap();
        assert!(txn.delete(&map, b"a").unwrap());
        txn.put(&map, b"z", b"v").unwrap();
        txn.abort().unwrap();

        assert_eq!(storage.all("m").unwrap(), vec![(b"a".to_vec(), b"v".to_vec())]);
    }

    #[test]
    fn put_reports_changes() {
        let storage = MemoryKvStorage::new();
        assert!(storage.put("m", b"k", b"1").unwrap());
        assert!(!storage.put("m", b"k", b"1").unwrap());
        assert!(storage.put("m", b"k", b"2").unwrap());
        assert!(storage.delete("m", b"k").unwrap());
        assert!(!storage.delete("m", b"k").unwrap());
        assert!(!storage.delete("missing", b"k").unwrap());
    }

    #[test]
    fn finished_and_readonly_transactions_reject_use() {
        let storage = filled(&[b"a"]);
        let mut reader = storage.begin_readonly_transaction().unwrap();
        let map = reader.named_map("m", false).unwrap().unwrap();
        assert!(matches!(reader.put(&map, b"x", b"y"), Err(KvError::ReadOnly)));
        reader.commit().unwrap();
        assert!(matches!(reader.get(&map, b"a"), Err(KvError::TransactionFinished)));
        assert!(matches!(reader.abort(), Err(KvError::TransactionFinished)));
    }

    #[test]
    fn cursor_positions_relative_to_key() {
        let storage = filled(&[b"b", b"d", b"f"]);
        let mut txn = storage.begin_readonly_transaction().unwrap();
        let map = txn.named_map("m", false).unwrap().unwrap();

        let mut cursor = txn.navigate_to(&map, Some(b"c".as_slice())).unwrap();
        assert!(cursor.move_next().unwrap());
        assert_eq!(cursor.key().unwrap(), b"d");
        assert!(cursor.move_next().unwrap());
        assert_eq!(cursor.key().unwrap(), b"f");
        assert!(!cursor.move_next().unwrap());
        assert!(cursor.move_prev().unwrap());
        assert_eq!(cursor.key().unwrap(), b"f");

        let mut cursor = txn.navigate_to(&map, Some(b"d".as_slice())).unwrap();
        assert!(cursor.move_prev().unwrap());
        assert_eq!(cursor.key().unwrap(), b"b");
        assert!(!cursor.move_prev().unwrap());

        let mut cursor = txn.navigate_to(&map, None).unwrap();
        assert!(cursor.move_prev().unwrap());
        assert_eq!(cursor.key().unwrap(), b"f");
    }

    #[test]
    fn closed_cursor_fails_fast() {
        let storage = filled(&[b"a"]);
        let txn = storage.begin_readonly_transaction().unwrap();
        let map = NamedMap::new("m");
        let mut cursor = txn.navigate_to(&map, None).unwrap();
        assert!(cursor.move_next().unwrap());
        cursor.close();
        assert!(matches!(cursor.key(), Err(KvError::CursorClosed)));
        assert!(matches!(cursor.move_next(), Err(KvError::CursorClosed)));
    }

    #[test]
    fn scans_in_both_directions() {
        let storage = filled(&[b"a1", b"a2", b"b1"]);
        let txn = storage.begin_readonly_transaction().unwrap();
        let map = NamedMap::new("m");

        let prefixed: Vec<_> = txn
            .scan_prefix(&map, b"a")
            .map(|e| e.unwrap().0)
            .collect();
        assert_eq!(prefixed, vec![b"a1".to_vec(), b"a2".to_vec()]);

        let reversed: Vec<_> = txn.scan_reversed(&map).map(|e| e.unwrap().0).collect();
        assert_eq!(reversed, vec![b"b1".to_vec(), b"a2".to_vec(), b"a1".to_vec()]);
    }

    proptest::proptest! {
        #[test]
        fn cursors_walk_keys_in_order(
            keys in proptest::collection::btree_set(proptest::collection::vec(0u8..4, 0..4), 0..12),
            from in proptest::option::of(proptest::collection::vec(0u8..4, 0..4)),
        ) {
            let slices: Vec<&[u8]> = keys.iter().map(Vec::as_slice).collect();
            let storage = filled(&slices);
            let txn = storage.begin_readonly_transaction().unwrap();
            let map = NamedMap::new("m");

            let mut cursor = txn.navigate_to(&map, from.as_deref()).unwrap();
            let mut forward = Vec::new();
            while cursor.move_next().unwrap() {
                forward.push(cursor.key().unwrap().to_vec());
            }
            let expected: Vec<Vec<u8>> = keys
                .iter()
                .filter(|key| from.as_ref().map_or(true, |from| *key >= from))
                .cloned()
                .collect();
            proptest::prop_assert_eq!(forward, expected);

            let mut cursor = txn.navigate_to(&map, from.as_deref()).unwrap();
            let mut backward = Vec::new();
            while cursor.move_prev().unwrap() {
                backward.push(cursor.key().unwrap().to_vec());
            }
            let mut expected: Vec<Vec<u8>> = match &from {
                Some(from) => keys.iter().filter(|key| *key < from).cloned().collect(),
                None => keys.iter().cloned().collect(),
            };
            expected.reverse();
            proptest::prop_assert_eq!(backward, expected);
        }
    }
}
