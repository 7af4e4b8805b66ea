//! LMDB engine through `heed`.

use crate::engine::KvSettings;
use crate::error::{KvError, KvResult};
use crate::storage::{
    ensure_active, ensure_writable, Direction, Entry, KeyValueStorage, KvTransaction, NamedMap,
};
use heed::types::{Bytes, DecodeIgnore, Str};
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use tracing::debug;

const ENGINE: &str = crate::LMDB_ENGINE_ID;

type BytesDb = Database<Bytes, Bytes>;

fn lmdb_err(error: heed::Error) -> KvError {
    KvError::engine(ENGINE, error)
}

/// A memory-mapped copy-on-write B-tree engine.
///
/// Every named map is an LMDB named database. LMDB itself allows a single
/// writer and lock-free readers.
pub struct LmdbKvStorage {
    env: Env,
    path: PathBuf,
}

impl LmdbKvStorage {
    /// Opens (or creates) an environment in `path`.
    pub fn open(path: &Path, settings: &KvSettings) -> KvResult<Self> {
        fs::create_dir_all(path)?;
        let mut options = EnvOpenOptions::new();
        options
            .map_size(settings.lmdb_map_size)
            .max_dbs(settings.lmdb_max_maps)
            .max_readers(settings.lmdb_max_readers);
        // Opening the same environment twice in one process is undefined
        // behavior in LMDB. Callers hold the directory lock for the lifetime
        // of the storage, which rules that out.
        #[allow(unsafe_code)]
        let env = unsafe { options.open(path) }.map_err(lmdb_err)?;
        debug!(path = %path.display(), map_size = settings.lmdb_map_size, "opened LMDB environment");
        Ok(Self {
            env,
            path: path.to_path_buf(),
        })
    }

    /// Environment directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStorage for LmdbKvStorage {
    fn engine(&self) -> &'static str {
        ENGINE
    }

    fn begin_transaction(&self) -> KvResult<Box<dyn KvTransaction + '_>> {
        let txn = self.env.write_txn().map_err(lmdb_err)?;
        Ok(Box::new(LmdbKvTransaction {
            env: &self.env,
            txn: Some(LmdbTxn::Write(txn)),
            readonly: false,
        }))
    }

    fn begin_readonly_transaction(&self) -> KvResult<Box<dyn KvTransaction + '_>> {
        let txn = self.env.read_txn().map_err(lmdb_err)?;
        Ok(Box::new(LmdbKvTransaction {
            env: &self.env,
            txn: Some(LmdbTxn::Read(txn)),
            readonly: true,
        }))
    }

    fn close(&self) -> KvResult<()> {
        self.env.force_sync().map_err(lmdb_err)
    }
}

enum LmdbTxn<'e> {
    Read(RoTxn<'e>),
    Write(RwTxn<'e>),
}

struct LmdbKvTransaction<'e> {
    env: &'e Env,
    txn: Option<LmdbTxn<'e>>,
    readonly: bool,
}

impl<'e> LmdbKvTransaction<'e> {
    fn ro(&self) -> KvResult<&RoTxn<'e>> {
        match &self.txn {
            Some(LmdbTxn::Read(txn)) => Ok(txn),
            Some(LmdbTxn::Write(txn)) => Ok(&**txn),
            None => Err(KvError::TransactionFinished),
        }
    }

    fn rw(&mut self) -> KvResult<&mut RwTxn<'e>> {
        ensure_writable(self.txn.is_none(), self.readonly)?;
        match &mut self.txn {
            Some(LmdbTxn::Write(txn)) => Ok(txn),
            _ => Err(KvError::ReadOnly),
        }
    }

    fn database(&self, map: &NamedMap) -> KvResult<Option<BytesDb>> {
        let txn = self.ro()?;
        self.env
            .open_database::<Bytes, Bytes>(txn, Some(map.name()))
            .map_err(lmdb_err)
    }
}

impl KvTransaction for LmdbKvTransaction<'_> {
    fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn is_finished(&self) -> bool {
        self.txn.is_none()
    }

    fn named_map(&mut self, name: &str, create: bool) -> KvResult<Option<NamedMap>> {
        let handle = NamedMap::new(name);
        if self.database(&handle)?.is_some() {
            return Ok(Some(handle));
        }
        if !create {
            return Ok(None);
        }
        let env = self.env;
        env.create_database::<Bytes, Bytes>(self.rw()?, Some(name))
            .map_err(lmdb_err)?;
        Ok(Some(handle))
    }

    fn map_names(&self) -> KvResult<Vec<String>> {
        let txn = self.ro()?;
        let Some(main) = self
            .env
            .open_database::<Str, DecodeIgnore>(txn, None)
            .map_err(lmdb_err)?
        else {
            return Ok(Vec::new());
        };
        let mut names = Vec::new();
        for item in main.iter(txn).map_err(lmdb_err)? {
            let (name, ()) = item.map_err(lmdb_err)?;
            names.push(name.to_string());
        }
        Ok(names)
    }

    fn map_size(&self, map: &NamedMap) -> KvResult<u64> {
        match self.database(map)? {
            Some(db) => db.len(self.ro()?).map_err(lmdb_err),
            None => Ok(0),
        }
    }

    fn get(&self, map: &NamedMap, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        match self.database(map)? {
            Some(db) => Ok(db
                .get(self.ro()?, key)
                .map_err(lmdb_err)?
                .map(<[u8]>::to_vec)),
            None => Ok(None),
        }
    }

    fn put(&mut self, map: &NamedMap, key: &[u8], value: &[u8]) -> KvResult<bool> {
        let db = self
            .database(map)?
            .ok_or_else(|| KvError::engine(ENGINE, format!("map {} does not exist", map.name())))?;
        let previous = db.get(self.ro()?, key).map_err(lmdb_err)?.map(<[u8]>::to_vec);
        if previous.as_deref() == Some(value) {
            return Ok(false);
        }
        db.put(self.rw()?, key, value).map_err(lmdb_err)?;
        Ok(true)
    }

    fn delete(&mut self, map: &NamedMap, key: &[u8]) -> KvResult<bool> {
        ensure_writable(self.txn.is_none(), self.readonly)?;
        match self.database(map)? {
            Some(db) => db.delete(self.rw()?, key).map_err(lmdb_err),
            None => Ok(false),
        }
    }

    fn clear_map(&mut self, map: &NamedMap) -> KvResult<()> {
        ensure_writable(self.txn.is_none(), self.readonly)?;
        if let Some(db) = self.database(map)? {
            db.clear(self.rw()?).map_err(lmdb_err)?;
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
        let Some(db) = self.database(map)? else {
            return Ok(None);
        };
        // LMDB rejects zero-length keys, even as range bounds. No stored key
        // sorts below the empty key.
        let from = match from {
            Bound::Included(key) | Bound::Excluded(key) if key.is_empty() => match direction {
                Direction::Forward => Bound::Unbounded,
                Direction::Backward => return Ok(None),
            },
            other => other,
        };
        let txn = self.ro()?;
        let found = match direction {
            Direction::Forward => db
                .range(txn, &(from, Bound::Unbounded))
                .map_err(lmdb_err)?
                .next(),
            Direction::Backward => db
                .rev_range(txn, &(Bound::Unbounded, from))
                .map_err(lmdb_err)?
                .next(),
        };
        match found {
            Some(item) => {
                let (key, value) = item.map_err(lmdb_err)?;
                Ok(Some((key.to_vec(), value.to_vec())))
            }
            None => Ok(None),
        }
    }

    fn commit(&mut self) -> KvResult<()> {
        match self.txn.take() {
            Some(LmdbTxn::Write(txn)) => txn.commit().map_err(lmdb_err),
            Some(LmdbTxn::Read(_)) => Ok(()),
            None => Err(KvError::TransactionFinished),
        }
    }

    fn abort(&mut self) -> KvResult<()> {
        match self.txn.take() {
            Some(LmdbTxn::Write(txn)) => {
                txn.abort();
                Ok(())
            }
            Some(LmdbTxn::Read(_)) => Ok(()),
            None => Err(KvError::TransactionFinished),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(dir: &Path) -> LmdbKvStorage {
        LmdbKvStorage::open(dir, &KvSettings::default().lmdb_map_size(16 << 20)).unwrap()
    }

    #[test]
    fn empty_prefix_scans_every_key() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(dir.path());
        storage.put("m", b"b", b"2").unwrap();
        storage.put("m", b"a", b"1").unwrap();

        let txn = storage.begin_readonly_transaction().unwrap();
        let map = NamedMap::new("m");
        let keys: Vec<_> = txn.scan_prefix(&map, &[]).map(|e| e.unwrap().0).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(
            txn.seek(&map, Bound::Excluded(&[][..]), Direction::Backward).unwrap(),
            None
        );
    }

    #[test]
    fn writes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = open(dir.path());
            storage.put("m", b"k", b"v").unwrap();
            storage.close().unwrap();
        }
        let storage = open(dir.path());
        assert_eq!(storage.all("m").unwrap(), vec![(b"k".to_vec(), b"v".to_vec())]);
    }
}
