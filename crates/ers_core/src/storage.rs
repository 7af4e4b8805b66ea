//! The storage facade.

use crate::backend::StorageBackend;
use crate::error::{ErsError, ErsResult};
use crate::kv::KvErsStorage;
use crate::ram::{snapshot_of, RamStorage};
use crate::registry::BackendRegistry;
use crate::settings::{ErsSettings, KvErsSettings, RamErsSettings, SqlErsSettings};
use crate::sql::SqlStorage;
use crate::transaction::Transaction;
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attempts made by [`EntityRelationshipStorage::transactional_optimistic`]
/// callers that have no better number.
pub const DEFAULT_OPTIMISTIC_ATTEMPTS: usize = 5;

/// An entity-relationship storage.
///
/// `EntityRelationshipStorage` wraps one backend and hands out
/// [`Transaction`]s. It is `Send + Sync`; share it behind an `Arc` to run
/// transactions from several threads.
///
/// # Opening a storage
///
/// ```rust
/// use ers_core::{EntityRelationshipStorage, ErsSettings};
///
/// // By backend id, as a configuration file would name it
/// let storage = EntityRelationshipStorage::open("sql", None, &ErsSettings::Empty)?;
/// assert_eq!(storage.backend_id(), "sql");
///
/// // Or directly
/// let storage = EntityRelationshipStorage::ram();
/// assert!(storage.is_in_ram());
/// # Ok::<(), ers_core::ErsError>(())
/// ```
///
/// # Immutable snapshots
///
/// [`as_immutable`](Self::as_immutable) freezes the committed state into a
/// read-only RAM storage, which can be written with [`dump`](Self::dump)
/// and read back with [`load`](Self::load).
pub struct EntityRelationshipStorage {
    backend: Box<dyn StorageBackend>,
    closed: AtomicBool,
}

impl EntityRelationshipStorage {
    /// Opens a storage through the built-in backend registry.
    ///
    /// `location` is the storage directory for on-disk backends; `None`
    /// keeps the data in memory.
    ///
    /// # Errors
    ///
    /// Returns [`ErsError::UnknownBackend`] for an unknown `backend_id`,
    /// [`ErsError::InvalidSettings`] for settings of another backend and
    /// [`ErsError::StorageLocked`] if the directory is in use.
    pub fn open(
        backend_id: &str,
        location: Option<&Path>,
        settings: &ErsSettings,
    ) -> ErsResult<Self> {
        Self::open_with(&BackendRegistry::with_builtins(), backend_id, location, settings)
    }

    /// Opens a storage through a caller-supplied registry.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub fn open_with(
        registry: &BackendRegistry,
        backend_id: &str,
        location: Option<&Path>,
        settings: &ErsSettings,
    ) -> ErsResult<Self> {
        Ok(Self::from_backend(registry.open(backend_id, location, settings)?))
    }

    /// Creates an empty in-memory storage.
    #[must_use]
    pub fn ram() -> Self {
        Self::ram_with(RamErsSettings::default())
    }

    /// Creates an empty in-memory storage with settings.
    #[must_use]
    pub fn ram_with(settings: RamErsSettings) -> Self {
        Self::from_backend(Box::new(RamStorage::new(settings)))
    }

    /// Opens a relational storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or is locked.
    pub fn sql(location: Option<&Path>, settings: &SqlErsSettings) -> ErsResult<Self> {
        Ok(Self::from_backend(Box::new(SqlStorage::open(location, settings)?)))
    }

    /// Opens a key-value storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be opened or is locked.
    pub fn kv(location: Option<&Path>, settings: &KvErsSettings) -> ErsResult<Self> {
        Ok(Self::from_backend(Box::new(KvErsStorage::open(location, settings)?)))
    }

    /// Wraps an already opened backend.
    #[must_use]
    pub fn from_backend(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend,
            closed: AtomicBool::new(false),
        }
    }

    /// Id of the backend in use.
    #[must_use]
    pub fn backend_id(&self) -> &'static str {
        self.backend.backend_id()
    }

    /// Whether the data lives only in memory.
    #[must_use]
    pub fn is_in_ram(&self) -> bool {
        self.backend.is_in_ram()
    }

    /// Whether the storage rejects every write.
    #[must_use]
    pub fn is_immutable(&self) -> bool {
        self.backend.is_immutable()
    }

    /// Whether [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> ErsResult<()> {
        if self.is_closed() {
            Err(ErsError::Closed)
        } else {
            Ok(())
        }
    }

    /// Begins a transaction.
    ///
    /// Transactions on immutable storages are always read-only.
    ///
    /// # Errors
    ///
    /// Returns [`ErsError::Closed`] after [`close`](Self::close), or the
    /// backend's error if it cannot start a transaction.
    pub fn begin_transaction(&self, readonly: bool) -> ErsResult<Transaction<'_>> {
        self.ensure_open()?;
        let immutable = self.backend.is_immutable();
        let inner = self.backend.begin(readonly || immutable)?;
        Ok(Transaction::new(inner, readonly, immutable))
    }

    /// Runs `f` in a transaction and commits it if `f` succeeds.
    ///
    /// The transaction is aborted if `f` fails. If `f` finishes the
    /// transaction itself, its outcome stands.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, or the commit error.
    pub fn transactional<T, F>(&self, readonly: bool, f: F) -> ErsResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> ErsResult<T>,
    {
        let txn = self.begin_transaction(readonly)?;
        match f(&txn) {
            Ok(value) => {
                if !txn.is_finished() {
                    txn.commit()?;
                }
                Ok(value)
            }
            Err(e) => {
                if !txn.is_finished() {
                    if let Err(abort) = txn.abort() {
                        warn!(error = %abort, "failed to abort transaction");
                    }
                }
                Err(e)
            }
        }
    }

    /// Runs `f` in a writable transaction, retrying on conflicts.
    ///
    /// `f` runs at most `attempts` times (at least once). Each attempt gets
    /// a fresh transaction, so `f` must not carry state between attempts
    /// that assumes the previous one committed.
    ///
    /// # Errors
    ///
    /// Returns [`ErsError::Conflict`] when every attempt conflicted, or the
    /// first error that is not a conflict.
    pub fn transactional_optimistic<T, F>(&self, attempts: usize, mut f: F) -> ErsResult<T>
    where
        F: FnMut(&Transaction<'_>) -> ErsResult<T>,
    {
        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            match self.transactional(false, &mut f) {
                Err(e) if e.is_conflict() => {
                    debug!(attempt, attempts, error = %e, "optimistic transaction conflicted");
                }
                result => return result,
            }
        }
        warn!(attempts, "optimistic transaction gave up");
        Err(ErsError::conflict(format!(
            "failed to commit transaction after {attempts} optimistic attempts"
        )))
    }

    /// Returns an immutable copy of the committed state.
    ///
    /// A RAM storage shares its committed version and, with a dump directory
    /// configured, writes it to `immutable_dumps_path/storage_id` or reuses
    /// an existing dump there. Other backends are copied into a frozen RAM
    /// storage.
    ///
    /// # Errors
    ///
    /// Returns [`ErsError::Closed`] after [`close`](Self::close), or the
    /// error of reading the backend or writing the dump.
    pub fn as_immutable(&self, storage_id: &str) -> ErsResult<Self> {
        self.ensure_open()?;
        if let Some(frozen) = self.backend.freeze(storage_id)? {
            return Ok(Self::from_backend(frozen));
        }
        let data = snapshot_of(self.backend.as_ref())?;
        info!(
            backend = self.backend_id(),
            storage_id,
            "copied storage into an immutable ram storage"
        );
        Ok(Self::from_backend(Box::new(RamStorage::frozen(
            Arc::new(data),
            RamErsSettings::default(),
        ))))
    }

    /// Writes the dump of an immutable storage.
    ///
    /// # Errors
    ///
    /// Returns [`ErsError::Unsupported`] if the storage is not immutable.
    pub fn dump<W: Write>(&self, mut out: W) -> ErsResult<()> {
        self.ensure_open()?;
        self.backend.dump(&mut out)?;
        out.flush()?;
        Ok(())
    }

    /// Reads an immutable storage from a dump.
    ///
    /// # Errors
    ///
    /// Returns [`ErsError::InvalidDump`] if the dump is malformed or its
    /// digest does not match.
    pub fn load<R: Read>(mut reader: R, settings: RamErsSettings) -> ErsResult<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(Self::from_backend(Box::new(RamStorage::load(
            &bytes, settings,
        )?)))
    }

    /// Reads the immutable storage dumped under `storage_id`, if its dump
    /// file exists.
    ///
    /// # Errors
    ///
    /// Returns [`ErsError::InvalidDump`] if the dump file is malformed.
    pub fn try_load(settings: &RamErsSettings, storage_id: &str) -> ErsResult<Option<Self>> {
        let loaded = RamStorage::try_load(settings, storage_id)?;
        Ok(loaded.map(|storage| Self::from_backend(Box::new(storage))))
    }

    /// Closes the storage.
    ///
    /// Further calls do nothing. A failure to close the backend is logged.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        match self.backend.close() {
            Ok(()) => debug!(backend = self.backend_id(), "closed storage"),
            Err(e) => warn!(backend = self.backend_id(), error = %e, "failed to close storage"),
        }
    }
}

impl Drop for EntityRelationshipStorage {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for EntityRelationshipStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRelationshipStorage")
            .field("backend", &self.backend_id())
            .field("immutable", &self.is_immutable())
            .field("closed", &self.is_closed())
            .finish()
    }
}
