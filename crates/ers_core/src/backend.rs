//! Backend traits.
//!
//! A backend provides storage-level handles ([`StorageBackend`]) and
//! transactions ([`BackendTransaction`]). The public [`crate::Transaction`],
//! [`crate::Entity`] and [`crate::EntityIterable`] types sit on top and add
//! state checks, typed accessors and set algebra, so every backend behaves
//! identically to callers.
//!
//! Backend transactions take `&self` everywhere; implementations use
//! interior mutability. Type names are resolved to ids by the caller, and
//! every id passed in refers to an entity whose existence the caller has
//! already checked where that matters.

use crate::error::{ErsError, ErsResult};
use crate::types::{AttributeKind, EntityId, FindOption};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

/// A transaction of one backend.
pub trait BackendTransaction {
    /// Whether the transaction rejects writes.
    fn is_readonly(&self) -> bool;

    /// Creates an entity, registering the type on first use.
    fn new_entity(&self, type_name: &str) -> ErsResult<EntityId>;

    /// Whether the entity exists and is not deleted.
    fn entity_exists(&self, id: EntityId) -> ErsResult<bool>;

    /// Deletes the entity with its attributes and outgoing links.
    /// Returns false if it did not exist.
    fn delete_entity(&self, id: EntityId) -> ErsResult<bool>;

    /// Resolves a type name without registering it.
    fn type_id(&self, type_name: &str) -> ErsResult<Option<u32>>;

    /// All registered types by name.
    fn types(&self) -> ErsResult<BTreeMap<String, u32>>;

    /// Names ever written for a kind of attribute on a type, sorted.
    fn attribute_names(&self, type_id: u32, kind: AttributeKind) -> ErsResult<BTreeSet<String>>;

    /// Live entities of a type, ordered by instance id.
    fn all(&self, type_id: u32) -> ErsResult<Vec<EntityId>>;

    /// Entities whose property compares to `value` as requested, ordered by
    /// `(value, instance id)`.
    fn find(
        &self,
        type_id: u32,
        property: &str,
        value: &[u8],
        option: FindOption,
    ) -> ErsResult<Vec<EntityId>>;

    /// Reads a property.
    fn property(&self, id: EntityId, name: &str) -> ErsResult<Option<Vec<u8>>>;

    /// Writes (`Some`) or removes (`None`) a property.
    fn set_property(&self, id: EntityId, name: &str, value: Option<&[u8]>) -> ErsResult<()>;

    /// Reads a blob.
    fn blob(&self, id: EntityId, name: &str) -> ErsResult<Option<Vec<u8>>>;

    /// Writes (`Some`) or removes (`None`) a blob.
    fn set_blob(&self, id: EntityId, name: &str, value: Option<&[u8]>) -> ErsResult<()>;

    /// Live link targets, ordered by id.
    fn links(&self, id: EntityId, name: &str) -> ErsResult<Vec<EntityId>>;

    /// Adds a link. Returns false if it was already present.
    fn add_link(&self, id: EntityId, name: &str, target: EntityId) -> ErsResult<bool>;

    /// Removes a link. Returns false if it was absent.
    fn delete_link(&self, id: EntityId, name: &str, target: EntityId) -> ErsResult<bool>;

    /// Removes every type, entity and attribute. Counters keep running.
    fn drop_all(&self) -> ErsResult<()>;

    /// Publishes all writes.
    fn commit(&self) -> ErsResult<()>;

    /// Discards all writes.
    fn abort(&self) -> ErsResult<()>;
}

/// A storage implementation selectable through [`crate::BackendRegistry`].
pub trait StorageBackend: Send + Sync {
    /// Stable backend id, e.g. `"sql"`.
    fn backend_id(&self) -> &'static str;

    /// Whether all data lives in process memory.
    fn is_in_ram(&self) -> bool {
        false
    }

    /// Whether the storage rejects every mutation.
    fn is_immutable(&self) -> bool {
        false
    }

    /// Starts a transaction.
    fn begin(&self, readonly: bool) -> ErsResult<Box<dyn BackendTransaction + '_>>;

    /// Produces a frozen copy of the committed state, if the backend has a
    /// native way to do so. Backends returning `None` are copied entity by
    /// entity into an immutable in-memory storage.
    fn freeze(&self, _storage_id: &str) -> ErsResult<Option<Box<dyn StorageBackend>>> {
        Ok(None)
    }

    /// Writes a snapshot of an immutable storage.
    fn dump(&self, _out: &mut dyn Write) -> ErsResult<()> {
        Err(ErsError::unsupported(format!(
            "dump on {} backend",
            self.backend_id()
        )))
    }

    /// Releases resources.
    fn close(&self) -> ErsResult<()>;
}
