//! Transactions.

use crate::backend::BackendTransaction;
use crate::entity::Entity;
use crate::error::{ErsError, ErsResult};
use crate::iterable::{EntityIterable, Query};
use crate::types::{AttributeKind, EntityId, FindOption};
use ers_codec::PropertyValue;
use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::warn;

/// A unit of consistency over an [`crate::EntityRelationshipStorage`].
///
/// All reads observe the transaction's own uncommitted writes. Once
/// [`Transaction::commit`] or [`Transaction::abort`] has run, every
/// operation fails with [`ErsError::TransactionFinished`]. Dropping an
/// unfinished transaction aborts it.
///
/// # Example
///
/// ```rust
/// use ers_core::EntityRelationshipStorage;
///
/// let storage = EntityRelationshipStorage::ram();
/// let txn = storage.begin_transaction(false).unwrap();
/// let user = txn.new_entity("User").unwrap();
/// user.set("login", "alice").unwrap();
/// txn.commit().unwrap();
/// ```
pub struct Transaction<'s> {
    inner: Box<dyn BackendTransaction + 's>,
    readonly: bool,
    immutable: bool,
    finished: Cell<bool>,
}

impl<'s> Transaction<'s> {
    pub(crate) fn new(
        inner: Box<dyn BackendTransaction + 's>,
        readonly: bool,
        immutable: bool,
    ) -> Self {
        Self {
            inner,
            readonly,
            immutable,
            finished: Cell::new(false),
        }
    }

    /// Whether the transaction rejects writes.
    #[must_use]
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Whether the transaction was committed or aborted.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.get()
    }

    pub(crate) fn backend(&self) -> ErsResult<&(dyn BackendTransaction + 's)> {
        if self.finished.get() {
            return Err(ErsError::TransactionFinished);
        }
        Ok(self.inner.as_ref())
    }

    pub(crate) fn backend_mut(&self) -> ErsResult<&(dyn BackendTransaction + 's)> {
        let backend = self.backend()?;
        if self.immutable {
            return Err(ErsError::Immutable);
        }
        if self.readonly {
            return Err(ErsError::ReadOnly);
        }
        Ok(backend)
    }

    /// Creates an entity of `type_name`.
    pub fn new_entity(&self, type_name: &str) -> ErsResult<Entity<'_>> {
        let id = self.backend_mut()?.new_entity(type_name)?;
        Ok(Entity::new(self, id))
    }

    /// Returns the entity if it exists.
    pub fn get_entity_or_none(&self, id: EntityId) -> ErsResult<Option<Entity<'_>>> {
        if self.backend()?.entity_exists(id)? {
            Ok(Some(Entity::new(self, id)))
        } else {
            Ok(None)
        }
    }

    /// Returns a handle without checking existence. Operations on it fail
    /// with [`ErsError::EntityNotFound`] if the entity does not exist.
    #[must_use]
    pub fn get_entity_unsafe(&self, id: EntityId) -> Entity<'_> {
        Entity::new(self, id)
    }

    /// Whether the entity was deleted (or never existed).
    pub fn is_entity_deleted(&self, id: EntityId) -> ErsResult<bool> {
        Ok(!self.backend()?.entity_exists(id)?)
    }

    /// Deletes an entity. Returns false if it did not exist.
    pub fn delete_entity(&self, id: EntityId) -> ErsResult<bool> {
        self.backend_mut()?.delete_entity(id)
    }

    /// Resolves a type name, or `None` if it was never used.
    pub fn get_type_id(&self, type_name: &str) -> ErsResult<Option<u32>> {
        self.backend()?.type_id(type_name)
    }

    /// All known types by name.
    pub fn get_types(&self) -> ErsResult<BTreeMap<String, u32>> {
        self.backend()?.types()
    }

    fn attribute_names(&self, type_name: &str, kind: AttributeKind) -> ErsResult<BTreeSet<String>> {
        let backend = self.backend()?;
        match backend.type_id(type_name)? {
            Some(type_id) => backend.attribute_names(type_id, kind),
            None => Ok(BTreeSet::new()),
        }
    }

    /// Names of properties ever written on `type_name`.
    pub fn get_property_names(&self, type_name: &str) -> ErsResult<BTreeSet<String>> {
        self.attribute_names(type_name, AttributeKind::Property)
    }

    /// Names of blobs ever written on `type_name`.
    pub fn get_blob_names(&self, type_name: &str) -> ErsResult<BTreeSet<String>> {
        self.attribute_names(type_name, AttributeKind::Blob)
    }

    /// Names of links ever added from `type_name`.
    pub fn get_link_names(&self, type_name: &str) -> ErsResult<BTreeSet<String>> {
        self.attribute_names(type_name, AttributeKind::Link)
    }

    /// Every live entity of `type_name`, in creation order.
    pub fn all(&self, type_name: &str) -> ErsResult<EntityIterable<'_>> {
        self.backend()?;
        Ok(EntityIterable::new(
            self,
            Query::All {
                type_name: type_name.to_string(),
            },
        ))
    }

    /// Entities whose property compares to `value` as `option` says.
    ///
    /// The value must be encoded the way it was stored: pass a
    /// `.compressed()` value to query a compressed property.
    pub fn find_with(
        &self,
        type_name: &str,
        property: &str,
        value: impl Into<PropertyValue>,
        option: FindOption,
    ) -> ErsResult<EntityIterable<'_>> {
        let value = value.into();
        if !value.searchable {
            return Err(ErsError::unsupported(format!(
                "lookup by non-searchable value of {type_name}.{property}"
            )));
        }
        self.find_raw(type_name, property, &value.encode()?, option)
    }

    /// Like [`Transaction::find_with`] with an already encoded value.
    pub fn find_raw(
        &self,
        type_name: &str,
        property: &str,
        value: &[u8],
        option: FindOption,
    ) -> ErsResult<EntityIterable<'_>> {
        self.backend()?;
        Ok(EntityIterable::new(
            self,
            Query::Find {
                type_name: type_name.to_string(),
                property: property.to_string(),
                value: value.to_vec(),
                option,
            },
        ))
    }

    /// Entities whose property equals `value`.
    pub fn find(
        &self,
        type_name: &str,
        property: &str,
        value: impl Into<PropertyValue>,
    ) -> ErsResult<EntityIterable<'_>> {
        self.find_with(type_name, property, value, FindOption::Eq)
    }

    /// Entities whose property is less than `value`.
    pub fn find_lt(
        &self,
        type_name: &str,
        property: &str,
        value: impl Into<PropertyValue>,
    ) -> ErsResult<EntityIterable<'_>> {
        self.find_with(type_name, property, value, FindOption::Lt)
    }

    /// Entities whose property is less than or equal to `value`.
    pub fn find_eq_or_lt(
        &self,
        type_name: &str,
        property: &str,
        value: impl Into<PropertyValue>,
    ) -> ErsResult<EntityIterable<'_>> {
        self.find_with(type_name, property, value, FindOption::EqOrLt)
    }

    /// Entities whose property is greater than `value`.
    pub fn find_gt(
        &self,
        type_name: &str,
        property: &str,
        value: impl Into<PropertyValue>,
    ) -> ErsResult<EntityIterable<'_>> {
        self.find_with(type_name, property, value, FindOption::Gt)
    }

    /// Entities whose property is greater than or equal to `value`.
    pub fn find_eq_or_gt(
        &self,
        type_name: &str,
        property: &str,
        value: impl Into<PropertyValue>,
    ) -> ErsResult<EntityIterable<'_>> {
        self.find_with(type_name, property, value, FindOption::EqOrGt)
    }

    /// Returns the single entity whose property equals `value`, creating it
    /// (with that property set) if there is none.
    ///
    /// # Errors
    ///
    /// [`ErsError::ConsistencyViolation`] if several entities match.
    pub fn find_or_new(
        &self,
        type_name: &str,
        property: &str,
        value: impl Into<PropertyValue>,
    ) -> ErsResult<Entity<'_>> {
        let value = value.into();
        if let Some(existing) = self
            .find(type_name, property, value.clone())?
            .exact_single_or_none()?
        {
            return Ok(existing);
        }
        let entity = self.new_entity(type_name)?;
        entity.set(property, value)?;
        Ok(entity)
    }

    /// Removes every type, entity and attribute.
    pub fn drop_all(&self) -> ErsResult<()> {
        self.backend_mut()?.drop_all()
    }

    /// Publishes all writes and finishes the transaction.
    ///
    /// # Errors
    ///
    /// [`ErsError::Conflict`] if a concurrent writer won. The transaction
    /// is finished either way.
    pub fn commit(&self) -> ErsResult<()> {
        let backend = self.backend()?;
        self.finished.set(true);
        backend.commit()
    }

    /// Discards all writes and finishes the transaction.
    pub fn abort(&self) -> ErsResult<()> {
        let backend = self.backend()?;
        self.finished.set(true);
        backend.abort()
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished.get() {
            self.finished.set(true);
            if let Err(e) = self.inner.abort() {
                warn!(error = %e, "failed to abort dropped transaction");
            }
        }
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("readonly", &self.readonly)
            .field("immutable", &self.immutable)
            .field("finished", &self.finished.get())
            .finish()
    }
}
