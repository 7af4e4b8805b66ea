//! Entity handles.

use crate::error::{ErsError, ErsResult};
use crate::iterable::{EntityIterable, Query};
use crate::transaction::Transaction;
use crate::types::EntityId;
use ers_codec::{Binding, PropertyValue};
use std::fmt;

/// A handle to one entity, bound to the transaction that produced it.
///
/// Handles are cheap to copy. Every operation checks that the entity still
/// exists in the transaction and fails with [`ErsError::EntityNotFound`]
/// otherwise.
#[derive(Clone, Copy)]
pub struct Entity<'t> {
    txn: &'t Transaction<'t>,
    id: EntityId,
}

impl<'t> Entity<'t> {
    pub(crate) fn new(txn: &'t Transaction<'t>, id: EntityId) -> Self {
        Self { txn, id }
    }

    /// The entity id.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// The owning transaction.
    #[must_use]
    pub fn transaction(&self) -> &'t Transaction<'t> {
        self.txn
    }

    /// Whether the entity exists in the owning transaction.
    pub fn exists(&self) -> ErsResult<bool> {
        self.txn.backend()?.entity_exists(self.id)
    }

    fn check_exists(&self) -> ErsResult<()> {
        if self.exists()? {
            Ok(())
        } else {
            Err(ErsError::EntityNotFound(self.id))
        }
    }

    /// Reads a property as stored.
    pub fn get_raw_property(&self, name: &str) -> ErsResult<Option<Vec<u8>>> {
        self.check_exists()?;
        self.txn.backend()?.property(self.id, name)
    }

    /// Writes (`Some`) or removes (`None`) a property.
    pub fn set_raw_property(&self, name: &str, value: Option<&[u8]>) -> ErsResult<()> {
        let backend = self.txn.backend_mut()?;
        self.check_exists()?;
        backend.set_property(self.id, name, value)
    }

    /// Reads a blob as stored.
    pub fn get_raw_blob(&self, name: &str) -> ErsResult<Option<Vec<u8>>> {
        self.check_exists()?;
        self.txn.backend()?.blob(self.id, name)
    }

    /// Writes (`Some`) or removes (`None`) a blob.
    pub fn set_raw_blob(&self, name: &str, value: Option<&[u8]>) -> ErsResult<()> {
        let backend = self.txn.backend_mut()?;
        self.check_exists()?;
        backend.set_blob(self.id, name, value)
    }

    /// Reads and decodes a property written with the general encoding.
    pub fn get<T: Binding>(&self, name: &str) -> ErsResult<Option<T>> {
        self.get_raw_property(name)?
            .map(|bytes| T::decode(&bytes))
            .transpose()
            .map_err(Into::into)
    }

    /// Reads and decodes a property written with the compact encoding.
    pub fn get_compressed<T: Binding>(&self, name: &str) -> ErsResult<Option<T>> {
        self.get_raw_property(name)?
            .map(|bytes| T::decode_compressed(&bytes))
            .transpose()
            .map_err(Into::into)
    }

    /// Reads and decodes a non-searchable value.
    pub fn get_blob<T: Binding>(&self, name: &str) -> ErsResult<Option<T>> {
        self.get_raw_blob(name)?
            .map(|bytes| T::decode(&bytes))
            .transpose()
            .map_err(Into::into)
    }

    /// Reads and decodes a non-searchable value written with the compact
    /// encoding.
    pub fn get_compressed_blob<T: Binding>(&self, name: &str) -> ErsResult<Option<T>> {
        self.get_raw_blob(name)?
            .map(|bytes| T::decode_compressed(&bytes))
            .transpose()
            .map_err(Into::into)
    }

    /// Encodes and writes a value.
    ///
    /// Searchable values become properties; values wrapped with
    /// `non_searchable()` become blobs.
    ///
    /// # Errors
    ///
    /// Fails with a codec error when a negative integer is written with the
    /// compact encoding.
    pub fn set(&self, name: &str, value: impl Into<PropertyValue>) -> ErsResult<()> {
        let value = value.into();
        let bytes = value.encode()?;
        if value.searchable {
            self.set_raw_property(name, Some(&bytes))
        } else {
            self.set_raw_blob(name, Some(&bytes))
        }
    }

    /// Removes a property.
    pub fn remove(&self, name: &str) -> ErsResult<()> {
        self.set_raw_property(name, None)
    }

    /// Removes a blob.
    pub fn delete_blob(&self, name: &str) -> ErsResult<()> {
        self.set_raw_blob(name, None)
    }

    /// Live targets of a link, ordered by id.
    pub fn get_links(&self, name: &str) -> ErsResult<EntityIterable<'t>> {
        self.check_exists()?;
        Ok(EntityIterable::new(
            self.txn,
            Query::Links {
                source: self.id,
                name: name.to_string(),
            },
        ))
    }

    /// Adds a link. Returns false if it was already present.
    pub fn add_link(&self, name: &str, target: impl Into<EntityId>) -> ErsResult<bool> {
        let target = target.into();
        let backend = self.txn.backend_mut()?;
        self.check_exists()?;
        if !backend.entity_exists(target)? {
            return Err(ErsError::EntityNotFound(target));
        }
        backend.add_link(self.id, name, target)
    }

    /// Adds links to every target. Returns how many were new.
    pub fn add_links<I>(&self, name: &str, targets: I) -> ErsResult<usize>
    where
        I: IntoIterator,
        I::Item: Into<EntityId>,
    {
        let mut added = 0;
        for target in targets {
            if self.add_link(name, target)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Removes a link. Returns false if it was absent. Both ends must
    /// exist.
    pub fn delete_link(&self, name: &str, target: impl Into<EntityId>) -> ErsResult<bool> {
        let target = target.into();
        let backend = self.txn.backend_mut()?;
        self.check_exists()?;
        if !backend.entity_exists(target)? {
            return Err(ErsError::EntityNotFound(target));
        }
        backend.delete_link(self.id, name, target)
    }

    /// Deletes the entity with its attributes and outgoing links.
    pub fn delete(&self) -> ErsResult<()> {
        let backend = self.txn.backend_mut()?;
        if backend.delete_entity(self.id)? {
            Ok(())
        } else {
            Err(ErsError::EntityNotFound(self.id))
        }
    }
}

impl From<&Entity<'_>> for EntityId {
    fn from(entity: &Entity<'_>) -> Self {
        entity.id
    }
}

impl From<Entity<'_>> for EntityId {
    fn from(entity: Entity<'_>) -> Self {
        entity.id
    }
}

impl PartialEq for Entity<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && std::ptr::eq(self.txn, other.txn)
    }
}

impl Eq for Entity<'_> {}

impl fmt::Debug for Entity<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Entity").field(&self.id).finish()
    }
}
