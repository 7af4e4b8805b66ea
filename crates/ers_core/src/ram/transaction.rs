//! Optimistic transactions over a RAM storage.

use super::data::RamData;
use super::RamStorage;
use crate::backend::BackendTransaction;
use crate::error::{ErsError, ErsResult};
use crate::types::{AttributeKind, EntityId, FindOption};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Reads the version current at begin; the first write clones it into a
/// private working copy. Commit publishes the copy only if no other
/// transaction committed in between.
pub(crate) struct RamTransaction<'s> {
    storage: &'s RamStorage,
    base: Arc<RamData>,
    working: RefCell<Option<RamData>>,
    readonly: bool,
}

impl<'s> RamTransaction<'s> {
    pub(crate) fn new(storage: &'s RamStorage, readonly: bool) -> Self {
        Self {
            storage,
            base: storage.current(),
            working: RefCell::new(None),
            readonly,
        }
    }

    fn read<R>(&self, f: impl FnOnce(&RamData) -> R) -> R {
        match self.working.borrow().as_ref() {
            Some(data) => f(data),
            None => f(self.base.as_ref()),
        }
    }

    fn write<R>(&self, f: impl FnOnce(&mut RamData) -> R) -> ErsResult<R> {
        if self.readonly {
            return Err(ErsError::ReadOnly);
        }
        if self.storage.is_frozen() {
            return Err(ErsError::Immutable);
        }
        let mut working = self.working.borrow_mut();
        let data = working.get_or_insert_with(|| RamData::clone(&self.base));
        Ok(f(data))
    }
}

impl BackendTransaction for RamTransaction<'_> {
    fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn new_entity(&self, type_name: &str) -> ErsResult<EntityId> {
        self.write(|data| data.new_entity(type_name))
    }

    fn entity_exists(&self, id: EntityId) -> ErsResult<bool> {
        Ok(self.read(|data| data.exists(id)))
    }

    fn delete_entity(&self, id: EntityId) -> ErsResult<bool> {
        if !self.read(|data| data.exists(id)) {
            return Ok(false);
        }
        self.write(|data| data.delete_entity(id))
    }

    fn type_id(&self, type_name: &str) -> ErsResult<Option<u32>> {
        Ok(self.read(|data| data.type_id(type_name)))
    }

    fn types(&self) -> ErsResult<BTreeMap<String, u32>> {
        Ok(self.read(|data| data.types.clone()))
    }

    fn attribute_names(&self, type_id: u32, kind: AttributeKind) -> ErsResult<BTreeSet<String>> {
        Ok(self.read(|data| data.attribute_names(type_id, kind)))
    }

    fn all(&self, type_id: u32) -> ErsResult<Vec<EntityId>> {
        Ok(self.read(|data| data.all(type_id)))
    }

    fn find(
        &self,
        type_id: u32,
        property: &str,
        value: &[u8],
        option: FindOption,
    ) -> ErsResult<Vec<EntityId>> {
        Ok(self.read(|data| data.find(type_id, property, value, option)))
    }

    fn property(&self, id: EntityId, name: &str) -> ErsResult<Option<Vec<u8>>> {
        Ok(self.read(|data| data.property(id, name)))
    }

    fn set_property(&self, id: EntityId, name: &str, value: Option<&[u8]>) -> ErsResult<()> {
        self.write(|data| data.set_property(id, name, value))
    }

    fn blob(&self, id: EntityId, name: &str) -> ErsResult<Option<Vec<u8>>> {
        Ok(self.read(|data| data.blob(id, name)))
    }

    fn set_blob(&self, id: EntityId, name: &str, value: Option<&[u8]>) -> ErsResult<()> {
        self.write(|data| data.set_blob(id, name, value))
    }

    fn links(&self, id: EntityId, name: &str) -> ErsResult<Vec<EntityId>> {
        Ok(self.read(|data| data.links(id, name)))
    }

    fn add_link(&self, id: EntityId, name: &str, target: EntityId) -> ErsResult<bool> {
        self.write(|data| data.add_link(id, name, target))
    }

    fn delete_link(&self, id: EntityId, name: &str, target: EntityId) -> ErsResult<bool> {
        self.write(|data| data.delete_link(id, name, target))
    }

    fn drop_all(&self) -> ErsResult<()> {
        self.write(RamData::drop_all)
    }

    fn commit(&self) -> ErsResult<()> {
        let Some(data) = self.working.borrow_mut().take() else {
            return Ok(());
        };
        let mut current = self.storage.current.lock();
        if !Arc::ptr_eq(&*current, &self.base) {
            debug!("ram commit lost to a concurrent writer");
            return Err(ErsError::conflict(
                "ram storage was modified by a concurrent transaction",
            ));
        }
        *current = Arc::new(data);
        Ok(())
    }

    fn abort(&self) -> ErsResult<()> {
        self.working.borrow_mut().take();
        Ok(())
    }
}
