//! Entity transactions over a key-value transaction.

use super::keys::{
    attribute_map, decode_u32, decode_u64, entities_map, index_key, index_key_instance,
    index_map, index_range, instance_key, link_key, link_target, schema_key, ENTITY_SEQUENCE,
    SCHEMA_MAP, SEQUENCES_MAP, TYPES_MAP, TYPE_SEQUENCE,
};
use super::KvErsStorage;
use crate::backend::BackendTransaction;
use crate::error::{ErsError, ErsResult};
use crate::schema::{SchemaItem, SchemaView};
use crate::types::{AttributeKind, EntityId, FindOption};
use ers_kv::{Cursor, Entry, KvTransaction, NamedMap};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

pub(crate) struct KvErsTransaction<'s> {
    storage: &'s KvErsStorage,
    kv: RefCell<Box<dyn KvTransaction + 's>>,
    schema: SchemaView,
    readonly: bool,
}

impl<'s> KvErsTransaction<'s> {
    pub(crate) fn new(
        storage: &'s KvErsStorage,
        kv: Box<dyn KvTransaction + 's>,
        schema: SchemaView,
        readonly: bool,
    ) -> Self {
        Self {
            storage,
            kv: RefCell::new(kv),
            schema,
            readonly,
        }
    }

    fn ensure_writable(&self) -> ErsResult<()> {
        if self.readonly {
            Err(ErsError::ReadOnly)
        } else {
            Ok(())
        }
    }

    /// Opens an existing map.
    fn map(&self, name: &str) -> ErsResult<Option<NamedMap>> {
        Ok(self.kv.borrow_mut().named_map(name, false)?)
    }

    /// Opens a map for writing, creating it and recording `item` in the
    /// schema on first use.
    fn map_for_write(&self, name: &str, item: Option<SchemaItem>) -> ErsResult<NamedMap> {
        let mut kv = self.kv.borrow_mut();
        let map = kv
            .named_map(name, true)?
            .ok_or_else(|| ErsError::backend("kv", format!("map {name} was not created")))?;
        if let Some(item) = item {
            if !self.schema.contains(&item) {
                if let Some(key) = schema_key(&item) {
                    let schema = kv
                        .named_map(SCHEMA_MAP, true)?
                        .ok_or_else(|| ErsError::backend("kv", "schema map was not created"))?;
                    kv.put(&schema, &key, &[])?;
                }
                self.schema.record(item);
            }
        }
        Ok(map)
    }

    fn get(&self, map: &str, key: &[u8]) -> ErsResult<Option<Vec<u8>>> {
        match self.map(map)? {
            Some(handle) => Ok(self.kv.borrow().get(&handle, key)?),
            None => Ok(None),
        }
    }

    fn prefixed(&self, map: &NamedMap, prefix: &[u8]) -> ErsResult<Vec<Entry>> {
        let kv = self.kv.borrow();
        let entries = kv.scan_prefix(map, prefix).collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Keys in `[start, end)`, walked with a cursor.
    fn key_range(
        &self,
        map: &NamedMap,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> ErsResult<Vec<Vec<u8>>> {
        let kv = self.kv.borrow();
        let mut cursor = kv.navigate_to(map, start)?;
        let mut keys = Vec::new();
        while cursor.move_next()? {
            let key = cursor.key()?;
            if end.is_some_and(|end| key >= end) {
                break;
            }
            keys.push(key.to_vec());
        }
        cursor.close();
        Ok(keys)
    }

    fn next_sequence(&self, name: &[u8]) -> ErsResult<u64> {
        let map = self.map_for_write(SEQUENCES_MAP, None)?;
        let mut kv = self.kv.borrow_mut();
        let next = match kv.get(&map, name)? {
            Some(bytes) => decode_u64(&bytes)?,
            None => 0,
        };
        kv.put(&map, name, &(next + 1).to_be_bytes())?;
        Ok(next)
    }

    fn ensure_type(&self, type_name: &str) -> ErsResult<u32> {
        if let Some(type_id) = self.type_id(type_name)? {
            return Ok(type_id);
        }
        let type_id = u32::try_from(self.next_sequence(TYPE_SEQUENCE)?)
            .map_err(|_| ErsError::backend("kv", "type id space exhausted"))?;
        let map = self.map_for_write(TYPES_MAP, None)?;
        self.kv
            .borrow_mut()
            .put(&map, type_name.as_bytes(), &type_id.to_be_bytes())?;
        Ok(type_id)
    }

    fn schema_names(&self, type_id: u32, kind: AttributeKind) -> BTreeSet<String> {
        self.schema
            .snapshot()
            .names(type_id, kind)
    }

    fn write_index(
        &self,
        id: EntityId,
        name: &str,
        old: Option<&[u8]>,
        new: Option<&[u8]>,
    ) -> ErsResult<()> {
        let map = self.map_for_write(&index_map(id.type_id, name), None)?;
        let mut kv = self.kv.borrow_mut();
        if let Some(old) = old {
            kv.delete(&map, &index_key(old, id.instance_id))?;
        }
        if let Some(new) = new {
            kv.put(&map, &index_key(new, id.instance_id), &[])?;
        }
        Ok(())
    }
}

impl BackendTransaction for KvErsTransaction<'_> {
    fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn new_entity(&self, type_name: &str) -> ErsResult<EntityId> {
        self.ensure_writable()?;
        let type_id = self.ensure_type(type_name)?;
        let instance_id = self.next_sequence(ENTITY_SEQUENCE)?;
        let map =
            self.map_for_write(&entities_map(type_id), Some(SchemaItem::Entities(type_id)))?;
        self.kv
            .borrow_mut()
            .put(&map, &instance_key(instance_id), &[])?;
        Ok(EntityId::new(type_id, instance_id))
    }

    fn entity_exists(&self, id: EntityId) -> ErsResult<bool> {
        Ok(self
            .get(&entities_map(id.type_id), &instance_key(id.instance_id))?
            .is_some())
    }

    fn delete_entity(&self, id: EntityId) -> ErsResult<bool> {
        self.ensure_writable()?;
        let Some(entities) = self.map(&entities_map(id.type_id))? else {
            return Ok(false);
        };
        if !self
            .kv
            .borrow_mut()
            .delete(&entities, &instance_key(id.instance_id))?
        {
            return Ok(false);
        }
        for name in self.schema_names(id.type_id, AttributeKind::Property) {
            self.set_property(id, &name, None)?;
        }
        for name in self.schema_names(id.type_id, AttributeKind::Blob) {
            self.set_blob(id, &name, None)?;
        }
        for name in self.schema_names(id.type_id, AttributeKind::Link) {
            let Some(map) = self.map(&attribute_map(id.type_id, AttributeKind::Link, &name))? else {
                continue;
            };
            let outgoing = self.prefixed(&map, &instance_key(id.instance_id))?;
            let mut kv = self.kv.borrow_mut();
            for (key, _) in outgoing {
                kv.delete(&map, &key)?;
            }
        }
        Ok(true)
    }

    fn type_id(&self, type_name: &str) -> ErsResult<Option<u32>> {
        self.get(TYPES_MAP, type_name.as_bytes())?
            .map(|bytes| decode_u32(&bytes))
            .transpose()
    }

    fn types(&self) -> ErsResult<BTreeMap<String, u32>> {
        let Some(map) = self.map(TYPES_MAP)? else {
            return Ok(BTreeMap::new());
        };
        let entries = self.prefixed(&map, &[])?;
        entries
            .into_iter()
            .map(|(name, id)| -> ErsResult<(String, u32)> {
                let name = String::from_utf8(name)
                    .map_err(|_| ErsError::backend("kv", "type name is not UTF-8"))?;
                Ok((name, decode_u32(&id)?))
            })
            .collect()
    }

    fn attribute_names(&self, type_id: u32, kind: AttributeKind) -> ErsResult<BTreeSet<String>> {
        Ok(self.schema_names(type_id, kind))
    }

    fn all(&self, type_id: u32) -> ErsResult<Vec<EntityId>> {
        let Some(map) = self.map(&entities_map(type_id))? else {
            return Ok(Vec::new());
        };
        self.key_range(&map, None, None)?
            .iter()
            .map(|key| -> ErsResult<EntityId> {
                Ok(EntityId::new(type_id, decode_u64(key)?))
            })
            .collect()
    }

    fn find(
        &self,
        type_id: u32,
        property: &str,
        value: &[u8],
        option: FindOption,
    ) -> ErsResult<Vec<EntityId>> {
        let Some(map) = self.map(&index_map(type_id, property))? else {
            return Ok(Vec::new());
        };
        let (start, end) = index_range(value, option);
        self.key_range(&map, start.as_deref(), end.as_deref())?
            .iter()
            .map(|key| -> ErsResult<EntityId> {
                Ok(EntityId::new(type_id, index_key_instance(key)?))
            })
            .collect()
    }

    fn property(&self, id: EntityId, name: &str) -> ErsResult<Option<Vec<u8>>> {
        self.get(
            &attribute_map(id.type_id, AttributeKind::Property, name),
            &instance_key(id.instance_id),
        )
    }

    fn set_property(&self, id: EntityId, name: &str, value: Option<&[u8]>) -> ErsResult<()> {
        self.ensure_writable()?;
        let map_name = attribute_map(id.type_id, AttributeKind::Property, name);
        let key = instance_key(id.instance_id);
        let old = self.get(&map_name, &key)?;
        match value {
            Some(value) => {
                let item =
                    SchemaItem::Attribute(id.type_id, AttributeKind::Property, name.to_string());
                let map = self.map_for_write(&map_name, Some(item))?;
                self.kv.borrow_mut().put(&map, &key, value)?;
                self.write_index(id, name, old.as_deref(), Some(value))
            }
            None => {
                let Some(old) = old else {
                    return Ok(());
                };
                if let Some(map) = self.map(&map_name)? {
                    self.kv.borrow_mut().delete(&map, &key)?;
                }
                self.write_index(id, name, Some(&old), None)
            }
        }
    }

    fn blob(&self, id: EntityId, name: &str) -> ErsResult<Option<Vec<u8>>> {
        self.get(
            &attribute_map(id.type_id, AttributeKind::Blob, name),
            &instance_key(id.instance_id),
        )
    }

    fn set_blob(&self, id: EntityId, name: &str, value: Option<&[u8]>) -> ErsResult<()> {
        self.ensure_writable()?;
        let map_name = attribute_map(id.type_id, AttributeKind::Blob, name);
        let key = instance_key(id.instance_id);
        match value {
            Some(value) => {
                let item = SchemaItem::Attribute(id.type_id, AttributeKind::Blob, name.to_string());
                let map = self.map_for_write(&map_name, Some(item))?;
                self.kv.borrow_mut().put(&map, &key, value)?;
            }
            None => {
                if let Some(map) = self.map(&map_name)? {
                    self.kv.borrow_mut().delete(&map, &key)?;
                }
            }
        }
        Ok(())
    }

    fn links(&self, id: EntityId, name: &str) -> ErsResult<Vec<EntityId>> {
        let Some(map) = self.map(&attribute_map(id.type_id, AttributeKind::Link, name))? else {
            return Ok(Vec::new());
        };
        let mut targets = Vec::new();
        for (key, _) in self.prefixed(&map, &instance_key(id.instance_id))? {
            let target = link_target(&key)?;
            if self.entity_exists(target)? {
                targets.push(target);
            }
        }
        Ok(targets)
    }

    fn add_link(&self, id: EntityId, name: &str, target: EntityId) -> ErsResult<bool> {
        self.ensure_writable()?;
        let item = SchemaItem::Attribute(id.type_id, AttributeKind::Link, name.to_string());
        let map = self.map_for_write(
            &attribute_map(id.type_id, AttributeKind::Link, name),
            Some(item),
        )?;
        let key = link_key(id.instance_id, target);
        let mut kv = self.kv.borrow_mut();
        if kv.get(&map, &key)?.is_some() {
            return Ok(false);
        }
        kv.put(&map, &key, &[])?;
        Ok(true)
    }

    fn delete_link(&self, id: EntityId, name: &str, target: EntityId) -> ErsResult<bool> {
        self.ensure_writable()?;
        let Some(map) = self.map(&attribute_map(id.type_id, AttributeKind::Link, name))? else {
            return Ok(false);
        };
        Ok(self
            .kv
            .borrow_mut()
            .delete(&map, &link_key(id.instance_id, target))?)
    }

    fn drop_all(&self) -> ErsResult<()> {
        self.ensure_writable()?;
        let mut kv = self.kv.borrow_mut();
        for name in kv.map_names()? {
            if name == SEQUENCES_MAP || !name.starts_with("ers.") {
                continue;
            }
            if let Some(map) = kv.named_map(&name, false)? {
                kv.clear_map(&map)?;
            }
        }
        self.schema.reset();
        Ok(())
    }

    fn commit(&self) -> ErsResult<()> {
        if self.readonly {
            return Ok(self.kv.borrow_mut().commit()?);
        }
        let mut committed = self.storage.schema.write();
        self.kv.borrow_mut().commit()?;
        self.schema.publish(&mut committed);
        Ok(())
    }

    fn abort(&self) -> ErsResult<()> {
        Ok(self.kv.borrow_mut().abort()?)
    }
}
