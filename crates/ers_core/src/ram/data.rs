//! Versioned in-memory data container.
//!
//! Every column sits behind an `Arc`, so cloning a container copies only
//! the outer maps. A transaction clones the committed container on its
//! first write and copies a column only when it touches it.

use crate::types::{AttributeKind, EntityId, FindOption};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;

pub(crate) type ColumnKey = (u32, String);
pub(crate) type BlobColumn = BTreeMap<u64, Vec<u8>>;
pub(crate) type LinkColumn = BTreeMap<u64, BTreeSet<EntityId>>;

/// Property values of one `(type, name)` with a sorted value index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PropertyColumn {
    pub(crate) values: BTreeMap<u64, Vec<u8>>,
    index: BTreeSet<(Vec<u8>, u64)>,
}

impl PropertyColumn {
    pub(crate) fn set(&mut self, instance: u64, value: Option<&[u8]>) {
        if let Some(old) = self.values.remove(&instance) {
            self.index.remove(&(old, instance));
        }
        if let Some(value) = value {
            self.values.insert(instance, value.to_vec());
            self.index.insert((value.to_vec(), instance));
        }
    }

    fn find(&self, value: &[u8], option: FindOption) -> impl Iterator<Item = u64> + '_ {
        let edge = |instance: u64| (value.to_vec(), instance);
        let range: (Bound<(Vec<u8>, u64)>, Bound<(Vec<u8>, u64)>) = match option {
            FindOption::Eq => (Bound::Included(edge(0)), Bound::Included(edge(u64::MAX))),
            FindOption::Lt => (Bound::Unbounded, Bound::Excluded(edge(0))),
            FindOption::EqOrLt => (Bound::Unbounded, Bound::Included(edge(u64::MAX))),
            FindOption::Gt => (Bound::Excluded(edge(u64::MAX)), Bound::Unbounded),
            FindOption::EqOrGt => (Bound::Included(edge(0)), Bound::Unbounded),
        };
        self.index.range(range).map(|(_, instance)| *instance)
    }
}

/// One version of a RAM storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RamData {
    pub(crate) types: BTreeMap<String, u32>,
    pub(crate) next_type_id: u32,
    pub(crate) next_instance_id: u64,
    pub(crate) entities: BTreeMap<u32, Arc<BTreeSet<u64>>>,
    pub(crate) properties: BTreeMap<ColumnKey, Arc<PropertyColumn>>,
    pub(crate) blobs: BTreeMap<ColumnKey, Arc<BlobColumn>>,
    pub(crate) links: BTreeMap<ColumnKey, Arc<LinkColumn>>,
}

fn column_key(type_id: u32, name: &str) -> ColumnKey {
    (type_id, name.to_string())
}

/// Keys of one type in a column map.
fn names_of<V>(columns: &BTreeMap<ColumnKey, V>, type_id: u32) -> BTreeSet<String> {
    columns
        .range((type_id, String::new())..)
        .take_while(|((t, _), _)| *t == type_id)
        .map(|((_, name), _)| name.clone())
        .collect()
}

impl RamData {
    pub(crate) fn type_id(&self, type_name: &str) -> Option<u32> {
        self.types.get(type_name).copied()
    }

    pub(crate) fn ensure_type(&mut self, type_name: &str) -> u32 {
        if let Some(type_id) = self.type_id(type_name) {
            return type_id;
        }
        let type_id = self.next_type_id;
        self.next_type_id += 1;
        self.types.insert(type_name.to_string(), type_id);
        type_id
    }

    pub(crate) fn new_entity(&mut self, type_name: &str) -> EntityId {
        let type_id = self.ensure_type(type_name);
        let instance_id = self.next_instance_id;
        self.next_instance_id += 1;
        Arc::make_mut(self.entities.entry(type_id).or_default()).insert(instance_id);
        EntityId::new(type_id, instance_id)
    }

    /// Registers an existing entity, keeping the id counter ahead of it.
    pub(crate) fn insert_entity(&mut self, id: EntityId) {
        Arc::make_mut(self.entities.entry(id.type_id).or_default()).insert(id.instance_id);
        self.next_instance_id = self.next_instance_id.max(id.instance_id + 1);
    }

    pub(crate) fn exists(&self, id: EntityId) -> bool {
        self.entities
            .get(&id.type_id)
            .is_some_and(|set| set.contains(&id.instance_id))
    }

    pub(crate) fn delete_entity(&mut self, id: EntityId) -> bool {
        let removed = match self.entities.get_mut(&id.type_id) {
            Some(set) if set.contains(&id.instance_id) => {
                Arc::make_mut(set).remove(&id.instance_id)
            }
            _ => false,
        };
        if !removed {
            return false;
        }
        let instance = id.instance_id;
        for (_, column) in self.type_columns_mut(id.type_id) {
            if column.values.contains_key(&instance) {
                Arc::make_mut(column).set(instance, None);
            }
        }
        for ((t, _), column) in self.blobs.iter_mut() {
            if *t == id.type_id && column.contains_key(&instance) {
                Arc::make_mut(column).remove(&instance);
            }
        }
        for ((t, _), column) in self.links.iter_mut() {
            if *t == id.type_id && column.contains_key(&instance) {
                Arc::make_mut(column).remove(&instance);
            }
        }
        true
    }

    fn type_columns_mut(
        &mut self,
        type_id: u32,
    ) -> impl Iterator<Item = (&ColumnKey, &mut Arc<PropertyColumn>)> {
        self.properties
            .range_mut((type_id, String::new())..)
            .take_while(move |((t, _), _)| *t == type_id)
    }

    pub(crate) fn all(&self, type_id: u32) -> Vec<EntityId> {
        self.entities
            .get(&type_id)
            .map(|set| {
                set.iter()
                    .map(|instance| EntityId::new(type_id, *instance))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn attribute_names(&self, type_id: u32, kind: AttributeKind) -> BTreeSet<String> {
        match kind {
            AttributeKind::Property => names_of(&self.properties, type_id),
            AttributeKind::Blob => names_of(&self.blobs, type_id),
            AttributeKind::Link => names_of(&self.links, type_id),
        }
    }

    pub(crate) fn find(
        &self,
        type_id: u32,
        property: &str,
        value: &[u8],
        option: FindOption,
    ) -> Vec<EntityId> {
        self.properties
            .get(&column_key(type_id, property))
            .map(|column| {
                column
                    .find(value, option)
                    .map(|instance| EntityId::new(type_id, instance))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn property(&self, id: EntityId, name: &str) -> Option<Vec<u8>> {
        self.properties
            .get(&column_key(id.type_id, name))
            .and_then(|column| column.values.get(&id.instance_id).cloned())
    }

    pub(crate) fn set_property(&mut self, id: EntityId, name: &str, value: Option<&[u8]>) {
        let key = column_key(id.type_id, name);
        if value.is_none() && !self.properties.contains_key(&key) {
            return;
        }
        Arc::make_mut(self.properties.entry(key).or_default()).set(id.instance_id, value);
    }

    pub(crate) fn blob(&self, id: EntityId, name: &str) -> Option<Vec<u8>> {
        self.blobs
            .get(&column_key(id.type_id, name))
            .and_then(|column| column.get(&id.instance_id).cloned())
    }

    pub(crate) fn set_blob(&mut self, id: EntityId, name: &str, value: Option<&[u8]>) {
        let key = column_key(id.type_id, name);
        match value {
            Some(value) => {
                Arc::make_mut(self.blobs.entry(key).or_default())
                    .insert(id.instance_id, value.to_vec());
            }
            None => {
                if let Some(column) = self.blobs.get_mut(&key) {
                    if column.contains_key(&id.instance_id) {
                        Arc::make_mut(column).remove(&id.instance_id);
                    }
                }
            }
        }
    }

    pub(crate) fn links(&self, id: EntityId, name: &str) -> Vec<EntityId> {
        self.links
            .get(&column_key(id.type_id, name))
            .and_then(|column| column.get(&id.instance_id))
            .map(|targets| {
                targets
                    .iter()
                    .copied()
                    .filter(|target| self.exists(*target))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn add_link(&mut self, id: EntityId, name: &str, target: EntityId) -> bool {
        let column = Arc::make_mut(self.links.entry(column_key(id.type_id, name)).or_default());
        column.entry(id.instance_id).or_default().insert(target)
    }

    pub(crate) fn delete_link(&mut self, id: EntityId, name: &str, target: EntityId) -> bool {
        let Some(column) = self.links.get_mut(&column_key(id.type_id, name)) else {
            return false;
        };
        if !column
            .get(&id.instance_id)
            .is_some_and(|targets| targets.contains(&target))
        {
            return false;
        }
        let column = Arc::make_mut(column);
        if let Some(targets) = column.get_mut(&id.instance_id) {
            targets.remove(&target);
            if targets.is_empty() {
                column.remove(&id.instance_id);
            }
        }
        true
    }

    /// Forgets all types and entities. Id counters keep running.
    pub(crate) fn drop_all(&mut self) {
        *self = RamData {
            next_type_id: self.next_type_id,
            next_instance_id: self.next_instance_id,
            ..RamData::default()
        };
    }
}
