//! Property-based test generators using proptest.
//!
//! Besides scalar strategies, this module generates operation scripts: a
//! sequence of entity operations that can be replayed against any storage.
//! Replaying the same script on two backends must leave identical
//! [`StorageSnapshot`](crate::scenarios::StorageSnapshot)s.

use ers_codec::Value;
use ers_core::{EntityId, ErsResult, Transaction};
use proptest::prelude::*;

/// Type names used by generated scripts.
pub const SCRIPT_TYPES: [&str; 3] = ["Class", "Method", "Field"];
/// Property names used by generated scripts.
pub const SCRIPT_PROPERTIES: [&str; 2] = ["name", "rank"];
/// Link names used by generated scripts.
pub const SCRIPT_LINKS: [&str; 2] = ["owner", "refs"];

/// Strategy for any scalar value.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i32>().prop_map(Value::Int),
        any::<i64>().prop_map(Value::Long),
        any::<bool>().prop_map(Value::Bool),
        any::<f64>().prop_map(Value::Double),
        "\\PC{0,16}".prop_map(Value::Text),
    ]
}

/// Strategy for values the compressed encoding accepts.
pub fn compressible_strategy() -> impl Strategy<Value = i64> {
    prop_oneof![Just(0), Just(i64::MAX), Just(i64::MAX / 2), 0..=i64::MAX]
}

/// One step of a generated script.
///
/// Entities are addressed by their position among the entities the script
/// has created so far, wrapped around; steps addressing an entity before
/// any exists do nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityOperation {
    /// Create an entity of `SCRIPT_TYPES[type_index]`.
    Create {
        /// Index into [`SCRIPT_TYPES`].
        type_index: usize,
    },
    /// Set or remove a property.
    SetProperty {
        /// Target entity position.
        entity: usize,
        /// Index into [`SCRIPT_PROPERTIES`].
        property: usize,
        /// New value; `None` removes the property.
        value: Option<i64>,
    },
    /// Set a blob.
    SetBlob {
        /// Target entity position.
        entity: usize,
        /// Blob content.
        data: Vec<u8>,
    },
    /// Delete an entity. Deleting it again is a no-op.
    Delete {
        /// Target entity position.
        entity: usize,
    },
    /// Add a link.
    Link {
        /// Source entity position.
        source: usize,
        /// Index into [`SCRIPT_LINKS`].
        name: usize,
        /// Target entity position.
        target: usize,
    },
    /// Remove a link.
    Unlink {
        /// Source entity position.
        source: usize,
        /// Index into [`SCRIPT_LINKS`].
        name: usize,
        /// Target entity position.
        target: usize,
    },
}

/// Strategy for one script step.
pub fn entity_operation_strategy() -> impl Strategy<Value = EntityOperation> {
    let index = || 0..64usize;
    prop_oneof![
        4 => (0..SCRIPT_TYPES.len()).prop_map(|type_index| EntityOperation::Create { type_index }),
        4 => (index(), 0..SCRIPT_PROPERTIES.len(), prop::option::of(-1_000i64..1_000))
            .prop_map(|(entity, property, value)| EntityOperation::SetProperty {
                entity,
                property,
                value,
            }),
        1 => (index(), prop::collection::vec(any::<u8>(), 0..32))
            .prop_map(|(entity, data)| EntityOperation::SetBlob { entity, data }),
        1 => index().prop_map(|entity| EntityOperation::Delete { entity }),
        3 => (index(), 0..SCRIPT_LINKS.len(), index())
            .prop_map(|(source, name, target)| EntityOperation::Link { source, name, target }),
        1 => (index(), 0..SCRIPT_LINKS.len(), index())
            .prop_map(|(source, name, target)| EntityOperation::Unlink { source, name, target }),
    ]
}

/// Strategy for a script of `min_ops..max_ops` steps.
pub fn operation_script_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<EntityOperation>> {
    prop::collection::vec(entity_operation_strategy(), min_ops..max_ops)
}

fn pick(created: &[EntityId], position: usize) -> Option<EntityId> {
    if created.is_empty() {
        None
    } else {
        Some(created[position % created.len()])
    }
}

fn pick_pair(created: &[EntityId], source: usize, target: usize) -> Option<(EntityId, EntityId)> {
    Some((pick(created, source)?, pick(created, target)?))
}

/// Replays `script` in `txn`. Returns every entity created, deleted or not.
///
/// Steps touching a deleted entity are skipped, so every step is valid on
/// every backend.
///
/// # Errors
///
/// Returns the storage's error.
pub fn apply_script(
    txn: &Transaction<'_>,
    script: &[EntityOperation],
) -> ErsResult<Vec<EntityId>> {
    let mut created = Vec::new();
    let live = |id: EntityId| -> ErsResult<bool> { Ok(!txn.is_entity_deleted(id)?) };
    for operation in script {
        match *operation {
            EntityOperation::Create { type_index } => {
                created.push(txn.new_entity(SCRIPT_TYPES[type_index])?.id());
            }
            EntityOperation::SetProperty {
                entity,
                property,
                value,
            } => {
                let Some(id) = pick(&created, entity) else {
                    continue;
                };
                if !live(id)? {
                    continue;
                }
                let entity = txn.get_entity_unsafe(id);
                match value {
                    Some(value) => entity.set(SCRIPT_PROPERTIES[property], value)?,
                    None => entity.remove(SCRIPT_PROPERTIES[property])?,
                }
            }
            EntityOperation::SetBlob { entity, ref data } => {
                if let Some(id) = pick(&created, entity) {
                    if live(id)? {
                        txn.get_entity_unsafe(id).set_raw_blob("data", Some(data.as_slice()))?;
                    }
                }
            }
            EntityOperation::Delete { entity } => {
                if let Some(id) = pick(&created, entity) {
                    txn.delete_entity(id)?;
                }
            }
            EntityOperation::Link {
                source,
                name,
                target,
            } => {
                if let Some((source, target)) = pick_pair(&created, source, target) {
                    if live(source)? && live(target)? {
                        txn.get_entity_unsafe(source)
                            .add_link(SCRIPT_LINKS[name], target)?;
                    }
                }
            }
            EntityOperation::Unlink {
                source,
                name,
                target,
            } => {
                if let Some((source, target)) = pick_pair(&created, source, target) {
                    if live(source)? && live(target)? {
                        txn.get_entity_unsafe(source)
                            .delete_link(SCRIPT_LINKS[name], target)?;
                    }
                }
            }
        }
    }
    Ok(created)
}
