//! Map names and key layouts of the key-value backend.
//!
//! ```text
//! ers.types               type name          -> type id (u32 BE)
//! ers.sequences           "entity" | "type"  -> next value (u64 BE)
//! ers.schema              type id BE + tag [+ name] -> ()
//! ers.{t}.entities        instance BE        -> ()
//! ers.{t}.p.{name}        instance BE        -> value
//! ers.{t}.pi.{name}       escaped value 00 00 instance BE -> ()
//! ers.{t}.b.{name}        instance BE        -> blob
//! ers.{t}.l.{name}        source BE + target type BE + target instance BE -> ()
//! ```
//!
//! Index keys escape `00` as `00 FF` and terminate the value with `00 00`,
//! so index keys sort by value first, then by instance id.

use crate::error::{ErsError, ErsResult};
use crate::schema::SchemaItem;
use crate::types::{AttributeKind, EntityId, FindOption};

pub(crate) const TYPES_MAP: &str = "ers.types";
pub(crate) const SEQUENCES_MAP: &str = "ers.sequences";
pub(crate) const SCHEMA_MAP: &str = "ers.schema";

pub(crate) const ENTITY_SEQUENCE: &[u8] = b"entity";
pub(crate) const TYPE_SEQUENCE: &[u8] = b"type";

const ENTITIES_TAG: u8 = b'e';

pub(crate) fn entities_map(type_id: u32) -> String {
    format!("ers.{type_id}.entities")
}

pub(crate) fn attribute_map(type_id: u32, kind: AttributeKind, name: &str) -> String {
    format!("ers.{type_id}.{}.{name}", kind.tag())
}

pub(crate) fn index_map(type_id: u32, name: &str) -> String {
    format!("ers.{type_id}.pi.{name}")
}

pub(crate) fn instance_key(instance_id: u64) -> [u8; 8] {
    instance_id.to_be_bytes()
}

pub(crate) fn decode_u64(bytes: &[u8]) -> ErsResult<u64> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| malformed("expected an 8-byte id"))?;
    Ok(u64::from_be_bytes(array))
}

pub(crate) fn decode_u32(bytes: &[u8]) -> ErsResult<u32> {
    let array: [u8; 4] = bytes
        .try_into()
        .map_err(|_| malformed("expected a 4-byte id"))?;
    Ok(u32::from_be_bytes(array))
}

fn malformed(message: &str) -> ErsError {
    ErsError::backend("kv", format!("malformed key: {message}"))
}

fn escaped_value(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 10);
    for byte in value {
        out.push(*byte);
        if *byte == 0 {
            out.push(0xFF);
        }
    }
    out
}

/// `escaped value 00 00`: the smallest index key holding `value`.
fn value_floor(value: &[u8]) -> Vec<u8> {
    let mut key = escaped_value(value);
    key.extend_from_slice(&[0, 0]);
    key
}

/// `escaped value 00 01`: above every key holding `value`, below every
/// key holding a greater value.
fn value_ceiling(value: &[u8]) -> Vec<u8> {
    let mut key = escaped_value(value);
    key.extend_from_slice(&[0, 1]);
    key
}

pub(crate) fn index_key(value: &[u8], instance_id: u64) -> Vec<u8> {
    let mut key = value_floor(value);
    key.extend_from_slice(&instance_key(instance_id));
    key
}

pub(crate) fn index_key_instance(key: &[u8]) -> ErsResult<u64> {
    if key.len() < 10 {
        return Err(malformed("index key too short"));
    }
    decode_u64(&key[key.len() - 8..])
}

/// Start (inclusive) and end (exclusive) index keys matching a lookup.
pub(crate) fn index_range(value: &[u8], option: FindOption) -> (Option<Vec<u8>>, Option<Vec<u8>>) {
    match option {
        FindOption::Eq => (Some(value_floor(value)), Some(value_ceiling(value))),
        FindOption::Lt => (None, Some(value_floor(value))),
        FindOption::EqOrLt => (None, Some(value_ceiling(value))),
        FindOption::Gt => (Some(value_ceiling(value)), None),
        FindOption::EqOrGt => (Some(value_floor(value)), None),
    }
}

pub(crate) fn link_key(source: u64, target: EntityId) -> [u8; 20] {
    let mut key = [0u8; 20];
    key[..8].copy_from_slice(&source.to_be_bytes());
    key[8..12].copy_from_slice(&target.type_id.to_be_bytes());
    key[12..].copy_from_slice(&target.instance_id.to_be_bytes());
    key
}

pub(crate) fn link_target(key: &[u8]) -> ErsResult<EntityId> {
    if key.len() != 20 {
        return Err(malformed("link key must be 20 bytes"));
    }
    Ok(EntityId::new(
        decode_u32(&key[8..12])?,
        decode_u64(&key[12..])?,
    ))
}

pub(crate) fn schema_key(item: &SchemaItem) -> Option<Vec<u8>> {
    match item {
        SchemaItem::Entities(type_id) => {
            let mut key = type_id.to_be_bytes().to_vec();
            key.push(ENTITIES_TAG);
            Some(key)
        }
        SchemaItem::Attribute(type_id, kind, name) => {
            let mut key = type_id.to_be_bytes().to_vec();
            key.extend_from_slice(kind.tag().as_bytes());
            key.extend_from_slice(name.as_bytes());
            Some(key)
        }
        SchemaItem::LinkTable { .. } => None,
    }
}

pub(crate) fn parse_schema_key(key: &[u8]) -> ErsResult<SchemaItem> {
    if key.len() < 5 {
        return Err(malformed("schema key too short"));
    }
    let type_id = decode_u32(&key[..4])?;
    if key[4] == ENTITIES_TAG {
        return Ok(SchemaItem::Entities(type_id));
    }
    let tag = std::str::from_utf8(&key[4..5]).map_err(|_| malformed("schema tag"))?;
    let kind = AttributeKind::from_tag(tag).ok_or_else(|| malformed("unknown schema tag"))?;
    let name = String::from_utf8(key[5..].to_vec()).map_err(|_| malformed("schema name"))?;
    Ok(SchemaItem::Attribute(type_id, kind, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn in_range(key: &[u8], range: &(Option<Vec<u8>>, Option<Vec<u8>>)) -> bool {
        range.0.as_deref().map_or(true, |start| key >= start)
            && range.1.as_deref().map_or(true, |end| key < end)
    }

    #[test]
    fn index_keys_sort_by_value_then_instance() {
        let mut keys = vec![
            index_key(b"b", 1),
            index_key(b"a\0", 5),
            index_key(b"a", 9),
            index_key(b"a", 2),
            index_key(b"", 3),
        ];
        keys.sort();
        let instances: Vec<u64> = keys
            .iter()
            .map(|k| index_key_instance(k).unwrap())
            .collect();
        assert_eq!(instances, vec![3, 2, 9, 5, 1]);
    }

    #[test]
    fn link_keys_decode_target() {
        let target = EntityId::new(7, 1 << 40);
        let key = link_key(3, target);
        assert_eq!(link_target(&key).unwrap(), target);
        assert_eq!(decode_u64(&key[..8]).unwrap(), 3);
    }

    #[test]
    fn schema_keys_roundtrip() {
        let items = [
            SchemaItem::Entities(4),
            SchemaItem::Attribute(4, AttributeKind::Blob, "avatar".into()),
            SchemaItem::Attribute(0, AttributeKind::Link, "user".into()),
        ];
        for item in items {
            let key = schema_key(&item).unwrap();
            assert_eq!(parse_schema_key(&key).unwrap(), item);
        }
    }

    proptest! {
        #[test]
        fn index_ranges_agree_with_byte_order(
            stored in proptest::collection::vec(any::<u8>(), 0..4),
            target in proptest::collection::vec(any::<u8>(), 0..4),
            instance in any::<u64>(),
        ) {
            let key = index_key(&stored, instance);
            for option in [
                FindOption::Eq,
                FindOption::Lt,
                FindOption::EqOrLt,
                FindOption::Gt,
                FindOption::EqOrGt,
            ] {
                prop_assert_eq!(
                    in_range(&key, &index_range(&target, option)),
                    option.matches(&stored, &target),
                    "option {:?}", option
                );
            }
        }
    }
}
