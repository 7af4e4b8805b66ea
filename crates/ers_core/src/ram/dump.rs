//! Snapshot dump format.
//!
//! ```text
//! | magic "ERSD" (4) | version (2, LE) | body (varints) | sha256 of all preceding bytes (32) |
//! ```
//!
//! The body lists counters, the type registry, then entities, properties,
//! blobs and links grouped by `(type, name)` column. Instance ids within a
//! group are delta-encoded.

use super::data::{PropertyColumn, RamData};
use crate::error::{ErsError, ErsResult};
use crate::types::EntityId;
use ers_codec::varint::{write_bytes, write_str, write_vlq, ByteReader};
use ers_codec::CodecError;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Magic bytes for dump files.
const DUMP_MAGIC: [u8; 4] = *b"ERSD";
/// Current dump format version.
const DUMP_VERSION: u16 = 1;
const HEADER_SIZE: usize = 4 + 2;
const DIGEST_SIZE: usize = 32;

/// Appends a sorted run of instance ids as deltas from the previous one.
struct DeltaWriter {
    previous: u64,
}

impl DeltaWriter {
    fn new() -> Self {
        Self { previous: 0 }
    }

    fn write(&mut self, out: &mut Vec<u8>, instance: u64) {
        write_vlq(out, instance - self.previous);
        self.previous = instance;
    }
}

struct DeltaReader {
    previous: u64,
}

impl DeltaReader {
    fn new() -> Self {
        Self { previous: 0 }
    }

    fn read(&mut self, reader: &mut ByteReader<'_>) -> ErsResult<u64> {
        let delta = reader.read_vlq()?;
        self.previous = self
            .previous
            .checked_add(delta)
            .ok_or(CodecError::IntegerOverflow)?;
        Ok(self.previous)
    }
}

/// Serializes a container.
pub(crate) fn encode(data: &RamData) -> Vec<u8> {
    let mut out = Vec::with_capacity(4096);
    out.extend_from_slice(&DUMP_MAGIC);
    out.extend_from_slice(&DUMP_VERSION.to_le_bytes());

    write_vlq(&mut out, u64::from(data.next_type_id));
    write_vlq(&mut out, data.next_instance_id);

    write_vlq(&mut out, data.types.len() as u64);
    for (name, type_id) in &data.types {
        write_str(&mut out, name);
        write_vlq(&mut out, u64::from(*type_id));
    }

    write_vlq(&mut out, data.entities.len() as u64);
    for (type_id, instances) in &data.entities {
        write_vlq(&mut out, u64::from(*type_id));
        write_vlq(&mut out, instances.len() as u64);
        let mut deltas = DeltaWriter::new();
        for instance in instances.iter() {
            deltas.write(&mut out, *instance);
        }
    }

    write_vlq(&mut out, data.properties.len() as u64);
    for ((type_id, name), column) in &data.properties {
        write_vlq(&mut out, u64::from(*type_id));
        write_str(&mut out, name);
        write_values(&mut out, &column.values);
    }

    write_vlq(&mut out, data.blobs.len() as u64);
    for ((type_id, name), column) in &data.blobs {
        write_vlq(&mut out, u64::from(*type_id));
        write_str(&mut out, name);
        write_values(&mut out, column);
    }

    write_vlq(&mut out, data.links.len() as u64);
    for ((type_id, name), column) in &data.links {
        write_vlq(&mut out, u64::from(*type_id));
        write_str(&mut out, name);
        write_vlq(&mut out, column.len() as u64);
        let mut deltas = DeltaWriter::new();
        for (source, targets) in column.iter() {
            deltas.write(&mut out, *source);
            write_vlq(&mut out, targets.len() as u64);
            for target in targets {
                write_vlq(&mut out, u64::from(target.type_id));
                write_vlq(&mut out, target.instance_id);
            }
        }
    }

    let digest = Sha256::digest(&out);
    out.extend_from_slice(&digest);
    out
}

fn write_values(out: &mut Vec<u8>, values: &BTreeMap<u64, Vec<u8>>) {
    write_vlq(out, values.len() as u64);
    let mut deltas = DeltaWriter::new();
    for (instance, value) in values {
        deltas.write(out, *instance);
        write_bytes(out, value);
    }
}

fn read_values(reader: &mut ByteReader<'_>) -> ErsResult<BTreeMap<u64, Vec<u8>>> {
    let count = reader.read_vlq()?;
    let mut deltas = DeltaReader::new();
    let mut values = BTreeMap::new();
    for _ in 0..count {
        let instance = deltas.read(reader)?;
        values.insert(instance, reader.read_bytes()?.to_vec());
    }
    Ok(values)
}

/// Checks framing and digest, returning the body.
fn verified_body(bytes: &[u8]) -> ErsResult<&[u8]> {
    if bytes.len() < HEADER_SIZE + DIGEST_SIZE {
        return Err(ErsError::invalid_dump("file too short"));
    }
    if bytes[..4] != DUMP_MAGIC {
        return Err(ErsError::invalid_dump("bad magic"));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != DUMP_VERSION {
        return Err(ErsError::invalid_dump(format!(
            "unsupported format version {version}"
        )));
    }
    let digest_offset = bytes.len() - DIGEST_SIZE;
    let computed = Sha256::digest(&bytes[..digest_offset]);
    if computed.as_slice() != &bytes[digest_offset..] {
        return Err(ErsError::invalid_dump("digest mismatch"));
    }
    Ok(&bytes[HEADER_SIZE..digest_offset])
}

/// Deserializes a container produced by [`encode`].
pub(crate) fn decode(bytes: &[u8]) -> ErsResult<RamData> {
    let body = verified_body(bytes)?;
    decode_body(body).map_err(|e| match e {
        ErsError::Codec(codec) => ErsError::invalid_dump(codec.to_string()),
        other => other,
    })
}

fn decode_body(body: &[u8]) -> ErsResult<RamData> {
    let mut reader = ByteReader::new(body);
    let mut data = RamData {
        next_type_id: reader.read_vlq_u32()?,
        next_instance_id: reader.read_vlq()?,
        ..RamData::default()
    };

    for _ in 0..reader.read_vlq()? {
        let name = reader.read_str()?.to_string();
        data.types.insert(name, reader.read_vlq_u32()?);
    }

    for _ in 0..reader.read_vlq()? {
        let type_id = reader.read_vlq_u32()?;
        let count = reader.read_vlq()?;
        let mut deltas = DeltaReader::new();
        let mut instances = BTreeSet::new();
        for _ in 0..count {
            instances.insert(deltas.read(&mut reader)?);
        }
        data.entities.insert(type_id, Arc::new(instances));
    }

    for _ in 0..reader.read_vlq()? {
        let type_id = reader.read_vlq_u32()?;
        let name = reader.read_str()?.to_string();
        let mut column = PropertyColumn::default();
        for (instance, value) in read_values(&mut reader)? {
            column.set(instance, Some(&value));
        }
        data.properties.insert((type_id, name), Arc::new(column));
    }

    for _ in 0..reader.read_vlq()? {
        let type_id = reader.read_vlq_u32()?;
        let name = reader.read_str()?.to_string();
        data.blobs
            .insert((type_id, name), Arc::new(read_values(&mut reader)?));
    }

    for _ in 0..reader.read_vlq()? {
        let type_id = reader.read_vlq_u32()?;
        let name = reader.read_str()?.to_string();
        let mut column = BTreeMap::new();
        let mut deltas = DeltaReader::new();
        for _ in 0..reader.read_vlq()? {
            let source = deltas.read(&mut reader)?;
            let mut targets = BTreeSet::new();
            for _ in 0..reader.read_vlq()? {
                let target_type = reader.read_vlq_u32()?;
                targets.insert(EntityId::new(target_type, reader.read_vlq()?));
            }
            column.insert(source, targets);
        }
        data.links.insert((type_id, name), Arc::new(column));
    }

    if !reader.is_empty() {
        return Err(ErsError::invalid_dump(format!(
            "trailing bytes at offset {}",
            reader.position()
        )));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RamData {
        let mut data = RamData::default();
        let group = data.new_entity("Group");
        for i in 0..20u8 {
            let user = data.new_entity("User");
            data.set_property(user, "age", Some([i % 4].as_slice()));
            data.set_blob(user, "avatar", Some([i; 3].as_slice()));
            data.add_link(group, "user", user);
        }
        let gone = data.new_entity("User");
        data.delete_entity(gone);
        data
    }

    #[test]
    fn decode_reproduces_container() {
        let data = sample();
        let decoded = decode(&encode(&data)).unwrap();
        assert_eq!(decoded, data);
        assert_eq!(decoded.next_instance_id, data.next_instance_id);
    }

    #[test]
    fn corrupted_byte_fails_digest() {
        let mut bytes = encode(&sample());
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0x01;
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, ErsError::InvalidDump { .. }));
    }

    #[test]
    fn wrong_magic_and_version_are_rejected() {
        let mut bytes = encode(&RamData::default());
        bytes[0] = b'X';
        assert!(decode(&bytes).unwrap_err().to_string().contains("magic"));

        let mut bytes = encode(&RamData::default());
        bytes[4] = 9;
        assert!(decode(&bytes).unwrap_err().to_string().contains("version"));
    }

    #[test]
    fn truncated_file_is_rejected() {
        assert!(matches!(
            decode(b"ERSD"),
            Err(ErsError::InvalidDump { .. })
        ));
    }
}
