//! Verify-dump command implementation.

use super::inspect::{self, InspectResult};
use ers_core::{EntityRelationshipStorage, RamErsSettings};
use serde::Serialize;
use std::fs;
use std::path::Path;

const DIGEST_SIZE: usize = 32;

/// Dump verification result.
#[derive(Debug, Serialize)]
pub struct VerifyDumpResult {
    /// Dump file path.
    pub path: String,
    /// Dump size in bytes.
    pub size: u64,
    /// Dump format version.
    pub format_version: u16,
    /// SHA-256 trailer, hex encoded.
    pub digest: String,
    /// Contents of the loaded storage.
    pub contents: InspectResult,
}

/// Loads the dump in `bytes` and summarizes it.
///
/// Loading checks the magic, the format version and the digest, so any
/// result returned here describes a readable dump.
pub fn verify(path: &Path, bytes: &[u8]) -> Result<VerifyDumpResult, Box<dyn std::error::Error>> {
    let storage = EntityRelationshipStorage::load(bytes, RamErsSettings::default())?;
    let contents = inspect::inspect(&storage)?;
    storage.close();

    let format_version = u16::from_le_bytes([bytes[4], bytes[5]]);
    let digest = bytes[bytes.len() - DIGEST_SIZE..]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();

    Ok(VerifyDumpResult {
        path: path.display().to_string(),
        size: bytes.len() as u64,
        format_version,
        digest,
        contents,
    })
}

/// Runs the verify-dump command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = fs::read(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let result = match verify(path, &bytes) {
        Ok(result) => result,
        Err(e) => {
            println!("✗ Dump verification failed: {e}");
            return Err("Verification failed".into());
        }
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            println!("Dump:    {}", result.path);
            println!("Size:    {} bytes", result.size);
            println!("Version: {}", result.format_version);
            println!("SHA-256: {}", result.digest);
            println!();
            inspect::print_text_output(&result.contents);
            println!();
            println!("✓ Dump verification passed");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dump_bytes() -> Vec<u8> {
        let storage = EntityRelationshipStorage::ram();
        storage
            .transactional(false, |txn| {
                for i in 0..5i32 {
                    txn.new_entity("Item")?.set("n", i)?;
                }
                Ok(())
            })
            .unwrap();
        super::super::freeze::freeze(&storage, "items").unwrap()
    }

    #[test]
    fn verifies_valid_dump() {
        let bytes = dump_bytes();
        let result = verify(Path::new("items"), &bytes).unwrap();
        assert_eq!(result.format_version, 1);
        assert_eq!(result.digest.len(), 64);
        assert_eq!(result.size, bytes.len() as u64);
        assert!(result.contents.immutable);
        assert_eq!(result.contents.entity_count, 5);
    }

    #[test]
    fn rejects_corrupted_dump() {
        let mut bytes = dump_bytes();
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0xFF;
        assert!(verify(Path::new("items"), &bytes).is_err());
    }

    #[test]
    fn rejects_truncated_dump() {
        let bytes = dump_bytes();
        assert!(verify(Path::new("items"), &bytes[..3]).is_err());
        assert!(verify(Path::new("items"), &[]).is_err());
    }

    #[test]
    fn run_fails_for_missing_file() {
        let temp = tempfile::tempdir().unwrap();
        assert!(run(&temp.path().join("missing"), "text").is_err());
    }
}
