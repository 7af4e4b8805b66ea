//! Freeze command implementation.

use crate::StorageArgs;
use ers_core::{write_atomically, EntityRelationshipStorage, ErsResult};
use std::path::Path;
use tracing::info;

/// Freezes `storage` under `storage_id` and returns its dump bytes.
pub fn freeze(storage: &EntityRelationshipStorage, storage_id: &str) -> ErsResult<Vec<u8>> {
    let frozen = storage.as_immutable(storage_id)?;
    let mut bytes = Vec::new();
    frozen.dump(&mut bytes)?;
    Ok(bytes)
}

/// Runs the freeze command.
pub fn run(
    args: &StorageArgs,
    storage_id: &str,
    out: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let storage = super::open_storage(args)?;
    let bytes = freeze(&storage, storage_id)?;
    storage.close();

    write_atomically(out, &bytes)?;
    info!(storage_id, path = %out.display(), bytes = bytes.len(), "dump written");

    println!("Froze {} storage as {:?}", args.backend, storage_id);
    println!("  Dump: {}", out.display());
    println!("  Size: {} bytes", bytes.len());
    Ok(())
}
