//! CLI command implementations.

pub mod freeze;
pub mod inspect;
pub mod verify_dump;

use crate::StorageArgs;
use ers_core::{EntityRelationshipStorage, ErsSettings};
use std::fs;

/// Opens the storage described by `args`.
///
/// Without a settings file the backend's defaults are used.
pub fn open_storage(
    args: &StorageArgs,
) -> Result<EntityRelationshipStorage, Box<dyn std::error::Error>> {
    let settings = match &args.settings {
        Some(file) => {
            let json = fs::read_to_string(file)
                .map_err(|e| format!("cannot read settings {}: {e}", file.display()))?;
            serde_json::from_str::<ErsSettings>(&json)
                .map_err(|e| format!("invalid settings {}: {e}", file.display()))?
        }
        None => ErsSettings::Empty,
    };
    Ok(EntityRelationshipStorage::open(
        &args.backend,
        args.path.as_deref(),
        &settings,
    )?)
}
