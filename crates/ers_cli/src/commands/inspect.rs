//! Inspect command implementation.

use crate::StorageArgs;
use ers_core::{EntityRelationshipStorage, ErsResult};
use serde::Serialize;

/// Storage inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Backend id.
    pub backend: String,
    /// Whether the storage keeps its data in memory.
    pub in_ram: bool,
    /// Whether the storage rejects writes.
    pub immutable: bool,
    /// Total number of entities.
    pub entity_count: usize,
    /// Per-type statistics, ordered by type name.
    pub types: Vec<TypeStats>,
}

/// Statistics for a single entity type.
#[derive(Debug, Serialize)]
pub struct TypeStats {
    /// Type name.
    pub name: String,
    /// Type id.
    pub id: u32,
    /// Number of live entities.
    pub entity_count: usize,
    /// Property names.
    pub properties: Vec<String>,
    /// Blob names.
    pub blobs: Vec<String>,
    /// Link names.
    pub links: Vec<String>,
}

/// Collects type statistics in one read-only transaction.
pub fn inspect(storage: &EntityRelationshipStorage) -> ErsResult<InspectResult> {
    storage.transactional(true, |txn| {
        let mut types = Vec::new();
        for (name, id) in txn.get_types()? {
            types.push(TypeStats {
                entity_count: txn.all(&name)?.size()?,
                properties: txn.get_property_names(&name)?.into_iter().collect(),
                blobs: txn.get_blob_names(&name)?.into_iter().collect(),
                links: txn.get_link_names(&name)?.into_iter().collect(),
                name,
                id,
            });
        }
        Ok(InspectResult {
            backend: storage.backend_id().to_string(),
            in_ram: storage.is_in_ram(),
            immutable: storage.is_immutable(),
            entity_count: types.iter().map(|t| t.entity_count).sum(),
            types,
        })
    })
}

/// Runs the inspect command.
pub fn run(args: &StorageArgs, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let storage = super::open_storage(args)?;
    let result = inspect(&storage)?;
    storage.close();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Prints `result` in the human-readable layout.
pub fn print_text_output(result: &InspectResult) {
    println!("ERS Storage Inspection");
    println!("======================");
    println!();
    println!("Backend:   {}", result.backend);
    println!("In RAM:    {}", result.in_ram);
    println!("Immutable: {}", result.immutable);
    println!("Entities:  {}", result.entity_count);

    if result.types.is_empty() {
        println!();
        println!("No types.");
        return;
    }

    println!();
    println!("Types:");
    for t in &result.types {
        println!("  [{}] {}: {} entities", t.id, t.name, t.entity_count);
        print_names("properties", &t.properties);
        print_names("blobs", &t.blobs);
        print_names("links", &t.links);
    }
}

fn print_names(label: &str, names: &[String]) {
    if !names.is_empty() {
        println!("      {label}: {}", names.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ers_core::ValueExt;

    fn populated() -> EntityRelationshipStorage {
        let storage = EntityRelationshipStorage::ram();
        storage
            .transactional(false, |txn| {
                let group = txn.new_entity("Group")?;
                for i in 0..3i32 {
                    let user = txn.new_entity("User")?;
                    user.set("login", format!("user{i}"))?;
                    user.set("age", (20 + i).compressed())?;
                    user.set_raw_blob("avatar", Some(b"png".as_slice()))?;
                    group.add_link("user", &user)?;
                }
                Ok(())
            })
            .unwrap();
        storage
    }

    #[test]
    fn inspect_lists_types_and_attributes() {
        let result = inspect(&populated()).unwrap();
        assert_eq!(result.backend, "ram");
        assert!(result.in_ram);
        assert!(!result.immutable);
        assert_eq!(result.entity_count, 4);

        let names: Vec<_> = result.types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["Group", "User"]);
        let user = &result.types[1];
        assert_eq!(user.entity_count, 3);
        assert_eq!(user.properties, ["age", "login"]);
        assert_eq!(user.blobs, ["avatar"]);
        assert_eq!(result.types[0].links, ["user"]);
    }

    #[test]
    fn inspect_empty_storage() {
        let result = inspect(&EntityRelationshipStorage::ram()).unwrap();
        assert_eq!(result.entity_count, 0);
        assert!(result.types.is_empty());
    }

    #[test]
    fn json_output_has_type_fields() {
        let result = inspect(&populated()).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["types"][1]["name"], "User");
        assert_eq!(json["types"][1]["entity_count"], 3);
    }

    #[test]
    fn opens_on_disk_storage_from_args() {
        let temp = tempfile::tempdir().unwrap();
        let args = StorageArgs {
            backend: "sql".to_string(),
            path: Some(temp.path().to_path_buf()),
            settings: None,
        };
        {
            let storage = super::super::open_storage(&args).unwrap();
            storage
                .transactional(false, |txn| txn.new_entity("Item").map(|_| ()))
                .unwrap();
        }
        let storage = super::super::open_storage(&args).unwrap();
        let result = inspect(&storage).unwrap();
        assert_eq!(result.backend, "sql");
        assert_eq!(result.types[0].entity_count, 1);
    }

    #[test]
    fn settings_file_must_match_backend() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("settings.json");
        std::fs::write(&file, r#"{"backend":"sql","busy_timeout_ms":100}"#).unwrap();
        let args = StorageArgs {
            backend: "ram".to_string(),
            path: None,
            settings: Some(file),
        };
        assert!(super::super::open_storage(&args).is_err());
    }
}
