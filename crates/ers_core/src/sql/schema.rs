//! Table layout of the relational backend.
//!
//! ```text
//! ers_types(name, id)                         type registry
//! ers_sequences(name, value)                  "entity" and "type" counters
//! ers_schema(type_id, kind, name, target)     created tables and attribute names
//! ent_{t}(id)                                 entities of type t
//! prop_{t}_{hex}(id, value)                   property, indexed by idx_{t}_{hex}
//! blob_{t}_{hex}(id, value)                   blob
//! link_{s}_{t}_{hex}(source_id, target_id)    links from type s to type t
//! ```
//!
//! `{hex}` is the lowercase hex of the attribute name's UTF-8 bytes. SQLite
//! identifiers are case-insensitive, so raw names like `age` and `Age` would
//! share a table. The readable name is kept in `ers_schema`.
//!
//! Every attribute and link table references its entity tables with
//! `ON DELETE CASCADE`, so deleting an entity row removes its attributes,
//! its outgoing links and every link pointing at it.

use super::SQL_BACKEND_ID;
use crate::error::{ErsError, ErsResult};
use crate::schema::SchemaItem;
use crate::types::AttributeKind;

pub(crate) const METADATA_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS ers_types (
        name TEXT PRIMARY KEY,
        id INTEGER NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS ers_sequences (
        name TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS ers_schema (
        type_id INTEGER NOT NULL,
        kind TEXT NOT NULL,
        name TEXT NOT NULL,
        target_type INTEGER NOT NULL,
        PRIMARY KEY (type_id, kind, name, target_type)
    );
";

const ENTITIES_KIND: &str = "e";
const LINK_TABLE_KIND: &str = "lt";
const NO_TARGET: i64 = -1;

/// Quotes an identifier for use in SQL text.
pub(crate) fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub(crate) fn entity_table(type_id: u32) -> String {
    quote(&format!("ent_{type_id}"))
}

/// Case-safe, injective identifier fragment for an attribute name.
fn name_key(name: &str) -> String {
    name.bytes().map(|byte| format!("{byte:02x}")).collect()
}

pub(crate) fn property_table(type_id: u32, name: &str) -> String {
    quote(&format!("prop_{type_id}_{}", name_key(name)))
}

fn property_index(type_id: u32, name: &str) -> String {
    quote(&format!("idx_{type_id}_{}", name_key(name)))
}

pub(crate) fn blob_table(type_id: u32, name: &str) -> String {
    quote(&format!("blob_{type_id}_{}", name_key(name)))
}

pub(crate) fn link_table(source: u32, target: u32, name: &str) -> String {
    quote(&format!("link_{source}_{target}_{}", name_key(name)))
}

/// DDL creating the table behind a schema item, if it has one.
pub(crate) fn create_statements(item: &SchemaItem) -> Vec<String> {
    match item {
        SchemaItem::Entities(type_id) => vec![format!(
            "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY)",
            entity_table(*type_id)
        )],
        SchemaItem::Attribute(type_id, AttributeKind::Property, name) => {
            let table = property_table(*type_id, name);
            vec![
                value_table(&table, *type_id),
                format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {table} (value, id)",
                    property_index(*type_id, name)
                ),
            ]
        }
        SchemaItem::Attribute(type_id, AttributeKind::Blob, name) => {
            vec![value_table(&blob_table(*type_id, name), *type_id)]
        }
        SchemaItem::Attribute(_, AttributeKind::Link, _) => Vec::new(),
        SchemaItem::LinkTable {
            source,
            target,
            name,
        } => vec![format!(
            "CREATE TABLE IF NOT EXISTS {} (
                source_id INTEGER NOT NULL REFERENCES {} (id) ON DELETE CASCADE,
                target_id INTEGER NOT NULL REFERENCES {} (id) ON DELETE CASCADE,
                PRIMARY KEY (source_id, target_id)
            ) WITHOUT ROWID",
            link_table(*source, *target, name),
            entity_table(*source),
            entity_table(*target)
        )],
    }
}

fn value_table(table: &str, type_id: u32) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY REFERENCES {} (id) ON DELETE CASCADE,
            value BLOB NOT NULL
        )",
        entity_table(type_id)
    )
}

/// DDL dropping the table behind a schema item, if it has one.
pub(crate) fn drop_statement(item: &SchemaItem) -> Option<String> {
    let table = match item {
        SchemaItem::Entities(type_id) => entity_table(*type_id),
        SchemaItem::Attribute(type_id, AttributeKind::Property, name) => {
            property_table(*type_id, name)
        }
        SchemaItem::Attribute(type_id, AttributeKind::Blob, name) => blob_table(*type_id, name),
        SchemaItem::Attribute(_, AttributeKind::Link, _) => return None,
        SchemaItem::LinkTable {
            source,
            target,
            name,
        } => link_table(*source, *target, name),
    };
    Some(format!("DROP TABLE IF EXISTS {table}"))
}

/// Dependent tables must be dropped before the entity tables they reference.
pub(crate) fn drop_order(item: &SchemaItem) -> u8 {
    match item {
        SchemaItem::LinkTable { .. } => 0,
        SchemaItem::Attribute(..) => 1,
        SchemaItem::Entities(_) => 2,
    }
}

/// The `ers_schema` row describing an item.
pub(crate) fn schema_row(item: &SchemaItem) -> (u32, &'static str, &str, i64) {
    match item {
        SchemaItem::Entities(type_id) => (*type_id, ENTITIES_KIND, "", NO_TARGET),
        SchemaItem::Attribute(type_id, kind, name) => (*type_id, kind.tag(), name, NO_TARGET),
        SchemaItem::LinkTable {
            source,
            target,
            name,
        } => (*source, LINK_TABLE_KIND, name, i64::from(*target)),
    }
}

pub(crate) fn parse_schema_row(
    type_id: u32,
    kind: &str,
    name: String,
    target: i64,
) -> ErsResult<SchemaItem> {
    if kind == ENTITIES_KIND {
        return Ok(SchemaItem::Entities(type_id));
    }
    if kind == LINK_TABLE_KIND {
        let target = u32::try_from(target).map_err(|_| {
            ErsError::backend(SQL_BACKEND_ID, format!("invalid link target type {target}"))
        })?;
        return Ok(SchemaItem::LinkTable {
            source: type_id,
            target,
            name,
        });
    }
    let kind = AttributeKind::from_tag(kind)
        .ok_or_else(|| ErsError::backend(SQL_BACKEND_ID, format!("unknown schema kind {kind}")))?;
    Ok(SchemaItem::Attribute(type_id, kind, name))
}
