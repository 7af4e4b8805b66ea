//! Entity transactions over one SQLite connection.
//!
//! Writers open with `BEGIN IMMEDIATE`, so a second writer waits for the
//! busy timeout and then fails with a conflict. Readers start their WAL
//! snapshot while holding the schema read lock, and writers commit under
//! the schema write lock, so the pinned schema always matches the tables a
//! transaction can see.

use super::schema::{
    blob_table, create_statements, drop_order, drop_statement, entity_table, link_table,
    property_table, schema_row,
};
use super::{SqlStorage, SQL_BACKEND_ID};
use crate::backend::BackendTransaction;
use crate::error::{ErsError, ErsResult};
use crate::schema::{SchemaItem, SchemaView};
use crate::types::{AttributeKind, EntityId, FindOption};
use rusqlite::{params, Connection, OptionalExtension};
use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

const ENTITY_SEQUENCE: &str = "entity";
const TYPE_SEQUENCE: &str = "type";

fn sql_id(instance_id: u64) -> ErsResult<i64> {
    i64::try_from(instance_id).map_err(|_| {
        ErsError::backend(SQL_BACKEND_ID, format!("instance id {instance_id} out of range"))
    })
}

fn instance_id(value: i64) -> ErsResult<u64> {
    u64::try_from(value)
        .map_err(|_| ErsError::backend(SQL_BACKEND_ID, format!("negative id {value}")))
}

pub(crate) struct SqlTransaction<'s> {
    storage: &'s SqlStorage,
    conn: Option<Connection>,
    schema: SchemaView,
    readonly: bool,
    finished: Cell<bool>,
}

impl<'s> SqlTransaction<'s> {
    pub(crate) fn begin(storage: &'s SqlStorage, readonly: bool) -> ErsResult<Self> {
        let conn = storage.checkout()?;
        let schema = if readonly {
            let committed = storage.schema.read();
            conn.execute_batch("BEGIN DEFERRED")?;
            // A deferred transaction takes its snapshot on the first read.
            conn.query_row("SELECT count(*) FROM ers_types", [], |_| Ok(()))?;
            SchemaView::new(Arc::clone(&*committed))
        } else {
            conn.execute_batch("BEGIN IMMEDIATE")?;
            SchemaView::new(Arc::clone(&*storage.schema.read()))
        };
        Ok(Self {
            storage,
            conn: Some(conn),
            schema,
            readonly,
            finished: Cell::new(false),
        })
    }

    fn conn(&self) -> ErsResult<&Connection> {
        match &self.conn {
            Some(conn) if !self.finished.get() => Ok(conn),
            _ => Err(ErsError::TransactionFinished),
        }
    }

    fn ensure_writable(&self) -> ErsResult<&Connection> {
        if self.readonly {
            return Err(ErsError::ReadOnly);
        }
        self.conn()
    }

    fn has(&self, item: &SchemaItem) -> bool {
        self.schema.contains(item)
    }

    /// Creates the table behind `item` on first use.
    fn ensure(&self, item: SchemaItem) -> ErsResult<()> {
        if self.has(&item) {
            return Ok(());
        }
        let conn = self.ensure_writable()?;
        for statement in create_statements(&item) {
            conn.execute(&statement, [])?;
        }
        let (type_id, kind, name, target) = schema_row(&item);
        conn.prepare_cached(
            "INSERT OR IGNORE INTO ers_schema (type_id, kind, name, target_type)
             VALUES (?1, ?2, ?3, ?4)",
        )?
        .execute(params![type_id, kind, name, target])?;
        debug!(item = ?item, "created sql schema element");
        self.schema.record(item);
        Ok(())
    }

    fn next_sequence(&self, name: &str) -> ErsResult<u64> {
        let conn = self.ensure_writable()?;
        let previous: i64 = conn
            .prepare_cached(
                "INSERT INTO ers_sequences (name, value) VALUES (?1, 1)
                 ON CONFLICT (name) DO UPDATE SET value = value + 1
                 RETURNING value - 1",
            )?
            .query_row([name], |row| row.get(0))?;
        instance_id(previous)
    }

    fn ensure_type(&self, type_name: &str) -> ErsResult<u32> {
        if let Some(type_id) = self.type_id(type_name)? {
            return Ok(type_id);
        }
        let type_id = u32::try_from(self.next_sequence(TYPE_SEQUENCE)?)
            .map_err(|_| ErsError::backend(SQL_BACKEND_ID, "type id space exhausted"))?;
        self.ensure_writable()?
            .prepare_cached("INSERT INTO ers_types (name, id) VALUES (?1, ?2)")?
            .execute(params![type_name, type_id])?;
        Ok(type_id)
    }

    fn ids(
        &self,
        sql: &str,
        type_id: u32,
        params: impl rusqlite::Params,
    ) -> ErsResult<Vec<EntityId>> {
        let conn = self.conn()?;
        let mut statement = conn.prepare_cached(sql)?;
        let rows = statement.query_map(params, |row| row.get::<_, i64>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(EntityId::new(type_id, instance_id(row?)?));
        }
        Ok(ids)
    }

    fn read_value(
        &self,
        table: String,
        item: &SchemaItem,
        id: EntityId,
    ) -> ErsResult<Option<Vec<u8>>> {
        if !self.has(item) {
            return Ok(None);
        }
        let value = self
            .conn()?
            .prepare_cached(&format!("SELECT value FROM {table} WHERE id = ?1"))?
            .query_row([sql_id(id.instance_id)?], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn write_value(
        &self,
        table: String,
        item: SchemaItem,
        id: EntityId,
        value: Option<&[u8]>,
    ) -> ErsResult<()> {
        self.ensure_writable()?;
        let instance = sql_id(id.instance_id)?;
        match value {
            Some(value) => {
                self.ensure(item)?;
                self.conn()?
                    .prepare_cached(&format!(
                        "INSERT INTO {table} (id, value) VALUES (?1, ?2)
                         ON CONFLICT (id) DO UPDATE SET value = excluded.value"
                    ))?
                    .execute(params![instance, value])?;
            }
            None if self.has(&item) => {
                self.conn()?
                    .prepare_cached(&format!("DELETE FROM {table} WHERE id = ?1"))?
                    .execute([instance])?;
            }
            None => {}
        }
        Ok(())
    }

    fn finish(&self, statement: &str) -> ErsResult<()> {
        let conn = self.conn()?;
        self.finished.set(true);
        conn.execute_batch(statement)?;
        Ok(())
    }
}

impl BackendTransaction for SqlTransaction<'_> {
    fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn new_entity(&self, type_name: &str) -> ErsResult<EntityId> {
        self.ensure_writable()?;
        let type_id = self.ensure_type(type_name)?;
        self.ensure(SchemaItem::Entities(type_id))?;
        let instance = self.next_sequence(ENTITY_SEQUENCE)?;
        self.conn()?
            .prepare_cached(&format!(
                "INSERT INTO {} (id) VALUES (?1)",
                entity_table(type_id)
            ))?
            .execute([sql_id(instance)?])?;
        Ok(EntityId::new(type_id, instance))
    }

    fn entity_exists(&self, id: EntityId) -> ErsResult<bool> {
        if !self.has(&SchemaItem::Entities(id.type_id)) {
            return Ok(false);
        }
        let found: Option<i64> = self
            .conn()?
            .prepare_cached(&format!(
                "SELECT id FROM {} WHERE id = ?1",
                entity_table(id.type_id)
            ))?
            .query_row([sql_id(id.instance_id)?], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    fn delete_entity(&self, id: EntityId) -> ErsResult<bool> {
        let conn = self.ensure_writable()?;
        if !self.has(&SchemaItem::Entities(id.type_id)) {
            return Ok(false);
        }
        let deleted = conn
            .prepare_cached(&format!(
                "DELETE FROM {} WHERE id = ?1",
                entity_table(id.type_id)
            ))?
            .execute([sql_id(id.instance_id)?])?;
        Ok(deleted > 0)
    }

    fn type_id(&self, type_name: &str) -> ErsResult<Option<u32>> {
        let type_id = self
            .conn()?
            .prepare_cached("SELECT id FROM ers_types WHERE name = ?1")?
            .query_row([type_name], |row| row.get(0))
            .optional()?;
        Ok(type_id)
    }

    fn types(&self) -> ErsResult<BTreeMap<String, u32>> {
        let conn = self.conn()?;
        let mut statement = conn.prepare_cached("SELECT name, id FROM ers_types")?;
        let rows = statement.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut types = BTreeMap::new();
        for row in rows {
            let (name, id): (String, u32) = row?;
            types.insert(name, id);
        }
        Ok(types)
    }

    fn attribute_names(&self, type_id: u32, kind: AttributeKind) -> ErsResult<BTreeSet<String>> {
        Ok(self
            .schema
            .snapshot()
            .names(type_id, kind))
    }

    fn all(&self, type_id: u32) -> ErsResult<Vec<EntityId>> {
        if !self.has(&SchemaItem::Entities(type_id)) {
            return Ok(Vec::new());
        }
        self.ids(
            &format!("SELECT id FROM {} ORDER BY id", entity_table(type_id)),
            type_id,
            [],
        )
    }

    fn find(
        &self,
        type_id: u32,
        property: &str,
        value: &[u8],
        option: FindOption,
    ) -> ErsResult<Vec<EntityId>> {
        let item = SchemaItem::Attribute(type_id, AttributeKind::Property, property.to_string());
        if !self.has(&item) {
            return Ok(Vec::new());
        }
        let operator = match option {
            FindOption::Eq => "=",
            FindOption::Lt => "<",
            FindOption::EqOrLt => "<=",
            FindOption::Gt => ">",
            FindOption::EqOrGt => ">=",
        };
        self.ids(
            &format!(
                "SELECT id FROM {} WHERE value {operator} ?1 ORDER BY value, id",
                property_table(type_id, property)
            ),
            type_id,
            [value],
        )
    }

    fn property(&self, id: EntityId, name: &str) -> ErsResult<Option<Vec<u8>>> {
        let item = SchemaItem::Attribute(id.type_id, AttributeKind::Property, name.to_string());
        self.read_value(property_table(id.type_id, name), &item, id)
    }

    fn set_property(&self, id: EntityId, name: &str, value: Option<&[u8]>) -> ErsResult<()> {
        let item = SchemaItem::Attribute(id.type_id, AttributeKind::Property, name.to_string());
        self.write_value(property_table(id.type_id, name), item, id, value)
    }

    fn blob(&self, id: EntityId, name: &str) -> ErsResult<Option<Vec<u8>>> {
        let item = SchemaItem::Attribute(id.type_id, AttributeKind::Blob, name.to_string());
        self.read_value(blob_table(id.type_id, name), &item, id)
    }

    fn set_blob(&self, id: EntityId, name: &str, value: Option<&[u8]>) -> ErsResult<()> {
        let item = SchemaItem::Attribute(id.type_id, AttributeKind::Blob, name.to_string());
        self.write_value(blob_table(id.type_id, name), item, id, value)
    }

    fn links(&self, id: EntityId, name: &str) -> ErsResult<Vec<EntityId>> {
        let targets = self
            .schema
            .snapshot()
            .link_targets(id.type_id, name);
        let source = sql_id(id.instance_id)?;
        let mut links = Vec::new();
        for target in targets {
            links.extend(self.ids(
                &format!(
                    "SELECT l.target_id FROM {} l JOIN {} e ON e.id = l.target_id
                     WHERE l.source_id = ?1 ORDER BY l.target_id",
                    link_table(id.type_id, target, name),
                    entity_table(target)
                ),
                target,
                [source],
            )?);
        }
        links.sort();
        Ok(links)
    }

    fn add_link(&self, id: EntityId, name: &str, target: EntityId) -> ErsResult<bool> {
        self.ensure_writable()?;
        self.ensure(SchemaItem::Attribute(
            id.type_id,
            AttributeKind::Link,
            name.to_string(),
        ))?;
        self.ensure(SchemaItem::LinkTable {
            source: id.type_id,
            target: target.type_id,
            name: name.to_string(),
        })?;
        let added = self
            .conn()?
            .prepare_cached(&format!(
                "INSERT OR IGNORE INTO {} (source_id, target_id) VALUES (?1, ?2)",
                link_table(id.type_id, target.type_id, name)
            ))?
            .execute([sql_id(id.instance_id)?, sql_id(target.instance_id)?])?;
        Ok(added > 0)
    }

    fn delete_link(&self, id: EntityId, name: &str, target: EntityId) -> ErsResult<bool> {
        let conn = self.ensure_writable()?;
        let table = SchemaItem::LinkTable {
            source: id.type_id,
            target: target.type_id,
            name: name.to_string(),
        };
        if !self.has(&table) {
            return Ok(false);
        }
        let deleted = conn
            .prepare_cached(&format!(
                "DELETE FROM {} WHERE source_id = ?1 AND target_id = ?2",
                link_table(id.type_id, target.type_id, name)
            ))?
            .execute([sql_id(id.instance_id)?, sql_id(target.instance_id)?])?;
        Ok(deleted > 0)
    }

    fn drop_all(&self) -> ErsResult<()> {
        let conn = self.ensure_writable()?;
        let mut items: Vec<SchemaItem> = self
            .schema
            .snapshot()
            .iter()
            .cloned()
            .collect();
        items.sort_by_key(drop_order);
        for item in &items {
            if let Some(statement) = drop_statement(item) {
                conn.execute(&statement, [])?;
            }
        }
        conn.execute_batch("DELETE FROM ers_schema; DELETE FROM ers_types;")?;
        self.schema.reset();
        debug!(tables = items.len(), "dropped all sql entity tables");
        Ok(())
    }

    fn commit(&self) -> ErsResult<()> {
        if self.readonly {
            return self.finish("COMMIT");
        }
        let mut committed = self.storage.schema.write();
        self.finish("COMMIT")?;
        self.schema.publish(&mut committed);
        Ok(())
    }

    fn abort(&self) -> ErsResult<()> {
        self.finish("ROLLBACK")
    }
}

impl Drop for SqlTransaction<'_> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        // A failed COMMIT leaves the transaction open as well.
        if !conn.is_autocommit() {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "failed to roll back sql transaction");
                return;
            }
        }
        self.storage.checkin(conn);
    }
}
