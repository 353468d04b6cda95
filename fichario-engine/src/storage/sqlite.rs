//! SqliteBackend - Embedded Relational Storage
//!
//! TigerStyle: One table per entity, explicit schema, no leaked quirks.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS "cliente" (
//!     record_id TEXT PRIMARY KEY,
//!     "nome" TEXT,
//!     "idade" INTEGER
//! );
//! ```
//!
//! SQLite's type affinity is normalized at this boundary: booleans are
//! stored as 0/1 integers and mapped back through the column's declared
//! type, and a value that refused a type-change migration keeps its
//! original storage class inside the retyped column. Callers see only
//! [`fichario_core::Value`].
//!
//! Insertion order is rowid order. Retyping a column rebuilds the table
//! inside a transaction, copying rows in rowid order so the ordering
//! contract survives. Calls block briefly on the connection mutex; a busy
//! or locked database surfaces as `Unavailable` after the busy timeout.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection};

use fichario_core::{EntitySchema, FieldMap, FieldSpec, FieldType, Record, RecordId, Value};

use super::backend::{BackendKind, CoercionFailure, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::{ensure_safe_name, ensure_value_fits};
use crate::constants::SQLITE_BUSY_TIMEOUT_MS;

// =============================================================================
// SqliteBackend
// =============================================================================

/// Embedded relational storage backend.
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (and create if needed) the database at `path`.
    pub fn new(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            StorageError::unavailable(format!("open {}: {e}", path.as_ref().display()))
        })?;
        Self::configure(conn)
    }

    /// Open a private in-memory database.
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::unavailable(format!("open in-memory: {e}")))?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> StorageResult<Self> {
        conn.busy_timeout(Duration::from_millis(SQLITE_BUSY_TIMEOUT_MS))
            .map_err(|e| StorageError::unavailable(format!("busy_timeout: {e}")))?;
        // journal_mode returns the resulting mode as a row.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_row| Ok(()))
            .map_err(|e| StorageError::unavailable(format!("journal_mode: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

// =============================================================================
// Value and Type Mapping
// =============================================================================

/// Column declaration for a declared field type.
fn sql_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Bool => "BOOLEAN",
        FieldType::Int => "INTEGER",
        FieldType::Float => "REAL",
        FieldType::Text => "TEXT",
    }
}

/// Declared field type for a column declaration.
fn field_type_from_decl(decl: &str) -> FieldType {
    match decl {
        "BOOLEAN" => FieldType::Bool,
        "INTEGER" => FieldType::Int,
        "REAL" => FieldType::Float,
        _ => FieldType::Text,
    }
}

fn value_to_sql(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(i64::from(*b)),
        Value::Int(i) => rusqlite::types::Value::Integer(*i),
        Value::Float(f) => rusqlite::types::Value::Real(*f),
        Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
    }
}

/// Render a field's declared default as a `DEFAULT` clause literal.
///
/// Declared defaults live in the table schema itself so that the store
/// shape survives process restarts, the same way the flat-file store
/// persists its field list.
fn default_literal(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(if *b { "1".to_string() } else { "0".to_string() }),
        Value::Int(i) => Some(i.to_string()),
        Value::Float(f) => Some(format!("{f:?}")),
        Value::Text(s) => Some(format!("'{}'", s.replace('\'', "''"))),
    }
}

/// Parse `PRAGMA table_info`'s `dflt_value` back into a declared default.
fn default_from_literal(literal: Option<&str>, declared: FieldType) -> Value {
    let Some(literal) = literal else {
        return Value::Null;
    };
    if literal.eq_ignore_ascii_case("null") {
        return Value::Null;
    }

    match declared {
        FieldType::Bool => match literal {
            "1" | "true" => Value::Bool(true),
            "0" | "false" => Value::Bool(false),
            _ => Value::Null,
        },
        FieldType::Int => literal.parse().map_or(Value::Null, Value::Int),
        FieldType::Float => literal.parse().map_or(Value::Null, Value::Float),
        FieldType::Text => {
            let trimmed = literal
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
                .unwrap_or(literal);
            Value::Text(trimmed.replace("''", "'"))
        }
    }
}

/// One column declaration, `DEFAULT` clause included.
fn column_decl(spec: &FieldSpec) -> String {
    match default_literal(&spec.default) {
        Some(literal) => format!(
            "\"{}\" {} DEFAULT {literal}",
            spec.name,
            sql_type(spec.field_type)
        ),
        None => format!("\"{}\" {}", spec.name, sql_type(spec.field_type)),
    }
}

/// Map a stored value back through the column's declared type.
#[allow(clippy::cast_precision_loss)]
fn value_from_sql(raw: rusqlite::types::Value, declared: FieldType) -> Value {
    use rusqlite::types::Value as Sql;

    match raw {
        Sql::Null => Value::Null,
        Sql::Integer(i) => match declared {
            FieldType::Bool => Value::Bool(i != 0),
            FieldType::Float => Value::Float(i as f64),
            _ => Value::Int(i),
        },
        Sql::Real(f) => Value::Float(f),
        Sql::Text(s) => Value::Text(s),
        // The engine never writes blobs.
        Sql::Blob(_) => Value::Null,
    }
}

// =============================================================================
// Connection Helpers
// =============================================================================

/// Map a rusqlite failure onto the storage taxonomy.
fn map_err(entity: &str, operation: &str, e: &rusqlite::Error) -> StorageError {
    let text = e.to_string();
    if text.contains("no such table") {
        return StorageError::store_missing(entity);
    }

    if let rusqlite::Error::SqliteFailure(inner, _) = e {
        match inner.code {
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                return StorageError::unavailable(format!("{operation}: {text}"));
            }
            rusqlite::ErrorCode::DiskFull | rusqlite::ErrorCode::CannotOpen => {
                return StorageError::unavailable(format!("{operation}: {text}"));
            }
            _ => {}
        }
    }

    StorageError::internal(format!("{operation}: {text}"))
}

/// The table's field list, in column order, `record_id` excluded.
fn table_fields(conn: &Connection, entity: &str) -> StorageResult<Vec<FieldSpec>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info(\"{entity}\")"))
        .map_err(|e| map_err(entity, "table_info", &e))?;

    let rows = stmt
        .query_map([], |row| {
            let name: String = row.get(1)?;
            let decl: String = row.get(2)?;
            let dflt: Option<String> = row.get(4)?;
            Ok((name, decl, dflt))
        })
        .map_err(|e| map_err(entity, "table_info", &e))?;

    let mut fields = Vec::new();
    let mut any = false;
    for row in rows {
        let (name, decl, dflt) = row.map_err(|e| map_err(entity, "table_info", &e))?;
        any = true;
        if name == "record_id" {
            continue;
        }
        let field_type = field_type_from_decl(&decl);
        fields.push(FieldSpec {
            name,
            field_type,
            default: default_from_literal(dflt.as_deref(), field_type),
        });
    }

    // PRAGMA table_info returns no rows for a missing table.
    if !any {
        return Err(StorageError::store_missing(entity));
    }

    Ok(fields)
}

/// Read rows in rowid order, verifying every identifier on the way out.
fn select_records(
    conn: &Connection,
    entity: &str,
    fields: &[FieldSpec],
    where_id: Option<&RecordId>,
) -> StorageResult<Vec<Record>> {
    let columns: Vec<String> = fields.iter().map(|f| format!("\"{}\"", f.name)).collect();
    let column_list = if columns.is_empty() {
        "record_id".to_string()
    } else {
        format!("record_id, {}", columns.join(", "))
    };

    let sql = match where_id {
        Some(_) => format!("SELECT {column_list} FROM \"{entity}\" WHERE record_id = ?1"),
        None => format!("SELECT {column_list} FROM \"{entity}\" ORDER BY rowid"),
    };

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| map_err(entity, "select", &e))?;

    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, Vec<rusqlite::types::Value>)> {
        let id: String = row.get(0)?;
        let mut raw = Vec::with_capacity(fields.len());
        for i in 0..fields.len() {
            raw.push(row.get::<_, rusqlite::types::Value>(i + 1)?);
        }
        Ok((id, raw))
    };

    let rows = match where_id {
        Some(id) => stmt.query_map(params![id.as_str()], map_row),
        None => stmt.query_map([], map_row),
    }
    .map_err(|e| map_err(entity, "select", &e))?;

    let mut records = Vec::new();
    for row in rows {
        let (id_str, raw) = row.map_err(|e| map_err(entity, "select", &e))?;
        let id: RecordId = id_str
            .parse()
            .map_err(|_| StorageError::checksum_mismatch(entity, id_str.clone()))?;

        let mut map = FieldMap::with_capacity(fields.len());
        for (spec, value) in fields.iter().zip(raw) {
            map.insert(spec.name.clone(), value_from_sql(value, spec.field_type));
        }
        records.push(Record::new(entity, id, map));
    }

    Ok(records)
}

// =============================================================================
// StorageBackend Implementation
// =============================================================================

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[tracing::instrument(skip(self, schema), fields(entity = schema.entity()))]
    async fn create_store(&self, schema: &EntitySchema) -> StorageResult<()> {
        ensure_safe_name("entity", schema.entity())?;
        for field in schema.fields() {
            ensure_safe_name("field", &field.name)?;
        }

        let mut columns = vec!["record_id TEXT PRIMARY KEY".to_string()];
        for field in schema.fields() {
            columns.push(column_decl(field));
        }
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            schema.entity(),
            columns.join(", ")
        );

        let conn = self.conn.lock().unwrap();
        conn.execute(&sql, [])
            .map_err(|e| map_err(schema.entity(), "create_store", &e))?;

        Ok(())
    }

    async fn store_exists(&self, entity: &str) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![entity],
                |row| row.get(0),
            )
            .map_err(|e| map_err(entity, "store_exists", &e))?;
        Ok(count > 0)
    }

    async fn store_fields(&self, entity: &str) -> StorageResult<Vec<FieldSpec>> {
        let conn = self.conn.lock().unwrap();
        table_fields(&conn, entity)
    }

    #[tracing::instrument(skip(self, fields))]
    async fn insert(&self, entity: &str, mut fields: FieldMap) -> StorageResult<RecordId> {
        let conn = self.conn.lock().unwrap();
        let specs = table_fields(&conn, entity)?;

        let mut values = vec![rusqlite::types::Value::Null]; // placeholder for the id
        let mut columns = vec!["record_id".to_string()];
        for spec in &specs {
            let value = match fields.remove(&spec.name) {
                Some(value) => {
                    ensure_value_fits(entity, spec, &value)?;
                    value
                }
                None => spec.default.clone(),
            };
            values.push(value_to_sql(&value));
            columns.push(format!("\"{}\"", spec.name));
        }
        if let Some(unknown) = fields.keys().next() {
            return Err(StorageError::validation(format!(
                "unknown field '{unknown}' for entity '{entity}'"
            )));
        }

        let id = RecordId::generate();
        values[0] = rusqlite::types::Value::Text(id.to_string());

        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO \"{entity}\" ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );

        conn.execute(&sql, params_from_iter(values)).map_err(|e| {
            if let rusqlite::Error::SqliteFailure(inner, _) = &e {
                if inner.code == rusqlite::ErrorCode::ConstraintViolation {
                    return StorageError::already_exists(entity, id.as_str());
                }
            }
            map_err(entity, "insert", &e)
        })?;

        Ok(id)
    }

    #[tracing::instrument(skip(self))]
    async fn read_all(&self, entity: &str) -> StorageResult<Vec<Record>> {
        let conn = self.conn.lock().unwrap();
        let specs = table_fields(&conn, entity)?;
        select_records(&conn, entity, &specs, None)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    async fn read_one(&self, entity: &str, id: &RecordId) -> StorageResult<Record> {
        let conn = self.conn.lock().unwrap();
        let specs = table_fields(&conn, entity)?;

        select_records(&conn, entity, &specs, Some(id))?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::not_found(entity, id.as_str()))
    }

    #[tracing::instrument(skip(self, changes), fields(id = %id))]
    async fn update(
        &self,
        entity: &str,
        id: &RecordId,
        changes: FieldMap,
    ) -> StorageResult<Record> {
        let conn = self.conn.lock().unwrap();
        let specs = table_fields(&conn, entity)?;

        for (key, value) in &changes {
            let spec = specs.iter().find(|f| &f.name == key).ok_or_else(|| {
                StorageError::validation(format!(
                    "unknown field '{key}' for entity '{entity}'"
                ))
            })?;
            ensure_value_fits(entity, spec, value)?;
        }

        if !changes.is_empty() {
            let mut assignments = Vec::with_capacity(changes.len());
            let mut values = Vec::with_capacity(changes.len() + 1);
            for (i, (key, value)) in changes.iter().enumerate() {
                assignments.push(format!("\"{key}\" = ?{}", i + 1));
                values.push(value_to_sql(value));
            }
            values.push(rusqlite::types::Value::Text(id.to_string()));

            let sql = format!(
                "UPDATE \"{entity}\" SET {} WHERE record_id = ?{}",
                assignments.join(", "),
                values.len()
            );
            let affected = conn
                .execute(&sql, params_from_iter(values))
                .map_err(|e| map_err(entity, "update", &e))?;
            if affected == 0 {
                return Err(StorageError::not_found(entity, id.as_str()));
            }
        }

        select_records(&conn, entity, &specs, Some(id))?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::not_found(entity, id.as_str()))
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    async fn delete(&self, entity: &str, id: &RecordId) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();

        let affected = conn
            .execute(
                &format!("DELETE FROM \"{entity}\" WHERE record_id = ?1"),
                params![id.as_str()],
            )
            .map_err(|e| map_err(entity, "delete", &e))?;

        if affected == 0 {
            return Err(StorageError::not_found(entity, id.as_str()));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, spec), fields(field = %spec.name))]
    async fn add_field(&self, entity: &str, spec: &FieldSpec) -> StorageResult<()> {
        ensure_safe_name("field", &spec.name)?;

        let conn = self.conn.lock().unwrap();
        let specs = table_fields(&conn, entity)?;
        if specs.iter().any(|f| f.name == spec.name) {
            return Ok(());
        }

        // ADD COLUMN with a DEFAULT clause: records that predate the field
        // read as the default, and the default survives restarts.
        conn.execute(
            &format!(
                "ALTER TABLE \"{entity}\" ADD COLUMN {}",
                column_decl(spec)
            ),
            [],
        )
        .map_err(|e| map_err(entity, "add_field", &e))?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn rename_field(&self, entity: &str, from: &str, to: &str) -> StorageResult<()> {
        ensure_safe_name("field", to)?;

        let conn = self.conn.lock().unwrap();
        let specs = table_fields(&conn, entity)?;
        let has_from = specs.iter().any(|f| f.name == from);
        let has_to = specs.iter().any(|f| f.name == to);

        if !has_from && has_to {
            return Ok(()); // already applied
        }
        if !has_from {
            return Err(StorageError::validation(format!(
                "no field '{from}' in entity '{entity}'"
            )));
        }
        if has_to {
            return Err(StorageError::validation(format!(
                "field '{to}' already exists in entity '{entity}'"
            )));
        }

        conn.execute(
            &format!("ALTER TABLE \"{entity}\" RENAME COLUMN \"{from}\" TO \"{to}\""),
            [],
        )
        .map_err(|e| map_err(entity, "rename_field", &e))?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn remove_field(&self, entity: &str, field: &str) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let specs = table_fields(&conn, entity)?;
        if !specs.iter().any(|f| f.name == field) {
            return Ok(());
        }

        conn.execute(
            &format!("ALTER TABLE \"{entity}\" DROP COLUMN \"{field}\""),
            [],
        )
        .map_err(|e| map_err(entity, "remove_field", &e))?;

        Ok(())
    }

    /// Retype by table rebuild: SQLite cannot alter a column's declaration
    /// in place, so rows are copied into a rebuilt table inside one
    /// transaction, coercing as they go.
    #[tracing::instrument(skip(self))]
    async fn change_field_type(
        &self,
        entity: &str,
        field: &str,
        target: FieldType,
    ) -> StorageResult<Vec<CoercionFailure>> {
        let mut conn = self.conn.lock().unwrap();
        let specs = table_fields(&conn, entity)?;

        if !specs.iter().any(|f| f.name == field) {
            return Err(StorageError::validation(format!(
                "no field '{field}' in entity '{entity}'"
            )));
        }

        let records = select_records(&conn, entity, &specs, None)?;

        let tx = conn
            .transaction()
            .map_err(|e| map_err(entity, "change_field_type", &e))?;

        let scratch = format!("{entity}__retype");
        let mut columns = vec!["record_id TEXT PRIMARY KEY".to_string()];
        for spec in &specs {
            let decl = if spec.name == field {
                // The declared default follows the field to its new type.
                column_decl(&FieldSpec {
                    name: spec.name.clone(),
                    field_type: target,
                    default: spec.default.coerce(target).unwrap_or(Value::Null),
                })
            } else {
                column_decl(spec)
            };
            columns.push(decl);
        }
        tx.execute(
            &format!("CREATE TABLE \"{scratch}\" ({})", columns.join(", ")),
            [],
        )
        .map_err(|e| map_err(entity, "change_field_type", &e))?;

        let column_names: Vec<String> = std::iter::once("record_id".to_string())
            .chain(specs.iter().map(|f| format!("\"{}\"", f.name)))
            .collect();
        let placeholders: Vec<String> = (1..=column_names.len())
            .map(|i| format!("?{i}"))
            .collect();
        let insert_sql = format!(
            "INSERT INTO \"{scratch}\" ({}) VALUES ({})",
            column_names.join(", "),
            placeholders.join(", ")
        );

        let mut failures = Vec::new();
        for record in &records {
            let mut values = vec![rusqlite::types::Value::Text(record.id().to_string())];
            for spec in &specs {
                let current = record.get(&spec.name).cloned().unwrap_or(Value::Null);
                let value = if spec.name == field {
                    match current.coerce(target) {
                        Some(coerced) => coerced,
                        None => {
                            failures.push(CoercionFailure {
                                record_id: record.id().clone(),
                                field: field.to_string(),
                                value: current.clone(),
                                target,
                            });
                            current // keeps its original storage class
                        }
                    }
                } else {
                    current
                };
                values.push(value_to_sql(&value));
            }
            tx.execute(&insert_sql, params_from_iter(values))
                .map_err(|e| map_err(entity, "change_field_type", &e))?;
        }

        tx.execute(&format!("DROP TABLE \"{entity}\""), [])
            .map_err(|e| map_err(entity, "change_field_type", &e))?;
        tx.execute(
            &format!("ALTER TABLE \"{scratch}\" RENAME TO \"{entity}\""),
            [],
        )
        .map_err(|e| map_err(entity, "change_field_type", &e))?;

        tx.commit()
            .map_err(|e| map_err(entity, "change_field_type", &e))?;

        Ok(failures)
    }

    async fn count(&self, entity: &str) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM \"{entity}\""), [], |row| {
                row.get(0)
            })
            .map_err(|e| map_err(entity, "count", &e))?;

        #[allow(clippy::cast_sign_loss)]
        Ok(count as usize)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }
}

// =============================================================================
// Tests
// =============================================================================
