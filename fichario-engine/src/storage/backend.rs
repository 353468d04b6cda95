//! Storage Backend Trait
//!
//! TigerStyle: One uniform contract, interchangeable media behind it.
//!
//! Every concrete backend (in-memory simulation, flat-file, embedded
//! relational) must behave identically with respect to this contract.
//! Backend-specific quirks (type affinity, file locking) are normalized
//! inside the adapter, never leaked to callers.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fichario_core::{EntitySchema, FieldMap, FieldSpec, FieldType, Record, RecordId, Value};

use super::error::{StorageError, StorageResult};

/// Which storage medium a backend writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-memory simulation backend. Deterministic, fault-injectable.
    Memory,
    /// One JSON document per entity, atomically replaced on write.
    FlatFile,
    /// Embedded relational database, one table per entity.
    Sqlite,
}

impl BackendKind {
    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::FlatFile => "flatfile",
            Self::Sqlite => "sqlite",
        }
    }

    /// All backend kinds.
    #[must_use]
    pub fn all() -> &'static [BackendKind] {
        &[Self::Memory, Self::FlatFile, Self::Sqlite]
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "flatfile" => Ok(Self::FlatFile),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(StorageError::validation(format!(
                "unknown backend kind: {other}"
            ))),
        }
    }
}

/// One record whose value refused conversion during a type-change migration.
///
/// The record keeps its original value; the migration continues and reports
/// these rows instead of rolling back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoercionFailure {
    /// The record left untouched.
    pub record_id: RecordId,
    /// The field under conversion.
    pub field: String,
    /// The value that could not represent the target type.
    pub value: Value,
    /// The type it was asked to become.
    pub target: FieldType,
}

impl fmt::Display for CoercionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}. {} cannot become {}",
            self.record_id, self.field, self.target
        )
    }
}

/// Uniform contract over one storage medium.
///
/// CRUD calls address records by entity name and identifier. DDL calls
/// (`add_field` through `change_field_type`) reshape a store and are invoked
/// only by the schema migrator, never directly by callers.
///
/// Reads are canonical: every record comes back with all of the store's
/// fields, `Value::Null` filling anything never written.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Create the entity's store if absent. Idempotent.
    async fn create_store(&self, schema: &EntitySchema) -> StorageResult<()>;

    /// Whether the entity's store exists on this medium.
    async fn store_exists(&self, entity: &str) -> StorageResult<bool>;

    /// The store's persisted field list, in column order, with the
    /// defaults the medium recorded at declaration time.
    async fn store_fields(&self, entity: &str) -> StorageResult<Vec<FieldSpec>>;

    /// Persist a new record atomically and return its assigned identifier.
    ///
    /// `fields` never includes the identifier; the backend mints one.
    /// Missing fields are stored as the field's declared default.
    async fn insert(&self, entity: &str, fields: FieldMap) -> StorageResult<RecordId>;

    /// All records in insertion order.
    async fn read_all(&self, entity: &str) -> StorageResult<Vec<Record>>;

    /// One record by identifier. Fails with `NotFound` when absent.
    async fn read_one(&self, entity: &str, id: &RecordId) -> StorageResult<Record>;

    /// Partial update: fields absent from `changes` keep their prior value.
    /// Returns the record as persisted. Fails with `NotFound` when absent.
    async fn update(&self, entity: &str, id: &RecordId, changes: FieldMap)
        -> StorageResult<Record>;

    /// Remove one record. Fails with `NotFound` when absent.
    /// Never cascades to ledger stores.
    async fn delete(&self, entity: &str, id: &RecordId) -> StorageResult<()>;

    /// Add a field, backfilling existing records with its default.
    /// A field already present with this name is a no-op.
    async fn add_field(&self, entity: &str, spec: &FieldSpec) -> StorageResult<()>;

    /// Rename a field, preserving values. A rename already applied
    /// (`from` gone, `to` present) is a no-op.
    async fn rename_field(&self, entity: &str, from: &str, to: &str) -> StorageResult<()>;

    /// Drop a field and its values. A field already gone is a no-op.
    async fn remove_field(&self, entity: &str, field: &str) -> StorageResult<()>;

    /// Convert every record's value for `field` to the target type.
    ///
    /// Values that refuse conversion stay as they were and are reported;
    /// the conversion continues past them.
    async fn change_field_type(
        &self,
        entity: &str,
        field: &str,
        target: FieldType,
    ) -> StorageResult<Vec<CoercionFailure>>;

    /// Number of records in the entity's store.
    async fn count(&self, entity: &str) -> StorageResult<usize>;

    /// Which storage medium this backend writes to.
    fn kind(&self) -> BackendKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_round_trip() {
        for kind in BackendKind::all() {
            assert_eq!(kind.as_str().parse::<BackendKind>().unwrap(), *kind);
        }
        assert!("oracle".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_backend_kind_serde_shape() {
        assert_eq!(
            serde_json::to_string(&BackendKind::FlatFile).unwrap(),
            "\"flatfile\""
        );
        let back: BackendKind = serde_json::from_str("\"sqlite\"").unwrap();
        assert_eq!(back, BackendKind::Sqlite);
    }

    #[test]
    fn test_coercion_failure_display() {
        let failure = CoercionFailure {
            record_id: RecordId::generate(),
            field: "preco".to_string(),
            value: Value::from("abc"),
            target: FieldType::Float,
        };
        let text = failure.to_string();
        assert!(text.contains("preco"));
        assert!(text.contains("float"));
    }
}
