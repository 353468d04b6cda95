//! Schema Registry
//!
//! The engine's durable record of each entity's accepted shapes, stored in
//! the engine-owned `schema_history` store on the default backend. One row
//! per accepted shape, appended only after a drift check fully succeeds;
//! the latest row per entity is the last-known shape.
//!
//! ```text
//! schema_history
//! ├── entity       text   entity whose shape was accepted
//! ├── fields_json  text   the field list, serialized
//! └── updated_at   text   RFC 3339 acceptance time
//! ```

use std::sync::Arc;

use fichario_core::{EntitySchema, FieldMap, FieldSpec, FieldType, Value};

use crate::constants::SCHEMA_HISTORY_STORE;
use crate::storage::{StorageBackend, StorageError, StorageResult};

/// One accepted shape, as read back from the history store.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaSnapshot {
    /// Entity whose shape was accepted.
    pub entity: String,
    /// The accepted field list.
    pub fields: Vec<FieldSpec>,
    /// Acceptance time, RFC 3339.
    pub updated_at: String,
}

/// Append-only registry of accepted entity shapes.
pub struct SchemaRegistry {
    backend: Arc<dyn StorageBackend>,
}

impl SchemaRegistry {
    /// Create a registry over the backend that owns `schema_history`.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Create the history store if missing.
    pub async fn ensure_store(&self) -> StorageResult<()> {
        let schema = EntitySchema::new(SCHEMA_HISTORY_STORE)
            .with_field(FieldSpec::new("entity", FieldType::Text))
            .with_field(FieldSpec::new("fields_json", FieldType::Text))
            .with_field(FieldSpec::new("updated_at", FieldType::Text));

        self.backend.create_store(&schema).await
    }

    /// The latest accepted shape for `entity`, or `None` when no drift
    /// check has recorded one yet. A missing history store reads as empty.
    pub async fn last_known(&self, entity: &str) -> StorageResult<Option<Vec<FieldSpec>>> {
        Ok(self
            .history(entity)
            .await?
            .pop()
            .map(|snapshot| snapshot.fields))
    }

    /// Append a newly accepted shape.
    #[tracing::instrument(skip(self, fields))]
    pub async fn record_shape(
        &self,
        entity: &str,
        fields: &[FieldSpec],
        updated_at: &str,
    ) -> StorageResult<()> {
        let mut row = FieldMap::new();
        row.insert("entity".to_string(), Value::from(entity));
        row.insert(
            "fields_json".to_string(),
            Value::Text(serde_json::to_string(fields)?),
        );
        row.insert("updated_at".to_string(), Value::from(updated_at));

        self.backend.insert(SCHEMA_HISTORY_STORE, row).await?;

        Ok(())
    }

    /// Every accepted shape for `entity`, oldest first.
    pub async fn history(&self, entity: &str) -> StorageResult<Vec<SchemaSnapshot>> {
        let rows = match self.backend.read_all(SCHEMA_HISTORY_STORE).await {
            Ok(rows) => rows,
            Err(StorageError::StoreMissing { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut snapshots = Vec::new();
        for row in rows {
            if row.get("entity").and_then(Value::as_text) != Some(entity) {
                continue;
            }
            let json = row
                .get("fields_json")
                .and_then(Value::as_text)
                .ok_or_else(|| {
                    StorageError::serialization(format!(
                        "schema_history row {} has no fields_json",
                        row.id()
                    ))
                })?;
            snapshots.push(SchemaSnapshot {
                entity: entity.to_string(),
                fields: serde_json::from_str(json)?,
                updated_at: row
                    .get("updated_at")
                    .and_then(Value::as_text)
                    .unwrap_or_default()
                    .to_string(),
            });
        }

        Ok(snapshots)
    }
}

// =============================================================================
// Tests
// =============================================================================
