//! SimBackend - Deterministic In-Memory Storage
//!
//! TigerStyle: Simulation-first. The sim backend is not a mock; it is a
//! complete backend implementation whose every nondeterministic input
//! (identifier minting, fault arrival) is driven by a seeded RNG. Any bug
//! found under a seed replays exactly from that seed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        SimBackend                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  stores: RwLock<HashMap<entity, SimStore>>                  │
//! │  rng:    Mutex<DeterministicRng> (mints record identifiers) │
//! │  faults: Option<Arc<FaultInjector>>                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each `SimStore` keeps its field list in declaration order and its records
//! in insertion order, exactly the shape the flat-file backend persists.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use fichario_core::dst::{DeterministicRng, FaultInjector, FaultType, SimConfig};
use fichario_core::{
    EntitySchema, FieldMap, FieldSpec, FieldType, Record, RecordId, Value, RECORD_ID_BODY_LENGTH,
};

use super::backend::{BackendKind, CoercionFailure, StorageBackend};
use super::ensure_value_fits;
use super::error::{StorageError, StorageResult};
use crate::constants::SIM_INJECTED_TIMEOUT_MS;

// =============================================================================
// SimStore
// =============================================================================

/// One entity's in-memory store: field list plus records in insertion order.
#[derive(Debug, Clone)]
struct SimStore {
    fields: Vec<FieldSpec>,
    records: Vec<Record>,
}

impl SimStore {
    fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn contains_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}

// =============================================================================
// SimBackend
// =============================================================================

/// Deterministic in-memory storage backend.
///
/// Same seed, same identifiers, same fault arrivals.
#[derive(Debug)]
pub struct SimBackend {
    stores: RwLock<HashMap<String, SimStore>>,
    rng: Mutex<DeterministicRng>,
    faults: Option<Arc<FaultInjector>>,
}

impl SimBackend {
    /// Create a sim backend seeded from the simulation config.
    #[must_use]
    pub fn new(config: &SimConfig) -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
            rng: Mutex::new(config.rng()),
            faults: None,
        }
    }

    /// Attach a fault injector.
    ///
    /// Operations consult it under names of the form `<verb>_<entity>`
    /// (`insert_cliente`, `read_all_pedido`).
    #[must_use]
    pub fn with_faults(mut self, injector: FaultInjector) -> Self {
        self.faults = Some(Arc::new(injector));
        self
    }

    /// The attached fault injector, for inspecting injection stats.
    #[must_use]
    pub fn faults(&self) -> Option<&Arc<FaultInjector>> {
        self.faults.as_ref()
    }

    /// Number of stores created on this backend.
    #[must_use]
    pub fn store_count(&self) -> usize {
        self.stores.read().unwrap().len()
    }

    /// Consult the fault injector before touching a store.
    fn maybe_inject_fault(&self, operation: &str, entity: &str) -> StorageResult<()> {
        let Some(injector) = &self.faults else {
            return Ok(());
        };
        let Some(fault) = injector.should_inject(operation) else {
            return Ok(());
        };

        tracing::debug!(operation, entity, fault = fault.as_str(), "injected fault");

        Err(match fault {
            FaultType::OperationTimeout => {
                StorageError::timeout(operation, SIM_INJECTED_TIMEOUT_MS)
            }
            FaultType::IdCorruption => StorageError::checksum_mismatch(entity, corrupted_id()),
            _ => StorageError::unavailable(format!("injected fault: {}", fault.as_str())),
        })
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new(&SimConfig::from_env_or_random())
    }
}

/// A well-formed-length identifier whose checksum cannot verify.
///
/// The body is all zeros, so its check symbol would be `0`; `Z` is not it.
fn corrupted_id() -> String {
    let mut s = "0".repeat(RECORD_ID_BODY_LENGTH);
    s.push('Z');
    s
}

// =============================================================================
// StorageBackend Implementation
// =============================================================================

#[async_trait]
impl StorageBackend for SimBackend {
    #[tracing::instrument(skip(self, schema), fields(entity = schema.entity()))]
    async fn create_store(&self, schema: &EntitySchema) -> StorageResult<()> {
        self.maybe_inject_fault(&format!("create_store_{}", schema.entity()), schema.entity())?;

        let mut stores = self.stores.write().unwrap();
        stores
            .entry(schema.entity().to_string())
            .or_insert_with(|| SimStore {
                fields: schema.fields().to_vec(),
                records: Vec::new(),
            });

        Ok(())
    }

    async fn store_exists(&self, entity: &str) -> StorageResult<bool> {
        Ok(self.stores.read().unwrap().contains_key(entity))
    }

    async fn store_fields(&self, entity: &str) -> StorageResult<Vec<FieldSpec>> {
        let stores = self.stores.read().unwrap();
        let store = stores
            .get(entity)
            .ok_or_else(|| StorageError::store_missing(entity))?;
        Ok(store.fields.clone())
    }

    #[tracing::instrument(skip(self, fields))]
    async fn insert(&self, entity: &str, mut fields: FieldMap) -> StorageResult<RecordId> {
        // Precondition
        assert!(!entity.is_empty(), "entity must not be empty");

        self.maybe_inject_fault(&format!("insert_{entity}"), entity)?;

        let mut stores = self.stores.write().unwrap();
        let store = stores
            .get_mut(entity)
            .ok_or_else(|| StorageError::store_missing(entity))?;

        // Build the complete row: declared fields only, defaults for the rest.
        let mut row = FieldMap::with_capacity(store.fields.len());
        for spec in &store.fields {
            let value = match fields.remove(&spec.name) {
                Some(value) => {
                    ensure_value_fits(entity, spec, &value)?;
                    value
                }
                None => spec.default.clone(),
            };
            row.insert(spec.name.clone(), value);
        }
        if let Some(unknown) = fields.keys().next() {
            return Err(StorageError::validation(format!(
                "unknown field '{unknown}' for entity '{entity}'"
            )));
        }

        let id = RecordId::generate_with(&mut *self.rng.lock().unwrap());
        if store.records.iter().any(|r| r.id() == &id) {
            return Err(StorageError::already_exists(entity, id.as_str()));
        }

        store.records.push(Record::new(entity, id.clone(), row));

        Ok(id)
    }

    #[tracing::instrument(skip(self))]
    async fn read_all(&self, entity: &str) -> StorageResult<Vec<Record>> {
        self.maybe_inject_fault(&format!("read_all_{entity}"), entity)?;

        let stores = self.stores.read().unwrap();
        let store = stores
            .get(entity)
            .ok_or_else(|| StorageError::store_missing(entity))?;

        Ok(store.records.clone())
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    async fn read_one(&self, entity: &str, id: &RecordId) -> StorageResult<Record> {
        self.maybe_inject_fault(&format!("read_one_{entity}"), entity)?;

        let stores = self.stores.read().unwrap();
        let store = stores
            .get(entity)
            .ok_or_else(|| StorageError::store_missing(entity))?;

        store
            .records
            .iter()
            .find(|r| r.id() == id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(entity, id.as_str()))
    }

    #[tracing::instrument(skip(self, changes), fields(id = %id))]
    async fn update(
        &self,
        entity: &str,
        id: &RecordId,
        changes: FieldMap,
    ) -> StorageResult<Record> {
        self.maybe_inject_fault(&format!("update_{entity}"), entity)?;

        let mut stores = self.stores.write().unwrap();
        let store = stores
            .get_mut(entity)
            .ok_or_else(|| StorageError::store_missing(entity))?;

        for (key, value) in &changes {
            let spec = store.field(key).ok_or_else(|| {
                StorageError::validation(format!(
                    "unknown field '{key}' for entity '{entity}'"
                ))
            })?;
            ensure_value_fits(entity, spec, value)?;
        }

        let record = store
            .records
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or_else(|| StorageError::not_found(entity, id.as_str()))?;

        for (key, value) in changes {
            record.set(key, value);
        }

        Ok(record.clone())
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    async fn delete(&self, entity: &str, id: &RecordId) -> StorageResult<()> {
        self.maybe_inject_fault(&format!("delete_{entity}"), entity)?;

        let mut stores = self.stores.write().unwrap();
        let store = stores
            .get_mut(entity)
            .ok_or_else(|| StorageError::store_missing(entity))?;

        let position = store
            .records
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| StorageError::not_found(entity, id.as_str()))?;

        store.records.remove(position);

        Ok(())
    }

    #[tracing::instrument(skip(self, spec), fields(field = %spec.name))]
    async fn add_field(&self, entity: &str, spec: &FieldSpec) -> StorageResult<()> {
        self.maybe_inject_fault(&format!("add_field_{entity}"), entity)?;

        let mut stores = self.stores.write().unwrap();
        let store = stores
            .get_mut(entity)
            .ok_or_else(|| StorageError::store_missing(entity))?;

        if store.contains_field(&spec.name) {
            return Ok(());
        }

        store.fields.push(spec.clone());
        for record in &mut store.records {
            record.set(spec.name.clone(), spec.default.clone());
        }

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn rename_field(&self, entity: &str, from: &str, to: &str) -> StorageResult<()> {
        self.maybe_inject_fault(&format!("rename_field_{entity}"), entity)?;

        let mut stores = self.stores.write().unwrap();
        let store = stores
            .get_mut(entity)
            .ok_or_else(|| StorageError::store_missing(entity))?;

        if !store.contains_field(from) && store.contains_field(to) {
            return Ok(()); // already applied
        }
        if !store.contains_field(from) {
            return Err(StorageError::validation(format!(
                "no field '{from}' in entity '{entity}'"
            )));
        }
        if store.contains_field(to) {
            return Err(StorageError::validation(format!(
                "field '{to}' already exists in entity '{entity}'"
            )));
        }

        for spec in &mut store.fields {
            if spec.name == from {
                spec.name = to.to_string();
            }
        }
        for record in &mut store.records {
            if let Some(value) = record.remove(from) {
                record.set(to.to_string(), value);
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn remove_field(&self, entity: &str, field: &str) -> StorageResult<()> {
        self.maybe_inject_fault(&format!("remove_field_{entity}"), entity)?;

        let mut stores = self.stores.write().unwrap();
        let store = stores
            .get_mut(entity)
            .ok_or_else(|| StorageError::store_missing(entity))?;

        store.fields.retain(|f| f.name != field);
        for record in &mut store.records {
            record.remove(field);
        }

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn change_field_type(
        &self,
        entity: &str,
        field: &str,
        target: FieldType,
    ) -> StorageResult<Vec<CoercionFailure>> {
        self.maybe_inject_fault(&format!("change_field_type_{entity}"), entity)?;

        let mut stores = self.stores.write().unwrap();
        let store = stores
            .get_mut(entity)
            .ok_or_else(|| StorageError::store_missing(entity))?;

        let position = store
            .fields
            .iter()
            .position(|f| f.name == field)
            .ok_or_else(|| {
                StorageError::validation(format!("no field '{field}' in entity '{entity}'"))
            })?;

        let mut failures = Vec::new();
        for record in &mut store.records {
            let current = record.get(field).cloned().unwrap_or(Value::Null);
            match current.coerce(target) {
                Some(coerced) => record.set(field.to_string(), coerced),
                None => failures.push(CoercionFailure {
                    record_id: record.id().clone(),
                    field: field.to_string(),
                    value: current,
                    target,
                }),
            }
        }

        let spec = &mut store.fields[position];
        spec.field_type = target;
        spec.default = spec.default.coerce(target).unwrap_or(Value::Null);

        Ok(failures)
    }

    async fn count(&self, entity: &str) -> StorageResult<usize> {
        let stores = self.stores.read().unwrap();
        let store = stores
            .get(entity)
            .ok_or_else(|| StorageError::store_missing(entity))?;
        Ok(store.records.len())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SimBackend {
        SimBackend::new(&SimConfig::with_seed(42))
    }

    fn cliente_schema() -> EntitySchema {
        EntitySchema::new("cliente")
            .with_field(FieldSpec::new("nome", FieldType::Text))
            .with_field(FieldSpec::new("idade", FieldType::Int))
    }

    fn produto_schema() -> EntitySchema {
        EntitySchema::new("produto")
            .with_field(FieldSpec::new("nome", FieldType::Text))
            .with_field(FieldSpec::new("preco", FieldType::Float))
            .with_field(FieldSpec::new("ativo", FieldType::Bool).with_default(Value::Bool(true)))
    }

    fn fields(pairs: &[(&str, Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_create_store_idempotent() {
        let backend = backend();
        backend.create_store(&cliente_schema()).await.unwrap();
        backend.create_store(&cliente_schema()).await.unwrap();

        assert!(backend.store_exists("cliente").await.unwrap());
        assert!(!backend.store_exists("pedido").await.unwrap());
        assert_eq!(backend.store_count(), 1);

        let persisted = backend.store_fields("cliente").await.unwrap();
        let names: Vec<&str> = persisted.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["nome", "idade"]);
    }

    #[tokio::test]
    async fn test_insert_read_round_trip() {
        let backend = backend();
        backend.create_store(&cliente_schema()).await.unwrap();

        let id = backend
            .insert(
                "cliente",
                fields(&[("nome", Value::from("Acme")), ("idade", Value::Int(12))]),
            )
            .await
            .unwrap();

        let record = backend.read_one("cliente", &id).await.unwrap();
        assert_eq!(record.entity(), "cliente");
        assert_eq!(record.id(), &id);
        assert_eq!(record.get("nome"), Some(&Value::from("Acme")));
        assert_eq!(record.get("idade"), Some(&Value::Int(12)));
        assert_eq!(record.fields().len(), 2);
    }

    #[tokio::test]
    async fn test_insert_fills_defaults() {
        let backend = backend();
        backend.create_store(&produto_schema()).await.unwrap();

        let id = backend
            .insert("produto", fields(&[("nome", Value::from("Caneta"))]))
            .await
            .unwrap();

        let record = backend.read_one("produto", &id).await.unwrap();
        assert_eq!(record.get("preco"), Some(&Value::Null));
        assert_eq!(record.get("ativo"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn test_insert_rejects_unknown_field() {
        let backend = backend();
        backend.create_store(&cliente_schema()).await.unwrap();

        let err = backend
            .insert("cliente", fields(&[("telefone", Value::from("555"))]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_writes_reject_type_mismatch() {
        let backend = backend();
        backend.create_store(&cliente_schema()).await.unwrap();

        let err = backend
            .insert("cliente", fields(&[("idade", Value::from("doze"))]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation { .. }));

        let id = backend
            .insert("cliente", fields(&[("idade", Value::Int(12))]))
            .await
            .unwrap();
        let err = backend
            .update("cliente", &id, fields(&[("idade", Value::Bool(true))]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation { .. }));

        // Null always passes.
        backend
            .update("cliente", &id, fields(&[("idade", Value::Null)]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_insert_requires_store() {
        let backend = backend();
        let err = backend.insert("cliente", FieldMap::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::StoreMissing { .. }));
    }

    #[tokio::test]
    async fn test_read_one_not_found() {
        let backend = backend();
        backend.create_store(&cliente_schema()).await.unwrap();

        let absent = RecordId::generate();
        let err = backend.read_one("cliente", &absent).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_partial_update_keeps_other_fields() {
        let backend = backend();
        backend.create_store(&cliente_schema()).await.unwrap();

        let id = backend
            .insert(
                "cliente",
                fields(&[("nome", Value::from("Acme")), ("idade", Value::Int(1))]),
            )
            .await
            .unwrap();

        let updated = backend
            .update("cliente", &id, fields(&[("idade", Value::Int(2))]))
            .await
            .unwrap();
        assert_eq!(updated.get("nome"), Some(&Value::from("Acme")));
        assert_eq!(updated.get("idade"), Some(&Value::Int(2)));

        let read_back = backend.read_one("cliente", &id).await.unwrap();
        assert_eq!(read_back, updated);
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_field() {
        let backend = backend();
        backend.create_store(&cliente_schema()).await.unwrap();
        let id = backend.insert("cliente", FieldMap::new()).await.unwrap();

        let err = backend
            .update("cliente", &id, fields(&[("telefone", Value::from("555"))]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let backend = backend();
        backend.create_store(&cliente_schema()).await.unwrap();

        let err = backend
            .update("cliente", &RecordId::generate(), FieldMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete() {
        let backend = backend();
        backend.create_store(&cliente_schema()).await.unwrap();
        let id = backend.insert("cliente", FieldMap::new()).await.unwrap();

        backend.delete("cliente", &id).await.unwrap();
        assert_eq!(backend.count("cliente").await.unwrap(), 0);

        let err = backend.delete("cliente", &id).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_read_all_insertion_order() {
        let backend = backend();
        backend.create_store(&cliente_schema()).await.unwrap();

        let mut ids = Vec::new();
        for i in 0..3 {
            let id = backend
                .insert("cliente", fields(&[("idade", Value::Int(i))]))
                .await
                .unwrap();
            ids.push(id);
        }

        let records = backend.read_all("cliente").await.unwrap();
        let read_ids: Vec<&RecordId> = records.iter().map(Record::id).collect();
        assert_eq!(read_ids, ids.iter().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_add_field_backfills_default() {
        let backend = backend();
        backend.create_store(&produto_schema()).await.unwrap();
        let id = backend
            .insert("produto", fields(&[("nome", Value::from("Caneta"))]))
            .await
            .unwrap();

        let categoria =
            FieldSpec::new("categoria", FieldType::Text).with_default(Value::from("geral"));
        backend.add_field("produto", &categoria).await.unwrap();

        let record = backend.read_one("produto", &id).await.unwrap();
        assert_eq!(record.get("categoria"), Some(&Value::from("geral")));

        // Re-adding the same field is a no-op.
        backend.add_field("produto", &categoria).await.unwrap();
        assert_eq!(backend.store_fields("produto").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_rename_field_preserves_values() {
        let backend = backend();
        backend.create_store(&cliente_schema()).await.unwrap();
        let id = backend
            .insert("cliente", fields(&[("nome", Value::from("Acme"))]))
            .await
            .unwrap();

        backend
            .rename_field("cliente", "nome", "razao_social")
            .await
            .unwrap();

        let record = backend.read_one("cliente", &id).await.unwrap();
        assert_eq!(record.get("razao_social"), Some(&Value::from("Acme")));
        assert_eq!(record.get("nome"), None);

        // Replaying an applied rename is a no-op.
        backend
            .rename_field("cliente", "nome", "razao_social")
            .await
            .unwrap();

        // Renaming a field that never existed is a caller mistake.
        let err = backend
            .rename_field("cliente", "telefone", "fone")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_remove_field() {
        let backend = backend();
        backend.create_store(&cliente_schema()).await.unwrap();
        let id = backend
            .insert("cliente", fields(&[("idade", Value::Int(3))]))
            .await
            .unwrap();

        backend.remove_field("cliente", "idade").await.unwrap();

        let record = backend.read_one("cliente", &id).await.unwrap();
        assert_eq!(record.get("idade"), None);
        assert_eq!(backend.store_fields("cliente").await.unwrap().len(), 1);

        // Removing again is a no-op.
        backend.remove_field("cliente", "idade").await.unwrap();
    }

    #[tokio::test]
    async fn test_change_field_type_reports_failures() {
        let backend = backend();
        let schema = EntitySchema::new("produto")
            .with_field(FieldSpec::new("preco", FieldType::Text));
        backend.create_store(&schema).await.unwrap();

        let ok_id = backend
            .insert("produto", fields(&[("preco", Value::from("10.5"))]))
            .await
            .unwrap();
        let bad_id = backend
            .insert("produto", fields(&[("preco", Value::from("abc"))]))
            .await
            .unwrap();

        let failures = backend
            .change_field_type("produto", "preco", FieldType::Float)
            .await
            .unwrap();

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].record_id, bad_id);
        assert_eq!(failures[0].value, Value::from("abc"));
        assert_eq!(failures[0].target, FieldType::Float);

        let ok_record = backend.read_one("produto", &ok_id).await.unwrap();
        assert_eq!(ok_record.get("preco"), Some(&Value::Float(10.5)));

        // The refusing record keeps its original value.
        let bad_record = backend.read_one("produto", &bad_id).await.unwrap();
        assert_eq!(bad_record.get("preco"), Some(&Value::from("abc")));

        let persisted = backend.store_fields("produto").await.unwrap();
        assert_eq!(persisted[0].field_type, FieldType::Float);
    }

    #[tokio::test]
    async fn test_kind() {
        assert_eq!(backend().kind(), BackendKind::Memory);
    }
}

// =============================================================================
// DST Tests
// =============================================================================

#[cfg(test)]
mod dst_tests {
    use super::*;
    use fichario_core::dst::{FaultConfig, FaultInjectorBuilder};

    #[tokio::test]
    async fn test_same_seed_same_ids() {
        let mut ids_per_run = Vec::new();

        for _ in 0..2 {
            let backend = SimBackend::new(&SimConfig::with_seed(7));
            backend
                .create_store(&EntitySchema::new("cliente"))
                .await
                .unwrap();

            let mut ids = Vec::new();
            for _ in 0..10 {
                ids.push(backend.insert("cliente", FieldMap::new()).await.unwrap());
            }
            ids_per_run.push(ids);
        }

        assert_eq!(ids_per_run[0], ids_per_run[1]);
    }

    #[tokio::test]
    async fn test_write_fault_surfaces_unavailable() {
        let config = SimConfig::with_seed(42);
        let injector = FaultInjectorBuilder::new(config.rng().fork())
            .with_fault(FaultConfig::new(FaultType::WriteFail, 1.0).with_filter("insert"))
            .build();
        let backend = SimBackend::new(&config).with_faults(injector);

        backend
            .create_store(&EntitySchema::new("cliente"))
            .await
            .unwrap();

        let err = backend.insert("cliente", FieldMap::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }));
        assert!(err.is_transient());
        assert_eq!(backend.faults().unwrap().total_injections(), 1);
    }

    #[tokio::test]
    async fn test_timeout_fault_surfaces_timeout() {
        let config = SimConfig::with_seed(42);
        let injector = FaultInjectorBuilder::new(config.rng().fork())
            .with_fault(FaultConfig::new(FaultType::OperationTimeout, 1.0).with_filter("update"))
            .build();
        let backend = SimBackend::new(&config).with_faults(injector);

        backend
            .create_store(&EntitySchema::new("cliente"))
            .await
            .unwrap();
        let id = backend.insert("cliente", FieldMap::new()).await.unwrap();

        let err = backend
            .update("cliente", &id, FieldMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Timeout { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_id_corruption_surfaces_checksum_mismatch() {
        let config = SimConfig::with_seed(42);
        let injector = FaultInjectorBuilder::new(config.rng().fork())
            .with_fault(FaultConfig::new(FaultType::IdCorruption, 1.0).with_filter("read_one"))
            .build();
        let backend = SimBackend::new(&config).with_faults(injector);

        backend
            .create_store(&EntitySchema::new("cliente"))
            .await
            .unwrap();
        let id = backend.insert("cliente", FieldMap::new()).await.unwrap();

        let err = backend.read_one("cliente", &id).await.unwrap_err();
        match err {
            StorageError::ChecksumMismatch { entity, found } => {
                assert_eq!(entity, "cliente");
                assert!(!RecordId::validate(&found));
            }
            other => panic!("expected checksum mismatch, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_fault_filter_scopes_by_entity() {
        let config = SimConfig::with_seed(42);
        let injector = FaultInjectorBuilder::new(config.rng().fork())
            .with_fault(FaultConfig::new(FaultType::WriteFail, 1.0).with_filter("insert_cliente"))
            .build();
        let backend = SimBackend::new(&config).with_faults(injector);

        backend
            .create_store(&EntitySchema::new("cliente"))
            .await
            .unwrap();
        backend
            .create_store(&EntitySchema::new("pedido"))
            .await
            .unwrap();

        // Same verb against another entity passes through.
        backend.insert("pedido", FieldMap::new()).await.unwrap();
        let err = backend.insert("cliente", FieldMap::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_max_injections_bounds_the_outage() {
        let config = SimConfig::with_seed(42);
        let injector = FaultInjectorBuilder::new(config.rng().fork())
            .with_fault(
                FaultConfig::new(FaultType::WriteFail, 1.0)
                    .with_filter("insert")
                    .with_max_injections(1),
            )
            .build();
        let backend = SimBackend::new(&config).with_faults(injector);

        backend
            .create_store(&EntitySchema::new("cliente"))
            .await
            .unwrap();

        assert!(backend.insert("cliente", FieldMap::new()).await.is_err());
        assert!(backend.insert("cliente", FieldMap::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_faults_do_not_corrupt_state() {
        let config = SimConfig::with_seed(99);
        let injector = FaultInjectorBuilder::new(config.rng().fork())
            .with_fault(FaultConfig::new(FaultType::WriteFail, 0.5).with_filter("insert"))
            .build();
        let backend = SimBackend::new(&config).with_faults(injector);

        backend
            .create_store(
                &EntitySchema::new("pedido").with_field(FieldSpec::new("total", FieldType::Int)),
            )
            .await
            .unwrap();

        let mut succeeded = 0;
        for i in 0..50 {
            let mut fields = FieldMap::new();
            fields.insert("total".to_string(), Value::Int(i));
            if backend.insert("pedido", fields).await.is_ok() {
                succeeded += 1;
            }
        }

        // Every surviving write is fully visible, every failed one invisible.
        assert_eq!(backend.count("pedido").await.unwrap(), succeeded);
        assert!(succeeded > 0, "seed 99 must let some writes through");
    }
}

// =============================================================================
// Property Tests
// =============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;
    use fichario_core::dst::{test_seeds, PropertyTest, PropertyTestable, SimClock};

    /// Model-checked CRUD: the backend must agree with a trivial in-memory
    /// model after any operation sequence.
    struct StoreModel {
        runtime: tokio::runtime::Runtime,
        backend: SimBackend,
        live_ids: Vec<RecordId>,
        next_total: i64,
    }

    /// One generated CRUD step. Indices point into the live set at
    /// generation time; the runner applies each operation before
    /// generating the next, so they stay valid.
    #[derive(Debug, Clone)]
    enum StoreOp {
        Insert,
        Update { index: usize },
        Delete { index: usize },
    }

    impl StoreModel {
        fn new(seed: u64) -> Self {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .expect("runtime");
            let backend = SimBackend::new(&SimConfig::with_seed(seed));
            runtime
                .block_on(backend.create_store(
                    &EntitySchema::new("pedido")
                        .with_field(FieldSpec::new("total", FieldType::Int)),
                ))
                .expect("create store");

            Self {
                runtime,
                backend,
                live_ids: Vec::new(),
                next_total: 0,
            }
        }
    }

    impl PropertyTestable for StoreModel {
        type Operation = StoreOp;

        fn generate_operation(&self, rng: &mut DeterministicRng) -> Self::Operation {
            if self.live_ids.is_empty() {
                return StoreOp::Insert;
            }
            match rng.next_usize(0, 3) {
                0 | 1 => StoreOp::Insert,
                2 => StoreOp::Update {
                    index: rng.next_usize(0, self.live_ids.len() - 1),
                },
                _ => StoreOp::Delete {
                    index: rng.next_usize(0, self.live_ids.len() - 1),
                },
            }
        }

        fn apply_operation(&mut self, op: &Self::Operation, _clock: &SimClock) {
            match op {
                StoreOp::Insert => {
                    let mut fields = FieldMap::new();
                    fields.insert("total".to_string(), Value::Int(self.next_total));
                    self.next_total += 1;
                    let id = self
                        .runtime
                        .block_on(self.backend.insert("pedido", fields))
                        .expect("insert");
                    self.live_ids.push(id);
                }
                StoreOp::Update { index } => {
                    let id = self.live_ids[*index].clone();
                    let mut fields = FieldMap::new();
                    fields.insert("total".to_string(), Value::Int(self.next_total));
                    self.next_total += 1;
                    self.runtime
                        .block_on(self.backend.update("pedido", &id, fields))
                        .expect("update");
                }
                StoreOp::Delete { index } => {
                    let id = self.live_ids.remove(*index);
                    self.runtime
                        .block_on(self.backend.delete("pedido", &id))
                        .expect("delete");
                }
            }
        }

        fn check_invariants(&self) -> Result<(), String> {
            let count = self
                .runtime
                .block_on(self.backend.count("pedido"))
                .map_err(|e| e.to_string())?;
            if count != self.live_ids.len() {
                return Err(format!(
                    "backend holds {count} records, model expects {}",
                    self.live_ids.len()
                ));
            }

            for id in &self.live_ids {
                let record = self
                    .runtime
                    .block_on(self.backend.read_one("pedido", id))
                    .map_err(|e| format!("live id {id} unreadable: {e}"))?;
                if record.get("total").is_none() {
                    return Err(format!("record {id} lost its declared field"));
                }
            }

            Ok(())
        }

        fn describe_state(&self) -> String {
            format!("live_ids={} next_total={}", self.live_ids.len(), self.next_total)
        }
    }

    #[test]
    fn test_crud_properties_hold() {
        for seed in test_seeds(5) {
            PropertyTest::new(seed)
                .with_max_operations(40)
                .run_and_assert(StoreModel::new(seed));
        }
    }
}
