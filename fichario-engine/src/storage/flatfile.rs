//! FlatFileBackend - One JSON Document per Entity
//!
//! TigerStyle: Atomic replace, never a half-written store.
//!
//! # Layout
//!
//! ```text
//! <data_dir>/
//!   cliente.json        one StoreFile document per entity
//!   pedido.json
//!   cliente.json.tmp    scratch file, renamed into place on every write
//! ```
//!
//! Every write rewrites the whole document to a scratch file and renames it
//! over the store. A crash mid-write leaves the old document intact and at
//! worst a stale scratch file, which the next write overwrites.
//!
//! Writes to one entity are serialized by a per-entity lock, which makes
//! writes to a single record linearizable. Reads take no lock: rename is
//! atomic, so a concurrent reader sees either the old or the new document.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fichario_core::{EntitySchema, FieldMap, FieldSpec, FieldType, Record, RecordId, Value};

use super::backend::{BackendKind, CoercionFailure, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::{ensure_safe_name, ensure_value_fits};
use crate::constants::{FLATFILE_EXTENSION, FLATFILE_TMP_EXTENSION};

// =============================================================================
// On-Disk Document
// =============================================================================

/// The persisted shape of one entity's store.
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    entity: String,
    fields: Vec<FieldSpec>,
    records: Vec<StoredRecord>,
}

impl StoreFile {
    fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn contains_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}

/// One persisted record.
///
/// The identifier is kept as a raw string so that a corrupted one surfaces
/// as `ChecksumMismatch` on read instead of a generic parse failure.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    record_id: String,
    fields: FieldMap,
}

impl StoredRecord {
    /// Verify the identifier and assemble a canonical record.
    fn to_record(&self, entity: &str) -> StorageResult<Record> {
        let id: RecordId = self
            .record_id
            .parse()
            .map_err(|_| StorageError::checksum_mismatch(entity, self.record_id.clone()))?;
        Ok(Record::new(entity, id, self.fields.clone()))
    }
}

// =============================================================================
// FlatFileBackend
// =============================================================================

/// Flat-file storage backend.
#[derive(Debug)]
pub struct FlatFileBackend {
    data_dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FlatFileBackend {
    /// Open (and create if needed) a flat-file store rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let data_dir = data_dir.into();

        fs::create_dir_all(&data_dir).map_err(|e| {
            StorageError::unavailable(format!("create {}: {e}", data_dir.display()))
        })?;

        Ok(Self {
            data_dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// The directory store documents live in.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn store_path(&self, entity: &str) -> PathBuf {
        self.data_dir.join(format!("{entity}.{FLATFILE_EXTENSION}"))
    }

    fn tmp_path(&self, entity: &str) -> PathBuf {
        self.data_dir
            .join(format!("{entity}.{FLATFILE_TMP_EXTENSION}"))
    }

    /// The write lock for one entity's document.
    fn entity_lock(&self, entity: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks.entry(entity.to_string()).or_default().clone()
    }

    fn load(&self, entity: &str) -> StorageResult<StoreFile> {
        let path = self.store_path(entity);
        if !path.exists() {
            return Err(StorageError::store_missing(entity));
        }

        let bytes = fs::read(&path)
            .map_err(|e| StorageError::unavailable(format!("read {}: {e}", path.display())))?;
        let store: StoreFile = serde_json::from_slice(&bytes)?;

        Ok(store)
    }

    /// Write the whole document to scratch, then rename into place.
    fn save(&self, entity: &str, store: &StoreFile) -> StorageResult<()> {
        let tmp = self.tmp_path(entity);
        let path = self.store_path(entity);

        let bytes = serde_json::to_vec_pretty(store)?;
        fs::write(&tmp, bytes)
            .map_err(|e| StorageError::unavailable(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path)
            .map_err(|e| StorageError::unavailable(format!("rename {}: {e}", path.display())))?;

        Ok(())
    }
}

// =============================================================================
// StorageBackend Implementation
// =============================================================================

#[async_trait]
impl StorageBackend for FlatFileBackend {
    #[tracing::instrument(skip(self, schema), fields(entity = schema.entity()))]
    async fn create_store(&self, schema: &EntitySchema) -> StorageResult<()> {
        ensure_safe_name("entity", schema.entity())?;

        let lock = self.entity_lock(schema.entity());
        let _guard = lock.lock().unwrap();

        if self.store_path(schema.entity()).exists() {
            return Ok(());
        }

        self.save(
            schema.entity(),
            &StoreFile {
                entity: schema.entity().to_string(),
                fields: schema.fields().to_vec(),
                records: Vec::new(),
            },
        )
    }

    async fn store_exists(&self, entity: &str) -> StorageResult<bool> {
        Ok(self.store_path(entity).exists())
    }

    async fn store_fields(&self, entity: &str) -> StorageResult<Vec<FieldSpec>> {
        Ok(self.load(entity)?.fields)
    }

    #[tracing::instrument(skip(self, fields))]
    async fn insert(&self, entity: &str, mut fields: FieldMap) -> StorageResult<RecordId> {
        let lock = self.entity_lock(entity);
        let _guard = lock.lock().unwrap();

        let mut store = self.load(entity)?;

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

        let id = RecordId::generate();
        if store.records.iter().any(|r| r.record_id == id.as_str()) {
            return Err(StorageError::already_exists(entity, id.as_str()));
        }

        store.records.push(StoredRecord {
            record_id: id.to_string(),
            fields: row,
        });
        self.save(entity, &store)?;

        Ok(id)
    }

    #[tracing::instrument(skip(self))]
    async fn read_all(&self, entity: &str) -> StorageResult<Vec<Record>> {
        let store = self.load(entity)?;

        let mut records = Vec::with_capacity(store.records.len());
        for stored in &store.records {
            records.push(stored.to_record(entity)?);
        }

        Ok(records)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    async fn read_one(&self, entity: &str, id: &RecordId) -> StorageResult<Record> {
        let store = self.load(entity)?;

        store
            .records
            .iter()
            .find(|r| r.record_id == id.as_str())
            .ok_or_else(|| StorageError::not_found(entity, id.as_str()))?
            .to_record(entity)
    }

    #[tracing::instrument(skip(self, changes), fields(id = %id))]
    async fn update(
        &self,
        entity: &str,
        id: &RecordId,
        changes: FieldMap,
    ) -> StorageResult<Record> {
        let lock = self.entity_lock(entity);
        let _guard = lock.lock().unwrap();

        let mut store = self.load(entity)?;

        for (key, value) in &changes {
            let spec = store.field(key).ok_or_else(|| {
                StorageError::validation(format!(
                    "unknown field '{key}' for entity '{entity}'"
                ))
            })?;
            ensure_value_fits(entity, spec, value)?;
        }

        let stored = store
            .records
            .iter_mut()
            .find(|r| r.record_id == id.as_str())
            .ok_or_else(|| StorageError::not_found(entity, id.as_str()))?;

        for (key, value) in changes {
            stored.fields.insert(key, value);
        }
        let record = stored.to_record(entity)?;

        self.save(entity, &store)?;

        Ok(record)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    async fn delete(&self, entity: &str, id: &RecordId) -> StorageResult<()> {
        let lock = self.entity_lock(entity);
        let _guard = lock.lock().unwrap();

        let mut store = self.load(entity)?;

        let position = store
            .records
            .iter()
            .position(|r| r.record_id == id.as_str())
            .ok_or_else(|| StorageError::not_found(entity, id.as_str()))?;

        store.records.remove(position);
        self.save(entity, &store)
    }

    #[tracing::instrument(skip(self, spec), fields(field = %spec.name))]
    async fn add_field(&self, entity: &str, spec: &FieldSpec) -> StorageResult<()> {
        ensure_safe_name("field", &spec.name)?;

        let lock = self.entity_lock(entity);
        let _guard = lock.lock().unwrap();

        let mut store = self.load(entity)?;

        if store.contains_field(&spec.name) {
            return Ok(());
        }

        store.fields.push(spec.clone());
        for stored in &mut store.records {
            stored.fields.insert(spec.name.clone(), spec.default.clone());
        }

        self.save(entity, &store)
    }

    #[tracing::instrument(skip(self))]
    async fn rename_field(&self, entity: &str, from: &str, to: &str) -> StorageResult<()> {
        ensure_safe_name("field", to)?;

        let lock = self.entity_lock(entity);
        let _guard = lock.lock().unwrap();

        let mut store = self.load(entity)?;

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
        for stored in &mut store.records {
            if let Some(value) = stored.fields.remove(from) {
                stored.fields.insert(to.to_string(), value);
            }
        }

        self.save(entity, &store)
    }

    #[tracing::instrument(skip(self))]
    async fn remove_field(&self, entity: &str, field: &str) -> StorageResult<()> {
        let lock = self.entity_lock(entity);
        let _guard = lock.lock().unwrap();

        let mut store = self.load(entity)?;

        store.fields.retain(|f| f.name != field);
        for stored in &mut store.records {
            stored.fields.remove(field);
        }

        self.save(entity, &store)
    }

    #[tracing::instrument(skip(self))]
    async fn change_field_type(
        &self,
        entity: &str,
        field: &str,
        target: FieldType,
    ) -> StorageResult<Vec<CoercionFailure>> {
        let lock = self.entity_lock(entity);
        let _guard = lock.lock().unwrap();

        let mut store = self.load(entity)?;

        let position = store
            .fields
            .iter()
            .position(|f| f.name == field)
            .ok_or_else(|| {
                StorageError::validation(format!("no field '{field}' in entity '{entity}'"))
            })?;

        let mut failures = Vec::new();
        for stored in &mut store.records {
            let current = stored.fields.get(field).cloned().unwrap_or(Value::Null);
            match current.coerce(target) {
                Some(coerced) => {
                    stored.fields.insert(field.to_string(), coerced);
                }
                None => {
                    let record_id: RecordId = stored.record_id.parse().map_err(|_| {
                        StorageError::checksum_mismatch(entity, stored.record_id.clone())
                    })?;
                    failures.push(CoercionFailure {
                        record_id,
                        field: field.to_string(),
                        value: current,
                        target,
                    });
                }
            }
        }

        let spec = &mut store.fields[position];
        spec.field_type = target;
        spec.default = spec.default.coerce(target).unwrap_or(Value::Null);

        self.save(entity, &store)?;

        Ok(failures)
    }

    async fn count(&self, entity: &str) -> StorageResult<usize> {
        Ok(self.load(entity)?.records.len())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::FlatFile
    }
}

// =============================================================================
// Tests
// =============================================================================
