//! Repository - Configuration-Driven Dispatch
//!
//! The single entry point callers hold. Routes every operation to the
//! backend its entity is configured for, and guarantees the entity's store
//! is ready before the first call touches it:
//!
//! ```text
//!                         ┌──────────────────┐
//!        insert("pedido") │    Repository    │
//!       ─────────────────▶│                  │
//!                         │  verified? ──no──┼──▶ Migrator::ensure_entity
//!                         │     │yes         │       (serialized per entity)
//!                         │     ▼            │
//!                         │  backend_for ────┼──▶ flatfile │ sqlite │ sim
//!                         └──────────────────┘
//! ```
//!
//! Lifecycle guarantees:
//!
//! - An entity's store and schema are verified at most once per process.
//!   The first operation pays for the drift check; later ones take a read
//!   lock on the verified set and go straight to the backend.
//! - Concurrent first touches of the same entity serialize on a per-entity
//!   mutex, so the drift check never runs twice.
//! - Engine-owned stores (tag events, relationship edges, schema history)
//!   are created once, before any entity check, on the default backend.
//! - Every storage call runs under the configured deadline. A call that
//!   outlives it returns `Timeout`; its effect on the store is unknown.
//!
//! DDL never goes through this type. Shape changes happen inside the
//! migrator during the entity check, or explicitly via [`Repository::migrate_now`].

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use fichario_core::dst::{SimClock, SimConfig};
use fichario_core::{EntitySchema, FieldMap, Record, RecordId};
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::config::{EngineClock, EngineConfig};
use crate::constants::{BACKUP_DIR_NAME, SQLITE_FILE_NAME};
use crate::ledger::{
    relationship_edges_schema, tag_events_schema, RelationshipLedger, TagLedger,
};
use crate::migrate::{
    BackupSink, FsBackupSink, MigrationError, MigrationReport, Migrator, SchemaRegistry,
    SimBackupSink,
};
use crate::storage::{
    BackendKind, FlatFileBackend, SimBackend, SqliteBackend, StorageBackend, StorageError,
    StorageResult,
};

// =============================================================================
// EngineError
// =============================================================================

/// Errors surfaced by the repository and the ledgers built on it.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The configuration declares no schema for this entity type.
    #[error("unknown entity '{entity}': not declared in the engine configuration")]
    UnknownEntity {
        /// Entity type the caller asked for.
        entity: String,
    },

    /// A storage call failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The entity's drift check failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

impl EngineError {
    /// Whether retrying the operation can succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(source) => source.is_transient(),
            Self::Migration(MigrationError::Storage(source)) => source.is_transient(),
            _ => false,
        }
    }
}

/// Convenience alias for repository results.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Repository
// =============================================================================

/// Entity-to-backend dispatch with memoized store verification.
///
/// Cheap to share: wrap in an [`Arc`] and clone the handle. All state is
/// internally synchronized.
pub struct Repository {
    config: EngineConfig,
    /// One live adapter per backend kind the config routes to.
    backends: HashMap<BackendKind, Arc<dyn StorageBackend>>,
    registry: Arc<SchemaRegistry>,
    backup: Arc<dyn BackupSink>,
    clock: EngineClock,
    /// Set once the engine-owned stores exist on the default backend.
    engine_stores: OnceCell<()>,
    /// Entities whose store and schema have been verified this process.
    verified: RwLock<HashSet<String>>,
    /// Serializes the first touch (and explicit migrations) per entity.
    entity_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Serializes ledger check-then-append sequences, so two concurrent
    /// writers cannot both observe "not active" and append twice.
    ledger_write: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("default_backend", &self.config.default_backend)
            .field("entities", &self.config.entities.len())
            .field("verified", &self.verified.read().unwrap().len())
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Open a repository over real media.
    ///
    /// Builds one adapter per backend kind the configuration references,
    /// rooted at `config.data_dir`. Backups land under
    /// `data_dir/backups/`. Timestamps come from the wall clock.
    ///
    /// # Errors
    ///
    /// Fails with `Unavailable` when the data directory or the SQLite
    /// database cannot be opened.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let mut kinds: HashSet<BackendKind> = HashSet::new();
        kinds.insert(config.default_backend);
        kinds.extend(config.backend_overrides.values().copied());

        let persistent = kinds
            .iter()
            .any(|kind| !matches!(kind, BackendKind::Memory));

        let mut backends: HashMap<BackendKind, Arc<dyn StorageBackend>> = HashMap::new();
        for kind in kinds {
            let backend: Arc<dyn StorageBackend> = match kind {
                BackendKind::Memory => Arc::new(SimBackend::default()),
                BackendKind::FlatFile => Arc::new(FlatFileBackend::new(&config.data_dir)?),
                BackendKind::Sqlite => {
                    Arc::new(SqliteBackend::new(config.data_dir.join(SQLITE_FILE_NAME))?)
                }
            };
            backends.insert(kind, backend);
        }

        let backup: Arc<dyn BackupSink> = if persistent {
            let sink = FsBackupSink::new(config.data_dir.join(BACKUP_DIR_NAME))
                .map_err(|e| StorageError::unavailable(e.to_string()))?;
            Arc::new(sink)
        } else {
            Arc::new(SimBackupSink::new())
        };

        let registry = Arc::new(SchemaRegistry::new(Arc::clone(
            &backends[&config.default_backend],
        )));

        tracing::info!(
            default_backend = %config.default_backend,
            entities = config.entities.len(),
            data_dir = %config.data_dir.display(),
            "repository opened"
        );

        Ok(Self {
            config,
            backends,
            registry,
            backup,
            clock: EngineClock::wall(),
            engine_stores: OnceCell::new(),
            verified: RwLock::new(HashSet::new()),
            entity_locks: Mutex::new(HashMap::new()),
            ledger_write: tokio::sync::Mutex::new(()),
        })
    }

    /// Deterministic all-in-memory repository for simulation tests.
    ///
    /// Every backend kind routes to one shared [`SimBackend`] seeded from
    /// `seed`; backups stay in memory; time starts at zero on a [`SimClock`]
    /// reachable through [`Repository::clock`].
    #[must_use]
    pub fn sim(config: EngineConfig, seed: u64) -> Self {
        Self::sim_with(
            config,
            SimBackend::new(&SimConfig::with_seed(seed)),
            SimClock::new(),
        )
    }

    /// Simulation repository over a prepared backend and clock.
    ///
    /// The variant fault-injection tests use: build the [`SimBackend`] with
    /// an injector, then hand it over.
    #[must_use]
    pub fn sim_with(config: EngineConfig, backend: SimBackend, clock: SimClock) -> Self {
        let shared: Arc<dyn StorageBackend> = Arc::new(backend);
        let mut backends: HashMap<BackendKind, Arc<dyn StorageBackend>> = HashMap::new();
        for kind in BackendKind::all() {
            backends.insert(*kind, Arc::clone(&shared));
        }

        Self {
            registry: Arc::new(SchemaRegistry::new(Arc::clone(&shared))),
            backup: Arc::new(SimBackupSink::new()),
            clock: EngineClock::sim(clock),
            config,
            backends,
            engine_stores: OnceCell::new(),
            verified: RwLock::new(HashSet::new()),
            entity_locks: Mutex::new(HashMap::new()),
            ledger_write: tokio::sync::Mutex::new(()),
        }
    }

    /// The configuration this repository dispatches with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The clock stamping ledger events and schema history.
    #[must_use]
    pub fn clock(&self) -> &EngineClock {
        &self.clock
    }

    /// The declared schema for `entity`, when the configuration knows it.
    #[must_use]
    pub fn schema_of(&self, entity: &str) -> Option<&EntitySchema> {
        self.config.schema_for(entity)
    }

    /// Tag ledger over this repository.
    #[must_use]
    pub fn tags(self: &Arc<Self>) -> TagLedger {
        TagLedger::new(Arc::clone(self))
    }

    /// Relationship ledger over this repository.
    #[must_use]
    pub fn relationships(self: &Arc<Self>) -> RelationshipLedger {
        RelationshipLedger::new(Arc::clone(self))
    }

    // =========================================================================
    // Record operations
    // =========================================================================

    /// Persist a new record and return its minted identifier.
    ///
    /// Missing fields take their declared defaults; unknown names and
    /// values that do not fit the declared types are rejected.
    ///
    /// # Errors
    ///
    /// `UnknownEntity` when the configuration does not declare `entity`;
    /// otherwise whatever the backend or drift check surfaces.
    #[tracing::instrument(skip(self, fields))]
    pub async fn insert(&self, entity: &str, fields: FieldMap) -> EngineResult<RecordId> {
        self.ensure_entity(entity).await?;
        let backend = self.backend_for(entity);
        self.with_deadline(format!("insert_{entity}"), backend.insert(entity, fields))
            .await
    }

    /// All records of `entity`, in insertion order.
    ///
    /// # Errors
    ///
    /// `UnknownEntity`, or a storage failure.
    #[tracing::instrument(skip(self))]
    pub async fn read_all(&self, entity: &str) -> EngineResult<Vec<Record>> {
        self.ensure_entity(entity).await?;
        let backend = self.backend_for(entity);
        self.with_deadline(format!("read_all_{entity}"), backend.read_all(entity))
            .await
    }

    /// One record by identifier.
    ///
    /// # Errors
    ///
    /// `UnknownEntity`, `NotFound` when absent, or a storage failure.
    #[tracing::instrument(skip(self))]
    pub async fn read_one(&self, entity: &str, id: &RecordId) -> EngineResult<Record> {
        self.ensure_entity(entity).await?;
        let backend = self.backend_for(entity);
        self.with_deadline(format!("read_one_{entity}"), backend.read_one(entity, id))
            .await
    }

    /// Partial update: fields absent from `changes` keep their prior value.
    ///
    /// # Errors
    ///
    /// `UnknownEntity`, `NotFound` when absent, or a storage failure.
    #[tracing::instrument(skip(self, changes))]
    pub async fn update(
        &self,
        entity: &str,
        id: &RecordId,
        changes: FieldMap,
    ) -> EngineResult<Record> {
        self.ensure_entity(entity).await?;
        let backend = self.backend_for(entity);
        self.with_deadline(
            format!("update_{entity}"),
            backend.update(entity, id, changes),
        )
        .await
    }

    /// Remove one record. Ledger rows referencing it stay untouched.
    ///
    /// # Errors
    ///
    /// `UnknownEntity`, `NotFound` when absent, or a storage failure.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, entity: &str, id: &RecordId) -> EngineResult<()> {
        self.ensure_entity(entity).await?;
        let backend = self.backend_for(entity);
        self.with_deadline(format!("delete_{entity}"), backend.delete(entity, id))
            .await
    }

    /// How many records `entity` holds.
    ///
    /// # Errors
    ///
    /// `UnknownEntity`, or a storage failure.
    #[tracing::instrument(skip(self))]
    pub async fn count(&self, entity: &str) -> EngineResult<usize> {
        self.ensure_entity(entity).await?;
        let backend = self.backend_for(entity);
        self.with_deadline(format!("count_{entity}"), backend.count(entity))
            .await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Run the drift check for `entity` right now and return the report.
    ///
    /// The lazy path runs the same check on first touch but discards the
    /// report; callers who need the plan, the coercion failures, or the
    /// backup receipt ask explicitly. Always hits the backend, even for an
    /// already-verified entity.
    ///
    /// # Errors
    ///
    /// `UnknownEntity`, `BackupFailed`, `StepFailed`, or a storage failure.
    #[tracing::instrument(skip(self))]
    pub async fn migrate_now(&self, entity: &str) -> EngineResult<MigrationReport> {
        self.ensure_engine_stores().await?;
        let schema = self
            .config
            .schema_for(entity)
            .cloned()
            .ok_or_else(|| EngineError::UnknownEntity {
                entity: entity.to_string(),
            })?;

        let lock = self.entity_lock(entity);
        let _guard = lock.lock().await;

        let report = self
            .migrator_for(entity)
            .ensure_entity(&schema, self.config.renames_for(entity))
            .await?;
        self.verified.write().unwrap().insert(entity.to_string());
        Ok(report)
    }

    /// Verify `entity`'s store and schema, at most once per process.
    ///
    /// Fast path is a read lock on the verified set. The slow path
    /// serializes on the per-entity mutex, re-checks, and runs the
    /// migrator; a failure leaves the entity unverified so the next call
    /// retries.
    async fn ensure_entity(&self, entity: &str) -> EngineResult<()> {
        if self.verified.read().unwrap().contains(entity) {
            return Ok(());
        }

        self.ensure_engine_stores().await?;
        let schema = self
            .config
            .schema_for(entity)
            .cloned()
            .ok_or_else(|| EngineError::UnknownEntity {
                entity: entity.to_string(),
            })?;

        let lock = self.entity_lock(entity);
        let _guard = lock.lock().await;

        // Another task may have finished the check while we waited.
        if self.verified.read().unwrap().contains(entity) {
            return Ok(());
        }

        let report = self
            .migrator_for(entity)
            .ensure_entity(&schema, self.config.renames_for(entity))
            .await?;
        if report.had_drift() {
            tracing::info!(
                entity,
                steps = report.applied.len(),
                coercion_failures = report.coercion_failures.len(),
                "schema drift reconciled on first touch"
            );
        }

        self.verified.write().unwrap().insert(entity.to_string());
        Ok(())
    }

    /// Create the engine-owned stores on the default backend, once.
    pub(crate) async fn ensure_engine_stores(&self) -> EngineResult<()> {
        self.engine_stores
            .get_or_try_init(|| async {
                self.registry.ensure_store().await?;
                let backend = self.engine_backend();
                backend.create_store(&tag_events_schema()).await?;
                backend.create_store(&relationship_edges_schema()).await?;
                tracing::debug!("engine stores ready");
                Ok::<(), EngineError>(())
            })
            .await?;
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn backend_for(&self, entity: &str) -> Arc<dyn StorageBackend> {
        let kind = self.config.backend_for(entity);
        // The constructors register an adapter for every kind the
        // configuration routes to, so the lookup cannot miss.
        Arc::clone(&self.backends[&kind])
    }

    /// The backend holding the engine-owned stores.
    pub(crate) fn engine_backend(&self) -> Arc<dyn StorageBackend> {
        Arc::clone(&self.backends[&self.config.default_backend])
    }

    /// Lock held around a ledger's check-then-append sequence.
    pub(crate) fn ledger_write_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.ledger_write
    }

    fn migrator_for(&self, entity: &str) -> Migrator {
        Migrator::new(
            self.backend_for(entity),
            Arc::clone(&self.registry),
            Arc::clone(&self.backup),
            self.clock.clone(),
        )
    }

    fn entity_lock(&self, entity: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.entity_locks.lock().unwrap();
        Arc::clone(locks.entry(entity.to_string()).or_default())
    }

    /// Run a storage future under the configured deadline.
    ///
    /// A future that outlives it is dropped and the call reports
    /// `Timeout`. Whether the store saw the effect is unknown; transient
    /// errors are safe to retry because inserts mint fresh identifiers and
    /// the other operations are idempotent.
    pub(crate) async fn with_deadline<T, F>(&self, operation: String, future: F) -> EngineResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        let timeout_ms = self.config.operation_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), future).await {
            Ok(result) => Ok(result?),
            Err(_elapsed) => {
                tracing::warn!(operation, timeout_ms, "storage call hit the deadline");
                Err(EngineError::Storage(StorageError::timeout(
                    operation, timeout_ms,
                )))
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
