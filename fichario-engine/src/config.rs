//! Engine Configuration
//!
//! TigerStyle: Sensible defaults, builder pattern, explicit over implicit.
//!
//! An [`EngineConfig`] is the engine's entire view of the outside world:
//! which entities exist and with what shape, which backend stores each one,
//! which relationship names carry which cardinality, and how long a storage
//! call may run. The engine never reads ambient global state.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};

use fichario_core::dst::SimClock;
use fichario_core::{Cardinality, EntitySchema, FieldRename};

use crate::constants::{
    DATA_DIR_DEFAULT, OPERATION_TIMEOUT_MS_DEFAULT, OPERATION_TIMEOUT_MS_MAX,
    RESERVED_STORE_NAMES,
};
use crate::storage::BackendKind;

// =============================================================================
// EngineClock
// =============================================================================

/// Where the engine reads time from.
///
/// Production engines stamp ledger rows and backup snapshots with the wall
/// clock. Simulation engines share one [`SimClock`], so every persisted
/// timestamp replays identically under a fixed seed.
#[derive(Debug, Clone, Default)]
pub struct EngineClock {
    sim: Option<SimClock>,
}

impl EngineClock {
    /// Wall-clock time.
    #[must_use]
    pub fn wall() -> Self {
        Self { sim: None }
    }

    /// Simulated time driven by `clock`.
    #[must_use]
    pub fn sim(clock: SimClock) -> Self {
        Self { sim: Some(clock) }
    }

    /// Milliseconds since the Unix epoch.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        match &self.sim {
            Some(clock) => clock.now_ms(),
            None => u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0),
        }
    }

    /// RFC 3339 with millisecond precision, the format persisted rows carry.
    #[must_use]
    pub fn now_rfc3339(&self) -> String {
        match &self.sim {
            Some(clock) => clock.now_rfc3339(),
            None => Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// The simulated clock driving this engine, when there is one. Tests
    /// advance it; wall-clock engines return `None`.
    #[must_use]
    pub fn sim_handle(&self) -> Option<&SimClock> {
        self.sim.as_ref()
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Engine configuration: declared entities, backend routing, relationship
/// cardinalities, and operational limits.
///
/// TigerStyle:
/// - Sensible defaults via Default impl
/// - Builder pattern for customization
/// - All fields public for transparency
///
/// # Example
///
/// ```rust
/// use fichario_core::{Cardinality, EntitySchema, FieldSpec, FieldType};
/// use fichario_engine::config::EngineConfig;
/// use fichario_engine::storage::BackendKind;
///
/// let config = EngineConfig::default()
///     .with_entity(
///         EntitySchema::new("cliente").with_field(FieldSpec::new("nome", FieldType::Text)),
///     )
///     .with_backend_override("cliente", BackendKind::Sqlite)
///     .with_relationship("fez_pedido", Cardinality::OneToMany);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding flat-file stores, the SQLite database, and backups.
    ///
    /// Default: `./fichario_data`
    pub data_dir: PathBuf,

    /// Backend kind for entities without an override.
    ///
    /// Default: flat-file
    pub default_backend: BackendKind,

    /// Upper bound on any single storage call, in milliseconds. A call that
    /// exceeds it surfaces `Timeout`; its effect on storage is unknown and
    /// the caller retries an idempotent operation.
    ///
    /// Default: 5 seconds
    pub operation_timeout_ms: u64,

    /// Declared entity shapes, checked for drift at first touch.
    pub entities: Vec<EntitySchema>,

    /// Entity-to-backend routing overriding `default_backend`.
    pub backend_overrides: HashMap<String, BackendKind>,

    /// Cardinality per relationship name. Undeclared names are `N:N`.
    pub relationships: HashMap<String, Cardinality>,

    /// Rename directives per entity, consumed by drift checks.
    pub renames: HashMap<String, Vec<FieldRename>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DATA_DIR_DEFAULT),
            default_backend: BackendKind::FlatFile,
            operation_timeout_ms: OPERATION_TIMEOUT_MS_DEFAULT,
            entities: Vec::new(),
            backend_overrides: HashMap::new(),
            relationships: HashMap::new(),
            renames: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Set the backend kind used by entities without an override.
    #[must_use]
    pub fn with_default_backend(mut self, kind: BackendKind) -> Self {
        self.default_backend = kind;
        self
    }

    /// Set the per-call timeout in milliseconds.
    ///
    /// # Panics
    /// Panics when the timeout is zero or beyond the supported maximum.
    #[must_use]
    pub fn with_operation_timeout_ms(mut self, timeout_ms: u64) -> Self {
        // Preconditions
        assert!(timeout_ms > 0, "timeout must be positive");
        assert!(
            timeout_ms <= OPERATION_TIMEOUT_MS_MAX,
            "timeout exceeds {OPERATION_TIMEOUT_MS_MAX}ms"
        );

        self.operation_timeout_ms = timeout_ms;
        self
    }

    /// Declare an entity.
    ///
    /// # Panics
    /// Panics when the entity name collides with an engine-owned store or
    /// an already-declared entity.
    #[must_use]
    pub fn with_entity(mut self, schema: EntitySchema) -> Self {
        // Preconditions
        assert!(
            !RESERVED_STORE_NAMES.contains(&schema.entity()),
            "'{}' is an engine-owned store name",
            schema.entity()
        );
        assert!(
            !self.entities.iter().any(|e| e.entity() == schema.entity()),
            "entity '{}' declared twice",
            schema.entity()
        );

        self.entities.push(schema);
        self
    }

    /// Route one entity to a specific backend kind.
    #[must_use]
    pub fn with_backend_override(mut self, entity: impl Into<String>, kind: BackendKind) -> Self {
        self.backend_overrides.insert(entity.into(), kind);
        self
    }

    /// Declare a relationship name's cardinality.
    #[must_use]
    pub fn with_relationship(
        mut self,
        name: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        self.relationships.insert(name.into(), cardinality);
        self
    }

    /// Add a rename directive for one entity's next drift check.
    #[must_use]
    pub fn with_rename(mut self, entity: impl Into<String>, rename: FieldRename) -> Self {
        self.renames.entry(entity.into()).or_default().push(rename);
        self
    }

    /// The backend kind storing `entity`.
    #[must_use]
    pub fn backend_for(&self, entity: &str) -> BackendKind {
        self.backend_overrides
            .get(entity)
            .copied()
            .unwrap_or(self.default_backend)
    }

    /// The declared shape of `entity`, if declared.
    #[must_use]
    pub fn schema_for(&self, entity: &str) -> Option<&EntitySchema> {
        self.entities.iter().find(|e| e.entity() == entity)
    }

    /// The cardinality of a relationship name. Undeclared names are `N:N`.
    #[must_use]
    pub fn cardinality_of(&self, name: &str) -> Cardinality {
        self.relationships
            .get(name)
            .copied()
            .unwrap_or(Cardinality::ManyToMany)
    }

    /// Rename directives declared for `entity`.
    #[must_use]
    pub fn renames_for(&self, entity: &str) -> &[FieldRename] {
        self.renames.get(entity).map_or(&[], Vec::as_slice)
    }
}

// =============================================================================
// Tests
// =============================================================================
