//! Fichário Engine - Persistence and Relationships
//!
//! The storage half of a form-driven record app: interchangeable backends
//! behind one contract, schema drift reconciliation with backups, and
//! append-only ledgers for tags and relationships.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │                   Repository                      │
//! │   entity → backend dispatch, memoized init        │
//! ├──────────────┬──────────────┬─────────────────────┤
//! │  TagLedger   │ RelLedger    │  Migrator           │
//! │  tag_events  │ rel_edges    │  drift + backups    │
//! ├──────────────┴──────────────┴─────────────────────┤
//! │            StorageBackend (one contract)          │
//! │     flatfile JSON │ SQLite │ sim (DST faults)     │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! Every store keeps records behind checksummed identifiers
//! ([`fichario_core::RecordId`]); ledgers derive current state by folding
//! their event logs, never by mutating rows.
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use fichario_core::{EntitySchema, FieldMap, FieldSpec, FieldType, Value};
//! use fichario_engine::config::EngineConfig;
//! use fichario_engine::repository::Repository;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::new().with_entity(
//!     EntitySchema::new("cliente")
//!         .with_field(FieldSpec::new("nome", FieldType::Text)),
//! );
//! let repo = Arc::new(Repository::sim(config, 42));
//!
//! let mut fields = FieldMap::new();
//! fields.insert("nome".to_string(), Value::from("Acme"));
//! let id = repo.insert("cliente", fields).await?;
//!
//! repo.tags().apply_tag("cliente", &id, "ativo", "ana").await?;
//! assert!(repo
//!     .tags()
//!     .current_tags("cliente", &id)
//!     .await?
//!     .contains("ativo"));
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module       | Holds                                              |
//! |--------------|----------------------------------------------------|
//! | `config`     | entity declarations, backend routing, deadlines    |
//! | `storage`    | the backend contract and its three adapters        |
//! | `migrate`    | drift plans, schema history, pre-destruction backup|
//! | `repository` | dispatch, memoized init, per-entity serialization  |
//! | `ledger`     | append-only tag and relationship event logs        |
//! | `telemetry`  | tracing subscriber setup                           |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod ledger;
pub mod migrate;
pub mod repository;
pub mod storage;
pub mod telemetry;

// Re-export common types
pub use config::{EngineClock, EngineConfig};
pub use constants::*;
pub use ledger::{
    Edge, RelationError, RelationResult, RelationshipLedger, TagError, TagEvent, TagLedger,
    TagResult,
};
pub use migrate::{
    BackupError, BackupReceipt, BackupSink, BackupSnapshot, DriftStep, FsBackupSink,
    MigrationError, MigrationReport, Migrator, SchemaRegistry, SchemaSnapshot, SimBackupSink,
};
pub use repository::{EngineError, EngineResult, Repository};
pub use storage::{
    BackendKind, CoercionFailure, FlatFileBackend, SimBackend, SqliteBackend, StorageBackend,
    StorageError, StorageResult,
};
pub use telemetry::TelemetryError;
