//! Schema Drift Detection and Migration
//!
//! Declared shapes change between releases; persisted stores lag behind.
//! This module reconciles the two:
//!
//! - [`Migrator`] computes and applies the drift plan per entity
//! - [`SchemaRegistry`] records every accepted shape in `schema_history`
//! - [`BackupSink`] copies a store aside before any destructive step
//!
//! Additions are safe and need no backup. Removals, renames, and type
//! changes snapshot the store first and refuse to run when the snapshot
//! cannot be written.

pub mod backup;
pub mod migrator;
pub mod registry;

pub use backup::{BackupError, BackupReceipt, BackupSink, BackupSnapshot, FsBackupSink, SimBackupSink};
pub use migrator::{DriftStep, MigrationError, MigrationReport, Migrator};
pub use registry::{SchemaRegistry, SchemaSnapshot};
