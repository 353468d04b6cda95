//! Migrator - Drift Detection and Reconciliation
//!
//! TigerStyle: Plan first, destroy only behind a backup, report everything.
//!
//! A drift check compares an entity's declared shape against what its store
//! physically holds and produces an ordered plan:
//!
//! ```text
//! declared vs persisted        plan step          backup?
//! ───────────────────────────  ─────────────────  ───────
//! rename directive applies     RenameField        yes
//! field only in declaration    AddField           no
//! field only in store          RemoveField        yes
//! same field, new type         ChangeFieldType    yes
//! ```
//!
//! Renames apply first so additions and removals diff against final names.
//! The plan applies best-effort in order: a failed step leaves earlier
//! steps in place and the schema registry untouched; every step is
//! idempotent at the backend, so rerunning the check resumes cleanly.
//! Records whose values refuse a type change are reported per record and
//! keep their original values; the migration still counts as applied.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use fichario_core::{EntitySchema, FieldRename, FieldSpec, FieldType};

use crate::config::EngineClock;
use crate::storage::{CoercionFailure, StorageBackend, StorageError};

use super::backup::{BackupError, BackupReceipt, BackupSink, BackupSnapshot};
use super::registry::SchemaRegistry;

// =============================================================================
// Errors
// =============================================================================

/// Errors from a drift check.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// The pre-migration backup failed. Nothing destructive was applied.
    #[error("backup failed for entity '{entity}': {source}")]
    BackupFailed {
        /// Entity whose backup failed.
        entity: String,
        /// The sink's failure.
        #[source]
        source: BackupError,
    },

    /// A plan step failed. Earlier steps remain applied; the schema
    /// registry was not updated.
    #[error("migration step '{step}' failed for entity '{entity}': {source}")]
    StepFailed {
        /// Entity being migrated.
        entity: String,
        /// The step that failed.
        step: String,
        /// The backend's failure.
        #[source]
        source: StorageError,
    },

    /// Reading or recording schema state failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

// =============================================================================
// Drift Plan
// =============================================================================

/// One planned schema change.
#[derive(Debug, Clone, PartialEq)]
pub enum DriftStep {
    /// The declaration carries a field the store does not.
    AddField {
        /// The field to add, default included.
        spec: FieldSpec,
    },
    /// An explicit directive renames a persisted field.
    RenameField {
        /// Name in the store.
        from: String,
        /// Name in the declaration.
        to: String,
    },
    /// The store carries a field the declaration no longer does.
    RemoveField {
        /// The field to drop.
        field: String,
    },
    /// Both carry the field, with different declared types.
    ChangeFieldType {
        /// The field to retype.
        field: String,
        /// Type in the store.
        from: FieldType,
        /// Type in the declaration.
        to: FieldType,
    },
}

impl DriftStep {
    /// Whether applying this step can lose data, requiring a prior backup.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        !matches!(self, Self::AddField { .. })
    }
}

impl fmt::Display for DriftStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddField { spec } => write!(f, "add_field({})", spec.name),
            Self::RenameField { from, to } => write!(f, "rename_field({from} -> {to})"),
            Self::RemoveField { field } => write!(f, "remove_field({field})"),
            Self::ChangeFieldType { field, from, to } => {
                write!(f, "change_field_type({field}: {from} -> {to})")
            }
        }
    }
}

/// The outcome of one entity's drift check.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    /// Entity checked.
    pub entity: String,
    /// Whether the store was created fresh (no drift possible).
    pub created_store: bool,
    /// The plan, in apply order. Empty means no drift.
    pub steps: Vec<DriftStep>,
    /// Steps actually applied.
    pub applied: Vec<DriftStep>,
    /// Records whose values refused a type change and kept their originals.
    pub coercion_failures: Vec<CoercionFailure>,
    /// Receipt for the pre-migration backup, when one was needed.
    pub backup: Option<BackupReceipt>,
    /// Check start, milliseconds since epoch.
    pub started_at_ms: u64,
    /// Check finish, milliseconds since epoch.
    pub finished_at_ms: u64,
}

impl MigrationReport {
    /// Whether the check found anything to do.
    #[must_use]
    pub fn had_drift(&self) -> bool {
        !self.steps.is_empty()
    }
}

// =============================================================================
// Migrator
// =============================================================================

/// Reconciles entity stores with their declared shapes.
pub struct Migrator {
    backend: Arc<dyn StorageBackend>,
    registry: Arc<SchemaRegistry>,
    backup: Arc<dyn BackupSink>,
    clock: EngineClock,
}

impl Migrator {
    /// Create a migrator over one backend.
    ///
    /// The registry may live on a different backend than the stores it
    /// describes; both are reached through their own handles.
    #[must_use]
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        registry: Arc<SchemaRegistry>,
        backup: Arc<dyn BackupSink>,
        clock: EngineClock,
    ) -> Self {
        Self {
            backend,
            registry,
            backup,
            clock,
        }
    }

    /// Compute the drift plan between a persisted shape and a declared one.
    ///
    /// A rename directive applies only when the store still carries the old
    /// name, does not carry the new one, and the declaration contains the
    /// new one; otherwise the directive is inert and the ordinary
    /// add/remove diff covers the field.
    #[must_use]
    pub fn plan(
        persisted: &[FieldSpec],
        declared: &EntitySchema,
        renames: &[FieldRename],
    ) -> Vec<DriftStep> {
        let mut steps = Vec::new();
        let mut effective: Vec<FieldSpec> = persisted.to_vec();

        for rename in renames {
            let has_from = effective.iter().any(|f| f.name == rename.from);
            let has_to = effective.iter().any(|f| f.name == rename.to);
            if has_from && !has_to && declared.contains(&rename.to) {
                steps.push(DriftStep::RenameField {
                    from: rename.from.clone(),
                    to: rename.to.clone(),
                });
                if let Some(field) = effective.iter_mut().find(|f| f.name == rename.from) {
                    field.name = rename.to.clone();
                }
            }
        }

        for spec in declared.fields() {
            if !effective.iter().any(|f| f.name == spec.name) {
                steps.push(DriftStep::AddField { spec: spec.clone() });
            }
        }

        for field in &effective {
            if !declared.contains(&field.name) {
                steps.push(DriftStep::RemoveField {
                    field: field.name.clone(),
                });
            }
        }

        for field in &effective {
            if let Some(declared_spec) = declared.field(&field.name) {
                if declared_spec.field_type != field.field_type {
                    steps.push(DriftStep::ChangeFieldType {
                        field: field.name.clone(),
                        from: field.field_type,
                        to: declared_spec.field_type,
                    });
                }
            }
        }

        steps
    }

    /// Reconcile one entity's store with its declared shape.
    ///
    /// Creates the store when absent. When the plan contains a destructive
    /// step, the whole store is snapshotted first and a backup failure
    /// aborts the plan untouched. The accepted shape is recorded in the
    /// registry only when every step applied.
    #[tracing::instrument(skip(self, declared, renames), fields(entity = declared.entity()))]
    pub async fn ensure_entity(
        &self,
        declared: &EntitySchema,
        renames: &[FieldRename],
    ) -> Result<MigrationReport, MigrationError> {
        let entity = declared.entity();
        let started_at_ms = self.clock.now_ms();

        if !self.backend.store_exists(entity).await? {
            self.backend.create_store(declared).await?;
            self.registry
                .record_shape(entity, declared.fields(), &self.clock.now_rfc3339())
                .await?;
            tracing::info!(entity, "store created");

            return Ok(MigrationReport {
                entity: entity.to_string(),
                created_store: true,
                steps: Vec::new(),
                applied: Vec::new(),
                coercion_failures: Vec::new(),
                backup: None,
                started_at_ms,
                finished_at_ms: self.clock.now_ms(),
            });
        }

        // Plan against the physical shape: that is what the steps mutate.
        // The registry is the audit trail of accepted shapes, not the input.
        let persisted = self.backend.store_fields(entity).await?;
        let steps = Self::plan(&persisted, declared, renames);

        if steps.is_empty() {
            // First sight of a pre-existing store still gets a history row.
            if self.registry.last_known(entity).await?.is_none() {
                self.registry
                    .record_shape(entity, &persisted, &self.clock.now_rfc3339())
                    .await?;
            }

            return Ok(MigrationReport {
                entity: entity.to_string(),
                created_store: false,
                steps,
                applied: Vec::new(),
                coercion_failures: Vec::new(),
                backup: None,
                started_at_ms,
                finished_at_ms: self.clock.now_ms(),
            });
        }

        let backup = if steps.iter().any(DriftStep::is_destructive) {
            Some(self.backup_store(entity, &persisted).await?)
        } else {
            None
        };

        let mut applied = Vec::with_capacity(steps.len());
        let mut coercion_failures = Vec::new();
        for step in &steps {
            let result = match step {
                DriftStep::AddField { spec } => self.backend.add_field(entity, spec).await,
                DriftStep::RenameField { from, to } => {
                    self.backend.rename_field(entity, from, to).await
                }
                DriftStep::RemoveField { field } => {
                    self.backend.remove_field(entity, field).await
                }
                DriftStep::ChangeFieldType { field, to, .. } => {
                    match self.backend.change_field_type(entity, field, *to).await {
                        Ok(failures) => {
                            coercion_failures.extend(failures);
                            Ok(())
                        }
                        Err(e) => Err(e),
                    }
                }
            };

            match result {
                Ok(()) => {
                    tracing::info!(entity, step = %step, "migration step applied");
                    applied.push(step.clone());
                }
                Err(source) => {
                    tracing::error!(entity, step = %step, error = %source, "migration step failed");
                    return Err(MigrationError::StepFailed {
                        entity: entity.to_string(),
                        step: step.to_string(),
                        source,
                    });
                }
            }
        }

        if !coercion_failures.is_empty() {
            tracing::warn!(
                entity,
                failures = coercion_failures.len(),
                "records kept original values through a type change"
            );
        }

        // Every step applied: the declared shape is now the accepted shape.
        self.registry
            .record_shape(entity, declared.fields(), &self.clock.now_rfc3339())
            .await?;

        Ok(MigrationReport {
            entity: entity.to_string(),
            created_store: false,
            steps,
            applied,
            coercion_failures,
            backup,
            started_at_ms,
            finished_at_ms: self.clock.now_ms(),
        })
    }

    /// Snapshot a store ahead of its first destructive step.
    async fn backup_store(
        &self,
        entity: &str,
        fields: &[FieldSpec],
    ) -> Result<BackupReceipt, MigrationError> {
        let records = self.backend.read_all(entity).await?;

        let snapshot = BackupSnapshot {
            entity: entity.to_string(),
            taken_at: self.clock.now_rfc3339(),
            taken_at_ms: self.clock.now_ms(),
            fields: fields.to_vec(),
            records,
        };

        self.backup
            .write_snapshot(&snapshot)
            .await
            .map_err(|source| MigrationError::BackupFailed {
                entity: entity.to_string(),
                source,
            })
    }
}

// =============================================================================
// Tests
// =============================================================================
