//! Relationship Ledger - Universal Edges
//!
//! Records relate to records through named, directed edges in the shared
//! `relationship_edges` store. Like tags, edges are an append-only ledger:
//! linking appends an open row, unlinking appends a closing copy with
//! `removed_at`/`removed_by` filled in, and the active graph is derived
//! from the latest row per edge.
//!
//! Cardinality is declared per relationship name in the engine
//! configuration and enforced at link time:
//!
//! ```text
//!  declared  source side                     target side
//!  --------  ------------------------------  ------------------------------
//!  1:1       one active target per source    one active source per target
//!  1:N       one active target per source    free
//!  N:1       one active target per source    free
//!  N:N       free                            free (undeclared names too)
//! ```
//!
//! Neither end is checked for existence; a deleted record leaves dangling
//! edges behind, visible in history and removable like any other.

use std::collections::HashMap;
use std::sync::Arc;

use fichario_core::{
    Cardinality, FieldMap, Record, RecordId, Value, RELATIONSHIP_NAME_BYTES_MAX,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::RELATIONSHIP_EDGES_STORE;
use crate::repository::{EngineError, Repository};
use crate::storage::StorageError;

use fichario_core::{EntitySchema, FieldSpec, FieldType};

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced by relationship operations.
#[derive(Error, Debug)]
pub enum RelationError {
    /// The declared cardinality forbids this edge while another is active.
    #[error(
        "cardinality {cardinality} forbids linking {source_type}/{source_id} via '{name}': \
         an active edge already exists"
    )]
    CardinalityViolation {
        /// The relationship name.
        name: String,
        /// Its declared cardinality.
        cardinality: Cardinality,
        /// Source end of the rejected link.
        source_type: String,
        /// Source record of the rejected link.
        source_id: String,
    },

    /// No active edge matches the unlink request.
    #[error("no active '{name}' edge from {source_type}/{source_id} to {target_id}")]
    NotActive {
        /// The relationship name.
        name: String,
        /// Source end that was searched.
        source_type: String,
        /// Source record that was searched.
        source_id: String,
        /// Target record that was searched for.
        target_id: String,
    },

    /// The underlying engine call failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Convenience alias for relationship results.
pub type RelationResult<T> = Result<T, RelationError>;

// =============================================================================
// Edge
// =============================================================================

/// One row of the relationship ledger.
///
/// An open edge has `removed_at`/`removed_by` unset. A closing row copies
/// the open row's creation columns and fills both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Ledger row identifier.
    pub edge_id: RecordId,
    /// Entity type of the source record.
    pub source_type: String,
    /// The source record.
    pub source_id: RecordId,
    /// The relationship name.
    pub relationship_name: String,
    /// Entity type of the target record.
    pub target_type: String,
    /// The target record.
    pub target_id: RecordId,
    /// When the edge was created, RFC 3339.
    pub created_at: String,
    /// Who created it.
    pub created_by: String,
    /// When the edge was removed, RFC 3339. Unset while active.
    pub removed_at: Option<String>,
    /// Who removed it. Unset while active.
    pub removed_by: Option<String>,
}

impl Edge {
    /// Whether this edge is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.removed_at.is_none()
    }

    /// The five columns identifying one logical edge.
    fn key(&self) -> (String, String, String, String, String) {
        (
            self.source_type.clone(),
            self.source_id.to_string(),
            self.relationship_name.clone(),
            self.target_type.clone(),
            self.target_id.to_string(),
        )
    }
}

// =============================================================================
// RelationshipLedger
// =============================================================================

/// Relationship operations over a shared repository.
#[derive(Debug)]
pub struct RelationshipLedger {
    repo: Arc<Repository>,
}

impl RelationshipLedger {
    /// Ledger over `repo`'s engine stores.
    #[must_use]
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Create a directed edge. Idempotent: re-linking an identical active
    /// edge returns the existing open row without appending.
    ///
    /// Existence of either record is the caller's responsibility; only the
    /// declared cardinality is enforced here.
    ///
    /// # Errors
    ///
    /// `CardinalityViolation` when an active edge already occupies an
    /// exclusive side, or a storage failure.
    ///
    /// # Panics
    ///
    /// When `source_type`, `target_type` or `actor` is empty, or
    /// `relationship_name` is empty or oversized.
    #[tracing::instrument(skip(self))]
    pub async fn link(
        &self,
        source_type: &str,
        source_id: &RecordId,
        relationship_name: &str,
        target_type: &str,
        target_id: &RecordId,
        actor: &str,
    ) -> RelationResult<Edge> {
        assert!(!source_type.is_empty(), "source_type must not be empty");
        assert!(!target_type.is_empty(), "target_type must not be empty");
        assert!(!actor.is_empty(), "actor must not be empty");
        assert!(
            !relationship_name.is_empty()
                && relationship_name.len() <= RELATIONSHIP_NAME_BYTES_MAX,
            "relationship_name must be 1..={RELATIONSHIP_NAME_BYTES_MAX} bytes"
        );

        let cardinality = self.repo.config().cardinality_of(relationship_name);

        let _guard = self.repo.ledger_write_lock().lock().await;
        let active = self.active_edges().await?;

        // The identical edge being active already satisfies every rule.
        if let Some(existing) = active.iter().find(|edge| {
            edge.source_type == source_type
                && &edge.source_id == source_id
                && edge.relationship_name == relationship_name
                && edge.target_type == target_type
                && &edge.target_id == target_id
        }) {
            tracing::debug!(
                relationship_name,
                source_id = %source_id,
                target_id = %target_id,
                "edge already active"
            );
            return Ok(existing.clone());
        }

        if cardinality.limits_source() {
            let occupied = active.iter().any(|edge| {
                edge.source_type == source_type
                    && &edge.source_id == source_id
                    && edge.relationship_name == relationship_name
            });
            if occupied {
                return Err(RelationError::CardinalityViolation {
                    name: relationship_name.to_string(),
                    cardinality,
                    source_type: source_type.to_string(),
                    source_id: source_id.to_string(),
                });
            }
        }

        if cardinality.limits_target() {
            let occupied = active.iter().any(|edge| {
                edge.relationship_name == relationship_name
                    && edge.target_type == target_type
                    && &edge.target_id == target_id
            });
            if occupied {
                return Err(RelationError::CardinalityViolation {
                    name: relationship_name.to_string(),
                    cardinality,
                    source_type: source_type.to_string(),
                    source_id: source_id.to_string(),
                });
            }
        }

        let mut fields = FieldMap::new();
        fields.insert("source_type".to_string(), Value::from(source_type));
        fields.insert("source_id".to_string(), Value::from(source_id.to_string()));
        fields.insert(
            "relationship_name".to_string(),
            Value::from(relationship_name),
        );
        fields.insert("target_type".to_string(), Value::from(target_type));
        fields.insert("target_id".to_string(), Value::from(target_id.to_string()));
        fields.insert(
            "created_at".to_string(),
            Value::from(self.repo.clock().now_rfc3339()),
        );
        fields.insert("created_by".to_string(), Value::from(actor));

        let edge = self.append(fields).await?;
        tracing::info!(
            relationship_name,
            source_type,
            source_id = %source_id,
            target_type,
            target_id = %target_id,
            actor,
            "edge created"
        );
        Ok(edge)
    }

    /// Remove an active edge by appending a closing row.
    ///
    /// # Errors
    ///
    /// `NotActive` when no active edge matches, or a storage failure.
    ///
    /// # Panics
    ///
    /// When `source_type` or `actor` is empty.
    #[tracing::instrument(skip(self))]
    pub async fn unlink(
        &self,
        source_type: &str,
        source_id: &RecordId,
        relationship_name: &str,
        target_id: &RecordId,
        actor: &str,
    ) -> RelationResult<Edge> {
        assert!(!source_type.is_empty(), "source_type must not be empty");
        assert!(!actor.is_empty(), "actor must not be empty");

        let _guard = self.repo.ledger_write_lock().lock().await;
        let active = self.active_edges().await?;
        let open = active
            .into_iter()
            .filter(|edge| {
                edge.source_type == source_type
                    && &edge.source_id == source_id
                    && edge.relationship_name == relationship_name
                    && &edge.target_id == target_id
            })
            .last()
            .ok_or_else(|| RelationError::NotActive {
                name: relationship_name.to_string(),
                source_type: source_type.to_string(),
                source_id: source_id.to_string(),
                target_id: target_id.to_string(),
            })?;

        let mut fields = FieldMap::new();
        fields.insert("source_type".to_string(), Value::from(open.source_type));
        fields.insert(
            "source_id".to_string(),
            Value::from(open.source_id.to_string()),
        );
        fields.insert(
            "relationship_name".to_string(),
            Value::from(open.relationship_name),
        );
        fields.insert("target_type".to_string(), Value::from(open.target_type));
        fields.insert(
            "target_id".to_string(),
            Value::from(open.target_id.to_string()),
        );
        fields.insert("created_at".to_string(), Value::from(open.created_at));
        fields.insert("created_by".to_string(), Value::from(open.created_by));
        fields.insert(
            "removed_at".to_string(),
            Value::from(self.repo.clock().now_rfc3339()),
        );
        fields.insert("removed_by".to_string(), Value::from(actor));

        let edge = self.append(fields).await?;
        tracing::info!(
            relationship_name,
            source_type,
            source_id = %source_id,
            target_id = %target_id,
            actor,
            "edge removed"
        );
        Ok(edge)
    }

    /// Active targets of a source via `relationship_name`, in link order.
    ///
    /// # Errors
    ///
    /// A storage failure reading the ledger.
    pub async fn targets_of(
        &self,
        source_type: &str,
        source_id: &RecordId,
        relationship_name: &str,
    ) -> RelationResult<Vec<(String, RecordId)>> {
        Ok(self
            .active_edges()
            .await?
            .into_iter()
            .filter(|edge| {
                edge.source_type == source_type
                    && &edge.source_id == source_id
                    && edge.relationship_name == relationship_name
            })
            .map(|edge| (edge.target_type, edge.target_id))
            .collect())
    }

    /// Active sources pointing at a target, optionally filtered by
    /// relationship name, in link order.
    ///
    /// # Errors
    ///
    /// A storage failure reading the ledger.
    pub async fn sources_of(
        &self,
        target_type: &str,
        target_id: &RecordId,
        relationship_name: Option<&str>,
    ) -> RelationResult<Vec<(String, RecordId)>> {
        Ok(self
            .active_edges()
            .await?
            .into_iter()
            .filter(|edge| {
                edge.target_type == target_type
                    && &edge.target_id == target_id
                    && relationship_name.map_or(true, |name| edge.relationship_name == name)
            })
            .map(|edge| (edge.source_type, edge.source_id))
            .collect())
    }

    /// The full ledger for one source, newest first, active and removed.
    ///
    /// # Errors
    ///
    /// A storage failure reading the ledger.
    pub async fn history(
        &self,
        source_type: &str,
        source_id: &RecordId,
    ) -> RelationResult<Vec<Edge>> {
        let mut edges: Vec<Edge> = self
            .edges()
            .await?
            .into_iter()
            .filter(|edge| edge.source_type == source_type && &edge.source_id == source_id)
            .collect();
        edges.reverse();
        Ok(edges)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// The active graph: latest row per logical edge, still open, in the
    /// order the open rows landed.
    async fn active_edges(&self) -> RelationResult<Vec<Edge>> {
        let mut latest: HashMap<(String, String, String, String, String), (usize, Edge)> =
            HashMap::new();
        for (index, edge) in self.edges().await?.into_iter().enumerate() {
            latest.insert(edge.key(), (index, edge));
        }

        let mut active: Vec<(usize, Edge)> = latest
            .into_values()
            .filter(|(_, edge)| edge.is_active())
            .collect();
        active.sort_unstable_by_key(|(index, _)| *index);
        Ok(active.into_iter().map(|(_, edge)| edge).collect())
    }

    /// Every ledger row, in insertion order.
    async fn edges(&self) -> RelationResult<Vec<Edge>> {
        self.repo.ensure_engine_stores().await?;
        let backend = self.repo.engine_backend();
        let rows = self
            .repo
            .with_deadline(
                format!("read_all_{RELATIONSHIP_EDGES_STORE}"),
                backend.read_all(RELATIONSHIP_EDGES_STORE),
            )
            .await?;

        let mut edges = Vec::with_capacity(rows.len());
        for row in &rows {
            edges.push(edge_from_row(row)?);
        }
        Ok(edges)
    }

    async fn append(&self, fields: FieldMap) -> RelationResult<Edge> {
        let backend = self.repo.engine_backend();
        let id = self
            .repo
            .with_deadline(
                format!("insert_{RELATIONSHIP_EDGES_STORE}"),
                backend.insert(RELATIONSHIP_EDGES_STORE, fields),
            )
            .await?;
        let row = self
            .repo
            .with_deadline(
                format!("read_one_{RELATIONSHIP_EDGES_STORE}"),
                backend.read_one(RELATIONSHIP_EDGES_STORE, &id),
            )
            .await?;
        Ok(edge_from_row(&row)?)
    }
}

// =============================================================================
// Row mapping
// =============================================================================

/// The shape of the shared `relationship_edges` store.
pub(crate) fn relationship_edges_schema() -> EntitySchema {
    EntitySchema::new(RELATIONSHIP_EDGES_STORE)
        .with_field(FieldSpec::new("source_type", FieldType::Text))
        .with_field(FieldSpec::new("source_id", FieldType::Text))
        .with_field(FieldSpec::new("relationship_name", FieldType::Text))
        .with_field(FieldSpec::new("target_type", FieldType::Text))
        .with_field(FieldSpec::new("target_id", FieldType::Text))
        .with_field(FieldSpec::new("created_at", FieldType::Text))
        .with_field(FieldSpec::new("created_by", FieldType::Text))
        .with_field(FieldSpec::new("removed_at", FieldType::Text))
        .with_field(FieldSpec::new("removed_by", FieldType::Text))
}

fn edge_from_row(row: &Record) -> Result<Edge, EngineError> {
    let text = |field: &str| -> Result<String, EngineError> {
        row.get(field)
            .and_then(Value::as_text)
            .map(str::to_string)
            .ok_or_else(|| {
                EngineError::Storage(StorageError::serialization(format!(
                    "relationship edge {} is missing '{field}'",
                    row.id()
                )))
            })
    };
    let optional =
        |field: &str| -> Option<String> { row.get(field).and_then(Value::as_text).map(str::to_string) };
    let id = |field: &str| -> Result<RecordId, EngineError> {
        let raw = text(field)?;
        raw.parse::<RecordId>().map_err(|_| {
            EngineError::Storage(StorageError::checksum_mismatch(
                RELATIONSHIP_EDGES_STORE,
                raw,
            ))
        })
    };

    Ok(Edge {
        edge_id: row.id().clone(),
        source_type: text("source_type")?,
        source_id: id("source_id")?,
        relationship_name: text("relationship_name")?,
        target_type: text("target_type")?,
        target_id: id("target_id")?,
        created_at: text("created_at")?,
        created_by: text("created_by")?,
        removed_at: optional("removed_at"),
        removed_by: optional("removed_by"),
    })
}

// =============================================================================
// Tests
// =============================================================================
