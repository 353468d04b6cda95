//! Tag Ledger - Append-Only Labels
//!
//! Tags are free labels on records, kept as an event ledger in the shared
//! `tag_events` store. Rows are never mutated: applying appends an open
//! event, removing appends a closing copy with `removed_at`/`removed_by`
//! filled in. Current state is always derived from the log:
//!
//! ```text
//!  row  entity   subject  tag     removed_at          latest per (e,s,t)
//!  ---  -------  -------  ------  ------------------  ------------------
//!   1   cliente  X        ativo   ·                   .
//!   2   cliente  X        ativo   2026-03-01T09:00Z   .
//!   3   cliente  X        ativo   ·                   ◀ active
//! ```
//!
//! A tag symbol is lowercase letters, digits and underscore, at most
//! `TAG_BYTES_MAX` bytes. Workflow boards build on this ledger: one tag
//! per column, a card move is `remove_tag` then `apply_tag`, and the two
//! calls are not atomic with each other.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use fichario_core::{FieldMap, Record, RecordId, Value, TAG_BYTES_MAX};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::TAG_EVENTS_STORE;
use crate::repository::{EngineError, Repository};
use crate::storage::StorageError;

use fichario_core::{EntitySchema, FieldSpec, FieldType};

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced by tag operations.
#[derive(Error, Debug)]
pub enum TagError {
    /// The tag does not match the accepted symbol pattern.
    #[error("invalid tag '{tag}': lowercase letters, digits and underscore, at most {TAG_BYTES_MAX} bytes")]
    InvalidTag {
        /// The rejected symbol.
        tag: String,
    },

    /// No active event exists for the (entity, record, tag) triple.
    #[error("tag '{tag}' is not active on {entity}/{record_id}")]
    NotActive {
        /// Entity type of the subject record.
        entity: String,
        /// The subject record.
        record_id: String,
        /// The tag that was not active.
        tag: String,
    },

    /// The underlying engine call failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Convenience alias for tag results.
pub type TagResult<T> = Result<T, TagError>;

// =============================================================================
// TagEvent
// =============================================================================

/// One row of the tag ledger.
///
/// An open event has `removed_at`/`removed_by` unset. A closing event
/// copies the open event's application columns and fills both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEvent {
    /// Ledger row identifier.
    pub event_id: RecordId,
    /// Entity type of the subject record.
    pub entity_type: String,
    /// The subject record.
    pub record_id: RecordId,
    /// The tag symbol.
    pub tag: String,
    /// When the tag was applied, RFC 3339.
    pub applied_at: String,
    /// Who applied it.
    pub applied_by: String,
    /// When the tag was removed, RFC 3339. Unset while active.
    pub removed_at: Option<String>,
    /// Who removed it. Unset while active.
    pub removed_by: Option<String>,
}

impl TagEvent {
    /// Whether this event represents a still-applied tag.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.removed_at.is_none()
    }
}

// =============================================================================
// TagLedger
// =============================================================================

/// Tag operations over a shared repository.
#[derive(Debug)]
pub struct TagLedger {
    repo: Arc<Repository>,
}

impl TagLedger {
    /// Ledger over `repo`'s engine stores.
    #[must_use]
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Apply `tag` to a record. Idempotent: an already-active tag returns
    /// the existing open event without appending.
    ///
    /// The subject record must exist; checking it also verifies the
    /// entity's store on first touch.
    ///
    /// # Errors
    ///
    /// `InvalidTag` for a malformed symbol, `NotFound` (through the
    /// engine) for a missing record, or a storage failure.
    ///
    /// # Panics
    ///
    /// When `entity` or `actor` is empty.
    #[tracing::instrument(skip(self))]
    pub async fn apply_tag(
        &self,
        entity: &str,
        record_id: &RecordId,
        tag: &str,
        actor: &str,
    ) -> TagResult<TagEvent> {
        assert!(!entity.is_empty(), "entity must not be empty");
        assert!(!actor.is_empty(), "actor must not be empty");
        ensure_valid_tag(tag)?;

        self.repo.read_one(entity, record_id).await?;

        let _guard = self.repo.ledger_write_lock().lock().await;
        if let Some(open) = self.active_event(entity, record_id, tag).await? {
            tracing::debug!(entity, record_id = %record_id, tag, "tag already active");
            return Ok(open);
        }

        let mut fields = FieldMap::new();
        fields.insert("entity_type".to_string(), Value::from(entity));
        fields.insert(
            "subject_id".to_string(),
            Value::from(record_id.to_string()),
        );
        fields.insert("tag".to_string(), Value::from(tag));
        fields.insert(
            "applied_at".to_string(),
            Value::from(self.repo.clock().now_rfc3339()),
        );
        fields.insert("applied_by".to_string(), Value::from(actor));

        let event = self.append(fields).await?;
        tracing::info!(entity, record_id = %record_id, tag, actor, "tag applied");
        Ok(event)
    }

    /// Remove an active tag by appending a closing event.
    ///
    /// # Errors
    ///
    /// `InvalidTag` for a malformed symbol, `NotActive` when the triple
    /// has no open event, or a storage failure.
    ///
    /// # Panics
    ///
    /// When `entity` or `actor` is empty.
    #[tracing::instrument(skip(self))]
    pub async fn remove_tag(
        &self,
        entity: &str,
        record_id: &RecordId,
        tag: &str,
        actor: &str,
    ) -> TagResult<TagEvent> {
        assert!(!entity.is_empty(), "entity must not be empty");
        assert!(!actor.is_empty(), "actor must not be empty");
        ensure_valid_tag(tag)?;

        let _guard = self.repo.ledger_write_lock().lock().await;
        let open = self
            .active_event(entity, record_id, tag)
            .await?
            .ok_or_else(|| TagError::NotActive {
                entity: entity.to_string(),
                record_id: record_id.to_string(),
                tag: tag.to_string(),
            })?;

        let mut fields = FieldMap::new();
        fields.insert("entity_type".to_string(), Value::from(open.entity_type));
        fields.insert(
            "subject_id".to_string(),
            Value::from(open.record_id.to_string()),
        );
        fields.insert("tag".to_string(), Value::from(open.tag));
        fields.insert("applied_at".to_string(), Value::from(open.applied_at));
        fields.insert("applied_by".to_string(), Value::from(open.applied_by));
        fields.insert(
            "removed_at".to_string(),
            Value::from(self.repo.clock().now_rfc3339()),
        );
        fields.insert("removed_by".to_string(), Value::from(actor));

        let event = self.append(fields).await?;
        tracing::info!(entity, record_id = %record_id, tag, actor, "tag removed");
        Ok(event)
    }

    /// The set of tags currently active on a record. Derived, not stored.
    ///
    /// # Errors
    ///
    /// A storage failure reading the ledger.
    pub async fn current_tags(
        &self,
        entity: &str,
        record_id: &RecordId,
    ) -> TagResult<BTreeSet<String>> {
        let mut latest: HashMap<String, bool> = HashMap::new();
        for event in self.events().await? {
            if event.entity_type == entity && &event.record_id == record_id {
                latest.insert(event.tag, event.removed_at.is_none());
            }
        }
        Ok(latest
            .into_iter()
            .filter_map(|(tag, active)| active.then_some(tag))
            .collect())
    }

    /// Records of `entity` currently carrying `tag`, in the order their
    /// current application landed in the ledger.
    ///
    /// # Errors
    ///
    /// `InvalidTag` for a malformed symbol, or a storage failure.
    pub async fn records_by_tag(&self, entity: &str, tag: &str) -> TagResult<Vec<RecordId>> {
        ensure_valid_tag(tag)?;

        let mut latest: HashMap<RecordId, (usize, bool)> = HashMap::new();
        for (index, event) in self.events().await?.into_iter().enumerate() {
            if event.entity_type == entity && event.tag == tag {
                latest.insert(event.record_id, (index, event.removed_at.is_none()));
            }
        }

        let mut carrying: Vec<(usize, RecordId)> = latest
            .into_iter()
            .filter_map(|(id, (index, active))| active.then_some((index, id)))
            .collect();
        carrying.sort_unstable_by_key(|(index, _)| *index);
        Ok(carrying.into_iter().map(|(_, id)| id).collect())
    }

    /// How many records of `entity` currently carry each tag. Tags with
    /// no current carrier are omitted.
    ///
    /// # Errors
    ///
    /// A storage failure reading the ledger.
    pub async fn tag_statistics(&self, entity: &str) -> TagResult<BTreeMap<String, usize>> {
        let mut latest: HashMap<(RecordId, String), bool> = HashMap::new();
        for event in self.events().await? {
            if event.entity_type == entity {
                latest.insert((event.record_id, event.tag), event.removed_at.is_none());
            }
        }

        let mut statistics = BTreeMap::new();
        for ((_, tag), active) in latest {
            if active {
                *statistics.entry(tag).or_insert(0) += 1;
            }
        }
        Ok(statistics)
    }

    /// The full ledger for one record, oldest first, applies and removals
    /// alike.
    ///
    /// # Errors
    ///
    /// A storage failure reading the ledger.
    pub async fn history(&self, entity: &str, record_id: &RecordId) -> TagResult<Vec<TagEvent>> {
        Ok(self
            .events()
            .await?
            .into_iter()
            .filter(|event| event.entity_type == entity && &event.record_id == record_id)
            .collect())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// The open event for a triple, when the latest row is still active.
    async fn active_event(
        &self,
        entity: &str,
        record_id: &RecordId,
        tag: &str,
    ) -> TagResult<Option<TagEvent>> {
        let mut latest: Option<TagEvent> = None;
        for event in self.events().await? {
            if event.entity_type == entity && &event.record_id == record_id && event.tag == tag {
                latest = Some(event);
            }
        }
        Ok(latest.filter(TagEvent::is_active))
    }

    /// Every ledger row, in insertion order.
    async fn events(&self) -> TagResult<Vec<TagEvent>> {
        self.repo.ensure_engine_stores().await?;
        let backend = self.repo.engine_backend();
        let rows = self
            .repo
            .with_deadline(
                format!("read_all_{TAG_EVENTS_STORE}"),
                backend.read_all(TAG_EVENTS_STORE),
            )
            .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            events.push(event_from_row(row)?);
        }
        Ok(events)
    }

    async fn append(&self, fields: FieldMap) -> TagResult<TagEvent> {
        let backend = self.repo.engine_backend();
        let id = self
            .repo
            .with_deadline(
                format!("insert_{TAG_EVENTS_STORE}"),
                backend.insert(TAG_EVENTS_STORE, fields),
            )
            .await?;
        let row = self
            .repo
            .with_deadline(
                format!("read_one_{TAG_EVENTS_STORE}"),
                backend.read_one(TAG_EVENTS_STORE, &id),
            )
            .await?;
        Ok(event_from_row(&row)?)
    }
}

// =============================================================================
// Row mapping
// =============================================================================

/// The shape of the shared `tag_events` store.
pub(crate) fn tag_events_schema() -> EntitySchema {
    EntitySchema::new(TAG_EVENTS_STORE)
        .with_field(FieldSpec::new("entity_type", FieldType::Text))
        .with_field(FieldSpec::new("subject_id", FieldType::Text))
        .with_field(FieldSpec::new("tag", FieldType::Text))
        .with_field(FieldSpec::new("applied_at", FieldType::Text))
        .with_field(FieldSpec::new("applied_by", FieldType::Text))
        .with_field(FieldSpec::new("removed_at", FieldType::Text))
        .with_field(FieldSpec::new("removed_by", FieldType::Text))
}

fn event_from_row(row: &Record) -> Result<TagEvent, EngineError> {
    let text = |field: &str| -> Result<String, EngineError> {
        row.get(field)
            .and_then(Value::as_text)
            .map(str::to_string)
            .ok_or_else(|| {
                EngineError::Storage(StorageError::serialization(format!(
                    "tag event {} is missing '{field}'",
                    row.id()
                )))
            })
    };
    let optional =
        |field: &str| -> Option<String> { row.get(field).and_then(Value::as_text).map(str::to_string) };

    let subject_raw = text("subject_id")?;
    let record_id = subject_raw.parse::<RecordId>().map_err(|_| {
        EngineError::Storage(StorageError::checksum_mismatch(TAG_EVENTS_STORE, subject_raw))
    })?;

    Ok(TagEvent {
        event_id: row.id().clone(),
        entity_type: text("entity_type")?,
        record_id,
        tag: text("tag")?,
        applied_at: text("applied_at")?,
        applied_by: text("applied_by")?,
        removed_at: optional("removed_at"),
        removed_by: optional("removed_by"),
    })
}

/// Check a tag against the accepted symbol pattern.
fn ensure_valid_tag(tag: &str) -> TagResult<()> {
    let well_formed = !tag.is_empty()
        && tag.len() <= TAG_BYTES_MAX
        && tag
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if well_formed {
        Ok(())
    } else {
        Err(TagError::InvalidTag {
            tag: tag.to_string(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::storage::StorageError;

    fn repo(seed: u64) -> Arc<Repository> {
        let config = EngineConfig::new().with_entity(
            EntitySchema::new("cliente").with_field(FieldSpec::new("nome", FieldType::Text)),
        );
        Arc::new(Repository::sim(config, seed))
    }

    async fn insert_cliente(repo: &Repository, nome: &str) -> RecordId {
        let mut fields = FieldMap::new();
        fields.insert("nome".to_string(), Value::from(nome));
        repo.insert("cliente", fields).await.unwrap()
    }

    #[tokio::test]
    async fn test_apply_and_derive() {
        let repo = repo(1);
        let tags = repo.tags();
        let id = insert_cliente(&repo, "Acme").await;

        let event = tags.apply_tag("cliente", &id, "ativo", "ana").await.unwrap();
        assert!(event.is_active());
        assert_eq!(event.applied_by, "ana");

        let current = tags.current_tags("cliente", &id).await.unwrap();
        assert!(current.contains("ativo"));
        assert_eq!(
            tags.records_by_tag("cliente", "ativo").await.unwrap(),
            vec![id.clone()]
        );
        assert_eq!(
            tags.tag_statistics("cliente").await.unwrap().get("ativo"),
            Some(&1)
        );
    }

    #[tokio::test]
    async fn test_invalid_tag_symbols_are_rejected() {
        let repo = repo(2);
        let tags = repo.tags();
        let id = insert_cliente(&repo, "Acme").await;

        for bad in ["", "Ativo", "em aberto", "café", "x".repeat(65).as_str()] {
            let err = tags.apply_tag("cliente", &id, bad, "ana").await.unwrap_err();
            assert!(matches!(err, TagError::InvalidTag { .. }), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn test_apply_verifies_the_subject_exists() {
        let repo = repo(3);
        let tags = repo.tags();
        let ghost = RecordId::generate();

        let err = tags
            .apply_tag("cliente", &ghost, "ativo", "ana")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TagError::Engine(EngineError::Storage(StorageError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_reapply_is_idempotent() {
        let repo = repo(4);
        let tags = repo.tags();
        let id = insert_cliente(&repo, "Acme").await;

        let first = tags.apply_tag("cliente", &id, "ativo", "ana").await.unwrap();
        let second = tags.apply_tag("cliente", &id, "ativo", "rui").await.unwrap();

        // Same open event came back; no duplicate active entries.
        assert_eq!(first.event_id, second.event_id);
        assert_eq!(tags.history("cliente", &id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_appends_a_closing_event() {
        let repo = repo(5);
        let tags = repo.tags();
        let id = insert_cliente(&repo, "Acme").await;

        tags.apply_tag("cliente", &id, "ativo", "ana").await.unwrap();
        let closed = tags.remove_tag("cliente", &id, "ativo", "rui").await.unwrap();
        assert_eq!(closed.removed_by.as_deref(), Some("rui"));
        assert_eq!(closed.applied_by, "ana");

        // Apply then remove leaves the tag gone and exactly two rows behind.
        assert!(tags.current_tags("cliente", &id).await.unwrap().is_empty());
        let history = tags.history("cliente", &id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].is_active());
        assert!(!history[1].is_active());

        let err = tags
            .remove_tag("cliente", &id, "ativo", "rui")
            .await
            .unwrap_err();
        assert!(matches!(err, TagError::NotActive { .. }));
    }

    #[tokio::test]
    async fn test_board_move_is_remove_then_apply() {
        let repo = repo(6);
        let tags = repo.tags();
        let id = insert_cliente(&repo, "Acme").await;

        tags.apply_tag("cliente", &id, "em_analise", "ana").await.unwrap();
        tags.remove_tag("cliente", &id, "em_analise", "ana").await.unwrap();
        tags.apply_tag("cliente", &id, "aprovado", "ana").await.unwrap();

        let current = tags.current_tags("cliente", &id).await.unwrap();
        assert!(!current.contains("em_analise"));
        assert!(current.contains("aprovado"));

        let by_column = tags.records_by_tag("cliente", "em_analise").await.unwrap();
        assert!(by_column.is_empty());
        assert_eq!(
            tags.records_by_tag("cliente", "aprovado").await.unwrap(),
            vec![id]
        );
    }

    #[tokio::test]
    async fn test_statistics_count_records_not_events() {
        let repo = repo(7);
        let tags = repo.tags();
        let a = insert_cliente(&repo, "Acme").await;
        let b = insert_cliente(&repo, "Beta").await;

        tags.apply_tag("cliente", &a, "ativo", "ana").await.unwrap();
        tags.apply_tag("cliente", &b, "ativo", "ana").await.unwrap();
        // Re-application and a removed tag must not inflate counts.
        tags.apply_tag("cliente", &a, "ativo", "rui").await.unwrap();
        tags.apply_tag("cliente", &a, "vip", "ana").await.unwrap();
        tags.remove_tag("cliente", &a, "vip", "ana").await.unwrap();

        let statistics = tags.tag_statistics("cliente").await.unwrap();
        assert_eq!(statistics.get("ativo"), Some(&2));
        assert_eq!(statistics.get("vip"), None);
    }

    #[tokio::test]
    async fn test_reapplied_tag_keeps_full_history() {
        let repo = repo(8);
        let tags = repo.tags();
        let id = insert_cliente(&repo, "Acme").await;

        tags.apply_tag("cliente", &id, "ativo", "ana").await.unwrap();
        tags.remove_tag("cliente", &id, "ativo", "ana").await.unwrap();
        tags.apply_tag("cliente", &id, "ativo", "rui").await.unwrap();

        let history = tags.history("cliente", &id).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history[2].is_active());

        let current = tags.current_tags("cliente", &id).await.unwrap();
        assert!(current.contains("ativo"));
    }
}
