//! Property Tests for the Ledgers
//!
//! Random operation sequences against a sim repository, checked after
//! every step against a trivial in-memory mirror:
//! - The tag ledger must agree with the mirror on current tags, carriers,
//!   statistics, and total row count
//! - The relationship ledger must agree on every N:1 slot, and must report
//!   violations exactly when the mirror says the slot is taken
//!
//! Any failure replays from the printed seed.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use fichario_core::dst::{
    test_seeds, DeterministicRng, PropertyTest, PropertyTestable, SimClock,
};
use fichario_core::{Cardinality, EntitySchema, FieldMap, FieldSpec, FieldType, RecordId, Value};
use fichario_engine::config::EngineConfig;
use fichario_engine::ledger::{RelationError, TagError};
use fichario_engine::repository::Repository;

const TAGS: [&str; 3] = ["ativo", "vip", "inadimplente"];

fn ledger_runtime() -> tokio::runtime::Runtime {
    // Repository deadlines need the time driver.
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime")
}

fn nome_fields(nome: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert("nome".to_string(), Value::Text(nome.to_string()));
    fields
}

// =============================================================================
// Tag Ledger Model
// =============================================================================

/// Mirror of the tag ledger: which (subject, tag) pairs are active, and how
/// many rows the ledger should hold in total.
struct TagLedgerModel {
    runtime: tokio::runtime::Runtime,
    repo: Arc<Repository>,
    subjects: Vec<RecordId>,
    active: HashMap<(usize, &'static str), bool>,
    row_total: usize,
}

#[derive(Debug, Clone)]
enum TagOp {
    Apply { subject: usize, tag: &'static str },
    Remove { subject: usize, tag: &'static str },
}

impl TagLedgerModel {
    fn new(seed: u64) -> Self {
        let runtime = ledger_runtime();
        let config = EngineConfig::new().with_entity(
            EntitySchema::new("cliente").with_field(FieldSpec::new("nome", FieldType::Text)),
        );
        let repo = Arc::new(Repository::sim(config, seed));

        let subjects = runtime.block_on(async {
            let mut ids = Vec::new();
            for nome in ["Ana", "Bruno", "Clara"] {
                ids.push(repo.insert("cliente", nome_fields(nome)).await.unwrap());
            }
            ids
        });

        Self {
            runtime,
            repo,
            subjects,
            active: HashMap::new(),
            row_total: 0,
        }
    }

    fn is_active(&self, subject: usize, tag: &'static str) -> bool {
        self.active.get(&(subject, tag)).copied().unwrap_or(false)
    }
}

impl PropertyTestable for TagLedgerModel {
    type Operation = TagOp;

    fn generate_operation(&self, rng: &mut DeterministicRng) -> Self::Operation {
        let subject = rng.next_usize(0, self.subjects.len() - 1);
        let tag = *rng.choose(&TAGS);
        if rng.next_bool(0.6) {
            TagOp::Apply { subject, tag }
        } else {
            TagOp::Remove { subject, tag }
        }
    }

    fn apply_operation(&mut self, op: &Self::Operation, _clock: &SimClock) {
        let tags = self.repo.tags();
        match op {
            TagOp::Apply { subject, tag } => {
                self.runtime
                    .block_on(tags.apply_tag("cliente", &self.subjects[*subject], tag, "dst"))
                    .expect("apply_tag");
                // A reapply returns the existing row; only a fresh apply
                // grows the ledger.
                if !self.is_active(*subject, tag) {
                    self.active.insert((*subject, tag), true);
                    self.row_total += 1;
                }
            }
            TagOp::Remove { subject, tag } => {
                let was_active = self.is_active(*subject, tag);
                let result = self
                    .runtime
                    .block_on(tags.remove_tag("cliente", &self.subjects[*subject], tag, "dst"));
                match result {
                    Ok(_) => {
                        assert!(was_active, "remove succeeded on an inactive tag");
                        self.active.insert((*subject, tag), false);
                        self.row_total += 1;
                    }
                    Err(TagError::NotActive { .. }) => {
                        assert!(!was_active, "NotActive reported for an active tag");
                    }
                    Err(other) => panic!("unexpected remove_tag failure: {other}"),
                }
            }
        }
    }

    fn check_invariants(&self) -> Result<(), String> {
        let tags = self.repo.tags();

        // Current tags per subject match the mirror.
        for (i, id) in self.subjects.iter().enumerate() {
            let current = self
                .runtime
                .block_on(tags.current_tags("cliente", id))
                .map_err(|e| e.to_string())?;
            let mut expected = BTreeSet::new();
            for tag in TAGS {
                if self.is_active(i, tag) {
                    expected.insert(tag.to_string());
                }
            }
            if current != expected {
                return Err(format!(
                    "subject {i}: ledger says {current:?}, mirror says {expected:?}"
                ));
            }
        }

        // Carriers per tag match the mirror.
        for tag in TAGS {
            let carriers: HashSet<RecordId> = self
                .runtime
                .block_on(tags.records_by_tag("cliente", tag))
                .map_err(|e| e.to_string())?
                .into_iter()
                .collect();
            let expected: HashSet<RecordId> = self
                .subjects
                .iter()
                .enumerate()
                .filter(|(i, _)| self.is_active(*i, tag))
                .map(|(_, id)| id.clone())
                .collect();
            if carriers != expected {
                return Err(format!("tag '{tag}': carrier sets diverge"));
            }
        }

        // Statistics count records, never rows, and omit empty tags.
        let stats = self
            .runtime
            .block_on(tags.tag_statistics("cliente"))
            .map_err(|e| e.to_string())?;
        let mut expected = BTreeMap::new();
        for tag in TAGS {
            let count = (0..self.subjects.len())
                .filter(|i| self.is_active(*i, tag))
                .count();
            if count > 0 {
                expected.insert(tag.to_string(), count);
            }
        }
        if stats != expected {
            return Err(format!(
                "statistics diverge: ledger {stats:?}, mirror {expected:?}"
            ));
        }

        // The ledger only ever grows, one row per state change.
        let mut rows = 0;
        for id in &self.subjects {
            rows += self
                .runtime
                .block_on(tags.history("cliente", id))
                .map_err(|e| e.to_string())?
                .len();
        }
        if rows != self.row_total {
            return Err(format!(
                "ledger holds {rows} rows, mirror expects {}",
                self.row_total
            ));
        }

        Ok(())
    }

    fn describe_state(&self) -> String {
        format!(
            "subjects={} active_pairs={} rows={}",
            self.subjects.len(),
            self.active.values().filter(|a| **a).count(),
            self.row_total
        )
    }
}

#[test]
fn test_tag_ledger_matches_model() {
    for seed in test_seeds(5) {
        PropertyTest::new(seed)
            .with_max_operations(60)
            .run_and_assert(TagLedgerModel::new(seed));
    }
}

// =============================================================================
// Relationship Slot Model
// =============================================================================

/// Mirror of an N:1 relationship: each pedido holds at most one active
/// cliente target, and a taken slot refuses any different target.
struct SlotModel {
    runtime: tokio::runtime::Runtime,
    repo: Arc<Repository>,
    pedidos: Vec<RecordId>,
    clientes: Vec<RecordId>,
    slots: Vec<Option<usize>>,
}

#[derive(Debug, Clone)]
enum SlotOp {
    Link { pedido: usize, cliente: usize },
    Unlink { pedido: usize, cliente: usize },
}

impl SlotModel {
    fn new(seed: u64) -> Self {
        let runtime = ledger_runtime();
        let config = EngineConfig::new()
            .with_entity(
                EntitySchema::new("cliente").with_field(FieldSpec::new("nome", FieldType::Text)),
            )
            .with_entity(
                EntitySchema::new("pedido").with_field(FieldSpec::new("total", FieldType::Float)),
            )
            .with_relationship("cliente", Cardinality::ManyToOne);
        let repo = Arc::new(Repository::sim(config, seed));

        let (pedidos, clientes) = runtime.block_on(async {
            let mut pedidos = Vec::new();
            for i in 0..4 {
                let mut fields = FieldMap::new();
                fields.insert("total".to_string(), Value::Float(f64::from(i) * 10.0));
                pedidos.push(repo.insert("pedido", fields).await.unwrap());
            }
            let mut clientes = Vec::new();
            for nome in ["Ana", "Bruno"] {
                clientes.push(repo.insert("cliente", nome_fields(nome)).await.unwrap());
            }
            (pedidos, clientes)
        });

        let slots = vec![None; pedidos.len()];
        Self {
            runtime,
            repo,
            pedidos,
            clientes,
            slots,
        }
    }
}

impl PropertyTestable for SlotModel {
    type Operation = SlotOp;

    fn generate_operation(&self, rng: &mut DeterministicRng) -> Self::Operation {
        let pedido = rng.next_usize(0, self.pedidos.len() - 1);
        let cliente = rng.next_usize(0, self.clientes.len() - 1);
        if rng.next_bool(0.65) {
            SlotOp::Link { pedido, cliente }
        } else {
            SlotOp::Unlink { pedido, cliente }
        }
    }

    fn apply_operation(&mut self, op: &Self::Operation, _clock: &SimClock) {
        let rels = self.repo.relationships();
        match op {
            SlotOp::Link { pedido, cliente } => {
                let occupied = self.slots[*pedido];
                let result = self.runtime.block_on(rels.link(
                    "pedido",
                    &self.pedidos[*pedido],
                    "cliente",
                    "cliente",
                    &self.clientes[*cliente],
                    "dst",
                ));
                match result {
                    Ok(_) => {
                        assert!(
                            occupied.is_none() || occupied == Some(*cliente),
                            "link succeeded over an occupied slot"
                        );
                        self.slots[*pedido] = Some(*cliente);
                    }
                    Err(RelationError::CardinalityViolation { .. }) => {
                        assert!(
                            occupied.is_some() && occupied != Some(*cliente),
                            "violation reported for a free slot"
                        );
                    }
                    Err(other) => panic!("unexpected link failure: {other}"),
                }
            }
            SlotOp::Unlink { pedido, cliente } => {
                let held = self.slots[*pedido] == Some(*cliente);
                let result = self.runtime.block_on(rels.unlink(
                    "pedido",
                    &self.pedidos[*pedido],
                    "cliente",
                    &self.clientes[*cliente],
                    "dst",
                ));
                match result {
                    Ok(_) => {
                        assert!(held, "unlink succeeded on an edge that was not active");
                        self.slots[*pedido] = None;
                    }
                    Err(RelationError::NotActive { .. }) => {
                        assert!(!held, "NotActive reported for an active edge");
                    }
                    Err(other) => panic!("unexpected unlink failure: {other}"),
                }
            }
        }
    }

    fn check_invariants(&self) -> Result<(), String> {
        let rels = self.repo.relationships();

        // Each pedido's active targets match its slot exactly.
        for (p, id) in self.pedidos.iter().enumerate() {
            let targets = self
                .runtime
                .block_on(rels.targets_of("pedido", id, "cliente"))
                .map_err(|e| e.to_string())?;
            match self.slots[p] {
                None => {
                    if !targets.is_empty() {
                        return Err(format!("pedido {p} should hold no target: {targets:?}"));
                    }
                }
                Some(c) => {
                    let expected = vec![("cliente".to_string(), self.clientes[c].clone())];
                    if targets != expected {
                        return Err(format!(
                            "pedido {p} should hold exactly cliente {c}: {targets:?}"
                        ));
                    }
                }
            }
        }

        // Each cliente's active sources are the pedidos whose slot names it.
        for (c, id) in self.clientes.iter().enumerate() {
            let sources: HashSet<RecordId> = self
                .runtime
                .block_on(rels.sources_of("cliente", id, Some("cliente")))
                .map_err(|e| e.to_string())?
                .into_iter()
                .map(|(_, source_id)| source_id)
                .collect();
            let expected: HashSet<RecordId> = self
                .pedidos
                .iter()
                .enumerate()
                .filter(|(p, _)| self.slots[*p] == Some(c))
                .map(|(_, id)| id.clone())
                .collect();
            if sources != expected {
                return Err(format!("cliente {c}: source sets diverge"));
            }
        }

        Ok(())
    }

    fn describe_state(&self) -> String {
        format!("slots={:?}", self.slots)
    }
}

#[test]
fn test_relationship_slots_match_model() {
    for seed in test_seeds(4) {
        PropertyTest::new(seed)
            .with_max_operations(60)
            .run_and_assert(SlotModel::new(seed));
    }
}
