//! Fichario Core - Record Model with DST
//!
//! TigerStyle simulation-first core for a form-driven record system,
//! inspired by TigerBeetle/FoundationDB.
//!
//! # Philosophy
//!
//! > "If you're not testing with fault injection, you're not testing."
//!
//! Fichario is built simulation-first:
//! 1. Build the test harness BEFORE the production code
//! 2. Every component must be testable under simulation
//! 3. All I/O goes through injectable interfaces
//! 4. Seeds are logged for reproducibility
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Fichario Core                  │
//! ├─────────────────────────────────────────────┤
//! │  Record Ids    │ Crockford Base32 + check   │
//! │  Records       │ Typed field maps           │
//! │  Schemas       │ Declared entity shapes     │
//! ├─────────────────────────────────────────────┤
//! │  DST Framework │ Fault injection            │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use fichario_core::id::RecordId;
//! use fichario_core::record::{FieldMap, Record, Value};
//!
//! let id = RecordId::generate();
//! let mut record = Record::new("cliente", id, FieldMap::new());
//! record.set("nome", Value::from("Ana Souza"));
//! assert_eq!(record.get("nome"), Some(&Value::Text("Ana Souza".into())));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod constants;
pub mod dst;
pub mod id;
pub mod record;
pub mod schema;

// Re-export common types
pub use constants::*;
pub use dst::{
    run_property_tests,
    test_seeds,
    DeterministicRng,
    FaultConfig,
    FaultInjector,
    FaultInjectorBuilder,
    FaultType,
    // Property-based testing
    PropertyTest,
    PropertyTestFailure,
    PropertyTestResult,
    PropertyTestable,
    SimClock,
    SimConfig,
    TimeAdvanceConfig,
};
pub use id::{IdError, RecordId};
pub use record::{FieldMap, Record, Value};
pub use schema::{Cardinality, EntitySchema, FieldRename, FieldSpec, FieldType, SchemaError};
