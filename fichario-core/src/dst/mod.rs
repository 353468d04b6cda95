//! DST - Deterministic Simulation Testing
//!
//! TigerBeetle/FoundationDB-style deterministic simulation testing framework.
//!
//! # Philosophy
//!
//! > "If you're not testing with fault injection, you're not testing."
//!
//! Storage engines fail in the field under exactly the conditions unit
//! tests never produce: a backend that goes away mid-migration, a write
//! that times out after the ledger row was appended, a record id that
//! comes back with a flipped symbol. This module provides the seeded RNG,
//! simulated clock, fault injector, and property-test runner that let
//! those conditions be produced on demand and replayed from a seed.
//!
//! # Usage
//!
//! ```rust
//! use fichario_core::dst::{DeterministicRng, FaultConfig, FaultInjector, FaultType};
//!
//! let mut injector = FaultInjector::new(DeterministicRng::new(42));
//! injector.register(FaultConfig::new(FaultType::WriteFail, 1.0).with_filter("insert"));
//!
//! assert_eq!(injector.should_inject("insert_cliente"), Some(FaultType::WriteFail));
//! assert_eq!(injector.should_inject("read_all_cliente"), None);
//! ```
//!
//! Run with explicit seed for reproducibility:
//! ```bash
//! DST_SEED=12345 cargo test
//! ```

mod clock;
mod config;
mod fault;
mod property;
mod rng;

pub use clock::SimClock;
pub use config::SimConfig;
pub use fault::{FaultConfig, FaultInjector, FaultInjectorBuilder, FaultType};
pub use property::{
    run_property_tests, test_seeds, PropertyTest, PropertyTestFailure, PropertyTestResult,
    PropertyTestable, TimeAdvanceConfig,
};
pub use rng::DeterministicRng;
