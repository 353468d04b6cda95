//! Property-Based Testing for DST
//!
//! TigerStyle: Random operation sequences with invariant checking.
//!
//! # Philosophy
//!
//! Property-based testing generates random operations and verifies that
//! invariants hold after each operation. Combined with DST, this gives:
//! - Deterministic reproduction via seed
//! - Time control via SimClock
//! - Fault injection via FaultInjector
//!
//! # Example
//!
//! ```rust,ignore
//! use fichario_core::dst::{PropertyTest, PropertyTestable, SimClock, DeterministicRng};
//!
//! struct TagModel { active: Vec<String> }
//!
//! #[derive(Debug, Clone)]
//! enum TagOp { Apply(String), Remove(String) }
//!
//! impl PropertyTestable for TagModel {
//!     type Operation = TagOp;
//!
//!     fn generate_operation(&self, rng: &mut DeterministicRng) -> Self::Operation {
//!         let tag = rng.choose(&["ativo", "vip", "inadimplente"]).to_string();
//!         if rng.next_bool(0.5) { TagOp::Apply(tag) } else { TagOp::Remove(tag) }
//!     }
//!
//!     fn apply_operation(&mut self, op: &Self::Operation, _clock: &SimClock) {
//!         match op {
//!             TagOp::Apply(t) if !self.active.contains(t) => self.active.push(t.clone()),
//!             TagOp::Remove(t) => self.active.retain(|a| a != t),
//!             TagOp::Apply(_) => {}
//!         }
//!     }
//!
//!     fn check_invariants(&self) -> Result<(), String> {
//!         let mut seen = self.active.clone();
//!         seen.sort();
//!         seen.dedup();
//!         if seen.len() != self.active.len() {
//!             return Err("duplicate active tag".to_string());
//!         }
//!         Ok(())
//!     }
//! }
//!
//! #[test]
//! fn test_tag_properties() {
//!     let model = TagModel { active: Vec::new() };
//!     let result = PropertyTest::new(42)
//!         .with_max_operations(1000)
//!         .run(model);
//!     assert!(result.is_success());
//! }
//! ```

use std::fmt::Debug;

use super::clock::SimClock;
use super::rng::DeterministicRng;
use crate::constants::DST_SIMULATION_STEPS_MAX;

/// Trait for systems that can be property-tested.
///
/// TigerStyle: Explicit operation generation and invariant checking.
pub trait PropertyTestable {
    /// The type of operations that can be performed.
    type Operation: Debug + Clone;

    /// Generate a random operation based on current state.
    ///
    /// The operation should be valid for the current state.
    fn generate_operation(&self, rng: &mut DeterministicRng) -> Self::Operation;

    /// Apply an operation to the state.
    ///
    /// May use the clock for time-dependent operations.
    fn apply_operation(&mut self, op: &Self::Operation, clock: &SimClock);

    /// Check that all invariants hold.
    ///
    /// Returns Ok(()) if all invariants pass, Err(message) otherwise.
    fn check_invariants(&self) -> Result<(), String>;

    /// Optional: Describe the current state for debugging.
    fn describe_state(&self) -> String {
        String::from("(state description not implemented)")
    }
}

/// Result of a property test run.
#[derive(Debug)]
pub struct PropertyTestResult {
    /// Number of operations successfully executed
    pub operations_executed: u64,
    /// Seed used for reproduction
    pub seed: u64,
    /// Failure details, if any
    pub failure: Option<PropertyTestFailure>,
}

impl PropertyTestResult {
    /// Check if the test passed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Check if the test failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }

    /// Unwrap the result, panicking with details if failed.
    ///
    /// # Panics
    /// Panics if the test failed, with reproduction info.
    pub fn unwrap(self) {
        if let Some(failure) = self.failure {
            panic!(
                "Property test failed!\n\
                 Seed: {} (use this to reproduce)\n\
                 Operation #{}: {:?}\n\
                 Invariant violation: {}\n\
                 State: {}",
                self.seed,
                failure.operation_index,
                failure.operation,
                failure.message,
                failure.state_description
            );
        }
    }
}

/// Details of a property test failure.
#[derive(Debug)]
pub struct PropertyTestFailure {
    /// Index of the failing operation (0-based)
    pub operation_index: u64,
    /// The operation that caused the failure
    pub operation: String,
    /// The invariant violation message
    pub message: String,
    /// Description of the state at failure
    pub state_description: String,
}

/// Configuration for time advancement during property tests.
#[derive(Debug, Clone)]
pub struct TimeAdvanceConfig {
    /// Minimum time to advance per operation (ms)
    pub min_ms: u64,
    /// Maximum time to advance per operation (ms)
    pub max_ms: u64,
    /// Probability of advancing time (0.0 to 1.0)
    pub probability: f64,
}

impl Default for TimeAdvanceConfig {
    fn default() -> Self {
        Self {
            min_ms: 0,
            max_ms: 1000,
            probability: 0.5,
        }
    }
}

impl TimeAdvanceConfig {
    /// No time advancement.
    #[must_use]
    pub fn none() -> Self {
        Self {
            min_ms: 0,
            max_ms: 0,
            probability: 0.0,
        }
    }

    /// Always advance by fixed amount.
    #[must_use]
    pub fn fixed(ms: u64) -> Self {
        Self {
            min_ms: ms,
            max_ms: ms,
            probability: 1.0,
        }
    }

    /// Advance with given range and probability.
    ///
    /// # Panics
    /// Panics if probability is outside [0, 1] or min_ms > max_ms.
    #[must_use]
    pub fn random(min_ms: u64, max_ms: u64, probability: f64) -> Self {
        assert!((0.0..=1.0).contains(&probability));
        assert!(min_ms <= max_ms);
        Self {
            min_ms,
            max_ms,
            probability,
        }
    }
}

/// Property-based test runner.
///
/// TigerStyle:
/// - Deterministic via seed
/// - Explicit operation count limits
/// - Invariant checking after each operation
/// - Time advancement control
#[derive(Debug)]
pub struct PropertyTest {
    seed: u64,
    max_operations: u64,
    time_config: TimeAdvanceConfig,
    check_invariants_before: bool,
}

impl PropertyTest {
    /// Create a new property test with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            max_operations: 100, // Sensible default
            time_config: TimeAdvanceConfig::default(),
            check_invariants_before: true,
        }
    }

    /// Set the maximum number of operations to run.
    ///
    /// # Panics
    /// Panics if max exceeds DST_SIMULATION_STEPS_MAX.
    #[must_use]
    pub fn with_max_operations(mut self, max: u64) -> Self {
        assert!(
            max <= DST_SIMULATION_STEPS_MAX,
            "max_operations {} exceeds DST_SIMULATION_STEPS_MAX {}",
            max,
            DST_SIMULATION_STEPS_MAX
        );
        self.max_operations = max;
        self
    }

    /// Configure time advancement between operations.
    #[must_use]
    pub fn with_time_advance(mut self, config: TimeAdvanceConfig) -> Self {
        self.time_config = config;
        self
    }

    /// Disable checking invariants before the first operation.
    #[must_use]
    pub fn skip_initial_invariant_check(mut self) -> Self {
        self.check_invariants_before = false;
        self
    }

    /// Run the property test.
    ///
    /// Generates random operations, applies them, and checks invariants
    /// after each operation. Returns detailed results.
    #[must_use]
    pub fn run<T: PropertyTestable>(self, mut state: T) -> PropertyTestResult {
        let mut rng = DeterministicRng::new(self.seed);
        let clock = SimClock::new();

        // Check initial invariants
        if self.check_invariants_before {
            if let Err(msg) = state.check_invariants() {
                return PropertyTestResult {
                    operations_executed: 0,
                    seed: self.seed,
                    failure: Some(PropertyTestFailure {
                        operation_index: 0,
                        operation: "(initial state)".to_string(),
                        message: format!("Initial state violates invariants: {}", msg),
                        state_description: state.describe_state(),
                    }),
                };
            }
        }

        for i in 0..self.max_operations {
            // Maybe advance time
            if self.time_config.probability > 0.0 && rng.next_bool(self.time_config.probability) {
                let advance = if self.time_config.min_ms == self.time_config.max_ms {
                    self.time_config.min_ms
                } else {
                    rng.next_usize(
                        self.time_config.min_ms as usize,
                        self.time_config.max_ms as usize,
                    ) as u64
                };
                clock.advance_ms(advance);
            }

            // Generate and apply operation
            let op = state.generate_operation(&mut rng);
            let op_debug = format!("{:?}", op);
            state.apply_operation(&op, &clock);

            // Check invariants
            if let Err(msg) = state.check_invariants() {
                return PropertyTestResult {
                    operations_executed: i + 1,
                    seed: self.seed,
                    failure: Some(PropertyTestFailure {
                        operation_index: i,
                        operation: op_debug,
                        message: msg,
                        state_description: state.describe_state(),
                    }),
                };
            }
        }

        PropertyTestResult {
            operations_executed: self.max_operations,
            seed: self.seed,
            failure: None,
        }
    }

    /// Run the property test, panicking on failure.
    ///
    /// Convenience method for use in #[test] functions.
    ///
    /// # Panics
    /// Panics if any invariant is violated.
    pub fn run_and_assert<T: PropertyTestable>(self, state: T) {
        self.run(state).unwrap();
    }
}

/// Run multiple property tests with different seeds.
///
/// TigerStyle: Multi-seed testing for broader coverage.
///
/// # Panics
/// Panics if any test fails.
pub fn run_property_tests<T, F>(seeds: &[u64], max_operations: u64, state_factory: F)
where
    T: PropertyTestable,
    F: Fn() -> T,
{
    for &seed in seeds {
        let state = state_factory();
        PropertyTest::new(seed)
            .with_max_operations(max_operations)
            .run_and_assert(state);
    }
}

/// Generate a set of test seeds including edge cases.
///
/// Returns seeds: [0, 1, 42, random, random, ...]
///
/// # Panics
/// Panics if count < 3.
#[must_use]
pub fn test_seeds(count: usize) -> Vec<u64> {
    assert!(count >= 3, "need at least 3 seeds for edge cases");

    let mut seeds = vec![0, 1, 42]; // Edge cases + common test seed

    // Add random seeds
    let time_seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(12345);
    let mut rng = DeterministicRng::new(time_seed);

    while seeds.len() < count {
        // Generate u64 from two usize values
        let high = rng.next_usize(0, u32::MAX as usize) as u64;
        let low = rng.next_usize(0, u32::MAX as usize) as u64;
        seeds.push((high << 32) | low);
    }

    seeds
}
