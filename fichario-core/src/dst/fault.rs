//! FaultInjector - Probabilistic Fault Injection
//!
//! TigerStyle: Explicit fault injection for chaos testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::rng::DeterministicRng;
use crate::constants::DST_FAULT_PROBABILITY_MAX;

/// Types of faults that can be injected into a storage backend.
///
/// TigerStyle: Every fault type is explicit and documented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultType {
    // =========================================================================
    // Availability Faults
    // =========================================================================
    /// Write operation fails
    WriteFail,
    /// Read operation fails
    ReadFail,
    /// Delete operation fails
    DeleteFail,
    /// Whole backend refuses the operation
    BackendUnavailable,
    /// Operation hangs past its deadline
    OperationTimeout,
    /// No space left for flat-file writes
    DiskFull,

    // =========================================================================
    // Integrity Faults
    // =========================================================================
    /// A persisted record id comes back with a flipped symbol
    IdCorruption,
}

impl FaultType {
    /// Get the fault type name as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WriteFail => "write_fail",
            Self::ReadFail => "read_fail",
            Self::DeleteFail => "delete_fail",
            Self::BackendUnavailable => "backend_unavailable",
            Self::OperationTimeout => "operation_timeout",
            Self::DiskFull => "disk_full",
            Self::IdCorruption => "id_corruption",
        }
    }
}

/// Configuration for a specific fault.
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// The type of fault
    pub fault_type: FaultType,
    /// Probability of injection (0.0 to 1.0)
    pub probability: f64,
    /// Optional operation filter (substring match)
    pub operation_filter: Option<String>,
    /// Maximum number of injections (None = unlimited)
    pub max_injections: Option<u64>,
}

impl FaultConfig {
    /// Create a new fault configuration.
    ///
    /// # Panics
    /// Panics if probability is not in [0, 1].
    #[must_use]
    pub fn new(fault_type: FaultType, probability: f64) -> Self {
        // Precondition
        assert!(
            (0.0..=DST_FAULT_PROBABILITY_MAX).contains(&probability),
            "probability must be in [0, {}], got {}",
            DST_FAULT_PROBABILITY_MAX,
            probability
        );

        Self {
            fault_type,
            probability,
            operation_filter: None,
            max_injections: None,
        }
    }

    /// Set operation filter (fault only applies to matching operations).
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.operation_filter = Some(filter.into());
        self
    }

    /// Set maximum number of injections.
    #[must_use]
    pub fn with_max_injections(mut self, max: u64) -> Self {
        // Precondition
        assert!(max > 0, "max_injections must be positive");
        self.max_injections = Some(max);
        self
    }
}

/// Fault injection statistics.
#[derive(Debug, Default)]
struct FaultStats {
    injection_count: AtomicU64,
}

/// Fault injector for simulation testing.
///
/// TigerStyle:
/// - Explicit fault registration
/// - Deterministic through RNG
/// - Statistics tracked
/// - Interior mutability for sharing via Arc
#[derive(Debug)]
pub struct FaultInjector {
    /// RNG wrapped in Mutex for interior mutability (allows sharing via Arc)
    rng: Mutex<DeterministicRng>,
    configs: Vec<FaultConfig>,
    stats: HashMap<FaultType, FaultStats>,
    /// Current injection counts (wrapped in Mutex for interior mutability)
    injection_counts: Mutex<HashMap<FaultType, u64>>,
}

impl FaultInjector {
    /// Create a new fault injector with the given RNG.
    #[must_use]
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            configs: Vec::new(),
            stats: HashMap::new(),
            injection_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Register a fault configuration.
    ///
    /// Note: Registration must happen before sharing via Arc.
    pub fn register(&mut self, config: FaultConfig) {
        // Precondition
        assert!(
            (0.0..=1.0).contains(&config.probability),
            "probability must be in [0, 1]"
        );

        // Initialize stats for this fault type
        self.stats.entry(config.fault_type).or_default();
        self.injection_counts
            .lock()
            .unwrap()
            .entry(config.fault_type)
            .or_insert(0);

        self.configs.push(config);
    }

    /// Check if a fault should be injected for the given operation.
    ///
    /// Returns the fault type if one should be injected, None otherwise.
    /// Operation names follow the `<verb>_<entity>` convention used by
    /// the backends, so filters can target e.g. all `insert` calls or
    /// all operations touching one entity.
    ///
    /// TigerStyle: Uses interior mutability (Mutex) so can be called on &self,
    /// allowing FaultInjector to be shared via Arc.
    pub fn should_inject(&self, operation: &str) -> Option<FaultType> {
        for config in &self.configs {
            // Check operation filter
            if let Some(ref filter) = config.operation_filter {
                if !operation.contains(filter.as_str()) {
                    continue;
                }
            }

            // Check max injections
            if let Some(max) = config.max_injections {
                let counts = self.injection_counts.lock().unwrap();
                let count = counts.get(&config.fault_type).copied().unwrap_or(0);
                if count >= max {
                    continue;
                }
            }

            // Roll for injection (uses interior mutability)
            let should_inject = {
                let mut rng = self.rng.lock().unwrap();
                rng.next_bool(config.probability)
            };

            if should_inject {
                // Update stats
                if let Some(stats) = self.stats.get(&config.fault_type) {
                    stats.injection_count.fetch_add(1, Ordering::Relaxed);
                }
                {
                    let mut counts = self.injection_counts.lock().unwrap();
                    if let Some(count) = counts.get_mut(&config.fault_type) {
                        *count += 1;
                    }
                }

                return Some(config.fault_type);
            }
        }

        None
    }

    /// Get injection statistics keyed by fault name.
    #[must_use]
    pub fn injection_stats(&self) -> HashMap<String, u64> {
        self.stats
            .iter()
            .map(|(fault_type, stats)| {
                (
                    fault_type.as_str().to_string(),
                    stats.injection_count.load(Ordering::Relaxed),
                )
            })
            .collect()
    }

    /// Get total number of injections.
    #[must_use]
    pub fn total_injections(&self) -> u64 {
        self.stats
            .values()
            .map(|s| s.injection_count.load(Ordering::Relaxed))
            .sum()
    }

    /// Reset all statistics.
    pub fn reset_stats(&self) {
        for stats in self.stats.values() {
            stats.injection_count.store(0, Ordering::Relaxed);
        }
        let mut counts = self.injection_counts.lock().unwrap();
        for count in counts.values_mut() {
            *count = 0;
        }
    }
}

/// Builder for FaultInjector.
///
/// TigerStyle: Builder pattern for clean configuration before sharing via Arc.
pub struct FaultInjectorBuilder {
    rng: DeterministicRng,
    configs: Vec<FaultConfig>,
}

impl FaultInjectorBuilder {
    /// Create a new builder with the given RNG.
    #[must_use]
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            rng,
            configs: Vec::new(),
        }
    }

    /// Add a fault configuration.
    #[must_use]
    pub fn with_fault(mut self, config: FaultConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Add read and write failures.
    #[must_use]
    pub fn with_availability_faults(self, probability: f64) -> Self {
        self.with_fault(FaultConfig::new(FaultType::WriteFail, probability))
            .with_fault(FaultConfig::new(FaultType::ReadFail, probability))
    }

    /// Add backend outages and timeouts.
    #[must_use]
    pub fn with_outage_faults(self, probability: f64) -> Self {
        self.with_fault(FaultConfig::new(FaultType::BackendUnavailable, probability))
            .with_fault(FaultConfig::new(FaultType::OperationTimeout, probability))
    }

    /// Build the FaultInjector.
    #[must_use]
    pub fn build(self) -> FaultInjector {
        let mut injector = FaultInjector::new(self.rng);
        for config in self.configs {
            injector.register(config);
        }
        injector
    }
}
