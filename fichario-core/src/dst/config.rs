//! SimConfig - Simulation Configuration
//!
//! TigerStyle: Seed management for deterministic testing.

use rand::Rng;
use std::env;

use super::rng::DeterministicRng;
use crate::constants::DST_SIMULATION_STEPS_MAX;

/// Configuration for a simulation run.
///
/// TigerStyle:
/// - Immutable after creation
/// - Seed logged for reproducibility
/// - All limits explicit
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    /// Random seed for deterministic execution
    seed: u64,
    /// Maximum number of simulation steps
    steps_max: u64,
}

impl SimConfig {
    /// Create config with explicit seed.
    ///
    /// # Example
    /// ```
    /// use fichario_core::dst::SimConfig;
    /// let config = SimConfig::with_seed(12345);
    /// assert_eq!(config.seed(), 12345);
    /// ```
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        // Postcondition
        let config = Self {
            seed,
            steps_max: DST_SIMULATION_STEPS_MAX,
        };
        assert_eq!(config.seed, seed, "seed must be stored correctly");
        assert!(config.steps_max > 0, "steps_max must be positive");
        config
    }

    /// Create config from DST_SEED env var or random.
    ///
    /// If DST_SEED is set, uses that value.
    /// Otherwise, generates a random seed and prints it for reproducibility.
    ///
    /// # Panics
    /// Panics if DST_SEED is set but does not parse as u64.
    #[must_use]
    pub fn from_env_or_random() -> Self {
        let seed = match env::var("DST_SEED") {
            Ok(seed_str) => {
                // Precondition: DST_SEED must be valid u64
                seed_str.parse::<u64>().unwrap_or_else(|_| {
                    panic!("DST_SEED must be a valid u64, got: {}", seed_str);
                })
            }
            Err(_) => {
                let seed = rand::thread_rng().gen::<u64>();
                eprintln!("DST: Generated random seed (replay with DST_SEED={})", seed);
                seed
            }
        };

        Self::with_seed(seed)
    }

    /// Get the seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Get the maximum number of steps.
    #[must_use]
    pub fn steps_max(&self) -> u64 {
        self.steps_max
    }

    /// Create a new config with a different steps_max.
    ///
    /// # Panics
    /// Panics if steps_max is zero.
    #[must_use]
    pub fn with_steps_max(self, steps_max: u64) -> Self {
        // Precondition
        assert!(steps_max > 0, "steps_max must be positive");

        Self {
            seed: self.seed,
            steps_max,
        }
    }

    /// Create the root RNG for a run of this simulation.
    #[must_use]
    pub fn rng(&self) -> DeterministicRng {
        DeterministicRng::new(self.seed)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::from_env_or_random()
    }
}
