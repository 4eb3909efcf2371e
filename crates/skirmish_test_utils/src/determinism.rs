//! Determinism testing utilities.
//!
//! A harness for verifying that the simulation produces identical results
//! given identical inputs.
//!
//! # Testing Strategy
//!
//! The simulation must be 100% reproducible from a seed. Sources of
//! non-determinism to guard against:
//!
//! - **Floating-point math**: never used; fractional scores are
//!   fixed-point.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   All processing iterates in sorted unit-id order, and the state hash
//!   sorts set contents before hashing.
//!
//! - **System randomness**: every random choice flows through the seeded
//!   [`skirmish_core::rng::SimRng`].
//!
//! # Test Levels
//!
//! 1. **Unit tests**: individual planner/combat determinism
//! 2. **Property tests**: random inputs still produce deterministic outputs
//! 3. **Integration tests**: full scenarios are reproducible
//! 4. **Parallel tests**: N simulations running concurrently all match

use std::thread;

use skirmish_core::simulation::SimulationWorld;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Final state hash from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated per run.
    pub ticks: u64,
}

impl DeterminismResult {
    /// All unique hashes (length 1 for a deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed
    /// error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Build a fresh world with `build` and run it `runs` times for `ticks`
/// ticks of `dt_ms`, comparing final state hashes.
pub fn verify_determinism<F>(build: F, runs: usize, ticks: u64, dt_ms: u64) -> DeterminismResult
where
    F: Fn() -> SimulationWorld,
{
    let hashes: Vec<u64> = (0..runs)
        .map(|_| {
            let mut world = build();
            for _ in 0..ticks {
                world.tick(dt_ms);
            }
            world.state_hash()
        })
        .collect();
    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);
    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Like [`verify_determinism`], but each run executes on its own thread,
/// which catches accidental dependence on ambient global state.
pub fn verify_determinism_parallel<F>(
    build: F,
    runs: usize,
    ticks: u64,
    dt_ms: u64,
) -> DeterminismResult
where
    F: Fn() -> SimulationWorld + Send + Sync,
{
    let hashes: Vec<u64> = thread::scope(|scope| {
        let handles: Vec<_> = (0..runs)
            .map(|_| {
                scope.spawn(|| {
                    let mut world = build();
                    for _ in 0..ticks {
                        world.tick(dt_ms);
                    }
                    world.state_hash()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("simulation thread panicked"))
            .collect()
    });
    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);
    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}
