//! Seeded randomness for simulation runs
//!
//! Every random decision a simulation makes (fault triggers, injected
//! latency, generated scans) draws from one ChaCha20 stream, so a run is
//! replayed exactly by exporting its seed in `DST_SEED`.

use crate::pcd::Point;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Environment variable holding the seed to replay
pub const SEED_ENV_VAR: &str = "DST_SEED";

/// Seeded random source shared by everything in one simulation run
///
/// Clones draw from the same stream.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    seed: u64,
    stream: Arc<Mutex<ChaCha20Rng>>,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            stream: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
        }
    }

    /// Seed from `DST_SEED`, or pick a fresh one
    ///
    /// The seed is logged either way so a failing run can be replayed.
    pub fn from_env_or_random() -> Self {
        let replayed = std::env::var(SEED_ENV_VAR)
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok());
        let seed = replayed.unwrap_or_else(rand::random);

        tracing::info!(
            seed,
            replayed = replayed.is_some(),
            "Simulation seed ({}={} to replay)",
            SEED_ENV_VAR,
            seed
        );
        Self::new(seed)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    // A poisoned lock still holds a usable stream.
    fn lock(&self) -> MutexGuard<'_, ChaCha20Rng> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True with the given probability, clamped to `[0, 1]`
    pub fn chance(&self, probability: f64) -> bool {
        if probability.is_nan() {
            return false;
        }
        self.lock().gen_bool(probability.clamp(0.0, 1.0))
    }

    /// A duration between `min_ms` and `max_ms`, both inclusive
    pub fn millis_between(&self, min_ms: u64, max_ms: u64) -> Duration {
        if max_ms <= min_ms {
            return Duration::from_millis(min_ms);
        }
        Duration::from_millis(self.lock().gen_range(min_ms..=max_ms))
    }

    /// A lidar-like scan of `count` points within `extent_mm` of the origin
    ///
    /// Points lie in the horizontal plane, as a 2D lidar reports them.
    pub fn scan(&self, count: usize, extent_mm: f32) -> Vec<Point> {
        let extent_mm = extent_mm.abs().max(f32::EPSILON);
        let mut stream = self.lock();
        (0..count)
            .map(|_| {
                [
                    stream.gen_range(-extent_mm..extent_mm),
                    stream.gen_range(-extent_mm..extent_mm),
                    0.0,
                ]
            })
            .collect()
    }
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}
