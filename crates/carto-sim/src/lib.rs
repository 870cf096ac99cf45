//! Carto Sim - simulated engine for deterministic testing
//!
//! # Overview
//!
//! The simulated engine lets the facade be tested without the native engine:
//! - `SimBinding` / `SimEngine`: the engine boundary with real lifecycle rules,
//!   sensor validation, and status codes
//! - `CallProbe`: records every engine entry and detects overlapping calls
//! - `FaultInjector`: lock contention, failure statuses, and latency on demand
//! - `DeterministicRng`: seeded randomness (`DST_SEED`) for reproducible runs
//!
//! # Example
//!
//! ```rust,ignore
//! use carto_sim::{DeterministicRng, FaultInjector, SimBinding};
//!
//! let rng = DeterministicRng::from_env_or_random();
//! let faults = FaultInjector::new(rng).lock_contention(0.1);
//! let binding = SimBinding::new().with_faults(Arc::new(faults));
//! let probe = binding.probe();
//! let facade = CartoFacade::new(binding, config)?;
//! // ... drive the facade, then assert probe.overlaps() == 0
//! ```
//!
//! # TigerStyle
//!
//! - All behavior is deterministic given the same seed and inputs
//! - Always log the seed for reproducibility

pub mod engine;
pub mod fault;
pub mod pcd;
pub mod probe;
pub mod rng;

pub use engine::{
    derive_slam_mode, SimBinding, SimEngine, SimLifecycle, SimSnapshot, SIM_MAP_POINTS_COUNT_MAX,
    SIM_POSE_STEP_MM,
};
pub use fault::{FaultInjector, FaultRule, FaultType, RuleStats};
pub use pcd::{PcdError, Point};
pub use probe::{CallGuard, CallProbe, CallRecord};
pub use rng::{DeterministicRng, SEED_ENV_VAR};
