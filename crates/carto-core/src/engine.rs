//! Engine binding traits
//!
//! TigerStyle: Synchronous, single-owner engine access.
//!
//! The engine is not safe for concurrent use. The facade moves the engine
//! onto its worker thread and calls it from there only, so these traits need
//! `Send` but not `Sync`, and every method is a plain blocking call.

use crate::config::{AlgoConfig, EngineConfig};
use crate::status::EngineStatus;
use crate::types::{ImuReading, LidarReading, Position, SlamMode};
use bytes::Bytes;

/// Result of an engine call; the error carries the engine's status code
pub type EngineResult<T> = std::result::Result<T, EngineStatus>;

/// Factory for engine instances
///
/// Held by the worker until the first successful `initialize`. A failed
/// initialization leaves the binding in place so it can be retried.
pub trait EngineBinding: Send + 'static {
    /// Engine handle produced by a successful initialization
    type Engine: Engine;

    /// Create and configure an engine
    ///
    /// Mode selection (mapping, localizing, updating) is derived by the
    /// engine from `config` and reported through [`Engine::slam_mode`].
    fn initialize(
        &mut self,
        config: &EngineConfig,
        algo: &AlgoConfig,
    ) -> EngineResult<Self::Engine>;
}

/// A live engine handle
///
/// Lifecycle is enforced by the engine itself: calls made in the wrong
/// state fail with `NotInInitializedState`, `NotInStartedState`, or
/// `NotInTerminatableState`.
pub trait Engine: Send + 'static {
    /// Mode selected during initialization
    fn slam_mode(&self) -> SlamMode;

    /// Begin consuming sensor data
    fn start(&mut self) -> EngineResult<()>;

    /// Stop consuming sensor data and flush pending work
    fn stop(&mut self) -> EngineResult<()>;

    /// Release engine resources; the handle is dropped after success
    fn terminate(&mut self) -> EngineResult<()>;

    fn add_lidar_reading(&mut self, reading: &LidarReading) -> EngineResult<()>;

    fn add_imu_reading(&mut self, reading: &ImuReading) -> EngineResult<()>;

    /// Latest pose estimate
    fn position(&mut self) -> EngineResult<Position>;

    /// Serialized engine state, suitable for persisting
    fn internal_state(&mut self) -> EngineResult<Bytes>;

    /// Current map as PCD bytes
    fn point_cloud_map(&mut self) -> EngineResult<Bytes>;
}
