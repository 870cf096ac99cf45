//! Simulated SLAM engine
//!
//! TigerStyle: Deterministic behavior, explicit lifecycle, every call probed.
//!
//! `SimEngine` behaves like the native engine at its boundary: the same
//! lifecycle rules, the same sensor validation, the same status codes. Its
//! "mapping" is bookkeeping: lidar points are accumulated into a cloud and
//! the pose advances by a fixed step per lidar reading, so every run with the
//! same inputs produces the same outputs.

use crate::fault::{FaultInjector, FaultType};
use crate::pcd::{self, Point};
use crate::probe::CallProbe;
use bytes::Bytes;
use carto_core::config::{AlgoConfig, EngineConfig};
use carto_core::engine::{Engine, EngineBinding, EngineResult};
use carto_core::status::EngineStatus;
use carto_core::types::{ImuReading, LidarReading, Operation, Position, SlamMode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Pose advance per accepted lidar reading (millimeters along x)
pub const SIM_POSE_STEP_MM: f64 = 10.0;

/// Maximum points kept in the simulated map
pub const SIM_MAP_POINTS_COUNT_MAX: usize = 1_000_000;

/// Lifecycle of a simulated engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimLifecycle {
    Initialized,
    Started,
    Terminated,
}

/// Serialized form returned as internal state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimSnapshot {
    pub mode: SlamMode,
    pub lifecycle: SimLifecycle,
    pub lidar_readings: u64,
    pub imu_readings: u64,
    pub map_points: usize,
    pub last_reading_unix_ms: Option<i64>,
    pub position: Position,
}

/// Select the mode a configuration asks for
pub fn derive_slam_mode(config: &EngineConfig) -> EngineResult<SlamMode> {
    match (config.existing_map.is_empty(), config.enable_mapping) {
        (true, true) => Ok(SlamMode::Mapping),
        (false, true) => Ok(SlamMode::Updating),
        (false, false) => Ok(SlamMode::Localizing),
        (true, false) => Err(EngineStatus::SlamModeInvalid),
    }
}

/// Binding that creates simulated engines
#[derive(Clone)]
pub struct SimBinding {
    probe: Arc<CallProbe>,
    faults: Option<Arc<FaultInjector>>,
    call_delay: Duration,
}

impl SimBinding {
    pub fn new() -> Self {
        Self {
            probe: Arc::new(CallProbe::new()),
            faults: None,
            call_delay: Duration::ZERO,
        }
    }

    /// Report calls into an existing probe
    pub fn with_probe(mut self, probe: Arc<CallProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Consult `faults` on every engine call
    pub fn with_faults(mut self, faults: Arc<FaultInjector>) -> Self {
        self.faults = Some(faults);
        self
    }

    /// Make every engine call block for `delay`
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    /// The probe every engine from this binding reports into
    pub fn probe(&self) -> Arc<CallProbe> {
        self.probe.clone()
    }
}

impl Default for SimBinding {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBinding for SimBinding {
    type Engine = SimEngine;

    fn initialize(&mut self, config: &EngineConfig, algo: &AlgoConfig) -> EngineResult<SimEngine> {
        let _call = self.probe.enter(Operation::Initialize);
        pause(self.call_delay);
        inject(self.faults.as_deref(), Operation::Initialize)?;

        if config.data_dir.is_empty() {
            return Err(EngineStatus::DataDirNotProvided);
        }
        if config.map_rate_sec < 0 {
            return Err(EngineStatus::MapRateSecInvalid);
        }
        if config.pose_reference().is_empty() {
            return Err(EngineStatus::ComponentReferenceInvalid);
        }
        if algo.use_imu_data && config.movement_sensor.is_empty() {
            return Err(EngineStatus::ImuConfigInvalid);
        }
        let mode = derive_slam_mode(config)?;

        tracing::debug!(%mode, camera = %config.camera, "Simulated engine created");

        Ok(SimEngine {
            config: config.clone(),
            mode,
            lifecycle: SimLifecycle::Initialized,
            points: Vec::new(),
            position: Position::origin(config.pose_reference()),
            lidar_readings: 0,
            imu_readings: 0,
            last_reading_unix_ms: None,
            probe: self.probe.clone(),
            faults: self.faults.clone(),
            call_delay: self.call_delay,
        })
    }
}

/// A simulated engine handle
pub struct SimEngine {
    config: EngineConfig,
    mode: SlamMode,
    lifecycle: SimLifecycle,
    points: Vec<Point>,
    position: Position,
    lidar_readings: u64,
    imu_readings: u64,
    last_reading_unix_ms: Option<i64>,
    probe: Arc<CallProbe>,
    faults: Option<Arc<FaultInjector>>,
    call_delay: Duration,
}

impl SimEngine {
    /// Current lifecycle state
    pub fn lifecycle(&self) -> SimLifecycle {
        self.lifecycle
    }

    fn before(&self, operation: Operation) -> EngineResult<()> {
        pause(self.call_delay);
        inject(self.faults.as_deref(), operation)
    }

    fn require_live(&self) -> EngineResult<()> {
        match self.lifecycle {
            SimLifecycle::Initialized | SimLifecycle::Started => Ok(()),
            SimLifecycle::Terminated => Err(EngineStatus::NotInInitializedState),
        }
    }

    fn snapshot(&self) -> SimSnapshot {
        SimSnapshot {
            mode: self.mode,
            lifecycle: self.lifecycle,
            lidar_readings: self.lidar_readings,
            imu_readings: self.imu_readings,
            map_points: self.points.len(),
            last_reading_unix_ms: self.last_reading_unix_ms,
            position: self.position.clone(),
        }
    }
}

impl Engine for SimEngine {
    fn slam_mode(&self) -> SlamMode {
        self.mode
    }

    fn start(&mut self) -> EngineResult<()> {
        let _call = self.probe.enter(Operation::Start);
        self.before(Operation::Start)?;

        if self.lifecycle != SimLifecycle::Initialized {
            return Err(EngineStatus::NotInInitializedState);
        }
        self.lifecycle = SimLifecycle::Started;
        Ok(())
    }

    fn stop(&mut self) -> EngineResult<()> {
        let _call = self.probe.enter(Operation::Stop);
        self.before(Operation::Stop)?;

        if self.lifecycle != SimLifecycle::Started {
            return Err(EngineStatus::NotInStartedState);
        }
        self.lifecycle = SimLifecycle::Initialized;
        Ok(())
    }

    fn terminate(&mut self) -> EngineResult<()> {
        let _call = self.probe.enter(Operation::Terminate);
        self.before(Operation::Terminate)?;

        match self.lifecycle {
            SimLifecycle::Started => Err(EngineStatus::NotInTerminatableState),
            SimLifecycle::Terminated => Err(EngineStatus::NotInInitializedState),
            SimLifecycle::Initialized => {
                self.lifecycle = SimLifecycle::Terminated;
                Ok(())
            }
        }
    }

    fn add_lidar_reading(&mut self, reading: &LidarReading) -> EngineResult<()> {
        let _call = self.probe.enter(Operation::AddLidarReading);
        self.before(Operation::AddLidarReading)?;
        self.require_live()?;

        if reading.reading.is_empty() {
            return Err(EngineStatus::LidarReadingEmpty);
        }
        if reading.sensor != self.config.camera {
            return Err(EngineStatus::UnknownSensorName);
        }
        let points = pcd::decode(&reading.reading).map_err(|e| {
            tracing::debug!(error = %e, "Rejecting lidar reading");
            EngineStatus::LidarReadingInvalid
        })?;

        if self.mode != SlamMode::Localizing {
            let room = SIM_MAP_POINTS_COUNT_MAX.saturating_sub(self.points.len());
            self.points.extend(points.into_iter().take(room));
        }
        self.lidar_readings += 1;
        self.last_reading_unix_ms = Some(reading.unix_millis());
        self.position.x = self.lidar_readings as f64 * SIM_POSE_STEP_MM;
        Ok(())
    }

    fn add_imu_reading(&mut self, reading: &ImuReading) -> EngineResult<()> {
        let _call = self.probe.enter(Operation::AddImuReading);
        self.before(Operation::AddImuReading)?;
        self.require_live()?;

        if self.config.movement_sensor.is_empty() {
            return Err(EngineStatus::ImuConfigInvalid);
        }
        if reading.sensor != self.config.movement_sensor {
            return Err(EngineStatus::UnknownSensorName);
        }
        if !reading.sample.is_finite() {
            return Err(EngineStatus::ImuReadingInvalid);
        }

        self.imu_readings += 1;
        self.last_reading_unix_ms = Some(reading.unix_millis());
        Ok(())
    }

    fn position(&mut self) -> EngineResult<Position> {
        let _call = self.probe.enter(Operation::GetPosition);
        self.before(Operation::GetPosition)?;
        self.require_live()?;
        Ok(self.position.clone())
    }

    fn internal_state(&mut self) -> EngineResult<Bytes> {
        let _call = self.probe.enter(Operation::GetInternalState);
        self.before(Operation::GetInternalState)?;
        self.require_live()?;

        serde_json::to_vec(&self.snapshot())
            .map(Bytes::from)
            .map_err(|_| EngineStatus::GetInternalStateResponseInvalid)
    }

    fn point_cloud_map(&mut self) -> EngineResult<Bytes> {
        let _call = self.probe.enter(Operation::GetPointCloudMap);
        self.before(Operation::GetPointCloudMap)?;
        self.require_live()?;

        if self.points.is_empty() {
            return Err(EngineStatus::PointCloudMapEmpty);
        }
        Ok(pcd::encode(&self.points))
    }
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}

fn inject(faults: Option<&FaultInjector>, operation: Operation) -> EngineResult<()> {
    let Some(faults) = faults else {
        return Ok(());
    };

    match faults.draw(operation) {
        None => Ok(()),
        Some(FaultType::LockUnavailable) => Err(EngineStatus::UnableToAcquireLock),
        Some(FaultType::Status(status)) => Err(status),
        Some(FaultType::Latency { min_ms, max_ms }) => {
            std::thread::sleep(faults.stall(min_ms, max_ms));
            Ok(())
        }
    }
}
