//! Configuration for the carto facade
//!
//! TigerStyle: Explicit defaults, validation, reasonable limits.

use crate::constants::*;
use crate::error::{Error, Result};
use crate::types::LidarDimension;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for the facade
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FacadeConfig {
    /// Sensors, storage, and mode selection handed to the engine
    #[serde(default)]
    pub engine: EngineConfig,

    /// Algorithm tuning handed to the engine
    #[serde(default)]
    pub algo: AlgoConfig,

    /// Request deadlines
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl FacadeConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.algo.validate()?;
        self.timeouts.validate()?;
        Ok(())
    }
}

/// Engine configuration
///
/// Field checks that need the engine (data directory layout, existing map
/// contents) are left to the engine and surface as engine faults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Name of the lidar the engine maps with
    #[serde(default)]
    pub camera: String,

    /// Name of the IMU / movement sensor, empty when none is attached
    #[serde(default)]
    pub movement_sensor: String,

    /// Interval between map snapshots (seconds)
    #[serde(default = "default_map_rate_sec")]
    pub map_rate_sec: i32,

    /// Directory for persisted maps and internal state
    #[serde(default)]
    pub data_dir: String,

    /// Component the reported pose is relative to (defaults to the camera)
    #[serde(default)]
    pub component_reference: String,

    #[serde(default)]
    pub lidar_config: LidarDimension,

    #[serde(default)]
    pub cloud_story_enabled: bool,

    #[serde(default = "default_enable_mapping")]
    pub enable_mapping: bool,

    /// Path to a previously saved map, empty to start fresh
    #[serde(default)]
    pub existing_map: String,
}

fn default_map_rate_sec() -> i32 {
    MAP_RATE_SEC_DEFAULT
}

fn default_enable_mapping() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            camera: String::new(),
            movement_sensor: String::new(),
            map_rate_sec: default_map_rate_sec(),
            data_dir: String::new(),
            component_reference: String::new(),
            lidar_config: LidarDimension::default(),
            cloud_story_enabled: false,
            enable_mapping: default_enable_mapping(),
            existing_map: String::new(),
        }
    }
}

impl EngineConfig {
    /// Component the engine reports poses against
    pub fn pose_reference(&self) -> &str {
        if self.component_reference.is_empty() {
            &self.camera
        } else {
            &self.component_reference
        }
    }

    fn validate(&self) -> Result<()> {
        if self.camera.len() > SENSOR_NAME_LENGTH_BYTES_MAX {
            return Err(Error::InvalidConfiguration {
                field: "engine.camera".into(),
                reason: format!(
                    "length {} exceeds limit {}",
                    self.camera.len(),
                    SENSOR_NAME_LENGTH_BYTES_MAX
                ),
            });
        }

        if self.movement_sensor.len() > SENSOR_NAME_LENGTH_BYTES_MAX {
            return Err(Error::InvalidConfiguration {
                field: "engine.movement_sensor".into(),
                reason: format!(
                    "length {} exceeds limit {}",
                    self.movement_sensor.len(),
                    SENSOR_NAME_LENGTH_BYTES_MAX
                ),
            });
        }

        if self.map_rate_sec > MAP_RATE_SEC_MAX {
            return Err(Error::InvalidConfiguration {
                field: "engine.map_rate_sec".into(),
                reason: format!("{} exceeds limit {}", self.map_rate_sec, MAP_RATE_SEC_MAX),
            });
        }

        Ok(())
    }
}

/// Algorithm tuning parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgoConfig {
    pub optimize_on_start: bool,
    pub optimize_every_n_nodes: i32,
    pub num_range_data: i32,
    pub missing_data_ray_length: f32,
    pub max_range: f32,
    pub min_range: f32,
    pub use_imu_data: bool,
    pub max_submaps_to_keep: i32,
    pub fresh_submaps_count: i32,
    pub min_covered_area: f64,
    pub min_added_submaps_count: i32,
    pub occupied_space_weight: f64,
    pub translation_weight: f64,
    pub rotation_weight: f64,
}

impl Default for AlgoConfig {
    fn default() -> Self {
        Self {
            optimize_on_start: false,
            optimize_every_n_nodes: 3,
            num_range_data: 30,
            missing_data_ray_length: 25.0,
            max_range: 25.0,
            min_range: 0.2,
            use_imu_data: false,
            max_submaps_to_keep: 3,
            fresh_submaps_count: 3,
            min_covered_area: 1.0,
            min_added_submaps_count: 1,
            occupied_space_weight: 20.0,
            translation_weight: 10.0,
            rotation_weight: 1.0,
        }
    }
}

impl AlgoConfig {
    fn validate(&self) -> Result<()> {
        if !(self.min_range >= 0.0 && self.min_range < self.max_range) {
            return Err(Error::InvalidConfiguration {
                field: "algo.min_range".into(),
                reason: format!(
                    "must be non-negative and below max_range ({} >= {})",
                    self.min_range, self.max_range
                ),
            });
        }

        if self.optimize_every_n_nodes < 0 {
            return Err(Error::InvalidConfiguration {
                field: "algo.optimize_every_n_nodes".into(),
                reason: "must not be negative".into(),
            });
        }

        if self.num_range_data <= 0 {
            return Err(Error::InvalidConfiguration {
                field: "algo.num_range_data".into(),
                reason: "must be positive".into(),
            });
        }

        Ok(())
    }
}

/// Request deadlines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Deadline for initialization (milliseconds)
    #[serde(default = "default_initialize_timeout_ms")]
    pub initialize_ms: u64,

    /// Deadline for every other request (milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_ms: u64,
}

fn default_initialize_timeout_ms() -> u64 {
    INITIALIZE_TIMEOUT_MS_DEFAULT
}

fn default_request_timeout_ms() -> u64 {
    REQUEST_TIMEOUT_MS_DEFAULT
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            initialize_ms: default_initialize_timeout_ms(),
            request_ms: default_request_timeout_ms(),
        }
    }
}

impl TimeoutConfig {
    /// Deadline for initialization
    pub fn initialize(&self) -> Duration {
        Duration::from_millis(self.initialize_ms)
    }

    /// Deadline for every other request
    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("timeouts.initialize_ms", self.initialize_ms),
            ("timeouts.request_ms", self.request_ms),
        ] {
            if value == 0 {
                return Err(Error::InvalidConfiguration {
                    field: field.into(),
                    reason: "must be positive".into(),
                });
            }
            if value > REQUEST_TIMEOUT_MS_MAX {
                return Err(Error::InvalidConfiguration {
                    field: field.into(),
                    reason: format!("{} exceeds limit {}", value, REQUEST_TIMEOUT_MS_MAX),
                });
            }
        }
        Ok(())
    }
}
