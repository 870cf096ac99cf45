//! Sensor, pose, and operation types shared by the facade and engine bindings
//!
//! TigerStyle: Explicit validation on construction, immutable values.

use crate::constants::{LIDAR_READING_SIZE_BYTES_MAX, SENSOR_NAME_LENGTH_BYTES_MAX};
use crate::error::{Error, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Operation
// =============================================================================

/// Operation requested of the engine
///
/// Closed set: every facade request carries exactly one of these tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Initialize,
    Start,
    Stop,
    Terminate,
    AddLidarReading,
    AddImuReading,
    GetPosition,
    GetInternalState,
    GetPointCloudMap,
}

impl Operation {
    /// Every operation, in dispatch-table order
    pub const ALL: [Operation; 9] = [
        Operation::Initialize,
        Operation::Start,
        Operation::Stop,
        Operation::Terminate,
        Operation::AddLidarReading,
        Operation::AddImuReading,
        Operation::GetPosition,
        Operation::GetInternalState,
        Operation::GetPointCloudMap,
    ];

    /// Stable name used in logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Initialize => "initialize",
            Operation::Start => "start",
            Operation::Stop => "stop",
            Operation::Terminate => "terminate",
            Operation::AddLidarReading => "add_lidar_reading",
            Operation::AddImuReading => "add_imu_reading",
            Operation::GetPosition => "get_position",
            Operation::GetInternalState => "get_internal_state",
            Operation::GetPointCloudMap => "get_point_cloud_map",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Engine Modes
// =============================================================================

/// Mode the engine settled on during initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlamMode {
    #[default]
    Unknown,
    /// Building a new map
    Mapping,
    /// Localizing against an existing map without modifying it
    Localizing,
    /// Extending an existing map
    Updating,
}

impl SlamMode {
    /// Compact tag for storage in an atomic
    pub fn as_u8(self) -> u8 {
        match self {
            SlamMode::Unknown => 0,
            SlamMode::Mapping => 1,
            SlamMode::Localizing => 2,
            SlamMode::Updating => 3,
        }
    }

    /// Inverse of `as_u8`; unknown tags map to `Unknown`
    pub fn from_u8(tag: u8) -> Self {
        match tag {
            1 => SlamMode::Mapping,
            2 => SlamMode::Localizing,
            3 => SlamMode::Updating,
            _ => SlamMode::Unknown,
        }
    }
}

impl fmt::Display for SlamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlamMode::Unknown => write!(f, "unknown"),
            SlamMode::Mapping => write!(f, "mapping"),
            SlamMode::Localizing => write!(f, "localizing"),
            SlamMode::Updating => write!(f, "updating"),
        }
    }
}

/// Dimensionality of the lidar feeding the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LidarDimension {
    #[default]
    #[serde(rename = "2d")]
    TwoD,
    #[serde(rename = "3d")]
    ThreeD,
}

// =============================================================================
// Pose
// =============================================================================

/// Pose reported by the engine
///
/// Translation in millimeters, orientation as a quaternion, reported against
/// the named component.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,

    pub real: f64,
    pub imag: f64,
    pub jmag: f64,
    pub kmag: f64,

    pub component_reference: String,
}

impl Position {
    /// Pose at the origin with identity orientation
    pub fn origin(component_reference: impl Into<String>) -> Self {
        Self {
            real: 1.0,
            component_reference: component_reference.into(),
            ..Default::default()
        }
    }
}

// =============================================================================
// Sensor Readings
// =============================================================================

fn validate_sensor_name(sensor: &str) -> Result<()> {
    if sensor.is_empty() {
        return Err(Error::InvalidConfiguration {
            field: "sensor".into(),
            reason: "sensor name must not be empty".into(),
        });
    }
    if sensor.len() > SENSOR_NAME_LENGTH_BYTES_MAX {
        return Err(Error::InvalidConfiguration {
            field: "sensor".into(),
            reason: format!(
                "sensor name length {} exceeds limit {}",
                sensor.len(),
                SENSOR_NAME_LENGTH_BYTES_MAX
            ),
        });
    }
    Ok(())
}

/// A raw lidar reading as captured by the sensor
#[derive(Debug, Clone, PartialEq)]
pub struct LidarReading {
    pub sensor: String,
    pub reading: Bytes,
    pub timestamp: DateTime<Utc>,
}

impl LidarReading {
    /// Create a lidar reading, validating the sensor name and reading size
    ///
    /// An empty reading is accepted here; rejecting it is the engine's call.
    pub fn new(
        sensor: impl Into<String>,
        reading: impl Into<Bytes>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let sensor = sensor.into();
        let reading = reading.into();
        validate_sensor_name(&sensor)?;

        if reading.len() > LIDAR_READING_SIZE_BYTES_MAX {
            return Err(Error::InvalidConfiguration {
                field: "reading".into(),
                reason: format!(
                    "reading size {} exceeds limit {}",
                    reading.len(),
                    LIDAR_READING_SIZE_BYTES_MAX
                ),
            });
        }

        Ok(Self {
            sensor,
            reading,
            timestamp,
        })
    }

    /// Capture time as unix milliseconds, the engine's native timestamp unit
    pub fn unix_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// One IMU sample: linear acceleration (m/s^2) and angular velocity (rad/s)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuSample {
    pub lin_acc_x: f64,
    pub lin_acc_y: f64,
    pub lin_acc_z: f64,
    pub ang_vel_x: f64,
    pub ang_vel_y: f64,
    pub ang_vel_z: f64,
}

impl ImuSample {
    /// True when every component is a finite number
    pub fn is_finite(&self) -> bool {
        [
            self.lin_acc_x,
            self.lin_acc_y,
            self.lin_acc_z,
            self.ang_vel_x,
            self.ang_vel_y,
            self.ang_vel_z,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// An IMU reading as captured by the movement sensor
#[derive(Debug, Clone, PartialEq)]
pub struct ImuReading {
    pub sensor: String,
    pub sample: ImuSample,
    pub timestamp: DateTime<Utc>,
}

impl ImuReading {
    /// Create an IMU reading, validating the sensor name
    pub fn new(
        sensor: impl Into<String>,
        sample: ImuSample,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let sensor = sensor.into();
        validate_sensor_name(&sensor)?;
        Ok(Self {
            sensor,
            sample,
            timestamp,
        })
    }

    /// Capture time as unix milliseconds
    pub fn unix_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_operation_names_are_unique() {
        let mut names: Vec<_> = Operation::ALL.iter().map(|op| op.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Operation::ALL.len());
    }

    #[test]
    fn test_slam_mode_tag_roundtrip() {
        for mode in [
            SlamMode::Unknown,
            SlamMode::Mapping,
            SlamMode::Localizing,
            SlamMode::Updating,
        ] {
            assert_eq!(SlamMode::from_u8(mode.as_u8()), mode);
        }
        assert_eq!(SlamMode::from_u8(200), SlamMode::Unknown);
    }

    #[test]
    fn test_lidar_reading_rejects_empty_sensor() {
        let result = LidarReading::new("", Bytes::from_static(b"x"), Utc::now());
        assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_lidar_reading_rejects_long_sensor_name() {
        let name = "l".repeat(SENSOR_NAME_LENGTH_BYTES_MAX + 1);
        assert!(LidarReading::new(name, Bytes::new(), Utc::now()).is_err());
    }

    #[test]
    fn test_lidar_reading_unix_millis() {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let reading = LidarReading::new("lidar0", Bytes::from_static(b"pcd"), ts).unwrap();
        assert_eq!(reading.unix_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_imu_sample_is_finite() {
        let mut sample = ImuSample::default();
        assert!(sample.is_finite());
        sample.ang_vel_z = f64::NAN;
        assert!(!sample.is_finite());
    }

    #[test]
    fn test_position_origin_has_identity_orientation() {
        let pose = Position::origin("camera");
        assert_eq!(pose.real, 1.0);
        assert_eq!(pose.component_reference, "camera");
    }
}
