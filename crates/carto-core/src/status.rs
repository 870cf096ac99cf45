//! Engine status codes and their classification
//!
//! TigerStyle: Closed catalogue, total classification, no string matching.
//!
//! Every engine call reports a status. `classify` maps each status onto one of
//! three outcomes: success, lock contention (retriable by the caller), or a
//! fault of a known kind. Codes outside the catalogue become
//! `EngineStatus::Unrecognized` and classify as `FaultKind::Unclassified`.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// EngineStatus
// =============================================================================

/// Status reported by the engine binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineStatus {
    Success,
    UnableToAcquireLock,
    HandleInvalid,
    OutOfMemory,
    DestructorError,
    LibPlatformInvalid,
    LibInvalid,
    LibNotInitialized,
    UnknownError,
    DataDirNotProvided,
    SlamModeInvalid,
    LidarConfigInvalid,
    MapRateSecInvalid,
    ComponentReferenceInvalid,
    LuaConfigNotFound,
    DataDirInvalidDeprecatedStructure,
    DataDirFileSystemError,
    MapCreationError,
    UnknownSensorName,
    LidarReadingEmpty,
    LidarReadingInvalid,
    GetPositionResponseInvalid,
    PointCloudMapEmpty,
    GetPointCloudMapResponseInvalid,
    LibAlreadyInitialized,
    GetInternalStateResponseInvalid,
    GetInternalStateFileWriteIoError,
    GetInternalStateFileReadIoError,
    NotInInitializedState,
    NotInIoInitializedState,
    NotInStartedState,
    NotInTerminatableState,
    ImuConfigInvalid,
    ImuReadingEmpty,
    ImuReadingInvalid,
    /// A code the catalogue does not know about
    Unrecognized(i32),
}

impl EngineStatus {
    /// Every catalogued status (excludes `Unrecognized`)
    pub const CATALOGUE: [EngineStatus; 35] = [
        EngineStatus::Success,
        EngineStatus::UnableToAcquireLock,
        EngineStatus::HandleInvalid,
        EngineStatus::OutOfMemory,
        EngineStatus::DestructorError,
        EngineStatus::LibPlatformInvalid,
        EngineStatus::LibInvalid,
        EngineStatus::LibNotInitialized,
        EngineStatus::UnknownError,
        EngineStatus::DataDirNotProvided,
        EngineStatus::SlamModeInvalid,
        EngineStatus::LidarConfigInvalid,
        EngineStatus::MapRateSecInvalid,
        EngineStatus::ComponentReferenceInvalid,
        EngineStatus::LuaConfigNotFound,
        EngineStatus::DataDirInvalidDeprecatedStructure,
        EngineStatus::DataDirFileSystemError,
        EngineStatus::MapCreationError,
        EngineStatus::UnknownSensorName,
        EngineStatus::LidarReadingEmpty,
        EngineStatus::LidarReadingInvalid,
        EngineStatus::GetPositionResponseInvalid,
        EngineStatus::PointCloudMapEmpty,
        EngineStatus::GetPointCloudMapResponseInvalid,
        EngineStatus::LibAlreadyInitialized,
        EngineStatus::GetInternalStateResponseInvalid,
        EngineStatus::GetInternalStateFileWriteIoError,
        EngineStatus::GetInternalStateFileReadIoError,
        EngineStatus::NotInInitializedState,
        EngineStatus::NotInIoInitializedState,
        EngineStatus::NotInStartedState,
        EngineStatus::NotInTerminatableState,
        EngineStatus::ImuConfigInvalid,
        EngineStatus::ImuReadingEmpty,
        EngineStatus::ImuReadingInvalid,
    ];

    /// Decode a native status code. Never fails.
    pub fn from_code(code: i32) -> Self {
        usize::try_from(code)
            .ok()
            .and_then(|index| Self::CATALOGUE.get(index).copied())
            .unwrap_or(EngineStatus::Unrecognized(code))
    }

    /// Native status code
    pub fn code(&self) -> i32 {
        match self {
            EngineStatus::Unrecognized(code) => *code,
            known => Self::CATALOGUE
                .iter()
                .position(|s| s == known)
                .map(|index| index as i32)
                .unwrap_or(-1),
        }
    }

    /// Native status name
    pub fn name(&self) -> &'static str {
        match self {
            EngineStatus::Success => "SUCCESS",
            EngineStatus::UnableToAcquireLock => "UNABLE_TO_ACQUIRE_LOCK",
            EngineStatus::HandleInvalid => "VC_INVALID",
            EngineStatus::OutOfMemory => "OUT_OF_MEMORY",
            EngineStatus::DestructorError => "DESTRUCTOR_ERROR",
            EngineStatus::LibPlatformInvalid => "LIB_PLATFORM_INVALID",
            EngineStatus::LibInvalid => "LIB_INVALID",
            EngineStatus::LibNotInitialized => "LIB_NOT_INITIALIZED",
            EngineStatus::UnknownError => "UNKNOWN_ERROR",
            EngineStatus::DataDirNotProvided => "DATA_DIR_NOT_PROVIDED",
            EngineStatus::SlamModeInvalid => "SLAM_MODE_INVALID",
            EngineStatus::LidarConfigInvalid => "LIDAR_CONFIG_INVALID",
            EngineStatus::MapRateSecInvalid => "MAP_RATE_SEC_INVALID",
            EngineStatus::ComponentReferenceInvalid => "COMPONENT_REFERENCE_INVALID",
            EngineStatus::LuaConfigNotFound => "LUA_CONFIG_NOT_FOUND",
            EngineStatus::DataDirInvalidDeprecatedStructure => {
                "DATA_DIR_INVALID_DEPRECATED_STRUCTURE"
            }
            EngineStatus::DataDirFileSystemError => "DATA_DIR_FILE_SYSTEM_ERROR",
            EngineStatus::MapCreationError => "MAP_CREATION_ERROR",
            EngineStatus::UnknownSensorName => "UNKNOWN_SENSOR_NAME",
            EngineStatus::LidarReadingEmpty => "LIDAR_READING_EMPTY",
            EngineStatus::LidarReadingInvalid => "LIDAR_READING_INVALID",
            EngineStatus::GetPositionResponseInvalid => "GET_POSITION_RESPONSE_INVALID",
            EngineStatus::PointCloudMapEmpty => "POINTCLOUD_MAP_EMPTY",
            EngineStatus::GetPointCloudMapResponseInvalid => {
                "GET_POINT_CLOUD_MAP_RESPONSE_INVALID"
            }
            EngineStatus::LibAlreadyInitialized => "LIB_ALREADY_INITIALIZED",
            EngineStatus::GetInternalStateResponseInvalid => {
                "GET_INTERNAL_STATE_RESPONSE_INVALID"
            }
            EngineStatus::GetInternalStateFileWriteIoError => {
                "GET_INTERNAL_STATE_FILE_WRITE_IO_ERROR"
            }
            EngineStatus::GetInternalStateFileReadIoError => {
                "GET_INTERNAL_STATE_FILE_READ_IO_ERROR"
            }
            EngineStatus::NotInInitializedState => "NOT_IN_INITIALIZED_STATE",
            EngineStatus::NotInIoInitializedState => "NOT_IN_IO_INITIALIZED_STATE",
            EngineStatus::NotInStartedState => "NOT_IN_STARTED_STATE",
            EngineStatus::NotInTerminatableState => "NOT_IN_TERMINATABLE_STATE",
            EngineStatus::ImuConfigInvalid => "IMU_CONFIG_INVALID",
            EngineStatus::ImuReadingEmpty => "IMU_READING_EMPTY",
            EngineStatus::ImuReadingInvalid => "IMU_READING_INVALID",
            EngineStatus::Unrecognized(_) => "UNRECOGNIZED",
        }
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineStatus::Unrecognized(code) => write!(f, "UNRECOGNIZED({})", code),
            known => f.write_str(known.name()),
        }
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Kind of engine-side failure
///
/// Faults are generally not retriable without caller intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    InvalidConfiguration,
    InvalidLidarConfiguration,
    InvalidImuConfiguration,
    OutOfMemory,
    /// The engine is not in the lifecycle state the operation requires
    InvalidLifecycleState,
    /// Sensor reading was empty or could not be parsed
    InvalidSensorReading,
    MapCreationFailed,
    /// Reading or writing persisted engine state failed
    PersistedStateIo,
    UnknownSensorName,
    Unclassified,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FaultKind::InvalidConfiguration => "invalid configuration",
            FaultKind::InvalidLidarConfiguration => "invalid lidar configuration",
            FaultKind::InvalidImuConfiguration => "invalid imu configuration",
            FaultKind::OutOfMemory => "out of memory",
            FaultKind::InvalidLifecycleState => "not in expected lifecycle state",
            FaultKind::InvalidSensorReading => "invalid sensor reading",
            FaultKind::MapCreationFailed => "map creation failed",
            FaultKind::PersistedStateIo => "persisted state io failure",
            FaultKind::UnknownSensorName => "unknown sensor name",
            FaultKind::Unclassified => "unclassified",
        };
        f.write_str(text)
    }
}

/// Outcome of classifying an engine status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    /// The engine could not currently be entered; callers may back off and retry
    LockUnavailable,
    Fault(FaultKind),
}

/// Classify an engine status. Total: every status maps to exactly one outcome.
pub fn classify(status: EngineStatus) -> Classification {
    use Classification::{Fault, LockUnavailable, Success};
    use EngineStatus as S;

    match status {
        S::Success => Success,
        S::UnableToAcquireLock => LockUnavailable,

        S::LibPlatformInvalid
        | S::LibInvalid
        | S::DataDirNotProvided
        | S::SlamModeInvalid
        | S::MapRateSecInvalid
        | S::ComponentReferenceInvalid
        | S::LuaConfigNotFound
        | S::DataDirInvalidDeprecatedStructure => Fault(FaultKind::InvalidConfiguration),

        S::LidarConfigInvalid => Fault(FaultKind::InvalidLidarConfiguration),
        S::ImuConfigInvalid => Fault(FaultKind::InvalidImuConfiguration),
        S::OutOfMemory => Fault(FaultKind::OutOfMemory),

        S::HandleInvalid
        | S::LibNotInitialized
        | S::LibAlreadyInitialized
        | S::NotInInitializedState
        | S::NotInIoInitializedState
        | S::NotInStartedState
        | S::NotInTerminatableState => Fault(FaultKind::InvalidLifecycleState),

        S::LidarReadingEmpty
        | S::LidarReadingInvalid
        | S::ImuReadingEmpty
        | S::ImuReadingInvalid => Fault(FaultKind::InvalidSensorReading),

        S::MapCreationError | S::PointCloudMapEmpty => Fault(FaultKind::MapCreationFailed),

        S::DataDirFileSystemError
        | S::GetInternalStateFileWriteIoError
        | S::GetInternalStateFileReadIoError => Fault(FaultKind::PersistedStateIo),

        S::UnknownSensorName => Fault(FaultKind::UnknownSensorName),

        S::DestructorError
        | S::UnknownError
        | S::GetPositionResponseInvalid
        | S::GetPointCloudMapResponseInvalid
        | S::GetInternalStateResponseInvalid
        | S::Unrecognized(_) => Fault(FaultKind::Unclassified),
    }
}
