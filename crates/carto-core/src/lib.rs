//! Carto Core
//!
//! Core types, errors, status codes, and engine traits for the carto facade.
//!
//! # Overview
//!
//! The carto facade serializes access to a SLAM engine that is not safe for
//! concurrent use. This crate holds everything the facade and engine bindings
//! share: the operation and sensor types, the engine status catalogue and its
//! classification, the facade error type, configuration, and the binding
//! traits an engine implements.
//!
//! # TigerStyle
//!
//! This crate follows [TigerStyle](https://github.com/tigerbeetle/tigerbeetle/blob/main/docs/TIGER_STYLE.md)
//! engineering principles:
//! - Safety > Performance > Developer Experience
//! - Explicit limits with big-endian naming (e.g., `SENSOR_NAME_LENGTH_BYTES_MAX`)
//! - Total mappings over closed sets (every status classifies)

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod status;
pub mod telemetry;
pub mod types;

pub use config::{AlgoConfig, EngineConfig, FacadeConfig, TimeoutConfig};
pub use constants::*;
pub use engine::{Engine, EngineBinding, EngineResult};
pub use error::{Error, Result, Stage};
pub use status::{classify, Classification, EngineStatus, FaultKind};
pub use telemetry::{init_telemetry, LogOutput, TelemetryConfig};
pub use types::{
    ImuReading, ImuSample, LidarDimension, LidarReading, Operation, Position, SlamMode,
};
