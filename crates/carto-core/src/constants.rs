//! TigerStyle constants for the carto facade
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Request Limits
// =============================================================================

/// Default deadline for a facade request in milliseconds (5 sec)
pub const REQUEST_TIMEOUT_MS_DEFAULT: u64 = 5 * 1000;

/// Default deadline for engine initialization in milliseconds (30 sec)
///
/// Initialization may load an existing map from the data directory.
pub const INITIALIZE_TIMEOUT_MS_DEFAULT: u64 = 30 * 1000;

/// Maximum deadline accepted for any facade request in milliseconds (10 min)
pub const REQUEST_TIMEOUT_MS_MAX: u64 = 10 * 60 * 1000;

// =============================================================================
// Sensor Limits
// =============================================================================

/// Maximum length of a sensor name in bytes
pub const SENSOR_NAME_LENGTH_BYTES_MAX: usize = 256;

/// Maximum size of a single lidar reading in bytes (64 MB)
pub const LIDAR_READING_SIZE_BYTES_MAX: usize = 64 * 1024 * 1024;

// =============================================================================
// Engine Defaults
// =============================================================================

/// Default interval between map snapshots in seconds
pub const MAP_RATE_SEC_DEFAULT: i32 = 60;

/// Maximum interval between map snapshots in seconds (1 day)
pub const MAP_RATE_SEC_MAX: i32 = 24 * 60 * 60;

// =============================================================================
// Worker
// =============================================================================

/// Name of the dedicated thread that owns the engine
pub const WORKER_THREAD_NAME: &str = "carto-worker";

// Compile-time assertions for constant validity
const _: () = {
    assert!(REQUEST_TIMEOUT_MS_DEFAULT <= REQUEST_TIMEOUT_MS_MAX);
    assert!(INITIALIZE_TIMEOUT_MS_DEFAULT <= REQUEST_TIMEOUT_MS_MAX);
    assert!(MAP_RATE_SEC_DEFAULT > 0);
    assert!(MAP_RATE_SEC_DEFAULT <= MAP_RATE_SEC_MAX);
    assert!(SENSOR_NAME_LENGTH_BYTES_MAX >= 64);
};
