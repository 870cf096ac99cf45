//! Logging setup
//!
//! TigerStyle: Explicit telemetry configuration, single global subscriber.
//!
//! The facade only emits `tracing` events. Binaries and tests call
//! [`init_telemetry`] once to install a subscriber. Events from the engine
//! worker carry its thread name (`carto-worker`), which is how engine calls
//! are told apart from caller-side events in the output.

use crate::error::{Error, Result};
use std::io;

/// Environment variable overriding the service name
pub const SERVICE_NAME_ENV_VAR: &str = "CARTO_SERVICE_NAME";

const SERVICE_NAME_DEFAULT: &str = "carto";
const LOG_LEVEL_DEFAULT: &str = "info";

/// Where formatted events go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Filter and subscriber installed, nothing printed
    Off,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Attached to the startup event
    pub service_name: String,
    /// Filter directive used when `RUST_LOG` is unset
    pub log_level: String,
    pub output: LogOutput,
    /// Include thread names, so worker events are recognizable
    pub thread_names: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: SERVICE_NAME_DEFAULT.to_string(),
            log_level: LOG_LEVEL_DEFAULT.to_string(),
            output: LogOutput::default(),
            thread_names: true,
        }
    }
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn with_log_level(mut self, directive: impl Into<String>) -> Self {
        self.log_level = directive.into();
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn without_thread_names(mut self) -> Self {
        self.thread_names = false;
        self
    }

    /// Defaults overridden by `CARTO_SERVICE_NAME` and `RUST_LOG`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(name) = std::env::var(SERVICE_NAME_ENV_VAR) {
            config.service_name = name;
        }
        if let Ok(directive) = std::env::var("RUST_LOG") {
            config.log_level = directive;
        }
        config
    }
}

/// Install the global tracing subscriber
///
/// Fails if a subscriber is already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<()> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| Error::InvalidConfiguration {
            field: "telemetry.log_level".into(),
            reason: e.to_string(),
        })?;

    let layer = |writer: fn() -> Box<dyn io::Write>| {
        tracing_subscriber::fmt::layer()
            .with_thread_names(config.thread_names)
            .with_writer(writer)
    };
    let fmt_layer = match config.output {
        LogOutput::Stdout => Some(layer(|| Box::new(io::stdout()))),
        LogOutput::Stderr => Some(layer(|| Box::new(io::stderr()))),
        LogOutput::Off => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::internal(format!("tracing subscriber already installed: {}", e)))?;

    tracing::info!(service = %config.service_name, output = ?config.output, "Telemetry initialized");
    Ok(())
}
