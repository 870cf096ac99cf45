//! Carto Facade
//!
//! Single-worker serialization facade for a SLAM engine that must never be
//! called concurrently.
//!
//! # Overview
//!
//! The facade provides:
//! - One dedicated worker thread that owns the engine handle
//! - A rendezvous intake: a request is accepted only when the worker is idle
//! - One deadline per call, covering submission and completion
//! - Exactly one response per accepted request, mapped from engine status
//!   codes to structured errors
//! - Graceful shutdown that lets an in-progress engine call finish
//!
//! # Example
//!
//! ```rust,ignore
//! use carto_facade::CartoFacade;
//! use std::time::Duration;
//!
//! let facade = CartoFacade::new(binding, config)?;
//! let mode = facade.initialize(Duration::from_secs(30)).await?;
//! facade.start(Duration::from_secs(5)).await?;
//! let pose = facade.position(Duration::from_secs(1)).await?;
//! facade.shutdown().await?;
//! ```

pub mod facade;
pub mod mailbox;
pub mod worker;

pub use facade::CartoFacade;
pub use mailbox::{intake, Envelope, Intake, IntakeReceiver, Params, Reply, ReplySender};
pub use worker::WorkerStats;
