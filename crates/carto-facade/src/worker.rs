//! The worker loop that owns the engine
//!
//! TigerStyle: Single owner, one request at a time, exactly one response per
//! accepted request.
//!
//! The worker runs on a dedicated OS thread. Engine calls are plain blocking
//! calls made from that thread only; the loop waits for work with a small
//! local executor so it can watch the shutdown signal and the intake at once.

use crate::mailbox::{Envelope, IntakeReceiver, Params, Reply};
use carto_core::config::FacadeConfig;
use carto_core::engine::{Engine, EngineBinding, EngineResult};
use carto_core::error::{Error, Result};
use carto_core::status::EngineStatus;
use carto_core::types::Operation;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// Snapshot of worker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Requests dispatched, successful or not
    pub requests_served: u64,
    /// Requests the engine (or engine lifecycle) rejected
    pub engine_errors: u64,
    /// Requests with a mismatched operation and parameter shape
    pub protocol_faults: u64,
}

impl WorkerStats {
    /// Requests that completed successfully
    pub fn successes(&self) -> u64 {
        self.requests_served
            .saturating_sub(self.engine_errors)
            .saturating_sub(self.protocol_faults)
    }
}

/// Counters shared between the worker and the facade
#[derive(Debug, Default)]
pub(crate) struct SharedStats {
    requests_served: AtomicU64,
    engine_errors: AtomicU64,
    protocol_faults: AtomicU64,
}

impl SharedStats {
    fn record(&self, result: &Result<Reply>) {
        self.requests_served.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(_) => {}
            Err(e) if e.is_protocol_fault() => {
                self.protocol_faults.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.engine_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            requests_served: self.requests_served.load(Ordering::Relaxed),
            engine_errors: self.engine_errors.load(Ordering::Relaxed),
            protocol_faults: self.protocol_faults.load(Ordering::Relaxed),
        }
    }
}

/// Engine ownership as seen by the worker
enum EngineSlot<E> {
    /// No engine yet, or the last initialization failed
    Uninitialized,
    Ready(E),
    /// Terminated successfully; the engine has been dropped
    Terminated,
}

impl<E> EngineSlot<E> {
    fn name(&self) -> &'static str {
        match self {
            EngineSlot::Uninitialized => "uninitialized",
            EngineSlot::Ready(_) => "ready",
            EngineSlot::Terminated => "terminated",
        }
    }
}

/// Signals the facade when the worker exits, however it exits
struct ExitGuard {
    running: Arc<AtomicBool>,
    done_tx: Option<oneshot::Sender<()>>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(done_tx) = self.done_tx.take() {
            let _ = done_tx.send(());
        }
    }
}

/// The worker: engine owner and request dispatcher
pub(crate) struct Worker<B: EngineBinding> {
    binding: B,
    slot: EngineSlot<B::Engine>,
    config: FacadeConfig,
    intake: IntakeReceiver,
    shutdown_rx: watch::Receiver<bool>,
    external_shutdown_rx: Option<watch::Receiver<bool>>,
    stats: Arc<SharedStats>,
    running: Arc<AtomicBool>,
    done_tx: oneshot::Sender<()>,
}

impl<B: EngineBinding> Worker<B> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        binding: B,
        config: FacadeConfig,
        intake: IntakeReceiver,
        shutdown_rx: watch::Receiver<bool>,
        external_shutdown_rx: Option<watch::Receiver<bool>>,
        stats: Arc<SharedStats>,
        running: Arc<AtomicBool>,
        done_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            binding,
            slot: EngineSlot::Uninitialized,
            config,
            intake,
            shutdown_rx,
            external_shutdown_rx,
            stats,
            running,
            done_tx,
        }
    }

    /// Run the loop to completion on the current thread
    pub(crate) fn run(self) {
        let Self {
            binding,
            slot,
            config,
            intake,
            shutdown_rx,
            external_shutdown_rx,
            stats,
            running,
            done_tx,
        } = self;

        let _exit = ExitGuard {
            running: running.clone(),
            done_tx: Some(done_tx),
        };

        let mut worker = Loop {
            binding,
            slot,
            config,
            intake,
            shutdown_rx,
            external_shutdown_rx,
            stats,
            running,
        };
        futures::executor::block_on(worker.run());
        // Dropped before the exit guard fires, so shutdown() observes a
        // released engine.
        drop(worker);
    }
}

struct Loop<B: EngineBinding> {
    binding: B,
    slot: EngineSlot<B::Engine>,
    config: FacadeConfig,
    intake: IntakeReceiver,
    shutdown_rx: watch::Receiver<bool>,
    external_shutdown_rx: Option<watch::Receiver<bool>>,
    stats: Arc<SharedStats>,
    running: Arc<AtomicBool>,
}

impl<B: EngineBinding> Drop for Loop<B> {
    fn drop(&mut self) {
        // Runs before the fields drop, so no caller sees a closed intake
        // while the facade still reports a running worker.
        self.running.store(false, Ordering::Release);
    }
}

impl<B: EngineBinding> Loop<B> {
    async fn run(&mut self) {
        info!("Worker starting");

        loop {
            // Never offer a permit once shutdown has been requested.
            if self.shutdown_requested() {
                info!("Worker shutting down");
                break;
            }
            self.intake.offer();

            let envelope = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown_rx) => {
                    info!("Worker shutting down");
                    break;
                }
                _ = wait_for_external_shutdown(self.external_shutdown_rx.as_mut()) => {
                    info!("Worker shutting down on external signal");
                    break;
                }
                envelope = self.intake.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => {
                        info!("Intake closed, worker shutting down");
                        break;
                    }
                },
            };

            if !self.handle(envelope) {
                break;
            }
        }

        self.stop_serving();
        info!(engine = self.slot.name(), "Worker stopped");
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown_rx.borrow()
            || self
                .external_shutdown_rx
                .as_ref()
                .is_some_and(|rx| *rx.borrow())
    }

    /// Mark the worker stopped, then refuse further submissions
    fn stop_serving(&mut self) {
        self.running.store(false, Ordering::Release);
        self.intake.close();
    }

    /// Serve one envelope; `false` when the loop must stop
    fn handle(&mut self, envelope: Envelope) -> bool {
        let waited = envelope.wait_time();
        let Envelope {
            operation,
            params,
            reply_tx,
            ..
        } = envelope;

        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(operation, params)));
        let elapsed = start.elapsed();

        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                // The engine may be left half-updated; stop serving before
                // the caller hears about it.
                let reason = format!("{} panicked: {}", operation, panic_message(payload.as_ref()));
                error!(%operation, %reason, "Engine call panicked, worker stopping");
                self.stop_serving();
                let result = Err(Error::internal(reason));
                self.stats.record(&result);
                let _ = reply_tx.send(result);
                return false;
            }
        };

        self.stats.record(&result);
        match &result {
            Ok(_) => debug!(
                %operation,
                waited_us = waited.as_micros() as u64,
                elapsed_us = elapsed.as_micros() as u64,
                "Request served"
            ),
            Err(e @ Error::ProtocolFault { .. }) => error!(%operation, error = %e, "Protocol fault"),
            Err(e @ Error::LockUnavailable { .. }) => warn!(%operation, error = %e, "Engine lock unavailable"),
            Err(e) => warn!(
                %operation,
                elapsed_us = elapsed.as_micros() as u64,
                error = %e,
                "Request failed"
            ),
        }

        if reply_tx.send(result).is_err() {
            debug!(%operation, "Caller gone before response");
        }
        true
    }

    fn dispatch(&mut self, operation: Operation, params: Params) -> Result<Reply> {
        match (operation, params) {
            (Operation::Initialize, Params::None) => self.initialize(),
            (Operation::Start, Params::None) => {
                self.with_engine(operation, |engine| engine.start())?;
                Ok(Reply::Done)
            }
            (Operation::Stop, Params::None) => {
                self.with_engine(operation, |engine| engine.stop())?;
                Ok(Reply::Done)
            }
            (Operation::Terminate, Params::None) => self.terminate(),
            (Operation::AddLidarReading, Params::LidarReading(reading)) => {
                self.with_engine(operation, |engine| engine.add_lidar_reading(&reading))?;
                Ok(Reply::Done)
            }
            (Operation::AddImuReading, Params::ImuReading(reading)) => {
                self.with_engine(operation, |engine| engine.add_imu_reading(&reading))?;
                Ok(Reply::Done)
            }
            (Operation::GetPosition, Params::None) => self
                .with_engine(operation, |engine| engine.position())
                .map(Reply::Position),
            (Operation::GetInternalState, Params::None) => self
                .with_engine(operation, |engine| engine.internal_state())
                .map(Reply::Bytes),
            (Operation::GetPointCloudMap, Params::None) => self
                .with_engine(operation, |engine| engine.point_cloud_map())
                .map(Reply::Bytes),
            (operation, params) => Err(Error::protocol_fault(
                operation,
                format!("no handler for {} params", params.kind()),
            )),
        }
    }

    fn initialize(&mut self) -> Result<Reply> {
        if !matches!(self.slot, EngineSlot::Uninitialized) {
            return Err(Error::AlreadyInitialized);
        }

        let engine = self
            .binding
            .initialize(&self.config.engine, &self.config.algo)
            .map_err(|status| Error::from_status(Operation::Initialize, status))?;

        let mode = engine.slam_mode();
        self.slot = EngineSlot::Ready(engine);
        info!(%mode, "Engine initialized");
        Ok(Reply::Initialized { mode })
    }

    fn terminate(&mut self) -> Result<Reply> {
        self.with_engine(Operation::Terminate, |engine| engine.terminate())?;
        self.slot = EngineSlot::Terminated;
        info!("Engine terminated");
        Ok(Reply::Done)
    }

    /// Run `f` against the engine, or fail without touching it when there is none
    fn with_engine<T>(
        &mut self,
        operation: Operation,
        f: impl FnOnce(&mut B::Engine) -> EngineResult<T>,
    ) -> Result<T> {
        match &mut self.slot {
            EngineSlot::Ready(engine) => {
                f(engine).map_err(|status| Error::from_status(operation, status))
            }
            EngineSlot::Uninitialized | EngineSlot::Terminated => Err(Error::from_status(
                operation,
                EngineStatus::NotInInitializedState,
            )),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            // Sender gone without signalling; the intake closing ends the loop.
            std::future::pending::<()>().await;
        }
    }
}

async fn wait_for_external_shutdown(shutdown_rx: Option<&mut watch::Receiver<bool>>) {
    match shutdown_rx {
        Some(shutdown_rx) => wait_for_shutdown(shutdown_rx).await,
        None => std::future::pending::<()>().await,
    }
}
