//! Client API for the engine
//!
//! TigerStyle: One deadline per call, fail fast when the worker is gone.
//!
//! `CartoFacade` is shared by any number of callers (typically behind an
//! `Arc`). Each call derives a single deadline from its timeout; that
//! deadline bounds both the wait for the worker to accept the request and
//! the wait for its response.

use crate::mailbox::{intake, Envelope, Intake, Params, Reply};
use crate::worker::{SharedStats, Worker, WorkerStats};
use bytes::Bytes;
use carto_core::config::FacadeConfig;
use carto_core::constants::WORKER_THREAD_NAME;
use carto_core::engine::EngineBinding;
use carto_core::error::{Error, Result, Stage};
use carto_core::types::{ImuReading, ImuSample, LidarReading, Operation, Position, SlamMode};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, instrument};

/// Stand-in deadline for timeouts too large to add to the clock
const DEADLINE_HORIZON: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Serialized access to a single engine
pub struct CartoFacade<B: EngineBinding> {
    /// Configuration handed to the engine at initialization
    config: FacadeConfig,
    /// Submitting side of the worker intake
    intake: Intake,
    /// The worker, until the first initialize starts it
    pending_worker: Mutex<Option<Worker<B>>>,
    /// Resolves when the worker has exited
    worker_done: Mutex<Option<oneshot::Receiver<()>>>,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
    running: Arc<AtomicBool>,
    /// Mode reported by the last successful initialize
    mode: AtomicU8,
    stats: Arc<SharedStats>,
}

impl<B: EngineBinding> CartoFacade<B> {
    /// Create a facade for the given binding
    ///
    /// The worker is not started until the first `initialize`.
    pub fn new(binding: B, config: FacadeConfig) -> Result<Self> {
        Self::build(binding, config, None)
    }

    /// Create a facade whose worker also stops when `shutdown_rx` turns true
    pub fn with_shutdown(
        binding: B,
        config: FacadeConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self> {
        Self::build(binding, config, Some(shutdown_rx))
    }

    fn build(
        binding: B,
        config: FacadeConfig,
        external_shutdown_rx: Option<watch::Receiver<bool>>,
    ) -> Result<Self> {
        config.validate()?;

        let (intake, receiver) = intake();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (done_tx, done_rx) = oneshot::channel();
        let stats = Arc::new(SharedStats::default());
        let running = Arc::new(AtomicBool::new(false));

        let worker = Worker::new(
            binding,
            config.clone(),
            receiver,
            shutdown_rx,
            external_shutdown_rx,
            stats.clone(),
            running.clone(),
            done_tx,
        );

        Ok(Self {
            config,
            intake,
            pending_worker: Mutex::new(Some(worker)),
            worker_done: Mutex::new(Some(done_rx)),
            shutdown_tx,
            started: AtomicBool::new(false),
            running,
            mode: AtomicU8::new(SlamMode::Unknown.as_u8()),
            stats,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &FacadeConfig {
        &self.config
    }

    /// Configured timeout for `initialize`
    pub fn initialize_timeout(&self) -> Duration {
        self.config.timeouts.initialize()
    }

    /// Configured timeout for every other request
    pub fn request_timeout(&self) -> Duration {
        self.config.timeouts.request()
    }

    /// Mode reported by the last successful initialize
    pub fn slam_mode(&self) -> SlamMode {
        SlamMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Check whether the worker is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Snapshot of the worker counters
    pub fn stats(&self) -> WorkerStats {
        self.stats.snapshot()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create the engine, starting the worker on first use
    pub async fn initialize(&self, timeout: Duration) -> Result<SlamMode> {
        match self
            .request(Operation::Initialize, Params::None, timeout)
            .await?
        {
            Reply::Initialized { mode } => {
                self.mode.store(mode.as_u8(), Ordering::Release);
                info!(%mode, "Facade initialized");
                Ok(mode)
            }
            other => Err(unexpected_reply(Operation::Initialize, &other)),
        }
    }

    pub async fn start(&self, timeout: Duration) -> Result<()> {
        self.request_done(Operation::Start, Params::None, timeout)
            .await
    }

    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        self.request_done(Operation::Stop, Params::None, timeout)
            .await
    }

    /// Release the engine; later engine operations fail as uninitialized
    pub async fn terminate(&self, timeout: Duration) -> Result<()> {
        self.request_done(Operation::Terminate, Params::None, timeout)
            .await
    }

    /// Stop the worker and wait for it to exit
    ///
    /// A request the worker is executing completes and gets its response.
    /// Every later or still-waiting request fails with `Cancelled`.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx.send_replace(true);

        // Never started: close the intake ourselves so callers fail fast.
        let unstarted = self
            .pending_worker
            .lock()
            .map_err(|_| Error::internal("facade worker slot poisoned"))?
            .take();
        if unstarted.is_some() {
            self.intake.close();
            info!("Facade shut down before the worker started");
            return Ok(());
        }

        let done_rx = self
            .worker_done
            .lock()
            .map_err(|_| Error::internal("facade worker slot poisoned"))?
            .take();
        if let Some(done_rx) = done_rx {
            // A closed channel means the worker is already gone.
            let _ = done_rx.await;
            info!("Facade shut down");
        }
        Ok(())
    }

    // =========================================================================
    // Sensor Input
    // =========================================================================

    /// Feed one lidar reading to the engine
    pub async fn add_lidar_reading(
        &self,
        timeout: Duration,
        sensor: impl Into<String>,
        reading: impl Into<Bytes>,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let reading = LidarReading::new(sensor, reading, timestamp)?;
        self.request_done(
            Operation::AddLidarReading,
            Params::LidarReading(reading),
            timeout,
        )
        .await
    }

    /// Feed one IMU reading to the engine
    pub async fn add_imu_reading(
        &self,
        timeout: Duration,
        sensor: impl Into<String>,
        sample: ImuSample,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let reading = ImuReading::new(sensor, sample, timestamp)?;
        self.request_done(Operation::AddImuReading, Params::ImuReading(reading), timeout)
            .await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn position(&self, timeout: Duration) -> Result<Position> {
        match self
            .request(Operation::GetPosition, Params::None, timeout)
            .await?
        {
            Reply::Position(position) => Ok(position),
            other => Err(unexpected_reply(Operation::GetPosition, &other)),
        }
    }

    pub async fn internal_state(&self, timeout: Duration) -> Result<Bytes> {
        self.request_bytes(Operation::GetInternalState, timeout)
            .await
    }

    pub async fn point_cloud_map(&self, timeout: Duration) -> Result<Bytes> {
        self.request_bytes(Operation::GetPointCloudMap, timeout)
            .await
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Send one request to the worker and wait for its response
    ///
    /// The typed methods above are thin wrappers around this. Callers pairing
    /// an operation with the wrong parameters get a `ProtocolFault` back.
    #[instrument(skip(self, params), level = "debug")]
    pub async fn request(
        &self,
        operation: Operation,
        params: Params,
        timeout: Duration,
    ) -> Result<Reply> {
        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + DEADLINE_HORIZON);

        if operation == Operation::Initialize {
            self.ensure_started()?;
        } else if !self.started.load(Ordering::Acquire) {
            return Err(Error::NotInitialized { operation });
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.intake
            .submit(Envelope::new(operation, params, reply_tx), deadline, timeout)
            .await?;

        match timeout_at(deadline, reply_rx).await {
            Err(source) => Err(Error::CompletionTimeout {
                operation,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                source,
            }),
            Ok(Err(_dropped)) => Err(Error::Cancelled {
                operation,
                stage: Stage::Completion,
            }),
            Ok(Ok(result)) => result,
        }
    }

    async fn request_done(
        &self,
        operation: Operation,
        params: Params,
        timeout: Duration,
    ) -> Result<()> {
        match self.request(operation, params, timeout).await? {
            Reply::Done => Ok(()),
            other => Err(unexpected_reply(operation, &other)),
        }
    }

    async fn request_bytes(&self, operation: Operation, timeout: Duration) -> Result<Bytes> {
        match self.request(operation, Params::None, timeout).await? {
            Reply::Bytes(bytes) => Ok(bytes),
            other => Err(unexpected_reply(operation, &other)),
        }
    }

    /// Spawn the worker thread if it has not been spawned yet
    fn ensure_started(&self) -> Result<()> {
        let mut pending = self
            .pending_worker
            .lock()
            .map_err(|_| Error::internal("facade worker slot poisoned"))?;

        let Some(worker) = pending.take() else {
            return Ok(());
        };

        self.running.store(true, Ordering::Release);
        let spawned = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run());

        match spawned {
            Ok(_detached) => {
                self.started.store(true, Ordering::Release);
                info!(thread = WORKER_THREAD_NAME, "Worker spawned");
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                self.intake.close();
                Err(Error::internal(format!("failed to spawn worker thread: {}", e)))
            }
        }
    }
}

impl<B: EngineBinding> Drop for CartoFacade<B> {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

fn unexpected_reply(operation: Operation, reply: &Reply) -> Error {
    error!(%operation, reply = reply.kind(), "Unexpected reply shape");
    Error::protocol_fault(operation, format!("unexpected {} reply", reply.kind()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use carto_core::config::{AlgoConfig, EngineConfig};
    use carto_core::engine::{Engine, EngineResult};
    use carto_core::status::EngineStatus;
    use std::sync::atomic::AtomicUsize;

    struct EchoEngine {
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl EchoEngine {
        fn touch(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
        }
    }

    impl Engine for EchoEngine {
        fn slam_mode(&self) -> SlamMode {
            SlamMode::Updating
        }
        fn start(&mut self) -> EngineResult<()> {
            self.touch();
            Ok(())
        }
        fn stop(&mut self) -> EngineResult<()> {
            self.touch();
            Ok(())
        }
        fn terminate(&mut self) -> EngineResult<()> {
            self.touch();
            Ok(())
        }
        fn add_lidar_reading(&mut self, reading: &LidarReading) -> EngineResult<()> {
            self.touch();
            if reading.reading.as_ref() == b"corrupt" {
                panic!("point count overflowed");
            }
            if reading.reading.is_empty() {
                return Err(EngineStatus::LidarReadingEmpty);
            }
            Ok(())
        }
        fn add_imu_reading(&mut self, _reading: &ImuReading) -> EngineResult<()> {
            self.touch();
            Ok(())
        }
        fn position(&mut self) -> EngineResult<Position> {
            self.touch();
            Ok(Position::origin("lidar0"))
        }
        fn internal_state(&mut self) -> EngineResult<Bytes> {
            self.touch();
            Ok(Bytes::from_static(b"state"))
        }
        fn point_cloud_map(&mut self) -> EngineResult<Bytes> {
            self.touch();
            Ok(Bytes::from_static(b"map"))
        }
    }

    struct EchoBinding {
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl EngineBinding for EchoBinding {
        type Engine = EchoEngine;

        fn initialize(&mut self, _config: &EngineConfig, _algo: &AlgoConfig) -> EngineResult<EchoEngine> {
            Ok(EchoEngine {
                calls: self.calls.clone(),
                delay: self.delay,
            })
        }
    }

    fn create_facade(delay: Duration) -> (CartoFacade<EchoBinding>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let binding = EchoBinding {
            calls: calls.clone(),
            delay,
        };
        (
            CartoFacade::new(binding, FacadeConfig::default()).unwrap(),
            calls,
        )
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_facade_roundtrip() {
        let (facade, calls) = create_facade(Duration::ZERO);
        assert!(!facade.is_running());
        assert_eq!(facade.slam_mode(), SlamMode::Unknown);

        assert_eq!(facade.initialize(TIMEOUT).await.unwrap(), SlamMode::Updating);
        assert!(facade.is_running());
        assert_eq!(facade.slam_mode(), SlamMode::Updating);

        facade.start(TIMEOUT).await.unwrap();
        facade
            .add_lidar_reading(TIMEOUT, "lidar0", Bytes::from_static(b"pcd"), Utc::now())
            .await
            .unwrap();
        facade
            .add_imu_reading(TIMEOUT, "imu", ImuSample::default(), Utc::now())
            .await
            .unwrap();
        assert_eq!(
            facade.position(TIMEOUT).await.unwrap().component_reference,
            "lidar0"
        );
        assert_eq!(facade.internal_state(TIMEOUT).await.unwrap(), "state");
        assert_eq!(facade.point_cloud_map(TIMEOUT).await.unwrap(), "map");
        facade.stop(TIMEOUT).await.unwrap();
        facade.terminate(TIMEOUT).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 8);
        assert_eq!(facade.stats().requests_served, 9);

        facade.shutdown().await.unwrap();
        assert!(!facade.is_running());
    }

    #[tokio::test]
    async fn test_request_before_initialize_fails_fast() {
        let (facade, calls) = create_facade(Duration::ZERO);
        let err = facade.position(TIMEOUT).await.unwrap_err();
        assert!(matches!(
            err,
            Error::NotInitialized {
                operation: Operation::GetPosition
            }
        ));
        assert!(!facade.is_running());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_engine_error_is_surfaced() {
        let (facade, _calls) = create_facade(Duration::ZERO);
        facade.initialize(TIMEOUT).await.unwrap();

        let err = facade
            .add_lidar_reading(TIMEOUT, "lidar0", Bytes::new(), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.engine_status(), Some(EngineStatus::LidarReadingEmpty));

        // The loop is still serving.
        facade.start(TIMEOUT).await.unwrap();
        facade.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_mismatched_request_is_protocol_fault() {
        let (facade, _calls) = create_facade(Duration::ZERO);
        facade.initialize(TIMEOUT).await.unwrap();

        let reading = LidarReading::new("lidar0", Bytes::from_static(b"pcd"), Utc::now()).unwrap();
        let err = facade
            .request(Operation::Stop, Params::LidarReading(reading), TIMEOUT)
            .await
            .unwrap_err();
        assert!(err.is_protocol_fault());
        assert_eq!(facade.stats().protocol_faults, 1);

        facade.position(TIMEOUT).await.unwrap();
        facade.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_slow_engine_completion_timeout() {
        let (facade, _calls) = create_facade(Duration::from_millis(200));
        facade.initialize(TIMEOUT).await.unwrap();

        let err = facade
            .position(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CompletionTimeout { .. }));

        // The slow call finishes in the background; the next one is served.
        facade.position(TIMEOUT).await.unwrap();
        facade.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unbounded_timeout_is_served() {
        let (facade, calls) = create_facade(Duration::ZERO);
        facade.initialize(Duration::MAX).await.unwrap();
        assert_eq!(
            facade.position(Duration::MAX).await.unwrap().component_reference,
            "lidar0"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        facade.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_engine_panic_reported_after_worker_stops() {
        let (facade, _calls) = create_facade(Duration::ZERO);
        facade.initialize(TIMEOUT).await.unwrap();

        let err = facade
            .add_lidar_reading(TIMEOUT, "lidar0", Bytes::from_static(b"corrupt"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal { .. }), "got {:?}", err);
        assert!(!facade.is_running());

        let err = facade.position(TIMEOUT).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Cancelled {
                operation: Operation::GetPosition,
                stage: Stage::Submission
            }
        ));
        assert!(!facade.is_running());
        facade.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_before_start_cancels_initialize() {
        let (facade, calls) = create_facade(Duration::ZERO);
        facade.shutdown().await.unwrap();

        let err = facade.initialize(TIMEOUT).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Cancelled {
                stage: Stage::Submission,
                ..
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_external_shutdown_stops_worker() {
        let calls = Arc::new(AtomicUsize::new(0));
        let binding = EchoBinding {
            calls: calls.clone(),
            delay: Duration::ZERO,
        };
        let (signal_tx, signal_rx) = watch::channel(false);
        let facade =
            CartoFacade::with_shutdown(binding, FacadeConfig::default(), signal_rx).unwrap();
        facade.initialize(TIMEOUT).await.unwrap();

        signal_tx.send_replace(true);
        facade.shutdown().await.unwrap();
        assert!(!facade.is_running());

        let err = facade.start(TIMEOUT).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_configured_timeouts() {
        let mut config = FacadeConfig::default();
        config.timeouts.initialize_ms = 2_000;
        config.timeouts.request_ms = 250;
        let binding = EchoBinding {
            calls: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
        };
        let facade = CartoFacade::new(binding, config).unwrap();
        assert_eq!(facade.initialize_timeout(), Duration::from_secs(2));
        assert_eq!(facade.request_timeout(), Duration::from_millis(250));

        facade.initialize(facade.initialize_timeout()).await.unwrap();
        facade.position(facade.request_timeout()).await.unwrap();
        facade.shutdown().await.unwrap();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = FacadeConfig::default();
        config.timeouts.request_ms = 0;
        let binding = EchoBinding {
            calls: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
        };
        assert!(matches!(
            CartoFacade::new(binding, config),
            Err(Error::InvalidConfiguration { .. })
        ));
    }
}
