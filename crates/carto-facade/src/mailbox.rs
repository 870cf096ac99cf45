//! Request envelopes and the worker intake
//!
//! TigerStyle: No queueing capacity, explicit deadlines, no silent drops.
//!
//! The intake is a rendezvous: the worker publishes one readiness permit each
//! time it is idle, and a submitter must hold that permit before its envelope
//! is handed over. A second submission is therefore not accepted until the
//! worker is free again. Permits are granted in the order submitters started
//! waiting, so blocked submitters are served first come, first served.

use bytes::Bytes;
use carto_core::error::{Error, Result, Stage};
use carto_core::types::{ImuReading, LidarReading, Operation, Position, SlamMode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::time::timeout_at;

/// Parameters carried by a request
///
/// Closed set; the worker pairs each operation with exactly one shape and
/// rejects any other pairing as a protocol fault.
#[derive(Debug, Clone)]
pub enum Params {
    None,
    LidarReading(LidarReading),
    ImuReading(ImuReading),
}

impl Params {
    /// Shape name used in logs and protocol fault reasons
    pub fn kind(&self) -> &'static str {
        match self {
            Params::None => "empty",
            Params::LidarReading(_) => "lidar_reading",
            Params::ImuReading(_) => "imu_reading",
        }
    }
}

/// Successful response from the worker
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Operation completed with no payload
    Done,
    /// Engine created; carries the mode it selected
    Initialized { mode: SlamMode },
    Position(Position),
    /// Serialized state or map
    Bytes(Bytes),
}

impl Reply {
    /// Shape name used in logs and protocol fault reasons
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Done => "done",
            Reply::Initialized { .. } => "initialized",
            Reply::Position(_) => "position",
            Reply::Bytes(_) => "bytes",
        }
    }
}

/// Single-use channel carrying the response back to the caller
pub type ReplySender = oneshot::Sender<Result<Reply>>;

/// A request handed to the worker
#[derive(Debug)]
pub struct Envelope {
    /// The operation to perform
    pub operation: Operation,
    /// Parameters for the operation
    pub params: Params,
    /// Channel to send the response
    pub reply_tx: ReplySender,
    /// When the caller created the request
    pub enqueued_at: Instant,
}

impl Envelope {
    /// Create a new envelope stamped with the current time
    pub fn new(operation: Operation, params: Params, reply_tx: ReplySender) -> Self {
        Self {
            operation,
            params,
            reply_tx,
            enqueued_at: Instant::now(),
        }
    }

    /// Time since the envelope was created
    pub fn wait_time(&self) -> Duration {
        self.enqueued_at.elapsed()
    }
}

/// Create a connected intake pair
pub fn intake() -> (Intake, IntakeReceiver) {
    let ready = Arc::new(Semaphore::new(0));
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Intake {
            ready: ready.clone(),
            tx,
        },
        IntakeReceiver { ready, rx },
    )
}

/// Submitting side of the intake
#[derive(Debug, Clone)]
pub struct Intake {
    ready: Arc<Semaphore>,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Intake {
    /// Hand an envelope to the worker, waiting until it is idle
    ///
    /// Fails with `SubmissionTimeout` if the worker does not become idle
    /// before `deadline` (immediately when the deadline has already passed),
    /// and with `Cancelled` once the worker has stopped.
    pub async fn submit(
        &self,
        envelope: Envelope,
        deadline: tokio::time::Instant,
        timeout: Duration,
    ) -> Result<()> {
        let operation = envelope.operation;

        let acquire = async {
            if tokio::time::Instant::now() >= deadline {
                std::future::pending::<()>().await;
            }
            self.ready.acquire().await
        };

        match timeout_at(deadline, acquire).await {
            Err(source) => Err(Error::SubmissionTimeout {
                operation,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                source,
            }),
            Ok(Err(_closed)) => Err(Error::Cancelled {
                operation,
                stage: Stage::Submission,
            }),
            Ok(Ok(permit)) => {
                // The worker re-offers after it is done with this envelope.
                permit.forget();
                self.tx.send(envelope).map_err(|_| Error::Cancelled {
                    operation,
                    stage: Stage::Submission,
                })
            }
        }
    }

    /// Refuse all current and future submissions
    pub fn close(&self) {
        self.ready.close();
    }

    /// Check whether the intake still accepts submissions
    pub fn is_closed(&self) -> bool {
        self.ready.is_closed()
    }
}

/// Worker side of the intake
#[derive(Debug)]
pub struct IntakeReceiver {
    ready: Arc<Semaphore>,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl IntakeReceiver {
    /// Announce that the worker is idle and can take one envelope
    pub fn offer(&self) {
        if !self.ready.is_closed() && self.ready.available_permits() == 0 {
            self.ready.add_permits(1);
        }
    }

    /// Wait for the next envelope; `None` once every submitter is gone
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Stop accepting envelopes
    ///
    /// Blocked submitters wake with `Cancelled`. An envelope already handed
    /// over but not received is dropped with the receiver, which resolves its
    /// caller as cancelled during completion.
    pub fn close(&mut self) {
        self.ready.close();
        self.rx.close();
    }

    /// Number of readiness permits not yet claimed (0 or 1)
    pub fn offered(&self) -> usize {
        self.ready.available_permits()
    }
}

impl Drop for IntakeReceiver {
    fn drop(&mut self) {
        self.ready.close();
    }
}
