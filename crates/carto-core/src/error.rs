//! Error types for the carto facade
//!
//! TigerStyle: Explicit error types with context, using thiserror.

use crate::status::{classify, Classification, EngineStatus, FaultKind};
use crate::types::Operation;
use std::fmt;
use thiserror::Error;
use tokio::time::error::Elapsed;

/// Result type alias for facade operations
pub type Result<T> = std::result::Result<T, Error>;

/// Where a request was when it got cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Waiting for the worker to accept the request
    Submission,
    /// Accepted, waiting for the worker's response
    Completion,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Submission => write!(f, "submission"),
            Stage::Completion => write!(f, "completion"),
        }
    }
}

/// Facade error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Deadline Errors
    // =========================================================================
    #[error("timeout writing to engine: {operation} not accepted within {timeout_ms}ms")]
    SubmissionTimeout {
        operation: Operation,
        timeout_ms: u64,
        #[source]
        source: Elapsed,
    },

    #[error("timeout reading from engine: {operation} did not complete within {timeout_ms}ms")]
    CompletionTimeout {
        operation: Operation,
        timeout_ms: u64,
        #[source]
        source: Elapsed,
    },

    #[error("{operation} cancelled during {stage}: worker is shutting down")]
    Cancelled { operation: Operation, stage: Stage },

    // =========================================================================
    // Engine Errors
    // =========================================================================
    #[error("engine lock unavailable for {operation}")]
    LockUnavailable { operation: Operation },

    #[error("engine fault during {operation}: {kind} ({status})")]
    EngineFault {
        operation: Operation,
        kind: FaultKind,
        status: EngineStatus,
    },

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    #[error("protocol fault during {operation}: {reason}")]
    ProtocolFault { operation: Operation, reason: String },

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    #[error("{operation} requested before the facade was initialized")]
    NotInitialized { operation: Operation },

    #[error("engine already initialized")]
    AlreadyInitialized,

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

impl Error {
    /// Translate a failed engine status into a facade error
    ///
    /// A failure carrying `Success` means the binding broke its contract and
    /// is reported as a protocol fault.
    pub fn from_status(operation: Operation, status: EngineStatus) -> Self {
        match classify(status) {
            Classification::LockUnavailable => Self::LockUnavailable { operation },
            Classification::Fault(kind) => Self::EngineFault {
                operation,
                kind,
                status,
            },
            Classification::Success => Self::ProtocolFault {
                operation,
                reason: "engine reported failure with a success status".into(),
            },
        }
    }

    /// Create a protocol fault error
    pub fn protocol_fault(operation: Operation, reason: impl Into<String>) -> Self {
        Self::ProtocolFault {
            operation,
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Check if this error is retriable
    ///
    /// Deadlines and lock contention are left to the caller's retry policy.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::SubmissionTimeout { .. }
                | Self::CompletionTimeout { .. }
                | Self::LockUnavailable { .. }
        )
    }

    /// Kind of engine fault, if this is one
    pub fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            Self::EngineFault { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Engine status behind this error, if any
    pub fn engine_status(&self) -> Option<EngineStatus> {
        match self {
            Self::EngineFault { status, .. } => Some(*status),
            Self::LockUnavailable { .. } => Some(EngineStatus::UnableToAcquireLock),
            _ => None,
        }
    }

    /// Check if this error signals a dispatch defect
    pub fn is_protocol_fault(&self) -> bool {
        matches!(self, Self::ProtocolFault { .. })
    }

    /// Check if this error is a deadline expiry
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::SubmissionTimeout { .. } | Self::CompletionTimeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::from_status(Operation::Terminate, EngineStatus::NotInTerminatableState);
        let text = err.to_string();
        assert!(text.contains("terminate"));
        assert!(text.contains("NOT_IN_TERMINATABLE_STATE"));
    }

    #[test]
    fn test_from_status_lock_unavailable() {
        let err = Error::from_status(Operation::AddLidarReading, EngineStatus::UnableToAcquireLock);
        assert!(matches!(err, Error::LockUnavailable { .. }));
        assert!(err.is_retriable());
        assert_eq!(err.engine_status(), Some(EngineStatus::UnableToAcquireLock));
    }

    #[test]
    fn test_from_status_fault() {
        let err = Error::from_status(Operation::GetPosition, EngineStatus::OutOfMemory);
        assert_eq!(err.fault_kind(), Some(FaultKind::OutOfMemory));
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_from_status_success_is_protocol_fault() {
        let err = Error::from_status(Operation::Start, EngineStatus::Success);
        assert!(err.is_protocol_fault());
    }

    #[test]
    fn test_internal_error_carries_reason_only() {
        let err = Error::internal("get_position panicked: index out of bounds");
        assert_eq!(
            err.to_string(),
            "Internal error: get_position panicked: index out of bounds"
        );
        assert!(!err.is_retriable());
        assert!(!err.is_timeout());
        assert_eq!(err.engine_status(), None);
        assert_eq!(err.fault_kind(), None);
        assert!(std::error::Error::source(&err).is_none());
    }

    #[tokio::test]
    async fn test_timeouts_are_retriable_and_keep_source() {
        let elapsed = tokio::time::timeout(
            std::time::Duration::from_millis(1),
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();

        let err = Error::SubmissionTimeout {
            operation: Operation::Start,
            timeout_ms: 1,
            source: elapsed,
        };
        assert!(err.is_retriable());
        assert!(err.is_timeout());
        assert!(std::error::Error::source(&err).is_some());
    }
}
