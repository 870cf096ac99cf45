//! Call instrumentation for the simulated engine
//!
//! Records every engine entry, which thread made it, and whether it
//! overlapped another call still in progress.

use carto_core::types::Operation;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One recorded engine entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub operation: Operation,
    /// Name of the calling thread, if it has one
    pub thread: Option<String>,
}

/// Shared probe the simulated engine reports into
#[derive(Debug, Default)]
pub struct CallProbe {
    in_flight: AtomicBool,
    calls: AtomicU64,
    overlaps: AtomicU64,
    log: Mutex<Vec<CallRecord>>,
}

impl CallProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark entry into the engine; the returned guard marks the exit
    pub fn enter(&self, operation: Operation) -> CallGuard<'_> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
            tracing::error!(%operation, "Overlapping engine call");
        }
        self.calls.fetch_add(1, Ordering::SeqCst);

        let thread = std::thread::current().name().map(str::to_string);
        self.records().push(CallRecord { operation, thread });

        CallGuard { probe: self }
    }

    /// Total engine entries
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Entries made while another call was still in progress
    pub fn overlaps(&self) -> u64 {
        self.overlaps.load(Ordering::SeqCst)
    }

    /// Operations in the order the engine saw them
    pub fn operations(&self) -> Vec<Operation> {
        self.records().iter().map(|r| r.operation).collect()
    }

    /// Every recorded entry
    pub fn log(&self) -> Vec<CallRecord> {
        self.records().clone()
    }

    /// Entries for one operation
    pub fn count(&self, operation: Operation) -> usize {
        self.records()
            .iter()
            .filter(|r| r.operation == operation)
            .count()
    }

    fn records(&self) -> MutexGuard<'_, Vec<CallRecord>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the in-flight flag when the engine call returns
pub struct CallGuard<'a> {
    probe: &'a CallProbe,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.probe.in_flight.store(false, Ordering::SeqCst);
    }
}
