//! Fault injection for the simulated engine
//!
//! TigerStyle: Faults are explicit rules, drawn from the seeded stream.
//!
//! A rule names the fault, its probability, and optionally the one operation
//! it applies to and a window of calls (`skip_first`, `at_most`). Rules are
//! checked in registration order on every engine entry; the first that fires
//! wins.

use crate::rng::DeterministicRng;
use carto_core::status::EngineStatus;
use carto_core::types::Operation;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// What the simulated engine does when a rule fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    /// The engine's internal lock is held elsewhere
    LockUnavailable,
    /// The call fails with the given status
    Status(EngineStatus),
    /// The call stalls before running normally
    Latency { min_ms: u64, max_ms: u64 },
}

impl FaultType {
    pub fn name(&self) -> &'static str {
        match self {
            FaultType::LockUnavailable => "lock_unavailable",
            FaultType::Status(_) => "status",
            FaultType::Latency { .. } => "latency",
        }
    }
}

/// One injection rule
#[derive(Debug, Clone, PartialEq)]
pub struct FaultRule {
    pub fault: FaultType,
    /// Chance of firing on an eligible call, in `[0, 1]`
    pub probability: f64,
    /// Only calls to this operation are eligible
    pub operation: Option<Operation>,
    /// Matching calls to let through before the rule is armed
    pub skip_first: u64,
    /// Stop firing after this many hits
    pub at_most: Option<u64>,
}

impl FaultRule {
    pub fn new(fault: FaultType, probability: f64) -> Self {
        Self {
            fault,
            probability,
            operation: None,
            skip_first: 0,
            at_most: None,
        }
    }

    pub fn only(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn skip_first(mut self, calls: u64) -> Self {
        self.skip_first = calls;
        self
    }

    pub fn at_most(mut self, hits: u64) -> Self {
        self.at_most = Some(hits);
        self
    }

    fn applies_to(&self, operation: Operation) -> bool {
        self.operation.map_or(true, |only| only == operation)
    }
}

#[derive(Debug)]
struct ArmedRule {
    rule: FaultRule,
    seen: AtomicU64,
    hits: AtomicU64,
}

/// Per-rule counters
#[derive(Debug, Clone, PartialEq)]
pub struct RuleStats {
    pub fault: &'static str,
    pub operation: Option<Operation>,
    /// Matching calls the rule has seen
    pub seen: u64,
    /// Times the rule fired
    pub hits: u64,
}

/// Decides, per engine call, whether and how the simulated engine misbehaves
#[derive(Debug)]
pub struct FaultInjector {
    rules: Vec<ArmedRule>,
    rng: DeterministicRng,
    calls: AtomicU64,
}

impl FaultInjector {
    /// An injector with no rules
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            rules: Vec::new(),
            rng,
            calls: AtomicU64::new(0),
        }
    }

    /// Append a rule
    pub fn rule(mut self, rule: FaultRule) -> Self {
        self.rules.push(ArmedRule {
            rule,
            seen: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        });
        self
    }

    /// Lock contention on any operation
    pub fn lock_contention(self, probability: f64) -> Self {
        self.rule(FaultRule::new(FaultType::LockUnavailable, probability))
    }

    /// Slow calls on any operation
    pub fn latency(self, probability: f64, min_ms: u64, max_ms: u64) -> Self {
        self.rule(FaultRule::new(
            FaultType::Latency { min_ms, max_ms },
            probability,
        ))
    }

    /// Memory exhaustion anywhere and corrupt lidar data on ingestion
    pub fn engine_faults(self, probability: f64) -> Self {
        self.rule(FaultRule::new(
            FaultType::Status(EngineStatus::OutOfMemory),
            probability / 4.0,
        ))
        .rule(
            FaultRule::new(
                FaultType::Status(EngineStatus::LidarReadingInvalid),
                probability,
            )
            .only(Operation::AddLidarReading),
        )
    }

    /// Draw the fault, if any, for one engine entry
    pub fn draw(&self, operation: Operation) -> Option<FaultType> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        for armed in &self.rules {
            let rule = &armed.rule;
            if !rule.applies_to(operation) {
                continue;
            }
            if armed.seen.fetch_add(1, Ordering::Relaxed) < rule.skip_first {
                continue;
            }
            let hits = armed.hits.load(Ordering::Relaxed);
            if rule.at_most.is_some_and(|max| hits >= max) {
                continue;
            }
            if self.rng.chance(rule.probability) {
                armed.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(fault = rule.fault.name(), %operation, hit = hits + 1, "Injecting fault");
                return Some(rule.fault);
            }
        }
        None
    }

    /// Concrete stall for a latency fault
    pub fn stall(&self, min_ms: u64, max_ms: u64) -> Duration {
        self.rng.millis_between(min_ms, max_ms)
    }

    /// Engine entries checked so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Hits across all rules
    pub fn hits(&self) -> u64 {
        self.rules
            .iter()
            .map(|armed| armed.hits.load(Ordering::Relaxed))
            .sum()
    }

    pub fn stats(&self) -> Vec<RuleStats> {
        self.rules
            .iter()
            .map(|armed| RuleStats {
                fault: armed.rule.fault.name(),
                operation: armed.rule.operation,
                seen: armed.seen.load(Ordering::Relaxed),
                hits: armed.hits.load(Ordering::Relaxed),
            })
            .collect()
    }
}
