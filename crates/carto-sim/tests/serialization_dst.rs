//! DST tests for request serialization
//!
//! TigerStyle: Many concurrent callers, one engine, zero overlapping calls.

use bytes::Bytes;
use carto_core::constants::WORKER_THREAD_NAME;
use carto_core::error::Error;
use carto_core::telemetry::{init_telemetry, TelemetryConfig};
use carto_core::types::Operation;
use carto_core::FacadeConfig;
use carto_facade::{CartoFacade, Params};
use carto_sim::{pcd, DeterministicRng, FaultInjector, FaultRule, FaultType, SimBinding};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);
const CALLERS_COUNT: usize = 48;

fn init_logging() {
    // Several tests share the process; only the first install wins.
    let _ = init_telemetry(TelemetryConfig::new("carto-dst").with_log_level("warn"));
}

fn facade_config() -> FacadeConfig {
    let mut config = FacadeConfig::default();
    config.engine.camera = "lidar0".into();
    config.engine.movement_sensor = "imu0".into();
    config.engine.data_dir = "/tmp/carto-dst".into();
    config
}

fn scan(i: usize) -> Bytes {
    pcd::encode(&[[i as f32, 0.0, 0.0], [i as f32, 1.0, 0.0]])
}

async fn call(facade: &CartoFacade<SimBinding>, i: usize) -> carto_core::Result<()> {
    match i % 4 {
        0 => {
            facade
                .add_lidar_reading(TIMEOUT, "lidar0", scan(i), Utc::now())
                .await
        }
        1 => facade.position(TIMEOUT).await.map(|_| ()),
        2 => facade.internal_state(TIMEOUT).await.map(|_| ()),
        _ => {
            facade
                .add_imu_reading(TIMEOUT, "imu0", Default::default(), Utc::now())
                .await
        }
    }
}

// =============================================================================
// Serialization
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dst_concurrent_callers_never_overlap() {
    init_logging();
    let binding = SimBinding::new().with_call_delay(Duration::from_millis(1));
    let probe = binding.probe();
    let facade = Arc::new(CartoFacade::new(binding, facade_config()).unwrap());
    facade.initialize(TIMEOUT).await.unwrap();

    let callers = (0..CALLERS_COUNT).map(|i| {
        let facade = facade.clone();
        tokio::spawn(async move { call(&facade, i).await })
    });

    for result in join_all(callers).await {
        result.unwrap().unwrap();
    }

    assert_eq!(probe.overlaps(), 0);
    assert_eq!(probe.calls(), CALLERS_COUNT as u64 + 1);
    assert!(probe
        .log()
        .iter()
        .all(|record| record.thread.as_deref() == Some(WORKER_THREAD_NAME)));
    assert_eq!(facade.stats().requests_served, CALLERS_COUNT as u64 + 1);

    facade.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dst_concurrent_callers_under_faults() {
    init_logging();
    let rng = DeterministicRng::from_env_or_random();
    let faults = Arc::new(
        FaultInjector::new(rng)
            .rule(FaultRule::new(FaultType::LockUnavailable, 0.2).skip_first(1))
            .latency(0.1, 1, 3),
    );
    let binding = SimBinding::new().with_faults(faults.clone());
    let probe = binding.probe();
    let facade = Arc::new(CartoFacade::new(binding, facade_config()).unwrap());
    facade.initialize(TIMEOUT).await.unwrap();

    let callers = (0..CALLERS_COUNT).map(|i| {
        let facade = facade.clone();
        tokio::spawn(async move { call(&facade, i).await })
    });

    let mut lock_failures = 0;
    for result in join_all(callers).await {
        match result.unwrap() {
            Ok(()) => {}
            Err(e @ Error::LockUnavailable { .. }) => {
                assert!(e.is_retriable());
                lock_failures += 1;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(probe.overlaps(), 0);
    assert_eq!(lock_failures, faults.stats()[0].hits);
    assert_eq!(facade.stats().engine_errors, lock_failures);

    facade.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dst_blocked_callers_served_in_arrival_order() {
    init_logging();
    let binding = SimBinding::new().with_call_delay(Duration::from_millis(100));
    let probe = binding.probe();
    let facade = Arc::new(CartoFacade::new(binding, facade_config()).unwrap());
    facade.initialize(TIMEOUT).await.unwrap();

    let arrivals = [
        Operation::GetPosition,
        Operation::GetInternalState,
        Operation::GetPointCloudMap,
        Operation::Start,
        Operation::Stop,
    ];

    let mut callers = Vec::new();
    for operation in arrivals {
        let facade = facade.clone();
        callers.push(tokio::spawn(async move {
            facade.request(operation, Params::None, TIMEOUT).await
        }));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    join_all(callers).await;

    let mut expected = vec![Operation::Initialize];
    expected.extend(arrivals);
    assert_eq!(probe.operations(), expected);
    assert_eq!(probe.overlaps(), 0);

    facade.shutdown().await.unwrap();
}

// =============================================================================
// Protocol Faults
// =============================================================================

#[tokio::test]
async fn test_dst_protocol_fault_keeps_loop_alive() {
    init_logging();
    let binding = SimBinding::new();
    let probe = binding.probe();
    let facade = CartoFacade::new(binding, facade_config()).unwrap();
    facade.initialize(TIMEOUT).await.unwrap();

    let reading = carto_core::LidarReading::new("lidar0", scan(1), Utc::now()).unwrap();
    let err = facade
        .request(Operation::GetPosition, Params::LidarReading(reading), TIMEOUT)
        .await
        .unwrap_err();
    assert!(err.is_protocol_fault());
    assert_eq!(probe.count(Operation::GetPosition), 0);

    let err = facade
        .request(Operation::AddLidarReading, Params::None, TIMEOUT)
        .await
        .unwrap_err();
    assert!(err.is_protocol_fault());

    facade.position(TIMEOUT).await.unwrap();
    let stats = facade.stats();
    assert_eq!(stats.protocol_faults, 2);
    assert_eq!(stats.successes(), 2);

    facade.shutdown().await.unwrap();
}

// =============================================================================
// Determinism
// =============================================================================

async fn outcomes_for_seed(seed: u64) -> Vec<bool> {
    let faults = Arc::new(
        FaultInjector::new(DeterministicRng::new(seed))
            .rule(FaultRule::new(FaultType::LockUnavailable, 0.5).skip_first(1)),
    );
    let facade =
        CartoFacade::new(SimBinding::new().with_faults(faults), facade_config()).unwrap();
    facade.initialize(TIMEOUT).await.unwrap();

    let mut outcomes = Vec::new();
    for _ in 0..32 {
        outcomes.push(facade.position(TIMEOUT).await.is_ok());
    }
    facade.shutdown().await.unwrap();
    outcomes
}

#[tokio::test]
async fn test_dst_same_seed_same_outcomes() {
    init_logging();
    let seed = DeterministicRng::from_env_or_random().seed();

    let first = outcomes_for_seed(seed).await;
    let second = outcomes_for_seed(seed).await;
    assert_eq!(first, second, "seed {} diverged", seed);
}
