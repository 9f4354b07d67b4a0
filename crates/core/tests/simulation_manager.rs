//! Lifecycle and manager behaviour across threads
//!
//! Run with: cargo test --test simulation_manager

use fire_spread_core::simulation::lifecycle::apply;
use fire_spread_core::{
    ChannelSink, EventPayload, EventStream, FireSpreadError, GridConfig, LifecycleCommand,
    ManagerConfig, Meters, NullSink, Scenario, Seconds, SimulationId, SimulationManager,
    SimulationStatus,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config() -> ManagerConfig {
    ManagerConfig {
        max_simulations: 4,
        max_concurrent: 2,
        step_interval: Duration::from_millis(5),
        max_simulated_time: None,
        max_fire_cells: None,
        grid: GridConfig {
            padding: Meters::new(100.0),
            ..GridConfig::default()
        },
        ..ManagerConfig::default()
    }
}

fn scenario() -> Scenario {
    Scenario::uniform("grassland", 6.0, 270.0, 25.0).with_ignition(-31.95, 115.86, 0.0)
}

/// Wait for a control event of `id` matching `accept`
fn wait_for(
    stream: &EventStream,
    id: &SimulationId,
    timeout: Duration,
    accept: impl Fn(&EventPayload) -> bool,
) -> Option<EventPayload> {
    let deadline = Instant::now() + timeout;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match stream.recv_control_timeout(remaining) {
            Ok(event) if event.simulation_id == *id && accept(&event.payload) => {
                return Some(event.payload)
            }
            Ok(_) => {}
            Err(_) => return None,
        }
    }
    None
}

fn changed_to(status: SimulationStatus) -> impl Fn(&EventPayload) -> bool {
    move |payload| matches!(payload, EventPayload::StatusChanged(change) if change.to == status)
}

#[test]
fn test_transition_table_is_exhaustive() {
    use LifecycleCommand as C;
    use SimulationStatus as S;

    for status in S::ALL {
        for command in C::ALL {
            let expected = match (status, command) {
                (S::Created, C::Start) | (S::Paused, C::Start | C::Resume) => Some(S::Running),
                (S::Running, C::Pause) => Some(S::Paused),
                (S::Running | S::Paused, C::Stop) => Some(S::Stopped),
                _ => None,
            };
            match expected {
                Some(to) => assert_eq!(apply(status, command), Ok(to), "{} {}", command, status),
                None => assert_eq!(
                    apply(status, command),
                    Err(FireSpreadError::InvalidStateTransition { status, command })
                ),
            }
        }
    }
}

#[test]
fn test_capacity_limit_leaves_size_unchanged() {
    let manager = SimulationManager::new(config(), Arc::new(NullSink)).unwrap();
    for _ in 0..4 {
        manager.create(&scenario()).unwrap();
    }
    assert_eq!(
        manager.create(&scenario()),
        Err(FireSpreadError::CapacityExceeded { limit: 4 })
    );
    assert_eq!(manager.len(), 4);
    assert_eq!(manager.list().unwrap().len(), 4);
}

#[test]
fn test_concurrency_limit_leaves_others_running() {
    let manager = SimulationManager::new(
        ManagerConfig {
            step_interval: Duration::from_secs(3600),
            ..config()
        },
        Arc::new(NullSink),
    )
    .unwrap();
    let ids: Vec<SimulationId> = (0..3).map(|_| manager.create(&scenario()).unwrap()).collect();

    manager.start(&ids[0]).unwrap();
    manager.start(&ids[1]).unwrap();
    assert_eq!(
        manager.start(&ids[2]),
        Err(FireSpreadError::ConcurrencyLimitExceeded { limit: 2 })
    );
    assert_eq!(manager.status(&ids[0]), Ok(SimulationStatus::Running));
    assert_eq!(manager.status(&ids[1]), Ok(SimulationStatus::Running));
    assert_eq!(manager.status(&ids[2]), Ok(SimulationStatus::Created));

    // A paused run frees its slot
    manager.pause(&ids[1]).unwrap();
    manager.start(&ids[2]).unwrap();
    assert_eq!(
        manager.resume(&ids[1]),
        Err(FireSpreadError::ConcurrencyLimitExceeded { limit: 2 })
    );
    assert_eq!(manager.status(&ids[1]), Ok(SimulationStatus::Paused));
}

#[test]
fn test_run_completes_at_simulated_time_limit() {
    let (sink, stream) = ChannelSink::new(64);
    let manager = SimulationManager::new(
        ManagerConfig {
            time_step: Seconds::new(60.0),
            max_simulated_time: Some(Seconds::new(300.0)),
            ..config()
        },
        Arc::new(sink),
    )
    .unwrap();
    let id = manager.create(&scenario().with_id("perth-hills")).unwrap();
    manager.start(&id).unwrap();

    let completed = wait_for(
        &stream,
        &id,
        Duration::from_secs(10),
        changed_to(SimulationStatus::Completed),
    );
    assert!(completed.is_some(), "simulation never completed");

    let snapshot = manager.get(&id).unwrap();
    assert_eq!(snapshot.summary.status, SimulationStatus::Completed);
    assert_eq!(snapshot.summary.simulated_time, Seconds::new(300.0));
    assert_eq!(snapshot.summary.step, 5);
    assert!(snapshot.cells.len() > 1);
    assert!(snapshot.summary.burn.burned_area > 0.0);

    // Completed is final
    assert!(matches!(
        manager.start(&id),
        Err(FireSpreadError::InvalidStateTransition { .. })
    ));
    manager.delete(&id).unwrap();
    assert!(manager.is_empty());
}

#[test]
fn test_run_completes_at_fire_cell_limit() {
    let (sink, stream) = ChannelSink::new(64);
    let manager = SimulationManager::new(
        ManagerConfig {
            max_fire_cells: Some(8),
            ..config()
        },
        Arc::new(sink),
    )
    .unwrap();
    let id = manager.create(&scenario()).unwrap();
    manager.start(&id).unwrap();

    let completed = wait_for(
        &stream,
        &id,
        Duration::from_secs(10),
        changed_to(SimulationStatus::Completed),
    );
    assert!(completed.is_some(), "simulation never completed");

    let snapshot = manager.get(&id).unwrap();
    let burn = snapshot.summary.burn;
    assert!(burn.burning_cells + burn.burned_cells >= 8);
    // Stopped at the limit, not by burning out
    assert!(burn.burning_cells > 0);
}

#[test]
fn test_pause_freezes_and_resume_continues() {
    let (sink, stream) = ChannelSink::new(16);
    let manager = SimulationManager::new(config(), Arc::new(sink)).unwrap();
    let id = manager.create(&scenario()).unwrap();
    manager.start(&id).unwrap();
    thread::sleep(Duration::from_millis(40));

    manager.pause(&id).unwrap();
    let frozen = manager.get(&id).unwrap().summary.simulated_time;
    thread::sleep(Duration::from_millis(40));
    assert_eq!(manager.get(&id).unwrap().summary.simulated_time, frozen);

    manager.resume(&id).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while manager.get(&id).unwrap().summary.simulated_time <= frozen {
        assert!(Instant::now() < deadline, "resumed simulation never stepped");
        thread::sleep(Duration::from_millis(5));
    }

    manager.stop(&id).unwrap();
    assert!(wait_for(
        &stream,
        &id,
        Duration::from_secs(1),
        changed_to(SimulationStatus::Stopped)
    )
    .is_some());
}

#[test]
fn test_run_limit_stops_with_timeout_error() {
    let (sink, stream) = ChannelSink::new(16);
    let manager = SimulationManager::new(
        ManagerConfig {
            max_run_duration: Duration::from_millis(30),
            grid: GridConfig {
                padding: Meters::new(500.0),
                ..GridConfig::default()
            },
            ..config()
        },
        Arc::new(sink),
    )
    .unwrap();
    let id = manager.create(&scenario()).unwrap();
    manager.start(&id).unwrap();

    let timeout = wait_for(&stream, &id, Duration::from_secs(10), |payload| {
        matches!(payload, EventPayload::Error(FireSpreadError::TimeoutExceeded { .. }))
    });
    assert_eq!(
        timeout,
        Some(EventPayload::Error(FireSpreadError::TimeoutExceeded {
            limit: Duration::from_millis(30)
        }))
    );
    assert_eq!(manager.status(&id), Ok(SimulationStatus::Stopped));
}

#[test]
fn test_sequence_numbers_increase() {
    let (sink, stream) = ChannelSink::new(1024);
    let manager = SimulationManager::new(
        ManagerConfig {
            max_simulated_time: Some(Seconds::new(120.0)),
            ..config()
        },
        Arc::new(sink),
    )
    .unwrap();
    let a = manager.create(&scenario()).unwrap();
    let b = manager.create(&scenario()).unwrap();
    manager.start(&a).unwrap();
    manager.start(&b).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while manager.stats().unwrap().completed < 2 {
        assert!(Instant::now() < deadline, "simulations never completed");
        thread::sleep(Duration::from_millis(5));
    }
    manager.shutdown();

    let events = stream.drain();
    assert!(events.windows(2).all(|w| w[0].sequence < w[1].sequence));
    let stats = manager.stats().unwrap();
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.running, 0);
}
