//! Simulation manager
//!
//! Owns every simulation, admits runs against the capacity and concurrency
//! limits and drives each running simulation from its own stepping thread.
//!
//! # Locking
//!
//! Locks are always taken in this order, never the reverse:
//!
//! 1. the id → slot map (`RwLock`)
//! 2. a slot's worker handle (`Mutex`)
//! 3. a slot's simulation (`Mutex`)
//!
//! Stepping threads only ever take the simulation lock, so joining a worker
//! while holding (1) or (2) cannot deadlock. Events are published after the
//! simulation lock is released.

use crate::core_types::environment::Scenario;
use crate::error::{lock_poisoned, FireSpreadError, Result};
use crate::simulation::config::ManagerConfig;
use crate::simulation::events::{EventPayload, NotificationSink, SimulationEvent};
use crate::simulation::fire_simulation::{
    Simulation, SimulationId, SimulationSnapshot, SimulationSummary, StepOutcome,
};
use crate::simulation::lifecycle::{apply, LifecycleCommand, SimulationStatus, StatusChange};
use crossbeam_channel::Sender;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Aggregate counts reported by [`SimulationManager::stats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    pub total: usize,
    pub created: usize,
    pub running: usize,
    pub paused: usize,
    pub stopped: usize,
    pub completed: usize,
    pub failed: usize,
    /// Burning cells across every tracked simulation
    pub burning_cells: usize,
    pub max_simulations: usize,
    pub max_concurrent: usize,
}

impl ManagerStats {
    fn count(&mut self, status: SimulationStatus) {
        let counter = match status {
            SimulationStatus::Created => &mut self.created,
            SimulationStatus::Running => &mut self.running,
            SimulationStatus::Paused => &mut self.paused,
            SimulationStatus::Stopped => &mut self.stopped,
            SimulationStatus::Completed => &mut self.completed,
            SimulationStatus::Failed => &mut self.failed,
        };
        *counter += 1;
    }
}

/// Stamps events with the manager-wide sequence and hands them to the sink
#[derive(Clone)]
struct EventPublisher {
    sink: Arc<dyn NotificationSink>,
    sequence: Arc<AtomicU64>,
}

impl EventPublisher {
    fn publish(&self, simulation_id: &SimulationId, payload: EventPayload) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.sink.publish(SimulationEvent {
            simulation_id: simulation_id.clone(),
            sequence,
            payload,
        });
    }

    fn publish_all(&self, simulation_id: &SimulationId, payloads: Vec<EventPayload>) {
        for payload in payloads {
            self.publish(simulation_id, payload);
        }
    }
}

struct StepWorker {
    cancel: Sender<()>,
    handle: JoinHandle<()>,
}

impl StepWorker {
    fn shut_down(self, id: &SimulationId) {
        // The worker may already have exited on its own
        let _ = self.cancel.send(());
        if self.handle.join().is_err() {
            error!("Stepping thread for {} panicked", id);
        }
    }
}

/// One tracked simulation and its stepping thread
struct SimulationSlot {
    id: SimulationId,
    simulation: Mutex<Simulation>,
    worker: Mutex<Option<StepWorker>>,
    /// Last known status, readable without the simulation lock
    status: AtomicU8,
}

impl SimulationSlot {
    fn new(simulation: Simulation) -> Self {
        Self {
            id: simulation.id().clone(),
            status: AtomicU8::new(simulation.status().as_u8()),
            simulation: Mutex::new(simulation),
            worker: Mutex::new(None),
        }
    }

    fn status(&self) -> SimulationStatus {
        SimulationStatus::from_u8(self.status.load(Ordering::SeqCst))
            .unwrap_or(SimulationStatus::Failed)
    }

    fn mirror(&self, status: SimulationStatus) {
        self.status.store(status.as_u8(), Ordering::SeqCst);
    }
}

/// Owns and schedules simulations
///
/// All methods take `&self` and may be called from any thread.
///
/// ```no_run
/// use fire_spread_core::{ManagerConfig, NullSink, Scenario, SimulationManager};
/// use std::sync::Arc;
///
/// let manager = SimulationManager::new(ManagerConfig::default(), Arc::new(NullSink))?;
/// let scenario = Scenario::uniform("grassland", 5.0, 270.0, 30.0).with_ignition(-35.3, 149.1, 0.0);
/// let id = manager.create(&scenario)?;
/// manager.start(&id)?;
/// # Ok::<(), fire_spread_core::FireSpreadError>(())
/// ```
pub struct SimulationManager {
    config: ManagerConfig,
    simulations: RwLock<FxHashMap<SimulationId, Arc<SimulationSlot>>>,
    publisher: EventPublisher,
}

impl SimulationManager {
    /// Manager publishing to `sink`
    ///
    /// # Errors
    /// `InvalidParameters` if `config` does not validate.
    pub fn new(config: ManagerConfig, sink: Arc<dyn NotificationSink>) -> Result<Self> {
        config.validate()?;
        info!(
            "Simulation manager ready: {} simulations, {} concurrent, step every {:?}",
            config.max_simulations, config.max_concurrent, config.step_interval
        );
        Ok(Self {
            config,
            simulations: RwLock::new(FxHashMap::default()),
            publisher: EventPublisher {
                sink,
                sequence: Arc::new(AtomicU64::new(0)),
            },
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Validate `scenario` and track a new simulation in Created
    ///
    /// Validation happens before any limit is checked, and a failed create
    /// leaves nothing behind.
    pub fn create(&self, scenario: &Scenario) -> Result<SimulationId> {
        let id = scenario
            .id
            .as_deref()
            .map_or_else(SimulationId::generate, SimulationId::from);
        let simulation = Simulation::new(id.clone(), scenario, &self.config)?;

        let mut simulations = self
            .simulations
            .write()
            .map_err(lock_poisoned("simulation map"))?;
        if simulations.contains_key(&id) {
            return Err(FireSpreadError::DuplicateSimulation(id.to_string()));
        }
        if simulations.len() >= self.config.max_simulations {
            warn!(
                "Rejected {}: {} simulations already tracked",
                id,
                simulations.len()
            );
            return Err(FireSpreadError::CapacityExceeded {
                limit: self.config.max_simulations,
            });
        }
        simulations.insert(id.clone(), Arc::new(SimulationSlot::new(simulation)));
        info!("Created simulation {} ({} tracked)", id, simulations.len());
        Ok(id)
    }

    /// Created or Paused → Running, spawning the stepping thread
    pub fn start(&self, id: &SimulationId) -> Result<()> {
        self.enter_running(id, false)
    }

    /// Paused → Running
    pub fn resume(&self, id: &SimulationId) -> Result<()> {
        self.enter_running(id, true)
    }

    /// Running → Paused; the stepping thread is stopped and joined
    pub fn pause(&self, id: &SimulationId) -> Result<()> {
        self.leave_running(id, Simulation::pause)
    }

    /// Running or Paused → Stopped
    pub fn stop(&self, id: &SimulationId) -> Result<()> {
        self.leave_running(id, Simulation::stop)
    }

    /// Forget a Created or terminal simulation and drop its grid
    pub fn delete(&self, id: &SimulationId) -> Result<()> {
        let slot = {
            let mut simulations = self
                .simulations
                .write()
                .map_err(lock_poisoned("simulation map"))?;
            let slot = simulations
                .get(id)
                .ok_or_else(|| FireSpreadError::SimulationNotFound(id.to_string()))?;
            let status = slot
                .simulation
                .lock()
                .map_err(lock_poisoned("simulation"))?
                .status();
            if status.is_active() {
                return Err(FireSpreadError::SimulationActive);
            }
            simulations.remove(id)
        };

        if let Some(slot) = slot {
            let worker = slot
                .worker
                .lock()
                .map_err(lock_poisoned("worker handle"))?
                .take();
            if let Some(worker) = worker {
                worker.shut_down(id);
            }
            info!("Deleted simulation {}", id);
        }
        Ok(())
    }

    /// Full state including every non-Unburned cell
    pub fn get(&self, id: &SimulationId) -> Result<SimulationSnapshot> {
        let slot = self.slot(id)?;
        let simulation = slot.simulation.lock().map_err(lock_poisoned("simulation"))?;
        Ok(simulation.snapshot())
    }

    /// Summaries of every tracked simulation, oldest first
    pub fn list(&self) -> Result<Vec<SimulationSummary>> {
        let mut summaries = self
            .slots()?
            .iter()
            .map(|slot| {
                slot.simulation
                    .lock()
                    .map(|simulation| simulation.summary())
                    .map_err(lock_poisoned("simulation"))
            })
            .collect::<Result<Vec<_>>>()?;
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(summaries)
    }

    pub fn stats(&self) -> Result<ManagerStats> {
        let mut stats = ManagerStats {
            max_simulations: self.config.max_simulations,
            max_concurrent: self.config.max_concurrent,
            ..ManagerStats::default()
        };
        for slot in self.slots()? {
            let simulation = slot.simulation.lock().map_err(lock_poisoned("simulation"))?;
            stats.total += 1;
            stats.count(simulation.status());
            stats.burning_cells += simulation.engine().burning_count();
        }
        Ok(stats)
    }

    /// Status without taking the simulation lock
    pub fn status(&self, id: &SimulationId) -> Result<SimulationStatus> {
        Ok(self.slot(id)?.status())
    }

    pub fn len(&self) -> usize {
        self.simulations.read().map_or(0, |simulations| simulations.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every active simulation and join every stepping thread
    ///
    /// Safe to call more than once; also runs on drop.
    pub fn shutdown(&self) {
        let slots = match self.slots() {
            Ok(slots) => slots,
            Err(err) => {
                error!("Shutdown skipped: {}", err);
                return;
            }
        };

        for slot in slots {
            let Ok(mut worker) = slot.worker.lock() else {
                error!("Worker handle for {} poisoned during shutdown", slot.id);
                continue;
            };
            let change = match slot.simulation.lock() {
                Ok(mut simulation) => {
                    let change = simulation.force_stop();
                    slot.mirror(simulation.status());
                    change
                }
                Err(_) => None,
            };
            if let Some(change) = change {
                self.publisher
                    .publish(&slot.id, EventPayload::StatusChanged(change));
            }
            if let Some(worker) = worker.take() {
                worker.shut_down(&slot.id);
            }
        }
        debug!("Simulation manager shut down");
    }

    fn slot(&self, id: &SimulationId) -> Result<Arc<SimulationSlot>> {
        self.simulations
            .read()
            .map_err(lock_poisoned("simulation map"))?
            .get(id)
            .cloned()
            .ok_or_else(|| FireSpreadError::SimulationNotFound(id.to_string()))
    }

    fn slots(&self) -> Result<Vec<Arc<SimulationSlot>>> {
        Ok(self
            .simulations
            .read()
            .map_err(lock_poisoned("simulation map"))?
            .values()
            .cloned()
            .collect())
    }

    fn enter_running(&self, id: &SimulationId, resume: bool) -> Result<()> {
        // Held for the whole admission so two starts cannot both pass the count
        let simulations = self
            .simulations
            .write()
            .map_err(lock_poisoned("simulation map"))?;
        let slot = simulations
            .get(id)
            .cloned()
            .ok_or_else(|| FireSpreadError::SimulationNotFound(id.to_string()))?;

        let running = simulations
            .values()
            .filter(|other| other.id != *id && other.status() == SimulationStatus::Running)
            .count();

        let mut worker = slot.worker.lock().map_err(lock_poisoned("worker handle"))?;
        let (change, delta) = {
            let mut simulation = slot.simulation.lock().map_err(lock_poisoned("simulation"))?;
            // Invalid commands are reported before the limit
            let command = if resume {
                LifecycleCommand::Resume
            } else {
                LifecycleCommand::Start
            };
            apply(simulation.status(), command)?;
            if running >= self.config.max_concurrent {
                warn!("Rejected start of {}: {} already running", id, running);
                return Err(FireSpreadError::ConcurrencyLimitExceeded {
                    limit: self.config.max_concurrent,
                });
            }
            let entered = if resume {
                simulation.resume()
            } else {
                simulation.start()
            }?;
            slot.mirror(simulation.status());
            entered
        };

        drop(simulations);

        if let Some(stale) = worker.take() {
            stale.shut_down(id);
        }
        // Announced before the worker exists so no step event can precede them
        self.publisher.publish(id, EventPayload::StatusChanged(change));
        if !delta.is_empty() {
            self.publisher.publish(id, EventPayload::StepDelta(delta));
        }

        match self.spawn_worker(Arc::clone(&slot)) {
            Ok(spawned) => {
                *worker = Some(spawned);
                Ok(())
            }
            Err(err) => {
                self.abandon_run(&slot, err.clone());
                Err(err)
            }
        }
    }

    /// Fail a simulation that entered Running but has no stepping thread
    fn abandon_run(&self, slot: &SimulationSlot, err: FireSpreadError) {
        let change = match slot.simulation.lock() {
            Ok(mut simulation) => {
                let change = simulation.fail(err.clone());
                slot.mirror(simulation.status());
                change
            }
            Err(_) => {
                slot.mirror(SimulationStatus::Failed);
                None
            }
        };
        if let Some(change) = change {
            self.publisher.publish(&slot.id, EventPayload::StatusChanged(change));
        }
        self.publisher.publish(&slot.id, EventPayload::Error(err));
    }

    fn leave_running(
        &self,
        id: &SimulationId,
        command: fn(&mut Simulation) -> Result<StatusChange>,
    ) -> Result<()> {
        let slot = self.slot(id)?;
        let mut worker = slot.worker.lock().map_err(lock_poisoned("worker handle"))?;
        let change = {
            let mut simulation = slot.simulation.lock().map_err(lock_poisoned("simulation"))?;
            let change = command(&mut simulation)?;
            slot.mirror(simulation.status());
            change
        };
        if let Some(worker) = worker.take() {
            worker.shut_down(id);
        }
        drop(worker);

        self.publisher.publish(id, EventPayload::StatusChanged(change));
        Ok(())
    }

    fn spawn_worker(&self, slot: Arc<SimulationSlot>) -> Result<StepWorker> {
        let (cancel, cancelled) = crossbeam_channel::bounded::<()>(1);
        let publisher = self.publisher.clone();
        let interval = self.config.step_interval;
        let max_run = self.config.max_run_duration;
        let name = format!("step-{}", slot.id);

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let ticker = crossbeam_channel::tick(interval);
                debug!("Stepping thread for {} started", slot.id);
                loop {
                    crossbeam_channel::select! {
                        recv(cancelled) -> _ => break,
                        recv(ticker) -> _ => {
                            if !step_once(&slot, &publisher, max_run) {
                                break;
                            }
                            // An overrun tick is dropped, not replayed
                            let _ = ticker.try_recv();
                        }
                    }
                }
                debug!("Stepping thread for {} exited", slot.id);
            })
            .map_err(|err| FireSpreadError::StepFailed(format!("spawn failed: {err}")))?;

        Ok(StepWorker { cancel, handle })
    }
}

impl Drop for SimulationManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Run one step of `slot`; `false` once the simulation is no longer Running
fn step_once(slot: &SimulationSlot, publisher: &EventPublisher, max_run: Duration) -> bool {
    let (payloads, keep_going) = {
        let Ok(mut simulation) = slot.simulation.lock() else {
            error!("Simulation {} lock poisoned; stepping abandoned", slot.id);
            return false;
        };
        if simulation.status() != SimulationStatus::Running {
            return false;
        }

        let mut payloads = Vec::new();
        if simulation.run_time() > max_run {
            warn!(
                "Simulation {} exceeded its {:?} run limit at {}",
                slot.id,
                max_run,
                simulation.simulated_time()
            );
            if let Some(change) = simulation.force_stop() {
                payloads.push(EventPayload::StatusChanged(change));
            }
            payloads.push(EventPayload::Error(FireSpreadError::TimeoutExceeded {
                limit: max_run,
            }));
        } else {
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| simulation.step())) {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let err = FireSpreadError::StepFailed(panic_message(panic.as_ref()));
                    StepOutcome {
                        status_change: simulation.fail(err.clone()),
                        error: Some(err),
                        ..StepOutcome::default()
                    }
                }
            };
            if let Some(delta) = &outcome.delta {
                debug!(
                    "Simulation {} step {} at {}: {} changes, {} burning",
                    slot.id,
                    delta.step,
                    delta.time,
                    delta.changes.len(),
                    simulation.engine().burning_count()
                );
            }
            payloads.extend(outcome_payloads(outcome));
        }

        slot.mirror(simulation.status());
        (payloads, simulation.status() == SimulationStatus::Running)
    };

    publisher.publish_all(&slot.id, payloads);
    keep_going
}

/// Publish order: delta, warnings, status change, error
fn outcome_payloads(outcome: StepOutcome) -> Vec<EventPayload> {
    let mut payloads = Vec::new();
    if let Some(delta) = outcome.delta {
        payloads.push(EventPayload::StepDelta(delta));
    }
    payloads.extend(outcome.warnings.into_iter().map(EventPayload::Warning));
    if let Some(change) = outcome.status_change {
        payloads.push(EventPayload::StatusChanged(change));
    }
    if let Some(err) = outcome.error {
        payloads.push(EventPayload::Error(err));
    }
    payloads
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "step panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::units::{Meters, Seconds};
    use crate::grid::GridConfig;
    use crate::simulation::events::{MemorySink, NullSink};
    use crate::simulation::config::MIN_STEP_INTERVAL;
    use crate::solver::StepDelta;
    use std::time::Instant;

    fn config() -> ManagerConfig {
        ManagerConfig {
            max_simulations: 3,
            max_concurrent: 1,
            // Long enough that no tick fires during a unit test
            step_interval: Duration::from_secs(3600),
            grid: GridConfig {
                padding: Meters::new(100.0),
                ..GridConfig::default()
            },
            ..ManagerConfig::default()
        }
    }

    fn scenario() -> Scenario {
        Scenario::uniform("grassland", 3.0, 270.0, 20.0).with_ignition(-35.0, 149.0, 0.0)
    }

    fn manager() -> SimulationManager {
        SimulationManager::new(config(), Arc::new(NullSink)).unwrap()
    }

    /// Fast ticks and no run limits other than wall-clock time
    fn ticking_config(step_interval: Duration) -> ManagerConfig {
        ManagerConfig {
            max_concurrent: 2,
            step_interval,
            max_simulated_time: None,
            max_fire_cells: None,
            ..config()
        }
    }

    fn poll_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        done()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = ManagerConfig {
            max_simulations: 0,
            ..ManagerConfig::default()
        };
        assert!(SimulationManager::new(config, Arc::new(NullSink)).is_err());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let manager = manager();
        let id = manager.create(&scenario().with_id("fire-1")).unwrap();
        assert_eq!(id.as_str(), "fire-1");
        assert_eq!(
            manager.create(&scenario().with_id("fire-1")),
            Err(FireSpreadError::DuplicateSimulation("fire-1".into()))
        );
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_invalid_scenario_leaves_nothing() {
        let manager = manager();
        let bad = Scenario::uniform("swamp", 3.0, 270.0, 20.0).with_ignition(-35.0, 149.0, 0.0);
        assert_eq!(
            manager.create(&bad),
            Err(FireSpreadError::UnknownFuelType("swamp".into()))
        );
        assert!(manager.is_empty());
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let manager = manager();
        let id = SimulationId::from("missing");
        assert!(matches!(
            manager.start(&id),
            Err(FireSpreadError::SimulationNotFound(_))
        ));
        assert!(matches!(
            manager.get(&id),
            Err(FireSpreadError::SimulationNotFound(_))
        ));
        assert!(matches!(
            manager.delete(&id),
            Err(FireSpreadError::SimulationNotFound(_))
        ));
    }

    #[test]
    fn test_start_publishes_status_then_ignition() {
        let sink = Arc::new(MemorySink::new());
        let manager = SimulationManager::new(config(), sink.clone()).unwrap();
        let id = manager.create(&scenario()).unwrap();
        manager.start(&id).unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].payload,
            EventPayload::StatusChanged(StatusChange {
                from: SimulationStatus::Created,
                to: SimulationStatus::Running,
            })
        );
        assert!(matches!(&events[1].payload, EventPayload::StepDelta(delta) if delta.changes.len() == 1));
        assert!(events[0].sequence < events[1].sequence);
        assert_eq!(manager.status(&id), Ok(SimulationStatus::Running));
    }

    #[test]
    fn test_delete_requires_inactive() {
        let manager = manager();
        let id = manager.create(&scenario()).unwrap();
        manager.start(&id).unwrap();
        assert_eq!(manager.delete(&id), Err(FireSpreadError::SimulationActive));

        manager.pause(&id).unwrap();
        assert_eq!(manager.delete(&id), Err(FireSpreadError::SimulationActive));

        manager.stop(&id).unwrap();
        manager.delete(&id).unwrap();
        assert!(manager.is_empty());
    }

    #[test]
    fn test_stats_count_by_status() {
        let manager = SimulationManager::new(
            ManagerConfig {
                max_concurrent: 2,
                ..config()
            },
            Arc::new(NullSink),
        )
        .unwrap();
        let a = manager.create(&scenario()).unwrap();
        let b = manager.create(&scenario()).unwrap();
        let _c = manager.create(&scenario()).unwrap();
        manager.start(&a).unwrap();
        manager.start(&b).unwrap();
        manager.pause(&b).unwrap();

        let stats = manager.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.created, 1);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.paused, 1);
        assert_eq!(stats.burning_cells, 2);
        assert_eq!(stats.max_concurrent, 2);
    }

    #[test]
    fn test_shutdown_stops_active_simulations() {
        let manager = manager();
        let id = manager.create(&scenario()).unwrap();
        manager.start(&id).unwrap();
        manager.shutdown();
        assert_eq!(manager.status(&id), Ok(SimulationStatus::Stopped));
        // Idempotent
        manager.shutdown();
    }

    #[test]
    fn test_shutdown_returns_at_minimum_step_interval() {
        let manager =
            SimulationManager::new(ticking_config(MIN_STEP_INTERVAL), Arc::new(NullSink)).unwrap();
        let id = manager.create(&scenario()).unwrap();
        manager.start(&id).unwrap();
        assert!(poll_until(Duration::from_secs(5), || {
            manager.get(&id).is_ok_and(|s| s.summary.step > 0)
        }));

        let started = Instant::now();
        manager.shutdown();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(manager.status(&id).unwrap().is_terminal());
    }

    #[test]
    fn test_step_failure_fails_only_that_simulation() {
        let sink = Arc::new(MemorySink::new());
        let manager =
            SimulationManager::new(ticking_config(Duration::from_millis(5)), sink.clone()).unwrap();
        let failing = manager.create(&scenario()).unwrap();
        let healthy = manager.create(&scenario()).unwrap();
        manager
            .slot(&failing)
            .unwrap()
            .simulation
            .lock()
            .unwrap()
            .inject_step_panic();

        manager.start(&failing).unwrap();
        manager.start(&healthy).unwrap();
        assert!(poll_until(Duration::from_secs(5), || {
            manager.status(&failing) == Ok(SimulationStatus::Failed)
        }));

        let events = sink.events();
        let failed_at = events
            .iter()
            .find(|e| {
                e.simulation_id == failing
                    && matches!(
                        e.payload,
                        EventPayload::StatusChanged(StatusChange {
                            to: SimulationStatus::Failed,
                            ..
                        })
                    )
            })
            .map(|e| e.sequence)
            .unwrap();
        let error_at = events
            .iter()
            .find(|e| {
                e.simulation_id == failing
                    && matches!(&e.payload, EventPayload::Error(FireSpreadError::StepFailed(m)) if m.contains("injected"))
            })
            .map(|e| e.sequence)
            .unwrap();
        assert!(failed_at < error_at);
        assert!(matches!(
            manager.get(&failing).unwrap().summary.failure,
            Some(FireSpreadError::StepFailed(_))
        ));

        // The sibling keeps stepping after the failure
        assert!(poll_until(Duration::from_secs(5), || {
            sink.events().iter().any(|e| {
                e.simulation_id == healthy
                    && e.sequence > error_at
                    && matches!(e.payload, EventPayload::StepDelta(_))
            })
        }));
        assert_ne!(manager.status(&healthy), Ok(SimulationStatus::Failed));
    }

    #[test]
    fn test_abandoned_run_is_failed_and_reported() {
        let sink = Arc::new(MemorySink::new());
        let manager = SimulationManager::new(config(), sink.clone()).unwrap();
        let id = manager.create(&scenario()).unwrap();
        manager.start(&id).unwrap();
        let slot = manager.slot(&id).unwrap();

        let err = FireSpreadError::StepFailed("spawn failed: no threads".into());
        manager.abandon_run(&slot, err.clone());

        assert_eq!(manager.status(&id), Ok(SimulationStatus::Failed));
        let payloads: Vec<EventPayload> = sink.events().into_iter().skip(2).map(|e| e.payload).collect();
        assert_eq!(
            payloads,
            vec![
                EventPayload::StatusChanged(StatusChange {
                    from: SimulationStatus::Running,
                    to: SimulationStatus::Failed,
                }),
                EventPayload::Error(err),
            ]
        );
        // Failed no longer counts against the concurrency limit
        let other = manager.create(&scenario()).unwrap();
        manager.start(&other).unwrap();
    }

    #[test]
    fn test_outcome_payload_order() {
        let outcome = StepOutcome {
            delta: Some(StepDelta::empty(1, Seconds::new(30.0))),
            status_change: Some(StatusChange {
                from: SimulationStatus::Running,
                to: SimulationStatus::Failed,
            }),
            warnings: vec![FireSpreadError::GridExhausted],
            error: Some(FireSpreadError::StepFailed("boom".into())),
        };
        let kinds: Vec<&str> = outcome_payloads(outcome)
            .iter()
            .map(|payload| match payload {
                EventPayload::StepDelta(_) => "delta",
                EventPayload::Warning(_) => "warning",
                EventPayload::StatusChanged(_) => "status",
                EventPayload::Error(_) => "error",
            })
            .collect();
        assert_eq!(kinds, vec!["delta", "warning", "status", "error"]);
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("exploded");
        assert_eq!(panic_message(payload.as_ref()), "exploded");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "step panicked");
    }
}
