//! One scenario's simulation: grid, engine and lifecycle status
//!
//! `Simulation` is the unit the manager locks. Every lifecycle command and
//! every step goes through `&mut self`, so they are serialised at step
//! boundaries without further synchronisation here.

use crate::core_types::environment::{EnvironmentParameters, GeoCoordinate, IgnitionPoint, Scenario};
use crate::core_types::units::{Meters, Seconds};
use crate::error::{FireSpreadError, Result};
use crate::grid::{CellSnapshot, CellState, Grid};
use crate::simulation::config::ManagerConfig;
use crate::simulation::lifecycle::{apply, LifecycleCommand, SimulationStatus, StatusChange};
use crate::solver::{BurnSummary, PropagationEngine, StepDelta};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::time::{Duration, Instant, SystemTime};
use tracing::{error, info};

/// Unique simulation identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimulationId(String);

impl SimulationId {
    /// Random id of the form `sim-<16 hex digits>`
    pub fn generate() -> Self {
        SimulationId(format!("sim-{:016x}", rand::random::<u64>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SimulationId {
    fn from(value: String) -> Self {
        SimulationId(value)
    }
}

impl From<&str> for SimulationId {
    fn from(value: &str) -> Self {
        SimulationId(value.to_string())
    }
}

impl Borrow<str> for SimulationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SimulationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a single step produced
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    /// `None` when the simulation was not running
    pub delta: Option<StepDelta>,
    pub status_change: Option<StatusChange>,
    pub warnings: Vec<FireSpreadError>,
    pub error: Option<FireSpreadError>,
}

/// Read-only summary used by `list`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationSummary {
    pub id: SimulationId,
    pub name: Option<String>,
    pub status: SimulationStatus,
    pub simulated_time: Seconds,
    pub step: u64,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    /// Accumulated wall-clock time spent Running
    pub run_time: Duration,
    pub failure: Option<FireSpreadError>,
    pub burn: BurnSummary,
}

/// Full state used by `get`: the summary plus every non-Unburned cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationSnapshot {
    #[serde(flatten)]
    pub summary: SimulationSummary,
    pub environment: EnvironmentParameters,
    pub ignition_points: Vec<IgnitionPoint>,
    pub rows: usize,
    pub cols: usize,
    pub resolution: Meters,
    pub origin: GeoCoordinate,
    pub cells: Vec<CellSnapshot>,
}

/// Stateful record of one scenario
#[derive(Debug)]
pub struct Simulation {
    id: SimulationId,
    name: Option<String>,
    environment: EnvironmentParameters,
    ignition_points: Vec<IgnitionPoint>,
    engine: PropagationEngine,
    status: SimulationStatus,
    failure: Option<FireSpreadError>,
    time_step: Seconds,
    max_simulated_time: Option<Seconds>,
    max_fire_cells: Option<usize>,
    created_at: SystemTime,
    updated_at: SystemTime,
    run_time: Duration,
    running_since: Option<Instant>,
    #[cfg(test)]
    panic_on_step: bool,
}

impl Simulation {
    /// Validate `scenario` and build a fresh grid and engine for it
    pub fn new(id: SimulationId, scenario: &Scenario, config: &ManagerConfig) -> Result<Self> {
        let (environment, ignition_points) = scenario.validate()?;
        let grid = Grid::new(&config.grid, &ignition_points, &environment.vegetation)?;
        info!(
            "Simulation {} grid {}x{} at {} around ({:.5}, {:.5})",
            id,
            grid.rows(),
            grid.cols(),
            grid.resolution(),
            grid.origin().latitude,
            grid.origin().longitude
        );
        let engine = PropagationEngine::new(
            grid,
            &environment,
            &ignition_points,
            &config.grid,
            &config.calculator,
        )?;

        let now = SystemTime::now();
        Ok(Self {
            id,
            name: scenario.name.clone(),
            environment,
            ignition_points,
            engine,
            status: SimulationStatus::Created,
            failure: None,
            time_step: config.time_step,
            max_simulated_time: config.max_simulated_time,
            max_fire_cells: config.max_fire_cells,
            created_at: now,
            updated_at: now,
            run_time: Duration::ZERO,
            running_since: None,
            #[cfg(test)]
            panic_on_step: false,
        })
    }

    pub fn id(&self) -> &SimulationId {
        &self.id
    }

    pub fn status(&self) -> SimulationStatus {
        self.status
    }

    pub fn engine(&self) -> &PropagationEngine {
        &self.engine
    }

    pub fn failure(&self) -> Option<&FireSpreadError> {
        self.failure.as_ref()
    }

    pub fn simulated_time(&self) -> Seconds {
        self.engine.time()
    }

    pub fn step_count(&self) -> u64 {
        self.engine.step_count()
    }

    /// Wall-clock time spent Running so far
    pub fn run_time(&self) -> Duration {
        self.run_time + self.running_since.map_or(Duration::ZERO, |since| since.elapsed())
    }

    /// Created or Paused → Running, applying ignitions due now
    pub fn start(&mut self) -> Result<(StatusChange, StepDelta)> {
        self.enter_running(LifecycleCommand::Start)
    }

    /// Paused → Running
    pub fn resume(&mut self) -> Result<(StatusChange, StepDelta)> {
        self.enter_running(LifecycleCommand::Resume)
    }

    pub fn pause(&mut self) -> Result<StatusChange> {
        let to = apply(self.status, LifecycleCommand::Pause)?;
        Ok(self.transition(to))
    }

    pub fn stop(&mut self) -> Result<StatusChange> {
        let to = apply(self.status, LifecycleCommand::Stop)?;
        Ok(self.transition(to))
    }

    /// Stop regardless of the command table; `None` unless active
    pub fn force_stop(&mut self) -> Option<StatusChange> {
        self.status
            .is_active()
            .then(|| self.transition(SimulationStatus::Stopped))
    }

    /// Record an unrecoverable error; `None` if already terminal
    pub fn fail(&mut self, err: FireSpreadError) -> Option<StatusChange> {
        if self.status.is_terminal() {
            return None;
        }
        error!("Simulation {} failed: {}", self.id, err);
        self.failure = Some(err);
        Some(self.transition(SimulationStatus::Failed))
    }

    /// Advance one time step if Running
    ///
    /// Engine errors never escape: they fail the simulation and are returned
    /// in the outcome.
    pub fn step(&mut self) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        if self.status != SimulationStatus::Running {
            return outcome;
        }
        #[cfg(test)]
        if self.panic_on_step {
            panic!("injected step failure in {}", self.id);
        }

        let now = self.engine.time();
        let mut dt = self.time_step;
        if let Some(limit) = self.max_simulated_time {
            if now >= limit {
                outcome.status_change = Some(self.transition(SimulationStatus::Completed));
                return outcome;
            }
            dt = dt.min(limit - now);
        }

        let result = if !self.engine.has_ignited() && !self.engine.ignition_due_by(now + dt) {
            self.engine.advance_idle(dt)
        } else {
            self.engine.step(dt)
        };

        match result {
            Ok(delta) => {
                outcome.warnings = self.engine.take_warnings();
                outcome.delta = Some(delta);
                self.updated_at = SystemTime::now();

                let out_of_time = self
                    .max_simulated_time
                    .is_some_and(|limit| self.engine.time() >= limit);
                let at_cell_limit = self
                    .max_fire_cells
                    .is_some_and(|limit| self.engine.fire_cell_count() >= limit);
                if self.engine.is_converged() || out_of_time || at_cell_limit {
                    let reason = if out_of_time {
                        "time limit"
                    } else if at_cell_limit {
                        "fire cell limit"
                    } else {
                        "burned out"
                    };
                    info!(
                        "Simulation {} finished at {} after {} steps ({})",
                        self.id,
                        self.engine.time(),
                        self.engine.step_count(),
                        reason
                    );
                    outcome.status_change = Some(self.transition(SimulationStatus::Completed));
                }
            }
            Err(err) => {
                outcome.status_change = self.fail(err.clone());
                outcome.error = Some(err);
            }
        }
        outcome
    }

    pub fn summary(&self) -> SimulationSummary {
        SimulationSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            simulated_time: self.engine.time(),
            step: self.engine.step_count(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            run_time: self.run_time(),
            failure: self.failure.clone(),
            burn: self.engine.summary(),
        }
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        let grid = self.engine.grid();
        let cells = grid
            .cells()
            .iter()
            .filter(|cell| cell.state != CellState::Unburned)
            .map(|cell| grid.snapshot_cell(cell))
            .collect();

        SimulationSnapshot {
            summary: self.summary(),
            environment: self.environment.clone(),
            ignition_points: self.ignition_points.clone(),
            rows: grid.rows(),
            cols: grid.cols(),
            resolution: grid.resolution(),
            origin: grid.origin(),
            cells,
        }
    }

    /// Make every subsequent `step` panic
    #[cfg(test)]
    pub(crate) fn inject_step_panic(&mut self) {
        self.panic_on_step = true;
    }

    fn enter_running(&mut self, command: LifecycleCommand) -> Result<(StatusChange, StepDelta)> {
        let to = apply(self.status, command)?;
        let change = self.transition(to);
        let delta = self.engine.apply_due_ignitions();
        Ok((change, delta))
    }

    fn transition(&mut self, to: SimulationStatus) -> StatusChange {
        let from = self.status;
        if from == SimulationStatus::Running {
            if let Some(since) = self.running_since.take() {
                self.run_time += since.elapsed();
            }
        }
        if to == SimulationStatus::Running {
            self.running_since = Some(Instant::now());
        }
        self.status = to;
        self.updated_at = SystemTime::now();
        info!("Simulation {} {} -> {}", self.id, from, to);
        StatusChange { from, to }
    }
}
