//! Arrival-time fire propagation over the grid
//!
//! Each Unburned cell next to the fire carries a frontier estimate: the
//! earliest time any Burning cell within the stencil could reach it, using
//! the elliptical Rothermel rate from the source cell's fuel toward it. A
//! step pops estimates in arrival order up to the new simulated time, so a
//! cell that ignites mid-step immediately relaxes its own neighbours and
//! arrival times do not depend on the step length.
//!
//! Ignitions are ordered by `(arrival, row, col)`, which keeps results
//! deterministic regardless of how the parallel relaxation is scheduled.

use crate::core_types::environment::{EnvironmentParameters, IgnitionPoint};
use crate::core_types::fuel::VegetationType;
use crate::core_types::units::{
    Degrees, Fraction, KilowattsPerMeter, Meters, MetersPerMinute, Seconds,
};
use crate::error::{FireSpreadError, Result};
use crate::grid::{CellState, Grid, GridConfig};
use crate::physics::rothermel::{CalculatorLimits, SpreadProfile};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};
use tracing::{debug, warn};

/// A cell whose state changed during a step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellChange {
    pub row: usize,
    pub col: usize,
    pub state: CellState,
    pub arrival: Option<Seconds>,
    pub fuel_remaining: Fraction,
}

/// Result of one engine step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepDelta {
    pub step: u64,
    /// Simulated time after the step
    pub time: Seconds,
    pub changes: Vec<CellChange>,
}

impl StepDelta {
    pub fn empty(step: u64, time: Seconds) -> Self {
        Self {
            step,
            time,
            changes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Head-fire behaviour of the most intense fuel currently burning
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeadFire {
    pub vegetation: VegetationType,
    pub spread_rate: MetersPerMinute,
    pub direction: Degrees,
    pub fireline_intensity: KilowattsPerMeter,
    pub flame_length: Meters,
}

/// Aggregate fire state of a grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BurnSummary {
    pub burning_cells: usize,
    pub burned_cells: usize,
    /// Area of burning and burned cells, m²
    pub burned_area: f64,
    /// Burning or burned cells with an unburned (or off-grid) 4-neighbour
    pub perimeter_cells: usize,
    pub head_fire: Option<HeadFire>,
}

/// Per-class behaviour, built once from the environment
#[derive(Debug, Clone, Copy)]
struct FuelBehaviour {
    profile: SpreadProfile,
    burn_duration: Seconds,
}

#[derive(Debug, Clone, Copy)]
struct StencilOffset {
    dr: isize,
    dc: isize,
    distance: Meters,
    azimuth: Degrees,
}

/// Offsets within `radius` whose direction is not already covered by a
/// shorter offset (gcd of the components is 1)
fn build_stencil(radius: usize, resolution: Meters) -> Vec<StencilOffset> {
    fn gcd(a: usize, b: usize) -> usize {
        if b == 0 {
            a
        } else {
            gcd(b, a % b)
        }
    }

    let r = radius as isize;
    let mut stencil = Vec::new();
    for dr in -r..=r {
        for dc in -r..=r {
            if (dr, dc) == (0, 0) || gcd(dr.unsigned_abs(), dc.unsigned_abs()) != 1 {
                continue;
            }
            let (east, north) = (dc as f64, -dr as f64);
            stencil.push(StencilOffset {
                dr,
                dc,
                distance: resolution * east.hypot(north),
                azimuth: Degrees::new(east.atan2(north).to_degrees()).normalized(),
            });
        }
    }
    stencil
}

/// Frontier candidate ordered by `(arrival, row-major index)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Candidate {
    arrival: Seconds,
    index: usize,
    /// Scheduled ignitions bypass the frontier and fuel checks
    forced: bool,
}

#[derive(Debug, Clone)]
struct ScheduledIgnition {
    index: usize,
    time: Seconds,
}

/// Advances one grid's fire state in discrete steps
#[derive(Debug)]
pub struct PropagationEngine {
    grid: Grid,
    behaviours: [Option<FuelBehaviour>; 5],
    stencil: Vec<StencilOffset>,
    /// Best pending arrival estimate per Unburned cell
    frontier: FxHashMap<usize, Seconds>,
    queue: BinaryHeap<Reverse<Candidate>>,
    /// Sorted by time
    ignitions: Vec<ScheduledIgnition>,
    next_ignition: usize,
    /// Row-major indices of Burning cells, kept sorted
    burning: Vec<usize>,
    /// Cells ever ignited; burning plus burned
    fire_cells: usize,
    time: Seconds,
    step: u64,
    ignited: bool,
    boundary_reported: bool,
    warnings: Vec<FireSpreadError>,
}

impl PropagationEngine {
    /// Create an engine over `grid`
    ///
    /// # Errors
    /// `InvalidParameters` if an ignition point lies outside the grid, or the
    /// environment fails validation.
    pub fn new(
        grid: Grid,
        environment: &EnvironmentParameters,
        ignition_points: &[IgnitionPoint],
        config: &GridConfig,
        limits: &CalculatorLimits,
    ) -> Result<Self> {
        let mut present = [false; 5];
        for cell in grid.cells() {
            present[cell.vegetation as usize] = true;
        }

        let mut behaviours = [None; 5];
        for vegetation in VegetationType::ALL {
            if !present[vegetation as usize] {
                continue;
            }
            let profile = SpreadProfile::new(vegetation.fuel(), environment, limits)?;
            debug!(
                "{} head rate {} toward {} (R0 {}, LB {:.2})",
                vegetation,
                profile.head_rate,
                profile.max_spread_direction,
                profile.base_rate,
                profile.length_to_breadth
            );
            behaviours[vegetation as usize] = Some(FuelBehaviour {
                profile,
                burn_duration: profile
                    .burn_duration(config.min_burn_duration, config.max_burn_duration),
            });
        }

        let mut ignitions = ignition_points
            .iter()
            .map(|point| {
                let (row, col) = grid.locate(&point.location).ok_or_else(|| {
                    FireSpreadError::invalid(
                        "ignition_points",
                        format!("ignition '{}' lies outside the grid", point.id),
                    )
                })?;
                Ok(ScheduledIgnition {
                    index: grid.index(row, col),
                    time: point.timestamp,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        ignitions.sort_by(|a, b| a.time.cmp(&b.time).then(a.index.cmp(&b.index)));

        let stencil = build_stencil(config.propagation_radius, grid.resolution());

        Ok(Self {
            grid,
            behaviours,
            stencil,
            frontier: FxHashMap::default(),
            queue: BinaryHeap::new(),
            ignitions,
            next_ignition: 0,
            burning: Vec::new(),
            fire_cells: 0,
            time: Seconds::ZERO,
            step: 0,
            ignited: false,
            boundary_reported: false,
            warnings: Vec::new(),
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn time(&self) -> Seconds {
        self.time
    }

    pub fn step_count(&self) -> u64 {
        self.step
    }

    pub fn has_ignited(&self) -> bool {
        self.ignited
    }

    pub fn burning_count(&self) -> usize {
        self.burning.len()
    }

    /// Burning plus burned cells
    pub fn fire_cell_count(&self) -> usize {
        self.fire_cells
    }

    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    /// Timestamp of the next ignition point not yet applied
    pub fn next_ignition_time(&self) -> Option<Seconds> {
        self.ignitions.get(self.next_ignition).map(|i| i.time)
    }

    /// Whether an unapplied ignition falls at or before `time`
    pub fn ignition_due_by(&self, time: Seconds) -> bool {
        self.next_ignition_time().is_some_and(|t| t <= time)
    }

    /// Nothing burning, nothing pending, every ignition applied
    pub fn is_converged(&self) -> bool {
        self.ignited
            && self.burning.is_empty()
            && self.frontier.is_empty()
            && self.next_ignition == self.ignitions.len()
    }

    /// Warnings raised since the last call
    pub fn take_warnings(&mut self) -> Vec<FireSpreadError> {
        std::mem::take(&mut self.warnings)
    }

    /// Ignite every scheduled point due at the current time
    pub fn apply_due_ignitions(&mut self) -> StepDelta {
        let mut touched = BTreeSet::new();
        self.schedule_ignitions(self.time);
        self.ignite_until(self.time, &mut touched);
        self.delta(&touched)
    }

    /// Advance the clock while waiting for the first ignition
    ///
    /// # Errors
    /// `InvalidParameters` for a bad `dt`; `EngineNotIgnited` is never
    /// returned here, but an ignition due within the window is an error
    /// since it would be skipped.
    pub fn advance_idle(&mut self, dt: Seconds) -> Result<StepDelta> {
        validate_dt(dt)?;
        if self.ignited || self.ignition_due_by(self.time + dt) {
            return Err(FireSpreadError::StepFailed(
                "idle advance would skip an ignition".to_string(),
            ));
        }
        self.time += dt;
        self.step += 1;
        Ok(StepDelta::empty(self.step, self.time))
    }

    /// Advance the fire by `dt`
    ///
    /// # Errors
    /// - `EngineNotIgnited` if nothing has ignited and no ignition is due by `time + dt`
    /// - `InvalidParameters` if `dt` is not a positive finite duration
    pub fn step(&mut self, dt: Seconds) -> Result<StepDelta> {
        validate_dt(dt)?;
        if self.is_converged() {
            return Ok(StepDelta::empty(self.step, self.time));
        }

        let t_old = self.time;
        let t_new = t_old + dt;
        if !self.ignited && !self.ignition_due_by(t_new) {
            return Err(FireSpreadError::EngineNotIgnited {
                next_ignition: self.next_ignition_time(),
            });
        }

        // Relax every burning cell in parallel, merge in source order
        let relaxed: Vec<(Vec<(usize, Seconds)>, bool)> = self
            .burning
            .par_iter()
            .map(|&source| self.candidates_from(source))
            .collect();
        for (candidates, hit_boundary) in relaxed {
            self.note_boundary(hit_boundary);
            for (index, arrival) in candidates {
                self.relax(index, arrival);
            }
        }

        let mut touched = BTreeSet::new();
        self.schedule_ignitions(t_new);
        self.ignite_until(t_new, &mut touched);
        self.consume_fuel(t_old, t_new, &mut touched);

        self.time = t_new;
        self.step += 1;

        debug!(
            "Step {} at {}: {} changed, {} burning, {} on frontier",
            self.step,
            self.time,
            touched.len(),
            self.burning.len(),
            self.frontier.len()
        );

        Ok(self.delta(&touched))
    }

    /// Aggregate counts and head-fire behaviour
    pub fn summary(&self) -> BurnSummary {
        let burning_cells = self.burning.len();
        let burned_cells = self.grid.count(CellState::Burned);
        let res = *self.grid.resolution();

        let perimeter_cells = self
            .grid
            .cells()
            .iter()
            .filter(|cell| cell.state != CellState::Unburned)
            .filter(|cell| {
                [(-1, 0), (1, 0), (0, -1), (0, 1)].iter().any(|&(dr, dc)| {
                    match self.grid.offset(cell.row, cell.col, dr, dc) {
                        Some((r, c)) => self
                            .grid
                            .cell(r, c)
                            .is_some_and(|n| n.state == CellState::Unburned),
                        None => true,
                    }
                })
            })
            .count();

        let head_fire = self
            .burning
            .iter()
            .map(|&index| self.grid.cell_at_index(index).vegetation)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter_map(|vegetation| {
                self.behaviours[vegetation as usize].map(|b| (vegetation, b.profile))
            })
            .max_by(|a, b| a.1.head_rate.cmp(&b.1.head_rate))
            .map(|(vegetation, profile)| HeadFire {
                vegetation,
                spread_rate: profile.head_rate,
                direction: profile.max_spread_direction,
                fireline_intensity: profile.fireline_intensity(),
                flame_length: profile.flame_length(),
            });

        BurnSummary {
            burning_cells,
            burned_cells,
            burned_area: (burning_cells + burned_cells) as f64 * res * res,
            perimeter_cells,
            head_fire,
        }
    }

    fn behaviour(&self, vegetation: VegetationType) -> Option<&FuelBehaviour> {
        self.behaviours[vegetation as usize].as_ref()
    }

    /// Whether a cell's own fuel carries fire
    fn can_burn(&self, vegetation: VegetationType) -> bool {
        self.behaviour(vegetation)
            .is_some_and(|b| b.profile.can_spread())
    }

    /// Candidate arrivals from `source` to its Unburned, burnable neighbours
    fn candidates_from(&self, source: usize) -> (Vec<(usize, Seconds)>, bool) {
        let cell = self.grid.cell_at_index(source);
        let profile = match self.behaviour(cell.vegetation) {
            Some(b) if b.profile.can_spread() => b.profile,
            _ => return (Vec::new(), false),
        };

        let mut candidates = Vec::with_capacity(self.stencil.len());
        let mut hit_boundary = false;
        for offset in &self.stencil {
            let Some((row, col)) = self.grid.offset(cell.row, cell.col, offset.dr, offset.dc)
            else {
                hit_boundary = true;
                continue;
            };
            let index = self.grid.index(row, col);
            let target = self.grid.cell_at_index(index);
            if target.state != CellState::Unburned || !self.can_burn(target.vegetation) {
                continue;
            }
            let rate = profile.rate_toward(offset.azimuth);
            if *rate <= 0.0 {
                continue;
            }
            let travel = offset.distance / rate.to_meters_per_second();
            candidates.push((index, cell.arrival + travel));
        }
        (candidates, hit_boundary)
    }

    fn relax(&mut self, index: usize, arrival: Seconds) {
        let best = self.frontier.get(&index).copied().unwrap_or(Seconds::INFINITY);
        if arrival < best {
            self.frontier.insert(index, arrival);
            self.queue.push(Reverse(Candidate {
                arrival,
                index,
                forced: false,
            }));
        }
    }

    fn note_boundary(&mut self, hit_boundary: bool) {
        if hit_boundary && !self.boundary_reported {
            self.boundary_reported = true;
            warn!("Fire reached the grid boundary at {}", self.time);
            self.warnings.push(FireSpreadError::GridExhausted);
        }
    }

    /// Queue scheduled ignitions at or before `limit`
    fn schedule_ignitions(&mut self, limit: Seconds) {
        while let Some(ignition) = self.ignitions.get(self.next_ignition) {
            if ignition.time > limit {
                break;
            }
            self.queue.push(Reverse(Candidate {
                arrival: ignition.time,
                index: ignition.index,
                forced: true,
            }));
            self.next_ignition += 1;
        }
    }

    /// Pop candidates in arrival order up to `limit`, igniting and relaxing
    fn ignite_until(&mut self, limit: Seconds, touched: &mut BTreeSet<usize>) {
        let mut ignited_any = false;
        while let Some(&Reverse(candidate)) = self.queue.peek() {
            if candidate.arrival > limit {
                break;
            }
            self.queue.pop();

            if self.grid.cell_at_index(candidate.index).state != CellState::Unburned {
                continue;
            }
            // Stale entries were superseded by an earlier estimate
            if !candidate.forced && self.frontier.get(&candidate.index) != Some(&candidate.arrival)
            {
                continue;
            }
            self.frontier.remove(&candidate.index);

            let cell = self.grid.cell_at_index_mut(candidate.index);
            cell.state = CellState::Burning;
            cell.arrival = candidate.arrival;
            cell.fuel_remaining = Fraction::ONE;
            self.burning.push(candidate.index);
            self.fire_cells += 1;
            self.ignited = true;
            ignited_any = true;
            touched.insert(candidate.index);

            let (candidates, hit_boundary) = self.candidates_from(candidate.index);
            self.note_boundary(hit_boundary);
            for (index, arrival) in candidates {
                self.relax(index, arrival);
            }
        }
        if ignited_any {
            self.burning.sort_unstable();
        }
    }

    /// Burn down fuel over `[t_old, t_new]`, retiring exhausted cells
    fn consume_fuel(&mut self, t_old: Seconds, t_new: Seconds, touched: &mut BTreeSet<usize>) {
        let mut burned_out = Vec::new();
        for &index in &self.burning {
            let vegetation = self.grid.cell_at_index(index).vegetation;
            let Some(duration) = self.behaviour(vegetation).map(|b| b.burn_duration) else {
                continue;
            };
            let cell = self.grid.cell_at_index_mut(index);
            let start = cell.arrival.max(t_old);
            let elapsed = *(t_new - start);
            if elapsed <= 0.0 {
                continue;
            }
            let remaining = *cell.fuel_remaining - elapsed / *duration;
            if remaining <= f64::EPSILON {
                cell.fuel_remaining = Fraction::ZERO;
                cell.state = CellState::Burned;
                burned_out.push(index);
                touched.insert(index);
            } else {
                cell.fuel_remaining = Fraction::new(remaining);
            }
        }
        if !burned_out.is_empty() {
            self.burning.retain(|index| burned_out.binary_search(index).is_err());
        }
    }

    fn delta(&self, touched: &BTreeSet<usize>) -> StepDelta {
        let changes = touched
            .iter()
            .map(|&index| {
                let cell = self.grid.cell_at_index(index);
                CellChange {
                    row: cell.row,
                    col: cell.col,
                    state: cell.state,
                    arrival: cell.arrival.is_finite().then_some(cell.arrival),
                    fuel_remaining: cell.fuel_remaining,
                }
            })
            .collect();
        StepDelta {
            step: self.step,
            time: self.time,
            changes,
        }
    }
}

fn validate_dt(dt: Seconds) -> Result<()> {
    if dt.is_finite() && *dt > 0.0 {
        Ok(())
    } else {
        Err(FireSpreadError::invalid("time_step", "must be positive and finite"))
    }
}
