//! Wildfire spread simulation core
//!
//! Surface fire spread over a regular grid, driven by the Rothermel (1972)
//! model with the Albini (1976) revisions. A [`SimulationManager`] owns many
//! independent scenarios, steps each on its own thread and publishes per-step
//! deltas to a [`NotificationSink`].
//!
//! ## Layout
//!
//! - [`core_types`]: unit newtypes, the fuel catalog and scenario inputs
//! - [`physics`]: Rothermel spread profile and equilibrium fuel moisture
//! - [`grid`]: the local projection and per-cell burn state
//! - [`solver`]: arrival-time propagation engine
//! - [`simulation`]: lifecycle, manager and notification events

pub mod core_types;
pub mod error;
pub mod grid;
pub mod physics;
pub mod simulation;
pub mod solver;

pub use core_types::{
    Degrees, FuelModel, GeoCoordinate, IgnitionPoint, Meters, MetersPerMinute, MetersPerSecond,
    Percent, Scenario, Seconds, VegetationInput, VegetationType,
};
pub use error::{FireSpreadError, Result};
pub use grid::{CellSnapshot, CellState, GridConfig};
pub use physics::{spread_rate, CalculatorLimits, SpreadProfile};
pub use simulation::{
    ChannelSink, EventPayload, EventStream, FanoutSink, LifecycleCommand, ManagerConfig,
    ManagerStats, MemorySink, NotificationSink, NullSink, SimulationEvent, SimulationId,
    SimulationManager, SimulationSnapshot, SimulationStatus, SimulationSummary, StatusChange,
};
pub use solver::{BurnSummary, PropagationEngine, StepDelta};
