//! Simulations, their lifecycle and the manager that schedules them

pub mod config;
pub mod events;
pub mod fire_simulation;
pub mod lifecycle;
pub mod manager;

pub use config::{ManagerConfig, MIN_STEP_INTERVAL};
pub use events::{
    ChannelSink, EventPayload, EventStream, FanoutSink, MemorySink, NotificationSink, NullSink,
    SimulationEvent,
};
pub use fire_simulation::{
    Simulation, SimulationId, SimulationSnapshot, SimulationSummary, StepOutcome,
};
pub use lifecycle::{LifecycleCommand, SimulationStatus, StatusChange};
pub use manager::{ManagerStats, SimulationManager};
