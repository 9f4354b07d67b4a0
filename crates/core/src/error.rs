//! Error types and result alias for the crate.
//!
//! [`FireSpreadError`] covers scenario validation, manager admission limits,
//! lifecycle misuse and failures raised while stepping a simulation. Errors are
//! `Serialize` so they can be carried inside notification events unchanged.

use crate::core_types::units::Seconds;
use crate::simulation::lifecycle::{LifecycleCommand, SimulationStatus};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FireSpreadError>;

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FireSpreadError {
    /// A scenario or configuration value is out of range or non-finite.
    #[error("invalid parameter `{parameter}`: {reason}")]
    InvalidParameters {
        parameter: &'static str,
        reason: String,
    },

    #[error("unknown fuel type '{0}'")]
    UnknownFuelType(String),

    /// Creating another simulation would exceed the tracked maximum.
    #[error("simulation capacity exceeded (limit {limit})")]
    CapacityExceeded { limit: usize },

    #[error("concurrent simulation limit exceeded (limit {limit})")]
    ConcurrencyLimitExceeded { limit: usize },

    #[error("cannot {command} a simulation that is {status}")]
    InvalidStateTransition {
        status: SimulationStatus,
        command: LifecycleCommand,
    },

    /// Delete was requested while the simulation is running or paused.
    #[error("simulation is active; stop it before deleting")]
    SimulationActive,

    #[error("simulation exceeded its wall-clock run limit of {limit:?}")]
    TimeoutExceeded { limit: Duration },

    /// The engine was stepped before any ignition point became due.
    #[error("engine has no ignited cells (next ignition at {next_ignition:?})")]
    EngineNotIgnited { next_ignition: Option<Seconds> },

    /// Spread reached the grid edge and candidates outside it were dropped.
    #[error("fire reached the grid boundary; spread beyond it is dropped")]
    GridExhausted,

    #[error("simulation '{0}' not found")]
    SimulationNotFound(String),

    #[error("simulation '{0}' already exists")]
    DuplicateSimulation(String),

    /// Unrecoverable failure inside a step, including a caught panic.
    #[error("simulation step failed: {0}")]
    StepFailed(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl FireSpreadError {
    pub(crate) fn invalid(parameter: &'static str, reason: impl Into<String>) -> Self {
        FireSpreadError::InvalidParameters {
            parameter,
            reason: reason.into(),
        }
    }
}

/// Map a poisoned lock to [`FireSpreadError::LockPoisoned`], naming the lock.
pub(crate) fn lock_poisoned<T>(what: &'static str) -> impl FnOnce(T) -> FireSpreadError {
    move |_| FireSpreadError::LockPoisoned(what)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_parameters_names_the_parameter() {
        let err = FireSpreadError::invalid("humidity", "must be within [0, 100]");
        assert_eq!(
            err.to_string(),
            "invalid parameter `humidity`: must be within [0, 100]"
        );
    }

    #[test]
    fn test_state_transition_message_uses_display_names() {
        let err = FireSpreadError::InvalidStateTransition {
            status: SimulationStatus::Completed,
            command: LifecycleCommand::Pause,
        };
        assert_eq!(err.to_string(), "cannot pause a simulation that is completed");
    }
}
