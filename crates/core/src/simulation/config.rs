//! Manager configuration
//!
//! Supplied once when the manager is built and never changed afterwards.
//! Every field has a default, so a partial document deserializes cleanly.

use crate::core_types::units::Seconds;
use crate::error::{FireSpreadError, Result};
use crate::grid::GridConfig;
use crate::physics::rothermel::CalculatorLimits;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shortest accepted `step_interval`
pub const MIN_STEP_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Tracked simulations, terminal ones included
    pub max_simulations: usize,
    /// Simulations allowed in Running at once
    pub max_concurrent: usize,
    /// Wall-clock budget for one simulation's running time
    pub max_run_duration: Duration,
    /// Wall-clock period between steps
    pub step_interval: Duration,
    /// Simulated time advanced per step
    pub time_step: Seconds,
    /// Simulated time after which a run completes
    pub max_simulated_time: Option<Seconds>,
    /// Burning plus burned cells after which a run completes
    pub max_fire_cells: Option<usize>,
    pub grid: GridConfig,
    pub calculator: CalculatorLimits,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_simulations: 100,
            max_concurrent: 10,
            max_run_duration: Duration::from_secs(300),
            step_interval: Duration::from_secs(1),
            time_step: Seconds::new(30.0),
            max_simulated_time: Some(Seconds::new(300.0)),
            max_fire_cells: Some(1000),
            grid: GridConfig::default(),
            calculator: CalculatorLimits::default(),
        }
    }
}

impl ManagerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_simulations == 0 {
            return Err(FireSpreadError::invalid("max_simulations", "must be at least 1"));
        }
        if self.max_concurrent == 0 {
            return Err(FireSpreadError::invalid("max_concurrent", "must be at least 1"));
        }
        if self.max_run_duration.is_zero() {
            return Err(FireSpreadError::invalid("max_run_duration", "must be positive"));
        }
        if self.step_interval < MIN_STEP_INTERVAL {
            return Err(FireSpreadError::invalid(
                "step_interval",
                format!("must be at least {MIN_STEP_INTERVAL:?}"),
            ));
        }
        if !self.time_step.is_finite() || *self.time_step <= 0.0 {
            return Err(FireSpreadError::invalid("time_step", "must be positive and finite"));
        }
        if let Some(limit) = self.max_simulated_time {
            if !limit.is_finite() || *limit <= 0.0 {
                return Err(FireSpreadError::invalid(
                    "max_simulated_time",
                    "must be positive and finite",
                ));
            }
        }
        if self.max_fire_cells == Some(0) {
            return Err(FireSpreadError::invalid("max_fire_cells", "must be at least 1"));
        }
        self.grid.validate()?;
        self.calculator.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(ManagerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_zero_limits() {
        let config = ManagerConfig {
            max_concurrent: 0,
            ..ManagerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FireSpreadError::InvalidParameters { parameter: "max_concurrent", .. })
        ));

        let config = ManagerConfig {
            time_step: Seconds::new(0.0),
            ..ManagerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_step_interval_has_a_floor() {
        let config = ManagerConfig {
            step_interval: Duration::from_nanos(1),
            ..ManagerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FireSpreadError::InvalidParameters { parameter: "step_interval", .. })
        ));

        let config = ManagerConfig {
            step_interval: MIN_STEP_INTERVAL,
            ..ManagerConfig::default()
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_run_limits_default_on_and_reject_zero() {
        let config = ManagerConfig::default();
        assert_eq!(config.max_fire_cells, Some(1000));
        assert_eq!(config.max_simulated_time, Some(Seconds::new(300.0)));

        let config = ManagerConfig {
            max_fire_cells: Some(0),
            ..ManagerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FireSpreadError::InvalidParameters { parameter: "max_fire_cells", .. })
        ));
    }

    #[test]
    fn test_nested_grid_config_is_checked() {
        let mut config = ManagerConfig::default();
        config.grid.min_burn_duration = Seconds::new(7200.0);
        assert!(matches!(
            config.validate(),
            Err(FireSpreadError::InvalidParameters { parameter: "burn_duration", .. })
        ));
    }
}
