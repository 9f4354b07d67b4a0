//! Simulation lifecycle state machine
//!
//! ```text
//! Created ──start──▶ Running ◀──resume── Paused
//!                     │  ▲ └────pause────▶ │
//!                     │  └─────────────────┘
//!                     ├──stop (also from Paused)──▶ Stopped
//!                     ├──burnout / time limit─────▶ Completed
//!                     └──step failure─────────────▶ Failed
//! ```
//!
//! [`apply`] is the pure transition table for caller commands. Completion and
//! failure are driven by the stepping loop, not by commands.

use crate::error::{FireSpreadError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationStatus {
    Created,
    Running,
    Paused,
    Stopped,
    Completed,
    Failed,
}

impl SimulationStatus {
    pub const ALL: [SimulationStatus; 6] = [
        SimulationStatus::Created,
        SimulationStatus::Running,
        SimulationStatus::Paused,
        SimulationStatus::Stopped,
        SimulationStatus::Completed,
        SimulationStatus::Failed,
    ];

    /// Convert from u8 for the lock-free status mirror
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(SimulationStatus::Created),
            1 => Some(SimulationStatus::Running),
            2 => Some(SimulationStatus::Paused),
            3 => Some(SimulationStatus::Stopped),
            4 => Some(SimulationStatus::Completed),
            5 => Some(SimulationStatus::Failed),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            SimulationStatus::Created => 0,
            SimulationStatus::Running => 1,
            SimulationStatus::Paused => 2,
            SimulationStatus::Stopped => 3,
            SimulationStatus::Completed => 4,
            SimulationStatus::Failed => 5,
        }
    }

    /// No further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SimulationStatus::Stopped | SimulationStatus::Completed | SimulationStatus::Failed
        )
    }

    /// Running or Paused
    pub fn is_active(&self) -> bool {
        matches!(self, SimulationStatus::Running | SimulationStatus::Paused)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SimulationStatus::Created => "created",
            SimulationStatus::Running => "running",
            SimulationStatus::Paused => "paused",
            SimulationStatus::Stopped => "stopped",
            SimulationStatus::Completed => "completed",
            SimulationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Caller-issued lifecycle command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleCommand {
    Start,
    Pause,
    Resume,
    Stop,
}

impl LifecycleCommand {
    pub const ALL: [LifecycleCommand; 4] = [
        LifecycleCommand::Start,
        LifecycleCommand::Pause,
        LifecycleCommand::Resume,
        LifecycleCommand::Stop,
    ];
}

impl fmt::Display for LifecycleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleCommand::Start => "start",
            LifecycleCommand::Pause => "pause",
            LifecycleCommand::Resume => "resume",
            LifecycleCommand::Stop => "stop",
        })
    }
}

/// A status transition, published to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub from: SimulationStatus,
    pub to: SimulationStatus,
}

/// Target status of `command` issued in `status`
///
/// # Errors
/// `InvalidStateTransition` for any pair outside the table.
pub fn apply(status: SimulationStatus, command: LifecycleCommand) -> Result<SimulationStatus> {
    use LifecycleCommand as C;
    use SimulationStatus as S;

    match (status, command) {
        (S::Created | S::Paused, C::Start) | (S::Paused, C::Resume) => Ok(S::Running),
        (S::Running, C::Pause) => Ok(S::Paused),
        (S::Running | S::Paused, C::Stop) => Ok(S::Stopped),
        _ => Err(FireSpreadError::InvalidStateTransition { status, command }),
    }
}
