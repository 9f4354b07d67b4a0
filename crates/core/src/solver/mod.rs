//! Fire propagation solver

pub mod propagation;

pub use propagation::{BurnSummary, CellChange, HeadFire, PropagationEngine, StepDelta};
