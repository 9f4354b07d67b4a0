//! Surface fire physics: Rothermel spread and fuel moisture

pub mod fuel_moisture;
pub mod rothermel;

pub use fuel_moisture::equilibrium_moisture;
pub use rothermel::{spread_rate, CalculatorLimits, SpreadProfile};
