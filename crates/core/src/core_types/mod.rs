//! Core types and utilities

pub mod environment;
pub mod fuel;
pub mod units;

pub use environment::*;
pub use fuel::{lookup, FuelModel, VegetationType, FUEL_CATALOG};
pub use units::*;
