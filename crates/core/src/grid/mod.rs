//! Fire grid and local projection

pub mod simulation_grid;

pub use simulation_grid::*;
