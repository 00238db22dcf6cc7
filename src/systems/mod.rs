//! Application systems
//!
//! Modular systems driving the headless runner.

mod simulation;

pub use simulation::{EventTotals, SimulationResult, SimulationSystem};
