// src/processing/mod.rs
// The computation served by the worker

pub mod fluid;
pub mod simulation;

pub use fluid::FluidHandler;
pub use simulation::Simulation;
