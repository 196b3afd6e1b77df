//! The stepwise interpreter
//!
//! Execution is a stack of [`RuntimeConstruct`] instances over the compiled
//! construct tree, driven by [`Simulation::step_forward`].  Everything the
//! execution does — pushes and pops, allocations, lifetime transitions,
//! reads and writes, faults — lands in the simulation's [`EventLog`].

pub mod constructs;
pub mod events;
pub mod simulation;

pub use constructs::{RtResult, RtState, RuntimeConstruct, RuntimeId};
pub use events::{Event, EventLog, FaultKind};
pub use simulation::Simulation;
