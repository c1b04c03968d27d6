//! Plaza Server - authoritative shared-world simulation
//!
//! Owns the live world, applies client commands in arrival order and
//! broadcasts the results. Transport is left to the host: it feeds decoded
//! commands in and delivers each outbound event to the players it names.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`simulation`] | Tick loop, command handlers, seating flow |
//! | [`world`] | Players, obstacles, food and the collision set |
//! | [`protocol`] | JSON commands and events, recipients |
//! | [`persistence`] | Store trait, memory and file stores, background writer |
//! | [`runtime`] | Fixed-rate pacing for a live loop |

pub mod persistence;
pub mod protocol;
pub mod runtime;
pub mod simulation;
pub mod world;

pub use simulation::{CommandError, Simulation, StartupError};
pub use world::PlayerId;
