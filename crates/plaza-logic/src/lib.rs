//! Pure simulation logic for Plaza.
//!
//! This crate contains all the rules of the shared world that are independent
//! of transport, storage and threads. Functions take plain data and return
//! results, so everything here is unit-testable and deterministic; the server
//! crate owns the live state and the tick loop.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`collision`] | AABB primitives, blockers, world bounds |
//! | [`config`] | `SimConfig` and its sections, JSON loading, validation |
//! | [`constants`] | Tuned defaults (tick rate, grid size, stuck thresholds) |
//! | [`furniture`] | Furniture kinds and seat/lying capacities |
//! | [`interaction`] | Free/Sitting/Lying state, slot allocation, anchors, exits |
//! | [`movement`] | Step validation, repulsion, wall sliding, stuck detection |
//! | [`pathfinding`] | Grid A* with simplification, smoothing, goal resolution |
//! | [`rate_limit`] | Sliding-window throttling per entity and action category |
//! | [`validation`] | Sanitization and range checks for client input |

pub mod collision;
pub mod config;
pub mod constants;
pub mod furniture;
pub mod interaction;
pub mod movement;
pub mod pathfinding;
pub mod rate_limit;
pub mod validation;
