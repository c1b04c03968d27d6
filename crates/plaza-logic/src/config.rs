//! Simulation configuration.
//!
//! `SimConfig` groups every tunable knob. Each section derives serde with
//! `#[serde(default)]`, so a JSON file only needs the fields it overrides:
//!
//! ```
//! use plaza_logic::config::SimConfig;
//!
//! let cfg = SimConfig::from_json(r#"{ "tick_rate_hz": 30, "nav": { "grid_size": 0.25 } }"#).unwrap();
//! assert_eq!(cfg.tick_rate_hz, 30);
//! assert_eq!(cfg.nav.grid_size, 0.25);
//! assert_eq!(cfg.nav.max_iterations, SimConfig::default().nav.max_iterations);
//! ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::collision::{Dimensions, WorldBounds};
use crate::constants::{collision, limits, nav, player, seating, stuck, tick};
use crate::rate_limit::RateLimitConfig;

/// Grid A* parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    pub grid_size: f32,
    pub max_iterations: usize,
    pub goal_tolerance_cells: f32,
    pub proximity_radius: f32,
    pub proximity_weight: f32,
    pub nearest_walkable_rings: u32,
    pub line_sample_fraction: f32,
    pub smoothing_self_weight: f32,
    pub interaction_samples: u32,
    pub interaction_standoff: f32,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            grid_size: nav::GRID_SIZE,
            max_iterations: nav::MAX_ITERATIONS,
            goal_tolerance_cells: nav::GOAL_TOLERANCE_CELLS,
            proximity_radius: nav::PROXIMITY_RADIUS,
            proximity_weight: nav::PROXIMITY_WEIGHT,
            nearest_walkable_rings: nav::NEAREST_WALKABLE_RINGS,
            line_sample_fraction: nav::LINE_SAMPLE_FRACTION,
            smoothing_self_weight: nav::SMOOTHING_SELF_WEIGHT,
            interaction_samples: nav::INTERACTION_SAMPLES,
            interaction_standoff: nav::INTERACTION_STANDOFF,
        }
    }
}

/// Per-tick movement, repulsion and stuck handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    pub walk_speed: f32,
    pub arrival_radius: f32,
    pub food_collision_scale: f32,
    pub repulsion_radius: f32,
    pub repulsion_strength: f32,
    pub stuck_epsilon: f32,
    pub replan_after_ticks: u32,
    pub abandon_after_ticks: u32,
    pub collision_retry_limit: u32,
    pub replan_cooldown_ticks: u32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            walk_speed: player::WALK_SPEED,
            arrival_radius: player::ARRIVAL_RADIUS,
            food_collision_scale: collision::FOOD_COLLISION_SCALE,
            repulsion_radius: collision::REPULSION_RADIUS,
            repulsion_strength: collision::REPULSION_STRENGTH,
            stuck_epsilon: stuck::EPSILON,
            replan_after_ticks: stuck::REPLAN_AFTER_TICKS,
            abandon_after_ticks: stuck::ABANDON_AFTER_TICKS,
            collision_retry_limit: stuck::COLLISION_RETRY_LIMIT,
            replan_cooldown_ticks: stuck::REPLAN_COOLDOWN_TICKS,
        }
    }
}

/// Seat and bed layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeatingConfig {
    pub seat_spacing: f32,
    pub lying_slot_width: f32,
    pub lying_foot_offset: f32,
    pub lying_height_fraction: f32,
    pub stand_up_margin: f32,
    pub interaction_reach: f32,
    pub exit_candidates: u32,
    /// Refuse a sit when every seat is taken instead of reusing the last one.
    pub reject_over_capacity: bool,
}

impl Default for SeatingConfig {
    fn default() -> Self {
        Self {
            seat_spacing: seating::SEAT_SPACING,
            lying_slot_width: seating::LYING_SLOT_WIDTH,
            lying_foot_offset: seating::LYING_FOOT_OFFSET,
            lying_height_fraction: seating::LYING_HEIGHT_FRACTION,
            stand_up_margin: seating::STAND_UP_MARGIN,
            interaction_reach: seating::INTERACTION_REACH,
            exit_candidates: seating::EXIT_CANDIDATES,
            reject_over_capacity: false,
        }
    }
}

/// Bounds enforced by the input validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputLimits {
    pub absurd_coordinate: f32,
    pub min_dimension: f32,
    pub max_dimension: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    pub min_footprint: f32,
    pub max_footprint: f32,
    pub id_max_len: usize,
    pub model_max_len: usize,
    pub name_max_len: usize,
    pub emote_max_len: usize,
    pub skin_count: u8,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            absurd_coordinate: crate::constants::world::ABSURD_COORDINATE,
            min_dimension: limits::MIN_DIMENSION,
            max_dimension: limits::MAX_DIMENSION,
            min_scale: limits::MIN_SCALE,
            max_scale: limits::MAX_SCALE,
            min_footprint: player::MIN_FOOTPRINT,
            max_footprint: player::MAX_FOOTPRINT,
            id_max_len: limits::ID_MAX_LEN,
            model_max_len: limits::MODEL_MAX_LEN,
            name_max_len: player::NAME_MAX_LEN,
            emote_max_len: limits::EMOTE_MAX_LEN,
            skin_count: player::SKIN_COUNT,
        }
    }
}

/// Everything the simulation can be tuned with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub bounds: WorldBounds,
    pub tick_rate_hz: u32,
    pub sweep_interval_ticks: u64,
    pub default_footprint: Dimensions,
    pub nav: NavConfig,
    pub movement: MovementConfig,
    pub seating: SeatingConfig,
    pub rate_limits: RateLimitConfig,
    pub limits: InputLimits,
    /// Fixed RNG seed for spawn placement; random when absent.
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            bounds: WorldBounds::default(),
            tick_rate_hz: tick::RATE_HZ,
            sweep_interval_ticks: tick::SWEEP_INTERVAL_TICKS,
            default_footprint: Dimensions::new(
                player::DEFAULT_WIDTH,
                player::DEFAULT_HEIGHT,
                player::DEFAULT_DEPTH,
            ),
            nav: NavConfig::default(),
            movement: MovementConfig::default(),
            seating: SeatingConfig::default(),
            rate_limits: RateLimitConfig::default(),
            limits: InputLimits::default(),
            seed: None,
        }
    }
}

impl SimConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Read a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&text)?)
    }

    /// Milliseconds per tick.
    pub fn tick_millis(&self) -> u64 {
        1_000 / u64::from(self.tick_rate_hz.max(1))
    }

    /// Seconds per tick.
    pub fn tick_seconds(&self) -> f32 {
        1.0 / self.tick_rate_hz.max(1) as f32
    }
}

/// A semantic problem with a parsed config.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    EmptyBounds,
    InvalidTickRate(u32),
    InvalidGridSize(f32),
    ZeroIterationCap,
    InvalidWalkSpeed(f32),
    InvertedStuckThresholds { replan: u32, abandon: u32 },
    InvalidSeatSpacing(f32),
    InvertedLimits(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyBounds => write!(f, "world bounds have no area"),
            ConfigError::InvalidTickRate(hz) => write!(f, "tick rate {hz} Hz is out of range 1..=240"),
            ConfigError::InvalidGridSize(g) => write!(f, "grid size {g} must be positive"),
            ConfigError::ZeroIterationCap => write!(f, "pathfinder iteration cap must be positive"),
            ConfigError::InvalidWalkSpeed(s) => write!(f, "walk speed {s} must be positive"),
            ConfigError::InvertedStuckThresholds { replan, abandon } => write!(
                f,
                "stuck replan threshold {replan} must be below abandon threshold {abandon}"
            ),
            ConfigError::InvalidSeatSpacing(s) => write!(f, "seat spacing {s} must be positive"),
            ConfigError::InvertedLimits(field) => write!(f, "{field}: min exceeds max"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Check a config for values that would break the simulation.
pub fn validate_config(cfg: &SimConfig) -> Vec<ConfigError> {
    let mut errors = Vec::new();
    let b = &cfg.bounds;
    if !(b.min_x < b.max_x && b.min_z < b.max_z) {
        errors.push(ConfigError::EmptyBounds);
    }
    if cfg.tick_rate_hz == 0 || cfg.tick_rate_hz > 240 {
        errors.push(ConfigError::InvalidTickRate(cfg.tick_rate_hz));
    }
    if !(cfg.nav.grid_size > 0.0) {
        errors.push(ConfigError::InvalidGridSize(cfg.nav.grid_size));
    }
    if cfg.nav.max_iterations == 0 {
        errors.push(ConfigError::ZeroIterationCap);
    }
    if !(cfg.movement.walk_speed > 0.0) {
        errors.push(ConfigError::InvalidWalkSpeed(cfg.movement.walk_speed));
    }
    if cfg.movement.replan_after_ticks >= cfg.movement.abandon_after_ticks {
        errors.push(ConfigError::InvertedStuckThresholds {
            replan: cfg.movement.replan_after_ticks,
            abandon: cfg.movement.abandon_after_ticks,
        });
    }
    if !(cfg.seating.seat_spacing > 0.0) || !(cfg.seating.lying_slot_width > 0.0) {
        errors.push(ConfigError::InvalidSeatSpacing(cfg.seating.seat_spacing));
    }
    let l = &cfg.limits;
    if l.min_dimension > l.max_dimension {
        errors.push(ConfigError::InvertedLimits("dimension"));
    }
    if l.min_scale > l.max_scale {
        errors.push(ConfigError::InvertedLimits("scale"));
    }
    if l.min_footprint > l.max_footprint {
        errors.push(ConfigError::InvertedLimits("footprint"));
    }
    errors
}

/// Failure reading a config file.
#[derive(Debug)]
pub enum LoadConfigError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl From<std::io::Error> for LoadConfigError {
    fn from(e: std::io::Error) -> Self {
        LoadConfigError::Io(e)
    }
}

impl From<serde_json::Error> for LoadConfigError {
    fn from(e: serde_json::Error) -> Self {
        LoadConfigError::Json(e)
    }
}

impl fmt::Display for LoadConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadConfigError::Io(e) => write!(f, "IO error: {}", e),
            LoadConfigError::Json(e) => write!(f, "config parse error: {}", e),
        }
    }
}

impl std::error::Error for LoadConfigError {}
