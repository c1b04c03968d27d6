//! Tuning constants for the world, the tick loop, navigation and seating.
//!
//! Plain values with no runtime dependency. `SimConfig::default()` is built
//! from these, so a deployment only needs a config file to override them.

pub mod world {
    /// Half the side length of the square play area, centred on the origin.
    pub const HALF_EXTENT: f32 = 20.0;
    pub const GROUND_Y: f32 = 0.0;
    /// Coordinates beyond this magnitude are rejected, not clamped.
    pub const ABSURD_COORDINATE: f32 = 10_000.0;
}

pub mod tick {
    pub const RATE_HZ: u32 = 20;
    /// Sweep empty rate-limit windows once per this many ticks.
    pub const SWEEP_INTERVAL_TICKS: u64 = 20;
}

pub mod player {
    pub const DEFAULT_WIDTH: f32 = 0.6;
    pub const DEFAULT_HEIGHT: f32 = 1.8;
    pub const DEFAULT_DEPTH: f32 = 0.6;
    /// Metres per second.
    pub const WALK_SPEED: f32 = 4.0;
    /// A waypoint closer than this counts as reached.
    pub const ARRIVAL_RADIUS: f32 = 0.05;
    pub const SKIN_COUNT: u8 = 8;
    pub const NAME_MAX_LEN: usize = 24;
    pub const DEFAULT_NAME: &str = "Guest";
    pub const MIN_FOOTPRINT: f32 = 0.2;
    pub const MAX_FOOTPRINT: f32 = 3.0;
    /// Random spawn attempts before falling back to a ring search.
    pub const SPAWN_ATTEMPTS: usize = 32;
}

pub mod nav {
    pub const GRID_SIZE: f32 = 0.5;
    pub const MAX_ITERATIONS: usize = 6_000;
    /// Search succeeds once a node is this many cells from the goal.
    pub const GOAL_TOLERANCE_CELLS: f32 = 2.0;
    pub const PROXIMITY_RADIUS: f32 = 1.0;
    pub const PROXIMITY_WEIGHT: f32 = 0.8;
    pub const NEAREST_WALKABLE_RINGS: u32 = 12;
    /// Line-of-sight sample spacing as a fraction of the grid size.
    pub const LINE_SAMPLE_FRACTION: f32 = 0.25;
    /// Weight of the point itself in the 1-2-1 smoothing blend.
    pub const SMOOTHING_SELF_WEIGHT: f32 = 0.5;
    pub const INTERACTION_SAMPLES: u32 = 16;
    pub const INTERACTION_STANDOFF: f32 = 0.25;
}

pub mod collision {
    /// Food collides with this fraction of its rendered box.
    pub const FOOD_COLLISION_SCALE: f32 = 0.3;
    pub const REPULSION_RADIUS: f32 = 0.3;
    pub const REPULSION_STRENGTH: f32 = 0.03;
}

pub mod stuck {
    /// Per-tick displacement below this counts as not moving.
    pub const EPSILON: f32 = 0.005;
    pub const REPLAN_AFTER_TICKS: u32 = 10;
    pub const ABANDON_AFTER_TICKS: u32 = 40;
    pub const COLLISION_RETRY_LIMIT: u32 = 5;
    pub const REPLAN_COOLDOWN_TICKS: u32 = 10;
}

pub mod seating {
    /// Horizontal length one sitter takes on a bench or sofa.
    pub const SEAT_SPACING: f32 = 0.7;
    /// Width one sleeper takes across a bed.
    pub const LYING_SLOT_WIDTH: f32 = 0.8;
    /// Lying anchors shift toward the foot by this fraction of the length.
    pub const LYING_FOOT_OFFSET: f32 = 0.1;
    pub const LYING_HEIGHT_FRACTION: f32 = 0.9;
    pub const STAND_UP_MARGIN: f32 = 0.2;
    /// Farther than this from the furniture box, a sit becomes a walk first.
    pub const INTERACTION_REACH: f32 = 1.5;
    pub const EXIT_CANDIDATES: u32 = 8;
}

pub mod limits {
    pub const MIN_DIMENSION: f32 = 0.05;
    pub const MAX_DIMENSION: f32 = 12.0;
    pub const MIN_SCALE: f32 = 0.1;
    pub const MAX_SCALE: f32 = 5.0;
    pub const ID_MAX_LEN: usize = 64;
    pub const MODEL_MAX_LEN: usize = 128;
    pub const EMOTE_MAX_LEN: usize = 32;
}
