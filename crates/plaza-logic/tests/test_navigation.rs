//! Integration tests for navigation over a furnished plaza.
//!
//! Exercises: CollisionSet → GridPathfinder → movement::step_toward
//!
//! All tests are pure logic; no server, no threads.

use plaza_logic::collision::{
    intersects, player_box, CollisionSet, Dimensions, FoodShape, ObstacleShape, Vec3, WorldBounds,
};
use plaza_logic::config::{MovementConfig, NavConfig};
use plaza_logic::movement::{step_toward, StepInput, StepOutcome};
use plaza_logic::pathfinding::{path_length, GridPathfinder, NavContext, Waypoint};

// ── Helpers ────────────────────────────────────────────────────────────

const PLAYER: Dimensions = Dimensions::new(0.6, 1.8, 0.6);

fn obstacle(x: f32, z: f32, w: f32, d: f32, rotation: f32) -> ObstacleShape {
    ObstacleShape {
        center: Vec3::new(x, 0.0, z),
        dims: Dimensions::new(w, 2.0, d),
        rotation,
        passthrough: false,
    }
}

fn planner() -> GridPathfinder {
    let mut nav = GridPathfinder::new(NavConfig::default());
    nav.set_footprint(PLAYER);
    nav
}

/// Walk a path with the real step function until arrival or `max_ticks`.
fn walk(set: &CollisionSet, bounds: &WorldBounds, start: Vec3, path: &[Waypoint], max_ticks: usize) -> Vec3 {
    let cfg = MovementConfig::default();
    let max_step = cfg.walk_speed / 20.0;
    let mut pos = start;
    let mut next = 0;
    for _ in 0..max_ticks {
        let Some(target) = path.get(next) else {
            break;
        };
        match step_toward(
            StepInput {
                set,
                bounds,
                dims: PLAYER,
                position: pos,
                target_x: target.x,
                target_z: target.z,
                max_step,
            },
            &cfg,
        ) {
            StepOutcome::Moved { x, z, .. } => {
                pos.x = x;
                pos.z = z;
                assert!(!set.blocked(&player_box(pos, PLAYER)), "overlap at {pos:?}");
            }
            StepOutcome::Blocked => {}
        }
        if Waypoint::new(pos.x, pos.z).distance(target) <= cfg.arrival_radius {
            next += 1;
        }
    }
    pos
}

// ── Scenarios ─────────────────────────────────────────────────────────

#[test]
fn crossing_around_central_obstacle() {
    let shapes = [obstacle(0.0, 0.0, 2.0, 2.0, 0.0)];
    let set = CollisionSet::build(shapes.iter().map(|s| ("crate", s)), [], 0.3);
    let bounds = WorldBounds::square(20.0);
    let ctx = NavContext::new(&set, &bounds);

    let path = planner().find_path(ctx, (-5.0, 0.0), (5.0, 0.0)).unwrap();
    assert!(path.complete);
    for w in &path.waypoints {
        let footprint = player_box(Vec3::new(w.x, 0.0, w.z), PLAYER);
        assert!(!intersects(&footprint, &set.blockers()[0].aabb), "{w:?}");
    }

    let end = walk(&set, &bounds, Vec3::new(-5.0, 0.0, 0.0), &path.waypoints[1..], 400);
    assert!(Waypoint::new(end.x, end.z).distance(&Waypoint::new(5.0, 0.0)) < 0.06);
}

#[test]
fn clear_line_stays_within_diagonal_bound() {
    let set = CollisionSet::new();
    let bounds = WorldBounds::square(20.0);
    let ctx = NavContext::new(&set, &bounds);
    let mut nav = planner();
    for (start, goal) in [
        ((-10.0, -10.0), (10.0, 7.5)),
        ((3.3, 1.1), (-2.7, 9.9)),
        ((0.0, 0.0), (0.4, 0.2)),
    ] {
        let path = nav.find_path(ctx, start, goal).unwrap();
        let direct = Waypoint::new(start.0, start.1).distance(&Waypoint::new(goal.0, goal.1));
        assert!(path_length(&path.waypoints) <= direct * std::f32::consts::SQRT_2 + 1e-3);
    }
}

#[test]
fn rotated_table_is_avoided() {
    let shapes = [obstacle(0.0, 0.0, 6.0, 1.0, std::f32::consts::FRAC_PI_2)];
    let set = CollisionSet::build(shapes.iter().map(|s| ("table", s)), [], 0.3);
    let bounds = WorldBounds::square(20.0);
    let ctx = NavContext::new(&set, &bounds);
    let mut nav = planner();
    let path = nav.find_path(ctx, (-4.0, 0.0), (4.0, 0.0)).unwrap();
    assert!(path.complete);
    // rotated a quarter turn, the table spans z in [-3, 3]
    assert!(path.waypoints.iter().any(|w| w.z.abs() >= 3.0));
    for w in &path.waypoints {
        assert!(nav.point_walkable(ctx, w.x, w.z).unwrap());
    }
}

#[test]
fn food_only_blocks_its_reduced_box() {
    let food = FoodShape {
        center: Vec3::new(0.0, 0.2, 0.0),
        dims: Dimensions::new(2.0, 0.4, 2.0),
        scale: 1.0,
    };
    let set = CollisionSet::build([], [("cake", &food)], 0.3);
    let bounds = WorldBounds::square(20.0);
    let ctx = NavContext::new(&set, &bounds);
    let nav = planner();
    // full box would cover x = 0.8, reduced box is only 0.6 wide
    assert!(nav.point_walkable(ctx, 0.7, 0.0).unwrap());
    assert!(!nav.point_walkable(ctx, 0.4, 0.0).unwrap());
}

#[test]
fn search_always_returns_something() {
    let mut shapes = Vec::new();
    for i in -6..=6 {
        shapes.push(obstacle(i as f32 * 1.5, 4.0, 1.2, 1.2, 0.0));
    }
    let set = CollisionSet::build(shapes.iter().map(|s| ("post", s)), [], 0.3);
    let bounds = WorldBounds::square(20.0);
    let mut nav = GridPathfinder::new(NavConfig {
        max_iterations: 50,
        ..NavConfig::default()
    });
    nav.set_footprint(PLAYER);
    let path = nav
        .find_path(NavContext::new(&set, &bounds), (0.0, -15.0), (0.0, 15.0))
        .unwrap();
    assert!(!path.waypoints.is_empty());
    assert!(path.iterations <= 50);
}
