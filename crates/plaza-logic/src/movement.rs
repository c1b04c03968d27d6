//! Authoritative per-tick movement: legality check, repulsion and wall sliding.
//!
//! Algorithm for one step toward a waypoint:
//! 1. Intended step = direction × speed × dt, landing exactly on the waypoint
//!    when it is within reach
//! 2. Add a small repulsion push away from blockers the player is hugging
//! 3. Validate the candidate box against world bounds and every blocker
//! 4. On rejection retry the pure intended step, then each axis alone (slide)
//! 5. Nothing fits: the step is blocked and the stuck tracker decides what next

use crate::collision::{player_box, CollisionSet, Dimensions, Vec3, WorldBounds};
use crate::config::MovementConfig;

/// Whether a player with footprint `dims` may stand at `(x, y, z)`.
pub fn validate(
    set: &CollisionSet,
    bounds: &WorldBounds,
    dims: Dimensions,
    y: f32,
    x: f32,
    z: f32,
) -> bool {
    let candidate = player_box(Vec3::new(x, y, z), dims);
    bounds.contains_box(&candidate) && !set.blocked(&candidate)
}

/// Horizontal push summed over nearby blockers.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Repulsion {
    pub dx: f32,
    pub dz: f32,
}

impl Repulsion {
    pub fn is_zero(&self) -> bool {
        self.dx == 0.0 && self.dz == 0.0
    }
}

/// Push away from every blocker within `repulsion_radius` of the player's box.
///
/// Magnitude per blocker is `strength * (radius - clearance) / radius`, aimed
/// from the blocker centre to the player. Blockers entirely above or below
/// the player are ignored.
pub fn repulsion(
    set: &CollisionSet,
    position: Vec3,
    dims: Dimensions,
    cfg: &MovementConfig,
) -> Repulsion {
    let radius = cfg.repulsion_radius;
    if radius <= 0.0 {
        return Repulsion::default();
    }
    let own = player_box(position, dims);
    let mut push = Repulsion::default();
    for blocker in set.blockers() {
        if blocker.aabb.max.y <= own.min.y || blocker.aabb.min.y >= own.max.y {
            continue;
        }
        let clearance = own.clearance_xz(&blocker.aabb);
        if clearance > radius {
            continue;
        }
        let ax = position.x - blocker.center.x;
        let az = position.z - blocker.center.z;
        let len = (ax * ax + az * az).sqrt();
        if len < f32::EPSILON {
            continue;
        }
        let magnitude = cfg.repulsion_strength * (radius - clearance) / radius;
        push.dx += ax / len * magnitude;
        push.dz += az / len * magnitude;
    }
    push
}

/// Everything one step needs.
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    pub set: &'a CollisionSet,
    pub bounds: &'a WorldBounds,
    pub dims: Dimensions,
    pub position: Vec3,
    pub target_x: f32,
    pub target_z: f32,
    /// Furthest distance covered this tick (speed × dt).
    pub max_step: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// New position; `slid` when only one axis of the step survived.
    Moved { x: f32, z: f32, slid: bool },
    Blocked,
}

/// Advance one tick toward `(target_x, target_z)`.
pub fn step_toward(input: StepInput<'_>, cfg: &MovementConfig) -> StepOutcome {
    let StepInput {
        set,
        bounds,
        dims,
        position: p,
        target_x,
        target_z,
        max_step,
    } = input;
    let dx = target_x - p.x;
    let dz = target_z - p.z;
    let dist = (dx * dx + dz * dz).sqrt();
    let (ix, iz) = if dist <= max_step {
        (target_x, target_z)
    } else {
        (p.x + dx / dist * max_step, p.z + dz / dist * max_step)
    };

    let push = repulsion(set, p, dims, cfg);
    let fits = |x: f32, z: f32| validate(set, bounds, dims, p.y, x, z);

    if !push.is_zero() && fits(ix + push.dx, iz + push.dz) {
        return StepOutcome::Moved {
            x: ix + push.dx,
            z: iz + push.dz,
            slid: false,
        };
    }
    if fits(ix, iz) {
        return StepOutcome::Moved {
            x: ix,
            z: iz,
            slid: false,
        };
    }
    if ix != p.x && fits(ix, p.z) {
        return StepOutcome::Moved {
            x: ix,
            z: p.z,
            slid: true,
        };
    }
    if iz != p.z && fits(p.x, iz) {
        return StepOutcome::Moved {
            x: p.x,
            z: iz,
            slid: true,
        };
    }
    StepOutcome::Blocked
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StuckVerdict {
    Continue,
    /// Recompute the path from the current position.
    Replan,
    /// Give up on the current target.
    Abandon,
}

/// Escalating stuck detection for one moving player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StuckTracker {
    /// Consecutive ticks with near-zero displacement.
    pub stuck_ticks: u32,
    /// Consecutive fully blocked steps.
    pub collision_retries: u32,
    /// Ticks until another replan is allowed.
    pub replan_cooldown: u32,
}

impl StuckTracker {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record one tick of movement and decide what to do about it.
    pub fn record(&mut self, displacement: f32, blocked: bool, cfg: &MovementConfig) -> StuckVerdict {
        self.replan_cooldown = self.replan_cooldown.saturating_sub(1);
        if displacement < cfg.stuck_epsilon {
            self.stuck_ticks += 1;
        } else {
            self.stuck_ticks = 0;
        }
        if blocked {
            self.collision_retries += 1;
        } else {
            self.collision_retries = 0;
        }

        if self.stuck_ticks >= cfg.abandon_after_ticks {
            self.reset();
            return StuckVerdict::Abandon;
        }
        let wants_replan = self.stuck_ticks >= cfg.replan_after_ticks
            || self.collision_retries >= cfg.collision_retry_limit;
        if wants_replan && self.replan_cooldown == 0 {
            self.collision_retries = 0;
            self.replan_cooldown = cfg.replan_cooldown_ticks;
            return StuckVerdict::Replan;
        }
        StuckVerdict::Continue
    }
}
