//! Standing / sitting / lying state machine and seat geometry.
//!
//! ```text
//!            sit (free seat)            lie (free slot)
//!   Sitting <──────────────── Free ────────────────> Lying
//!          ──────────────────>    <─────────────────
//!              stand up                get up
//! ```
//!
//! Slot allocation picks the lowest unoccupied index. When every index is
//! taken the last one is shared, unless `reject_over_capacity` is set.
//!
//! Anchors are computed in the furniture's local frame (width on x, depth on
//! z, front facing +z) and rotated into the world about the y axis.

use std::f32::consts::{FRAC_PI_2, TAU};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::collision::{Dimensions, Vec3};
use crate::config::SeatingConfig;
use crate::furniture::{FurnitureClass, FurnitureKind};
use crate::pathfinding::Waypoint;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InteractionState {
    #[default]
    Free,
    Sitting { furniture_id: String, seat: u32 },
    Lying { furniture_id: String, slot: u32 },
}

impl InteractionState {
    pub fn is_free(&self) -> bool {
        matches!(self, InteractionState::Free)
    }

    pub fn is_sitting(&self) -> bool {
        matches!(self, InteractionState::Sitting { .. })
    }

    pub fn is_lying(&self) -> bool {
        matches!(self, InteractionState::Lying { .. })
    }

    pub fn furniture_id(&self) -> Option<&str> {
        match self {
            InteractionState::Free => None,
            InteractionState::Sitting { furniture_id, .. }
            | InteractionState::Lying { furniture_id, .. } => Some(furniture_id),
        }
    }

    /// Occupied `(posture, index)` on `furniture_id`, if any.
    pub fn occupies(&self, furniture_id: &str) -> Option<(Posture, u32)> {
        match self {
            InteractionState::Sitting { furniture_id: f, seat } if f == furniture_id => {
                Some((Posture::Sit, *seat))
            }
            InteractionState::Lying { furniture_id: f, slot } if f == furniture_id => {
                Some((Posture::Lie, *slot))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Posture {
    Sit,
    Lie,
}

impl Posture {
    pub fn capacity(&self, class: &FurnitureClass) -> u32 {
        match self {
            Posture::Sit => class.seat_capacity,
            Posture::Lie => class.lying_capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InteractionError {
    AlreadyInteracting,
    NotSitting,
    NotLying,
    NotSittable(String),
    NotLieable(String),
    NoFreeSlot(String),
}

impl fmt::Display for InteractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionError::AlreadyInteracting => write!(f, "already sitting or lying"),
            InteractionError::NotSitting => write!(f, "not sitting"),
            InteractionError::NotLying => write!(f, "not lying"),
            InteractionError::NotSittable(id) => write!(f, "'{id}' has no seats"),
            InteractionError::NotLieable(id) => write!(f, "'{id}' cannot be lain on"),
            InteractionError::NoFreeSlot(id) => write!(f, "'{id}' is fully occupied"),
        }
    }
}

impl std::error::Error for InteractionError {}

/// Pick a slot index in `0..capacity`.
pub fn allocate_slot(
    furniture_id: &str,
    capacity: u32,
    occupied: &[u32],
    reject_over_capacity: bool,
) -> Result<u32, InteractionError> {
    if capacity == 0 {
        return Err(InteractionError::NoFreeSlot(furniture_id.to_string()));
    }
    if let Some(free) = (0..capacity).find(|i| !occupied.contains(i)) {
        return Ok(free);
    }
    if reject_over_capacity {
        Err(InteractionError::NoFreeSlot(furniture_id.to_string()))
    } else {
        Ok(capacity - 1)
    }
}

/// Placement of a piece of furniture, as used for anchor maths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FurniturePose {
    /// Box centre.
    pub center: Vec3,
    pub dims: Dimensions,
    pub rotation: f32,
    pub class: FurnitureClass,
}

impl FurniturePose {
    fn base_y(&self) -> f32 {
        self.center.y - self.dims.height / 2.0
    }

    fn to_world(&self, lx: f32, lz: f32) -> (f32, f32) {
        let (sin, cos) = self.rotation.sin_cos();
        (
            self.center.x + lx * cos + lz * sin,
            self.center.z - lx * sin + lz * cos,
        )
    }

    fn long_axis_is_x(&self) -> bool {
        self.dims.width >= self.dims.depth
    }
}

/// Where a sitting or lying player is pinned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub position: Vec3,
    pub rotation: f32,
}

/// Centre of slot `index` when `count` slots share `length`.
fn spread(length: f32, index: u32, count: u32) -> f32 {
    let count = count.max(1);
    -length / 2.0 + length * (index as f32 + 0.5) / count as f32
}

/// Seat anchor for `seat` on `pose`.
pub fn seat_anchor(pose: &FurniturePose, seat: u32, seating: &SeatingConfig) -> Anchor {
    let kind = pose.class.kind;
    let capacity = pose.class.seat_capacity.max(1);
    let seat = seat.min(capacity - 1);
    let y = pose.base_y() + pose.dims.height * kind.seat_height_fraction();
    let (w, d) = (pose.dims.width, pose.dims.depth);

    let (lx, lz, turn) = match kind {
        FurnitureKind::CornerSofa => {
            let sp = seating.seat_spacing;
            let back = ((w / sp).floor() as u32).clamp(1, capacity);
            let inset = sp / 2.0;
            if seat < back {
                let x = (-w / 2.0 + sp * (seat as f32 + 0.5)).min(w / 2.0 - inset);
                (x, -d / 2.0 + inset, 0.0)
            } else {
                let j = seat - back;
                let z = (-d / 2.0 + sp * (j as f32 + 1.5)).min(d / 2.0 - inset);
                (-w / 2.0 + inset, z, FRAC_PI_2)
            }
        }
        _ if pose.long_axis_is_x() => (
            spread(w, seat, capacity),
            d * kind.seat_forward_offset(),
            0.0,
        ),
        _ => (
            w * kind.seat_forward_offset(),
            spread(d, seat, capacity),
            FRAC_PI_2,
        ),
    };
    let (x, z) = pose.to_world(lx, lz);
    Anchor {
        position: Vec3::new(x, y, z),
        rotation: pose.rotation + turn,
    }
}

/// Lying anchor for `slot` on `pose`: side by side across the short side,
/// shifted toward the foot along the long side.
pub fn lying_anchor(pose: &FurniturePose, slot: u32, seating: &SeatingConfig) -> Anchor {
    let capacity = pose.class.lying_capacity.max(1);
    let slot = slot.min(capacity - 1);
    let y = pose.base_y() + pose.dims.height * seating.lying_height_fraction;
    let (w, d) = (pose.dims.width, pose.dims.depth);
    let (lx, lz, turn) = if pose.long_axis_is_x() {
        (w * seating.lying_foot_offset, spread(d, slot, capacity), FRAC_PI_2)
    } else {
        (spread(w, slot, capacity), d * seating.lying_foot_offset, 0.0)
    };
    let (x, z) = pose.to_world(lx, lz);
    Anchor {
        position: Vec3::new(x, y, z),
        rotation: pose.rotation + turn,
    }
}

/// Anchor for either posture.
pub fn anchor(pose: &FurniturePose, posture: Posture, index: u32, seating: &SeatingConfig) -> Anchor {
    match posture {
        Posture::Sit => seat_anchor(pose, index, seating),
        Posture::Lie => lying_anchor(pose, index, seating),
    }
}

/// Ground spots to step off to, best first.
///
/// The first candidate lies along the vector from the furniture centre to the
/// player (or the player's facing when the two coincide) at a distance that
/// clears both footprints plus `stand_up_margin`. The rest rotate around the
/// furniture, alternating sides.
pub fn exit_candidates(
    furniture_center: Vec3,
    furniture_dims: Dimensions,
    player_position: Vec3,
    player_rotation: f32,
    player_dims: Dimensions,
    seating: &SeatingConfig,
) -> Vec<Waypoint> {
    let mut ox = player_position.x - furniture_center.x;
    let mut oz = player_position.z - furniture_center.z;
    if (ox * ox + oz * oz).sqrt() < 1e-3 {
        let (sin, cos) = player_rotation.sin_cos();
        ox = sin;
        oz = cos;
    }
    let base = ox.atan2(oz);
    let distance =
        furniture_dims.max_half_xz() + player_dims.max_half_xz() + seating.stand_up_margin;
    let count = seating.exit_candidates.max(1);
    let step = TAU / count as f32;

    let mut offsets = vec![0i32];
    for k in 1..=(count as i32 / 2) {
        offsets.push(k);
        if offsets.len() < count as usize {
            offsets.push(-k);
        }
    }
    offsets
        .into_iter()
        .take(count as usize)
        .map(|k| {
            let angle = base + k as f32 * step;
            Waypoint::new(
                furniture_center.x + distance * angle.sin(),
                furniture_center.z + distance * angle.cos(),
            )
        })
        .collect()
}
