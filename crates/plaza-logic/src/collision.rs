//! Axis-aligned collision primitives.
//!
//! Everything that can block a player is flattened into a [`CollisionSet`]
//! of [`Blocker`]s: non-passthrough obstacles with their full box, food with
//! a shrunken box. All tests are strict-overlap AABB checks, so touching
//! faces never collide.
//!
//! ```
//! use plaza_logic::collision::{intersects, Aabb, Dimensions, Vec3};
//!
//! let a = Aabb::from_center(Vec3::new(0.0, 0.0, 0.0), Dimensions::new(2.0, 2.0, 2.0));
//! let b = Aabb::from_center(Vec3::new(2.0, 0.0, 0.0), Dimensions::new(2.0, 2.0, 2.0));
//! assert!(!intersects(&a, &b)); // faces touch at x = 1
//! ```

use serde::{Deserialize, Serialize};

/// A point in world space. `y` is up.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Horizontal distance, ignoring `y`.
    pub fn distance_xz(&self, other: &Vec3) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }
}

/// Box size along each axis (full extents, not halves).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f32,
    pub height: f32,
    pub depth: f32,
}

impl Dimensions {
    pub const fn new(width: f32, height: f32, depth: f32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            width: self.width * factor,
            height: self.height * factor,
            depth: self.depth * factor,
        }
    }

    /// Larger of the two horizontal half-extents.
    pub fn max_half_xz(&self) -> f32 {
        self.width.max(self.depth) / 2.0
    }

    pub fn longer_horizontal(&self) -> f32 {
        self.width.max(self.depth)
    }

    pub fn shorter_horizontal(&self) -> f32 {
        self.width.min(self.depth)
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_center(center: Vec3, dims: Dimensions) -> Self {
        Self::from_half_extents(center, dims.width / 2.0, dims.height / 2.0, dims.depth / 2.0)
    }

    /// Box enclosing `dims` rotated by `rotation` radians about the y axis.
    pub fn from_center_rotated(center: Vec3, dims: Dimensions, rotation: f32) -> Self {
        let (sin, cos) = rotation.sin_cos();
        let (sin, cos) = (sin.abs(), cos.abs());
        let hw = dims.width / 2.0;
        let hd = dims.depth / 2.0;
        Self::from_half_extents(
            center,
            cos * hw + sin * hd,
            dims.height / 2.0,
            sin * hw + cos * hd,
        )
    }

    fn from_half_extents(center: Vec3, hx: f32, hy: f32, hz: f32) -> Self {
        Self {
            min: Vec3::new(center.x - hx, center.y - hy, center.z - hz),
            max: Vec3::new(center.x + hx, center.y + hy, center.z + hz),
        }
    }

    pub fn center(&self) -> Vec3 {
        Vec3::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }

    pub fn half_x(&self) -> f32 {
        (self.max.x - self.min.x) / 2.0
    }

    pub fn half_z(&self) -> f32 {
        (self.max.z - self.min.z) / 2.0
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        intersects(self, other)
    }

    /// Whether `(x, z)` lies inside the horizontal footprint (edges included).
    pub fn contains_xz(&self, x: f32, z: f32) -> bool {
        x >= self.min.x && x <= self.max.x && z >= self.min.z && z <= self.max.z
    }

    /// Horizontal clearance between two boxes; `0.0` when they touch or overlap.
    pub fn clearance_xz(&self, other: &Aabb) -> f32 {
        let gx = (other.min.x - self.max.x).max(self.min.x - other.max.x).max(0.0);
        let gz = (other.min.z - self.max.z).max(self.min.z - other.max.z).max(0.0);
        (gx * gx + gz * gz).sqrt()
    }
}

/// Strict-overlap test on all three axes. Symmetric; degenerate boxes never hit.
pub fn intersects(a: &Aabb, b: &Aabb) -> bool {
    a.min.x < b.max.x
        && a.max.x > b.min.x
        && a.min.y < b.max.y
        && a.max.y > b.min.y
        && a.min.z < b.max.z
        && a.max.z > b.min.z
}

/// Box of a player standing at `position`. Players are feet-anchored: the box
/// spans `[y, y + height]` vertically and is centred horizontally.
pub fn player_box(position: Vec3, dims: Dimensions) -> Aabb {
    let hw = dims.width / 2.0;
    let hd = dims.depth / 2.0;
    Aabb {
        min: Vec3::new(position.x - hw, position.y, position.z - hd),
        max: Vec3::new(position.x + hw, position.y + dims.height, position.z + hd),
    }
}

/// Live geometry of a piece of furniture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObstacleShape {
    pub center: Vec3,
    pub dims: Dimensions,
    /// Radians about the y axis.
    pub rotation: f32,
    pub passthrough: bool,
}

impl ObstacleShape {
    /// Full rotated box, regardless of the passthrough flag.
    pub fn bounds(&self) -> Aabb {
        Aabb::from_center_rotated(self.center, self.dims, self.rotation)
    }

    /// Collision box, or `None` for passthrough obstacles.
    pub fn collision_box(&self) -> Option<Aabb> {
        if self.passthrough {
            None
        } else {
            Some(self.bounds())
        }
    }
}

/// Live geometry of a food item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoodShape {
    pub center: Vec3,
    pub dims: Dimensions,
    pub scale: f32,
}

impl FoodShape {
    /// Rendered size is `dims * scale`; the collision box keeps only
    /// `collision_scale` of it so food is easy to walk past.
    pub fn collision_box(&self, collision_scale: f32) -> Aabb {
        Aabb::from_center(self.center, self.dims.scaled(self.scale * collision_scale))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockerKind {
    Obstacle,
    Food,
}

/// One live collision volume.
#[derive(Debug, Clone, PartialEq)]
pub struct Blocker {
    pub id: String,
    pub kind: BlockerKind,
    pub aabb: Aabb,
    pub center: Vec3,
}

impl Blocker {
    pub fn from_obstacle(id: &str, shape: &ObstacleShape) -> Option<Self> {
        shape.collision_box().map(|aabb| Self {
            id: id.to_string(),
            kind: BlockerKind::Obstacle,
            aabb,
            center: shape.center,
        })
    }

    pub fn from_food(id: &str, shape: &FoodShape, collision_scale: f32) -> Self {
        Self {
            id: id.to_string(),
            kind: BlockerKind::Food,
            aabb: shape.collision_box(collision_scale),
            center: shape.center,
        }
    }
}

/// Flattened list of everything a player can bump into.
#[derive(Debug, Clone, Default)]
pub struct CollisionSet {
    blockers: Vec<Blocker>,
}

impl CollisionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from obstacle and food shapes. Passthrough obstacles are skipped.
    pub fn build<'a>(
        obstacles: impl IntoIterator<Item = (&'a str, &'a ObstacleShape)>,
        food: impl IntoIterator<Item = (&'a str, &'a FoodShape)>,
        food_collision_scale: f32,
    ) -> Self {
        let mut blockers: Vec<Blocker> = obstacles
            .into_iter()
            .filter_map(|(id, shape)| Blocker::from_obstacle(id, shape))
            .collect();
        blockers.extend(
            food.into_iter()
                .map(|(id, shape)| Blocker::from_food(id, shape, food_collision_scale)),
        );
        Self { blockers }
    }

    pub fn blockers(&self) -> &[Blocker] {
        &self.blockers
    }

    pub fn len(&self) -> usize {
        self.blockers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blockers.is_empty()
    }

    pub fn blocked(&self, aabb: &Aabb) -> bool {
        self.first_hit(aabb).is_some()
    }

    pub fn first_hit(&self, aabb: &Aabb) -> Option<&Blocker> {
        self.blockers.iter().find(|b| intersects(&b.aabb, aabb))
    }

    /// First blocker whose horizontal footprint contains `(x, z)`.
    pub fn blocker_containing(&self, x: f32, z: f32) -> Option<&Blocker> {
        self.blockers.iter().find(|b| b.aabb.contains_xz(x, z))
    }
}

/// Rectangular play area on the x/z plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_z: f32,
    pub max_z: f32,
}

impl WorldBounds {
    pub fn square(half_extent: f32) -> Self {
        Self {
            min_x: -half_extent,
            max_x: half_extent,
            min_z: -half_extent,
            max_z: half_extent,
        }
    }

    /// Whether the box's horizontal footprint is fully inside the area.
    pub fn contains_box(&self, aabb: &Aabb) -> bool {
        aabb.min.x >= self.min_x
            && aabb.max.x <= self.max_x
            && aabb.min.z >= self.min_z
            && aabb.max.z <= self.max_z
    }

    pub fn contains_point(&self, x: f32, z: f32) -> bool {
        x >= self.min_x && x <= self.max_x && z >= self.min_z && z <= self.max_z
    }

    pub fn clamp_point(&self, x: f32, z: f32) -> (f32, f32) {
        (x.clamp(self.min_x, self.max_x), z.clamp(self.min_z, self.max_z))
    }
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self::square(crate::constants::world::HALF_EXTENT)
    }
}
