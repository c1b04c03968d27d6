//! Grid A* over the live collision set.
//!
//! The play area is sampled on a uniform grid (`NavConfig::grid_size`). A
//! node is walkable when the requester's footprint, placed on the ground at
//! the node, stays inside the world bounds and touches no blocker. Node
//! walkability and proximity cost are memoised per footprint until
//! [`GridPathfinder::invalidate`] is called after a world mutation.
//!
//! Search details:
//! - 8-connected; a diagonal step needs both flanking orthogonal cells walkable
//! - edge cost `grid × (1 | √2)` plus a quadratic penalty near blocker centres
//! - Euclidean heuristic; open-set ties broken by insertion order
//! - success within `goal_tolerance_cells` of the goal or on the goal's nearest
//!   walkable node; on exhausting `max_iterations` the path to the node with
//!   the best heuristic is returned instead
//!
//! The raw node chain is then trimmed by greedy line-of-sight simplification
//! and softened by one pass of neighbour-weighted smoothing. Every output
//! point is walkable.
//!
//! ```
//! use plaza_logic::collision::{CollisionSet, Dimensions, WorldBounds};
//! use plaza_logic::config::NavConfig;
//! use plaza_logic::pathfinding::{GridPathfinder, NavContext};
//!
//! let set = CollisionSet::new();
//! let bounds = WorldBounds::square(20.0);
//! let mut nav = GridPathfinder::new(NavConfig::default());
//! nav.set_footprint(Dimensions::new(0.6, 1.8, 0.6));
//! let path = nav.find_path(NavContext::new(&set, &bounds), (0.0, 0.0), (4.0, 3.0)).unwrap();
//! assert!(path.complete);
//! assert_eq!(path.waypoints.len(), 2);
//! ```

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::f32::consts::{SQRT_2, TAU};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::collision::{Blocker, CollisionSet, Dimensions, WorldBounds};
use crate::config::NavConfig;
use crate::constants::world::GROUND_Y;
use crate::movement;

/// Distinct footprints memoised before the whole cache is dropped.
const MAX_FOOTPRINT_CACHES: usize = 16;

const NEIGHBOURS: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

type Cell = (i32, i32);
type FootprintKey = [u32; 3];

/// One point of a path on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f32,
    pub z: f32,
}

impl Waypoint {
    pub fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }

    pub fn distance(&self, other: &Waypoint) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }
}

/// Total length of a polyline.
pub fn path_length(waypoints: &[Waypoint]) -> f32 {
    waypoints.windows(2).map(|w| w[0].distance(&w[1])).sum()
}

/// World geometry a search runs against.
#[derive(Debug, Clone, Copy)]
pub struct NavContext<'a> {
    pub set: &'a CollisionSet,
    pub bounds: &'a WorldBounds,
}

impl<'a> NavContext<'a> {
    pub fn new(set: &'a CollisionSet, bounds: &'a WorldBounds) -> Self {
        Self { set, bounds }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathResult {
    /// Starts at the requester's position; never empty.
    pub waypoints: Vec<Waypoint>,
    /// `false` when the search gave up and returned a best-effort path.
    pub complete: bool,
    pub iterations: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathError {
    FootprintNotSet,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::FootprintNotSet => write!(f, "footprint must be set before planning"),
        }
    }
}

impl std::error::Error for PathError {}

#[derive(Debug, Clone, Copy)]
struct CellInfo {
    walkable: bool,
    penalty: f32,
}

#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    f: f32,
    seq: u64,
    cell: Cell,
}

impl Ord for OpenEntry {
    /// Reversed so the max-heap pops the lowest f first, then the oldest entry.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

/// Reusable grid planner with a per-footprint walkability cache.
#[derive(Debug, Clone)]
pub struct GridPathfinder {
    config: NavConfig,
    footprint: Option<Dimensions>,
    caches: HashMap<FootprintKey, HashMap<Cell, CellInfo>>,
}

impl GridPathfinder {
    pub fn new(config: NavConfig) -> Self {
        Self {
            config,
            footprint: None,
            caches: HashMap::new(),
        }
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn footprint(&self) -> Option<Dimensions> {
        self.footprint
    }

    /// Select the requester's footprint for the following queries.
    pub fn set_footprint(&mut self, dims: Dimensions) {
        self.footprint = Some(dims);
    }

    /// Drop every memoised cell. Call after any obstacle or food mutation.
    pub fn invalidate(&mut self) {
        self.caches.clear();
    }

    /// Cells memoised for the current footprint.
    pub fn cached_cells(&self) -> usize {
        self.footprint
            .and_then(|d| self.caches.get(&footprint_key(d)))
            .map_or(0, HashMap::len)
    }

    fn grid(&self) -> f32 {
        self.config.grid_size
    }

    fn cell_of(&self, x: f32, z: f32) -> Cell {
        let g = self.grid();
        ((x / g).round() as i32, (z / g).round() as i32)
    }

    fn cell_point(&self, cell: Cell) -> Waypoint {
        let g = self.grid();
        Waypoint::new(cell.0 as f32 * g, cell.1 as f32 * g)
    }

    fn require_footprint(&self) -> Result<Dimensions, PathError> {
        self.footprint.ok_or(PathError::FootprintNotSet)
    }

    fn cell_info(&mut self, ctx: NavContext<'_>, dims: Dimensions, cell: Cell) -> CellInfo {
        let key = footprint_key(dims);
        if let Some(info) = self.caches.get(&key).and_then(|c| c.get(&cell)) {
            return *info;
        }
        let p = self.cell_point(cell);
        let info = CellInfo {
            walkable: movement::validate(ctx.set, ctx.bounds, dims, GROUND_Y, p.x, p.z),
            penalty: proximity_penalty(&self.config, ctx.set.blockers(), p),
        };
        if !self.caches.contains_key(&key) && self.caches.len() >= MAX_FOOTPRINT_CACHES {
            self.caches.clear();
        }
        self.caches.entry(key).or_default().insert(cell, info);
        info
    }

    fn cell_walkable(&mut self, ctx: NavContext<'_>, dims: Dimensions, cell: Cell) -> bool {
        self.cell_info(ctx, dims, cell).walkable
    }

    /// Whether the current footprint fits exactly at `(x, z)`.
    pub fn point_walkable(&self, ctx: NavContext<'_>, x: f32, z: f32) -> Result<bool, PathError> {
        let dims = self.require_footprint()?;
        Ok(movement::validate(ctx.set, ctx.bounds, dims, GROUND_Y, x, z))
    }

    /// Whether every sample along the segment is walkable, endpoints included.
    pub fn line_walkable(
        &self,
        ctx: NavContext<'_>,
        from: Waypoint,
        to: Waypoint,
    ) -> Result<bool, PathError> {
        let dims = self.require_footprint()?;
        Ok(segment_clear(ctx, dims, self.grid() * self.config.line_sample_fraction, from, to))
    }

    /// Closest walkable cell to `cell`, searching expanding rings.
    fn nearest_walkable_cell(
        &mut self,
        ctx: NavContext<'_>,
        dims: Dimensions,
        cell: Cell,
    ) -> Option<Cell> {
        if self.cell_walkable(ctx, dims, cell) {
            return Some(cell);
        }
        let origin = self.cell_point(cell);
        let g = self.grid();
        for ring in 1..=self.config.nearest_walkable_rings {
            let samples = 8 * ring;
            let radius = ring as f32 * g;
            for k in 0..samples {
                let angle = TAU * k as f32 / samples as f32;
                let candidate = self.cell_of(
                    origin.x + radius * angle.cos(),
                    origin.z + radius * angle.sin(),
                );
                if self.cell_walkable(ctx, dims, candidate) {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Grid-aligned walkable point nearest to `(x, z)`, if any within range.
    pub fn nearest_walkable(
        &mut self,
        ctx: NavContext<'_>,
        x: f32,
        z: f32,
    ) -> Result<Option<Waypoint>, PathError> {
        let dims = self.require_footprint()?;
        let cell = self.cell_of(x, z);
        Ok(self
            .nearest_walkable_cell(ctx, dims, cell)
            .map(|c| self.cell_point(c)))
    }

    /// `(x, z)` itself when walkable, otherwise the nearest walkable grid point.
    pub fn nearest_walkable_point(
        &mut self,
        ctx: NavContext<'_>,
        x: f32,
        z: f32,
    ) -> Result<Option<Waypoint>, PathError> {
        if self.point_walkable(ctx, x, z)? {
            return Ok(Some(Waypoint::new(x, z)));
        }
        self.nearest_walkable(ctx, x, z)
    }

    /// Move a goal that lies inside a blocker's footprint to a reachable spot
    /// beside it: the walkable sample around the blocker closest to the goal.
    pub fn resolve_interaction_point(
        &mut self,
        ctx: NavContext<'_>,
        x: f32,
        z: f32,
    ) -> Result<Waypoint, PathError> {
        let dims = self.require_footprint()?;
        let goal = Waypoint::new(x, z);
        let Some(blocker) = ctx.set.blocker_containing(x, z) else {
            return Ok(goal);
        };
        let radius = blocker.aabb.half_x().max(blocker.aabb.half_z())
            + dims.max_half_xz()
            + self.config.interaction_standoff;
        let samples = self.config.interaction_samples.max(1);
        let best = (0..samples)
            .map(|k| {
                let angle = TAU * k as f32 / samples as f32;
                Waypoint::new(
                    blocker.center.x + radius * angle.cos(),
                    blocker.center.z + radius * angle.sin(),
                )
            })
            .filter(|p| movement::validate(ctx.set, ctx.bounds, dims, GROUND_Y, p.x, p.z))
            .min_by(|a, b| a.distance(&goal).total_cmp(&b.distance(&goal)));
        match best {
            Some(p) => Ok(p),
            None => Ok(self.nearest_walkable_point(ctx, x, z)?.unwrap_or(goal)),
        }
    }

    /// Plan from `start` to `goal` for the current footprint.
    pub fn find_path(
        &mut self,
        ctx: NavContext<'_>,
        start: (f32, f32),
        goal: (f32, f32),
    ) -> Result<PathResult, PathError> {
        let dims = self.require_footprint()?;
        let start_point = Waypoint::new(start.0, start.1);
        let goal_point = Waypoint::new(goal.0, goal.1);
        let grid = self.grid();

        let Some(start_cell) = self.nearest_walkable_cell(ctx, dims, self.cell_of(start.0, start.1))
        else {
            return Ok(PathResult {
                waypoints: vec![start_point],
                complete: false,
                iterations: 0,
            });
        };
        let goal_cell = self.nearest_walkable_cell(ctx, dims, self.cell_of(goal.0, goal.1));
        let tolerance = self.config.goal_tolerance_cells * grid;
        let heuristic = |p: Waypoint| p.distance(&goal_point);

        let mut open = BinaryHeap::new();
        let mut g_score: HashMap<Cell, f32> = HashMap::new();
        let mut came_from: HashMap<Cell, Cell> = HashMap::new();
        let mut closed: HashSet<Cell> = HashSet::new();
        let mut seq = 0u64;

        g_score.insert(start_cell, 0.0);
        open.push(OpenEntry {
            f: heuristic(self.cell_point(start_cell)),
            seq,
            cell: start_cell,
        });

        let mut best = (start_cell, f32::INFINITY);
        let mut reached = None;
        let mut iterations = 0;

        while let Some(OpenEntry { cell, .. }) = open.pop() {
            if !closed.insert(cell) {
                continue;
            }
            iterations += 1;
            let point = self.cell_point(cell);
            let h = heuristic(point);
            if h < best.1 {
                best = (cell, h);
            }
            if h <= tolerance || Some(cell) == goal_cell {
                reached = Some(cell);
                break;
            }
            if iterations >= self.config.max_iterations {
                break;
            }

            let g_here = g_score.get(&cell).copied().unwrap_or(f32::INFINITY);
            for (di, dj) in NEIGHBOURS {
                let next = (cell.0 + di, cell.1 + dj);
                if closed.contains(&next) {
                    continue;
                }
                let info = self.cell_info(ctx, dims, next);
                if !info.walkable {
                    continue;
                }
                let diagonal = di != 0 && dj != 0;
                if diagonal
                    && !(self.cell_walkable(ctx, dims, (cell.0 + di, cell.1))
                        && self.cell_walkable(ctx, dims, (cell.0, cell.1 + dj)))
                {
                    continue;
                }
                let step = if diagonal { grid * SQRT_2 } else { grid };
                let tentative = g_here + step + info.penalty;
                if tentative < g_score.get(&next).copied().unwrap_or(f32::INFINITY) {
                    g_score.insert(next, tentative);
                    came_from.insert(next, cell);
                    seq += 1;
                    open.push(OpenEntry {
                        f: tentative + heuristic(self.cell_point(next)),
                        seq,
                        cell: next,
                    });
                }
            }
        }

        let complete = reached.is_some();
        let end = reached.unwrap_or(best.0);
        let mut chain = vec![end];
        let mut cursor = end;
        while let Some(&prev) = came_from.get(&cursor) {
            chain.push(prev);
            cursor = prev;
        }
        chain.reverse();

        let mut points: Vec<Waypoint> = chain.into_iter().map(|c| self.cell_point(c)).collect();
        let sample = grid * self.config.line_sample_fraction;
        attach_start(ctx, dims, sample, &mut points, start_point);
        if let Some(&last) = points.last() {
            if last != goal_point && segment_clear(ctx, dims, sample, last, goal_point) {
                points.push(goal_point);
            }
        }

        let simplified = simplify(ctx, dims, sample, &points);
        let waypoints = smooth(ctx, dims, sample, self.config.smoothing_self_weight, simplified);
        Ok(PathResult {
            waypoints,
            complete,
            iterations,
        })
    }
}

fn footprint_key(dims: Dimensions) -> FootprintKey {
    [dims.width.to_bits(), dims.height.to_bits(), dims.depth.to_bits()]
}

/// Extra cost for passing close to blocker centres. The radius grows with the
/// blocker's own half-extent.
fn proximity_penalty(config: &NavConfig, blockers: &[Blocker], p: Waypoint) -> f32 {
    blockers
        .iter()
        .map(|b| {
            let radius = config.proximity_radius + b.aabb.half_x().max(b.aabb.half_z());
            let dx = p.x - b.center.x;
            let dz = p.z - b.center.z;
            let d = (dx * dx + dz * dz).sqrt();
            if d < radius {
                let t = (radius - d) / radius;
                config.proximity_weight * config.grid_size * t * t
            } else {
                0.0
            }
        })
        .sum()
}

fn segment_clear(
    ctx: NavContext<'_>,
    dims: Dimensions,
    sample: f32,
    from: Waypoint,
    to: Waypoint,
) -> bool {
    let len = from.distance(&to);
    let steps = if sample > 0.0 {
        (len / sample).ceil().max(1.0) as usize
    } else {
        1
    };
    (0..=steps).all(|i| {
        let t = i as f32 / steps as f32;
        let x = from.x + (to.x - from.x) * t;
        let z = from.z + (to.z - from.z) * t;
        movement::validate(ctx.set, ctx.bounds, dims, GROUND_Y, x, z)
    })
}

/// Begin the path at the exact start position. It takes the start cell's
/// place only when the first leg stays clear from there; otherwise the player
/// walks to the cell centre first.
fn attach_start(
    ctx: NavContext<'_>,
    dims: Dimensions,
    sample: f32,
    points: &mut Vec<Waypoint>,
    start: Waypoint,
) {
    if points.is_empty() || points[0] == start {
        return;
    }
    if !movement::validate(ctx.set, ctx.bounds, dims, GROUND_Y, start.x, start.z) {
        return;
    }
    match points.get(1) {
        Some(&next) if !segment_clear(ctx, dims, sample, start, next) => points.insert(0, start),
        _ => points[0] = start,
    }
}

/// Greedy line-of-sight: from each kept point jump to the furthest visible one.
fn simplify(ctx: NavContext<'_>, dims: Dimensions, sample: f32, points: &[Waypoint]) -> Vec<Waypoint> {
    let Some(&first) = points.first() else {
        return Vec::new();
    };
    let mut out = vec![first];
    let mut i = 0;
    while i + 1 < points.len() {
        let next = (i + 2..points.len())
            .rev()
            .find(|&j| segment_clear(ctx, dims, sample, points[i], points[j]))
            .unwrap_or(i + 1);
        out.push(points[next]);
        i = next;
    }
    out
}

/// One in-place pass blending each interior point with its neighbours.
fn smooth(
    ctx: NavContext<'_>,
    dims: Dimensions,
    sample: f32,
    self_weight: f32,
    mut points: Vec<Waypoint>,
) -> Vec<Waypoint> {
    let side = (1.0 - self_weight) / 2.0;
    for k in 1..points.len().saturating_sub(1) {
        let (prev, here, next) = (points[k - 1], points[k], points[k + 1]);
        let blended = Waypoint::new(
            here.x * self_weight + (prev.x + next.x) * side,
            here.z * self_weight + (prev.z + next.z) * side,
        );
        if segment_clear(ctx, dims, sample, prev, blended)
            && segment_clear(ctx, dims, sample, blended, next)
        {
            points[k] = blended;
        }
    }
    points
}
