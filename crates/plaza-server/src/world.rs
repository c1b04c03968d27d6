//! Live world state owned by the simulation.
//!
//! Players, obstacles and food live in ordered maps so every per-tick pass
//! visits them in stable id order. The flattened [`CollisionSet`] is rebuilt
//! lazily after any obstacle or food mutation.

use std::collections::{BTreeMap, VecDeque};

use plaza_logic::collision::{player_box, Aabb, CollisionSet, Dimensions, FoodShape, ObstacleShape, Vec3};
use plaza_logic::furniture::FurnitureClass;
use plaza_logic::interaction::{FurniturePose, InteractionState, Posture};
use plaza_logic::movement::StuckTracker;
use plaza_logic::pathfinding::Waypoint;

use crate::persistence::{FoodRecord, ObstacleRecord};
use crate::protocol::PlayerView;

pub type PlayerId = u32;

/// Sit or lie that will run once the player reaches the furniture.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingInteraction {
    pub furniture_id: String,
    pub posture: Posture,
    pub live_box: Option<Dimensions>,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub skin: u8,
    /// Feet position.
    pub position: Vec3,
    pub rotation: f32,
    pub dims: Dimensions,
    pub target: Option<Waypoint>,
    pub path: VecDeque<Waypoint>,
    pub tracker: StuckTracker,
    pub state: InteractionState,
    pub pending: Option<PendingInteraction>,
}

impl Player {
    pub fn new(id: PlayerId, name: String, position: Vec3, dims: Dimensions) -> Self {
        Self {
            id,
            name,
            skin: 0,
            position,
            rotation: 0.0,
            dims,
            target: None,
            path: VecDeque::new(),
            tracker: StuckTracker::default(),
            state: InteractionState::Free,
            pending: None,
        }
    }

    pub fn bounds(&self) -> Aabb {
        player_box(self.position, self.dims)
    }

    pub fn is_moving(&self) -> bool {
        !self.path.is_empty()
    }

    /// Drop the current path, target and any pending interaction.
    pub fn halt(&mut self) {
        self.path.clear();
        self.target = None;
        self.pending = None;
        self.tracker.reset();
    }

    pub fn view(&self) -> PlayerView {
        let (furniture_id, slot) = match &self.state {
            InteractionState::Free => (None, None),
            InteractionState::Sitting { furniture_id, seat } => (Some(furniture_id.clone()), Some(*seat)),
            InteractionState::Lying { furniture_id, slot } => (Some(furniture_id.clone()), Some(*slot)),
        };
        PlayerView {
            id: self.id,
            name: self.name.clone(),
            skin: self.skin,
            position: self.position,
            rotation: self.rotation,
            moving: self.is_moving(),
            sitting: self.state.is_sitting(),
            lying: self.state.is_lying(),
            furniture_id,
            slot,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Obstacle {
    pub id: String,
    pub shape: ObstacleShape,
    pub model: String,
    pub scale: f32,
    pub class: FurnitureClass,
}

impl Obstacle {
    /// Pose for anchor maths, optionally using the client's live box size.
    pub fn pose(&self, live_box: Option<Dimensions>) -> FurniturePose {
        FurniturePose {
            center: self.shape.center,
            dims: live_box.unwrap_or(self.shape.dims),
            rotation: self.shape.rotation,
            class: self.class,
        }
    }

    pub fn record(&self) -> ObstacleRecord {
        ObstacleRecord {
            id: self.id.clone(),
            position: self.shape.center,
            dimensions: self.shape.dims,
            model: self.model.clone(),
            scale: self.scale,
            rotation: self.shape.rotation,
            passthrough: self.shape.passthrough,
            kind: self.class.kind,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Food {
    pub id: String,
    pub shape: FoodShape,
    pub model: String,
}

impl Food {
    pub fn from_record(record: FoodRecord) -> Self {
        Self {
            id: record.id,
            shape: FoodShape {
                center: record.position,
                dims: record.dimensions,
                scale: record.scale,
            },
            model: record.model,
        }
    }

    pub fn record(&self) -> FoodRecord {
        FoodRecord {
            id: self.id.clone(),
            position: self.shape.center,
            dimensions: self.shape.dims,
            scale: self.shape.scale,
            model: self.model.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct World {
    pub(crate) players: BTreeMap<PlayerId, Player>,
    pub(crate) obstacles: BTreeMap<String, Obstacle>,
    pub(crate) food: BTreeMap<String, Food>,
    pub collision: CollisionSet,
    collision_dirty: bool,
    food_collision_scale: f32,
}

impl World {
    pub fn new(food_collision_scale: f32) -> Self {
        Self {
            players: BTreeMap::new(),
            obstacles: BTreeMap::new(),
            food: BTreeMap::new(),
            collision: CollisionSet::new(),
            collision_dirty: false,
            food_collision_scale,
        }
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn obstacles(&self) -> impl Iterator<Item = &Obstacle> {
        self.obstacles.values()
    }

    pub fn obstacle(&self, id: &str) -> Option<&Obstacle> {
        self.obstacles.get(id)
    }

    pub fn food(&self) -> impl Iterator<Item = &Food> {
        self.food.values()
    }

    pub fn food_item(&self, id: &str) -> Option<&Food> {
        self.food.get(id)
    }

    pub fn mark_dirty(&mut self) {
        self.collision_dirty = true;
    }

    /// Rebuild the collision set if any obstacle or food changed.
    pub fn refresh_collision(&mut self) -> &CollisionSet {
        if self.collision_dirty {
            self.collision = CollisionSet::build(
                self.obstacles.values().map(|o| (o.id.as_str(), &o.shape)),
                self.food.values().map(|f| (f.id.as_str(), &f.shape)),
                self.food_collision_scale,
            );
            self.collision_dirty = false;
        }
        &self.collision
    }

    /// Indices already taken on `furniture_id` in `posture`, excluding `except`.
    pub fn occupied_slots(&self, furniture_id: &str, posture: Posture, except: PlayerId) -> Vec<u32> {
        self.players
            .values()
            .filter(|p| p.id != except)
            .filter_map(|p| p.state.occupies(furniture_id))
            .filter(|(pst, _)| *pst == posture)
            .map(|(_, index)| index)
            .collect()
    }

    /// Players sitting or lying on `furniture_id`.
    pub fn occupants(&self, furniture_id: &str) -> Vec<PlayerId> {
        self.players
            .values()
            .filter(|p| p.state.furniture_id() == Some(furniture_id))
            .map(|p| p.id)
            .collect()
    }
}
