//! Obstacle and food spawn, update and delete.
//!
//! Every geometry change rebuilds the collision set, drops cached grid
//! walkability and pushes any free player now inside geometry to the nearest
//! walkable spot. Changes are broadcast to everyone except the requester,
//! whose client already shows them.

use plaza_logic::collision::{Dimensions, ObstacleShape};
use plaza_logic::furniture::{FurnitureClass, FurnitureKind};
use plaza_logic::interaction::anchor;
use plaza_logic::pathfinding::NavContext;
use plaza_logic::validation::Sanitized;

use super::{log_warnings, CommandError, Simulation};
use crate::persistence::{FoodRecord, ObstacleRecord, StoreOp};
use crate::protocol::{FoodPatch, FoodSpec, ObstaclePatch, ObstacleSpec, Recipient, ServerEvent};
use crate::world::{Food, Obstacle, PlayerId};

impl Simulation {
    pub(super) fn obstacle_from_record(&self, record: ObstacleRecord) -> Obstacle {
        let class = FurnitureClass::derive(record.kind, record.dimensions, &self.config.seating);
        Obstacle {
            id: record.id,
            shape: ObstacleShape {
                center: record.position,
                dims: record.dimensions,
                rotation: record.rotation,
                passthrough: record.passthrough,
            },
            model: record.model,
            scale: record.scale,
            class,
        }
    }

    fn id_taken(&self, id: &str) -> bool {
        self.world.obstacles.contains_key(id) || self.world.food.contains_key(id)
    }

    // ========================================================================
    // OBSTACLES
    // ========================================================================

    pub(super) fn spawn_obstacle(&mut self, player: PlayerId, spec: ObstacleSpec) -> Result<(), CommandError> {
        let mut v = self.validator();
        let record = ObstacleRecord {
            id: v.identifier("id", &spec.id),
            position: v.position("position", spec.position),
            dimensions: v.dimensions("dimensions", spec.dimensions),
            rotation: v.rotation("rotation", spec.rotation),
            scale: v.scale("scale", spec.scale),
            model: v.model_ref("model", &spec.model),
            passthrough: spec.passthrough,
            kind: spec
                .kind
                .unwrap_or_else(|| FurnitureKind::classify(&spec.model)),
        };
        let Sanitized {
            value: record,
            warnings,
        } = v.finish(record)?;
        log_warnings(player, "spawn_obstacle", &warnings);
        if self.id_taken(&record.id) {
            return Err(CommandError::DuplicateEntity(record.id));
        }

        let obstacle = self.obstacle_from_record(record);
        let stored = obstacle.record();
        log::info!(
            "player {}: spawned '{}' ({:?}, {} seats, {} lying)",
            player,
            obstacle.id,
            obstacle.class.kind,
            obstacle.class.seat_capacity,
            obstacle.class.lying_capacity
        );
        self.world.obstacles.insert(obstacle.id.clone(), obstacle);
        self.geometry_changed();
        self.persist(StoreOp::UpsertObstacle(stored.clone()));
        self.emit(
            Recipient::AllExcept(player),
            ServerEvent::ObstacleSpawned { obstacle: stored },
        );
        Ok(())
    }

    pub(super) fn update_obstacle(&mut self, player: PlayerId, patch: ObstaclePatch) -> Result<(), CommandError> {
        let current = self
            .world
            .obstacle(&patch.id)
            .map(Obstacle::record)
            .ok_or_else(|| CommandError::UnknownEntity(patch.id.clone()))?;

        let mut v = self.validator();
        let position = match patch.position {
            Some(p) => v.position("position", p),
            None => current.position,
        };
        let dimensions = match patch.dimensions {
            Some(d) => v.dimensions("dimensions", d),
            None => current.dimensions,
        };
        let rotation = match patch.rotation {
            Some(r) => v.rotation("rotation", r),
            None => current.rotation,
        };
        let scale = match patch.scale {
            Some(s) => v.scale("scale", s),
            None => current.scale,
        };
        let (model, kind) = match &patch.model {
            Some(m) if *m != current.model => (v.model_ref("model", m), FurnitureKind::classify(m)),
            _ => (current.model.clone(), current.kind),
        };
        let record = ObstacleRecord {
            id: current.id,
            position,
            dimensions,
            model,
            scale,
            rotation,
            passthrough: patch.passthrough.unwrap_or(current.passthrough),
            kind,
        };
        let Sanitized {
            value: record,
            warnings,
        } = v.finish(record)?;
        log_warnings(player, "update_obstacle", &warnings);

        let obstacle = self.obstacle_from_record(record);
        let stored = obstacle.record();
        self.world.obstacles.insert(obstacle.id.clone(), obstacle);
        self.geometry_changed();
        self.repin_occupants(&stored.id);
        self.persist(StoreOp::UpsertObstacle(stored.clone()));
        self.emit(
            Recipient::AllExcept(player),
            ServerEvent::ObstacleUpdated { obstacle: stored },
        );
        Ok(())
    }

    pub(super) fn delete_obstacle(&mut self, player: PlayerId, id: &str) -> Result<(), CommandError> {
        let removed = self
            .world
            .obstacles
            .remove(id)
            .ok_or_else(|| CommandError::UnknownEntity(id.to_string()))?;
        log::info!("player {}: deleted '{}'", player, id);
        self.geometry_changed();
        for occupant in self.world.occupants(id) {
            if let Err(e) = self.release(occupant, removed.shape.center, removed.shape.dims) {
                log::warn!("player {}: release from deleted '{}' failed: {}", occupant, id, e);
            }
        }
        self.persist(StoreOp::DeleteObstacle(id.to_string()));
        self.emit(
            Recipient::AllExcept(player),
            ServerEvent::ObstacleDeleted { id: id.to_string() },
        );
        Ok(())
    }

    /// Move occupants to their anchors on the updated furniture. Anyone whose
    /// slot no longer exists is stood up.
    fn repin_occupants(&mut self, furniture_id: &str) {
        let Some(pose) = self.world.obstacle(furniture_id).map(|o| o.pose(None)) else {
            return;
        };
        let (center, dims) = (pose.center, pose.dims);
        for occupant in self.world.occupants(furniture_id) {
            let Some((posture, index)) = self
                .world
                .player(occupant)
                .and_then(|p| p.state.occupies(furniture_id))
            else {
                continue;
            };
            if index >= posture.capacity(&pose.class) {
                log::info!(
                    "player {}: slot {} on '{}' no longer exists",
                    occupant,
                    index,
                    furniture_id
                );
                if let Err(e) = self.release(occupant, center, dims) {
                    log::warn!("player {}: release failed: {}", occupant, e);
                }
                continue;
            }
            let pin = anchor(&pose, posture, index, &self.config.seating);
            if let Some(player) = self.world.players.get_mut(&occupant) {
                player.position = pin.position;
                player.rotation = pin.rotation;
            }
        }
    }

    /// Resize furniture to the box the seating player's client rendered so
    /// collision and later seat layouts follow it.
    pub(super) fn adopt_live_box(&mut self, player: PlayerId, furniture_id: &str, dims: Dimensions) {
        let Some(obstacle) = self.world.obstacles.get_mut(furniture_id) else {
            return;
        };
        if obstacle.shape.dims == dims {
            return;
        }
        log::debug!(
            "player {}: '{}' resized to {:.2}x{:.2}x{:.2} from live box",
            player,
            furniture_id,
            dims.width,
            dims.height,
            dims.depth
        );
        obstacle.shape.dims = dims;
        obstacle.class = FurnitureClass::derive(obstacle.class.kind, dims, &self.config.seating);
        let stored = obstacle.record();

        self.geometry_changed();
        self.repin_occupants(furniture_id);
        self.persist(StoreOp::UpsertObstacle(stored.clone()));
        self.emit(
            Recipient::AllExcept(player),
            ServerEvent::ObstacleUpdated { obstacle: stored },
        );
    }

    // ========================================================================
    // FOOD
    // ========================================================================

    pub(super) fn spawn_food(&mut self, player: PlayerId, spec: FoodSpec) -> Result<(), CommandError> {
        let mut v = self.validator();
        let record = FoodRecord {
            id: v.identifier("id", &spec.id),
            position: v.position("position", spec.position),
            dimensions: v.dimensions("dimensions", spec.dimensions),
            scale: v.scale("scale", spec.scale),
            model: v.model_ref("model", &spec.model),
        };
        let Sanitized {
            value: record,
            warnings,
        } = v.finish(record)?;
        log_warnings(player, "spawn_food", &warnings);
        if self.id_taken(&record.id) {
            return Err(CommandError::DuplicateEntity(record.id));
        }

        log::info!("player {}: spawned food '{}'", player, record.id);
        self.world
            .food
            .insert(record.id.clone(), Food::from_record(record.clone()));
        self.geometry_changed();
        self.persist(StoreOp::UpsertFood(record.clone()));
        self.emit(
            Recipient::AllExcept(player),
            ServerEvent::FoodSpawned { food: record },
        );
        Ok(())
    }

    pub(super) fn update_food(&mut self, player: PlayerId, patch: FoodPatch) -> Result<(), CommandError> {
        let current = self
            .world
            .food_item(&patch.id)
            .map(Food::record)
            .ok_or_else(|| CommandError::UnknownEntity(patch.id.clone()))?;

        let mut v = self.validator();
        let position = match patch.position {
            Some(p) => v.position("position", p),
            None => current.position,
        };
        let dimensions = match patch.dimensions {
            Some(d) => v.dimensions("dimensions", d),
            None => current.dimensions,
        };
        let scale = match patch.scale {
            Some(s) => v.scale("scale", s),
            None => current.scale,
        };
        let Sanitized {
            value: record,
            warnings,
        } = v.finish(FoodRecord {
            position,
            dimensions,
            scale,
            ..current
        })?;
        log_warnings(player, "update_food", &warnings);

        self.world
            .food
            .insert(record.id.clone(), Food::from_record(record.clone()));
        self.geometry_changed();
        self.persist(StoreOp::UpsertFood(record.clone()));
        self.emit(
            Recipient::AllExcept(player),
            ServerEvent::FoodUpdated { food: record },
        );
        Ok(())
    }

    pub(super) fn delete_food(&mut self, player: PlayerId, id: &str) -> Result<(), CommandError> {
        if self.world.food.remove(id).is_none() {
            return Err(CommandError::UnknownEntity(id.to_string()));
        }
        log::info!("player {}: deleted food '{}'", player, id);
        self.geometry_changed();
        self.persist(StoreOp::DeleteFood(id.to_string()));
        self.emit(
            Recipient::AllExcept(player),
            ServerEvent::FoodDeleted { id: id.to_string() },
        );
        Ok(())
    }

    // ========================================================================
    // GEOMETRY
    // ========================================================================

    fn geometry_changed(&mut self) {
        self.world.mark_dirty();
        self.world.refresh_collision();
        self.pathfinder.invalidate();
        self.eject_trapped();
    }

    /// Move free players that now overlap geometry to the nearest walkable
    /// grid point and cancel their movement.
    fn eject_trapped(&mut self) {
        let trapped: Vec<PlayerId> = self
            .world
            .players()
            .filter(|p| p.state.is_free() && self.world.collision.blocked(&p.bounds()))
            .map(|p| p.id)
            .collect();

        for id in trapped {
            let Some(player) = self.world.players.get_mut(&id) else {
                continue;
            };
            self.pathfinder.set_footprint(player.dims);
            let ctx = NavContext::new(&self.world.collision, &self.config.bounds);
            match self
                .pathfinder
                .nearest_walkable(ctx, player.position.x, player.position.z)
            {
                Ok(Some(spot)) => {
                    log::info!(
                        "player {}: pushed out of geometry to ({:.2}, {:.2})",
                        id,
                        spot.x,
                        spot.z
                    );
                    player.position.x = spot.x;
                    player.position.z = spot.z;
                    player.halt();
                }
                Ok(None) => log::warn!("player {}: trapped with no walkable spot nearby", id),
                Err(e) => log::warn!("player {}: eject failed: {}", id, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plaza_logic::collision::Vec3;
    use plaza_logic::config::SimConfig;
    use crate::protocol::ClientCommand;

    fn sim() -> Simulation {
        Simulation::new(SimConfig {
            seed: Some(11),
            ..SimConfig::default()
        })
    }

    fn table(id: &str, x: f32, z: f32) -> ObstacleSpec {
        ObstacleSpec {
            id: id.to_string(),
            position: Vec3::new(x, 0.4, z),
            dimensions: Dimensions::new(1.0, 0.8, 1.0),
            rotation: 0.0,
            passthrough: false,
            model: "models/table.glb".to_string(),
            scale: 1.0,
            kind: None,
        }
    }

    #[test]
    fn duplicate_ids_rejected_across_kinds() {
        let mut sim = sim();
        let id = sim.connect();
        sim.process(id, ClientCommand::SpawnObstacle(table("t1", 8.0, 8.0)))
            .unwrap();
        let err = sim
            .process(
                id,
                ClientCommand::SpawnFood(FoodSpec {
                    id: "t1".into(),
                    position: Vec3::new(0.0, 0.0, 0.0),
                    dimensions: Dimensions::new(0.3, 0.3, 0.3),
                    scale: 1.0,
                    model: "food/apple.glb".into(),
                }),
            )
            .unwrap_err();
        assert_eq!(err, CommandError::DuplicateEntity("t1".into()));
    }

    #[test]
    fn unsafe_model_path_rejected() {
        let mut sim = sim();
        let id = sim.connect();
        let mut spec = table("t1", 8.0, 8.0);
        spec.model = "../../etc/passwd".into();
        assert!(matches!(
            sim.process(id, ClientCommand::SpawnObstacle(spec)),
            Err(CommandError::Validation(_))
        ));
        assert!(sim.world().obstacle("t1").is_none());
    }

    #[test]
    fn spawn_broadcasts_to_others_only() {
        let mut sim = sim();
        let a = sim.connect();
        sim.connect();
        sim.drain_outbox();
        sim.process(a, ClientCommand::SpawnObstacle(table("t1", 8.0, 8.0)))
            .unwrap();
        let out = sim.drain_outbox();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].recipient, Recipient::AllExcept(a));
        assert!(matches!(out[0].event, ServerEvent::ObstacleSpawned { .. }));
    }

    #[test]
    fn update_keeps_unpatched_fields() {
        let mut sim = sim();
        let id = sim.connect();
        sim.process(id, ClientCommand::SpawnObstacle(table("t1", 8.0, 8.0)))
            .unwrap();
        sim.process(
            id,
            ClientCommand::UpdateObstacle(ObstaclePatch {
                id: "t1".into(),
                rotation: Some(1.0),
                ..Default::default()
            }),
        )
        .unwrap();
        let t = sim.world().obstacle("t1").unwrap();
        assert_eq!(t.shape.rotation, 1.0);
        assert_eq!(t.shape.center, Vec3::new(8.0, 0.4, 8.0));
        assert_eq!(t.class.kind, FurnitureKind::Table);
    }

    #[test]
    fn unknown_entities_rejected() {
        let mut sim = sim();
        let id = sim.connect();
        assert_eq!(
            sim.process(id, ClientCommand::DeleteFood { id: "nope".into() }),
            Err(CommandError::UnknownEntity("nope".into()))
        );
        assert!(matches!(
            sim.process(
                id,
                ClientCommand::UpdateObstacle(ObstaclePatch {
                    id: "nope".into(),
                    ..Default::default()
                })
            ),
            Err(CommandError::UnknownEntity(_))
        ));
    }

    #[test]
    fn spawning_on_a_player_pushes_them_out() {
        let mut sim = sim();
        let id = sim.connect();
        let p = sim.player(id).unwrap().position;
        sim.process(id, ClientCommand::SpawnObstacle(table("t1", p.x, p.z)))
            .unwrap();
        let player = sim.player(id).unwrap();
        assert!(!sim.world().collision.blocked(&player.bounds()));
    }

    #[test]
    fn shrinking_furniture_stands_up_extra_occupants() {
        let mut sim = sim();
        let ids: Vec<_> = (0..3).map(|_| sim.connect()).collect();
        let bench = ObstacleSpec {
            id: "b".into(),
            position: Vec3::new(0.0, 0.25, 0.0),
            dimensions: Dimensions::new(2.2, 0.5, 0.5),
            rotation: 0.0,
            passthrough: false,
            model: "models/bench.glb".into(),
            scale: 1.0,
            kind: None,
        };
        sim.process(ids[0], ClientCommand::SpawnObstacle(bench)).unwrap();
        for &id in &ids {
            let player = sim.world.players.get_mut(&id).unwrap();
            player.position = Vec3::new(0.0, 0.0, 0.9);
            sim.process(
                id,
                ClientCommand::PlayerSit {
                    furniture_id: "b".into(),
                    live_box: None,
                },
            )
            .unwrap();
        }
        sim.process(
            ids[0],
            ClientCommand::UpdateObstacle(ObstaclePatch {
                id: "b".into(),
                dimensions: Some(Dimensions::new(1.0, 0.5, 0.5)),
                ..Default::default()
            }),
        )
        .unwrap();
        assert!(sim.player(ids[0]).unwrap().state.is_sitting());
        assert!(sim.player(ids[1]).unwrap().state.is_free());
        assert!(sim.player(ids[2]).unwrap().state.is_free());
        assert_eq!(sim.world().occupants("b"), vec![ids[0]]);
    }
}
