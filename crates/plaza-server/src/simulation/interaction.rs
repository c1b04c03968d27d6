//! Sitting and lying.
//!
//! A sit or lie request within `interaction_reach` of the furniture commits
//! at once. Otherwise the player is routed beside the furniture and the
//! request is parked on the player until the path completes. Slot allocation
//! happens at commit time, so two players racing for the last seat are
//! resolved by command order.

use plaza_logic::collision::{Dimensions, Vec3};
use plaza_logic::constants::world::GROUND_Y;
use plaza_logic::interaction::{
    allocate_slot, anchor, exit_candidates, Anchor, InteractionError, InteractionState, Posture,
};
use plaza_logic::movement;
use plaza_logic::pathfinding::{NavContext, Waypoint};

use super::{CommandError, Simulation};
use crate::protocol::{Recipient, ServerEvent};
use crate::world::{PendingInteraction, PlayerId};

fn command_name(posture: Posture) -> &'static str {
    match posture {
        Posture::Sit => "player_sit",
        Posture::Lie => "player_lie",
    }
}

impl Simulation {
    pub(super) fn handle_sit(
        &mut self,
        id: PlayerId,
        furniture_id: &str,
        live_box: Option<Dimensions>,
    ) -> Result<(), CommandError> {
        self.begin_interaction(id, furniture_id, Posture::Sit, live_box)
    }

    pub(super) fn handle_lie(
        &mut self,
        id: PlayerId,
        furniture_id: &str,
        live_box: Option<Dimensions>,
    ) -> Result<(), CommandError> {
        self.begin_interaction(id, furniture_id, Posture::Lie, live_box)
    }

    fn begin_interaction(
        &mut self,
        id: PlayerId,
        furniture_id: &str,
        posture: Posture,
        live_box: Option<Dimensions>,
    ) -> Result<(), CommandError> {
        let live_box = match live_box {
            Some(dims) => {
                let mut v = self.validator();
                let dims = v.dimensions("live_box", dims);
                Some(v.finish(dims)?.value)
            }
            None => None,
        };

        let player = self.world.player(id).ok_or(CommandError::UnknownPlayer(id))?;
        if !player.state.is_free() {
            return Err(InteractionError::AlreadyInteracting.into());
        }
        let obstacle = self
            .world
            .obstacle(furniture_id)
            .ok_or_else(|| CommandError::UnknownEntity(furniture_id.to_string()))?;
        if posture.capacity(&obstacle.class) == 0 {
            return Err(match posture {
                Posture::Sit => InteractionError::NotSittable(furniture_id.to_string()),
                Posture::Lie => InteractionError::NotLieable(furniture_id.to_string()),
            }
            .into());
        }
        let gap = player.bounds().clearance_xz(&obstacle.shape.bounds());
        let center = obstacle.shape.center;

        let pending = PendingInteraction {
            furniture_id: furniture_id.to_string(),
            posture,
            live_box,
        };
        if gap <= self.config.seating.interaction_reach {
            return self.commit(id, pending);
        }

        log::debug!(
            "player {}: {:.2} from '{}', walking over first",
            id,
            gap,
            furniture_id
        );
        self.player_mut(id)?.pending = None;
        let plan = self.route(id, Waypoint::new(center.x, center.z))?;
        let player = self.player_mut(id)?;
        if player.path.is_empty() {
            return self.commit(id, pending);
        }
        player.pending = Some(pending);
        self.emit(
            Recipient::Only(id),
            ServerEvent::PathPreview {
                waypoints: plan.waypoints,
                complete: plan.complete,
            },
        );
        Ok(())
    }

    /// Run the sit or lie parked on a player that just finished walking.
    pub(super) fn commit_pending(&mut self, id: PlayerId) {
        let Some(pending) = self
            .world
            .players
            .get_mut(&id)
            .and_then(|p| p.pending.take())
        else {
            return;
        };
        let command = command_name(pending.posture);
        if let Err(e) = self.commit(id, pending) {
            log::warn!("player {}: {} on arrival failed: {}", id, command, e);
            self.emit(
                Recipient::Only(id),
                ServerEvent::Rejected {
                    command: command.to_string(),
                    reason: e.to_string(),
                },
            );
        }
    }

    fn commit(&mut self, id: PlayerId, pending: PendingInteraction) -> Result<(), CommandError> {
        let PendingInteraction {
            furniture_id,
            posture,
            live_box,
        } = pending;
        let player = self.world.player(id).ok_or(CommandError::UnknownPlayer(id))?;
        if !player.state.is_free() {
            return Err(InteractionError::AlreadyInteracting.into());
        }
        let obstacle = self
            .world
            .obstacle(&furniture_id)
            .ok_or_else(|| CommandError::UnknownEntity(furniture_id.clone()))?;
        if player.bounds().clearance_xz(&obstacle.shape.bounds()) > self.config.seating.interaction_reach {
            return Err(CommandError::Obstructed(format!(
                "'{}' is out of reach",
                furniture_id
            )));
        }

        let pose = obstacle.pose(live_box);
        let occupied = self.world.occupied_slots(&furniture_id, posture, id);
        let index = allocate_slot(
            &furniture_id,
            posture.capacity(&pose.class),
            &occupied,
            self.config.seating.reject_over_capacity,
        )?;
        if occupied.contains(&index) {
            log::debug!(
                "player {}: '{}' is full, sharing slot {}",
                id,
                furniture_id,
                index
            );
        }
        let Anchor { position, rotation } = anchor(&pose, posture, index, &self.config.seating);

        let player = self.player_mut(id)?;
        player.halt();
        player.position = position;
        player.rotation = rotation;
        player.state = match posture {
            Posture::Sit => InteractionState::Sitting {
                furniture_id: furniture_id.clone(),
                seat: index,
            },
            Posture::Lie => InteractionState::Lying {
                furniture_id: furniture_id.clone(),
                slot: index,
            },
        };
        log::info!(
            "player {}: {} '{}' slot {}",
            id,
            match posture {
                Posture::Sit => "sat on",
                Posture::Lie => "lay on",
            },
            furniture_id,
            index
        );
        if let Some(dims) = live_box {
            self.adopt_live_box(id, &furniture_id, dims);
        }

        let event = match posture {
            Posture::Sit => ServerEvent::PlayerSat {
                player_id: id,
                furniture_id,
                seat: index,
                position,
                rotation,
            },
            Posture::Lie => ServerEvent::PlayerLay {
                player_id: id,
                furniture_id,
                slot: index,
                position,
                rotation,
            },
        };
        self.emit(Recipient::All, event);
        Ok(())
    }

    pub(super) fn handle_stand_up(&mut self, id: PlayerId) -> Result<(), CommandError> {
        let player = self.world.player(id).ok_or(CommandError::UnknownPlayer(id))?;
        let InteractionState::Sitting { furniture_id, .. } = &player.state else {
            return Err(InteractionError::NotSitting.into());
        };
        let furniture_id = furniture_id.clone();
        self.leave(id, &furniture_id)
    }

    pub(super) fn handle_get_up(&mut self, id: PlayerId) -> Result<(), CommandError> {
        let player = self.world.player(id).ok_or(CommandError::UnknownPlayer(id))?;
        let InteractionState::Lying { furniture_id, .. } = &player.state else {
            return Err(InteractionError::NotLying.into());
        };
        let furniture_id = furniture_id.clone();
        self.leave(id, &furniture_id)
    }

    fn leave(&mut self, id: PlayerId, furniture_id: &str) -> Result<(), CommandError> {
        let (center, dims) = match self.world.obstacle(furniture_id) {
            Some(o) => (o.shape.center, o.shape.dims),
            None => {
                let p = self.world.player(id).ok_or(CommandError::UnknownPlayer(id))?;
                (p.position, Dimensions::new(0.0, 0.0, 0.0))
            }
        };
        self.release(id, center, dims).map(|_| ())
    }

    /// Put a seated or lying player back on the ground beside the furniture
    /// at `center`/`dims` and broadcast it. Returns the new feet position.
    pub(super) fn release(
        &mut self,
        id: PlayerId,
        center: Vec3,
        dims: Dimensions,
    ) -> Result<Vec3, CommandError> {
        let player = self.world.player(id).ok_or(CommandError::UnknownPlayer(id))?;
        let was_lying = player.state.is_lying();
        let (position, pdims) = (player.position, player.dims);
        let candidates = exit_candidates(
            center,
            dims,
            position,
            player.rotation,
            pdims,
            &self.config.seating,
        );

        let exit = candidates.into_iter().find(|c| {
            movement::validate(
                &self.world.collision,
                &self.config.bounds,
                pdims,
                GROUND_Y,
                c.x,
                c.z,
            )
        });
        let exit = match exit {
            Some(spot) => spot,
            None => {
                self.pathfinder.set_footprint(pdims);
                let ctx = NavContext::new(&self.world.collision, &self.config.bounds);
                match self.pathfinder.nearest_walkable_point(ctx, position.x, position.z) {
                    Ok(Some(spot)) => spot,
                    _ => {
                        log::warn!(
                            "player {}: no free spot beside furniture, staying at ({:.2}, {:.2})",
                            id,
                            position.x,
                            position.z
                        );
                        Waypoint::new(position.x, position.z)
                    }
                }
            }
        };

        let player = self.player_mut(id)?;
        player.halt();
        player.state = InteractionState::Free;
        player.position = Vec3::new(exit.x, GROUND_Y, exit.z);
        let position = player.position;
        log::info!(
            "player {}: {} at ({:.2}, {:.2})",
            id,
            if was_lying { "got up" } else { "stood up" },
            position.x,
            position.z
        );

        let event = if was_lying {
            ServerEvent::PlayerGotUp {
                player_id: id,
                position,
            }
        } else {
            ServerEvent::PlayerStoodUp {
                player_id: id,
                position,
            }
        };
        self.emit(Recipient::All, event);
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plaza_logic::config::SimConfig;
    use crate::protocol::{ClientCommand, ObstacleSpec};

    fn sim_with(model: &str, dims: Dimensions) -> (Simulation, PlayerId) {
        let mut sim = Simulation::new(SimConfig {
            seed: Some(5),
            ..SimConfig::default()
        });
        let id = sim.connect();
        sim.process(
            id,
            ClientCommand::SpawnObstacle(ObstacleSpec {
                id: "f".into(),
                position: Vec3::new(0.0, dims.height / 2.0, 0.0),
                dimensions: dims,
                rotation: 0.0,
                passthrough: false,
                model: model.into(),
                scale: 1.0,
                kind: None,
            }),
        )
        .unwrap();
        place(&mut sim, id, 0.0, 1.6);
        sim.drain_outbox();
        (sim, id)
    }

    fn place(sim: &mut Simulation, id: PlayerId, x: f32, z: f32) {
        let p = sim.world.players.get_mut(&id).unwrap();
        p.position = Vec3::new(x, GROUND_Y, z);
    }

    fn sit(id: &str) -> ClientCommand {
        ClientCommand::PlayerSit {
            furniture_id: id.into(),
            live_box: None,
        }
    }

    #[test]
    fn sit_within_reach_commits_immediately() {
        let (mut sim, id) = sim_with("models/chair.glb", Dimensions::new(0.6, 0.9, 0.6));
        sim.process(id, sit("f")).unwrap();
        let p = sim.player(id).unwrap();
        assert!(p.state.is_sitting());
        assert!((p.position.y - 0.9 * 0.45).abs() < 1e-4);
        let out = sim.drain_outbox();
        assert!(matches!(out[0].event, ServerEvent::PlayerSat { seat: 0, .. }));
        assert_eq!(out[0].recipient, Recipient::All);
    }

    #[test]
    fn table_is_not_sittable() {
        let (mut sim, id) = sim_with("models/table.glb", Dimensions::new(1.0, 0.8, 1.0));
        assert_eq!(
            sim.process(id, sit("f")),
            Err(CommandError::Interaction(InteractionError::NotSittable("f".into())))
        );
    }

    #[test]
    fn lie_needs_a_bed() {
        let (mut sim, id) = sim_with("models/chair.glb", Dimensions::new(0.6, 0.9, 0.6));
        let err = sim
            .process(
                id,
                ClientCommand::PlayerLie {
                    furniture_id: "f".into(),
                    live_box: None,
                },
            )
            .unwrap_err();
        assert_eq!(
            err,
            CommandError::Interaction(InteractionError::NotLieable("f".into()))
        );
    }

    #[test]
    fn far_sit_walks_then_commits_on_arrival() {
        let (mut sim, id) = sim_with("models/chair.glb", Dimensions::new(0.6, 0.9, 0.6));
        place(&mut sim, id, 8.0, 0.0);
        sim.process(id, sit("f")).unwrap();
        {
            let p = sim.player(id).unwrap();
            assert!(p.state.is_free());
            assert!(p.pending.is_some());
            assert!(p.is_moving());
        }
        sim.run_ticks(200);
        assert!(sim.player(id).unwrap().state.is_sitting());
    }

    #[test]
    fn stand_up_lands_clear_of_furniture() {
        let (mut sim, id) = sim_with("models/bench.glb", Dimensions::new(2.2, 0.5, 0.5));
        sim.process(id, sit("f")).unwrap();
        sim.process(id, ClientCommand::PlayerStandUp).unwrap();
        let p = sim.player(id).unwrap();
        assert!(p.state.is_free());
        assert_eq!(p.position.y, GROUND_Y);
        assert!(!sim.world().collision.blocked(&p.bounds()));
        assert!(matches!(
            sim.process(id, ClientCommand::PlayerStandUp),
            Err(CommandError::Interaction(InteractionError::NotSitting))
        ));
    }

    #[test]
    fn live_box_resizes_furniture_collision() {
        let (mut sim, id) = sim_with("models/bench.glb", Dimensions::new(2.2, 0.5, 0.5));
        let other = sim.connect();
        sim.drain_outbox();
        sim.process(
            id,
            ClientCommand::PlayerSit {
                furniture_id: "f".into(),
                live_box: Some(Dimensions::new(4.0, 0.5, 1.0)),
            },
        )
        .unwrap();

        let blocker = sim
            .world()
            .collision
            .blockers()
            .iter()
            .find(|b| b.id == "f")
            .unwrap();
        assert!((blocker.aabb.half_x() - 2.0).abs() < 1e-4);
        assert!((blocker.aabb.half_z() - 0.5).abs() < 1e-4);
        let bench = sim.world().obstacle("f").unwrap();
        assert_eq!(bench.shape.dims, Dimensions::new(4.0, 0.5, 1.0));
        assert_eq!(bench.class.seat_capacity, 5);
        assert!(sim.player(id).unwrap().state.is_sitting());
        assert!(!sim.world().collision.blocked(&sim.player(other).unwrap().bounds()));

        let out = sim.drain_outbox();
        let update = out
            .iter()
            .find(|o| matches!(o.event, ServerEvent::ObstacleUpdated { .. }))
            .unwrap();
        assert_eq!(update.recipient, Recipient::AllExcept(id));
    }

    #[test]
    fn matching_live_box_leaves_furniture_alone() {
        let (mut sim, id) = sim_with("models/bench.glb", Dimensions::new(2.2, 0.5, 0.5));
        sim.process(
            id,
            ClientCommand::PlayerSit {
                furniture_id: "f".into(),
                live_box: Some(Dimensions::new(2.2, 0.5, 0.5)),
            },
        )
        .unwrap();
        assert!(!sim
            .drain_outbox()
            .iter()
            .any(|o| matches!(o.event, ServerEvent::ObstacleUpdated { .. })));
    }

    #[test]
    fn get_up_requires_lying() {
        let (mut sim, id) = sim_with("models/bed_double.glb", Dimensions::new(1.6, 0.5, 2.1));
        assert!(matches!(
            sim.process(id, ClientCommand::PlayerGetUp),
            Err(CommandError::Interaction(InteractionError::NotLying))
        ));
        sim.process(
            id,
            ClientCommand::PlayerLie {
                furniture_id: "f".into(),
                live_box: None,
            },
        )
        .unwrap();
        assert!(sim.player(id).unwrap().state.is_lying());
        sim.process(id, ClientCommand::PlayerGetUp).unwrap();
        assert!(sim.player(id).unwrap().state.is_free());
    }

    #[test]
    fn move_to_is_ignored_while_seated() {
        let (mut sim, id) = sim_with("models/chair.glb", Dimensions::new(0.6, 0.9, 0.6));
        sim.process(id, sit("f")).unwrap();
        sim.process(id, ClientCommand::MoveTo { x: 5.0, z: 5.0 }).unwrap();
        let p = sim.player(id).unwrap();
        assert!(p.state.is_sitting());
        assert!(!p.is_moving());
    }

    #[test]
    fn deleting_furniture_releases_occupants() {
        let (mut sim, id) = sim_with("models/sofa.glb", Dimensions::new(2.0, 0.8, 0.9));
        sim.process(id, sit("f")).unwrap();
        sim.process(id, ClientCommand::DeleteObstacle { id: "f".into() })
            .unwrap();
        let p = sim.player(id).unwrap();
        assert!(p.state.is_free());
        assert_eq!(p.position.y, GROUND_Y);
        assert!(sim
            .drain_outbox()
            .iter()
            .any(|o| matches!(o.event, ServerEvent::PlayerStoodUp { .. })));
    }
}
