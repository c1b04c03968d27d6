//! `move_to` handling and per-tick path following.

use plaza_logic::movement::{step_toward, StepInput, StepOutcome, StuckVerdict};
use plaza_logic::pathfinding::{NavContext, PathResult, Waypoint};
use plaza_logic::validation::Sanitized;

use super::{CommandError, Simulation};
use crate::protocol::{Recipient, ServerEvent};
use crate::world::PlayerId;

impl Simulation {
    pub(super) fn handle_move_to(&mut self, id: PlayerId, x: f32, z: f32) -> Result<(), CommandError> {
        let mut v = self.validator();
        let target = v.xz("target", x, z);
        let Sanitized {
            value: (x, z), ..
        } = v.finish(target)?;

        let player = self.player_mut(id)?;
        if !player.state.is_free() {
            log::debug!("player {}: move_to ignored while seated", id);
            return Ok(());
        }
        player.pending = None;

        let plan = self.route(id, Waypoint::new(x, z))?;
        self.emit(
            Recipient::Only(id),
            ServerEvent::PathPreview {
                waypoints: plan.waypoints,
                complete: plan.complete,
            },
        );
        Ok(())
    }

    /// Plan from the player's position to `goal` (moved beside any blocker it
    /// lies in) and store the result as the player's path.
    pub(super) fn route(&mut self, id: PlayerId, goal: Waypoint) -> Result<PathResult, CommandError> {
        let (position, dims) = {
            let p = self.world.player(id).ok_or(CommandError::UnknownPlayer(id))?;
            (p.position, p.dims)
        };
        self.pathfinder.set_footprint(dims);
        let ctx = NavContext::new(&self.world.collision, &self.config.bounds);
        let goal = self.pathfinder.resolve_interaction_point(ctx, goal.x, goal.z)?;
        let plan = self
            .pathfinder
            .find_path(ctx, (position.x, position.z), (goal.x, goal.z))?;
        if !plan.complete {
            log::warn!(
                "player {}: no full path to ({:.2}, {:.2}) after {} iterations, using best effort",
                id,
                goal.x,
                goal.z,
                plan.iterations
            );
        }

        let player = self.player_mut(id)?;
        player.path = plan.waypoints.iter().skip(1).copied().collect();
        player.target = if player.path.is_empty() { None } else { Some(goal) };
        player.tracker.reset();
        Ok(plan)
    }

    /// Move every free player one step along its path. Returns the players
    /// that finished a path with an interaction pending.
    pub(super) fn step_players(&mut self) -> Vec<PlayerId> {
        let Simulation {
            world,
            pathfinder,
            config,
            ..
        } = self;
        let max_step = config.movement.walk_speed * config.tick_seconds();
        let mut arrivals = Vec::new();

        for player in world.players.values_mut() {
            if !player.state.is_free() {
                continue;
            }
            let Some(&next) = player.path.front() else {
                continue;
            };

            let before = player.position;
            let outcome = step_toward(
                StepInput {
                    set: &world.collision,
                    bounds: &config.bounds,
                    dims: player.dims,
                    position: before,
                    target_x: next.x,
                    target_z: next.z,
                    max_step,
                },
                &config.movement,
            );
            let blocked = match outcome {
                StepOutcome::Moved { x, z, .. } => {
                    player.position.x = x;
                    player.position.z = z;
                    false
                }
                StepOutcome::Blocked => true,
            };
            let moved = before.distance_xz(&player.position);
            if moved > f32::EPSILON {
                player.rotation = (player.position.x - before.x).atan2(player.position.z - before.z);
            }

            let here = Waypoint::new(player.position.x, player.position.z);
            if here.distance(&next) <= config.movement.arrival_radius {
                player.path.pop_front();
                if player.path.is_empty() {
                    player.target = None;
                    player.tracker.reset();
                    if player.pending.is_some() {
                        arrivals.push(player.id);
                    }
                }
                continue;
            }

            match player.tracker.record(moved, blocked, &config.movement) {
                StuckVerdict::Continue => {}
                StuckVerdict::Replan => {
                    let Some(target) = player.target else {
                        continue;
                    };
                    pathfinder.set_footprint(player.dims);
                    let ctx = NavContext::new(&world.collision, &config.bounds);
                    match pathfinder.find_path(ctx, (here.x, here.z), (target.x, target.z)) {
                        Ok(plan) => {
                            log::debug!(
                                "player {}: replanned, {} waypoints",
                                player.id,
                                plan.waypoints.len()
                            );
                            player.path = plan.waypoints.into_iter().skip(1).collect();
                            if player.path.is_empty() {
                                player.target = None;
                            }
                        }
                        Err(e) => log::warn!("player {}: replan failed: {}", player.id, e),
                    }
                }
                StuckVerdict::Abandon => {
                    log::warn!(
                        "player {}: stuck at ({:.2}, {:.2}), abandoning move",
                        player.id,
                        here.x,
                        here.z
                    );
                    player.halt();
                }
            }
        }
        arrivals
    }
}
