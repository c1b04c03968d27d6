//! Authoritative tick loop and command handling.
//!
//! One `Simulation` owns the whole world. Client commands are queued by
//! [`Simulation::submit`] and drained at the start of the next
//! [`Simulation::tick`], each handler running to completion before the next
//! one starts, so seat allocation and entity mutations are atomic without
//! locks. Each tick then:
//!
//! 1. Rebuilds the collision set if anything changed
//! 2. Steps every free player along its path, in id order
//! 3. Commits sits/lies for players who reached their furniture
//! 4. Sweeps empty rate-limit windows (every `sweep_interval_ticks`)
//! 5. Broadcasts `world_state`
//!
//! Handlers live in submodules: [`movement`] (move_to, stepping, stuck
//! recovery), [`entities`] (spawn/update/delete), [`interaction`] (sit, lie,
//! stand up, get up).

mod entities;
mod interaction;
mod movement;

use std::collections::VecDeque;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use plaza_logic::collision::{Vec3, WorldBounds};
use plaza_logic::config::{validate_config, ConfigError, SimConfig};
use plaza_logic::constants::player::{DEFAULT_NAME, SPAWN_ATTEMPTS};
use plaza_logic::constants::world::GROUND_Y;
use plaza_logic::interaction::InteractionError;
use plaza_logic::pathfinding::{GridPathfinder, NavContext, PathError};
use plaza_logic::rate_limit::{ActionCategory, RateLimiter};
use plaza_logic::validation::{describe, Sanitized, ValidationError, Validator};

use crate::persistence::{PersistenceWorker, StoreError, StoreOp, WorldStore};
use crate::protocol::{ClientCommand, Outbound, Recipient, ServerEvent, WorldSnapshot};
use crate::world::{Food, Obstacle, Player, PlayerId, World};

/// Why a command was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    Validation(Vec<ValidationError>),
    RateLimited(ActionCategory),
    UnknownPlayer(PlayerId),
    UnknownEntity(String),
    DuplicateEntity(String),
    Interaction(InteractionError),
    Path(PathError),
    /// The request would put a player inside geometry.
    Obstructed(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Validation(errors) => write!(f, "invalid input: {}", describe(errors)),
            CommandError::RateLimited(cat) => write!(f, "too many {} actions", cat.label()),
            CommandError::UnknownPlayer(id) => write!(f, "unknown player {}", id),
            CommandError::UnknownEntity(id) => write!(f, "unknown entity '{}'", id),
            CommandError::DuplicateEntity(id) => write!(f, "entity '{}' already exists", id),
            CommandError::Interaction(e) => write!(f, "{}", e),
            CommandError::Path(e) => write!(f, "{}", e),
            CommandError::Obstructed(why) => write!(f, "obstructed: {}", why),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<Vec<ValidationError>> for CommandError {
    fn from(errors: Vec<ValidationError>) -> Self {
        CommandError::Validation(errors)
    }
}

impl From<InteractionError> for CommandError {
    fn from(e: InteractionError) -> Self {
        CommandError::Interaction(e)
    }
}

impl From<PathError> for CommandError {
    fn from(e: PathError) -> Self {
        CommandError::Path(e)
    }
}

/// Why the world could not be brought up.
#[derive(Debug)]
pub enum StartupError {
    Config(Vec<ConfigError>),
    Store(StoreError),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::Config(errors) => {
                let list: Vec<String> = errors.iter().map(ToString::to_string).collect();
                write!(f, "invalid config: {}", list.join("; "))
            }
            StartupError::Store(e) => write!(f, "store unavailable: {}", e),
        }
    }
}

impl std::error::Error for StartupError {}

impl From<StoreError> for StartupError {
    fn from(e: StoreError) -> Self {
        StartupError::Store(e)
    }
}

pub struct Simulation {
    config: SimConfig,
    world: World,
    pathfinder: GridPathfinder,
    limiter: RateLimiter<PlayerId>,
    queue: VecDeque<(PlayerId, ClientCommand)>,
    outbox: Vec<Outbound>,
    persistence: Option<PersistenceWorker>,
    rng: StdRng,
    tick: u64,
    now_ms: u64,
    next_player_id: PlayerId,
}

impl Simulation {
    /// Empty world without persistence.
    pub fn new(config: SimConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            world: World::new(config.movement.food_collision_scale),
            pathfinder: GridPathfinder::new(config.nav.clone()),
            limiter: RateLimiter::new(config.rate_limits.clone()),
            queue: VecDeque::new(),
            outbox: Vec::new(),
            persistence: None,
            rng,
            tick: 0,
            now_ms: 0,
            next_player_id: 1,
            config,
        }
    }

    /// Check the config, load every stored entity, then hand the store to a
    /// background writer. These are the only fatal failures.
    pub fn bootstrap(config: SimConfig, mut store: Box<dyn WorldStore>) -> Result<Self, StartupError> {
        let problems = validate_config(&config);
        if !problems.is_empty() {
            for problem in &problems {
                log::error!("config: {}", problem);
            }
            return Err(StartupError::Config(problems));
        }
        let stored = store.load_all()?;
        let mut sim = Self::new(config);
        let (obstacles, food) = (stored.obstacles.len(), stored.food.len());
        for record in stored.obstacles {
            let obstacle = sim.obstacle_from_record(record);
            sim.world.obstacles.insert(obstacle.id.clone(), obstacle);
        }
        for record in stored.food {
            let food = Food::from_record(record);
            sim.world.food.insert(food.id.clone(), food);
        }
        sim.world.mark_dirty();
        sim.world.refresh_collision();
        sim.persistence = Some(PersistenceWorker::spawn(store)?);
        log::info!(
            "world loaded: {} obstacles, {} food items",
            obstacles,
            food
        );
        Ok(sim)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.world.player(id)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Simulation clock in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn rate_limiter(&self) -> &RateLimiter<PlayerId> {
        &self.limiter
    }

    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }

    /// Take every event produced since the last call.
    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    /// Block until queued store writes are applied. `true` without persistence.
    pub fn flush_persistence(&self) -> bool {
        self.persistence.as_ref().map_or(true, PersistenceWorker::flush)
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            players: self.world.players().map(Player::view).collect(),
            obstacles: self.world.obstacles().map(Obstacle::record).collect(),
            food: self.world.food().map(Food::record).collect(),
        }
    }

    pub(crate) fn emit(&mut self, recipient: Recipient, event: ServerEvent) {
        self.outbox.push(Outbound { recipient, event });
    }

    pub(crate) fn persist(&self, op: StoreOp) {
        if let Some(worker) = &self.persistence {
            worker.submit(op);
        }
    }

    pub(crate) fn validator(&self) -> Validator<'_> {
        Validator::new(&self.config.limits, &self.config.bounds)
    }

    pub(crate) fn player_mut(&mut self, id: PlayerId) -> Result<&mut Player, CommandError> {
        self.world
            .players
            .get_mut(&id)
            .ok_or(CommandError::UnknownPlayer(id))
    }

    // ========================================================================
    // CONNECTIONS
    // ========================================================================

    /// Add a player at a random walkable spot with the default footprint.
    pub fn connect(&mut self) -> PlayerId {
        self.world.refresh_collision();
        let position = self.spawn_point();
        self.admit(position)
    }

    /// Add a player at `(x, z)`, which must be walkable.
    pub fn connect_at(&mut self, x: f32, z: f32) -> Result<PlayerId, CommandError> {
        let mut v = self.validator();
        let spot = v.xz("spawn", x, z);
        let Sanitized { value: (x, z), .. } = v.finish(spot)?;
        self.world.refresh_collision();
        if !plaza_logic::movement::validate(
            &self.world.collision,
            &self.config.bounds,
            self.config.default_footprint,
            GROUND_Y,
            x,
            z,
        ) {
            return Err(CommandError::Obstructed(format!(
                "({:.2}, {:.2}) is not walkable",
                x, z
            )));
        }
        Ok(self.admit(Vec3::new(x, GROUND_Y, z)))
    }

    fn admit(&mut self, position: Vec3) -> PlayerId {
        let id = self.next_player_id;
        self.next_player_id += 1;
        let dims = self.config.default_footprint;
        let player = Player::new(id, format!("{} {}", DEFAULT_NAME, id), position, dims);
        let view = player.view();
        self.world.players.insert(id, player);
        log::info!(
            "player {} connected at ({:.2}, {:.2})",
            id,
            position.x,
            position.z
        );
        let snapshot = self.snapshot();
        self.emit(Recipient::Only(id), ServerEvent::Welcome { player_id: id, snapshot });
        self.emit(Recipient::AllExcept(id), ServerEvent::PlayerJoined { player: view });
        id
    }

    fn spawn_point(&mut self) -> Vec3 {
        let dims = self.config.default_footprint;
        let WorldBounds {
            min_x,
            max_x,
            min_z,
            max_z,
        } = self.config.bounds;
        let (hx, hz) = (dims.width / 2.0, dims.depth / 2.0);
        for _ in 0..SPAWN_ATTEMPTS {
            if min_x + hx >= max_x - hx || min_z + hz >= max_z - hz {
                break;
            }
            let x = self.rng.gen_range(min_x + hx..max_x - hx);
            let z = self.rng.gen_range(min_z + hz..max_z - hz);
            if plaza_logic::movement::validate(
                &self.world.collision,
                &self.config.bounds,
                dims,
                GROUND_Y,
                x,
                z,
            ) {
                return Vec3::new(x, GROUND_Y, z);
            }
        }
        self.pathfinder.set_footprint(dims);
        let ctx = NavContext::new(&self.world.collision, &self.config.bounds);
        match self.pathfinder.nearest_walkable_point(ctx, 0.0, 0.0) {
            Ok(Some(p)) => Vec3::new(p.x, GROUND_Y, p.z),
            _ => {
                log::warn!("no walkable spawn point found, spawning at origin");
                Vec3::new(0.0, GROUND_Y, 0.0)
            }
        }
    }

    /// Remove a player and forget its rate-limit history.
    pub fn disconnect(&mut self, id: PlayerId) -> bool {
        if self.world.players.remove(&id).is_none() {
            return false;
        }
        self.limiter.purge(id);
        self.queue.retain(|(pid, _)| *pid != id);
        log::info!("player {} disconnected", id);
        self.emit(Recipient::AllExcept(id), ServerEvent::PlayerLeft { player_id: id });
        true
    }

    // ========================================================================
    // COMMANDS
    // ========================================================================

    /// Queue a command for the next tick.
    pub fn submit(&mut self, player: PlayerId, command: ClientCommand) {
        self.queue.push_back((player, command));
    }

    /// Decode a JSON command and queue it. Malformed input is answered with
    /// a rejection to the sender.
    pub fn submit_json(&mut self, player: PlayerId, text: &str) {
        match ClientCommand::from_json(text) {
            Ok(command) => self.submit(player, command),
            Err(e) => {
                log::debug!("player {}: undecodable command: {}", player, e);
                self.emit(
                    Recipient::Only(player),
                    ServerEvent::Rejected {
                        command: "unknown".into(),
                        reason: format!("malformed command: {}", e),
                    },
                );
            }
        }
    }

    fn dispatch(&mut self, player: PlayerId, command: ClientCommand) {
        let kind = command.kind();
        match self.process(player, command) {
            Ok(()) => {}
            Err(CommandError::RateLimited(category)) => {
                log::debug!("player {}: {} throttled", player, kind);
                self.emit(Recipient::Only(player), ServerEvent::Throttled { category });
            }
            Err(CommandError::UnknownPlayer(_)) => {
                log::debug!("dropping {} from departed player {}", kind, player);
            }
            Err(e) => {
                log::warn!("player {}: {} rejected: {}", player, kind, e);
                self.emit(
                    Recipient::Only(player),
                    ServerEvent::Rejected {
                        command: kind.to_string(),
                        reason: e.to_string(),
                    },
                );
            }
        }
    }

    /// Apply one command immediately, bypassing the queue.
    pub fn process(&mut self, player: PlayerId, command: ClientCommand) -> Result<(), CommandError> {
        if !self.world.players.contains_key(&player) {
            return Err(CommandError::UnknownPlayer(player));
        }
        let category = command.category();
        if !self.limiter.allow(player, category, self.now_ms) {
            return Err(CommandError::RateLimited(category));
        }
        self.world.refresh_collision();
        match command {
            ClientCommand::Customize { name, skin } => self.handle_customize(player, &name, skin),
            ClientCommand::MoveTo { x, z } => self.handle_move_to(player, x, z),
            ClientCommand::SpawnObstacle(spec) => self.spawn_obstacle(player, spec),
            ClientCommand::UpdateObstacle(patch) => self.update_obstacle(player, patch),
            ClientCommand::DeleteObstacle { id } => self.delete_obstacle(player, &id),
            ClientCommand::SpawnFood(spec) => self.spawn_food(player, spec),
            ClientCommand::UpdateFood(patch) => self.update_food(player, patch),
            ClientCommand::DeleteFood { id } => self.delete_food(player, &id),
            ClientCommand::PlayerSit {
                furniture_id,
                live_box,
            } => self.handle_sit(player, &furniture_id, live_box),
            ClientCommand::PlayerLie {
                furniture_id,
                live_box,
            } => self.handle_lie(player, &furniture_id, live_box),
            ClientCommand::PlayerStandUp => self.handle_stand_up(player),
            ClientCommand::PlayerGetUp => self.handle_get_up(player),
            ClientCommand::SetFootprint {
                width,
                height,
                depth,
            } => self.handle_set_footprint(player, width, height, depth),
            ClientCommand::Emote { emote } => self.handle_emote(player, &emote),
        }
    }

    fn handle_customize(&mut self, id: PlayerId, name: &str, skin: u8) -> Result<(), CommandError> {
        let mut v = self.validator();
        let name = v.name("name", name);
        let skin = v.skin("skin", skin);
        let Sanitized {
            value: (name, skin),
            warnings,
        } = v.finish((name, skin))?;
        log_warnings(id, "customize", &warnings);

        let player = self.player_mut(id)?;
        player.name = name.clone();
        player.skin = skin;
        let snapshot = self.snapshot();
        self.emit(Recipient::Only(id), ServerEvent::Snapshot { snapshot });
        self.emit(
            Recipient::AllExcept(id),
            ServerEvent::PlayerCustomized {
                player_id: id,
                name,
                skin,
            },
        );
        Ok(())
    }

    fn handle_set_footprint(
        &mut self,
        id: PlayerId,
        width: f32,
        height: f32,
        depth: f32,
    ) -> Result<(), CommandError> {
        let mut v = self.validator();
        let dims = v.footprint(
            "footprint",
            plaza_logic::collision::Dimensions::new(width, height, depth),
        );
        let Sanitized { value: dims, warnings } = v.finish(dims)?;
        log_warnings(id, "set_footprint", &warnings);

        let player = self.world.player(id).ok_or(CommandError::UnknownPlayer(id))?;
        if player.state.is_free()
            && !plaza_logic::movement::validate(
                &self.world.collision,
                &self.config.bounds,
                dims,
                player.position.y,
                player.position.x,
                player.position.z,
            )
        {
            return Err(CommandError::Obstructed(
                "footprint would overlap geometry".into(),
            ));
        }
        self.player_mut(id)?.dims = dims;
        Ok(())
    }

    fn handle_emote(&mut self, id: PlayerId, emote: &str) -> Result<(), CommandError> {
        let mut v = self.validator();
        let emote = v.text("emote", emote, self.config.limits.emote_max_len);
        let Sanitized { value: emote, .. } = v.finish(emote)?;
        if emote.is_empty() {
            return Err(CommandError::Validation(vec![ValidationError {
                field: "emote".into(),
                severity: plaza_logic::validation::Severity::Error,
                message: "emote is empty".into(),
            }]));
        }
        self.emit(
            Recipient::AllExcept(id),
            ServerEvent::Emote {
                player_id: id,
                emote,
            },
        );
        Ok(())
    }

    // ========================================================================
    // TICK
    // ========================================================================

    /// Advance the world by one fixed step.
    pub fn tick(&mut self) {
        while let Some((player, command)) = self.queue.pop_front() {
            self.dispatch(player, command);
        }

        self.world.refresh_collision();
        let arrivals = self.step_players();
        for id in arrivals {
            self.commit_pending(id);
        }

        if self.config.sweep_interval_ticks > 0 && self.tick % self.config.sweep_interval_ticks == 0 {
            let dropped = self.limiter.sweep(self.now_ms);
            if dropped > 0 {
                log::debug!("rate limiter: swept {} idle windows", dropped);
            }
        }

        let players = self.world.players().map(Player::view).collect();
        self.emit(
            Recipient::All,
            ServerEvent::WorldState {
                tick: self.tick,
                players,
            },
        );

        self.tick += 1;
        self.now_ms += self.config.tick_millis();
    }

    /// Run `n` ticks.
    pub fn run_ticks(&mut self, n: u64) {
        for _ in 0..n {
            self.tick();
        }
    }
}

fn log_warnings(player: PlayerId, command: &str, warnings: &[ValidationError]) {
    if !warnings.is_empty() {
        log::debug!(
            "player {}: {} sanitized: {}",
            player,
            command,
            describe(warnings)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    fn sim() -> Simulation {
        Simulation::new(SimConfig {
            seed: Some(7),
            ..SimConfig::default()
        })
    }

    #[test]
    fn connect_spawns_inside_bounds_and_welcomes() {
        let mut sim = sim();
        let id = sim.connect();
        let p = sim.player(id).unwrap();
        assert!(sim.config().bounds.contains_box(&p.bounds()));
        let out = sim.drain_outbox();
        assert!(matches!(
            out[0],
            Outbound {
                recipient: Recipient::Only(pid),
                event: ServerEvent::Welcome { .. }
            } if pid == id
        ));
        assert!(matches!(out[1].event, ServerEvent::PlayerJoined { .. }));
    }

    #[test]
    fn tick_advances_clock_and_broadcasts() {
        let mut sim = sim();
        sim.connect();
        sim.drain_outbox();
        sim.run_ticks(3);
        assert_eq!(sim.tick_count(), 3);
        assert_eq!(sim.now_ms(), 150);
        let states = sim
            .drain_outbox()
            .into_iter()
            .filter(|o| matches!(o.event, ServerEvent::WorldState { .. }))
            .count();
        assert_eq!(states, 3);
    }

    #[test]
    fn customize_sanitizes_name() {
        let mut sim = sim();
        let id = sim.connect();
        sim.process(
            id,
            ClientCommand::Customize {
                name: "<i>Zed</i>".into(),
                skin: 3,
            },
        )
        .unwrap();
        let p = sim.player(id).unwrap();
        assert_eq!(p.name, "Zed");
        assert_eq!(p.skin, 3);
    }

    #[test]
    fn bad_skin_is_rejected_to_sender() {
        let mut sim = sim();
        let id = sim.connect();
        sim.drain_outbox();
        sim.submit(
            id,
            ClientCommand::Customize {
                name: "Zed".into(),
                skin: 200,
            },
        );
        sim.tick();
        let out = sim.drain_outbox();
        assert!(out.iter().any(|o| o.recipient == Recipient::Only(id)
            && matches!(&o.event, ServerEvent::Rejected { command, .. } if command == "customize")));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let mut sim = sim();
        let id = sim.connect();
        sim.drain_outbox();
        sim.submit_json(id, "{ not json");
        assert_eq!(sim.pending_commands(), 0);
        assert!(matches!(
            sim.drain_outbox()[0].event,
            ServerEvent::Rejected { .. }
        ));
    }

    #[test]
    fn empty_emote_is_rejected() {
        let mut sim = sim();
        let id = sim.connect();
        let err = sim
            .process(id, ClientCommand::Emote { emote: "<b></b>".into() })
            .unwrap_err();
        assert!(matches!(err, CommandError::Validation(_)));
    }

    #[test]
    fn commands_from_unknown_players_fail() {
        let mut sim = sim();
        assert_eq!(
            sim.process(42, ClientCommand::PlayerStandUp),
            Err(CommandError::UnknownPlayer(42))
        );
    }

    #[test]
    fn bootstrap_fails_when_store_unreachable() {
        let store = MemoryStore::new();
        store.set_fail_loads(true);
        assert!(matches!(
            Simulation::bootstrap(SimConfig::default(), Box::new(store)),
            Err(StartupError::Store(_))
        ));
    }

    #[test]
    fn bootstrap_refuses_broken_config() {
        let mut config = SimConfig::default();
        config.nav.grid_size = 0.0;
        config.seating.seat_spacing = 0.0;
        let Err(StartupError::Config(problems)) =
            Simulation::bootstrap(config, Box::new(MemoryStore::new()))
        else {
            panic!("broken config was accepted");
        };
        assert!(problems.contains(&ConfigError::InvalidGridSize(0.0)));
        assert!(problems.contains(&ConfigError::InvalidSeatSpacing(0.0)));
    }
}
