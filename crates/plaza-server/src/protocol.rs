//! Wire protocol: inbound commands and outbound events.
//!
//! Both directions are JSON objects tagged by a snake_case `type` field:
//!
//! ```
//! use plaza_server::protocol::ClientCommand;
//!
//! let cmd = ClientCommand::from_json(r#"{ "type": "move_to", "x": 5.0, "z": 0.0 }"#).unwrap();
//! assert_eq!(cmd, ClientCommand::MoveTo { x: 5.0, z: 0.0 });
//! ```
//!
//! Transport is out of scope: a connection layer decodes text into
//! [`ClientCommand`]s, hands them to the simulation, and delivers each
//! [`Outbound`] to the connections its [`Recipient`] names.

use serde::{Deserialize, Serialize};

use plaza_logic::collision::{Dimensions, Vec3};
use plaza_logic::furniture::FurnitureKind;
use plaza_logic::pathfinding::Waypoint;
use plaza_logic::rate_limit::ActionCategory;

use crate::persistence::{FoodRecord, ObstacleRecord};
use crate::world::PlayerId;

fn unit_scale() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleSpec {
    pub id: String,
    pub position: Vec3,
    pub dimensions: Dimensions,
    #[serde(default)]
    pub rotation: f32,
    #[serde(default)]
    pub passthrough: bool,
    pub model: String,
    #[serde(default = "unit_scale")]
    pub scale: f32,
    /// Explicit classification; derived from `model` when absent.
    #[serde(default)]
    pub kind: Option<FurnitureKind>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObstaclePatch {
    pub id: String,
    #[serde(default)]
    pub position: Option<Vec3>,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
    #[serde(default)]
    pub rotation: Option<f32>,
    #[serde(default)]
    pub passthrough: Option<bool>,
    #[serde(default)]
    pub scale: Option<f32>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodSpec {
    pub id: String,
    pub position: Vec3,
    pub dimensions: Dimensions,
    #[serde(default = "unit_scale")]
    pub scale: f32,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FoodPatch {
    pub id: String,
    #[serde(default)]
    pub position: Option<Vec3>,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
    #[serde(default)]
    pub scale: Option<f32>,
}

/// Intent sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Customize {
        name: String,
        skin: u8,
    },
    MoveTo {
        x: f32,
        z: f32,
    },
    SpawnObstacle(ObstacleSpec),
    UpdateObstacle(ObstaclePatch),
    DeleteObstacle {
        id: String,
    },
    SpawnFood(FoodSpec),
    UpdateFood(FoodPatch),
    DeleteFood {
        id: String,
    },
    PlayerSit {
        furniture_id: String,
        #[serde(default)]
        live_box: Option<Dimensions>,
    },
    PlayerStandUp,
    PlayerLie {
        furniture_id: String,
        #[serde(default)]
        live_box: Option<Dimensions>,
    },
    PlayerGetUp,
    SetFootprint {
        width: f32,
        height: f32,
        depth: f32,
    },
    Emote {
        emote: String,
    },
}

impl ClientCommand {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Rate-limit bucket this command is charged to.
    pub fn category(&self) -> ActionCategory {
        match self {
            ClientCommand::MoveTo { .. } => ActionCategory::Movement,
            ClientCommand::SpawnObstacle(_) | ClientCommand::SpawnFood(_) => ActionCategory::Spawn,
            ClientCommand::UpdateObstacle(_) | ClientCommand::UpdateFood(_) => ActionCategory::Update,
            ClientCommand::DeleteObstacle { .. } | ClientCommand::DeleteFood { .. } => {
                ActionCategory::Delete
            }
            ClientCommand::PlayerSit { .. }
            | ClientCommand::PlayerStandUp
            | ClientCommand::PlayerLie { .. }
            | ClientCommand::PlayerGetUp => ActionCategory::Interaction,
            ClientCommand::Emote { .. } => ActionCategory::Emote,
            ClientCommand::Customize { .. } | ClientCommand::SetFootprint { .. } => {
                ActionCategory::Action
            }
        }
    }

    /// Wire name, for logs and rejection notices.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientCommand::Customize { .. } => "customize",
            ClientCommand::MoveTo { .. } => "move_to",
            ClientCommand::SpawnObstacle(_) => "spawn_obstacle",
            ClientCommand::UpdateObstacle(_) => "update_obstacle",
            ClientCommand::DeleteObstacle { .. } => "delete_obstacle",
            ClientCommand::SpawnFood(_) => "spawn_food",
            ClientCommand::UpdateFood(_) => "update_food",
            ClientCommand::DeleteFood { .. } => "delete_food",
            ClientCommand::PlayerSit { .. } => "player_sit",
            ClientCommand::PlayerStandUp => "player_stand_up",
            ClientCommand::PlayerLie { .. } => "player_lie",
            ClientCommand::PlayerGetUp => "player_get_up",
            ClientCommand::SetFootprint { .. } => "set_footprint",
            ClientCommand::Emote { .. } => "emote",
        }
    }
}

/// Per-player state broadcast every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub skin: u8,
    pub position: Vec3,
    pub rotation: f32,
    pub moving: bool,
    pub sitting: bool,
    pub lying: bool,
    pub furniture_id: Option<String>,
    pub slot: Option<u32>,
}

/// Everything a client needs to draw the world from scratch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub players: Vec<PlayerView>,
    pub obstacles: Vec<ObstacleRecord>,
    pub food: Vec<FoodRecord>,
}

/// Event sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Welcome {
        player_id: PlayerId,
        snapshot: WorldSnapshot,
    },
    Snapshot {
        snapshot: WorldSnapshot,
    },
    WorldState {
        tick: u64,
        players: Vec<PlayerView>,
    },
    PathPreview {
        waypoints: Vec<Waypoint>,
        complete: bool,
    },
    PlayerJoined {
        player: PlayerView,
    },
    PlayerLeft {
        player_id: PlayerId,
    },
    PlayerCustomized {
        player_id: PlayerId,
        name: String,
        skin: u8,
    },
    ObstacleSpawned {
        obstacle: ObstacleRecord,
    },
    ObstacleUpdated {
        obstacle: ObstacleRecord,
    },
    ObstacleDeleted {
        id: String,
    },
    FoodSpawned {
        food: FoodRecord,
    },
    FoodUpdated {
        food: FoodRecord,
    },
    FoodDeleted {
        id: String,
    },
    PlayerSat {
        player_id: PlayerId,
        furniture_id: String,
        seat: u32,
        position: Vec3,
        rotation: f32,
    },
    PlayerStoodUp {
        player_id: PlayerId,
        position: Vec3,
    },
    PlayerLay {
        player_id: PlayerId,
        furniture_id: String,
        slot: u32,
        position: Vec3,
        rotation: f32,
    },
    PlayerGotUp {
        player_id: PlayerId,
        position: Vec3,
    },
    Emote {
        player_id: PlayerId,
        emote: String,
    },
    Rejected {
        command: String,
        reason: String,
    },
    Throttled {
        category: ActionCategory,
    },
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Only(PlayerId),
    AllExcept(PlayerId),
    All,
}

impl Recipient {
    pub fn includes(&self, player: PlayerId) -> bool {
        match *self {
            Recipient::Only(id) => id == player,
            Recipient::AllExcept(id) => id != player,
            Recipient::All => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub recipient: Recipient,
    pub event: ServerEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_spawn_with_defaults() {
        let cmd = ClientCommand::from_json(
            r#"{ "type": "spawn_obstacle", "id": "bench_1",
                 "position": { "x": 1.0, "y": 0.25, "z": 2.0 },
                 "dimensions": { "width": 2.2, "height": 0.5, "depth": 0.5 },
                 "model": "models/bench.glb" }"#,
        )
        .unwrap();
        let ClientCommand::SpawnObstacle(spec) = cmd else {
            panic!("wrong variant");
        };
        assert_eq!(spec.scale, 1.0);
        assert_eq!(spec.rotation, 0.0);
        assert!(!spec.passthrough);
        assert_eq!(spec.kind, None);
    }

    #[test]
    fn decodes_unit_and_optional_fields() {
        assert_eq!(
            ClientCommand::from_json(r#"{ "type": "player_stand_up" }"#).unwrap(),
            ClientCommand::PlayerStandUp
        );
        let sit = ClientCommand::from_json(r#"{ "type": "player_sit", "furniture_id": "b" }"#).unwrap();
        assert_eq!(
            sit,
            ClientCommand::PlayerSit {
                furniture_id: "b".into(),
                live_box: None
            }
        );
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(ClientCommand::from_json(r#"{ "type": "teleport", "x": 1 }"#).is_err());
    }

    #[test]
    fn commands_map_to_categories() {
        assert_eq!(ClientCommand::PlayerGetUp.category(), ActionCategory::Interaction);
        assert_eq!(
            ClientCommand::DeleteFood { id: "x".into() }.category(),
            ActionCategory::Delete
        );
        assert_eq!(ClientCommand::MoveTo { x: 0.0, z: 0.0 }.kind(), "move_to");
    }

    #[test]
    fn events_encode_with_type_tag() {
        let json = ServerEvent::Throttled {
            category: ActionCategory::Movement,
        }
        .to_json()
        .unwrap();
        assert_eq!(json, r#"{"type":"throttled","category":"movement"}"#);
    }

    #[test]
    fn recipients() {
        assert!(Recipient::All.includes(3));
        assert!(!Recipient::AllExcept(3).includes(3));
        assert!(Recipient::Only(3).includes(3));
        assert!(!Recipient::Only(3).includes(4));
    }
}
