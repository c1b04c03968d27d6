//! End-to-end tests for the authoritative simulation.
//!
//! Each test drives a `Simulation` purely through its public surface:
//! connect, process/submit commands, tick, and read back state and events.

use plaza_logic::collision::{player_box, Aabb, Dimensions, Vec3};
use plaza_logic::config::SimConfig;
use plaza_logic::interaction::{InteractionError, InteractionState};
use plaza_logic::rate_limit::ActionCategory;
use plaza_server::persistence::MemoryStore;
use plaza_server::protocol::{ClientCommand, FoodSpec, ObstacleSpec, Recipient, ServerEvent};
use plaza_server::{CommandError, PlayerId, Simulation};

// ── Helpers ────────────────────────────────────────────────────────────

fn config() -> SimConfig {
    SimConfig {
        seed: Some(42),
        ..SimConfig::default()
    }
}

fn obstacle(id: &str, model: &str, center: Vec3, dims: Dimensions) -> ClientCommand {
    ClientCommand::SpawnObstacle(ObstacleSpec {
        id: id.into(),
        position: center,
        dimensions: dims,
        rotation: 0.0,
        passthrough: false,
        model: model.into(),
        scale: 1.0,
        kind: None,
    })
}

fn bench() -> ClientCommand {
    obstacle(
        "bench",
        "models/park_bench.glb",
        Vec3::new(0.0, 0.25, 0.0),
        Dimensions::new(2.2, 0.5, 0.5),
    )
}

fn sit(furniture_id: &str) -> ClientCommand {
    ClientCommand::PlayerSit {
        furniture_id: furniture_id.into(),
        live_box: None,
    }
}

fn seat_of(sim: &Simulation, id: PlayerId) -> Option<u32> {
    match &sim.player(id)?.state {
        InteractionState::Sitting { seat, .. } => Some(*seat),
        _ => None,
    }
}

/// Three players lined up in front of the bench.
fn bench_with_players(sim: &mut Simulation) -> Vec<PlayerId> {
    let ids: Vec<_> = [-1.0, 0.0, 1.0]
        .iter()
        .map(|&x| sim.connect_at(x, 1.2).unwrap())
        .collect();
    sim.process(ids[0], bench()).unwrap();
    ids
}

// ── Movement ───────────────────────────────────────────────────────────

#[test]
fn crossing_walks_around_central_block() {
    let mut sim = Simulation::new(config());
    let id = sim.connect_at(-5.0, 0.0).unwrap();
    let center = Vec3::new(0.0, 1.0, 0.0);
    let dims = Dimensions::new(2.0, 2.0, 2.0);
    sim.process(id, obstacle("block", "models/crate.glb", center, dims))
        .unwrap();
    sim.drain_outbox();

    sim.process(id, ClientCommand::MoveTo { x: 5.0, z: 0.0 })
        .unwrap();
    let preview = sim
        .drain_outbox()
        .into_iter()
        .find_map(|o| match o.event {
            ServerEvent::PathPreview { waypoints, .. } => Some(waypoints),
            _ => None,
        })
        .expect("path preview sent");
    let block = Aabb::from_center(center, dims);
    let footprint = sim.config().default_footprint;
    for w in &preview {
        let b = player_box(Vec3::new(w.x, 0.0, w.z), footprint);
        assert!(!b.intersects(&block), "waypoint ({}, {}) clips the block", w.x, w.z);
    }

    for _ in 0..400 {
        sim.tick();
        let p = sim.player(id).unwrap();
        assert!(!p.bounds().intersects(&block));
        if !p.is_moving() {
            break;
        }
    }
    let p = sim.player(id).unwrap();
    assert!(!p.is_moving());
    let dx = p.position.x - 5.0;
    let dz = p.position.z;
    assert!((dx * dx + dz * dz).sqrt() < 0.06, "ended at {:?}", p.position);
}

#[test]
fn queued_commands_apply_on_next_tick() {
    let mut sim = Simulation::new(config());
    let id = sim.connect_at(0.0, 0.0).unwrap();
    sim.submit(id, ClientCommand::MoveTo { x: 3.0, z: 0.0 });
    assert_eq!(sim.pending_commands(), 1);
    assert!(!sim.player(id).unwrap().is_moving());
    sim.tick();
    assert_eq!(sim.pending_commands(), 0);
    assert!(sim.player(id).unwrap().position.x > 0.0);
}

#[test]
fn out_of_bounds_target_is_clamped() {
    let mut sim = Simulation::new(config());
    let id = sim.connect_at(0.0, 0.0).unwrap();
    sim.process(id, ClientCommand::MoveTo { x: 500.0, z: 0.0 })
        .unwrap();
    sim.run_ticks(400);
    let p = sim.player(id).unwrap();
    assert!(sim.config().bounds.contains_box(&p.bounds()));
    assert!(p.position.x > 15.0);
}

#[test]
fn non_finite_target_is_rejected() {
    let mut sim = Simulation::new(config());
    let id = sim.connect_at(0.0, 0.0).unwrap();
    assert!(matches!(
        sim.process(id, ClientCommand::MoveTo { x: f32::NAN, z: 0.0 }),
        Err(CommandError::Validation(_))
    ));
}

// ── Rate limiting ──────────────────────────────────────────────────────

#[test]
fn thirty_first_move_in_a_second_is_throttled() {
    let mut sim = Simulation::new(config());
    let id = sim.connect_at(0.0, 0.0).unwrap();
    for i in 0..30 {
        let x = (i % 5) as f32;
        assert_eq!(sim.process(id, ClientCommand::MoveTo { x, z: 1.0 }), Ok(()));
    }
    assert_eq!(
        sim.process(id, ClientCommand::MoveTo { x: 1.0, z: 1.0 }),
        Err(CommandError::RateLimited(ActionCategory::Movement))
    );

    sim.run_ticks(20);
    assert_eq!(sim.now_ms(), 1_000);
    assert_eq!(sim.process(id, ClientCommand::MoveTo { x: 2.0, z: 2.0 }), Ok(()));
}

#[test]
fn throttled_command_notifies_only_sender() {
    let mut sim = Simulation::new(config());
    let id = sim.connect_at(0.0, 0.0).unwrap();
    for _ in 0..31 {
        sim.submit(id, ClientCommand::MoveTo { x: 1.0, z: 1.0 });
    }
    sim.drain_outbox();
    sim.tick();
    let throttled: Vec<_> = sim
        .drain_outbox()
        .into_iter()
        .filter(|o| matches!(o.event, ServerEvent::Throttled { .. }))
        .collect();
    assert_eq!(throttled.len(), 1);
    assert_eq!(throttled[0].recipient, Recipient::Only(id));
}

#[test]
fn categories_are_limited_independently() {
    let mut sim = Simulation::new(config());
    let id = sim.connect_at(0.0, 0.0).unwrap();
    for _ in 0..30 {
        sim.process(id, ClientCommand::MoveTo { x: 1.0, z: 1.0 }).unwrap();
    }
    assert_eq!(
        sim.process(
            id,
            ClientCommand::Emote {
                emote: "wave".into()
            }
        ),
        Ok(())
    );
}

// ── Seating ────────────────────────────────────────────────────────────

#[test]
fn bench_seats_fill_in_order_along_its_length() {
    let mut sim = Simulation::new(config());
    let ids = bench_with_players(&mut sim);
    for &id in &ids {
        sim.process(id, sit("bench")).unwrap();
    }
    let seats: Vec<_> = ids.iter().map(|&id| seat_of(&sim, id)).collect();
    assert_eq!(seats, vec![Some(0), Some(1), Some(2)]);

    let xs: Vec<f32> = ids
        .iter()
        .map(|&id| sim.player(id).unwrap().position.x)
        .collect();
    assert!(xs[0] < xs[1] && xs[1] < xs[2], "seats not spread: {:?}", xs);
    for &id in &ids {
        let p = sim.player(id).unwrap();
        assert!(p.position.x.abs() <= 1.1 && p.position.z.abs() <= 0.25);
    }
}

#[test]
fn full_bench_reuses_last_seat() {
    let mut sim = Simulation::new(config());
    let ids = bench_with_players(&mut sim);
    for &id in &ids {
        sim.process(id, sit("bench")).unwrap();
    }
    let late = sim.connect_at(0.0, -1.2).unwrap();
    sim.process(late, sit("bench")).unwrap();
    assert_eq!(seat_of(&sim, late), Some(2));
}

#[test]
fn full_bench_rejects_when_configured() {
    let mut cfg = config();
    cfg.seating.reject_over_capacity = true;
    let mut sim = Simulation::new(cfg);
    let ids = bench_with_players(&mut sim);
    for &id in &ids {
        sim.process(id, sit("bench")).unwrap();
    }
    let late = sim.connect_at(0.0, -1.2).unwrap();
    assert_eq!(
        sim.process(late, sit("bench")),
        Err(CommandError::Interaction(InteractionError::NoFreeSlot(
            "bench".into()
        )))
    );
}

#[test]
fn standing_frees_the_seat_for_the_next_player() {
    let mut sim = Simulation::new(config());
    let ids = bench_with_players(&mut sim);
    sim.process(ids[0], sit("bench")).unwrap();
    sim.process(ids[0], ClientCommand::PlayerStandUp).unwrap();
    let p = sim.player(ids[0]).unwrap();
    assert!(p.state.is_free());
    assert!(!sim.world().collision.blocked(&p.bounds()));

    sim.process(ids[1], sit("bench")).unwrap();
    assert_eq!(seat_of(&sim, ids[1]), Some(0));
}

#[test]
fn distant_sit_routes_first() {
    let mut sim = Simulation::new(config());
    let ids = bench_with_players(&mut sim);
    let far = sim.connect_at(10.0, 10.0).unwrap();
    sim.drain_outbox();
    sim.process(far, sit("bench")).unwrap();
    assert!(sim.player(far).unwrap().state.is_free());
    assert!(sim
        .drain_outbox()
        .iter()
        .any(|o| o.recipient == Recipient::Only(far)
            && matches!(o.event, ServerEvent::PathPreview { .. })));

    sim.run_ticks(300);
    assert_eq!(seat_of(&sim, far), Some(0));
    assert!(ids.iter().all(|&id| sim.player(id).unwrap().state.is_free()));
}

// ── Connections & persistence ──────────────────────────────────────────

#[test]
fn disconnect_forgets_player() {
    let mut sim = Simulation::new(config());
    let a = sim.connect_at(0.0, 0.0).unwrap();
    let b = sim.connect_at(3.0, 0.0).unwrap();
    sim.process(a, ClientCommand::MoveTo { x: 1.0, z: 1.0 }).unwrap();
    assert!(sim.rate_limiter().tracked() > 0);
    sim.drain_outbox();

    assert!(sim.disconnect(a));
    assert!(!sim.disconnect(a));
    assert!(sim.player(a).is_none());
    assert_eq!(sim.rate_limiter().tracked(), 0);
    let out = sim.drain_outbox();
    assert!(matches!(out[0].event, ServerEvent::PlayerLeft { player_id } if player_id == a));
    assert!(out[0].recipient.includes(b));
    assert_eq!(
        sim.process(a, ClientCommand::PlayerStandUp),
        Err(CommandError::UnknownPlayer(a))
    );
}

#[test]
fn connect_at_blocked_spot_fails() {
    let mut sim = Simulation::new(config());
    let id = sim.connect_at(5.0, 5.0).unwrap();
    sim.process(id, bench()).unwrap();
    assert!(matches!(
        sim.connect_at(0.0, 0.0),
        Err(CommandError::Obstructed(_))
    ));
}

#[test]
fn world_survives_restart_through_store() {
    let store = MemoryStore::new();
    {
        let mut sim = Simulation::bootstrap(config(), Box::new(store.clone())).unwrap();
        let id = sim.connect_at(5.0, 5.0).unwrap();
        sim.process(id, bench()).unwrap();
        sim.process(
            id,
            ClientCommand::SpawnFood(FoodSpec {
                id: "pie".into(),
                position: Vec3::new(-4.0, 0.1, -4.0),
                dimensions: Dimensions::new(0.4, 0.2, 0.4),
                scale: 1.0,
                model: "food/pie.glb".into(),
            }),
        )
        .unwrap();
        sim.process(id, ClientCommand::DeleteFood { id: "pie".into() })
            .unwrap();
        assert!(sim.flush_persistence());
    }

    let stored = store.contents();
    assert_eq!(stored.obstacles.len(), 1);
    assert!(stored.food.is_empty());

    let sim = Simulation::bootstrap(config(), Box::new(store)).unwrap();
    let bench = sim.world().obstacle("bench").unwrap();
    assert_eq!(bench.class.seat_capacity, 3);
    assert!(sim.world().collision.blocked(&Aabb::from_center(
        Vec3::new(0.0, 0.25, 0.0),
        Dimensions::new(0.2, 0.2, 0.2)
    )));
}

#[test]
fn store_write_failures_do_not_stop_the_world() {
    let store = MemoryStore::new();
    store.set_fail_writes(true);
    let mut sim = Simulation::bootstrap(config(), Box::new(store.clone())).unwrap();
    let id = sim.connect_at(5.0, 5.0).unwrap();
    sim.process(id, bench()).unwrap();
    assert!(sim.flush_persistence());
    assert!(sim.world().obstacle("bench").is_some());
    assert!(store.contents().obstacles.is_empty());
}
