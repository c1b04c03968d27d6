//! Plaza Headless Simulation Harness
//!
//! Runs the collision, navigation, rate-limit and seating scenarios against
//! the real simulation in-process, then prints a pass/fail report.
//! No networking, no rendering.
//!
//! Usage:
//!   cargo run -p plaza-simtest
//!   cargo run -p plaza-simtest -- --verbose
//!   cargo run -p plaza-simtest -- --config plaza.json

use plaza_logic::collision::{player_box, Aabb, CollisionSet, Dimensions, ObstacleShape, Vec3};
use plaza_logic::config::{validate_config, NavConfig, SimConfig};
use plaza_logic::interaction::{allocate_slot, InteractionState};
use plaza_logic::pathfinding::{path_length, GridPathfinder, NavContext};
use plaza_logic::rate_limit::{ActionCategory, RateLimitConfig, RateLimitPolicy, RateLimiter};
use plaza_server::persistence::FileStore;
use plaza_server::protocol::{ClientCommand, ObstacleSpec, ServerEvent};
use plaza_server::{runtime, CommandError, PlayerId, Simulation};

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

impl TestResult {
    fn new(name: &str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed,
            detail: detail.into(),
        }
    }
}

fn main() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_secs()
        .try_init();

    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose");
    let config = match args.iter().position(|a| a == "--config") {
        Some(i) => match args.get(i + 1).map(SimConfig::load) {
            Some(Ok(cfg)) => cfg,
            Some(Err(e)) => {
                eprintln!("error: {}", e);
                std::process::exit(2);
            }
            None => {
                eprintln!("error: --config needs a path");
                std::process::exit(2);
            }
        },
        None => SimConfig::default(),
    };
    let config = SimConfig {
        seed: config.seed.or(Some(42)),
        ..config
    };

    println!("=== Plaza Simulation Harness ===\n");
    log::info!(
        "harness config: {} Hz, seed {:?}",
        config.tick_rate_hz,
        config.seed
    );
    let mut results = Vec::new();

    // 1. Config sanity
    results.extend(validate_configuration(&config));

    // 2. Collision primitives
    results.extend(validate_collision());

    // 3. Pathfinding on a synthetic plaza
    results.extend(validate_pathfinding());

    // 4. Rate limiting
    results.extend(validate_rate_limits());

    // 5. End-to-end scenarios
    results.extend(validate_scenarios(&config));

    // 6. File persistence round trip
    results.extend(validate_file_store(&config));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── 1. Configuration ────────────────────────────────────────────────────

fn validate_configuration(config: &SimConfig) -> Vec<TestResult> {
    println!("--- Configuration ---");
    let errors = validate_config(config);
    vec![
        TestResult::new(
            "config_valid",
            errors.is_empty(),
            if errors.is_empty() {
                format!(
                    "{} Hz, grid {} m, bounds x {}..{}",
                    config.tick_rate_hz,
                    config.nav.grid_size,
                    config.bounds.min_x,
                    config.bounds.max_x
                )
            } else {
                errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ")
            },
        ),
        TestResult::new(
            "config_tick_millis",
            config.tick_millis() > 0,
            format!("{} ms per tick", config.tick_millis()),
        ),
    ]
}

// ── 2. Collision ────────────────────────────────────────────────────────

fn validate_collision() -> Vec<TestResult> {
    println!("--- Collision ---");
    let mut results = Vec::new();

    let a = Aabb::from_center(Vec3::new(0.0, 0.5, 0.0), Dimensions::new(1.0, 1.0, 1.0));
    let b = Aabb::from_center(Vec3::new(0.8, 0.5, 0.2), Dimensions::new(1.0, 1.0, 1.0));
    let c = Aabb::from_center(Vec3::new(3.0, 0.5, 0.0), Dimensions::new(1.0, 1.0, 1.0));
    let symmetric = [(a, b), (a, c), (b, c)]
        .iter()
        .all(|(x, y)| x.intersects(y) == y.intersects(x));
    results.push(TestResult::new(
        "aabb_intersects_symmetric",
        symmetric && a.intersects(&b) && !a.intersects(&c),
        "overlap and separation agree in both directions",
    ));

    let point = Aabb::from_center(Vec3::new(1.0, 1.0, 1.0), Dimensions::new(0.0, 0.0, 0.0));
    results.push(TestResult::new(
        "aabb_zero_size_never_hits",
        !point.intersects(&point),
        "degenerate box does not collide with itself",
    ));

    let passthrough = ObstacleShape {
        center: Vec3::new(0.0, 0.5, 0.0),
        dims: Dimensions::new(2.0, 1.0, 2.0),
        rotation: 0.0,
        passthrough: true,
    };
    let set = CollisionSet::build([("rug", &passthrough)], [], 0.3);
    let player = player_box(Vec3::new(0.0, 0.0, 0.0), Dimensions::new(0.6, 1.8, 0.6));
    results.push(TestResult::new(
        "passthrough_never_blocks",
        !set.blocked(&player),
        format!("{} blockers after adding a passthrough rug", set.len()),
    ));

    results
}

// ── 3. Pathfinding ──────────────────────────────────────────────────────

fn validate_pathfinding() -> Vec<TestResult> {
    println!("--- Pathfinding ---");
    let mut results = Vec::new();
    let config = SimConfig::default();
    let footprint = config.default_footprint;

    let block = ObstacleShape {
        center: Vec3::new(0.0, 1.0, 0.0),
        dims: Dimensions::new(2.0, 2.0, 2.0),
        rotation: 0.0,
        passthrough: false,
    };
    let set = CollisionSet::build([("block", &block)], [], 0.3);
    let ctx = NavContext::new(&set, &config.bounds);
    let mut finder = GridPathfinder::new(config.nav.clone());
    finder.set_footprint(footprint);

    match finder.find_path(ctx, (-5.0, 0.0), (5.0, 0.0)) {
        Ok(plan) => {
            let clips = plan
                .waypoints
                .iter()
                .filter(|w| set.blocked(&player_box(Vec3::new(w.x, 0.0, w.z), footprint)))
                .count();
            results.push(TestResult::new(
                "path_around_block",
                plan.complete && clips == 0,
                format!(
                    "{} waypoints, {:.2} m, {} iterations, {} clipping",
                    plan.waypoints.len(),
                    path_length(&plan.waypoints),
                    plan.iterations,
                    clips
                ),
            ));
        }
        Err(e) => results.push(TestResult::new("path_around_block", false, e.to_string())),
    }

    let empty = CollisionSet::new();
    let open = NavContext::new(&empty, &config.bounds);
    match finder.find_path(open, (-6.0, -3.0), (7.0, 4.5)) {
        Ok(plan) => {
            let direct = (13.0f32 * 13.0 + 7.5 * 7.5).sqrt();
            let length = path_length(&plan.waypoints);
            results.push(TestResult::new(
                "straight_line_bound",
                length <= direct * std::f32::consts::SQRT_2,
                format!("{:.2} m vs direct {:.2} m", length, direct),
            ));
        }
        Err(e) => results.push(TestResult::new("straight_line_bound", false, e.to_string())),
    }

    let mut capped = GridPathfinder::new(NavConfig {
        max_iterations: 25,
        ..config.nav.clone()
    });
    capped.set_footprint(footprint);
    match capped.find_path(ctx, (-15.0, -15.0), (15.0, 15.0)) {
        Ok(plan) => results.push(TestResult::new(
            "search_cap_terminates",
            plan.iterations <= 25 && !plan.waypoints.is_empty(),
            format!(
                "{} iterations, complete={}, {} waypoints",
                plan.iterations,
                plan.complete,
                plan.waypoints.len()
            ),
        )),
        Err(e) => results.push(TestResult::new("search_cap_terminates", false, e.to_string())),
    }

    results
}

// ── 4. Rate limiting ────────────────────────────────────────────────────

fn validate_rate_limits() -> Vec<TestResult> {
    println!("--- Rate Limiting ---");
    let mut limiter: RateLimiter<PlayerId> = RateLimiter::new(RateLimitConfig {
        movement: RateLimitPolicy::new(5, 1_000),
        ..RateLimitConfig::default()
    });
    let accepted = (0..5)
        .filter(|i| limiter.allow(1, ActionCategory::Movement, i * 10))
        .count();
    let sixth = limiter.allow(1, ActionCategory::Movement, 100);
    let later = limiter.allow(1, ActionCategory::Movement, 1_000);
    let other = limiter.allow(2, ActionCategory::Movement, 100);

    vec![
        TestResult::new(
            "limit_n_plus_one_rejected",
            accepted == 5 && !sixth,
            format!("{} accepted, sixth accepted={}", accepted, sixth),
        ),
        TestResult::new(
            "limit_window_expires",
            later,
            "accepted again once the window has passed",
        ),
        TestResult::new("limit_per_player", other, "second player unaffected"),
        TestResult::new(
            "seat_overflow_reuses_last",
            allocate_slot("bench", 3, &[0, 1, 2], false) == Ok(2),
            "fourth sit on a full 3-seat bench lands on seat 2",
        ),
    ]
}

// ── 5. Scenarios ────────────────────────────────────────────────────────

fn spawn(sim: &mut Simulation, player: PlayerId, id: &str, model: &str, center: Vec3, dims: Dimensions) -> Result<(), CommandError> {
    sim.process(
        player,
        ClientCommand::SpawnObstacle(ObstacleSpec {
            id: id.into(),
            position: center,
            dimensions: dims,
            rotation: 0.0,
            passthrough: false,
            model: model.into(),
            scale: 1.0,
            kind: None,
        }),
    )
}

fn validate_scenarios(config: &SimConfig) -> Vec<TestResult> {
    println!("--- Scenarios ---");
    let mut results = Vec::new();
    results.push(scenario_crossing(config));
    results.push(scenario_bench(config));
    results.push(scenario_throttle(config));
    results.push(scenario_wire(config));
    results.push(scenario_paced_loop(config));
    results
}

fn scenario_crossing(config: &SimConfig) -> TestResult {
    let mut sim = Simulation::new(config.clone());
    let outcome = (|| -> Result<(f32, bool), CommandError> {
        let id = sim.connect_at(-5.0, 0.0)?;
        let center = Vec3::new(0.0, 1.0, 0.0);
        let dims = Dimensions::new(2.0, 2.0, 2.0);
        spawn(&mut sim, id, "block", "models/crate.glb", center, dims)?;
        sim.process(id, ClientCommand::MoveTo { x: 5.0, z: 0.0 })?;
        let block = Aabb::from_center(center, dims);
        let mut clipped = false;
        for _ in 0..400 {
            sim.tick();
            let Some(p) = sim.player(id) else {
                break;
            };
            clipped |= p.bounds().intersects(&block);
            if !p.is_moving() {
                break;
            }
        }
        let end = sim.player(id).map(|p| p.position).unwrap_or_default();
        Ok((((end.x - 5.0).powi(2) + end.z.powi(2)).sqrt(), clipped))
    })();
    match outcome {
        Ok((miss, clipped)) => TestResult::new(
            "scenario_crossing",
            miss < 0.06 && !clipped,
            format!("ended {:.3} m from (5, 0) after {} ticks, clipped={}", miss, sim.tick_count(), clipped),
        ),
        Err(e) => TestResult::new("scenario_crossing", false, e.to_string()),
    }
}

fn scenario_bench(config: &SimConfig) -> TestResult {
    let mut sim = Simulation::new(config.clone());
    let outcome = (|| -> Result<Vec<(u32, f32)>, CommandError> {
        let ids = [
            sim.connect_at(-1.0, 1.2)?,
            sim.connect_at(0.0, 1.2)?,
            sim.connect_at(1.0, 1.2)?,
        ];
        spawn(
            &mut sim,
            ids[0],
            "bench",
            "models/park_bench.glb",
            Vec3::new(0.0, 0.25, 0.0),
            Dimensions::new(2.2, 0.5, 0.5),
        )?;
        let mut seats = Vec::new();
        for id in ids {
            sim.process(
                id,
                ClientCommand::PlayerSit {
                    furniture_id: "bench".into(),
                    live_box: None,
                },
            )?;
            if let Some(p) = sim.player(id) {
                if let InteractionState::Sitting { seat, .. } = p.state {
                    seats.push((seat, p.position.x));
                }
            }
        }
        Ok(seats)
    })();
    match outcome {
        Ok(seats) => {
            let indices: Vec<u32> = seats.iter().map(|s| s.0).collect();
            let spread = seats.windows(2).all(|w| w[0].1 < w[1].1);
            TestResult::new(
                "scenario_bench_three_sits",
                indices == [0, 1, 2] && spread,
                format!("seats {:?}", seats),
            )
        }
        Err(e) => TestResult::new("scenario_bench_three_sits", false, e.to_string()),
    }
}

fn scenario_throttle(config: &SimConfig) -> TestResult {
    let mut sim = Simulation::new(config.clone());
    let id = match sim.connect_at(0.0, 0.0) {
        Ok(id) => id,
        Err(e) => return TestResult::new("scenario_31_moves", false, e.to_string()),
    };
    let max = config.rate_limits.movement.max_actions;
    for _ in 0..=max {
        sim.submit(id, ClientCommand::MoveTo { x: 1.0, z: 1.0 });
    }
    sim.tick();
    let throttled = sim
        .drain_outbox()
        .iter()
        .filter(|o| matches!(o.event, ServerEvent::Throttled { .. }))
        .count();
    TestResult::new(
        "scenario_31_moves",
        throttled == 1,
        format!("{} of {} move_to throttled", throttled, max + 1),
    )
}

fn scenario_wire(config: &SimConfig) -> TestResult {
    let mut sim = Simulation::new(config.clone());
    let id = match sim.connect_at(0.0, 0.0) {
        Ok(id) => id,
        Err(e) => return TestResult::new("scenario_wire_commands", false, e.to_string()),
    };
    sim.drain_outbox();
    let good = serde_json::json!({ "type": "move_to", "x": 3.0, "z": 0.0 }).to_string();
    sim.submit_json(id, &good);
    sim.submit_json(id, r#"{ "type": "teleport", "x": 3.0 }"#);
    sim.tick();

    let out = sim.drain_outbox();
    let rejected = out
        .iter()
        .filter(|o| matches!(o.event, ServerEvent::Rejected { .. }))
        .count();
    let encoded = out.iter().filter_map(|o| o.event.to_json().ok()).count();
    let moving = sim.player(id).map_or(false, |p| p.is_moving());
    TestResult::new(
        "scenario_wire_commands",
        rejected == 1 && moving && encoded == out.len(),
        format!(
            "{} events encoded, {} rejected, moving={}",
            encoded, rejected, moving
        ),
    )
}

fn scenario_paced_loop(config: &SimConfig) -> TestResult {
    let mut sim = Simulation::new(config.clone());
    sim.connect();
    sim.drain_outbox();
    let mut states = 0;
    runtime::run_paced(&mut sim, 5, |out| {
        if matches!(out.event, ServerEvent::WorldState { .. }) {
            states += 1;
        }
    });
    TestResult::new(
        "scenario_paced_loop",
        states == 5,
        format!("{} world_state broadcasts over 5 paced ticks", states),
    )
}

// ── 6. File store ───────────────────────────────────────────────────────

fn validate_file_store(config: &SimConfig) -> Vec<TestResult> {
    println!("--- Persistence ---");
    let path = std::env::temp_dir().join(format!("plaza-simtest-{}.bin", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let outcome = (|| -> Result<(usize, u32), Box<dyn std::error::Error>> {
        {
            let mut sim = Simulation::bootstrap(config.clone(), Box::new(FileStore::open(&path)?))?;
            let id = sim.connect_at(5.0, 5.0)?;
            spawn(
                &mut sim,
                id,
                "sofa",
                "models/sofa_3seat.glb",
                Vec3::new(0.0, 0.4, 0.0),
                Dimensions::new(2.2, 0.8, 0.9),
            )?;
            if !sim.flush_persistence() {
                return Err("persistence worker stopped".into());
            }
        }
        let sim = Simulation::bootstrap(config.clone(), Box::new(FileStore::open(&path)?))?;
        let seats = sim
            .world()
            .obstacle("sofa")
            .map(|o| o.class.seat_capacity)
            .unwrap_or(0);
        Ok((sim.world().obstacles().count(), seats))
    })();
    let _ = std::fs::remove_file(&path);

    match outcome {
        Ok((count, seats)) => vec![TestResult::new(
            "file_store_round_trip",
            count == 1 && seats == 3,
            format!("{} obstacle reloaded with {} seats", count, seats),
        )],
        Err(e) => vec![TestResult::new("file_store_round_trip", false, e.to_string())],
    }
}
