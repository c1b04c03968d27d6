use criterion::{black_box, criterion_group, criterion_main, Criterion};

use plaza_logic::collision::{CollisionSet, Dimensions, ObstacleShape, Vec3, WorldBounds};
use plaza_logic::config::NavConfig;
use plaza_logic::pathfinding::{GridPathfinder, NavContext};

fn furnished_plaza() -> Vec<ObstacleShape> {
    let mut shapes = Vec::new();
    for i in -3..=3 {
        for j in -3..=3 {
            if (i + j) % 2 == 0 {
                shapes.push(ObstacleShape {
                    center: Vec3::new(i as f32 * 5.0, 0.5, j as f32 * 5.0),
                    dims: Dimensions::new(2.2, 1.0, 0.8),
                    rotation: (i * j) as f32 * 0.3,
                    passthrough: false,
                });
            }
        }
    }
    shapes
}

fn bench_find_path(c: &mut Criterion) {
    let shapes = furnished_plaza();
    let set = CollisionSet::build(shapes.iter().map(|s| ("bench", s)), [], 0.3);
    let bounds = WorldBounds::square(20.0);
    let ctx = NavContext::new(&set, &bounds);

    c.bench_function("find_path_cold", |b| {
        b.iter(|| {
            let mut nav = GridPathfinder::new(NavConfig::default());
            nav.set_footprint(Dimensions::new(0.6, 1.8, 0.6));
            nav.find_path(ctx, black_box((-18.0, -18.0)), black_box((18.0, 17.0)))
        })
    });

    let mut warm = GridPathfinder::new(NavConfig::default());
    warm.set_footprint(Dimensions::new(0.6, 1.8, 0.6));
    c.bench_function("find_path_warm_cache", |b| {
        b.iter(|| warm.find_path(ctx, black_box((-18.0, 18.0)), black_box((17.0, -18.0))))
    });
}

criterion_group!(benches, bench_find_path);
criterion_main!(benches);
