use std::sync::Arc;

use ccd_physics::collision::{AxisSweep3, BroadPhase, CollisionFilter, ProxyHandle, SimpleBroadphase};
use ccd_physics::math::Aabb;
use ccd_physics::{BodyHandle, CcdConstructionInfo, CollisionShape, PhysicsWorld, Transform, Vector3};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn scattered_bounds(count: usize) -> Vec<Aabb> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|_| {
            let center = Vector3::new(
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-50.0..50.0),
            );
            Aabb::from_center_half_extents(center, Vector3::repeat(rng.gen_range(0.5..2.0)))
        })
        .collect()
}

fn fill(broadphase: &mut dyn BroadPhase, bounds: &[Aabb]) -> Vec<ProxyHandle> {
    bounds
        .iter()
        .enumerate()
        .filter_map(|(i, aabb)| {
            broadphase
                .add_proxy(*aabb, BodyHandle::new(i as u32, 0), CollisionFilter::dynamic())
                .ok()
        })
        .collect()
}

fn jiggle(broadphase: &mut dyn BroadPhase, proxies: &[ProxyHandle], bounds: &[Aabb], frame: usize) {
    let offset = Vector3::new(0.1, -0.05, 0.07) * (frame % 10) as f32;
    for (proxy, aabb) in proxies.iter().zip(bounds) {
        broadphase.set_aabb(*proxy, Aabb::new(aabb.min + offset, aabb.max + offset));
    }
    broadphase.calculate_overlapping_pairs();
}

fn bench_broadphase(c: &mut Criterion) {
    let bounds = scattered_bounds(1000);

    c.bench_function("axis_sweep_update_1000", |b| {
        let mut sweep = AxisSweep3::new(2048);
        let proxies = fill(&mut sweep, &bounds);
        let mut frame = 0;
        b.iter(|| {
            frame += 1;
            jiggle(&mut sweep, &proxies, &bounds, frame);
            black_box(sweep.pair_cache().len())
        })
    });

    c.bench_function("simple_update_1000", |b| {
        let mut simple = SimpleBroadphase::new();
        let proxies = fill(&mut simple, &bounds);
        let mut frame = 0;
        b.iter(|| {
            frame += 1;
            jiggle(&mut simple, &proxies, &bounds, frame);
            black_box(simple.pair_cache().len())
        })
    });
}

fn stacked_world(height: usize) -> PhysicsWorld {
    let mut world = PhysicsWorld::new();
    let ground = Arc::new(CollisionShape::new_box(Vector3::new(50.0, 10.0, 50.0)).unwrap());
    world
        .add_body(CcdConstructionInfo::fixed(
            ground,
            Transform::from_position(Vector3::new(0.0, -10.0, 0.0)),
        ))
        .unwrap();

    let cube = Arc::new(CollisionShape::new_box(Vector3::repeat(1.0)).unwrap());
    for i in 0..height {
        let position = Vector3::new(0.0, 1.0 + 2.0 * i as f32, 0.0);
        world
            .add_body(CcdConstructionInfo::new(1.0, cube.clone(), Transform::from_position(position)))
            .unwrap();
    }
    world
}

fn bench_stacking(c: &mut Criterion) {
    c.bench_function("stack_of_10_step", |b| {
        b.iter_batched(
            || stacked_world(10),
            |mut world| {
                for _ in 0..10 {
                    world.step_simulation(1.0 / 60.0).unwrap();
                }
                world
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_broadphase, bench_stacking);
criterion_main!(benches);
