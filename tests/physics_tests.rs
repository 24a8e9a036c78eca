use std::sync::Arc;

use approx::assert_relative_eq;
use ccd_physics::{
    ActivationState, BodyHandle, BroadphaseType, CcdConstructionInfo, CollisionShape, ConstraintType,
    DefaultMotionState, MotionState, PhysicsError, PhysicsWorld, Quaternion, SimulationConfig, Transform, Vector3,
};

const DT: f32 = 1.0 / 60.0;

fn cube(half: f32) -> Arc<CollisionShape> {
    Arc::new(CollisionShape::new_box(Vector3::repeat(half)).unwrap())
}

fn sphere(radius: f32) -> Arc<CollisionShape> {
    Arc::new(CollisionShape::new_sphere(radius).unwrap())
}

/// Static slab whose top face is the plane y = 0
fn add_ground(world: &mut PhysicsWorld) -> BodyHandle {
    let shape = Arc::new(CollisionShape::new_box(Vector3::new(50.0, 10.0, 50.0)).unwrap());
    world
        .add_body(CcdConstructionInfo::fixed(
            shape,
            Transform::from_position(Vector3::new(0.0, -10.0, 0.0)),
        ))
        .unwrap()
}

fn weightless_world() -> PhysicsWorld {
    let mut world = PhysicsWorld::new();
    world.set_gravity(Vector3::zeros()).unwrap();
    world
}

fn run(world: &mut PhysicsWorld, steps: usize) {
    for _ in 0..steps {
        world.step_simulation(DT).unwrap();
    }
}

#[test]
fn test_free_fall() {
    let mut world = PhysicsWorld::new();
    let body = world
        .add_body(
            CcdConstructionInfo::new(1.0, sphere(1.0), Transform::from_position(Vector3::new(0.0, 10.0, 0.0)))
                .with_damping(0.0, 0.0),
        )
        .unwrap();

    run(&mut world, 60);

    // semi-implicit Euler: y = y0 - g dt^2 n (n + 1) / 2
    let body = world.get_body(body).unwrap();
    assert_relative_eq!(body.get_position().y, 10.0 - 10.0 * DT * DT * 1830.0, epsilon = 1e-3);
    assert_relative_eq!(body.get_linear_velocity().y, -10.0, epsilon = 1e-3);
    assert_eq!(body.get_activation_state(), ActivationState::Active);
    assert_eq!(world.get_step_count(), 60);
}

#[test]
fn test_static_body_never_moves() {
    let mut world = PhysicsWorld::new();
    let start = Transform::new(
        Vector3::new(1.0, 2.0, 3.0),
        Quaternion::from_euler_angles(0.1, 0.2, 0.3),
    );
    let fixed = world.add_body(CcdConstructionInfo::fixed(cube(1.0), start)).unwrap();
    world
        .add_body(CcdConstructionInfo::new(
            5.0,
            cube(0.5),
            Transform::from_position(Vector3::new(1.0, 5.0, 3.0)),
        ))
        .unwrap();

    world.apply_central_impulse(fixed, Vector3::new(100.0, 0.0, 0.0)).unwrap();
    world.apply_torque(fixed, Vector3::new(0.0, 50.0, 0.0)).unwrap();
    run(&mut world, 300);

    let body = world.get_body(fixed).unwrap();
    assert_eq!(body.get_mass(), 0.0);
    assert_eq!(body.get_inverse_mass(), 0.0);
    assert_eq!(body.get_position(), start.position);
    assert_eq!(body.get_rotation(), start.rotation);
}

#[test]
fn test_box_rests_on_ground() {
    let mut world = PhysicsWorld::new();
    let ground = add_ground(&mut world);
    let body = world
        .add_body(CcdConstructionInfo::new(
            1.0,
            cube(1.0),
            Transform::from_position(Vector3::new(0.0, 1.5, 0.0)),
        ))
        .unwrap();

    run(&mut world, 120);

    assert_eq!(world.overlapping_pair_count(), 1);
    assert!(world.contact_count() > 0);
    let manifold = world.manifolds().next().unwrap();
    assert!(manifold.num_contacts() <= 4);
    assert!(manifold.bodies() == (ground, body) || manifold.bodies() == (body, ground));

    let body = world.get_body(body).unwrap();
    assert_relative_eq!(body.get_position().y, 1.0, epsilon = 0.05);
    assert!(body.get_linear_velocity().norm() < 0.1);
}

#[test]
fn test_stack_comes_to_rest() {
    let mut world = PhysicsWorld::new();
    add_ground(&mut world);
    let boxes: Vec<BodyHandle> = (0..3)
        .map(|i| {
            let y = 1.05 + 2.05 * i as f32;
            world
                .add_body(CcdConstructionInfo::new(
                    1.0,
                    cube(1.0),
                    Transform::from_position(Vector3::new(0.0, y, 0.0)),
                ))
                .unwrap()
        })
        .collect();

    run(&mut world, 600);

    let config = world.get_config().clone();
    let rest: Vec<Vector3> = boxes
        .iter()
        .map(|h| {
            let body = world.get_body(*h).unwrap();
            assert!(body.get_linear_velocity().norm() < config.linear_sleep_threshold);
            assert!(body.get_angular_velocity().norm() < config.angular_sleep_threshold);
            body.get_position()
        })
        .collect();

    for (i, position) in rest.iter().enumerate() {
        assert_relative_eq!(position.y, 1.0 + 2.0 * i as f32, epsilon = 0.15);
        assert_relative_eq!(position.x, 0.0, epsilon = 0.05);
        assert_relative_eq!(position.z, 0.0, epsilon = 0.05);
    }

    run(&mut world, 60);
    for (h, before) in boxes.iter().zip(&rest) {
        let body = world.get_body(*h).unwrap();
        assert!(body.is_finite());
        assert_relative_eq!(body.get_position(), *before, epsilon = 1e-3);
    }
}

#[test]
fn test_deactivation_lifecycle() {
    let mut world = weightless_world();
    world.set_deactivation_time(0.5).unwrap();
    let body = world
        .add_body(CcdConstructionInfo::new(1.0, cube(0.5), Transform::identity()))
        .unwrap();

    let mut steps = 0;
    while world.get_body(body).unwrap().get_activation_state() == ActivationState::Active {
        world.step_simulation(DT).unwrap();
        steps += 1;
        assert!(steps < 100, "body never became sleepy");
    }
    assert_eq!(
        world.get_body(body).unwrap().get_activation_state(),
        ActivationState::WantsDeactivation
    );
    assert!(world.get_body(body).unwrap().get_deactivation_time() > 0.5);

    world.step_simulation(DT).unwrap();
    assert_eq!(
        world.get_body(body).unwrap().get_activation_state(),
        ActivationState::IslandSleeping
    );

    // sleeping bodies are not integrated
    let position = world.get_body(body).unwrap().get_position();
    run(&mut world, 10);
    assert_eq!(world.get_body(body).unwrap().get_position(), position);

    world.apply_central_impulse(body, Vector3::new(0.0, 0.0, 1.0)).unwrap();
    let woken = world.get_body(body).unwrap();
    assert_eq!(woken.get_activation_state(), ActivationState::Active);
    assert_eq!(woken.get_deactivation_time(), 0.0);

    world.step_simulation(DT).unwrap();
    assert!(world.get_body(body).unwrap().get_position().z > position.z);
}

#[test]
fn test_deactivation_can_be_disabled() {
    let mut config = SimulationConfig::default();
    config.gravity = Vector3::zeros();
    config.deactivation_enabled = false;
    let mut world = PhysicsWorld::with_config(config).unwrap();
    let body = world
        .add_body(CcdConstructionInfo::new(1.0, cube(0.5), Transform::identity()))
        .unwrap();

    run(&mut world, 200);
    assert_eq!(world.get_body(body).unwrap().get_activation_state(), ActivationState::Active);
}

#[test]
fn test_point_to_point_joins_pivots() {
    let mut world = weightless_world();
    let a = world
        .add_body(CcdConstructionInfo::new(1.0, sphere(0.5), Transform::identity()).with_damping(0.0, 0.0))
        .unwrap();
    let b = world
        .add_body(
            CcdConstructionInfo::new(1.0, sphere(0.5), Transform::from_position(Vector3::new(2.2, 0.0, 0.0)))
                .with_damping(0.0, 0.0),
        )
        .unwrap();
    world.set_linear_velocity(b, Vector3::new(0.0, 1.0, 0.0)).unwrap();

    let joint = world
        .add_point_to_point(a, Some(b), Vector3::new(1.0, 0.0, 0.0), Vector3::new(-1.0, 0.0, 0.0))
        .unwrap();
    world
        .get_constraint_mut(joint)
        .unwrap()
        .as_point_to_point_mut()
        .unwrap()
        .set_tau(1.0)
        .unwrap();

    run(&mut world, 60);

    let tr_a = *world.get_body(a).unwrap().get_transform();
    let tr_b = *world.get_body(b).unwrap().get_transform();
    let (pivot_a, pivot_b) = world.get_constraint(joint).unwrap().pivots_in_world(&tr_a, Some(&tr_b));
    assert!((pivot_a - pivot_b).norm() < 0.05);

    // momentum is shared, not created
    let total = world.get_body(a).unwrap().get_linear_velocity() + world.get_body(b).unwrap().get_linear_velocity();
    assert_relative_eq!(total.y, 1.0, epsilon = 0.05);
}

#[test]
fn test_hinge_keeps_body_on_its_axis() {
    let mut world = PhysicsWorld::new();
    let body = world
        .add_body(
            CcdConstructionInfo::new(1.0, cube(0.5), Transform::from_position(Vector3::new(1.0, 5.0, 0.0)))
                .with_damping(0.0, 0.0),
        )
        .unwrap();
    let hinge = world
        .create_constraint(
            body,
            None,
            ConstraintType::Hinge,
            Vector3::new(-1.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
        )
        .unwrap();
    assert_eq!(world.get_constraint(hinge).unwrap().constraint_type(), ConstraintType::Hinge);

    let pivot = Vector3::new(0.0, 5.0, 0.0);
    let mut lowest = f32::MAX;
    for _ in 0..120 {
        world.step_simulation(DT).unwrap();
        let rb = world.get_body(body).unwrap();
        lowest = lowest.min(rb.get_position().y);

        // the center keeps its distance to the pivot and stays in the swing plane
        assert_relative_eq!((rb.get_position() - pivot).norm(), 1.0, epsilon = 0.1);
        assert_relative_eq!(rb.get_position().z, 0.0, epsilon = 0.05);
        let spin = rb.get_angular_velocity();
        assert!(spin.x.abs() < 0.1 && spin.y.abs() < 0.1);
    }
    assert!(lowest < 4.5);

    let rb = world.get_body(body).unwrap();
    let (pivot_a, pivot_b) = world
        .get_constraint(hinge)
        .unwrap()
        .pivots_in_world(rb.get_transform(), None);
    assert!((pivot_a - pivot_b).norm() < 0.1);
}

#[test]
fn test_constraint_errors() {
    let mut world = weightless_world();
    let a = world
        .add_body(CcdConstructionInfo::new(1.0, cube(0.5), Transform::identity()))
        .unwrap();
    let b = world
        .add_body(CcdConstructionInfo::new(
            1.0,
            cube(0.5),
            Transform::from_position(Vector3::new(3.0, 0.0, 0.0)),
        ))
        .unwrap();

    assert!(matches!(
        world.create_constraint(a, Some(a), ConstraintType::PointToPoint, Vector3::zeros(), Vector3::z()),
        Err(PhysicsError::InvalidParameter(_))
    ));
    assert!(matches!(
        world.create_constraint(a, None, ConstraintType::Hinge, Vector3::zeros(), Vector3::zeros()),
        Err(PhysicsError::InvalidParameter(_))
    ));

    let joint = world
        .create_constraint(a, Some(b), ConstraintType::PointToPoint, Vector3::new(1.5, 0.0, 0.0), Vector3::z())
        .unwrap();
    assert_eq!(world.constraint_count(), 1);
    assert!(world.remove_constraint(joint).is_some());
    assert!(world.remove_constraint(joint).is_none());
    assert_eq!(world.get_constraint(joint).err(), Some(PhysicsError::UnknownConstraintId(joint)));
    assert!(world.get_constraint_mut(joint).is_err());
}

#[test]
fn test_remove_body_cleans_up() {
    let mut world = PhysicsWorld::new();
    add_ground(&mut world);
    let body = world
        .add_body(CcdConstructionInfo::new(
            1.0,
            cube(1.0),
            Transform::from_position(Vector3::new(0.0, 1.0, 0.0)),
        ))
        .unwrap();
    let other = world
        .add_body(CcdConstructionInfo::new(
            1.0,
            cube(1.0),
            Transform::from_position(Vector3::new(5.0, 1.0, 0.0)),
        ))
        .unwrap();
    world
        .create_constraint(body, Some(other), ConstraintType::PointToPoint, Vector3::new(2.5, 0.0, 0.0), Vector3::z())
        .unwrap();

    run(&mut world, 10);
    assert!(world.overlapping_pair_count() >= 2);

    assert!(world.remove_body(body).is_some());
    assert_eq!(world.body_count(), 2);
    assert_eq!(world.constraint_count(), 0);
    assert!(world
        .broadphase()
        .pair_cache()
        .iter()
        .all(|pair| pair.owners().0 != body && pair.owners().1 != body));

    assert!(world.remove_body(body).is_none());
    assert!(!world.contains_body(body));
    assert_eq!(world.get_body(body).err(), Some(PhysicsError::UnknownBody(body)));
    assert_eq!(
        world.set_linear_velocity(body, Vector3::x()),
        Err(PhysicsError::UnknownBody(body))
    );

    run(&mut world, 10);
    assert_eq!(world.overlapping_pair_count(), 1);
}

#[test]
fn test_world_capacity_is_transactional() {
    let config = SimulationConfig {
        broadphase: BroadphaseType::AxisSweep { max_proxies: 2 },
        ..SimulationConfig::default()
    };
    let mut world = PhysicsWorld::with_config(config).unwrap();
    for i in 0..2 {
        world
            .add_body(CcdConstructionInfo::new(
                1.0,
                cube(0.5),
                Transform::from_position(Vector3::new(3.0 * i as f32, 0.0, 0.0)),
            ))
            .unwrap();
    }

    let err = world.add_body(CcdConstructionInfo::new(1.0, cube(0.5), Transform::identity()));
    assert_eq!(err, Err(PhysicsError::CapacityExceeded { capacity: 2 }));
    assert_eq!(world.body_count(), 2);
}

#[test]
fn test_invalid_configuration() {
    let config = SimulationConfig {
        time_step: -1.0,
        ..SimulationConfig::default()
    };
    assert!(matches!(
        PhysicsWorld::with_config(config),
        Err(PhysicsError::InvalidParameter(_))
    ));

    let mut world = PhysicsWorld::new();
    assert!(world.set_gravity(Vector3::new(f32::NAN, 0.0, 0.0)).is_err());
    assert!(world.set_deactivation_time(-1.0).is_err());
    assert!(matches!(
        world.add_body(CcdConstructionInfo::new(-1.0, cube(1.0), Transform::identity())),
        Err(PhysicsError::InvalidParameter(_))
    ));
}

#[test]
fn test_step_time_handling() {
    let mut world = PhysicsWorld::new();
    assert!(world.step_simulation(-1.0).is_err());
    assert!(world.step_simulation(f32::NAN).is_err());
    world.step_simulation(0.0).unwrap();
    assert_eq!(world.get_step_count(), 0);

    assert_eq!(world.step(0.04).unwrap(), 2);
    // excess beyond the sub-step budget is dropped
    assert_eq!(world.step(1.0).unwrap(), world.get_config().max_substeps);
    assert_eq!(world.step(0.0).unwrap(), 0);
    assert_eq!(world.get_step_count(), 12);
    assert!(world.step(-0.5).is_err());
}

#[test]
fn test_ray_test_finds_nearest_body() {
    let mut world = PhysicsWorld::new();
    let near = world
        .add_body(CcdConstructionInfo::new(
            1.0,
            sphere(1.0),
            Transform::from_position(Vector3::new(0.0, 0.0, 0.0)),
        ))
        .unwrap();
    world
        .add_body(CcdConstructionInfo::new(
            1.0,
            sphere(1.0),
            Transform::from_position(Vector3::new(4.0, 0.0, 0.0)),
        ))
        .unwrap();

    let hit = world
        .ray_test(Vector3::new(-5.0, 0.0, 0.0), Vector3::new(10.0, 0.0, 0.0))
        .unwrap();
    assert_eq!(hit.body, near);
    assert_relative_eq!(hit.point, Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-3);
    assert_relative_eq!(hit.normal, Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-3);

    assert!(world
        .ray_test(Vector3::new(-5.0, 5.0, 0.0), Vector3::new(10.0, 5.0, 0.0))
        .is_none());
}

#[test]
fn test_picking_drags_body() {
    let mut world = weightless_world();
    let body = world
        .add_body(CcdConstructionInfo::new(1.0, cube(1.0), Transform::identity()))
        .unwrap();

    let picked = world.pick_body(Vector3::new(0.0, 0.0, 10.0), Vector3::new(0.0, 0.0, -10.0));
    assert_eq!(picked, Some(body));
    assert_eq!(world.picked_body(), Some(body));
    assert_eq!(world.constraint_count(), 1);
    assert_eq!(
        world.get_body(body).unwrap().get_activation_state(),
        ActivationState::DisableDeactivation
    );

    assert!(world.move_pick(Vector3::new(3.0, 0.0, 1.0)));
    run(&mut world, 120);
    assert!(world.get_body(body).unwrap().get_position().x > 1.0);

    assert_eq!(world.release_pick(), Some(body));
    assert_eq!(world.picked_body(), None);
    assert_eq!(world.constraint_count(), 0);
    assert_eq!(world.get_body(body).unwrap().get_activation_state(), ActivationState::Active);
    assert!(!world.move_pick(Vector3::zeros()));
}

#[test]
fn test_static_bodies_cannot_be_picked() {
    let mut world = PhysicsWorld::new();
    add_ground(&mut world);
    assert_eq!(world.pick_body(Vector3::new(0.0, 10.0, 0.0), Vector3::new(0.0, -10.0, 0.0)), None);
    assert_eq!(world.constraint_count(), 0);
}

#[test]
fn test_motion_state_follows_body() {
    let mut world = PhysicsWorld::new();
    let start = Transform::from_position(Vector3::new(0.0, 10.0, 0.0));
    let body = world
        .add_body(
            CcdConstructionInfo::new(1.0, sphere(0.5), Transform::identity())
                .with_motion_state(Box::new(DefaultMotionState::new(start))),
        )
        .unwrap();

    // the motion state provides the starting transform
    assert_eq!(world.get_body(body).unwrap().get_position(), start.position);

    run(&mut world, 10);
    let rb = world.get_body(body).unwrap();
    let synced = rb.motion_state().unwrap().get_world_transform();
    assert_eq!(synced.position, rb.get_position());
    assert!(synced.position.y < 10.0);
}

#[test]
fn test_kinematic_body_follows_motion_state() {
    let mut world = PhysicsWorld::new();
    let body = world
        .add_body(CcdConstructionInfo::kinematic(
            cube(1.0),
            Box::new(DefaultMotionState::new(Transform::identity())),
        ))
        .unwrap();
    assert!(world.get_body(body).unwrap().is_kinematic());

    for i in 1..=5 {
        let target = Transform::from_position(Vector3::new(0.1 * i as f32, 0.0, 0.0));
        world
            .get_body_mut(body)
            .unwrap()
            .motion_state_mut()
            .unwrap()
            .set_world_transform(&target);
        world.step_simulation(DT).unwrap();
        assert_relative_eq!(world.get_body(body).unwrap().get_position(), target.position, epsilon = 1e-6);
    }

    // the velocity that moved it is derived for the solver
    assert_relative_eq!(world.get_body(body).unwrap().get_linear_velocity().x, 0.1 / DT, epsilon = 1e-2);
}

#[test]
fn test_moving_kinematic_body_wakes_sleeping_body() {
    let mut world = PhysicsWorld::new();
    world.set_deactivation_time(0.5).unwrap();
    add_ground(&mut world);
    let body = world
        .add_body(CcdConstructionInfo::new(1.0, cube(1.0), Transform::from_position(Vector3::new(0.0, 1.0, 0.0))))
        .unwrap();
    let start = Transform::from_position(Vector3::new(-2.5, 1.0, 0.0));
    let pusher = world
        .add_body(CcdConstructionInfo::kinematic(cube(1.0), Box::new(DefaultMotionState::new(start))))
        .unwrap();

    let mut steps = 0;
    while world.get_body(body).unwrap().get_activation_state() != ActivationState::IslandSleeping {
        world.step_simulation(DT).unwrap();
        steps += 1;
        assert!(steps < 600, "body never fell asleep");
    }

    // a kinematic body that stays put does not wake it
    run(&mut world, 30);
    assert_eq!(
        world.get_body(body).unwrap().get_activation_state(),
        ActivationState::IslandSleeping
    );

    // push along +x at 0.5 m/s for four seconds
    let mut target = start;
    for _ in 0..240 {
        target.position.x += 0.5 * DT;
        world
            .get_body_mut(pusher)
            .unwrap()
            .motion_state_mut()
            .unwrap()
            .set_world_transform(&target);
        world.step_simulation(DT).unwrap();
    }

    let pushed = world.get_body(body).unwrap();
    assert_eq!(pushed.get_activation_state(), ActivationState::Active);
    // pushed ahead of the pusher instead of being overlapped by it
    assert!(pushed.get_position().x > target.position.x + 1.8);
    assert!(pushed.is_finite());
}

#[test]
fn test_shape_swap_updates_bounds() {
    let mut world = PhysicsWorld::new();
    add_ground(&mut world);
    let body = world
        .add_body(CcdConstructionInfo::new(
            1.0,
            sphere(0.5),
            Transform::from_position(Vector3::new(0.0, 3.0, 0.0)),
        ))
        .unwrap();
    world.set_gravity(Vector3::zeros()).unwrap();
    run(&mut world, 1);
    assert_eq!(world.overlapping_pair_count(), 0);

    // a larger shape reaches down to the ground
    world.set_collision_shape(body, sphere(4.0)).unwrap();
    run(&mut world, 1);
    assert_eq!(world.overlapping_pair_count(), 1);
    assert_eq!(world.get_body(body).unwrap().get_collision_shape().margin(), 4.0);
}
