use std::sync::Arc;

use ccd_physics::{
    ActivationState, BodyHandle, CcdConstructionInfo, CollisionShape, DebugDrawer, DebugMode, PhysicsWorld,
    Transform, Vector3,
};

const NUM_OBJECTS: usize = 60;
const CUBE_HALF_EXTENTS: f32 = 1.0;
const EXTRA_HEIGHT: f32 = -20.0;
const COLUMN_SIZE: usize = 10;

/// Prints every 30th statistics line instead of drawing
#[derive(Default)]
struct TextDrawer {
    reports: u32,
}

impl DebugDrawer for TextDrawer {
    fn draw_line(&mut self, _from: &Vector3, _to: &Vector3, _color: &Vector3) {}

    fn draw_contact_point(
        &mut self,
        _point_on_b: &Vector3,
        _normal_on_b: &Vector3,
        _distance: f32,
        _lifetime: u32,
        _color: &Vector3,
    ) {
    }

    fn report_text(&mut self, text: &str) {
        if self.reports % 30 == 0 {
            println!("{}", text);
        }
        self.reports += 1;
    }

    fn debug_mode(&self) -> DebugMode {
        DebugMode::DRAW_TEXT
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut world = PhysicsWorld::new();

    let ground = Arc::new(CollisionShape::new_box(Vector3::new(50.0, 10.0, 50.0))?);
    world.add_body(CcdConstructionInfo::fixed(
        ground,
        Transform::from_position(Vector3::new(0.0, -10.0 + EXTRA_HEIGHT, 0.0)),
    ))?;

    let cube = Arc::new(CollisionShape::new_box(Vector3::repeat(CUBE_HALF_EXTENTS))?);
    let ball = Arc::new(CollisionShape::new_sphere(CUBE_HALF_EXTENTS - 0.05)?);

    // staggered stack of alternating boxes and spheres
    let mut stack: Vec<BodyHandle> = Vec::with_capacity(NUM_OBJECTS);
    for i in 0..NUM_OBJECTS {
        let row = i / COLUMN_SIZE;
        let col = (i % COLUMN_SIZE) as f32 - (COLUMN_SIZE / 2) as f32;
        let position = Vector3::new(
            col * 2.0 * CUBE_HALF_EXTENTS + (row % 2) as f32 * CUBE_HALF_EXTENTS,
            row as f32 * 2.0 * CUBE_HALF_EXTENTS + CUBE_HALF_EXTENTS + EXTRA_HEIGHT,
            0.0,
        );
        let shape = if i % 2 == 0 { cube.clone() } else { ball.clone() };
        stack.push(world.add_body(CcdConstructionInfo::new(1.0, shape, Transform::from_position(position)))?);
    }

    println!("settling {} bodies", world.body_count());
    for _ in 0..180 {
        world.step(1.0 / 60.0)?;
    }
    report(&world, &stack);

    // shoot a heavy box from the camera into the stack
    let eye = Vector3::new(0.0, -10.0, 40.0);
    let velocity = (Vector3::new(0.0, EXTRA_HEIGHT + 4.0, 0.0) - eye).normalize() * 100.0;
    let projectile = world.add_body(CcdConstructionInfo::new(10.0, cube, Transform::from_position(eye)))?;
    world.set_linear_velocity(projectile, velocity)?;

    world.set_debug_drawer(Some(Box::new(TextDrawer::default())));
    for _ in 0..120 {
        world.step(1.0 / 60.0)?;
    }
    world.set_debug_drawer(None);
    report(&world, &stack);

    Ok(())
}

fn report(world: &PhysicsWorld, stack: &[BodyHandle]) {
    let sleeping = stack
        .iter()
        .filter_map(|h| world.get_body(*h).ok())
        .filter(|b| b.get_activation_state() == ActivationState::IslandSleeping)
        .count();
    let highest = stack
        .iter()
        .filter_map(|h| world.get_body(*h).ok())
        .map(|b| b.get_position().y)
        .fold(f32::MIN, f32::max);

    println!("time {:.2}s", world.get_time());
    println!("  pairs {} contacts {}", world.overlapping_pair_count(), world.contact_count());
    println!("  islands {}", world.islands().island_count());
    println!("  sleeping {}/{}", sleeping, stack.len());
    println!("  highest body at y = {:.2}", highest);
}
