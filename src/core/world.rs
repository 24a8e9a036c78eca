use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, error, trace};

use crate::bodies::{ActivationState, CcdConstructionInfo, RigidBody};
use crate::collision::{create_broadphase, BroadPhase, CollisionDispatcher, CollisionObject, PersistentManifold};
use crate::constraints::{
    prepare_manifold, solve_manifold, Constraint, ConstraintKind, ConstraintType, HingeConstraint,
    Point2PointConstraint,
};
use crate::core::picking::PickState;
use crate::core::{
    BodyHandle, BodyStorage, ConstraintHandle, ConstraintStorage, DebugDrawer, DebugMode, IslandManager,
    SimulationConfig,
};
use crate::error::PhysicsError;
use crate::math::{is_finite, Aabb, Transform, Vector3};
use crate::shapes::CollisionShape;
use crate::Result;

/// The nearest hit of a ray test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// The body that was hit
    pub body: BodyHandle,

    /// The hit point in world space
    pub point: Vector3,

    /// The surface normal at the hit point
    pub normal: Vector3,

    /// Fraction along the tested segment
    pub fraction: f32,
}

/// The main physics world that owns every body, constraint and the collision pipeline
pub struct PhysicsWorld {
    pub(super) bodies: BodyStorage<RigidBody>,
    pub(super) constraints: ConstraintStorage<Constraint>,
    broadphase: Box<dyn BroadPhase>,
    dispatcher: CollisionDispatcher,
    islands: IslandManager,
    config: SimulationConfig,
    debug_drawer: Option<Box<dyn DebugDrawer>>,
    pub(super) pick: Option<PickState>,

    /// Simulated time
    time: f32,

    /// Wall time not yet consumed by `step`
    accumulator: f32,

    step_count: u64,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

fn is_idle(body: &RigidBody) -> bool {
    body.is_static() || !body.is_active()
}

fn needs_solving(body: &RigidBody) -> bool {
    body.is_dynamic() && body.is_active()
}

fn collision_object(body: &RigidBody) -> CollisionObject<'_> {
    CollisionObject {
        shape: body.get_collision_shape().as_ref(),
        transform: *body.get_transform(),
        friction: body.get_friction(),
        restitution: body.get_restitution(),
    }
}

/// Bounds of a body, grown by the contact threshold and swept over the next `dt`
fn body_aabb(body: &RigidBody, threshold: f32, dt: f32) -> Aabb {
    let shape = body.get_collision_shape();
    let current = shape.aabb(body.get_transform()).expand(threshold);
    if dt > 0.0 && !body.is_static() {
        let predicted = shape.aabb(&body.predict_integrated_transform(dt)).expand(threshold);
        current.union(&predicted)
    } else {
        current
    }
}

fn constraint_bodies(
    bodies: &mut BodyStorage<RigidBody>,
    a: BodyHandle,
    b: Option<BodyHandle>,
) -> Option<(&mut RigidBody, Option<&mut RigidBody>)> {
    match b {
        Some(b) => bodies.get_pair_mut(a, b).map(|(a, b)| (a, Some(b))),
        None => bodies.get_mut(a).map(|a| (a, None)),
    }
}

impl PhysicsWorld {
    /// Creates a new physics world with default settings
    pub fn new() -> Self {
        let config = SimulationConfig::default();
        Self::build(config)
    }

    /// Creates a new physics world with the given configuration
    pub fn with_config(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SimulationConfig) -> Self {
        Self {
            bodies: BodyStorage::new(),
            constraints: ConstraintStorage::new(),
            broadphase: create_broadphase(config.broadphase),
            dispatcher: CollisionDispatcher::new(config.dispatcher_info()),
            islands: IslandManager::new(),
            config,
            debug_drawer: None,
            pick: None,
            time: 0.0,
            accumulator: 0.0,
            step_count: 0,
        }
    }

    /// Returns the configuration
    pub fn get_config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Returns the current simulation time
    pub fn get_time(&self) -> f32 {
        self.time
    }

    /// Number of completed steps
    pub fn get_step_count(&self) -> u64 {
        self.step_count
    }

    /// Sets the world gravity; bodies with their own gravity keep it
    pub fn set_gravity(&mut self, gravity: Vector3) -> Result<()> {
        if !is_finite(&gravity) {
            return Err(PhysicsError::InvalidParameter(format!("gravity {:?} is not finite", gravity)));
        }
        self.config.gravity = gravity;
        for (_, body) in self.bodies.iter_mut() {
            body.set_world_gravity(gravity);
        }
        Ok(())
    }

    pub fn get_gravity(&self) -> Vector3 {
        self.config.gravity
    }

    /// Sets how long a body must stay slow before it may sleep
    pub fn set_deactivation_time(&mut self, seconds: f32) -> Result<()> {
        if !(seconds.is_finite() && seconds > 0.0) {
            return Err(PhysicsError::InvalidParameter(format!(
                "deactivation time must be positive, got {}",
                seconds
            )));
        }
        self.config.deactivation_time = seconds;
        Ok(())
    }

    /// Installs or removes the debug drawer
    pub fn set_debug_drawer(&mut self, drawer: Option<Box<dyn DebugDrawer>>) {
        self.debug_drawer = drawer;
    }

    pub fn debug_drawer_mut(&mut self) -> Option<&mut (dyn DebugDrawer + 'static)> {
        self.debug_drawer.as_deref_mut()
    }

    fn debug_mode(&self) -> DebugMode {
        self.debug_drawer.as_ref().map_or(DebugMode::NO_DEBUG, |d| d.debug_mode())
    }

    fn deactivation_enabled(&self) -> bool {
        self.config.deactivation_enabled && !self.debug_mode().contains(DebugMode::NO_DEACTIVATION)
    }

    // bodies

    /// Adds a body built from `info` and registers its broadphase proxy
    pub fn add_body(&mut self, info: CcdConstructionInfo) -> Result<BodyHandle> {
        let mut body = RigidBody::new(info)?;
        body.set_world_gravity(self.config.gravity);
        let aabb = body_aabb(&body, self.config.contact_breaking_threshold, 0.0);
        let filter = body.get_collision_filter();
        let shape_type = body.get_collision_shape().shape_type();

        let handle = self.bodies.add(body);
        match self.broadphase.add_proxy(aabb, handle, filter) {
            Ok(proxy) => {
                if let Some(body) = self.bodies.get_mut(handle) {
                    body.set_broadphase_handle(Some(proxy));
                }
            }
            Err(err) => {
                self.bodies.remove(handle);
                return Err(err);
            }
        }

        debug!("added {} with a {:?} shape", handle, shape_type);
        Ok(handle)
    }

    /// Removes a body together with its proxy, its constraints and any pick on it.
    /// Unknown handles are ignored.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Option<RigidBody> {
        if !self.bodies.contains(handle) {
            return None;
        }
        if self.pick.as_ref().is_some_and(|pick| pick.body == handle) {
            self.release_pick();
        }

        let attached: Vec<ConstraintHandle> = self
            .constraints
            .iter()
            .filter(|(_, c)| c.involves_body(handle))
            .map(|(h, _)| h)
            .collect();
        for constraint in attached {
            self.remove_constraint(constraint);
        }

        let body = self.bodies.remove(handle)?;
        if let Some(proxy) = body.get_broadphase_handle() {
            self.broadphase.remove_proxy(proxy);
        }
        debug!("removed {}", handle);
        Some(body)
    }

    /// Gets a body by handle
    pub fn get_body(&self, handle: BodyHandle) -> Result<&RigidBody> {
        self.bodies.get(handle).ok_or(PhysicsError::UnknownBody(handle))
    }

    /// Gets a mutable body by handle
    pub fn get_body_mut(&mut self, handle: BodyHandle) -> Result<&mut RigidBody> {
        self.bodies.get_mut(handle).ok_or(PhysicsError::UnknownBody(handle))
    }

    /// Returns true if the handle refers to a live body
    pub fn contains_body(&self, handle: BodyHandle) -> bool {
        self.bodies.contains(handle)
    }

    /// Live bodies in handle order
    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &RigidBody)> + '_ {
        self.bodies.iter()
    }

    pub fn body_handles(&self) -> Vec<BodyHandle> {
        self.bodies.handles()
    }

    /// Returns the number of bodies in the world
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Replaces a body's shape and drops the narrow phase state cached for it
    pub fn set_collision_shape(&mut self, handle: BodyHandle, shape: Arc<CollisionShape>) -> Result<()> {
        let threshold = self.config.contact_breaking_threshold;
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::UnknownBody(handle))?;
        debug!(
            "{} shape {:?} -> {:?}",
            handle,
            body.get_collision_shape().shape_type(),
            shape.shape_type()
        );
        body.set_collision_shape(shape);
        body.activate();
        if let Some(proxy) = body.get_broadphase_handle() {
            self.broadphase.clean_proxy_from_pairs(proxy);
            self.broadphase.set_aabb(proxy, body_aabb(body, threshold, 0.0));
        }
        Ok(())
    }

    /// Moves a body and wakes it
    pub fn set_world_transform(&mut self, handle: BodyHandle, transform: Transform) -> Result<()> {
        if !transform.is_finite() {
            return Err(PhysicsError::InvalidParameter(format!("transform {:?} is not finite", transform)));
        }
        let threshold = self.config.contact_breaking_threshold;
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::UnknownBody(handle))?;
        body.set_transform(transform);
        if let Some(proxy) = body.get_broadphase_handle() {
            self.broadphase.set_aabb(proxy, body_aabb(body, threshold, 0.0));
        }
        Ok(())
    }

    pub fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vector3) -> Result<()> {
        self.get_body_mut(handle)?.set_linear_velocity(velocity);
        Ok(())
    }

    pub fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: Vector3) -> Result<()> {
        self.get_body_mut(handle)?.set_angular_velocity(velocity);
        Ok(())
    }

    pub fn apply_central_impulse(&mut self, handle: BodyHandle, impulse: Vector3) -> Result<()> {
        self.get_body_mut(handle)?.apply_central_impulse(impulse);
        Ok(())
    }

    /// Applies an impulse at `rel_pos` from the body's center of mass
    pub fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vector3, rel_pos: Vector3) -> Result<()> {
        self.get_body_mut(handle)?.apply_impulse(impulse, rel_pos);
        Ok(())
    }

    pub fn apply_central_force(&mut self, handle: BodyHandle, force: Vector3) -> Result<()> {
        self.get_body_mut(handle)?.apply_central_force(force);
        Ok(())
    }

    pub fn apply_force(&mut self, handle: BodyHandle, force: Vector3, rel_pos: Vector3) -> Result<()> {
        self.get_body_mut(handle)?.apply_force(force, rel_pos);
        Ok(())
    }

    pub fn apply_torque(&mut self, handle: BodyHandle, torque: Vector3) -> Result<()> {
        self.get_body_mut(handle)?.apply_torque(torque);
        Ok(())
    }

    pub fn force_activation_state(&mut self, handle: BodyHandle, state: ActivationState) -> Result<()> {
        self.get_body_mut(handle)?.force_activation_state(state);
        Ok(())
    }

    // constraints

    /// Creates a constraint from a pivot and axis in A's frame. The matching
    /// B side data is derived from the current transforms, so the constraint
    /// starts out satisfied. Without `body_b` the constraint holds A to the world.
    pub fn create_constraint(
        &mut self,
        body_a: BodyHandle,
        body_b: Option<BodyHandle>,
        constraint_type: ConstraintType,
        pivot_in_a: Vector3,
        axis_in_a: Vector3,
    ) -> Result<ConstraintHandle> {
        let (tr_a, tr_b) = self.constraint_frames(body_a, body_b)?;
        let pivot_in_b = tr_b.inverse_transform_point(&tr_a.transform_point(&pivot_in_a));

        let kind = match constraint_type {
            ConstraintType::PointToPoint => {
                ConstraintKind::PointToPoint(Point2PointConstraint::new(pivot_in_a, pivot_in_b))
            }
            ConstraintType::Hinge => {
                let axis_in_b = tr_b.inverse_transform_direction(&tr_a.transform_direction(&axis_in_a));
                let mut hinge = HingeConstraint::new(pivot_in_a, pivot_in_b, axis_in_a, axis_in_b)?;
                hinge.calibrate(&tr_a, &tr_b);
                ConstraintKind::Hinge(hinge)
            }
        };
        Ok(self.insert_constraint(Constraint::new(body_a, body_b, kind)))
    }

    /// Adds a point-to-point constraint with explicit pivots
    pub fn add_point_to_point(
        &mut self,
        body_a: BodyHandle,
        body_b: Option<BodyHandle>,
        pivot_in_a: Vector3,
        pivot_in_b: Vector3,
    ) -> Result<ConstraintHandle> {
        self.constraint_frames(body_a, body_b)?;
        let kind = ConstraintKind::PointToPoint(Point2PointConstraint::new(pivot_in_a, pivot_in_b));
        Ok(self.insert_constraint(Constraint::new(body_a, body_b, kind)))
    }

    /// Adds a hinge with pivots and axes given independently in each body's frame
    pub fn add_hinge(
        &mut self,
        body_a: BodyHandle,
        body_b: Option<BodyHandle>,
        pivot_in_a: Vector3,
        pivot_in_b: Vector3,
        axis_in_a: Vector3,
        axis_in_b: Vector3,
    ) -> Result<ConstraintHandle> {
        let (tr_a, tr_b) = self.constraint_frames(body_a, body_b)?;
        let mut hinge = HingeConstraint::new(pivot_in_a, pivot_in_b, axis_in_a, axis_in_b)?;
        hinge.calibrate(&tr_a, &tr_b);
        Ok(self.insert_constraint(Constraint::new(body_a, body_b, ConstraintKind::Hinge(hinge))))
    }

    fn constraint_frames(&self, body_a: BodyHandle, body_b: Option<BodyHandle>) -> Result<(Transform, Transform)> {
        if body_b == Some(body_a) {
            return Err(PhysicsError::InvalidParameter(format!("{} cannot be constrained to itself", body_a)));
        }
        let tr_a = *self.get_body(body_a)?.get_transform();
        let tr_b = match body_b {
            Some(b) => *self.get_body(b)?.get_transform(),
            None => Transform::identity(),
        };
        Ok((tr_a, tr_b))
    }

    pub(super) fn insert_constraint(&mut self, constraint: Constraint) -> ConstraintHandle {
        let (a, b) = (constraint.get_body_a(), constraint.get_body_b());
        let constraint_type = constraint.constraint_type();
        let handle = self.constraints.add(constraint);
        for body in std::iter::once(a).chain(b) {
            if let Some(body) = self.bodies.get_mut(body) {
                body.activate();
            }
        }
        debug!("created {:?} {} between {} and {:?}", constraint_type, handle, a, b);
        handle
    }

    /// Removes a constraint and wakes its bodies. Unknown handles are ignored.
    pub fn remove_constraint(&mut self, handle: ConstraintHandle) -> Option<Constraint> {
        if self.pick.as_ref().is_some_and(|pick| pick.constraint == handle) {
            let pick = self.pick.take()?;
            if let Some(body) = self.bodies.get_mut(pick.body) {
                body.force_activation_state(ActivationState::Active);
            }
        }

        let constraint = self.constraints.remove(handle)?;
        for body in std::iter::once(constraint.get_body_a()).chain(constraint.get_body_b()) {
            if let Some(body) = self.bodies.get_mut(body) {
                body.activate();
            }
        }
        debug!("removed {}", handle);
        Some(constraint)
    }

    /// Gets a constraint by handle
    pub fn get_constraint(&self, handle: ConstraintHandle) -> Result<&Constraint> {
        self.constraints
            .get(handle)
            .ok_or(PhysicsError::UnknownConstraintId(handle))
    }

    /// Gets a mutable constraint by handle
    pub fn get_constraint_mut(&mut self, handle: ConstraintHandle) -> Result<&mut Constraint> {
        self.constraints
            .get_mut(handle)
            .ok_or(PhysicsError::UnknownConstraintId(handle))
    }

    /// Live constraints in handle order
    pub fn constraints(&self) -> impl Iterator<Item = (ConstraintHandle, &Constraint)> + '_ {
        self.constraints.iter()
    }

    /// Returns the number of constraints in the world
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    // collision state

    /// The broadphase
    pub fn broadphase(&self) -> &dyn BroadPhase {
        self.broadphase.as_ref()
    }

    pub fn dispatcher(&self) -> &CollisionDispatcher {
        &self.dispatcher
    }

    /// Mutable dispatcher, e.g. to register algorithms
    pub fn dispatcher_mut(&mut self) -> &mut CollisionDispatcher {
        &mut self.dispatcher
    }

    /// Number of overlapping broadphase pairs
    pub fn overlapping_pair_count(&self) -> usize {
        self.broadphase.pair_cache().len()
    }

    /// Contact manifolds of all overlapping pairs
    pub fn manifolds(&self) -> impl Iterator<Item = &PersistentManifold> + '_ {
        self.broadphase.pair_cache().iter().filter_map(|pair| pair.manifold())
    }

    /// Total number of contact points
    pub fn contact_count(&self) -> usize {
        self.manifolds().map(|m| m.num_contacts()).sum()
    }

    /// Islands found by the last step
    pub fn islands(&self) -> &IslandManager {
        &self.islands
    }

    /// Finds the nearest body hit by the segment `from -> to`
    pub fn ray_test(&self, from: Vector3, to: Vector3) -> Option<RayHit> {
        if !is_finite(&from) || !is_finite(&to) {
            return None;
        }
        let bounds = Aabb::from_segment(&from, &to);
        let mut best: Option<RayHit> = None;

        for proxy in self.broadphase.query_aabb(&bounds) {
            let Some(owner) = self.broadphase.proxy(proxy).map(|p| p.owner) else {
                continue;
            };
            let Some(body) = self.bodies.get(owner) else {
                continue;
            };
            let Some(hit) = body
                .get_collision_shape()
                .ray_intersect(body.get_transform(), &from, &to)
            else {
                continue;
            };
            if best.map_or(true, |b| hit.fraction < b.fraction) {
                best = Some(RayHit {
                    body: owner,
                    point: from + (to - from) * hit.fraction,
                    normal: hit.normal,
                    fraction: hit.fraction,
                });
            }
        }
        best
    }

    // simulation

    /// Advances by wall time `elapsed` in fixed sub-steps of `config.time_step`.
    ///
    /// Leftover time is carried to the next call; time beyond `max_substeps`
    /// steps is dropped. Returns the number of sub-steps taken.
    pub fn step(&mut self, elapsed: f32) -> Result<u32> {
        if !elapsed.is_finite() || elapsed < 0.0 {
            return Err(PhysicsError::InvalidParameter(format!(
                "elapsed time must be finite and non-negative, got {}",
                elapsed
            )));
        }

        self.accumulator += elapsed;
        let fixed = self.config.time_step;
        let mut steps = 0;
        while self.accumulator >= fixed && steps < self.config.max_substeps {
            self.step_simulation(fixed)?;
            self.accumulator -= fixed;
            steps += 1;
        }
        if self.accumulator >= fixed {
            trace!("dropping {}s of simulation time", self.accumulator);
            self.accumulator = 0.0;
        }
        Ok(steps)
    }

    /// Performs a single step of the physics simulation
    pub fn step_simulation(&mut self, dt: f32) -> Result<()> {
        if dt.is_nan() || dt.is_infinite() || dt < 0.0 {
            return Err(PhysicsError::InvalidParameter(format!(
                "time step must be finite and non-negative, got {}",
                dt
            )));
        }
        if dt == 0.0 {
            return Ok(());
        }

        for (_, body) in self.bodies.iter_mut() {
            if body.is_kinematic() {
                body.update_kinematic(dt);
            }
        }

        self.update_aabbs(dt);
        self.broadphase.calculate_overlapping_pairs();
        self.dispatch_all_pairs();
        self.update_islands();

        for (_, body) in self.bodies.iter_mut() {
            if needs_solving(body) {
                body.integrate_velocities(dt);
                body.apply_damping(dt);
            }
        }

        self.solve_constraints(dt);

        for (_, body) in self.bodies.iter_mut() {
            if needs_solving(body) {
                body.integrate_transform(dt);
            }
        }

        self.update_activation(dt);

        for (_, body) in self.bodies.iter_mut() {
            if needs_solving(body) {
                body.sync_motion_state();
            }
        }

        self.time += dt;
        self.step_count += 1;
        trace!(
            "step {}: {} pairs, {} contacts, {} islands",
            self.step_count,
            self.overlapping_pair_count(),
            self.contact_count(),
            self.islands.island_count()
        );

        self.debug_draw();
        self.check_finite()
    }

    fn update_aabbs(&mut self, dt: f32) {
        let threshold = self.config.contact_breaking_threshold;
        for (_, body) in self.bodies.iter() {
            if !body.is_active() {
                continue;
            }
            if let Some(proxy) = body.get_broadphase_handle() {
                self.broadphase.set_aabb(proxy, body_aabb(body, threshold, dt));
            }
        }
    }

    fn dispatch_all_pairs(&mut self) {
        let bodies = &self.bodies;
        let dispatcher = &self.dispatcher;
        for pair in self.broadphase.pair_cache_mut().iter_mut() {
            let (ha, hb) = pair.owners();
            let (Some(a), Some(b)) = (bodies.get(ha), bodies.get(hb)) else {
                continue;
            };
            if is_idle(a) && is_idle(b) {
                continue;
            }
            dispatcher.process_pair(pair, &collision_object(a), &collision_object(b));
        }
    }

    fn update_islands(&mut self) {
        let dynamic: Vec<BodyHandle> = self
            .bodies
            .iter()
            .filter(|(_, body)| body.is_dynamic())
            .map(|(handle, _)| handle)
            .collect();

        let contacts = self
            .broadphase
            .pair_cache()
            .iter()
            .filter(|pair| pair.contact_count() > 0)
            .map(|pair| pair.owners());
        let joints = self
            .constraints
            .iter()
            .filter_map(|(_, c)| c.get_body_b().map(|b| (c.get_body_a(), b)));
        let links: Vec<_> = contacts.chain(joints).collect();

        // kinematic bodies do not join islands, but a moving one keeps
        // everything it touches awake
        let moving_kinematic = |handle: BodyHandle| {
            self.bodies.get(handle).is_some_and(|body| {
                body.is_kinematic()
                    && (body.get_linear_velocity() != Vector3::zeros() || body.get_angular_velocity() != Vector3::zeros())
            })
        };
        let mut pushed = BTreeSet::new();
        for &(a, b) in links.iter() {
            if moving_kinematic(a) {
                pushed.insert(b);
            }
            if moving_kinematic(b) {
                pushed.insert(a);
            }
        }

        self.islands.build(&dynamic, links);

        let enabled = self.deactivation_enabled();
        for island in self.islands.islands() {
            if island.iter().any(|handle| pushed.contains(handle)) {
                for handle in island {
                    if let Some(body) = self.bodies.get_mut(*handle) {
                        body.activate();
                    }
                }
                continue;
            }

            let all_sleepy = island.iter().all(|handle| {
                self.bodies
                    .get(*handle)
                    .map_or(true, |body| body.get_activation_state().is_sleepy())
            });

            for handle in island {
                let Some(body) = self.bodies.get_mut(*handle) else {
                    continue;
                };
                let state = body.get_activation_state();
                if all_sleepy && enabled {
                    if state != ActivationState::IslandSleeping {
                        body.put_to_sleep();
                    }
                } else if state == ActivationState::IslandSleeping {
                    body.set_activation_state(ActivationState::WantsDeactivation);
                }
            }
        }
    }

    fn solve_constraints(&mut self, dt: f32) {
        let info = self.config.contact_solver_info(dt);

        for pair in self.broadphase.pair_cache_mut().iter_mut() {
            let (ha, hb) = pair.owners();
            let Some(manifold) = pair.manifold.as_mut() else {
                continue;
            };
            if manifold.num_contacts() == 0 {
                continue;
            }
            let Some((a, b)) = self.bodies.get_pair_mut(ha, hb) else {
                continue;
            };
            if needs_solving(a) || needs_solving(b) {
                prepare_manifold(manifold, a, b, &info);
            }
        }

        for (_, constraint) in self.constraints.iter_mut() {
            let (ha, hb) = (constraint.get_body_a(), constraint.get_body_b());
            if let Some((a, b)) = constraint_bodies(&mut self.bodies, ha, hb) {
                constraint.build_jacobian(a, b.as_deref());
            }
        }

        for _ in 0..self.config.solver_iterations {
            for pair in self.broadphase.pair_cache_mut().iter_mut() {
                let (ha, hb) = pair.owners();
                let Some(manifold) = pair.manifold.as_mut() else {
                    continue;
                };
                if manifold.num_contacts() == 0 {
                    continue;
                }
                let Some((a, b)) = self.bodies.get_pair_mut(ha, hb) else {
                    continue;
                };
                if needs_solving(a) || needs_solving(b) {
                    solve_manifold(manifold, a, b, &info);
                }
            }

            for (_, constraint) in self.constraints.iter_mut() {
                let (ha, hb) = (constraint.get_body_a(), constraint.get_body_b());
                let Some((a, b)) = constraint_bodies(&mut self.bodies, ha, hb) else {
                    continue;
                };
                if needs_solving(a) || b.as_deref().is_some_and(needs_solving) {
                    constraint.solve(a, b, dt);
                }
            }
        }
    }

    fn update_activation(&mut self, dt: f32) {
        let enabled = self.deactivation_enabled();
        let linear = self.config.linear_sleep_threshold;
        let angular = self.config.angular_sleep_threshold;
        let deactivation_time = self.config.deactivation_time;

        for (_, body) in self.bodies.iter_mut() {
            if !body.is_dynamic() {
                continue;
            }
            body.update_deactivation(dt, linear, angular);
            if body.wants_sleeping(deactivation_time, enabled) {
                if body.get_activation_state() == ActivationState::Active {
                    body.set_activation_state(ActivationState::WantsDeactivation);
                }
            } else {
                body.set_activation_state(ActivationState::Active);
            }
        }
    }

    fn check_finite(&self) -> Result<()> {
        for (handle, body) in self.bodies.iter() {
            if !body.is_finite() {
                error!("{} has a non-finite state after step {}", handle, self.step_count);
                return Err(PhysicsError::SimulationError(format!(
                    "{} became non-finite in step {}",
                    handle, self.step_count
                )));
            }
        }
        Ok(())
    }

    fn debug_draw(&mut self) {
        let Some(drawer) = self.debug_drawer.as_deref_mut() else {
            return;
        };
        let mode = drawer.debug_mode();
        if mode.is_empty() {
            return;
        }

        if mode.contains(DebugMode::DRAW_WIREFRAME) {
            for (_, body) in self.bodies.iter() {
                draw_body_axes(drawer, body);
            }
        }

        if mode.contains(DebugMode::DRAW_AABB) {
            let color = Vector3::new(1.0, 0.0, 0.0);
            for (_, body) in self.bodies.iter() {
                let proxy = body.get_broadphase_handle().and_then(|p| self.broadphase.proxy(p));
                if let Some(proxy) = proxy {
                    draw_aabb(drawer, &proxy.aabb, &color);
                }
            }
        }

        if mode.contains(DebugMode::DRAW_CONTACT_POINTS) {
            let color = Vector3::new(1.0, 1.0, 0.0);
            for pair in self.broadphase.pair_cache().iter() {
                for point in pair.manifold().map_or(&[][..], |m| m.points()) {
                    drawer.draw_contact_point(
                        &point.position_world_on_b,
                        &point.normal_world_on_b,
                        point.distance,
                        point.lifetime,
                        &color,
                    );
                }
            }
        }

        if mode.contains(DebugMode::DRAW_CONSTRAINTS) {
            for (_, constraint) in self.constraints.iter() {
                let Some(a) = self.bodies.get(constraint.get_body_a()) else {
                    continue;
                };
                let tr_b = constraint
                    .get_body_b()
                    .and_then(|b| self.bodies.get(b))
                    .map(|b| *b.get_transform());
                let (pivot_a, pivot_b) = constraint.pivots_in_world(a.get_transform(), tr_b.as_ref());
                drawer.draw_line(&pivot_a, &pivot_b, &Vector3::new(0.0, 0.0, 1.0));
                if let Some(hinge) = constraint.as_hinge() {
                    let axis = hinge.axis_in_world(a.get_transform());
                    drawer.draw_line(&(pivot_a - axis), &(pivot_a + axis), &Vector3::new(0.0, 1.0, 1.0));
                }
            }
        }

        if mode.contains(DebugMode::DRAW_TEXT) {
            let pairs = self.broadphase.pair_cache().len();
            let contacts: usize = self
                .broadphase
                .pair_cache()
                .iter()
                .map(|pair| pair.contact_count())
                .sum();
            drawer.report_text(&format!(
                "step {} bodies {} pairs {} contacts {} islands {}",
                self.step_count,
                self.bodies.len(),
                pairs,
                contacts,
                self.islands.island_count()
            ));
        }
    }
}

fn activation_color(state: ActivationState) -> Vector3 {
    match state {
        ActivationState::Active => Vector3::new(1.0, 1.0, 1.0),
        ActivationState::IslandSleeping => Vector3::new(0.0, 1.0, 0.0),
        ActivationState::WantsDeactivation => Vector3::new(0.0, 1.0, 1.0),
        ActivationState::DisableDeactivation => Vector3::new(1.0, 0.0, 0.0),
    }
}

fn draw_body_axes(drawer: &mut dyn DebugDrawer, body: &RigidBody) {
    let transform = body.get_transform();
    let radius = body.get_collision_shape().bounding_radius();
    let color = activation_color(body.get_activation_state());
    for axis in [Vector3::x(), Vector3::y(), Vector3::z()] {
        let tip = transform.position + transform.transform_direction(&axis) * radius;
        drawer.draw_line(&transform.position, &tip, &color);
    }
}

fn draw_aabb(drawer: &mut dyn DebugDrawer, aabb: &Aabb, color: &Vector3) {
    let corner = |i: usize| {
        Vector3::new(
            if i & 1 == 0 { aabb.min.x } else { aabb.max.x },
            if i & 2 == 0 { aabb.min.y } else { aabb.max.y },
            if i & 4 == 0 { aabb.min.z } else { aabb.max.z },
        )
    };
    // corners differing in exactly one bit share an edge
    for i in 0..8 {
        for bit in [1, 2, 4] {
            if i & bit == 0 {
                drawer.draw_line(&corner(i), &corner(i | bit), color);
            }
        }
    }
}
