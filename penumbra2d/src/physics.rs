use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::math::Vec2;
use crate::object::ObjectId;

// Rapier stays an implementation detail: nothing below re-exports it.
use rapier2d::prelude::*;

/// Engine-facing rigid body kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyKind {
    Dynamic,
    Kinematic,
    Static,
}

/// Collider geometry in world units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ShapeDesc {
    Circle { radius: f32 },
    Box { size: Vec2 },
    /// Outline normalised to the object's width and centred on the origin,
    /// as produced by [`crate::assets::AssetCache::texture_outline`].
    Polygon { outline: Vec<Vec2>, scale: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub mass: f32,
    pub friction: f32,
    pub elasticity: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            mass: 1.0,
            friction: 1.0,
            elasticity: 0.1,
        }
    }
}

/// Sensor volumes that act on every body overlapping them.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Region {
    /// Damps motion and pushes bodies lighter than `density` upwards.
    Fluid { density: f32 },
    /// Accelerates overlapping bodies by `force`. A negative limit component
    /// leaves that axis unbounded.
    ForceField { force: Vec2, limit: Vec2 },
}

/// Physics description carried by a scene object.
#[derive(Clone, Debug, PartialEq)]
pub struct PhysicsBinding {
    pub body: BodyKind,
    pub shape: ShapeDesc,
    pub material: Material,
    pub region: Option<Region>,
}

impl PhysicsBinding {
    pub fn new(body: BodyKind, shape: ShapeDesc, material: Material) -> Self {
        Self {
            body,
            shape,
            material,
            region: None,
        }
    }

    #[must_use]
    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactPhase {
    Begin,
    End,
}

/// A collision as seen from the object the callback is registered on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Contact {
    pub me: ObjectId,
    pub other: ObjectId,
    pub phase: ContactPhase,
    pub sensor: bool,
}

/// Mutation requested while the world is stepping. Applied once the step ends.
#[derive(Clone, Debug)]
pub enum PhysicsCommand {
    Add {
        id: ObjectId,
        binding: PhysicsBinding,
        center: Vec2,
        rotation: f32,
    },
    Remove(ObjectId),
    SetPosition(ObjectId, Vec2),
    SetVelocity(ObjectId, Vec2),
    ApplyImpulse(ObjectId, Vec2),
}

/// Queue handed to collision callbacks.
#[derive(Debug, Default)]
pub struct PhysicsCommands {
    queue: Vec<PhysicsCommand>,
}

impl PhysicsCommands {
    pub fn push(&mut self, command: PhysicsCommand) {
        self.queue.push(command);
    }

    pub fn remove(&mut self, id: ObjectId) {
        self.push(PhysicsCommand::Remove(id));
    }

    pub fn set_velocity(&mut self, id: ObjectId, velocity: Vec2) {
        self.push(PhysicsCommand::SetVelocity(id, velocity));
    }

    pub fn apply_impulse(&mut self, id: ObjectId, impulse: Vec2) {
        self.push(PhysicsCommand::ApplyImpulse(id, impulse));
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

pub type CollisionCallback = Box<dyn FnMut(&Contact, &mut PhysicsCommands) + Send>;

pub const DEFAULT_QUALITY: u32 = 3;
pub const DEFAULT_GRAVITY: f32 = 10.0;

pub struct PhysicsWorld {
    pipeline: PhysicsPipeline,
    integration_parameters: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: BroadPhase,
    narrow_phase: NarrowPhase,
    rigid_bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,

    event_recv_collision: crossbeam_channel::Receiver<CollisionEvent>,
    event_recv_contact_force: crossbeam_channel::Receiver<ContactForceEvent>,
    event_handler: ChannelEventCollector,

    object_to_body: HashMap<ObjectId, RigidBodyHandle>,
    body_to_object: HashMap<RigidBodyHandle, ObjectId>,
    joints: HashMap<ObjectId, Vec<ImpulseJointHandle>>,

    callbacks: HashMap<ObjectId, CollisionCallback>,
    regions: HashMap<ObjectId, Region>,
    /// (region, body) pairs currently overlapping.
    overlaps: HashSet<(ObjectId, ObjectId)>,
    deferred: PhysicsCommands,
    /// Objects whose bodies were dropped by a deferred `Remove`.
    removed: Vec<ObjectId>,

    gravity: Vec2,
    quality: u32,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    pub fn new() -> Self {
        let (send_col, recv_col) = crossbeam_channel::unbounded();
        let (send_force, recv_force) = crossbeam_channel::unbounded();
        let event_handler = ChannelEventCollector::new(send_col, send_force);

        Self {
            pipeline: PhysicsPipeline::new(),
            integration_parameters: IntegrationParameters::default(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),

            event_recv_collision: recv_col,
            event_recv_contact_force: recv_force,
            event_handler,

            object_to_body: HashMap::new(),
            body_to_object: HashMap::new(),
            joints: HashMap::new(),

            callbacks: HashMap::new(),
            regions: HashMap::new(),
            overlaps: HashSet::new(),
            deferred: PhysicsCommands::default(),
            removed: Vec::new(),

            gravity: Vec2::new(0.0, DEFAULT_GRAVITY),
            quality: DEFAULT_QUALITY,
        }
    }

    pub fn with_gravity(gravity: Vec2) -> Self {
        let mut w = Self::new();
        w.gravity = gravity;
        w
    }

    /// Drop every body, collider, joint and callback, keeping gravity and quality.
    pub fn clear(&mut self) {
        let gravity = self.gravity;
        let quality = self.quality;
        *self = Self::with_gravity(gravity);
        self.quality = quality;
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = gravity;
    }

    pub fn gravity(&self) -> Vec2 {
        self.gravity
    }

    /// Number of substeps each update is split into.
    pub fn set_quality(&mut self, quality: u32) {
        self.quality = quality.max(1);
    }

    pub fn quality(&self) -> u32 {
        self.quality
    }

    pub fn body_count(&self) -> usize {
        self.object_to_body.len()
    }

    pub fn has_body(&self, id: ObjectId) -> bool {
        self.object_to_body.contains_key(&id)
    }

    /// Create (or replace) the body for `id`, centred at `center` with `rotation` in degrees.
    pub fn add(
        &mut self,
        id: ObjectId,
        binding: &PhysicsBinding,
        center: Vec2,
        rotation: f32,
    ) -> Result<()> {
        let shape = to_rapier_shape(&binding.shape)?;
        self.remove(id);

        let rb_type = match binding.body {
            BodyKind::Dynamic => RigidBodyType::Dynamic,
            BodyKind::Kinematic => RigidBodyType::KinematicPositionBased,
            BodyKind::Static => RigidBodyType::Fixed,
        };

        let mut builder = RigidBodyBuilder::new(rb_type)
            .translation(vector![center.x, center.y])
            .rotation(rotation.to_radians());
        if binding.body == BodyKind::Dynamic {
            builder = builder.ccd_enabled(true);
        }
        let body = self.rigid_bodies.insert(builder.build());

        let mut collider = ColliderBuilder::new(shape)
            .friction(binding.material.friction)
            .restitution(binding.material.elasticity)
            .active_events(ActiveEvents::COLLISION_EVENTS);
        if binding.body == BodyKind::Dynamic && binding.material.mass > 0.0 {
            collider = collider.mass(binding.material.mass);
        }
        if let Some(region) = binding.region {
            collider = collider.sensor(true);
            self.regions.insert(id, region);
        }
        self.colliders
            .insert_with_parent(collider.build(), body, &mut self.rigid_bodies);

        self.object_to_body.insert(id, body);
        self.body_to_object.insert(body, id);
        Ok(())
    }

    /// Remove the body for `id` along with its colliders, joints and callback.
    pub fn remove(&mut self, id: ObjectId) -> bool {
        let Some(handle) = self.object_to_body.remove(&id) else {
            return false;
        };
        self.rigid_bodies.remove(
            handle,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        self.body_to_object.remove(&handle);
        self.joints.remove(&id);
        self.callbacks.remove(&id);
        self.regions.remove(&id);
        self.overlaps.retain(|(region, body)| *region != id && *body != id);
        true
    }

    pub fn set_collision_callback<F>(&mut self, id: ObjectId, callback: F)
    where
        F: FnMut(&Contact, &mut PhysicsCommands) + Send + 'static,
    {
        self.callbacks.insert(id, Box::new(callback));
    }

    pub fn remove_collision_callback(&mut self, id: ObjectId) -> bool {
        self.callbacks.remove(&id).is_some()
    }

    /// Pin two bodies together with a pivot joint at `at` (world units), or at
    /// the midpoint between their centres.
    pub fn connect(&mut self, a: ObjectId, b: ObjectId, at: Option<Vec2>) -> Result<()> {
        let ha = self.body_handle(a)?;
        let hb = self.body_handle(b)?;
        let (pa, pb) = match (self.rigid_bodies.get(ha), self.rigid_bodies.get(hb)) {
            (Some(ba), Some(bb)) => (*ba.position(), *bb.position()),
            _ => return Err(anyhow!("Bodies for {a:?} or {b:?} are gone")),
        };
        let anchor = at.unwrap_or_else(|| {
            let ta = pa.translation.vector;
            let tb = pb.translation.vector;
            Vec2::new((ta.x + tb.x) / 2.0, (ta.y + tb.y) / 2.0)
        });
        let world = point![anchor.x, anchor.y];
        let joint = RevoluteJointBuilder::new()
            .local_anchor1(pa.inverse_transform_point(&world))
            .local_anchor2(pb.inverse_transform_point(&world))
            .build();
        let handle = self.impulse_joints.insert(ha, hb, joint, true);
        self.joints.entry(a).or_default().push(handle);
        Ok(())
    }

    /// Remove every joint created through `connect` with `id` as first body.
    pub fn disconnect(&mut self, id: ObjectId) -> usize {
        let handles = self.joints.remove(&id).unwrap_or_default();
        let count = handles.len();
        for handle in handles {
            self.impulse_joints.remove(handle, true);
        }
        count
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// Region effects are applied once, then the step is split into `quality`
    /// substeps. Collision callbacks run after each substep and any mutation they
    /// request is applied when the whole step has finished.
    pub fn update(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }

        self.apply_regions(dt);

        let substep = dt / self.quality as f32;
        for _ in 0..self.quality {
            self.step(substep);
            self.dispatch_events();
        }

        let deferred = std::mem::take(&mut self.deferred);
        for command in deferred.queue {
            if let PhysicsCommand::Remove(id) = command {
                if self.remove(id) {
                    self.removed.push(id);
                }
            } else {
                self.apply(command);
            }
        }
    }

    /// Objects removed by collision callbacks since the last call. The owner of
    /// the scene must drop them too.
    pub fn take_removed(&mut self) -> Vec<ObjectId> {
        std::mem::take(&mut self.removed)
    }

    /// Apply a command immediately.
    pub fn apply(&mut self, command: PhysicsCommand) {
        match command {
            PhysicsCommand::Add {
                id,
                binding,
                center,
                rotation,
            } => {
                if let Err(err) = self.add(id, &binding, center, rotation) {
                    log::warn!("Deferred body for {id:?} could not be created: {err:#}");
                }
            }
            PhysicsCommand::Remove(id) => {
                self.remove(id);
            }
            PhysicsCommand::SetPosition(id, center) => self.set_body_position(id, center),
            PhysicsCommand::SetVelocity(id, v) => self.set_linear_velocity(id, v),
            PhysicsCommand::ApplyImpulse(id, impulse) => self.apply_impulse(id, impulse),
        }
    }

    fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;

        let gravity = vector![self.gravity.x, self.gravity.y];
        let hooks = &();

        self.pipeline.step(
            &gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            hooks,
            &self.event_handler,
        );

        self.query_pipeline
            .update(&self.island_manager, &self.rigid_bodies, &self.colliders);
    }

    fn dispatch_events(&mut self) {
        while self.event_recv_contact_force.try_recv().is_ok() {}

        while let Ok(event) = self.event_recv_collision.try_recv() {
            let (c1, c2, phase) = match event {
                CollisionEvent::Started(c1, c2, _) => (c1, c2, ContactPhase::Begin),
                CollisionEvent::Stopped(c1, c2, _) => (c1, c2, ContactPhase::End),
            };
            // Either collider may already be gone; that pair simply has no callback.
            let Some((a, b, sensor)) = self.map_pair(c1, c2) else {
                continue;
            };

            for (region, body) in [(a, b), (b, a)] {
                if self.regions.contains_key(&region) && !self.regions.contains_key(&body) {
                    match phase {
                        ContactPhase::Begin => self.overlaps.insert((region, body)),
                        ContactPhase::End => self.overlaps.remove(&(region, body)),
                    };
                }
            }

            for (me, other) in [(a, b), (b, a)] {
                if let Some(callback) = self.callbacks.get_mut(&me) {
                    let contact = Contact {
                        me,
                        other,
                        phase,
                        sensor,
                    };
                    callback(&contact, &mut self.deferred);
                }
            }
        }
    }

    fn map_pair(
        &self,
        c1: ColliderHandle,
        c2: ColliderHandle,
    ) -> Option<(ObjectId, ObjectId, bool)> {
        let col1 = self.colliders.get(c1)?;
        let col2 = self.colliders.get(c2)?;
        let a = *self.body_to_object.get(&col1.parent()?)?;
        let b = *self.body_to_object.get(&col2.parent()?)?;
        Some((a, b, col1.is_sensor() || col2.is_sensor()))
    }

    fn apply_regions(&mut self, dt: f32) {
        let pairs: Vec<(ObjectId, ObjectId)> = self.overlaps.iter().copied().collect();
        for (region_id, body_id) in pairs {
            let Some(region) = self.regions.get(&region_id).copied() else {
                continue;
            };
            let (Some(region_box), Some(body_box)) = (self.bounds(region_id), self.bounds(body_id))
            else {
                continue;
            };
            let Some(handle) = self.object_to_body.get(&body_id).copied() else {
                continue;
            };
            let gravity = self.gravity;
            let Some(body) = self.rigid_bodies.get_mut(handle) else {
                continue;
            };
            if !body.is_dynamic() {
                continue;
            }

            let v = *body.linvel();
            let mut vel = Vec2::new(v.x, v.y);
            match region {
                Region::Fluid { density } => {
                    let (x_overlap, y_overlap) = overlap_fractions(&region_box, &body_box);
                    let overlap = (x_overlap + y_overlap) / 2.0;
                    let area = (body_box.1.x - body_box.0.x) * (body_box.1.y - body_box.0.y);
                    let body_density = if area > 0.0 { body.mass() / area } else { 0.0 };
                    let lift = (density - body_density).max(0.0);

                    let w = body.angvel();
                    body.set_angvel(w - dt * w * overlap * 3.0, true);
                    vel.x -= density * dt * vel.x * x_overlap;
                    vel.y -= density * dt * vel.y * 3.0 * y_overlap;
                    vel.y -= y_overlap * gravity.y * lift * dt;
                }
                Region::ForceField { force, limit } => {
                    vel += force * dt;
                    if limit.x >= 0.0 {
                        vel.x = vel.x.clamp(-limit.x, limit.x);
                    }
                    if limit.y >= 0.0 {
                        vel.y = vel.y.clamp(-limit.y, limit.y);
                    }
                }
            }
            body.set_linvel(vector![vel.x, vel.y], true);
        }
    }

    fn bounds(&self, id: ObjectId) -> Option<(Vec2, Vec2)> {
        let handle = *self.object_to_body.get(&id)?;
        let body = self.rigid_bodies.get(handle)?;
        let collider = self.colliders.get(*body.colliders().first()?)?;
        let aabb = collider.compute_aabb();
        Some((
            Vec2::new(aabb.mins.x, aabb.mins.y),
            Vec2::new(aabb.maxs.x, aabb.maxs.y),
        ))
    }

    // ------------------------------
    // Per-object body queries/actions
    // ------------------------------

    /// Centre of the body, world units.
    pub fn body_position(&self, id: ObjectId) -> Option<Vec2> {
        let h = *self.object_to_body.get(&id)?;
        let b = self.rigid_bodies.get(h)?;
        let t = b.translation();
        Some(Vec2::new(t.x, t.y))
    }

    /// Body rotation in degrees.
    pub fn body_rotation(&self, id: ObjectId) -> Option<f32> {
        let h = *self.object_to_body.get(&id)?;
        let b = self.rigid_bodies.get(h)?;
        Some(b.rotation().angle().to_degrees())
    }

    pub fn set_body_position(&mut self, id: ObjectId, center: Vec2) {
        if let Some(b) = self.body_mut(id) {
            b.set_translation(vector![center.x, center.y], true);
        }
    }

    pub fn set_body_rotation(&mut self, id: ObjectId, degrees: f32) {
        if let Some(b) = self.body_mut(id) {
            b.set_rotation(Rotation::new(degrees.to_radians()), true);
        }
    }

    pub fn linear_velocity(&self, id: ObjectId) -> Option<Vec2> {
        let h = *self.object_to_body.get(&id)?;
        let v = self.rigid_bodies.get(h)?.linvel();
        Some(Vec2::new(v.x, v.y))
    }

    pub fn set_linear_velocity(&mut self, id: ObjectId, vel: Vec2) {
        if let Some(b) = self.body_mut(id) {
            b.set_linvel(vector![vel.x, vel.y], true);
        }
    }

    pub fn set_angular_velocity(&mut self, id: ObjectId, w: f32) {
        if let Some(b) = self.body_mut(id) {
            b.set_angvel(w, true);
        }
    }

    pub fn apply_impulse(&mut self, id: ObjectId, impulse: Vec2) {
        if let Some(b) = self.body_mut(id) {
            b.apply_impulse(vector![impulse.x, impulse.y], true);
        }
    }

    pub fn apply_force(&mut self, id: ObjectId, force: Vec2) {
        if let Some(b) = self.body_mut(id) {
            b.add_force(vector![force.x, force.y], true);
        }
    }

    pub fn lock_rotations(&mut self, id: ObjectId, locked: bool) {
        if let Some(b) = self.body_mut(id) {
            b.lock_rotations(locked, true);
        }
    }

    /// First object whose collider contains `p`.
    pub fn point_query(&self, p: Vec2) -> Option<ObjectId> {
        let pt = point![p.x, p.y];
        self.colliders
            .iter()
            .find(|(_, c)| c.shape().contains_point(c.position(), &pt))
            .and_then(|(_, c)| self.body_to_object.get(&c.parent()?).copied())
    }

    fn body_mut(&mut self, id: ObjectId) -> Option<&mut RigidBody> {
        let h = *self.object_to_body.get(&id)?;
        self.rigid_bodies.get_mut(h)
    }

    fn body_handle(&self, id: ObjectId) -> Result<RigidBodyHandle> {
        self.object_to_body
            .get(&id)
            .copied()
            .ok_or_else(|| anyhow!("Object {:?} has no physics body", id))
    }
}

fn to_rapier_shape(shape: &ShapeDesc) -> Result<SharedShape> {
    match shape {
        ShapeDesc::Circle { radius } => Ok(SharedShape::ball(*radius)),
        ShapeDesc::Box { size } => Ok(SharedShape::cuboid(size.x / 2.0, size.y / 2.0)),
        ShapeDesc::Polygon { outline, scale } => {
            let points: Vec<Point<Real>> = outline
                .iter()
                .map(|p| point![p.x * scale, p.y * scale])
                .collect();
            if points.len() < 3 {
                return Err(anyhow!(
                    "Outline of {} points cannot form a polygon",
                    points.len()
                ));
            }
            SharedShape::convex_hull(&points)
                .ok_or_else(|| anyhow!("Outline of {} points has no convex hull", points.len()))
        }
    }
}

/// Fraction of `body`'s width and height that lies inside `region`.
fn overlap_fractions(region: &(Vec2, Vec2), body: &(Vec2, Vec2)) -> (f32, f32) {
    let width = body.1.x - body.0.x;
    let height = body.1.y - body.0.y;
    let x = (body.1.x.min(region.1.x) - body.0.x.max(region.0.x)).max(0.0);
    let y = (body.1.y.min(region.1.y) - body.0.y.max(region.0.y)).max(0.0);
    (
        if width > 0.0 { x / width } else { 0.0 },
        if height > 0.0 { y / height } else { 0.0 },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn ball() -> PhysicsBinding {
        PhysicsBinding::new(
            BodyKind::Dynamic,
            ShapeDesc::Circle { radius: 0.5 },
            Material::default(),
        )
    }

    fn floor() -> PhysicsBinding {
        PhysicsBinding::new(
            BodyKind::Static,
            ShapeDesc::Box {
                size: Vec2::new(20.0, 1.0),
            },
            Material::default(),
        )
    }

    #[test]
    fn gravity_pulls_bodies_down_the_screen() {
        let mut world = PhysicsWorld::new();
        let id = ObjectId(1);
        world.add(id, &ball(), Vec2::ZERO, 0.0).unwrap();
        for _ in 0..10 {
            world.update(1.0 / 30.0);
        }
        assert!(world.body_position(id).unwrap().y > 0.0);
        assert_eq!(world.body_count(), 1);
    }

    #[test]
    fn unknown_objects_are_ignored() {
        let mut world = PhysicsWorld::new();
        assert!(!world.remove(ObjectId(9)));
        world.set_linear_velocity(ObjectId(9), Vec2::ONE);
        assert!(world.body_position(ObjectId(9)).is_none());
        assert!(world.connect(ObjectId(1), ObjectId(2), None).is_err());
    }

    #[test]
    fn callback_removal_is_deferred_until_step_ends() {
        let mut world = PhysicsWorld::new();
        let ball_id = ObjectId(1);
        let floor_id = ObjectId(2);
        world.add(ball_id, &ball(), Vec2::new(0.0, 0.0), 0.0).unwrap();
        world
            .add(floor_id, &floor(), Vec2::new(0.0, 1.2), 0.0)
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        world.set_collision_callback(ball_id, move |contact, commands| {
            log.lock().unwrap().push(*contact);
            if contact.phase == ContactPhase::Begin {
                commands.remove(contact.me);
            }
        });

        for _ in 0..60 {
            world.update(1.0 / 30.0);
            if !world.has_body(ball_id) {
                break;
            }
        }

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert_eq!(seen[0].other, floor_id);
        assert!(!world.has_body(ball_id));
        assert!(world.has_body(floor_id));
        assert_eq!(world.take_removed(), vec![ball_id]);
        assert!(world.take_removed().is_empty());
    }

    #[test]
    fn force_field_respects_speed_limit() {
        let mut world = PhysicsWorld::with_gravity(Vec2::ZERO);
        let body = ObjectId(1);
        let field = ObjectId(2);
        world.add(body, &ball(), Vec2::ZERO, 0.0).unwrap();
        let region = PhysicsBinding::new(
            BodyKind::Static,
            ShapeDesc::Box {
                size: Vec2::new(10.0, 10.0),
            },
            Material::default(),
        )
        .with_region(Region::ForceField {
            force: Vec2::new(50.0, 0.0),
            limit: Vec2::new(2.0, -1.0),
        });
        world.add(field, &region, Vec2::ZERO, 0.0).unwrap();

        for _ in 0..20 {
            world.update(1.0 / 30.0);
        }
        let v = world.linear_velocity(body).unwrap();
        assert!(v.x > 0.0);
        assert!(v.x <= 2.0 + 1e-4);
    }

    #[test]
    fn connect_and_disconnect_joints() {
        let mut world = PhysicsWorld::new();
        world.add(ObjectId(1), &ball(), Vec2::ZERO, 0.0).unwrap();
        world
            .add(ObjectId(2), &ball(), Vec2::new(1.0, 0.0), 0.0)
            .unwrap();
        world.connect(ObjectId(1), ObjectId(2), None).unwrap();
        assert_eq!(world.disconnect(ObjectId(1)), 1);
        assert_eq!(world.disconnect(ObjectId(1)), 0);
    }

    #[test]
    fn polygon_outline_builds_hull() {
        let outline = vec![
            Vec2::new(-0.5, -0.5),
            Vec2::new(0.5, -0.5),
            Vec2::new(0.5, 0.5),
            Vec2::new(-0.5, 0.5),
            Vec2::new(0.0, 0.0),
        ];
        let shape = ShapeDesc::Polygon {
            outline,
            scale: 2.0,
        };
        assert!(to_rapier_shape(&shape).is_ok());
        let degenerate = ShapeDesc::Polygon {
            outline: vec![Vec2::ZERO],
            scale: 1.0,
        };
        assert!(to_rapier_shape(&degenerate).is_err());
        let empty = ShapeDesc::Polygon {
            outline: Vec::new(),
            scale: 1.0,
        };
        assert!(to_rapier_shape(&empty).is_err());
    }

    #[test]
    fn empty_outline_is_rejected_by_add() {
        let mut world = PhysicsWorld::new();
        let binding = PhysicsBinding::new(
            BodyKind::Dynamic,
            ShapeDesc::Polygon {
                outline: vec![Vec2::ZERO, Vec2::ONE],
                scale: 1.0,
            },
            Material::default(),
        );
        assert!(world.add(ObjectId(1), &binding, Vec2::ZERO, 0.0).is_err());
        assert_eq!(world.body_count(), 0);
    }

    #[test]
    fn set_body_rotation_takes_degrees() {
        let mut world = PhysicsWorld::new();
        world.add(ObjectId(1), &ball(), Vec2::ZERO, 0.0).unwrap();
        world.set_body_rotation(ObjectId(1), 90.0);
        let rotation = world.body_rotation(ObjectId(1)).unwrap();
        assert!((rotation - 90.0).abs() < 1e-3);
    }

    #[test]
    fn overlap_fraction_of_half_submerged_body() {
        let region = (Vec2::new(0.0, 1.0), Vec2::new(10.0, 10.0));
        let body = (Vec2::new(1.0, 0.0), Vec2::new(3.0, 2.0));
        assert_eq!(overlap_fractions(&region, &body), (1.0, 0.5));
    }
}
