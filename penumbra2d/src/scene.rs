//! Layered scene graph.
//!
//! Objects live in an arena keyed by [`ObjectId`]; layers only hold ids. Larger
//! layer indices are drawn first, so layer 0 ends up on top.

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::Result;

use crate::camera::Camera;
use crate::math::{Rect, Vec2};
use crate::object::{Clamp, ObjectId, SceneObject};
use crate::particles::SpawnOrigin;
use crate::physics::PhysicsWorld;

pub const DEFAULT_LAYER: i32 = 1;

pub struct Scene {
    objects: HashMap<ObjectId, SceneObject>,
    layers: BTreeMap<i32, Vec<ObjectId>>,
    /// Emitters in registration order.
    emitters: Vec<ObjectId>,
    next_id: u32,
    particle_cap: usize,
    rng: fastrand::Rng,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            layers: BTreeMap::new(),
            emitters: Vec::new(),
            next_id: 1,
            particle_cap: 0,
            rng: fastrand::Rng::new(),
        }
    }

    /// Scene whose particle sampling is reproducible.
    pub fn with_seed(seed: u64) -> Self {
        let mut scene = Self::new();
        scene.rng = fastrand::Rng::with_seed(seed);
        scene
    }

    /// Global live-particle cap shared by every emitter. 0 means unlimited.
    pub fn set_particle_cap(&mut self, cap: usize) {
        self.particle_cap = cap;
    }

    pub fn particle_cap(&self) -> usize {
        self.particle_cap
    }

    /// Register `object` on `layer`, creating its physics body if it has one.
    pub fn add(
        &mut self,
        physics: &mut PhysicsWorld,
        object: SceneObject,
        layer: i32,
    ) -> Result<ObjectId> {
        let id = ObjectId(self.next_id);
        self.next_id += 1;

        if let Some(binding) = object.physics.as_ref() {
            if !object.is_locked() {
                physics.add(id, binding, object.center(), object.rotation)?;
            }
        }
        if object.emitter.is_some() {
            self.emitters.push(id);
        }

        self.layers.entry(layer).or_default().push(id);
        self.objects.insert(id, object);
        Ok(id)
    }

    /// Unregister `id` from its layer, the physics world and the emitter registry.
    /// Unknown ids are ignored.
    pub fn remove(&mut self, physics: &mut PhysicsWorld, id: ObjectId) -> Option<SceneObject> {
        let object = self.objects.remove(&id)?;

        for ids in self.layers.values_mut() {
            if let Some(index) = ids.iter().position(|other| *other == id) {
                ids.remove(index);
                break;
            }
        }
        self.layers.retain(|_, ids| !ids.is_empty());
        self.emitters.retain(|other| *other != id);
        physics.remove(id);

        for other in self.objects.values_mut() {
            other.clamps.retain(|c| c.dependent != id);
            if other.parent == Some(id) {
                other.parent = None;
            }
        }
        Some(object)
    }

    /// Remove every object on `layer`, or every object when `layer` is `None`.
    pub fn clear(&mut self, physics: &mut PhysicsWorld, layer: Option<i32>) {
        let ids: Vec<ObjectId> = match layer {
            Some(layer) => self.layers.get(&layer).cloned().unwrap_or_default(),
            None => self.layers.values().flatten().copied().collect(),
        };
        for id in ids {
            self.remove(physics, id);
        }
    }

    pub fn object_layer(&self, id: ObjectId) -> Option<i32> {
        self.layers
            .iter()
            .find(|(_, ids)| ids.contains(&id))
            .map(|(layer, _)| *layer)
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.get_mut(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Ids on `layer` in their current order.
    pub fn layer(&self, layer: i32) -> &[ObjectId] {
        self.layers.get(&layer).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Layer keys in ascending order.
    pub fn layer_keys(&self) -> impl Iterator<Item = i32> + '_ {
        self.layers.keys().copied()
    }

    /// Layer keys in draw order: largest index first.
    pub fn draw_order(&self) -> Vec<i32> {
        self.layers.keys().rev().copied().collect()
    }

    /// Objects in ascending layer order, then layer order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &SceneObject)> + '_ {
        self.layers
            .values()
            .flatten()
            .filter_map(move |id| self.objects.get(id).map(|o| (*id, o)))
    }

    /// Keep `dependent` at `offset` from `parent` whenever `parent` moves.
    pub fn clamp(&mut self, dependent: ObjectId, parent: ObjectId, offset: Vec2) -> bool {
        if dependent == parent || !self.objects.contains_key(&dependent) {
            return false;
        }
        let Some(object) = self.objects.get_mut(&parent) else {
            return false;
        };
        object.clamps.retain(|c| c.dependent != dependent);
        object.clamps.push(Clamp { dependent, offset });
        true
    }

    pub fn unclamp(&mut self, dependent: ObjectId, parent: ObjectId) -> bool {
        let Some(object) = self.objects.get_mut(&parent) else {
            return false;
        };
        let before = object.clamps.len();
        object.clamps.retain(|c| c.dependent != dependent);
        before != object.clamps.len()
    }

    /// Attach an emitter to `parent` so that it stays centred on it, or detach it.
    pub fn set_emitter_parent(
        &mut self,
        physics: &mut PhysicsWorld,
        emitter: ObjectId,
        parent: Option<ObjectId>,
    ) -> bool {
        let Some(previous) = self.objects.get(&emitter).map(|o| o.parent) else {
            return false;
        };
        if let Some(old) = previous {
            self.unclamp(emitter, old);
        }

        let target = parent.and_then(|p| self.objects.get(&p).map(|o| (p, o.position, o.size)));
        let size = self.objects.get(&emitter).map(|o| o.size).unwrap_or_default();

        if let Some(object) = self.objects.get_mut(&emitter) {
            object.parent = target.map(|(p, _, _)| p);
        }
        if let Some((parent, position, parent_size)) = target {
            let offset = parent_size / 2.0 - size / 2.0;
            self.clamp(emitter, parent, offset);
            self.set_position(physics, emitter, position + offset);
        }
        true
    }

    /// Move an object by its top-left corner. The bound physics body and every
    /// clamped dependent follow immediately.
    pub fn set_position(&mut self, physics: &mut PhysicsWorld, id: ObjectId, position: Vec2) {
        let Some(object) = self.objects.get_mut(&id) else {
            return;
        };
        object.position = position;
        if object.physics.is_some() && !object.is_locked() {
            physics.set_body_position(id, object.center());
        }
        let mut visited = HashSet::from([id]);
        self.propagate(physics, id, &mut visited);
    }

    pub fn set_center(&mut self, physics: &mut PhysicsWorld, id: ObjectId, center: Vec2) {
        if let Some(size) = self.objects.get(&id).map(|o| o.size) {
            self.set_position(physics, id, center - size / 2.0);
        }
    }

    fn propagate(
        &mut self,
        physics: &mut PhysicsWorld,
        id: ObjectId,
        visited: &mut HashSet<ObjectId>,
    ) {
        let Some((position, clamps)) = self.objects.get(&id).map(|o| (o.position, o.clamps.clone()))
        else {
            return;
        };
        for clamp in clamps {
            if !visited.insert(clamp.dependent) {
                continue;
            }
            if let Some(dependent) = self.objects.get_mut(&clamp.dependent) {
                dependent.position = position + clamp.offset;
                if dependent.physics.is_some() && !dependent.is_locked() {
                    physics.set_body_position(clamp.dependent, dependent.center());
                }
            }
            self.propagate(physics, clamp.dependent, visited);
        }
    }

    /// Freeze an object to the window where it currently appears (ignoring
    /// camera rotation). Locked objects are drawn in window pixels.
    pub fn lock(&mut self, id: ObjectId, camera: &Camera) -> bool {
        let Some(object) = self.objects.get_mut(&id) else {
            return false;
        };
        let (pos, size) = camera.world_to_screen(object.position, object.size);
        let pad = Vec2::splat(camera.overscan_padding());
        object.locked = Some(Rect::from_pos_size(
            (pos - pad) * camera.zoom,
            size * camera.zoom,
        ));
        true
    }

    pub fn unlock(&mut self, id: ObjectId) -> bool {
        self.objects
            .get_mut(&id)
            .map(|o| o.locked.take().is_some())
            .unwrap_or(false)
    }

    /// Copy every physics body's pose onto its object: the object's centre is
    /// the body centre and its rotation the body angle in degrees.
    pub fn sync_from_physics(&mut self, physics: &mut PhysicsWorld) {
        let bound: Vec<ObjectId> = self
            .objects
            .iter()
            .filter(|(_, o)| o.physics.is_some() && !o.is_locked())
            .map(|(id, _)| *id)
            .collect();

        for id in bound {
            let (Some(center), Some(rotation)) =
                (physics.body_position(id), physics.body_rotation(id))
            else {
                continue;
            };
            let has_clamps = match self.objects.get_mut(&id) {
                Some(object) => {
                    object.position = center - object.size / 2.0;
                    object.rotation = rotation;
                    !object.clamps.is_empty()
                }
                None => false,
            };
            if has_clamps {
                let mut visited = HashSet::from([id]);
                self.propagate(physics, id, &mut visited);
            }
        }
    }

    /// Stable sort of every layer by body centre Y when bound, else top-left Y.
    pub fn sort_layers(&mut self, physics: &PhysicsWorld) {
        let objects = &self.objects;
        let key = |id: &ObjectId| -> f32 {
            physics
                .body_position(*id)
                .map(|p| p.y)
                .or_else(|| objects.get(id).map(|o| o.position.y))
                .unwrap_or(0.0)
        };
        for ids in self.layers.values_mut() {
            ids.sort_by(|a, b| key(a).total_cmp(&key(b)));
        }
    }

    /// Per-emitter share of the particle cap. `None` when the cap is unlimited.
    pub fn particle_allowance(&self) -> Option<usize> {
        if self.particle_cap == 0 {
            return None;
        }
        let active = self
            .emitters
            .iter()
            .filter_map(|id| self.objects.get(id))
            .filter(|o| o.emitter.as_ref().is_some_and(|e| e.is_active()))
            .count();
        Some(self.particle_cap / active.max(1))
    }

    /// Advance every emitter: expire dead particles, spawn new ones.
    pub fn update_particles(&mut self, dt: f32, now: f32) {
        let allowance = self.particle_allowance();
        for id in self.emitters.clone() {
            let Some(origin) = self.spawn_origin(id) else {
                continue;
            };
            let Some(emitter) = self.objects.get_mut(&id).and_then(|o| o.emitter.as_mut()) else {
                continue;
            };
            emitter.update(dt, allowance, now, origin, &mut self.rng);
        }
    }

    fn spawn_origin(&self, id: ObjectId) -> Option<SpawnOrigin> {
        let object = self.objects.get(&id)?;
        let volumetric = object
            .emitter
            .as_ref()
            .is_some_and(|e| e.properties().volumetric);
        let parent = object.parent.and_then(|p| self.objects.get(&p));
        Some(match parent {
            Some(parent) if volumetric => SpawnOrigin {
                origin: parent.position,
                extent: parent.size,
            },
            _ => SpawnOrigin {
                origin: object.position,
                extent: object.size,
            },
        })
    }

    pub fn particle_count(&self) -> usize {
        self.emitters
            .iter()
            .filter_map(|id| self.objects.get(id))
            .filter_map(|o| o.emitter.as_ref())
            .map(|e| e.len())
            .sum()
    }

    pub fn emitter_ids(&self) -> &[ObjectId] {
        &self.emitters
    }

    /// Bounds of every object, used for picking and debugging.
    pub fn bounds(&self, id: ObjectId) -> Option<Rect> {
        self.objects.get(&id).map(SceneObject::bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::ParticleProperties;
    use crate::physics::{BodyKind, Material};
    use approx::assert_relative_eq;

    fn sprite(x: f32, y: f32) -> SceneObject {
        SceneObject::sprite(Vec2::new(x, y), Vec2::ONE, "crate")
    }

    #[test]
    fn add_and_remove_track_layers() {
        let mut physics = PhysicsWorld::new();
        let mut scene = Scene::new();
        let a = scene.add(&mut physics, sprite(0.0, 0.0), DEFAULT_LAYER).unwrap();
        let b = scene.add(&mut physics, sprite(1.0, 0.0), 3).unwrap();
        assert_eq!(scene.object_layer(a), Some(1));
        assert_eq!(scene.object_layer(b), Some(3));
        assert_eq!(scene.draw_order(), vec![3, 1]);

        assert!(scene.remove(&mut physics, a).is_some());
        assert!(scene.remove(&mut physics, a).is_none());
        assert_eq!(scene.object_layer(a), None);
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn physics_objects_register_bodies() {
        let mut physics = PhysicsWorld::new();
        let mut scene = Scene::new();
        let ball = SceneObject::ball(
            Vec2::new(2.0, 2.0),
            0.5,
            "ball",
            BodyKind::Dynamic,
            Material::default(),
        );
        let id = scene.add(&mut physics, ball, DEFAULT_LAYER).unwrap();
        assert!(physics.has_body(id));
        assert_eq!(physics.body_position(id), Some(Vec2::new(2.5, 2.5)));
        scene.clear(&mut physics, None);
        assert!(!physics.has_body(id));
        assert!(scene.is_empty());
    }

    #[test]
    fn clear_single_layer() {
        let mut physics = PhysicsWorld::new();
        let mut scene = Scene::new();
        scene.add(&mut physics, sprite(0.0, 0.0), 0).unwrap();
        scene.add(&mut physics, sprite(0.0, 0.0), 2).unwrap();
        scene.clear(&mut physics, Some(2));
        assert_eq!(scene.len(), 1);
        assert_eq!(scene.draw_order(), vec![0]);
    }

    #[test]
    fn pose_sync_places_centre_on_body() {
        let mut physics = PhysicsWorld::new();
        let mut scene = Scene::new();
        let object = SceneObject::boxed(
            Vec2::ZERO,
            Vec2::new(2.0, 1.0),
            "crate",
            BodyKind::Dynamic,
            Material::default(),
        );
        let id = scene.add(&mut physics, object, DEFAULT_LAYER).unwrap();
        physics.set_body_position(id, Vec2::new(10.0, 20.0));
        physics.set_body_rotation(id, 90.0);
        scene.sync_from_physics(&mut physics);

        let object = scene.get(id).unwrap();
        assert_relative_eq!(object.position.x, 9.0);
        assert_relative_eq!(object.position.y, 19.5);
        assert_relative_eq!(object.rotation, 90.0, epsilon = 1e-3);
    }

    #[test]
    fn clamped_objects_follow_transitively() {
        let mut physics = PhysicsWorld::new();
        let mut scene = Scene::new();
        let a = scene.add(&mut physics, sprite(0.0, 0.0), 1).unwrap();
        let b = scene.add(&mut physics, sprite(0.0, 0.0), 1).unwrap();
        let c = scene.add(&mut physics, sprite(0.0, 0.0), 1).unwrap();
        assert!(scene.clamp(b, a, Vec2::new(1.0, 0.0)));
        assert!(scene.clamp(c, b, Vec2::new(0.0, 1.0)));
        assert!(scene.clamp(a, c, Vec2::ZERO));

        scene.set_position(&mut physics, a, Vec2::new(5.0, 5.0));
        assert_eq!(scene.get(b).unwrap().position, Vec2::new(6.0, 5.0));
        assert_eq!(scene.get(c).unwrap().position, Vec2::new(6.0, 6.0));
        // the cycle back to `a` does not overwrite the explicit move
        assert_eq!(scene.get(a).unwrap().position, Vec2::new(5.0, 5.0));

        scene.remove(&mut physics, b);
        assert!(scene.get(a).unwrap().clamps().is_empty());
    }

    #[test]
    fn layers_sort_by_y() {
        let mut physics = PhysicsWorld::new();
        let mut scene = Scene::new();
        let low = scene.add(&mut physics, sprite(0.0, 9.0), 1).unwrap();
        let high = scene.add(&mut physics, sprite(0.0, 1.0), 1).unwrap();
        let mid = scene.add(&mut physics, sprite(0.0, 5.0), 1).unwrap();
        scene.sort_layers(&physics);
        assert_eq!(scene.layer(1), &[high, mid, low]);
    }

    #[test]
    fn allowance_splits_cap_between_emitters() {
        let mut physics = PhysicsWorld::new();
        let mut scene = Scene::with_seed(42);
        assert_eq!(scene.particle_allowance(), None);

        let props = ParticleProperties::new("spark", 1.0, Vec2::ONE, 0.2).with_distance(0.5, 1.0);
        for i in 0..3 {
            let emitter = SceneObject::emitter(Vec2::new(i as f32, 0.0), props.clone(), 500.0);
            scene.add(&mut physics, emitter, 1).unwrap();
        }
        scene.set_particle_cap(10);
        assert_eq!(scene.particle_allowance(), Some(3));

        let mut now = 0.0;
        for _ in 0..30 {
            now += 0.05;
            scene.update_particles(0.05, now);
            // three emitters, three particles each
            assert!(scene.particle_count() <= 9);
        }
        assert!(scene.particle_count() > 0);
    }

    #[test]
    fn parented_emitter_stays_centred_on_parent() {
        let mut physics = PhysicsWorld::new();
        let mut scene = Scene::new();
        let parent = scene
            .add(
                &mut physics,
                SceneObject::new(Vec2::ZERO, Vec2::new(2.0, 2.0)),
                1,
            )
            .unwrap();
        let props = ParticleProperties::new("smoke", 1.0, Vec2::ONE, 1.0).with_distance(0.0, 1.0);
        let emitter = scene
            .add(&mut physics, SceneObject::emitter(Vec2::new(9.0, 9.0), props, 1.0), 1)
            .unwrap();
        assert!(scene.set_emitter_parent(&mut physics, emitter, Some(parent)));
        assert_eq!(scene.get(emitter).unwrap().center(), Vec2::new(1.0, 1.0));

        scene.set_position(&mut physics, parent, Vec2::new(4.0, 0.0));
        assert_eq!(scene.get(emitter).unwrap().center(), Vec2::new(5.0, 1.0));
    }
}
