//! World-to-screen projection.
//!
//! The world is rendered into an off-screen target larger than the window by
//! half the window diagonal, so that it can be rotated for compositing without
//! exposing empty corners. Positions returned by [`Camera::world_to_screen`] are
//! in that target's pixel space; [`Camera::window_to_world`] maps real window
//! pixels back into the world.

use std::collections::HashSet;

use crate::math::Vec2;
use crate::object::ObjectId;
use crate::scene::Scene;

/// World units visible vertically at zoom 1.
pub const DEFAULT_WORLD_HEIGHT: f32 = 10.0;

#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    /// World point at the centre of the view.
    pub position: Vec2,
    pub zoom: f32,
    /// Degrees, applied when the world target is composited onto the window.
    pub rotation: f32,
    subject: Option<ObjectId>,
    world_height: f32,
    screen: Vec2,
    scale: f32,
    diagonal: f32,
    offset: Vec2,
    viewport: Vec2,
}

impl Camera {
    pub fn new(screen_width: u32, screen_height: u32) -> Self {
        let mut camera = Self {
            position: Vec2::ZERO,
            zoom: 1.0,
            rotation: 0.0,
            subject: None,
            world_height: DEFAULT_WORLD_HEIGHT,
            screen: Vec2::ZERO,
            scale: 1.0,
            diagonal: 0.0,
            offset: Vec2::ZERO,
            viewport: Vec2::ZERO,
        };
        camera.window_resized(screen_width, screen_height);
        camera
    }

    #[must_use]
    pub fn with_world_height(mut self, world_height: f32) -> Self {
        self.world_height = world_height.max(f32::EPSILON);
        let (w, h) = (self.screen.x as u32, self.screen.y as u32);
        self.window_resized(w, h);
        self
    }

    /// Pixels per world unit at zoom 1.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    /// World units visible at the current zoom.
    pub fn viewport(&self) -> Vec2 {
        self.viewport
    }

    pub fn screen_size(&self) -> Vec2 {
        self.screen
    }

    pub fn diagonal(&self) -> f32 {
        self.diagonal
    }

    /// Size of the off-screen world target in pixels.
    pub fn target_size(&self) -> Vec2 {
        self.screen + Vec2::splat(self.diagonal / 2.0)
    }

    /// Offset of the window inside the world target, in world-pass pixels.
    pub fn overscan_padding(&self) -> f32 {
        (self.diagonal / 4.0) / self.zoom
    }

    pub fn subject(&self) -> Option<ObjectId> {
        self.subject
    }

    /// Track an object; the camera snaps to its centre on every update.
    pub fn follow(&mut self, id: ObjectId) {
        self.subject = Some(id);
    }

    pub fn unfollow(&mut self) {
        self.subject = None;
    }

    /// Move the view centre, optionally snapping to 1/1000 of a world unit.
    pub fn set_position(&mut self, position: Vec2, floor: bool) {
        self.position = if floor {
            position.floor_to(0.001)
        } else {
            position
        };
    }

    pub fn window_resized(&mut self, width: u32, height: u32) {
        self.screen = Vec2::new(width.max(1) as f32, height.max(1) as f32);
        self.scale = self.screen.y / self.world_height;
        self.diagonal = self.screen.length();
        self.recompute();
    }

    /// Follow the subject, then refresh offset and viewport.
    pub fn update(&mut self, scene: &Scene) {
        if let Some(subject) = self.subject {
            match scene.get(subject) {
                Some(object) => self.position = object.center(),
                None => self.subject = None,
            }
        }
        self.recompute();
    }

    fn recompute(&mut self) {
        let zoom = self.zoom.max(f32::EPSILON);
        self.offset = self.position * self.scale - self.screen / 2.0 / zoom;
        self.viewport = Vec2::new(
            self.screen.x / self.scale / zoom,
            self.world_height / zoom,
        );
    }

    /// Project a world rectangle (top-left, size) into world-target pixels.
    pub fn world_to_screen(&self, position: Vec2, size: Vec2) -> (Vec2, Vec2) {
        let screen_size = size * self.scale;
        let pad = Vec2::splat(self.overscan_padding());
        let screen_pos = position * self.scale - self.offset + pad;
        (screen_pos, screen_size)
    }

    /// Exact inverse of the position mapping of [`Camera::world_to_screen`].
    pub fn screen_to_world(&self, screen_pos: Vec2) -> Vec2 {
        let pad = Vec2::splat(self.overscan_padding());
        (screen_pos - pad + self.offset) / self.scale
    }

    /// Map a window pixel (e.g. the pointer) into the world, undoing the
    /// composite rotation and zoom.
    pub fn window_to_world(&self, window_pos: Vec2) -> Vec2 {
        let half = self.screen / 2.0;
        let local = (window_pos - half).rotate_deg(-self.rotation);
        local / self.scale / self.zoom + self.position
    }

    /// First object whose open bounds contain `world_pos`, skipping `exclude`.
    pub fn pick(
        &self,
        scene: &Scene,
        world_pos: Vec2,
        exclude: &HashSet<ObjectId>,
    ) -> Option<ObjectId> {
        scene
            .iter()
            .filter(|(id, _)| !exclude.contains(id))
            .find(|(_, object)| object.bounds().contains_strict(world_pos))
            .map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::SceneObject;
    use crate::physics::PhysicsWorld;
    use crate::scene::DEFAULT_LAYER;
    use approx::assert_relative_eq;

    #[test]
    fn scale_is_screen_height_over_world_height() {
        let camera = Camera::new(800, 500);
        assert_relative_eq!(camera.scale(), 50.0);
        assert_relative_eq!(camera.viewport().x, 16.0);
        assert_relative_eq!(camera.viewport().y, 10.0);
        assert_relative_eq!(camera.diagonal(), (800f32 * 800.0 + 500.0 * 500.0).sqrt());
    }

    #[test]
    fn projects_object_relative_to_offset() {
        let camera = Camera::new(800, 500);
        let (pos, size) = camera.world_to_screen(Vec2::new(1.0, 1.0), Vec2::new(1.0, 1.0));
        let pad = camera.overscan_padding();
        let offset = camera.offset();
        assert_relative_eq!(pos.x - pad, 50.0 - offset.x);
        assert_relative_eq!(pos.y - pad, 50.0 - offset.y);
        assert_relative_eq!(size.x, 50.0);
        assert_relative_eq!(size.y, 50.0);
    }

    #[test]
    fn screen_to_world_inverts_world_to_screen() {
        let mut camera = Camera::new(1280, 720);
        camera.position = Vec2::new(3.5, -2.0);
        camera.zoom = 1.7;
        camera.recompute();
        for p in [Vec2::ZERO, Vec2::new(12.25, -4.5), Vec2::new(-100.0, 33.0)] {
            let (screen, _) = camera.world_to_screen(p, Vec2::ONE);
            let back = camera.screen_to_world(screen);
            assert_relative_eq!(back.x, p.x, epsilon = 1e-3);
            assert_relative_eq!(back.y, p.y, epsilon = 1e-3);
        }
    }

    #[test]
    fn window_centre_maps_to_camera_position() {
        let mut camera = Camera::new(800, 600);
        camera.position = Vec2::new(4.0, 4.0);
        camera.zoom = 2.0;
        camera.rotation = 30.0;
        let world = camera.window_to_world(Vec2::new(400.0, 300.0));
        assert_relative_eq!(world.x, 4.0);
        assert_relative_eq!(world.y, 4.0);

        camera.rotation = 0.0;
        let right = camera.window_to_world(Vec2::new(460.0, 300.0));
        assert_relative_eq!(right.x, 4.0 + 60.0 / 60.0 / 2.0);
    }

    #[test]
    fn subject_is_tracked_and_dropped_when_removed() {
        let mut physics = PhysicsWorld::new();
        let mut scene = Scene::new();
        let id = scene
            .add(
                &mut physics,
                SceneObject::new(Vec2::new(2.0, 2.0), Vec2::new(2.0, 2.0)),
                DEFAULT_LAYER,
            )
            .unwrap();
        let mut camera = Camera::new(800, 600);
        camera.follow(id);
        camera.update(&scene);
        assert_eq!(camera.position, Vec2::new(3.0, 3.0));

        scene.remove(&mut physics, id);
        camera.update(&scene);
        assert_eq!(camera.subject(), None);
    }

    #[test]
    fn pick_uses_open_bounds_and_exclusions() {
        let mut physics = PhysicsWorld::new();
        let mut scene = Scene::new();
        let a = scene
            .add(&mut physics, SceneObject::new(Vec2::ZERO, Vec2::ONE), 1)
            .unwrap();
        let camera = Camera::new(800, 600);
        assert_eq!(camera.pick(&scene, Vec2::new(0.5, 0.5), &HashSet::new()), Some(a));
        assert_eq!(camera.pick(&scene, Vec2::new(0.0, 0.5), &HashSet::new()), None);
        assert_eq!(
            camera.pick(&scene, Vec2::new(0.5, 0.5), &HashSet::from([a])),
            None
        );
    }

    #[test]
    fn floored_position() {
        let mut camera = Camera::new(800, 600);
        camera.set_position(Vec2::new(1.23456, -0.0004), true);
        assert_relative_eq!(camera.position.x, 1.234, epsilon = 1e-5);
        assert_relative_eq!(camera.position.y, -0.001, epsilon = 1e-5);
    }
}
