use anyhow::Result;

use crate::camera::Camera;
use crate::math::Vec2;
use crate::object::{ObjectId, SceneObject};
use crate::physics::PhysicsWorld;
use crate::render::TextRequest;
use crate::scene::Scene;
use crate::ui::Gui;

/// Backdrop drawn behind every layer.
#[derive(Clone, Debug, PartialEq)]
pub struct Background {
    pub texture: String,
    /// Repeat the texture in a 3x3 grid that scrolls with the camera.
    pub tiled: bool,
    /// Fraction of the camera movement the tiles follow.
    pub parallax: f32,
}

impl Background {
    pub fn stretched(texture: impl Into<String>) -> Self {
        Self {
            texture: texture.into(),
            tiled: false,
            parallax: 0.0,
        }
    }

    pub fn tiled(texture: impl Into<String>) -> Self {
        Self {
            texture: texture.into(),
            tiled: true,
            parallax: 0.01,
        }
    }
}

/// Everything that is simulated and drawn.
pub struct World {
    pub camera: Camera,
    pub scene: Scene,
    pub physics: PhysicsWorld,
    pub gui: Gui,
    /// Seconds of simulated time.
    pub time: f32,
    /// Degrees; 0 casts shadows straight down.
    pub shadow_direction: f32,
    pub background: Option<Background>,
    text_queue: Vec<TextRequest>,
}

impl World {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            camera: Camera::new(width, height),
            scene: Scene::new(),
            physics: PhysicsWorld::new(),
            gui: Gui::new(),
            time: 0.0,
            shadow_direction: 0.0,
            background: None,
            text_queue: Vec::new(),
        }
    }

    pub fn add(&mut self, object: SceneObject, layer: i32) -> Result<ObjectId> {
        self.scene.add(&mut self.physics, object, layer)
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<SceneObject> {
        if self.camera.subject() == Some(id) {
            self.camera.unfollow();
        }
        self.scene.remove(&mut self.physics, id)
    }

    pub fn set_position(&mut self, id: ObjectId, position: Vec2) {
        self.scene.set_position(&mut self.physics, id, position);
    }

    pub fn set_center(&mut self, id: ObjectId, center: Vec2) {
        self.scene.set_center(&mut self.physics, id, center);
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.scene.get(id)
    }

    /// Draw `request` on top of the next frame only.
    pub fn queue_text(&mut self, request: TextRequest) {
        self.text_queue.push(request);
    }

    pub fn take_text(&mut self) -> Vec<TextRequest> {
        std::mem::take(&mut self.text_queue)
    }

    /// Step physics, copy body poses onto objects, then tick particles.
    ///
    /// Objects whose bodies a collision callback removed leave the scene here.
    pub fn advance(&mut self, dt: f32) {
        self.physics.update(dt);
        for id in self.physics.take_removed() {
            self.remove(id);
        }
        self.scene.sync_from_physics(&mut self.physics);
        self.time += dt;
        self.scene.update_particles(dt, self.time);
    }

    /// Returns the resize ratio applied to the GUI.
    pub fn window_resized(&mut self, width: u32, height: u32) -> (f32, f32) {
        let old = self.camera.screen_size();
        self.camera.window_resized(width, height);
        let new = self.camera.screen_size();
        let (gx, gy) = (new.x / old.x, new.y / old.y);
        self.gui.resize(gx, gy);
        (gx, gy)
    }

    /// Topmost object under a window pixel.
    pub fn pick_at_window(&self, window_pos: Vec2) -> Option<ObjectId> {
        let world_pos = self.camera.window_to_world(window_pos);
        self.camera
            .pick(&self.scene, world_pos, &Default::default())
    }
}
