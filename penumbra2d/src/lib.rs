//! Penumbra2D - a 2D engine layer with a zoomable, rotatable camera,
//! sector-culled layered drawing, projected shadows, particle emitters and
//! rapier2d physics.
//!
//! The world is drawn into an off-screen target larger than the window and
//! composited back rotated, so most of the crate works in that target's pixel
//! space. [`render::Renderer`] builds a [`render::DrawList`] without touching
//! the GPU; [`render::GpuBackend`] rasterises it.

pub mod assets;
pub mod camera;
pub mod engine;
pub mod error;
pub mod input;
pub mod math;
pub mod object;
pub mod particles;
pub mod physics;
pub mod render;
pub mod scene;
pub mod ui;
pub mod world;

pub use crate::assets::{AssetCache, AssetConfig};
pub use crate::camera::Camera;
pub use crate::engine::{BackendChoice, Engine, EngineConfig, EngineContext, Game};
pub use crate::error::AssetError;
pub use crate::input::InputState;
pub use crate::math::{Colour, Rect, Vec2};
pub use crate::object::{ObjectId, SceneObject};
pub use crate::particles::{ParticleEmitter, ParticleProperties};
pub use crate::physics::{BodyKind, Material, PhysicsWorld};
pub use crate::render::{DrawCommand, DrawList, GpuBackend, Renderer, TextureHandle, TextureStore};
pub use crate::scene::Scene;
pub use crate::world::{Background, World};
pub use winit::event::MouseButton;
pub use winit::keyboard::KeyCode;
