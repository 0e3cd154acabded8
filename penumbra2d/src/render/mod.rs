//! Frame construction and the GPU backend.
//!
//! [`Renderer::draw_frame`] turns the world into a [`DrawList`]: textured quads
//! and fills for the off-screen world target, the rotation used to composite
//! that target onto the window, and the window-space overlay. Rasterisation is
//! left to a backend such as [`GpuBackend`].

pub mod cull;
pub mod particles;
mod pipeline;
pub mod shadow;
pub mod text;
mod wgpu_backend;

use std::collections::HashMap;

use anyhow::{anyhow, Result};

pub(crate) use pipeline::push_text;
pub use pipeline::{Renderer, TextRequest};
pub use shadow::ShadowConfig;
pub use wgpu_backend::GpuBackend;

use crate::math::{Colour, Rect, Vec2};

/// Opaque identifier of a texture owned by a [`TextureStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u32);

impl TextureHandle {
    pub fn from_raw(id: u32) -> Self {
        Self(id)
    }

    pub fn to_raw(self) -> u32 {
        self.0
    }
}

/// Where decoded RGBA8 pixels end up.
pub trait TextureStore {
    fn create_texture(&mut self, rgba: &[u8], width: u32, height: u32) -> Result<TextureHandle>;

    /// Replace the contents of `handle`, resizing it if needed.
    fn update_texture(
        &mut self,
        handle: TextureHandle,
        rgba: &[u8],
        width: u32,
        height: u32,
    ) -> Result<()>;

    fn texture_size(&self, handle: TextureHandle) -> Option<(u32, u32)>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    /// Draw `src` (texture pixels) into `dst` (target pixels), rotated by
    /// `rotation` degrees about the centre of `dst`.
    Texture {
        texture: TextureHandle,
        src: Rect,
        dst: Rect,
        rotation: f32,
        /// `0.0..=1.0`.
        alpha: f32,
    },
    Fill { rect: Rect, colour: Colour },
}

impl DrawCommand {
    pub fn dst(&self) -> Rect {
        match self {
            DrawCommand::Texture { dst, .. } => *dst,
            DrawCommand::Fill { rect, .. } => *rect,
        }
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        match self {
            DrawCommand::Texture { texture, .. } => Some(*texture),
            DrawCommand::Fill { .. } => None,
        }
    }
}

/// Everything needed to present one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrawList {
    pub clear_colour: Colour,
    /// Commands in world-pass pixels (before zoom).
    pub world: Vec<DrawCommand>,
    pub world_zoom: f32,
    /// Size of the off-screen world target in pixels.
    pub target_size: Vec2,
    /// Degrees the world target is rotated by when composited.
    pub composite_rotation: f32,
    pub window_size: Vec2,
    /// Window-space commands drawn after compositing.
    pub overlay: Vec<DrawCommand>,
}

impl DrawList {
    pub fn len(&self) -> usize {
        self.world.len() + self.overlay.len()
    }

    pub fn is_empty(&self) -> bool {
        self.world.is_empty() && self.overlay.is_empty()
    }
}

struct StoredTexture {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

/// In-memory [`TextureStore`] for headless runs and tests.
#[derive(Default)]
pub struct RecordingStore {
    textures: HashMap<TextureHandle, StoredTexture>,
    next_id: u32,
    uploads: usize,
}

impl RecordingStore {
    /// Number of create/update calls so far.
    pub fn uploads(&self) -> usize {
        self.uploads
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn pixels(&self, handle: TextureHandle) -> Option<&[u8]> {
        self.textures.get(&handle).map(|t| t.rgba.as_slice())
    }
}

fn check_len(rgba: &[u8], width: u32, height: u32) -> Result<()> {
    let expected = width as usize * height as usize * 4;
    if rgba.len() != expected {
        return Err(anyhow!(
            "expected {} bytes for a {}x{} texture, got {}",
            expected,
            width,
            height,
            rgba.len()
        ));
    }
    Ok(())
}

impl TextureStore for RecordingStore {
    fn create_texture(&mut self, rgba: &[u8], width: u32, height: u32) -> Result<TextureHandle> {
        check_len(rgba, width, height)?;
        self.next_id += 1;
        let handle = TextureHandle(self.next_id);
        self.textures.insert(
            handle,
            StoredTexture {
                width,
                height,
                rgba: rgba.to_vec(),
            },
        );
        self.uploads += 1;
        Ok(handle)
    }

    fn update_texture(
        &mut self,
        handle: TextureHandle,
        rgba: &[u8],
        width: u32,
        height: u32,
    ) -> Result<()> {
        check_len(rgba, width, height)?;
        let texture = self
            .textures
            .get_mut(&handle)
            .ok_or_else(|| anyhow!("unknown texture {:?}", handle))?;
        texture.width = width;
        texture.height = height;
        texture.rgba = rgba.to_vec();
        self.uploads += 1;
        Ok(())
    }

    fn texture_size(&self, handle: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&handle).map(|t| (t.width, t.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_store_tracks_sizes_and_updates() {
        let mut store = RecordingStore::default();
        let a = store.create_texture(&[0; 16], 2, 2).unwrap();
        assert_eq!(store.texture_size(a), Some((2, 2)));

        store.update_texture(a, &[255; 24], 3, 2).unwrap();
        assert_eq!(store.texture_size(a), Some((3, 2)));
        assert_eq!(store.uploads(), 2);
        assert!(store.create_texture(&[0; 3], 1, 1).is_err());
    }
}
