use anyhow::Result;

use crate::assets::AssetCache;
use crate::camera::Camera;
use crate::math::{Colour, Rect, Vec2};
use crate::object::{ObjectId, SceneObject};
use crate::render::cull;
use crate::render::particles::{particle_commands, EmitterPlacement, ParticleSprite};
use crate::render::shadow::{cast_shadows, Caster, Shade, ShadowConfig};
use crate::render::text::{layout_text, TextStyle};
use crate::render::{DrawCommand, DrawList, TextureStore};
use crate::ui::UiCanvas;
use crate::world::{Background, World};

/// Text drawn in window pixels for a single frame.
#[derive(Clone, Debug, PartialEq)]
pub struct TextRequest {
    pub text: String,
    pub font: String,
    pub position: Vec2,
    /// Line height in window pixels.
    pub height: f32,
    pub colour: Colour,
    pub background: Option<Colour>,
    /// Centre the text on `position` instead of hanging it from its top-left.
    pub centred: bool,
}

impl TextRequest {
    pub fn new(text: impl Into<String>, font: impl Into<String>, position: Vec2, height: f32) -> Self {
        Self {
            text: text.into(),
            font: font.into(),
            position,
            height,
            colour: Colour::WHITE,
            background: None,
            centred: false,
        }
    }
}

/// Lay out `text` and append one textured quad per glyph to `out`.
pub(crate) fn push_text(
    assets: &mut AssetCache,
    store: &mut dyn TextureStore,
    out: &mut Vec<DrawCommand>,
    text: &str,
    style: TextStyle<'_>,
    origin: Vec2,
    alpha: f32,
) -> Result<Vec2> {
    let layout = layout_text(assets, text, style, origin)?;
    if layout.glyphs.is_empty() {
        return Ok(layout.size);
    }
    let texture = assets.font_texture(store, style.font)?;
    out.extend(layout.glyphs.iter().map(|glyph| DrawCommand::Texture {
        texture,
        src: glyph.src,
        dst: glyph.dst,
        rotation: 0.0,
        alpha,
    }));
    Ok(layout.size)
}

/// Per-frame drawing state: target sizes, shadow settings and the shadow
/// queues filled while objects are drawn.
pub struct Renderer {
    window_size: Vec2,
    background_colour: Colour,
    shadows: ShadowConfig,
    origin: Vec2,
    casters: Vec<Caster>,
    shades: Vec<Shade>,
    drawn_objects: usize,
}

impl Renderer {
    pub fn new(width: u32, height: u32, shadows: ShadowConfig) -> Self {
        Self {
            window_size: Vec2::new(width.max(1) as f32, height.max(1) as f32),
            background_colour: Colour::BLACK,
            shadows,
            origin: Vec2::ZERO,
            casters: Vec::new(),
            shades: Vec::new(),
            drawn_objects: 0,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.window_size = Vec2::new(width.max(1) as f32, height.max(1) as f32);
    }

    pub fn window_size(&self) -> Vec2 {
        self.window_size
    }

    pub fn set_background_colour(&mut self, colour: Colour) {
        self.background_colour = colour;
    }

    pub fn shadow_config(&self) -> &ShadowConfig {
        &self.shadows
    }

    pub fn shadow_config_mut(&mut self) -> &mut ShadowConfig {
        &mut self.shadows
    }

    /// World origin in world-pass pixels, as of the last frame.
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    /// Objects that passed culling in the last frame.
    pub fn drawn_objects(&self) -> usize {
        self.drawn_objects
    }

    /// Build the draw list for one frame.
    ///
    /// The camera must already be up to date. Layers are drawn from the
    /// highest index to the lowest, each sorted by depth and culled by sector.
    pub fn draw_frame(
        &mut self,
        world: &mut World,
        assets: &mut AssetCache,
        store: &mut dyn TextureStore,
    ) -> Result<DrawList> {
        assets.publish(store)?;
        world.scene.sort_layers(&world.physics);

        let camera = &world.camera;
        let zoom = camera.zoom.max(f32::EPSILON);
        let target = camera.target_size() / zoom;
        self.origin = camera.world_to_screen(Vec2::ZERO, Vec2::ZERO).0;
        self.casters.clear();
        self.shades.clear();
        self.drawn_objects = 0;

        let mut list = DrawList {
            clear_colour: self.background_colour,
            world_zoom: zoom,
            target_size: camera.target_size(),
            composite_rotation: camera.rotation,
            window_size: self.window_size,
            ..DrawList::default()
        };

        if let Some(background) = &world.background {
            draw_background(background, camera, target, assets, store, &mut list.world)?;
        }

        for layer in world.scene.draw_order() {
            let ids = world.scene.layer(layer);
            for range in cull::sector_ranges(ids.len()) {
                let sector = &ids[range];
                // Locked objects live in window space and skip both culling levels.
                let mut locked = Vec::new();
                let rects = sector.iter().filter_map(|id| {
                    let object = world.scene.get(*id)?;
                    if object.is_locked() {
                        locked.push(*id);
                        None
                    } else {
                        Some(object.bounds())
                    }
                });
                let in_view = cull::sector_in_view(rects, camera);

                if !in_view {
                    for id in &locked {
                        if let Some(object) = world.scene.get(*id) {
                            self.draw_locked(object, assets, store, &mut list.overlay)?;
                            self.drawn_objects += 1;
                        }
                    }
                    continue;
                }

                for id in sector {
                    let Some(object) = world.scene.get(*id) else {
                        continue;
                    };
                    if object.is_locked() {
                        self.draw_locked(object, assets, store, &mut list.overlay)?;
                    } else if cull::object_visible(&object.bounds(), camera) {
                        self.draw_object(*id, object, world.time, camera, assets, store, &mut list.world)?;
                    } else {
                        continue;
                    }
                    self.drawn_objects += 1;
                }
            }
        }

        if self.shadows.enabled {
            list.world.extend(cast_shadows(
                &self.casters,
                &self.shades,
                world.shadow_direction,
                target.y,
                &self.shadows,
            ));
        }

        let window = Rect::from_pos_size(Vec2::ZERO, self.window_size);
        let mut canvas = UiCanvas::new(assets, store, &mut list.overlay);
        world.gui.render(&mut canvas, window)?;

        for request in world.take_text() {
            let style = TextStyle {
                font: &request.font,
                height: request.height,
                colour: request.colour,
                background: request.background,
            };
            let origin = if request.centred {
                let size = crate::render::text::measure_text(assets, &request.text, style)?;
                request.position - size / 2.0
            } else {
                request.position
            };
            push_text(assets, store, &mut list.overlay, &request.text, style, origin, 1.0)?;
        }

        log::trace!(
            "Frame: {} world commands, {} overlay commands, {} objects",
            list.world.len(),
            list.overlay.len(),
            self.drawn_objects
        );
        Ok(list)
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_object(
        &mut self,
        id: ObjectId,
        object: &SceneObject,
        now: f32,
        camera: &Camera,
        assets: &mut AssetCache,
        store: &mut dyn TextureStore,
        out: &mut Vec<DrawCommand>,
    ) -> Result<()> {
        let (pos, size) = camera.world_to_screen(object.position, object.size);
        let dst = Rect::from_pos_size(pos, size);

        if let Some(name) = &object.texture {
            let (texture, src) = assets.resolve(store, name)?;
            out.push(DrawCommand::Texture {
                texture,
                src,
                dst,
                rotation: object.rotation,
                alpha: object.opacity,
            });
            self.queue_shadow(id, object, name, dst, assets, store)?;
        }

        if let Some(emitter) = &object.emitter {
            let props = emitter.properties();
            let placement = EmitterPlacement {
                position: object.position,
                dst,
                scale: camera.scale(),
            };
            if props.flipbook {
                let (texture, frames) = assets.flipbook(store, &props.texture)?;
                let sprite = ParticleSprite::Flipbook {
                    texture,
                    frames: &frames,
                };
                out.extend(particle_commands(emitter, placement, sprite, now));
            } else {
                let (texture, src) = assets.resolve(store, &props.texture)?;
                let sprite = ParticleSprite::Single { texture, src };
                out.extend(particle_commands(emitter, placement, sprite, now));
            }
        }

        if let Some(text) = &object.text {
            let style = TextStyle {
                font: &text.font,
                height: text.size * camera.scale(),
                colour: text.colour,
                background: text.background,
            };
            let measured = crate::render::text::measure_text(assets, &text.text, style)?;
            let origin = dst.center() - measured / 2.0;
            push_text(assets, store, out, &text.text, style, origin, object.opacity)?;
        }
        Ok(())
    }

    fn queue_shadow(
        &mut self,
        id: ObjectId,
        object: &SceneObject,
        texture: &str,
        dst: Rect,
        assets: &mut AssetCache,
        store: &mut dyn TextureStore,
    ) -> Result<()> {
        if !self.shadows.enabled {
            return Ok(());
        }
        if object.receives_shadow {
            self.shades.push(Shade { id, rect: dst });
        }
        // The silhouette needs decoded pixels; skip casting until they arrive.
        if object.casts_shadow && assets.is_loaded(texture) {
            let silhouette = assets.shadow_for(store, texture)?;
            let (w, h) = store.texture_size(silhouette).unwrap_or((1, 1));
            self.casters.push(Caster {
                id,
                silhouette,
                src: Rect::new(0.0, 0.0, w as f32, h as f32),
                rect: dst,
                rotation: object.rotation,
            });
        }
        Ok(())
    }

    fn draw_locked(
        &mut self,
        object: &SceneObject,
        assets: &mut AssetCache,
        store: &mut dyn TextureStore,
        out: &mut Vec<DrawCommand>,
    ) -> Result<()> {
        let Some(rect) = object.locked else {
            return Ok(());
        };
        if let Some(name) = &object.texture {
            let (texture, src) = assets.resolve(store, name)?;
            out.push(DrawCommand::Texture {
                texture,
                src,
                dst: rect,
                rotation: object.rotation,
                alpha: object.opacity,
            });
        }
        if let Some(text) = &object.text {
            let scale = if object.size.y > 0.0 {
                rect.h / object.size.y
            } else {
                1.0
            };
            let style = TextStyle {
                font: &text.font,
                height: text.size * scale,
                colour: text.colour,
                background: text.background,
            };
            let measured = crate::render::text::measure_text(assets, &text.text, style)?;
            push_text(
                assets,
                store,
                out,
                &text.text,
                style,
                rect.center() - measured / 2.0,
                object.opacity,
            )?;
        }
        Ok(())
    }
}

fn draw_background(
    background: &Background,
    camera: &Camera,
    target: Vec2,
    assets: &mut AssetCache,
    store: &mut dyn TextureStore,
    out: &mut Vec<DrawCommand>,
) -> Result<()> {
    let (texture, src) = assets.resolve(store, &background.texture)?;
    let tile = |x: f32, y: f32| DrawCommand::Texture {
        texture,
        src,
        dst: Rect::new(x, y, target.x, target.y),
        rotation: 0.0,
        alpha: 1.0,
    };
    if !background.tiled {
        out.push(tile(0.0, 0.0));
        return Ok(());
    }
    let scroll = camera.position * camera.scale() * background.parallax;
    let offset = Vec2::new(scroll.x.rem_euclid(target.x), scroll.y.rem_euclid(target.y));
    for row in -1..=1 {
        for col in -1..=1 {
            out.push(tile(
                col as f32 * target.x - offset.x,
                row as f32 * target.y - offset.y,
            ));
        }
    }
    Ok(())
}
