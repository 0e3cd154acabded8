use serde::{Deserialize, Serialize};

use crate::math::{Rect, Vec2};
use crate::object::ObjectId;
use crate::render::{DrawCommand, TextureHandle};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub enabled: bool,
    /// Opacity of an unshrunk shadow, `0..=255`.
    pub strength: u8,
    /// Falloff: pixels of fall per pixel of shrink.
    pub distance: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strength: 100,
            distance: 3.0,
        }
    }
}

/// An object that casts a shadow this frame, in world-pass pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Caster {
    pub id: ObjectId,
    pub silhouette: TextureHandle,
    pub src: Rect,
    pub rect: Rect,
    pub rotation: f32,
}

/// An object shadows can land on, in world-pass pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Shade {
    pub id: ObjectId,
    pub rect: Rect,
}

/// Project every caster along `direction` (degrees, 0 = straight down) and
/// drop its silhouette onto the first shade the ray reaches.
///
/// Shades are scanned top to bottom and the first one the ray clips wins, even
/// if another shade lies nearer along the ray.
pub fn cast_shadows(
    casters: &[Caster],
    shades: &[Shade],
    direction: f32,
    reach: f32,
    config: &ShadowConfig,
) -> Vec<DrawCommand> {
    if !config.enabled || casters.is_empty() || shades.is_empty() {
        return Vec::new();
    }
    let mut shades = shades.to_vec();
    shades.sort_by(|a, b| a.rect.y.total_cmp(&b.rect.y));

    let heading = Vec2::from_heading(direction.to_radians());
    let falloff = config.distance.max(f32::EPSILON);
    let mut commands = Vec::new();

    for caster in casters {
        let start = caster.rect.center();
        let end = start + heading * reach;
        let hit = shades
            .iter()
            .filter(|shade| shade.id != caster.id)
            .find_map(|shade| shade.rect.clip_segment(start, end));
        let Some((clip, _)) = hit else {
            continue;
        };

        let shrink = ((caster.rect.bottom() - clip.y).abs() / falloff).max(1.0);
        let w = caster.rect.w - shrink;
        let h = caster.rect.h - shrink;
        if w <= 0.0 || h <= 0.0 {
            continue;
        }

        let alpha = (config.strength as f32 * w / caster.rect.w).round() / 255.0;
        commands.push(DrawCommand::Texture {
            texture: caster.silhouette,
            src: caster.src,
            dst: Rect::new(clip.x - w / 2.0, clip.y, w, h),
            rotation: caster.rotation,
            alpha,
        });
    }
    commands
}
