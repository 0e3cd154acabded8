use std::collections::HashMap;

use ab_glyph::{point, Font, FontArc, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};

use crate::assets::atlas::Atlas;
use crate::error::AssetError;
use crate::math::{Colour, Rect};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct GlyphKey {
    ch: char,
    colour: Colour,
    background: Option<Colour>,
}

/// A font rasterised on demand into its own atlas.
///
/// Every glyph cell spans the full line height so that glyphs can be laid out
/// side by side without per-glyph bearings.
pub struct FontFace {
    font: FontArc,
    resolution: f32,
    glyphs: HashMap<GlyphKey, Rect>,
    atlas: Atlas,
}

impl FontFace {
    pub fn from_bytes(
        name: &str,
        bytes: Vec<u8>,
        resolution: f32,
        max_atlas_width: u32,
    ) -> Result<Self, AssetError> {
        let font = FontArc::try_from_vec(bytes).map_err(|e| AssetError::Font {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            font,
            resolution: resolution.max(1.0),
            glyphs: HashMap::new(),
            atlas: Atlas::new(max_atlas_width),
        })
    }

    /// Atlas rectangle of a glyph cell, rasterising it on first use.
    pub fn glyph(&mut self, ch: char, colour: Colour, background: Option<Colour>) -> Rect {
        let key = GlyphKey {
            ch,
            colour,
            background,
        };
        if let Some(rect) = self.glyphs.get(&key) {
            return *rect;
        }
        let cell = self.rasterize(ch, colour, background);
        let rect = self.atlas.pack(&cell);
        log::trace!("Rasterised glyph {:?} into {:?}", ch, rect);
        self.glyphs.insert(key, rect);
        rect
    }

    pub fn cached_glyphs(&self) -> usize {
        self.glyphs.len()
    }

    pub fn atlas_mut(&mut self) -> &mut Atlas {
        &mut self.atlas
    }

    fn rasterize(&self, ch: char, colour: Colour, background: Option<Colour>) -> RgbaImage {
        let scale = PxScale::from(self.resolution);
        let scaled = self.font.as_scaled(scale);
        let glyph_id = self.font.glyph_id(ch);

        let ascent = scaled.ascent();
        let height = (ascent - scaled.descent()).ceil().max(1.0) as u32;
        let width = scaled.h_advance(glyph_id).ceil().max(1.0) as u32;

        let fill = background.map_or(Rgba([0, 0, 0, 0]), |bg| {
            Rgba([bg.r, bg.g, bg.b, bg.a])
        });
        let mut cell = RgbaImage::from_pixel(width, height, fill);

        let glyph = glyph_id.with_scale_and_position(scale, point(0.0, ascent));
        if let Some(outlined) = scaled.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|x, y, coverage| {
                let px = bounds.min.x as i32 + x as i32;
                let py = bounds.min.y as i32 + y as i32;
                if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                    return;
                }
                let pixel = cell.get_pixel_mut(px as u32, py as u32);
                *pixel = blend(*pixel, colour, coverage, background.is_some());
            });
        }
        cell
    }
}

fn blend(under: Rgba<u8>, colour: Colour, coverage: f32, opaque: bool) -> Rgba<u8> {
    let c = coverage.clamp(0.0, 1.0);
    if !opaque {
        let a = (colour.a as f32 * c).round() as u8;
        return Rgba([colour.r, colour.g, colour.b, a.max(under[3])]);
    }
    let mix = |from: u8, to: u8| (from as f32 + (to as f32 - from as f32) * c).round() as u8;
    Rgba([
        mix(under[0], colour.r),
        mix(under[1], colour.g),
        mix(under[2], colour.b),
        under[3].max(mix(under[3], colour.a)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage_font_data() {
        let err = FontFace::from_bytes("broken", vec![0, 1, 2, 3], 100.0, 7000)
            .err()
            .unwrap();
        assert!(matches!(err, AssetError::Font { ref name, .. } if name == "broken"));
    }

    #[test]
    fn blend_over_background_interpolates() {
        let under = Rgba([0, 0, 0, 255]);
        let out = blend(under, Colour::WHITE, 0.5, true);
        assert_eq!(out, Rgba([128, 128, 128, 255]));
    }

    #[test]
    fn blend_without_background_uses_coverage_as_alpha() {
        let out = blend(Rgba([0, 0, 0, 0]), Colour::rgb(255, 0, 0), 0.25, false);
        assert_eq!(out, Rgba([255, 0, 0, 64]));
    }
}
