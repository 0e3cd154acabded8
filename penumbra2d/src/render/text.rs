use crate::error::AssetError;
use crate::math::{Colour, Rect, Vec2};

/// Supplies glyph cells from a font atlas.
pub trait GlyphSource {
    /// Atlas rectangle of the full-line-height cell for `ch`.
    fn glyph_rect(
        &mut self,
        font: &str,
        ch: char,
        colour: Colour,
        background: Option<Colour>,
    ) -> Result<Rect, AssetError>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlyphQuad {
    pub ch: char,
    pub src: Rect,
    pub dst: Rect,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextLayout {
    pub glyphs: Vec<GlyphQuad>,
    pub size: Vec2,
}

#[derive(Clone, Copy, Debug)]
pub struct TextStyle<'a> {
    pub font: &'a str,
    /// Line height in target pixels.
    pub height: f32,
    pub colour: Colour,
    pub background: Option<Colour>,
}

/// Lay out `text` with its top-left corner at `origin`.
///
/// Each glyph is scaled to the line height keeping its cell's aspect ratio.
/// `\n` starts a new line and draws nothing.
pub fn layout_text<S: GlyphSource + ?Sized>(
    source: &mut S,
    text: &str,
    style: TextStyle<'_>,
    origin: Vec2,
) -> Result<TextLayout, AssetError> {
    let mut glyphs = Vec::with_capacity(text.len());
    let mut cursor = origin;
    let mut widest: f32 = 0.0;
    let mut lines = 1;

    for ch in text.chars() {
        if ch == '\n' {
            widest = widest.max(cursor.x - origin.x);
            cursor = Vec2::new(origin.x, cursor.y + style.height);
            lines += 1;
            continue;
        }
        let src = source.glyph_rect(style.font, ch, style.colour, style.background)?;
        let width = if src.h > 0.0 {
            style.height * src.w / src.h
        } else {
            0.0
        };
        glyphs.push(GlyphQuad {
            ch,
            src,
            dst: Rect::new(cursor.x, cursor.y, width, style.height),
        });
        cursor.x += width;
    }
    widest = widest.max(cursor.x - origin.x);

    Ok(TextLayout {
        glyphs,
        size: Vec2::new(widest, lines as f32 * style.height),
    })
}

/// Bounding box of `text` without keeping the glyph quads.
pub fn measure_text<S: GlyphSource + ?Sized>(
    source: &mut S,
    text: &str,
    style: TextStyle<'_>,
) -> Result<Vec2, AssetError> {
    Ok(layout_text(source, text, style, Vec2::ZERO)?.size)
}
