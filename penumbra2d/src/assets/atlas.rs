use anyhow::Result;
use image::RgbaImage;

use crate::math::Rect;
use crate::render::{TextureHandle, TextureStore};

/// Images packed left to right into a single texture.
///
/// A row wraps below its tallest item when the next image would cross
/// `max_width`. The CPU copy is kept so the atlas can be re-uploaded after the
/// GPU backend is recreated.
pub struct Atlas {
    image: RgbaImage,
    cursor: (u32, u32),
    row_height: u32,
    max_width: u32,
    frames: Vec<Rect>,
    handle: Option<TextureHandle>,
    dirty: bool,
}

impl Atlas {
    pub fn new(max_width: u32) -> Self {
        Self {
            image: RgbaImage::new(0, 0),
            cursor: (0, 0),
            row_height: 0,
            max_width: max_width.max(1),
            frames: Vec::new(),
            handle: None,
            dirty: true,
        }
    }

    /// Copy `tile` into the atlas and return its source rectangle in pixels.
    pub fn pack(&mut self, tile: &RgbaImage) -> Rect {
        let (w, h) = tile.dimensions();
        if self.cursor.0 > 0 && self.cursor.0 + w > self.max_width {
            self.cursor = (0, self.cursor.1 + self.row_height);
            self.row_height = 0;
        }
        let (x, y) = self.cursor;
        self.grow(x + w, y + h);
        image::imageops::replace(&mut self.image, tile, x as i64, y as i64);

        self.cursor.0 += w;
        self.row_height = self.row_height.max(h);
        self.dirty = true;

        let frame = Rect::new(x as f32, y as f32, w as f32, h as f32);
        self.frames.push(frame);
        frame
    }

    fn grow(&mut self, min_w: u32, min_h: u32) {
        let (w, h) = self.image.dimensions();
        if min_w <= w && min_h <= h {
            return;
        }
        let mut grown = RgbaImage::new(w.max(min_w), h.max(min_h));
        image::imageops::replace(&mut grown, &self.image, 0, 0);
        self.image = grown;
    }

    /// Source rectangles in packing order.
    pub fn frames(&self) -> &[Rect] {
        &self.frames
    }

    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Upload pending changes and return the atlas texture.
    pub fn upload(&mut self, store: &mut dyn TextureStore) -> Result<TextureHandle> {
        if self.image.width() == 0 || self.image.height() == 0 {
            self.image = RgbaImage::new(1, 1);
        }
        let (w, h) = self.image.dimensions();
        match self.handle {
            Some(handle) if !self.dirty => Ok(handle),
            Some(handle) => {
                store.update_texture(handle, self.image.as_raw(), w, h)?;
                self.dirty = false;
                Ok(handle)
            }
            None => {
                let handle = store.create_texture(self.image.as_raw(), w, h)?;
                self.handle = Some(handle);
                self.dirty = false;
                Ok(handle)
            }
        }
    }

    /// Forget the GPU texture; the next [`Atlas::upload`] recreates it.
    pub fn invalidate(&mut self) {
        self.handle = None;
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn tile(w: u32, h: u32, value: u8) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([value, value, value, 255]))
    }

    #[test]
    fn packs_in_rows_and_wraps_below_tallest() {
        let mut atlas = Atlas::new(100);
        let a = atlas.pack(&tile(40, 10, 1));
        let b = atlas.pack(&tile(40, 30, 2));
        let c = atlas.pack(&tile(40, 5, 3));

        assert_eq!(a, Rect::new(0.0, 0.0, 40.0, 10.0));
        assert_eq!(b, Rect::new(40.0, 0.0, 40.0, 30.0));
        assert_eq!(c, Rect::new(0.0, 30.0, 40.0, 5.0));
        assert_eq!(atlas.size(), (80, 35));
        assert_eq!(atlas.image().get_pixel(45, 5)[0], 2);
        assert_eq!(atlas.image().get_pixel(5, 32)[0], 3);
    }

    #[test]
    fn oversized_tile_starts_its_own_row() {
        let mut atlas = Atlas::new(50);
        let a = atlas.pack(&tile(80, 4, 1));
        assert_eq!(a.pos().x, 0.0);
        let b = atlas.pack(&tile(10, 4, 1));
        assert_eq!(b, Rect::new(0.0, 4.0, 10.0, 4.0));
    }
}
