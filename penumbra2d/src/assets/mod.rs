//! Texture, atlas and font cache.
//!
//! Images are decoded on background threads and published on the render
//! thread once complete. Until then [`AssetCache::resolve`] hands out a 1x1
//! placeholder so a frame never blocks on disk.

mod atlas;
mod fonts;
mod loader;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

pub use atlas::Atlas;
pub use fonts::FontFace;
pub use loader::find_file;

use crate::error::AssetError;
use crate::math::{Colour, Rect, Vec2};
use crate::render::text::GlyphSource;
use crate::render::{TextureHandle, TextureStore};
use loader::{spawn_decode, Decoded};

/// Where assets live and how they are prepared.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub root: PathBuf,
    pub textures_dir: String,
    pub fonts_dir: String,
    pub max_atlas_width: u32,
    /// Pixel height glyphs are rasterised at.
    pub font_resolution: f32,
    /// Textures are divided by this factor on load.
    pub downscaling: f32,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("assets"),
            textures_dir: "textures".to_string(),
            fonts_dir: "fonts".to_string(),
            max_atlas_width: 7000,
            font_resolution: 100.0,
            downscaling: 1.0,
        }
    }
}

impl AssetConfig {
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn textures_path(&self) -> PathBuf {
        self.root.join(&self.textures_dir)
    }

    pub fn fonts_path(&self) -> PathBuf {
        self.root.join(&self.fonts_dir)
    }
}

#[derive(Clone, Debug)]
enum TextureEntry {
    Standalone { handle: TextureHandle, size: (u32, u32) },
    Packed { atlas: String, region: Rect },
}

pub struct AssetCache {
    config: AssetConfig,
    textures: HashMap<String, TextureEntry>,
    images: HashMap<String, Arc<RgbaImage>>,
    failed: HashMap<String, String>,
    in_flight: HashMap<String, JoinHandle<()>>,
    sender: Sender<Decoded>,
    receiver: Receiver<Decoded>,
    placeholder: Option<TextureHandle>,
    shadows: HashMap<String, TextureHandle>,
    outlines: HashMap<(String, u32), Vec<Vec2>>,
    atlases: HashMap<String, Atlas>,
    fonts: HashMap<String, FontFace>,
}

impl AssetCache {
    pub fn new(config: AssetConfig) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        log::info!("Asset root: {}", config.root.display());
        Self {
            config,
            textures: HashMap::new(),
            images: HashMap::new(),
            failed: HashMap::new(),
            in_flight: HashMap::new(),
            sender,
            receiver,
            placeholder: None,
            shadows: HashMap::new(),
            outlines: HashMap::new(),
            atlases: HashMap::new(),
            fonts: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    /// Prepare GPU-side state after a backend has been (re)created.
    pub fn init(&mut self, store: &mut dyn TextureStore) -> Result<(), AssetError> {
        let handle = store
            .create_texture(&[0, 0, 0, 0], 1, 1)
            .map_err(upload_error)?;
        self.placeholder = Some(handle);
        for atlas in self.atlases.values_mut() {
            atlas.invalidate();
        }
        for face in self.fonts.values_mut() {
            face.atlas_mut().invalidate();
        }
        Ok(())
    }

    /// Wait for every pending load, then drop all GPU-side state.
    ///
    /// Atlas and font images survive so [`AssetCache::init`] can upload them
    /// again.
    pub fn reset(&mut self) {
        for (name, handle) in self.in_flight.drain() {
            if handle.join().is_err() {
                log::warn!("Loader thread for '{}' panicked", name);
            }
        }
        while self.receiver.try_recv().is_ok() {}

        self.textures
            .retain(|_, entry| matches!(entry, TextureEntry::Packed { .. }));
        self.images.retain(|name, _| self.textures.contains_key(name));
        self.failed.clear();
        self.placeholder = None;
        self.shadows.clear();
        self.outlines.clear();
        for atlas in self.atlases.values_mut() {
            atlas.invalidate();
        }
        for face in self.fonts.values_mut() {
            face.atlas_mut().invalidate();
        }
        log::debug!("Asset cache reset");
    }

    pub fn is_loading(&self, name: &str) -> bool {
        self.in_flight.contains_key(name)
    }

    pub fn pending_loads(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.textures.contains_key(name)
    }

    /// Texture and source rectangle for `name`, or the placeholder while the
    /// image is still decoding.
    pub fn resolve(
        &mut self,
        store: &mut dyn TextureStore,
        name: &str,
    ) -> Result<(TextureHandle, Rect), AssetError> {
        self.publish(store)?;
        if let Some(found) = self.lookup(store, name)? {
            return Ok(found);
        }
        if !self.in_flight.contains_key(name) {
            self.begin_load(name)?;
        }
        let placeholder = self.placeholder(store)?;
        Ok((placeholder, Rect::new(0.0, 0.0, 1.0, 1.0)))
    }

    /// Like [`AssetCache::resolve`], but blocks until the image is available.
    pub fn resolve_now(
        &mut self,
        store: &mut dyn TextureStore,
        name: &str,
    ) -> Result<(TextureHandle, Rect), AssetError> {
        self.publish(store)?;
        if let Some(found) = self.lookup(store, name)? {
            return Ok(found);
        }
        if !self.in_flight.contains_key(name) {
            self.begin_load(name)?;
        }
        if let Some(handle) = self.in_flight.remove(name) {
            if handle.join().is_err() {
                log::warn!("Loader thread for '{}' panicked", name);
            }
        }
        self.publish(store)?;
        self.lookup(store, name)?.ok_or_else(|| AssetError::Decode {
            name: name.to_string(),
            reason: "loader finished without producing an image".to_string(),
        })
    }

    /// Move finished decodes into the cache, uploading them to `store`.
    pub fn publish(&mut self, store: &mut dyn TextureStore) -> Result<usize, AssetError> {
        let mut published = 0;
        while let Ok(Decoded { name, result }) = self.receiver.try_recv() {
            if let Some(handle) = self.in_flight.remove(&name) {
                let _ = handle.join();
            }
            match result {
                Ok(image) => {
                    let size = image.dimensions();
                    let handle = store
                        .create_texture(image.as_raw(), size.0, size.1)
                        .map_err(upload_error)?;
                    log::debug!("Texture '{}' ready ({}x{})", name, size.0, size.1);
                    self.images.insert(name.clone(), Arc::new(image));
                    self.textures
                        .insert(name, TextureEntry::Standalone { handle, size });
                    published += 1;
                }
                Err(reason) => {
                    log::warn!("Failed to decode texture '{}': {}", name, reason);
                    self.failed.insert(name, reason);
                }
            }
        }
        Ok(published)
    }

    fn lookup(
        &mut self,
        store: &mut dyn TextureStore,
        name: &str,
    ) -> Result<Option<(TextureHandle, Rect)>, AssetError> {
        if let Some(reason) = self.failed.get(name) {
            return Err(AssetError::Decode {
                name: name.to_string(),
                reason: reason.clone(),
            });
        }
        match self.textures.get(name) {
            None => Ok(None),
            Some(TextureEntry::Standalone { handle, size }) => Ok(Some((
                *handle,
                Rect::new(0.0, 0.0, size.0 as f32, size.1 as f32),
            ))),
            Some(TextureEntry::Packed { atlas, region }) => {
                let region = *region;
                let atlas = self
                    .atlases
                    .get_mut(atlas)
                    .ok_or_else(|| AssetError::UnknownAtlas(atlas.clone()))?;
                let handle = atlas.upload(store).map_err(upload_error)?;
                Ok(Some((handle, region)))
            }
        }
    }

    fn begin_load(&mut self, name: &str) -> Result<(), AssetError> {
        let path = find_file(&self.config.textures_path(), name)?;
        log::debug!("Loading '{}' from {}", name, path.display());
        let handle = spawn_decode(
            name.to_string(),
            path,
            self.config.downscaling,
            self.sender.clone(),
        )?;
        self.in_flight.insert(name.to_string(), handle);
        Ok(())
    }

    fn placeholder(&mut self, store: &mut dyn TextureStore) -> Result<TextureHandle, AssetError> {
        if let Some(handle) = self.placeholder {
            return Ok(handle);
        }
        let handle = store
            .create_texture(&[0, 0, 0, 0], 1, 1)
            .map_err(upload_error)?;
        self.placeholder = Some(handle);
        Ok(handle)
    }

    fn image_now(
        &mut self,
        store: &mut dyn TextureStore,
        name: &str,
    ) -> Result<Arc<RgbaImage>, AssetError> {
        if let Some(image) = self.images.get(name) {
            return Ok(Arc::clone(image));
        }
        self.resolve_now(store, name)?;
        self.images
            .get(name)
            .cloned()
            .ok_or_else(|| AssetError::Decode {
                name: name.to_string(),
                reason: "no CPU copy of the image is available".to_string(),
            })
    }

    /// Black silhouette of `name`, covering every pixel with alpha above 127.
    pub fn shadow_for(
        &mut self,
        store: &mut dyn TextureStore,
        name: &str,
    ) -> Result<TextureHandle, AssetError> {
        if let Some(handle) = self.shadows.get(name) {
            return Ok(*handle);
        }
        let image = self.image_now(store, name)?;
        let silhouette = silhouette(&image);
        let handle = store
            .create_texture(silhouette.as_raw(), silhouette.width(), silhouette.height())
            .map_err(upload_error)?;
        self.shadows.insert(name.to_string(), handle);
        Ok(handle)
    }

    /// Boundary of the alpha mask as points normalised to the image width and
    /// centred on the origin. `precision` defaults to one sample per 1/25 of the
    /// longest side.
    pub fn texture_outline(
        &mut self,
        store: &mut dyn TextureStore,
        name: &str,
        precision: Option<u32>,
    ) -> Result<Vec<Vec2>, AssetError> {
        let image = self.image_now(store, name)?;
        let precision = precision
            .unwrap_or_else(|| default_precision(image.width(), image.height()))
            .max(1);
        let key = (name.to_string(), precision);
        if let Some(points) = self.outlines.get(&key) {
            return Ok(points.clone());
        }
        let points = outline(&image, precision);
        self.outlines.insert(key, points.clone());
        Ok(points)
    }

    pub fn make_atlas(&mut self, name: &str) {
        let width = self.config.max_atlas_width;
        self.atlases
            .entry(name.to_string())
            .or_insert_with(|| Atlas::new(width));
    }

    pub fn has_atlas(&self, name: &str) -> bool {
        self.atlases.contains_key(name)
    }

    /// Pack `texture` into `atlas`; later resolutions of `texture` point at the
    /// atlas region.
    pub fn add_to_atlas(
        &mut self,
        store: &mut dyn TextureStore,
        texture: &str,
        atlas: &str,
    ) -> Result<Rect, AssetError> {
        if !self.atlases.contains_key(atlas) {
            return Err(AssetError::UnknownAtlas(atlas.to_string()));
        }
        let image = self.image_now(store, texture)?;
        let target = self
            .atlases
            .get_mut(atlas)
            .ok_or_else(|| AssetError::UnknownAtlas(atlas.to_string()))?;
        let region = target.pack(&image);
        log::debug!("Packed '{}' into atlas '{}' at {:?}", texture, atlas, region);
        self.textures.insert(
            texture.to_string(),
            TextureEntry::Packed {
                atlas: atlas.to_string(),
                region,
            },
        );
        Ok(region)
    }

    /// Atlas texture and its frames in packing order.
    pub fn flipbook(
        &mut self,
        store: &mut dyn TextureStore,
        name: &str,
    ) -> Result<(TextureHandle, Vec<Rect>), AssetError> {
        let atlas = self
            .atlases
            .get_mut(name)
            .ok_or_else(|| AssetError::UnknownAtlas(name.to_string()))?;
        let handle = atlas.upload(store).map_err(upload_error)?;
        Ok((handle, atlas.frames().to_vec()))
    }

    fn font(&mut self, name: &str) -> Result<&mut FontFace, AssetError> {
        if !self.fonts.contains_key(name) {
            let path = find_file(&self.config.fonts_path(), name)?;
            let bytes = std::fs::read(&path)?;
            let face = FontFace::from_bytes(
                name,
                bytes,
                self.config.font_resolution,
                self.config.max_atlas_width,
            )?;
            log::info!("Loaded font '{}' from {}", name, path.display());
            self.fonts.insert(name.to_string(), face);
        }
        self.fonts
            .get_mut(name)
            .ok_or_else(|| AssetError::UnknownAtlas(format!("fonts/{name}")))
    }

    /// Register a font from memory, bypassing the fonts directory.
    pub fn add_font(&mut self, name: &str, bytes: Vec<u8>) -> Result<(), AssetError> {
        let face = FontFace::from_bytes(
            name,
            bytes,
            self.config.font_resolution,
            self.config.max_atlas_width,
        )?;
        self.fonts.insert(name.to_string(), face);
        Ok(())
    }

    /// Source rectangle of a glyph cell inside the font's atlas.
    pub fn font_glyph(
        &mut self,
        font: &str,
        ch: char,
        colour: Colour,
        background: Option<Colour>,
    ) -> Result<Rect, AssetError> {
        Ok(self.font(font)?.glyph(ch, colour, background))
    }

    pub fn font_texture(
        &mut self,
        store: &mut dyn TextureStore,
        font: &str,
    ) -> Result<TextureHandle, AssetError> {
        self.font(font)?
            .atlas_mut()
            .upload(store)
            .map_err(upload_error)
    }
}

impl GlyphSource for AssetCache {
    fn glyph_rect(
        &mut self,
        font: &str,
        ch: char,
        colour: Colour,
        background: Option<Colour>,
    ) -> Result<Rect, AssetError> {
        self.font_glyph(font, ch, colour, background)
    }
}

impl Drop for AssetCache {
    fn drop(&mut self) {
        for (_, handle) in self.in_flight.drain() {
            let _ = handle.join();
        }
    }
}

fn upload_error(err: anyhow::Error) -> AssetError {
    AssetError::Upload(format!("{err:#}"))
}

fn default_precision(width: u32, height: u32) -> u32 {
    (width.max(height) as f32 / 25.0).ceil() as u32
}

fn solid(image: &RgbaImage, x: i64, y: i64) -> bool {
    if x < 0 || y < 0 || x >= image.width() as i64 || y >= image.height() as i64 {
        return false;
    }
    image.get_pixel(x as u32, y as u32)[3] > 127
}

fn silhouette(image: &RgbaImage) -> RgbaImage {
    RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y)[3] > 127 {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

fn outline(image: &RgbaImage, precision: u32) -> Vec<Vec2> {
    let w = image.width().max(1) as f32;
    let mut boundary = Vec::new();
    for y in 0..image.height() as i64 {
        for x in 0..image.width() as i64 {
            if !solid(image, x, y) {
                continue;
            }
            let edge = [(1, 0), (-1, 0), (0, 1), (0, -1)]
                .iter()
                .any(|(dx, dy)| !solid(image, x + dx, y + dy));
            if edge {
                boundary.push((x, y));
            }
        }
    }
    boundary
        .into_iter()
        .step_by(precision as usize)
        .map(|(x, y)| Vec2::new(x as f32 / w - 0.5, y as f32 / w - 0.5))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RecordingStore;

    fn write_png(dir: &std::path::Path, name: &str, image: &RgbaImage) {
        std::fs::create_dir_all(dir).unwrap();
        image.save(dir.join(format!("{name}.png"))).unwrap();
    }

    fn cache_in(root: &std::path::Path) -> AssetCache {
        AssetCache::new(AssetConfig::default().with_root(root))
    }

    fn disc(size: u32) -> RgbaImage {
        let r = size as f32 / 2.0;
        RgbaImage::from_fn(size, size, |x, y| {
            let d = ((x as f32 + 0.5 - r).powi(2) + (y as f32 + 0.5 - r).powi(2)).sqrt();
            if d < r {
                Rgba([200, 50, 50, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        })
    }

    #[test]
    fn resolve_returns_placeholder_then_texture() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("textures"), "crate", &disc(8));
        let mut store = RecordingStore::default();
        let mut cache = cache_in(dir.path());
        cache.init(&mut store).unwrap();

        let (first, src) = cache.resolve(&mut store, "crate").unwrap();
        let placeholder = cache.placeholder.unwrap();
        if first == placeholder {
            assert_eq!(src, Rect::new(0.0, 0.0, 1.0, 1.0));
        }

        let (handle, src) = cache.resolve_now(&mut store, "crate").unwrap();
        assert_ne!(handle, placeholder);
        assert_eq!(src, Rect::new(0.0, 0.0, 8.0, 8.0));
        assert_eq!(store.texture_size(handle), Some((8, 8)));
        assert_eq!(cache.pending_loads(), 0);

        // Cached: no further uploads.
        let uploads = store.uploads();
        assert_eq!(cache.resolve(&mut store, "crate").unwrap().0, handle);
        assert_eq!(store.uploads(), uploads);
    }

    #[test]
    fn reset_joins_pending_loads_and_discards_their_results() {
        let dir = tempfile::tempdir().unwrap();
        let textures = dir.path().join("textures");
        let names = ["a", "b", "c", "d"];
        for name in names {
            write_png(&textures, name, &disc(64));
        }
        let mut store = RecordingStore::default();
        let mut cache = cache_in(dir.path());
        cache.init(&mut store).unwrap();

        let placeholder = cache.resolve(&mut store, "a").unwrap().0;
        for name in &names[1..] {
            cache.resolve(&mut store, name).unwrap();
        }
        assert!(cache.is_loading("d") || cache.is_loaded("d"));

        cache.reset();
        for name in names {
            assert!(!cache.is_loading(name));
            assert!(!cache.is_loaded(name));
        }

        // Images decoded by the joined loaders must not reappear after init.
        cache.init(&mut store).unwrap();
        assert_eq!(cache.publish(&mut store).unwrap(), 0);
        assert!(!cache.is_loaded("a"));

        let (handle, src) = cache.resolve_now(&mut store, "a").unwrap();
        assert_ne!(handle, placeholder);
        assert_eq!(src, Rect::new(0.0, 0.0, 64.0, 64.0));
    }

    #[test]
    fn missing_texture_is_fatal_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordingStore::default();
        let mut cache = cache_in(dir.path());
        let err = cache.resolve(&mut store, "ghost").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn undecodable_texture_reports_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let textures = dir.path().join("textures");
        std::fs::create_dir_all(&textures).unwrap();
        std::fs::write(textures.join("junk.png"), b"not a png").unwrap();

        let mut store = RecordingStore::default();
        let mut cache = cache_in(dir.path());
        let err = cache.resolve_now(&mut store, "junk").unwrap_err();
        assert!(matches!(err, AssetError::Decode { .. }));
    }

    #[test]
    fn shadow_is_black_where_opaque() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("textures"), "ball", &disc(10));
        let mut store = RecordingStore::default();
        let mut cache = cache_in(dir.path());

        let shadow = cache.shadow_for(&mut store, "ball").unwrap();
        let pixels = store.pixels(shadow).unwrap();
        // Centre pixel (5, 5) and corner pixel (0, 0).
        let centre = (5 * 10 + 5) * 4;
        assert_eq!(&pixels[centre..centre + 4], &[0, 0, 0, 255]);
        assert_eq!(&pixels[0..4], &[0, 0, 0, 0]);
        assert_eq!(cache.shadow_for(&mut store, "ball").unwrap(), shadow);
    }

    #[test]
    fn outline_points_are_normalised_and_sampled() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("textures"), "ball", &disc(50));
        let mut store = RecordingStore::default();
        let mut cache = cache_in(dir.path());

        let dense = cache.texture_outline(&mut store, "ball", Some(1)).unwrap();
        let sparse = cache.texture_outline(&mut store, "ball", None).unwrap();
        assert!(!dense.is_empty());
        assert!(sparse.len() < dense.len());
        for p in &dense {
            assert!(p.x >= -0.5 && p.x < 0.5);
            assert!(p.y >= -0.5 && p.y < 0.5);
        }
    }

    #[test]
    fn atlas_entries_resolve_to_regions_and_survive_reset() {
        let dir = tempfile::tempdir().unwrap();
        let textures = dir.path().join("textures");
        write_png(&textures, "a", &disc(4));
        write_png(&textures, "b", &disc(6));
        let mut store = RecordingStore::default();
        let mut cache = cache_in(dir.path());
        cache.init(&mut store).unwrap();

        cache.make_atlas("sheet");
        cache.add_to_atlas(&mut store, "a", "sheet").unwrap();
        let region = cache.add_to_atlas(&mut store, "b", "sheet").unwrap();
        assert_eq!(region, Rect::new(4.0, 0.0, 6.0, 6.0));

        let (sheet, src) = cache.resolve(&mut store, "b").unwrap();
        assert_eq!(src, region);
        let (flip, frames) = cache.flipbook(&mut store, "sheet").unwrap();
        assert_eq!(flip, sheet);
        assert_eq!(frames.len(), 2);

        cache.reset();
        cache.init(&mut store).unwrap();
        let (again, src) = cache.resolve(&mut store, "b").unwrap();
        assert_ne!(again, sheet);
        assert_eq!(src, region);
        assert_eq!(store.texture_size(again), Some((10, 6)));
    }

    #[test]
    fn unknown_atlas_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordingStore::default();
        let mut cache = cache_in(dir.path());
        assert!(matches!(
            cache.flipbook(&mut store, "nope"),
            Err(AssetError::UnknownAtlas(_))
        ));
    }

    #[test]
    fn missing_font_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = cache_in(dir.path());
        let err = cache
            .font_glyph("serif", 'A', Colour::WHITE, None)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn default_precision_is_one_per_twenty_fifth() {
        assert_eq!(default_precision(50, 20), 2);
        assert_eq!(default_precision(10, 10), 1);
        assert_eq!(default_precision(51, 3), 3);
    }
}
