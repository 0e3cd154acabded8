use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use image::imageops::FilterType;
use image::RgbaImage;

use crate::error::AssetError;

/// Result of a background decode, keyed by asset name.
pub(crate) struct Decoded {
    pub name: String,
    pub result: Result<RgbaImage, String>,
}

/// Decode `path` on a worker thread and send the pixels back over `sender`.
pub(crate) fn spawn_decode(
    name: String,
    path: PathBuf,
    downscaling: f32,
    sender: Sender<Decoded>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("decode-{name}"))
        .spawn(move || {
            let result = decode(&path, downscaling);
            // The cache may have been dropped while we were decoding.
            let _ = sender.send(Decoded { name, result });
        })
}

pub(crate) fn decode(path: &Path, downscaling: f32) -> Result<RgbaImage, String> {
    let image = image::open(path).map_err(|e| e.to_string())?.to_rgba8();
    if downscaling <= 1.0 {
        return Ok(image);
    }
    let w = ((image.width() as f32 / downscaling).round() as u32).max(1);
    let h = ((image.height() as f32 / downscaling).round() as u32).max(1);
    Ok(image::imageops::resize(&image, w, h, FilterType::Triangle))
}

/// Find a file under `dir` whose stem equals the last segment of `name`.
///
/// `name` may contain `/` to address sub-directories; the extension is ignored.
pub fn find_file(dir: &Path, name: &str) -> Result<PathBuf, AssetError> {
    let not_found = || AssetError::NotFound {
        name: name.to_string(),
        directory: dir.to_path_buf(),
    };

    let (sub, stem) = match name.rsplit_once('/') {
        Some((sub, stem)) => (dir.join(sub), stem),
        None => (dir.to_path_buf(), name),
    };
    let entries = std::fs::read_dir(&sub).map_err(|_| not_found())?;

    let mut matches: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.file_stem().and_then(|s| s.to_str()) == Some(stem))
        .collect();
    matches.sort();
    matches.into_iter().next().ok_or_else(not_found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn finds_by_stem_in_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("tiles")).unwrap();
        std::fs::write(dir.path().join("tiles").join("grass.png"), b"x").unwrap();

        let found = find_file(dir.path(), "tiles/grass").unwrap();
        assert_eq!(found, dir.path().join("tiles").join("grass.png"));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_file(dir.path(), "nothing").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("File Not Found"));
    }

    #[test]
    fn downscaling_shrinks_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        RgbaImage::from_pixel(40, 20, Rgba([1, 2, 3, 255]))
            .save(&path)
            .unwrap();

        let image = decode(&path, 2.0).unwrap();
        assert_eq!(image.dimensions(), (20, 10));
        assert_eq!(decode(&path, 1.0).unwrap().dimensions(), (40, 20));
    }
}
