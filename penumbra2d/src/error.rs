use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the asset cache.
#[derive(Debug, Error)]
pub enum AssetError {
    /// No file whose stem matches the requested name. Missing content is fatal.
    #[error("File Not Found: no asset named '{name}' in {}", directory.display())]
    NotFound { name: String, directory: PathBuf },

    #[error("Failed to decode '{name}': {reason}")]
    Decode { name: String, reason: String },

    #[error("Invalid font '{name}': {reason}")]
    Font { name: String, reason: String },

    #[error("Atlas not found: {0}")]
    UnknownAtlas(String),

    #[error("Texture upload failed: {0}")]
    Upload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssetError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AssetError::NotFound { .. })
    }
}
