use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use log::debug;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
}

/// Output directory shared by all tasks. File names carry a fresh v4 UUID so
/// concurrent writers never collide.
#[derive(Debug, Clone)]
pub struct ImageStorage {
    root: PathBuf,
}

impl ImageStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn unique_path(&self, prefix: &str) -> PathBuf {
        self.root.join(format!("{}_{}.png", prefix, Uuid::new_v4()))
    }

    pub fn save_png(&self, image: &DynamicImage, prefix: &str) -> Result<PathBuf, StorageError> {
        fs::create_dir_all(&self.root)?;
        let path = self.unique_path(prefix);
        image.save_with_format(&path, ImageFormat::Png)?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }
}
