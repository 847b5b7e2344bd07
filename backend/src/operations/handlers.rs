use std::path::PathBuf;

use image::imageops::FilterType;
use image::DynamicImage;
use serde_json::{Map, Value};
use shared::ImageAction;

use crate::storage::{ImageStorage, StorageError};

const NO_BACKGROUND_PREFIX: &str = "no_bg";
const PREVIEW_PREFIX: &str = "preview";

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Image operation aborted: {0}")]
    Aborted(String),
}

/// What a handler needs besides the image itself.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub storage: ImageStorage,
    pub preview_size: (u32, u32),
}

impl OperationContext {
    pub fn new(storage: ImageStorage, preview_size: (u32, u32)) -> Self {
        Self {
            storage,
            preview_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    ImagePath(PathBuf),
    PreviewPath(PathBuf),
    SimilarImages(Vec<String>),
}

impl OperationOutput {
    pub fn into_payload(self) -> Map<String, Value> {
        let (key, value) = match self {
            OperationOutput::ImagePath(path) => ("image_path", Value::String(path.display().to_string())),
            OperationOutput::PreviewPath(path) => ("preview_path", Value::String(path.display().to_string())),
            OperationOutput::SimilarImages(images) => (
                "similar_images",
                Value::Array(images.into_iter().map(Value::String).collect()),
            ),
        };
        let mut payload = Map::new();
        payload.insert(key.to_string(), value);
        payload
    }
}

// Placeholder: the image is stored as-is until a segmentation model is wired in.
pub fn remove_background(image: &DynamicImage, storage: &ImageStorage) -> Result<PathBuf, StorageError> {
    storage.save_png(image, NO_BACKGROUND_PREFIX)
}

pub fn generate_preview(
    image: &DynamicImage,
    storage: &ImageStorage,
    (width, height): (u32, u32),
) -> Result<PathBuf, StorageError> {
    let preview = image.resize_exact(width, height, FilterType::Lanczos3);
    storage.save_png(&preview, PREVIEW_PREFIX)
}

// Placeholder result with the final shape: an ordered list of image names.
pub fn search_similar(_image: &DynamicImage) -> Vec<String> {
    (1..=2).map(|i| format!("image{}.jpg", i)).collect()
}

pub fn apply(
    action: ImageAction,
    image: &DynamicImage,
    ctx: &OperationContext,
) -> Result<OperationOutput, OperationError> {
    let output = match action {
        ImageAction::RemoveBackground => OperationOutput::ImagePath(remove_background(image, &ctx.storage)?),
        ImageAction::GeneratePreview => {
            OperationOutput::PreviewPath(generate_preview(image, &ctx.storage, ctx.preview_size)?)
        }
        ImageAction::SearchSimilar => OperationOutput::SimilarImages(search_similar(image)),
    };
    Ok(output)
}

/// Runs `apply` on the blocking pool. The image is moved in and dropped there.
pub async fn apply_blocking(
    action: ImageAction,
    image: DynamicImage,
    ctx: OperationContext,
) -> Result<OperationOutput, OperationError> {
    tokio::task::spawn_blocking(move || apply(action, &image, &ctx))
        .await
        .map_err(|e| OperationError::Aborted(e.to_string()))?
}
