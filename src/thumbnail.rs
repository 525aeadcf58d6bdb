//! Thumbnail derivation for stored originals.
//!
//! A thumbnail lives next to its original with a `-thumb` suffix on the file
//! stem, so its location is always recomputable from the original's path and
//! regeneration simply overwrites it.

use std::io::Cursor;
use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use thiserror::Error;
use tracing::debug;

use crate::storage::{Storage, StorageError};

const THUMB_SUFFIX: &str = "-thumb";

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Thumbnail task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Clone, Debug)]
pub struct ThumbnailConfig {
    /// Maximum dimension (width or height) in pixels
    pub max_dimension: u32,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self { max_dimension: 300 }
    }
}

/// `images/abc.jpg` -> `images/abc-thumb.jpg`
pub fn thumbnail_path(storage_path: &str) -> String {
    let (dir, file) = match storage_path.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, storage_path),
    };
    let file = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}{THUMB_SUFFIX}.{ext}"),
        _ => format!("{file}{THUMB_SUFFIX}"),
    };
    match dir {
        Some(dir) => format!("{dir}/{file}"),
        None => file,
    }
}

pub struct ThumbnailGenerator {
    storage: Arc<dyn Storage>,
    config: ThumbnailConfig,
}

impl ThumbnailGenerator {
    pub fn new(storage: Arc<dyn Storage>, config: ThumbnailConfig) -> Self {
        Self { storage, config }
    }

    /// Render the thumbnail of `storage_path` and write it to its derived path.
    pub async fn generate(&self, storage_path: &str) -> Result<String, ThumbnailError> {
        let original = self.storage.get(storage_path).await?;
        let hint = ImageFormat::from_path(storage_path).ok();
        let max_dimension = self.config.max_dimension;

        let data =
            tokio::task::spawn_blocking(move || render(&original, hint, max_dimension)).await??;

        let path = thumbnail_path(storage_path);
        self.storage.put_as(&path, &data).await?;
        debug!(original = %storage_path, thumbnail = %path, size = data.len(), "Thumbnail written");
        Ok(path)
    }
}

/// Decode, shrink to fit `max_dimension`, and re-encode.
///
/// Output keeps the original format when it can be encoded, PNG otherwise.
pub fn render(
    original: &[u8],
    hint: Option<ImageFormat>,
    max_dimension: u32,
) -> Result<Vec<u8>, image::ImageError> {
    let format = match hint {
        Some(format) => format,
        None => image::guess_format(original)?,
    };
    let img = image::load_from_memory_with_format(original, format)
        .or_else(|_| image::load_from_memory(original))?;

    let (orig_w, orig_h) = img.dimensions();
    let img = if orig_w <= max_dimension && orig_h <= max_dimension {
        debug!("Image already within max dimensions, encoding as-is");
        img
    } else {
        let (w, h) = fit_within(orig_w, orig_h, max_dimension);
        img.resize_exact(w.max(1), h.max(1), FilterType::Triangle)
    };

    match encode(&img, format) {
        Ok(data) => Ok(data),
        Err(e) => {
            debug!(error = %e, ?format, "Falling back to PNG thumbnail");
            encode(&img, ImageFormat::Png)
        }
    }
}

fn encode(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    if format == ImageFormat::Jpeg {
        // JPEG has no alpha channel
        DynamicImage::ImageRgb8(img.to_rgb8()).write_to(&mut buf, format)?;
    } else {
        img.write_to(&mut buf, format)?;
    }
    Ok(buf.into_inner())
}

/// New dimensions with the longest side at `max_dim`, aspect ratio preserved.
fn fit_within(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    if width > height {
        let ratio = max_dim as f32 / width as f32;
        (max_dim, ((height as f32) * ratio).round() as u32)
    } else {
        let ratio = max_dim as f32 / height as f32;
        (((width as f32) * ratio).round() as u32, max_dim)
    }
}
