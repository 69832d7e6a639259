//! Image codec trait and shared types.
//!
//! The [`ImageCodec`] trait defines the operations the optimisation engine
//! needs: decode a source file, resize it, and encode a buffer into one
//! derivative file.
//!
//! The production implementation is
//! [`RustCodec`](super::rust_backend::RustCodec). Tests use the recording
//! `MockCodec` in this module so engine logic can be checked without
//! encoding real files.

use super::calculations::clamp_to_width;
use super::params::EncodeParams;
use image::DynamicImage;
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("Failed to encode {path}: {reason}")]
    Encode { path: PathBuf, reason: String },
}

impl CodecError {
    /// The pipeline stage that failed, for user-facing context.
    pub fn stage(&self) -> &'static str {
        match self {
            CodecError::Io(_) => "io",
            CodecError::Decode { .. } | CodecError::UnsupportedFormat(_) => "decode",
            CodecError::Encode { .. } => "encode",
        }
    }
}

/// Native format of a decoded source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Png,
    Jpeg,
    Other,
}

impl From<image::ImageFormat> for SourceFormat {
    fn from(format: image::ImageFormat) -> Self {
        match format {
            image::ImageFormat::Png => SourceFormat::Png,
            image::ImageFormat::Jpeg => SourceFormat::Jpeg,
            _ => SourceFormat::Other,
        }
    }
}

/// A decoded source image. Never mutated; resizing yields a new asset.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub format: SourceFormat,
    pub image: DynamicImage,
}

impl ImageAsset {
    pub fn new(format: SourceFormat, image: DynamicImage) -> Self {
        Self { format, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Three-channel 8-bit copy of the pixels, used for every lossy path and
    /// for WebP.
    pub fn to_rgb(&self) -> DynamicImage {
        DynamicImage::ImageRgb8(self.image.to_rgb8())
    }
}

/// Trait for image codecs.
///
/// `encode` writes exactly one file per call and overwrites whatever is
/// already at `params.output`.
pub trait ImageCodec: Sync {
    /// Decode an image file from disk.
    fn decode(&self, path: &Path) -> Result<ImageAsset, CodecError>;

    /// Encode `image` into the file and format described by `params`.
    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<(), CodecError>;

    /// Scale `asset` down so its width is at most `max_width`, preserving the
    /// aspect ratio with a floored height. Returns a copy when no resize is
    /// needed.
    fn resize(&self, asset: &ImageAsset, max_width: u32) -> ImageAsset {
        let (width, height) = clamp_to_width((asset.width(), asset.height()), max_width);
        if (width, height) == (asset.width(), asset.height()) {
            return asset.clone();
        }
        ImageAsset::new(
            asset.format,
            asset.image.resize_exact(width, height, FilterType::Lanczos3),
        )
    }
}
