//! The optimisation engine.
//!
//! [`optimise`] turns one source image into a derivative pair: a widely
//! compatible file (JPEG, or PNG when lossless) and a smaller WebP. Both are
//! written next to the source as `{stem}_{max_width}.{ext}`.
//!
//! ```text
//! photo.png ──decode──▶ resize ≤ max_width ─┬─ original ──▶ photo_640.png  (lossless)
//!                                           └─ RGB ───────▶ photo_640.webp
//! photo.jpg ──decode──▶ resize ≤ max_width ──── RGB ──┬───▶ photo_640.jpg  (quality)
//!                                                     └───▶ photo_640.webp
//! ```
//!
//! The lossless PNG is encoded from the decoded pixels as-is: a palette or
//! greyscale source stays compact instead of being expanded to RGB.

use super::backend::{CodecError, ImageCodec};
use super::params::{EncodeParams, OutputFormat, Quality};
use crate::config::OptimisationConfig;
use std::path::{Path, PathBuf};

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// The two files produced for one source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivativePair {
    /// JPEG or PNG fallback.
    pub compatible: PathBuf,
    /// WebP.
    pub optimised: PathBuf,
}

impl DerivativePair {
    pub fn compatible_format(&self) -> OutputFormat {
        self.compatible
            .extension()
            .and_then(|e| e.to_str())
            .and_then(OutputFormat::from_extension)
            .unwrap_or(OutputFormat::Jpeg)
    }
}

/// Compute the sibling path `{stem}_{max_width}.{format ext}` for `source`.
pub fn derivative_path(source: &Path, max_width: u32, format: OutputFormat) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    source.with_file_name(format!("{}_{}.{}", stem, max_width, format.extension()))
}

/// Plan the derivative paths without touching any file.
pub fn plan_derivatives(source: &Path, max_width: u32, lossless: bool) -> DerivativePair {
    let compatible_format = if lossless {
        OutputFormat::Png
    } else {
        OutputFormat::Jpeg
    };
    DerivativePair {
        compatible: derivative_path(source, max_width, compatible_format),
        optimised: derivative_path(source, max_width, OutputFormat::WebP),
    }
}

/// Produce the compatible and optimised derivatives of `source`.
///
/// Both encodes are always attempted in order; the first failure is returned
/// and anything already written stays on disk.
pub fn optimise(
    codec: &impl ImageCodec,
    source: &Path,
    config: &OptimisationConfig,
) -> Result<DerivativePair> {
    let decoded = codec.decode(source)?;
    let asset = if config.max_width < decoded.width() {
        codec.resize(&decoded, config.max_width)
    } else {
        decoded
    };
    let rgb = asset.to_rgb();

    let lossless = config.lossless.resolve(source);
    let pair = plan_derivatives(source, config.max_width, lossless);

    if lossless {
        codec.encode(
            &asset.image,
            &EncodeParams {
                output: pair.compatible.clone(),
                format: OutputFormat::Png,
                quality: Quality::new(100),
                lossless: true,
            },
        )?;
    } else {
        codec.encode(
            &rgb,
            &EncodeParams {
                output: pair.compatible.clone(),
                format: OutputFormat::Jpeg,
                quality: Quality::new(config.jpeg_quality),
                lossless: false,
            },
        )?;
    }

    codec.encode(
        &rgb,
        &EncodeParams {
            output: pair.optimised.clone(),
            format: OutputFormat::WebP,
            quality: Quality::new(config.webp_quality),
            lossless,
        },
    )?;

    log::debug!(
        "{} → {}, {} ({}x{}, lossless={})",
        source.display(),
        pair.compatible.display(),
        pair.optimised.display(),
        asset.width(),
        asset.height(),
        lossless
    );

    Ok(pair)
}
