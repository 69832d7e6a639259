//! Pure Rust codec built on the `image` crate, plus libwebp for WebP.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WebP) | `image::ImageReader` with format sniffing |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` (trait default) |
//! | Encode → JPEG | `jpeg_encoder::Encoder` with optimised Huffman tables |
//! | Encode → PNG | `image::codecs::png::PngEncoder`, best compression, adaptive filter |
//! | Encode → WebP | `webp::Encoder` (libwebp), method 6 |
//!
//! Every encode is rendered into memory first and then written to a
//! uniquely named temporary sibling (`tempfile`) that is persisted over the
//! target. Concurrent writers of the same derivative never share a temp file,
//! and a reader never sees a half-written one.

use super::backend::{CodecError, ImageAsset, ImageCodec, SourceFormat};
use super::params::{EncodeParams, OutputFormat};
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{DynamicImage, ImageReader};
use std::fs::Permissions;
use std::io::Write;
use std::path::Path;

/// libwebp's slowest, best-compressing method.
const WEBP_METHOD: i32 = 6;

/// Production codec. See the [module docs](self) for the crate mapping.
pub struct RustCodec;

impl RustCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_failed(path: &Path, reason: impl ToString) -> CodecError {
    CodecError::Encode {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn encode_jpeg(image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, CodecError> {
    let rgb = image.to_rgb8();
    let (Ok(width), Ok(height)) = (u16::try_from(rgb.width()), u16::try_from(rgb.height()))
    else {
        return Err(encode_failed(
            &params.output,
            "JPEG dimensions are limited to 65535 pixels",
        ));
    };

    let mut buf = Vec::new();
    // Quality 0 is rejected by the encoder's internal tables.
    let quality = params.quality.value().clamp(1, 100) as u8;
    let mut encoder = jpeg_encoder::Encoder::new(&mut buf, quality);
    encoder.set_optimized_huffman_tables(true);
    encoder
        .encode(rgb.as_raw(), width, height, jpeg_encoder::ColorType::Rgb)
        .map_err(|e| encode_failed(&params.output, e))?;
    Ok(buf)
}

fn encode_png(image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut buf, CompressionType::Best, PngFilter::Adaptive);
    image
        .write_with_encoder(encoder)
        .map_err(|e| encode_failed(&params.output, e))?;
    Ok(buf)
}

fn encode_webp(image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, CodecError> {
    let rgb = image.to_rgb8();
    let encoder = webp::Encoder::from_rgb(rgb.as_raw(), rgb.width(), rgb.height());

    let mut config = libwebp_sys::WebPConfig::new()
        .map_err(|_| encode_failed(&params.output, "libwebp config init failed"))?;
    config.lossless = i32::from(params.lossless);
    config.quality = params.quality.value() as f32;
    config.method = WEBP_METHOD;

    let memory = encoder
        .encode_advanced(&config)
        .map_err(|e| encode_failed(&params.output, format!("libwebp: {e:?}")))?;
    Ok(memory.to_vec())
}

/// Mode for files that did not exist before.
#[cfg(unix)]
fn new_file_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<Permissions> {
    None
}

/// Write `bytes` to `path` via a uniquely named temporary sibling that is
/// persisted over the target.
///
/// Readers see either the previous file or the complete new one. An
/// existing target keeps its permissions.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let permissions = match std::fs::metadata(path) {
        Ok(meta) => Some(meta.permissions()),
        Err(_) => new_file_permissions(),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    if let Some(permissions) = permissions {
        tmp.as_file().set_permissions(permissions)?;
    }
    tmp.persist(path)?;
    Ok(())
}

impl ImageCodec for RustCodec {
    fn decode(&self, path: &Path) -> Result<ImageAsset, CodecError> {
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let format = reader
            .format()
            .ok_or_else(|| CodecError::UnsupportedFormat(path.to_path_buf()))?;
        let image = reader.decode().map_err(|e| match e {
            image::ImageError::Unsupported(_) => CodecError::UnsupportedFormat(path.to_path_buf()),
            other => CodecError::Decode {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        })?;
        Ok(ImageAsset::new(SourceFormat::from(format), image))
    }

    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<(), CodecError> {
        let bytes = match params.format {
            OutputFormat::Jpeg => encode_jpeg(image, params)?,
            OutputFormat::Png => encode_png(image, params)?,
            OutputFormat::WebP => encode_webp(image, params)?,
        };
        write_atomically(&params.output, &bytes)?;
        Ok(())
    }
}
