//! Image processing: decode, resize, and encode derivative pairs.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` (content sniffing) |
//! | **Resize** | Lanczos3, width clamp with floored height |
//! | **Encode → JPEG/PNG** | `image` codecs |
//! | **Encode → WebP** | libwebp via `webp`, method 6 |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing encode operations
//! - **Backend**: [`ImageCodec`] trait + [`RustCodec`]
//! - **Operations**: The optimisation engine combining calculations + codec

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{CodecError, ImageAsset, ImageCodec, SourceFormat};
pub use calculations::clamp_to_width;
pub use operations::{DerivativePair, derivative_path, optimise, plan_derivatives};
pub use params::{EncodeParams, OutputFormat, Quality};
pub use rust_backend::RustCodec;
