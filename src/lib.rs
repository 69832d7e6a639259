//! # Optimise Images
//!
//! Post-processing for statically generated sites: every `<img>` that points
//! at a local PNG or JPEG is replaced with a `<picture>` offering a WebP
//! first and a resized JPEG or PNG as the fallback.
//!
//! ```text
//! <img src="/images/photo.png" alt="…">
//!
//!   ⇣  photo_640.png + photo_640.webp written next to photo.png
//!
//! <picture>
//!   <source type="image/webp" srcset="/images/photo_640.webp">
//!   <source type="image/png" srcset="/images/photo_640.png">
//!   <img src="/images/photo_640.png" alt="…">
//! </picture>
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Decode, resize, and encode one source into a derivative pair |
//! | [`config`] | `optimise-images.toml`, the optimisation registry and its resolution |
//! | [`annotations`] | `poi-` class annotations that steer processing from markup |
//! | [`markup`] | Replacement `<picture>`/`<figure>` fragments and derivative URLs |
//! | [`rewrite`] | Per-document rewriting and the parallel site-wide driver |
//! | [`output`] | CLI output formatting |
//!
//! # Per-Image Configuration
//!
//! Settings resolve in three layers, later layers overriding earlier ones
//! field by field:
//!
//! ```text
//! built-in defaults        max_width 640, jpeg 75, webp 65, lossless auto
//! [optimisations.default]  applies to every image
//! [optimisations.<key>]    applies to <img class="poi-<key>">, in class order
//! ```
//!
//! `class="poi-no-optimise"` opts an image out entirely.
//!
//! # Idempotency
//!
//! An `<img>` already inside a `<picture>` is never processed again, and a
//! document is only rewritten when something in it changed. Running the tool
//! twice over the same output leaves the second run with nothing to do.

pub mod annotations;
pub mod config;
pub mod imaging;
pub mod markup;
pub mod output;
pub mod rewrite;

#[cfg(test)]
pub(crate) mod test_helpers;
