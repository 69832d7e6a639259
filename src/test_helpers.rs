//! Shared test utilities.
//!
//! Fixtures are synthesised on the fly instead of checked in: a small
//! gradient is enough for every codec path and keeps encodes fast.
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! write_png(&tmp.path().join("images/photo.png"), 1200, 800);
//! write_text(&tmp.path().join("index.html"), "<img src=\"/images/photo.png\">");
//! ```

use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::path::Path;

fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
}

/// Write an RGBA gradient PNG, creating parent directories.
pub fn write_png(path: &Path, width: u32, height: u32) {
    ensure_parent(path);
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
    })
    .save_with_format(path, ImageFormat::Png)
    .unwrap();
}

/// Write an RGB gradient JPEG, creating parent directories.
pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    ensure_parent(path);
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
    .save_with_format(path, ImageFormat::Jpeg)
    .unwrap();
}

/// Write a text file, creating parent directories.
pub fn write_text(path: &Path, content: &str) {
    ensure_parent(path);
    std::fs::write(path, content).unwrap();
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

/// One Huffman table from a JPEG DHT segment: class (0 = DC, 1 = AC),
/// table id, and the 16 code-length counts.
pub type HuffmanTable = (u8, u8, [u8; 16]);

/// Huffman tables declared before the first scan of a JPEG.
pub fn jpeg_huffman_tables(jpeg: &[u8]) -> Vec<HuffmanTable> {
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "not a JPEG");
    let mut tables = Vec::new();
    let mut pos = 2;
    while pos + 4 <= jpeg.len() && jpeg[pos] == 0xFF {
        let marker = jpeg[pos + 1];
        if marker == 0xDA {
            break;
        }
        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        if marker == 0xC4 {
            let segment = &jpeg[pos + 4..pos + 2 + len];
            let mut i = 0;
            while i + 17 <= segment.len() {
                let mut counts = [0u8; 16];
                counts.copy_from_slice(&segment[i + 1..i + 17]);
                tables.push((segment[i] >> 4, segment[i] & 0x0F, counts));
                i += 17 + counts.iter().map(|&c| c as usize).sum::<usize>();
            }
        }
        pos += 2 + len;
    }
    tables
}

/// The first chunk FourCC of a RIFF/WebP file: `VP8L` lossless, `VP8 ` lossy.
pub fn webp_chunk(webp: &[u8]) -> &[u8] {
    assert_eq!(&webp[..4], b"RIFF");
    assert_eq!(&webp[8..12], b"WEBP");
    &webp[12..16]
}
