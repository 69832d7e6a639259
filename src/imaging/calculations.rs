//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate the dimensions of an image clamped to `max_width`.
///
/// Images already no wider than `max_width` keep their dimensions (no
/// upscaling). Wider images get `width = max_width` and a height of
/// `floor(height × max_width / width)`, never less than 1 pixel.
///
/// # Examples
/// ```
/// # use optimise_images::imaging::clamp_to_width;
/// // 1200x800 clamped to 640 → 640x426 (426.67 floored)
/// assert_eq!(clamp_to_width((1200, 800), 640), (640, 426));
///
/// // Narrower than the limit → unchanged
/// assert_eq!(clamp_to_width((300, 200), 640), (300, 200));
/// ```
pub fn clamp_to_width(original: (u32, u32), max_width: u32) -> (u32, u32) {
    let (width, height) = original;
    if width <= max_width || width == 0 {
        return original;
    }
    // Integer arithmetic gives an exact floor, no float drift.
    let scaled = u64::from(height) * u64::from(max_width) / u64::from(width);
    (max_width, (scaled as u32).max(1))
}
