//! Median filtering for sensor-noise suppression before edge detection.
//!
//! Wraps [`imageproc::filter::median_filter`]. A median keeps step edges
//! sharp where a Gaussian would smear them, which matters because the
//! edges *are* the scratches we are looking for.

use image::GrayImage;

/// Side length of the square median window, in pixels.
///
/// Must stay below typical scratch width: a 3-pixel window wipes out
/// single-pixel specks but keeps lines 2 pixels wide or wider.
pub const APERTURE: u32 = 3;

/// Apply a median filter with an [`APERTURE`]-sized square window.
///
/// Border pixels are handled by replicating the nearest edge pixel.
#[must_use = "returns the filtered image"]
pub fn median(image: &GrayImage) -> GrayImage {
    let radius = APERTURE / 2;
    imageproc::filter::median_filter(image, radius, radius)
}
