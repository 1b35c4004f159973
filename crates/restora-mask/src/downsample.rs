//! Bound the working resolution before mask generation.
//!
//! Scans arrive at arbitrary sizes; the mask is computed on a copy whose
//! longest axis is at most [`MAX_DIMENSION`] pixels, and the same copy is
//! what the defect-removal stage receives so image and mask line up
//! pixel for pixel.
//!
//! Images already within the bound are returned unchanged. Aspect ratio
//! is always preserved and images are never enlarged.

use image::DynamicImage;
use image::imageops::FilterType;

/// Longest axis, in pixels, of the image the mask is computed on.
pub const MAX_DIMENSION: u32 = 1024;

/// Resampling filter used when shrinking. Bicubic keeps fine scratches
/// visible better than bilinear at typical reduction ratios.
const FILTER: FilterType = FilterType::CatmullRom;

/// Shrink `image` so its longest axis is at most `max_dimension` pixels.
///
/// Returns the (possibly unchanged) image and whether downscaling was
/// actually applied.
#[must_use]
pub fn fit_within(image: &DynamicImage, max_dimension: u32) -> (DynamicImage, bool) {
    let long_axis = image.width().max(image.height());
    if long_axis <= max_dimension {
        return (image.clone(), false);
    }

    (image.resize(max_dimension, max_dimension, FILTER), true)
}
