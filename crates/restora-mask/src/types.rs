//! Shared types for defect mask generation.

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference the mask
/// raster without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `DynamicImage` for the (possibly downscaled) working image.
pub use image::DynamicImage;

/// Pixel value marking a defect in the mask.
pub const DEFECT: u8 = 255;

/// Pixel value marking a clean pixel in the mask.
pub const CLEAN: u8 = 0;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of a raster.
    #[must_use]
    pub fn of<I: image::GenericImageView>(image: &I) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height }
    }
}

/// Counts collected while generating a mask.
///
/// Useful when tuning against a corpus of scans: a mask that comes back
/// empty can be traced to the step that dropped everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MaskDiagnostics {
    /// Dimensions of the source image as decoded.
    pub source: Option<Dimensions>,
    /// Dimensions the mask was computed at.
    pub working: Option<Dimensions>,
    /// Edge pixels after dual-threshold edge detection.
    pub edge_pixels: u64,
    /// Edge pixels after the 3x3 bridging dilation.
    pub bridged_pixels: u64,
    /// 8-connected components found in the bridged edge map.
    pub components_found: u32,
    /// Components that survived the area filter.
    pub components_kept: u32,
    /// Centerline pixels after thinning.
    pub skeleton_pixels: u64,
    /// Defect pixels in the final mask.
    pub mask_pixels: u64,
}

/// Errors that can occur during mask generation.
#[derive(Debug, thiserror::Error)]
pub enum MaskError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[source] image::ImageError),

    /// Failed to encode a raster as PNG.
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
}

/// Count pixels set to [`DEFECT`] in a binary raster.
#[must_use]
pub fn count_set(image: &GrayImage) -> u64 {
    image.pixels().map(|p| u64::from(p.0[0] == DEFECT)).sum()
}
