//! restora-mask: deterministic scratch/defect mask generation (sans-IO).
//!
//! Turns a photograph into a binary mask marking likely scratches, for
//! use as the guide of an inpainting model. No learned model is
//! involved:
//!
//! luminance -> median -> dual-threshold edges -> 3x3 dilation ->
//! component area filter -> thinning -> 5x5 elliptical dilation.
//!
//! Every parameter is a fixed constant exposed by its module
//! ([`median::APERTURE`], [`canny::LOW_THRESHOLD`],
//! [`canny::HIGH_THRESHOLD`], [`components::MIN_AREA`],
//! [`downsample::MAX_DIMENSION`]). Identical pixels in always give an
//! identical mask out.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and rasters. Hosting the mask is the caller's business.

pub mod canny;
pub mod components;
pub mod downsample;
pub mod grayscale;
pub mod median;
pub mod morphology;
pub mod thinning;
pub mod types;

pub use types::{Dimensions, DynamicImage, GrayImage, MaskDiagnostics, MaskError};

use types::count_set;

/// A generated mask together with the image it was computed on.
#[derive(Debug, Clone)]
pub struct DefectMask {
    /// The image the mask lines up with: the decoded source, downscaled
    /// if it exceeded [`downsample::MAX_DIMENSION`].
    pub working: DynamicImage,
    /// Whether `working` differs in size from the decoded source.
    pub downscaled: bool,
    /// Binary mask, 255 on defects, same dimensions as `working`.
    pub mask: GrayImage,
    /// Per-step counts.
    pub diagnostics: MaskDiagnostics,
}

impl DefectMask {
    /// The mask encoded as PNG.
    ///
    /// # Errors
    ///
    /// Returns [`MaskError::Encode`] if encoding fails.
    pub fn mask_png(&self) -> Result<Vec<u8>, MaskError> {
        grayscale::encode_png(&DynamicImage::ImageLuma8(self.mask.clone()))
    }

    /// The working image encoded as PNG.
    ///
    /// # Errors
    ///
    /// Returns [`MaskError::Encode`] if encoding fails.
    pub fn working_png(&self) -> Result<Vec<u8>, MaskError> {
        grayscale::encode_png(&self.working)
    }

    /// Whether any defect was detected.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.diagnostics.mask_pixels == 0
    }
}

/// Decode an image and generate its defect mask.
///
/// Takes raw image bytes (PNG, JPEG, BMP, WebP). Images whose longest
/// axis exceeds [`downsample::MAX_DIMENSION`] are shrunk first and the
/// mask is computed at the reduced size.
///
/// An image with no detectable defects yields an all-zero mask; that is
/// not an error.
///
/// # Errors
///
/// Returns [`MaskError::EmptyInput`] if `image_bytes` is empty.
/// Returns [`MaskError::ImageDecode`] if the image format is unrecognized.
pub fn generate(image_bytes: &[u8]) -> Result<DefectMask, MaskError> {
    let decoded = grayscale::decode(image_bytes)?;
    let source = Dimensions::of(&decoded);

    let (working, downscaled) = downsample::fit_within(&decoded, downsample::MAX_DIMENSION);
    let (mask, mut diagnostics) = defect_mask(&grayscale::luminance(&working));
    diagnostics.source = Some(source);

    Ok(DefectMask {
        working,
        downscaled,
        mask,
        diagnostics,
    })
}

/// Compute the defect mask of a luminance image.
///
/// # Steps
///
/// 1. Median filter (noise suppression, edges preserved)
/// 2. Dual-threshold edge detection
/// 3. 3x3 dilation (bridge broken scratch lines)
/// 4. 8-connected component area filter
/// 5. Thinning to one-pixel centerlines
/// 6. 5x5 elliptical dilation (inpainting margin)
#[must_use]
pub fn defect_mask(gray: &GrayImage) -> (GrayImage, MaskDiagnostics) {
    // 1. Median filter.
    let smoothed = median::median(gray);

    // 2. Edge detection.
    let edges = canny::detect_edges(&smoothed);

    // 3. Bridge gaps.
    let bridged = morphology::bridge_gaps(&edges);

    // 4. Drop specks.
    let filtered = components::remove_small_components(&bridged);

    // 5. Centerlines.
    let skeleton = thinning::skeletonize(&filtered.image);

    // 6. Margin.
    let mask = morphology::widen(&skeleton);

    let diagnostics = MaskDiagnostics {
        source: Some(Dimensions::of(gray)),
        working: Some(Dimensions::of(gray)),
        edge_pixels: count_set(&edges),
        bridged_pixels: count_set(&bridged),
        components_found: filtered.found,
        components_kept: filtered.kept,
        skeleton_pixels: count_set(&skeleton),
        mask_pixels: count_set(&mask),
    };

    (mask, diagnostics)
}
