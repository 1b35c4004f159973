//! Area filtering of 8-connected components.
//!
//! Specks that survive the median filter still trip the edge detector;
//! they show up as small isolated blobs once the edge map is dilated.
//! Real scratches are long, so anything at or under [`MIN_AREA`] pixels
//! is dropped.

use std::collections::BTreeMap;

use image::{GrayImage, Luma};
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::types::{CLEAN, DEFECT};

/// Components with this many pixels or fewer are discarded.
pub const MIN_AREA: u32 = 30;

/// Result of filtering a binary image by component area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filtered {
    /// Binary image containing only the surviving components.
    pub image: GrayImage,
    /// Number of components before filtering.
    pub found: u32,
    /// Number of components kept.
    pub kept: u32,
}

/// Keep only 8-connected foreground components larger than [`MIN_AREA`].
#[must_use = "returns the filtered image"]
pub fn remove_small_components(image: &GrayImage) -> Filtered {
    remove_components_up_to(image, MIN_AREA)
}

/// Keep only 8-connected foreground components with more than
/// `max_area` pixels.
#[must_use = "returns the filtered image"]
pub fn remove_components_up_to(image: &GrayImage, max_area: u32) -> Filtered {
    let labels = connected_components(image, Connectivity::Eight, Luma([CLEAN]));

    let mut areas: BTreeMap<u32, u32> = BTreeMap::new();
    for label in labels.pixels().map(|p| p.0[0]).filter(|&l| l != 0) {
        *areas.entry(label).or_default() += 1;
    }

    let found = u32::try_from(areas.len()).unwrap_or(u32::MAX);
    let kept = u32::try_from(areas.values().filter(|&&area| area > max_area).count())
        .unwrap_or(u32::MAX);

    let image = GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let label = labels.get_pixel(x, y).0[0];
        match areas.get(&label) {
            Some(&area) if label != 0 && area > max_area => Luma([DEFECT]),
            _ => Luma([CLEAN]),
        }
    });

    Filtered { image, found, kept }
}
