//! Binary dilation with rectangular and elliptical structuring elements.
//!
//! The 3x3 square used to bridge broken scratch lines is exactly
//! [`imageproc::morphology::dilate`] under the L-infinity norm. The 5x5
//! ellipse used for the final margin is not a norm ball (its rows are
//! wider than its columns), so it gets an explicit structuring element
//! laid out the way common vision libraries build ellipse kernels.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;

use crate::types::{CLEAN, DEFECT};

/// A binary structuring element, anchored at its center.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    width: u32,
    height: u32,
    /// Row-major membership flags.
    cells: Vec<bool>,
}

impl StructuringElement {
    /// A filled `width` x `height` rectangle.
    #[must_use]
    pub fn rect(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![true; (width * height) as usize],
        }
    }

    /// An ellipse inscribed in a `width` x `height` box.
    ///
    /// For each row at vertical offset `dy` from the center, the row
    /// spans `c ± round(c * sqrt(1 - dy²/r²))`, where `r` and `c` are the
    /// vertical and horizontal half-sizes. For 5x5 this yields single
    /// pixels on the top and bottom rows and full-width middle rows.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss
    )]
    pub fn ellipse(width: u32, height: u32) -> Self {
        let r = f64::from(height / 2);
        let c = f64::from(width / 2);
        let mut cells = vec![false; (width * height) as usize];
        for row in 0..height {
            let dy = f64::from(row) - r;
            if dy.abs() > r {
                continue;
            }
            let dx = if r > 0.0 {
                (c * ((r * r - dy * dy) / (r * r)).sqrt()).round()
            } else {
                c
            };
            let start = (c - dx).max(0.0) as u32;
            let end = ((c + dx + 1.0) as u32).min(width);
            for col in start..end {
                cells[(row * width + col) as usize] = true;
            }
        }
        Self {
            width,
            height,
            cells,
        }
    }

    /// Offsets of member cells relative to the anchor.
    #[allow(clippy::cast_possible_wrap)]
    fn offsets(&self) -> Vec<(i64, i64)> {
        let (ax, ay) = (i64::from(self.width / 2), i64::from(self.height / 2));
        (0..self.height)
            .flat_map(|row| (0..self.width).map(move |col| (col, row)))
            .filter(|&(col, row)| self.cells[(row * self.width + col) as usize])
            .map(|(col, row)| (i64::from(col) - ax, i64::from(row) - ay))
            .collect()
    }

    /// Number of member cells.
    #[must_use]
    pub fn area(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// Whether the cell at `(col, row)` is a member.
    #[must_use]
    pub fn contains(&self, col: u32, row: u32) -> bool {
        col < self.width && row < self.height && self.cells[(row * self.width + col) as usize]
    }
}

/// Dilate with a 3x3 square, one iteration.
///
/// Closes one-pixel gaps in broken scratch lines.
#[must_use = "returns the dilated image"]
pub fn bridge_gaps(edges: &GrayImage) -> GrayImage {
    imageproc::morphology::dilate(edges, Norm::LInf, 1)
}

/// Dilate with a 5x5 ellipse, one iteration.
///
/// Gives each centerline a margin of context for the inpainting model.
#[must_use = "returns the dilated image"]
pub fn widen(skeleton: &GrayImage) -> GrayImage {
    dilate(skeleton, &StructuringElement::ellipse(5, 5))
}

/// Dilate a binary image with an arbitrary structuring element.
///
/// Every nonzero input pixel stamps the element into the output.
/// Out-of-bounds cells are dropped.
#[must_use = "returns the dilated image"]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn dilate(image: &GrayImage, element: &StructuringElement) -> GrayImage {
    let (w, h) = image.dimensions();
    let mut out = GrayImage::from_pixel(w, h, Luma([CLEAN]));
    let offsets = element.offsets();
    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel.0[0] == 0 {
            continue;
        }
        for &(dx, dy) in &offsets {
            let (nx, ny) = (i64::from(x) + dx, i64::from(y) + dy);
            if nx < 0 || ny < 0 || nx >= i64::from(w) || ny >= i64::from(h) {
                continue;
            }
            out.put_pixel(nx as u32, ny as u32, Luma([DEFECT]));
        }
    }
    out
}
