//! Dual-threshold edge detection.
//!
//! Derived from `imageproc 0.26`'s `edges::canny`, carrying the two
//! hysteresis fixes from <https://github.com/image-rs/imageproc/pull/746>
//! (border underflow and the missing north/northeast neighbors), with
//! these changes for scratch detection:
//!
//! - **No internal Gaussian pass.** The input has already been median
//!   filtered; blurring again widens thin scratches until the gradient
//!   at their edges falls under the low threshold.
//! - **L1 gradient magnitude** (`|gx| + |gy|`). Thresholds were tuned
//!   against this norm.
//! - Images narrower or shorter than 3 pixels yield an empty edge map
//!   instead of underflowing the interior loops.
//!
//! Two thresholds are needed: a single threshold either misses faint
//! scratches or admits film grain. Weak responses are kept only when
//! connected to a strong one.

use image::{GrayImage, Luma};
use imageproc::definitions::{HasBlack, HasWhite, Image};
use imageproc::filter::filter_clamped;
use imageproc::kernel;

/// Gradient magnitude below which a pixel is never an edge.
pub const LOW_THRESHOLD: f32 = 30.0;

/// Gradient magnitude above which a pixel is always an edge.
pub const HIGH_THRESHOLD: f32 = 100.0;

/// Run edge detection with the fixed [`LOW_THRESHOLD`] / [`HIGH_THRESHOLD`].
#[must_use = "returns the binary edge map"]
pub fn detect_edges(image: &GrayImage) -> GrayImage {
    canny(image, LOW_THRESHOLD, HIGH_THRESHOLD)
}

/// Run edge detection with explicit thresholds.
///
/// Returns a binary map with edge pixels at 255. `low` is raised to
/// `high` if given in the wrong order.
#[must_use = "returns the binary edge map"]
pub fn canny(image: &GrayImage, low: f32, high: f32) -> GrayImage {
    let (w, h) = image.dimensions();
    if w < 3 || h < 3 {
        return GrayImage::from_pixel(w, h, Luma::black());
    }
    let low = low.min(high);

    let gx: Image<Luma<i16>> = filter_clamped(image, kernel::SOBEL_HORIZONTAL_3X3);
    let gy: Image<Luma<i16>> = filter_clamped(image, kernel::SOBEL_VERTICAL_3X3);
    let magnitude: Image<Luma<f32>> = Image::from_fn(w, h, |x, y| {
        let (dx, dy) = (gx.get_pixel(x, y).0[0], gy.get_pixel(x, y).0[0]);
        Luma([f32::from(dx.unsigned_abs()) + f32::from(dy.unsigned_abs())])
    });

    let thinned = non_maximum_suppression(&magnitude, &gx, &gy);
    hysteresis(&thinned, low, high)
}

/// Gradient direction quantized to the four neighbor axes.
#[derive(Clone, Copy)]
enum Direction {
    Horizontal,
    Diagonal,
    Vertical,
    AntiDiagonal,
}

impl Direction {
    fn from_gradient(dx: i16, dy: i16) -> Self {
        let mut angle = f32::from(dy).atan2(f32::from(dx)).to_degrees();
        if angle < 0.0 {
            angle += 180.0;
        }
        if !(22.5..157.5).contains(&angle) {
            Self::Horizontal
        } else if angle < 67.5 {
            Self::Diagonal
        } else if angle < 112.5 {
            Self::Vertical
        } else {
            Self::AntiDiagonal
        }
    }

    /// The two neighbors along the gradient, as offsets.
    const fn neighbors(self) -> [(i32, i32); 2] {
        match self {
            Self::Horizontal => [(-1, 0), (1, 0)],
            Self::Diagonal => [(1, 1), (-1, -1)],
            Self::Vertical => [(0, -1), (0, 1)],
            Self::AntiDiagonal => [(-1, 1), (1, -1)],
        }
    }
}

/// Keep only pixels that are local maxima along their gradient.
///
/// The one-pixel border is left at zero.
fn non_maximum_suppression(
    g: &Image<Luma<f32>>,
    gx: &Image<Luma<i16>>,
    gy: &Image<Luma<i16>>,
) -> Image<Luma<f32>> {
    let (w, h) = g.dimensions();
    let mut out = Image::from_pixel(w, h, Luma([0.0]));
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let direction = Direction::from_gradient(gx.get_pixel(x, y).0[0], gy.get_pixel(x, y).0[0]);
            let pixel = *g.get_pixel(x, y);
            // Interior pixel, so every offset stays in bounds.
            let suppressed = direction.neighbors().iter().any(|&(ox, oy)| {
                let nx = x.wrapping_add_signed(ox);
                let ny = y.wrapping_add_signed(oy);
                pixel.0[0] < g.get_pixel(nx, ny).0[0]
            });
            if !suppressed {
                out.put_pixel(x, y, pixel);
            }
        }
    }
    out
}

/// Threshold with hysteresis: strong pixels seed an iterative
/// flood over 8-connected weak pixels.
fn hysteresis(input: &Image<Luma<f32>>, low: f32, high: f32) -> GrayImage {
    let (w, h) = input.dimensions();
    let mut out = GrayImage::from_pixel(w, h, Luma::black());
    let mut stack = Vec::new();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            if input.get_pixel(x, y).0[0] < high || out.get_pixel(x, y).0[0] != 0 {
                continue;
            }
            out.put_pixel(x, y, Luma::white());
            stack.push((x, y));
            while let Some((nx, ny)) = stack.pop() {
                let neighbors = [
                    (nx + 1, ny),
                    (nx + 1, ny + 1),
                    (nx, ny + 1),
                    (nx.wrapping_sub(1), ny.wrapping_sub(1)),
                    (nx.wrapping_sub(1), ny),
                    (nx.wrapping_sub(1), ny + 1),
                    (nx, ny.wrapping_sub(1)),
                    (nx + 1, ny.wrapping_sub(1)),
                ];
                for (px, py) in neighbors {
                    // wrapping_sub at 0 lands on u32::MAX, caught here.
                    if px >= w || py >= h {
                        continue;
                    }
                    if input.get_pixel(px, py).0[0] >= low && out.get_pixel(px, py).0[0] == 0 {
                        out.put_pixel(px, py, Luma::white());
                        stack.push((px, py));
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge_count(edges: &GrayImage) -> u32 {
        edges.pixels().map(|p| u32::from(p.0[0] > 0)).sum()
    }

    #[test]
    fn border_edge_does_not_panic() {
        let img = GrayImage::from_fn(10, 10, |x, _| if x == 1 { Luma([255]) } else { Luma([0]) });
        let _edges = canny(&img, 1.0, 2.0);
    }

    #[test]
    fn output_dimensions_match_input() {
        let edges = detect_edges(&GrayImage::new(17, 31));
        assert_eq!(edges.dimensions(), (17, 31));
    }

    #[test]
    fn tiny_images_yield_empty_map() {
        for (w, h) in [(0, 0), (1, 5), (2, 2), (5, 2)] {
            let edges = detect_edges(&GrayImage::from_pixel(w, h, Luma([200])));
            assert_eq!(edges.dimensions(), (w, h));
            assert_eq!(edge_count(&edges), 0);
        }
    }

    #[test]
    fn uniform_image_has_no_edges() {
        let edges = detect_edges(&GrayImage::from_pixel(20, 20, Luma([128])));
        assert_eq!(edge_count(&edges), 0);
    }

    #[test]
    fn sharp_edge_detected() {
        let img = GrayImage::from_fn(20, 20, |x, _| if x < 10 { Luma([0]) } else { Luma([255]) });
        let edges = detect_edges(&img);
        assert!(edge_count(&edges) > 0, "expected edges at sharp boundary");
        // Nothing far from the boundary.
        for y in 0..20 {
            assert_eq!(edges.get_pixel(3, y).0[0], 0);
            assert_eq!(edges.get_pixel(16, y).0[0], 0);
        }
    }

    #[test]
    fn faint_step_below_high_threshold_ignored() {
        // Step of 10 levels: L1 Sobel magnitude is 40, above low but
        // below high, and nothing strong to connect to.
        let img = GrayImage::from_fn(20, 20, |x, _| if x < 10 { Luma([100]) } else { Luma([110]) });
        assert_eq!(edge_count(&detect_edges(&img)), 0);
    }

    #[test]
    fn edge_map_is_binary() {
        let img = GrayImage::from_fn(16, 16, |x, y| Luma([u8::try_from((x * 13 + y * 7) % 256).unwrap_or(0)]));
        for p in detect_edges(&img).pixels() {
            assert!(p.0[0] == 0 || p.0[0] == 255);
        }
    }
}
