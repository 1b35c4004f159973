//! Zhang-Suen thinning.
//!
//! Reduces each foreground region to a one-pixel-wide, 8-connected
//! centerline. After this step the width of a detected scratch no longer
//! depends on how thick its raw edge response was; the final margin is
//! set entirely by [`crate::morphology::widen`].
//!
//! Reference: T. Y. Zhang and C. Y. Suen, "A fast parallel algorithm for
//! thinning digital patterns", CACM 27(3), 1984.

use image::{GrayImage, Luma};

use crate::types::{CLEAN, DEFECT};

/// Thin every foreground region of a binary image to its skeleton.
///
/// Pixels outside the image are treated as background. The input is
/// interpreted as nonzero = foreground; the output is strictly {0, 255}.
#[must_use = "returns the skeleton"]
pub fn skeletonize(image: &GrayImage) -> GrayImage {
    let (w, h) = image.dimensions();
    let mut grid = Grid::new(image);
    let mut marked = Vec::new();

    loop {
        let mut changed = false;
        for pass in [Pass::First, Pass::Second] {
            marked.clear();
            for y in 0..h {
                for x in 0..w {
                    if grid.get(x, y) && grid.removable(x, y, pass) {
                        marked.push((x, y));
                    }
                }
            }
            // Deletions are applied after the scan so both passes see a
            // consistent snapshot.
            changed |= !marked.is_empty();
            for &(x, y) in &marked {
                grid.clear(x, y);
            }
        }
        if !changed {
            break;
        }
    }

    GrayImage::from_fn(w, h, |x, y| {
        if grid.get(x, y) {
            Luma([DEFECT])
        } else {
            Luma([CLEAN])
        }
    })
}

#[derive(Clone, Copy)]
enum Pass {
    /// Removes south-east boundary and north-west corner points.
    First,
    /// Removes north-west boundary and south-east corner points.
    Second,
}

struct Grid {
    width: u32,
    height: u32,
    cells: Vec<bool>,
}

impl Grid {
    fn new(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            cells: image.pixels().map(|p| p.0[0] != 0).collect(),
        }
    }

    fn get(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.cells[(y * self.width + x) as usize]
    }

    fn clear(&mut self, x: u32, y: u32) {
        self.cells[(y * self.width + x) as usize] = false;
    }

    /// Neighbors P2..P9, clockwise from north.
    fn neighborhood(&self, x: u32, y: u32) -> [bool; 8] {
        // wrapping_sub at the border lands out of bounds and reads false.
        let (xm, ym) = (x.wrapping_sub(1), y.wrapping_sub(1));
        [
            self.get(x, ym),
            self.get(x + 1, ym),
            self.get(x + 1, y),
            self.get(x + 1, y + 1),
            self.get(x, y + 1),
            self.get(xm, y + 1),
            self.get(xm, y),
            self.get(xm, ym),
        ]
    }

    fn removable(&self, x: u32, y: u32, pass: Pass) -> bool {
        let n = self.neighborhood(x, y);
        let [p2, _, p4, _, p6, _, p8, _] = n;

        let count = n.iter().filter(|&&v| v).count();
        if !(2..=6).contains(&count) {
            return false;
        }

        // Exactly one background-to-foreground transition around the ring.
        let transitions = (0..8).filter(|&i| !n[i] && n[(i + 1) % 8]).count();
        if transitions != 1 {
            return false;
        }

        match pass {
            Pass::First => !(p2 && p4 && p6) && !(p4 && p6 && p8),
            Pass::Second => !(p2 && p4 && p8) && !(p2 && p6 && p8),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::count_set;

    fn filled(w: u32, h: u32, x0: u32, y0: u32, bw: u32, bh: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if (x0..x0 + bw).contains(&x) && (y0..y0 + bh).contains(&y) {
                Luma([DEFECT])
            } else {
                Luma([CLEAN])
            }
        })
    }

    #[test]
    fn thick_bar_thins_to_single_row() {
        let img = filled(30, 11, 2, 3, 24, 5);
        let skeleton = skeletonize(&img);
        for x in 7..20 {
            let column: u32 = (0..11)
                .map(|y| u32::from(skeleton.get_pixel(x, y).0[0] == DEFECT))
                .sum();
            assert_eq!(column, 1, "column {x} should be one pixel wide");
        }
        assert_eq!(skeleton.get_pixel(12, 5).0[0], DEFECT);
    }

    #[test]
    fn one_pixel_line_is_unchanged_in_the_middle() {
        let img = filled(20, 5, 2, 2, 16, 1);
        let skeleton = skeletonize(&img);
        for x in 4..16 {
            assert_eq!(skeleton.get_pixel(x, 2).0[0], DEFECT);
        }
    }

    #[test]
    fn empty_image_stays_empty() {
        assert_eq!(count_set(&skeletonize(&GrayImage::new(10, 10))), 0);
    }

    #[test]
    fn skeleton_is_subset_of_input() {
        let img = filled(25, 25, 3, 3, 18, 9);
        let skeleton = skeletonize(&img);
        for (x, y, p) in skeleton.enumerate_pixels() {
            if p.0[0] == DEFECT {
                assert_eq!(img.get_pixel(x, y).0[0], DEFECT);
            }
        }
        assert!(count_set(&skeleton) > 0);
        assert!(count_set(&skeleton) < count_set(&img));
    }

    #[test]
    fn thinning_is_idempotent() {
        let img = filled(30, 20, 4, 4, 20, 7);
        let once = skeletonize(&img);
        assert_eq!(skeletonize(&once), once);
    }
}
