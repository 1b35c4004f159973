//! Integration test: an oversized synthetic scan is shrunk before masking
//! and the mask lines up with the shrunk working image.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use image::{DynamicImage, Luma, Rgb, RgbImage};

/// 1600x1200 warm-gray print with one horizontal scratch 12 pixels tall
/// centered on row 600, spanning columns 200..1400.
fn scan() -> Vec<u8> {
    let img = RgbImage::from_fn(1600, 1200, |x, y| {
        if (594..606).contains(&y) && (200..1400).contains(&x) {
            Rgb([240, 236, 228])
        } else {
            Rgb([96, 84, 70])
        }
    });
    restora_mask::grayscale::encode_png(&DynamicImage::ImageRgb8(img)).unwrap()
}

#[test]
fn oversized_scan_is_masked_at_working_resolution() {
    let generated = restora_mask::generate(&scan()).expect("mask generation should succeed");

    assert!(generated.downscaled);
    assert_eq!(generated.working.width(), 1024);
    assert_eq!(generated.working.height(), 768);
    assert_eq!(generated.mask.dimensions(), (1024, 768));

    let diagnostics = generated.diagnostics;
    eprintln!("{diagnostics:#?}");
    assert_eq!(
        diagnostics.source,
        Some(restora_mask::Dimensions {
            width: 1600,
            height: 1200
        })
    );
    assert!(!generated.is_empty());

    // Scratch sits on row 384 at working resolution; far rows stay clean.
    let row_marked = |y: u32| (0..1024).any(|x| generated.mask.get_pixel(x, y) == &Luma([255]));
    assert!((370..400).any(row_marked));
    assert!(!(0..300).any(row_marked));
    assert!(!(470..768).any(row_marked));
}

#[test]
fn mask_png_round_trips_through_decode() {
    let generated = restora_mask::generate(&scan()).unwrap();
    let png = generated.mask_png().unwrap();
    let decoded = restora_mask::grayscale::decode_and_grayscale(&png).unwrap();
    assert_eq!(decoded, generated.mask);
}
