//! Image decoding, luminance conversion and PNG encoding.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces the
//! rasters the mask steps operate on. Encoding goes the other way so the
//! mask and the working image can be handed to an object host.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat};

use crate::types::MaskError;

/// Decode raw image bytes.
///
/// # Errors
///
/// Returns [`MaskError::EmptyInput`] if `bytes` is empty.
/// Returns [`MaskError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, MaskError> {
    if bytes.is_empty() {
        return Err(MaskError::EmptyInput);
    }

    image::load_from_memory(bytes).map_err(MaskError::ImageDecode)
}

/// Convert to single-channel luminance.
///
/// Uses the `image` crate's weighted luminance
/// (`0.2126*R + 0.7152*G + 0.0722*B`); alpha is discarded.
#[must_use = "returns the luminance image"]
pub fn luminance(image: &DynamicImage) -> GrayImage {
    image.to_luma8()
}

/// Decode raw image bytes and convert to luminance in one step.
///
/// # Errors
///
/// See [`decode`].
pub fn decode_and_grayscale(bytes: &[u8]) -> Result<GrayImage, MaskError> {
    decode(bytes).map(|img| luminance(&img))
}

/// Encode any raster as PNG bytes.
///
/// PNG is lossless, so a mask survives the round trip through an object
/// host with its {0, 255} values intact.
///
/// # Errors
///
/// Returns [`MaskError::Encode`] if the encoder rejects the image.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, MaskError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(MaskError::Encode)?;
    Ok(buf.into_inner())
}
