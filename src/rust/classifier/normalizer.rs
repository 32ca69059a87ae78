use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, ImageFormat, RgbImage};
use log::debug;

use super::error::ClassifierError;

/// A decoded, upright, 3-channel image ready for inference.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalImage {
    pixels: RgbImage,
}

impl CanonicalImage {
    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.pixels
    }

    /// Re-encodes the image as PNG so it can be displayed back to the user.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, ClassifierError> {
        let mut bytes = Vec::new();
        self.pixels
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| ClassifierError::ValidationError(format!("Failed to encode image: {}", e)))?;
        Ok(bytes)
    }

    pub fn to_data_uri(&self) -> Result<String, ClassifierError> {
        let png = self.to_png_bytes()?;
        Ok(format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(png)))
    }
}

/// Decodes raw upload bytes into a [`CanonicalImage`].
///
/// The stored EXIF orientation is applied so the pixel buffer matches what a
/// viewer would show, and any channel layout (greyscale, alpha, 16-bit) is
/// converted to RGB8.
///
/// # Errors
/// - `UnsupportedImageFormat` if the bytes are empty or cannot be decoded
pub fn normalize(raw: &[u8]) -> Result<CanonicalImage, ClassifierError> {
    if raw.is_empty() {
        return Err(ClassifierError::UnsupportedImageFormat("No image data supplied".into()));
    }

    let decoded = image::load_from_memory(raw)
        .map_err(|e| ClassifierError::UnsupportedImageFormat(e.to_string()))?;

    let orientation = read_exif_orientation(raw);
    debug!(
        "Decoded {}x{} image ({:?}), EXIF orientation {}",
        decoded.width(),
        decoded.height(),
        decoded.color(),
        orientation
    );

    let upright = apply_orientation(decoded, orientation);
    Ok(CanonicalImage::from_rgb(upright.to_rgb8()))
}

/// Reads EXIF tag 0x0112 (Orientation). Returns 1 when absent or unreadable.
pub(crate) fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

pub(crate) fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayAlphaImage, LumaA, Rgb, Rgba, RgbaImage};

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    #[test]
    fn test_rgba_png_becomes_rgb() {
        let img = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 128]));
        let canonical = normalize(&encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)).unwrap();
        assert_eq!((canonical.width(), canonical.height()), (4, 3));
        assert_eq!(canonical.as_rgb().get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_grey_alpha_becomes_rgb() {
        let img = GrayAlphaImage::from_pixel(2, 2, LumaA([200, 255]));
        let canonical = normalize(&encode(DynamicImage::ImageLumaA8(img), ImageFormat::Png)).unwrap();
        assert_eq!(canonical.as_rgb().get_pixel(1, 1), &Rgb([200, 200, 200]));
    }

    #[test]
    fn test_garbage_is_unsupported() {
        let err = normalize(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ClassifierError::UnsupportedImageFormat(_)));
        let err = normalize(&[]).unwrap_err();
        assert!(matches!(err, ClassifierError::UnsupportedImageFormat(_)));
    }

    #[test]
    fn test_missing_exif_defaults_to_upright() {
        let img = RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]));
        let png = encode(DynamicImage::ImageRgb8(img), ImageFormat::Png);
        assert_eq!(read_exif_orientation(&png), 1);
    }

    #[test]
    fn test_apply_orientation_swaps_dimensions() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(4, 2));
        let rotated = apply_orientation(img.clone(), 6);
        assert_eq!((rotated.width(), rotated.height()), (2, 4));
        let flipped = apply_orientation(img, 2);
        assert_eq!((flipped.width(), flipped.height()), (4, 2));
    }

    #[test]
    fn test_data_uri_prefix() {
        let canonical = CanonicalImage::from_rgb(RgbImage::new(1, 1));
        assert!(canonical.to_data_uri().unwrap().starts_with("data:image/png;base64,"));
    }
}
