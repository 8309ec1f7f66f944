//! Image loading and conversion helpers shared by the capture flow and
//! tests.

use crate::core::{VisionError, VisionResult};
use image::{DynamicImage, ImageBuffer, RgbImage};

/// Converts a `DynamicImage` of any format to 8-bit RGB.
pub fn dynamic_to_rgb(img: DynamicImage) -> RgbImage {
    img.to_rgb8()
}

/// Loads an image from disk as 8-bit RGB.
pub fn load_image(path: &std::path::Path) -> VisionResult<RgbImage> {
    let img = image::open(path).map_err(VisionError::ImageLoad)?;
    Ok(dynamic_to_rgb(img))
}

/// Builds an RGB image from a raw pixel buffer, typically a camera frame.
///
/// Returns `None` when the buffer length does not match `width * height * 3`.
pub fn rgb_from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<RgbImage> {
    if data.len() != (width as usize) * (height as usize) * 3 {
        return None;
    }
    ImageBuffer::from_raw(width, height, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_from_raw_rejects_wrong_length() {
        assert!(rgb_from_raw(4, 4, vec![0u8; 47]).is_none());
        assert!(rgb_from_raw(4, 4, vec![0u8; 48]).is_some());
    }

    #[test]
    fn test_load_image_missing_path_is_error() {
        assert!(load_image(std::path::Path::new("/nonexistent/frame.png")).is_err());
    }
}
