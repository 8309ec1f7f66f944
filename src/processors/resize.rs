//! Resizing processors: letterboxing for detection and centered
//! pad-to-square for classification.

use crate::core::{VisionError, VisionResult};
use image::imageops::FilterType;
use image::{Rgb, RgbImage};

/// Neutral fill used for padded regions.
const PAD_FILL: Rgb<u8> = Rgb([114, 114, 114]);

/// Geometry of a letterbox operation, in coordinates normalized to the
/// square target. Needed to map detections back into source-frame space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxInfo {
    /// Fraction of the target width occupied by image content.
    pub content_w: f32,
    /// Fraction of the target height occupied by image content.
    pub content_h: f32,
    /// Normalized left padding.
    pub pad_x: f32,
    /// Normalized top padding.
    pub pad_y: f32,
}

impl LetterboxInfo {
    /// Identity info for an input that already fills the target square.
    pub fn identity() -> Self {
        Self {
            content_w: 1.0,
            content_h: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        }
    }
}

/// Aspect-preserving resize into a square target with symmetric neutral
/// padding on the shorter axis.
#[derive(Debug, Clone)]
pub struct LetterboxResize {
    target: u32,
    filter: FilterType,
}

impl LetterboxResize {
    /// Creates a letterbox resizer for a square target side length.
    pub fn new(target: u32) -> VisionResult<Self> {
        if target == 0 {
            return Err(VisionError::config_error(
                "letterbox target side must be greater than 0",
            ));
        }
        Ok(Self {
            target,
            filter: FilterType::Triangle,
        })
    }

    /// Returns the square target side length.
    pub fn target(&self) -> u32 {
        self.target
    }

    /// Applies the letterbox: resizes so the longer side fills the target,
    /// pads the other axis symmetrically, and reports the pad geometry.
    pub fn apply(&self, img: &RgbImage) -> VisionResult<(RgbImage, LetterboxInfo)> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(VisionError::invalid_input("cannot letterbox an empty image"));
        }

        let target = self.target as f32;
        let scale = (target / width as f32).min(target / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, self.target);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, self.target);

        let resized = image::imageops::resize(img, new_w, new_h, self.filter);

        let pad_x = (self.target - new_w) / 2;
        let pad_y = (self.target - new_h) / 2;
        let mut canvas = RgbImage::from_pixel(self.target, self.target, PAD_FILL);
        image::imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);

        let info = LetterboxInfo {
            content_w: new_w as f32 / target,
            content_h: new_h as f32 / target,
            pad_x: pad_x as f32 / target,
            pad_y: pad_y as f32 / target,
        };
        Ok((canvas, info))
    }
}

/// Centered padding to a square without resizing. Used on classifier crops,
/// which are resized to the model input size afterwards.
#[derive(Debug, Clone, Default)]
pub struct CenterPadToSquare;

impl CenterPadToSquare {
    /// Pads the image to a square whose side is the longer dimension, with
    /// the content centered.
    pub fn apply(&self, img: &RgbImage) -> VisionResult<RgbImage> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(VisionError::invalid_input("cannot pad an empty image"));
        }
        if width == height {
            return Ok(img.clone());
        }

        let side = width.max(height);
        let pad_x = (side - width) / 2;
        let pad_y = (side - height) / 2;
        let mut canvas = RgbImage::from_pixel(side, side, PAD_FILL);
        image::imageops::overlay(&mut canvas, img, pad_x as i64, pad_y as i64);
        Ok(canvas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_portrait_pads_x_symmetrically() {
        let resizer = LetterboxResize::new(640).unwrap();
        let img = RgbImage::new(240, 480);
        let (canvas, info) = resizer.apply(&img).unwrap();

        assert_eq!(canvas.dimensions(), (640, 640));
        assert!((info.content_h - 1.0).abs() < 1e-6);
        assert!((info.content_w - 0.5).abs() < 1e-6);
        assert!((info.pad_x - 0.25).abs() < 1e-6);
        assert_eq!(info.pad_y, 0.0);
    }

    #[test]
    fn test_letterbox_square_input_is_identity_geometry() {
        let resizer = LetterboxResize::new(320).unwrap();
        let img = RgbImage::new(100, 100);
        let (_, info) = resizer.apply(&img).unwrap();
        assert_eq!(info, LetterboxInfo::identity());
    }

    #[test]
    fn test_letterbox_padding_uses_neutral_fill() {
        let resizer = LetterboxResize::new(64).unwrap();
        let img = RgbImage::from_pixel(16, 64, Rgb([255, 255, 255]));
        let (canvas, _) = resizer.apply(&img).unwrap();
        assert_eq!(canvas.get_pixel(0, 0), &PAD_FILL);
        assert_eq!(canvas.get_pixel(32, 32), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_center_pad_makes_square() {
        let padder = CenterPadToSquare;
        let img = RgbImage::from_pixel(10, 30, Rgb([10, 20, 30]));
        let squared = padder.apply(&img).unwrap();
        assert_eq!(squared.dimensions(), (30, 30));
        // Content centered: original column 0 lands at x = 10.
        assert_eq!(squared.get_pixel(10, 0), &Rgb([10, 20, 30]));
        assert_eq!(squared.get_pixel(0, 0), &PAD_FILL);
    }

    #[test]
    fn test_rejects_zero_target_and_empty_input() {
        assert!(LetterboxResize::new(0).is_err());
        let resizer = LetterboxResize::new(64).unwrap();
        assert!(resizer.apply(&RgbImage::new(0, 0)).is_err());
    }
}
