//! Pixel normalization for model input tensors.

use crate::core::{Tensor4D, VisionError, VisionResult};
use crate::processors::types::ChannelOrder;
use image::RgbImage;
use ndarray::Array4;

/// Normalizes an image into a model input tensor.
///
/// Precomputes `alpha = scale / std` and `beta = -mean / std` per channel so
/// each pixel costs one multiply-add, and emits either channel-first or
/// channel-last layout.
#[derive(Debug, Clone)]
pub struct NormalizeImage {
    /// Scaling factors for each channel (alpha = scale / std).
    pub alpha: [f32; 3],
    /// Offset values for each channel (beta = -mean / std).
    pub beta: [f32; 3],
    /// Output channel ordering.
    pub order: ChannelOrder,
}

impl NormalizeImage {
    /// Creates a new normalizer.
    ///
    /// # Arguments
    ///
    /// * `scale` - Scaling factor applied before mean/std (defaults to 1/255)
    /// * `mean` - Per-channel mean (defaults to ImageNet [0.485, 0.456, 0.406])
    /// * `std` - Per-channel std (defaults to ImageNet [0.229, 0.224, 0.225])
    /// * `order` - Output channel ordering (defaults to CHW)
    ///
    /// # Errors
    ///
    /// Returns a configuration error if scale or any std value is not
    /// strictly positive.
    pub fn new(
        scale: Option<f32>,
        mean: Option<[f32; 3]>,
        std: Option<[f32; 3]>,
        order: Option<ChannelOrder>,
    ) -> VisionResult<Self> {
        let scale = scale.unwrap_or(1.0 / 255.0);
        let mean = mean.unwrap_or([0.485, 0.456, 0.406]);
        let std = std.unwrap_or([0.229, 0.224, 0.225]);
        let order = order.unwrap_or(ChannelOrder::CHW);

        if scale <= 0.0 {
            return Err(VisionError::config_error("scale must be greater than 0"));
        }
        for (i, &s) in std.iter().enumerate() {
            if s <= 0.0 {
                return Err(VisionError::config_error(format!(
                    "standard deviation at index {i} must be greater than 0, got {s}"
                )));
            }
        }

        let mut alpha = [0.0; 3];
        let mut beta = [0.0; 3];
        for c in 0..3 {
            alpha[c] = scale / std[c];
            beta[c] = -mean[c] / std[c];
        }

        Ok(Self { alpha, beta, order })
    }

    /// Creates a normalizer for the detector input: scale to [0,1], no
    /// mean/std correction, channel-last layout.
    pub fn for_detection() -> VisionResult<Self> {
        Self::new(
            Some(1.0 / 255.0),
            Some([0.0, 0.0, 0.0]),
            Some([1.0, 1.0, 1.0]),
            Some(ChannelOrder::HWC),
        )
    }

    /// Creates a normalizer for the classifier input: scale to [0,1],
    /// ImageNet mean/std, channel-first planar layout.
    pub fn for_classification() -> VisionResult<Self> {
        Self::new(None, None, None, Some(ChannelOrder::CHW))
    }

    /// Normalizes a single image into a batch-of-one 4D tensor.
    ///
    /// CHW order yields shape `(1, 3, h, w)`; HWC yields `(1, h, w, 3)`.
    pub fn normalize_to(&self, img: &RgbImage) -> VisionResult<Tensor4D> {
        let (width, height) = img.dimensions();
        let (w, h) = (width as usize, height as usize);
        if w == 0 || h == 0 {
            return Err(VisionError::invalid_input(
                "cannot normalize an empty image",
            ));
        }

        match self.order {
            ChannelOrder::CHW => {
                let mut tensor = Array4::<f32>::zeros((1, 3, h, w));
                for (x, y, pixel) in img.enumerate_pixels() {
                    for c in 0..3 {
                        tensor[[0, c, y as usize, x as usize]] =
                            pixel.0[c] as f32 * self.alpha[c] + self.beta[c];
                    }
                }
                Ok(tensor)
            }
            ChannelOrder::HWC => {
                let mut tensor = Array4::<f32>::zeros((1, h, w, 3));
                for (x, y, pixel) in img.enumerate_pixels() {
                    for c in 0..3 {
                        tensor[[0, y as usize, x as usize, c]] =
                            pixel.0[c] as f32 * self.alpha[c] + self.beta[c];
                    }
                }
                Ok(tensor)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_positive_scale_and_std() {
        assert!(NormalizeImage::new(Some(0.0), None, None, None).is_err());
        assert!(NormalizeImage::new(None, None, Some([1.0, 0.0, 1.0]), None).is_err());
    }

    #[test]
    fn test_detection_layout_is_channel_last() {
        let normalizer = NormalizeImage::for_detection().unwrap();
        let mut img = RgbImage::new(4, 2);
        img.put_pixel(1, 0, image::Rgb([255, 0, 51]));

        let tensor = normalizer.normalize_to(&img).unwrap();
        assert_eq!(tensor.shape(), &[1, 2, 4, 3]);
        assert!((tensor[[0, 0, 1, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 0, 1, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_classification_layout_is_planar_channel_first() {
        let normalizer = NormalizeImage::for_classification().unwrap();
        let mut img = RgbImage::new(2, 2);
        img.put_pixel(0, 1, image::Rgb([128, 128, 128]));

        let tensor = normalizer.normalize_to(&img).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 2, 2]);
        // ImageNet normalization of 128/255 on the red channel.
        let expected = (128.0 / 255.0 - 0.485) / 0.229;
        assert!((tensor[[0, 0, 1, 0]] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_rejects_empty_image() {
        let normalizer = NormalizeImage::for_detection().unwrap();
        let img = RgbImage::new(0, 0);
        assert!(normalizer.normalize_to(&img).is_err());
    }
}
