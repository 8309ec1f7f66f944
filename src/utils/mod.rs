//! Small shared utilities.

mod image;

pub use image::{dynamic_to_rgb, load_image, rgb_from_raw};
