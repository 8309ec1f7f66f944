//! Image and tensor processors shared by the specimen models.

pub mod ctc;
pub mod normalization;
pub mod postprocess;
pub mod resize;
pub mod topk;
pub mod types;

pub use ctc::CtcLabelDecode;
pub use normalization::NormalizeImage;
pub use postprocess::{Candidate, DetectionPostProcess, calculate_iou};
pub use resize::{CenterPadToSquare, LetterboxInfo, LetterboxResize};
pub use topk::{TopkResult, argmax, topk};
pub use types::ChannelOrder;
