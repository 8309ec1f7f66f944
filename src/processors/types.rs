//! Shared types for image processing operations.

/// Order of channels in a prepared tensor.
///
/// The detector consumes channel-last (HWC) input while the classifiers
/// consume channel-first (CHW); this distinction is a hard contract of the
/// model artifacts and must be preserved exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    /// Channel, Height, Width (planar, channel-first).
    CHW,
    /// Height, Width, Channel (interleaved, channel-last).
    HWC,
}
