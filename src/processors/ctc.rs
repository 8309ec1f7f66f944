//! Greedy CTC decoding for the specimen-ID reader.

use crate::core::Tensor3D;
use crate::processors::topk::argmax;
use ndarray::Axis;

/// Default charset for specimen-ID labels: digits then uppercase letters,
/// with the blank token at index 0.
const DEFAULT_CHARSET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-";

/// Decodes CTC-style recognition output into a text string.
///
/// The vocabulary places the blank token at index 0, followed by the
/// character set in model output order.
#[derive(Debug, Clone)]
pub struct CtcLabelDecode {
    /// Vocabulary including the blank token at index 0.
    characters: Vec<char>,
}

impl Default for CtcLabelDecode {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CtcLabelDecode {
    /// Creates a decoder. `charset` omits the blank token; when `None`, a
    /// default alphanumeric set is used.
    pub fn new(charset: Option<&str>) -> Self {
        let mut characters = vec!['\0'];
        characters.extend(charset.unwrap_or(DEFAULT_CHARSET).chars());
        Self { characters }
    }

    /// Number of classes the paired model must emit per timestep.
    pub fn class_count(&self) -> usize {
        self.characters.len()
    }

    /// Greedy decode of a `(1, timesteps, classes)` prediction tensor:
    /// argmax per timestep, collapse consecutive repeats, drop blanks.
    ///
    /// Returns the decoded text and the mean confidence over emitted
    /// characters (0.0 when nothing was emitted).
    pub fn decode(&self, predictions: &Tensor3D) -> (String, f32) {
        let mut text = String::new();
        let mut confidence_sum = 0.0;
        let mut emitted = 0usize;

        if predictions.shape()[0] == 0 {
            return (text, 0.0);
        }

        let mut previous: Option<usize> = None;
        for step in predictions.index_axis(Axis(0), 0).outer_iter() {
            let Some(row) = step.as_slice() else { continue };
            let Some(index) = argmax(row) else { continue };

            if index != 0 && previous != Some(index) {
                if let Some(&ch) = self.characters.get(index) {
                    text.push(ch);
                    confidence_sum += row[index];
                    emitted += 1;
                }
            }
            previous = Some(index);
        }

        let confidence = if emitted == 0 {
            0.0
        } else {
            confidence_sum / emitted as f32
        };
        (text, confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    /// Builds a (1, T, C) tensor that argmaxes to the given index sequence.
    fn tensor_for_indices(indices: &[usize], classes: usize) -> Tensor3D {
        let mut tensor = Array3::zeros((1, indices.len(), classes));
        for (t, &idx) in indices.iter().enumerate() {
            tensor[[0, t, idx]] = 1.0;
        }
        tensor
    }

    #[test]
    fn test_collapses_repeats_and_drops_blanks() {
        let decoder = CtcLabelDecode::default();
        // "1" is index 2 ('0' is 1, blank is 0); "A" is index 11.
        let tensor = tensor_for_indices(&[2, 2, 0, 2, 11, 11], decoder.class_count());
        let (text, confidence) = decoder.decode(&tensor);
        assert_eq!(text, "11A");
        assert!((confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_all_blank_yields_empty_string() {
        let decoder = CtcLabelDecode::default();
        let tensor = tensor_for_indices(&[0, 0, 0], decoder.class_count());
        let (text, confidence) = decoder.decode(&tensor);
        assert!(text.is_empty());
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn test_custom_charset() {
        let decoder = CtcLabelDecode::new(Some("XY"));
        assert_eq!(decoder.class_count(), 3);
        let tensor = tensor_for_indices(&[1, 0, 2], 3);
        let (text, _) = decoder.decode(&tensor);
        assert_eq!(text, "XY");
    }
}
