//! Label enumerations for the classification stages.
//!
//! Ordinal position in each enumeration must match the paired classifier's
//! output tensor index order exactly. That coupling is a contract between the
//! model artifacts and this code; it cannot be verified from the graph alone,
//! so [`check_output_classes`] at least cross-checks the class count after a
//! model loads and logs a warning on mismatch.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Species classes, in classifier output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeciesLabel {
    /// Anopheles gambiae complex.
    Gambiae,
    /// Anopheles funestus group.
    Funestus,
    /// Other Anopheles species.
    OtherAnopheles,
    /// Culex species.
    Culex,
    /// Aedes species.
    Aedes,
    /// Not a mosquito (debris, other insect, empty chamber).
    NonMosquito,
}

impl SpeciesLabel {
    /// All species labels in ordinal order.
    pub const ALL: [SpeciesLabel; 6] = [
        SpeciesLabel::Gambiae,
        SpeciesLabel::Funestus,
        SpeciesLabel::OtherAnopheles,
        SpeciesLabel::Culex,
        SpeciesLabel::Aedes,
        SpeciesLabel::NonMosquito,
    ];

    /// Ordinal of the terminal "non-mosquito" label that stops the cascade.
    pub const NON_MOSQUITO_ORDINAL: usize = 5;

    /// Resolves a classifier argmax index to a label.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Returns the label's ordinal index.
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Returns the persisted string form of the label.
    pub fn as_str(self) -> &'static str {
        match self {
            SpeciesLabel::Gambiae => "an. gambiae",
            SpeciesLabel::Funestus => "an. funestus",
            SpeciesLabel::OtherAnopheles => "an. other",
            SpeciesLabel::Culex => "culex",
            SpeciesLabel::Aedes => "aedes",
            SpeciesLabel::NonMosquito => "non-mosquito",
        }
    }
}

/// Sex classes, in classifier output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SexLabel {
    /// Female specimen.
    Female,
    /// Male specimen.
    Male,
}

impl SexLabel {
    /// All sex labels in ordinal order.
    pub const ALL: [SexLabel; 2] = [SexLabel::Female, SexLabel::Male];

    /// Ordinal of the "male" label. Abdomen status is only recorded for
    /// non-male specimens in this protocol, so this ordinal skips the last
    /// cascade stage.
    pub const MALE_ORDINAL: usize = 1;

    /// Resolves a classifier argmax index to a label.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Returns the label's ordinal index.
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Returns the persisted string form of the label.
    pub fn as_str(self) -> &'static str {
        match self {
            SexLabel::Female => "female",
            SexLabel::Male => "male",
        }
    }
}

/// Abdomen status classes, in classifier output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbdomenStatusLabel {
    /// Unfed abdomen.
    Unfed,
    /// Blood-fed abdomen.
    BloodFed,
    /// Half-gravid abdomen.
    HalfGravid,
    /// Gravid abdomen.
    Gravid,
}

impl AbdomenStatusLabel {
    /// All abdomen-status labels in ordinal order.
    pub const ALL: [AbdomenStatusLabel; 4] = [
        AbdomenStatusLabel::Unfed,
        AbdomenStatusLabel::BloodFed,
        AbdomenStatusLabel::HalfGravid,
        AbdomenStatusLabel::Gravid,
    ];

    /// Resolves a classifier argmax index to a label.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Returns the label's ordinal index.
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Returns the persisted string form of the label.
    pub fn as_str(self) -> &'static str {
        match self {
            AbdomenStatusLabel::Unfed => "unfed",
            AbdomenStatusLabel::BloodFed => "blood-fed",
            AbdomenStatusLabel::HalfGravid => "half-gravid",
            AbdomenStatusLabel::Gravid => "gravid",
        }
    }
}

/// Compares a loaded model's output class count against the label
/// enumeration it is paired with, logging a warning on mismatch.
///
/// A mismatched model still loads and runs, exactly as a mismatched artifact
/// would have; this check only makes the hazard visible in logs instead of
/// silently mislabeling specimens.
pub fn check_output_classes(stage: &str, model_classes: Option<usize>, expected: usize) {
    match model_classes {
        Some(found) if found != expected => {
            warn!(
                stage,
                found,
                expected,
                "classifier output class count does not match label enumeration; \
                 argmax indices may resolve to wrong labels"
            );
        }
        None => {
            warn!(
                stage,
                expected, "classifier output class count could not be read from the graph"
            );
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_match_declaration_order() {
        for (i, label) in SpeciesLabel::ALL.iter().enumerate() {
            assert_eq!(label.ordinal(), i);
            assert_eq!(SpeciesLabel::from_index(i), Some(*label));
        }
        for (i, label) in SexLabel::ALL.iter().enumerate() {
            assert_eq!(label.ordinal(), i);
            assert_eq!(SexLabel::from_index(i), Some(*label));
        }
        for (i, label) in AbdomenStatusLabel::ALL.iter().enumerate() {
            assert_eq!(label.ordinal(), i);
            assert_eq!(AbdomenStatusLabel::from_index(i), Some(*label));
        }
    }

    #[test]
    fn test_terminal_ordinals() {
        assert_eq!(
            SpeciesLabel::from_index(SpeciesLabel::NON_MOSQUITO_ORDINAL),
            Some(SpeciesLabel::NonMosquito)
        );
        assert_eq!(
            SexLabel::from_index(SexLabel::MALE_ORDINAL),
            Some(SexLabel::Male)
        );
    }

    #[test]
    fn test_out_of_range_index_is_none() {
        assert_eq!(SpeciesLabel::from_index(SpeciesLabel::ALL.len()), None);
        assert_eq!(SexLabel::from_index(99), None);
    }
}
