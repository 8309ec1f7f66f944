//! Single-specimen capture workflow: the exactly-one-detection rule and the
//! gated classification cascade.
//!
//! The cascade is a decision tree, not independent parallel classification:
//! species gates sex, sex gates abdomen status. Gating is expressed as an
//! explicit state machine so the biological skip rules are auditable in one
//! place rather than spread across null propagation.

use crate::domain::{
    AbdomenStatusLabel, CaptureCondition, ClassifiedSpecimen, InferenceResult, NormalizedBox,
    SexLabel, SpeciesLabel,
};
use crate::processors::argmax;
use image::RgbImage;
use std::time::Instant;
use tracing::debug;

/// State of the capture workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStage {
    /// Waiting for an accepted detection.
    Detecting,
    /// Running the species classifier.
    ClassifyingSpecies,
    /// Running the sex classifier.
    ClassifyingSex,
    /// Running the abdomen-status classifier.
    ClassifyingAbdomen,
    /// Cascade finished; no further classifiers run.
    Done,
}

impl CaptureStage {
    /// Advances the state machine given the argmax of the stage that just
    /// ran.
    ///
    /// Terminal-skip transitions:
    /// - species absent or "non-mosquito" → `Done` (sex and abdomen stay
    ///   unclassified);
    /// - sex absent or "male" → `Done` (abdomen status is only recorded for
    ///   non-male specimens in this protocol);
    /// - any argmax outside the label enumeration → `Done`.
    pub fn advance(self, top_index: Option<usize>) -> CaptureStage {
        match self {
            CaptureStage::Detecting => CaptureStage::ClassifyingSpecies,
            CaptureStage::ClassifyingSpecies => match top_index {
                Some(i)
                    if i != SpeciesLabel::NON_MOSQUITO_ORDINAL
                        && SpeciesLabel::from_index(i).is_some() =>
                {
                    CaptureStage::ClassifyingSex
                }
                _ => CaptureStage::Done,
            },
            CaptureStage::ClassifyingSex => match top_index {
                Some(i) if i != SexLabel::MALE_ORDINAL && SexLabel::from_index(i).is_some() => {
                    CaptureStage::ClassifyingAbdomen
                }
                _ => CaptureStage::Done,
            },
            CaptureStage::ClassifyingAbdomen => CaptureStage::Done,
            CaptureStage::Done => CaptureStage::Done,
        }
    }
}

/// A source of stage logits; implemented by
/// [`StageClassifier`](crate::models::StageClassifier) and by test stubs.
pub trait StageLogits {
    /// Produces raw logits for a cropped specimen region, or `None` when
    /// the stage is unavailable or failed.
    fn logits(
        &self,
        crop: &RgbImage,
    ) -> impl std::future::Future<Output = Option<Vec<f32>>> + Send;
}

impl StageLogits for crate::models::StageClassifier {
    fn logits(
        &self,
        crop: &RgbImage,
    ) -> impl std::future::Future<Output = Option<Vec<f32>>> + Send {
        self.classify(crop)
    }
}

/// Applies the exactly-one-specimen rule to a detection list.
pub fn single_detection(
    detections: &[InferenceResult],
) -> Result<&InferenceResult, CaptureCondition> {
    match detections {
        [] => Err(CaptureCondition::NoSpecimenFound),
        [only] => Ok(only),
        _ => Err(CaptureCondition::MultipleSpecimensFound),
    }
}

/// Crops a normalized box out of the source frame, clamped to frame bounds
/// with a minimum size of 1x1.
pub fn crop_region(frame: &RgbImage, bbox: &NormalizedBox) -> RgbImage {
    let (x, y, w, h) = bbox.to_pixel_rect(frame.width(), frame.height());
    image::imageops::crop_imm(frame, x, y, w, h).to_image()
}

/// Runs the gated classification cascade over one accepted detection.
///
/// Downstream classifiers are not invoked once a terminal-skip transition
/// fires; their logits and labels stay `None` in the returned result.
pub async fn classify_specimen<Species, Sex, Abdomen>(
    frame: &RgbImage,
    detections: &[InferenceResult],
    species_classifier: &Species,
    sex_classifier: &Sex,
    abdomen_classifier: &Abdomen,
) -> Result<ClassifiedSpecimen, CaptureCondition>
where
    Species: StageLogits,
    Sex: StageLogits,
    Abdomen: StageLogits,
{
    let detection = single_detection(detections)?;
    if frame.width() == 0 || frame.height() == 0 {
        return Err(CaptureCondition::ProcessingError);
    }
    let crop = crop_region(frame, &detection.bbox);

    let mut result = detection.clone();
    let mut species = None;
    let mut sex = None;
    let mut abdomen_status = None;

    let mut stage = CaptureStage::Detecting.advance(None);
    while stage != CaptureStage::Done {
        match stage {
            CaptureStage::ClassifyingSpecies => {
                let started = Instant::now();
                let logits = species_classifier.logits(&crop).await;
                result.species_duration = Some(started.elapsed());

                let top = logits.as_deref().and_then(argmax);
                species = top.and_then(SpeciesLabel::from_index);
                result.species_logits = logits;
                stage = stage.advance(top);
            }
            CaptureStage::ClassifyingSex => {
                let started = Instant::now();
                let logits = sex_classifier.logits(&crop).await;
                result.sex_duration = Some(started.elapsed());

                let top = logits.as_deref().and_then(argmax);
                sex = top.and_then(SexLabel::from_index);
                result.sex_logits = logits;
                stage = stage.advance(top);
            }
            CaptureStage::ClassifyingAbdomen => {
                let started = Instant::now();
                let logits = abdomen_classifier.logits(&crop).await;
                result.abdomen_duration = Some(started.elapsed());

                let top = logits.as_deref().and_then(argmax);
                abdomen_status = top.and_then(AbdomenStatusLabel::from_index);
                result.abdomen_logits = logits;
                stage = stage.advance(top);
            }
            CaptureStage::Detecting | CaptureStage::Done => break,
        }
    }

    debug!(
        species = species.map(|s| s.as_str()),
        sex = sex.map(|s| s.as_str()),
        abdomen = abdomen_status.map(|s| s.as_str()),
        "classification cascade finished"
    );

    Ok(ClassifiedSpecimen {
        result,
        species,
        sex,
        abdomen_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NormalizedBox;

    /// Stub stage that always returns the same logits.
    struct Fixed(Option<Vec<f32>>);

    impl StageLogits for Fixed {
        fn logits(
            &self,
            _crop: &RgbImage,
        ) -> impl std::future::Future<Output = Option<Vec<f32>>> + Send {
            let out = self.0.clone();
            async move { out }
        }
    }

    /// Stub stage that panics if invoked: verifies gated stages are
    /// skipped, not merely discarded.
    struct MustNotRun;

    impl StageLogits for MustNotRun {
        fn logits(
            &self,
            _crop: &RgbImage,
        ) -> impl std::future::Future<Output = Option<Vec<f32>>> + Send {
            async move { panic!("gated classifier must not be invoked") }
        }
    }

    fn frame() -> RgbImage {
        RgbImage::new(64, 64)
    }

    fn one_detection() -> Vec<InferenceResult> {
        vec![InferenceResult::detection(
            NormalizedBox::new(0.25, 0.25, 0.5, 0.5),
            0.95,
            0,
        )]
    }

    /// Logits whose argmax is `index` over `classes` classes.
    fn peaked(index: usize, classes: usize) -> Option<Vec<f32>> {
        let mut logits = vec![0.0; classes];
        logits[index] = 5.0;
        Some(logits)
    }

    #[test]
    fn test_exactly_one_rule() {
        assert_eq!(
            single_detection(&[]).unwrap_err(),
            CaptureCondition::NoSpecimenFound
        );
        let two = [one_detection(), one_detection()].concat();
        assert_eq!(
            single_detection(&two).unwrap_err(),
            CaptureCondition::MultipleSpecimensFound
        );
        assert!(single_detection(&one_detection()).is_ok());
    }

    #[tokio::test]
    async fn test_full_cascade_runs_all_stages() {
        let classified = classify_specimen(
            &frame(),
            &one_detection(),
            &Fixed(peaked(0, 6)),
            &Fixed(peaked(0, 2)),
            &Fixed(peaked(3, 4)),
        )
        .await
        .unwrap();

        assert_eq!(classified.species, Some(SpeciesLabel::Gambiae));
        assert_eq!(classified.sex, Some(SexLabel::Female));
        assert_eq!(classified.abdomen_status, Some(AbdomenStatusLabel::Gravid));
        assert!(classified.result.species_logits.is_some());
        assert!(classified.result.abdomen_duration.is_some());
    }

    #[tokio::test]
    async fn test_non_mosquito_skips_sex_and_abdomen() {
        let classified = classify_specimen(
            &frame(),
            &one_detection(),
            &Fixed(peaked(SpeciesLabel::NON_MOSQUITO_ORDINAL, 6)),
            &MustNotRun,
            &MustNotRun,
        )
        .await
        .unwrap();

        assert_eq!(classified.species, Some(SpeciesLabel::NonMosquito));
        assert_eq!(classified.sex, None);
        assert_eq!(classified.abdomen_status, None);
        assert!(classified.result.sex_logits.is_none());
        assert!(classified.result.abdomen_logits.is_none());
    }

    #[tokio::test]
    async fn test_null_species_skips_downstream() {
        let classified = classify_specimen(
            &frame(),
            &one_detection(),
            &Fixed(None),
            &MustNotRun,
            &MustNotRun,
        )
        .await
        .unwrap();

        assert_eq!(classified.species, None);
        assert_eq!(classified.sex, None);
        assert_eq!(classified.abdomen_status, None);
    }

    #[tokio::test]
    async fn test_male_skips_abdomen_regardless_of_its_output() {
        let classified = classify_specimen(
            &frame(),
            &one_detection(),
            &Fixed(peaked(0, 6)),
            &Fixed(peaked(SexLabel::MALE_ORDINAL, 2)),
            &MustNotRun,
        )
        .await
        .unwrap();

        assert_eq!(classified.sex, Some(SexLabel::Male));
        assert_eq!(classified.abdomen_status, None);
        assert!(classified.result.abdomen_logits.is_none());
    }

    #[tokio::test]
    async fn test_null_sex_skips_abdomen() {
        let classified = classify_specimen(
            &frame(),
            &one_detection(),
            &Fixed(peaked(1, 6)),
            &Fixed(None),
            &MustNotRun,
        )
        .await
        .unwrap();

        assert_eq!(classified.species, Some(SpeciesLabel::Funestus));
        assert_eq!(classified.sex, None);
        assert_eq!(classified.abdomen_status, None);
    }

    #[test]
    fn test_stage_machine_named_transitions() {
        use CaptureStage::*;
        assert_eq!(Detecting.advance(None), ClassifyingSpecies);
        assert_eq!(ClassifyingSpecies.advance(Some(0)), ClassifyingSex);
        assert_eq!(
            ClassifyingSpecies.advance(Some(SpeciesLabel::NON_MOSQUITO_ORDINAL)),
            Done
        );
        assert_eq!(ClassifyingSpecies.advance(None), Done);
        // Out-of-range argmax terminates instead of mislabeling.
        assert_eq!(ClassifyingSpecies.advance(Some(99)), Done);
        assert_eq!(ClassifyingSex.advance(Some(0)), ClassifyingAbdomen);
        assert_eq!(ClassifyingSex.advance(Some(SexLabel::MALE_ORDINAL)), Done);
        assert_eq!(ClassifyingAbdomen.advance(Some(2)), Done);
        assert_eq!(Done.advance(Some(0)), Done);
    }

    #[test]
    fn test_crop_region_clamps_and_is_nonempty() {
        let frame = frame();
        let crop = crop_region(&frame, &NormalizedBox::new(0.9, 0.9, 0.5, 0.5));
        assert!(crop.width() >= 1 && crop.height() >= 1);
        assert!(crop.width() <= frame.width());
    }
}
