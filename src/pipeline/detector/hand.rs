use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    LandmarkSource,
    common::{self, HAND_INPUT_SIZE, NUM_HAND_LANDMARKS},
    palm::{PalmDetector, PalmDetectorConfig, PalmRegion, hand_crop},
};
use crate::types::{Frame, LandmarkCategory, LandmarkPoint, LandmarkSet};

/// MediaPipe palm detection followed by the hand landmark model on a rotated crop per palm.
///
/// Up to `max_hands` palms are tracked per frame. Each tracked hand is filed under left or
/// right according to the model's handedness output.
pub struct OrtHandDetector {
    landmarks: Session,
    palms: PalmDetector,
    min_confidence: f32,
    max_hands: usize,
}

/// One hand before it is assigned a side.
#[derive(Clone, Debug, PartialEq)]
struct TrackedHand {
    side: LandmarkCategory,
    confidence: f32,
    points: Vec<LandmarkPoint>,
}

impl OrtHandDetector {
    pub fn new(
        palm_model: &Path,
        landmark_model: &Path,
        min_confidence: f32,
        max_hands: usize,
    ) -> Result<Self> {
        let landmarks = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(landmark_model)
            .with_context(|| {
                format!(
                    "failed to load hand landmark model from {}",
                    landmark_model.display()
                )
            })?;
        let palms = PalmDetector::new(palm_model, PalmDetectorConfig::default())?;
        log::info!(
            "hand tracking ready using {} and {}",
            palm_model.display(),
            landmark_model.display()
        );

        Ok(Self {
            landmarks,
            palms,
            min_confidence,
            max_hands,
        })
    }

    fn track_hand(&mut self, frame: &Frame, palm: &PalmRegion) -> Result<Option<TrackedHand>> {
        let (center, side, angle) = hand_crop(palm);
        let (input, transform) =
            common::prepare_rotated_crop(frame, center, side, angle, HAND_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .landmarks
            .run(ort::inputs![tensor])
            .context("failed to run hand landmark session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("hand landmark model returned no outputs"));
        }
        let coords: Vec<f32> = outputs[0].try_extract_array::<f32>()?.iter().copied().collect();
        let raw = common::decode_landmarks(&coords, NUM_HAND_LANDMARKS)?;

        let scalar = |idx: usize| {
            (outputs.len() > idx)
                .then(|| outputs[idx].try_extract_array::<f32>().ok())
                .flatten()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(0.0)
        };
        let confidence = (scalar(1) * palm.score).clamp(0.0, 1.0);
        if confidence < self.min_confidence {
            log::trace!("hand confidence {confidence:.2} below threshold");
            return Ok(None);
        }

        Ok(Some(TrackedHand {
            side: hand_category(scalar(2)),
            confidence,
            points: raw.into_iter().map(|lm| transform.to_landmark(lm)).collect(),
        }))
    }
}

impl LandmarkSource for OrtHandDetector {
    fn name(&self) -> &'static str {
        "hands"
    }

    fn locate(&mut self, frame: &Frame) -> Result<Vec<LandmarkSet>> {
        let palms = self.palms.detect(frame)?;
        let mut hands = Vec::with_capacity(self.max_hands);
        for palm in palms.iter().take(self.max_hands) {
            if let Some(hand) = self.track_hand(frame, palm)? {
                hands.push(hand);
            }
        }
        Ok(assign_sides(hands))
    }
}

fn hand_category(handedness: f32) -> LandmarkCategory {
    if handedness >= 0.5 {
        LandmarkCategory::RightHand
    } else {
        LandmarkCategory::LeftHand
    }
}

/// At most one set per side. When two hands claim the same side the less confident one takes
/// the other side.
fn assign_sides(mut hands: Vec<TrackedHand>) -> Vec<LandmarkSet> {
    hands.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut sets: Vec<LandmarkSet> = Vec::with_capacity(2);
    for hand in hands {
        let taken = |side: LandmarkCategory| sets.iter().any(|set: &LandmarkSet| set.category == side);
        let side = match hand.side {
            side if !taken(side) => side,
            LandmarkCategory::LeftHand if !taken(LandmarkCategory::RightHand) => {
                LandmarkCategory::RightHand
            }
            LandmarkCategory::RightHand if !taken(LandmarkCategory::LeftHand) => {
                LandmarkCategory::LeftHand
            }
            _ => continue,
        };
        sets.push(LandmarkSet::new(side, hand.points));
    }
    sets
}
