//! MediaPipe palm detection, used to place the hand landmark crops.

use std::{f32::consts::PI, path::Path};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::common::{self, LetterboxInfo, PALM_INPUT_SIZE};
use crate::types::Frame;

const PALM_KEYPOINTS: usize = 7;
const WRIST: usize = 0;
const MIDDLE_FINGER_MCP: usize = 2;

/// Crop side relative to the palm box, and how far the crop centre moves towards the fingers.
const CROP_SCALE: f32 = 2.6;
const CROP_SHIFT: f32 = 0.5;

/// One detected palm in frame pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct PalmRegion {
    pub bbox: [f32; 4],
    pub keypoints: Vec<(f32, f32)>,
    pub score: f32,
}

#[derive(Clone, Debug)]
pub struct PalmDetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
}

impl Default for PalmDetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_threshold: 0.3,
            top_k: 8,
        }
    }
}

pub struct PalmDetector {
    session: Session,
    anchors: Vec<[f32; 2]>,
    cfg: PalmDetectorConfig,
}

impl PalmDetector {
    pub fn new(model_path: &Path, cfg: PalmDetectorConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load palm detector from {}", model_path.display())
            })?;

        Ok(Self {
            session,
            anchors: ssd_anchors(PALM_INPUT_SIZE),
            cfg,
        })
    }

    /// Palms above the score threshold, best first.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<PalmRegion>> {
        let (input, letterbox) = common::prepare_frame(frame, PALM_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run palm detector session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "palm detector returned {} outputs, expected at least 2",
                outputs.len()
            ));
        }

        let boxes = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let features = *boxes
            .shape()
            .last()
            .ok_or_else(|| anyhow!("palm box output has no dimensions"))?;
        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let scores: Vec<f32> = scores.iter().copied().collect();

        decode_palms(
            &boxes,
            features,
            &scores,
            &self.anchors,
            &letterbox,
            &self.cfg,
        )
    }
}

/// Anchor centres of the 192px palm model: a 24x24 grid with two anchors per cell at stride 8,
/// then a 12x12 grid with six anchors per cell for the three stride-16 layers.
pub fn ssd_anchors(input_size: u32) -> Vec<[f32; 2]> {
    const LAYERS: [(u32, usize); 2] = [(8, 2), (16, 6)];

    let mut anchors = Vec::new();
    for (stride, per_cell) in LAYERS {
        let grid = input_size.div_ceil(stride);
        for y in 0..grid {
            for x in 0..grid {
                let center = [
                    (x as f32 + 0.5) / grid as f32,
                    (y as f32 + 0.5) / grid as f32,
                ];
                anchors.extend(std::iter::repeat_n(center, per_cell));
            }
        }
    }
    anchors
}

fn decode_palms(
    boxes: &[f32],
    features: usize,
    scores: &[f32],
    anchors: &[[f32; 2]],
    letterbox: &LetterboxInfo,
    cfg: &PalmDetectorConfig,
) -> Result<Vec<PalmRegion>> {
    if features < 4 + PALM_KEYPOINTS * 2 {
        return Err(anyhow!("palm box feature dimension too small: {features}"));
    }
    let count = anchors.len().min(scores.len()).min(boxes.len() / features);

    let input = PALM_INPUT_SIZE as f32;
    // Normalized letterbox coordinates to frame pixels.
    let to_frame = |x: f32, y: f32| {
        (
            (x * input - letterbox.pad_x) / letterbox.scale,
            (y * input - letterbox.pad_y) / letterbox.scale,
        )
    };
    let (max_x, max_y) = (
        letterbox.orig_w.saturating_sub(1) as f32,
        letterbox.orig_h.saturating_sub(1) as f32,
    );

    let mut candidates = Vec::new();
    for (idx, anchor) in anchors.iter().enumerate().take(count) {
        let score = common::sigmoid(scores[idx]);
        if score < cfg.score_threshold {
            continue;
        }

        let raw = &boxes[idx * features..(idx + 1) * features];
        let cx = raw[0] / input + anchor[0];
        let cy = raw[1] / input + anchor[1];
        let (hw, hh) = (raw[2] / input / 2.0, raw[3] / input / 2.0);
        if hw <= 0.0 || hh <= 0.0 {
            continue;
        }

        let (x1, y1) = to_frame(cx - hw, cy - hh);
        let (x2, y2) = to_frame(cx + hw, cy + hh);
        let keypoints = (0..PALM_KEYPOINTS)
            .map(|k| {
                to_frame(
                    raw[4 + k * 2] / input + anchor[0],
                    raw[5 + k * 2] / input + anchor[1],
                )
            })
            .collect();

        candidates.push(PalmRegion {
            bbox: [
                x1.clamp(0.0, max_x),
                y1.clamp(0.0, max_y),
                x2.clamp(0.0, max_x),
                y2.clamp(0.0, max_y),
            ],
            keypoints,
            score,
        });
    }

    let bboxes: Vec<[f32; 4]> = candidates.iter().map(|c| c.bbox).collect();
    let scores: Vec<f32> = candidates.iter().map(|c| c.score).collect();
    let keep = common::nms(&bboxes, &scores, cfg.nms_threshold, cfg.top_k);
    Ok(keep.into_iter().map(|idx| candidates[idx].clone()).collect())
}

/// Rotation that turns the wrist-to-middle-finger direction upright.
pub fn palm_rotation(region: &PalmRegion) -> f32 {
    let (Some(wrist), Some(middle)) = (
        region.keypoints.get(WRIST),
        region.keypoints.get(MIDDLE_FINGER_MCP),
    ) else {
        return 0.0;
    };
    let angle = PI * 0.5 - (-(middle.1 - wrist.1)).atan2(middle.0 - wrist.0);
    // Wrap into [-pi, pi).
    angle - 2.0 * PI * ((angle + PI) / (2.0 * PI)).floor()
}

/// Centre, side and rotation of the square crop fed to the hand landmark model.
pub fn hand_crop(region: &PalmRegion) -> ((f32, f32), f32, f32) {
    let width = (region.bbox[2] - region.bbox[0]).abs();
    let height = (region.bbox[3] - region.bbox[1]).abs();
    let angle = palm_rotation(region);
    let (sin, cos) = angle.sin_cos();

    let cx = (region.bbox[0] + region.bbox[2]) * 0.5 + CROP_SHIFT * height * sin;
    let cy = (region.bbox[1] + region.bbox[3]) * 0.5 - CROP_SHIFT * height * cos;
    let side = width.max(height) * CROP_SCALE;

    ((cx, cy), side, angle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_letterbox() -> LetterboxInfo {
        LetterboxInfo {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            orig_w: PALM_INPUT_SIZE,
            orig_h: PALM_INPUT_SIZE,
        }
    }

    fn region(wrist: (f32, f32), middle: (f32, f32)) -> PalmRegion {
        let mut keypoints = vec![(0.0, 0.0); PALM_KEYPOINTS];
        keypoints[WRIST] = wrist;
        keypoints[MIDDLE_FINGER_MCP] = middle;
        PalmRegion {
            bbox: [40.0, 40.0, 60.0, 60.0],
            keypoints,
            score: 0.9,
        }
    }

    #[test]
    fn anchor_layout_matches_palm_model() {
        let anchors = ssd_anchors(PALM_INPUT_SIZE);
        assert_eq!(anchors.len(), 2016);
        assert_eq!(anchors[0], [0.5 / 24.0, 0.5 / 24.0]);
        assert_eq!(anchors[1], anchors[0]);
        assert_eq!(anchors[1152], [0.5 / 12.0, 0.5 / 12.0]);
        assert_eq!(anchors[2015], [11.5 / 12.0, 11.5 / 12.0]);
    }

    #[test]
    fn decodes_scored_anchor_into_frame_pixels() {
        let anchors = vec![[0.5, 0.5], [0.25, 0.25]];
        let features = 18;
        let mut boxes = vec![0.0; features * 2];
        boxes[2] = 48.0;
        boxes[3] = 48.0;
        boxes[4 + WRIST * 2 + 1] = 10.0;
        let scores = [4.0, -4.0];

        let palms = decode_palms(
            &boxes,
            features,
            &scores,
            &anchors,
            &identity_letterbox(),
            &PalmDetectorConfig::default(),
        )
        .unwrap();

        assert_eq!(palms.len(), 1);
        let palm = &palms[0];
        assert_eq!(palm.bbox, [72.0, 72.0, 120.0, 120.0]);
        let (wx, wy) = palm.keypoints[WRIST];
        assert!((wx - 96.0).abs() < 1e-3 && (wy - 106.0).abs() < 1e-3);
        assert!(palm.score > 0.98);
    }

    #[test]
    fn rejects_short_feature_rows() {
        let result = decode_palms(
            &[0.0; 8],
            8,
            &[1.0],
            &[[0.5, 0.5]],
            &identity_letterbox(),
            &PalmDetectorConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn upright_hand_needs_no_rotation() {
        let palm = region((50.0, 60.0), (50.0, 40.0));
        assert!(palm_rotation(&palm).abs() < 1e-6);

        let ((cx, cy), side, _) = hand_crop(&palm);
        assert!((cx - 50.0).abs() < 1e-4);
        assert!((cy - 40.0).abs() < 1e-4);
        assert!((side - 52.0).abs() < 1e-4);
    }

    #[test]
    fn sideways_hand_rotates_a_quarter_turn() {
        let pointing_right = region((40.0, 50.0), (60.0, 50.0));
        assert!((palm_rotation(&pointing_right) - PI * 0.5).abs() < 1e-5);

        let ((cx, cy), _, _) = hand_crop(&pointing_right);
        assert!((cx - 60.0).abs() < 1e-4);
        assert!((cy - 50.0).abs() < 1e-4);
    }
}
