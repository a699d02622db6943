//! SCRFD face detection plus a 68-point facial mark model.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{LandmarkSource, common};
use crate::types::{Frame, LandmarkCategory, LandmarkSet};

const DETECTOR_INPUT_SIZE: u32 = 640;
const MARK_INPUT_SIZE: u32 = 128;
const NUM_FACE_MARKS: usize = 68;
const NMS_THRESHOLD: f32 = 0.4;
/// Fraction of the face box added on every side before the mark crop is taken.
const BOX_SHIFT: f32 = 0.2;

/// Anchor layout of an SCRFD export, chosen by how many outputs the model has.
#[derive(Clone, Debug, PartialEq)]
struct ScrfdLayout {
    strides: Vec<u32>,
    anchors_per_cell: usize,
}

impl ScrfdLayout {
    fn for_outputs(count: usize) -> Self {
        match count {
            10 | 15 => Self {
                strides: vec![8, 16, 32, 64, 128],
                anchors_per_cell: 1,
            },
            6 | 9 => Self::three_stride(),
            other => {
                log::warn!("unknown face detector layout with {other} outputs, assuming 3 strides");
                Self::three_stride()
            }
        }
    }

    fn three_stride() -> Self {
        Self {
            strides: vec![8, 16, 32],
            anchors_per_cell: 2,
        }
    }
}

pub struct OrtFaceDetector {
    detector: Session,
    marks: Session,
    min_confidence: f32,
}

impl OrtFaceDetector {
    pub fn new(detector_model: &Path, mark_model: &Path, min_confidence: f32) -> Result<Self> {
        let load = |path: &Path, what: &str| -> Result<Session> {
            Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .with_intra_threads(2)?
                .commit_from_file(path)
                .with_context(|| format!("failed to load {what} from {}", path.display()))
        };
        let detector = load(detector_model, "face detector")?;
        let marks = load(mark_model, "facial mark model")?;
        log::info!(
            "face tracking ready using {} and {}",
            detector_model.display(),
            mark_model.display()
        );

        Ok(Self {
            detector,
            marks,
            min_confidence,
        })
    }

    /// Best face box in frame pixels, if any clears the threshold.
    fn find_face(&mut self, frame: &Frame) -> Result<Option<[f32; 4]>> {
        let (input, det_scale) = prepare_scrfd_input(frame)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .detector
            .run(ort::inputs![tensor])
            .context("failed to run face detector session")?;

        let layout = ScrfdLayout::for_outputs(outputs.len());
        let offset = layout.strides.len();
        if outputs.len() < offset * 2 {
            return Err(anyhow!(
                "face detector returned {} outputs, expected at least {}",
                outputs.len(),
                offset * 2
            ));
        }

        let mut boxes = Vec::new();
        let mut scores = Vec::new();
        for (idx, &stride) in layout.strides.iter().enumerate() {
            let level_scores: Vec<f32> = outputs[idx]
                .try_extract_array::<f32>()?
                .iter()
                .copied()
                .collect();
            let distances: Vec<f32> = outputs[idx + offset]
                .try_extract_array::<f32>()?
                .iter()
                .copied()
                .collect();
            for (bbox, score) in decode_stride(
                &level_scores,
                &distances,
                stride,
                layout.anchors_per_cell,
                self.min_confidence,
                det_scale,
            ) {
                boxes.push(bbox);
                scores.push(score);
            }
        }

        Ok(common::nms(&boxes, &scores, NMS_THRESHOLD, 1)
            .first()
            .map(|&best| boxes[best]))
    }
}

impl LandmarkSource for OrtFaceDetector {
    fn name(&self) -> &'static str {
        "face"
    }

    fn locate(&mut self, frame: &Frame) -> Result<Vec<LandmarkSet>> {
        let Some(face) = self.find_face(frame)? else {
            return Ok(Vec::new());
        };

        let (center, side) = mark_crop(face);
        let (input, transform) =
            common::prepare_rotated_crop(frame, center, side, 0.0, MARK_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .marks
            .run(ort::inputs![tensor])
            .context("failed to run facial mark session")?;
        if outputs.len() < 1 {
            return Err(anyhow!("facial mark model returned no outputs"));
        }

        let flat: Vec<f32> = outputs[0].try_extract_array::<f32>()?.iter().copied().collect();
        let points = decode_marks(&flat)?
            .into_iter()
            .map(|(x, y)| transform.to_landmark([x, y, 0.0]))
            .collect();
        Ok(vec![LandmarkSet::new(LandmarkCategory::Face, points)])
    }
}

/// Scales the frame into the top-left corner of a black 640x640 square, NCHW, mean 127.5.
/// Also returns the factor from frame pixels to detector pixels.
fn prepare_scrfd_input(frame: &Frame) -> Result<(Array4<f32>, f32)> {
    common::check_frame(frame)?;
    let size = DETECTOR_INPUT_SIZE;
    let scale = (size as f32 / frame.width as f32).min(size as f32 / frame.height as f32);
    let new_w = ((frame.width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((frame.height as f32 * scale).round() as u32).clamp(1, size);
    let (resized, _, _) = common::resize_rgba(frame, new_w, new_h)?;

    let side = size as usize;
    let plane = side * side;
    let blank = -127.5 / 128.0;
    let mut data = vec![blank; plane * 3];
    for y in 0..new_h as usize {
        for x in 0..new_w as usize {
            let src = (y * new_w as usize + x) * 4;
            let dst = y * side + x;
            for c in 0..3 {
                data[c * plane + dst] = (resized[src + c] as f32 - 127.5) / 128.0;
            }
        }
    }

    let input = Array4::from_shape_vec((1, 3, side, side), data)
        .context("failed to build face detector tensor")?;
    Ok((input, new_w as f32 / frame.width as f32))
}

/// Distance-to-box decoding for one stride level. Anchor centres sit on the top-left corner of
/// each grid cell; boxes come back in frame pixels.
fn decode_stride(
    scores: &[f32],
    distances: &[f32],
    stride: u32,
    anchors_per_cell: usize,
    threshold: f32,
    det_scale: f32,
) -> Vec<([f32; 4], f32)> {
    let grid = (DETECTOR_INPUT_SIZE / stride) as usize;
    let count = (grid * grid * anchors_per_cell)
        .min(scores.len())
        .min(distances.len() / 4);
    let step = stride as f32;

    (0..count)
        .filter(|&i| scores[i] >= threshold)
        .map(|i| {
            let cell = i / anchors_per_cell;
            let cx = (cell % grid) as f32 * step;
            let cy = (cell / grid) as f32 * step;
            let d = &distances[i * 4..i * 4 + 4];
            let bbox = [
                (cx - d[0] * step) / det_scale,
                (cy - d[1] * step) / det_scale,
                (cx + d[2] * step) / det_scale,
                (cy + d[3] * step) / det_scale,
            ];
            (bbox, scores[i])
        })
        .collect()
}

/// Square crop around the face box, grown by [`BOX_SHIFT`] on every side.
fn mark_crop(bbox: [f32; 4]) -> ((f32, f32), f32) {
    let width = bbox[2] - bbox[0];
    let height = bbox[3] - bbox[1];
    let center = ((bbox[0] + bbox[2]) * 0.5, (bbox[1] + bbox[3]) * 0.5);
    let side = width.max(height) * (1.0 + 2.0 * BOX_SHIFT);
    (center, side)
}

/// 68 (x, y) marks in crop pixels. Exports differ: some emit unit coordinates, others pixels.
fn decode_marks(flat: &[f32]) -> Result<Vec<(f32, f32)>> {
    if flat.len() < NUM_FACE_MARKS * 2 {
        return Err(anyhow!(
            "facial mark output too small: got {}, expected {}",
            flat.len(),
            NUM_FACE_MARKS * 2
        ));
    }
    let marks = &flat[..NUM_FACE_MARKS * 2];
    let unit = marks.iter().all(|v| v.abs() <= 1.5);
    let scale = if unit { MARK_INPUT_SIZE as f32 } else { 1.0 };
    Ok(marks
        .chunks_exact(2)
        .map(|xy| (xy[0] * scale, xy[1] * scale))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_follows_output_count() {
        assert_eq!(ScrfdLayout::for_outputs(9).strides, vec![8, 16, 32]);
        assert_eq!(ScrfdLayout::for_outputs(6).anchors_per_cell, 2);
        let five = ScrfdLayout::for_outputs(15);
        assert_eq!(five.strides.len(), 5);
        assert_eq!(five.anchors_per_cell, 1);
        assert_eq!(ScrfdLayout::for_outputs(4), ScrfdLayout::three_stride());
    }

    #[test]
    fn decodes_distances_around_anchor_centres() {
        // Stride 32 gives a 20x20 grid; two anchors per cell.
        let cells = 20 * 20 * 2;
        let mut scores = vec![0.0; cells];
        let mut distances = vec![0.0; cells * 4];
        // Second anchor of cell (x=3, y=1).
        let idx = (20 + 3) * 2 + 1;
        scores[idx] = 0.9;
        distances[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 0.5, 1.0, 2.0]);

        let found = decode_stride(&scores, &distances, 32, 2, 0.5, 0.5);
        assert_eq!(found.len(), 1);
        let (bbox, score) = found[0];
        assert_eq!(score, 0.9);
        // Centre (96, 32) in detector pixels, then back to the frame at half scale.
        assert_eq!(bbox, [128.0, 32.0, 256.0, 192.0]);
    }

    #[test]
    fn low_scores_and_short_outputs_decode_to_nothing() {
        assert!(decode_stride(&[0.2; 8], &[1.0; 32], 8, 2, 0.5, 1.0).is_empty());
        assert_eq!(decode_stride(&[0.9; 8], &[1.0; 4], 8, 2, 0.5, 1.0).len(), 1);
    }

    #[test]
    fn mark_crop_is_square_and_grown() {
        let ((cx, cy), side) = mark_crop([100.0, 50.0, 200.0, 130.0]);
        assert_eq!((cx, cy), (150.0, 90.0));
        assert!((side - 140.0).abs() < 1e-4);
    }

    #[test]
    fn unit_marks_are_scaled_to_crop_pixels() {
        let mut flat = vec![0.5; NUM_FACE_MARKS * 2];
        flat[0] = 0.25;
        let marks = decode_marks(&flat).unwrap();
        assert_eq!(marks.len(), NUM_FACE_MARKS);
        assert_eq!(marks[0], (32.0, 64.0));

        let pixel = vec![64.0; NUM_FACE_MARKS * 2];
        assert_eq!(decode_marks(&pixel).unwrap()[5], (64.0, 64.0));
        assert!(decode_marks(&[0.0; 10]).is_err());
    }

    #[test]
    fn scrfd_input_pads_bottom_right() {
        let frame = Frame::blank(1280, 640);
        let (input, det_scale) = prepare_scrfd_input(&frame).unwrap();
        assert_eq!(input.shape(), &[1, 3, 640, 640]);
        assert_eq!(det_scale, 0.5);
        let blank = -127.5 / 128.0;
        assert_eq!(input[[0, 0, 639, 0]], blank);
    }
}
