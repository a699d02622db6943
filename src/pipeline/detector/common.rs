use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{Frame, LandmarkPoint};

pub const HAND_INPUT_SIZE: u32 = 224;
pub const PALM_INPUT_SIZE: u32 = 192;
pub const NUM_HAND_LANDMARKS: usize = 21;

#[derive(Clone, Debug, PartialEq)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

pub fn check_frame(frame: &Frame) -> Result<()> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len || expected_len == 0 {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }
    Ok(())
}

/// Resizes `frame` to fit `target_w` x `target_h` and returns the RGBA pixels with their size.
pub fn resize_rgba(frame: &Frame, target_w: u32, target_h: u32) -> Result<(Vec<u8>, u32, u32)> {
    check_frame(frame)?;
    let scale = (target_w as f32 / frame.width as f32).min(target_h as f32 / frame.height as f32);
    let new_w = ((frame.width as f32 * scale).round().max(1.0) as u32).min(target_w);
    let new_h = ((frame.height as f32 * scale).round().max(1.0) as u32).min(target_h);

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    Ok((dst_image.into_vec(), new_w, new_h))
}

/// Fits `frame` centred into a black `target_size` square and returns the NHWC float tensor.
pub fn prepare_frame(frame: &Frame, target_size: u32) -> Result<(Array4<f32>, LetterboxInfo)> {
    let (resized, new_w, new_h) = resize_rgba(frame, target_size, target_size)?;
    let scale = new_w as f32 / frame.width as f32;

    let pad_x = ((target_size - new_w) / 2) as usize;
    let pad_y = ((target_size - new_h) / 2) as usize;
    let mut canvas = vec![0u8; (target_size as usize) * (target_size as usize) * 4];
    let dst_stride = target_size as usize * 4;
    let src_stride = new_w as usize * 4;
    for row in 0..(new_h as usize) {
        let dst_offset = (pad_y + row) * dst_stride + pad_x * 4;
        let src_offset = row * src_stride;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&resized[src_offset..src_offset + src_stride]);
    }

    let normalized: Vec<f32> = canvas
        .par_chunks_exact(4)
        .flat_map_iter(|px| {
            [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ]
        })
        .collect();
    let input = Array4::<f32>::from_shape_vec(
        (1, target_size as usize, target_size as usize, 3),
        normalized,
    )
    .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    Ok((
        input,
        LetterboxInfo {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            orig_w: frame.width,
            orig_h: frame.height,
        },
    ))
}

pub fn decode_landmarks(flat: &[f32], count: usize) -> Result<Vec<[f32; 3]>> {
    if flat.len() < count * 3 {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            count * 3
        ));
    }

    Ok(flat
        .chunks_exact(3)
        .take(count)
        .map(|c| [c[0], c[1], c[2]])
        .collect())
}

/// A square, rotated region of the frame resampled to `output_size` pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct CropTransform {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
    pub output_size: u32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl CropTransform {
    /// Crop pixel coordinates to frame pixel coordinates.
    pub fn project(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let scale = self.side / self.output_size as f32;
        let dx = (x - half) * scale;
        let dy = (y - half) * scale;
        let (sin, cos) = self.angle.sin_cos();
        (
            self.center.0 + dx * cos - dy * sin,
            self.center.1 + dx * sin + dy * cos,
        )
    }

    /// Maps a crop-space landmark to normalized frame coordinates. Depth is scaled like `x`.
    pub fn to_landmark(&self, [x, y, z]: [f32; 3]) -> LandmarkPoint {
        let (px, py) = self.project(x, y);
        let width = self.orig_w.max(1) as f32;
        let height = self.orig_h.max(1) as f32;
        let scale = self.side / self.output_size as f32;
        LandmarkPoint::new(
            (px / width).clamp(0.0, 1.0),
            (py / height).clamp(0.0, 1.0),
            z * scale / width,
        )
    }
}

/// Samples a rotated square around `center` into an NHWC tensor with values in `[0, 1]`.
pub fn prepare_rotated_crop(
    frame: &Frame,
    center: (f32, f32),
    side: f32,
    angle: f32,
    output_size: u32,
) -> Result<(Array4<f32>, CropTransform)> {
    check_frame(frame)?;
    let transform = CropTransform {
        center,
        side,
        angle,
        output_size,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    let size = output_size as usize;
    let data: Vec<f32> = (0..size * size)
        .into_par_iter()
        .flat_map_iter(|idx| {
            let (x, y) = ((idx % size) as f32 + 0.5, (idx / size) as f32 + 0.5);
            let (src_x, src_y) = transform.project(x, y);
            sample_rgb(frame, src_x, src_y)
        })
        .collect();

    let array = Array4::<f32>::from_shape_vec((1, size, size, 3), data)
        .map_err(|err| anyhow!("failed to build rotated crop tensor: {err}"))?;
    Ok((array, transform))
}

/// Bilinear sample; pixels outside the frame read as black.
fn sample_rgb(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if !x.is_finite() || !y.is_finite() {
        return [0.0; 3];
    }
    let x = x - 0.5;
    let y = y - 0.5;
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);

    let (w, h) = (frame.width as i64, frame.height as i64);
    let fetch = |cx: f32, cy: f32| -> [f32; 3] {
        let (ix, iy) = (cx as i64, cy as i64);
        if ix < 0 || iy < 0 || ix >= w || iy >= h {
            return [0.0; 3];
        }
        let idx = ((iy * w + ix) as usize) * 4;
        [
            frame.rgba[idx] as f32 / 255.0,
            frame.rgba[idx + 1] as f32 / 255.0,
            frame.rgba[idx + 2] as f32 / 255.0,
        ]
    };

    let c00 = fetch(x0, y0);
    let c10 = fetch(x0 + 1.0, y0);
    let c01 = fetch(x0, y0 + 1.0);
    let c11 = fetch(x0 + 1.0, y0 + 1.0);
    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    [0, 1, 2].map(|c| lerp(lerp(c00[c], c10[c], fx), lerp(c01[c], c11[c], fx), fy))
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Intersection over union of two `[x1, y1, x2, y2]` boxes.
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }
    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Greedy non-maximum suppression. Returns indices into `boxes`, best score first.
pub fn nms(boxes: &[[f32; 4]], scores: &[f32], threshold: f32, top_k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..boxes.len().min(scores.len())).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut keep: Vec<usize> = Vec::new();
    for idx in order {
        if keep.len() >= top_k {
            break;
        }
        if keep.iter().all(|&k| iou(&boxes[idx], &boxes[k]) < threshold) {
            keep.push(idx);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn frame(width: u32, height: u32) -> Frame {
        Frame {
            rgba: vec![255u8; width as usize * height as usize * 4],
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn letterbox_pads_short_side() {
        let (input, letterbox) = prepare_frame(&frame(8, 4), 8).unwrap();
        assert_eq!(input.shape(), &[1, 8, 8, 3]);
        assert_eq!(letterbox.scale, 1.0);
        assert_eq!((letterbox.pad_x, letterbox.pad_y), (0.0, 2.0));
        assert_eq!(input[[0, 0, 0, 0]], 0.0);
        assert_eq!(input[[0, 3, 3, 0]], 1.0);
    }

    #[test]
    fn rejects_short_buffers() {
        let mut bad = frame(4, 4);
        bad.rgba.pop();
        assert!(prepare_frame(&bad, 8).is_err());
        assert!(prepare_rotated_crop(&bad, (2.0, 2.0), 4.0, 0.0, 4).is_err());
        assert!(decode_landmarks(&[0.0; 10], NUM_HAND_LANDMARKS).is_err());
    }

    #[test]
    fn decodes_requested_number_of_triples() {
        let flat: Vec<f32> = (0..70).map(|v| v as f32).collect();
        let landmarks = decode_landmarks(&flat, NUM_HAND_LANDMARKS).unwrap();
        assert_eq!(landmarks.len(), NUM_HAND_LANDMARKS);
        assert_eq!(landmarks[20], [60.0, 61.0, 62.0]);
    }

    #[test]
    fn unrotated_crop_maps_back_to_frame() {
        let transform = CropTransform {
            center: (50.0, 30.0),
            side: 20.0,
            angle: 0.0,
            output_size: 10,
            orig_w: 100,
            orig_h: 60,
        };
        assert_eq!(transform.project(5.0, 5.0), (50.0, 30.0));
        assert_eq!(transform.project(0.0, 0.0), (40.0, 20.0));

        let point = transform.to_landmark([5.0, 5.0, 1.0]);
        assert_eq!((point.x, point.y), (0.5, 0.5));
        assert!((point.z - 0.02).abs() < 1e-6);
    }

    #[test]
    fn quarter_turn_rotates_crop_axes() {
        let transform = CropTransform {
            center: (10.0, 10.0),
            side: 4.0,
            angle: std::f32::consts::FRAC_PI_2,
            output_size: 4,
            orig_w: 20,
            orig_h: 20,
        };
        let (x, y) = transform.project(4.0, 2.0);
        assert!((x - 10.0).abs() < 1e-4);
        assert!((y - 12.0).abs() < 1e-4);
    }

    #[test]
    fn crop_samples_frame_and_blacks_out_the_outside() {
        let (input, _) = prepare_rotated_crop(&frame(4, 4), (0.0, 0.0), 8.0, 0.0, 8).unwrap();
        assert_eq!(input.shape(), &[1, 8, 8, 3]);
        assert_eq!(input[[0, 0, 0, 0]], 0.0);
        assert!((input[[0, 6, 6, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn nms_drops_overlapping_boxes() {
        let boxes = [
            [0.0, 0.0, 10.0, 10.0],
            [1.0, 1.0, 11.0, 11.0],
            [50.0, 50.0, 60.0, 60.0],
        ];
        let keep = nms(&boxes, &[0.6, 0.9, 0.7], 0.3, 8);
        assert_eq!(keep, vec![1, 2]);
        assert_eq!(nms(&boxes, &[0.6, 0.9, 0.7], 0.3, 1), vec![1]);
        assert_eq!(iou(&boxes[0], &boxes[2]), 0.0);
    }
}
