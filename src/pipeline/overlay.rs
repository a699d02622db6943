//! Fixed-size canvas that shows the processed camera frame with its landmarks on top.

use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;

use crate::types::{Detection, Frame, LandmarkCategory, LandmarkPoint};

pub const HAND_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (5, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (9, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (13, 17),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
];

pub const POSE_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 7),
    (0, 4),
    (4, 5),
    (5, 6),
    (6, 8),
    (9, 10),
    (11, 12),
    (11, 13),
    (13, 15),
    (15, 17),
    (15, 19),
    (15, 21),
    (17, 19),
    (12, 14),
    (14, 16),
    (16, 18),
    (16, 20),
    (16, 22),
    (18, 20),
    (11, 23),
    (12, 24),
    (23, 24),
    (23, 25),
    (24, 26),
    (25, 27),
    (26, 28),
    (27, 29),
    (28, 30),
    (29, 31),
    (30, 32),
    (27, 31),
    (28, 32),
];

/// Sizes are in canvas pixels; anything below one pixel still draws a single pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawStyle {
    pub radius: f32,
    pub line_width: f32,
    pub color: [u8; 4],
    pub fill_color: [u8; 4],
}

impl DrawStyle {
    /// Thin translucent white used for every category.
    pub const MINIMAL: DrawStyle = DrawStyle {
        radius: 0.5,
        line_width: 0.5,
        color: [255, 255, 255, 204],
        fill_color: [255, 255, 255, 51],
    };

    fn line_radius(&self) -> i32 {
        ((self.line_width.round() as i32).max(1) - 1) / 2
    }

    fn point_radius(&self) -> i32 {
        self.radius.ceil().max(1.0) as i32
    }
}

impl Default for DrawStyle {
    fn default() -> Self {
        Self::MINIMAL
    }
}

#[derive(Clone, Debug)]
pub struct Canvas {
    rgba: Vec<u8>,
    width: u32,
    height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        let mut rgba = vec![0u8; width as usize * height as usize * 4];
        for px in rgba.chunks_exact_mut(4) {
            px[3] = 255;
        }
        Self {
            rgba,
            width,
            height,
        }
    }

    /// Scales `frame` to fill a `width` x `height` canvas.
    pub fn from_frame(frame: &Frame, width: u32, height: u32) -> Result<Self> {
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

        if frame.width == width && frame.height == height {
            return Ok(Self {
                rgba: frame.rgba.clone(),
                width,
                height,
            });
        }

        let src_image = fir::images::Image::from_vec_u8(
            frame.width,
            frame.height,
            frame.rgba.clone(),
            fir::PixelType::U8x4,
        )?;
        let mut dst_image = fir::images::Image::new(width, height, fir::PixelType::U8x4);
        let mut resizer = fir::Resizer::new();
        let resize_options = fir::ResizeOptions::new()
            .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
        resizer
            .resize(&src_image, &mut dst_image, Some(&resize_options))
            .context("canvas resize failed")?;

        Ok(Self {
            rgba: dst_image.into_vec(),
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    pub fn into_rgba(self) -> Vec<u8> {
        self.rgba
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) as usize) * 4;
        self.rgba
            .get(idx..idx + 4)
            .and_then(|px| px.try_into().ok())
    }

    fn to_canvas(&self, point: &LandmarkPoint) -> (f32, f32) {
        (point.x * self.width as f32, point.y * self.height as f32)
    }

    pub fn draw_connectors(
        &mut self,
        points: &[LandmarkPoint],
        connections: &[(usize, usize)],
        style: &DrawStyle,
    ) {
        let radius = style.line_radius();
        for &(a, b) in connections {
            if let (Some(pa), Some(pb)) = (points.get(a), points.get(b)) {
                let p0 = self.to_canvas(pa);
                let p1 = self.to_canvas(pb);
                self.draw_line(p0, p1, style.color, radius);
            }
        }
    }

    pub fn draw_landmarks(&mut self, points: &[LandmarkPoint], style: &DrawStyle) {
        let radius = style.point_radius();
        let stroke = (style.line_width.round() as i32).max(1);
        let inner = (radius - stroke).max(0);
        for point in points {
            let (x, y) = self.to_canvas(point);
            let (cx, cy) = (x as i32, y as i32);
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    let dist = dx * dx + dy * dy;
                    if dist > radius * radius {
                        continue;
                    }
                    let color = if dist > inner * inner {
                        style.color
                    } else {
                        style.fill_color
                    };
                    self.blend_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    fn draw_line(&mut self, p0: (f32, f32), p1: (f32, f32), color: [u8; 4], radius: i32) {
        let (mut x0, mut y0) = (p0.0 as i32, p0.1 as i32);
        let (x1, y1) = (p1.0 as i32, p1.1 as i32);
        let dx = (x1 - x0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let dy = -(y1 - y0).abs();
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            self.blend_pixel(x0, y0, color);
            for ox in -radius..=radius {
                for oy in -radius..=radius {
                    if (ox != 0 || oy != 0) && ox.abs() + oy.abs() <= radius {
                        self.blend_pixel(x0 + ox, y0 + oy, color);
                    }
                }
            }
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    fn blend_pixel(&mut self, x: i32, y: i32, color: [u8; 4]) {
        if x < 0 || y < 0 {
            return;
        }
        let (ux, uy) = (x as u32, y as u32);
        if ux >= self.width || uy >= self.height {
            return;
        }
        let idx = ((uy * self.width + ux) as usize) * 4;
        let Some(px) = self.rgba.get_mut(idx..idx + 4) else {
            return;
        };
        let alpha = color[3] as u32;
        for channel in 0..3 {
            let blended = (color[channel] as u32 * alpha + px[channel] as u32 * (255 - alpha)) / 255;
            px[channel] = blended as u8;
        }
        px[3] = 255;
    }
}

/// Draws each detection onto a fresh canvas: pose, left hand, right hand, then face points.
#[derive(Clone, Debug)]
pub struct OverlayRenderer {
    width: u32,
    height: u32,
    style: DrawStyle,
}

impl OverlayRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            style: DrawStyle::MINIMAL,
        }
    }

    #[cfg(test)]
    fn with_style(mut self, style: DrawStyle) -> Self {
        self.style = style;
        self
    }

    pub fn render(&self, detection: &Detection) -> Result<Canvas> {
        let mut canvas = Canvas::from_frame(&detection.frame, self.width, self.height)?;
        let style = &self.style;

        if let Some(pose) = detection.get(LandmarkCategory::Pose) {
            canvas.draw_connectors(pose, POSE_CONNECTIONS, style);
            canvas.draw_landmarks(pose, style);
        }
        for hand in [LandmarkCategory::LeftHand, LandmarkCategory::RightHand] {
            if let Some(points) = detection.get(hand) {
                canvas.draw_connectors(points, HAND_CONNECTIONS, style);
                canvas.draw_landmarks(points, style);
            }
        }
        if let Some(face) = detection.get(LandmarkCategory::Face) {
            canvas.draw_landmarks(face, style);
        }

        Ok(canvas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPAQUE: DrawStyle = DrawStyle {
        radius: 0.5,
        line_width: 0.5,
        color: [255, 255, 255, 255],
        fill_color: [255, 255, 255, 255],
    };

    #[test]
    fn topologies_reference_valid_indices() {
        assert!(HAND_CONNECTIONS.iter().all(|&(a, b)| a < 21 && b < 21));
        assert!(POSE_CONNECTIONS.iter().all(|&(a, b)| a < 33 && b < 33));
    }

    #[test]
    fn same_size_frame_is_copied_verbatim() {
        let mut frame = Frame::blank(4, 3);
        frame.rgba[0] = 200;
        let canvas = Canvas::from_frame(&frame, 4, 3).unwrap();
        assert_eq!(canvas.pixel(0, 0), Some([200, 0, 0, 255]));
    }

    #[test]
    fn mismatched_frame_buffer_is_rejected() {
        let mut frame = Frame::blank(4, 4);
        frame.rgba.truncate(10);
        assert!(Canvas::from_frame(&frame, 4, 4).is_err());
    }

    #[test]
    fn landmarks_land_at_normalized_positions() {
        let mut canvas = Canvas::new(10, 10);
        canvas.draw_landmarks(&[LandmarkPoint::new(0.5, 0.5, 0.0)], &OPAQUE);
        assert_eq!(canvas.pixel(5, 5), Some([255, 255, 255, 255]));
        assert_eq!(canvas.pixel(0, 0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn connectors_skip_missing_points() {
        let mut canvas = Canvas::new(10, 10);
        let points = [
            LandmarkPoint::new(0.0, 0.0, 0.0),
            LandmarkPoint::new(0.9, 0.0, 0.0),
        ];
        canvas.draw_connectors(&points, &[(0, 1), (1, 7)], &OPAQUE);
        assert_eq!(canvas.pixel(4, 0), Some([255, 255, 255, 255]));
        assert_eq!(canvas.pixel(4, 5), Some([0, 0, 0, 255]));
    }

    #[test]
    fn translucent_style_blends() {
        let mut canvas = Canvas::new(4, 4);
        canvas.draw_connectors(
            &[
                LandmarkPoint::new(0.0, 0.0, 0.0),
                LandmarkPoint::new(0.75, 0.0, 0.0),
            ],
            &[(0, 1)],
            &DrawStyle::MINIMAL,
        );
        let [r, g, b, a] = canvas.pixel(1, 0).unwrap();
        assert_eq!((r, g, b, a), (204, 204, 204, 255));
    }

    #[test]
    fn out_of_frame_points_are_clipped() {
        let mut canvas = Canvas::new(4, 4);
        canvas.draw_landmarks(&[LandmarkPoint::new(3.0, -2.0, 0.0)], &OPAQUE);
        assert!(canvas.rgba().chunks(4).all(|px| px == [0, 0, 0, 255]));
    }

    #[test]
    fn render_without_landmarks_shows_frame_only() {
        let renderer = OverlayRenderer::new(4, 4);
        let canvas = renderer
            .render(&Detection::empty(Frame::blank(4, 4)))
            .unwrap();
        assert!(canvas.rgba().chunks(4).all(|px| px == [0, 0, 0, 255]));
    }

    #[test]
    fn render_draws_hands() {
        let renderer = OverlayRenderer::new(20, 20).with_style(OPAQUE);
        let hand: Vec<_> = (0..21)
            .map(|i| LandmarkPoint::new(0.1 + i as f32 * 0.04, 0.5, 0.0))
            .collect();
        let detection =
            Detection::empty(Frame::blank(20, 20)).with_set(LandmarkCategory::RightHand, hand);
        let canvas = renderer.render(&detection).unwrap();
        assert_eq!(canvas.pixel(2, 10), Some([255, 255, 255, 255]));
    }
}
