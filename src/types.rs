use std::time::Instant;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn blank(width: u32, height: u32) -> Self {
        let mut rgba = vec![0u8; width as usize * height as usize * 4];
        for px in rgba.chunks_exact_mut(4) {
            px[3] = 255;
        }
        Self {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }
}

/// A single keypoint in normalized image space.
///
/// `x` and `y` are in `[0, 1]` relative to the source frame, `z` is relative depth on roughly
/// the same scale as `x`. `visibility` is only reported by models that estimate it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: Option<f32>,
}

impl LandmarkPoint {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: None,
        }
    }

    pub const fn with_visibility(mut self, visibility: f32) -> Self {
        self.visibility = Some(visibility);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LandmarkCategory {
    Pose,
    Face,
    LeftHand,
    RightHand,
}

impl LandmarkCategory {
    /// Canonical order used for drawing-independent iteration and CSV rows.
    pub const ALL: [LandmarkCategory; 4] = [
        LandmarkCategory::Pose,
        LandmarkCategory::Face,
        LandmarkCategory::LeftHand,
        LandmarkCategory::RightHand,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            LandmarkCategory::Pose => "pose",
            LandmarkCategory::Face => "face",
            LandmarkCategory::LeftHand => "leftHand",
            LandmarkCategory::RightHand => "rightHand",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LandmarkSet {
    pub category: LandmarkCategory,
    pub points: Vec<LandmarkPoint>,
}

impl LandmarkSet {
    pub fn new(category: LandmarkCategory, points: Vec<LandmarkPoint>) -> Self {
        Self { category, points }
    }
}

/// Output of one detector call: the processed image plus whichever categories were found.
#[derive(Clone, Debug)]
pub struct Detection {
    pub frame: Frame,
    pub sets: Vec<LandmarkSet>,
}

impl Detection {
    pub fn empty(frame: Frame) -> Self {
        Self {
            frame,
            sets: Vec::new(),
        }
    }

    pub fn with_set(mut self, category: LandmarkCategory, points: Vec<LandmarkPoint>) -> Self {
        self.sets.retain(|set| set.category != category);
        self.sets.push(LandmarkSet::new(category, points));
        self
    }

    /// Points for `category`, or `None` when the detector reported nothing for it.
    pub fn get(&self, category: LandmarkCategory) -> Option<&[LandmarkPoint]> {
        self.sets
            .iter()
            .find(|set| set.category == category)
            .map(|set| set.points.as_slice())
    }

    pub fn has_landmarks(&self) -> bool {
        self.sets.iter().any(|set| !set.points.is_empty())
    }
}
