//! Per-frame records built from detector output.
//!
//! A [`FrameRecord`] always carries something to export: either at least one non-empty
//! landmark category, or the single fallback sentinel point.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{Detection, LandmarkCategory, LandmarkPoint, LandmarkSet};

/// Substituted when a frame produced no landmarks at all.
pub const FALLBACK_POINT: LandmarkPoint = LandmarkPoint::new(0.5, 0.5, 0.0).with_visibility(1.0);
pub const FALLBACK_TAG: &str = "fallbackData";

#[derive(Clone, Debug, PartialEq)]
pub struct FrameRecord {
    timestamp: u64,
    generation: u32,
    sets: Vec<LandmarkSet>,
    fallback: Option<LandmarkPoint>,
}

/// One exported CSV row before the owner and gesture columns are attached.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LandmarkRow<'a> {
    pub tag: &'static str,
    pub index: usize,
    pub point: &'a LandmarkPoint,
}

impl FrameRecord {
    /// Copies every category out of `detection` so the record never aliases detector buffers.
    pub fn from_detection(timestamp: u64, detection: &Detection) -> Self {
        let sets: Vec<LandmarkSet> = LandmarkCategory::ALL
            .iter()
            .map(|&category| {
                let points = detection
                    .get(category)
                    .map(|points| points.to_vec())
                    .unwrap_or_default();
                LandmarkSet::new(category, points)
            })
            .collect();

        let fallback = if sets.iter().all(|set| set.points.is_empty()) {
            Some(FALLBACK_POINT)
        } else {
            None
        };

        Self {
            timestamp,
            generation: 0,
            sets,
            fallback,
        }
    }

    /// Tags the record with the recording it was built for. Untagged records carry
    /// generation 0, which no recording ever uses.
    pub fn for_generation(mut self, generation: u32) -> Self {
        self.generation = generation;
        self
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn set(&self, category: LandmarkCategory) -> &[LandmarkPoint] {
        self.sets
            .iter()
            .find(|set| set.category == category)
            .map(|set| set.points.as_slice())
            .unwrap_or(&[])
    }

    pub fn fallback(&self) -> Option<&LandmarkPoint> {
        self.fallback.as_ref()
    }

    /// Rows in export order: pose, face, left hand, right hand, then the fallback sentinel.
    pub fn rows(&self) -> impl Iterator<Item = LandmarkRow<'_>> {
        let landmarks = self.sets.iter().flat_map(|set| {
            set.points
                .iter()
                .enumerate()
                .map(move |(index, point)| LandmarkRow {
                    tag: set.category.tag(),
                    index,
                    point,
                })
        });
        let fallback = self.fallback.iter().map(|point| LandmarkRow {
            tag: FALLBACK_TAG,
            index: 0,
            point,
        });
        landmarks.chain(fallback)
    }

    pub fn row_count(&self) -> usize {
        self.rows().count()
    }
}

/// Wall-clock milliseconds since the Unix epoch, used as the record timestamp.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
