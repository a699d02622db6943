mod common;
mod face;
mod hand;
mod palm;

use std::thread;

use anyhow::{anyhow, bail};
use crossbeam_channel::{Receiver, Sender};

use super::{GatedFrame, TrackedFrame, overlay::OverlayRenderer};
use crate::{
    collector::{FrameRecord, unix_millis},
    config::DetectorConfig,
    model_download::{ModelKind, is_model_present},
    session::StatusCell,
    types::{Detection, Frame, LandmarkSet},
};

pub use self::{face::OrtFaceDetector, hand::OrtHandDetector};

/// Turns one camera frame into whatever landmark sets the model can find.
///
/// Categories the model does not produce are simply left out of the returned [`Detection`].
pub trait LandmarkDetector: Send + 'static {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Detection>;
}

/// One model family feeding a [`CompositeDetector`], e.g. hands or face.
pub trait LandmarkSource: Send {
    fn name(&self) -> &'static str;

    fn locate(&mut self, frame: &Frame) -> anyhow::Result<Vec<LandmarkSet>>;
}

/// Runs every source on each frame and merges their sets into one [`Detection`].
///
/// A source that fails on a frame is logged and skipped; the frame only fails when every
/// source does.
#[derive(Default)]
pub struct CompositeDetector {
    sources: Vec<Box<dyn LandmarkSource>>,
}

impl CompositeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl LandmarkSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Hands are mandatory. The face joins only when enabled and its models are on disk.
    pub fn from_config(config: &DetectorConfig) -> anyhow::Result<Self> {
        let dir = &config.models_dir;
        for model in [ModelKind::PalmDetector, ModelKind::HandLandmarks] {
            let path = model.path_in(dir);
            if !is_model_present(&path) {
                bail!("{model} model missing at {}", path.display());
            }
        }
        let hands = OrtHandDetector::new(
            &ModelKind::PalmDetector.path_in(dir),
            &ModelKind::HandLandmarks.path_in(dir),
            config.min_confidence,
            config.max_hands,
        )?;
        let mut detector = Self::new().with_source(hands);

        if config.track_face {
            if let Some(face) = load_face(config) {
                detector = detector.with_source(face);
            }
        } else {
            log::info!("face tracking disabled");
        }
        log::info!("landmark sources: {}", detector.source_names().join(", "));
        Ok(detector)
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|source| source.name()).collect()
    }
}

/// The face source, or `None` with a warning when its models are missing or fail to load.
fn load_face(config: &DetectorConfig) -> Option<OrtFaceDetector> {
    let dir = &config.models_dir;
    let (detector_model, mark_model) = (
        ModelKind::FaceDetector.path_in(dir),
        ModelKind::FaceMarks.path_in(dir),
    );
    if !is_model_present(&detector_model) || !is_model_present(&mark_model) {
        log::warn!("face models missing from {}, face stays absent", dir.display());
        return None;
    }
    OrtFaceDetector::new(&detector_model, &mark_model, config.face_min_confidence)
        .map_err(|err| log::warn!("face tracking unavailable: {err:#}"))
        .ok()
}

impl LandmarkDetector for CompositeDetector {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Detection> {
        let mut detection = Detection::empty(frame.clone());
        let mut failures = 0;
        for source in &mut self.sources {
            match source.locate(frame) {
                Ok(sets) => {
                    for set in sets {
                        detection = detection.with_set(set.category, set.points);
                    }
                }
                Err(err) => {
                    failures += 1;
                    log::warn!("{} detection failed: {err:#}", source.name());
                }
            }
        }

        if failures > 0 && failures == self.sources.len() {
            return Err(anyhow!("every landmark source failed on this frame"));
        }
        Ok(detection)
    }
}

/// Spawns the detection worker. `make_detector` runs on the worker thread so model loading
/// never blocks the caller.
pub fn start_detector<D, F>(
    make_detector: F,
    renderer: OverlayRenderer,
    status: StatusCell,
    frame_rx: Receiver<GatedFrame>,
    result_tx: Sender<TrackedFrame>,
) -> thread::JoinHandle<()>
where
    D: LandmarkDetector,
    F: FnOnce() -> anyhow::Result<D> + Send + 'static,
{
    thread::spawn(move || {
        let detector = match make_detector() {
            Ok(detector) => detector,
            Err(err) => {
                log::error!("failed to load landmark detector: {err:?}");
                return;
            }
        };
        run_worker_loop(detector, renderer, status, frame_rx, result_tx);
    })
}

pub(crate) fn run_worker_loop<D: LandmarkDetector>(
    mut detector: D,
    renderer: OverlayRenderer,
    status: StatusCell,
    frame_rx: Receiver<GatedFrame>,
    result_tx: Sender<TrackedFrame>,
) {
    while let Ok(GatedFrame { frame, permit }) = frame_rx.recv() {
        let detection = match detector.detect(&frame) {
            Ok(detection) => detection,
            Err(err) => {
                log::warn!("landmark detection failed: {err:?}");
                continue;
            }
        };

        let canvas = match renderer.render(&detection) {
            Ok(canvas) => canvas,
            Err(err) => {
                log::warn!("overlay render failed: {err:?}");
                continue;
            }
        };

        if !detection.has_landmarks() {
            log::trace!("no landmarks in frame");
        }

        // Results that finish after a pause or stop are still drawn but never recorded. The tag
        // lets the session reject a record that outlives its recording.
        let record = status.recording().map(|generation| {
            FrameRecord::from_detection(unix_millis(), &detection).for_generation(generation)
        });

        let tracked = TrackedFrame {
            canvas,
            record,
            permit,
        };
        if result_tx.try_send(tracked).is_err() {
            log::trace!("ui busy, dropping tracked frame");
        }
    }
    log::debug!("detector worker exiting");
}
