#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod detector;
pub mod gate;
pub mod overlay;

use crate::{collector::FrameRecord, types::Frame};

use self::{gate::FramePermit, overlay::Canvas};

// Re-exports for convenience
#[cfg(feature = "camera-nokhwa")]
pub use camera::{CameraSettings, CameraStream, available_cameras, start_camera_stream};
pub use detector::{
    CompositeDetector, LandmarkDetector, LandmarkSource, OrtFaceDetector, OrtHandDetector,
    start_detector,
};
pub use gate::FrameGate;
pub use overlay::{DrawStyle, OverlayRenderer};

/// A camera frame that owns the single in-flight slot.
pub struct GatedFrame {
    pub frame: Frame,
    pub permit: FramePermit,
}

/// Detector output on its way to the UI. The slot frees once this is dropped.
pub struct TrackedFrame {
    pub canvas: Canvas,
    /// Present only when the session was running as detection finished.
    pub record: Option<FrameRecord>,
    pub permit: FramePermit,
}
