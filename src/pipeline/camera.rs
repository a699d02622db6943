use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Result, anyhow};
use crossbeam_channel::Sender;
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    },
};

use super::{GatedFrame, gate::FrameGate};
use crate::{
    config::CameraConfig,
    session::{SessionStatus, StatusCell},
    types::Frame,
};

#[derive(Clone, Debug)]
pub struct CameraSettings {
    pub index: CameraIndex,
    pub width: u32,
    pub height: u32,
    pub max_fps: u32,
}

impl CameraSettings {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            index: CameraIndex::Index(config.index),
            width: config.width,
            height: config.height,
            max_fps: config.max_fps,
        }
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.max_fps.max(1) as f64)
    }

    fn requested_formats(&self) -> [RequestedFormat<'static>; 3] {
        let preferred =
            CameraFormat::new_from(self.width, self.height, FrameFormat::MJPEG, self.max_fps);
        [
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(preferred)),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
        ]
    }
}

#[derive(Debug)]
pub struct CameraStream {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

/// Dropping the stream stops capture and joins the thread.
impl Drop for CameraStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// `index: name` for every camera the platform reports.
pub fn available_cameras() -> Result<Vec<String>> {
    let cameras = query(ApiBackend::Auto)?;
    Ok(cameras
        .into_iter()
        .map(|info| format!("{}: {}", info.index(), info.human_name()))
        .collect())
}

/// Appended to an open failure so a wrong `--camera` index is easy to correct.
fn device_hint(devices: Result<Vec<String>>) -> String {
    match devices {
        Ok(devices) if devices.is_empty() => "no cameras detected".to_string(),
        Ok(devices) => format!("available cameras: {}", devices.join(", ")),
        Err(err) => format!("camera list unavailable: {err}"),
    }
}

fn build_camera(settings: &CameraSettings) -> Result<Camera> {
    let mut last_err = None;

    for requested in settings.requested_formats() {
        match Camera::new(settings.index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => {
                    log::info!(
                        "camera {} streaming at {}",
                        settings.index,
                        camera.camera_format()
                    );
                    return Ok(camera);
                }
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
}

fn rgb_to_rgba(rgb: &[u8]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
    for px in rgb.chunks_exact(3) {
        rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
    }
    rgba
}

/// Opens the camera and starts pushing frames to `frame_tx`.
///
/// A frame is forwarded only when `gate` has a free slot and the session is not paused, and at
/// most `max_fps` times per second. Everything else is read from the device and dropped.
pub fn start_camera_stream(
    settings: CameraSettings,
    gate: FrameGate,
    status: StatusCell,
    frame_tx: Sender<GatedFrame>,
) -> Result<CameraStream> {
    // Fail fast before spawning the capture thread.
    match build_camera(&settings) {
        Ok(camera) => drop(camera),
        Err(err) => {
            let hint = device_hint(available_cameras());
            log::warn!("camera {} failed to open; {hint}", settings.index);
            return Err(err.context(format!("failed to open camera {} ({hint})", settings.index)));
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = thread::spawn(move || {
        let mut camera = match build_camera(&settings) {
            Ok(cam) => cam,
            Err(err) => {
                log::error!("failed to open camera: {err:?}");
                return;
            }
        };
        let interval = settings.frame_interval();
        let mut last_sent: Option<Instant> = None;

        while !stop_flag.load(Ordering::Relaxed) {
            let buffer = match camera.frame() {
                Ok(buffer) => buffer,
                Err(err) => {
                    log::warn!("camera frame read failed: {err:?}");
                    continue;
                }
            };

            if status.load() == SessionStatus::Paused {
                continue;
            }
            if last_sent.is_some_and(|at| at.elapsed() < interval) {
                continue;
            }
            let Some(permit) = gate.try_acquire() else {
                continue;
            };

            let decoded = match buffer.decode_image::<RgbFormat>() {
                Ok(image) => image,
                Err(err) => {
                    log::warn!("failed to decode camera frame {err:?}");
                    continue;
                }
            };

            let frame = Frame {
                width: decoded.width(),
                height: decoded.height(),
                rgba: rgb_to_rgba(decoded.as_raw()),
                timestamp: Instant::now(),
            };
            last_sent = Some(frame.timestamp);

            if frame_tx.try_send(GatedFrame { frame, permit }).is_err() {
                log::trace!("detector queue full, frame skipped");
            }
        }

        if let Err(err) = camera.stop_stream() {
            log::warn!("failed to stop camera stream: {err:?}");
        }
    });

    Ok(CameraStream {
        stop,
        handle: Some(handle),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_rgb_with_opaque_alpha() {
        assert_eq!(
            rgb_to_rgba(&[1, 2, 3, 4, 5, 6]),
            vec![1, 2, 3, 255, 4, 5, 6, 255]
        );
    }

    #[test]
    fn hint_lists_devices_or_explains_why_not() {
        assert_eq!(
            device_hint(Ok(vec!["0: FaceTime HD".into(), "1: USB Cam".into()])),
            "available cameras: 0: FaceTime HD, 1: USB Cam"
        );
        assert_eq!(device_hint(Ok(Vec::new())), "no cameras detected");
        assert!(device_hint(Err(anyhow!("no backend"))).contains("no backend"));
    }

    #[test]
    fn interval_follows_fps_cap() {
        let mut settings = CameraSettings::from_config(&CameraConfig::default());
        assert_eq!(settings.frame_interval(), Duration::from_secs_f64(1.0 / 30.0));
        settings.max_fps = 0;
        assert_eq!(settings.frame_interval(), Duration::from_secs(1));
    }
}
