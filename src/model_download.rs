//! First-run provisioning of the ONNX models the detector loads.

use std::{
    fmt, fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, bail};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

/// Smallest file accepted as a model. Anything shorter is an error page or a truncated transfer.
const MIN_MODEL_BYTES: u64 = 100 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelKind {
    PalmDetector,
    HandLandmarks,
    FaceDetector,
    FaceMarks,
}

/// Where a model comes from and how it is checked.
#[derive(Clone, Copy, Debug)]
pub struct ModelEntry {
    pub kind: ModelKind,
    pub file_name: &'static str,
    pub url: &'static str,
    /// Without a required model the detector cannot start. Optional ones only disable a category.
    pub required: bool,
}

pub const MANIFEST: [ModelEntry; 4] = [
    ModelEntry {
        kind: ModelKind::PalmDetector,
        file_name: "palm_detection_mediapipe_2023feb.onnx",
        url: "https://raw.githubusercontent.com/214zzl995/gesture-universe/refs/heads/main/models/palm_detection_mediapipe_2023feb.onnx",
        required: true,
    },
    ModelEntry {
        kind: ModelKind::HandLandmarks,
        file_name: "handpose_estimation_mediapipe_2023feb.onnx",
        url: "https://raw.githubusercontent.com/214zzl995/gesture-universe/refs/heads/main/models/handpose_estimation_mediapipe_2023feb.onnx",
        required: true,
    },
    ModelEntry {
        kind: ModelKind::FaceDetector,
        file_name: "face_detector.onnx",
        url: "https://github.com/yinguobing/head-pose-estimation/releases/download/v1.0/face_detector.onnx",
        required: false,
    },
    ModelEntry {
        kind: ModelKind::FaceMarks,
        file_name: "face_landmarks.onnx",
        url: "https://github.com/yinguobing/head-pose-estimation/releases/download/v1.0/face_landmarks.onnx",
        required: false,
    },
];

impl ModelKind {
    pub fn entry(self) -> &'static ModelEntry {
        match self {
            ModelKind::PalmDetector => &MANIFEST[0],
            ModelKind::HandLandmarks => &MANIFEST[1],
            ModelKind::FaceDetector => &MANIFEST[2],
            ModelKind::FaceMarks => &MANIFEST[3],
        }
    }

    pub fn path_in(self, models_dir: &Path) -> PathBuf {
        models_dir.join(self.entry().file_name)
    }

    pub fn is_face(self) -> bool {
        matches!(self, ModelKind::FaceDetector | ModelKind::FaceMarks)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelKind::PalmDetector => "palm detector",
            ModelKind::HandLandmarks => "hand landmarks",
            ModelKind::FaceDetector => "face detector",
            ModelKind::FaceMarks => "face landmarks",
        })
    }
}

/// The models a detector with these settings needs, in download order.
pub fn required_models(track_face: bool) -> Vec<ModelKind> {
    MANIFEST
        .iter()
        .map(|entry| entry.kind)
        .filter(|kind| track_face || !kind.is_face())
        .collect()
}

/// True when `path` holds something large enough to be a model.
pub fn is_model_present(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() >= MIN_MODEL_BYTES)
        .unwrap_or(false)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelDownloadEvent {
    AlreadyPresent {
        model: ModelKind,
    },
    Started {
        model: ModelKind,
        total: Option<u64>,
    },
    Progress {
        model: ModelKind,
        downloaded: u64,
        total: Option<u64>,
    },
    Finished {
        model: ModelKind,
    },
    /// An optional model could not be fetched; its category stays absent.
    Skipped {
        model: ModelKind,
        reason: String,
    },
}

/// Makes sure every model in `models` exists under `models_dir`, downloading what is missing.
///
/// A failed optional model is reported as [`ModelDownloadEvent::Skipped`] and the rest carry on.
/// A failed required model aborts with its error.
pub fn ensure_models_ready<F>(
    models_dir: &Path,
    models: &[ModelKind],
    mut on_event: F,
) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    fs::create_dir_all(models_dir).with_context(|| {
        format!(
            "failed to create model directory {}",
            models_dir.display()
        )
    })?;

    for &model in models {
        let dest = model.path_in(models_dir);
        if is_model_present(&dest) {
            on_event(ModelDownloadEvent::AlreadyPresent { model });
            continue;
        }

        match download_model(model, &dest, &mut on_event) {
            Ok(()) => on_event(ModelDownloadEvent::Finished { model }),
            Err(err) if !model.entry().required => {
                log::warn!("skipping {model}: {err:#}");
                on_event(ModelDownloadEvent::Skipped {
                    model,
                    reason: format!("{err:#}"),
                });
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

fn download_model<F>(model: ModelKind, dest: &Path, on_event: &mut F) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    let url = model.entry().url;
    log::info!("downloading {model} from {url} to {}", dest.display());

    let client = Client::builder()
        .connect_timeout(Duration::from_secs(15))
        .build()
        .context("failed to build http client")?;
    let mut response = client
        .get(url)
        .send()
        .with_context(|| format!("failed to start {model} download"))?
        .error_for_status()
        .with_context(|| format!("{model} download returned error status"))?;

    let total = response.content_length();
    on_event(ModelDownloadEvent::Started { model, total });
    let progress = create_progress_bar(model, total);

    let tmp_path = dest.with_extension("download");
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 16 * 1024];
    loop {
        let bytes_read = response
            .read(&mut buffer)
            .with_context(|| format!("failed while reading {model} bytes"))?;
        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .with_context(|| format!("failed while writing {model} to disk"))?;
        downloaded += bytes_read as u64;
        progress.set_position(downloaded);
        on_event(ModelDownloadEvent::Progress {
            model,
            downloaded,
            total,
        });
    }
    file.sync_all()
        .with_context(|| format!("failed to flush {model} to disk"))?;
    drop(file);

    if let Err(err) = verify_size(downloaded, total) {
        progress.abandon_with_message(format!("{model} rejected"));
        // The partial file is useless; a leftover one would only be retried anyway.
        let _ = fs::remove_file(&tmp_path);
        return Err(err.context(format!("{model} download is incomplete")));
    }

    fs::rename(&tmp_path, dest).with_context(|| {
        format!(
            "failed to move temp model {} into place at {}",
            tmp_path.display(),
            dest.display()
        )
    })?;
    progress.finish_with_message(format!("{model} ready"));
    Ok(())
}

/// Accepts a transfer only if it matches the announced length and is plausibly a model.
fn verify_size(downloaded: u64, expected: Option<u64>) -> anyhow::Result<()> {
    match expected {
        Some(expected) if expected != downloaded => {
            bail!("received {downloaded} of {expected} bytes")
        }
        _ => {}
    }
    if downloaded < MIN_MODEL_BYTES {
        bail!("received only {downloaded} bytes, too small for a model");
    }
    Ok(())
}

fn create_progress_bar(model: ModelKind, total_size: Option<u64>) -> ProgressBar {
    match total_size {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} {msg} [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            ) {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb.set_message(model.to_string());
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.green} downloading {msg}") {
                pb.set_style(style);
            }
            pb.set_message(model.to_string());
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_model(dir: &Path, model: ModelKind, len: u64) {
        fs::write(model.path_in(dir), vec![0u8; len as usize]).unwrap();
    }

    #[test]
    fn manifest_lists_each_model_once() {
        for (idx, entry) in MANIFEST.iter().enumerate() {
            assert_eq!(entry.kind.entry().file_name, entry.file_name);
            assert!(entry.url.ends_with(entry.file_name), "{}", entry.url);
            assert!(MANIFEST[idx + 1..].iter().all(|o| o.kind != entry.kind));
        }
        assert!(ModelKind::PalmDetector.entry().required);
        assert!(!ModelKind::FaceMarks.entry().required);
    }

    #[test]
    fn face_models_follow_the_face_switch() {
        assert_eq!(required_models(true).len(), 4);
        assert_eq!(
            required_models(false),
            vec![ModelKind::PalmDetector, ModelKind::HandLandmarks]
        );
    }

    #[test]
    fn present_models_are_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let models = required_models(false);
        for &model in &models {
            write_model(dir.path(), model, MIN_MODEL_BYTES);
        }

        let mut events = Vec::new();
        ensure_models_ready(dir.path(), &models, |event| events.push(event)).unwrap();
        assert_eq!(
            events,
            vec![
                ModelDownloadEvent::AlreadyPresent {
                    model: ModelKind::PalmDetector
                },
                ModelDownloadEvent::AlreadyPresent {
                    model: ModelKind::HandLandmarks
                },
            ]
        );
    }

    #[test]
    fn truncated_file_counts_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path(), ModelKind::HandLandmarks, 512);
        assert!(!is_model_present(&ModelKind::HandLandmarks.path_in(dir.path())));
        assert!(!is_model_present(&dir.path().join("absent.onnx")));
        assert!(!is_model_present(dir.path()));

        write_model(dir.path(), ModelKind::HandLandmarks, MIN_MODEL_BYTES);
        assert!(is_model_present(&ModelKind::HandLandmarks.path_in(dir.path())));
    }

    #[test]
    fn size_check_rejects_short_and_tiny_transfers() {
        assert!(verify_size(MIN_MODEL_BYTES, Some(MIN_MODEL_BYTES)).is_ok());
        assert!(verify_size(MIN_MODEL_BYTES * 4, None).is_ok());
        assert!(verify_size(MIN_MODEL_BYTES, Some(MIN_MODEL_BYTES + 1)).is_err());
        assert!(verify_size(300, Some(300)).is_err());
    }
}
