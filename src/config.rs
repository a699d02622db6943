//! Application configuration, loaded from YAML with defaults for every field.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    access::AccessGate,
    error::{Error, Result},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub access: AccessConfig,
    pub session: SessionConfig,
    pub camera: CameraConfig,
    pub overlay: OverlayConfig,
    pub detector: DetectorConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Names allowed past the gate; compared trimmed and lower-cased.
    pub allowed_users: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Ordered prompts; each one is recorded into its own CSV file.
    pub gestures: Vec<String>,

    /// Length of each recording window.
    pub countdown_secs: u32,

    /// Grace period after the countdown hits zero before the buffer is exported.
    pub settle_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub index: u32,
    pub width: u32,
    pub height: u32,

    /// Upper bound on frames handed to the detector per second.
    pub max_fps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub canvas_width: u32,
    pub canvas_height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Directory holding every ONNX model; missing ones are downloaded on first run.
    pub models_dir: PathBuf,

    /// Hands scoring below this are reported as absent.
    pub min_confidence: f32,
    pub max_hands: usize,

    /// Runs the face models as well. Without their files the face stays absent.
    pub track_face: bool,
    pub face_min_confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            allowed_users: vec!["abhinav kartik".to_string()],
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gestures: [
                "smile",
                "raise both eyebrows",
                "open mouth wide",
                "blink slowly",
                "nod head",
                "shake head",
                "wave right hand",
                "wave left hand",
                "thumbs up",
                "point at the camera",
                "clap hands",
                "cover face with both hands",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            countdown_secs: 180,
            settle_delay_ms: 500,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 800,
            height: 600,
            max_fps: 30,
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            canvas_width: 800,
            canvas_height: 600,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            min_confidence: 0.5,
            max_hands: 2,
            track_face: true,
            face_min_confidence: 0.5,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("recordings"),
        }
    }
}

impl Config {
    /// Load and validate configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Save configuration to a YAML file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if AccessGate::new(&self.access.allowed_users).is_empty() {
            return Err(Error::Config("access.allowed_users is empty".into()));
        }
        if self.session.gestures.is_empty() {
            return Err(Error::Config("session.gestures is empty".into()));
        }
        if let Some(pos) = self
            .session
            .gestures
            .iter()
            .position(|g| g.trim().is_empty())
        {
            return Err(Error::Config(format!("session.gestures[{pos}] is blank")));
        }
        if self.session.countdown_secs == 0 {
            return Err(Error::Config(
                "session.countdown_secs must be positive".into(),
            ));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(Error::Config("camera resolution must be non-zero".into()));
        }
        if self.camera.max_fps == 0 {
            return Err(Error::Config("camera.max_fps must be positive".into()));
        }
        if self.overlay.canvas_width == 0 || self.overlay.canvas_height == 0 {
            return Err(Error::Config("overlay canvas size must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&self.detector.min_confidence) {
            return Err(Error::Config(format!(
                "detector.min_confidence {} is outside [0, 1]",
                self.detector.min_confidence
            )));
        }
        if !(0.0..=1.0).contains(&self.detector.face_min_confidence) {
            return Err(Error::Config(format!(
                "detector.face_min_confidence {} is outside [0, 1]",
                self.detector.face_min_confidence
            )));
        }
        if !(1..=2).contains(&self.detector.max_hands) {
            return Err(Error::Config(format!(
                "detector.max_hands must be 1 or 2, got {}",
                self.detector.max_hands
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.session.countdown_secs, 180);
        assert_eq!(config.session.gestures[0], "smile");
        assert_eq!((config.camera.width, config.camera.height), (800, 600));
        assert_eq!(config.detector.max_hands, 2);
        assert!(config.detector.track_face);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = Config::from_yaml(
            "session:\n  gestures: [wink, shrug]\nexport:\n  output_dir: /tmp/out\n",
        )
        .unwrap();
        assert_eq!(config.session.gestures, vec!["wink", "shrug"]);
        assert_eq!(config.session.countdown_secs, 180);
        assert_eq!(config.export.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.access.allowed_users, vec!["abhinav kartik"]);
    }

    #[test]
    fn rejects_invalid_values() {
        for yaml in [
            "session:\n  gestures: []\n",
            "session:\n  countdown_secs: 0\n",
            "access:\n  allowed_users: ['  ']\n",
            "detector:\n  min_confidence: 1.5\n",
            "detector:\n  max_hands: 3\n",
            "detector:\n  face_min_confidence: -0.1\n",
            "camera:\n  width: 0\n",
        ] {
            assert!(
                matches!(Config::from_yaml(yaml), Err(Error::Config(_))),
                "accepted {yaml:?}"
            );
        }
    }

    #[test]
    fn malformed_yaml_is_a_yaml_error() {
        assert!(matches!(
            Config::from_yaml("session: [unterminated"),
            Err(Error::Yaml(_))
        ));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.yaml");
        let mut config = Config::default();
        config.session.countdown_secs = 30;
        config.to_file(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap().session.countdown_secs, 30);
    }
}
