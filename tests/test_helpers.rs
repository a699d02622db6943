//! Helper functions and utilities for tests

#![allow(dead_code)]

use std::path::PathBuf;

use gesture_capture::{
    Result,
    access::{AccessGate, Owner},
    collector::FrameRecord,
    config::SessionConfig,
    export::FileSink,
    session::SessionController,
    types::{Detection, Frame, LandmarkCategory, LandmarkPoint},
};

/// In-memory sink keeping every saved file
#[derive(Default)]
pub struct MemorySink {
    pub files: Vec<(String, Vec<u8>)>,
}

impl MemorySink {
    pub fn text(&self, idx: usize) -> String {
        String::from_utf8(self.files[idx].1.clone()).expect("csv is utf-8")
    }
}

impl FileSink for MemorySink {
    fn save(&mut self, filename: &str, contents: &[u8]) -> Result<PathBuf> {
        self.files.push((filename.to_string(), contents.to_vec()));
        Ok(PathBuf::from(filename))
    }
}

pub fn owner() -> Owner {
    AccessGate::new(["Abhinav Kartik"])
        .unlock(" abhinav kartik ")
        .expect("owner on allow-list")
}

pub fn session_config(gestures: &[&str]) -> SessionConfig {
    SessionConfig {
        gestures: gestures.iter().map(|g| g.to_string()).collect(),
        countdown_secs: 180,
        settle_delay_ms: 500,
    }
}

pub fn controller(gestures: &[&str]) -> SessionController {
    let config = session_config(gestures);
    SessionController::new(owner(), config.gestures.clone(), &config)
}

/// Frame record with the two pose points used by the CSV scenario, built for the session's
/// current recording
pub fn pose_record(session: &SessionController, timestamp: u64) -> FrameRecord {
    let detection = Detection::empty(Frame::blank(4, 4)).with_set(
        LandmarkCategory::Pose,
        vec![
            LandmarkPoint::new(0.1, 0.2, 0.0).with_visibility(0.9),
            LandmarkPoint::new(0.3, 0.4, 0.0).with_visibility(0.8),
        ],
    );
    FrameRecord::from_detection(timestamp, &detection).for_generation(session.generation())
}
