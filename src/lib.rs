//! Landmark recording library for building gesture datasets from a webcam.
//!
//! A recording session walks a person through an ordered list of gesture prompts. For each
//! prompt the camera runs for a fixed countdown while a landmark detector reports pose, face and
//! hand keypoints; every processed frame is buffered and, when the countdown ends, written to one
//! CSV file per prompt.
//!
//! The pipeline consists of:
//! 1. An access gate that checks the entered name against an allow-list
//! 2. A capture thread that reads camera frames through a single-slot gate
//! 3. A detector worker that finds landmarks and draws the overlay canvas
//! 4. The session controller that buffers frames while running and exports them on expiry
//!
//! # Examples
//!
//! ```no_run
//! use std::time::{Duration, Instant};
//!
//! use gesture_capture::{
//!     access::AccessGate,
//!     collector::{FrameRecord, unix_millis},
//!     config::Config,
//!     export::DirectorySink,
//!     session::SessionController,
//!     types::{Detection, Frame},
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let owner = AccessGate::new(&config.access.allowed_users).unlock("  Abhinav Kartik ")?;
//!
//! let mut session = SessionController::new(owner, config.session.gestures.clone(), &config.session);
//! let mut sink = DirectorySink::new("recordings");
//!
//! let start = Instant::now();
//! session.start(start)?;
//! let detection = Detection::empty(Frame::blank(800, 600));
//! // Records are tagged with the recording they belong to; stale ones are refused.
//! let record = FrameRecord::from_detection(unix_millis(), &detection).for_generation(session.generation());
//! session.collect(record);
//!
//! // Past the countdown and the settle delay the buffer is exported.
//! let later = start + Duration::from_secs(181);
//! session.poll(later, &mut sink);
//! if let Some(outcome) = session.poll(later + Duration::from_secs(1), &mut sink) {
//!     println!("{:?}", outcome?);
//! }
//! # Ok(())
//! # }
//! ```

/// Allow-list check in front of the session
pub mod access;

/// Per-frame landmark records and the fallback sentinel
pub mod collector;

/// Configuration management
pub mod config;

/// Error types and result handling
pub mod error;

/// CSV rendering and file sinks
pub mod export;

/// Landmark model provisioning
pub mod model_download;

/// Camera capture, detection and overlay drawing
pub mod pipeline;

/// Recording state machine and countdown
pub mod session;

/// Frames, landmark points and detector results
pub mod types;

pub use error::{Error, Result};
