//! Error types shared by the capture library.

use thiserror::Error;

use crate::session::SessionStatus;

#[derive(Error, Debug)]
pub enum Error {
    /// The entered name is not on the allow-list.
    #[error("access denied for \"{name}\"")]
    AccessDenied { name: String },

    /// The recording window closed without a single buffered frame.
    #[error("no frames were captured for \"{gesture}\", please try again")]
    EmptyCapture { gesture: String },

    /// A transport action was requested in a state that does not allow it.
    #[error("cannot {action} while {status}")]
    InvalidTransition {
        action: &'static str,
        status: SessionStatus,
    },

    /// Every gesture prompt has been recorded.
    #[error("all gestures have been recorded")]
    SessionComplete,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
