//! SpeakUp Error Types
//!
//! Centralized error handling for the coaching pipeline.

use thiserror::Error;

/// Central error type for SpeakUp
#[derive(Error, Debug)]
pub enum CoachError {
    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Playback error: {0}")]
    Playback(String),

    /// Failure reported by a backend service. The message is shown to the
    /// learner as-is.
    #[error("{0}")]
    Service(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoachError {
    /// Message suitable for a toast or inline chat notice
    pub fn user_message(&self) -> String {
        match self {
            CoachError::Service(msg) => msg.clone(),
            CoachError::Http(e) if e.is_timeout() => "The coach took too long to answer.".to_string(),
            CoachError::Http(e) if e.is_connect() => {
                "Could not reach the SpeakUp server.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Result type alias for SpeakUp operations
pub type CoachResult<T> = Result<T, CoachError>;
