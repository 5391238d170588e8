//! Speech Capture Module
//!
//! Continuous speech capture that survives provider session limits:
//! - Recognizer: the capture hardware contract (host capability)
//! - CaptureManager: session lifecycle, generation gating and flush policy
//! - UtteranceBuffer / TimerSet / echo filter: the pieces it drives

pub mod buffer;
pub mod echo;
pub mod manager;
pub mod timers;
pub mod wyoming;

pub use buffer::{FlushReason, UtteranceBuffer};
pub use manager::{CaptureManager, SessionState};
pub use timers::{TimerKind, TimerSet};
pub use wyoming::WyomingRecognizer;

use thiserror::Error;

/// Generation token issued to each capture session.
///
/// Every inbound capture event carries the token of the session that produced it;
/// anything that does not match the current token is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionToken(pub u64);

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One piece of transcribed text
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub text: String,
    pub is_final: bool,
}

impl Fragment {
    pub fn final_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            is_final: true,
        }
    }

    pub fn interim(text: &str) -> Self {
        Self {
            text: text.to_string(),
            is_final: false,
        }
    }
}

/// Events raised by the capture hardware for one session
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Started,
    Fragments(Vec<Fragment>),
    Error { reason: String },
    Ended,
}

/// User-facing classification of a recognizer error reason code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureErrorKind {
    NoSpeech,
    NoMicrophone,
    PermissionDenied,
    /// Benign abort, usually caused by our own teardown
    Aborted,
    Other(String),
}

impl CaptureErrorKind {
    pub fn classify(reason: &str) -> Self {
        match reason.trim().to_lowercase().as_str() {
            "no-speech" => CaptureErrorKind::NoSpeech,
            "audio-capture" => CaptureErrorKind::NoMicrophone,
            "not-allowed" | "service-not-allowed" => CaptureErrorKind::PermissionDenied,
            "aborted" => CaptureErrorKind::Aborted,
            other => CaptureErrorKind::Other(other.to_string()),
        }
    }

    /// Permission and device errors end the attempt; no silent restart
    pub fn blocks_restart(&self) -> bool {
        matches!(
            self,
            CaptureErrorKind::NoMicrophone | CaptureErrorKind::PermissionDenied
        )
    }

    pub fn is_ignorable(&self) -> bool {
        matches!(self, CaptureErrorKind::Aborted)
    }

    pub fn user_message(&self) -> String {
        match self {
            CaptureErrorKind::NoSpeech => "No speech detected. Try again.".to_string(),
            CaptureErrorKind::NoMicrophone => {
                "No microphone found, or access to it was denied.".to_string()
            }
            CaptureErrorKind::PermissionDenied => "Microphone permission denied.".to_string(),
            CaptureErrorKind::Aborted => "Listening was interrupted.".to_string(),
            CaptureErrorKind::Other(reason) => format!("Speech recognition error: {}", reason),
        }
    }
}

/// Why a recognizer refused to start
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StartError {
    /// Redundant start on an already running session
    #[error("recognizer already started")]
    AlreadyStarted,

    /// Capture is not possible; carries a recognizer reason code
    #[error("recognizer unavailable: {0}")]
    Unavailable(String),
}

/// Capture hardware contract.
///
/// Implementations post `CoachEvent::Capture { token, .. }` for the session started
/// with `token`. `stop` asks for a graceful end (an `Ended` event should follow);
/// `abort` tears the session down and its later events may be dropped.
pub trait Recognizer: Send {
    fn start(&mut self, token: SessionToken) -> Result<(), StartError>;

    fn stop(&mut self, token: SessionToken);

    fn abort(&mut self, token: SessionToken);

    fn name(&self) -> &str;
}

/// Stand-in recognizer for text-only sessions
#[derive(Debug, Default)]
pub struct NoCapture;

impl Recognizer for NoCapture {
    fn start(&mut self, _token: SessionToken) -> Result<(), StartError> {
        Err(StartError::Unavailable("audio-capture".to_string()))
    }

    fn stop(&mut self, _token: SessionToken) {}

    fn abort(&mut self, _token: SessionToken) {}

    fn name(&self) -> &str {
        "none"
    }
}
