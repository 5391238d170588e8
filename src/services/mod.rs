//! Backend services
//!
//! Abstract contracts for the reply, feedback and voice services, so the turn
//! pipeline can run against the HTTP backend or against test doubles.

pub mod feedback;
pub mod http;

pub use feedback::Feedback;
pub use http::SpeakupClient;

use crate::error::CoachResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
        }
    }
}

/// Everything the reply service needs for one turn
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyRequest {
    pub messages: Vec<ChatMessage>,
    pub topic: String,
    pub level: String,
    pub user: String,
    pub voice_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reply {
    pub text: String,
    /// Synthesized speech (mp3), absent when synthesis failed server side
    pub audio: Option<Vec<u8>>,
    pub persona: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackContext {
    pub level: String,
    pub topic: String,
    pub user: String,
    pub last_assistant: String,
    pub recent: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRequest {
    pub transcript: String,
    pub context: FeedbackContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub persona: String,
    #[serde(default)]
    pub rate: String,
    #[serde(default)]
    pub pitch: String,
}

impl Voice {
    /// Catalog used whenever the backend cannot list its voices
    pub fn fallback_catalog() -> Vec<Voice> {
        vec![
            Voice {
                id: "en-US-AriaNeural".to_string(),
                label: "Aria (US, F) — Instructor".to_string(),
                persona: "Warm, encouraging American English.".to_string(),
                rate: "1.0".to_string(),
                pitch: "0%".to_string(),
            },
            Voice {
                id: "en-US-GuyNeural".to_string(),
                label: "Guy (US, M) — Instructor".to_string(),
                persona: "Confident, supportive mentor.".to_string(),
                rate: "1.0".to_string(),
                pitch: "0%".to_string(),
            },
        ]
    }
}

/// Conversational reply with optional synthesized speech
#[async_trait]
pub trait ReplyService: Send + Sync {
    async fn reply(&self, request: ReplyRequest) -> CoachResult<Reply>;
}

/// Structured feedback on a single utterance
#[async_trait]
pub trait FeedbackService: Send + Sync {
    async fn feedback(&self, request: FeedbackRequest) -> CoachResult<Feedback>;
}

/// Voice listing and audition, outside the turn pipeline
#[async_trait]
pub trait VoiceService: Send + Sync {
    async fn voices(&self) -> CoachResult<Vec<Voice>>;

    /// Audio for a short fixed phrase in `voice_id`
    async fn preview(&self, voice_id: &str) -> CoachResult<Vec<u8>>;
}
