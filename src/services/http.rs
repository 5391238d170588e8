//! SpeakUp backend client
//!
//! reqwest client for the coach backend:
//! - POST /api/chat       conversational reply + base64 mp3
//! - POST /api/feedback   structured feedback for one utterance
//! - GET  /api/voices     voice catalog
//! - GET  /api/tts-test   short audition phrase for one voice

use super::{
    Feedback, FeedbackRequest, Reply, ReplyRequest, ReplyService, FeedbackService, Voice,
    VoiceService,
};
use crate::config::Config;
use crate::error::{CoachError, CoachResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest transcript sent for feedback, in characters
pub const MAX_FEEDBACK_CHARS: usize = 2000;
const VOICE_ATTEMPTS: u32 = 3;

/// Collapse whitespace and cap the transcript for the feedback request
pub fn prepare_transcript(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_FEEDBACK_CHARS)
        .collect()
}

/// Decode a base64 audio field; undecodable audio is dropped
fn decode_audio(value: Option<&Value>) -> Option<Vec<u8>> {
    let encoded = value?.as_str()?.trim();
    if encoded.is_empty() {
        return None;
    }
    match STANDARD.decode(encoded) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("⚠️ Reply audio was not valid base64, showing text only: {}", e);
            None
        }
    }
}

fn error_message(body: &Value, fallback: &str) -> String {
    body.get("error")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Interpret a `/api/chat` response
fn parse_reply(success: bool, body: &Value) -> CoachResult<Reply> {
    if !success {
        return Err(CoachError::Service(error_message(body, "Chat error")));
    }
    Ok(Reply {
        text: body
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string(),
        audio: decode_audio(body.get("audio")),
        persona: body
            .get("persona")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

pub struct SpeakupClient {
    client: Client,
    base_url: String,
    device_id: String,
}

impl SpeakupClient {
    pub fn new(config: &Config) -> CoachResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            device_id: config.device_id.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and read the body as JSON, tolerating non-JSON bodies
    async fn json_body(&self, request: reqwest::RequestBuilder) -> CoachResult<(bool, Value)> {
        let response = request.send().await?;
        let success = response.status().is_success();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or_else(|e| {
            debug!("Response body is not JSON ({}): {:.120}", e, text);
            Value::Null
        });
        Ok((success, body))
    }

    async fn fetch_voices(&self) -> CoachResult<Vec<Voice>> {
        let url = self.url("/api/voices");
        for attempt in 0..VOICE_ATTEMPTS {
            match self.client.get(&url).send().await {
                Ok(resp) => {
                    let body: Value = resp.json().await?;
                    let voices: Vec<Voice> = body
                        .get("voices")
                        .cloned()
                        .map(serde_json::from_value)
                        .transpose()?
                        .unwrap_or_default();
                    return Ok(voices);
                }
                Err(e) if e.is_connect() && attempt + 1 < VOICE_ATTEMPTS => {
                    warn!(
                        "⚠️ Voice list retry {}/{}: {}",
                        attempt + 1,
                        VOICE_ATTEMPTS,
                        e
                    );
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl ReplyService for SpeakupClient {
    async fn reply(&self, request: ReplyRequest) -> CoachResult<Reply> {
        let payload = json!({
            "deviceId": self.device_id,
            "messages": request.messages,
            "topic": request.topic,
            "level": request.level,
            "user": request.user,
            "voiceId": request.voice_id,
        });

        debug!("💬 Requesting reply ({} messages)", request.messages.len());
        let (success, body) = self
            .json_body(self.client.post(self.url("/api/chat")).json(&payload))
            .await?;
        parse_reply(success, &body)
    }
}

#[async_trait]
impl FeedbackService for SpeakupClient {
    async fn feedback(&self, mut request: FeedbackRequest) -> CoachResult<Feedback> {
        request.transcript = prepare_transcript(&request.transcript);
        if request.transcript.is_empty() {
            return Err(CoachError::Service("Missing transcript (string).".to_string()));
        }

        let (success, body) = self
            .json_body(self.client.post(self.url("/api/feedback")).json(&request))
            .await?;
        if !success {
            return Err(CoachError::Service(error_message(&body, "Feedback failed")));
        }
        if !body.is_object() {
            return Ok(Feedback::unparseable(&request.transcript));
        }
        Ok(Feedback::normalize(&body))
    }
}

#[async_trait]
impl VoiceService for SpeakupClient {
    async fn voices(&self) -> CoachResult<Vec<Voice>> {
        match self.fetch_voices().await {
            Ok(voices) if !voices.is_empty() => {
                info!("🗣️ {} voices available", voices.len());
                Ok(voices)
            }
            Ok(_) => {
                warn!("⚠️ Backend listed no voices, using built-in catalog");
                Ok(Voice::fallback_catalog())
            }
            Err(e) => {
                warn!("⚠️ Voice list unavailable, using built-in catalog: {}", e);
                Ok(Voice::fallback_catalog())
            }
        }
    }

    async fn preview(&self, voice_id: &str) -> CoachResult<Vec<u8>> {
        let request = self
            .client
            .get(self.url("/api/tts-test"))
            .query(&[("voice", voice_id)]);
        let (success, body) = self.json_body(request).await?;

        let ok = success && body.get("ok").and_then(Value::as_bool).unwrap_or(false);
        match decode_audio(body.get("audio")) {
            Some(audio) if ok => Ok(audio),
            _ => Err(CoachError::Service(error_message(
                &body,
                "Voice preview failed",
            ))),
        }
    }
}
