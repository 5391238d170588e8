//! Scripted backend services
//!
//! Each mock records its requests and answers from a queue of scripted
//! results, falling back to a fixed success once the queue is empty.

use async_trait::async_trait;
use speakup::error::{CoachError, CoachResult};
use speakup::services::{
    Feedback, FeedbackRequest, FeedbackService, Reply, ReplyRequest, ReplyService, Voice,
    VoiceService,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct MockReplies {
    pub requests: Arc<Mutex<Vec<ReplyRequest>>>,
    pub script: Arc<Mutex<VecDeque<CoachResult<Reply>>>>,
}

impl MockReplies {
    pub fn push_ok(&self, text: &str, audio: Option<Vec<u8>>) {
        self.script.lock().unwrap().push_back(Ok(Reply {
            text: text.to_string(),
            audio,
            persona: None,
        }));
    }

    pub fn push_err(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(CoachError::Service(message.to_string())));
    }

    pub fn requests(&self) -> Vec<ReplyRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// The utterance each reply request was made for
    pub fn utterances(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|r| r.messages.last().map(|m| m.content.clone()))
            .collect()
    }
}

#[async_trait]
impl ReplyService for MockReplies {
    async fn reply(&self, request: ReplyRequest) -> CoachResult<Reply> {
        self.requests.lock().unwrap().push(request);
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(Reply {
                text: "Tell me more.".to_string(),
                audio: None,
                persona: None,
            })
        })
    }
}

#[derive(Clone, Default)]
pub struct MockFeedback {
    pub requests: Arc<Mutex<Vec<FeedbackRequest>>>,
    pub script: Arc<Mutex<VecDeque<CoachResult<Feedback>>>>,
}

impl MockFeedback {
    pub fn push(&self, result: CoachResult<Feedback>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn requests(&self) -> Vec<FeedbackRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedbackService for MockFeedback {
    async fn feedback(&self, request: FeedbackRequest) -> CoachResult<Feedback> {
        self.requests.lock().unwrap().push(request);
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(Feedback::default()))
    }
}

#[derive(Clone, Default)]
pub struct MockVoices {
    pub previews: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl VoiceService for MockVoices {
    async fn voices(&self) -> CoachResult<Vec<Voice>> {
        Ok(Voice::fallback_catalog())
    }

    async fn preview(&self, voice_id: &str) -> CoachResult<Vec<u8>> {
        self.previews.lock().unwrap().push(voice_id.to_string());
        Ok(vec![0xAA, 0xBB])
    }
}
