//! Turn Orchestrator
//!
//! Drives one turn per finalized utterance:
//! Idle -> AwaitingReply -> (reply | failure) -> AwaitingFeedback -> Idle.
//!
//! Network calls run as spawned tasks that post their result back as a
//! `CoachEvent`; everything else happens synchronously in the coach loop.

use crate::coach::{CoachEvent, EventSender};
use crate::error::CoachResult;
use crate::services::{
    ChatMessage, Feedback, FeedbackContext, FeedbackRequest, FeedbackService, Reply,
    ReplyRequest, ReplyService, Role,
};
use crate::ui::{UiEvent, UiSender};
use chrono::{DateTime, Local};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// History entries sent as recent context with a feedback request
pub const RECENT_CONTEXT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    AwaitingReply,
    AwaitingFeedback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Local>,
}

/// Append-only conversation log
#[derive(Debug, Default)]
pub struct ConversationHistory {
    entries: Vec<ChatEntry>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, content: &str) {
        self.entries.push(ChatEntry {
            role,
            content: content.to_string(),
            at: Local::now(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    /// Full history in order, as sent for reply context
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.entries
            .iter()
            .map(|e| ChatMessage {
                role: e.role,
                content: e.content.clone(),
            })
            .collect()
    }

    /// The last `n` messages
    pub fn tail(&self, n: usize) -> Vec<ChatMessage> {
        let start = self.entries.len().saturating_sub(n);
        self.entries[start..]
            .iter()
            .map(|e| ChatMessage {
                role: e.role,
                content: e.content.clone(),
            })
            .collect()
    }

    pub fn last_assistant(&self) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.role == Role::Assistant)
            .map(|e| e.content.as_str())
    }

    /// Entries to show, newest last, truncated to `limit`
    pub fn recent_for_display(&self, limit: usize) -> &[ChatEntry] {
        let start = self.entries.len().saturating_sub(limit);
        &self.entries[start..]
    }
}

/// Learner-facing settings that shape every request
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSettings {
    pub topic: String,
    pub level: String,
    pub user: String,
    pub voice_id: Option<String>,
}

#[derive(Debug, Clone)]
struct Turn {
    utterance: String,
    /// What the coach had said before the learner spoke
    last_assistant: String,
}

/// What the coach should do once a reply landed
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyReady {
    pub turn: TurnId,
    pub text: String,
    pub audio: Option<Vec<u8>>,
}

pub struct TurnOrchestrator {
    replies: Arc<dyn ReplyService>,
    feedback: Arc<dyn FeedbackService>,
    events: EventSender,
    ui: UiSender,
    settings: TurnSettings,
    history: ConversationHistory,
    last_turn: u64,
    awaiting_reply: Option<TurnId>,
    /// Feedback requests built when the reply landed, sent by `request_feedback`
    awaiting_feedback: HashMap<TurnId, FeedbackRequest>,
    turns: HashMap<TurnId, Turn>,
    queued: VecDeque<String>,
}

impl TurnOrchestrator {
    pub fn new(
        replies: Arc<dyn ReplyService>,
        feedback: Arc<dyn FeedbackService>,
        settings: TurnSettings,
        events: EventSender,
        ui: UiSender,
    ) -> Self {
        Self {
            replies,
            feedback,
            events,
            ui,
            settings,
            history: ConversationHistory::new(),
            last_turn: 0,
            awaiting_reply: None,
            awaiting_feedback: HashMap::new(),
            turns: HashMap::new(),
            queued: VecDeque::new(),
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut TurnSettings {
        &mut self.settings
    }

    pub fn phase(&self) -> TurnPhase {
        if self.awaiting_reply.is_some() {
            TurnPhase::AwaitingReply
        } else if !self.awaiting_feedback.is_empty() {
            TurnPhase::AwaitingFeedback
        } else {
            TurnPhase::Idle
        }
    }

    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    /// Hand a finalized utterance to the pipeline
    pub fn submit(&mut self, utterance: &str) {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return;
        }
        if self.awaiting_reply.is_some() {
            debug!("Reply pending, queueing utterance");
            self.queued.push_back(utterance.to_string());
            return;
        }
        self.begin(utterance);
    }

    /// Consume a reply result. Returns what to play when the turn succeeded;
    /// the caller starts playback and then calls `request_feedback`.
    pub fn on_reply(&mut self, turn: TurnId, result: CoachResult<Reply>) -> Option<ReplyReady> {
        if self.awaiting_reply != Some(turn) {
            debug!("Ignoring reply for turn {}", turn.0);
            return None;
        }
        self.awaiting_reply = None;
        let Some(pending) = self.turns.remove(&turn) else {
            return None;
        };

        let ready = match result {
            Ok(reply) => {
                info!("💬 Reply for turn {}: '{}'", turn.0, reply.text);
                if !reply.text.is_empty() {
                    self.history.push(Role::Assistant, &reply.text);
                }
                let _ = self.ui.send(UiEvent::Reply {
                    text: reply.text.clone(),
                    persona: reply.persona.clone(),
                });
                let request = self.feedback_request(pending);
                self.awaiting_feedback.insert(turn, request);
                Some(ReplyReady {
                    turn,
                    text: reply.text,
                    audio: reply.audio,
                })
            }
            Err(e) => {
                warn!("❌ Reply for turn {} failed: {}", turn.0, e);
                let _ = self.ui.send(UiEvent::Error(e.user_message()));
                None
            }
        };

        if let Some(next) = self.queued.pop_front() {
            self.begin(&next);
        }
        ready
    }

    pub fn on_feedback(&mut self, turn: TurnId, result: CoachResult<Feedback>) {
        let Some(request) = self.awaiting_feedback.remove(&turn) else {
            debug!("Ignoring feedback for turn {}", turn.0);
            return;
        };

        match result {
            Ok(feedback) => {
                debug!("📋 Feedback for turn {} received", turn.0);
                let _ = self.ui.send(UiEvent::Feedback {
                    utterance: request.transcript,
                    feedback,
                });
            }
            Err(e) => {
                warn!("⚠️ Feedback for turn {} failed: {}", turn.0, e);
                let _ = self.ui.send(UiEvent::Notice(format!(
                    "Feedback unavailable: {}",
                    e.user_message()
                )));
            }
        }
    }

    /// Drop queued work; in-flight requests are ignored when they return
    pub fn reset(&mut self) {
        self.queued.clear();
        self.awaiting_reply = None;
        self.awaiting_feedback.clear();
        self.turns.clear();
    }

    /// Context is taken from the history as it stands when the reply lands
    fn feedback_request(&self, pending: Turn) -> FeedbackRequest {
        FeedbackRequest {
            transcript: pending.utterance,
            context: FeedbackContext {
                level: self.settings.level.clone(),
                topic: self.settings.topic.clone(),
                user: self.settings.user.clone(),
                last_assistant: pending.last_assistant,
                recent: self.history.tail(RECENT_CONTEXT),
            },
        }
    }

    fn begin(&mut self, utterance: &str) {
        self.last_turn += 1;
        let turn = TurnId(self.last_turn);

        let last_assistant = self.history.last_assistant().unwrap_or_default().to_string();
        self.history.push(Role::User, utterance);
        self.turns.insert(
            turn,
            Turn {
                utterance: utterance.to_string(),
                last_assistant,
            },
        );
        self.awaiting_reply = Some(turn);

        info!("🗣️ Turn {}: '{}'", turn.0, utterance);
        let _ = self.ui.send(UiEvent::UserMessage(utterance.to_string()));
        let _ = self.ui.send(UiEvent::Thinking);

        let request = ReplyRequest {
            messages: self.history.messages(),
            topic: self.settings.topic.clone(),
            level: self.settings.level.clone(),
            user: self.settings.user.clone(),
            voice_id: self.settings.voice_id.clone(),
        };
        let replies = self.replies.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = replies.reply(request).await;
            let _ = events.send(CoachEvent::Reply { turn, result });
        });
    }

    /// Ask for feedback on a turn whose reply has been shown
    pub fn request_feedback(&mut self, turn: TurnId) {
        let Some(request) = self.awaiting_feedback.get(&turn).cloned() else {
            return;
        };

        let feedback = self.feedback.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = feedback.feedback(request).await;
            let _ = events.send(CoachEvent::Feedback { turn, result });
        });
    }
}
