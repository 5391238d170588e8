//! Coach
//!
//! The single owning context. Capture, playback and the turn pipeline live
//! here, and every input (hardware events, timers, network results, user
//! commands) arrives as one `CoachEvent` on one channel. `handle` is
//! synchronous, so no two events are ever processed at the same time.

use crate::capture::{CaptureEvent, CaptureManager, Recognizer, SessionToken, TimerKind};
use crate::config::{CaptureMode, Config};
use crate::error::CoachResult;
use crate::playback::{AudioSink, CaptureRequest, PlaybackCoordinator, PlaybackEvent, PlaybackId};
use crate::services::{Feedback, FeedbackService, Reply, ReplyService, SpeakupClient, Voice, VoiceService};
use crate::turn::{TurnId, TurnOrchestrator, TurnSettings};
use crate::ui::{UiEvent, UiSender};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub type EventSender = mpsc::UnboundedSender<CoachEvent>;

/// User intents, from the console or any other front end
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Listen,
    Stop,
    /// Typed text, sent as an utterance without going through capture
    Submit(String),
    SetMode(CaptureMode),
    SetVoice(String),
    SetTopic(String),
    SetLevel(String),
    PreviewVoice(String),
    ListVoices,
    ShowHistory,
    Quit,
}

#[derive(Debug)]
pub enum CoachEvent {
    Capture {
        token: SessionToken,
        event: CaptureEvent,
    },
    Playback {
        id: PlaybackId,
        event: PlaybackEvent,
    },
    Timer {
        kind: TimerKind,
        id: u64,
    },
    Reply {
        turn: TurnId,
        result: CoachResult<Reply>,
    },
    Feedback {
        turn: TurnId,
        result: CoachResult<Feedback>,
    },
    Voices(CoachResult<Vec<Voice>>),
    Preview {
        voice: String,
        result: CoachResult<Vec<u8>>,
    },
    Command(Command),
}

/// Backend collaborators
#[derive(Clone)]
pub struct Services {
    pub replies: Arc<dyn ReplyService>,
    pub feedback: Arc<dyn FeedbackService>,
    pub voices: Arc<dyn VoiceService>,
}

impl Services {
    pub fn from_client(client: SpeakupClient) -> Self {
        let client = Arc::new(client);
        Self {
            replies: client.clone(),
            feedback: client.clone(),
            voices: client,
        }
    }
}

pub struct Coach {
    capture: CaptureManager,
    playback: PlaybackCoordinator,
    turns: TurnOrchestrator,
    voices: Arc<dyn VoiceService>,
    known_voices: Vec<Voice>,
    history_limit: usize,
    events: EventSender,
    ui: UiSender,
}

impl Coach {
    pub fn new(
        config: &Config,
        recognizer: Box<dyn Recognizer>,
        sink: Box<dyn AudioSink>,
        services: Services,
        events: EventSender,
        ui: UiSender,
    ) -> Self {
        let timing = config.timing();
        let settings = TurnSettings {
            topic: config.topic.clone(),
            level: config.level.clone(),
            user: config.learner_name.clone(),
            voice_id: config.voice_id.clone(),
        };

        Self {
            playback: PlaybackCoordinator::new(
                sink,
                timing.resume_delay,
                events.clone(),
                ui.clone(),
            ),
            capture: CaptureManager::new(recognizer, timing, events.clone(), ui.clone()),
            turns: TurnOrchestrator::new(
                services.replies,
                services.feedback,
                settings,
                events.clone(),
                ui.clone(),
            ),
            voices: services.voices,
            known_voices: Vec::new(),
            history_limit: config.history_display_limit,
            events,
            ui,
        }
    }

    pub fn capture(&self) -> &CaptureManager {
        &self.capture
    }

    pub fn playback(&self) -> &PlaybackCoordinator {
        &self.playback
    }

    pub fn turns(&self) -> &TurnOrchestrator {
        &self.turns
    }

    /// Process events until `Quit` or until every sender is gone
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<CoachEvent>) {
        info!("🚀 Coach running");
        while let Some(event) = events.recv().await {
            if !self.handle(event) {
                break;
            }
        }
        self.teardown();
        info!("👋 Coach stopped");
    }

    /// Dispatch one event. Returns false once the coach should shut down.
    pub fn handle(&mut self, event: CoachEvent) -> bool {
        match event {
            CoachEvent::Capture { token, event } => {
                let utterance = self.capture.on_event(token, event, self.playback.state());
                self.submit(utterance);
            }
            CoachEvent::Playback { id, event } => {
                let request = self
                    .playback
                    .on_event(id, event, self.capture.keep_alive());
                self.apply(request);
            }
            CoachEvent::Timer { kind, id } => {
                if kind == TimerKind::ResumeCapture {
                    let request = self.playback.on_timer(kind, id);
                    self.apply(request);
                } else {
                    let utterance = self.capture.on_timer(kind, id);
                    self.submit(utterance);
                }
            }
            CoachEvent::Reply { turn, result } => {
                if let Some(ready) = self.turns.on_reply(turn, result) {
                    if let Some(audio) = ready.audio {
                        self.playback.play(audio, Some(&ready.text));
                    }
                    self.turns.request_feedback(ready.turn);
                }
            }
            CoachEvent::Feedback { turn, result } => self.turns.on_feedback(turn, result),
            CoachEvent::Voices(result) => self.on_voices(result),
            CoachEvent::Preview { voice, result } => match result {
                Ok(audio) => {
                    debug!("🔊 Previewing voice {}", voice);
                    self.playback.play(audio, None);
                }
                Err(e) => self.notify(UiEvent::Notice(e.user_message())),
            },
            CoachEvent::Command(command) => return self.on_command(command),
        }
        true
    }

    /// Stop listening and speaking, and drop all pending work
    pub fn teardown(&mut self) {
        self.capture.teardown();
        self.playback.stop();
        self.turns.reset();
    }

    fn on_command(&mut self, command: Command) -> bool {
        debug!("Command: {:?}", command);
        match command {
            Command::Listen => {
                let utterance = self.capture.start(false);
                self.submit(utterance);
            }
            Command::Stop => {
                self.playback.cancel_resume();
                let utterance = self.capture.stop();
                self.submit(utterance);
            }
            Command::Submit(text) => self.turns.submit(&text),
            Command::SetMode(mode) => self.capture.set_mode(mode),
            Command::SetVoice(id) => {
                if !self.known_voices.is_empty() && !self.known_voices.iter().any(|v| v.id == id)
                {
                    warn!("Unknown voice '{}'", id);
                    self.notify(UiEvent::Notice(format!("Unknown voice '{}'", id)));
                    return true;
                }
                info!("🗣️ Voice set to {}", id);
                self.turns.settings_mut().voice_id = Some(id.clone());
                self.notify(UiEvent::Notice(format!("Voice: {}", id)));
            }
            Command::SetTopic(topic) => {
                self.notify(UiEvent::Notice(format!("Topic: {}", topic)));
                self.turns.settings_mut().topic = topic;
            }
            Command::SetLevel(level) => {
                self.notify(UiEvent::Notice(format!("Level: {}", level)));
                self.turns.settings_mut().level = level;
            }
            Command::PreviewVoice(voice) => {
                let service = self.voices.clone();
                let events = self.events.clone();
                tokio::spawn(async move {
                    let result = service.preview(&voice).await;
                    let _ = events.send(CoachEvent::Preview { voice, result });
                });
            }
            Command::ListVoices => {
                let service = self.voices.clone();
                let events = self.events.clone();
                tokio::spawn(async move {
                    let result = service.voices().await;
                    let _ = events.send(CoachEvent::Voices(result));
                });
            }
            Command::ShowHistory => {
                let entries = self
                    .turns
                    .history()
                    .recent_for_display(self.history_limit)
                    .to_vec();
                self.notify(UiEvent::History(entries));
            }
            Command::Quit => return false,
        }
        true
    }

    fn on_voices(&mut self, result: CoachResult<Vec<Voice>>) {
        let voices = match result {
            Ok(voices) if !voices.is_empty() => voices,
            Ok(_) => Voice::fallback_catalog(),
            Err(e) => {
                warn!("⚠️ Voice list failed: {}", e);
                Voice::fallback_catalog()
            }
        };
        self.known_voices = voices.clone();
        self.notify(UiEvent::Voices {
            voices,
            selected: self.turns.settings().voice_id.clone(),
        });
    }

    fn apply(&mut self, request: Option<CaptureRequest>) {
        match request {
            Some(CaptureRequest::Pause) => {
                debug!("⏸️ Pausing capture for playback");
                let utterance = self.capture.stop();
                self.submit(utterance);
            }
            Some(CaptureRequest::Resume) => {
                let utterance = self.capture.start(false);
                self.submit(utterance);
            }
            None => {}
        }
    }

    fn submit(&mut self, utterance: Option<String>) {
        if let Some(text) = utterance {
            self.turns.submit(&text);
        }
    }

    fn notify(&self, event: UiEvent) {
        let _ = self.ui.send(event);
    }
}
