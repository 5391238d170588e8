#![allow(dead_code)]

pub mod mock_capture;
pub mod mock_services;

use mock_capture::{MockRecognizer, MockSink};
use mock_services::{MockFeedback, MockReplies, MockVoices};
use speakup::capture::{CaptureEvent, Fragment, SessionToken};
use speakup::coach::{Coach, CoachEvent, Command, Services};
use speakup::config::{CaptureMode, Config};
use speakup::playback::{PlaybackEvent, PlaybackId};
use speakup::ui::UiEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// A coach wired to mocks, driven by hand from a paused-clock test
pub struct TestCoach {
    pub coach: Coach,
    pub events: mpsc::UnboundedReceiver<CoachEvent>,
    pub ui: mpsc::UnboundedReceiver<UiEvent>,
    pub recognizer: MockRecognizer,
    pub sink: MockSink,
    pub replies: MockReplies,
    pub feedback: MockFeedback,
    pub voices: MockVoices,
}

impl TestCoach {
    pub fn new(mode: CaptureMode) -> Self {
        let config = Config {
            capture_mode: mode,
            learner_name: "Sam".to_string(),
            level: "B1".to_string(),
            topic: "shopping".to_string(),
            ..Config::default()
        };

        let (tx, events) = mpsc::unbounded_channel();
        let (ui_tx, ui) = mpsc::unbounded_channel();
        let recognizer = MockRecognizer::default();
        let sink = MockSink::default();
        let replies = MockReplies::default();
        let feedback = MockFeedback::default();
        let voices = MockVoices::default();

        let services = Services {
            replies: Arc::new(replies.clone()),
            feedback: Arc::new(feedback.clone()),
            voices: Arc::new(voices.clone()),
        };
        let coach = Coach::new(
            &config,
            Box::new(recognizer.clone()),
            Box::new(sink.clone()),
            services,
            tx,
            ui_tx,
        );

        Self {
            coach,
            events,
            ui,
            recognizer,
            sink,
            replies,
            feedback,
            voices,
        }
    }

    pub fn command(&mut self, command: Command) -> bool {
        self.coach.handle(CoachEvent::Command(command))
    }

    pub fn token(&self) -> SessionToken {
        self.coach
            .capture()
            .current_token()
            .expect("no live capture session")
    }

    /// Deliver a capture event tagged with `token`
    pub fn capture_as(&mut self, token: SessionToken, event: CaptureEvent) {
        self.coach.handle(CoachEvent::Capture { token, event });
    }

    /// Deliver a capture event from the current session
    pub fn capture(&mut self, event: CaptureEvent) {
        let token = self.token();
        self.capture_as(token, event);
    }

    pub fn fragments(&mut self, fragments: Vec<Fragment>) {
        self.capture(CaptureEvent::Fragments(fragments));
    }

    pub fn playback(&mut self, id: PlaybackId, event: PlaybackEvent) {
        self.coach.handle(CoachEvent::Playback { id, event });
    }

    /// Let spawned tasks run and feed everything they posted back into the coach
    pub async fn settle(&mut self) {
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(1)).await;
            let mut handled = 0;
            while let Ok(event) = self.events.try_recv() {
                self.coach.handle(event);
                handled += 1;
            }
            if handled == 0 {
                break;
            }
        }
    }

    /// Advance the paused clock, then settle
    pub async fn advance(&mut self, by: Duration) {
        tokio::time::sleep(by).await;
        self.settle().await;
    }

    pub fn drain_ui(&mut self) -> Vec<UiEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.ui.try_recv() {
            out.push(event);
        }
        out
    }
}
