//! Playback Module
//!
//! Serializes synthesized speech and pauses capture around it:
//! - AudioSink: the playback hardware contract
//! - PlaybackCoordinator: owns the single sink and the PlaybackState

pub mod engine;

pub use engine::RodioSink;

use crate::capture::{TimerKind, TimerSet};
use crate::coach::EventSender;
use crate::error::CoachResult;
use crate::ui::{UiEvent, UiSender};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Identifies one `play` call; events for a replaced playback are ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Started,
    Ended,
    Failed(String),
}

/// Playback hardware contract.
///
/// `play` replaces whatever is loaded and posts `CoachEvent::Playback { id, .. }`
/// events as it starts and finishes. `stop` silences and releases the current
/// audio without posting an end event.
pub trait AudioSink: Send {
    fn play(&mut self, id: PlaybackId, audio: Vec<u8>) -> CoachResult<()>;

    fn stop(&mut self);
}

/// Shared view of playback for the capture side
#[derive(Debug, Clone, Default)]
pub struct PlaybackState {
    pub playing: bool,
    pub resume_pending: bool,
    /// Text of the reply most recently handed to playback, for echo checks
    pub last_reply: String,
}

/// What the coordinator needs from capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureRequest {
    Pause,
    Resume,
}

pub struct PlaybackCoordinator {
    sink: Box<dyn AudioSink>,
    state: PlaybackState,
    current: Option<PlaybackId>,
    last_id: u64,
    timers: TimerSet,
    resume_delay: Duration,
    ui: UiSender,
}

impl PlaybackCoordinator {
    pub fn new(
        sink: Box<dyn AudioSink>,
        resume_delay: Duration,
        events: EventSender,
        ui: UiSender,
    ) -> Self {
        Self {
            sink,
            state: PlaybackState::default(),
            current: None,
            last_id: 0,
            timers: TimerSet::new(events),
            resume_delay,
            ui,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn current(&self) -> Option<PlaybackId> {
        self.current
    }

    /// Replace any current playback with `audio`. `reply` is the text being
    /// spoken, remembered for echo suppression.
    pub fn play(&mut self, audio: Vec<u8>, reply: Option<&str>) -> PlaybackId {
        if let Some(text) = reply {
            self.state.last_reply = text.to_string();
        }

        if self.current.take().is_some() {
            debug!("Replacing current playback");
        }
        self.sink.stop();
        self.state.playing = false;
        // The new playback's end decides when capture comes back
        self.timers.cancel(TimerKind::ResumeCapture);

        self.last_id += 1;
        let id = PlaybackId(self.last_id);
        self.current = Some(id);

        match self.sink.play(id, audio) {
            Ok(()) => debug!("🔊 Playback {} queued", id.0),
            Err(e) => {
                warn!("❌ Playback {} could not start: {}", id.0, e);
                self.finish(id, Some(e.user_message()));
            }
        }
        id
    }

    /// Handle a sink event. `capturing` tells whether capture is active or
    /// intended to be.
    pub fn on_event(
        &mut self,
        id: PlaybackId,
        event: PlaybackEvent,
        capturing: bool,
    ) -> Option<CaptureRequest> {
        if self.current != Some(id) {
            debug!("Dropping event for replaced playback {}: {:?}", id.0, event);
            return None;
        }

        match event {
            PlaybackEvent::Started => {
                info!("🔊 Speaking");
                self.state.playing = true;
                let _ = self.ui.send(UiEvent::Speaking(true));
                if capturing {
                    self.state.resume_pending = true;
                    return Some(CaptureRequest::Pause);
                }
                None
            }
            PlaybackEvent::Ended => {
                self.finish(id, None);
                None
            }
            PlaybackEvent::Failed(reason) => {
                warn!("❌ Playback {} failed: {}", id.0, reason);
                self.finish(id, Some(format!("Audio playback failed: {}", reason)));
                None
            }
        }
    }

    pub fn on_timer(&mut self, kind: TimerKind, id: u64) -> Option<CaptureRequest> {
        if kind != TimerKind::ResumeCapture || !self.timers.fire(kind, id) {
            return None;
        }
        if !self.state.resume_pending || self.state.playing {
            return None;
        }
        self.state.resume_pending = false;
        debug!("🎙️ Resuming capture after playback");
        Some(CaptureRequest::Resume)
    }

    /// Forget a recorded resume, e.g. after the learner stopped listening
    pub fn cancel_resume(&mut self) {
        self.state.resume_pending = false;
        self.timers.cancel(TimerKind::ResumeCapture);
    }

    /// Silence playback and drop all pending work
    pub fn stop(&mut self) {
        if self.current.take().is_some() || self.state.playing {
            info!("🛑 Stopping playback");
        }
        self.sink.stop();
        self.state.playing = false;
        self.cancel_resume();
        let _ = self.ui.send(UiEvent::Speaking(false));
    }

    fn finish(&mut self, id: PlaybackId, error: Option<String>) {
        debug!("🔇 Playback {} finished", id.0);
        self.state.playing = false;
        self.current = None;
        self.sink.stop();
        let _ = self.ui.send(UiEvent::Speaking(false));
        if let Some(message) = error {
            let _ = self.ui.send(UiEvent::Notice(message));
        }

        if self.state.resume_pending {
            self.timers.arm(TimerKind::ResumeCapture, self.resume_delay);
        }
    }
}
