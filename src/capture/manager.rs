//! Recognizer Lifecycle Manager
//!
//! Owns the one current capture session, gates every inbound event by its
//! generation token, restarts transparently across provider session limits and
//! decides when the utterance buffer is flushed.
//!
//! Methods that can complete an utterance return it as `Option<String>`; the
//! caller hands it to the turn orchestrator. A `None` flush never reaches it.

use super::buffer::{FlushReason, UtteranceBuffer};
use super::echo::EchoFilter;
use super::timers::{TimerKind, TimerSet};
use super::{CaptureErrorKind, CaptureEvent, Fragment, Recognizer, SessionToken, StartError};
use crate::coach::EventSender;
use crate::config::{CaptureMode, TimingConfig};
use crate::playback::PlaybackState;
use crate::ui::{UiEvent, UiSender};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Listening,
    Ending,
}

#[derive(Debug, Clone)]
struct CaptureSession {
    token: SessionToken,
    state: SessionState,
    created_at: Instant,
}

pub struct CaptureManager {
    recognizer: Box<dyn Recognizer>,
    timing: TimingConfig,
    echo: EchoFilter,
    buffer: UtteranceBuffer,
    timers: TimerSet,
    ui: UiSender,
    last_token: u64,
    current: Option<CaptureSession>,
    /// Intent to remain listening; an end event under keep-alive means restart
    keep_alive: bool,
    stop_requested: bool,
}

impl CaptureManager {
    pub fn new(
        recognizer: Box<dyn Recognizer>,
        timing: TimingConfig,
        events: EventSender,
        ui: UiSender,
    ) -> Self {
        let echo = EchoFilter::new(timing.echo_min_chars, timing.echo_overlap_ratio);
        Self {
            recognizer,
            timing,
            echo,
            buffer: UtteranceBuffer::new(),
            timers: TimerSet::new(events),
            ui,
            last_token: 0,
            current: None,
            keep_alive: false,
            stop_requested: false,
        }
    }

    /// Begin (or keep) listening. `force_fresh` replaces any existing session.
    ///
    /// A session that is ending after a manual stop is never revived: what it
    /// captured is returned as a finished utterance and a new session replaces it.
    pub fn start(&mut self, force_fresh: bool) -> Option<String> {
        let mut flushed = None;
        if let Some((token, state)) = self.current.as_ref().map(|s| (s.token, s.state)) {
            if state == SessionState::Ending && self.stop_requested {
                debug!("Session {} is stopping, finishing its utterance", token);
                flushed = self.flush(FlushReason::ManualStop);
            } else if !force_fresh {
                debug!("Capture already running ({}), keeping it", token);
                self.keep_alive = true;
                return None;
            }
        }

        self.teardown_session();

        self.last_token += 1;
        let token = SessionToken(self.last_token);
        self.keep_alive = true;
        self.stop_requested = false;
        self.current = Some(CaptureSession {
            token,
            state: SessionState::Starting,
            created_at: Instant::now(),
        });

        match self.recognizer.start(token) {
            Ok(()) | Err(StartError::AlreadyStarted) => {
                info!("🎙️ Capture session {} starting ({})", token, self.recognizer.name());
                self.timers
                    .arm(TimerKind::SessionRenewal, self.timing.session_renewal);
                if self.timing.mode == CaptureMode::Auto && !self.buffer.is_empty() {
                    self.timers.arm(TimerKind::Silence, self.timing.silence);
                }
                self.notify(UiEvent::Listening(true));
            }
            Err(StartError::Unavailable(reason)) => {
                warn!("❌ Capture session {} could not start: {}", token, reason);
                self.current = None;
                self.keep_alive = false;
                self.report_error(CaptureErrorKind::classify(&reason));
                self.notify(UiEvent::Listening(false));
            }
        }
        flushed
    }

    /// Manual stop: drop keep-alive now, ask the session to end, and arm the
    /// hard-kill fallback in case the end event never arrives.
    pub fn stop(&mut self) -> Option<String> {
        self.keep_alive = false;
        self.stop_requested = true;
        self.timers.cancel(TimerKind::Restart);

        match self.current.as_mut() {
            Some(session) => {
                info!("🛑 Stopping capture session {}", session.token);
                session.state = SessionState::Ending;
                let token = session.token;
                self.recognizer.stop(token);
                self.timers.arm(TimerKind::HardKill, self.timing.hard_kill);
                None
            }
            None => {
                self.notify(UiEvent::Listening(false));
                self.flush(FlushReason::ManualStop)
            }
        }
    }

    /// Dispatch one capture event; events from superseded sessions are dropped
    pub fn on_event(
        &mut self,
        token: SessionToken,
        event: CaptureEvent,
        playback: &PlaybackState,
    ) -> Option<String> {
        if self.current_token() != Some(token) {
            debug!("Dropping stale capture event from {}: {:?}", token, event);
            return None;
        }

        match event {
            CaptureEvent::Started => {
                if let Some(session) = self.current.as_mut() {
                    if session.state == SessionState::Starting {
                        session.state = SessionState::Listening;
                    }
                }
                debug!("👂 Session {} listening", token);
                None
            }
            CaptureEvent::Fragments(fragments) => {
                self.on_fragments(&fragments, playback);
                None
            }
            CaptureEvent::Error { reason } => {
                self.report_error(CaptureErrorKind::classify(&reason));
                None
            }
            CaptureEvent::Ended => self.on_end(token),
        }
    }

    /// Handle a fired timer. Returns a flushed utterance when the timer flushed one.
    pub fn on_timer(&mut self, kind: TimerKind, id: u64) -> Option<String> {
        if !self.timers.fire(kind, id) {
            return None;
        }

        match kind {
            TimerKind::Silence => self.flush(FlushReason::Silence),
            TimerKind::MaxUtterance => {
                info!("⏰ Max utterance length reached, flushing");
                self.flush(FlushReason::MaxDuration)
            }
            TimerKind::SessionRenewal => {
                self.renew();
                None
            }
            TimerKind::HardKill => {
                if self.keep_alive && !self.stop_requested {
                    // A renewal that never ended: replace the session, keep the buffer
                    if let Some(token) = self.current_token() {
                        warn!("⚠️ Session {} did not end for renewal, forcing a fresh one", token);
                    }
                    return self.start(true);
                }
                if let Some(session) = self.current.take() {
                    warn!(
                        "⚠️ Session {} never confirmed its end, forcing teardown",
                        session.token
                    );
                    self.recognizer.abort(session.token);
                }
                self.timers
                    .cancel_many(&[TimerKind::SessionRenewal, TimerKind::Restart]);
                self.stop_requested = false;
                self.notify(UiEvent::Listening(false));
                self.flush(FlushReason::HardKill)
            }
            TimerKind::Restart => {
                if self.keep_alive && self.current.is_none() {
                    debug!("🔄 Restarting capture after provider end");
                    return self.start(true);
                }
                None
            }
            TimerKind::ResumeCapture => None,
        }
    }

    /// Switch between auto-flush and push-to-finish
    pub fn set_mode(&mut self, mode: CaptureMode) {
        self.timing.mode = mode;
        match mode {
            CaptureMode::PushToFinish => self.timers.cancel(TimerKind::Silence),
            CaptureMode::Auto => {
                if !self.buffer.is_empty() {
                    self.timers.arm(TimerKind::Silence, self.timing.silence);
                }
            }
        }
        self.notify(UiEvent::ModeChanged(mode));
    }

    /// Abort everything and discard any unfinished utterance
    pub fn teardown(&mut self) {
        self.keep_alive = false;
        self.stop_requested = false;
        if let Some(session) = self.current.take() {
            self.recognizer.abort(session.token);
        }
        self.timers.cancel_all();
        if let Some(text) = self.buffer.take() {
            debug!("Discarding unfinished utterance on teardown: '{}'", text);
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.timing.mode
    }

    pub fn current_token(&self) -> Option<SessionToken> {
        self.current.as_ref().map(|s| s.token)
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.current.as_ref().map(|s| s.state)
    }

    /// Listening now, or intending to (e.g. between provider restarts)
    pub fn is_capturing(&self) -> bool {
        self.current.is_some() || self.keep_alive
    }

    /// Intent to keep listening. False once the learner stopped, even while
    /// the stopped session is still winding down.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn buffer(&self) -> &UtteranceBuffer {
        &self.buffer
    }

    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    fn on_fragments(&mut self, fragments: &[Fragment], playback: &PlaybackState) {
        // Anything heard while the coach is speaking is its own voice
        if playback.playing {
            debug!("🔇 Dropping {} fragment(s) during playback", fragments.len());
            return;
        }

        let candidate = fragments
            .iter()
            .map(|f| f.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if self.echo.is_echo(&candidate, &playback.last_reply) {
            debug!("🔁 Echo suppressed: '{}'", candidate);
            return;
        }

        let was_empty = self.buffer.is_empty();
        self.buffer.apply(fragments);
        if self.buffer.is_empty() {
            return;
        }

        if was_empty {
            self.timers
                .arm(TimerKind::MaxUtterance, self.timing.max_utterance);
        }
        if self.timing.mode == CaptureMode::Auto {
            self.timers.arm(TimerKind::Silence, self.timing.silence);
        }

        self.notify(UiEvent::Transcript {
            finalized: self.buffer.finalized().to_string(),
            interim: self.buffer.interim().to_string(),
        });
    }

    fn on_end(&mut self, token: SessionToken) -> Option<String> {
        self.current = None;
        self.timers.cancel_many(&[
            TimerKind::HardKill,
            TimerKind::Silence,
            TimerKind::SessionRenewal,
        ]);

        if self.keep_alive {
            // Provider cap or renewal: reopen and keep what was said so far
            debug!(
                "🔄 Session {} ended under keep-alive, restarting in {:?}",
                token, self.timing.restart_backoff
            );
            self.timers
                .arm(TimerKind::Restart, self.timing.restart_backoff);
            return None;
        }

        let reason = if self.stop_requested {
            FlushReason::ManualStop
        } else {
            FlushReason::SessionEnded
        };
        self.stop_requested = false;
        info!("🔇 Capture session {} ended", token);
        self.notify(UiEvent::Listening(false));
        self.flush(reason)
    }

    fn renew(&mut self) {
        if !self.keep_alive {
            return;
        }
        let Some(session) = self.current.as_mut() else {
            return;
        };
        if session.state == SessionState::Ending {
            return;
        }

        debug!("♻️ Renewing capture session {}", session.token);
        session.state = SessionState::Ending;
        let token = session.token;
        self.recognizer.stop(token);
        // Escalate if the end event never shows up; flushes do not clear HardKill
        self.timers.arm(TimerKind::HardKill, self.timing.hard_kill);
    }

    fn flush(&mut self, reason: FlushReason) -> Option<String> {
        self.timers.cancel_many(&TimerKind::UTTERANCE);
        let text = self.buffer.take();

        // Still listening: keep the renewal clock relative to the session start
        if self.keep_alive {
            if let Some(session) = &self.current {
                if session.state != SessionState::Ending {
                    let remaining = self
                        .timing
                        .session_renewal
                        .saturating_sub(session.created_at.elapsed());
                    self.timers.arm(TimerKind::SessionRenewal, remaining);
                }
            }
        }

        match &text {
            Some(text) => {
                info!("📝 Utterance flushed ({:?}): '{}'", reason, text);
                self.notify(UiEvent::Transcript {
                    finalized: String::new(),
                    interim: String::new(),
                });
            }
            None => debug!("Flush ({:?}) with empty buffer", reason),
        }
        text
    }

    fn report_error(&mut self, kind: CaptureErrorKind) {
        if kind.is_ignorable() {
            debug!("Ignoring benign capture error: {:?}", kind);
            return;
        }
        warn!("🎙️ Capture error: {:?}", kind);
        if kind.blocks_restart() {
            self.keep_alive = false;
            self.timers.cancel(TimerKind::Restart);
        }
        self.notify(UiEvent::Notice(kind.user_message()));
    }

    /// Abort the current session and its timers, keeping the buffer
    fn teardown_session(&mut self) {
        if let Some(session) = self.current.take() {
            debug!("Tearing down capture session {}", session.token);
            self.recognizer.abort(session.token);
        }
        self.timers.cancel_many(&[
            TimerKind::Silence,
            TimerKind::SessionRenewal,
            TimerKind::HardKill,
            TimerKind::Restart,
        ]);
    }

    fn notify(&self, event: UiEvent) {
        let _ = self.ui.send(event);
    }
}
