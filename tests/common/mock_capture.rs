//! Mock capture and playback hardware
//!
//! Both record every call so tests can assert on the exact hardware traffic.

use speakup::capture::{Recognizer, SessionToken, StartError};
use speakup::error::{CoachError, CoachResult};
use speakup::playback::{AudioSink, PlaybackId};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerCall {
    Start(SessionToken),
    Stop(SessionToken),
    Abort(SessionToken),
}

/// Recognizer that records calls and never produces events on its own
#[derive(Debug, Clone, Default)]
pub struct MockRecognizer {
    pub calls: Arc<Mutex<Vec<RecognizerCall>>>,
    /// Reason code returned by the next `start`, if set
    pub fail_with: Arc<Mutex<Option<String>>>,
}

impl MockRecognizer {
    pub fn calls(&self) -> Vec<RecognizerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn starts(&self) -> Vec<SessionToken> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RecognizerCall::Start(token) => Some(token),
                _ => None,
            })
            .collect()
    }

    pub fn was_stopped(&self, token: SessionToken) -> bool {
        self.calls().contains(&RecognizerCall::Stop(token))
    }
}

impl Recognizer for MockRecognizer {
    fn start(&mut self, token: SessionToken) -> Result<(), StartError> {
        if let Some(reason) = self.fail_with.lock().unwrap().take() {
            return Err(StartError::Unavailable(reason));
        }
        self.calls.lock().unwrap().push(RecognizerCall::Start(token));
        Ok(())
    }

    fn stop(&mut self, token: SessionToken) {
        self.calls.lock().unwrap().push(RecognizerCall::Stop(token));
    }

    fn abort(&mut self, token: SessionToken) {
        self.calls.lock().unwrap().push(RecognizerCall::Abort(token));
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Play(PlaybackId, Vec<u8>),
    Stop,
}

/// Audio sink that records calls; tests drive its events by hand
#[derive(Debug, Clone, Default)]
pub struct MockSink {
    pub calls: Arc<Mutex<Vec<SinkCall>>>,
    pub should_fail: Arc<Mutex<bool>>,
}

impl MockSink {
    pub fn played(&self) -> Vec<(PlaybackId, Vec<u8>)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                SinkCall::Play(id, audio) => Some((*id, audio.clone())),
                SinkCall::Stop => None,
            })
            .collect()
    }
}

impl AudioSink for MockSink {
    fn play(&mut self, id: PlaybackId, audio: Vec<u8>) -> CoachResult<()> {
        if *self.should_fail.lock().unwrap() {
            return Err(CoachError::Playback("mock sink failure".to_string()));
        }
        self.calls.lock().unwrap().push(SinkCall::Play(id, audio));
        Ok(())
    }

    fn stop(&mut self) {
        self.calls.lock().unwrap().push(SinkCall::Stop);
    }
}
