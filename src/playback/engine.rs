//! Rodio playback sink
//!
//! Uses a channel-based architecture to handle rodio's non-Send stream.
//! A dedicated audio thread owns the output stream and one reusable Sink,
//! and reports start/end/failure back into the coach loop.

use super::{AudioSink, PlaybackEvent, PlaybackId};
use crate::coach::{CoachEvent, EventSender};
use crate::error::{CoachError, CoachResult};
use std::io::Cursor;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const DRAIN_POLL: Duration = Duration::from_millis(50);

/// Commands sent to the audio thread
enum AudioCommand {
    Play(PlaybackId, Vec<u8>),
    Stop,
}

/// Thread-safe handle to the audio thread
pub struct RodioSink {
    sender: mpsc::Sender<AudioCommand>,
}

impl std::fmt::Debug for RodioSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RodioSink").finish()
    }
}

impl RodioSink {
    pub fn new(events: EventSender) -> CoachResult<Self> {
        let (sender, receiver) = mpsc::channel::<AudioCommand>();

        thread::Builder::new()
            .name("audio-out".to_string())
            .spawn(move || Self::audio_thread(receiver, events))?;

        Ok(Self { sender })
    }

    fn audio_thread(receiver: mpsc::Receiver<AudioCommand>, events: EventSender) {
        use rodio::{Decoder, OutputStream, Sink};

        let emit = |id: PlaybackId, event: PlaybackEvent| {
            let _ = events.send(CoachEvent::Playback { id, event });
        };

        // Initialize audio output on this thread
        let (_stream, stream_handle) = match OutputStream::try_default() {
            Ok(s) => s,
            Err(e) => {
                warn!("🔇 Failed to initialize audio output: {}", e);
                // Keep answering so every play still ends
                while let Ok(cmd) = receiver.recv() {
                    if let AudioCommand::Play(id, _) = cmd {
                        emit(id, PlaybackEvent::Failed("no audio output".to_string()));
                    }
                }
                return;
            }
        };

        let mut sink = match Sink::try_new(&stream_handle) {
            Ok(s) => s,
            Err(e) => {
                error!("❌ Failed to create audio sink: {}", e);
                return;
            }
        };
        let mut current: Option<PlaybackId> = None;

        info!("🔊 Audio thread started");

        loop {
            match receiver.recv_timeout(DRAIN_POLL) {
                Ok(AudioCommand::Play(id, bytes)) => {
                    Self::reset(&mut sink, &stream_handle);
                    current = None;
                    match Decoder::new(Cursor::new(bytes)) {
                        Ok(source) => {
                            sink.append(source);
                            sink.play();
                            current = Some(id);
                            emit(id, PlaybackEvent::Started);
                        }
                        Err(e) => emit(id, PlaybackEvent::Failed(e.to_string())),
                    }
                }
                Ok(AudioCommand::Stop) => {
                    Self::reset(&mut sink, &stream_handle);
                    current = None;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if let Some(id) = current {
                        if sink.empty() {
                            current = None;
                            emit(id, PlaybackEvent::Ended);
                        }
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        info!("🔇 Audio thread stopped");
    }

    /// A stopped sink stays unusable, so swap in a fresh one
    fn reset(sink: &mut rodio::Sink, handle: &rodio::OutputStreamHandle) {
        sink.stop();
        match rodio::Sink::try_new(handle) {
            Ok(fresh) => *sink = fresh,
            Err(e) => debug!("Could not recreate sink: {}", e),
        }
    }
}

impl AudioSink for RodioSink {
    fn play(&mut self, id: PlaybackId, audio: Vec<u8>) -> CoachResult<()> {
        self.sender
            .send(AudioCommand::Play(id, audio))
            .map_err(|e| CoachError::Playback(format!("Audio thread disconnected: {}", e)))
    }

    fn stop(&mut self) {
        let _ = self.sender.send(AudioCommand::Stop);
    }
}
