//! Wyoming Recognizer
//!
//! Capture hardware backed by the local microphone (cpal) and an external
//! Wyoming ASR server. Wyoming is a simple protocol where events are JSON lines
//! over TCP.
//!
//! Each session runs on its own thread: the cpal input stream feeds an energy
//! gate, every speech segment is transcribed and posted as a final fragment.
//!
//! Reference: https://github.com/rhasspy/wyoming

use super::{CaptureEvent, Fragment, Recognizer, SessionToken, StartError};
use crate::coach::{CoachEvent, EventSender};
use crate::config::Config;
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

const SAMPLE_RATE: u32 = 16000;
const CHUNK_SIZE: usize = 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const TRANSCRIPT_TIMEOUT: Duration = Duration::from_secs(30);

/// RMS energy of a chunk, used as a cheap voice activity gate
pub fn calculate_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum: i64 = samples.iter().map(|&s| (s as i64).pow(2)).sum();
    (sum as f32 / samples.len() as f32).sqrt()
}

/// Wyoming client for ASR services
#[derive(Debug, Clone)]
pub struct WyomingClient {
    host: String,
    port: u16,
    sample_rate: u32,
}

impl WyomingClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            sample_rate: SAMPLE_RATE,
        }
    }

    /// Check if the server is available
    pub async fn health_check(&self) -> bool {
        match TcpStream::connect((&*self.host, self.port)).await {
            Ok(_) => {
                debug!("Wyoming server available at {}:{}", self.host, self.port);
                true
            }
            Err(e) => {
                warn!("Wyoming server not available: {}", e);
                false
            }
        }
    }

    /// Send one block of 16-bit mono PCM and wait for its transcript
    pub async fn transcribe(&self, samples: &[i16]) -> Result<String> {
        let stream = TcpStream::connect((&*self.host, self.port))
            .await
            .context("Failed to connect to Wyoming server")?;

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let audio: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let format = serde_json::json!({
            "rate": self.sample_rate,
            "width": 2,
            "channels": 1
        });

        let mut chunk = format.clone();
        chunk["audio"] = serde_json::Value::String(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            &audio,
        ));
        chunk["timestamp"] = serde_json::json!(0);

        let events = [
            serde_json::json!({"type": "audio-start", "data": format}),
            serde_json::json!({"type": "audio-chunk", "data": chunk}),
            serde_json::json!({"type": "audio-stop"}),
        ];
        for event in events {
            writer.write_all(event.to_string().as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
        writer.flush().await?;

        debug!("Sent {} bytes of audio, waiting for transcript...", audio.len());

        let transcript = tokio::time::timeout(TRANSCRIPT_TIMEOUT, async {
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).await? == 0 {
                    break;
                }
                if let Some(text) = parse_transcript(&line) {
                    return Ok::<_, anyhow::Error>(text);
                }
            }
            Ok(String::new())
        })
        .await
        .context("Timeout waiting for transcript")??;

        info!("📝 Wyoming transcript: '{}'", transcript);
        Ok(transcript)
    }
}

/// Extract the text of a `transcript` event line, if it is one
fn parse_transcript(line: &str) -> Option<String> {
    let event: serde_json::Value = serde_json::from_str(line).ok()?;
    if event.get("type").and_then(|t| t.as_str()) != Some("transcript") {
        return None;
    }
    event
        .get("data")?
        .get("text")?
        .as_str()
        .map(|t| t.trim().to_string())
}

struct ActiveSession {
    token: SessionToken,
    stop: Arc<AtomicBool>,
    abort: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Microphone + Wyoming capture hardware
pub struct WyomingRecognizer {
    client: WyomingClient,
    events: EventSender,
    runtime: Handle,
    provider_session: Duration,
    energy_threshold: f32,
    segment_silence: Duration,
    active: Option<ActiveSession>,
}

impl WyomingRecognizer {
    pub fn new(config: &Config, events: EventSender, runtime: Handle) -> Self {
        Self {
            client: WyomingClient::new(&config.wyoming_host, config.wyoming_port),
            events,
            runtime,
            provider_session: Duration::from_secs(config.provider_session_secs),
            energy_threshold: config.speech_energy_threshold,
            segment_silence: Duration::from_millis(config.segment_silence_ms),
            active: None,
        }
    }

    fn signal(&mut self, token: SessionToken, abort: bool) {
        let Some(active) = &self.active else {
            return;
        };
        if active.token != token {
            return;
        }
        if abort {
            active.abort.store(true, Ordering::SeqCst);
            self.active = None;
        } else {
            active.stop.store(true, Ordering::SeqCst);
        }
    }
}

impl Recognizer for WyomingRecognizer {
    fn start(&mut self, token: SessionToken) -> Result<(), StartError> {
        if let Some(active) = &self.active {
            if active.token == token && !active.thread.is_finished() {
                return Err(StartError::AlreadyStarted);
            }
        }

        if cpal::default_host().default_input_device().is_none() {
            return Err(StartError::Unavailable("audio-capture".to_string()));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let abort = Arc::new(AtomicBool::new(false));
        let worker = SessionWorker {
            token,
            client: self.client.clone(),
            events: self.events.clone(),
            runtime: self.runtime.clone(),
            provider_session: self.provider_session,
            energy_threshold: self.energy_threshold,
            segment_silence: self.segment_silence,
            stop: stop.clone(),
            abort: abort.clone(),
        };

        let thread = std::thread::Builder::new()
            .name(format!("capture-{}", token.0))
            .spawn(move || worker.run())
            .map_err(|e| StartError::Unavailable(format!("thread: {}", e)))?;

        self.active = Some(ActiveSession {
            token,
            stop,
            abort,
            thread,
        });
        Ok(())
    }

    fn stop(&mut self, token: SessionToken) {
        self.signal(token, false);
    }

    fn abort(&mut self, token: SessionToken) {
        self.signal(token, true);
    }

    fn name(&self) -> &str {
        "wyoming"
    }
}

impl Drop for WyomingRecognizer {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.abort.store(true, Ordering::SeqCst);
        }
    }
}

/// One capture session, run to completion on its own thread
struct SessionWorker {
    token: SessionToken,
    client: WyomingClient,
    events: EventSender,
    runtime: Handle,
    provider_session: Duration,
    energy_threshold: f32,
    segment_silence: Duration,
    stop: Arc<AtomicBool>,
    abort: Arc<AtomicBool>,
}

impl SessionWorker {
    fn run(self) {
        let (tx, rx) = mpsc::channel::<Vec<i16>>();

        // The stream is !Send, so it lives and dies on this thread
        let stream = match open_input(tx) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("❌ Could not open microphone: {:#}", e);
                self.emit(CaptureEvent::Error {
                    reason: "audio-capture".to_string(),
                });
                self.emit(CaptureEvent::Ended);
                return;
            }
        };

        info!("🎤 Capture {} listening", self.token);
        self.emit(CaptureEvent::Started);

        let opened = Instant::now();
        let mut segment: Vec<i16> = Vec::new();
        let mut last_voice: Option<Instant> = None;

        loop {
            if self.abort.load(Ordering::SeqCst) {
                debug!("Capture {} aborted", self.token);
                return;
            }
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            if opened.elapsed() >= self.provider_session {
                debug!("Capture {} reached its session limit", self.token);
                break;
            }

            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(chunk) => {
                    if calculate_energy(&chunk) >= self.energy_threshold {
                        last_voice = Some(Instant::now());
                    }
                    if last_voice.is_some() {
                        segment.extend_from_slice(&chunk);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.emit(CaptureEvent::Error {
                        reason: "audio-capture".to_string(),
                    });
                    break;
                }
            }

            if let Some(at) = last_voice {
                if at.elapsed() >= self.segment_silence {
                    self.transcribe(std::mem::take(&mut segment));
                    last_voice = None;
                }
            }
        }

        drop(stream);
        // Graceful end: what was already said still counts
        if !segment.is_empty() {
            self.transcribe(segment);
        }
        if !self.abort.load(Ordering::SeqCst) {
            self.emit(CaptureEvent::Ended);
        }
    }

    fn transcribe(&self, samples: Vec<i16>) {
        if samples.is_empty() {
            return;
        }
        match self.runtime.block_on(self.client.transcribe(&samples)) {
            Ok(text) if !text.is_empty() => {
                self.emit(CaptureEvent::Fragments(vec![Fragment::final_text(&text)]));
            }
            Ok(_) => self.emit(CaptureEvent::Error {
                reason: "no-speech".to_string(),
            }),
            Err(e) => {
                warn!("Wyoming transcription failed: {:#}", e);
                self.emit(CaptureEvent::Error {
                    reason: "network".to_string(),
                });
            }
        }
    }

    fn emit(&self, event: CaptureEvent) {
        if self.abort.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.events.send(CoachEvent::Capture {
            token: self.token,
            event,
        });
    }
}

fn open_input(tx: mpsc::Sender<Vec<i16>>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .context("No default input device")?;

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    debug!("Using audio device: {}", device_name);

    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Fixed(CHUNK_SIZE as u32),
    };

    let stream = device.build_input_stream(
        &config,
        move |data: &[i16], _: &cpal::InputCallbackInfo| {
            let _ = tx.send(data.to_vec());
        },
        |err| {
            warn!("Audio stream error: {}", err);
        },
        None,
    )?;
    stream.play()?;
    Ok(stream)
}
