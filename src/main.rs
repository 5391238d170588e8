//! SpeakUp - voice-first English speaking coach
//!
//! Console front end: wires config, logging, microphone, speakers and the
//! backend client into one `Coach` and feeds it stdin commands.

use anyhow::Result;
use clap::Parser;
use speakup::capture::wyoming::WyomingClient;
use speakup::capture::{NoCapture, Recognizer, WyomingRecognizer};
use speakup::coach::{Coach, CoachEvent, Command, Services};
use speakup::config::{CaptureMode, Config};
use speakup::playback::{AudioSink, PlaybackId, RodioSink};
use speakup::services::SpeakupClient;
use speakup::ui;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Backend base URL
    #[arg(long)]
    server: Option<String>,

    /// Only send an utterance on /stop (no silence auto-send)
    #[arg(long)]
    push_to_finish: bool,

    /// Coach voice id
    #[arg(long)]
    voice: Option<String>,

    /// Target proficiency level
    #[arg(long)]
    level: Option<String>,

    /// Conversation topic
    #[arg(long)]
    topic: Option<String>,

    /// No microphone or speakers; type your side of the conversation
    #[arg(long)]
    text_only: bool,
}

/// Sink used in text-only sessions; every playback fails immediately
struct Muted;

impl AudioSink for Muted {
    fn play(&mut self, _id: PlaybackId, _audio: Vec<u8>) -> speakup::error::CoachResult<()> {
        Err(speakup::error::CoachError::Playback(
            "audio is disabled in text-only mode".to_string(),
        ))
    }

    fn stop(&mut self) {}
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load()?;
    if let Some(server) = args.server {
        config.server_url = server;
    }
    if args.push_to_finish {
        config.capture_mode = CaptureMode::PushToFinish;
    }
    if args.voice.is_some() {
        config.voice_id = args.voice;
    }
    if let Some(level) = args.level {
        config.level = level;
    }
    if let Some(topic) = args.topic {
        config.topic = topic;
    }

    // Setup logging
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🗣️ SpeakUp v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("   server {} · level {} · topic '{}'", config.server_url, config.level, config.topic);

    let (events_tx, events_rx) = mpsc::unbounded_channel::<CoachEvent>();
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();

    let (recognizer, sink): (Box<dyn Recognizer>, Box<dyn AudioSink>) = if args.text_only {
        (Box::new(NoCapture), Box::new(Muted))
    } else {
        let asr = WyomingClient::new(&config.wyoming_host, config.wyoming_port);
        if !asr.health_check().await {
            warn!("🎙️ No speech recognizer at {}:{}, voice input will fail until it is up", config.wyoming_host, config.wyoming_port);
        }
        let recognizer = WyomingRecognizer::new(
            &config,
            events_tx.clone(),
            tokio::runtime::Handle::current(),
        );
        let sink: Box<dyn AudioSink> = match RodioSink::new(events_tx.clone()) {
            Ok(sink) => Box::new(sink),
            Err(e) => {
                warn!("🔇 Audio output unavailable, replies will be text only: {}", e);
                Box::new(Muted)
            }
        };
        (Box::new(recognizer), sink)
    };

    let services = Services::from_client(SpeakupClient::new(&config)?);
    let coach = Coach::new(&config, recognizer, sink, services, events_tx.clone(), ui_tx.clone());

    let renderer = tokio::spawn(ui::render(ui_rx));
    let _ = events_tx.send(CoachEvent::Command(Command::ListVoices));
    if !args.text_only {
        let _ = events_tx.send(CoachEvent::Command(Command::Listen));
    }

    println!("{}", ui::HELP);
    let commands = events_tx.clone();
    let ui_notices = ui_tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let command = match lines.next_line().await {
                Ok(Some(line)) => match ui::parse_line(&line) {
                    Ok(command) => command,
                    Err(help) => {
                        let _ = ui_notices.send(ui::UiEvent::Notice(help));
                        continue;
                    }
                },
                // stdin closed
                Ok(None) | Err(_) => Command::Quit,
            };
            let quit = command == Command::Quit;
            if commands.send(CoachEvent::Command(command)).is_err() || quit {
                break;
            }
        }
    });

    drop(ui_tx);
    coach.run(events_rx).await;
    renderer.abort();

    info!("👋 Goodbye");
    Ok(())
}
