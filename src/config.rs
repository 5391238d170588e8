use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How a finished utterance is detected
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Flush after a silence window with no new fragments
    #[default]
    Auto,
    /// Only flush on manual stop or the max-utterance safety cutoff
    PushToFinish,
}

impl std::str::FromStr for CaptureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(CaptureMode::Auto),
            "push" | "push_to_finish" | "push-to-finish" => Ok(CaptureMode::PushToFinish),
            other => Err(format!("unknown capture mode '{}'", other)),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Backend
    pub server_url: String,
    pub request_timeout_secs: u64,
    pub device_id: String,

    // Learner
    pub learner_name: String,
    pub level: String,
    pub topic: String,
    pub voice_id: Option<String>,

    // Capture
    pub capture_mode: CaptureMode,
    pub silence_ms: u64,
    pub max_utterance_secs: u64,
    pub session_renewal_secs: u64,
    pub restart_backoff_ms: u64,
    pub hard_kill_ms: u64,
    pub resume_delay_ms: u64,

    // Echo suppression
    pub echo_min_chars: usize,
    pub echo_overlap_ratio: f64,

    // Wyoming ASR
    pub wyoming_host: String,
    pub wyoming_port: u16,
    pub provider_session_secs: u64,
    pub speech_energy_threshold: f32,
    pub segment_silence_ms: u64,

    // Meta
    pub history_display_limit: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000".to_string(),
            request_timeout_secs: 30,
            device_id: String::new(),
            learner_name: "friend".to_string(),
            level: "B1".to_string(),
            topic: "free conversation".to_string(),
            voice_id: None,
            capture_mode: CaptureMode::Auto,
            silence_ms: 1800,
            max_utterance_secs: 120,
            session_renewal_secs: 50,
            restart_backoff_ms: 250,
            hard_kill_ms: 600,
            resume_delay_ms: 350,
            echo_min_chars: 6,
            echo_overlap_ratio: 0.7,
            wyoming_host: "localhost".to_string(),
            wyoming_port: 10300,
            provider_session_secs: 60,
            speech_energy_threshold: 500.0,
            segment_silence_ms: 700,
            history_display_limit: 12,
            log_level: "info".to_string(),
        }
    }
}

/// Timing knobs consumed by the capture and playback state machines
#[derive(Debug, Clone)]
pub struct TimingConfig {
    pub mode: CaptureMode,
    pub silence: Duration,
    pub max_utterance: Duration,
    pub session_renewal: Duration,
    pub restart_backoff: Duration,
    pub hard_kill: Duration,
    pub resume_delay: Duration,
    pub echo_min_chars: usize,
    pub echo_overlap_ratio: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Config::default().timing()
    }
}

impl Config {
    /// Load config from the default location, or create defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load config from `path`, falling back to defaults if it is missing or corrupt.
    /// A fresh device id is generated and persisted the first time.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("⚠️ Config file corrupted or invalid, using defaults: {}", e);
                    let backup_path = path.with_extension("json.corrupt");
                    let _ = std::fs::rename(path, &backup_path);
                    Self::default()
                }
            }
        } else {
            Self::default()
        };

        if config.device_id.is_empty() {
            config.device_id = generate_device_id();
            if let Err(e) = config.save_to(path) {
                tracing::warn!("⚠️ Could not persist device id: {}", e);
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn timing(&self) -> TimingConfig {
        TimingConfig {
            mode: self.capture_mode,
            silence: Duration::from_millis(self.silence_ms),
            max_utterance: Duration::from_secs(self.max_utterance_secs),
            session_renewal: Duration::from_secs(self.session_renewal_secs),
            restart_backoff: Duration::from_millis(self.restart_backoff_ms),
            hard_kill: Duration::from_millis(self.hard_kill_ms),
            resume_delay: Duration::from_millis(self.resume_delay_ms),
            echo_min_chars: self.echo_min_chars,
            echo_overlap_ratio: self.echo_overlap_ratio,
        }
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("speakup")
        .join("config.json")
}

fn generate_device_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
