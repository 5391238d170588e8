//! Console presentation
//!
//! The coach never prints directly; it emits `UiEvent`s and a renderer task
//! turns them into terminal output.

use crate::coach::Command;
use crate::config::CaptureMode;
use crate::services::{Feedback, Role, Voice};
use crate::turn::ChatEntry;
use tokio::sync::mpsc;

pub type UiSender = mpsc::UnboundedSender<UiEvent>;

const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Listening(bool),
    /// Live transcript of the utterance in progress; both empty once flushed
    Transcript { finalized: String, interim: String },
    ModeChanged(CaptureMode),
    /// The learner's utterance was sent as a turn
    UserMessage(String),
    Thinking,
    Reply { text: String, persona: Option<String> },
    Feedback { utterance: String, feedback: Feedback },
    Speaking(bool),
    Voices { voices: Vec<Voice>, selected: Option<String> },
    /// The most recent conversation entries, oldest first
    History(Vec<ChatEntry>),
    /// Transient toast-style message
    Notice(String),
    /// A turn failed; shown inline in the conversation
    Error(String),
}

/// Render one event as console text. `None` for events with no visible output.
pub fn format_event(event: &UiEvent) -> Option<String> {
    match event {
        UiEvent::Listening(true) => Some("🎙️  listening...".to_string()),
        UiEvent::Listening(false) => Some("⏸️  not listening".to_string()),
        UiEvent::Transcript { finalized, interim } => {
            if finalized.is_empty() && interim.is_empty() {
                return None;
            }
            Some(format!("   … {} {}{}{}", finalized, DIM, interim, RESET))
        }
        UiEvent::ModeChanged(CaptureMode::Auto) => {
            Some("mode: auto (sends after a pause)".to_string())
        }
        UiEvent::ModeChanged(CaptureMode::PushToFinish) => {
            Some("mode: push-to-finish (/stop to send)".to_string())
        }
        UiEvent::UserMessage(text) => Some(format!("you> {}", text)),
        UiEvent::Thinking => Some(format!("{}coach is thinking...{}", DIM, RESET)),
        UiEvent::Reply { text, .. } => Some(format!("coach> {}", text)),
        UiEvent::Feedback { feedback, .. } => Some(format_feedback(feedback)),
        UiEvent::Speaking(_) => None,
        UiEvent::Voices { voices, selected } => {
            let lines: Vec<String> = voices
                .iter()
                .map(|v| {
                    let mark = if selected.as_deref() == Some(v.id.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    format!(" {} {:<22} {}", mark, v.id, v.label)
                })
                .collect();
            Some(format!("voices:\n{}", lines.join("\n")))
        }
        UiEvent::History(entries) if entries.is_empty() => {
            Some("history: nothing said yet".to_string())
        }
        UiEvent::History(entries) => {
            let lines: Vec<String> = entries
                .iter()
                .map(|e| {
                    let who = match e.role {
                        Role::User => "you",
                        Role::Assistant => "coach",
                    };
                    format!(" {}{}{} {}> {}", DIM, e.at.format("%H:%M"), RESET, who, e.content)
                })
                .collect();
            Some(format!("history:\n{}", lines.join("\n")))
        }
        UiEvent::Notice(message) => Some(format!("⚠️  {}", message)),
        UiEvent::Error(message) => Some(format!("❌ {}", message)),
    }
}

fn format_feedback(feedback: &Feedback) -> String {
    let mut out = String::from("📋 feedback");

    let scores: Vec<String> = feedback
        .scores()
        .iter()
        .map(|(name, score)| format!("{} {}", name, score))
        .collect();
    out.push_str(&format!("\n   {}", scores.join(" · ")));

    for c in &feedback.grammar.corrections {
        let mut line = format!("\n   ✏️  {} → {}", c.mistake, c.better);
        if !c.rule.is_empty() {
            line.push_str(&format!(" [{}]", c.rule));
        }
        if !c.explanation.is_empty() {
            line.push_str(&format!(": {}", c.explanation));
        }
        out.push_str(&line);
    }
    for s in &feedback.vocab.suggestions {
        out.push_str(&format!("\n   📚 {}", s));
    }
    if !feedback.overall_tip.is_empty() {
        out.push_str(&format!("\n   💡 {}", feedback.overall_tip));
    }
    out
}

pub const HELP: &str = "commands: /listen /stop /mode auto|push /voice ID /voices /preview ID /history /topic T /level L /quit (anything else is sent as text)";

/// Parse one console line into a command
pub fn parse_line(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        if line.is_empty() {
            return Err(HELP.to_string());
        }
        return Ok(Command::Submit(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let required = |what: &str| -> Result<String, String> {
        if arg.is_empty() {
            Err(format!("/{} needs {}", name, what))
        } else {
            Ok(arg.to_string())
        }
    };

    match name.to_lowercase().as_str() {
        "listen" | "l" => Ok(Command::Listen),
        "stop" | "s" => Ok(Command::Stop),
        "mode" => arg.parse::<CaptureMode>().map(Command::SetMode),
        "voice" => required("a voice id").map(Command::SetVoice),
        "voices" => Ok(Command::ListVoices),
        "history" | "h" => Ok(Command::ShowHistory),
        "preview" => required("a voice id").map(Command::PreviewVoice),
        "topic" => required("a topic").map(Command::SetTopic),
        "level" => required("a level").map(Command::SetLevel),
        "quit" | "q" | "exit" => Ok(Command::Quit),
        _ => Err(HELP.to_string()),
    }
}

/// Print events until the coach goes away
pub async fn render(mut events: mpsc::UnboundedReceiver<UiEvent>) {
    while let Some(event) = events.recv().await {
        if let Some(text) = format_event(&event) {
            println!("{}", text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::feedback::{Correction, Score};

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("/listen"), Ok(Command::Listen));
        assert_eq!(parse_line("  /stop "), Ok(Command::Stop));
        assert_eq!(
            parse_line("/mode push"),
            Ok(Command::SetMode(CaptureMode::PushToFinish))
        );
        assert_eq!(
            parse_line("/topic travel plans"),
            Ok(Command::SetTopic("travel plans".to_string()))
        );
        assert_eq!(
            parse_line("I goed to the store"),
            Ok(Command::Submit("I goed to the store".to_string()))
        );
        assert_eq!(parse_line("/history"), Ok(Command::ShowHistory));
        assert!(parse_line("/voice").is_err());
        assert!(parse_line("/mode sideways").is_err());
        assert!(parse_line("/dance").is_err());
        assert!(parse_line("   ").is_err());
    }

    #[test]
    fn test_cleared_transcript_is_silent() {
        let event = UiEvent::Transcript {
            finalized: String::new(),
            interim: String::new(),
        };
        assert_eq!(format_event(&event), None);
        assert_eq!(format_event(&UiEvent::Speaking(true)), None);
    }

    #[test]
    fn test_feedback_summary() {
        let mut feedback = Feedback::default();
        feedback.grammar.score = Score::Scored(6);
        feedback.grammar.corrections.push(Correction {
            mistake: "goed".to_string(),
            better: "went".to_string(),
            rule: "past tense".to_string(),
            ..Correction::default()
        });
        feedback.overall_tip = "Watch irregular verbs.".to_string();

        let text = format_event(&UiEvent::Feedback {
            utterance: "I goed".to_string(),
            feedback,
        })
        .unwrap();
        assert!(text.contains("grammar 6"));
        assert!(text.contains("pronunciation -"));
        assert!(text.contains("goed → went [past tense]"));
        assert!(text.contains("Watch irregular verbs."));
    }

    #[test]
    fn test_history_lists_speakers() {
        let mut history = crate::turn::ConversationHistory::new();
        history.push(Role::User, "I goed home");
        history.push(Role::Assistant, "You went home? Why?");

        let text = format_event(&UiEvent::History(history.entries().to_vec())).unwrap();
        assert!(text.contains("you> I goed home"));
        assert!(text.contains("coach> You went home? Why?"));
        assert_eq!(
            format_event(&UiEvent::History(Vec::new())),
            Some("history: nothing said yet".to_string())
        );
    }

    #[test]
    fn test_voice_list_marks_selection() {
        let text = format_event(&UiEvent::Voices {
            voices: Voice::fallback_catalog(),
            selected: Some("en-US-GuyNeural".to_string()),
        })
        .unwrap();
        assert!(text.contains("* en-US-GuyNeural"));
        assert!(text.contains("  en-US-AriaNeural"));
    }
}
