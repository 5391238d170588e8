//! End-to-end behaviour of the coach loop against mock hardware and services

use serde_json::json;
use speakup::capture::{CaptureEvent, Fragment, SessionState};
use speakup::coach::Command;
use speakup::config::CaptureMode;
use speakup::error::CoachError;
use speakup::playback::PlaybackEvent;
use speakup::services::{Feedback, Role};
use speakup::turn::TurnPhase;
use speakup::ui::UiEvent;
use std::time::Duration;

mod common;
use common::mock_capture::RecognizerCall;
use common::TestCoach;

#[tokio::test(start_paused = true)]
async fn test_manual_stop_sends_one_utterance() {
    let mut t = TestCoach::new(CaptureMode::Auto);
    t.command(Command::Listen);
    t.capture(CaptureEvent::Started);

    t.fragments(vec![Fragment::final_text("I goed"), Fragment::interim("to the")]);
    t.fragments(vec![Fragment::final_text("to the store yesterday")]);

    t.command(Command::Stop);
    t.capture(CaptureEvent::Ended);
    t.settle().await;

    assert_eq!(t.replies.utterances(), vec!["I goed to the store yesterday"]);

    // Nothing left to flush afterwards
    t.advance(Duration::from_secs(5)).await;
    assert_eq!(t.replies.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_session_events_change_nothing() {
    let mut t = TestCoach::new(CaptureMode::Auto);
    t.command(Command::Listen);
    let old = t.token();

    // Provider ends the session under keep-alive; a new one replaces it
    t.capture(CaptureEvent::Ended);
    t.advance(Duration::from_millis(300)).await;
    let current = t.token();
    assert!(current > old);
    t.drain_ui();

    for _ in 0..3 {
        t.capture_as(old, CaptureEvent::Fragments(vec![Fragment::final_text("ghost")]));
    }
    t.capture_as(old, CaptureEvent::Error { reason: "not-allowed".to_string() });
    t.capture_as(old, CaptureEvent::Ended);

    assert!(t.coach.capture().buffer().is_empty());
    assert!(t.coach.capture().keep_alive());
    assert_eq!(t.coach.capture().current_token(), Some(current));
    assert!(t.drain_ui().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_empty_flush_never_calls_reply_service() {
    let mut t = TestCoach::new(CaptureMode::Auto);

    // Stop with no session at all
    t.command(Command::Stop);
    // Stop of a silent session
    t.command(Command::Listen);
    t.command(Command::Stop);
    t.capture(CaptureEvent::Ended);
    // Interim-only whitespace
    t.command(Command::Listen);
    t.fragments(vec![Fragment::interim("   ")]);
    t.advance(Duration::from_secs(3)).await;

    assert!(t.replies.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_silence_sends_utterance_in_auto_mode() {
    let mut t = TestCoach::new(CaptureMode::Auto);
    t.command(Command::Listen);
    t.fragments(vec![Fragment::final_text("I like cooking")]);

    t.advance(Duration::from_millis(1000)).await;
    assert!(t.replies.requests().is_empty());

    t.advance(Duration::from_millis(1000)).await;
    assert_eq!(t.replies.utterances(), vec!["I like cooking"]);
    // Capture keeps running for the next utterance
    assert!(t.coach.capture().current_token().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_push_to_finish_ignores_silence() {
    let mut t = TestCoach::new(CaptureMode::PushToFinish);
    t.command(Command::Listen);
    t.fragments(vec![Fragment::final_text("let me think")]);

    t.advance(Duration::from_secs(10)).await;
    assert!(t.replies.requests().is_empty());

    t.command(Command::Stop);
    t.capture(CaptureEvent::Ended);
    t.settle().await;
    assert_eq!(t.replies.utterances(), vec!["let me think"]);
}

#[tokio::test(start_paused = true)]
async fn test_hard_kill_when_end_never_arrives() {
    let mut t = TestCoach::new(CaptureMode::PushToFinish);
    t.command(Command::Listen);
    let token = t.token();
    t.fragments(vec![Fragment::final_text("hello are you there")]);

    t.command(Command::Stop);
    t.advance(Duration::from_millis(300)).await;
    assert!(t.replies.requests().is_empty());

    t.advance(Duration::from_millis(400)).await;
    assert_eq!(t.replies.utterances(), vec!["hello are you there"]);
    assert_eq!(t.coach.capture().current_token(), None);
    assert!(t.recognizer.calls().contains(&RecognizerCall::Abort(token)));

    // The late end event is stale and must not send again
    t.capture_as(token, CaptureEvent::Ended);
    t.advance(Duration::from_secs(2)).await;
    assert_eq!(t.replies.requests().len(), 1);

    // Still recoverable with a fresh start
    t.command(Command::Listen);
    assert!(t.token() > token);
}

#[tokio::test(start_paused = true)]
async fn test_renewal_keeps_speech_across_sessions() {
    let mut t = TestCoach::new(CaptureMode::PushToFinish);
    t.command(Command::Listen);
    let first = t.token();
    t.fragments(vec![Fragment::final_text("when I was")]);

    t.advance(Duration::from_secs(50)).await;
    assert!(t.recognizer.was_stopped(first));
    assert_eq!(t.coach.capture().session_state(), Some(SessionState::Ending));
    t.capture_as(first, CaptureEvent::Ended);
    t.advance(Duration::from_millis(300)).await;

    let second = t.token();
    assert!(second > first);
    t.fragments(vec![Fragment::final_text("a child")]);
    t.command(Command::Stop);
    t.capture(CaptureEvent::Ended);
    t.settle().await;

    assert_eq!(t.replies.utterances(), vec!["when I was a child"]);
}

#[tokio::test(start_paused = true)]
async fn test_playback_pauses_and_resumes_capture() {
    let mut t = TestCoach::new(CaptureMode::Auto);
    t.replies.push_ok("What did you buy?", Some(vec![1, 2, 3]));

    t.command(Command::Listen);
    let first = t.token();
    t.fragments(vec![Fragment::final_text("I went shopping")]);
    t.advance(Duration::from_secs(2)).await;

    let played = t.sink.played();
    assert_eq!(played.len(), 1);
    let (id, audio) = played[0].clone();
    assert_eq!(audio, vec![1, 2, 3]);
    assert_eq!(t.coach.playback().state().last_reply, "What did you buy?");

    t.playback(id, PlaybackEvent::Started);
    assert!(t.coach.playback().state().playing);
    assert!(t.recognizer.was_stopped(first));

    // The coach hears itself; none of it may land in the buffer
    t.fragments(vec![Fragment::final_text("what did you buy")]);
    t.fragments(vec![Fragment::interim("completely unrelated words here")]);
    t.fragments(vec![Fragment::final_text("more noise")]);
    assert!(t.coach.capture().buffer().is_empty());

    t.capture(CaptureEvent::Ended);
    t.playback(id, PlaybackEvent::Ended);
    t.advance(Duration::from_millis(400)).await;

    let starts = t.recognizer.starts();
    assert_eq!(starts.len(), 2);
    assert!(starts[1] > first);
    assert_eq!(t.replies.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_playback_does_not_resume_idle_capture() {
    let mut t = TestCoach::new(CaptureMode::Auto);
    t.replies.push_ok("Hello again!", Some(vec![9]));

    t.command(Command::Submit("hello".to_string()));
    t.settle().await;

    let (id, _) = t.sink.played()[0].clone();
    t.playback(id, PlaybackEvent::Started);
    t.playback(id, PlaybackEvent::Ended);
    t.advance(Duration::from_secs(1)).await;

    assert!(t.recognizer.starts().is_empty());
    assert!(!t.coach.capture().is_capturing());
}

#[tokio::test(start_paused = true)]
async fn test_history_is_sent_back_unmodified() {
    let mut t = TestCoach::new(CaptureMode::Auto);
    t.replies.push_ok("Nice. What else?", None);

    t.command(Command::Submit("I goed to the store, \"yesterday\"".to_string()));
    t.settle().await;
    t.command(Command::Submit("I buyed apples".to_string()));
    t.settle().await;

    let requests = t.replies.requests();
    assert_eq!(requests.len(), 2);
    let second = &requests[1].messages;
    assert_eq!(second.len(), 3);
    assert_eq!(second[0].role, Role::User);
    assert_eq!(second[0].content, "I goed to the store, \"yesterday\"");
    assert_eq!(second[1].content, "Nice. What else?");
    assert_eq!(second[2].content, "I buyed apples");
    assert_eq!(requests[1].topic, "shopping");
    assert_eq!(requests[1].level, "B1");
    assert_eq!(requests[1].user, "Sam");
}

#[tokio::test(start_paused = true)]
async fn test_feedback_uses_utterance_and_context() {
    let mut t = TestCoach::new(CaptureMode::Auto);
    t.replies.push_ok("Hi Sam! What did you do today?", None);
    t.replies.push_ok("Sounds fun.", None);

    t.command(Command::Submit("hello".to_string()));
    t.settle().await;
    t.command(Command::Submit("I goed to the park".to_string()));
    t.settle().await;

    let requests = t.feedback.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].transcript, "I goed to the park");
    assert_eq!(
        requests[1].context.last_assistant,
        "Hi Sam! What did you do today?"
    );
    assert_eq!(requests[1].context.level, "B1");
    assert_eq!(requests[1].context.topic, "shopping");
    assert!(!requests[1].context.recent.is_empty());
    assert_eq!(t.coach.turns().phase(), TurnPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_reply_failure_is_shown_verbatim() {
    let mut t = TestCoach::new(CaptureMode::Auto);
    t.replies.push_err("Groq API key missing");

    t.command(Command::Submit("hello".to_string()));
    t.settle().await;

    let ui = t.drain_ui();
    assert!(ui.contains(&UiEvent::Error("Groq API key missing".to_string())));
    assert!(t.feedback.requests().is_empty());
    assert!(t.sink.played().is_empty());

    let history = t.coach.turns().history();
    assert_eq!(history.len(), 1);
    assert_eq!(history.entries()[0].role, Role::User);
    assert_eq!(t.coach.turns().phase(), TurnPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_feedback_failure_is_isolated() {
    let mut t = TestCoach::new(CaptureMode::Auto);
    t.replies.push_ok("Good answer!", None);
    t.feedback
        .push(Err(CoachError::Service("Feedback error: timeout".to_string())));

    t.command(Command::Submit("I am agree".to_string()));
    t.settle().await;

    let ui = t.drain_ui();
    assert!(ui.contains(&UiEvent::Reply {
        text: "Good answer!".to_string(),
        persona: None
    }));
    assert!(ui.iter().any(|e| matches!(e, UiEvent::Notice(m) if m.contains("Feedback error: timeout"))));
    assert_eq!(t.coach.turns().history().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_feedback_still_renders() {
    let mut t = TestCoach::new(CaptureMode::Auto);
    t.feedback.push(Ok(Feedback::normalize(&json!({
        "fluency": {"score": "8"},
        "vocab": {"suggestions": [{"word": "purchase"}]}
    }))));

    t.command(Command::Submit("I buyed it".to_string()));
    t.settle().await;

    let feedback = t
        .drain_ui()
        .into_iter()
        .find_map(|e| match e {
            UiEvent::Feedback { feedback, .. } => Some(feedback),
            _ => None,
        })
        .expect("feedback event");
    assert!(feedback.grammar.corrections.is_empty());
    assert_eq!(feedback.grammar.tip, "");
    assert_eq!(feedback.vocab.suggestions, vec!["purchase"]);
}

#[tokio::test(start_paused = true)]
async fn test_utterances_queue_behind_pending_reply() {
    let mut t = TestCoach::new(CaptureMode::Auto);
    t.replies.push_ok("First reply", None);
    t.replies.push_ok("Second reply", None);

    t.command(Command::Submit("first".to_string()));
    t.command(Command::Submit("second".to_string()));
    assert_eq!(t.coach.turns().queued(), 1);
    assert_eq!(t.coach.turns().phase(), TurnPhase::AwaitingReply);

    t.settle().await;

    let requests = t.replies.requests();
    assert_eq!(requests.len(), 2);
    let contents: Vec<&str> = requests[1]
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(contents, vec!["first", "First reply", "second"]);
}

#[tokio::test(start_paused = true)]
async fn test_permission_error_stops_restarts() {
    let mut t = TestCoach::new(CaptureMode::Auto);
    t.command(Command::Listen);
    t.drain_ui();

    t.capture(CaptureEvent::Error {
        reason: "not-allowed".to_string(),
    });
    t.capture(CaptureEvent::Ended);
    t.advance(Duration::from_secs(1)).await;

    assert_eq!(t.recognizer.starts().len(), 1);
    assert!(!t.coach.capture().is_capturing());
    assert!(t
        .drain_ui()
        .contains(&UiEvent::Notice("Microphone permission denied.".to_string())));
}

#[tokio::test(start_paused = true)]
async fn test_missing_microphone_is_reported() {
    let mut t = TestCoach::new(CaptureMode::Auto);
    *t.recognizer.fail_with.lock().unwrap() = Some("audio-capture".to_string());

    t.command(Command::Listen);

    assert!(!t.coach.capture().is_capturing());
    assert!(t.drain_ui().iter().any(|e| matches!(e, UiEvent::Notice(m) if m.contains("microphone"))));
}

#[tokio::test(start_paused = true)]
async fn test_voice_commands() {
    let mut t = TestCoach::new(CaptureMode::Auto);
    t.command(Command::ListVoices);
    t.settle().await;
    assert!(t
        .drain_ui()
        .iter()
        .any(|e| matches!(e, UiEvent::Voices { voices, .. } if voices.len() == 2)));

    t.command(Command::SetVoice("en-US-GuyNeural".to_string()));
    assert_eq!(
        t.coach.turns().settings().voice_id.as_deref(),
        Some("en-US-GuyNeural")
    );
    t.command(Command::SetVoice("xx-Nobody".to_string()));
    assert_eq!(
        t.coach.turns().settings().voice_id.as_deref(),
        Some("en-US-GuyNeural")
    );

    t.command(Command::PreviewVoice("en-US-AriaNeural".to_string()));
    t.settle().await;
    assert_eq!(*t.voices.previews.lock().unwrap(), vec!["en-US-AriaNeural"]);
    assert_eq!(t.sink.played().last().map(|(_, a)| a.clone()), Some(vec![0xAA, 0xBB]));
}

#[tokio::test(start_paused = true)]
async fn test_quit_tears_everything_down() {
    let mut t = TestCoach::new(CaptureMode::Auto);
    t.command(Command::Listen);
    let token = t.token();
    t.fragments(vec![Fragment::final_text("unfinished thought")]);

    assert!(!t.command(Command::Quit));
    t.coach.teardown();

    assert!(t.recognizer.calls().contains(&RecognizerCall::Abort(token)));
    assert!(!t.coach.capture().is_capturing());
    assert!(t.coach.capture().buffer().is_empty());
    t.advance(Duration::from_secs(5)).await;
    assert!(t.replies.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_listen_before_stop_confirms_sends_utterance() {
    let mut t = TestCoach::new(CaptureMode::PushToFinish);
    t.command(Command::Listen);
    let old = t.token();
    t.capture(CaptureEvent::Started);
    t.fragments(vec![Fragment::final_text("first thought done")]);

    t.command(Command::Stop);
    t.command(Command::Listen);
    t.capture_as(old, CaptureEvent::Ended);
    t.advance(Duration::from_secs(2)).await;

    assert_eq!(t.replies.utterances(), vec!["first thought done"]);
    assert!(t.coach.capture().buffer().is_empty());
    assert!(t.token() > old);
}

#[tokio::test(start_paused = true)]
async fn test_listen_after_stop_opens_new_session() {
    let mut t = TestCoach::new(CaptureMode::PushToFinish);
    t.command(Command::Listen);
    let old = t.token();

    t.command(Command::Stop);
    t.command(Command::Listen);
    t.advance(Duration::from_secs(10)).await;

    assert!(t.token() > old);
    assert_ne!(t.coach.capture().session_state(), Some(SessionState::Ending));
    assert!(t.recognizer.calls().contains(&RecognizerCall::Abort(old)));

    t.capture_as(old, CaptureEvent::Fragments(vec![Fragment::final_text("hello there")]));
    assert!(t.coach.capture().buffer().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_playback_does_not_reopen_stopped_capture() {
    let mut t = TestCoach::new(CaptureMode::Auto);
    t.replies.push_ok("Sure, go ahead.", Some(vec![5]));

    t.command(Command::Listen);
    let token = t.token();
    // Stopped, but the end event has not arrived yet
    t.command(Command::Stop);
    t.command(Command::Submit("can you help me".to_string()));
    t.settle().await;

    let (id, _) = t.sink.played()[0].clone();
    t.playback(id, PlaybackEvent::Started);
    assert!(!t.coach.playback().state().resume_pending);

    t.capture_as(token, CaptureEvent::Ended);
    t.playback(id, PlaybackEvent::Ended);
    t.advance(Duration::from_secs(1)).await;

    assert_eq!(t.recognizer.starts(), vec![token]);
    assert!(!t.coach.capture().keep_alive());
    assert_eq!(t.coach.capture().current_token(), None);
}

#[tokio::test(start_paused = true)]
async fn test_feedback_context_excludes_queued_turn() {
    let mut t = TestCoach::new(CaptureMode::Auto);
    t.replies.push_ok("First reply", None);
    t.replies.push_ok("Second reply", None);

    t.command(Command::Submit("first".to_string()));
    t.command(Command::Submit("second".to_string()));
    t.settle().await;

    let requests = t.feedback.requests();
    assert_eq!(requests.len(), 2);
    let recent: Vec<&str> = requests[0]
        .context
        .recent
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(recent, vec!["first", "First reply"]);
}

#[tokio::test(start_paused = true)]
async fn test_history_command_shows_recent_entries() {
    let mut t = TestCoach::new(CaptureMode::Auto);
    for i in 0..7 {
        t.command(Command::Submit(format!("sentence {}", i)));
        t.settle().await;
    }
    t.drain_ui();

    t.command(Command::ShowHistory);
    let entries = t
        .drain_ui()
        .into_iter()
        .find_map(|e| match e {
            UiEvent::History(entries) => Some(entries),
            _ => None,
        })
        .expect("history event");

    // Fourteen entries logged, twelve shown, the log itself untouched
    assert_eq!(entries.len(), 12);
    assert_eq!(entries[0].content, "sentence 1");
    assert_eq!(entries[11].content, "Tell me more.");
    assert_eq!(entries[10].content, "sentence 6");
    assert_eq!(t.coach.turns().history().len(), 14);
}
