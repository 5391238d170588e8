//! Utterance Buffer
//!
//! Accumulates finalized and interim fragments for the utterance in progress.

use super::Fragment;

/// Why the buffer was flushed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    Silence,
    MaxDuration,
    ManualStop,
    /// Stop fallback fired before the recognizer confirmed the end
    HardKill,
    /// The session ended on its own with no intent to keep listening
    SessionEnded,
}

#[derive(Debug, Default)]
pub struct UtteranceBuffer {
    finalized: String,
    interim: String,
}

impl UtteranceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one fragment-update event: finals append, interim text is replaced
    pub fn apply(&mut self, fragments: &[Fragment]) {
        let mut interim = String::new();
        for fragment in fragments {
            let text = fragment.text.trim();
            if fragment.is_final {
                if !text.is_empty() {
                    if !self.finalized.is_empty() {
                        self.finalized.push(' ');
                    }
                    self.finalized.push_str(text);
                }
            } else if !text.is_empty() {
                if !interim.is_empty() {
                    interim.push(' ');
                }
                interim.push_str(text);
            }
        }
        self.interim = interim;
    }

    pub fn finalized(&self) -> &str {
        &self.finalized
    }

    pub fn interim(&self) -> &str {
        &self.interim
    }

    pub fn is_empty(&self) -> bool {
        self.finalized.trim().is_empty() && self.interim.trim().is_empty()
    }

    /// Current finalized + interim text, whitespace-collapsed
    pub fn text(&self) -> String {
        self.finalized
            .split_whitespace()
            .chain(self.interim.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Take the utterance and clear both parts. `None` when there was nothing to send.
    pub fn take(&mut self) -> Option<String> {
        let text = self.text();
        self.finalized.clear();
        self.interim.clear();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finals_append_and_interim_replaces() {
        let mut buffer = UtteranceBuffer::new();
        buffer.apply(&[Fragment::final_text("I goed"), Fragment::interim("to the")]);
        assert_eq!(buffer.finalized(), "I goed");
        assert_eq!(buffer.interim(), "to the");

        buffer.apply(&[Fragment::final_text("to the store yesterday")]);
        assert_eq!(buffer.finalized(), "I goed to the store yesterday");
        assert_eq!(buffer.interim(), "");
    }

    #[test]
    fn test_take_includes_interim_and_clears() {
        let mut buffer = UtteranceBuffer::new();
        buffer.apply(&[Fragment::final_text("hello  "), Fragment::interim(" there ")]);
        assert_eq!(buffer.take(), Some("hello there".to_string()));
        assert!(buffer.is_empty());
        assert_eq!(buffer.finalized(), "");
        assert_eq!(buffer.interim(), "");
    }

    #[test]
    fn test_take_is_idempotent_on_empty() {
        let mut buffer = UtteranceBuffer::new();
        assert_eq!(buffer.take(), None);

        buffer.apply(&[Fragment::interim("   ")]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.take(), None);
        assert_eq!(buffer.take(), None);
    }
}
