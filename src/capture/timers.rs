//! Single-shot timers for the capture pipeline
//!
//! Each armed timer is a tokio task that posts `CoachEvent::Timer { kind, id }`
//! back into the coach loop. At most one timer per kind is pending; re-arming
//! aborts the previous task first, and a fire whose id is no longer pending is
//! dropped, so an abort that loses the race with a queued event is harmless.

use crate::coach::{CoachEvent, EventSender};
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// No new fragment within the silence window (auto mode only)
    Silence,
    /// Absolute utterance length safety net
    MaxUtterance,
    /// Cycle the session before the provider's own cap
    SessionRenewal,
    /// Stop fallback when the recognizer never confirms the end
    HardKill,
    /// Backoff before re-opening a session that ended under keep-alive
    Restart,
    /// Resume capture after synthesized speech finished
    ResumeCapture,
}

impl TimerKind {
    /// The timers cleared together on every flush
    pub const UTTERANCE: [TimerKind; 3] = [
        TimerKind::Silence,
        TimerKind::MaxUtterance,
        TimerKind::SessionRenewal,
    ];
}

struct Pending {
    id: u64,
    handle: JoinHandle<()>,
}

pub struct TimerSet {
    events: EventSender,
    next_id: u64,
    pending: HashMap<TimerKind, Pending>,
}

impl std::fmt::Debug for TimerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerSet")
            .field("armed", &self.pending.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TimerSet {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            next_id: 0,
            pending: HashMap::new(),
        }
    }

    /// Arm `kind` to fire after `after`, replacing any pending timer of that kind
    pub fn arm(&mut self, kind: TimerKind, after: Duration) -> u64 {
        self.cancel(kind);

        self.next_id += 1;
        let id = self.next_id;
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = events.send(CoachEvent::Timer { kind, id });
        });

        debug!("⏱️ Armed {:?} timer {} ({:?})", kind, id, after);
        self.pending.insert(kind, Pending { id, handle });
        id
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some(pending) = self.pending.remove(&kind) {
            pending.handle.abort();
        }
    }

    pub fn cancel_many(&mut self, kinds: &[TimerKind]) {
        for kind in kinds {
            self.cancel(*kind);
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.handle.abort();
        }
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.pending.contains_key(&kind)
    }

    /// Consume a fired timer. Returns false for cancelled or superseded fires.
    pub fn fire(&mut self, kind: TimerKind, id: u64) -> bool {
        match self.pending.get(&kind) {
            Some(pending) if pending.id == id => {
                self.pending.remove(&kind);
                true
            }
            _ => {
                debug!("Dropping stale {:?} timer {}", kind, id);
                false
            }
        }
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
