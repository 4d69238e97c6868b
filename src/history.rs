//! C10 - Conversation Log (spec §4.10).
//!
//! A ring buffer of the last N message turns, persisted in shared storage so
//! the keyboard extension and the host process see the same history. The
//! buffer itself is append-only from here; `snapshot_with_current` returns a
//! *copy* with the live edit-field text appended, without mutating the
//! stored buffer (spec §8, S6).

use std::sync::Arc;

use crate::model::{ConversationTurn, Sender};
use crate::storage::{keys, SharedStore};

pub struct ConversationLog {
    store: Arc<dyn SharedStore>,
    capacity: usize,
}

impl ConversationLog {
    pub fn new(store: Arc<dyn SharedStore>, capacity: usize) -> Self {
        Self { store, capacity }
    }

    fn load(&self) -> Vec<ConversationTurn> {
        self.store
            .get(keys::CONVERSATION_HISTORY_BUFFER)
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    fn save(&self, turns: &[ConversationTurn]) {
        // Persisting is best-effort: a storage hiccup here degrades history
        // fidelity, not correctness of the live analysis path.
        let _ = self.store.set(keys::CONVERSATION_HISTORY_BUFFER, &turns);
    }

    /// Append a turn, dropping the oldest entry once the buffer is full.
    pub fn append(&self, turn: ConversationTurn) {
        let mut turns = self.load();
        turns.push(turn);
        if turns.len() > self.capacity {
            let drop = turns.len() - self.capacity;
            turns.drain(0..drop);
        }
        self.save(&turns);
    }

    /// Copy of the stored history, sorted by timestamp ascending, with the
    /// current (unsent) user text appended as a final turn if non-empty.
    /// Does not mutate the stored buffer.
    pub fn snapshot_with_current(&self, current_text: &str) -> Vec<ConversationTurn> {
        self.snapshot_with_current_at(current_text, current_timestamp())
    }

    pub fn snapshot_with_current_at(&self, current_text: &str, now: f64) -> Vec<ConversationTurn> {
        let mut turns = self.load();
        turns.sort_by(|a, b| a.ts.partial_cmp(&b.ts).unwrap_or(std::cmp::Ordering::Equal));

        if !current_text.trim().is_empty() {
            turns.push(ConversationTurn {
                sender: Sender::User,
                text: current_text.to_string(),
                ts: now,
            });
        }
        turns
    }

    pub fn len(&self) -> usize {
        self.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn current_timestamp() -> f64 {
    chrono::Utc::now().timestamp() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemorySharedStore;

    fn turn(text: &str, ts: f64) -> ConversationTurn {
        ConversationTurn {
            sender: Sender::User,
            text: text.to_string(),
            ts,
        }
    }

    #[test]
    fn append_then_snapshot_with_empty_current_yields_stored_turn_once() {
        let store = Arc::new(InMemorySharedStore::new());
        let log = ConversationLog::new(store, 20);
        log.append(turn("hello", 1.0));
        let snap = log.snapshot_with_current("");
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].text, "hello");
    }

    #[test]
    fn twenty_five_turns_cap_at_capacity_and_order_by_timestamp() {
        let store = Arc::new(InMemorySharedStore::new());
        let log = ConversationLog::new(store, 20);
        for i in 0..25 {
            log.append(turn(&format!("turn-{i}"), i as f64));
        }
        assert_eq!(log.len(), 20);
        let snap = log.snapshot_with_current("");
        assert_eq!(snap.len(), 20);
        assert_eq!(snap.first().unwrap().text, "turn-5");
        assert_eq!(snap.last().unwrap().text, "turn-24");
    }

    #[test]
    fn snapshot_with_current_text_adds_21st_entry_without_mutating_store() {
        let store = Arc::new(InMemorySharedStore::new());
        let log = ConversationLog::new(store, 20);
        for i in 0..25 {
            log.append(turn(&format!("turn-{i}"), i as f64));
        }
        let snap = log.snapshot_with_current_at("live text", 1000.0);
        assert_eq!(snap.len(), 21);
        assert_eq!(snap.last().unwrap().text, "live text");
        // stored buffer unaffected
        assert_eq!(log.len(), 20);
    }

    #[test]
    fn blank_current_text_is_not_appended() {
        let store = Arc::new(InMemorySharedStore::new());
        let log = ConversationLog::new(store, 20);
        log.append(turn("hi", 1.0));
        let snap = log.snapshot_with_current("   ");
        assert_eq!(snap.len(), 1);
    }
}
