use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use stratus_core::streaming::PendingQuestion;
use stratus_core::StreamingState;
use tokio::sync::watch;

use crate::error::StoreError;

struct Entry {
    tx: watch::Sender<StreamingState>,
}

/// In-memory live-stream state store (§4.1). Stands in for the reactive
/// document store's subscription primitive named out of scope in §1: a
/// `tokio::sync::watch` channel per session pushes every mutation to
/// subscribers, mirroring "clients subscribe to the row and observe every
/// change."
#[derive(Clone, Default)]
pub struct LiveStreamStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl LiveStreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `start`: upsert a fresh row, overwriting any prior one.
    pub fn start(&self, session_id: &str) {
        let state = StreamingState::start(session_id.to_string());
        let mut map = self.entries.lock();
        match map.get(session_id) {
            Some(entry) => {
                let _ = entry.tx.send(state);
            }
            None => {
                let (tx, _rx) = watch::channel(state);
                map.insert(session_id.to_string(), Entry { tx });
            }
        }
    }

    pub fn subscribe(&self, session_id: &str) -> Option<watch::Receiver<StreamingState>> {
        self.entries.lock().get(session_id).map(|e| e.tx.subscribe())
    }

    pub fn get(&self, session_id: &str) -> Option<StreamingState> {
        self.entries
            .lock()
            .get(session_id)
            .map(|e| e.tx.borrow().clone())
    }

    fn mutate(&self, session_id: &str, f: impl FnOnce(&mut StreamingState)) -> Result<(), StoreError> {
        let map = self.entries.lock();
        let entry = map
            .get(session_id)
            .ok_or_else(|| StoreError::NotFound(format!("streaming state {session_id}")))?;
        entry.tx.send_modify(f);
        Ok(())
    }

    /// No-op if no row exists, per the spec.
    pub fn append_token(&self, session_id: &str, text: &str) {
        let _ = self.mutate(session_id, |s| s.append_token(text));
    }

    pub fn append_reasoning(&self, session_id: &str, text: &str) {
        let _ = self.mutate(session_id, |s| s.append_reasoning(text));
    }

    pub fn append_text_part(&self, session_id: &str, text: &str) {
        let _ = self.mutate(session_id, |s| s.append_text_part(text));
    }

    pub fn append_reasoning_part(&self, session_id: &str, text: &str) {
        let _ = self.mutate(session_id, |s| s.append_reasoning_part(text));
    }

    pub fn add_tool_call(&self, session_id: &str, id: &str, name: &str, args: Value) {
        let id = id.to_string();
        let name = name.to_string();
        let _ = self.mutate(session_id, move |s| s.add_tool_call(id, name, args));
    }

    pub fn update_tool_result(&self, session_id: &str, id: &str, result: &str) {
        let _ = self.mutate(session_id, |s| s.update_tool_result(id, result));
    }

    pub fn set_question(&self, session_id: &str, question: PendingQuestion) {
        let _ = self.mutate(session_id, move |s| s.set_question(question));
    }

    /// Public endpoint clients call.
    pub fn answer_question(&self, session_id: &str, answer: Value) -> Result<(), StoreError> {
        self.mutate(session_id, move |s| s.answer_question(answer))
    }

    pub fn clear_question(&self, session_id: &str) {
        let _ = self.mutate(session_id, |s| s.clear_question());
    }

    pub fn set_stage(&self, session_id: &str, stage: Option<String>) {
        let _ = self.mutate(session_id, move |s| s.stage = stage);
    }

    pub fn finish(&self, session_id: &str) {
        let _ = self.mutate(session_id, |s| s.finish());
    }

    /// Drop a session's row entirely. Called by `purge_session_data` so a
    /// purged session doesn't leave a stale entry behind forever.
    pub fn remove(&self, session_id: &str) {
        self.entries.lock().remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_to_missing_session_is_noop() {
        let store = LiveStreamStore::new();
        store.append_token("ghost", "hi");
        assert!(store.get("ghost").is_none());
    }

    #[test]
    fn subscribers_observe_every_mutation() {
        let store = LiveStreamStore::new();
        store.start("s1");
        let mut rx = store.subscribe("s1").unwrap();
        store.append_token("s1", "hello");
        // watch channels mark new values as changed; has_changed is true
        // until the receiver observes it via borrow_and_update/changed().
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().content, "hello");
    }

    #[test]
    fn start_overwrites_prior_row() {
        let store = LiveStreamStore::new();
        store.start("s1");
        store.append_token("s1", "partial");
        store.start("s1");
        assert_eq!(store.get("s1").unwrap().content, "");
    }

    #[test]
    fn remove_drops_the_row() {
        let store = LiveStreamStore::new();
        store.start("s1");
        store.remove("s1");
        assert!(store.get("s1").is_none());
    }
}
