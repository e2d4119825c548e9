use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;

/// Open-document registry in full-sync mode: `didOpen` inserts, `didChange`
/// replaces the whole text, `didClose` removes. Last write wins; no version
/// tracking.
#[derive(Default)]
pub struct DocumentStore {
    docs: Mutex<HashMap<String, String>>,
}

impl DocumentStore {
    pub fn upsert(&self, uri: &str, text: String) {
        self.docs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri.to_string(), text);
    }

    pub fn remove(&self, uri: &str) {
        self.docs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uri);
    }

    /// One-shot copy of the current text. Handlers take this snapshot once,
    /// before spawning any search, and never re-read.
    pub fn snapshot(&self, uri: &str) -> Option<String> {
        self.docs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .cloned()
    }
}
