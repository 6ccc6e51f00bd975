//! Persisted list of past conversations shown in the history panel.

use crate::storage::KeyValueStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

pub const HISTORY_KEY: &str = "chat_history";
pub const DEFAULT_TITLE_LEN: usize = 40;

/// Summary of a conversation, derived from the user's message at send time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub title: String,
    /// Epoch milliseconds
    pub timestamp: i64,
}

/// History entries stored most-recent first under [`HISTORY_KEY`].
///
/// Storage failures never escape: reads degrade to an empty list and a
/// failed write leaves the stored collection as it was.
pub struct HistoryStore<S> {
    store: S,
    title_len: usize,
}

impl<S: KeyValueStore> HistoryStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            title_len: DEFAULT_TITLE_LEN,
        }
    }

    pub fn with_title_len(mut self, title_len: usize) -> Self {
        self.title_len = title_len.max(1);
        self
    }

    /// Prepend a new entry titled after `message`
    pub fn record(&self, message: &str) -> Option<HistoryEntry> {
        let entry = HistoryEntry {
            id: Uuid::new_v4().to_string(),
            title: make_title(message, self.title_len),
            timestamp: Utc::now().timestamp_millis(),
        };

        let mut entries = self.list();
        entries.insert(0, entry.clone());

        self.write(&entries).then_some(entry)
    }

    /// All entries in stored order
    pub fn list(&self) -> Vec<HistoryEntry> {
        let raw = match self.store.get(HISTORY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                error!("Error loading chat history: {}", e);
                return Vec::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            error!("Error loading chat history: {}", e);
            Vec::new()
        })
    }

    pub fn get(&self, id: &str) -> Option<HistoryEntry> {
        self.list().into_iter().find(|entry| entry.id == id)
    }

    /// Delete the entry with `id`. Unknown ids are a no-op.
    ///
    /// Returns whether an entry was removed.
    pub fn remove(&self, id: &str) -> bool {
        let mut entries = self.list();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);

        if entries.len() == before {
            return false;
        }
        self.write(&entries)
    }

    pub fn clear(&self) -> bool {
        self.write(&[])
    }

    fn write(&self, entries: &[HistoryEntry]) -> bool {
        let result = serde_json::to_string(entries)
            .map_err(Into::into)
            .and_then(|raw| self.store.set(HISTORY_KEY, &raw));

        match result {
            Ok(()) => true,
            Err(e) => {
                error!("Error saving chat history: {}", e);
                false
            }
        }
    }
}

/// Trimmed prefix of `message`, at most `max_chars` characters plus an
/// ellipsis when cut
pub fn make_title(message: &str, max_chars: usize) -> String {
    let message = message.trim();
    match message.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", message[..cut].trim_end()),
        None => message.to_string(),
    }
}
