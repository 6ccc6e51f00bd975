//! Text rendering of the history side panel.

use crate::history::HistoryEntry;
use chrono::{Local, TimeZone};

pub const EMPTY_TEXT: &str = "No chats yet";

/// Human-readable local time for an entry's epoch-millis timestamp
pub fn format_timestamp(timestamp: i64) -> String {
    match Local.timestamp_millis_opt(timestamp).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M").to_string(),
        None => "unknown time".to_string(),
    }
}

/// One numbered line per entry, newest first
pub fn render_history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return EMPTY_TEXT.to_string();
    }

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            format!(
                "{:>3}. {}  {}  [{}]",
                i + 1,
                format_timestamp(entry.timestamp),
                entry.title,
                entry.id
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolve a `/delete` argument: a 1-based position in the panel or an id
pub fn resolve_entry<'a>(entries: &'a [HistoryEntry], selector: &str) -> Option<&'a HistoryEntry> {
    let selector = selector.trim();
    if let Ok(position) = selector.parse::<usize>() {
        return position.checked_sub(1).and_then(|i| entries.get(i));
    }
    entries.iter().find(|entry| entry.id == selector)
}
