use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

/// Entries kept before the oldest are evicted.
pub const LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Success,
    Error,
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogKind::Info => "info",
            LogKind::Success => "success",
            LogKind::Error => "error",
        };
        f.pad(label)
    }
}

/// One user-facing event. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub id: u64,
    /// Wall-clock time of the append, `HH:MM:SS` UTC.
    pub time: String,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:<7} {}", self.time, self.kind, self.message)
    }
}

/// Bounded user-facing event log, newest first.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    entries: VecDeque<LogEntry>,
    next_id: u64,
}

impl RunLog {
    pub fn push(&mut self, kind: LogKind, message: impl Into<String>) -> &LogEntry {
        self.next_id += 1;
        self.entries.push_front(LogEntry {
            id: self.next_id,
            time: clock(OffsetDateTime::now_utc()),
            kind,
            message: message.into(),
        });
        self.entries.truncate(LOG_CAPACITY);
        &self.entries[0]
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn clock(now: OffsetDateTime) -> String {
    const CLOCK: &[FormatItem<'_>] = format_description!("[hour]:[minute]:[second]");
    now.format(CLOCK).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_most_recent_hundred_newest_first() {
        let mut log = RunLog::default();
        for i in 0..105 {
            log.push(LogKind::Info, format!("event {i}"));
        }
        assert_eq!(log.len(), LOG_CAPACITY);
        let messages: Vec<_> = log.entries().map(|e| e.message.as_str()).collect();
        assert_eq!(messages[0], "event 104");
        assert_eq!(messages[99], "event 5");
        let ids: Vec<_> = log.entries().map(|e| e.id).collect();
        assert!(ids.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn clear_empties_but_ids_keep_increasing() {
        let mut log = RunLog::default();
        log.push(LogKind::Error, "boom");
        log.clear();
        assert!(log.is_empty());
        let id = log.push(LogKind::Success, "ok").id;
        assert_eq!(id, 2);
    }

    #[test]
    fn clock_is_hh_mm_ss() {
        let t = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        assert_eq!(clock(t), "22:13:20");
        let entry = LogEntry {
            id: 1,
            time: clock(t),
            kind: LogKind::Success,
            message: "done".into(),
        };
        assert_eq!(entry.to_string(), "[22:13:20] success done");
    }

    #[test]
    fn entry_kind_serializes_as_type() {
        let mut log = RunLog::default();
        let entry = log.push(LogKind::Success, "Classification complete").clone();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "success");
        assert_eq!(json["id"], 1);
        assert!(json.get("kind").is_none());
    }
}
