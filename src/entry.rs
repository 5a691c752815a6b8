//! Log entry model
//!
//! Entries are produced once by an ingestion source and then shared by
//! reference between the working set, the index and query results.

use std::sync::Arc;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Serialize, Deserialize};

/// A single structured log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Time the record was emitted, with its original offset
    #[serde(alias = "Timestamp")]
    pub timestamp: DateTime<FixedOffset>,
    /// Level token as written by the producer (ERROR, WARN, INFO, DEBUG, ...)
    #[serde(alias = "Level")]
    pub level: String,
    /// Free-form message text
    #[serde(alias = "Message")]
    pub message: String,
}

/// Shared handle to an entry
pub type EntryRef = Arc<LogEntry>;

impl LogEntry {
    /// Create a new log entry
    pub fn new(
        timestamp: DateTime<FixedOffset>,
        level: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            level: level.into(),
            message: message.into(),
        }
    }

    /// Create a log entry from a UTC timestamp
    pub fn at_utc(
        timestamp: DateTime<Utc>,
        level: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(timestamp.fixed_offset(), level, message)
    }

    /// The entry's instant in UTC
    pub fn instant(&self) -> DateTime<Utc> {
        self.timestamp.with_timezone(&Utc)
    }

    /// Key used to de-duplicate entries reached through several paths
    pub fn key(&self) -> EntryKey<'_> {
        EntryKey {
            timestamp: self.timestamp,
            level: &self.level,
            message: &self.message,
        }
    }
}

/// Identity of an entry as `(timestamp, level, message)`.
///
/// Timestamps compare as instants, so the same moment written with two
/// different offsets is one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryKey<'a> {
    pub timestamp: DateTime<FixedOffset>,
    pub level: &'a str,
    pub message: &'a str,
}

/// Wrap owned entries into shared handles
pub fn into_refs(entries: Vec<LogEntry>) -> Vec<EntryRef> {
    entries.into_iter().map(Arc::new).collect()
}

/// Stable sort of entries by timestamp, oldest first
pub fn sort_by_time(entries: &mut [EntryRef]) {
    entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
}
