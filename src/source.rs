//! Ingestion sources
//!
//! The engine does not parse raw log formats itself. An [`EntrySource`]
//! hands it already-structured entries; malformed input is the source's
//! concern and never reaches the engine.

use std::path::{Path, PathBuf};

use crate::entry::LogEntry;
use crate::error::Result;
use crate::store;

/// A producer of log entries for one ingestion run
pub trait EntrySource: Send + Sync {
    /// Human-readable name, recorded in run headers and snapshots
    fn describe(&self) -> String;

    /// Read every entry the source currently holds, in order
    fn read_entries(&self) -> Result<Vec<LogEntry>>;
}

impl<S: EntrySource + ?Sized> EntrySource for &S {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn read_entries(&self) -> Result<Vec<LogEntry>> {
        (**self).read_entries()
    }
}

impl<S: EntrySource + ?Sized> EntrySource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn read_entries(&self) -> Result<Vec<LogEntry>> {
        (**self).read_entries()
    }
}

/// Entries held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    name: String,
    entries: Vec<LogEntry>,
}

impl MemorySource {
    /// Create a source over the given entries
    pub fn new(entries: Vec<LogEntry>) -> Self {
        Self {
            name: "memory".to_string(),
            entries,
        }
    }

    /// Set a custom name for the source
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl EntrySource for MemorySource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn read_entries(&self) -> Result<Vec<LogEntry>> {
        Ok(self.entries.clone())
    }
}

/// Entries read from a JSONL file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonlSource {
    path: PathBuf,
}

impl JsonlSource {
    /// Create a source reading `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    /// Get the source path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EntrySource for JsonlSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn read_entries(&self) -> Result<Vec<LogEntry>> {
        store::load_jsonl(&self.path)
    }
}
