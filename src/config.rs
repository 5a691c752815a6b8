//! Engine configuration
//!
//! Collects the settings of a load-and-query run in one serializable
//! structure. Configurations can be built in code with the `with_*` methods
//! or read from a JSON file; durations use humantime notation such as
//! `"30m"` or `"7d"`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Serialize, Deserialize};

use crate::engine::LoadOptions;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::query::{Query, QueryBuilder};
use crate::shard::ShardManager;

/// Settings for one run of the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[non_exhaustive]
pub struct EngineConfig {
    // Inputs
    /// JSONL file to ingest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Pre-built JSONL store to load instead of ingesting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<PathBuf>,
    /// Snapshot to load instead of ingesting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_load: Option<PathBuf>,
    /// Load day shards from `shard_dir` selected by the query's time range
    pub shard_read: bool,

    // Outputs
    /// JSONL store to append ingested entries to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<PathBuf>,
    /// Write a run header before appending to the store
    pub store_header: bool,
    /// Replay the store before new entries
    pub replay: bool,
    /// Directory of day shards
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard_dir: Option<PathBuf>,
    /// Snapshot to write after loading
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<PathBuf>,
    /// File to write run metrics to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_file: Option<PathBuf>,

    // Retention
    /// Keep only entries newer than this in the working set
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub retention: Option<Duration>,

    // Query
    /// Exact level to match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Message substring to match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Relative window to match
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub since: Option<Duration>,
    /// Filter DSL text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Maximum number of results; zero means unlimited
    pub limit: usize,
    /// Evaluate through the level/hour index
    pub index: bool,
    /// Produce a plan for the query
    pub explain: bool,
    /// Report run metrics
    pub metrics: bool,
}

impl EngineConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest entries from a JSONL file
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load a pre-built JSONL store
    pub fn with_load<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.load = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load a snapshot
    pub fn with_snapshot_load<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.snapshot_load = Some(path.as_ref().to_path_buf());
        self
    }

    /// Append ingested entries to a JSONL store
    pub fn with_store<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.store = Some(path.as_ref().to_path_buf());
        self
    }

    /// Write a run header before appending to the store
    pub fn with_store_header(mut self, enabled: bool) -> Self {
        self.store_header = enabled;
        self
    }

    /// Replay the store before new entries
    pub fn with_replay(mut self, enabled: bool) -> Self {
        self.replay = enabled;
        self
    }

    /// Set the day shard directory
    pub fn with_shard_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.shard_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load from day shards instead of ingesting
    pub fn with_shard_read(mut self, enabled: bool) -> Self {
        self.shard_read = enabled;
        self
    }

    /// Write a snapshot after loading
    pub fn with_snapshot<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.snapshot = Some(path.as_ref().to_path_buf());
        self
    }

    /// Write run metrics to a file
    pub fn with_metrics_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.metrics_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the retention window
    pub fn with_retention(mut self, window: Duration) -> Self {
        self.retention = Some(window);
        self
    }

    /// Match an exact level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Match a message substring
    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    /// Match a relative window
    pub fn with_since(mut self, window: Duration) -> Self {
        self.since = Some(window);
        self
    }

    /// Set the filter DSL text
    pub fn with_query(mut self, text: impl Into<String>) -> Self {
        self.query = Some(text.into());
        self
    }

    /// Limit the number of results
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Evaluate through the index
    pub fn with_index(mut self, enabled: bool) -> Self {
        self.index = enabled;
        self
    }

    /// Produce a query plan
    pub fn with_explain(mut self, enabled: bool) -> Self {
        self.explain = enabled;
        self
    }

    /// Report run metrics
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.shard_read && self.shard_dir.is_none() {
            return Err(Error::config("Reading shards requires a shard directory"));
        }

        if self.replay && self.store.is_none() {
            return Err(Error::config("Replay requires a store path"));
        }

        if self.store_header && self.store.is_none() {
            return Err(Error::config("A store header requires a store path"));
        }

        Ok(())
    }

    /// Query builder carrying the flag and DSL settings
    pub fn query_builder(&self) -> Result<QueryBuilder> {
        let mut builder = Query::builder().limit(self.limit).use_index(self.index);

        if let Some(level) = self.level.as_deref().filter(|l| !l.is_empty()) {
            builder = builder.with_level(level);
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            builder = builder.containing_text(search);
        }
        if let Some(window) = self.since.filter(|w| !w.is_zero()) {
            let window = chrono::Duration::from_std(window)
                .map_err(|_| Error::config(format!("since window {:?} is out of range", window)))?;
            builder = builder.in_last(window);
        }
        if let Some(ref text) = self.query {
            builder = builder.with_query(text.clone());
        }

        Ok(builder)
    }

    /// Load options for a query with `filter`.
    ///
    /// Shard paths are only computed when no snapshot or store load takes
    /// precedence.
    pub fn load_options(&self, filter: &Filter) -> Result<LoadOptions> {
        let shard_paths = match self.shard_dir {
            Some(ref dir) if self.shard_read && self.snapshot_load.is_none() && self.load.is_none() => {
                Some(ShardManager::new(dir).paths_for_filter(filter)?)
            }
            _ => None,
        };

        Ok(LoadOptions {
            snapshot_path: self.snapshot_load.clone(),
            load_path: self.load.clone(),
            shard_paths,
            store_path: self.store.clone(),
            shard_dir: if self.shard_read { None } else { self.shard_dir.clone() },
            replay: self.replay,
            retention: self.retention,
            store_header: self.store_header,
        })
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::config(format!(
                    "Config file {} not found; create it or build the configuration in code",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content)
            .map_err(|e| Error::config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Save configuration to a JSON file
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
