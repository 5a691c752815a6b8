//! Shared working set for a long-running service
//!
//! [`SharedState`] owns the entry vector, the cached index and the load
//! counters behind one reader/writer lock:
//!
//! - queries hold the read lock only long enough to clone the `Arc`s, then
//!   evaluate without any lock held;
//! - an index built by a query is cached only if no ingest happened while
//!   it was being built (the generation is unchanged);
//! - ingest holds the write lock across persistence and publication, so
//!   ingests are serialized and readers see either the old or the new
//!   vector, never a partial one.

use std::sync::Arc;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::engine::{self, IngestStats, LoadResult, LoadStats};
use crate::entry::{EntryRef, LogEntry};
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::index::Index;
use crate::metrics::{MetricsCollector, QueryMetrics};
use crate::query::{self, QueryResult};
use crate::shard::ShardManager;
use crate::store::JsonlStore;

/// An entry as submitted to a running service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestEntry {
    /// RFC3339 timestamp
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

impl IngestEntry {
    /// Validate and convert into a [`LogEntry`]
    pub fn to_entry(&self) -> Result<LogEntry> {
        if self.timestamp.is_empty() || self.level.is_empty() || self.message.is_empty() {
            return Err(Error::other("missing fields: timestamp, level and message are required"));
        }

        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| Error::parse(self.timestamp.clone(), e.to_string()))?;
        Ok(LogEntry::new(timestamp, self.level.clone(), self.message.clone()))
    }
}

/// A single entry or a batch; a non-empty batch wins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestPayload {
    pub entry: Option<IngestEntry>,
    pub entries: Vec<IngestEntry>,
}

impl IngestPayload {
    /// Validate every entry; nothing is returned unless all are valid
    pub fn into_entries(self) -> Result<Vec<LogEntry>> {
        if !self.entries.is_empty() {
            return self.entries.iter().map(IngestEntry::to_entry).collect();
        }
        match self.entry {
            Some(entry) => Ok(vec![entry.to_entry()?]),
            None => Err(Error::other("missing entry")),
        }
    }
}

#[derive(Debug)]
struct Inner {
    entries: Arc<Vec<EntryRef>>,
    index: Option<Arc<Index>>,
    stats: LoadStats,
    generation: u64,
    last_metrics: Option<QueryMetrics>,
}

/// Entry set, index and counters shared between request handlers
#[derive(Debug)]
pub struct SharedState {
    inner: RwLock<Inner>,
    use_index: bool,
    store: Option<JsonlStore>,
    shards: Option<ShardManager>,
    collector: MetricsCollector,
}

impl SharedState {
    /// Adopt the result of a load step
    pub fn new(loaded: LoadResult, use_index: bool) -> Self {
        let collector = MetricsCollector::new();
        collector.add_skipped_positions(loaded.skipped_positions);

        Self {
            inner: RwLock::new(Inner {
                entries: Arc::new(loaded.entries),
                index: loaded.index.map(Arc::new),
                stats: loaded.stats,
                generation: 0,
                last_metrics: None,
            }),
            use_index,
            store: None,
            shards: None,
            collector,
        }
    }

    /// Persist ingested entries to a JSONL store
    pub fn with_store(mut self, store: JsonlStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Persist ingested entries to day shards
    pub fn with_shards(mut self, shards: ShardManager) -> Self {
        self.shards = Some(shards);
        self
    }

    /// Number of entries in the working set
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Incremented by every successful ingest
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    pub fn stats(&self) -> LoadStats {
        self.inner.read().stats
    }

    /// Whether an index is currently cached
    pub fn has_index(&self) -> bool {
        self.inner.read().index.is_some()
    }

    /// Whether queries go through the index
    pub fn use_index(&self) -> bool {
        self.use_index
    }

    /// Process-wide counters
    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }

    /// Current entries, oldest ingest first
    pub fn entries(&self) -> Arc<Vec<EntryRef>> {
        Arc::clone(&self.inner.read().entries)
    }

    /// Evaluate `filter` against the current working set
    pub fn query(&self, filter: &Filter, limit: usize) -> QueryResult {
        let (entries, cached, stats, generation) = {
            let inner = self.inner.read();
            (Arc::clone(&inner.entries), inner.index.clone(), inner.stats, inner.generation)
        };

        let index = match (self.use_index, cached) {
            (false, _) => None,
            (true, Some(index)) => Some(index),
            (true, None) => Some(self.rebuild_index(&entries, generation)),
        };

        let result = query::execute(&entries, index.as_deref(), filter, limit, &stats);
        self.collector.record_query(&result.metrics);
        self.inner.write().last_metrics = Some(result.metrics.clone());
        result
    }

    fn rebuild_index(&self, entries: &[EntryRef], generation: u64) -> Arc<Index> {
        let built = Arc::new(Index::build(entries));
        self.collector.increment_index_rebuilds();

        let mut inner = self.inner.write();
        if inner.generation == generation && inner.index.is_none() {
            inner.index = Some(Arc::clone(&built));
        } else {
            debug!(generation, current = inner.generation, "discarding index built for a stale entry set");
        }
        built
    }

    /// Persist and publish new entries.
    ///
    /// The working set is unchanged when validation or persistence fails.
    pub fn ingest(&self, entries: Vec<LogEntry>) -> Result<IngestStats> {
        if let Some(bad) = entries.iter().find(|e| e.level.is_empty() || e.message.is_empty()) {
            return Err(Error::other(format!(
                "entry at {} is missing a level or message",
                bad.timestamp.to_rfc3339()
            )));
        }

        let mut inner = self.inner.write();
        let (combined, stats) = engine::ingest_entries(
            &inner.entries,
            entries,
            self.store.as_ref(),
            self.shards.as_ref(),
            None,
        )?;

        inner.entries = Arc::new(combined);
        inner.index = None;
        inner.generation += 1;
        inner.stats.logs_read += stats.logs_ingested;
        inner.stats.logs_ingested += stats.logs_ingested;
        let total = inner.entries.len();
        drop(inner);

        self.collector.record_ingest(stats.logs_ingested);
        info!(ingested = stats.logs_ingested, total, "ingested entries");
        Ok(stats)
    }

    /// Validate a submitted payload and ingest it
    pub fn ingest_payload(&self, payload: IngestPayload) -> Result<IngestStats> {
        self.ingest(payload.into_entries()?)
    }

    /// Metrics of the last query, or load-derived metrics before any query
    pub fn metrics(&self) -> QueryMetrics {
        let inner = self.inner.read();
        if let Some(ref metrics) = inner.last_metrics {
            return metrics.clone();
        }

        let now = Utc::now();
        QueryMetrics {
            started_at: now,
            finished_at: now,
            logs_read: inner.stats.logs_read,
            logs_ingested: inner.stats.logs_ingested,
            logs_filtered_out: 0,
            logs_returned: inner.stats.logs_ingested,
            index_enabled: self.use_index,
        }
    }
}
