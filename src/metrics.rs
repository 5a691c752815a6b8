//! Query and engine metrics
//!
//! [`QueryMetrics`] describes a single query execution and renders as the
//! `metrics.*` key/value lines. [`MetricsCollector`] accumulates counters
//! across the lifetime of a process.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Metrics of one query execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMetrics {
    /// When evaluation started
    pub started_at: DateTime<Utc>,
    /// When evaluation finished
    pub finished_at: DateTime<Utc>,
    /// Entries read by the load step
    pub logs_read: usize,
    /// Entries ingested by the load step
    pub logs_ingested: usize,
    /// Working-set entries that did not match, before any limit
    pub logs_filtered_out: usize,
    /// Entries returned after the limit
    pub logs_returned: usize,
    /// Whether the index path was used
    pub index_enabled: bool,
}

impl QueryMetrics {
    /// Wall-clock time spent evaluating
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Ingested entries per second.
    ///
    /// `None` when evaluation took less than a second.
    pub fn rate_per_sec(&self) -> Option<f64> {
        let micros = self.duration().num_microseconds()?;
        let secs = micros as f64 / 1_000_000.0;
        if secs < 1.0 {
            return None;
        }
        Some(self.logs_ingested as f64 / secs)
    }

    /// Render as `metrics.<key>=<value>` lines
    pub fn lines(&self) -> Vec<String> {
        let rate = self
            .rate_per_sec()
            .map(|r| format!("{:.2}", r))
            .unwrap_or_else(|| "NA".to_string());

        vec![
            format!("metrics.started_at={}", self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            format!("metrics.finished_at={}", self.finished_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            format!("metrics.duration_ms={}", self.duration().num_milliseconds()),
            format!("metrics.logs_read={}", self.logs_read),
            format!("metrics.logs_ingested={}", self.logs_ingested),
            format!("metrics.logs_filtered_out={}", self.logs_filtered_out),
            format!("metrics.logs_returned={}", self.logs_returned),
            format!("metrics.rate_per_sec={}", rate),
            format!("metrics.index_enabled={}", self.index_enabled),
        ]
    }

    /// Key/value form of [`lines`](Self::lines), with typed values
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        let rate = match self.rate_per_sec() {
            Some(r) => Value::from(format!("{:.2}", r)),
            None => Value::from("NA"),
        };

        let mut map: BTreeMap<String, Value> = BTreeMap::new();
        map.insert("metrics.started_at".into(), self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true).into());
        map.insert("metrics.finished_at".into(), self.finished_at.to_rfc3339_opts(SecondsFormat::Secs, true).into());
        map.insert("metrics.duration_ms".into(), self.duration().num_milliseconds().into());
        map.insert("metrics.logs_read".into(), self.logs_read.into());
        map.insert("metrics.logs_ingested".into(), self.logs_ingested.into());
        map.insert("metrics.logs_filtered_out".into(), self.logs_filtered_out.into());
        map.insert("metrics.logs_returned".into(), self.logs_returned.into());
        map.insert("metrics.rate_per_sec".into(), rate);
        map.insert("metrics.index_enabled".into(), self.index_enabled.into());
        map
    }

    /// Render as a newline-separated block
    pub fn render(&self) -> String {
        self.lines().join("\n")
    }

    /// Write the rendered lines to a file, replacing its contents
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut text = self.render();
        text.push('\n');
        fs::write(path, text)?;
        Ok(())
    }
}

/// Process-wide counters for a long-running engine
#[derive(Debug)]
pub struct MetricsCollector {
    /// Number of queries executed
    query_count: AtomicUsize,
    /// Number of entries returned across all queries
    query_result_count: AtomicUsize,
    /// Number of queries served through an index
    indexed_query_count: AtomicUsize,
    /// Total query duration in nanoseconds
    query_duration_ns: AtomicU64,
    /// Duration of the most recent query
    last_query_duration: Mutex<Duration>,

    /// Number of ingest batches
    ingest_count: AtomicUsize,
    /// Number of entries ingested
    ingested_entries: AtomicUsize,

    /// Number of index builds
    index_rebuilds: AtomicUsize,
    /// Snapshot positions dropped during rehydration
    skipped_positions: AtomicUsize,

    /// Start time of the collector
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            query_count: AtomicUsize::new(0),
            query_result_count: AtomicUsize::new(0),
            indexed_query_count: AtomicUsize::new(0),
            query_duration_ns: AtomicU64::new(0),
            last_query_duration: Mutex::new(Duration::from_secs(0)),
            ingest_count: AtomicUsize::new(0),
            ingested_entries: AtomicUsize::new(0),
            index_rebuilds: AtomicUsize::new(0),
            skipped_positions: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a finished query
    pub fn record_query(&self, metrics: &QueryMetrics) {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.query_result_count.fetch_add(metrics.logs_returned, Ordering::Relaxed);
        if metrics.index_enabled {
            self.indexed_query_count.fetch_add(1, Ordering::Relaxed);
        }

        let duration = metrics.duration().to_std().unwrap_or_default();
        self.query_duration_ns.fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        *self.last_query_duration.lock() = duration;
    }

    /// Record an ingest batch
    pub fn record_ingest(&self, entries: usize) {
        self.ingest_count.fetch_add(1, Ordering::Relaxed);
        self.ingested_entries.fetch_add(entries, Ordering::Relaxed);
    }

    /// Increment the index build count
    pub fn increment_index_rebuilds(&self) {
        self.index_rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    /// Record positions dropped while rehydrating a snapshot index
    pub fn add_skipped_positions(&self, count: usize) {
        self.skipped_positions.fetch_add(count, Ordering::Relaxed);
    }

    /// Get query count
    pub fn get_query_count(&self) -> usize {
        self.query_count.load(Ordering::Relaxed)
    }

    /// Get number of queries that used the index
    pub fn get_indexed_query_count(&self) -> usize {
        self.indexed_query_count.load(Ordering::Relaxed)
    }

    /// Get total query duration
    pub fn get_query_duration(&self) -> Duration {
        Duration::from_nanos(self.query_duration_ns.load(Ordering::Relaxed))
    }

    /// Get the duration of the most recent query
    pub fn get_last_query_duration(&self) -> Duration {
        *self.last_query_duration.lock()
    }

    /// Get average number of entries returned per query
    pub fn get_avg_query_results(&self) -> f64 {
        let queries = self.query_count.load(Ordering::Relaxed);
        let results = self.query_result_count.load(Ordering::Relaxed);

        if queries == 0 {
            return 0.0;
        }

        results as f64 / queries as f64
    }

    /// Get ingest batch count
    pub fn get_ingest_count(&self) -> usize {
        self.ingest_count.load(Ordering::Relaxed)
    }

    /// Get number of entries ingested
    pub fn get_ingested_entries(&self) -> usize {
        self.ingested_entries.load(Ordering::Relaxed)
    }

    /// Get index build count
    pub fn get_index_rebuilds(&self) -> usize {
        self.index_rebuilds.load(Ordering::Relaxed)
    }

    /// Get number of snapshot positions dropped
    pub fn get_skipped_positions(&self) -> usize {
        self.skipped_positions.load(Ordering::Relaxed)
    }

    /// Get uptime of the metrics collector
    pub fn get_uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.query_count.store(0, Ordering::Relaxed);
        self.query_result_count.store(0, Ordering::Relaxed);
        self.indexed_query_count.store(0, Ordering::Relaxed);
        self.query_duration_ns.store(0, Ordering::Relaxed);
        *self.last_query_duration.lock() = Duration::from_secs(0);
        self.ingest_count.store(0, Ordering::Relaxed);
        self.ingested_entries.store(0, Ordering::Relaxed);
        self.index_rebuilds.store(0, Ordering::Relaxed);
        self.skipped_positions.store(0, Ordering::Relaxed);
    }

    /// Render the counters as `metrics.*` key/value lines
    pub fn get_report(&self) -> String {
        let mut lines = vec![
            format!("metrics.uptime_ms={}", self.get_uptime().as_millis()),
            format!("metrics.queries={}", self.get_query_count()),
            format!("metrics.queries_indexed={}", self.get_indexed_query_count()),
            format!("metrics.avg_results={:.2}", self.get_avg_query_results()),
            format!("metrics.last_query_us={}", self.get_last_query_duration().as_micros()),
            format!("metrics.ingests={}", self.get_ingest_count()),
            format!("metrics.entries_ingested={}", self.get_ingested_entries()),
            format!("metrics.index_rebuilds={}", self.get_index_rebuilds()),
        ];
        let skipped = self.get_skipped_positions();
        if skipped > 0 {
            lines.push(format!("metrics.snapshot_positions_skipped={}", skipped));
        }
        lines.join("\n")
    }
}
