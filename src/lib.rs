//! # logpipe_rs
//!
//! Query and indexing engine for structured log records.
//!
//! Entries arrive from an [`EntrySource`], are assembled into a working set
//! by the load orchestrator ([`engine`]) and are queried with a [`Filter`]
//! built from flag-style settings, DSL text, or both:
//!
//! ```text
//! level=ERROR AND message~"timeout" OR level in (WARN, ERROR) since=30m
//! ```
//!
//! Queries can run as a full scan or through an in-memory [`Index`] keyed by
//! level and by UTC hour. Working sets and their index can be saved as
//! versioned [`Snapshot`]s, persisted to an append-only JSONL store, or
//! spread over day shards that are selected by a query's time range.
//!
//! ## Example
//!
//! ```no_run
//! use logpipe_rs::{EngineConfig, Result};
//!
//! fn main() -> Result<()> {
//!     let config = EngineConfig::new()
//!         .with_load("store.jsonl")
//!         .with_query("level=ERROR OR message~timeout")
//!         .with_index(true)
//!         .with_limit(50);
//!
//!     let report = logpipe_rs::run(&config, None)?;
//!     for entry in &report.result.entries {
//!         println!("{} {} {}", entry.timestamp, entry.level, entry.message);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dsl;
pub mod engine;
pub mod entry;
pub mod error;
pub mod filter;
pub mod index;
pub mod metrics;
pub mod query;
pub mod shard;
pub mod snapshot;
pub mod source;
pub mod state;
pub mod store;

pub use config::EngineConfig;
pub use engine::{
    apply_retention, ingest_entries, load_entries, load_entries_at, run, IngestStats, LoadOptions,
    LoadResult, LoadStats, RunReport,
};
pub use entry::{EntryRef, LogEntry};
pub use error::{Error, Result};
pub use filter::{AndFilter, Filter};
pub use index::{Index, IndexStats};
pub use metrics::{MetricsCollector, QueryMetrics};
pub use query::{execute, explain, Query, QueryBuilder, QueryResult, TimeRange};
pub use shard::{ShardInfo, ShardManager, ShardStats};
pub use snapshot::{Snapshot, SnapshotMetadata, SNAPSHOT_VERSION};
pub use source::{EntrySource, JsonlSource, MemorySource};
pub use state::{IngestEntry, IngestPayload, SharedState};
pub use store::JsonlStore;
