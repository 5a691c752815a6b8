//! Load orchestration
//!
//! Decides where the working set comes from, in order of precedence:
//!
//! 1. a snapshot (entries plus a ready index), optionally followed by a
//!    replay of the JSONL store;
//! 2. a pre-built JSONL store, read verbatim;
//! 3. an explicit list of day shards, merged and time-sorted;
//! 4. a fresh read from an [`EntrySource`], optionally preceded by a store
//!    replay and followed by appends to the store and to day shards.
//!
//! Retention is applied last and trims only the in-memory working set.

use std::path::PathBuf;
use std::time::Duration;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::entry::{into_refs, EntryRef, LogEntry};
use crate::error::{Error, Result};
use crate::index::Index;
use crate::query::QueryResult;
use crate::shard::ShardManager;
use crate::snapshot::{snapshot_sources, Snapshot};
use crate::source::{EntrySource, JsonlSource};
use crate::store::{self, JsonlStore};

/// Counters describing the load step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    /// Entries read from the chosen source
    pub logs_read: usize,
    /// Entries taken into the working set from that source
    pub logs_ingested: usize,
}

/// Where and how to assemble the working set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Snapshot to load
    pub snapshot_path: Option<PathBuf>,
    /// Pre-built JSONL store to load
    pub load_path: Option<PathBuf>,
    /// Day shards to merge; `Some` selects a shard read even when empty
    pub shard_paths: Option<Vec<PathBuf>>,
    /// JSONL store to replay from and append to
    pub store_path: Option<PathBuf>,
    /// Directory of day shards to append to
    pub shard_dir: Option<PathBuf>,
    /// Replay the store before new entries
    pub replay: bool,
    /// Drop entries older than this from the working set
    pub retention: Option<Duration>,
    /// Write a run header to the store before appending
    pub store_header: bool,
}

/// Working set produced by [`load_entries`]
#[derive(Debug, Clone, Default)]
pub struct LoadResult {
    /// Entries in working-set order
    pub entries: Vec<EntryRef>,
    /// Load counters
    pub stats: LoadStats,
    /// Index rehydrated from a snapshot, if still valid for `entries`
    pub index: Option<Index>,
    /// Snapshot index positions dropped during rehydration
    pub skipped_positions: usize,
}

/// Counters describing a service-mode ingest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Entries appended to the working set
    pub logs_ingested: usize,
}

/// Assemble the working set using the current clock for retention
pub fn load_entries(options: &LoadOptions, source: Option<&dyn EntrySource>) -> Result<LoadResult> {
    load_entries_at(options, source, Utc::now())
}

/// Assemble the working set, measuring retention from `now`
pub fn load_entries_at(
    options: &LoadOptions,
    source: Option<&dyn EntrySource>,
    now: DateTime<Utc>,
) -> Result<LoadResult> {
    let mut result = LoadResult::default();

    if let Some(ref path) = options.snapshot_path {
        let snapshot = Snapshot::load(path)?;
        let (index, skipped) = snapshot.rehydrate();
        result.entries = snapshot.entries;
        result.stats = counted(result.entries.len());
        result.index = Some(index);
        result.skipped_positions = skipped;
        info!(path = %path.display(), entries = result.entries.len(), skipped, "loaded entries from snapshot");

        if options.replay {
            if let Some(ref store_path) = options.store_path {
                let replayed = JsonlStore::new(store_path).load()?;
                result.stats.logs_read += replayed.len();
                result.stats.logs_ingested += replayed.len();
                result.entries.extend(into_refs(replayed));
                result.index = None;
                debug!(store = %store_path.display(), "replayed store after snapshot; index dropped");
            }
        }
    } else if let Some(ref path) = options.load_path {
        result.entries = into_refs(store::load_jsonl(path)?);
        result.stats = counted(result.entries.len());
        info!(path = %path.display(), entries = result.entries.len(), "loaded entries from store");
    } else if let Some(ref paths) = options.shard_paths {
        result.entries = store::load_many(paths)?;
        result.stats = counted(result.entries.len());
        info!(shards = paths.len(), entries = result.entries.len(), "loaded entries from shards");
    } else {
        let source = source.ok_or_else(|| {
            Error::config("no input: set a snapshot, a load path, shard paths or an entry source")
        })?;
        let store = options.store_path.as_ref().map(JsonlStore::new);

        if options.replay {
            if let Some(ref store) = store {
                if store.path().exists() {
                    result.entries.extend(into_refs(store.load()?));
                } else {
                    debug!(store = %store.path().display(), "nothing to replay");
                }
            }
        }

        let fresh = into_refs(source.read_entries()?);
        result.stats = counted(fresh.len());

        if let Some(ref store) = store {
            if options.store_header {
                let header = store.run_header(&source.describe())?;
                store.append_header(&header)?;
            }
            store.append(fresh.iter().map(|e| &**e))?;
        }
        if let Some(ref dir) = options.shard_dir {
            ShardManager::new(dir).append(fresh.iter().map(|e| &**e))?;
        }

        info!(
            source = %source.describe(),
            replayed = result.entries.len(),
            ingested = fresh.len(),
            "ingested entries"
        );
        result.entries.extend(fresh);
    }

    if let Some(retention) = options.retention.filter(|r| !r.is_zero()) {
        let window = chrono::Duration::from_std(retention)
            .map_err(|_| Error::config(format!("retention {:?} is out of range", retention)))?;
        let before = result.entries.len();
        result.entries = apply_retention(result.entries, now - window);

        let dropped = before - result.entries.len();
        if dropped > 0 {
            // A rehydrated index still points at the trimmed entries.
            result.index = None;
            debug!(dropped, "applied retention");
        }
    }

    Ok(result)
}

fn counted(n: usize) -> LoadStats {
    LoadStats { logs_read: n, logs_ingested: n }
}

/// Keep entries at or after `cutoff`
pub fn apply_retention(entries: Vec<EntryRef>, cutoff: DateTime<Utc>) -> Vec<EntryRef> {
    entries.into_iter().filter(|e| e.instant() >= cutoff).collect()
}

/// Persist new entries and return the extended working set.
///
/// Nothing is returned on failure; the caller keeps `existing`.
pub fn ingest_entries(
    existing: &[EntryRef],
    new_entries: Vec<LogEntry>,
    store: Option<&JsonlStore>,
    shards: Option<&ShardManager>,
    header: Option<&str>,
) -> Result<(Vec<EntryRef>, IngestStats)> {
    let fresh = into_refs(new_entries);

    if let Some(store) = store {
        if let Some(header) = header.filter(|h| !h.is_empty()) {
            store.append_header(header)?;
        }
        store.append(fresh.iter().map(|e| &**e))?;
    }
    if let Some(shards) = shards {
        shards.append(fresh.iter().map(|e| &**e))?;
    }

    let stats = IngestStats { logs_ingested: fresh.len() };
    let mut combined = Vec::with_capacity(existing.len() + fresh.len());
    combined.extend_from_slice(existing);
    combined.extend(fresh);
    Ok((combined, stats))
}

/// Outcome of a single load-and-query run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Query results and metrics
    pub result: QueryResult,
    /// Plan steps, when explain was requested
    pub plan: Vec<String>,
    /// Snapshot written during the run
    pub snapshot: Option<PathBuf>,
    /// Snapshot index positions dropped during the load
    pub skipped_positions: usize,
}

/// Load, optionally snapshot, and query according to `config`.
///
/// `source` overrides the configured input file.
pub fn run(config: &EngineConfig, source: Option<&dyn EntrySource>) -> Result<RunReport> {
    config.validate()?;
    let query = config.query_builder()?.build()?;
    let options = config.load_options(&query.filter)?;

    let file_source = config.file.as_ref().map(JsonlSource::new);
    let source = source.or_else(|| file_source.as_ref().map(|s| s as &dyn EntrySource));
    let loaded = load_entries(&options, source)?;

    let plan = if config.explain { query.explain() } else { Vec::new() };

    let snapshot = match config.snapshot {
        Some(ref path) => {
            let as_text = |p: &Option<PathBuf>| p.as_ref().map(|p| p.display().to_string());
            let file = source.map(|s| s.describe());
            let sources = snapshot_sources(
                file.as_deref(),
                as_text(&config.load).as_deref(),
                as_text(&config.snapshot_load).as_deref(),
            );
            Snapshot::capture(&loaded.entries, sources).write(path)?;
            Some(path.clone())
        }
        None => None,
    };

    let result = query.run(&loaded.entries, loaded.index.as_ref(), &loaded.stats);
    if config.metrics {
        for line in result.metrics.lines() {
            info!("{}", line);
        }
    }
    if let Some(ref path) = config.metrics_file {
        result.metrics.write_to(path)?;
    }

    Ok(RunReport {
        result,
        plan,
        snapshot,
        skipped_positions: loaded.skipped_positions,
    })
}
