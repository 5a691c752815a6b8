use std::fs;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::entry::{EntryRef, LogEntry};
use crate::error::Result;
use crate::filter::Filter;
use crate::store;
use super::util;
use super::{ShardInfo, ShardStats};

/// Manages day shards under a base directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardManager {
    /// Directory holding `YYYY-MM-DD.jsonl` files
    base_dir: PathBuf,
}

impl ShardManager {
    /// Create a shard manager; the directory is created on first append
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self { base_dir: base_dir.as_ref().to_path_buf() }
    }

    /// Base directory of the shards
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Shard path for the day containing `at`
    pub fn path_for(&self, at: &DateTime<Utc>) -> PathBuf {
        util::shard_path(&self.base_dir, &util::day_key(at))
    }

    /// Append entries to their day shards, earliest day first
    pub fn append<'a, I>(&self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a LogEntry>,
    {
        fs::create_dir_all(&self.base_dir)?;

        let grouped = util::group_by_day(entries);
        let mut written = 0;
        for (day, group) in &grouped {
            written += store::append_jsonl(util::shard_path(&self.base_dir, day), group.iter().copied())?;
        }

        info!(dir = %self.base_dir.display(), days = grouped.len(), written, "appended to shards");
        Ok(written)
    }

    /// Shard paths that may hold entries matching `filter`.
    ///
    /// With both time bounds the day range is used directly, including
    /// days without a file. With an open bound the directory is listed and
    /// pruned by each file's day, so no shard inside the range is missed.
    pub fn paths_for_filter(&self, filter: &Filter) -> Result<Vec<PathBuf>> {
        let (after, before) = filter.time_bounds();
        if after.is_some() && before.is_some() {
            return Ok(util::shard_paths_for_range(&self.base_dir, after, before));
        }

        let paths: Vec<PathBuf> = util::all_shard_paths(&self.base_dir)?
            .into_iter()
            .filter(|path| match util::parse_shard_date(path) {
                Some(day) => ShardInfo::new(day, path.clone(), 0).overlaps(after, before),
                None => after.is_none() && before.is_none(),
            })
            .collect();

        debug!(
            dir = %self.base_dir.display(),
            after = ?after,
            before = ?before,
            shards = paths.len(),
            "selected shards"
        );
        Ok(paths)
    }

    /// Load and merge shards, sorted by timestamp; missing files are skipped
    pub fn load<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<EntryRef>> {
        store::load_many(paths)
    }

    /// Load the shards that may hold entries matching `filter`
    pub fn load_for_filter(&self, filter: &Filter) -> Result<Vec<EntryRef>> {
        let paths = self.paths_for_filter(filter)?;
        self.load(&paths)
    }

    /// List shard files whose names carry a day, oldest first
    pub fn list(&self) -> Result<Vec<ShardInfo>> {
        let mut shards = Vec::new();
        for path in util::all_shard_paths(&self.base_dir)? {
            if let Some(day) = util::parse_shard_date(&path) {
                let size = fs::metadata(&path)?.len();
                shards.push(ShardInfo::new(day, path, size));
            }
        }
        Ok(shards)
    }

    /// Get statistics about the shard directory
    pub fn stats(&self) -> Result<ShardStats> {
        Ok(ShardStats::from_shards(&self.list()?))
    }
}
