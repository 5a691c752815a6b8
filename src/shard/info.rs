//! Shard information and statistics data structures

use std::path::PathBuf;
use chrono::{DateTime, Duration, NaiveDate, Utc};

use super::util::day_start;

/// Information about one day shard on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardInfo {
    /// UTC day the shard holds
    pub day: NaiveDate,
    /// Path of the shard file
    pub path: PathBuf,
    /// Shard start time (inclusive)
    pub start_time: DateTime<Utc>,
    /// Shard end time (exclusive)
    pub end_time: DateTime<Utc>,
    /// Size of the shard file in bytes
    pub size_bytes: u64,
}

impl ShardInfo {
    /// Create a new shard info for a day
    pub fn new(day: NaiveDate, path: PathBuf, size_bytes: u64) -> Self {
        let start_time = day_start(day);
        Self {
            day,
            path,
            start_time,
            end_time: start_time + Duration::days(1),
            size_bytes,
        }
    }

    /// Check if a timestamp is in this shard's time range
    pub fn contains_timestamp(&self, timestamp: &DateTime<Utc>) -> bool {
        *timestamp >= self.start_time && *timestamp < self.end_time
    }

    /// Check if the shard overlaps the given bounds
    pub fn overlaps(&self, after: Option<DateTime<Utc>>, before: Option<DateTime<Utc>>) -> bool {
        after.map_or(true, |a| self.end_time > a) && before.map_or(true, |b| self.start_time < b)
    }
}

/// Statistics about a shard directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardStats {
    /// Number of shard files
    pub shard_count: usize,
    /// Total size of all shard files in bytes
    pub size_bytes: u64,
    /// Earliest shard day
    pub oldest_day: Option<NaiveDate>,
    /// Latest shard day
    pub newest_day: Option<NaiveDate>,
}

impl ShardStats {
    /// Summarise a list of shards
    pub fn from_shards(shards: &[ShardInfo]) -> Self {
        Self {
            shard_count: shards.len(),
            size_bytes: shards.iter().map(|s| s.size_bytes).sum(),
            oldest_day: shards.iter().map(|s| s.day).min(),
            newest_day: shards.iter().map(|s| s.day).max(),
        }
    }
}
