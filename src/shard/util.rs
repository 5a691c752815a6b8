//! Utility functions for day shards
//!
//! Helpers for naming shard files, grouping entries by UTC day and
//! turning time ranges into shard paths.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::entry::LogEntry;
use crate::error::{Error, Result};

/// File extension of shard files
pub const SHARD_EXTENSION: &str = "jsonl";

/// Format of the day key in shard file names
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// UTC day key of an instant
pub fn day_key(at: &DateTime<Utc>) -> String {
    at.format(DAY_FORMAT).to_string()
}

/// Midnight UTC at the start of a day
pub fn day_start(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(NaiveTime::default()))
}

/// Path of the shard file for a day key
pub fn shard_path(base_dir: &Path, day: &str) -> PathBuf {
    base_dir.join(format!("{}.{}", day, SHARD_EXTENSION))
}

/// Partition entries by UTC day, keeping their relative order
pub fn group_by_day<'a, I>(entries: I) -> BTreeMap<String, Vec<&'a LogEntry>>
where
    I: IntoIterator<Item = &'a LogEntry>,
{
    let mut grouped: BTreeMap<String, Vec<&'a LogEntry>> = BTreeMap::new();
    for entry in entries {
        grouped.entry(day_key(&entry.instant())).or_default().push(entry);
    }
    grouped
}

/// Day keys spanned by a time range, inclusive and ascending.
///
/// With both bounds unset there is no range and no day is returned; with
/// one bound unset the other bound's day is used alone. Inverted bounds
/// are swapped.
pub fn days_in_range(after: Option<DateTime<Utc>>, before: Option<DateTime<Utc>>) -> Vec<String> {
    let (start, end) = match (after.or(before), before.or(after)) {
        (Some(start), Some(end)) => (start, end),
        _ => return Vec::new(),
    };
    let (start, end) = if end < start { (end, start) } else { (start, end) };

    let last = end.date_naive();
    let mut day = start.date_naive();
    let mut days = Vec::new();
    while day <= last {
        days.push(day.format(DAY_FORMAT).to_string());
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    days
}

/// Shard paths for every day in the range
pub fn shard_paths_for_range(
    base_dir: &Path,
    after: Option<DateTime<Utc>>,
    before: Option<DateTime<Utc>>,
) -> Vec<PathBuf> {
    days_in_range(after, before)
        .iter()
        .map(|day| shard_path(base_dir, day))
        .collect()
}

/// Every `*.jsonl` file in the directory, sorted by name.
///
/// A missing directory has no shards.
pub fn all_shard_paths(base_dir: &Path) -> Result<Vec<PathBuf>> {
    let read = match fs::read_dir(base_dir) {
        Ok(read) => read,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            if base_dir.is_file() {
                return Err(Error::shard(format!(
                    "shard directory {} is a file",
                    base_dir.display()
                )));
            }
            return Err(e.into());
        }
    };

    let mut paths = Vec::new();
    for entry in read {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == SHARD_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Day encoded in a shard file name, if it is one
pub fn parse_shard_date(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let day = name.strip_suffix(".jsonl")?;
    if day.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(day, DAY_FORMAT).ok()
}
