//! Level and hour index
//!
//! Groups a working set of entries by uppercased level and by UTC hour
//! bucket (`YYYY-MM-DDTHH`). The index holds shared handles into the
//! working set, so it is cheap to build and is rebuilt whenever the set
//! changes rather than updated in place.
//!
//! [`SnapshotIndex`] is the persisted form: the same groupings expressed
//! as positions into the entry array they were built from.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tracing::{debug, warn};

use crate::entry::{EntryRef, LogEntry};
use crate::filter::level_key;

/// Format of hour bucket keys; fixed width so keys sort chronologically
pub const HOUR_BUCKET_FORMAT: &str = "%Y-%m-%dT%H";

/// Hour bucket key of an instant
pub fn hour_bucket(at: &DateTime<Utc>) -> String {
    at.format(HOUR_BUCKET_FORMAT).to_string()
}

/// In-memory index over a working set
#[derive(Debug, Clone, Default)]
pub struct Index {
    /// Entries per uppercased level, in working-set order
    by_level: HashMap<String, Vec<EntryRef>>,
    /// Entries per hour bucket, in working-set order
    by_hour: HashMap<String, Vec<EntryRef>>,
    /// Sorted distinct bucket keys
    hours: Vec<String>,
}

/// Statistics about an index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Number of indexed entries
    pub entry_count: usize,
    /// Number of distinct levels
    pub level_count: usize,
    /// Number of hour buckets
    pub bucket_count: usize,
}

/// Position form of an [`Index`] stored inside snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotIndex {
    #[serde(default)]
    pub by_level: BTreeMap<String, Vec<i64>>,
    #[serde(default)]
    pub by_hour: BTreeMap<String, Vec<i64>>,
    #[serde(default)]
    pub hours: Vec<String>,
}

impl Index {
    /// Build an index in a single pass over `entries`
    pub fn build(entries: &[EntryRef]) -> Self {
        let mut by_level: HashMap<String, Vec<EntryRef>> = HashMap::new();
        let mut by_hour: HashMap<String, Vec<EntryRef>> = HashMap::new();

        for entry in entries {
            by_level
                .entry(level_key(&entry.level))
                .or_default()
                .push(Arc::clone(entry));
            by_hour
                .entry(hour_bucket(&entry.instant()))
                .or_default()
                .push(Arc::clone(entry));
        }

        let index = Self::from_buckets(by_level, by_hour);
        debug!(
            entries = entries.len(),
            levels = index.by_level.len(),
            buckets = index.hours.len(),
            "built index"
        );
        index
    }

    fn from_buckets(
        by_level: HashMap<String, Vec<EntryRef>>,
        by_hour: HashMap<String, Vec<EntryRef>>,
    ) -> Self {
        let mut hours: Vec<String> = by_hour.keys().cloned().collect();
        hours.sort();
        Self { by_level, by_hour, hours }
    }

    /// Entries with the given level (case-insensitive)
    pub fn level(&self, level: &str) -> &[EntryRef] {
        self.by_level
            .get(&level_key(level))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Entries of any of the given levels, de-duplicated in first-seen order
    pub fn levels_union(&self, levels: &[String]) -> Vec<EntryRef> {
        let mut seen = HashSet::new();
        let mut union = Vec::new();
        for level in levels {
            for entry in self.level(level) {
                if seen.insert(entry.key()) {
                    union.push(Arc::clone(entry));
                }
            }
        }
        union
    }

    /// Entries in the given hour bucket
    pub fn hour(&self, bucket: &str) -> &[EntryRef] {
        self.by_hour.get(bucket).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sorted bucket keys
    pub fn hours(&self) -> &[String] {
        &self.hours
    }

    /// Uppercased level keys, sorted
    pub fn levels(&self) -> Vec<&str> {
        let mut levels: Vec<&str> = self.by_level.keys().map(String::as_str).collect();
        levels.sort_unstable();
        levels
    }

    /// Entries of every bucket at or after the cutoff's bucket.
    ///
    /// The cutoff's own hour is included whole, so callers must still
    /// verify each candidate against the exact cutoff.
    pub fn since(&self, cutoff: &DateTime<Utc>) -> Vec<EntryRef> {
        let start_key = hour_bucket(cutoff);
        let start = self.hours.partition_point(|h| h.as_str() < start_key.as_str());
        self.hours[start..]
            .iter()
            .flat_map(|h| self.hour(h).iter().cloned())
            .collect()
    }

    /// Get statistics about the index
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            entry_count: self.by_hour.values().map(Vec::len).sum(),
            level_count: self.by_level.len(),
            bucket_count: self.hours.len(),
        }
    }

    /// Express the index as positions into `entries`.
    ///
    /// `entries` must be the working set the index was built from; handles
    /// are matched by identity. Indexed entries that are not part of
    /// `entries` are left out.
    pub fn to_snapshot(&self, entries: &[EntryRef]) -> SnapshotIndex {
        let mut positions: HashMap<*const LogEntry, Vec<usize>> = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            positions.entry(Arc::as_ptr(entry)).or_default().push(i);
        }

        let mut missing = 0usize;
        let mut convert = |buckets: &HashMap<String, Vec<EntryRef>>| {
            let mut out = BTreeMap::new();
            for (key, bucket) in buckets {
                let mut used: HashMap<*const LogEntry, usize> = HashMap::new();
                let mut list = Vec::with_capacity(bucket.len());
                for entry in bucket {
                    let ptr = Arc::as_ptr(entry);
                    let n = used.entry(ptr).or_insert(0);
                    match positions.get(&ptr).and_then(|p| p.get(*n)) {
                        Some(&pos) => {
                            list.push(pos as i64);
                            *n += 1;
                        }
                        None => missing += 1,
                    }
                }
                if !list.is_empty() {
                    out.insert(key.clone(), list);
                }
            }
            out
        };

        let by_level = convert(&self.by_level);
        let by_hour = convert(&self.by_hour);
        if missing > 0 {
            debug!(missing, "index entries not present in snapshot entry set");
        }

        let hours = by_hour.keys().cloned().collect();
        SnapshotIndex { by_level, by_hour, hours }
    }

    /// Rehydrate an index from its position form.
    ///
    /// Positions outside `entries` (negative included) are dropped; the
    /// number dropped is returned alongside the index. Bucket keys are
    /// taken from the rehydrated buckets, not from the stored `hours`.
    pub fn from_snapshot(snapshot: &SnapshotIndex, entries: &[EntryRef]) -> (Self, usize) {
        let mut skipped = 0usize;
        let mut resolve = |positions: &[i64]| -> Vec<EntryRef> {
            let mut out = Vec::with_capacity(positions.len());
            for &p in positions {
                match usize::try_from(p).ok().and_then(|i| entries.get(i)) {
                    Some(entry) => out.push(Arc::clone(entry)),
                    None => skipped += 1,
                }
            }
            out
        };

        let mut by_level: HashMap<String, Vec<EntryRef>> = HashMap::new();
        for (level, positions) in &snapshot.by_level {
            let bucket = resolve(positions);
            if !bucket.is_empty() {
                by_level.entry(level_key(level)).or_default().extend(bucket);
            }
        }

        let mut by_hour: HashMap<String, Vec<EntryRef>> = HashMap::new();
        for (hour, positions) in &snapshot.by_hour {
            let bucket = resolve(positions);
            if !bucket.is_empty() {
                by_hour.insert(hour.clone(), bucket);
            }
        }

        let index = Self::from_buckets(by_level, by_hour);
        if skipped > 0 {
            warn!(skipped, entries = entries.len(), "dropped out-of-range snapshot index positions");
        }
        if index.hours != snapshot.hours {
            debug!(
                stored = snapshot.hours.len(),
                derived = index.hours.len(),
                "snapshot hour list differs from its buckets"
            );
        }
        (index, skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{into_refs, LogEntry};
    use chrono::TimeZone;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, d, h, m, 0).unwrap()
    }

    fn sample() -> Vec<EntryRef> {
        into_refs(vec![
            LogEntry::at_utc(at(8, 10, 5), "ERROR", "a"),
            LogEntry::at_utc(at(8, 10, 45), "warn", "b"),
            LogEntry::at_utc(at(8, 11, 10), "Error", "c"),
            LogEntry::at_utc(at(9, 0, 0), "INFO", "d"),
        ])
    }

    fn messages(entries: &[EntryRef]) -> Vec<&str> {
        entries.iter().map(|e| e.message.as_str()).collect()
    }

    #[test]
    fn test_hour_bucket_is_utc() {
        assert_eq!(hour_bucket(&at(8, 7, 30)), "2026-02-08T07");
        let shifted = DateTime::parse_from_rfc3339("2026-02-08T01:30:00+05:00").unwrap();
        assert_eq!(hour_bucket(&shifted.with_timezone(&Utc)), "2026-02-07T20");
    }

    #[test]
    fn test_build_groups_by_level_and_hour() {
        let entries = sample();
        let index = Index::build(&entries);

        assert_eq!(messages(index.level("error")), vec!["a", "c"]);
        assert_eq!(messages(index.level("WARN")), vec!["b"]);
        assert!(index.level("DEBUG").is_empty());
        assert_eq!(index.levels(), vec!["ERROR", "INFO", "WARN"]);

        assert_eq!(index.hours(), &["2026-02-08T10", "2026-02-08T11", "2026-02-09T00"]);
        assert_eq!(messages(index.hour("2026-02-08T10")), vec!["a", "b"]);

        assert_eq!(
            index.stats(),
            IndexStats { entry_count: 4, level_count: 3, bucket_count: 3 }
        );
    }

    #[test]
    fn test_since_includes_cutoff_hour() {
        let index = Index::build(&sample());
        assert_eq!(messages(&index.since(&at(8, 10, 30))), vec!["a", "b", "c", "d"]);
        assert_eq!(messages(&index.since(&at(8, 11, 59))), vec!["c", "d"]);
        assert!(index.since(&at(9, 1, 0)).is_empty());
    }

    #[test]
    fn test_levels_union_dedups() {
        let index = Index::build(&sample());
        let union = index.levels_union(&["WARN".into(), "error".into(), "Warn".into()]);
        assert_eq!(messages(&union), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let entries = sample();
        let index = Index::build(&entries);
        let snapshot = index.to_snapshot(&entries);

        assert_eq!(snapshot.by_level["ERROR"], vec![0, 2]);
        assert_eq!(snapshot.by_hour["2026-02-08T10"], vec![0, 1]);
        assert_eq!(snapshot.hours, index.hours().to_vec());

        let (restored, skipped) = Index::from_snapshot(&snapshot, &entries);
        assert_eq!(skipped, 0);
        assert_eq!(restored.hours(), index.hours());
        assert_eq!(messages(restored.level("ERROR")), vec!["a", "c"]);
        assert_eq!(restored.to_snapshot(&entries), snapshot);
    }

    #[test]
    fn test_snapshot_with_repeated_handles() {
        let entries = sample();
        let mut doubled = entries.clone();
        doubled.push(Arc::clone(&entries[0]));

        let index = Index::build(&doubled);
        let snapshot = index.to_snapshot(&doubled);
        assert_eq!(snapshot.by_level["ERROR"], vec![0, 2, 4]);
    }

    #[test]
    fn test_from_snapshot_drops_out_of_range() {
        let entries = sample();
        let mut snapshot = Index::build(&entries).to_snapshot(&entries);
        snapshot.by_level.get_mut("ERROR").unwrap().extend([-1, 99]);
        snapshot.by_hour.insert("2030-01-01T00".into(), vec![42]);

        let (restored, skipped) = Index::from_snapshot(&snapshot, &entries);
        assert_eq!(skipped, 3);
        assert_eq!(messages(restored.level("ERROR")), vec!["a", "c"]);
        assert!(!restored.hours().contains(&"2030-01-01T00".to_string()));
    }

    #[test]
    fn test_from_snapshot_derives_hours() {
        let entries = sample();
        let mut snapshot = Index::build(&entries).to_snapshot(&entries);
        snapshot.hours.truncate(1);

        let (restored, _) = Index::from_snapshot(&snapshot, &entries);
        assert_eq!(restored.hours().len(), 3);
        assert_eq!(restored.since(&at(8, 0, 0)).len(), 4);
    }

    #[test]
    fn test_snapshot_index_json_shape() {
        let entries = sample();
        let snapshot = Index::build(&entries).to_snapshot(&entries);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json.get("byLevel").is_some());
        assert!(json.get("byHour").is_some());
        assert_eq!(json["hours"][0], "2026-02-08T10");

        let parsed: SnapshotIndex = serde_json::from_str(r#"{"byLevel":{"INFO":[0]}}"#).unwrap();
        assert!(parsed.by_hour.is_empty());
    }
}
