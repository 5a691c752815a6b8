//! Versioned snapshots of a working set and its index
//!
//! A snapshot is a single JSON document holding metadata, the entries and
//! the position form of their index. Snapshots are written to a temporary
//! file and renamed into place, so readers never observe a partial file.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::entry::EntryRef;
use crate::error::{Error, Result};
use crate::index::{Index, SnapshotIndex};
use crate::store::ensure_parent;

/// Snapshot format version written and accepted by this crate
pub const SNAPSHOT_VERSION: u32 = 1;

/// Descriptive header of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub entry_count: usize,
    #[serde(default)]
    pub source_files: Vec<String>,
}

/// A point-in-time capture of entries plus their index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub entries: Vec<EntryRef>,
    #[serde(default)]
    pub index: SnapshotIndex,
}

#[derive(Deserialize)]
struct VersionProbe {
    metadata: ProbeMetadata,
}

#[derive(Deserialize)]
struct ProbeMetadata {
    version: serde_json::Value,
}

impl Snapshot {
    /// Capture `entries` with an index built from them
    pub fn capture(entries: &[EntryRef], source_files: Vec<String>) -> Self {
        let position_index = Index::build(entries).to_snapshot(entries);

        Self {
            metadata: SnapshotMetadata {
                version: SNAPSHOT_VERSION,
                created_at: Utc::now(),
                entry_count: entries.len(),
                source_files,
            },
            entries: entries.to_vec(),
            index: position_index,
        }
    }

    /// Capture `entries` and write the snapshot to `path`
    pub fn create<P: AsRef<Path>>(path: P, entries: &[EntryRef], source_files: Vec<String>) -> Result<Self> {
        let snapshot = Self::capture(entries, source_files);
        snapshot.write(path)?;
        Ok(snapshot)
    }

    /// Write atomically: temporary file first, then rename over `path`
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        ensure_parent(path)?;

        let tmp = temp_path(path);
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        info!(
            path = %path.display(),
            entries = self.metadata.entry_count,
            "wrote snapshot"
        );
        Ok(())
    }

    /// Read a snapshot and check its version.
    ///
    /// The version is checked before entries are decoded, so a snapshot of
    /// another version fails with [`Error::VersionMismatch`] even when its
    /// entry layout differs.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)?;

        let probe: VersionProbe = serde_json::from_str(&data)?;
        if probe.metadata.version.as_u64() != Some(u64::from(SNAPSHOT_VERSION)) {
            return Err(Error::version_mismatch(SNAPSHOT_VERSION, probe.metadata.version));
        }

        let snapshot: Snapshot = serde_json::from_str(&data)?;
        debug!(
            path = %path.display(),
            entries = snapshot.entries.len(),
            created_at = %snapshot.metadata.created_at,
            "loaded snapshot"
        );
        Ok(snapshot)
    }

    /// Rebuild the index against the snapshot's entries.
    ///
    /// Returns the index and the number of positions that were dropped.
    pub fn rehydrate(&self) -> (Index, usize) {
        Index::from_snapshot(&self.index, &self.entries)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Source files recorded in a snapshot, most derived first
pub fn snapshot_sources(file: Option<&str>, load_path: Option<&str>, snapshot_load: Option<&str>) -> Vec<String> {
    [snapshot_load, load_path, file]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
