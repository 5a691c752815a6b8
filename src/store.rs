//! JSONL entry store
//!
//! One JSON object per line. Lines that do not parse as an entry, such as
//! the run header blocks written between ingestion runs, are skipped on
//! read.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use crate::entry::{LogEntry, sort_by_time, into_refs, EntryRef};
use crate::error::Result;

const HEADER_BORDER: &str = "════════════════════════════════════";

/// An append-only JSONL file of entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    /// Open a store at `path`; the file is created on first append
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry in the store
    pub fn load(&self) -> Result<Vec<LogEntry>> {
        load_jsonl(&self.path)
    }

    /// Append entries, returning how many were written
    pub fn append<'a, I>(&self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a LogEntry>,
    {
        append_jsonl(&self.path, entries)
    }

    /// Append a free-form header block
    pub fn append_header(&self, header: &str) -> Result<()> {
        append_header(&self.path, header)
    }

    /// Number of lines currently in the store
    pub fn line_count(&self) -> Result<usize> {
        count_lines(&self.path)
    }

    /// Header block for a new ingestion run from `source` into this store
    pub fn run_header(&self, source: &str) -> Result<String> {
        let existing = self.line_count()?;
        Ok(run_header(source, &self.path.display().to_string(), existing, Utc::now()))
    }
}

/// Read entries from a JSONL file, skipping lines that are not entries
pub fn load_jsonl<P: AsRef<Path>>(path: P) -> Result<Vec<LogEntry>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);

    let mut entries = Vec::new();
    let mut skipped = 0usize;
    for line in reader.split(b'\n') {
        let line = line?;
        let line = trim_line(&line);
        if line.is_empty() {
            continue;
        }
        match serde_json::from_slice::<LogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(_) => skipped += 1,
        }
    }

    debug!(path = %path.display(), entries = entries.len(), skipped, "loaded jsonl");
    Ok(entries)
}

fn trim_line(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

/// Read entries from several JSONL files.
///
/// Missing files are skipped. The merged entries are stably sorted by
/// timestamp.
pub fn load_many<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<EntryRef>> {
    let mut all = Vec::new();
    for path in paths {
        let path = path.as_ref();
        match load_jsonl(path) {
            Ok(entries) => all.extend(entries),
            Err(crate::error::Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "skipping missing file");
            }
            Err(e) => return Err(e),
        }
    }

    let mut refs = into_refs(all);
    sort_by_time(&mut refs);
    Ok(refs)
}

/// Append entries as JSON lines, creating the file and its directory
pub fn append_jsonl<'a, P, I>(path: P, entries: I) -> Result<usize>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a LogEntry>,
{
    let path = path.as_ref();
    ensure_parent(path)?;
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);

    let mut written = 0;
    for entry in entries {
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;

    debug!(path = %path.display(), written, "appended jsonl");
    Ok(written)
}

/// Append a header block verbatim
pub fn append_header<P: AsRef<Path>>(path: P, header: &str) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(header.as_bytes())?;
    Ok(())
}

/// Count lines in a file; a missing file has none
pub fn count_lines<P: AsRef<Path>>(path: P) -> Result<usize> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut count = 0;
    for line in BufReader::new(file).split(b'\n') {
        line?;
        count += 1;
    }
    Ok(count)
}

/// Header block written before each ingestion run
pub fn run_header(source: &str, dest: &str, existing: usize, started: DateTime<Utc>) -> String {
    let mut header = String::new();
    header.push_str(HEADER_BORDER);
    header.push('\n');
    header.push_str("Log ingestion run\n");
    header.push_str(&format!("Started at : {}\n", started.to_rfc3339_opts(SecondsFormat::Secs, true)));
    header.push_str(&format!("Source     : {}\n", source));
    header.push_str(&format!("Destination: {}\n", dest));
    header.push_str(&format!("Existing   : {} entries\n", format_count(existing)));
    header.push_str("Mode       : append (JSONL)\n");
    header.push_str(HEADER_BORDER);
    header.push('\n');
    header
}

/// Format a count with comma thousands separators
pub fn format_count(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub(crate) fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir),
        _ => Ok(()),
    }
}
