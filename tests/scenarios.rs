//! End-to-end scenarios over the public API.

use std::fs;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::tempdir;

use logpipe_rs::entry::into_refs;
use logpipe_rs::shard::days_in_range;
use logpipe_rs::store;
use logpipe_rs::{
    dsl, execute, explain, EngineConfig, EntryRef, Error, Filter, Index, LoadStats, LogEntry,
    MemorySource, ShardManager, Snapshot, SNAPSHOT_VERSION,
};

fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, d, h, m, 0).unwrap()
}

fn sample() -> Vec<EntryRef> {
    into_refs(vec![
        LogEntry::at_utc(at(8, 10, 5), "ERROR", "a"),
        LogEntry::at_utc(at(8, 10, 45), "WARN", "b"),
        LogEntry::at_utc(at(8, 11, 10), "ERROR", "c"),
    ])
}

fn messages(entries: &[EntryRef]) -> Vec<&str> {
    entries.iter().map(|e| e.message.as_str()).collect()
}

#[test_log::test]
fn level_filter_through_index() -> Result<()> {
    let entries = sample();
    let index = Index::build(&entries);
    let filter = dsl::parse("level=ERROR")?;

    let result = execute(&entries, Some(&index), &filter, 0, &LoadStats::default());
    assert_eq!(messages(&result.entries), vec!["a", "c"]);
    assert!(result.metrics.index_enabled);
    assert_eq!(result.metrics.logs_filtered_out, 1);
    Ok(())
}

#[test_log::test]
fn or_of_levels_returns_each_entry_once() -> Result<()> {
    let entries = sample();
    let index = Index::build(&entries);
    let filter = dsl::parse("level=ERROR OR level=WARN")?;

    for index in [None, Some(&index)] {
        let result = execute(&entries, index, &filter, 0, &LoadStats::default());
        let mut found = messages(&result.entries);
        found.sort_unstable();
        assert_eq!(found, vec!["a", "b", "c"]);
    }
    Ok(())
}

#[test_log::test]
fn level_in_and_substring() -> Result<()> {
    let entries = sample();
    let index = Index::build(&entries);
    let filter = dsl::parse(r#"level in (ERROR,WARN) message~"a""#)?;

    let indexed = execute(&entries, Some(&index), &filter, 0, &LoadStats::default());
    let scanned = execute(&entries, None, &filter, 0, &LoadStats::default());
    assert_eq!(messages(&indexed.entries), vec!["a"]);
    assert_eq!(messages(&scanned.entries), vec!["a"]);
    Ok(())
}

#[test_log::test]
fn explain_names_the_access_path() -> Result<()> {
    let filter = dsl::parse("level=ERROR OR level=WARN")?;
    let plan = explain(&filter, "level=ERROR OR level=WARN", true);
    assert_eq!(plan[0], "union(2)");
    assert!(plan.iter().any(|s| s == "branch[0]: index(level=ERROR)"));
    assert_eq!(plan.last().map(String::as_str), Some("dsl(parse)"));
    assert!(plan.iter().any(|s| s == "dedup(timestamp,level,message)"));

    let plan = explain(&Filter::default(), "", false);
    assert_eq!(plan, vec!["scan(all)"]);
    Ok(())
}

#[test_log::test]
fn snapshot_of_newer_version_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("snapshot.json");
    Snapshot::create(&path, &sample(), vec!["app.log".into()])?;

    let mut value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
    value["metadata"]["version"] = serde_json::json!(SNAPSHOT_VERSION + 1);
    fs::write(&path, serde_json::to_string(&value)?)?;

    let config = EngineConfig::new().with_snapshot_load(&path).with_index(true);
    match logpipe_rs::run(&config, None) {
        Err(Error::VersionMismatch { expected, found }) => {
            assert_eq!(expected, 1);
            assert_eq!(found, 2);
        }
        other => panic!("expected a version mismatch, got {:?}", other.map(|r| r.result.entries.len())),
    }
    Ok(())
}

#[test_log::test]
fn shard_range_query_over_two_days() -> Result<()> {
    let dir = tempdir()?;
    let shards = ShardManager::new(dir.path().join("shards"));
    shards.append(&[
        LogEntry::at_utc(at(8, 9, 0), "INFO", "d8 morning"),
        LogEntry::at_utc(at(8, 18, 0), "INFO", "d8 evening"),
        LogEntry::at_utc(at(8, 13, 0), "ERROR", "d8 afternoon"),
        LogEntry::at_utc(at(9, 5, 0), "WARN", "d9 early"),
        LogEntry::at_utc(at(9, 7, 0), "INFO", "d9 after window"),
        LogEntry::at_utc(at(10, 1, 0), "INFO", "d10"),
    ])?;

    let config = EngineConfig::new()
        .with_shard_dir(shards.base_dir())
        .with_shard_read(true)
        .with_query("after=2026-02-08T12:00:00Z before=2026-02-09T06:00:00Z")
        .with_explain(true);

    let report = logpipe_rs::run(&config, None)?;
    assert_eq!(
        messages(&report.result.entries),
        vec!["d8 afternoon", "d8 evening", "d9 early"]
    );
    assert_eq!(report.result.metrics.logs_read, 5);
    assert!(report.plan.contains(&"scan(all)".to_string()));
    Ok(())
}

#[test_log::test]
fn shard_read_with_no_matching_days_is_empty() -> Result<()> {
    let dir = tempdir()?;
    let shards = ShardManager::new(dir.path().join("shards"));
    shards.append(&[LogEntry::at_utc(at(8, 9, 0), "INFO", "d8")])?;

    let config = EngineConfig::new()
        .with_shard_dir(shards.base_dir())
        .with_shard_read(true)
        .with_query("after=2026-03-01T00:00:00Z");
    let report = logpipe_rs::run(&config, None)?;
    assert!(report.result.entries.is_empty());
    assert_eq!(report.result.metrics.logs_read, 0);

    let input = dir.path().join("app.jsonl");
    let store_path = dir.path().join("store.jsonl");
    store::append_jsonl(&input, &[LogEntry::at_utc(at(8, 10, 0), "ERROR", "new")])?;

    let config = config.with_file(&input).with_store(&store_path);
    let report = logpipe_rs::run(&config, None)?;
    assert!(report.result.entries.is_empty());
    assert!(!store_path.exists());
    assert_eq!(shards.load_for_filter(&Filter::default())?.len(), 1);
    Ok(())
}

#[test_log::test]
fn resnapshot_rebuilds_a_truncated_index() -> Result<()> {
    let dir = tempdir()?;
    let old = dir.path().join("old.json");
    let new = dir.path().join("new.json");

    let mut truncated = Snapshot::capture(&sample(), vec!["app.log".into()]);
    truncated.index.by_level.insert("ERROR".to_string(), vec![0]);
    truncated.write(&old)?;

    let config = EngineConfig::new()
        .with_snapshot_load(&old)
        .with_snapshot(&new)
        .with_query("level=ERROR")
        .with_index(true);
    logpipe_rs::run(&config, None)?;

    let written = Snapshot::load(&new)?;
    assert_eq!(written.index, Index::build(&written.entries).to_snapshot(&written.entries));

    let config = EngineConfig::new()
        .with_snapshot_load(&new)
        .with_query("level=ERROR")
        .with_index(true);
    let report = logpipe_rs::run(&config, None)?;
    assert_eq!(messages(&report.result.entries), vec!["a", "c"]);
    Ok(())
}

#[test_log::test]
fn day_range_is_inclusive() {
    let days = days_in_range(Some(at(8, 23, 0)), Some(at(10, 1, 0)));
    assert_eq!(days, vec!["2026-02-08", "2026-02-09", "2026-02-10"]);
    assert!(days_in_range(None, None).is_empty());
}

#[test_log::test]
fn ingest_snapshot_then_query_from_snapshot() -> Result<()> {
    let dir = tempdir()?;
    let store = dir.path().join("store.jsonl");
    let snapshot = dir.path().join("snapshot.json");
    let metrics = dir.path().join("metrics.txt");

    let source = MemorySource::new(sample().iter().map(|e| (**e).clone()).collect()).with_name("app.log");
    let ingest = EngineConfig::new()
        .with_store(&store)
        .with_store_header(true)
        .with_snapshot(&snapshot)
        .with_metrics_file(&metrics);

    let report = logpipe_rs::run(&ingest, Some(&source))?;
    assert_eq!(report.result.entries.len(), 3);
    assert_eq!(report.snapshot.as_deref(), Some(snapshot.as_path()));
    assert!(fs::read_to_string(&metrics)?.contains("metrics.logs_ingested=3"));

    let loaded = Snapshot::load(&snapshot)?;
    assert_eq!(loaded.metadata.source_files, vec!["app.log"]);

    let query = EngineConfig::new()
        .with_snapshot_load(&snapshot)
        .with_level("error")
        .with_index(true);
    let report = logpipe_rs::run(&query, None)?;
    assert_eq!(messages(&report.result.entries), vec!["a", "c"]);
    assert_eq!(report.skipped_positions, 0);

    let replay = EngineConfig::new()
        .with_snapshot_load(&snapshot)
        .with_store(&store)
        .with_replay(true)
        .with_query("level=WARN");
    let report = logpipe_rs::run(&replay, None)?;
    assert_eq!(messages(&report.result.entries), vec!["b", "b"]);
    assert_eq!(report.result.metrics.logs_ingested, 6);
    Ok(())
}

#[test_log::test]
fn conflicting_flag_and_dsl_levels_fail_before_loading() {
    let config = EngineConfig::new()
        .with_load("/nonexistent/store.jsonl")
        .with_level("WARN")
        .with_query("level=ERROR");

    let err = logpipe_rs::run(&config, None).unwrap_err();
    assert!(err.is_conflict());
}
