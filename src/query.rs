//! Query execution
//!
//! Evaluates a [`Filter`] against a working set, optionally narrowing the
//! candidates through an [`Index`] first. Every candidate is verified
//! against the whole filter, so the indexed and full-scan paths return the
//! same entries.

use std::collections::HashSet;
use std::sync::Arc;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tracing::debug;

use crate::dsl;
use crate::engine::LoadStats;
use crate::entry::EntryRef;
use crate::error::Result;
use crate::filter::{level_key, AndFilter, Filter};
use crate::index::Index;
use crate::metrics::QueryMetrics;

/// Time range for querying logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Start time (inclusive)
    pub start: DateTime<Utc>,
    /// End time (exclusive)
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a new time range
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The window of the given length ending at `now`
    pub fn last(window: Duration, now: DateTime<Utc>) -> Self {
        Self { start: now - window, end: now }
    }

    /// Create a time range for the last N minutes
    pub fn last_minutes(minutes: i64) -> Self {
        Self::last(Duration::minutes(minutes), Utc::now())
    }

    /// Create a time range for the last N hours
    pub fn last_hours(hours: i64) -> Self {
        Self::last(Duration::hours(hours), Utc::now())
    }

    /// Create a time range for the last N days
    pub fn last_days(days: i64) -> Self {
        Self::last(Duration::days(days), Utc::now())
    }

    /// Check if an instant falls inside the range
    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        *at >= self.start && *at < self.end
    }
}

/// How candidates for an AND-filter are obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessPath {
    /// `by_level` bucket of one level
    Level(String),
    /// De-duplicated union of several `by_level` buckets
    LevelIn(Vec<String>),
    /// Hour buckets from the cutoff's hour onwards
    Since(DateTime<Utc>),
    /// Every entry of the working set
    Scan,
}

impl AccessPath {
    /// Pick the access path for a filter
    pub fn choose(filter: &AndFilter, use_index: bool) -> Self {
        if !use_index {
            return Self::Scan;
        }
        if let Some(ref level) = filter.level {
            Self::Level(level.clone())
        } else if !filter.level_in.is_empty() {
            Self::LevelIn(filter.level_in.clone())
        } else if let Some(after) = filter.after {
            Self::Since(after)
        } else {
            Self::Scan
        }
    }

    /// Plan step describing this path
    pub fn describe(&self) -> String {
        match self {
            Self::Level(level) => format!("index(level={})", level_key(level)),
            Self::LevelIn(levels) => format!("index(level_in={})", levels.join(",")),
            Self::Since(after) => format!("index(time>={})", format_time(after)),
            Self::Scan => "scan(all)".to_string(),
        }
    }
}

/// Entries returned by a query with its metrics
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Matching entries after the limit
    pub entries: Vec<EntryRef>,
    /// Execution metrics
    pub metrics: QueryMetrics,
}

/// Evaluate `filter` over `entries`, applying `limit` when it is positive
pub fn execute(
    entries: &[EntryRef],
    index: Option<&Index>,
    filter: &Filter,
    limit: usize,
    load_stats: &LoadStats,
) -> QueryResult {
    let started_at = Utc::now();
    let mut matched = filter_entries(entries, index, filter);
    let match_count = matched.len();

    if limit > 0 {
        matched.truncate(limit);
    }

    let metrics = QueryMetrics {
        started_at,
        finished_at: Utc::now(),
        logs_read: load_stats.logs_read,
        logs_ingested: load_stats.logs_ingested,
        logs_filtered_out: entries.len().saturating_sub(match_count),
        logs_returned: matched.len(),
        index_enabled: index.is_some(),
    };
    debug!(
        total = entries.len(),
        matched = match_count,
        returned = metrics.logs_returned,
        indexed = metrics.index_enabled,
        "executed query"
    );

    QueryResult { entries: matched, metrics }
}

/// All entries matching `filter`, without limit.
///
/// OR branches are evaluated independently; an entry reached through
/// several branches is kept once, at its first occurrence.
pub fn filter_entries(entries: &[EntryRef], index: Option<&Index>, filter: &Filter) -> Vec<EntryRef> {
    match filter {
        Filter::And(and) => filter_and(entries, index, and),
        Filter::Or(branches) => {
            let parts: Vec<Vec<EntryRef>> = branches
                .iter()
                .map(|branch| filter_and(entries, index, branch))
                .collect();

            let mut seen = HashSet::new();
            let mut combined = Vec::new();
            for entry in parts.iter().flatten() {
                if seen.insert(entry.key()) {
                    combined.push(Arc::clone(entry));
                }
            }
            combined
        }
    }
}

fn filter_and(entries: &[EntryRef], index: Option<&Index>, filter: &AndFilter) -> Vec<EntryRef> {
    let verify = |candidates: &[EntryRef]| -> Vec<EntryRef> {
        candidates.iter().filter(|e| filter.matches(e)).cloned().collect()
    };

    let Some(index) = index else {
        return verify(entries);
    };

    match AccessPath::choose(filter, true) {
        AccessPath::Level(level) => verify(index.level(&level)),
        AccessPath::LevelIn(levels) => verify(&index.levels_union(&levels)),
        AccessPath::Since(after) => verify(&index.since(&after)),
        AccessPath::Scan => verify(entries),
    }
}

/// Describe how a filter would be evaluated
pub fn explain(filter: &Filter, query_text: &str, use_index: bool) -> Vec<String> {
    let mut plan = Vec::new();
    match filter {
        Filter::And(and) => plan.extend(explain_and(and, use_index)),
        Filter::Or(branches) => {
            plan.push(format!("union({})", branches.len()));
            for (i, branch) in branches.iter().enumerate() {
                plan.extend(
                    explain_and(branch, use_index)
                        .into_iter()
                        .map(|step| format!("branch[{}]: {}", i, step)),
                );
            }
            plan.push("dedup(timestamp,level,message)".to_string());
        }
    }

    if !query_text.trim().is_empty() {
        plan.push("dsl(parse)".to_string());
    }
    plan
}

fn explain_and(filter: &AndFilter, use_index: bool) -> Vec<String> {
    let mut steps = vec![AccessPath::choose(filter, use_index).describe()];

    if let Some(ref level) = filter.level {
        if !use_index {
            steps.push(format!("filter(level={})", level_key(level)));
        }
    }
    if !filter.level_in.is_empty() {
        steps.push(format!("filter(level_in={})", filter.level_in.join(",")));
    }
    if let Some(ref after) = filter.after {
        steps.push(format!("filter(after={})", format_time(after)));
    }
    if let Some(ref before) = filter.before {
        steps.push(format!("filter(before={})", format_time(before)));
    }
    if let Some(ref text) = filter.search {
        steps.push(format!("filter(message~{:?})", text));
    }
    steps
}

fn format_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// A resolved query: filter, limit and index preference
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Filter to evaluate
    pub filter: Filter,
    /// Maximum number of results; zero means unlimited
    pub limit: usize,
    /// Whether to evaluate through an index
    pub use_index: bool,
    /// DSL text the filter was partly built from
    pub text: Option<String>,
}

impl Query {
    /// Start building a query
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    /// Run the query.
    ///
    /// With `use_index` set and no index supplied, one is built from
    /// `entries` for this run.
    pub fn run(&self, entries: &[EntryRef], index: Option<&Index>, load_stats: &LoadStats) -> QueryResult {
        if !self.use_index {
            return execute(entries, None, &self.filter, self.limit, load_stats);
        }

        match index {
            Some(index) => execute(entries, Some(index), &self.filter, self.limit, load_stats),
            None => {
                let built = Index::build(entries);
                execute(entries, Some(&built), &self.filter, self.limit, load_stats)
            }
        }
    }

    /// Plan steps for this query
    pub fn explain(&self) -> Vec<String> {
        explain(&self.filter, self.text.as_deref().unwrap_or(""), self.use_index)
    }
}

/// Builder for constructing queries from flag-style settings and DSL text
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    base: AndFilter,
    since: Option<Duration>,
    text: Option<String>,
    limit: usize,
    use_index: bool,
    now: Option<DateTime<Utc>>,
}

impl QueryBuilder {
    /// Create a new query builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by exact level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.base = self.base.with_level(level);
        self
    }

    /// Filter by any of several levels
    pub fn with_levels<I, S>(mut self, levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base = self.base.with_levels(levels);
        self
    }

    /// Filter by message substring
    pub fn containing_text(mut self, text: impl Into<String>) -> Self {
        self.base = self.base.containing(text);
        self
    }

    /// Only entries newer than `now - window`
    pub fn in_last(mut self, window: Duration) -> Self {
        self.since = Some(window);
        self
    }

    /// Only entries inside the range
    pub fn in_time_range(mut self, range: TimeRange) -> Self {
        self.base = self.base.after(range.start).before(range.end);
        self
    }

    /// Only entries at or after `at`
    pub fn after(mut self, at: DateTime<Utc>) -> Self {
        self.base = self.base.after(at);
        self
    }

    /// Only entries before `at`
    pub fn before(mut self, at: DateTime<Utc>) -> Self {
        self.base = self.base.before(at);
        self
    }

    /// Add DSL text, merged with the other settings
    pub fn with_query(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.text = if text.trim().is_empty() { None } else { Some(text) };
        self
    }

    /// Limit the number of results
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Evaluate through an index
    pub fn use_index(mut self, enabled: bool) -> Self {
        self.use_index = enabled;
        self
    }

    /// Resolve relative windows against a fixed clock
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Build the query, merging flag settings with the parsed DSL text
    pub fn build(self) -> Result<Query> {
        let now = self.now.unwrap_or_else(Utc::now);
        let mut base = self.base;
        if let Some(window) = self.since {
            base = base.since(window, now);
        }
        let base = Filter::And(base);

        let filter = match self.text {
            Some(ref text) => Filter::merge(&base, &dsl::parse_at(text, now)?)?,
            None => base,
        };

        Ok(Query {
            filter,
            limit: self.limit,
            use_index: self.use_index,
            text: self.text,
        })
    }

    /// Build and run the query
    pub fn execute(self, entries: &[EntryRef], index: Option<&Index>, load_stats: &LoadStats) -> Result<QueryResult> {
        Ok(self.build()?.run(entries, index, load_stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{into_refs, LogEntry};
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 8, h, m, 0).unwrap()
    }

    fn sample() -> Vec<EntryRef> {
        into_refs(vec![
            LogEntry::at_utc(at(10, 5), "ERROR", "a"),
            LogEntry::at_utc(at(10, 45), "WARN", "b"),
            LogEntry::at_utc(at(11, 10), "ERROR", "c"),
        ])
    }

    fn messages(entries: &[EntryRef]) -> Vec<&str> {
        entries.iter().map(|e| e.message.as_str()).collect()
    }

    fn both_paths(entries: &[EntryRef], filter: &Filter) -> (Vec<EntryRef>, Vec<EntryRef>) {
        let index = Index::build(entries);
        (filter_entries(entries, Some(&index), filter), filter_entries(entries, None, filter))
    }

    #[test]
    fn test_level_scenario() {
        let entries = sample();
        let filter = dsl::parse_at("level=ERROR", at(12, 0)).unwrap();
        let (indexed, scanned) = both_paths(&entries, &filter);
        assert_eq!(messages(&indexed), vec!["a", "c"]);
        assert_eq!(messages(&scanned), vec!["a", "c"]);
    }

    #[test]
    fn test_level_or_level_scenario() {
        let entries = sample();
        let filter = dsl::parse_at("level=ERROR OR level=WARN", at(12, 0)).unwrap();
        let (indexed, scanned) = both_paths(&entries, &filter);
        assert_eq!(messages(&indexed), vec!["a", "c", "b"]);
        assert_eq!(messages(&scanned), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_level_in_with_search_scenario() {
        let entries = sample();
        let filter = dsl::parse_at(r#"level in (ERROR,WARN) message~"a""#, at(12, 0)).unwrap();
        let (indexed, scanned) = both_paths(&entries, &filter);
        assert_eq!(messages(&indexed), vec!["a"]);
        assert_eq!(messages(&scanned), vec!["a"]);

        let filter = dsl::parse_at("level in (WARN, ERROR)", at(12, 0)).unwrap();
        let (indexed, scanned) = both_paths(&entries, &filter);
        assert_eq!(messages(&indexed), vec!["b", "a", "c"]);
        assert_eq!(messages(&scanned), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_level_or_since() {
        let entries = sample();
        let filter = dsl::parse_at("level=WARN OR since=20m", at(11, 15)).unwrap();
        let (indexed, scanned) = both_paths(&entries, &filter);
        assert_eq!(messages(&indexed), vec!["b", "c"]);
        assert_eq!(messages(&scanned), vec!["b", "c"]);
    }

    #[test]
    fn test_cutoff_hour_is_verified() {
        let entries = sample();
        let filter = Filter::from(AndFilter::new().after(at(10, 30)));
        let (indexed, scanned) = both_paths(&entries, &filter);
        assert_eq!(messages(&indexed), vec!["b", "c"]);
        assert_eq!(messages(&scanned), vec!["b", "c"]);
    }

    #[test]
    fn test_or_dedups_first_occurrence() {
        let entries = sample();
        let filter = Filter::Or(vec![
            AndFilter::new().with_level("WARN"),
            AndFilter::new(),
            AndFilter::new().with_level("ERROR"),
        ]);
        let (indexed, scanned) = both_paths(&entries, &filter);
        assert_eq!(messages(&indexed), vec!["b", "a", "c"]);
        assert_eq!(messages(&scanned), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_execute_limit_and_metrics() {
        let entries = sample();
        let stats = LoadStats { logs_read: 3, logs_ingested: 3 };
        let filter = Filter::from(AndFilter::new().with_level("error"));

        let result = execute(&entries, None, &filter, 1, &stats);
        assert_eq!(messages(&result.entries), vec!["a"]);
        assert_eq!(result.metrics.logs_filtered_out, 1);
        assert_eq!(result.metrics.logs_returned, 1);
        assert_eq!(result.metrics.logs_read, 3);
        assert!(!result.metrics.index_enabled);
        assert_eq!(result.metrics.rate_per_sec(), None);

        let index = Index::build(&entries);
        let result = execute(&entries, Some(&index), &filter, 0, &stats);
        assert_eq!(result.metrics.logs_returned, 2);
        assert!(result.metrics.index_enabled);
    }

    #[test]
    fn test_explain_and() {
        let filter = Filter::from(AndFilter::new().with_level("error").after(at(10, 0)).containing("db"));
        assert_eq!(
            explain(&filter, "", true),
            vec![
                "index(level=ERROR)",
                "filter(after=2026-02-08T10:00:00Z)",
                "filter(message~\"db\")",
            ]
        );
        assert_eq!(
            explain(&filter, "level=error", false),
            vec![
                "scan(all)",
                "filter(level=ERROR)",
                "filter(after=2026-02-08T10:00:00Z)",
                "filter(message~\"db\")",
                "dsl(parse)",
            ]
        );
        assert_eq!(explain(&Filter::default(), "", true), vec!["scan(all)"]);
    }

    #[test]
    fn test_explain_or() {
        let filter = Filter::Or(vec![
            AndFilter::new().with_levels(["WARN", "ERROR"]),
            AndFilter::new().after(at(10, 0)),
        ]);
        assert_eq!(
            explain(&filter, "x", true),
            vec![
                "union(2)",
                "branch[0]: index(level_in=WARN,ERROR)",
                "branch[0]: filter(level_in=WARN,ERROR)",
                "branch[1]: index(time>=2026-02-08T10:00:00Z)",
                "branch[1]: filter(after=2026-02-08T10:00:00Z)",
                "dedup(timestamp,level,message)",
                "dsl(parse)",
            ]
        );
    }

    #[test]
    fn test_builder_merges_flags_and_text() {
        let query = Query::builder()
            .containing_text("auth")
            .with_query("level=ERROR OR level=WARN")
            .limit(5)
            .use_index(true)
            .at(at(12, 0))
            .build()
            .unwrap();

        assert_eq!(
            query.filter,
            Filter::Or(vec![
                AndFilter::new().with_level("ERROR").containing("auth"),
                AndFilter::new().with_level("WARN").containing("auth"),
            ])
        );
        assert_eq!(query.limit, 5);
        assert_eq!(query.explain().last().map(String::as_str), Some("dsl(parse)"));
    }

    #[test]
    fn test_builder_conflict() {
        let err = Query::builder()
            .with_level("ERROR")
            .with_query("level=WARN")
            .build()
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_builder_in_last_and_run() {
        let entries = sample();
        let result = Query::builder()
            .in_last(Duration::minutes(30))
            .use_index(true)
            .at(at(11, 15))
            .execute(&entries, None, &LoadStats::default())
            .unwrap();
        assert_eq!(messages(&result.entries), vec!["b", "c"]);
        assert!(result.metrics.index_enabled);
    }

    #[test]
    fn test_time_range() {
        let range = TimeRange::last(Duration::hours(1), at(11, 0));
        assert!(range.contains(&at(10, 0)));
        assert!(!range.contains(&at(11, 0)));

        let query = Query::builder().in_time_range(range).build().unwrap();
        assert_eq!(query.filter.time_bounds(), (Some(at(10, 0)), Some(at(11, 0))));
    }
}
