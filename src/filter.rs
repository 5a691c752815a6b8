//! Filter model
//!
//! A [`Filter`] is either a single AND-group of constraints or a flat OR
//! of AND-groups. Nested ORs are not representable.

use std::fmt;
use chrono::{DateTime, Duration, SecondsFormat, Utc};

use crate::entry::LogEntry;
use crate::error::{Error, Result};

/// Canonical form of a level used for comparison and index keys
pub fn level_key(level: &str) -> String {
    level.to_uppercase()
}

/// A conjunction of constraints over a log entry.
///
/// Every unset field is vacuously satisfied, so `AndFilter::default()`
/// matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AndFilter {
    /// Exact level (case-insensitive)
    pub level: Option<String>,
    /// Accepted levels (case-insensitive); empty means unset
    pub level_in: Vec<String>,
    /// Case-insensitive substring of the message
    pub search: Option<String>,
    /// Inclusive lower time bound
    pub after: Option<DateTime<Utc>>,
    /// Exclusive upper time bound
    pub before: Option<DateTime<Utc>>,
}

impl AndFilter {
    /// Create an empty filter that matches every entry
    pub fn new() -> Self {
        Self::default()
    }

    /// Require an exact level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        let level = level.into();
        self.level = if level.is_empty() { None } else { Some(level) };
        self
    }

    /// Require one of several levels
    pub fn with_levels<I, S>(mut self, levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.level_in = levels
            .into_iter()
            .map(Into::into)
            .filter(|l: &String| !l.is_empty())
            .collect();
        self
    }

    /// Require a substring in the message
    pub fn containing(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.search = if text.is_empty() { None } else { Some(text) };
        self
    }

    /// Set the inclusive lower bound
    pub fn after(mut self, at: DateTime<Utc>) -> Self {
        self.after = Some(at);
        self
    }

    /// Set the exclusive upper bound
    pub fn before(mut self, at: DateTime<Utc>) -> Self {
        self.before = Some(at);
        self
    }

    /// Set the lower bound to `now - window`
    pub fn since(self, window: Duration, now: DateTime<Utc>) -> Self {
        self.after(now - window)
    }

    /// Check whether no constraint is set
    pub fn is_empty(&self) -> bool {
        self.level.is_none()
            && self.level_in.is_empty()
            && self.search.is_none()
            && self.after.is_none()
            && self.before.is_none()
    }

    /// Check if an entry satisfies every constraint
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if !self.level_in.is_empty() {
            let key = level_key(&entry.level);
            if !self.level_in.iter().any(|l| level_key(l) == key) {
                return false;
            }
        }

        if let Some(ref level) = self.level {
            if level_key(level) != level_key(&entry.level) {
                return false;
            }
        }

        let instant = entry.instant();
        if let Some(after) = self.after {
            if instant < after {
                return false;
            }
        }
        if let Some(before) = self.before {
            if instant >= before {
                return false;
            }
        }

        if let Some(ref text) = self.search {
            if !entry.message.to_lowercase().contains(&text.to_lowercase()) {
                return false;
            }
        }

        true
    }
}

/// A predicate over log entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// All constraints must hold
    And(AndFilter),
    /// At least one branch must hold
    Or(Vec<AndFilter>),
}

impl Default for Filter {
    fn default() -> Self {
        Self::And(AndFilter::default())
    }
}

impl From<AndFilter> for Filter {
    fn from(filter: AndFilter) -> Self {
        Self::And(filter)
    }
}

impl Filter {
    /// Build the filter the command-line flags describe
    pub fn from_flags(level: &str, cutoff: Option<DateTime<Utc>>, search: &str) -> Self {
        let mut filter = AndFilter::new().with_level(level).containing(search);
        filter.after = cutoff;
        Self::And(filter)
    }

    /// Combine branches with OR. A single branch collapses to an AND-filter.
    pub fn any_of(mut branches: Vec<AndFilter>) -> Self {
        if branches.len() == 1 {
            return Self::And(branches.remove(0));
        }
        Self::Or(branches)
    }

    /// The AND-groups of this filter, one for an AND-filter
    pub fn branches(&self) -> &[AndFilter] {
        match self {
            Self::And(filter) => std::slice::from_ref(filter),
            Self::Or(branches) => branches,
        }
    }

    /// Check whether this filter carries no constraint at all
    pub fn is_empty(&self) -> bool {
        match self {
            Self::And(filter) => filter.is_empty(),
            Self::Or(_) => false,
        }
    }

    /// Check if an entry matches
    pub fn matches(&self, entry: &LogEntry) -> bool {
        match self {
            Self::And(filter) => filter.matches(entry),
            Self::Or(branches) => branches.iter().any(|b| b.matches(entry)),
        }
    }

    /// Loosest time window covering every branch.
    ///
    /// A side is `None` as soon as one branch leaves it open.
    pub fn time_bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let branches = self.branches();
        if branches.is_empty() {
            return (None, None);
        }

        let after = branches
            .iter()
            .map(|b| b.after)
            .collect::<Option<Vec<_>>>()
            .and_then(|bounds| bounds.into_iter().min());
        let before = branches
            .iter()
            .map(|b| b.before)
            .collect::<Option<Vec<_>>>()
            .and_then(|bounds| bounds.into_iter().max());

        (after, before)
    }

    /// Merge `extra` into `base`.
    ///
    /// An OR on either side is distributed over the other side's branches.
    pub fn merge(base: &Filter, extra: &Filter) -> Result<Filter> {
        if base.is_empty() {
            return Ok(extra.clone());
        }
        if extra.is_empty() {
            return Ok(base.clone());
        }

        match (base, extra) {
            (Self::And(a), Self::And(b)) => merge_and(a, b).map(Self::And),
            (Self::And(a), Self::Or(bs)) => bs
                .iter()
                .map(|b| merge_and(a, b))
                .collect::<Result<Vec<_>>>()
                .map(Self::Or),
            (Self::Or(as_), Self::And(b)) => as_
                .iter()
                .map(|a| merge_and(a, b))
                .collect::<Result<Vec<_>>>()
                .map(Self::Or),
            (Self::Or(as_), Self::Or(bs)) => {
                let mut merged = Vec::with_capacity(as_.len() * bs.len());
                for a in as_ {
                    for b in bs {
                        merged.push(merge_and(a, b)?);
                    }
                }
                Ok(Self::Or(merged))
            }
        }
    }
}

fn merge_and(base: &AndFilter, extra: &AndFilter) -> Result<AndFilter> {
    let mut merged = base.clone();

    if !extra.level_in.is_empty() {
        if merged.level.is_some() {
            return Err(Error::conflict("conflicting level filters: level and level in"));
        }
        for level in &extra.level_in {
            let key = level_key(level);
            if !merged.level_in.iter().any(|l| level_key(l) == key) {
                merged.level_in.push(level.clone());
            }
        }
    }

    if let Some(ref level) = extra.level {
        if !merged.level_in.is_empty() {
            return Err(Error::conflict("conflicting level filters: level and level in"));
        }
        match merged.level {
            Some(ref current) if level_key(current) != level_key(level) => {
                return Err(Error::conflict(format!(
                    "conflicting level filters: {} and {}",
                    current, level
                )));
            }
            Some(_) => {}
            None => merged.level = Some(level.clone()),
        }
    }

    if let Some(ref text) = extra.search {
        match merged.search {
            Some(ref current) if current != text => {
                return Err(Error::conflict(format!(
                    "conflicting search filters: {:?} and {:?}",
                    current, text
                )));
            }
            Some(_) => {}
            None => merged.search = Some(text.clone()),
        }
    }

    merged.after = match (merged.after, extra.after) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
    merged.before = match (merged.before, extra.before) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };

    Ok(merged)
}

fn format_instant(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl fmt::Display for AndFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(ref level) = self.level {
            parts.push(format!("level={}", level));
        }
        if !self.level_in.is_empty() {
            parts.push(format!("level in ({})", self.level_in.join(",")));
        }
        if let Some(ref text) = self.search {
            parts.push(format!("message~{:?}", text));
        }
        if let Some(ref after) = self.after {
            parts.push(format!("after={}", format_instant(after)));
        }
        if let Some(ref before) = self.before {
            parts.push(format!("before={}", format_instant(before)));
        }
        write!(f, "{}", parts.join(" "))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(filter) => filter.fmt(f),
            Self::Or(branches) => {
                let rendered: Vec<String> = branches.iter().map(|b| b.to_string()).collect();
                write!(f, "{}", rendered.join(" OR "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 8, h, m, 0).unwrap()
    }

    fn entry(h: u32, m: u32, level: &str, message: &str) -> LogEntry {
        LogEntry::at_utc(at(h, m), level, message)
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = Filter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&entry(10, 5, "ERROR", "a")));
        assert!(filter.matches(&entry(23, 59, "debug", "")));
    }

    #[test]
    fn test_and_filter_fields() {
        let e = entry(10, 5, "Error", "Auth token expired");

        assert!(AndFilter::new().with_level("ERROR").matches(&e));
        assert!(!AndFilter::new().with_level("WARN").matches(&e));
        assert!(AndFilter::new().with_levels(["warn", "error"]).matches(&e));
        assert!(!AndFilter::new().with_levels(["warn", "info"]).matches(&e));
        assert!(AndFilter::new().containing("TOKEN").matches(&e));
        assert!(!AndFilter::new().containing("password").matches(&e));
    }

    #[test]
    fn test_time_window_is_half_open() {
        let filter = AndFilter::new().after(at(10, 0)).before(at(11, 0));
        assert!(filter.matches(&entry(10, 0, "INFO", "lower bound")));
        assert!(filter.matches(&entry(10, 59, "INFO", "inside")));
        assert!(!filter.matches(&entry(11, 0, "INFO", "upper bound")));
        assert!(!filter.matches(&entry(9, 59, "INFO", "too early")));
    }

    #[test]
    fn test_time_window_respects_offsets() {
        let shifted = LogEntry::new(
            DateTime::parse_from_rfc3339("2026-02-08T12:30:00+02:00").unwrap(),
            "INFO",
            "10:30 UTC",
        );
        assert!(AndFilter::new().after(at(10, 0)).before(at(11, 0)).matches(&shifted));
    }

    #[test]
    fn test_or_filter_matches_any_branch() {
        let filter = Filter::Or(vec![
            AndFilter::new().with_level("ERROR"),
            AndFilter::new().containing("disk"),
        ]);
        assert!(filter.matches(&entry(10, 0, "ERROR", "x")));
        assert!(filter.matches(&entry(10, 0, "INFO", "disk full")));
        assert!(!filter.matches(&entry(10, 0, "INFO", "ok")));
        assert!(!Filter::Or(Vec::new()).matches(&entry(10, 0, "INFO", "ok")));
    }

    #[test]
    fn test_merge_with_empty_is_identity() {
        let filter = Filter::from(AndFilter::new().with_level("ERROR").after(at(10, 0)));
        assert_eq!(Filter::merge(&Filter::default(), &filter).unwrap(), filter);
        assert_eq!(Filter::merge(&filter, &Filter::default()).unwrap(), filter);
    }

    #[test]
    fn test_merge_tightens_window() {
        let a = Filter::from(AndFilter::new().after(at(9, 0)).before(at(12, 0)));
        let b = Filter::from(AndFilter::new().after(at(10, 0)).before(at(11, 0)));
        let merged = Filter::merge(&a, &b).unwrap();
        assert_eq!(merged, Filter::from(AndFilter::new().after(at(10, 0)).before(at(11, 0))));
        assert_eq!(Filter::merge(&b, &a).unwrap(), merged);
    }

    #[test]
    fn test_merge_conflicts() {
        let error = Filter::from(AndFilter::new().with_level("ERROR"));
        let warn = Filter::from(AndFilter::new().with_level("WARN"));
        assert!(Filter::merge(&error, &warn).unwrap_err().is_conflict());

        let lower = Filter::from(AndFilter::new().with_level("error"));
        assert!(Filter::merge(&error, &lower).is_ok());

        let levels = Filter::from(AndFilter::new().with_levels(["WARN"]));
        assert!(Filter::merge(&error, &levels).unwrap_err().is_conflict());
        assert!(Filter::merge(&levels, &error).unwrap_err().is_conflict());

        let auth = Filter::from(AndFilter::new().containing("auth"));
        let disk = Filter::from(AndFilter::new().containing("disk"));
        assert!(Filter::merge(&auth, &disk).unwrap_err().is_conflict());
        assert!(Filter::merge(&auth, &auth).is_ok());
    }

    #[test]
    fn test_merge_concatenates_level_lists() {
        let a = Filter::from(AndFilter::new().with_levels(["ERROR", "WARN"]));
        let b = Filter::from(AndFilter::new().with_levels(["warn", "INFO"]));
        let merged = Filter::merge(&a, &b).unwrap();
        assert_eq!(merged, Filter::from(AndFilter::new().with_levels(["ERROR", "WARN", "INFO"])));
    }

    #[test]
    fn test_merge_distributes_over_or() {
        let base = Filter::from(AndFilter::new().containing("auth"));
        let extra = Filter::Or(vec![
            AndFilter::new().with_level("ERROR"),
            AndFilter::new().with_level("WARN"),
        ]);

        let expected = Filter::Or(vec![
            AndFilter::new().with_level("ERROR").containing("auth"),
            AndFilter::new().with_level("WARN").containing("auth"),
        ]);
        assert_eq!(Filter::merge(&base, &extra).unwrap(), expected);
        assert_eq!(Filter::merge(&extra, &base).unwrap(), expected);

        let conflicting = Filter::from(AndFilter::new().with_level("ERROR"));
        assert!(Filter::merge(&conflicting, &extra).unwrap_err().is_conflict());
    }

    #[test]
    fn test_merge_or_with_or_is_cross_product() {
        let a = Filter::Or(vec![
            AndFilter::new().with_level("ERROR"),
            AndFilter::new().with_level("WARN"),
        ]);
        let b = Filter::Or(vec![
            AndFilter::new().containing("auth"),
            AndFilter::new().containing("disk"),
        ]);
        match Filter::merge(&a, &b).unwrap() {
            Filter::Or(branches) => {
                assert_eq!(branches.len(), 4);
                assert_eq!(branches[1], AndFilter::new().with_level("ERROR").containing("disk"));
            }
            other => panic!("expected OR, got {:?}", other),
        }
    }

    #[test]
    fn test_time_bounds() {
        let filter = Filter::Or(vec![
            AndFilter::new().after(at(10, 0)).before(at(11, 0)),
            AndFilter::new().after(at(8, 0)).before(at(9, 0)),
        ]);
        assert_eq!(filter.time_bounds(), (Some(at(8, 0)), Some(at(11, 0))));

        let open = Filter::Or(vec![
            AndFilter::new().after(at(10, 0)),
            AndFilter::new().with_level("ERROR"),
        ]);
        assert_eq!(open.time_bounds(), (None, None));
    }

    #[test]
    fn test_display() {
        let filter = Filter::Or(vec![
            AndFilter::new().with_level("ERROR").containing("auth db"),
            AndFilter::new().with_levels(["WARN", "INFO"]).after(at(10, 0)),
        ]);
        assert_eq!(
            filter.to_string(),
            r#"level=ERROR message~"auth db" OR level in (WARN,INFO) after=2026-02-08T10:00:00Z"#
        );
    }
}
