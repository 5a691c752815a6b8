//! Query DSL
//!
//! Parses text such as
//!
//! ```text
//! level=ERROR message~"auth" OR level in (WARN, INFO) since=10m
//! ```
//!
//! into a [`Filter`]. Tokens are whitespace separated; quotes embed spaces
//! and parenthesised lists are kept whole. `OR` (any case) separates
//! AND-groups.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::filter::{AndFilter, Filter};

/// Operator of a single clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// `key=value`
    Eq,
    /// `key~value`
    Contains,
    /// `key in (a,b)`
    In,
}

impl Op {
    fn symbol(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Contains => "~",
            Op::In => "in",
        }
    }
}

/// Parse query text against the current clock
pub fn parse(text: &str) -> Result<Filter> {
    parse_at(text, Utc::now())
}

/// Parse query text, resolving relative durations against `now`
pub fn parse_at(text: &str, now: DateTime<Utc>) -> Result<Filter> {
    let tokens = tokenize(text)?;
    let groups = split_on_or(&tokens);

    let mut branches = groups
        .iter()
        .map(|group| parse_and_group(group, now))
        .collect::<Result<Vec<_>>>()?;

    let filter = match branches.len() {
        0 => Filter::default(),
        1 => Filter::And(branches.remove(0)),
        _ => Filter::Or(branches),
    };
    debug!(query = text, filter = %filter, "parsed query");
    Ok(filter)
}

/// Split query text into tokens.
///
/// Quotes outside a parenthesised list are removed and their contents
/// kept verbatim. A list opens only with a `(` starting the token after
/// `in`; inside it whitespace and quotes are literal. Elsewhere
/// parentheses are ordinary characters.
pub fn tokenize(text: &str) -> Result<Vec<String>> {
    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for ch in text.chars() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
                if depth > 0 {
                    current.push(ch);
                }
            } else {
                current.push(ch);
            }
            continue;
        }

        match ch {
            '"' | '\'' => {
                quote = Some(ch);
                if depth > 0 {
                    current.push(ch);
                }
            }
            '(' if depth > 0 => {
                depth += 1;
                current.push(ch);
            }
            '(' if current.is_empty() && tokens.last().map_or(false, |t| t.eq_ignore_ascii_case("in")) => {
                depth = 1;
                current.push(ch);
            }
            ')' if depth > 0 => {
                depth -= 1;
                current.push(ch);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if quote.is_some() {
        return Err(Error::parse(current, "unterminated quote"));
    }
    if depth > 0 {
        return Err(Error::parse(current, "unterminated parenthesis"));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Group tokens into AND-groups separated by `OR`.
///
/// A `key in (list)` triple is joined into one clause.
pub fn split_on_or(tokens: &[String]) -> Vec<Vec<String>> {
    let mut groups = Vec::new();
    let mut current = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];
        if token.eq_ignore_ascii_case("or") {
            if !current.is_empty() {
                groups.push(std::mem::take(&mut current));
            }
            i += 1;
            continue;
        }

        if i + 2 < tokens.len() && tokens[i + 1].eq_ignore_ascii_case("in") {
            current.push(format!("{} in {}", token, tokens[i + 2]));
            i += 3;
            continue;
        }

        current.push(token.clone());
        i += 1;
    }

    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Split one clause into `(key, op, value)`.
///
/// The operator is the leftmost `=` or `~`; ` in ` only counts when it
/// appears before either of them.
pub fn split_token(token: &str) -> Result<(String, Op, String)> {
    let op_at = token.find(|c: char| c == '=' || c == '~');
    let in_at = token.to_ascii_lowercase().find(" in ");

    let (key, op, value) = match (in_at, op_at) {
        (Some(i), op_at) if op_at.map_or(true, |o| i < o) => {
            (&token[..i], Op::In, &token[i + 4..])
        }
        (_, Some(o)) => {
            let op = if token[o..].starts_with('~') { Op::Contains } else { Op::Eq };
            (&token[..o], op, &token[o + 1..])
        }
        (_, None) => {
            return Err(Error::parse(token, "expected key=value, key~value or key in (...)"));
        }
    };

    let key = key.trim();
    let value = value.trim();
    if key.is_empty() || value.is_empty() {
        return Err(Error::parse(token, "invalid token"));
    }

    let value = if op == Op::In { value.to_string() } else { trim_quotes(value).to_string() };
    Ok((key.to_string(), op, value))
}

/// Parse the value of an `in` clause
pub fn parse_in_list(value: &str) -> Result<Vec<String>> {
    let trimmed = value.trim();
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|v| v.strip_suffix(')'))
        .unwrap_or(trimmed);

    let items: Vec<String> = inner
        .split(',')
        .map(|item| trim_quotes(item.trim()).trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect();

    if items.is_empty() {
        return Err(Error::parse(value, "empty in() list"));
    }
    Ok(items)
}

fn trim_quotes(s: &str) -> &str {
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

fn parse_and_group(tokens: &[String], now: DateTime<Utc>) -> Result<AndFilter> {
    let mut filter = AndFilter::new();

    for token in tokens {
        let (key, op, value) = split_token(token)?;
        match key.to_ascii_lowercase().as_str() {
            "level" => match op {
                Op::In => {
                    if filter.level.is_some() {
                        return Err(Error::parse(token, "level and level in cannot be combined"));
                    }
                    filter.level_in.extend(parse_in_list(&value)?);
                }
                Op::Eq => {
                    if !filter.level_in.is_empty() {
                        return Err(Error::parse(token, "level and level in cannot be combined"));
                    }
                    filter.level = Some(value);
                }
                Op::Contains => return Err(unsupported(&key, op, "'=' or 'in'")),
            },
            "message" | "search" => match op {
                Op::Eq | Op::Contains => filter.search = Some(value),
                Op::In => return Err(unsupported(&key, op, "'~' or '='")),
            },
            "since" => {
                if op != Op::Eq {
                    return Err(unsupported(&key, op, "'='"));
                }
                filter.after = Some(now - parse_window(&key, &value)?);
            }
            "after" | "before" => {
                if op != Op::Eq {
                    return Err(unsupported(&key, op, "'='"));
                }
                let at = DateTime::parse_from_rfc3339(&value)
                    .map_err(|e| Error::parse(token, format!("invalid {} timestamp: {}", key, e)))?
                    .with_timezone(&Utc);
                if key.eq_ignore_ascii_case("after") {
                    filter.after = Some(at);
                } else {
                    filter.before = Some(at);
                }
            }
            _ => return Err(Error::parse(key, "unknown filter key")),
        }
    }

    Ok(filter)
}

/// Parse a duration such as `10m`, `1h30m` or `7d`
pub fn parse_window(key: &str, value: &str) -> Result<Duration> {
    let std = humantime::parse_duration(value)
        .map_err(|e| Error::parse(key, format!("invalid duration '{}': {}", value, e)))?;
    Duration::from_std(std)
        .map_err(|_| Error::parse(key, format!("duration '{}' is out of range", value)))
}

fn unsupported(key: &str, op: Op, allowed: &str) -> Error {
    Error::parse(
        key,
        format!("operator '{}' not supported; {} supports only {}", op.symbol(), key, allowed),
    )
}
