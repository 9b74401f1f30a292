//! Filter expression compiler
//!
//! A filter expression has the shape `<field><operator><pattern>` with one
//! of the operators `=`, `!=`, `+`, `-` (matched longest-first so `!=` is
//! never mis-split as `=`). Expressions compile into typed predicates; a
//! [`FilterSet`] is a conjunction of predicates, and several sets queried
//! together are additive.
//!
//! Which operators a field accepts, and how its pattern is parsed, is fixed
//! at compile time. Illegal combinations and unparseable patterns are
//! configuration errors carrying the offending expression.

use crate::durations;
use crate::error::{Error, Result};
use crate::types::ShowRecord;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use regex::RegexBuilder;
use std::fs;
use std::path::Path;

/// A filterable show field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Broadcasting channel
    Channel,
    /// Series or collection
    Topic,
    /// Show title
    Title,
    /// Free-text description
    Description,
    /// Regional availability
    Region,
    /// Show fingerprint
    Hash,
    /// Primary-quality media URL (`url` is an alias for this field)
    Url,
    /// Published size
    Size,
    /// Show length
    Duration,
    /// Age at ingestion
    Age,
    /// Broadcast start
    Start,
}

impl Field {
    fn parse(name: &str, expression: &str) -> Result<Self> {
        Ok(match name {
            "channel" => Field::Channel,
            "topic" => Field::Topic,
            "title" => Field::Title,
            "description" => Field::Description,
            "region" => Field::Region,
            "hash" => Field::Hash,
            "url" => Field::Url,
            "size" => Field::Size,
            "duration" => Field::Duration,
            "age" => Field::Age,
            "start" => Field::Start,
            other => {
                return Err(Error::config(
                    format!("invalid filter field {other:?}"),
                    expression,
                ));
            }
        })
    }
}

/// A filter operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=` — contains-match (exact equality for duration/age/size)
    Matches,
    /// `!=` — negation of `=`
    NotMatches,
    /// `+` — field value must be greater than or equal to the pattern
    AtLeast,
    /// `-` — field value must be less than or equal to the pattern
    AtMost,
}

/// A typed comparison value, parsed per the field's column in the legality
/// table.
#[derive(Debug, Clone)]
enum Pattern {
    Text(regex::Regex),
    Span(Duration),
    Bytes(i64),
    Instant(DateTime<Utc>),
}

/// One compiled predicate: field, operator and typed comparison value.
#[derive(Debug, Clone)]
pub struct FilterPredicate {
    field: Field,
    operator: Operator,
    pattern: Pattern,
    /// Original expression, kept for error messages and logging
    source: String,
}

impl FilterPredicate {
    /// Compile a single `<field><operator><pattern>` expression.
    pub fn compile(expression: &str) -> Result<Self> {
        let field_end = expression
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(expression.len());
        let (name, rest) = expression.split_at(field_end);
        if name.is_empty() {
            return Err(Error::config(
                "expected a field name before the operator",
                expression,
            ));
        }

        // Longest operator first, so `!=` is not consumed as `=`.
        let (operator, raw_pattern) = if let Some(p) = rest.strip_prefix("!=") {
            (Operator::NotMatches, p)
        } else if let Some(p) = rest.strip_prefix('=') {
            (Operator::Matches, p)
        } else if let Some(p) = rest.strip_prefix('+') {
            (Operator::AtLeast, p)
        } else if let Some(p) = rest.strip_prefix('-') {
            (Operator::AtMost, p)
        } else {
            return Err(Error::config(
                "expected one of the operators '=', '!=', '+', '-'",
                expression,
            ));
        };

        let field = Field::parse(name, expression)?;
        let pattern = Self::parse_pattern(field, operator, raw_pattern, expression)?;

        Ok(Self {
            field,
            operator,
            pattern,
            source: expression.to_string(),
        })
    }

    /// The original expression text this predicate was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    fn parse_pattern(
        field: Field,
        operator: Operator,
        raw: &str,
        expression: &str,
    ) -> Result<Pattern> {
        let ranged = matches!(operator, Operator::AtLeast | Operator::AtMost);
        match field {
            Field::Channel
            | Field::Topic
            | Field::Title
            | Field::Description
            | Field::Region
            | Field::Hash
            | Field::Url => {
                if ranged {
                    return Err(illegal(field, operator, expression));
                }
                Ok(Pattern::Text(text_pattern(raw, expression)?))
            }
            Field::Duration | Field::Age => Ok(Pattern::Span(durations::parse(raw)?)),
            Field::Size => {
                let bytes: i64 = raw
                    .parse()
                    .map_err(|_| Error::config("size pattern must be an integer", expression))?;
                Ok(Pattern::Bytes(bytes))
            }
            Field::Start => {
                if ranged {
                    Ok(Pattern::Instant(parse_instant(raw, expression)?))
                } else {
                    // Equality on start is a regex against the ISO-8601
                    // rendering of the timestamp.
                    Ok(Pattern::Text(text_pattern(raw, expression)?))
                }
            }
        }
    }

    /// Whether a record satisfies this predicate.
    pub fn matches(&self, show: &ShowRecord) -> bool {
        match (&self.pattern, self.operator) {
            (Pattern::Text(re), op) => {
                let matched = match self.field {
                    Field::Channel => re.is_match(&show.channel),
                    Field::Topic => re.is_match(&show.topic),
                    Field::Title => re.is_match(&show.title),
                    Field::Description => re.is_match(&show.description),
                    Field::Region => re.is_match(&show.region),
                    Field::Hash => re.is_match(&show.hash),
                    Field::Url => re.is_match(&show.url),
                    Field::Start => re.is_match(&show.start.to_rfc3339()),
                    _ => false,
                };
                match op {
                    Operator::NotMatches => !matched,
                    _ => matched,
                }
            }
            (Pattern::Span(span), op) => {
                let value = match self.field {
                    Field::Duration => show.duration,
                    _ => show.age,
                };
                compare(op, value, *span)
            }
            (Pattern::Bytes(bytes), op) => compare(op, show.size, *bytes),
            (Pattern::Instant(instant), op) => compare(op, show.start, *instant),
        }
    }
}

fn compare<T: PartialOrd + PartialEq>(operator: Operator, value: T, pattern: T) -> bool {
    match operator {
        Operator::Matches => value == pattern,
        Operator::NotMatches => value != pattern,
        Operator::AtLeast => value >= pattern,
        Operator::AtMost => value <= pattern,
    }
}

fn illegal(field: Field, operator: Operator, expression: &str) -> Error {
    Error::config(
        format!("invalid operator {operator:?} for field {field:?}"),
        expression,
    )
}

fn text_pattern(raw: &str, expression: &str) -> Result<regex::Regex> {
    RegexBuilder::new(raw)
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::config(format!("invalid pattern: {e}"), expression))
}

/// Parse an ISO-8601 timestamp, accepting a bare date (midnight UTC) and a
/// naive timestamp (assumed UTC) alongside the full offset form.
fn parse_instant(raw: &str, expression: &str) -> Result<DateTime<Utc>> {
    if let Ok(full) = DateTime::parse_from_rfc3339(raw) {
        return Ok(full.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    Err(Error::config(
        "start pattern must be an ISO-8601 timestamp",
        expression,
    ))
}

/// One conjunctive group of predicates: a record matches the set iff it
/// matches every predicate.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    predicates: Vec<FilterPredicate>,
}

impl FilterSet {
    /// Compile an ordered list of expressions into one conjunctive set.
    /// Any invalid expression aborts compilation.
    pub fn compile<S: AsRef<str>>(expressions: &[S]) -> Result<Self> {
        let predicates = expressions
            .iter()
            .map(|e| FilterPredicate::compile(e.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { predicates })
    }

    /// Whether a record matches every predicate in the set.
    pub fn matches(&self, show: &ShowRecord) -> bool {
        self.predicates.iter().all(|p| p.matches(show))
    }

    /// Number of predicates in the set.
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// True if the set has no predicates (and therefore matches everything).
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

/// Read filter sets from a file: one set per line, blank lines and `#`
/// comments ignored, CLI-supplied expressions appended to every line. The
/// overall query result is the concatenation of each set's matches.
///
/// Without a file the CLI expressions form the single set.
pub fn read_filter_sets(
    sets_file: Option<&Path>,
    cli_expressions: &[String],
) -> Result<Vec<FilterSet>> {
    let Some(path) = sets_file else {
        return Ok(vec![FilterSet::compile(cli_expressions)?]);
    };

    let content = fs::read_to_string(path)?;
    let mut sets = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut expressions = split_tokens(line, path)?;
        expressions.extend(cli_expressions.iter().cloned());
        sets.push(FilterSet::compile(&expressions)?);
    }
    Ok(sets)
}

/// Split one filter-set line into expressions, honoring single and double
/// quotes so patterns may contain spaces (`topic='extra 3'`).
fn split_tokens(line: &str, path: &Path) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut pending = false;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                pending = true;
            }
            None if c.is_whitespace() => {
                if pending || !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            None => current.push(c),
        }
    }
    if quote.is_some() {
        return Err(Error::config(
            format!("unbalanced quote in filter-set file {}", path.display()),
            line,
        ));
    }
    if pending || !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}
