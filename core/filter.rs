use crate::error::{AppError, Result};
use byte_unit::Byte;
use chrono::{
    DateTime, Duration as ChronoDuration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
};
use regex::{Regex, RegexBuilder};
use std::time::SystemTime;

/// Comparison operator for the size comparator string.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SizeOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
}

/// Parsed form of a size comparator such as `"> 10K"` or `"<= 1.5MB"`.
/// A bare value (`"10K"`) means "at least this big".
#[derive(Debug, Clone)]
pub struct SizePredicate {
    op: SizeOp,
    bytes: u64,
}

impl SizePredicate {
    pub fn parse(spec: &str) -> Result<Self> {
        let trimmed = spec.trim();
        let (op, rest) = if let Some(rest) = trimmed.strip_prefix(">=") {
            (SizeOp::Ge, rest)
        } else if let Some(rest) = trimmed.strip_prefix("<=") {
            (SizeOp::Le, rest)
        } else if let Some(rest) = trimmed.strip_prefix('>') {
            (SizeOp::Gt, rest)
        } else if let Some(rest) = trimmed.strip_prefix('<') {
            (SizeOp::Lt, rest)
        } else if let Some(rest) = trimmed.strip_prefix('=') {
            (SizeOp::Eq, rest)
        } else {
            (SizeOp::Ge, trimmed)
        };

        let value = rest.trim();
        if value.is_empty() {
            return Err(AppError::Filter(format!(
                "Size comparator \"{}\" has no value",
                spec
            )));
        }
        let byte = Byte::parse_str(value, true).map_err(|e| {
            AppError::Filter(format!("Invalid size value \"{}\": {}", value, e))
        })?;
        Ok(SizePredicate {
            op,
            bytes: byte.as_u64(),
        })
    }

    pub fn matches(&self, len: u64) -> bool {
        match self.op {
            SizeOp::Gt => len > self.bytes,
            SizeOp::Ge => len >= self.bytes,
            SizeOp::Lt => len < self.bytes,
            SizeOp::Le => len <= self.bytes,
            SizeOp::Eq => len == self.bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DateDirection {
    /// Modified at or after the pivot instant.
    Since,
    /// Modified at or before the pivot instant.
    Until,
}

/// Parsed form of a date comparator such as `"since yesterday"`,
/// `"> 2 weeks"` or `"before 2024-01-01"`. A bare operand means "since".
#[derive(Debug, Clone)]
pub struct DatePredicate {
    direction: DateDirection,
    pivot: DateTime<Local>,
}

impl DatePredicate {
    pub fn parse(spec: &str) -> Result<Self> {
        let trimmed = spec.trim();
        let (direction, rest) = if let Some(rest) = keyword_prefix(trimmed, &["since", "after"]) {
            (DateDirection::Since, rest)
        } else if let Some(rest) = keyword_prefix(trimmed, &["until", "before"]) {
            (DateDirection::Until, rest)
        } else if let Some(rest) = trimmed.strip_prefix(">=").or(trimmed.strip_prefix('>')) {
            (DateDirection::Since, rest)
        } else if let Some(rest) = trimmed.strip_prefix("<=").or(trimmed.strip_prefix('<')) {
            (DateDirection::Until, rest)
        } else {
            (DateDirection::Since, trimmed)
        };

        let operand = rest.trim();
        if operand.is_empty() {
            return Err(AppError::Filter(format!(
                "Date comparator \"{}\" has no operand",
                spec
            )));
        }
        Ok(DatePredicate {
            direction,
            pivot: resolve_date_operand(operand)?,
        })
    }

    pub fn matches(&self, mtime: SystemTime) -> bool {
        let mtime: DateTime<Local> = DateTime::from(mtime);
        match self.direction {
            DateDirection::Since => mtime >= self.pivot,
            DateDirection::Until => mtime <= self.pivot,
        }
    }
}

fn keyword_prefix<'a>(spec: &'a str, keywords: &[&str]) -> Option<&'a str> {
    for kw in keywords {
        if let Some(rest) = spec.strip_prefix(kw) {
            if rest.starts_with(char::is_whitespace) {
                return Some(rest);
            }
        }
    }
    None
}

/// Resolves a date operand: a relative keyword, a human duration counted
/// back from now, or an ISO date / datetime.
fn resolve_date_operand(operand: &str) -> Result<DateTime<Local>> {
    let now = Local::now();
    match operand.to_ascii_lowercase().as_str() {
        "now" => return Ok(now),
        "today" => {
            return local_from_naive(now.date_naive().and_time(NaiveTime::MIN));
        }
        "yesterday" => {
            let day = now.date_naive() - ChronoDuration::days(1);
            return local_from_naive(day.and_time(NaiveTime::MIN));
        }
        "last week" => return Ok(now - ChronoDuration::weeks(1)),
        "last month" => return Ok(now - ChronoDuration::days(30)),
        _ => {}
    }

    if let Ok(date) = NaiveDate::parse_from_str(operand, "%Y-%m-%d") {
        return local_from_naive(date.and_time(NaiveTime::MIN));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(operand, "%Y-%m-%d %H:%M:%S") {
        return local_from_naive(dt);
    }

    let duration = parse_duration::parse(operand).map_err(|e| {
        AppError::Filter(format!("Unrecognized date operand \"{}\": {}", operand, e))
    })?;
    let duration = ChronoDuration::from_std(duration)
        .map_err(|e| AppError::Filter(format!("Duration out of range \"{}\": {}", operand, e)))?;
    Ok(now - duration)
}

fn local_from_naive(naive: NaiveDateTime) -> Result<DateTime<Local>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| AppError::Filter(format!("Ambiguous local datetime: {}", naive)))
}

/// Compiled `contains` / `not_contains` patterns. A plain substring is a
/// valid regex; a malformed pattern is a configuration error for the source.
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    patterns: Vec<Regex>,
}

impl ContentFilter {
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let regex = RegexBuilder::new(pattern)
                .multi_line(true)
                .build()
                .map_err(|e| {
                    AppError::Regex(format!("Invalid content pattern \"{}\": {}", pattern, e))
                })?;
            compiled.push(regex);
        }
        Ok(ContentFilter { patterns: compiled })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// True when any pattern matches (OR within the field).
    pub fn matches(&self, content: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn size_predicate_operators() {
        assert!(SizePredicate::parse("> 10K").unwrap().matches(10_001));
        assert!(!SizePredicate::parse("> 10K").unwrap().matches(10_000));
        assert!(SizePredicate::parse("<= 1KB").unwrap().matches(1_000));
        assert!(SizePredicate::parse("= 42").unwrap().matches(42));
        // Bare value means "at least".
        assert!(SizePredicate::parse("1K").unwrap().matches(2_000));
        assert!(!SizePredicate::parse("1K").unwrap().matches(500));
    }

    #[test]
    fn size_predicate_rejects_garbage() {
        assert!(SizePredicate::parse(">").is_err());
        assert!(SizePredicate::parse("big").is_err());
    }

    #[test]
    fn date_predicate_since_yesterday_matches_now() {
        let pred = DatePredicate::parse("since yesterday").unwrap();
        assert!(pred.matches(SystemTime::now()));
    }

    #[test]
    fn date_predicate_until_excludes_recent_files() {
        let pred = DatePredicate::parse("before 2000-01-01").unwrap();
        assert!(!pred.matches(SystemTime::now()));
        let old = SystemTime::UNIX_EPOCH + Duration::from_secs(86_400);
        assert!(pred.matches(old));
    }

    #[test]
    fn date_predicate_duration_operand() {
        let pred = DatePredicate::parse("> 2 weeks").unwrap();
        assert!(pred.matches(SystemTime::now()));
        let old = SystemTime::now() - Duration::from_secs(30 * 86_400);
        assert!(!pred.matches(old));
    }

    #[test]
    fn date_predicate_rejects_unknown_operand() {
        assert!(DatePredicate::parse("since the dawn of time").is_err());
    }

    #[test]
    fn content_filter_substring_and_regex() {
        let filter = ContentFilter::compile(&["fn main".to_string()]).unwrap();
        assert!(filter.matches("fn main() {}"));
        assert!(!filter.matches("struct Main;"));

        let filter = ContentFilter::compile(&[r"^use \w+;$".to_string()]).unwrap();
        assert!(filter.matches("use std;\nfn main() {}"));
    }

    #[test]
    fn content_filter_reports_bad_regex() {
        assert!(ContentFilter::compile(&["(unclosed".to_string()]).is_err());
    }
}
