//! Cron expression validation and next-run projection.
//!
//! Five-field expressions follow the classic crontab grammar, including
//! the rule that a day matches when *either* day-of-month or day-of-week
//! matches if both are restricted. A sixth field, when present, lists the
//! seconds within each matching minute (`min hour dom mon dow sec`).

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("expected 5 fields (or 6 with seconds), found {0}")]
    FieldCount(usize),
    #[error("invalid {field} field '{value}': {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("unknown nickname: {0}")]
    UnknownNickname(String),
}

#[derive(Clone, Copy)]
struct FieldKind {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
}

const SECOND: FieldKind = FieldKind { name: "second", min: 0, max: 59, names: &[] };
const MINUTE: FieldKind = FieldKind { name: "minute", min: 0, max: 59, names: &[] };
const HOUR: FieldKind = FieldKind { name: "hour", min: 0, max: 23, names: &[] };
const DAY_OF_MONTH: FieldKind = FieldKind { name: "day-of-month", min: 1, max: 31, names: &[] };
const MONTH: FieldKind = FieldKind {
    name: "month",
    min: 1,
    max: 12,
    names: &["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"],
};
// 7 is accepted as an alias for Sunday and folded onto 0 after parsing.
const DAY_OF_WEEK: FieldKind = FieldKind {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &["sun", "mon", "tue", "wed", "thu", "fri", "sat"],
};

// Longest gap between two firings of a satisfiable expression is a Feb 29
// schedule skipping a non-leap century year.
const SEARCH_HORIZON_DAYS: i64 = 366 * 9;

/// A parsed expression, one bitmask per field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    seconds: u64,
    minutes: u64,
    hours: u64,
    days: u64,
    months: u64,
    weekdays: u64,
    dom_restricted: bool,
    dow_restricted: bool,
    has_seconds: bool,
}

pub fn parse_schedule(s: &str) -> Result<Schedule, ScheduleError> {
    let s = s.trim();
    if let Some(nickname) = s.strip_prefix('@') {
        let expanded = match nickname.to_lowercase().as_str() {
            "yearly" | "annually" => "0 0 1 1 *",
            "monthly" => "0 0 1 * *",
            "weekly" => "0 0 * * 0",
            "daily" | "midnight" => "0 0 * * *",
            "hourly" => "0 * * * *",
            _ => return Err(ScheduleError::UnknownNickname(s.to_string())),
        };
        return parse_fields(&expanded.split_whitespace().collect::<Vec<_>>());
    }

    let fields: Vec<&str> = s.split_whitespace().collect();
    match fields.len() {
        5 | 6 => parse_fields(&fields),
        n => Err(ScheduleError::FieldCount(n)),
    }
}

/// True iff `expression` is a well-formed schedule. Never fails.
pub fn validate(expression: &str) -> bool {
    parse_schedule(expression).is_ok()
}

/// The next `count` firings strictly after `from`, ascending. Empty when the
/// expression is invalid or cannot produce `count` firings.
pub fn next_runs<Tz: TimeZone>(expression: &str, count: usize, from: &DateTime<Tz>) -> Vec<DateTime<Tz>> {
    match parse_schedule(expression) {
        Ok(schedule) => schedule.next_runs(count, from),
        Err(_) => Vec::new(),
    }
}

pub fn next_runs_from_now(expression: &str, count: usize) -> Vec<DateTime<Local>> {
    next_runs(expression, count, &Local::now())
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_schedule(s)
    }
}

impl Schedule {
    /// Whether a crontab line can hold this expression (no seconds field).
    pub fn is_standard(&self) -> bool {
        !self.has_seconds
    }

    pub fn next_runs<Tz: TimeZone>(&self, count: usize, from: &DateTime<Tz>) -> Vec<DateTime<Tz>> {
        if count == 0 {
            return Vec::new();
        }
        let runs = self.project(count, from);
        if runs.len() == count {
            runs
        } else {
            Vec::new()
        }
    }

    fn matches_day(&self, date: NaiveDate) -> bool {
        let dom = self.days & (1 << date.day()) != 0;
        let dow = self.weekdays & (1 << date.weekday().num_days_from_sunday()) != 0;
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    /// First matching wall-clock second strictly after `after`.
    fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut t = after.date().and_hms_opt(after.hour(), after.minute(), after.second())? + Duration::seconds(1);
        let horizon = after + Duration::days(SEARCH_HORIZON_DAYS);

        while t <= horizon {
            if self.months & (1 << t.month()) == 0 {
                let (y, m) = if t.month() == 12 { (t.year() + 1, 1) } else { (t.year(), t.month() + 1) };
                t = NaiveDate::from_ymd_opt(y, m, 1)?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.matches_day(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if self.hours & (1 << t.hour()) == 0 {
                t = t.date().and_hms_opt(t.hour(), 0, 0)? + Duration::hours(1);
                continue;
            }
            let minute_start = t.date().and_hms_opt(t.hour(), t.minute(), 0)?;
            if self.minutes & (1 << t.minute()) == 0 {
                t = minute_start + Duration::minutes(1);
                continue;
            }
            let later = self.seconds >> t.second();
            if later == 0 {
                t = minute_start + Duration::minutes(1);
                continue;
            }
            return Some(t + Duration::seconds(i64::from(later.trailing_zeros())));
        }
        None
    }

    fn project<Tz: TimeZone>(&self, count: usize, from: &DateTime<Tz>) -> Vec<DateTime<Tz>> {
        let tz = from.timezone();
        let mut cursor = from.naive_local();
        let mut runs: Vec<DateTime<Tz>> = Vec::new();

        while runs.len() < count {
            let Some(next) = self.next_after(cursor) else {
                break;
            };
            cursor = next;
            // Wall-clock times inside a DST gap have no instant; skip them.
            let Some(instant) = tz.from_local_datetime(&next).earliest() else {
                continue;
            };
            let after_last = runs.last().map_or(true, |last| instant > *last);
            if instant > *from && after_last {
                runs.push(instant);
            }
        }
        runs
    }
}

fn parse_fields(fields: &[&str]) -> Result<Schedule, ScheduleError> {
    let minutes = parse_field(fields[0], MINUTE)?;
    let hours = parse_field(fields[1], HOUR)?;
    let days = parse_field(fields[2], DAY_OF_MONTH)?;
    let months = parse_field(fields[3], MONTH)?;
    let mut weekdays = parse_field(fields[4], DAY_OF_WEEK)?;
    if weekdays & (1 << 7) != 0 {
        weekdays = (weekdays & !(1 << 7)) | 1;
    }
    let seconds = match fields.get(5) {
        Some(field) => parse_field(field, SECOND)?,
        None => 1,
    };

    Ok(Schedule {
        seconds,
        minutes,
        hours,
        days,
        months,
        weekdays,
        dom_restricted: !fields[2].starts_with('*'),
        dow_restricted: !fields[4].starts_with('*'),
        has_seconds: fields.len() == 6,
    })
}

fn parse_field(text: &str, kind: FieldKind) -> Result<u64, ScheduleError> {
    let invalid = |reason: String| ScheduleError::InvalidField {
        field: kind.name,
        value: text.to_string(),
        reason,
    };

    let mut bits = 0u64;
    for part in text.split(',') {
        if part.is_empty() {
            return Err(invalid("empty list element".to_string()));
        }

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| invalid(format!("bad step '{}'", step)))?;
                if step == 0 || step > kind.max - kind.min + 1 {
                    return Err(invalid(format!("step {} out of range", step)));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (lo, hi) = if range == "*" {
            (kind.min, kind.max)
        } else if let Some((a, b)) = range.split_once('-') {
            (field_value(a, kind).map_err(&invalid)?, field_value(b, kind).map_err(&invalid)?)
        } else {
            let v = field_value(range, kind).map_err(&invalid)?;
            // `5/15` means "from 5 to the end, every 15"
            if step.is_some() {
                (v, kind.max)
            } else {
                (v, v)
            }
        };

        if lo > hi {
            return Err(invalid(format!("range {}-{} is backwards", lo, hi)));
        }

        let step = step.unwrap_or(1) as usize;
        for v in (lo..=hi).step_by(step) {
            bits |= 1 << v;
        }
    }
    Ok(bits)
}

fn field_value(token: &str, kind: FieldKind) -> Result<u32, String> {
    let lower = token.to_lowercase();
    if let Some(idx) = kind.names.iter().position(|n| *n == lower) {
        return Ok(idx as u32 + kind.min);
    }
    let v: u32 = token.parse().map_err(|_| format!("unrecognized value '{}'", token))?;
    if v < kind.min || v > kind.max {
        return Err(format!("{} outside {}-{}", v, kind.min, kind.max));
    }
    Ok(v)
}
