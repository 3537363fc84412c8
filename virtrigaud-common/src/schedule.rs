//! Snapshot schedule parsing and evaluation.
//!
//! Accepts standard five, six or seven field cron expressions, the `@hourly`
//! family of macros and `@every <duration>`. Evaluation happens in the
//! schedule's named time zone and the result is resolved to UTC immediately,
//! so downstream queueing never deals with local-time ambiguity.

use std::str::FromStr;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use thiserror::Error;

/// Errors from schedule parsing.
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("empty schedule expression")]
    Empty,

    #[error("invalid cron expression {expr:?}: {message}")]
    InvalidCron { expr: String, message: String },

    #[error("invalid @every duration {0:?}")]
    InvalidEvery(String),

    #[error("unknown time zone {0:?}")]
    UnknownTimeZone(String),
}

/// A parsed snapshot schedule.
#[derive(Debug, Clone)]
pub struct Schedule {
    kind: ScheduleKind,
    tz: Tz,
}

#[derive(Debug, Clone)]
enum ScheduleKind {
    Cron(CronSchedule),
    Every(ChronoDuration),
}

impl Schedule {
    /// Parse a schedule expression with an optional named time zone.
    ///
    /// Defaults to UTC when no zone is given. `@every` intervals ignore the
    /// zone entirely since they are anchored to the previous firing.
    pub fn parse(expr: &str, time_zone: Option<&str>) -> Result<Self, ScheduleError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(ScheduleError::Empty);
        }

        let tz = match time_zone {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| ScheduleError::UnknownTimeZone(name.to_string()))?,
            None => Tz::UTC,
        };

        if let Some(rest) = expr.strip_prefix("@every ") {
            let interval = parse_every(rest.trim())
                .ok_or_else(|| ScheduleError::InvalidEvery(rest.to_string()))?;
            return Ok(Self {
                kind: ScheduleKind::Every(interval),
                tz,
            });
        }

        let normalized = normalize(expr)?;
        let schedule =
            CronSchedule::from_str(&normalized).map_err(|e| ScheduleError::InvalidCron {
                expr: expr.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            kind: ScheduleKind::Cron(schedule),
            tz,
        })
    }

    /// Next firing strictly after `after`, in UTC.
    ///
    /// For `@every` the anchor is `after` itself. Cron schedules may have no
    /// next firing (e.g. a specific past year), hence the Option.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match &self.kind {
            ScheduleKind::Every(interval) => Some(after + *interval),
            ScheduleKind::Cron(schedule) => {
                let local = after.with_timezone(&self.tz);
                schedule.after(&local).next().map(|dt| dt.with_timezone(&Utc))
            }
        }
    }
}

/// Expand macros and pad five-field expressions with a seconds column.
fn normalize(expr: &str) -> Result<String, ScheduleError> {
    if let Some(macro_expr) = expr.strip_prefix('@') {
        let expanded = match macro_expr {
            "yearly" | "annually" => "0 0 0 1 1 *",
            "monthly" => "0 0 0 1 * *",
            "weekly" => "0 0 0 * * Sun",
            "daily" | "midnight" => "0 0 0 * * *",
            "hourly" => "0 0 * * * *",
            other => {
                return Err(ScheduleError::InvalidCron {
                    expr: expr.to_string(),
                    message: format!("unknown macro @{other}"),
                })
            }
        };
        return Ok(expanded.to_string());
    }

    let fields = expr.split_whitespace().count();
    match fields {
        5 => Ok(format!("0 {expr}")),
        6 | 7 => Ok(expr.to_string()),
        n => Err(ScheduleError::InvalidCron {
            expr: expr.to_string(),
            message: format!("expected 5-7 fields, got {n}"),
        }),
    }
}

/// Parse durations of the form "90s", "10m", "1h30m", "2d".
fn parse_every(input: &str) -> Option<ChronoDuration> {
    if input.is_empty() {
        return None;
    }
    let mut total = ChronoDuration::zero();
    let mut digits = String::new();
    for c in input.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let value: i64 = digits.parse().ok()?;
        digits.clear();
        total = total
            + match c {
                's' => ChronoDuration::seconds(value),
                'm' => ChronoDuration::minutes(value),
                'h' => ChronoDuration::hours(value),
                'd' => ChronoDuration::days(value),
                _ => return None,
            };
    }
    if !digits.is_empty() || total <= ChronoDuration::zero() {
        return None;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_five_field_cron() {
        let schedule = Schedule::parse("0 3 * * *", None).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let next = schedule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 2, 3, 0, 0).unwrap());
    }

    #[test]
    fn test_macro_hourly() {
        let schedule = Schedule::parse("@hourly", None).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap();
        let next = schedule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 1, 13, 0, 0).unwrap());
    }

    #[test]
    fn test_every_interval() {
        let schedule = Schedule::parse("@every 1h30m", None).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let next = schedule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 1, 1, 30, 0).unwrap());
    }

    #[test]
    fn test_named_time_zone_resolves_to_utc() {
        // 03:00 in New York is 07:00 or 08:00 UTC depending on DST.
        let schedule = Schedule::parse("0 3 * * *", Some("America/New_York")).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let next = schedule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 2, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(Schedule::parse("", None).is_err());
        assert!(Schedule::parse("@fortnightly", None).is_err());
        assert!(Schedule::parse("* *", None).is_err());
        assert!(Schedule::parse("@every 90x", None).is_err());
        assert!(Schedule::parse("0 3 * * *", Some("Mars/Olympus")).is_err());
    }
}
