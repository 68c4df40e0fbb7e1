//! Job triggers and next-fire computation.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Unit of an interval trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl IntervalUnit {
    fn seconds(self) -> i64 {
        match self {
            IntervalUnit::Seconds => 1,
            IntervalUnit::Minutes => 60,
            IntervalUnit::Hours => 3_600,
            IntervalUnit::Days => 86_400,
            IntervalUnit::Weeks => 604_800,
        }
    }
}

impl std::fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IntervalUnit::Seconds => "seconds",
            IntervalUnit::Minutes => "minutes",
            IntervalUnit::Hours => "hours",
            IntervalUnit::Days => "days",
            IntervalUnit::Weeks => "weeks",
        };
        f.write_str(name)
    }
}

/// When a job fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Trigger {
    /// Fixed period, anchored on the previous scheduled time.
    Interval { unit: IntervalUnit, count: u32 },
    /// Cron expression, 5 fields or 6/7 with seconds.
    Cron { expr: String },
    /// One-shot at a fixed instant.
    Date { at: DateTime<Utc> },
}

impl Trigger {
    pub fn interval(unit: IntervalUnit, count: u32) -> Self {
        Trigger::Interval { unit, count }
    }

    pub fn cron(expr: impl Into<String>) -> Self {
        Trigger::Cron { expr: expr.into() }
    }

    pub fn date(at: DateTime<Utc>) -> Self {
        Trigger::Date { at }
    }

    /// Check the trigger can ever fire, relative to `now`.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), JobError> {
        match self {
            Trigger::Interval { count, .. } => {
                if *count == 0 {
                    return Err(JobError::Validation(
                        "interval count must be at least 1".to_string(),
                    ));
                }
                self.period_secs()
                    .and_then(TimeDelta::try_seconds)
                    .and_then(|period| now.checked_add_signed(period))
                    .map(|_| ())
                    .ok_or_else(|| JobError::Validation("interval is out of range".to_string()))
            }
            Trigger::Cron { expr } => {
                let schedule = parse_cron(expr)?;
                if schedule.after(&now).next().is_none() {
                    return Err(JobError::Validation(format!(
                        "cron expression '{}' never fires again",
                        expr
                    )));
                }
                Ok(())
            }
            Trigger::Date { at } => {
                if *at <= now {
                    return Err(JobError::Validation(format!(
                        "date trigger {} is not in the future",
                        at.to_rfc3339()
                    )));
                }
                Ok(())
            }
        }
    }

    /// First fire time for a job created at `now`.
    pub fn first_run(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Interval { .. } => {
                let period = TimeDelta::try_seconds(self.period_secs()?)?;
                now.checked_add_signed(period)
            }
            Trigger::Cron { expr } => parse_cron(expr).ok()?.after(&now).next(),
            Trigger::Date { at } => Some(*at),
        }
    }

    /// Next fire time after a firing that was scheduled for `scheduled` and
    /// observed at `now`. Missed occurrences collapse into one: the result is
    /// always strictly after `now`. `None` means the job is spent.
    pub fn next_after(
        &self,
        scheduled: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Interval { .. } => {
                let period = self.period_secs()?;
                let elapsed = (now - scheduled).num_seconds().max(0);
                let steps = elapsed / period + 1;
                let offset = TimeDelta::try_seconds(period.checked_mul(steps)?)?;
                scheduled.checked_add_signed(offset)
            }
            Trigger::Cron { expr } => parse_cron(expr).ok()?.after(&now).next(),
            Trigger::Date { .. } => None,
        }
    }

    fn period_secs(&self) -> Option<i64> {
        match self {
            Trigger::Interval { unit, count } if *count > 0 => {
                unit.seconds().checked_mul(i64::from(*count))
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Interval { unit, count } => write!(f, "every {} {}", count, unit),
            Trigger::Cron { expr } => write!(f, "cron '{}'", expr),
            Trigger::Date { at } => write!(f, "at {}", at.to_rfc3339()),
        }
    }
}

/// Normalise a 5-field crontab expression for the `cron` crate: prefix a zero
/// seconds field and renumber the day of week (crontab counts Sunday as 0 or
/// 7, the crate as 1). 6 and 7-field expressions are taken as they are.
pub fn normalize_cron(expr: &str) -> Result<String, JobError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.len() {
        5 => {
            let weekdays = crontab_weekdays(fields[4])?;
            Ok(format!(
                "0 {} {} {} {} {}",
                fields[0], fields[1], fields[2], fields[3], weekdays
            ))
        }
        6 | 7 => Ok(fields.join(" ")),
        n => Err(JobError::Validation(format!(
            "cron expression '{}' has {} fields, expected 5, 6 or 7",
            expr, n
        ))),
    }
}

/// Rewrite the numeric parts of a crontab day-of-week field as explicit
/// `cron` crate day numbers. Wildcards and names pass through.
fn crontab_weekdays(field: &str) -> Result<String, JobError> {
    let mut kept = Vec::new();
    let mut days = BTreeSet::new();
    for part in field.split(',') {
        let (base, step) = match part.split_once('/') {
            Some((base, step)) => (base, Some(step)),
            None => (part, None),
        };
        let numeric = !base.is_empty() && base.chars().all(|c| c.is_ascii_digit() || c == '-');
        if !numeric {
            kept.push(part.to_string());
            continue;
        }

        let (start, end) = match base.split_once('-') {
            Some((start, end)) => (crontab_weekday(start, field)?, crontab_weekday(end, field)?),
            None => {
                let day = crontab_weekday(base, field)?;
                (day, if step.is_some() { 7 } else { day })
            }
        };
        let step = match step {
            Some(step) => step
                .parse::<usize>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| invalid_weekdays(field))?,
            None => 1,
        };
        if start > end {
            return Err(invalid_weekdays(field));
        }
        days.extend((start..=end).step_by(step).map(|day| day % 7 + 1));
    }

    kept.extend(days.into_iter().map(|day| day.to_string()));
    Ok(kept.join(","))
}

fn crontab_weekday(value: &str, field: &str) -> Result<u32, JobError> {
    value
        .parse::<u32>()
        .ok()
        .filter(|day| *day <= 7)
        .ok_or_else(|| invalid_weekdays(field))
}

fn invalid_weekdays(field: &str) -> JobError {
    JobError::Validation(format!(
        "invalid day-of-week field '{}', expected 0-7 (0 or 7 is Sunday)",
        field
    ))
}

fn parse_cron(expr: &str) -> Result<Schedule, JobError> {
    let normalized = normalize_cron(expr)?;
    Schedule::from_str(&normalized)
        .map_err(|e| JobError::Validation(format!("invalid cron expression '{}': {}", expr, e)))
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
