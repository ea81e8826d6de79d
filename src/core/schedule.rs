//! Schedule parsing and next occurrence calculation.
//!
//! A [`Schedule`] is either a fixed interval aligned to a start time or a
//! cron expression evaluated in a timezone. Both answer the same question,
//! "when is the next occurrence after this instant?", which is all the
//! reschedule loop needs. Supports standard 5-field cron, extended 6-field
//! cron (with seconds), shortcuts (@daily, @hourly, etc.), and interval
//! expressions (@every).

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronExpr;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when parsing or using schedules.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Invalid cron expression.
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid interval expression.
    #[error("invalid interval expression: {0}")]
    InvalidInterval(String),

    /// Invalid timezone.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// Unit of an interval period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl IntervalUnit {
    fn seconds(self) -> u64 {
        match self {
            IntervalUnit::Seconds => 1,
            IntervalUnit::Minutes => 60,
            IntervalUnit::Hours => 3600,
            IntervalUnit::Days => 86400,
        }
    }
}

/// A schedule for job execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ScheduleRepr", into = "ScheduleRepr")]
pub enum Schedule {
    /// Fixed period aligned to `start_time + delay`.
    Interval(IntervalSchedule),
    /// Cron expression evaluated in a timezone.
    Cron(CronSchedule),
}

/// Interval schedule: occurrences at `start_time + delay + k * period`.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalSchedule {
    start_time: DateTime<Utc>,
    period: u64,
    unit: IntervalUnit,
    delay: Option<Duration>,
}

/// Cron schedule bound to a timezone.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    timezone: Tz,
    parsed: Box<CronExpr>,
    delay: Option<Duration>,
}

impl PartialEq for CronSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
            && self.timezone == other.timezone
            && self.delay == other.delay
    }
}

impl Schedule {
    /// Create an interval schedule.
    pub fn interval(
        start_time: DateTime<Utc>,
        period: u64,
        unit: IntervalUnit,
    ) -> Result<Self, ScheduleError> {
        if period == 0 {
            return Err(ScheduleError::InvalidInterval(
                "period must be positive".into(),
            ));
        }
        Ok(Schedule::Interval(IntervalSchedule {
            start_time,
            period,
            unit,
            delay: None,
        }))
    }

    /// Create a cron schedule evaluated in UTC.
    pub fn cron(expression: impl Into<String>) -> Result<Self, ScheduleError> {
        Self::cron_with_timezone(expression, "UTC")
    }

    /// Create a cron schedule evaluated in the given IANA timezone.
    pub fn cron_with_timezone(
        expression: impl Into<String>,
        timezone: &str,
    ) -> Result<Self, ScheduleError> {
        let expression = expression.into();
        let timezone = parse_timezone(timezone)?;
        let parsed = parse_cron(expression.trim())?;
        Ok(Schedule::Cron(CronSchedule {
            expression,
            timezone,
            parsed,
            delay: None,
        }))
    }

    /// Parse a schedule expression.
    ///
    /// Supports:
    /// - Standard 5-field cron: `minute hour day month weekday`
    /// - Extended 6-field cron: `second minute hour day month weekday`
    /// - Shortcuts: `@yearly`, `@monthly`, `@weekly`, `@daily`, `@hourly`
    /// - Intervals: `@every 5m`, `@every 1h30m`, aligned to `start_time`
    pub fn parse(
        expression: &str,
        timezone: &str,
        start_time: DateTime<Utc>,
    ) -> Result<Self, ScheduleError> {
        let trimmed = expression.trim();
        let lowered = trimmed.to_lowercase();

        if let Some(every) = lowered.strip_prefix("@every ") {
            let seconds = parse_duration(every.trim())?;
            return Self::interval(start_time, seconds, IntervalUnit::Seconds);
        }

        let cron_expr = match lowered.as_str() {
            "@yearly" | "@annually" => "0 0 1 1 *",
            "@monthly" => "0 0 1 * *",
            "@weekly" => "0 0 * * SUN",
            "@daily" | "@midnight" => "0 0 * * *",
            "@hourly" => "0 * * * *",
            s if s.starts_with('@') => {
                return Err(ScheduleError::InvalidCron(format!(
                    "unknown shortcut: {}",
                    trimmed
                )));
            }
            _ => trimmed,
        };

        let timezone = parse_timezone(timezone)?;
        let parsed = parse_cron(cron_expr)?;
        Ok(Schedule::Cron(CronSchedule {
            expression: trimmed.to_string(),
            timezone,
            parsed,
            delay: None,
        }))
    }

    /// Shift every occurrence later by a fixed delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        match &mut self {
            Schedule::Interval(s) => s.delay = Some(delay),
            Schedule::Cron(s) => s.delay = Some(delay),
        }
        self
    }

    /// Configured schedule delay, if any.
    pub fn delay(&self) -> Option<Duration> {
        match self {
            Schedule::Interval(s) => s.delay,
            Schedule::Cron(s) => s.delay,
        }
    }

    /// Next occurrence strictly after `base`.
    ///
    /// Returns `None` when the schedule has no further occurrences.
    pub fn next_after(&self, base: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Interval(s) => s.next_after(base),
            Schedule::Cron(s) => s.next_after(base),
        }
    }

    /// Next occurrence after the previous expected fire time, or after `now`
    /// when the job has never been armed.
    ///
    /// Deterministic for the same inputs, which the jitter look-ahead relies on.
    pub fn next_execution_time(
        &self,
        previous: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        self.next_after(previous.unwrap_or(now))
    }

    /// Time remaining from `now` until the next occurrence.
    pub fn next_time_to_execute(&self, now: DateTime<Utc>) -> Option<Duration> {
        let next = self.next_after(now)?;
        (next - now).to_std().ok()
    }

    /// The window `[start, next occurrence after start)`.
    pub fn period_starting_at(
        &self,
        start: DateTime<Utc>,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.next_after(start).map(|end| (start, end))
    }

    /// Whether `last_execution` matches the most recent occurrence at or
    /// before `now`, to the second.
    ///
    /// A job that has never run is considered on time.
    pub fn running_on_time(&self, last_execution: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(last) = last_execution else {
            return true;
        };
        match self.previous_at_or_before(now) {
            Some(expected) => last.timestamp() == expected.timestamp(),
            None => false,
        }
    }

    fn previous_at_or_before(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Interval(s) => s.previous_at_or_before(now),
            Schedule::Cron(s) => s.previous_at_or_before(now),
        }
    }
}

impl IntervalSchedule {
    /// Start of the interval grid.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Number of units per period.
    pub fn period(&self) -> u64 {
        self.period
    }

    /// Unit of the period.
    pub fn unit(&self) -> IntervalUnit {
        self.unit
    }

    fn interval_millis(&self) -> i64 {
        let secs = self.period.saturating_mul(self.unit.seconds());
        i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }

    fn anchor(&self) -> DateTime<Utc> {
        let delay = self
            .delay
            .and_then(|d| TimeDelta::from_std(d).ok())
            .unwrap_or_else(TimeDelta::zero);
        self.start_time + delay
    }

    fn next_after(&self, base: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let anchor = self.anchor();
        let delta = (base - anchor).num_milliseconds();
        if delta < 0 {
            return Some(anchor);
        }
        let interval = self.interval_millis();
        let remaining = interval - delta % interval;
        base.checked_add_signed(TimeDelta::milliseconds(remaining))
    }

    fn previous_at_or_before(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let anchor = self.anchor();
        let delta = (now - anchor).num_milliseconds();
        if delta < 0 {
            return None;
        }
        let interval = self.interval_millis();
        anchor.checked_add_signed(TimeDelta::milliseconds(delta / interval * interval))
    }
}

impl CronSchedule {
    /// The original expression string.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Timezone name.
    pub fn timezone(&self) -> &str {
        self.timezone.name()
    }

    fn delay(&self) -> TimeDelta {
        self.delay
            .and_then(|d| TimeDelta::from_std(d).ok())
            .unwrap_or_else(TimeDelta::zero)
    }

    fn next_after(&self, base: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let delay = self.delay();
        let local = (base - delay).with_timezone(&self.timezone);
        self.parsed
            .after(&local)
            .next()
            .map(|dt| dt.with_timezone(&Utc) + delay)
    }

    fn previous_at_or_before(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let delay = self.delay();
        // `after` is exclusive, so step one second forward to include `now`.
        let local = (now - delay + TimeDelta::seconds(1)).with_timezone(&self.timezone);
        self.parsed
            .after(&local)
            .next_back()
            .map(|dt| dt.with_timezone(&Utc) + delay)
    }
}

fn parse_timezone(timezone: &str) -> Result<Tz, ScheduleError> {
    timezone
        .parse::<Tz>()
        .map_err(|_| ScheduleError::InvalidTimezone(timezone.to_string()))
}

/// Parse a duration string like "5m", "1h", "1h30m", "30s" into seconds.
fn parse_duration(s: &str) -> Result<u64, ScheduleError> {
    let mut total_secs: u64 = 0;
    let mut current_num = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            current_num.push(c);
        } else {
            let num: u64 = current_num
                .parse()
                .map_err(|_| ScheduleError::InvalidInterval(s.to_string()))?;
            current_num.clear();

            let unit_secs: u64 = match c {
                's' => 1,
                'm' => 60,
                'h' => 3600,
                'd' => 86400,
                _ => return Err(ScheduleError::InvalidInterval(s.to_string())),
            };
            total_secs = num
                .checked_mul(unit_secs)
                .and_then(|secs| total_secs.checked_add(secs))
                .ok_or_else(|| ScheduleError::InvalidInterval(s.to_string()))?;
        }
    }

    if !current_num.is_empty() || total_secs == 0 {
        return Err(ScheduleError::InvalidInterval(s.to_string()));
    }

    Ok(total_secs)
}

/// Parse a 5- or 6-field cron expression.
fn parse_cron(expression: &str) -> Result<Box<CronExpr>, ScheduleError> {
    let fields: Vec<&str> = expression.split_whitespace().collect();

    let cron_expr = match fields.len() {
        // Standard 5-field cron, add seconds field
        5 => format!("0 {}", expression),
        6 => expression.to_string(),
        _ => {
            return Err(ScheduleError::InvalidCron(format!(
                "expected 5 or 6 fields, got {}",
                fields.len()
            )));
        }
    };

    let schedule =
        CronExpr::from_str(&cron_expr).map_err(|e| ScheduleError::InvalidCron(e.to_string()))?;

    Ok(Box::new(schedule))
}

/// Serialized form of a schedule, as stored on job documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ScheduleRepr {
    Interval {
        start_time: DateTime<Utc>,
        period: u64,
        unit: IntervalUnit,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schedule_delay_seconds: Option<u64>,
    },
    Cron {
        expression: String,
        #[serde(default = "default_timezone")]
        timezone: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schedule_delay_seconds: Option<u64>,
    },
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl TryFrom<ScheduleRepr> for Schedule {
    type Error = ScheduleError;

    fn try_from(repr: ScheduleRepr) -> Result<Self, Self::Error> {
        let (schedule, delay) = match repr {
            ScheduleRepr::Interval {
                start_time,
                period,
                unit,
                schedule_delay_seconds,
            } => (
                Schedule::interval(start_time, period, unit)?,
                schedule_delay_seconds,
            ),
            ScheduleRepr::Cron {
                expression,
                timezone,
                schedule_delay_seconds,
            } => (
                Schedule::cron_with_timezone(expression, &timezone)?,
                schedule_delay_seconds,
            ),
        };
        Ok(match delay {
            Some(secs) => schedule.with_delay(Duration::from_secs(secs)),
            None => schedule,
        })
    }
}

impl From<Schedule> for ScheduleRepr {
    fn from(schedule: Schedule) -> Self {
        match schedule {
            Schedule::Interval(s) => ScheduleRepr::Interval {
                start_time: s.start_time,
                period: s.period,
                unit: s.unit,
                schedule_delay_seconds: s.delay.map(|d| d.as_secs()),
            },
            Schedule::Cron(s) => ScheduleRepr::Cron {
                expression: s.expression,
                timezone: s.timezone.name().to_string(),
                schedule_delay_seconds: s.delay.map(|d| d.as_secs()),
            },
        }
    }
}
