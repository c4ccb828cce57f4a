//! Recurring trigger bound to one task definition.

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_TIMEZONE: &str = "UTC";

/// A recurring trigger. Owns a reference to exactly one task and shares its
/// lifetime; retention cleanup does not remove schedules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub task_id: String,
    /// Standard 5-field cron expression as supplied by the caller
    pub cron_expression: String,
    /// IANA timezone name the expression is evaluated in
    pub timezone: String,
    pub is_active: bool,
    /// Milliseconds since epoch of the last firing
    #[serde(default)]
    pub last_run: Option<i64>,
    /// Milliseconds since epoch of the next firing; always strictly greater
    /// than the instant it was computed at
    #[serde(default)]
    pub next_run: Option<i64>,
}

impl Schedule {
    /// Create an active schedule and compute its first `next_run`.
    ///
    /// The expression must already have passed spec validation; an
    /// unparsable expression here leaves `next_run` empty and the schedule
    /// inert rather than firing on a made-up offset.
    pub fn new(task_id: impl Into<String>, cron_expression: impl Into<String>, timezone: impl Into<String>) -> Self {
        let cron_expression = cron_expression.into();
        let timezone = timezone.into();
        let next_run = next_cron_time(&cron_expression, &timezone, Utc::now().timestamp_millis());
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            cron_expression,
            timezone,
            is_active: true,
            last_run: None,
            next_run,
        }
    }

    pub fn is_due(&self, now_ms: i64) -> bool {
        self.is_active && self.next_run.is_some_and(|at| at <= now_ms)
    }

    /// Record a firing: set `last_run` and advance `next_run` past `now_ms`.
    pub fn record_fire(&mut self, now_ms: i64) {
        self.last_run = Some(now_ms);
        self.next_run = next_cron_time(&self.cron_expression, &self.timezone, now_ms);
    }
}

/// The `cron` crate wants a seconds field; callers supply the standard
/// 5-field form, so prefix `0` when it is missing.
fn normalize_cron(expr: &str) -> String {
    let fields = expr.split_whitespace().count();
    if fields == 5 {
        format!("0 {}", expr.trim())
    } else {
        expr.trim().to_string()
    }
}

/// Parse a 5-field (or explicit 6/7-field) cron expression.
pub fn parse_cron(expr: &str) -> Result<CronSchedule, EngineError> {
    CronSchedule::from_str(&normalize_cron(expr)).map_err(|e| EngineError::InvalidCron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// Parse an IANA timezone name.
pub fn parse_timezone(tz: &str) -> Result<Tz, EngineError> {
    Tz::from_str(tz).map_err(|_| EngineError::InvalidTimezone(tz.to_string()))
}

/// Next firing instant strictly after `from_ms`, evaluated in `timezone`.
///
/// Returns `None` when the expression or timezone does not parse, or when
/// the expression has no future occurrence.
pub fn next_cron_time(expr: &str, timezone: &str, from_ms: i64) -> Option<i64> {
    let schedule = parse_cron(expr).ok()?;
    let from = DateTime::from_timestamp_millis(from_ms)?;

    match parse_timezone(timezone) {
        Ok(tz) => {
            let local = from.with_timezone(&tz);
            let next = schedule.after(&local).next()?;
            Some(next.with_timezone(&Utc).timestamp_millis())
        }
        Err(_) => {
            let next = schedule.after(&from).next()?;
            Some(next.timestamp_millis())
        }
    }
}
