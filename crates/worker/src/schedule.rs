//! Job schedules as cron expressions.
//!
//! Accepts the usual five fields (`min hour dom month dow`) or six with a
//! leading seconds field. Fire times are evaluated in a fixed UTC offset
//! supplied by the operator.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};

/// Error type for unparseable cron expressions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cron expression '{input}': {reason}")]
pub struct ScheduleError {
    pub input: String,
    pub reason: String,
}

/// When a job fires.
#[derive(Debug, Clone)]
pub struct Schedule {
    expr: String,
    cron: cron::Schedule,
}

impl Schedule {
    /// The expression as configured.
    pub fn as_str(&self) -> &str {
        &self.expr
    }

    /// First fire time strictly after `now`, or `None` when the expression
    /// never fires again.
    pub fn next_after(&self, now: DateTime<Utc>, offset: FixedOffset) -> Option<DateTime<Utc>> {
        self.cron
            .after(&now.with_timezone(&offset))
            .next()
            .map(|at| at.with_timezone(&Utc))
    }
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expr = s.split_whitespace().collect::<Vec<_>>().join(" ");
        let fields = expr.split(' ').filter(|f| !f.is_empty()).count();
        let full = match fields {
            5 => format!("0 {expr}"),
            6 => expr.clone(),
            _ => {
                return Err(ScheduleError {
                    input: s.to_string(),
                    reason: format!("expected 5 or 6 fields, got {fields}"),
                })
            }
        };

        let cron = full.parse::<cron::Schedule>().map_err(|e| ScheduleError {
            input: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { expr, cron })
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}
