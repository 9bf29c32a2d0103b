use chrono::FixedOffset;

use autobridge_core::saved_search::Frequency;

use crate::schedule::Schedule;

/// Default cadence of the immediate job.
pub const DEFAULT_IMMEDIATE_SCHEDULE: &str = "*/15 * * * *";
/// Default fire time of the daily digest.
pub const DEFAULT_DAILY_SCHEDULE: &str = "0 9 * * *";
/// Default fire time of the weekly digest.
pub const DEFAULT_WEEKLY_SCHEDULE: &str = "0 9 * * MON";

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub immediate: Schedule,
    pub daily: Schedule,
    pub weekly: Schedule,
    /// Offset the cron expressions are evaluated in.
    pub utc_offset: FixedOffset,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                           | Default        |
    /// |-----------------------------------|----------------|
    /// | `DATABASE_URL`                    | required       |
    /// | `SAVED_SEARCH_IMMEDIATE_SCHEDULE` | `*/15 * * * *` |
    /// | `SAVED_SEARCH_DAILY_SCHEDULE`     | `0 9 * * *`    |
    /// | `SAVED_SEARCH_WEEKLY_SCHEDULE`    | `0 9 * * MON`  |
    /// | `SCHEDULER_UTC_OFFSET_MINUTES`    | `0`            |
    ///
    /// # Panics
    ///
    /// Panics on a missing database URL or unparseable values.
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let offset_minutes: i32 = std::env::var("SCHEDULER_UTC_OFFSET_MINUTES")
            .unwrap_or_else(|_| "0".into())
            .parse()
            .expect("SCHEDULER_UTC_OFFSET_MINUTES must be a valid i32");
        let utc_offset = FixedOffset::east_opt(offset_minutes * 60)
            .expect("SCHEDULER_UTC_OFFSET_MINUTES must be within +/- 24h");

        Self {
            database_url,
            immediate: schedule_from_env("SAVED_SEARCH_IMMEDIATE_SCHEDULE", DEFAULT_IMMEDIATE_SCHEDULE),
            daily: schedule_from_env("SAVED_SEARCH_DAILY_SCHEDULE", DEFAULT_DAILY_SCHEDULE),
            weekly: schedule_from_env("SAVED_SEARCH_WEEKLY_SCHEDULE", DEFAULT_WEEKLY_SCHEDULE),
            utc_offset,
        }
    }

    pub fn schedule_for(&self, frequency: Frequency) -> Schedule {
        match frequency {
            Frequency::Immediate => self.immediate.clone(),
            Frequency::Daily => self.daily.clone(),
            Frequency::Weekly => self.weekly.clone(),
        }
    }
}

fn schedule_from_env(var: &str, default: &str) -> Schedule {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .unwrap_or_else(|e| panic!("{var} is not a valid cron expression: {e}"))
}
