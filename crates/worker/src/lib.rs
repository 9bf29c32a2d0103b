//! Background scheduler for saved-search notifications.
//!
//! - [`schedule`]: cron expressions and next-fire computation.
//! - [`config`]: environment configuration for the three jobs.
//! - [`jobs`]: per-job loops and the locked single pass they run.

pub mod config;
pub mod jobs;
pub mod schedule;
