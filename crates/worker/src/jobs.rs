//! Scheduled saved-search jobs.
//!
//! Each frequency gets its own loop. A loop sleeps until the next fire
//! time of its cron expression, then runs one [`run_once`] pass; passes of one loop never overlap.
//! Across workers, [`run_once`] holds the job's advisory lock for the whole
//! pass and skips the tick when another worker already holds it.

use std::sync::Arc;

use chrono::{FixedOffset, Utc};
use tokio_util::sync::CancellationToken;

use autobridge_core::clock::SystemClock;
use autobridge_core::saved_search::Frequency;
use autobridge_db::repositories::JobLockRepo;
use autobridge_db::DbPool;
use autobridge_events::{AlertError, Dispatcher, EmailTransport, PgAlertStore, RunReport};

use crate::schedule::Schedule;

/// Error type for a single scheduled pass.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The advisory lock could not be queried.
    #[error("job lock error: {0}")]
    Lock(#[from] sqlx::Error),

    /// Selection of due saved searches failed.
    #[error(transparent)]
    Dispatch(#[from] AlertError),
}

/// Run one dispatcher pass for `frequency` under the job's advisory lock.
///
/// Returns `Ok(None)` when another worker holds the lock.
pub async fn run_once<T: EmailTransport>(
    pool: &DbPool,
    transport: &T,
    frequency: Frequency,
    cancel: &CancellationToken,
) -> Result<Option<RunReport>, JobError> {
    let job_name = frequency.job_name();
    let Some(lock) = JobLockRepo::try_acquire(pool, job_name).await? else {
        tracing::info!(job = job_name, "Job already running elsewhere, skipping tick");
        return Ok(None);
    };

    let store = PgAlertStore::new(pool.clone());
    let dispatcher = Dispatcher::new(&store, &store, transport, SystemClock);
    let result = dispatcher.run(frequency, cancel).await;

    if let Err(e) = lock.release().await {
        tracing::warn!(job = job_name, error = %e, "Failed to release job lock");
    }

    let report = result?;
    tracing::info!(
        job = job_name,
        selected = report.selected,
        with_matches = report.with_matches,
        emails_sent = report.emails_sent,
        emails_failed = report.emails_failed,
        committed = report.committed,
        matcher_errors = report.matcher_errors,
        commit_errors = report.commit_errors,
        cancelled = report.cancelled,
        "Saved-search pass finished"
    );
    Ok(Some(report))
}

/// Run the loop for one job until `cancel` fires.
pub async fn run_schedule<T: EmailTransport>(
    pool: DbPool,
    transport: Arc<T>,
    frequency: Frequency,
    schedule: Schedule,
    offset: FixedOffset,
    cancel: CancellationToken,
) {
    let job_name = frequency.job_name();
    tracing::info!(job = job_name, %schedule, "Job scheduled");

    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_after(now, offset) else {
            tracing::warn!(job = job_name, %schedule, "Schedule has no further fire times");
            break;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::debug!(job = job_name, next = %next, "Waiting for next tick");

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(job = job_name, "Job stopping");
                break;
            }
            _ = tokio::time::sleep(wait) => {
                if let Err(e) = run_once(&pool, transport.as_ref(), frequency, &cancel).await {
                    tracing::error!(job = job_name, error = %e, "Saved-search pass failed");
                }
            }
        }
    }
}
