//! Postgres advisory locks that keep a scheduled job from running on two
//! workers at once.

use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};

/// A held session-level advisory lock.
///
/// The lock lives on the dedicated connection inside this guard. That
/// connection is closed rather than returned to the pool when the guard
/// goes away, so a lock can never leak into an unrelated pooled session.
pub struct JobLock {
    conn: PoolConnection<Postgres>,
    job_name: String,
}

impl JobLock {
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Unlock explicitly. Dropping the guard also frees the lock, once the
    /// server notices the closed session.
    pub async fn release(mut self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT pg_advisory_unlock(hashtext($1)::BIGINT)")
            .bind(&self.job_name)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}

/// Acquires per-job advisory locks keyed by the job name.
pub struct JobLockRepo;

impl JobLockRepo {
    /// Try to take the lock for `job_name` without waiting.
    ///
    /// Returns `None` when another session already holds it.
    pub async fn try_acquire(pool: &PgPool, job_name: &str) -> Result<Option<JobLock>, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtext($1)::BIGINT)")
            .bind(job_name)
            .fetch_one(&mut *conn)
            .await?;

        if !acquired {
            return Ok(None);
        }

        conn.close_on_drop();
        Ok(Some(JobLock {
            conn,
            job_name: job_name.to_string(),
        }))
    }
}
