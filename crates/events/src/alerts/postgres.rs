//! Postgres-backed implementation of the alerting seams.

use autobridge_core::saved_search::{CreatedWindow, Frequency, SearchCriteria};
use autobridge_core::types::{DbId, Timestamp};
use autobridge_db::models::saved_search::DueSavedSearch;
use autobridge_db::repositories::{SavedSearchRepo, VehicleRepo};
use autobridge_db::DbPool;

use super::ports::{AlertStore, DuePredicate, MatchBatch, VehicleMatcher};
use super::AlertError;

/// Reads predicates and vehicles from, and commits bookkeeping to, the
/// application database.
#[derive(Clone)]
pub struct PgAlertStore {
    pool: DbPool,
}

impl PgAlertStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl AlertStore for PgAlertStore {
    async fn list_due(&self, frequency: Frequency) -> Result<Vec<DuePredicate>, AlertError> {
        let require_opt_in = frequency == Frequency::Immediate;
        let rows = SavedSearchRepo::list_due(&self.pool, frequency, require_opt_in).await?;

        let mut due = Vec::with_capacity(rows.len());
        for row in rows {
            let search_id = row.search.id;
            match into_due(row) {
                Ok(predicate) => due.push(predicate),
                Err(e) => {
                    tracing::warn!(search_id, error = %e, "Skipping unreadable saved search");
                }
            }
        }
        Ok(due)
    }

    async fn commit(
        &self,
        id: DbId,
        notified_at: Timestamp,
        match_count: i64,
    ) -> Result<bool, AlertError> {
        Ok(SavedSearchRepo::commit_notification(&self.pool, id, notified_at, match_count).await?)
    }
}

impl VehicleMatcher for PgAlertStore {
    async fn find_new(
        &self,
        criteria: &SearchCriteria,
        since: Timestamp,
        until: Timestamp,
        limit: usize,
    ) -> Result<MatchBatch, AlertError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX).max(1);
        let window = CreatedWindow::between(since, until);
        let (total, vehicles) =
            VehicleRepo::find_matching_with_total(&self.pool, criteria, window, limit).await?;
        Ok(MatchBatch { total, vehicles })
    }

    async fn count_all(&self, criteria: &SearchCriteria) -> Result<i64, AlertError> {
        Ok(VehicleRepo::count_matching(&self.pool, criteria, CreatedWindow::ANY).await?)
    }
}

fn into_due(row: DueSavedSearch) -> Result<DuePredicate, autobridge_core::error::CoreError> {
    let criteria = row.search.criteria()?;
    let frequency = row.search.frequency()?;
    Ok(DuePredicate {
        id: row.search.id,
        owner_id: row.search.owner_id,
        owner_email: row.owner_email,
        owner_name: row.owner_name,
        name: row.search.name,
        criteria,
        frequency,
        last_notified_at: row.search.last_notified_at,
        enabled_at: row.search.enabled_at,
        created_at: row.search.created_at,
    })
}
