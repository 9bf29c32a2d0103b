//! Data seams used by the dispatcher.

use std::future::Future;

use autobridge_core::saved_search::{Frequency, SearchCriteria};
use autobridge_core::types::{DbId, Timestamp};
use autobridge_db::models::vehicle::Vehicle;

use super::AlertError;

/// An enabled saved search selected for a dispatch run, with its owner's
/// contact details resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct DuePredicate {
    pub id: DbId,
    pub owner_id: DbId,
    pub owner_email: String,
    pub owner_name: Option<String>,
    pub name: String,
    pub criteria: SearchCriteria,
    pub frequency: Frequency,
    pub last_notified_at: Option<Timestamp>,
    /// When the search was last switched back on, if ever.
    pub enabled_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// The head of a matcher result: up to `limit` newest vehicles plus the
/// size of the full set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchBatch {
    pub total: i64,
    pub vehicles: Vec<Vehicle>,
}

impl MatchBatch {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Matches that were counted but not included in `vehicles`.
    pub fn more_count(&self) -> i64 {
        (self.total - self.vehicles.len() as i64).max(0)
    }
}

/// Predicate storage as seen by the dispatcher: selection and commit only.
pub trait AlertStore: Send + Sync {
    /// Enabled predicates of `frequency`. Immediate selection also requires
    /// the owner's email opt-in.
    fn list_due(
        &self,
        frequency: Frequency,
    ) -> impl Future<Output = Result<Vec<DuePredicate>, AlertError>> + Send;

    /// Atomically record a delivery. Returns `false` when the predicate is
    /// gone or disabled and nothing was written.
    fn commit(
        &self,
        id: DbId,
        notified_at: Timestamp,
        match_count: i64,
    ) -> impl Future<Output = Result<bool, AlertError>> + Send;
}

/// Read-only vehicle matching.
pub trait VehicleMatcher: Send + Sync {
    /// Available vehicles matching `criteria` created in `(since, until]`,
    /// newest first, truncated to `limit`. `total` counts the same set.
    fn find_new(
        &self,
        criteria: &SearchCriteria,
        since: Timestamp,
        until: Timestamp,
        limit: usize,
    ) -> impl Future<Output = Result<MatchBatch, AlertError>> + Send;

    /// Size of the unbounded match set (no time bound).
    fn count_all(
        &self,
        criteria: &SearchCriteria,
    ) -> impl Future<Output = Result<i64, AlertError>> + Send;
}

impl<S: AlertStore + ?Sized> AlertStore for &S {
    fn list_due(
        &self,
        frequency: Frequency,
    ) -> impl Future<Output = Result<Vec<DuePredicate>, AlertError>> + Send {
        (**self).list_due(frequency)
    }

    fn commit(
        &self,
        id: DbId,
        notified_at: Timestamp,
        match_count: i64,
    ) -> impl Future<Output = Result<bool, AlertError>> + Send {
        (**self).commit(id, notified_at, match_count)
    }
}

impl<M: VehicleMatcher + ?Sized> VehicleMatcher for &M {
    fn find_new(
        &self,
        criteria: &SearchCriteria,
        since: Timestamp,
        until: Timestamp,
        limit: usize,
    ) -> impl Future<Output = Result<MatchBatch, AlertError>> + Send {
        (**self).find_new(criteria, since, until, limit)
    }

    fn count_all(
        &self,
        criteria: &SearchCriteria,
    ) -> impl Future<Output = Result<i64, AlertError>> + Send {
        (**self).count_all(criteria)
    }
}
