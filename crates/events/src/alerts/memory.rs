//! In-memory store, matcher and transport for dispatcher tests.

use std::collections::HashSet;
use std::sync::Mutex;

use autobridge_core::saved_search::{
    is_new_match, CreatedWindow, Frequency, SearchCriteria, VEHICLE_STATUS_AVAILABLE,
};
use autobridge_core::types::{DbId, Timestamp};
use autobridge_db::models::vehicle::Vehicle;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use super::ports::{AlertStore, DuePredicate, MatchBatch, VehicleMatcher};
use super::AlertError;
use crate::delivery::email::{EmailError, EmailTransport};

/// A due predicate for owner `owner_id`, created 2024-05-01.
pub fn due(
    id: DbId,
    owner_id: DbId,
    name: &str,
    criteria: SearchCriteria,
    frequency: Frequency,
) -> DuePredicate {
    DuePredicate {
        id,
        owner_id,
        owner_email: format!("user{owner_id}@example.com"),
        owner_name: None,
        name: name.to_string(),
        criteria,
        frequency,
        last_notified_at: None,
        enabled_at: None,
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
    }
}

/// An available 2018 listing in good condition.
pub fn vehicle(id: DbId, make: &str, model: &str, price: i64, created_at: Timestamp) -> Vehicle {
    Vehicle {
        id,
        make: make.to_string(),
        model: model.to_string(),
        year: 2018,
        price: Decimal::from(price),
        condition: "good".to_string(),
        mileage: 48_000,
        status: VEHICLE_STATUS_AVAILABLE.to_string(),
        created_at,
    }
}

#[derive(Debug, Clone)]
pub struct StoredPredicate {
    pub due: DuePredicate,
    pub enabled: bool,
    pub email_opt_in: bool,
    pub match_count: i64,
}

/// Predicate table and vehicle listing held in memory. Matching uses the
/// same rules as the SQL matcher.
#[derive(Default)]
pub struct MemoryAlerts {
    predicates: Mutex<Vec<StoredPredicate>>,
    vehicles: Mutex<Vec<Vehicle>>,
    failing_makes: Mutex<HashSet<String>>,
}

impl MemoryAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_predicate(&self, due: DuePredicate) {
        self.predicates.lock().unwrap().push(StoredPredicate {
            due,
            enabled: true,
            email_opt_in: true,
            match_count: 0,
        });
    }

    pub fn add_vehicle(&self, vehicle: Vehicle) {
        self.vehicles.lock().unwrap().push(vehicle);
    }

    pub fn disable(&self, id: DbId) {
        self.with_predicate(id, |p| p.enabled = false);
    }

    /// Switch a predicate back on at `at`, as the toggle endpoint does.
    pub fn enable(&self, id: DbId, at: Timestamp) {
        self.with_predicate(id, |p| {
            if !p.enabled {
                p.enabled = true;
                p.due.enabled_at = Some(at);
            }
        });
    }

    /// Owner-side delete.
    pub fn remove(&self, id: DbId) {
        self.predicates.lock().unwrap().retain(|p| p.due.id != id);
    }

    pub fn contains(&self, id: DbId) -> bool {
        self.predicates.lock().unwrap().iter().any(|p| p.due.id == id)
    }

    pub fn set_email_opt_in(&self, id: DbId, opt_in: bool) {
        self.with_predicate(id, |p| p.email_opt_in = opt_in);
    }

    /// Owner-side edit: replaces the name and refreshes `match_count`,
    /// leaving the watermark alone.
    pub fn rename(&self, id: DbId, name: &str) {
        let criteria = self.predicate(id).due.criteria;
        let count = self.count(&criteria, CreatedWindow::ANY);
        self.with_predicate(id, |p| {
            p.due.name = name.to_string();
            p.match_count = count;
        });
    }

    pub fn set_watermark(&self, id: DbId, at: Timestamp) {
        self.with_predicate(id, |p| p.due.last_notified_at = Some(at));
    }

    /// Make every matcher call for a predicate on `make` fail.
    pub fn fail_matcher_for_make(&self, make: &str) {
        self.failing_makes.lock().unwrap().insert(make.to_string());
    }

    pub fn predicate(&self, id: DbId) -> StoredPredicate {
        self.predicates
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.due.id == id)
            .cloned()
            .expect("predicate exists")
    }

    fn with_predicate(&self, id: DbId, f: impl FnOnce(&mut StoredPredicate)) {
        let mut predicates = self.predicates.lock().unwrap();
        let predicate = predicates
            .iter_mut()
            .find(|p| p.due.id == id)
            .expect("predicate exists");
        f(predicate);
    }

    fn matching(&self, criteria: &SearchCriteria, window: CreatedWindow) -> Vec<Vehicle> {
        let mut found: Vec<Vehicle> = self
            .vehicles
            .lock()
            .unwrap()
            .iter()
            .filter(|v| is_new_match(criteria, &v.attributes(), window))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        found
    }

    fn count(&self, criteria: &SearchCriteria, window: CreatedWindow) -> i64 {
        self.matching(criteria, window).len() as i64
    }

    fn check_available(&self, criteria: &SearchCriteria) -> Result<(), AlertError> {
        let failing = self.failing_makes.lock().unwrap();
        match &criteria.make {
            Some(make) if failing.contains(make) => Err(AlertError::Datastore(sqlx::Error::PoolTimedOut)),
            _ => Ok(()),
        }
    }
}

impl AlertStore for MemoryAlerts {
    async fn list_due(&self, frequency: Frequency) -> Result<Vec<DuePredicate>, AlertError> {
        let mut due: Vec<DuePredicate> = self
            .predicates
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.enabled && p.due.frequency == frequency)
            .filter(|p| frequency != Frequency::Immediate || p.email_opt_in)
            .map(|p| p.due.clone())
            .collect();
        due.sort_by_key(|p| (p.owner_id, p.id));
        Ok(due)
    }

    async fn commit(
        &self,
        id: DbId,
        notified_at: Timestamp,
        match_count: i64,
    ) -> Result<bool, AlertError> {
        let mut predicates = self.predicates.lock().unwrap();
        let Some(p) = predicates.iter_mut().find(|p| p.due.id == id && p.enabled) else {
            return Ok(false);
        };
        p.due.last_notified_at = Some(match p.due.last_notified_at {
            Some(prev) => prev.max(notified_at),
            None => notified_at,
        });
        p.match_count = match_count;
        Ok(true)
    }
}

impl VehicleMatcher for MemoryAlerts {
    async fn find_new(
        &self,
        criteria: &SearchCriteria,
        since: Timestamp,
        until: Timestamp,
        limit: usize,
    ) -> Result<MatchBatch, AlertError> {
        self.check_available(criteria)?;
        let mut vehicles = self.matching(criteria, CreatedWindow::between(since, until));
        let total = vehicles.len() as i64;
        vehicles.truncate(limit);
        Ok(MatchBatch { total, vehicles })
    }

    async fn count_all(&self, criteria: &SearchCriteria) -> Result<i64, AlertError> {
        self.check_available(criteria)?;
        Ok(self.count(criteria, CreatedWindow::ANY))
    }
}

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub template_name: String,
    pub context: Value,
    pub subject: String,
    pub to: String,
}

/// Records every send; can be told to fail for given recipients.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentEmail>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, to: &str) {
        self.failing.lock().unwrap().insert(to.to_string());
    }

    pub fn recover(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }
}

impl EmailTransport for RecordingTransport {
    async fn send(
        &self,
        template_name: &str,
        context: &Value,
        subject: &str,
        to: &str,
    ) -> Result<(), EmailError> {
        if self.failing.lock().unwrap().contains(to) {
            return Err(EmailError::Build("connection refused".into()));
        }
        self.sent.lock().unwrap().push(SentEmail {
            template_name: template_name.to_string(),
            context: context.clone(),
            subject: subject.to_string(),
            to: to.to_string(),
        });
        Ok(())
    }
}
