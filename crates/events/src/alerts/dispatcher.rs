//! Saved-search dispatcher.
//!
//! One [`Dispatcher::run`] call is one scheduled pass for a frequency:
//!
//! 1. Selection: load enabled predicates of that frequency.
//! 2. Evaluation: ask the matcher for vehicles listed after each watermark
//!    and no later than the run's start time. Anything newer is left for
//!    the next pass, whose window starts where this one ended.
//! 3. Grouping: one email per predicate (immediate) or per user (digests).
//! 4. Commit: after a successful send only, advance each contributing
//!    predicate's watermark to the run's start time and refresh its
//!    `match_count`, one atomic write per predicate.
//!
//! A failed send commits nothing for that email, so the next run retries
//! the same vehicles.

use std::collections::BTreeMap;

use autobridge_core::clock::Clock;
use autobridge_core::saved_search::{evaluation_since, Frequency, SearchCriteria};
use autobridge_core::types::{DbId, Timestamp};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::assembler::{assemble, PredicateMatches};
use super::ports::{AlertStore, VehicleMatcher};
use super::AlertError;
use crate::delivery::email::EmailTransport;

/// Outcome counters for one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub frequency: Frequency,
    pub started_at: Timestamp,
    /// Predicates returned by selection.
    pub selected: usize,
    /// Predicates with at least one new vehicle.
    pub with_matches: usize,
    pub emails_sent: usize,
    pub emails_failed: usize,
    /// Predicates whose bookkeeping was written.
    pub committed: usize,
    /// Predicates skipped because the matcher failed.
    pub matcher_errors: usize,
    pub commit_errors: usize,
    /// The pass stopped early on shutdown.
    pub cancelled: bool,
}

impl RunReport {
    fn new(frequency: Frequency, started_at: Timestamp) -> Self {
        Self {
            frequency,
            started_at,
            selected: 0,
            with_matches: 0,
            emails_sent: 0,
            emails_failed: 0,
            committed: 0,
            matcher_errors: 0,
            commit_errors: 0,
            cancelled: false,
        }
    }
}

/// Drives saved-search notifications for all three frequencies.
pub struct Dispatcher<S, M, T, C> {
    store: S,
    matcher: M,
    transport: T,
    clock: C,
}

impl<S, M, T, C> Dispatcher<S, M, T, C>
where
    S: AlertStore,
    M: VehicleMatcher,
    T: EmailTransport,
    C: Clock,
{
    pub fn new(store: S, matcher: M, transport: T, clock: C) -> Self {
        Self {
            store,
            matcher,
            transport,
            clock,
        }
    }

    /// Run one pass for `frequency`.
    ///
    /// Only a failed selection is returned as an error. Per-predicate and
    /// per-email failures are logged, counted in the report and retried on
    /// the next pass. `cancel` is checked between emails; an email that has
    /// been sent always gets its commits.
    pub async fn run(
        &self,
        frequency: Frequency,
        cancel: &CancellationToken,
    ) -> Result<RunReport, AlertError> {
        let now = self.clock.now();
        let mut report = RunReport::new(frequency, now);

        let predicates = self.store.list_due(frequency).await?;
        report.selected = predicates.len();

        let mut evaluated = Vec::new();
        for predicate in predicates {
            let since = evaluation_since(
                frequency,
                predicate.last_notified_at,
                predicate.enabled_at,
                predicate.created_at,
                now,
            );
            match self
                .matcher
                .find_new(&predicate.criteria, since, now, frequency.display_cap())
                .await
            {
                Ok(batch) if batch.is_empty() => {}
                Ok(batch) => evaluated.push(PredicateMatches { predicate, batch }),
                Err(e) => {
                    report.matcher_errors += 1;
                    tracing::warn!(
                        search_id = predicate.id,
                        frequency = %frequency,
                        error = %e,
                        "Matcher failed, skipping saved search"
                    );
                }
            }
        }
        report.with_matches = evaluated.len();

        for group in group_for_delivery(frequency, evaluated) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                tracing::info!(frequency = %frequency, "Dispatch cancelled before completion");
                break;
            }
            self.deliver(frequency, now, &group, &mut report).await;
        }

        tracing::info!(
            frequency = %frequency,
            selected = report.selected,
            with_matches = report.with_matches,
            emails_sent = report.emails_sent,
            emails_failed = report.emails_failed,
            committed = report.committed,
            matcher_errors = report.matcher_errors,
            commit_errors = report.commit_errors,
            "Saved-search dispatch finished"
        );
        Ok(report)
    }

    /// Assemble, send, and on success commit every predicate in the group.
    async fn deliver(
        &self,
        frequency: Frequency,
        now: Timestamp,
        group: &[PredicateMatches],
        report: &mut RunReport,
    ) {
        let user_id = group.first().map(|g| g.predicate.owner_id);

        let sent = match assemble(frequency, group) {
            Ok(email) => self
                .transport
                .send(email.template_name, &email.context, &email.subject, &email.to)
                .await
                .map_err(AlertError::from),
            Err(e) => Err(e),
        };

        if let Err(e) = sent {
            report.emails_failed += 1;
            tracing::error!(
                user_id,
                frequency = %frequency,
                searches = group.len(),
                error = %e,
                "Saved-search notification failed, will retry next run"
            );
            return;
        }
        report.emails_sent += 1;

        for section in group {
            self.commit(section.predicate.id, &section.predicate.criteria, now, report)
                .await;
        }
    }

    async fn commit(
        &self,
        search_id: DbId,
        criteria: &SearchCriteria,
        now: Timestamp,
        report: &mut RunReport,
    ) {
        let match_count = match self.matcher.count_all(criteria).await {
            Ok(count) => count,
            Err(e) => {
                report.matcher_errors += 1;
                tracing::warn!(search_id, error = %e, "Could not refresh match count, not committing");
                return;
            }
        };

        match self.store.commit(search_id, now, match_count).await {
            Ok(true) => report.committed += 1,
            Ok(false) => {
                tracing::debug!(search_id, "Saved search disabled or removed during run, not committed");
            }
            Err(e) => {
                report.commit_errors += 1;
                tracing::error!(search_id, error = %e, "Failed to commit saved-search notification");
            }
        }
    }
}

/// Split evaluated predicates into one group per email.
///
/// Digest groups are keyed by owner in ascending id order; predicates keep
/// their selection order within a group.
fn group_for_delivery(
    frequency: Frequency,
    evaluated: Vec<PredicateMatches>,
) -> Vec<Vec<PredicateMatches>> {
    if !frequency.groups_by_user() {
        return evaluated.into_iter().map(|m| vec![m]).collect();
    }

    let mut by_owner: BTreeMap<DbId, Vec<PredicateMatches>> = BTreeMap::new();
    for matches in evaluated {
        by_owner
            .entry(matches.predicate.owner_id)
            .or_default()
            .push(matches);
    }
    by_owner.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::memory::{due, vehicle, MemoryAlerts, RecordingTransport};
    use crate::alerts::ports::MatchBatch;
    use autobridge_core::clock::FixedClock;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    type TestDispatcher<'a> =
        Dispatcher<&'a MemoryAlerts, &'a MemoryAlerts, &'a RecordingTransport, &'a FixedClock>;

    fn ts(day: u32, hour: u32, minute: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, day, hour, minute, 0).unwrap()
    }

    fn toyota_under_15k() -> SearchCriteria {
        SearchCriteria {
            make: Some("Toyota".into()),
            price_max: Some(Decimal::from(15_000)),
            ..Default::default()
        }
    }

    fn make(name: &str) -> SearchCriteria {
        SearchCriteria {
            make: Some(name.into()),
            ..Default::default()
        }
    }

    fn dispatcher<'a>(
        alerts: &'a MemoryAlerts,
        transport: &'a RecordingTransport,
        clock: &'a FixedClock,
    ) -> TestDispatcher<'a> {
        Dispatcher::new(alerts, alerts, transport, clock)
    }

    async fn run(d: &TestDispatcher<'_>, frequency: Frequency) -> RunReport {
        d.run(frequency, &CancellationToken::new()).await.unwrap()
    }

    /// Immediate predicate P (Toyota under $15k) notified up to 2024-06-01.
    fn scenario_one() -> MemoryAlerts {
        let alerts = MemoryAlerts::new();
        let mut p = due(1, 10, "Cheap Toyotas", toyota_under_15k(), Frequency::Immediate);
        p.last_notified_at = Some(ts(1, 0, 0));
        alerts.add_predicate(p);
        alerts.add_vehicle(vehicle(101, "Toyota", "Corolla", 12_000, ts(2, 10, 0)));
        alerts.add_vehicle(vehicle(102, "Honda", "Civic", 11_000, ts(2, 10, 5)));
        alerts
    }

    #[tokio::test]
    async fn immediate_delivery_commits_after_send() {
        let alerts = scenario_one();
        let transport = RecordingTransport::new();
        let clock = FixedClock::new(ts(2, 10, 30));
        let d = dispatcher(&alerts, &transport, &clock);

        let report = run(&d, Frequency::Immediate).await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "user10@example.com");
        assert!(sent[0].subject.contains("Cheap Toyotas"));
        assert_eq!(sent[0].template_name, "saved_search_notification");
        let vehicles = sent[0].context["searches"][0]["vehicles"].as_array().unwrap();
        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles[0]["id"], 101);

        let p = alerts.predicate(1);
        assert_eq!(p.due.last_notified_at, Some(ts(2, 10, 30)));
        assert_eq!(p.match_count, 1);
        assert_eq!(report.emails_sent, 1);
        assert_eq!(report.committed, 1);
    }

    #[tokio::test]
    async fn second_run_without_new_vehicles_sends_nothing() {
        let alerts = scenario_one();
        let transport = RecordingTransport::new();
        let clock = FixedClock::new(ts(2, 10, 30));
        let d = dispatcher(&alerts, &transport, &clock);
        run(&d, Frequency::Immediate).await;

        clock.set(ts(2, 10, 35));
        let report = run(&d, Frequency::Immediate).await;

        assert_eq!(transport.sent().len(), 1);
        assert_eq!(report.emails_sent, 0);
        let p = alerts.predicate(1);
        assert_eq!(p.match_count, 1);
        assert_eq!(p.due.last_notified_at, Some(ts(2, 10, 30)));
    }

    #[tokio::test]
    async fn daily_digest_groups_by_user() {
        let alerts = MemoryAlerts::new();
        alerts.add_predicate(due(1, 10, "Toyotas", make("Toyota"), Frequency::Daily));
        alerts.add_predicate(due(2, 10, "Hondas", make("Honda"), Frequency::Daily));
        for (i, minute) in [0, 10, 20].into_iter().enumerate() {
            alerts.add_vehicle(vehicle(100 + i as i64, "Toyota", "Yaris", 9_000, ts(2, 1, minute)));
        }
        for (i, minute) in [5, 15].into_iter().enumerate() {
            alerts.add_vehicle(vehicle(200 + i as i64, "Honda", "Fit", 8_000, ts(2, 2, minute)));
        }
        let transport = RecordingTransport::new();
        let clock = FixedClock::new(ts(2, 9, 0));

        let report = run(&dispatcher(&alerts, &transport, &clock), Frequency::Daily).await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template_name, "saved_search_digest");
        let searches = sent[0].context["searches"].as_array().unwrap();
        assert_eq!(searches.len(), 2);
        assert_eq!(searches[0]["name"], "Toyotas");
        assert_eq!(searches[0]["match_count"], 3);
        assert_eq!(searches[1]["name"], "Hondas");
        assert_eq!(searches[1]["match_count"], 2);
        assert_eq!(report.committed, 2);
    }

    #[tokio::test]
    async fn transport_failure_leaves_state_and_next_run_retries() {
        let alerts = MemoryAlerts::new();
        let t0 = ts(1, 0, 0);
        let mut p = due(1, 10, "Toyotas", make("Toyota"), Frequency::Immediate);
        p.last_notified_at = Some(t0);
        alerts.add_predicate(p);
        alerts.add_vehicle(vehicle(101, "Toyota", "Yaris", 9_000, ts(1, 8, 0)));
        alerts.add_vehicle(vehicle(102, "Toyota", "Aqua", 9_500, ts(1, 9, 0)));

        let transport = RecordingTransport::new();
        transport.fail_for("user10@example.com");
        let clock = FixedClock::new(ts(1, 10, 0));
        let d = dispatcher(&alerts, &transport, &clock);

        let report = run(&d, Frequency::Immediate).await;
        assert_eq!(report.emails_failed, 1);
        assert_eq!(report.committed, 0);
        let p = alerts.predicate(1);
        assert_eq!(p.due.last_notified_at, Some(t0));
        assert_eq!(p.match_count, 0);

        transport.recover();
        alerts.add_vehicle(vehicle(103, "Toyota", "Vitz", 7_000, ts(1, 10, 5)));
        clock.set(ts(1, 10, 15));
        run(&d, Frequency::Immediate).await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let ids: Vec<i64> = sent[0].context["searches"][0]["vehicles"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![103, 102, 101]);
        assert_eq!(alerts.predicate(1).due.last_notified_at, Some(ts(1, 10, 15)));
    }

    #[tokio::test]
    async fn partial_failure_commits_successful_users_only() {
        let alerts = MemoryAlerts::new();
        alerts.add_predicate(due(1, 10, "Toyotas", make("Toyota"), Frequency::Weekly));
        alerts.add_predicate(due(2, 11, "Toyotas too", make("Toyota"), Frequency::Weekly));
        alerts.add_vehicle(vehicle(101, "Toyota", "Yaris", 9_000, ts(3, 8, 0)));

        let transport = RecordingTransport::new();
        transport.fail_for("user11@example.com");
        let clock = FixedClock::new(ts(4, 9, 0));

        let report = run(&dispatcher(&alerts, &transport, &clock), Frequency::Weekly).await;

        assert_eq!(report.emails_sent, 1);
        assert_eq!(report.emails_failed, 1);
        assert_eq!(alerts.predicate(1).due.last_notified_at, Some(ts(4, 9, 0)));
        assert_eq!(alerts.predicate(2).due.last_notified_at, None);
    }

    #[tokio::test]
    async fn disabled_predicate_is_never_touched() {
        let alerts = scenario_one();
        alerts.disable(1);
        let transport = RecordingTransport::new();
        let clock = FixedClock::new(ts(2, 10, 30));

        let report = run(&dispatcher(&alerts, &transport, &clock), Frequency::Immediate).await;

        assert!(transport.sent().is_empty());
        assert_eq!(report.selected, 0);
        let p = alerts.predicate(1);
        assert_eq!(p.due.last_notified_at, Some(ts(1, 0, 0)));
        assert_eq!(p.match_count, 0);
    }

    #[tokio::test]
    async fn immediate_requires_email_opt_in() {
        let alerts = scenario_one();
        alerts.set_email_opt_in(1, false);
        let transport = RecordingTransport::new();
        let clock = FixedClock::new(ts(2, 10, 30));

        let report = run(&dispatcher(&alerts, &transport, &clock), Frequency::Immediate).await;

        assert_eq!(report.selected, 0);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn rename_does_not_cause_renotification() {
        let alerts = MemoryAlerts::new();
        let t0 = ts(2, 10, 0);
        alerts.add_predicate(due(1, 10, "Toyotas", make("Toyota"), Frequency::Immediate));
        alerts.add_vehicle(vehicle(101, "Toyota", "Yaris", 9_000, t0 - Duration::minutes(1)));
        alerts.set_watermark(1, ts(1, 0, 0));
        let transport = RecordingTransport::new();
        let clock = FixedClock::new(t0);
        let d = dispatcher(&alerts, &transport, &clock);
        run(&d, Frequency::Immediate).await;
        assert_eq!(transport.sent().len(), 1);

        alerts.rename(1, "Renamed Toyotas");
        assert_eq!(alerts.predicate(1).match_count, 1);

        clock.advance(Duration::minutes(10));
        let report = run(&d, Frequency::Immediate).await;
        assert_eq!(report.emails_sent, 0);
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(alerts.predicate(1).due.last_notified_at, Some(t0));
    }

    fn sent_ids(email: &crate::alerts::memory::SentEmail) -> Vec<i64> {
        email.context["searches"]
            .as_array()
            .unwrap()
            .iter()
            .flat_map(|search| search["vehicles"].as_array().unwrap().iter())
            .map(|v| v["id"].as_i64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn toggle_off_and_on_skips_listings_added_while_off() {
        let alerts = scenario_one();
        let transport = RecordingTransport::new();
        let clock = FixedClock::new(ts(2, 10, 30));
        let d = dispatcher(&alerts, &transport, &clock);
        run(&d, Frequency::Immediate).await;
        assert_eq!(transport.sent().len(), 1);

        alerts.disable(1);
        alerts.add_vehicle(vehicle(150, "Toyota", "Yaris", 9_000, ts(2, 11, 0)));
        clock.set(ts(2, 11, 0));
        run(&d, Frequency::Immediate).await;
        alerts.enable(1, ts(2, 11, 15));
        assert_eq!(alerts.predicate(1).due.last_notified_at, Some(ts(2, 10, 30)));

        clock.set(ts(2, 11, 30));
        let report = run(&d, Frequency::Immediate).await;
        assert_eq!(report.emails_sent, 0);
        assert_eq!(transport.sent().len(), 1);

        // Listings after the re-enable are reported as usual.
        alerts.add_vehicle(vehicle(151, "Toyota", "Aqua", 9_500, ts(2, 11, 40)));
        clock.set(ts(2, 11, 45));
        run(&d, Frequency::Immediate).await;
        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent_ids(&sent[1]), vec![151]);
    }

    #[tokio::test]
    async fn listing_created_after_run_start_is_delivered_once() {
        let alerts = MemoryAlerts::new();
        let mut p = due(1, 10, "Toyotas", make("Toyota"), Frequency::Immediate);
        p.last_notified_at = Some(ts(2, 9, 0));
        alerts.add_predicate(p);
        alerts.add_vehicle(vehicle(100, "Toyota", "Yaris", 9_000, ts(2, 9, 30)));
        // Listed while the 10:00 pass is in flight.
        alerts.add_vehicle(vehicle(
            101,
            "Toyota",
            "Corolla",
            12_000,
            ts(2, 10, 0) + Duration::seconds(1),
        ));
        let transport = RecordingTransport::new();
        let clock = FixedClock::new(ts(2, 10, 0));
        let d = dispatcher(&alerts, &transport, &clock);

        run(&d, Frequency::Immediate).await;
        clock.set(ts(2, 10, 15));
        run(&d, Frequency::Immediate).await;
        clock.set(ts(2, 10, 30));
        run(&d, Frequency::Immediate).await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent_ids(&sent[0]), vec![100]);
        assert_eq!(sent_ids(&sent[1]), vec![101]);
        assert_eq!(alerts.predicate(1).due.last_notified_at, Some(ts(2, 10, 15)));
    }

    #[tokio::test]
    async fn deleted_predicate_leaves_no_trace_in_later_runs() {
        let alerts = scenario_one();
        alerts.add_predicate(due(2, 11, "Other Toyotas", make("Toyota"), Frequency::Immediate));
        alerts.remove(1);
        let transport = RecordingTransport::new();
        let clock = FixedClock::new(ts(2, 10, 30));

        let report = run(&dispatcher(&alerts, &transport, &clock), Frequency::Immediate).await;

        assert_eq!(report.selected, 1);
        assert_eq!(report.committed, 1);
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "user11@example.com");
        assert!(!alerts.contains(1));
    }

    #[tokio::test]
    async fn daily_driver_twice_in_one_window_delivers_once() {
        let alerts = MemoryAlerts::new();
        alerts.add_predicate(due(1, 10, "Toyotas", make("Toyota"), Frequency::Daily));
        alerts.add_vehicle(vehicle(101, "Toyota", "Yaris", 9_000, ts(2, 8, 0)));
        let transport = RecordingTransport::new();
        let clock = FixedClock::new(ts(2, 9, 0));
        let d = dispatcher(&alerts, &transport, &clock);

        let first = run(&d, Frequency::Daily).await;
        clock.set(ts(2, 9, 5));
        let second = run(&d, Frequency::Daily).await;

        assert_eq!(first.emails_sent, 1);
        assert_eq!(second.emails_sent, 0);
        assert_eq!(second.committed, 0);
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(alerts.predicate(1).due.last_notified_at, Some(ts(2, 9, 0)));
    }

    #[tokio::test]
    async fn matcher_error_skips_only_that_predicate() {
        let alerts = MemoryAlerts::new();
        alerts.add_predicate(due(1, 10, "Toyotas", make("Toyota"), Frequency::Daily));
        alerts.add_predicate(due(2, 11, "Hondas", make("Honda"), Frequency::Daily));
        alerts.add_vehicle(vehicle(101, "Toyota", "Yaris", 9_000, ts(2, 8, 0)));
        alerts.add_vehicle(vehicle(201, "Honda", "Fit", 8_000, ts(2, 8, 0)));
        alerts.fail_matcher_for_make("Toyota");
        let transport = RecordingTransport::new();
        let clock = FixedClock::new(ts(2, 9, 0));

        let report = run(&dispatcher(&alerts, &transport, &clock), Frequency::Daily).await;

        assert_eq!(report.matcher_errors, 1);
        assert_eq!(report.emails_sent, 1);
        assert_eq!(transport.sent()[0].to, "user11@example.com");
        assert_eq!(alerts.predicate(1).due.last_notified_at, None);
        assert_eq!(alerts.predicate(2).due.last_notified_at, Some(ts(2, 9, 0)));
    }

    #[tokio::test]
    async fn first_digest_evaluation_looks_back_one_window() {
        let alerts = MemoryAlerts::new();
        alerts.add_predicate(due(1, 10, "Toyotas", make("Toyota"), Frequency::Daily));
        alerts.add_vehicle(vehicle(101, "Toyota", "Yaris", 9_000, ts(1, 8, 0)));
        alerts.add_vehicle(vehicle(102, "Toyota", "Aqua", 9_000, ts(2, 8, 0)));
        let transport = RecordingTransport::new();
        let clock = FixedClock::new(ts(2, 9, 0));

        run(&dispatcher(&alerts, &transport, &clock), Frequency::Daily).await;

        let sent = transport.sent();
        assert_eq!(sent[0].context["searches"][0]["match_count"], 1);
        assert_eq!(alerts.predicate(1).match_count, 2);
    }

    #[tokio::test]
    async fn immediate_caps_vehicles_but_advances_past_all() {
        let alerts = MemoryAlerts::new();
        let mut p = due(1, 10, "Toyotas", make("Toyota"), Frequency::Immediate);
        p.last_notified_at = Some(ts(1, 0, 0));
        alerts.add_predicate(p);
        for i in 0..12 {
            alerts.add_vehicle(vehicle(100 + i, "Toyota", "Yaris", 9_000, ts(1, 1, i as u32)));
        }
        let transport = RecordingTransport::new();
        let clock = FixedClock::new(ts(1, 2, 0));
        let d = dispatcher(&alerts, &transport, &clock);

        run(&d, Frequency::Immediate).await;
        let search = &transport.sent()[0].context["searches"][0];
        assert_eq!(search["vehicles"].as_array().unwrap().len(), 10);
        assert_eq!(search["more_count"], 2);
        assert_eq!(search["vehicles"][0]["id"], 111);

        clock.advance(Duration::minutes(15));
        let report = run(&d, Frequency::Immediate).await;
        assert_eq!(report.emails_sent, 0);
    }

    #[tokio::test]
    async fn delivered_vehicles_always_satisfy_the_predicate() {
        let alerts = MemoryAlerts::new();
        alerts.add_predicate(due(1, 10, "Cheap Toyotas", toyota_under_15k(), Frequency::Daily));
        alerts.add_vehicle(vehicle(101, "Toyota", "Yaris", 15_000, ts(2, 1, 0)));
        alerts.add_vehicle(vehicle(102, "Toyota", "Camry", 15_001, ts(2, 2, 0)));
        alerts.add_vehicle(vehicle(103, "toyota", "Aqua", 9_000, ts(2, 3, 0)));
        let mut sold = vehicle(104, "Toyota", "Vitz", 5_000, ts(2, 4, 0));
        sold.status = "sold".into();
        alerts.add_vehicle(sold);
        let transport = RecordingTransport::new();
        let clock = FixedClock::new(ts(2, 9, 0));

        run(&dispatcher(&alerts, &transport, &clock), Frequency::Daily).await;

        let ids: Vec<i64> = transport.sent()[0].context["searches"][0]["vehicles"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![103, 101]);
    }

    #[tokio::test]
    async fn cancelled_run_commits_nothing() {
        let alerts = scenario_one();
        let transport = RecordingTransport::new();
        let clock = FixedClock::new(ts(2, 10, 30));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = dispatcher(&alerts, &transport, &clock)
            .run(Frequency::Immediate, &cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert!(transport.sent().is_empty());
        assert_eq!(alerts.predicate(1).due.last_notified_at, Some(ts(1, 0, 0)));
    }

    #[test]
    fn immediate_groups_are_per_predicate() {
        let at = ts(2, 1, 0);
        let batch = |id| MatchBatch {
            total: 1,
            vehicles: vec![vehicle(id, "Toyota", "Yaris", 9_000, at)],
        };
        let evaluated = vec![
            PredicateMatches {
                predicate: due(1, 10, "a", make("Toyota"), Frequency::Immediate),
                batch: batch(1),
            },
            PredicateMatches {
                predicate: due(2, 10, "b", make("Toyota"), Frequency::Immediate),
                batch: batch(2),
            },
        ];
        assert_eq!(group_for_delivery(Frequency::Immediate, evaluated.clone()).len(), 2);
        assert_eq!(group_for_delivery(Frequency::Daily, evaluated).len(), 1);
    }
}
