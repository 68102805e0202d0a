//! End-to-end reconciliation tests over the in-memory collaborators.

use std::sync::Arc;

use chrono::NaiveDate;

use tally_core::count::CountRecord;
use tally_core::counter::memory::StaticCounter;
use tally_core::counter::Side;
use tally_core::dimension::DimensionKey;
use tally_core::store::memory::InMemoryStateStore;
use tally_core::{
    Error, ReconcileConfig, ReconcileService, ReconciliationEngine, RunCoordinator, RunState,
    StateStore, TablePair, TableRef,
};

fn d(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn pair() -> TablePair {
    TablePair::new(
        TableRef::new("orders_db", "public", "orders"),
        TableRef::new("warehouse", "analytics", "orders"),
    )
}

fn config() -> ReconcileConfig {
    ReconcileConfig::new(pair()).with_epoch(d(2023, 12, 31))
}

fn plain(day: NaiveDate, count: i64) -> CountRecord {
    CountRecord::new(day, count, DimensionKey::none())
}

fn engine_with(
    store: &Arc<InMemoryStateStore>,
    source: Vec<CountRecord>,
    target: Vec<CountRecord>,
    config: ReconcileConfig,
) -> ReconciliationEngine {
    ReconciliationEngine::new(
        store.clone() as Arc<dyn StateStore>,
        Arc::new(StaticCounter::new(Side::Source, source)),
        Arc::new(StaticCounter::new(Side::Target, target)),
        config,
    )
}

#[tokio::test]
async fn matching_day_produces_a_valid_verdict() {
    let store = Arc::new(InMemoryStateStore::new());
    let day = d(2024, 1, 1);
    let engine = engine_with(
        &store,
        vec![plain(day, 100)],
        vec![plain(day, 200)],
        config(),
    );

    let outcome = engine.execute_as_of(d(2024, 1, 10)).await.unwrap();

    assert!(outcome.all_valid());
    assert_eq!(outcome.days_checked, 1);
    assert_eq!(outcome.source_total, 100);
    assert_eq!(outcome.target_total, 200);

    let checks = store.checks_for(&pair()).unwrap();
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].day, day);
    assert_eq!(checks[0].source_count, 100);
    assert_eq!(checks[0].target_count, 200);
    assert_eq!(checks[0].diff_count, 100);
    assert!(checks[0].is_valid);
}

#[tokio::test]
async fn missing_target_day_is_invalid() {
    let store = Arc::new(InMemoryStateStore::new());
    let day = d(2024, 1, 1);
    let engine = engine_with(&store, vec![plain(day, 150)], vec![], config());

    let outcome = engine.execute_as_of(d(2024, 1, 10)).await.unwrap();

    assert!(!outcome.all_valid());
    assert_eq!(outcome.invalid_days, vec![day]);

    let checks = store.checks_for(&pair()).unwrap();
    assert_eq!(checks[0].source_count, 150);
    assert_eq!(checks[0].target_count, 0);
    assert_eq!(checks[0].diff_count, -150);
    assert!(!checks[0].is_valid);
}

#[tokio::test]
async fn dimension_mismatch_is_not_masked_by_matching_sums() {
    // Both sides count 200 rows on the day, but under opposite dimension
    // values: each slice is one-sided, so the day must come out invalid.
    let store = Arc::new(InMemoryStateStore::new());
    let day = d(2024, 1, 1);
    let engine = engine_with(
        &store,
        vec![CountRecord::new(
            day,
            200,
            DimensionKey::from_pairs([("status", "True")]),
        )],
        vec![CountRecord::new(
            day,
            200,
            DimensionKey::from_pairs([("status", "False")]),
        )],
        config().with_dimension_columns(vec!["status".into()]),
    );

    let outcome = engine.execute_as_of(d(2024, 1, 10)).await.unwrap();

    assert!(!outcome.all_valid());
    let checks = store.checks_for(&pair()).unwrap();
    assert_eq!(checks[0].source_count, 200);
    assert_eq!(checks[0].target_count, 200);
    assert!(!checks[0].is_valid);
}

#[tokio::test]
async fn caught_up_pair_checks_nothing_and_is_vacuously_valid() {
    let store = Arc::new(InMemoryStateStore::new());
    // Seed history up to the safety cutoff: today - 2 == the last check.
    let engine = engine_with(
        &store,
        vec![plain(d(2024, 1, 3), 10)],
        vec![plain(d(2024, 1, 3), 10)],
        config(),
    );
    engine.execute_as_of(d(2024, 1, 5)).await.unwrap();

    let outcome = engine.execute_as_of(d(2024, 1, 5)).await.unwrap();
    assert!(outcome.all_valid());
    assert_eq!(outcome.days_checked, 0);
}

#[tokio::test]
async fn invalid_day_is_rechecked_until_it_heals() {
    let store = Arc::new(InMemoryStateStore::new());
    let day = d(2024, 1, 1);

    // First run: target missing rows -> invalid verdict persisted.
    let engine = engine_with(&store, vec![plain(day, 100)], vec![plain(day, 60)], config());
    let outcome = engine.execute_as_of(d(2024, 1, 10)).await.unwrap();
    assert_eq!(outcome.invalid_days, vec![day]);

    // Later run, far past the forward window for that day: the invalid day
    // is replayed via the backfill list and heals in place.
    let engine = engine_with(
        &store,
        vec![plain(day, 100)],
        vec![plain(day, 100)],
        config(),
    );
    let outcome = engine.execute_as_of(d(2024, 1, 20)).await.unwrap();

    assert!(outcome.all_valid());
    let checks = store.checks_for(&pair()).unwrap();
    let healed = checks.iter().find(|check| check.day == day).unwrap();
    assert!(healed.is_valid);
    assert_eq!(healed.target_count, 100);
    assert!(store.invalid_days(&pair()).await.unwrap().is_empty());
}

#[tokio::test]
async fn fetch_failure_persists_nothing() {
    let store = Arc::new(InMemoryStateStore::new());
    let engine = ReconciliationEngine::new(
        store.clone() as Arc<dyn StateStore>,
        Arc::new(StaticCounter::new(
            Side::Source,
            vec![plain(d(2024, 1, 1), 10)],
        )),
        Arc::new(StaticCounter::failing(Side::Target, "connection refused")),
        config(),
    );

    let err = engine.execute_as_of(d(2024, 1, 10)).await.unwrap_err();
    assert!(matches!(err, Error::Counter { side: Side::Target, .. }));
    assert!(store.checks_for(&pair()).unwrap().is_empty());
}

#[tokio::test]
async fn service_completes_the_run_on_success() {
    let store = Arc::new(InMemoryStateStore::new());
    let day = d(2024, 1, 1);
    let service = ReconcileService::new(
        store.clone() as Arc<dyn StateStore>,
        Arc::new(StaticCounter::new(Side::Source, vec![plain(day, 5)])),
        Arc::new(StaticCounter::new(Side::Target, vec![plain(day, 5)])),
        config(),
    );

    let outcome = service
        .run(d(2024, 1, 10), std::future::pending())
        .await
        .unwrap();

    assert!(outcome.all_valid());
    let runs = store.runs().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunState::Completed);
}

#[tokio::test]
async fn service_marks_the_run_failed_on_counter_failure() {
    let store = Arc::new(InMemoryStateStore::new());
    let service = ReconcileService::new(
        store.clone() as Arc<dyn StateStore>,
        Arc::new(StaticCounter::failing(Side::Source, "boom")),
        Arc::new(StaticCounter::new(Side::Target, vec![])),
        config(),
    );

    let err = service
        .run(d(2024, 1, 10), std::future::pending())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Counter { side: Side::Source, .. }));
    assert_eq!(store.runs().unwrap()[0].status, RunState::Failed);
    assert!(store.checks_for(&pair()).unwrap().is_empty());
}

#[tokio::test]
async fn shutdown_marks_the_run_failed_before_returning() {
    let store = Arc::new(InMemoryStateStore::new());
    let service = ReconcileService::new(
        store.clone() as Arc<dyn StateStore>,
        Arc::new(StaticCounter::new(Side::Source, vec![])),
        Arc::new(StaticCounter::new(Side::Target, vec![])),
        config(),
    );

    // Shutdown that is already resolved: the select sees it immediately.
    let err = service
        .run(d(2024, 1, 10), std::future::ready(()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(store.runs().unwrap()[0].status, RunState::Failed);
}

#[tokio::test]
async fn concurrent_starts_produce_exactly_one_running_record() {
    let store = Arc::new(InMemoryStateStore::new());

    let (first, second) = tokio::join!(
        RunCoordinator::start(store.clone() as Arc<dyn StateStore>, pair()),
        RunCoordinator::start(store.clone() as Arc<dyn StateStore>, pair()),
    );

    let outcomes = [first, second];
    let winners = outcomes.iter().filter(|result| result.is_ok()).count();
    let losers = outcomes
        .iter()
        .filter(|result| matches!(result, Err(Error::ConcurrentRun { .. })))
        .count();

    assert_eq!(winners, 1);
    assert_eq!(losers, 1);

    let runs = store.runs().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunState::Running);

    // The loser's error names the winner.
    let winner_id = runs[0].run_id;
    for outcome in &outcomes {
        if let Err(Error::ConcurrentRun { run_ids }) = outcome {
            assert_eq!(run_ids, &vec![winner_id]);
        }
    }
}

#[tokio::test]
async fn second_invocation_conflicts_until_the_first_finishes() {
    let store = Arc::new(InMemoryStateStore::new());
    let service = ReconcileService::new(
        store.clone() as Arc<dyn StateStore>,
        Arc::new(StaticCounter::new(Side::Source, vec![])),
        Arc::new(StaticCounter::new(Side::Target, vec![])),
        config(),
    );

    let coordinator = RunCoordinator::start(store.clone() as Arc<dyn StateStore>, pair())
        .await
        .unwrap();

    let err = service
        .run(d(2024, 1, 10), std::future::pending())
        .await
        .unwrap_err();
    assert!(err.is_concurrent_run());

    coordinator.complete().await.unwrap();

    let outcome = service
        .run(d(2024, 1, 10), std::future::pending())
        .await
        .unwrap();
    assert!(outcome.all_valid());
}
