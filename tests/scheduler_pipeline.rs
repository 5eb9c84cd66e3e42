//! Integration tests for the scheduling pipeline.
//!
//! These tests drive `PrayerScheduler::sync` with a mock clock, a recording
//! alert backend and an in-memory store.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Local, TimeZone};
use prayer_alerts::{
    CommitError, CommitPolicy, DedupKey, KeyValueStore, MemoryStore, MockAlertBackend, MockClock,
    PrayerDay, PrayerName, PrayerScheduler, PrayerSettings, PrayerTimeSet, ScheduleMeta,
    ScheduleOutcome, SchedulerOptions, schedule, settings,
    store::{SCHEDULE_META_KEY, SETTINGS_KEY},
};

fn local(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

fn sample_times() -> PrayerTimeSet {
    PrayerTimeSet::new("05:12", "06:45", "12:30", "15:40", "18:10", "19:35")
}

struct Harness {
    scheduler: PrayerScheduler<MockAlertBackend>,
    backend: MockAlertBackend,
    store: MemoryStore,
    clock: MockClock,
}

fn harness_with(now: DateTime<Local>, options: SchedulerOptions) -> Harness {
    let backend = MockAlertBackend::new();
    let store = MemoryStore::new();
    let clock = MockClock::new(now);
    let scheduler = PrayerScheduler::new(
        backend.clone(),
        Arc::new(store.clone()),
        Arc::new(clock.clone()),
        options,
    );
    Harness {
        scheduler,
        backend,
        store,
        clock,
    }
}

fn harness(now: DateTime<Local>) -> Harness {
    harness_with(now, SchedulerOptions::default())
}

fn stored_meta(store: &MemoryStore) -> Option<ScheduleMeta> {
    store
        .peek(SCHEDULE_META_KEY)
        .map(|raw| serde_json::from_str(&raw).unwrap())
}

fn committed(outcome: ScheduleOutcome) -> prayer_alerts::CommitReport {
    match outcome {
        ScheduleOutcome::Committed(report) => report,
        other => panic!("expected a commit, got {:?}", other),
    }
}

fn enable_all(store: &MemoryStore) {
    let mut prefs = PrayerSettings::default();
    prefs.set_enabled(PrayerName::Gunes, true);
    settings::save(store, &prefs).unwrap();
}

// ==================== Worked Example ====================

#[tokio::test]
async fn test_evening_sync_schedules_five_alerts() {
    let h = harness(local(2024, 6, 15, 18, 11, 0));

    let report = committed(h.scheduler.sync(&sample_times()).await);

    assert_eq!(report.date, "2024-06-15");
    assert!(report.failed.is_empty());
    assert!(report.meta_persisted);

    let alerts = h.backend.active_alerts();
    let prayers: Vec<_> = alerts.iter().map(|a| a.prayer).collect();
    assert_eq!(
        prayers,
        vec![
            PrayerName::Imsak,
            PrayerName::Ogle,
            PrayerName::Ikindi,
            PrayerName::Aksam,
            PrayerName::Yatsi,
        ]
    );

    // Everything already passed moves to tomorrow.
    assert_eq!(alerts[0].at, local(2024, 6, 16, 5, 12, 0));
    assert_eq!(alerts[1].at, local(2024, 6, 16, 12, 30, 0));
    assert_eq!(alerts[2].at, local(2024, 6, 16, 15, 40, 0));
    assert_eq!(alerts[3].at, local(2024, 6, 16, 18, 10, 0));
    assert_eq!(alerts[4].at, local(2024, 6, 15, 19, 35, 0));
    assert_eq!(alerts[4].title, "Yatsı Vakti");
    assert_eq!(alerts[4].body, "Yatsı vakti girdi.");

    let canonical = "aksam=18:10;ikindi=15:40;imsak=05:12;ogle=12:30;yatsi=19:35";
    let meta = stored_meta(&h.store).expect("meta should be written");
    assert_eq!(meta.date, "2024-06-15");
    assert_eq!(meta.fingerprint, schedule::fingerprint(canonical));
}

#[tokio::test]
async fn test_countdown_at_worked_example() {
    let h = harness(local(2024, 6, 15, 18, 11, 11));

    let state = h.scheduler.countdown(&sample_times());
    assert_eq!(state.current.prayer, PrayerName::Aksam);
    assert_eq!(state.current.day, PrayerDay::Today);
    assert_eq!(state.next.prayer, PrayerName::Yatsi);
    assert_eq!(state.next.day, PrayerDay::Today);
    assert_eq!(state.remaining_display(), "01:23:49");
}

#[tokio::test]
async fn test_preview_has_no_side_effects() {
    let h = harness(local(2024, 6, 15, 9, 0, 0));

    let plan = h.scheduler.preview(&sample_times());
    assert_eq!(plan.len(), 5);
    assert_eq!(h.backend.permission_requests(), 0);
    assert!(h.store.peek(SCHEDULE_META_KEY).is_none());
}

// ==================== Deduplication Tests ====================

#[tokio::test]
async fn test_repeat_sync_is_unchanged() {
    let h = harness(local(2024, 6, 15, 9, 0, 0));
    let times = sample_times();

    committed(h.scheduler.sync(&times).await);
    assert_eq!(h.scheduler.sync(&times).await, ScheduleOutcome::Unchanged);
    assert_eq!(h.scheduler.sync(&times).await, ScheduleOutcome::Unchanged);

    assert_eq!(h.backend.cancel_calls(), 1);
    assert_eq!(h.backend.register_calls(), 5);
    assert_eq!(h.backend.active_alerts().len(), 5);
}

#[tokio::test]
async fn test_setting_change_reschedules() {
    let h = harness(local(2024, 6, 15, 9, 0, 0));
    let times = sample_times();

    committed(h.scheduler.sync(&times).await);
    let before = stored_meta(&h.store).unwrap();

    enable_all(&h.store);
    let report = committed(h.scheduler.sync(&times).await);

    assert_eq!(report.registered.len(), 6);
    assert_eq!(h.backend.cancel_calls(), 2);
    assert_eq!(h.backend.active_alerts().len(), 6);
    assert_ne!(stored_meta(&h.store).unwrap().fingerprint, before.fingerprint);
}

#[tokio::test]
async fn test_time_change_reschedules() {
    let h = harness(local(2024, 6, 15, 9, 0, 0));

    committed(h.scheduler.sync(&sample_times()).await);

    let shifted = PrayerTimeSet::new("05:12", "06:45", "12:31", "15:40", "18:10", "19:35");
    committed(h.scheduler.sync(&shifted).await);

    assert_eq!(h.backend.cancel_calls(), 2);
    let ogle = h
        .backend
        .active_alerts()
        .into_iter()
        .find(|a| a.prayer == PrayerName::Ogle)
        .unwrap();
    assert_eq!(ogle.at, local(2024, 6, 15, 12, 31, 0));
}

#[tokio::test]
async fn test_new_day_reschedules() {
    let h = harness(local(2024, 6, 15, 9, 0, 0));
    let times = sample_times();

    committed(h.scheduler.sync(&times).await);
    h.clock.set(local(2024, 6, 16, 0, 5, 0));

    let report = committed(h.scheduler.sync(&times).await);
    assert_eq!(report.date, "2024-06-16");
    assert_eq!(h.backend.cancel_calls(), 2);
    assert_eq!(stored_meta(&h.store).unwrap().date, "2024-06-16");
}

#[tokio::test]
async fn test_fingerprint_only_ignores_new_day() {
    let options = SchedulerOptions {
        dedup_key: DedupKey::FingerprintOnly,
        ..SchedulerOptions::default()
    };
    let h = harness_with(local(2024, 6, 15, 9, 0, 0), options);
    let times = sample_times();

    committed(h.scheduler.sync(&times).await);
    h.clock.set(local(2024, 6, 16, 9, 0, 0));

    assert_eq!(h.scheduler.sync(&times).await, ScheduleOutcome::Unchanged);
}

#[tokio::test]
async fn test_corrupt_meta_reschedules() {
    let h = harness(local(2024, 6, 15, 9, 0, 0));
    h.store.set(SCHEDULE_META_KEY, "not json").unwrap();

    committed(h.scheduler.sync(&sample_times()).await);
    assert!(stored_meta(&h.store).is_some());
}

// ==================== Settings Tests ====================

#[tokio::test]
async fn test_partial_stored_settings_fill_defaults() {
    let h = harness(local(2024, 6, 15, 9, 0, 0));
    h.store
        .set(SETTINGS_KEY, r#"{"ogle":{"adhan":false}}"#)
        .unwrap();

    let report = committed(h.scheduler.sync(&sample_times()).await);
    let prayers: Vec<_> = report.registered.iter().map(|(p, _)| *p).collect();
    assert_eq!(
        prayers,
        vec![
            PrayerName::Imsak,
            PrayerName::Ikindi,
            PrayerName::Aksam,
            PrayerName::Yatsi,
        ]
    );
}

#[tokio::test]
async fn test_corrupt_settings_use_defaults() {
    let h = harness(local(2024, 6, 15, 9, 0, 0));
    h.store.set(SETTINGS_KEY, "{{{{").unwrap();

    let report = committed(h.scheduler.sync(&sample_times()).await);
    assert_eq!(report.registered.len(), 5);
}

#[tokio::test]
async fn test_all_disabled_clears_alerts() {
    let h = harness(local(2024, 6, 15, 9, 0, 0));
    let times = sample_times();
    committed(h.scheduler.sync(&times).await);

    let mut prefs = PrayerSettings::default();
    for prayer in PrayerName::ALL {
        prefs.set_enabled(prayer, false);
    }
    settings::save(&h.store, &prefs).unwrap();

    let report = committed(h.scheduler.sync(&times).await);
    assert!(report.registered.is_empty());
    assert!(h.backend.active_alerts().is_empty());
    assert_eq!(h.backend.cancel_calls(), 2);
}

// ==================== Failure Tests ====================

#[tokio::test]
async fn test_permission_denied_aborts_without_side_effects() {
    let h = harness(local(2024, 6, 15, 9, 0, 0));
    h.backend.deny_permission(true);

    let outcome = h.scheduler.sync(&sample_times()).await;
    assert!(outcome.is_permission_denied());
    assert_eq!(h.backend.cancel_calls(), 0);
    assert_eq!(h.backend.register_calls(), 0);
    assert!(h.store.peek(SCHEDULE_META_KEY).is_none());

    // Granting later lets the next sync commit.
    h.backend.deny_permission(false);
    committed(h.scheduler.sync(&sample_times()).await);
}

#[tokio::test]
async fn test_cancel_failure_aborts() {
    let h = harness(local(2024, 6, 15, 9, 0, 0));
    h.backend.fail_cancel(true);

    let outcome = h.scheduler.sync(&sample_times()).await;
    assert!(matches!(outcome, ScheduleOutcome::Aborted(CommitError::Cancel(_))));
    assert_eq!(h.backend.register_calls(), 0);
    assert!(h.store.peek(SCHEDULE_META_KEY).is_none());
}

#[tokio::test]
async fn test_partial_registration_failure_still_records() {
    let h = harness(local(2024, 6, 15, 9, 0, 0));
    enable_all(&h.store);
    h.backend.fail_registration_for(PrayerName::Ogle);

    let report = committed(h.scheduler.sync(&sample_times()).await);
    assert_eq!(report.registered.len(), 5);
    assert_eq!(report.failed, vec![PrayerName::Ogle]);
    assert!(report.meta_persisted);
    assert_eq!(h.backend.register_calls(), 6);

    assert_eq!(
        h.scheduler.sync(&sample_times()).await,
        ScheduleOutcome::Unchanged
    );
}

#[tokio::test]
async fn test_strict_policy_retries_after_failure() {
    let options = SchedulerOptions {
        commit_policy: CommitPolicy::Strict,
        ..SchedulerOptions::default()
    };
    let h = harness_with(local(2024, 6, 15, 9, 0, 0), options);
    h.backend.fail_registration_for(PrayerName::Ogle);

    let report = committed(h.scheduler.sync(&sample_times()).await);
    assert_eq!(report.failed, vec![PrayerName::Ogle]);
    assert!(!report.meta_persisted);
    assert!(h.store.peek(SCHEDULE_META_KEY).is_none());

    committed(h.scheduler.sync(&sample_times()).await);
    assert_eq!(h.backend.cancel_calls(), 2);
}

#[tokio::test]
async fn test_meta_write_failure_retries_next_time() {
    let h = harness(local(2024, 6, 15, 9, 0, 0));
    let times = sample_times();
    h.store.fail_writes_for(SCHEDULE_META_KEY);

    let report = committed(h.scheduler.sync(&times).await);
    assert!(!report.meta_persisted);
    assert_eq!(report.registered.len(), 5);

    committed(h.scheduler.sync(&times).await);
    assert_eq!(h.backend.cancel_calls(), 2);

    h.store.clear_failures();
    assert!(committed(h.scheduler.sync(&times).await).meta_persisted);
    assert_eq!(h.scheduler.sync(&times).await, ScheduleOutcome::Unchanged);
    assert_eq!(h.backend.active_alerts().len(), 5);
}

#[tokio::test]
async fn test_slow_backend_times_out_without_meta() {
    let options = SchedulerOptions {
        commit_timeout: Duration::from_millis(50),
        ..SchedulerOptions::default()
    };
    let h = harness_with(local(2024, 6, 15, 9, 0, 0), options);
    h.backend.set_delay(Some(Duration::from_millis(200)));

    let outcome = h.scheduler.sync(&sample_times()).await;
    assert_eq!(
        outcome,
        ScheduleOutcome::Aborted(CommitError::Timeout(Duration::from_millis(50)))
    );
    assert!(h.store.peek(SCHEDULE_META_KEY).is_none());
    assert!(!h.scheduler.state().is_busy());

    h.backend.set_delay(None);
    committed(h.scheduler.sync(&sample_times()).await);
}

#[tokio::test]
async fn test_timeout_while_registering_keeps_previous_meta() {
    let options = SchedulerOptions {
        commit_timeout: Duration::from_millis(100),
        ..SchedulerOptions::default()
    };
    let h = harness_with(local(2024, 6, 15, 9, 0, 0), options);
    let times = sample_times();

    committed(h.scheduler.sync(&times).await);
    let before = stored_meta(&h.store).unwrap();
    assert_eq!(h.backend.register_calls(), 5);

    enable_all(&h.store);
    h.backend.set_register_delay(Some(Duration::from_millis(200)));

    let outcome = h.scheduler.sync(&times).await;
    assert_eq!(
        outcome,
        ScheduleOutcome::Aborted(CommitError::Timeout(Duration::from_millis(100)))
    );
    // Cancelled, then dropped inside the first registration.
    assert_eq!(h.backend.cancel_calls(), 2);
    assert_eq!(h.backend.register_calls(), 5);
    assert!(h.backend.active_alerts().is_empty());
    assert_eq!(stored_meta(&h.store), Some(before));
    assert!(!h.scheduler.state().is_busy());

    h.backend.set_register_delay(None);
    let report = committed(h.scheduler.sync(&times).await);
    assert_eq!(report.registered.len(), 6);
    assert_eq!(h.backend.active_alerts().len(), 6);
}

// ==================== Concurrency Tests ====================

#[tokio::test]
async fn test_concurrent_sync_is_rejected() {
    let h = harness(local(2024, 6, 15, 9, 0, 0));
    h.backend.set_delay(Some(Duration::from_millis(20)));
    let times = sample_times();

    let (first, second) = tokio::join!(h.scheduler.sync(&times), h.scheduler.sync(&times));

    let outcomes = [first, second];
    let busy = outcomes
        .iter()
        .filter(|o| **o == ScheduleOutcome::Busy)
        .count();
    let commits = outcomes
        .iter()
        .filter(|o| matches!(o, ScheduleOutcome::Committed(_)))
        .count();
    assert_eq!(busy, 1);
    assert_eq!(commits, 1);
    assert_eq!(h.backend.cancel_calls(), 1);
    assert!(!h.scheduler.state().is_busy());
}

// ==================== Rollover Tests ====================

#[tokio::test]
async fn test_morning_sync_keeps_everything_today() {
    let h = harness(local(2024, 6, 15, 4, 0, 0));

    let report = committed(h.scheduler.sync(&sample_times()).await);
    assert!(
        report
            .registered
            .iter()
            .all(|(_, at)| at.date_naive() == local(2024, 6, 15, 0, 0, 0).date_naive())
    );
}

#[tokio::test]
async fn test_time_inside_margin_rolls_over() {
    let h = harness(local(2024, 6, 15, 18, 9, 45));

    let report = committed(h.scheduler.sync(&sample_times()).await);
    let aksam = report
        .registered
        .iter()
        .find(|(p, _)| *p == PrayerName::Aksam)
        .map(|(_, at)| *at)
        .unwrap();
    assert_eq!(aksam, local(2024, 6, 16, 18, 10, 0));
}

#[tokio::test]
async fn test_registered_times_are_in_the_future() {
    let now = local(2024, 6, 15, 13, 37, 0);
    let h = harness(now);
    enable_all(&h.store);

    let report = committed(h.scheduler.sync(&sample_times()).await);
    assert_eq!(report.registered.len(), 6);
    for (_, at) in &report.registered {
        assert!(*at > now);
        assert!(*at <= now + chrono::Duration::hours(25));
    }
}

#[tokio::test]
async fn test_malformed_time_is_scheduled_at_midnight() {
    let h = harness(local(2024, 6, 15, 9, 0, 0));
    let times = PrayerTimeSet::new("bad", "06:45", "12:30", "15:40", "18:10", "19:35");

    let report = committed(h.scheduler.sync(&times).await);
    let imsak = report
        .registered
        .iter()
        .find(|(p, _)| *p == PrayerName::Imsak)
        .map(|(_, at)| *at)
        .unwrap();
    assert_eq!(imsak, local(2024, 6, 16, 0, 0, 0));
}
