//! Prayer alert scheduling pipeline.
//!
//! `sync` runs settings -> plan -> dedup gate -> commit. The commit cancels
//! every pending alert, registers one per enabled prayer and then records
//! what was committed so the next identical call is a no-op.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::{
    alerts::{Alert, AlertBackend, Permission},
    config::{CommitPolicy, DedupKey, SchedulerConfig},
    countdown::{self, CountdownState},
    dedup::{self, ScheduleMeta},
    prayer::{PrayerName, PrayerTimeSet},
    schedule::{self, SchedulePlan},
    settings,
    store::KeyValueStore,
    time::roll_forward,
    traits::Clock,
};

/// Why a commit did not happen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    #[error("alert permission denied")]
    PermissionDenied,
    #[error("alert backend did not finish within {0:?}")]
    Timeout(Duration),
    #[error("failed to cancel pending alerts: {0}")]
    Cancel(String),
    #[error("alert backend error: {0}")]
    Backend(String),
}

/// Summary of a commit that ran to the end of its registration loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub date: String,
    pub registered: Vec<(PrayerName, DateTime<Local>)>,
    pub failed: Vec<PrayerName>,
    pub meta_persisted: bool,
}

/// Result of one `sync` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Committed(CommitReport),
    /// Same day and same fingerprint as the last commit.
    Unchanged,
    /// Another sync was already running.
    Busy,
    Aborted(CommitError),
}

impl ScheduleOutcome {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, ScheduleOutcome::Aborted(CommitError::PermissionDenied))
    }
}

/// Scheduler policy knobs, resolved from [`SchedulerConfig`].
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    pub rollover_margin: chrono::Duration,
    pub commit_timeout: Duration,
    pub dedup_key: DedupKey,
    pub commit_policy: CommitPolicy,
}

impl SchedulerOptions {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            rollover_margin: chrono::Duration::seconds(config.rollover_margin_secs as i64),
            commit_timeout: Duration::from_secs(config.commit_timeout_secs),
            dedup_key: config.dedup_key,
            commit_policy: config.commit_policy,
        }
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

/// Reentrancy guard state owned by one scheduler.
#[derive(Debug, Default)]
pub struct SchedulerState {
    in_flight: AtomicBool,
}

impl SchedulerState {
    /// Claim the scheduler, or `None` if a sync is already running.
    pub fn try_begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| InFlight { state: self })
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Releases the guard on drop, including when a sync future is dropped
/// mid-flight.
pub struct InFlight<'a> {
    state: &'a SchedulerState,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state.in_flight.store(false, Ordering::Release);
    }
}

pub struct PrayerScheduler<B: AlertBackend> {
    backend: B,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    options: SchedulerOptions,
    state: SchedulerState,
}

impl<B: AlertBackend> PrayerScheduler<B> {
    pub fn new(
        backend: B,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            backend,
            store,
            clock,
            options,
            state: SchedulerState::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// The plan `sync` would commit right now, without side effects.
    pub fn preview(&self, times: &PrayerTimeSet) -> SchedulePlan {
        schedule::build(times, &settings::load(self.store.as_ref()))
    }

    /// Countdown state at the clock's current time.
    pub fn countdown(&self, times: &PrayerTimeSet) -> CountdownState<Local> {
        countdown::evaluate(times, &self.clock.now_local())
    }

    /// Bring registered alerts in line with `times` and the stored settings.
    pub async fn sync(&self, times: &PrayerTimeSet) -> ScheduleOutcome {
        let Some(_guard) = self.state.try_begin() else {
            tracing::debug!("Schedule sync already in progress, skipping");
            return ScheduleOutcome::Busy;
        };

        let now = self.clock.now_local();
        let date = dedup::date_key(now.date_naive());
        let settings = settings::load(self.store.as_ref());
        let plan = schedule::build(times, &settings);

        let last = dedup::load_meta(self.store.as_ref());
        if !dedup::should_reschedule(&date, &plan.fingerprint, last.as_ref(), self.options.dedup_key)
        {
            tracing::debug!(%date, "Schedule unchanged, nothing to do");
            return ScheduleOutcome::Unchanged;
        }

        let timeout = self.options.commit_timeout;
        let (registered, failed) =
            match tokio::time::timeout(timeout, self.register_all(&plan, now)).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    tracing::warn!("Schedule commit aborted: {}", e);
                    return ScheduleOutcome::Aborted(e);
                }
                Err(_) => {
                    tracing::warn!("Schedule commit timed out after {:?}", timeout);
                    return ScheduleOutcome::Aborted(CommitError::Timeout(timeout));
                }
            };

        let meta_persisted = if failed.is_empty() || self.options.commit_policy == CommitPolicy::Partial
        {
            let meta = ScheduleMeta {
                fingerprint: plan.fingerprint.clone(),
                date: date.clone(),
            };
            match dedup::save_meta(self.store.as_ref(), &meta) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("{:#}; next sync will reschedule", e);
                    false
                }
            }
        } else {
            tracing::warn!(
                failed = failed.len(),
                "Strict commit policy: not recording schedule so it is retried"
            );
            false
        };

        tracing::info!(
            %date,
            registered = registered.len(),
            failed = failed.len(),
            meta_persisted,
            "Prayer alerts scheduled"
        );

        ScheduleOutcome::Committed(CommitReport {
            date,
            registered,
            failed,
            meta_persisted,
        })
    }

    /// Permission, cancel-all, then one registration per item, in order.
    async fn register_all(
        &self,
        plan: &SchedulePlan,
        now: DateTime<Local>,
    ) -> Result<(Vec<(PrayerName, DateTime<Local>)>, Vec<PrayerName>), CommitError> {
        match self.backend.request_permission().await {
            Ok(Permission::Granted) => {}
            Ok(Permission::Denied) => return Err(CommitError::PermissionDenied),
            Err(e) => return Err(CommitError::Backend(format!("{:#}", e))),
        }

        self.backend
            .cancel_all()
            .await
            .map_err(|e| CommitError::Cancel(format!("{:#}", e)))?;

        let mut registered = Vec::with_capacity(plan.len());
        let mut failed = Vec::new();

        for item in &plan.items {
            let at = roll_forward(&item.time, &now, self.options.rollover_margin);
            let alert = Alert::for_prayer(item.prayer, at);
            match self.backend.register(&alert).await {
                Ok(()) => {
                    tracing::debug!(prayer = item.prayer.key(), %at, "Registered alert");
                    registered.push((item.prayer, at));
                }
                Err(e) => {
                    tracing::warn!(
                        prayer = item.prayer.key(),
                        "Failed to register alert, skipping: {:#}",
                        e
                    );
                    failed.push(item.prayer);
                }
            }
        }

        Ok((registered, failed))
    }
}
