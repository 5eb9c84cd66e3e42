//! Alert delivery backends.
//!
//! A backend owns the set of pending alerts. The scheduler only ever asks it
//! for permission, cancels everything, and registers new alerts one by one.

use std::{
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Local};
use tokio::task::JoinHandle;

use crate::{
    prayer::PrayerName,
    traits::{Clock, Notifier},
};

/// Outcome of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// A single alert to deliver at `at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub prayer: PrayerName,
    pub title: String,
    pub body: String,
    pub at: DateTime<Local>,
}

impl Alert {
    pub fn for_prayer(prayer: PrayerName, at: DateTime<Local>) -> Self {
        let name = prayer.display_name();
        Self {
            prayer,
            title: format!("{} Vakti", name),
            body: format!("{} vakti girdi.", name),
            at,
        }
    }
}

/// Something that can deliver alerts at future instants.
pub trait AlertBackend: Send + Sync {
    fn request_permission(&self) -> impl Future<Output = Result<Permission>> + Send;

    /// Cancel every alert previously registered through this backend.
    fn cancel_all(&self) -> impl Future<Output = Result<()>> + Send;

    fn register(&self, alert: &Alert) -> impl Future<Output = Result<()>> + Send;
}

// ==================== Timer Backend ====================

/// Longest a pending alert sleeps before re-reading the wall clock.
pub const WALL_CLOCK_RECHECK: Duration = Duration::from_secs(30);

/// In-process backend: one tokio task per alert waits until the alert is
/// due and then hands it to a [`Notifier`].
///
/// Tokio timers are monotonic and stop while the machine is suspended, so a
/// pending alert sleeps in slices of at most the recheck interval and
/// compares the wall clock against its instant after each slice.
///
/// Must be used from within a tokio runtime.
pub struct TimerAlertBackend {
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    permitted: bool,
    recheck: Duration,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl TimerAlertBackend {
    pub fn new(notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>, permitted: bool) -> Self {
        Self {
            notifier,
            clock,
            permitted,
            recheck: WALL_CLOCK_RECHECK,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Override [`WALL_CLOCK_RECHECK`]. Zero is raised to one millisecond.
    pub fn with_recheck_interval(mut self, recheck: Duration) -> Self {
        self.recheck = recheck.max(Duration::from_millis(1));
        self
    }

    /// Number of alerts still waiting to fire.
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .map(|mut pending| {
                pending.retain(|handle| !handle.is_finished());
                pending.len()
            })
            .unwrap_or(0)
    }
}

/// Wall-clock time left until `at`, or `None` once it is due.
fn time_until(clock: &dyn Clock, at: DateTime<Local>) -> Option<Duration> {
    (at - clock.now_local())
        .to_std()
        .ok()
        .filter(|left| !left.is_zero())
}

impl AlertBackend for TimerAlertBackend {
    async fn request_permission(&self) -> Result<Permission> {
        Ok(if self.permitted {
            Permission::Granted
        } else {
            Permission::Denied
        })
    }

    async fn cancel_all(&self) -> Result<()> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| anyhow!("pending alert list poisoned"))?;
        let count = pending.len();
        for handle in pending.drain(..) {
            handle.abort();
        }
        tracing::debug!("Cancelled {} pending alerts", count);
        Ok(())
    }

    async fn register(&self, alert: &Alert) -> Result<()> {
        if time_until(self.clock.as_ref(), alert.at).is_none() {
            bail!("alert time {} is not in the future", alert.at);
        }

        let notifier = Arc::clone(&self.notifier);
        let clock = Arc::clone(&self.clock);
        let recheck = self.recheck;
        let at = alert.at;
        let title = alert.title.clone();
        let body = alert.body.clone();
        let handle = tokio::spawn(async move {
            while let Some(left) = time_until(clock.as_ref(), at) {
                tokio::time::sleep(left.min(recheck)).await;
            }
            if let Err(e) = notifier.notify(&title, &body) {
                tracing::error!("Failed to show alert '{}': {:#}", title, e);
            }
        });

        self.pending
            .lock()
            .map_err(|_| anyhow!("pending alert list poisoned"))?
            .push(handle);
        Ok(())
    }
}

impl Drop for TimerAlertBackend {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            for handle in pending.drain(..) {
                handle.abort();
            }
        }
    }
}

// ==================== Mock Backend ====================

#[derive(Debug, Default)]
struct MockBackendInner {
    denied: bool,
    failing: Vec<PrayerName>,
    fail_cancel: bool,
    delay: Option<Duration>,
    register_delay: Option<Duration>,
    permission_requests: usize,
    cancel_calls: usize,
    register_calls: usize,
    active: Vec<Alert>,
}

/// Recording backend for tests. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockAlertBackend {
    inner: Arc<Mutex<MockBackendInner>>,
}

impl MockAlertBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_permission(&self, denied: bool) {
        self.inner.lock().unwrap().denied = denied;
    }

    /// Make registrations for `prayer` fail.
    pub fn fail_registration_for(&self, prayer: PrayerName) {
        self.inner.lock().unwrap().failing.push(prayer);
    }

    pub fn fail_cancel(&self, fail: bool) {
        self.inner.lock().unwrap().fail_cancel = fail;
    }

    /// Sleep this long inside every backend call.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.inner.lock().unwrap().delay = delay;
    }

    /// Sleep this long inside `register` only, after any [`set_delay`] pause.
    ///
    /// [`set_delay`]: MockAlertBackend::set_delay
    pub fn set_register_delay(&self, delay: Option<Duration>) {
        self.inner.lock().unwrap().register_delay = delay;
    }

    /// Alerts registered since the last cancel-all.
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.inner.lock().unwrap().active.clone()
    }

    pub fn permission_requests(&self) -> usize {
        self.inner.lock().unwrap().permission_requests
    }

    pub fn cancel_calls(&self) -> usize {
        self.inner.lock().unwrap().cancel_calls
    }

    /// Every register attempt, failed ones included.
    pub fn register_calls(&self) -> usize {
        self.inner.lock().unwrap().register_calls
    }

    async fn pause(&self) {
        let delay = self.inner.lock().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl AlertBackend for MockAlertBackend {
    async fn request_permission(&self) -> Result<Permission> {
        self.pause().await;
        let mut inner = self.inner.lock().unwrap();
        inner.permission_requests += 1;
        Ok(if inner.denied {
            Permission::Denied
        } else {
            Permission::Granted
        })
    }

    async fn cancel_all(&self) -> Result<()> {
        self.pause().await;
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_cancel {
            bail!("injected cancel failure");
        }
        inner.cancel_calls += 1;
        inner.active.clear();
        Ok(())
    }

    async fn register(&self, alert: &Alert) -> Result<()> {
        self.pause().await;
        let register_delay = self.inner.lock().unwrap().register_delay;
        if let Some(delay) = register_delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.register_calls += 1;
        if inner.failing.contains(&alert.prayer) {
            bail!("injected registration failure for {}", alert.prayer.key());
        }
        inner.active.push(alert.clone());
        Ok(())
    }
}
