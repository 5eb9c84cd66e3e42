//! Seams for wall-clock time and for showing an alert.
//!
//! The scheduler never calls `Local::now()` or a desktop API directly; it
//! goes through [`Clock`] and [`Notifier`] so tests can pin both.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate};

// ==================== Clock Trait ====================

/// Source of "now" in the local timezone.
pub trait Clock: Send + Sync {
    fn now_local(&self) -> DateTime<Local>;

    /// Local calendar date of [`Clock::now_local`].
    fn today(&self) -> NaiveDate {
        self.now_local().date_naive()
    }
}

/// Reads the operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_local(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock pinned to a settable instant. Clones share the instant.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<DateTime<Local>>>,
}

impl MockClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Jump to `now`.
    pub fn set(&self, now: DateTime<Local>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for MockClock {
    fn now_local(&self) -> DateTime<Local> {
        *self.now.lock().unwrap()
    }
}

// ==================== Notifier Trait ====================

/// Shows a due alert to the user.
///
/// An alert backend decides when an alert fires; a notifier only renders it.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str) -> Result<()>;
}

/// Desktop notification via notify-rust.
#[cfg(feature = "desktop")]
#[derive(Debug, Clone)]
pub struct SystemNotifier {
    app_name: String,
}

#[cfg(feature = "desktop")]
impl SystemNotifier {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

#[cfg(feature = "desktop")]
impl Notifier for SystemNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<()> {
        notify_rust::Notification::new()
            .appname(&self.app_name)
            .summary(title)
            .body(body)
            .show()?;
        Ok(())
    }
}

/// Writes alerts to the log. Used for headless builds.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<()> {
        tracing::info!(title, "{}", body);
        Ok(())
    }
}

/// Records every `(title, body)` it is asked to show. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct MockNotifier {
    shown: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Vec<(String, String)> {
        self.shown.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.shown.lock().unwrap().len()
    }
}

impl Notifier for MockNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<()> {
        self.shown
            .lock()
            .unwrap()
            .push((title.to_owned(), body.to_owned()));
        Ok(())
    }
}
