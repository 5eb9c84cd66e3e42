//! Prayer Alerts Library
//!
//! Schedules local alerts for the daily prayer times of a location and
//! tracks the current/next prayer for a countdown display.

pub mod alerts;
pub mod api;
pub mod config;
pub mod countdown;
pub mod dedup;
pub mod prayer;
pub mod provider;
pub mod schedule;
pub mod scheduler;
pub mod settings;
pub mod store;
pub mod time;
pub mod traits;

// Re-export commonly used types
pub use alerts::{Alert, AlertBackend, MockAlertBackend, Permission, TimerAlertBackend};
pub use api::PrayerTimesClient;
pub use config::{AppConfig, CommitPolicy, DedupKey};
pub use countdown::{CountdownState, PrayerDay, PrayerSlot, evaluate};
pub use dedup::{ScheduleMeta, should_reschedule};
pub use prayer::{PrayerName, PrayerTimeSet};
pub use provider::{CachedPrayerData, DailyTimes, LocationData};
pub use schedule::{ScheduleItem, SchedulePlan};
pub use scheduler::{
    CommitError, CommitReport, PrayerScheduler, ScheduleOutcome, SchedulerOptions, SchedulerState,
};
pub use settings::PrayerSettings;
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use time::{format_duration, roll_forward, to_instant};
pub use traits::{Clock, LogNotifier, MockClock, MockNotifier, Notifier, SystemClock};
#[cfg(feature = "desktop")]
pub use traits::SystemNotifier;
