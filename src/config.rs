use std::path::PathBuf;

use anyhow::{Result, bail};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub network: NetworkConfig,
    pub refresh: RefreshConfig,
    pub scheduler: SchedulerConfig,
    pub notifications: NotificationConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub api_url: String,
    /// Location to use when none has been selected in the store.
    pub location_id: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: "https://prayertimes.api.abdus.dev".to_string(),
            location_id: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefreshConfig {
    /// Countdown tick period.
    pub tick_interval_ms: u64,
    /// How often times are reloaded and the schedule re-synced.
    pub data_fetch_interval_secs: u64,
    /// How often the loaded times are re-synced to pick up settings edits.
    pub resync_interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            data_fetch_interval_secs: 6 * 60 * 60,
            resync_interval_secs: 60,
        }
    }
}

/// Which parts of the last commit must match to skip rescheduling.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DedupKey {
    #[default]
    DateAndFingerprint,
    FingerprintOnly,
}

/// What happens to metadata when some registrations fail.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Persist metadata after partial success.
    #[default]
    Partial,
    /// Persist metadata only when every registration succeeded.
    Strict,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Times at or before `now + margin` roll over to the next day.
    pub rollover_margin_secs: u64,
    /// Upper bound for permission, cancel and register steps.
    pub commit_timeout_secs: u64,
    pub dedup_key: DedupKey,
    pub commit_policy: CommitPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            rollover_margin_secs: 30,
            commit_timeout_secs: 30,
            dedup_key: DedupKey::DateAndFingerprint,
            commit_policy: CommitPolicy::Partial,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    /// When false the alert backend reports permission as denied.
    pub enabled: bool,
    pub app_name: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            app_name: "Vakit Rehberi".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// Configured store path, or `<data_dir>/prayer-alerts/store.json`.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("prayer-alerts")
                .join("store.json")
        })
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // Load .env file (silently ignore if not present)
        let _ = dotenvy::dotenv();

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("prayer-alerts");

        let builder = Config::builder()
            // 1. Load default values
            // Provider
            .set_default("provider.api_url", "https://prayertimes.api.abdus.dev")?
            .set_default("provider.location_id", None::<String>)?
            // Network
            .set_default("network.request_timeout_secs", 30)?
            .set_default("network.connect_timeout_secs", 10)?
            // Refresh
            .set_default("refresh.tick_interval_ms", 1000)?
            .set_default("refresh.data_fetch_interval_secs", 6 * 60 * 60)?
            .set_default("refresh.resync_interval_secs", 60)?
            // Scheduler
            .set_default("scheduler.rollover_margin_secs", 30)?
            .set_default("scheduler.commit_timeout_secs", 30)?
            .set_default("scheduler.dedup_key", "date_and_fingerprint")?
            .set_default("scheduler.commit_policy", "partial")?
            // Notifications
            .set_default("notifications.enabled", true)?
            .set_default("notifications.app_name", "Vakit Rehberi")?
            // Storage
            .set_default("storage.path", None::<String>)?

            // 2. Load from local config file (optional, lowest priority)
            .add_source(File::from(PathBuf::from("config.toml")).required(false))

            // 3. Load from user config directory (optional, overrides local)
            .add_source(File::from(config_dir.join("config.toml")).required(false))

            // 4. Load from Environment variables (PRAYER_ALERTS__SCHEDULER__COMMIT_POLICY=...)
            .add_source(Environment::with_prefix("PRAYER_ALERTS").separator("__"));

        let s = builder.build()?;
        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the daemon cannot run with.
    pub fn validate(&self) -> Result<()> {
        let periods = [
            ("refresh.tick_interval_ms", self.refresh.tick_interval_ms),
            (
                "refresh.data_fetch_interval_secs",
                self.refresh.data_fetch_interval_secs,
            ),
            ("refresh.resync_interval_secs", self.refresh.resync_interval_secs),
        ];
        for (key, value) in periods {
            if value == 0 {
                bail!("{} must be greater than zero", key);
            }
        }
        Ok(())
    }
}
