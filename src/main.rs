use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use prayer_alerts::{
    CommitError, PrayerName, PrayerScheduler, PrayerSlot, PrayerTimeSet, ScheduleOutcome,
    SchedulerOptions, TimerAlertBackend,
    api::PrayerTimesClient,
    config::AppConfig,
    countdown::PrayerDay,
    provider::{self, LocationData},
    schedule, settings,
    store::{JsonFileStore, KeyValueStore},
    traits::{Clock, Notifier, SystemClock},
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "prayer-alerts")]
#[command(about = "Prayer time alerts - status view or scheduling daemon")]
struct Args {
    /// Run in daemon mode (keeps alerts scheduled and the countdown ticking)
    #[arg(long)]
    daemon: bool,

    /// Select a location by provider id
    #[arg(long, value_name = "ID")]
    location: Option<String>,

    /// Display name for --location
    #[arg(long, value_name = "NAME", requires = "location")]
    location_name: Option<String>,

    /// Turn alerts on for a prayer (repeatable)
    #[arg(long, value_name = "PRAYER")]
    enable: Vec<PrayerName>,

    /// Turn alerts off for a prayer (repeatable)
    #[arg(long, value_name = "PRAYER")]
    disable: Vec<PrayerName>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .parse_lossy(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "prayer_alerts=debug".to_string()),
        );

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let config = Arc::new(config);

    let store_path = config.storage.resolved_path();
    tracing::debug!("Using store at {}", store_path.display());
    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(store_path));

    apply_cli_edits(&args, store.as_ref())?;

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    if args.daemon {
        run_daemon(rt, config, store)
    } else {
        run_status(rt, config, store)
    }
}

/// Persist location and settings changes given on the command line.
fn apply_cli_edits(args: &Args, store: &dyn KeyValueStore) -> Result<()> {
    if let Some(id) = &args.location {
        let location = LocationData {
            id: id.clone(),
            name: args.location_name.clone().unwrap_or_else(|| id.clone()),
        };
        location.save(store)?;
        tracing::info!("Selected location {} ({})", location.name, location.id);
    }

    if args.enable.is_empty() && args.disable.is_empty() {
        return Ok(());
    }

    let mut prefs = settings::load(store);
    for prayer in &args.enable {
        prefs.set_enabled(*prayer, true);
    }
    for prayer in &args.disable {
        prefs.set_enabled(*prayer, false);
    }
    settings::save(store, &prefs)?;
    tracing::info!("Alert settings updated");

    Ok(())
}

/// Stored location, falling back to the configured one.
fn resolve_location(config: &AppConfig, store: &dyn KeyValueStore) -> Result<LocationData> {
    if let Some(location) = LocationData::load(store) {
        return Ok(location);
    }
    config
        .provider
        .location_id
        .clone()
        .map(|id| LocationData {
            name: id.clone(),
            id,
        })
        .context("No location selected; pass --location <ID> or set provider.location_id")
}

fn build_notifier(config: &AppConfig) -> Arc<dyn Notifier> {
    #[cfg(feature = "desktop")]
    {
        Arc::new(prayer_alerts::SystemNotifier::new(
            config.notifications.app_name.clone(),
        ))
    }
    #[cfg(not(feature = "desktop"))]
    {
        let _ = config;
        Arc::new(prayer_alerts::LogNotifier)
    }
}

fn slot_label(slot: &PrayerSlot) -> String {
    match slot.day {
        PrayerDay::Yesterday => format!("{} (yesterday)", slot.prayer),
        PrayerDay::Today => slot.prayer.to_string(),
        PrayerDay::Tomorrow => format!("{} (tomorrow)", slot.prayer),
    }
}

/// Print today's times, which of them alert, and the countdown.
fn run_status(
    rt: tokio::runtime::Runtime,
    config: Arc<AppConfig>,
    store: Arc<dyn KeyValueStore>,
) -> Result<()> {
    rt.block_on(async {
        let location = resolve_location(&config, store.as_ref())?;
        let client = PrayerTimesClient::new(config.provider.api_url.clone(), &config.network)?;
        let clock = SystemClock;
        let today = clock.today();

        let times = provider::load_today(store.as_ref(), &client, &location.id, today).await?;

        let prefs = settings::load(store.as_ref());
        let state = prayer_alerts::evaluate(&times, &clock.now_local());

        println!("{} - {}", location.name, today);
        for item in schedule::all_items(&times, &prefs) {
            println!(
                "  {:<8} {:>5}  {}",
                item.prayer.display_name(),
                item.time,
                if item.enabled { "alert" } else { "-" }
            );
        }
        println!(
            "Current: {}  Next: {} in {}",
            slot_label(&state.current),
            slot_label(&state.next),
            state.remaining_display()
        );

        Ok(())
    })
}

/// Run in daemon mode - keep alerts in sync and tick the countdown.
fn run_daemon(
    rt: tokio::runtime::Runtime,
    config: Arc<AppConfig>,
    store: Arc<dyn KeyValueStore>,
) -> Result<()> {
    rt.block_on(async {
        tracing::info!("Starting prayer-alerts in daemon mode");

        let location = resolve_location(&config, store.as_ref())?;
        tracing::info!("Location: {} ({})", location.name, location.id);

        let client = PrayerTimesClient::new(config.provider.api_url.clone(), &config.network)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let backend = TimerAlertBackend::new(
            build_notifier(&config),
            Arc::clone(&clock),
            config.notifications.enabled,
        );
        let scheduler = PrayerScheduler::new(
            backend,
            Arc::clone(&store),
            Arc::clone(&clock),
            SchedulerOptions::from_config(&config.scheduler),
        );

        let mut tick = tokio::time::interval(Duration::from_millis(config.refresh.tick_interval_ms));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut refresh =
            tokio::time::interval(Duration::from_secs(config.refresh.data_fetch_interval_secs));
        refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // Picks up settings edited by another process; the dedup gate keeps
        // this cheap when nothing changed.
        let mut resync =
            tokio::time::interval(Duration::from_secs(config.refresh.resync_interval_secs));
        resync.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        let mut times: Option<PrayerTimeSet> = None;
        let mut attempted_for: Option<NaiveDate> = None;
        let mut last_next: Option<PrayerSlot> = None;

        loop {
            tokio::select! {
                _ = refresh.tick() => {
                    let today = clock.today();
                    attempted_for = Some(today);
                    if let Some(fresh) = refresh_times(store.as_ref(), &client, &location, today).await {
                        times = Some(fresh);
                    }
                    if let Some(times) = &times {
                        report(scheduler.sync(times).await);
                    }
                }
                _ = resync.tick() => {
                    if let Some(times) = &times {
                        report(scheduler.sync(times).await);
                    }
                }
                _ = tick.tick() => {
                    let today = clock.today();
                    if attempted_for.is_some_and(|day| day != today) {
                        tracing::info!("Date changed to {}, reloading prayer times", today);
                        attempted_for = Some(today);
                        if let Some(fresh) = refresh_times(store.as_ref(), &client, &location, today).await {
                            times = Some(fresh);
                        }
                        if let Some(times) = &times {
                            report(scheduler.sync(times).await);
                        }
                    }

                    if let Some(times) = &times {
                        let state = scheduler.countdown(times);
                        tracing::trace!(
                            current = %slot_label(&state.current),
                            next = %slot_label(&state.next),
                            "{}",
                            state.remaining_display()
                        );
                        if last_next != Some(state.next) {
                            tracing::info!(
                                "Current prayer: {}, next: {} at {}",
                                slot_label(&state.current),
                                slot_label(&state.next),
                                state.next_at.format("%H:%M")
                            );
                            last_next = Some(state.next);
                        }
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!("Shutting down");
                    break;
                }
            }
        }

        Ok(())
    })
}

async fn refresh_times(
    store: &dyn KeyValueStore,
    client: &PrayerTimesClient,
    location: &LocationData,
    today: NaiveDate,
) -> Option<PrayerTimeSet> {
    match provider::load_today(store, client, &location.id, today).await {
        Ok(times) => Some(times),
        Err(e) => {
            tracing::error!("Failed to load prayer times: {:#}", e);
            None
        }
    }
}

fn report(outcome: ScheduleOutcome) {
    match outcome {
        ScheduleOutcome::Committed(report) if !report.failed.is_empty() => {
            tracing::warn!(
                "Scheduled {} alerts, {} failed",
                report.registered.len(),
                report.failed.len()
            );
        }
        ScheduleOutcome::Committed(_) | ScheduleOutcome::Unchanged | ScheduleOutcome::Busy => {}
        ScheduleOutcome::Aborted(CommitError::PermissionDenied) => {
            tracing::warn!("Alerts are disabled (notifications.enabled = false); nothing scheduled");
        }
        ScheduleOutcome::Aborted(e) => {
            tracing::error!("Scheduling failed, will retry: {}", e);
        }
    }
}
