//! Provider data shapes, the monthly cache and the selected location.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    api::PrayerTimesClient,
    dedup::date_key,
    prayer::PrayerTimeSet,
    store::{CACHED_TIMES_KEY, KeyValueStore, SELECTED_LOCATION_KEY},
    time::log_time_anomalies,
};

/// One day as returned by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyTimes {
    /// ISO date, possibly with a time part (`2024-06-15T00:00:00+03:00`).
    pub date: String,
    pub fajr: String,
    pub sun: String,
    pub dhuhr: String,
    pub asr: String,
    pub maghrib: String,
    pub isha: String,
}

impl DailyTimes {
    pub fn to_time_set(&self) -> PrayerTimeSet {
        PrayerTimeSet::new(
            self.fajr.clone(),
            self.sun.clone(),
            self.dhuhr.clone(),
            self.asr.clone(),
            self.maghrib.clone(),
            self.isha.clone(),
        )
    }

    pub fn is_for(&self, date: NaiveDate) -> bool {
        self.date.starts_with(&date_key(date))
    }
}

/// Entry for `date` in a month of provider data.
pub fn times_for_date(month: &[DailyTimes], date: NaiveDate) -> Option<&DailyTimes> {
    month.iter().find(|day| day.is_for(date))
}

/// A location chosen by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationData {
    pub id: String,
    pub name: String,
}

impl LocationData {
    pub fn load(store: &dyn KeyValueStore) -> Option<Self> {
        let raw = match store.get(SELECTED_LOCATION_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!("Failed to read selected location: {:#}", e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(location) => Some(location),
            Err(e) => {
                tracing::warn!("Selected location is corrupt, ignoring: {}", e);
                None
            }
        }
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        let json = serde_json::to_string(self).context("Failed to serialize location")?;
        store
            .set(SELECTED_LOCATION_KEY, &json)
            .context("Failed to write selected location")
    }
}

/// Last fetched month for a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPrayerData {
    pub location_id: String,
    /// `YYYY-MM-DD` of the fetch.
    pub fetch_date: String,
    pub monthly_times: Vec<DailyTimes>,
}

impl CachedPrayerData {
    /// Cached month can serve `date` for `location_id`.
    pub fn covers(&self, location_id: &str, date: NaiveDate) -> bool {
        self.location_id == location_id && times_for_date(&self.monthly_times, date).is_some()
    }

    pub fn load(store: &dyn KeyValueStore) -> Option<Self> {
        let raw = match store.get(CACHED_TIMES_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!("Failed to read cached prayer times: {:#}", e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!("Cached prayer times are corrupt, ignoring: {}", e);
                None
            }
        }
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        let json = serde_json::to_string(self).context("Failed to serialize prayer time cache")?;
        store
            .set(CACHED_TIMES_KEY, &json)
            .context("Failed to write prayer time cache")
    }
}

/// Today's times for `location_id`, from the cache when it covers today and
/// from the provider otherwise.
///
/// If a freshly fetched month has no entry for `today`, its first day is
/// used. Malformed times in the returned day are logged here, once per load.
pub async fn load_today(
    store: &dyn KeyValueStore,
    client: &PrayerTimesClient,
    location_id: &str,
    today: NaiveDate,
) -> Result<PrayerTimeSet> {
    if let Some(cache) = CachedPrayerData::load(store)
        && cache.covers(location_id, today)
        && let Some(day) = times_for_date(&cache.monthly_times, today)
    {
        tracing::debug!(location_id, %today, "Using cached prayer times");
        let times = day.to_time_set();
        log_time_anomalies(&times);
        return Ok(times);
    }

    let month = client
        .fetch_month(location_id)
        .await
        .with_context(|| format!("Failed to fetch prayer times for location {}", location_id))?;

    let times = match times_for_date(&month, today).or_else(|| month.first()) {
        Some(day) => {
            if !day.is_for(today) {
                tracing::warn!(
                    %today,
                    used = %day.date,
                    "Provider month has no entry for today, using its first day"
                );
            }
            day.to_time_set()
        }
        None => anyhow::bail!("Provider returned no days for location {}", location_id),
    };

    let cache = CachedPrayerData {
        location_id: location_id.to_string(),
        fetch_date: date_key(today),
        monthly_times: month,
    };
    if let Err(e) = cache.save(store) {
        tracing::warn!("{:#}", e);
    }

    log_time_anomalies(&times);
    Ok(times)
}
