//! Per-prayer alert preferences.
//!
//! Settings are stored as one JSON blob shaped like
//! `{"imsak":{"adhan":true}, ...}`. Reading merges field by field against
//! [`PrayerSettings::default`], so a missing, partial or corrupt blob never
//! fails.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    prayer::PrayerName,
    store::{KeyValueStore, SETTINGS_KEY},
};

/// Alert preferences for a single prayer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerSetting {
    pub adhan: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerSettings {
    pub imsak: PrayerSetting,
    pub gunes: PrayerSetting,
    pub ogle: PrayerSetting,
    pub ikindi: PrayerSetting,
    pub aksam: PrayerSetting,
    pub yatsi: PrayerSetting,
}

impl Default for PrayerSettings {
    fn default() -> Self {
        let on = PrayerSetting { adhan: true };
        Self {
            imsak: on,
            // Sunrise is not a prayer; alerting on it is opt-in.
            gunes: PrayerSetting { adhan: false },
            ogle: on,
            ikindi: on,
            aksam: on,
            yatsi: on,
        }
    }
}

impl PrayerSettings {
    pub fn is_enabled(&self, prayer: PrayerName) -> bool {
        self.slot(prayer).adhan
    }

    pub fn set_enabled(&mut self, prayer: PrayerName, enabled: bool) {
        self.slot_mut(prayer).adhan = enabled;
    }

    fn slot(&self, prayer: PrayerName) -> &PrayerSetting {
        match prayer {
            PrayerName::Imsak => &self.imsak,
            PrayerName::Gunes => &self.gunes,
            PrayerName::Ogle => &self.ogle,
            PrayerName::Ikindi => &self.ikindi,
            PrayerName::Aksam => &self.aksam,
            PrayerName::Yatsi => &self.yatsi,
        }
    }

    fn slot_mut(&mut self, prayer: PrayerName) -> &mut PrayerSetting {
        match prayer {
            PrayerName::Imsak => &mut self.imsak,
            PrayerName::Gunes => &mut self.gunes,
            PrayerName::Ogle => &mut self.ogle,
            PrayerName::Ikindi => &mut self.ikindi,
            PrayerName::Aksam => &mut self.aksam,
            PrayerName::Yatsi => &mut self.yatsi,
        }
    }
}

/// Merge a stored settings blob over the defaults.
///
/// Each prayer takes the stored `adhan` flag when it is present and a
/// boolean, otherwise the default. Unparseable input means "no overrides".
pub fn resolve(stored: Option<&str>) -> PrayerSettings {
    let mut settings = PrayerSettings::default();

    let Some(raw) = stored else {
        return settings;
    };

    let parsed: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Stored settings are not valid JSON, using defaults: {}", e);
            return settings;
        }
    };

    for prayer in PrayerName::ALL {
        match parsed.get(prayer.key()).and_then(|entry| entry.get("adhan")) {
            Some(Value::Bool(enabled)) => settings.set_enabled(prayer, *enabled),
            Some(other) => {
                tracing::warn!(prayer = prayer.key(), "Ignoring non-boolean adhan flag: {}", other)
            }
            None => {}
        }
    }

    settings
}

/// Read and resolve the settings blob. Store errors fall back to defaults.
pub fn load(store: &dyn KeyValueStore) -> PrayerSettings {
    match store.get(SETTINGS_KEY) {
        Ok(raw) => resolve(raw.as_deref()),
        Err(e) => {
            tracing::warn!("Failed to read settings, using defaults: {:#}", e);
            PrayerSettings::default()
        }
    }
}

/// Persist the full settings blob.
pub fn save(store: &dyn KeyValueStore, settings: &PrayerSettings) -> Result<()> {
    let json = serde_json::to_string(settings).context("Failed to serialize settings")?;
    store
        .set(SETTINGS_KEY, &json)
        .context("Failed to write settings")
}
