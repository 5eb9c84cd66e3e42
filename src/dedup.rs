//! Gate that decides whether the alert set needs rebuilding.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    config::DedupKey,
    store::{KeyValueStore, SCHEDULE_META_KEY},
};

/// What was last committed: the plan fingerprint and the day it was for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleMeta {
    #[serde(alias = "hash")]
    pub fingerprint: String,
    /// `YYYY-MM-DD`
    pub date: String,
}

impl ScheduleMeta {
    pub fn new(fingerprint: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            date: date_key(date),
        }
    }
}

/// Calendar date as stored in [`ScheduleMeta::date`].
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `false` only when the last commit was for the same day with the same
/// fingerprint. Missing metadata always reschedules.
///
/// With [`DedupKey::FingerprintOnly`] the date is not compared.
pub fn should_reschedule(
    new_date: &str,
    new_fingerprint: &str,
    last: Option<&ScheduleMeta>,
    key: DedupKey,
) -> bool {
    let Some(last) = last else {
        return true;
    };

    let same_fingerprint = last.fingerprint == new_fingerprint;
    match key {
        DedupKey::DateAndFingerprint => !(same_fingerprint && last.date == new_date),
        DedupKey::FingerprintOnly => !same_fingerprint,
    }
}

/// Read the last committed metadata. Unreadable or corrupt metadata is
/// treated as absent.
pub fn load_meta(store: &dyn KeyValueStore) -> Option<ScheduleMeta> {
    let raw = match store.get(SCHEDULE_META_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!("Failed to read schedule metadata: {:#}", e);
            return None;
        }
    };

    match serde_json::from_str::<ScheduleMeta>(&raw) {
        Ok(meta) if !meta.fingerprint.is_empty() && !meta.date.is_empty() => Some(meta),
        Ok(_) => {
            tracing::warn!("Schedule metadata has empty fields, ignoring");
            None
        }
        Err(e) => {
            tracing::warn!("Schedule metadata is corrupt, ignoring: {}", e);
            None
        }
    }
}

pub fn save_meta(store: &dyn KeyValueStore, meta: &ScheduleMeta) -> Result<()> {
    let json = serde_json::to_string(meta).context("Failed to serialize schedule metadata")?;
    store
        .set(SCHEDULE_META_KEY, &json)
        .context("Failed to write schedule metadata")
}
