//! Daily alert plan and the fingerprint that identifies it.

use crate::{
    prayer::{PrayerName, PrayerTimeSet},
    settings::PrayerSettings,
};

/// Separator between `key=time` pairs in the fingerprint input.
const PAIR_SEPARATOR: char = ';';

/// One prayer considered for alerting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleItem {
    pub prayer: PrayerName,
    pub time: String,
    pub enabled: bool,
}

/// The enabled prayers for one day and the fingerprint identifying them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePlan {
    /// Enabled items in daily order.
    pub items: Vec<ScheduleItem>,
    pub fingerprint: String,
}

impl SchedulePlan {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// Every prayer with its time and enabled flag, in daily order.
pub fn all_items(times: &PrayerTimeSet, settings: &PrayerSettings) -> Vec<ScheduleItem> {
    times
        .iter()
        .map(|(prayer, time)| ScheduleItem {
            prayer,
            time: time.trim().to_string(),
            enabled: settings.is_enabled(prayer),
        })
        .collect()
}

/// Build the alert plan for one day.
pub fn build(times: &PrayerTimeSet, settings: &PrayerSettings) -> SchedulePlan {
    let items: Vec<ScheduleItem> = all_items(times, settings)
        .into_iter()
        .filter(|item| item.enabled)
        .collect();

    let fingerprint = fingerprint(&canonical_encoding(&items));

    SchedulePlan { items, fingerprint }
}

/// Canonical fingerprint input: `key=time` pairs sorted by key, joined by
/// `;`. Independent of the order `items` come in. `\`, `;` and `=` inside a
/// time are backslash-escaped so distinct plans never encode alike.
pub fn canonical_encoding(items: &[ScheduleItem]) -> String {
    let mut pairs: Vec<(&str, &str)> = items
        .iter()
        .filter(|item| item.enabled)
        .map(|item| (item.prayer.key(), item.time.as_str()))
        .collect();
    pairs.sort_unstable();

    let mut encoded = String::new();
    for (i, (key, time)) in pairs.iter().enumerate() {
        if i > 0 {
            encoded.push(PAIR_SEPARATOR);
        }
        encoded.push_str(key);
        encoded.push('=');
        push_escaped(&mut encoded, time);
    }
    encoded
}

fn push_escaped(out: &mut String, value: &str) {
    for c in value.chars() {
        if matches!(c, '\\' | PAIR_SEPARATOR | '=') {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Hex SHA-256 of the canonical encoding.
pub fn fingerprint(canonical: &str) -> String {
    sha256::digest(canonical.as_bytes())
}
