//! Current/next prayer state machine driving the countdown display.

use chrono::{DateTime, Duration, TimeZone};

use crate::{
    prayer::{PrayerName, PrayerTimeSet},
    time::{format_duration, resolve_instant},
};

/// Which prayer-day a slot belongs to, relative to `now`'s calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrayerDay {
    Yesterday,
    Today,
    Tomorrow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrayerSlot {
    pub prayer: PrayerName,
    pub day: PrayerDay,
}

impl PrayerSlot {
    fn today(prayer: PrayerName) -> Self {
        Self {
            prayer,
            day: PrayerDay::Today,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownState<Tz: TimeZone> {
    pub current: PrayerSlot,
    pub next: PrayerSlot,
    pub next_at: DateTime<Tz>,
    pub remaining: Duration,
}

impl<Tz: TimeZone> CountdownState<Tz> {
    /// Remaining time as `HH:MM:SS`.
    pub fn remaining_display(&self) -> String {
        format_duration(self.remaining)
    }
}

/// Work out the current and next prayer at `now`.
///
/// Candidates are today's six instants plus tomorrow's imsak (today's + 24h).
/// `next` is the nearest candidate strictly after `now`; `current` is the
/// prayer before it in cyclic order, which is yesterday's yatsi before dawn
/// and tonight's yatsi once today's yatsi has passed.
///
/// Total for every `now`. Malformed times read as "00:00" without logging;
/// see [`crate::time::log_time_anomalies`].
pub fn evaluate<Tz: TimeZone>(times: &PrayerTimeSet, now: &DateTime<Tz>) -> CountdownState<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();

    let mut candidates: Vec<(PrayerSlot, DateTime<Tz>)> = times
        .iter()
        .map(|(prayer, time)| {
            let instant = resolve_instant(time, today, &tz).instant;
            (PrayerSlot::today(prayer), instant)
        })
        .collect();

    let tomorrow_imsak = candidates[PrayerName::Imsak.index()].1.clone() + Duration::hours(24);
    let tomorrow_slot = PrayerSlot {
        prayer: PrayerName::Imsak,
        day: PrayerDay::Tomorrow,
    };
    candidates.push((tomorrow_slot, tomorrow_imsak.clone()));

    let (next, next_at) = candidates
        .into_iter()
        .filter(|(_, at)| at > now)
        .min_by(|(a_slot, a), (b_slot, b)| {
            a.cmp(b)
                .then_with(|| a_slot.prayer.index().cmp(&b_slot.prayer.index()))
        })
        // Only reachable when a DST shift makes the synthetic slot land
        // before `now`; the countdown then shows zero.
        .unwrap_or((tomorrow_slot, tomorrow_imsak));

    let current = match (next.prayer, next.day) {
        (PrayerName::Imsak, PrayerDay::Tomorrow) => PrayerSlot::today(PrayerName::Yatsi),
        (PrayerName::Imsak, _) => PrayerSlot {
            prayer: PrayerName::Yatsi,
            day: PrayerDay::Yesterday,
        },
        (prayer, _) => PrayerSlot::today(prayer.previous()),
    };

    let remaining = next_at.clone() - now.clone();

    CountdownState {
        current,
        next,
        next_at,
        remaining,
    }
}
