use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// The six daily prayer times, in their fixed daily order.
///
/// The order is cyclic: `Yatsi` (night) is followed by the next day's
/// `Imsak` (dawn). The countdown wraparound depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrayerName {
    Imsak,
    Gunes,
    Ogle,
    Ikindi,
    Aksam,
    Yatsi,
}

impl PrayerName {
    /// All prayers in daily order.
    pub const ALL: [PrayerName; 6] = [
        PrayerName::Imsak,
        PrayerName::Gunes,
        PrayerName::Ogle,
        PrayerName::Ikindi,
        PrayerName::Aksam,
        PrayerName::Yatsi,
    ];

    /// Storage key, also used to sort fingerprint input.
    pub fn key(self) -> &'static str {
        match self {
            PrayerName::Imsak => "imsak",
            PrayerName::Gunes => "gunes",
            PrayerName::Ogle => "ogle",
            PrayerName::Ikindi => "ikindi",
            PrayerName::Aksam => "aksam",
            PrayerName::Yatsi => "yatsi",
        }
    }

    /// Name shown to the user in alerts and status output.
    pub fn display_name(self) -> &'static str {
        match self {
            PrayerName::Imsak => "İmsak",
            PrayerName::Gunes => "Güneş",
            PrayerName::Ogle => "Öğle",
            PrayerName::Ikindi => "İkindi",
            PrayerName::Aksam => "Akşam",
            PrayerName::Yatsi => "Yatsı",
        }
    }

    /// Position in the daily order (0 = Imsak).
    pub fn index(self) -> usize {
        self as usize
    }

    /// The prayer before this one in cyclic order.
    pub fn previous(self) -> PrayerName {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }

    /// The prayer after this one in cyclic order.
    pub fn following(self) -> PrayerName {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for PrayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for PrayerName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        PrayerName::ALL
            .into_iter()
            .find(|p| p.key() == needle || p.display_name().to_lowercase() == needle)
            .ok_or_else(|| {
                format!(
                    "unknown prayer '{}', expected one of: imsak, gunes, ogle, ikindi, aksam, yatsi",
                    s
                )
            })
    }
}

/// One day's prayer times as "HH:MM" strings, exactly as supplied by the
/// time provider.
///
/// Values are kept verbatim; parsing and degradation of malformed values
/// happen in [`crate::time`]. Missing keys deserialize as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrayerTimeSet {
    pub imsak: String,
    pub gunes: String,
    pub ogle: String,
    pub ikindi: String,
    pub aksam: String,
    pub yatsi: String,
}

impl PrayerTimeSet {
    pub fn new(
        imsak: impl Into<String>,
        gunes: impl Into<String>,
        ogle: impl Into<String>,
        ikindi: impl Into<String>,
        aksam: impl Into<String>,
        yatsi: impl Into<String>,
    ) -> Self {
        Self {
            imsak: imsak.into(),
            gunes: gunes.into(),
            ogle: ogle.into(),
            ikindi: ikindi.into(),
            aksam: aksam.into(),
            yatsi: yatsi.into(),
        }
    }

    pub fn get(&self, prayer: PrayerName) -> &str {
        match prayer {
            PrayerName::Imsak => &self.imsak,
            PrayerName::Gunes => &self.gunes,
            PrayerName::Ogle => &self.ogle,
            PrayerName::Ikindi => &self.ikindi,
            PrayerName::Aksam => &self.aksam,
            PrayerName::Yatsi => &self.yatsi,
        }
    }

    /// Iterate `(prayer, time)` pairs in daily order.
    pub fn iter(&self) -> impl Iterator<Item = (PrayerName, &str)> {
        PrayerName::ALL.into_iter().map(|p| (p, self.get(p)))
    }
}
