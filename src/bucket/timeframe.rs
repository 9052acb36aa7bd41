//! Timeframes: the fixed record interval of a time bucket
//!
//! A timeframe is written as `<n><unit>` where unit is one of
//! `Sec`/`S`, `Min`/`T`, `H`, `D`, `W`, `Y` (e.g. `1Min`, `4H`, `1D`).

use crate::bucket::error::{BucketError, BucketResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const SECOND: u64 = 1;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;
const YEAR: u64 = 365 * DAY;

/// Nanoseconds in one day
pub const NANOS_PER_DAY: i64 = (DAY as i64) * 1_000_000_000;

static TIMEFRAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+)(Sec|S|Min|T|H|D|W|Y)$").expect("valid timeframe regex"));

/// Canonical units, largest first
const CANONICAL_UNITS: [(&str, u64); 6] = [
    ("Y", YEAR),
    ("W", WEEK),
    ("D", DAY),
    ("H", HOUR),
    ("Min", MINUTE),
    ("Sec", SECOND),
];

fn unit_seconds(unit: &str) -> Option<u64> {
    match unit {
        "S" | "Sec" => Some(SECOND),
        "T" | "Min" => Some(MINUTE),
        "H" => Some(HOUR),
        "D" => Some(DAY),
        "W" => Some(WEEK),
        "Y" => Some(YEAR),
        _ => None,
    }
}

/// The interval covered by one record of a time bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timeframe {
    name: String,
    #[serde(with = "duration_secs")]
    duration: Duration,
}

impl Timeframe {
    /// Parse a timeframe string such as `1Min` or `4H`
    pub fn parse(s: &str) -> BucketResult<Self> {
        let caps = TIMEFRAME_RE
            .captures(s)
            .ok_or_else(|| BucketError::UnknownTimeframe(s.to_string()))?;

        let count: u64 = caps[1]
            .parse()
            .map_err(|_| BucketError::UnknownTimeframe(s.to_string()))?;
        if count == 0 {
            return Err(BucketError::UnknownTimeframe(s.to_string()));
        }
        let unit = unit_seconds(&caps[2]).ok_or_else(|| BucketError::UnknownTimeframe(s.to_string()))?;

        Ok(Self {
            name: s.to_string(),
            duration: Duration::from_secs(count * unit),
        })
    }

    /// Build a timeframe from a whole-second duration, using the largest
    /// unit that divides it evenly
    pub fn from_duration(duration: Duration) -> BucketResult<Self> {
        let secs = duration.as_secs();
        if secs == 0 || duration.subsec_nanos() != 0 {
            return Err(BucketError::UnknownTimeframe(format!("{:?}", duration)));
        }

        let (unit, size) = CANONICAL_UNITS
            .iter()
            .find(|(_, size)| secs % size == 0)
            .copied()
            .unwrap_or(("Sec", SECOND));

        Ok(Self {
            name: format!("{}{}", secs / size, unit),
            duration,
        })
    }

    /// The string this timeframe was parsed from
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Number of records that fit in a 24 hour day
    pub fn periods_per_day(&self) -> i64 {
        NANOS_PER_DAY / self.duration.as_nanos() as i64
    }
}

impl FromStr for Timeframe {
    type Err = BucketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
