//! Time bucket keys
//!
//! A key names one logical data series by pairing an item path with a
//! category path, written `AAPL/1Min/OHLCV:Symbol/Timeframe/AttributeGroup`.

use crate::bucket::error::{BucketError, BucketResult};
use crate::bucket::timeframe::Timeframe;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Category path used when a key does not name its own
pub const DEFAULT_TIME_BUCKET_SCHEMA: &str = "Symbol/Timeframe/AttributeGroup";

// e.g. "/data/AMZN/1Min/TICK/2017.bin" -> AMZN, 1Min, TICK, 2017
static WAL_KEY_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([^/]+)/([^/]+)/([^/]+)/([^/]+)\.bin$").expect("valid wal key path regex")
});

/// Identifies one logical time series: an item path and its category path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TimeBucketKey {
    item_key: String,
    category_key: String,
}

impl TimeBucketKey {
    /// Create a key; an empty category key selects the default schema
    pub fn new(item_key: impl Into<String>, category_key: impl Into<String>) -> Self {
        let category_key = category_key.into();
        Self {
            item_key: item_key.into(),
            category_key: if category_key.is_empty() {
                DEFAULT_TIME_BUCKET_SCHEMA.to_string()
            } else {
                category_key
            },
        }
    }

    /// Create a key under `Symbol/Timeframe/AttributeGroup`
    pub fn with_default_schema(item_key: impl Into<String>) -> Self {
        Self::new(item_key, DEFAULT_TIME_BUCKET_SCHEMA)
    }

    /// Extract the key and year from a year file path of the form
    /// `.../<symbol>/<timeframe>/<group>/<year>.bin`
    pub fn from_wal_key_path(path: &str) -> BucketResult<(Self, i16)> {
        let caps = WAL_KEY_PATH_RE.captures(path).ok_or_else(|| {
            BucketError::InvalidKey(format!("failed to extract key from path: {}", path))
        })?;

        let year: i16 = caps[4].parse().map_err(|_| {
            BucketError::InvalidKey(format!("failed to extract year from path: {}", path))
        })?;

        let item_key = format!("{}/{}/{}", &caps[1], &caps[2], &caps[3]);
        Ok((Self::with_default_schema(item_key), year))
    }

    /// Slash-joined item names, e.g. `AAPL/1Min/OHLCV`
    pub fn item_key(&self) -> &str {
        &self.item_key
    }

    /// Slash-joined category names, e.g. `Symbol/Timeframe/AttributeGroup`
    pub fn category_key(&self) -> &str {
        &self.category_key
    }

    pub fn items(&self) -> Vec<&str> {
        self.item_key.split('/').collect()
    }

    pub fn categories(&self) -> Vec<&str> {
        self.category_key.split('/').collect()
    }

    /// Check that every category has exactly one item and that every name
    /// is a single path component below the catalog root
    pub fn validate(&self) -> BucketResult<()> {
        let items = self.items();
        let categories = self.categories();

        if items.len() != categories.len() {
            return Err(BucketError::InvalidKey(format!(
                "{}: {} items for {} categories",
                self,
                items.len(),
                categories.len()
            )));
        }
        if items.iter().chain(categories.iter()).any(|s| s.is_empty()) {
            return Err(BucketError::InvalidKey(format!("{}: empty path element", self)));
        }
        if let Some(name) = items
            .iter()
            .chain(categories.iter())
            .find(|s| !is_plain_name(s))
        {
            return Err(BucketError::InvalidKey(format!(
                "{}: {:?} is not a plain directory name",
                self, name
            )));
        }
        Ok(())
    }

    /// The item at the position of `category`, if the key has that category
    pub fn item_in_category(&self, category: &str) -> Option<&str> {
        self.categories()
            .iter()
            .position(|c| *c == category)
            .and_then(|i| self.items().get(i).copied())
    }

    /// Comma-separated items at the position of `category`
    /// (e.g. `AAPL,MSFT/1Min/OHLCV` yields two symbols)
    pub fn multi_item_in_category(&self, category: &str) -> Vec<&str> {
        self.item_in_category(category)
            .map(|items| items.split(',').collect())
            .unwrap_or_default()
    }

    /// Replace the item at the position of `category`; no-op if absent
    pub fn set_item_in_category(&mut self, category: &str, item: &str) {
        let Some(index) = self.categories().iter().position(|c| *c == category) else {
            return;
        };

        let mut items: Vec<String> = self.items().iter().map(|s| s.to_string()).collect();
        if let Some(slot) = items.get_mut(index) {
            *slot = item.to_string();
        }
        self.item_key = items.join("/");
    }

    /// Parse the item in the `Timeframe` category
    pub fn timeframe(&self) -> BucketResult<Timeframe> {
        let tf = self.item_in_category("Timeframe").ok_or_else(|| {
            BucketError::InvalidKey(format!("{}: no Timeframe category", self))
        })?;
        Timeframe::parse(tf)
    }

    /// Directory holding this bucket's year files under `root`
    pub fn path_to_year_files(&self, root: &Path) -> PathBuf {
        self.items()
            .iter()
            .fold(root.to_path_buf(), |path, item| path.join(item))
    }
}

/// A name usable as one directory level: not `.` or `..`, no separators
fn is_plain_name(name: &str) -> bool {
    name != "." && name != ".." && !name.contains(&['\\', '\0'][..])
}

impl fmt::Display for TimeBucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.item_key, self.category_key)
    }
}

impl FromStr for TimeBucketKey {
    type Err = BucketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(BucketError::InvalidKey("empty key".to_string()));
        }
        Ok(match s.split_once(':') {
            Some((items, categories)) => Self::new(items, categories),
            None => Self::with_default_schema(s),
        })
    }
}

impl From<TimeBucketKey> for String {
    fn from(key: TimeBucketKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for TimeBucketKey {
    type Error = BucketError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
