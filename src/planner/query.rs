//! Query construction
//!
//! A [`Query`] collects per-category restrictions, a date range and a row
//! limit before being resolved against the catalog by [`Query::parse`].

use crate::bucket::TimeBucketKey;
use crate::catalog::Directory;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Allowed items per category
///
/// A category without an entry is unrestricted: the planner descends into
/// every child at that level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestrictionList {
    restrictions: BTreeMap<String, Vec<String>>,
}

impl RestrictionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `item` in `category`; repeated items are kept once, in first
    /// insertion order
    pub fn add(&mut self, category: impl Into<String>, item: impl Into<String>) {
        let items = self.restrictions.entry(category.into()).or_default();
        let item = item.into();
        if !items.contains(&item) {
            items.push(item);
        }
    }

    /// Allowed items of `category`, or `None` when it is unrestricted
    pub fn items(&self, category: &str) -> Option<&[String]> {
        self.restrictions.get(category).map(Vec::as_slice)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.restrictions.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.restrictions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.restrictions.len()
    }
}

/// Inclusive time window of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Default for DateRange {
    fn default() -> Self {
        Self {
            start: DateTime::<Utc>::MIN_UTC,
            end: DateTime::<Utc>::MAX_UTC,
        }
    }
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Whether both ends are still at their defaults
    pub fn is_unbounded(&self) -> bool {
        self.start == DateTime::<Utc>::MIN_UTC && self.end == DateTime::<Utc>::MAX_UTC
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Which end of the range a row limit counts from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    First,
    Last,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::First => write!(f, "first"),
            Direction::Last => write!(f, "last"),
        }
    }
}

/// Maximum number of rows to return, counted from `direction`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowLimit {
    pub number: i32,
    pub direction: Direction,
}

impl Default for RowLimit {
    fn default() -> Self {
        Self {
            number: i32::MAX,
            direction: Direction::First,
        }
    }
}

/// Record-level predicate on the epoch, applied by readers downstream
#[derive(Clone)]
pub struct TimeQual(Arc<dyn Fn(i64) -> bool + Send + Sync>);

impl TimeQual {
    pub fn new(f: impl Fn(i64) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Whether a record at `epoch` (seconds) qualifies
    pub fn check(&self, epoch: i64) -> bool {
        (self.0)(epoch)
    }
}

impl fmt::Debug for TimeQual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TimeQual(..)")
    }
}

/// A query against one catalog
///
/// # Example
///
/// ```rust,ignore
/// let mut query = Query::new(catalog);
/// query.add_restriction("Symbol", "AAPL");
/// query.add_restriction("Timeframe", "1Min");
/// query.set_row_limit(Direction::Last, 100);
///
/// let result = query.parse()?;
/// for qf in &result.qualified_files {
///     println!("{} {}", qf.key, qf.file.path.display());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Query {
    pub(crate) catalog: Arc<Directory>,
    pub(crate) restrictions: RestrictionList,
    pub(crate) range: DateRange,
    pub(crate) limit: RowLimit,
    pub(crate) time_quals: Vec<TimeQual>,
    pub(crate) timezone: Tz,
}

impl Query {
    /// Create an unrestricted, unbounded query resolving dates in UTC
    pub fn new(catalog: Arc<Directory>) -> Self {
        Self {
            catalog,
            restrictions: RestrictionList::new(),
            range: DateRange::default(),
            limit: RowLimit::default(),
            time_quals: Vec::new(),
            timezone: Tz::UTC,
        }
    }

    /// Time zone used to resolve the default date range
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn add_restriction(&mut self, category: impl Into<String>, item: impl Into<String>) {
        self.restrictions.add(category, item);
    }

    /// Restrict every category of `key` to its item(s); comma-separated
    /// items add one restriction each
    pub fn add_target_key(&mut self, key: &TimeBucketKey) {
        for category in key.categories() {
            for item in key.multi_item_in_category(category) {
                self.restrictions.add(category, item);
            }
        }
    }

    pub fn set_row_limit(&mut self, direction: Direction, number: i32) {
        self.limit = RowLimit { number, direction };
    }

    pub fn set_range(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.range = DateRange::new(start, end);
    }

    pub fn set_start(&mut self, start: DateTime<Utc>) {
        self.range.start = start;
    }

    pub fn set_end(&mut self, end: DateTime<Utc>) {
        self.range.end = end;
    }

    pub fn add_time_qual(&mut self, qual: impl Fn(i64) -> bool + Send + Sync + 'static) {
        self.time_quals.push(TimeQual::new(qual));
    }

    pub fn restrictions(&self) -> &RestrictionList {
        &self.restrictions
    }

    pub fn range(&self) -> &DateRange {
        &self.range
    }

    pub fn limit(&self) -> &RowLimit {
        &self.limit
    }
}
