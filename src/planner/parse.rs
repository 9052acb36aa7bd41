//! Query resolution
//!
//! Resolving a query walks the catalog from the root, descending at each
//! level only into children allowed by the restrictions, and collects every
//! year file reached as a [`QualifiedFile`].
//!
//! # Resolution Pipeline
//!
//! ```text
//! restrictions → category check → conditional descent → non-empty check
//!              → timeframe check → date range defaults → ParseResult
//! ```
//!
//! Dates never prune files here; record-level filtering is left to readers.
//!
//! # Consistency
//!
//! The descent locks one node at a time and keeps no ancestor locked, unlike
//! the catalog's own gathers. A bucket attached during planning is either
//! seen whole or not at all, since subtrees are attached fully loaded. A
//! bucket removed during planning may still be emitted, or fail the parse
//! when its header is read after the file was deleted. Callers that remove
//! buckets while planning must tolerate both.

use crate::bucket::{BucketResult, DataShape, RecordType, TimeBucketInfo, TimeBucketKey};
use crate::catalog::Directory;
use crate::planner::error::{PlannerError, PlannerResult};
use crate::planner::query::{DateRange, Query, RowLimit, TimeQual};
use chrono::{DateTime, Duration, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// A year file selected by a query, with the key of its bucket
#[derive(Debug, Clone)]
pub struct QualifiedFile {
    pub key: TimeBucketKey,
    pub file: Arc<TimeBucketInfo>,
}

/// Output of [`Query::parse`]
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    /// Selected files in catalog order
    pub qualified_files: Vec<QualifiedFile>,
    pub range: DateRange,
    pub limit: RowLimit,
    /// Shared by every qualified file
    pub intervals_per_day: i64,
    pub root_dir: PathBuf,
    pub time_quals: Vec<TimeQual>,
}

impl ParseResult {
    pub fn record_types(&self) -> BucketResult<BTreeMap<TimeBucketKey, RecordType>> {
        let mut types = BTreeMap::new();
        for qf in &self.qualified_files {
            types.insert(qf.key.clone(), qf.file.record_type()?);
        }
        Ok(types)
    }

    /// Columns of each bucket as returned to readers, `Epoch` first
    pub fn data_shapes(&self) -> BucketResult<BTreeMap<TimeBucketKey, Vec<DataShape>>> {
        let mut shapes = BTreeMap::new();
        for qf in &self.qualified_files {
            shapes.insert(qf.key.clone(), qf.file.data_shapes_with_epoch()?);
        }
        Ok(shapes)
    }

    /// Bytes per row of each bucket
    pub fn row_lengths(&self) -> BucketResult<BTreeMap<TimeBucketKey, usize>> {
        let mut lengths = BTreeMap::new();
        for qf in &self.qualified_files {
            let len = match qf.file.record_type()? {
                RecordType::Fixed => qf.file.record_length()?,
                RecordType::Variable => qf.file.variable_record_length()?,
                RecordType::NoType => {
                    tracing::warn!("Unknown record type for {:?}", qf.file.path);
                    continue;
                }
            };
            lengths.insert(qf.key.clone(), len as usize);
        }
        Ok(lengths)
    }
}

/// Pending node of the descent with the key prefixes leading to it
struct Frame {
    dir: Arc<Directory>,
    item_key: String,
    category_key: String,
}

impl Query {
    /// Resolve this query into the set of files to read or write
    ///
    /// When neither end of the date range was set, the result's range runs
    /// from Jan 1 of the earliest qualified year to Dec 31 of the requested
    /// end's year, in the query's time zone.
    pub fn parse(&self) -> PlannerResult<ParseResult> {
        let catalog_categories = self.catalog.gather_categories_from_cache();
        if let Some(unknown) = self
            .restrictions
            .categories()
            .find(|category| !catalog_categories.contains(*category))
        {
            return Err(PlannerError::UnknownCategory(unknown.to_string()));
        }

        let mut result = ParseResult {
            qualified_files: self.qualified_files(),
            root_dir: self.catalog.get_path().to_path_buf(),
            ..Default::default()
        };

        if result.qualified_files.is_empty() {
            return Err(PlannerError::EmptyResult(Box::new(result)));
        }

        for (i, qf) in result.qualified_files.iter().enumerate() {
            let intervals = qf.file.intervals_per_day()?;
            if i == 0 {
                result.intervals_per_day = intervals;
            } else if intervals != result.intervals_per_day {
                return Err(PlannerError::TimeframeMismatch(qf.file.path.clone()));
            }
        }

        result.range = self.range;
        result.limit = self.limit;
        if self.range.is_unbounded() {
            result.range = default_range(&result.qualified_files, &self.range, &self.timezone);
        }
        result.time_quals = self.time_quals.clone();

        tracing::debug!(
            "Query resolved to {} files, {} intervals per day, range {} to {}",
            result.qualified_files.len(),
            result.intervals_per_day,
            result.range.start,
            result.range.end
        );
        Ok(result)
    }

    /// Depth-first conditional descent collecting the files in scope
    fn qualified_files(&self) -> Vec<QualifiedFile> {
        let mut files = Vec::new();
        let mut stack = vec![Frame {
            dir: Arc::clone(&self.catalog),
            item_key: String::new(),
            category_key: String::new(),
        }];

        while let Some(frame) = stack.pop() {
            let mut key = None;

            if frame.dir.dir_has_sub_dirs() {
                let category = frame.dir.get_category();
                let category_key = format!("{}{}/", frame.category_key, category);

                let children: Vec<Arc<Directory>> = match self.restrictions.items(&category) {
                    Some(items) => items
                        .iter()
                        .filter_map(|item| frame.dir.get_sub_dir_with_item_name(item))
                        .collect(),
                    None => frame.dir.get_list_of_sub_dirs(),
                };

                // Reversed so children pop in order
                for child in children.into_iter().rev() {
                    stack.push(Frame {
                        item_key: format!("{}{}/", frame.item_key, child.get_name()),
                        category_key: category_key.clone(),
                        dir: child,
                    });
                }
            } else if !frame.item_key.is_empty() && !frame.category_key.is_empty() {
                key = Some(TimeBucketKey::new(
                    frame.item_key.trim_end_matches('/'),
                    frame.category_key.trim_end_matches('/'),
                ));
            }

            if frame.dir.dir_has_data_files() {
                match key {
                    Some(key) => files.extend(frame.dir.get_time_bucket_info_slice().into_iter().map(
                        |file| QualifiedFile {
                            key: key.clone(),
                            file,
                        },
                    )),
                    None => tracing::debug!(
                        "Skipping files in {:?}: no bucket key above them",
                        frame.dir.get_path()
                    ),
                }
            }
        }

        files
    }
}

/// Range used when the query set neither end: the earliest qualified year
/// through the requested end's year
fn default_range(files: &[QualifiedFile], requested: &DateRange, tz: &Tz) -> DateRange {
    let start_year = files
        .iter()
        .map(|qf| qf.file.year)
        .min()
        .unwrap_or_default() as i32;

    DateRange {
        start: year_start(tz, start_year).unwrap_or(DateTime::<Utc>::MIN_UTC),
        end: year_end(tz, local_year(requested.end, tz)),
    }
}

/// Midnight of Jan 1 of `year` in `tz`
fn year_start(tz: &Tz, year: i32) -> Option<DateTime<Utc>> {
    tz.with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

/// Last nanosecond of `year` in `tz`, clamped to the representable maximum
fn year_end(tz: &Tz, year: i32) -> DateTime<Utc> {
    year.checked_add(1)
        .and_then(|next| year_start(tz, next))
        .map(|t| t - Duration::nanoseconds(1))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Calendar year of `t` in `tz`, falling back to UTC at the edges of the
/// representable range
fn local_year(t: DateTime<Utc>, tz: &Tz) -> i32 {
    use chrono::Datelike;

    let offset = tz.offset_from_utc_datetime(&t.naive_utc()).fix();
    t.naive_utc()
        .checked_add_signed(Duration::seconds(offset.local_minus_utc() as i64))
        .map(|local| local.year())
        .unwrap_or_else(|| t.year())
}
