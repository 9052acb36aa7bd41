//! # Bucketstore
//!
//! Catalog and query planner for a year-partitioned time-series store.
//!
//! Series are named by a category path (`Symbol/Timeframe/AttributeGroup`)
//! and an item path (`AAPL/1Min/OHLCV`), laid out on disk as one directory
//! level per category with one binary file per calendar year at the bottom.
//!
//! ## Modules
//!
//! - [`bucket`]: Keys, timeframes, column shapes and year file descriptors
//! - [`catalog`]: Concurrent in-memory mirror of the directory tree
//! - [`planner`]: Resolves restrictions into the year files to read
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bucketstore::bucket::{DataShape, ElementType, RecordType, TimeBucketInfo, TimeBucketKey};
//! use bucketstore::catalog::Directory;
//! use bucketstore::planner::Query;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let root = std::path::Path::new("/var/lib/bucketstore");
//!     let catalog = Directory::open(root)?;
//!
//!     // Create AAPL/1Min/OHLCV for 2016
//!     let key = TimeBucketKey::with_default_schema("AAPL/1Min/OHLCV");
//!     let shapes = DataShape::vector(
//!         &["Open", "High", "Low", "Close", "Volume"],
//!         &[ElementType::Float32, ElementType::Float32, ElementType::Float32,
//!           ElementType::Float32, ElementType::Int32],
//!     );
//!     let info = TimeBucketInfo::new(
//!         &key.timeframe()?, &key.path_to_year_files(root), "AAPL minute bars",
//!         2016, &shapes, RecordType::Fixed,
//!     );
//!     catalog.add_time_bucket(&key, &info)?;
//!
//!     // Find the files holding AAPL minute bars
//!     let mut query = Query::new(catalog);
//!     query.add_target_key(&key);
//!     let result = query.parse()?;
//!
//!     println!("{} files, {} intervals per day",
//!         result.qualified_files.len(), result.intervals_per_day);
//!     Ok(())
//! }
//! ```

pub mod bucket;
pub mod catalog;
pub mod config;
pub mod planner;

#[cfg(test)]
pub(crate) mod test_util;

// Re-export top-level types for convenience
pub use bucket::{
    BucketError, BucketResult, DataShape, ElementType, RecordType, Timeframe, TimeBucketInfo,
    TimeBucketKey,
};

pub use catalog::{CatalogError, CatalogResult, Directory};

pub use planner::{
    DateRange, Direction, ParseResult, PlannerError, PlannerResult, QualifiedFile, Query,
    RestrictionList, RowLimit,
};

pub use config::{generate_default_config, CatalogConfig, Config, ConfigError, LoggingConfig};
