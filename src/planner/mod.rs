//! Query planner
//!
//! Turns a logical query (allowed items per category, a date range, a row
//! limit) into the concrete year files a reader or writer has to touch:
//!
//! - **Query**: restrictions, range and limit builder
//! - **Parse**: catalog descent and validation producing a [`ParseResult`]
//!
//! # Example
//!
//! ```rust,ignore
//! use bucketstore::planner::Query;
//!
//! let mut query = Query::new(catalog);
//! query.add_restriction("Symbol", "NZDUSD");
//! query.add_restriction("Symbol", "USDJPY");
//! query.add_restriction("Timeframe", "1Min");
//!
//! let result = query.parse()?;
//! assert_eq!(result.intervals_per_day, 1440);
//! ```

mod error;
mod parse;
mod query;

pub use error::{PlannerError, PlannerResult};
pub use parse::{ParseResult, QualifiedFile};
pub use query::{DateRange, Direction, Query, RestrictionList, RowLimit, TimeQual};
