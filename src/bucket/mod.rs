//! Time bucket primitives
//!
//! The vocabulary shared by the catalog and the planner:
//!
//! - **key**: [`TimeBucketKey`], the item path + category path naming a series
//! - **timeframe**: [`Timeframe`] parsing (`1Min`, `4H`, `1D`, ...)
//! - **shape**: column types and record layouts
//! - **info**: [`TimeBucketInfo`], the descriptor of one year file
//! - **header**: the fixed-size year file header codec
//! - **error**: Error types
//!
//! # On-disk layout
//!
//! ```text
//! root/
//!   category_name            "Symbol"
//!   AAPL/
//!     category_name          "Timeframe"
//!     1Min/
//!       category_name        "AttributeGroup"
//!       OHLCV/
//!         category_name      "Year"
//!         2016.bin           header + one slot per minute of 2016
//!         2017.bin
//! ```

pub mod error;
pub mod header;
pub mod info;
pub mod key;
pub mod shape;
pub mod timeframe;

pub use error::{BucketError, BucketResult};
pub use header::{file_size, FileHeader, FILE_INFO_VERSION, HEADER_SIZE, MAX_NUM_ELEMENTS};
pub use info::{TimeBucketInfo, EPOCH_COLUMN_NAME};
pub use key::{TimeBucketKey, DEFAULT_TIME_BUCKET_SCHEMA};
pub use shape::{data_shapes_from_input_string, DataShape, ElementType, RecordType};
pub use timeframe::Timeframe;
