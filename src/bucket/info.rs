//! Year file descriptors
//!
//! A [`TimeBucketInfo`] describes one `<year>.bin` file. Descriptors found
//! while scanning the catalog start out *pending*: only the path and year are
//! known, and the schema is read from the file header the first time it is
//! needed.

use crate::bucket::error::{BucketError, BucketResult};
use crate::bucket::header::{FileHeader, FILE_INFO_VERSION};
use crate::bucket::shape::{DataShape, ElementType, RecordType};
use crate::bucket::timeframe::{Timeframe, NANOS_PER_DAY};
use once_cell::sync::OnceCell;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the implicit timestamp column
pub const EPOCH_COLUMN_NAME: &str = "Epoch";

const EPOCH_LEN_BYTES: i32 = 8;
/// {index, offset, len} pointer into variable-length record data
const VARIABLE_POINTER_LEN_BYTES: i32 = 24;
const INTERVAL_TICKS_LEN_BYTES: i32 = 4;

/// Descriptor of one binary year file
#[derive(Debug, Clone)]
pub struct TimeBucketInfo {
    /// Calendar year covered by the file
    pub year: i16,
    /// Absolute path to the file (e.g. `/data/AAPL/1Min/OHLCV/2016.bin`)
    pub path: PathBuf,
    /// Schema, set on construction or read lazily from the header
    meta: OnceCell<FileHeader>,
}

impl TimeBucketInfo {
    /// Describe a new year file under `dir`
    ///
    /// A leading `Epoch` column in `shapes` is dropped, since every record
    /// carries the epoch implicitly.
    pub fn new(
        timeframe: &Timeframe,
        dir: &Path,
        description: &str,
        year: i16,
        shapes: &[DataShape],
        record_type: RecordType,
    ) -> Self {
        let (element_names, element_types): (Vec<String>, Vec<ElementType>) = shapes
            .iter()
            .filter(|shape| shape.name != EPOCH_COLUMN_NAME)
            .map(|shape| (shape.name.clone(), shape.element_type))
            .unzip();

        let record_length = match record_type {
            RecordType::Fixed => aligned_size(field_record_length(&element_types)) + EPOCH_LEN_BYTES,
            RecordType::Variable => VARIABLE_POINTER_LEN_BYTES,
            RecordType::NoType => 0,
        };

        let meta = FileHeader {
            version: FILE_INFO_VERSION,
            description: description.to_string(),
            year,
            timeframe: timeframe.duration(),
            record_type,
            record_length,
            element_names,
            element_types,
        };

        Self {
            year,
            path: dir.join(format!("{}.bin", year)),
            meta: OnceCell::with_value(meta),
        }
    }

    /// A descriptor whose schema has not been read from disk yet
    pub fn pending(path: impl Into<PathBuf>, year: i16) -> Self {
        Self {
            year,
            path: path.into(),
            meta: OnceCell::new(),
        }
    }

    /// Whether the schema is loaded
    pub fn is_read(&self) -> bool {
        self.meta.get().is_some()
    }

    fn meta(&self) -> BucketResult<&FileHeader> {
        self.meta
            .get_or_try_init(|| FileHeader::read_from_path(&self.path))
    }

    pub fn version(&self) -> BucketResult<i64> {
        Ok(self.meta()?.version)
    }

    pub fn description(&self) -> BucketResult<&str> {
        Ok(&self.meta()?.description)
    }

    /// Duration covered by each record (e.g. one minute for `1Min` data)
    pub fn timeframe(&self) -> BucketResult<Duration> {
        Ok(self.meta()?.timeframe)
    }

    /// Number of records that fit in a 24 hour day
    pub fn intervals_per_day(&self) -> BucketResult<i64> {
        let nanos = self.timeframe()?.as_nanos() as i64;
        if nanos == 0 {
            return Err(BucketError::InvalidHeader {
                path: self.path.clone(),
                reason: "zero timeframe".to_string(),
            });
        }
        Ok(NANOS_PER_DAY / nanos)
    }

    pub fn record_type(&self) -> BucketResult<RecordType> {
        Ok(self.meta()?.record_type)
    }

    /// Bytes per record slot: the word-aligned fields plus the epoch for
    /// fixed records, the indirect pointer size for variable records
    pub fn record_length(&self) -> BucketResult<i32> {
        Ok(self.meta()?.record_length)
    }

    /// Bytes per variable-length record: the fields plus the interval ticks
    /// trailer. Always 0 for fixed records.
    pub fn variable_record_length(&self) -> BucketResult<i32> {
        let meta = self.meta()?;
        Ok(match meta.record_type {
            RecordType::Variable => {
                field_record_length(&meta.element_types) + INTERVAL_TICKS_LEN_BYTES
            }
            _ => 0,
        })
    }

    pub fn element_names(&self) -> BucketResult<&[String]> {
        Ok(&self.meta()?.element_names)
    }

    pub fn element_types(&self) -> BucketResult<&[ElementType]> {
        Ok(&self.meta()?.element_types)
    }

    /// Columns stored in the file, without the epoch
    pub fn data_shapes(&self) -> BucketResult<Vec<DataShape>> {
        let meta = self.meta()?;
        Ok(DataShape::vector(&meta.element_names, &meta.element_types))
    }

    /// Columns stored in the file, prefixed by `Epoch:int64`
    pub fn data_shapes_with_epoch(&self) -> BucketResult<Vec<DataShape>> {
        let mut shapes = vec![DataShape::new(EPOCH_COLUMN_NAME, ElementType::Int64)];
        shapes.extend(self.data_shapes()?);
        Ok(shapes)
    }

    /// A fully loaded, independent copy of this descriptor
    pub fn deep_copy(&self) -> BucketResult<Self> {
        self.meta()?;
        Ok(self.clone())
    }

    /// A copy for another year of the same bucket, placed next to this file
    pub fn for_year(&self, year: i16) -> BucketResult<Self> {
        let mut copy = self.deep_copy()?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new(""));
        copy.year = year;
        copy.path = dir.join(format!("{}.bin", year));
        Ok(copy)
    }

    /// The on-disk header for this descriptor
    pub fn header(&self) -> BucketResult<FileHeader> {
        let mut header = self.meta()?.clone();
        header.year = self.year;
        Ok(header)
    }

    /// Encode this descriptor's header into `writer`
    pub fn write_header<W: Write>(&self, writer: &mut W) -> BucketResult<()> {
        if self.version()? != FILE_INFO_VERSION {
            tracing::warn!(
                "File info version mismatch for {:?}: {} != {}",
                self.path,
                self.version()?,
                FILE_INFO_VERSION
            );
        }
        self.header()?.write_to(writer)
    }
}

fn field_record_length(types: &[ElementType]) -> i32 {
    types.iter().map(|t| t.size() as i32).sum()
}

/// Round up to the machine word size
pub fn aligned_size(unaligned: i32) -> i32 {
    let word = std::mem::align_of::<usize>() as i32;
    match unaligned % word {
        0 => unaligned,
        rem => unaligned + word - rem,
    }
}
