//! Year file header format
//!
//! Every year file starts with a fixed-size header describing its schema,
//! followed by one record slot per interval of the year. The file is sized
//! for the whole year when it is created.
//!
//! Layout (little-endian):
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ version: i64                            │
//! │ description: [u8; 256]                 │
//! │ year: i64                               │
//! │ timeframe_ns: i64                       │
//! │ record_type: i64                        │
//! │ n_elements: i64                         │
//! │ record_length: i64                      │
//! │ reserved: [u8; 8]                       │
//! ├─────────────────────────────────────────┤
//! │ element_names: [[u8; 32]; 1024]         │
//! │ element_types: [u8; 1024]               │
//! │ reserved: [u8; 2920]                    │
//! └─────────────────────────────────────────┘
//! ```

use crate::bucket::error::{BucketError, BucketResult};
use crate::bucket::shape::{ElementType, RecordType};
use chrono::NaiveDate;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

/// Current header version
pub const FILE_INFO_VERSION: i64 = 2;

/// Total header size in bytes
pub const HEADER_SIZE: usize = 37024;

/// Maximum number of columns in one bucket
pub const MAX_NUM_ELEMENTS: usize = 1024;

const DESCRIPTION_BYTES: usize = 256;
const ELEMENT_NAME_BYTES: usize = 32;

const VERSION_OFFSET: usize = 0;
const DESCRIPTION_OFFSET: usize = 8;
const YEAR_OFFSET: usize = DESCRIPTION_OFFSET + DESCRIPTION_BYTES;
const TIMEFRAME_OFFSET: usize = YEAR_OFFSET + 8;
const RECORD_TYPE_OFFSET: usize = TIMEFRAME_OFFSET + 8;
const N_ELEMENTS_OFFSET: usize = RECORD_TYPE_OFFSET + 8;
const RECORD_LENGTH_OFFSET: usize = N_ELEMENTS_OFFSET + 8;
const ELEMENT_NAMES_OFFSET: usize = RECORD_LENGTH_OFFSET + 16;
const ELEMENT_TYPES_OFFSET: usize = ELEMENT_NAMES_OFFSET + MAX_NUM_ELEMENTS * ELEMENT_NAME_BYTES;

/// Decoded year file header
#[derive(Debug, Clone, PartialEq)]
pub struct FileHeader {
    pub version: i64,
    pub description: String,
    pub year: i16,
    pub timeframe: Duration,
    pub record_type: RecordType,
    pub record_length: i32,
    pub element_names: Vec<String>,
    pub element_types: Vec<ElementType>,
}

impl FileHeader {
    /// Serialize header to bytes
    pub fn to_bytes(&self) -> BucketResult<Vec<u8>> {
        let n_elements = self.element_types.len();
        if n_elements > MAX_NUM_ELEMENTS {
            return Err(BucketError::TooManyElements(n_elements));
        }

        let mut buf = vec![0u8; HEADER_SIZE];

        buf[VERSION_OFFSET..VERSION_OFFSET + 8].copy_from_slice(&self.version.to_le_bytes());
        copy_truncated(
            &mut buf[DESCRIPTION_OFFSET..DESCRIPTION_OFFSET + DESCRIPTION_BYTES],
            self.description.as_bytes(),
        );
        buf[YEAR_OFFSET..YEAR_OFFSET + 8].copy_from_slice(&(self.year as i64).to_le_bytes());
        buf[TIMEFRAME_OFFSET..TIMEFRAME_OFFSET + 8]
            .copy_from_slice(&(self.timeframe.as_nanos() as i64).to_le_bytes());
        buf[RECORD_TYPE_OFFSET..RECORD_TYPE_OFFSET + 8]
            .copy_from_slice(&(self.record_type as i64).to_le_bytes());
        buf[N_ELEMENTS_OFFSET..N_ELEMENTS_OFFSET + 8]
            .copy_from_slice(&(n_elements as i64).to_le_bytes());
        buf[RECORD_LENGTH_OFFSET..RECORD_LENGTH_OFFSET + 8]
            .copy_from_slice(&(self.record_length as i64).to_le_bytes());

        for (i, (name, ty)) in self
            .element_names
            .iter()
            .zip(self.element_types.iter())
            .enumerate()
        {
            let start = ELEMENT_NAMES_OFFSET + i * ELEMENT_NAME_BYTES;
            copy_truncated(&mut buf[start..start + ELEMENT_NAME_BYTES], name.as_bytes());
            buf[ELEMENT_TYPES_OFFSET + i] = *ty as u8;
        }

        Ok(buf)
    }

    /// Parse header from bytes
    pub fn from_bytes(buf: &[u8], path: &Path) -> BucketResult<Self> {
        let invalid = |reason: String| BucketError::InvalidHeader {
            path: path.to_path_buf(),
            reason,
        };

        if buf.len() < HEADER_SIZE {
            return Err(invalid(format!("short header: {} bytes", buf.len())));
        }

        let version = read_i64(buf, VERSION_OFFSET);
        let description = trim_nul(&buf[DESCRIPTION_OFFSET..DESCRIPTION_OFFSET + DESCRIPTION_BYTES]);
        let year = i16::try_from(read_i64(buf, YEAR_OFFSET))
            .map_err(|_| invalid("year out of range".to_string()))?;

        let timeframe_ns = read_i64(buf, TIMEFRAME_OFFSET);
        if timeframe_ns <= 0 {
            return Err(invalid(format!("timeframe of {}ns", timeframe_ns)));
        }
        let timeframe = Duration::from_nanos(timeframe_ns as u64);

        let record_type = RecordType::try_from(read_i64(buf, RECORD_TYPE_OFFSET))?;
        let n_elements = read_i64(buf, N_ELEMENTS_OFFSET);
        if n_elements < 0 || n_elements as usize > MAX_NUM_ELEMENTS {
            return Err(invalid(format!("element count {}", n_elements)));
        }
        let record_length = read_i64(buf, RECORD_LENGTH_OFFSET) as i32;

        let mut element_names = Vec::with_capacity(n_elements as usize);
        let mut element_types = Vec::with_capacity(n_elements as usize);
        for i in 0..n_elements as usize {
            let start = ELEMENT_NAMES_OFFSET + i * ELEMENT_NAME_BYTES;
            element_names.push(trim_nul(&buf[start..start + ELEMENT_NAME_BYTES]));
            element_types.push(ElementType::try_from(buf[ELEMENT_TYPES_OFFSET + i])?);
        }

        Ok(Self {
            version,
            description,
            year,
            timeframe,
            record_type,
            record_length,
            element_names,
            element_types,
        })
    }

    /// Write the encoded header at the writer's current position
    pub fn write_to<W: Write>(&self, writer: &mut W) -> BucketResult<()> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }

    /// Read and decode the header at the start of the file at `path`
    pub fn read_from_path(path: &Path) -> BucketResult<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut buf = vec![0u8; HEADER_SIZE];
        file.read_exact(&mut buf).map_err(|e| BucketError::InvalidHeader {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_bytes(&buf, path)
    }
}

/// Size in bytes of a year file: the header plus one record per interval
pub fn file_size(timeframe: Duration, year: i32, record_length: i32) -> u64 {
    let intervals = nanoseconds_in_year(year) / timeframe.as_nanos().max(1) as i64;
    HEADER_SIZE as u64 + (intervals * record_length as i64) as u64
}

fn nanoseconds_in_year(year: i32) -> i64 {
    let days = match (
        NaiveDate::from_ymd_opt(year, 1, 1),
        NaiveDate::from_ymd_opt(year + 1, 1, 1),
    ) {
        (Some(start), Some(end)) => (end - start).num_days(),
        _ => 365,
    };
    days * 86_400 * 1_000_000_000
}

fn read_i64(buf: &[u8], offset: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    i64::from_le_bytes(bytes)
}

fn copy_truncated(dst: &mut [u8], src: &[u8]) {
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
}

fn trim_nul(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
