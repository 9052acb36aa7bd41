//! Record schema types
//!
//! The byte values of [`ElementType`] and [`RecordType`] are written into
//! year file headers, so their ordering must never change.

use crate::bucket::error::{BucketError, BucketResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column type of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ElementType {
    Float32 = 0,
    Int32 = 1,
    Float64 = 2,
    Int64 = 3,
    Byte = 4,
    Bool = 5,
    None = 6,
    String = 7,
    Int16 = 8,
    Uint8 = 9,
    Uint16 = 10,
    Uint32 = 11,
    Uint64 = 12,
    String16 = 13,
}

impl ElementType {
    /// Size of one value in bytes
    pub fn size(&self) -> usize {
        match self {
            Self::Float32 | Self::Int32 | Self::Uint32 => 4,
            Self::Float64 | Self::Int64 | Self::Uint64 => 8,
            Self::Byte | Self::Bool | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::None | Self::String => 0,
            Self::String16 => 64,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Int32 => "int32",
            Self::Float64 => "float64",
            Self::Int64 => "int64",
            Self::Byte => "byte",
            Self::Bool => "bool",
            Self::None => "none",
            Self::String => "string",
            Self::Int16 => "int16",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::String16 => "string16",
        }
    }

    /// Parse from a lowercase type name (e.g. "float32")
    pub fn from_name(name: &str) -> BucketResult<Self> {
        Ok(match name.to_lowercase().as_str() {
            "float32" => Self::Float32,
            "int32" => Self::Int32,
            "float64" => Self::Float64,
            "int64" => Self::Int64,
            "byte" => Self::Byte,
            "bool" => Self::Bool,
            "none" => Self::None,
            "string" => Self::String,
            "int16" => Self::Int16,
            "uint8" => Self::Uint8,
            "uint16" => Self::Uint16,
            "uint32" => Self::Uint32,
            "uint64" => Self::Uint64,
            "string16" => Self::String16,
            _ => return Err(BucketError::UnknownElementType(name.to_string())),
        })
    }
}

impl TryFrom<u8> for ElementType {
    type Error = BucketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Float32,
            1 => Self::Int32,
            2 => Self::Float64,
            3 => Self::Int64,
            4 => Self::Byte,
            5 => Self::Bool,
            6 => Self::None,
            7 => Self::String,
            8 => Self::Int16,
            9 => Self::Uint8,
            10 => Self::Uint16,
            11 => Self::Uint32,
            12 => Self::Uint64,
            13 => Self::String16,
            _ => return Err(BucketError::UnknownElementType(value.to_string())),
        })
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Layout of the records in a year file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum RecordType {
    /// One fixed-length record per interval
    Fixed = 0,
    /// Per-interval pointers into variable-length record data
    Variable = 1,
    NoType = 2,
}

impl RecordType {
    /// Parse from "fixed" or "variable" (case-insensitive); anything else is `NoType`
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "fixed" => Self::Fixed,
            "variable" => Self::Variable,
            _ => Self::NoType,
        }
    }
}

impl TryFrom<i64> for RecordType {
    type Error = BucketError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Fixed),
            1 => Ok(Self::Variable),
            2 => Ok(Self::NoType),
            _ => Err(BucketError::InvalidDataShape(format!(
                "unknown record type: {}",
                value
            ))),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::Variable => write!(f, "variable"),
            Self::NoType => write!(f, "notype"),
        }
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataShape {
    pub name: String,
    #[serde(rename = "type")]
    pub element_type: ElementType,
}

impl DataShape {
    pub fn new(name: impl Into<String>, element_type: ElementType) -> Self {
        Self {
            name: name.into(),
            element_type,
        }
    }

    /// Zip parallel name and type lists into shapes
    pub fn vector<S: AsRef<str>>(names: &[S], types: &[ElementType]) -> Vec<DataShape> {
        names
            .iter()
            .zip(types.iter())
            .map(|(name, ty)| DataShape::new(name.as_ref(), *ty))
            .collect()
    }

    /// Size of the column in bytes
    pub fn byte_len(&self) -> usize {
        self.element_type.size()
    }
}

impl fmt::Display for DataShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.element_type)
    }
}

/// Parse a column list such as `"Open,High:float32,Volume:int64"`
///
/// Names without a type inherit the type of the next typed group, so
/// `"Open,High:float32"` declares two float32 columns.
pub fn data_shapes_from_input_string(input: &str) -> BucketResult<Vec<DataShape>> {
    let mut shapes = Vec::new();
    let mut pending: Vec<String> = Vec::new();

    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once(':') {
            Some((name, ty)) => {
                let element_type = ElementType::from_name(ty.trim())?;
                for untyped in pending.drain(..) {
                    shapes.push(DataShape::new(untyped, element_type));
                }
                shapes.push(DataShape::new(name.trim(), element_type));
            }
            None => pending.push(part.to_string()),
        }
    }

    if !pending.is_empty() {
        return Err(BucketError::InvalidDataShape(format!(
            "columns without a type: {}",
            pending.join(",")
        )));
    }
    if shapes.is_empty() {
        return Err(BucketError::InvalidDataShape(input.to_string()));
    }

    Ok(shapes)
}
