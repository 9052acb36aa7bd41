//! Planner error types

use crate::bucket::BucketError;
use crate::catalog::CatalogError;
use crate::planner::parse::ParseResult;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving a query against the catalog
#[derive(Error, Debug)]
pub enum PlannerError {
    /// A restriction names a category the catalog does not have
    #[error("Category {0} not in catalog")]
    UnknownCategory(String),

    /// Qualified files span more than one timeframe
    #[error("Timeframe not the same in result set - File: {0:?}")]
    TimeframeMismatch(PathBuf),

    /// No file matched the restrictions; carries the empty result
    #[error("No files returned from query parse")]
    EmptyResult(Box<ParseResult>),

    /// Catalog lookup failed
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// A year file header could not be read
    #[error("Bucket error: {0}")]
    Bucket(#[from] BucketError),
}

/// Result type for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;
