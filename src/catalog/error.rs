//! Catalog error types

use crate::bucket::BucketError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building or mutating the catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    /// A directory has no `category_name` marker file
    #[error("Could not find a category_name file under {path:?}: {reason}")]
    CategoryFileNotFound { path: PathBuf, reason: String },

    /// The requested category conflicts with the on-disk marker
    #[error("Category name does not match on-disk name in {path:?}: requested {requested}, found {found}")]
    CategoryMismatch {
        path: PathBuf,
        requested: String,
        found: String,
    },

    /// A year file already exists where a new one was to be created
    #[error("File is already in directory: {0:?}")]
    FileAlreadyExists(PathBuf),

    /// An operation needing a leaf directory hit one without year files
    #[error("Subdirectory in catalog does not contain files: {0:?}")]
    SubdirectoryDoesNotContainFiles(PathBuf),

    /// Creating or sizing a new year file failed
    #[error("Unable to create file {path:?}: {reason}")]
    UnableToCreateFile { path: PathBuf, reason: String },

    /// Writing the header of a new year file failed
    #[error("Unable to write header for new file {path:?}: {reason}")]
    UnableToWriteHeader { path: PathBuf, reason: String },

    /// Path, item, or subdirectory is not in the catalog
    #[error("Not found: {0}")]
    NotFound(String),

    /// A `<year>.bin` file name does not hold a year
    #[error("Invalid year file name: {0:?}")]
    InvalidYearFile(PathBuf),

    /// Key cannot be mapped onto the category tree
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Key, timeframe, or header error from the bucket layer
    #[error("Bucket error: {0}")]
    Bucket(#[from] BucketError),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CatalogError::NotFound("TEST".to_string());
        assert_eq!(err.to_string(), "Not found: TEST");

        let err = CatalogError::FileAlreadyExists(PathBuf::from("/d/2016.bin"));
        assert_eq!(err.to_string(), "File is already in directory: \"/d/2016.bin\"");
    }

    #[test]
    fn test_bucket_error_conversion() {
        let bucket_err = BucketError::UnknownTimeframe("bad".to_string());
        let err: CatalogError = bucket_err.into();
        assert!(matches!(err, CatalogError::Bucket(_)));
    }
}
