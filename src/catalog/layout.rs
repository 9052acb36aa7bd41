//! On-disk catalog layout
//!
//! Every catalog directory carries a `category_name` marker naming the
//! category of its children. Leaf directories are marked `Year` and hold
//! the `<year>.bin` files.

use crate::bucket::{file_size, TimeBucketInfo};
use crate::catalog::error::{CatalogError, CatalogResult};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;

/// Marker file naming the category of a directory's children
pub const CATEGORY_FILE_NAME: &str = "category_name";

/// Category of the directories holding year files
pub const YEAR_CATEGORY: &str = "Year";

/// Extension of year files
pub const DATA_FILE_EXTENSION: &str = "bin";

/// Directory name skipped during scans
pub const METADATA_DIR_NAME: &str = "metadata.db";

/// Read the category marker of `dir`
pub fn read_category_file(dir: &Path) -> CatalogResult<String> {
    let marker = dir.join(CATEGORY_FILE_NAME);
    std::fs::read_to_string(&marker).map_err(|e| CatalogError::CategoryFileNotFound {
        path: marker,
        reason: e.to_string(),
    })
}

/// Write the category marker of `dir`, or verify an existing one matches
pub fn write_category_file(category: &str, dir: &Path) -> CatalogResult<()> {
    let marker = dir.join(CATEGORY_FILE_NAME);

    if marker.exists() {
        let found = std::fs::read_to_string(&marker)?;
        if found != category {
            return Err(CatalogError::CategoryMismatch {
                path: dir.to_path_buf(),
                requested: category.to_string(),
                found,
            });
        }
        return Ok(());
    }

    std::fs::write(&marker, category)?;
    Ok(())
}

/// Create a year file from a descriptor: write its header and size it for
/// the whole year
///
/// An existing file is reported as [`CatalogError::FileAlreadyExists`] and
/// left untouched.
pub fn create_year_file(info: &TimeBucketInfo) -> CatalogResult<()> {
    let path = &info.path;

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => CatalogError::FileAlreadyExists(path.clone()),
            _ => CatalogError::UnableToCreateFile {
                path: path.clone(),
                reason: e.to_string(),
            },
        })?;

    info.write_header(&mut file)
        .map_err(|e| CatalogError::UnableToWriteHeader {
            path: path.clone(),
            reason: e.to_string(),
        })?;

    let size = file_size(info.timeframe()?, info.year as i32, info.record_length()?);
    file.set_len(size)
        .map_err(|e| CatalogError::UnableToCreateFile {
            path: path.clone(),
            reason: e.to_string(),
        })?;

    tracing::debug!("Created year file {:?} ({} bytes)", path, size);
    Ok(())
}

/// Remove a catalog directory and everything below it; a directory that is
/// already gone is not an error
pub fn remove_dir_files(dir: &Path) -> CatalogResult<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Whether `path` names a year file
pub fn is_data_file(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == DATA_FILE_EXTENSION)
}

/// Parse the year out of a `<year>.bin` file name
pub fn year_from_file_name(path: &Path) -> CatalogResult<i16> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.parse().ok())
        .ok_or_else(|| CatalogError::InvalidYearFile(path.to_path_buf()))
}
