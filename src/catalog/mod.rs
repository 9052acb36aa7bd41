//! Catalog of year files
//!
//! This module provides:
//! - **directory**: [`Directory`], the concurrent in-memory category tree
//!   with its flat path index
//! - **layout**: category markers and year file creation on disk
//! - **error**: Error types

pub mod directory;
pub mod error;
pub mod layout;

pub use directory::Directory;
pub use error::{CatalogError, CatalogResult};
pub use layout::{CATEGORY_FILE_NAME, DATA_FILE_EXTENSION, METADATA_DIR_NAME, YEAR_CATEGORY};
