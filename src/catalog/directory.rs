//! In-memory mirror of the on-disk category tree
//!
//! Each [`Directory`] node guards its own state with a read/write lock. The
//! root additionally owns a flat index from directory path to every node
//! that holds year files, so that a file path resolves to its owning node
//! without walking the tree.
//!
//! # Locking
//!
//! ```text
//! traversal (recurse):  read(root) → read(child) → read(grandchild) ...
//!                       ancestor locks are held while children are visited
//!
//! add/remove bucket:    write(root) for the whole operation
//!
//! add_file:             read(leaf) → create file → write(leaf)
//! ```
//!
//! Locks are always taken top-down, so traversals and structural mutations
//! cannot deadlock against each other. The flat index is a sharded
//! concurrent map and is safe to touch without any node lock.

use crate::bucket::{DataShape, TimeBucketInfo, TimeBucketKey};
use crate::catalog::error::{CatalogError, CatalogResult};
use crate::catalog::layout::{
    self, is_data_file, year_from_file_name, CATEGORY_FILE_NAME, METADATA_DIR_NAME, YEAR_CATEGORY,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

/// Directory path → node owning the year files in that directory
///
/// Entries are non-owning; a node detached from the tree can no longer be
/// reached through a stale entry.
type FlatIndex = DashMap<PathBuf, Weak<Directory>>;

/// Item name given to the node a catalog is loaded from
const ROOT_ITEM_NAME: &str = ".";

/// A node of the catalog tree
pub struct Directory {
    /// Absolute path of this directory
    path: PathBuf,
    inner: RwLock<DirectoryInner>,
}

#[derive(Default)]
struct DirectoryInner {
    /// Instance of the parent's category (e.g. "AAPL" under "Symbol")
    item_name: String,
    /// Category of this node's children, from its `category_name` marker
    category: String,
    /// Children keyed by item name
    sub_dirs: BTreeMap<String, Arc<Directory>>,
    /// Year files keyed by full path; only set on leaf nodes
    data_files: Option<BTreeMap<PathBuf, Arc<TimeBucketInfo>>>,
    /// Memoized categories at and below this node
    category_cache: Option<HashSet<String>>,
    /// Bumped whenever `category_cache` is invalidated
    cache_epoch: u64,
    /// Only set on the root of a loaded tree
    flat_index: Option<Arc<FlatIndex>>,
}

impl Directory {
    /// Load the catalog under `root`, treating a root without a category
    /// marker as an empty catalog
    ///
    /// Any other failure, including a missing marker below the root, is
    /// returned to the caller.
    pub fn open(root: impl AsRef<Path>) -> CatalogResult<Arc<Self>> {
        let root = root.as_ref();
        if !root.join(CATEGORY_FILE_NAME).exists() {
            tracing::warn!(
                "No {} file under {:?}, starting with an empty catalog",
                CATEGORY_FILE_NAME,
                root
            );
            return Ok(Self::empty(root));
        }
        Self::load(root)
    }

    /// Load the catalog under `root`
    ///
    /// Fails with [`CatalogError::CategoryFileNotFound`] if any directory,
    /// the root included, lacks a category marker.
    ///
    /// The scan assumes no concurrent writers under `root`.
    pub fn load(root: impl AsRef<Path>) -> CatalogResult<Arc<Self>> {
        let root = root.as_ref();
        let index = Arc::new(FlatIndex::new());

        let dir = Self::scan(root, ROOT_ITEM_NAME.to_string(), &index)?;
        tracing::debug!(
            "Loaded catalog at {:?}: {} leaf directories",
            root,
            index.len()
        );

        dir.inner.write().flat_index = Some(index);
        Ok(dir)
    }

    /// A category-less catalog with no children
    pub fn empty(root: impl AsRef<Path>) -> Arc<Self> {
        Arc::new(Self {
            path: root.as_ref().to_path_buf(),
            inner: RwLock::new(DirectoryInner {
                item_name: ROOT_ITEM_NAME.to_string(),
                flat_index: Some(Arc::new(FlatIndex::new())),
                ..Default::default()
            }),
        })
    }

    fn scan(path: &Path, item_name: String, index: &FlatIndex) -> CatalogResult<Arc<Self>> {
        let category = layout::read_category_file(path)?;

        let mut sub_dirs = BTreeMap::new();
        let mut data_files = BTreeMap::new();

        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let leaf_path = entry.path();

            if entry.file_type()?.is_dir() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name == METADATA_DIR_NAME {
                    continue;
                }
                let child = Self::scan(&leaf_path, name.clone(), index)?;
                sub_dirs.insert(name, child);
            } else if is_data_file(&leaf_path) {
                let year = year_from_file_name(&leaf_path)?;
                let info = TimeBucketInfo::pending(leaf_path.clone(), year);
                data_files.insert(leaf_path, Arc::new(info));
            }
        }

        // Interior nodes never own files
        let data_files = if sub_dirs.is_empty() && !data_files.is_empty() {
            Some(data_files)
        } else {
            None
        };
        let is_leaf = data_files.is_some();

        let dir = Arc::new(Self {
            path: path.to_path_buf(),
            inner: RwLock::new(DirectoryInner {
                item_name,
                category,
                sub_dirs,
                data_files,
                category_cache: None,
                cache_epoch: 0,
                flat_index: None,
            }),
        });

        if is_leaf {
            index.insert(path.to_path_buf(), Arc::downgrade(&dir));
        }
        Ok(dir)
    }

    // ==================== Structural Mutations ====================

    /// Add a (possibly new) time bucket below this root directory
    ///
    /// Creates any missing directories along the key's item path, writing or
    /// verifying the category marker at each level, then creates the year
    /// file described by `info`. The subtree under the key's first item is
    /// rescanned and merged into this catalog.
    ///
    /// Directories created before a failing step are left in place.
    pub fn add_time_bucket(&self, key: &TimeBucketKey, info: &TimeBucketInfo) -> CatalogResult<()> {
        key.validate()
            .map_err(|e| CatalogError::InvalidKey(e.to_string()))?;

        let mut guard = self.inner.write();

        let categories = key.categories();
        let items = key.items();

        let mut dir = self.path.clone();
        for (item, category) in items.iter().zip(categories.iter()) {
            let sub_dir = dir.join(item);
            if !sub_dir.exists() {
                std::fs::create_dir(&sub_dir)?;
            }
            layout::write_category_file(category, &dir)?;
            dir = sub_dir;
        }
        layout::write_category_file(YEAR_CATEGORY, &dir)?;

        layout::create_year_file(info)?;

        // An empty catalog adopts the key's top-level category
        if guard.category.is_empty() {
            guard.category = categories[0].to_string();
        }

        let child_name = items[0];
        let child = Self::load(self.path.join(child_name))?;
        Self::add_subdir(&mut guard, child, child_name);

        tracing::info!("Added time bucket {} ({} year {})", key, info.path.display(), info.year);
        Ok(())
    }

    /// Remove the bucket named by `key` and prune the directories that are
    /// left without children
    ///
    /// Fails with [`CatalogError::NotFound`] if any level of the key is
    /// missing, so removing the same key twice fails the second time.
    pub fn remove_time_bucket(&self, key: &TimeBucketKey) -> CatalogResult<()> {
        key.validate()
            .map_err(|e| CatalogError::InvalidKey(e.to_string()))?;

        let items = key.items();
        let mut guard = self.inner.write();
        let index = guard.flat_index.clone();

        let not_found = |item: &str| {
            CatalogError::NotFound(format!("unable to find level item {} of {}", item, key))
        };

        let mut tree: Vec<Arc<Directory>> = Vec::with_capacity(items.len());
        let first = guard
            .sub_dirs
            .get(items[0])
            .cloned()
            .ok_or_else(|| not_found(items[0]))?;
        tree.push(first);
        for &item in &items[1..] {
            let next = tree[tree.len() - 1]
                .get_sub_dir_with_item_name(item)
                .ok_or_else(|| not_found(item))?;
            tree.push(next);
        }

        let end = tree.len() - 1;
        let mut deleted = vec![false; tree.len()];
        for i in (0..=end).rev() {
            if i == end {
                tree[i].remove_files()?;
                deleted[i] = true;
            } else if deleted[i + 1] {
                let child_name = tree[i + 1].get_name();
                tree[i].remove_sub_dir(&child_name, index.as_deref());
            }
            if !tree[i].dir_has_sub_dirs() {
                tree[i].remove_files()?;
                deleted[i] = true;
            }
        }

        if deleted[0] {
            tree[0].remove_files()?;
            Self::detach_child(&mut guard, items[0], index.as_deref());
        }

        tracing::info!("Removed time bucket {}", key);
        Ok(())
    }

    /// Create the year file for `year` in this leaf directory, using any
    /// existing year file as the schema template
    ///
    /// Returns the tracked descriptor if the year is already present, so
    /// concurrent callers adding the same year share one descriptor. A file
    /// found on disk but not yet tracked is adopted as is.
    pub fn add_file(&self, year: i16) -> CatalogResult<Arc<TimeBucketInfo>> {
        let mut guard = self.inner.write();
        let files = guard
            .data_files
            .as_mut()
            .ok_or_else(|| CatalogError::SubdirectoryDoesNotContainFiles(self.path.clone()))?;

        let new_info = match files.values().next() {
            Some(template) => template.for_year(year)?,
            None => return Err(CatalogError::SubdirectoryDoesNotContainFiles(self.path.clone())),
        };
        if let Some(existing) = files.get(&new_info.path) {
            return Ok(Arc::clone(existing));
        }

        match layout::create_year_file(&new_info) {
            Ok(()) => tracing::debug!("Added year file {:?}", new_info.path),
            Err(CatalogError::FileAlreadyExists(path)) => {
                tracing::debug!("Tracking existing year file {:?}", path)
            }
            Err(e) => return Err(e),
        }

        let info = files
            .entry(new_info.path.clone())
            .or_insert_with(|| Arc::new(new_info));
        Ok(Arc::clone(info))
    }

    /// Resolve the leaf owning `full_file_path` and add a year file there
    pub fn get_sub_directory_and_add_file(
        &self,
        full_file_path: &Path,
        year: i16,
    ) -> CatalogResult<Arc<TimeBucketInfo>> {
        let guard = self.inner.write();
        let sub_dir = Self::lookup_owning(guard.flat_index.as_deref(), full_file_path)?;

        if std::ptr::eq(Arc::as_ptr(&sub_dir), self) {
            drop(guard);
            return sub_dir.add_file(year);
        }
        sub_dir.add_file(year)
    }

    /// Attach a freshly loaded subtree, merging its flat index into ours
    fn add_subdir(parent: &mut DirectoryInner, sub_dir: Arc<Directory>, item_name: &str) {
        {
            let mut child = sub_dir.inner.write();
            child.item_name = item_name.to_string();
            if let (Some(child_index), Some(index)) = (child.flat_index.take(), &parent.flat_index) {
                for entry in child_index.iter() {
                    index.insert(entry.key().clone(), entry.value().clone());
                }
            }
        }
        Self::invalidate_category_cache(parent);
        parent.sub_dirs.insert(item_name.to_string(), sub_dir);
    }

    fn remove_sub_dir(&self, item_name: &str, index: Option<&FlatIndex>) {
        let mut guard = self.inner.write();
        Self::detach_child(&mut guard, item_name, index);
    }

    fn detach_child(parent: &mut DirectoryInner, item_name: &str, index: Option<&FlatIndex>) {
        if let Some(sub_dir) = parent.sub_dirs.remove(item_name) {
            if let Some(index) = index {
                index.retain(|path, _| !path.starts_with(&sub_dir.path));
            }
        }
        Self::invalidate_category_cache(parent);
    }

    fn invalidate_category_cache(dir: &mut DirectoryInner) {
        dir.category_cache = None;
        dir.cache_epoch = dir.cache_epoch.wrapping_add(1);
    }

    fn remove_files(&self) -> CatalogResult<()> {
        let _guard = self.inner.write();
        layout::remove_dir_files(&self.path)
    }

    // ==================== Lookup ====================

    fn lookup_owning(index: Option<&FlatIndex>, full_file_path: &Path) -> CatalogResult<Arc<Directory>> {
        let dir_path = full_file_path.parent().unwrap_or(full_file_path);
        index
            .and_then(|index| index.get(dir_path).and_then(|entry| entry.value().upgrade()))
            .ok_or_else(|| {
                CatalogError::NotFound(format!(
                    "directory path {} not found in catalog",
                    full_file_path.display()
                ))
            })
    }

    /// The leaf directory owning the year file at `full_file_path`, via the
    /// flat index
    pub fn get_owning_subdirectory(&self, full_file_path: &Path) -> CatalogResult<Arc<Directory>> {
        let guard = self.inner.read();
        Self::lookup_owning(guard.flat_index.as_deref(), full_file_path)
    }

    /// Latest year file of the bucket named by `key`
    pub fn get_latest_time_bucket_info_from_key(
        &self,
        key: &TimeBucketKey,
    ) -> CatalogResult<Arc<TimeBucketInfo>> {
        // Any file name works; only its directory is looked up
        let probe = key.path_to_year_files(&self.path).join("1970.bin");
        self.get_owning_subdirectory(&probe)?.get_latest_year_file()
    }

    /// Latest year file in the directory holding `full_file_path`
    pub fn get_latest_time_bucket_info_from_full_file_path(
        &self,
        full_file_path: &Path,
    ) -> CatalogResult<Arc<TimeBucketInfo>> {
        self.get_owning_subdirectory(full_file_path)?
            .get_latest_year_file()
    }

    /// Columns of the bucket named by `key`, from its latest year file
    pub fn get_data_shapes(&self, key: &TimeBucketKey) -> CatalogResult<Vec<DataShape>> {
        let info = self.get_latest_time_bucket_info_from_key(key)?;
        Ok(info.data_shapes()?)
    }

    /// Copy of the descriptor whose path is `path`
    pub fn path_to_time_bucket_info(&self, path: &Path) -> CatalogResult<TimeBucketInfo> {
        let mut found: Option<Arc<TimeBucketInfo>> = None;
        self.recurse(&mut |dir| {
            if found.is_some() {
                return;
            }
            if let Some(info) = dir.data_files.as_ref().and_then(|files| files.get(path)) {
                found = Some(Arc::clone(info));
            }
        });

        match found {
            Some(info) => Ok(info.deep_copy()?),
            None => Err(CatalogError::NotFound(path.display().to_string())),
        }
    }

    /// The year file with the highest year in this leaf
    pub fn get_latest_year_file(&self) -> CatalogResult<Arc<TimeBucketInfo>> {
        let guard = self.inner.read();
        guard
            .data_files
            .as_ref()
            .and_then(|files| files.values().max_by_key(|info| info.year).cloned())
            .ok_or_else(|| CatalogError::SubdirectoryDoesNotContainFiles(self.path.clone()))
    }

    /// Year files directly in this directory
    pub fn get_time_bucket_info_slice(&self) -> Vec<Arc<TimeBucketInfo>> {
        self.inner
            .read()
            .data_files
            .as_ref()
            .map(|files| files.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_list_of_sub_dirs(&self) -> Vec<Arc<Directory>> {
        self.inner.read().sub_dirs.values().cloned().collect()
    }

    pub fn get_sub_dir_with_item_name(&self, item_name: &str) -> Option<Arc<Directory>> {
        self.inner.read().sub_dirs.get(item_name).cloned()
    }

    pub fn dir_has_sub_dirs(&self) -> bool {
        !self.inner.read().sub_dirs.is_empty()
    }

    pub fn dir_has_data_files(&self) -> bool {
        self.inner.read().data_files.is_some()
    }

    pub fn get_name(&self) -> String {
        self.inner.read().item_name.clone()
    }

    pub fn get_path(&self) -> &Path {
        &self.path
    }

    /// Category of this directory's children
    pub fn get_category(&self) -> String {
        self.inner.read().category.clone()
    }

    /// Number of leaf directories registered in the flat index
    pub fn indexed_directory_count(&self) -> usize {
        self.inner
            .read()
            .flat_index
            .as_ref()
            .map(|index| index.len())
            .unwrap_or(0)
    }

    // ==================== Aggregation ====================

    /// Categories at and below this node, memoized until the next structural
    /// change of this node
    ///
    /// Mutations deeper in the tree do not invalidate an ancestor's cache.
    /// A set computed while this node changed is returned but not memoized.
    pub fn gather_categories_from_cache(&self) -> HashSet<String> {
        let epoch = {
            let guard = self.inner.read();
            if let Some(categories) = &guard.category_cache {
                return categories.clone();
            }
            guard.cache_epoch
        };

        let mut categories = HashSet::new();
        self.recurse(&mut |dir| {
            if !dir.category.is_empty() {
                categories.insert(dir.category.clone());
            }
        });

        self.store_category_cache(epoch, &categories);
        categories
    }

    /// Memoize `categories` unless the cache was invalidated after `epoch`
    fn store_category_cache(&self, epoch: u64, categories: &HashSet<String>) -> bool {
        let mut guard = self.inner.write();
        if guard.cache_epoch != epoch {
            tracing::trace!("Discarding category set for {:?}: node changed", self.path);
            return false;
        }
        guard.category_cache = Some(categories.clone());
        true
    }

    /// Map of category → items (sub directory names, or years for the
    /// `Year` category) at and below this node
    pub fn gather_categories_and_items(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut categories: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        self.recurse(&mut |dir| {
            if dir.category.is_empty() {
                return;
            }
            let items = categories.entry(dir.category.clone()).or_default();
            for sub_dir in dir.sub_dirs.values() {
                items.insert(sub_dir.get_name());
            }
            if let Some(files) = &dir.data_files {
                items.extend(files.values().map(|info| info.year.to_string()));
            }
        });
        categories
    }

    pub fn gather_time_bucket_info(&self) -> Vec<Arc<TimeBucketInfo>> {
        let mut infos = Vec::new();
        self.recurse(&mut |dir| {
            if let Some(files) = &dir.data_files {
                infos.extend(files.values().cloned());
            }
        });
        infos
    }

    pub fn gather_file_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        self.recurse(&mut |dir| {
            if let Some(files) = &dir.data_files {
                paths.extend(files.keys().cloned());
            }
        });
        paths
    }

    /// Item names of this node and every node below it
    pub fn gather_directories(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.recurse(&mut |dir| names.push(dir.item_name.clone()));
        names
    }

    /// Bucket keys of a `Symbol/Timeframe/AttributeGroup` catalog, as
    /// `symbol/timeframe/group` strings
    pub fn list_time_bucket_key_names(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        let guard = self.inner.read();
        for (symbol, symbol_dir) in &guard.sub_dirs {
            for (timeframe, timeframe_dir) in &symbol_dir.inner.read().sub_dirs {
                for group in timeframe_dir.inner.read().sub_dirs.keys() {
                    names.insert(format!("{}/{}/{}", symbol, timeframe, group));
                }
            }
        }
        names.into_iter().collect()
    }

    /// Depth-first visit of this node and its descendants, holding each
    /// ancestor's read lock while its children are visited
    fn recurse(&self, visit: &mut dyn FnMut(&DirectoryInner)) {
        let guard = self.inner.read();
        visit(&guard);
        for sub_dir in guard.sub_dirs.values() {
            sub_dir.recurse(visit);
        }
    }
}

impl fmt::Display for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.inner.read();
        let names: Vec<String> = guard.sub_dirs.values().map(|d| d.get_name()).collect();
        write!(
            f,
            "Node: {}, Category: {}, Subdirs: {}",
            guard.item_name,
            guard.category,
            names.join(":")
        )
    }
}

impl fmt::Debug for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Directory")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{DataShape, ElementType, RecordType, Timeframe};
    use crate::test_util::{make_dummy_currency_dir, ohlcv_shapes};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::tempdir;

    fn test_bucket(root: &Path, item_key: &str, year: i16) -> (TimeBucketKey, TimeBucketInfo) {
        let key = TimeBucketKey::new(item_key, "Symbol/Timeframe/AttributeGroup");
        let tf = key.timeframe().unwrap();
        let info = TimeBucketInfo::new(
            &tf,
            &key.path_to_year_files(root),
            "Test item",
            year,
            &ohlcv_shapes(),
            RecordType::Fixed,
        );
        (key, info)
    }

    #[test]
    fn test_load_counts() {
        let dir = tempdir().unwrap();
        make_dummy_currency_dir(dir.path());
        let catalog = Directory::load(dir.path()).unwrap();

        assert_eq!(catalog.indexed_directory_count(), 18);
        assert_eq!(catalog.gather_categories_from_cache().len(), 4);
        assert_eq!(catalog.gather_categories_and_items().len(), 4);
        assert_eq!(catalog.gather_directories().len(), 40);
        assert_eq!(catalog.gather_file_paths().len(), 54);
        assert_eq!(catalog.gather_time_bucket_info().len(), 54);
        assert_eq!(catalog.get_category(), "Symbol");
        assert_eq!(catalog.list_time_bucket_key_names().len(), 18);
    }

    #[test]
    fn test_scanned_files_are_pending() {
        let dir = tempdir().unwrap();
        make_dummy_currency_dir(dir.path());
        let catalog = Directory::load(dir.path()).unwrap();

        let infos = catalog.gather_time_bucket_info();
        assert!(infos.iter().all(|info| !info.is_read()));
        // Header is read on first use
        assert_eq!(infos[0].data_shapes().unwrap().len(), 4);
        assert!(infos[0].is_read());
    }

    #[test]
    fn test_metadata_dir_is_skipped() {
        let dir = tempdir().unwrap();
        make_dummy_currency_dir(dir.path());
        std::fs::create_dir(dir.path().join(METADATA_DIR_NAME)).unwrap();

        let catalog = Directory::load(dir.path()).unwrap();
        assert_eq!(catalog.gather_directories().len(), 40);
    }

    #[test]
    fn test_missing_marker() {
        let dir = tempdir().unwrap();

        let err = Directory::load(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::CategoryFileNotFound { .. }));

        let catalog = Directory::open(dir.path()).unwrap();
        assert_eq!(catalog.get_category(), "");
        assert!(!catalog.dir_has_sub_dirs());
        assert!(catalog.gather_categories_from_cache().is_empty());
    }

    #[test]
    fn test_missing_marker_below_root_is_fatal() {
        let dir = tempdir().unwrap();
        make_dummy_currency_dir(dir.path());
        std::fs::create_dir(dir.path().join("STRAY")).unwrap();

        let err = Directory::open(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::CategoryFileNotFound { .. }));
    }

    #[test]
    fn test_path_to_time_bucket_info() {
        let dir = tempdir().unwrap();
        make_dummy_currency_dir(dir.path());
        let catalog = Directory::load(dir.path()).unwrap();

        let err = catalog.path_to_time_bucket_info(Path::new("nil")).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));

        let path = dir.path().join("EURUSD/1Min/OHLC/2001.bin");
        let info = catalog.path_to_time_bucket_info(&path).unwrap();
        assert_eq!(info.path, path);
        assert_eq!(info.year, 2001);
        assert!(info.is_read());
    }

    #[test]
    fn test_owning_subdirectory_and_latest_year() {
        let dir = tempdir().unwrap();
        make_dummy_currency_dir(dir.path());
        let catalog = Directory::load(dir.path()).unwrap();

        let path = dir.path().join("USDJPY/5Min/OHLC/2000.bin");
        let sub_dir = catalog.get_owning_subdirectory(&path).unwrap();
        assert_eq!(sub_dir.get_path(), dir.path().join("USDJPY/5Min/OHLC"));
        assert_eq!(sub_dir.get_name(), "OHLC");
        assert_eq!(sub_dir.get_category(), "Year");
        assert_eq!(sub_dir.get_latest_year_file().unwrap().year, 2002);

        let missing = dir.path().join("USDJPY/5Min/2000.bin");
        assert!(matches!(
            catalog.get_owning_subdirectory(&missing),
            Err(CatalogError::NotFound(_))
        ));

        // Interior nodes hold no files
        let symbol = catalog.get_sub_dir_with_item_name("USDJPY").unwrap();
        assert!(!symbol.dir_has_data_files());
        assert!(matches!(
            symbol.get_latest_year_file(),
            Err(CatalogError::SubdirectoryDoesNotContainFiles(_))
        ));
        assert!(matches!(
            symbol.add_file(2010),
            Err(CatalogError::SubdirectoryDoesNotContainFiles(_))
        ));
    }

    #[test]
    fn test_latest_from_key_and_data_shapes() {
        let dir = tempdir().unwrap();
        make_dummy_currency_dir(dir.path());
        let catalog = Directory::load(dir.path()).unwrap();

        let key = TimeBucketKey::with_default_schema("NZDUSD/1H/OHLC");
        let info = catalog.get_latest_time_bucket_info_from_key(&key).unwrap();
        assert_eq!(info.year, 2002);
        assert_eq!(info.intervals_per_day().unwrap(), 24);

        let shapes = catalog.get_data_shapes(&key).unwrap();
        let names: Vec<&str> = shapes.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Open", "High", "Low", "Close"]);

        let missing = TimeBucketKey::with_default_schema("NZDUSD/2H/OHLC");
        assert!(catalog.get_latest_time_bucket_info_from_key(&missing).is_err());
    }

    #[test]
    fn test_add_file() {
        let dir = tempdir().unwrap();
        make_dummy_currency_dir(dir.path());
        let catalog = Directory::load(dir.path()).unwrap();

        let file_path = catalog.gather_file_paths()[0].clone();
        let sub_dir = catalog.get_owning_subdirectory(&file_path).unwrap();

        let first = sub_dir.add_file(2016).unwrap();
        assert_eq!(first.year, 2016);
        assert!(first.path.exists());
        assert_eq!(sub_dir.get_latest_year_file().unwrap().year, 2016);

        // Same year again returns the same descriptor
        let second = sub_dir.add_file(2016).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(sub_dir.get_time_bucket_info_slice().len(), 4);
    }

    #[test]
    fn test_get_sub_directory_and_add_file() {
        let dir = tempdir().unwrap();
        make_dummy_currency_dir(dir.path());
        let catalog = Directory::load(dir.path()).unwrap();

        let path = dir.path().join("EURUSD/1D/OHLC/2000.bin");
        let info = catalog.get_sub_directory_and_add_file(&path, 2003).unwrap();
        assert_eq!(info.path, dir.path().join("EURUSD/1D/OHLC/2003.bin"));
        assert_eq!(catalog.gather_file_paths().len(), 55);

        let bogus = dir.path().join("EURUSD/7D/OHLC/2000.bin");
        assert!(catalog.get_sub_directory_and_add_file(&bogus, 2003).is_err());
    }

    #[test]
    fn test_add_and_remove_data_item() {
        let dir = tempdir().unwrap();
        make_dummy_currency_dir(dir.path());
        let catalog = Directory::load(dir.path()).unwrap();

        let (key, info) = test_bucket(dir.path(), "TEST/1Min/OHLCV", 2016);
        catalog.add_time_bucket(&key, &info).unwrap();

        let cat_list = catalog.gather_categories_and_items();
        assert!(cat_list["Symbol"].contains("TEST"));

        let old_path = dir.path().join("EURUSD/1Min/OHLC/2000.bin");
        assert!(catalog.get_owning_subdirectory(&old_path).is_ok());

        let new_path = dir.path().join("TEST/1Min/OHLCV/2016.bin");
        let owner = catalog.get_owning_subdirectory(&new_path).unwrap();
        assert!(owner.gather_file_paths().contains(&new_path));

        catalog.remove_time_bucket(&key).unwrap();

        let cat_list = catalog.gather_categories_and_items();
        assert!(!cat_list["Symbol"].contains("TEST"));
        assert!(!new_path.exists());
        assert!(!dir.path().join("TEST/1Min/OHLCV").exists());
        assert!(!dir.path().join("TEST/1Min").exists());
        assert!(!dir.path().join("TEST").exists());
        assert!(dir.path().join("EURUSD").exists());
        assert!(catalog.get_owning_subdirectory(&new_path).is_err());
        assert_eq!(catalog.indexed_directory_count(), 18);
        assert_eq!(catalog.gather_file_paths().len(), 54);
    }

    #[test]
    fn test_remove_keeps_siblings() {
        let dir = tempdir().unwrap();
        make_dummy_currency_dir(dir.path());
        let catalog = Directory::load(dir.path()).unwrap();

        let key = TimeBucketKey::with_default_schema("EURUSD/1Min/OHLC");
        catalog.remove_time_bucket(&key).unwrap();

        // Only the 1Min branch goes; the symbol still has five timeframes
        assert!(!dir.path().join("EURUSD/1Min").exists());
        assert!(dir.path().join("EURUSD/5Min/OHLC/2000.bin").exists());

        let symbol = catalog.get_sub_dir_with_item_name("EURUSD").unwrap();
        assert_eq!(symbol.get_list_of_sub_dirs().len(), 5);
        assert!(symbol.get_sub_dir_with_item_name("1Min").is_none());
        assert_eq!(catalog.indexed_directory_count(), 17);
        assert_eq!(catalog.gather_file_paths().len(), 51);
    }

    #[test]
    fn test_empty_root_and_repeated_operations() {
        let dir = tempdir().unwrap();
        let catalog = Directory::open(dir.path()).unwrap();

        let (key, info) = test_bucket(dir.path(), "TEST/1Min/OHLCV", 2016);
        catalog.add_time_bucket(&key, &info).unwrap();

        assert_eq!(catalog.get_category(), "Symbol");
        assert!(catalog.gather_categories_and_items()["Symbol"].contains("TEST"));
        assert!(dir.path().join("TEST/1Min/OHLCV/2016.bin").exists());
        assert!(dir.path().join("TEST/1Min/OHLCV").exists());
        assert!(dir.path().join("TEST/1Min").exists());

        let (key2, info2) = test_bucket(dir.path(), "TEST2/1Min/OHLCV", 2016);
        catalog.add_time_bucket(&key2, &info2).unwrap();
        assert!(catalog.gather_categories_and_items()["Symbol"].contains("TEST2"));

        // Adding the same bucket twice fails on the existing file
        assert!(matches!(
            catalog.add_time_bucket(&key2, &info2),
            Err(CatalogError::FileAlreadyExists(_))
        ));

        // Remove and re-add works
        catalog.remove_time_bucket(&key2).unwrap();
        catalog.add_time_bucket(&key2, &info2).unwrap();

        // Second removal of the same key fails
        catalog.remove_time_bucket(&key2).unwrap();
        assert!(matches!(
            catalog.remove_time_bucket(&key2),
            Err(CatalogError::NotFound(_))
        ));
        assert!(dir.path().join("TEST").exists());
    }

    #[test]
    fn test_category_mismatch_on_add() {
        let dir = tempdir().unwrap();
        make_dummy_currency_dir(dir.path());
        let catalog = Directory::load(dir.path()).unwrap();

        let key = TimeBucketKey::new("EURUSD/1Min/OHLCV", "Symbol/Resolution/AttributeGroup");
        let tf = Timeframe::parse("1Min").unwrap();
        let info = TimeBucketInfo::new(
            &tf,
            &key.path_to_year_files(dir.path()),
            "",
            2016,
            &ohlcv_shapes(),
            RecordType::Fixed,
        );

        assert!(matches!(
            catalog.add_time_bucket(&key, &info),
            Err(CatalogError::CategoryMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_key_rejected_before_disk() {
        let dir = tempdir().unwrap();
        let catalog = Directory::open(dir.path()).unwrap();

        let key = TimeBucketKey::new("TEST/1Min", "Symbol/Timeframe/AttributeGroup");
        let tf = Timeframe::parse("1Min").unwrap();
        let shapes = DataShape::vector(&["Close"], &[ElementType::Float32]);
        let info = TimeBucketInfo::new(&tf, &dir.path().join("TEST/1Min"), "", 2016, &shapes, RecordType::Fixed);

        assert!(matches!(
            catalog.add_time_bucket(&key, &info),
            Err(CatalogError::InvalidKey(_))
        ));
        assert!(!dir.path().join("TEST").exists());
    }

    #[test]
    fn test_key_escaping_root_rejected() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir(&root).unwrap();
        let catalog = Directory::open(&root).unwrap();

        let key = TimeBucketKey::new("../ESC/1Min", "Symbol/Timeframe/AttributeGroup");
        let tf = Timeframe::parse("1Min").unwrap();
        let info = TimeBucketInfo::new(
            &tf,
            &key.path_to_year_files(&root),
            "",
            2016,
            &ohlcv_shapes(),
            RecordType::Fixed,
        );

        assert!(matches!(
            catalog.add_time_bucket(&key, &info),
            Err(CatalogError::InvalidKey(_))
        ));
        assert!(matches!(
            catalog.remove_time_bucket(&key),
            Err(CatalogError::InvalidKey(_))
        ));

        // Nothing written beside or inside the root
        assert!(!dir.path().join("ESC").exists());
        assert!(!dir.path().join(CATEGORY_FILE_NAME).exists());
        assert!(!root.join(CATEGORY_FILE_NAME).exists());
        assert!(catalog.get_list_of_sub_dirs().is_empty());
        assert_eq!(catalog.get_category(), "");
    }

    #[test]
    fn test_category_cache_tracks_mutations() {
        let dir = tempdir().unwrap();
        let catalog = Directory::open(dir.path()).unwrap();
        assert!(catalog.gather_categories_from_cache().is_empty());

        let (key, info) = test_bucket(dir.path(), "TEST/1Min/OHLCV", 2016);
        catalog.add_time_bucket(&key, &info).unwrap();

        let categories = catalog.gather_categories_from_cache();
        assert_eq!(categories.len(), 4);
        assert!(categories.contains("AttributeGroup"));
        assert!(categories.contains("Year"));

        catalog.remove_time_bucket(&key).unwrap();
        let categories = catalog.gather_categories_from_cache();
        assert_eq!(categories.len(), 1);
        assert!(categories.contains("Symbol"));
    }

    #[test]
    fn test_ancestor_cache_survives_deep_removal() {
        let dir = tempdir().unwrap();
        let catalog = Directory::open(dir.path()).unwrap();
        let tf = Timeframe::parse("1Min").unwrap();

        let bar_key = TimeBucketKey::new("A/1Min/OHLC", "Symbol/Timeframe/AttributeGroup");
        let venue_key = TimeBucketKey::new("A/5Min/NYSE", "Symbol/Timeframe/Venue");
        for key in [&bar_key, &venue_key] {
            let info = TimeBucketInfo::new(
                &tf,
                &key.path_to_year_files(dir.path()),
                "",
                2016,
                &ohlcv_shapes(),
                RecordType::Fixed,
            );
            catalog.add_time_bucket(key, &info).unwrap();
        }

        let symbol = catalog.get_sub_dir_with_item_name("A").unwrap();
        assert!(catalog.gather_categories_from_cache().contains("Venue"));
        assert!(symbol.gather_categories_from_cache().contains("Venue"));

        catalog.remove_time_bucket(&venue_key).unwrap();

        // The symbol lost a child and recomputes; the root was not mutated
        // and keeps its memoized set
        assert!(!symbol.gather_categories_from_cache().contains("Venue"));
        assert!(catalog.gather_categories_from_cache().contains("Venue"));
        assert!(!catalog.gather_categories_and_items().contains_key("Venue"));
    }

    #[test]
    fn test_stale_category_set_is_not_memoized() {
        let dir = tempdir().unwrap();
        let catalog = Directory::open(dir.path()).unwrap();

        let (key, info) = test_bucket(dir.path(), "TEST/1Min/OHLCV", 2016);
        catalog.add_time_bucket(&key, &info).unwrap();

        // A set computed before a concurrent add lands
        let epoch = catalog.inner.read().cache_epoch;
        let stale: HashSet<String> = ["Symbol".to_string()].into_iter().collect();

        let (key2, info2) = test_bucket(dir.path(), "TEST2/1Min/OHLCV", 2016);
        catalog.add_time_bucket(&key2, &info2).unwrap();

        assert!(!catalog.store_category_cache(epoch, &stale));
        assert_eq!(catalog.gather_categories_from_cache().len(), 4);

        let epoch = catalog.inner.read().cache_epoch;
        catalog.inner.write().category_cache = None;
        assert!(catalog.store_category_cache(epoch, &stale));
        assert_eq!(catalog.gather_categories_from_cache(), stale);
    }

    #[test]
    fn test_display() {
        let dir = tempdir().unwrap();
        make_dummy_currency_dir(dir.path());
        let catalog = Directory::load(dir.path()).unwrap();

        assert_eq!(
            catalog.to_string(),
            "Node: ., Category: Symbol, Subdirs: EURUSD:NZDUSD:USDJPY"
        );
    }

    #[test]
    fn test_concurrent_readers_and_add_file() {
        let dir = tempdir().unwrap();
        make_dummy_currency_dir(dir.path());
        let catalog = Directory::load(dir.path()).unwrap();

        let leaf = catalog
            .get_owning_subdirectory(&dir.path().join("EURUSD/1D/OHLC/2000.bin"))
            .unwrap();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..20 {
                        assert!(catalog.gather_file_paths().len() >= 54);
                        assert_eq!(catalog.gather_categories_from_cache().len(), 4);
                    }
                });
            }
            for year in 2003..2007 {
                let leaf = Arc::clone(&leaf);
                s.spawn(move || {
                    leaf.add_file(year).unwrap();
                });
            }
        });

        assert_eq!(catalog.gather_file_paths().len(), 58);
    }

    #[test]
    fn test_concurrent_add_file_same_year() {
        let dir = tempdir().unwrap();
        make_dummy_currency_dir(dir.path());
        let catalog = Directory::load(dir.path()).unwrap();

        let leaf = catalog
            .get_owning_subdirectory(&dir.path().join("EURUSD/1D/OHLC/2000.bin"))
            .unwrap();

        let added: Vec<Arc<TimeBucketInfo>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| leaf.add_file(2010).unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let tracked = leaf.get_latest_year_file().unwrap();
        assert_eq!(tracked.year, 2010);
        assert!(added.iter().all(|info| Arc::ptr_eq(info, &tracked)));
        assert_eq!(leaf.get_time_bucket_info_slice().len(), 4);
    }

    #[test]
    fn test_add_file_adopts_untracked_file() {
        let dir = tempdir().unwrap();
        make_dummy_currency_dir(dir.path());
        let catalog = Directory::load(dir.path()).unwrap();

        let leaf = catalog
            .get_owning_subdirectory(&dir.path().join("NZDUSD/1H/OHLC/2000.bin"))
            .unwrap();
        std::fs::write(dir.path().join("NZDUSD/1H/OHLC/2011.bin"), b"").unwrap();

        let first = leaf.add_file(2011).unwrap();
        let second = leaf.add_file(2011).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(leaf.get_time_bucket_info_slice().len(), 4);
    }

    #[test]
    fn test_readers_see_whole_add_and_remove() {
        let dir = tempdir().unwrap();
        make_dummy_currency_dir(dir.path());
        let catalog = Directory::load(dir.path()).unwrap();

        let (key, info) = test_bucket(dir.path(), "TEST/1Min/OHLCV", 2016);
        let old_path = dir.path().join("EURUSD/1Min/OHLC/2000.bin");
        let new_path = dir.path().join("TEST/1Min/OHLCV/2016.bin");
        let done = AtomicBool::new(false);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..2000 {
                        if done.load(Ordering::Acquire) {
                            break;
                        }
                        let files = catalog.gather_file_paths().len();
                        assert!(files == 54 || files == 55, "partial file count {}", files);

                        let symbols = catalog.gather_categories_and_items()["Symbol"].len();
                        assert!(symbols == 3 || symbols == 4, "partial symbol count {}", symbols);

                        assert!(catalog.get_owning_subdirectory(&old_path).is_ok());
                        if let Ok(owner) = catalog.get_owning_subdirectory(&new_path) {
                            assert_eq!(owner.get_path(), dir.path().join("TEST/1Min/OHLCV"));
                        }
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..10 {
                    catalog.add_time_bucket(&key, &info).unwrap();
                    catalog.remove_time_bucket(&key).unwrap();
                }
                done.store(true, Ordering::Release);
            });
        });

        assert_eq!(catalog.gather_file_paths().len(), 54);
        assert_eq!(catalog.indexed_directory_count(), 18);
        assert!(matches!(
            catalog.get_owning_subdirectory(&new_path),
            Err(CatalogError::NotFound(_))
        ));
        assert!(catalog.path_to_time_bucket_info(&new_path).is_err());
        assert!(!dir.path().join("TEST").exists());
    }
}
