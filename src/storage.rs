//! On-disk directory layout of an event store.

use std::fs;
use std::path::{Path, PathBuf};

/// Manages the on-disk directory layout of a columnar event store.
///
/// The layout follows this structure:
/// ```text
/// <base_dir>/
///     records.idx             -- global chronological type-id index
///     types.idx               -- type-name-to-id registry
///     <type_name>/            -- one folder per registered event type
///         <Property>.col      -- one append-only file per column
///         <Parent>.<Child>.col  -- nested/element columns, dotted
/// ```
///
/// `StoreLayout` is cheap to clone (it wraps a single `PathBuf`) and
/// provides path helpers plus store lifecycle management (creation and
/// type-folder listing).
#[derive(Debug, Clone)]
pub struct StoreLayout {
    base_dir: PathBuf,
}

impl StoreLayout {
    /// Create a new `StoreLayout` rooted at the given base directory.
    ///
    /// # Arguments
    ///
    /// * `base_dir` - Root directory for all event store data.
    ///   The directory does not need to exist yet; it will be created
    ///   lazily when [`ensure_store`](StoreLayout::ensure_store) is called.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Returns the root directory of this layout.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns the path to the global chronological index.
    ///
    /// # Returns
    ///
    /// `<base_dir>/records.idx`
    pub fn records_path(&self) -> PathBuf {
        self.base_dir.join("records.idx")
    }

    /// Returns the path to the type registry.
    ///
    /// # Returns
    ///
    /// `<base_dir>/types.idx`
    pub fn types_path(&self) -> PathBuf {
        self.base_dir.join("types.idx")
    }

    /// Returns the path to a type's column folder.
    ///
    /// # Arguments
    ///
    /// * `type_name` - The registered event type name (e.g.
    ///   `"market.Trade"`).
    ///
    /// # Returns
    ///
    /// `<base_dir>/<type_name>`
    pub fn type_dir(&self, type_name: &str) -> PathBuf {
        self.base_dir.join(type_name)
    }

    /// Ensures that the store root and both index files exist.
    ///
    /// This method is **idempotent**: existing index files are left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns `std::io::Error` if directory or file creation fails.
    pub fn ensure_store(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.base_dir)?;
        for path in [self.records_path(), self.types_path()] {
            fs::OpenOptions::new().create(true).append(true).open(path)?;
        }
        Ok(())
    }

    /// Ensures that a type's column folder exists, returning its path.
    ///
    /// # Errors
    ///
    /// Returns `std::io::Error` if directory creation fails.
    pub fn ensure_type_dir(&self, type_name: &str) -> std::io::Result<PathBuf> {
        let dir = self.type_dir(type_name);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Lists the type folders present under the store root.
    ///
    /// # Returns
    ///
    /// A sorted `Vec<String>` of type names. Returns an empty vector if
    /// the store root does not exist.
    ///
    /// # Errors
    ///
    /// Returns `std::io::Error` if reading the directory fails for a
    /// reason other than the directory not existing.
    pub fn list_type_dirs(&self) -> std::io::Result<Vec<String>> {
        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| {
                let entry = entry.ok()?;
                // Only include directories (each directory is a type's columns).
                entry
                    .file_type()
                    .ok()?
                    .is_dir()
                    .then(|| entry.file_name().to_string_lossy().into_owned())
            })
            .collect();

        names.sort();
        Ok(names)
    }
}

/// Path of one column file inside a type folder.
///
/// `prefix` is empty for top-level columns and a dotted chain
/// (`"Parent."`, `"Parent.Child."`) for columns of nested schemas.
pub(crate) fn column_file(dir: &Path, prefix: &str, property: &str) -> PathBuf {
    dir.join(format!("{prefix}{property}.col"))
}
