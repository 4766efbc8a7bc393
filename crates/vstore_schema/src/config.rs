//! Configuration for the dynamic loader.

use std::path::{Path, PathBuf};
use vstore_core::ValueId;

/// Default root under which the loader's control values live.
pub const DEFAULT_ROOT: &str = "loader";

/// Configuration of a [`DynamicLoader`](crate::DynamicLoader).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Directory relative fragment paths are resolved against.
    pub base_dir: PathBuf,
    /// Parent of the `action`, `file` and `status` control values.
    pub root: ValueId,
}

impl LoaderConfig {
    /// Creates a configuration with control values under `root`.
    pub fn new(root: ValueId) -> Self {
        Self {
            base_dir: PathBuf::from("."),
            root,
        }
    }

    /// Sets the base directory.
    #[must_use]
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Resolves a fragment path against the base directory.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::new(ValueId::parse(DEFAULT_ROOT).unwrap_or_default())
    }
}
