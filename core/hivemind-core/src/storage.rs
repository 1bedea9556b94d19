//! Storage configuration and path management.
//!
//! Every file the shell touches is resolved here so tests can point the whole
//! process at a temp directory with [`StorageConfig::with_root`].

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{HivemindError, Result};

pub const DATA_DIR_ENV: &str = "HIVEMIND_DATA_DIR";
const APP_DIR_NAME: &str = "hivemind";

/// Central configuration for all on-disk paths.
///
/// Production code uses [`StorageConfig::resolve`], which points to the
/// platform data directory (e.g. `~/.local/share/hivemind`).
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    /// Resolves the root from `HIVEMIND_DATA_DIR`, falling back to the
    /// platform data directory.
    pub fn resolve() -> Result<Self> {
        if let Some(root) = env::var_os(DATA_DIR_ENV).filter(|value| !value.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }
        let base = dirs::data_dir().ok_or(HivemindError::NoDataDir)?;
        Ok(Self::with_root(base.join(APP_DIR_NAME)))
    }

    /// Creates a StorageConfig with a custom root directory.
    /// Used for testing with temp directories.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the session document, e.g. `<root>/Desktop.json`.
    pub fn store_file(&self, store_name: &str) -> PathBuf {
        self.root.join(format!("{}.json", store_name))
    }

    /// Path to config.json (operator settings).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Socket the running instance listens on for second-launch handoffs.
    pub fn instance_socket(&self) -> PathBuf {
        self.root.join("instance.sock")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn ensure_root(&self) -> Result<()> {
        fs_err::create_dir_all(&self.root)
            .map_err(|err| HivemindError::io("creating data directory", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_hang_off_root() {
        let storage = StorageConfig::with_root(PathBuf::from("/tmp/hm"));
        assert_eq!(
            storage.store_file("Desktop"),
            PathBuf::from("/tmp/hm/Desktop.json")
        );
        assert_eq!(storage.config_file(), PathBuf::from("/tmp/hm/config.json"));
        assert_eq!(
            storage.instance_socket(),
            PathBuf::from("/tmp/hm/instance.sock")
        );
        assert_eq!(storage.logs_dir(), PathBuf::from("/tmp/hm/logs"));
    }

    #[test]
    fn ensure_root_creates_nested_dirs() {
        let temp = tempfile::tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().join("a").join("b"));
        storage.ensure_root().unwrap();
        assert!(storage.root().is_dir());
    }
}
