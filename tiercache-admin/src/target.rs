use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tiercache_core::{CacheConfig, PersistentStore, STORE_EXTENSION};
use tracing::debug;

/// An existing cache file opened for administration
pub struct StoreTarget {
    pub name: String,
    pub path: PathBuf,
    pub store: PersistentStore,
}

impl StoreTarget {
    /// Open `<dir>/<name>.sqlite`; never creates a new cache
    pub fn open(dir: &Path, name: &str, config: &CacheConfig) -> Result<Self> {
        let path = store_path(dir, name);
        if !path.is_file() {
            bail!("No cache named '{}' in {}", name, dir.display());
        }

        let store = PersistentStore::open(&path, &config.storage)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        debug!("Opened {}", path.display());

        Ok(Self {
            name: name.to_string(),
            path,
            store,
        })
    }
}

pub fn store_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, STORE_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_cache_is_not_created() {
        let temp_dir = TempDir::new().unwrap();
        let result = StoreTarget::open(temp_dir.path(), "absent", &CacheConfig::default());

        assert!(result.is_err());
        assert!(!store_path(temp_dir.path(), "absent").exists());
    }
}
