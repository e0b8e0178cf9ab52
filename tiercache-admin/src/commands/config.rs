use anyhow::{bail, Result};
use std::path::Path;
use tiercache_core::CacheConfig;

/// Write a configuration file populated with defaults
pub fn execute_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    CacheConfig::default().save(path)?;
    println!("✓ Wrote default configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_config_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tiercache.toml");

        execute_init_config(&path, false).unwrap();
        let loaded = CacheConfig::load(&path).unwrap();
        assert_eq!(loaded.overlay.capacity, CacheConfig::default().overlay.capacity);

        assert!(execute_init_config(&path, false).is_err());
        execute_init_config(&path, true).unwrap();
    }
}
