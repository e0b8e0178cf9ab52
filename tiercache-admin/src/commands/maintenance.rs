use anyhow::{bail, Result};
use crate::target::StoreTarget;

pub fn execute_clear(target: &StoreTarget, yes: bool) -> Result<()> {
    if !yes {
        bail!(
            "Refusing to clear '{}' without --yes ({})",
            target.name,
            target.path.display()
        );
    }

    let removed = target.store.delete_all()?;
    println!("✓ Removed {} entries from '{}'", removed, target.name);
    Ok(())
}

pub fn execute_purge_expired(target: &StoreTarget) -> Result<()> {
    let removed = target.store.delete_expired()?;
    println!("✓ Purged {} expired entries", removed);
    Ok(())
}

pub fn execute_compact(target: &StoreTarget) -> Result<()> {
    let before = target.store.stats()?.file_size_bytes;
    target.store.compact()?;
    let after = target.store.stats()?.file_size_bytes;

    println!(
        "✓ Compacted '{}': {} -> {} bytes",
        target.name, before, after
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tiercache_core::{CacheConfig, HybridCache};

    #[test]
    fn test_clear_requires_confirmation() {
        let temp_dir = TempDir::new().unwrap();
        {
            let cache = HybridCache::<u32>::open("numbers", temp_dir.path()).unwrap();
            cache.set("one", 1).unwrap();
        }
        let target = StoreTarget::open(temp_dir.path(), "numbers", &CacheConfig::default()).unwrap();

        assert!(execute_clear(&target, false).is_err());
        assert_eq!(target.store.keys().unwrap().len(), 1);

        execute_clear(&target, true).unwrap();
        assert!(target.store.keys().unwrap().is_empty());

        execute_purge_expired(&target).unwrap();
        execute_compact(&target).unwrap();
    }
}
