//! Process-wide default caches
//!
//! One cache per value type, built on first access and kept for the life of
//! the process. Configuration comes from the file named by `TIERCACHE_CONFIG`
//! or the defaults. Prefer passing an explicitly opened [`HybridCache`] around;
//! this accessor exists for code that has nowhere to keep one.

use crate::codec::Codable;
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::storage::hybrid::HybridCache;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::any::{Any, TypeId};
use std::sync::{Arc, OnceLock};
use tracing::info;

static SHARED: OnceLock<DashMap<TypeId, Arc<dyn Any + Send + Sync>>> = OnceLock::new();

/// Get the shared cache for `V`, opening it on first use
pub fn shared<V>() -> CacheResult<Arc<HybridCache<V>>>
where
    V: Codable + Clone + Send + Sync + 'static,
{
    let registry = SHARED.get_or_init(DashMap::new);

    let cache = match registry.entry(TypeId::of::<V>()) {
        Entry::Occupied(entry) => Arc::clone(entry.get()),
        Entry::Vacant(entry) => {
            let config = CacheConfig::from_env_or_default()
                .map_err(|e| CacheError::InvalidConfig(format!("{:#}", e)))?;
            let name = shared_name::<V>();
            let cache = HybridCache::<V>::open_with_config(&name, &config.base_dir, &config)?;

            info!(
                name = %name,
                value_type = std::any::type_name::<V>(),
                base_dir = %config.base_dir.display(),
                "Opened shared cache"
            );

            let cache: Arc<dyn Any + Send + Sync> = Arc::new(cache);
            Arc::clone(entry.insert(cache).value())
        }
    };

    cache
        .downcast::<HybridCache<V>>()
        .map_err(|_| CacheError::InvalidConfig("shared cache registered under another type".to_string()))
}

/// Stable file name for the shared cache of `V`
pub fn shared_name<V: 'static>() -> String {
    let digest = Sha256::digest(std::any::type_name::<V>().as_bytes());
    format!("shared-{}", &hex::encode(digest)[..16])
}
