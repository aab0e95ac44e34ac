use crate::errors::OidcError;
use crate::strategy::Strategy;
use crate::types::ChannelKey;
use moka::future::Cache;
use std::future::Future;
use std::sync::Arc;

/// Strategies keyed by tenant/channel
///
/// Entries never expire: issuer metadata is assumed stable for the lifetime
/// of the process. A failed build leaves the cache untouched.
#[derive(Clone)]
pub struct StrategyCache {
    cache: Cache<ChannelKey, Arc<Strategy>>,
}

impl Default for StrategyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyCache {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().build(),
        }
    }

    pub async fn get(&self, key: &ChannelKey) -> Option<Arc<Strategy>> {
        self.cache.get(key).await
    }

    /// Return the cached strategy or run `build` and cache its result
    pub async fn get_or_try_build<F>(
        &self,
        key: ChannelKey,
        build: F,
    ) -> Result<Arc<Strategy>, OidcError>
    where
        F: Future<Output = Result<Arc<Strategy>, OidcError>>,
    {
        self.cache
            .try_get_with(key, build)
            .await
            .map_err(|e| (*e).clone())
    }

    pub async fn invalidate(&self, key: &ChannelKey) {
        self.cache.invalidate(key).await;
    }
}
