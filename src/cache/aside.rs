//! Cache-aside reads.
//!
//! A hit is returned without touching the loader. A miss runs the loader and
//! stores its result. Cache failures never fail the read: a broken `get` counts as
//! a miss and a broken `set` is only logged.

use std::future::Future;
use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::keys::CacheKey;
use super::store::{CacheError, CacheStore};

const METRIC_HIT: &str = "coursehub_cache_hit_total";
const METRIC_MISS: &str = "coursehub_cache_miss_total";
const METRIC_ERROR: &str = "coursehub_cache_error_total";

#[derive(Clone)]
pub struct CacheAside {
    store: Arc<dyn CacheStore>,
}

impl CacheAside {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub async fn get_or_load<T, E, F, Fut>(&self, key: &CacheKey, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key_str = key.to_string();

        if let Some(value) = self.lookup::<T>(key, &key_str).await {
            counter!(METRIC_HIT, "key_kind" => key.kind()).increment(1);
            debug!(key = %key_str, "Cache hit");
            return Ok(value);
        }

        counter!(METRIC_MISS, "key_kind" => key.kind()).increment(1);
        debug!(key = %key_str, "Cache miss");

        let value = load().await?;
        if let Err(err) = self.populate(&key_str, &value).await {
            counter!(METRIC_ERROR, "op" => "set").increment(1);
            warn!(key = %key_str, error = %err, "Cache populate failed; serving loaded value");
        }
        Ok(value)
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &CacheKey, key_str: &str) -> Option<T> {
        match self.store.get(key_str).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(
                        key = %key_str,
                        key_kind = key.kind(),
                        error = %err,
                        "Cached value did not decode; treating as miss"
                    );
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                counter!(METRIC_ERROR, "op" => "get").increment(1);
                warn!(key = %key_str, error = %err, "Cache get failed; treating as miss");
                None
            }
        }
    }

    async fn populate<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let encoded = serde_json::to_string(value).map_err(|source| CacheError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.store.set(key, encoded).await
    }
}
