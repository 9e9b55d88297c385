//! Executes invalidation plans against the cache store.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{info, instrument};

use super::planner::InvalidationPlan;
use super::store::{CacheError, CacheStore};

const METRIC_INVALIDATION_TOTAL: &str = "coursehub_cache_invalidation_total";
const METRIC_INVALIDATION_MS: &str = "coursehub_cache_invalidation_ms";

/// Outcome of one executed plan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvalidationReport {
    pub keys_deleted: u64,
    pub pattern_matches: Vec<String>,
}

pub struct CacheConsumer {
    store: Arc<dyn CacheStore>,
}

impl CacheConsumer {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Delete exact keys first, then every pattern. Stops at the first failure.
    #[instrument(skip(self, plan), fields(plan = %plan))]
    pub async fn execute(&self, plan: &InvalidationPlan) -> Result<InvalidationReport, CacheError> {
        if plan.is_empty() {
            return Ok(InvalidationReport::default());
        }
        let started_at = Instant::now();

        let keys: Vec<String> = plan.keys.iter().cloned().collect();
        let keys_deleted = self.store.delete(&keys).await?;

        let mut pattern_matches = Vec::new();
        for pattern in &plan.patterns {
            pattern_matches.extend(self.store.delete_pattern(pattern).await?);
        }

        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        counter!(METRIC_INVALIDATION_TOTAL).increment(1);
        histogram!(METRIC_INVALIDATION_MS).record(elapsed_ms);

        info!(
            keys = ?plan.keys,
            patterns = ?plan.patterns,
            keys_deleted,
            pattern_deleted = pattern_matches.len(),
            elapsed_ms,
            "Cache invalidation complete"
        );

        Ok(InvalidationReport {
            keys_deleted,
            pattern_matches,
        })
    }

    pub async fn flush_all(&self) -> Result<(), CacheError> {
        self.store.flush_all().await?;
        info!("Cache flushed");
        Ok(())
    }
}
