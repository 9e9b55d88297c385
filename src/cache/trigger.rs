//! Cache trigger service.
//!
//! Write services call this after a successful store write. Each call plans and
//! executes its own invalidation before returning, so a request that reports
//! success has already deleted every entry it made stale.

use std::sync::Arc;

use tracing::debug;

use super::config::{CacheConfig, SideEffectPolicy};
use super::consumer::CacheConsumer;
use super::events::{EpochClock, EventKind};
use super::planner::InvalidationPlan;
use super::store::CacheError;

pub struct CacheTrigger {
    policy: SideEffectPolicy,
    clock: EpochClock,
    consumer: Arc<CacheConsumer>,
}

impl CacheTrigger {
    pub fn new(config: &CacheConfig, consumer: Arc<CacheConsumer>) -> Self {
        Self {
            policy: config.side_effects,
            clock: EpochClock::new(),
            consumer,
        }
    }

    pub fn policy(&self) -> SideEffectPolicy {
        self.policy
    }

    /// Invalidate everything the given mutations affect.
    pub async fn trigger_all(&self, kinds: Vec<EventKind>) -> Result<(), CacheError> {
        let events = kinds.into_iter().map(|k| self.clock.stamp(k)).collect();
        let plan = InvalidationPlan::from_events(events);
        debug!(plan = %plan, "Cache invalidation planned");
        let outcome = self.consumer.execute(&plan).await.map(|_| ());
        self.policy.settle("cache_invalidation", outcome)
    }

    pub async fn trigger(&self, kind: EventKind) -> Result<(), CacheError> {
        self.trigger_all(vec![kind]).await
    }

    pub async fn category_changed(&self, category_id: i64) -> Result<(), CacheError> {
        self.trigger(EventKind::CategoryChanged { category_id }).await
    }

    pub async fn course_changed(
        &self,
        course_id: i64,
        category_ids: Vec<i64>,
    ) -> Result<(), CacheError> {
        self.trigger(EventKind::CourseChanged {
            course_id,
            category_ids,
        })
        .await
    }

    pub async fn chapter_changed(
        &self,
        chapter_id: i64,
        course_id: i64,
        category_id: i64,
    ) -> Result<(), CacheError> {
        self.trigger(EventKind::ChapterChanged {
            chapter_id,
            course_id,
            category_id,
        })
        .await
    }

    pub async fn articles_changed(&self, article_ids: Vec<i64>) -> Result<(), CacheError> {
        self.trigger(EventKind::ArticleChanged { article_ids }).await
    }

    pub async fn user_changed(&self, user_id: i64) -> Result<(), CacheError> {
        self.trigger(EventKind::UserChanged { user_id }).await
    }

    pub async fn setting_updated(&self) -> Result<(), CacheError> {
        self.trigger(EventKind::SettingUpdated).await
    }

    pub async fn membership_changed(&self, membership_id: i64) -> Result<(), CacheError> {
        self.trigger(EventKind::MembershipChanged { membership_id })
            .await
    }

    pub async fn catalog_reindexed(&self) -> Result<(), CacheError> {
        self.trigger(EventKind::CatalogReindexed).await
    }

    pub async fn flush_all(&self) -> Result<(), CacheError> {
        self.consumer.flush_all().await
    }
}
