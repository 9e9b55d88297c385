//! Cache events.
//!
//! A write service describes what it changed as an `EventKind`; the planner turns
//! events into the concrete keys and patterns to delete.

use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;
use uuid::Uuid;

/// Monotonic epoch for ordering events within this process.
pub type Epoch = u64;

#[derive(Debug, Clone)]
pub struct CacheEvent {
    /// Unique identifier for idempotency (UUIDv4).
    pub id: Uuid,
    pub epoch: Epoch,
    pub kind: EventKind,
    pub timestamp: OffsetDateTime,
}

impl CacheEvent {
    pub fn new(kind: EventKind, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Mutations that make cached values stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    CategoryChanged { category_id: i64 },
    /// A course row changed. `category_ids` holds every category whose list may
    /// have shown the course (old and new on a move).
    CourseChanged {
        course_id: i64,
        category_ids: Vec<i64>,
    },
    /// A chapter changed. The parent course's counter and list rows move with it.
    ChapterChanged {
        chapter_id: i64,
        course_id: i64,
        category_id: i64,
    },
    ArticleChanged { article_ids: Vec<i64> },
    UserChanged { user_id: i64 },
    SettingUpdated,
    MembershipChanged { membership_id: i64 },
    /// Search documents were rebuilt; every course list may differ.
    CatalogReindexed,
}

/// Hands out epochs for events published by this process.
#[derive(Debug, Default)]
pub struct EpochClock {
    counter: AtomicU64,
}

impl EpochClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> Epoch {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn stamp(&self, kind: EventKind) -> CacheEvent {
        CacheEvent::new(kind, self.next())
    }
}
