//! Read-through cache and write invalidation.
//!
//! - **Reads** go through `CacheAside`: hit returns the stored JSON, miss loads from
//!   the store and populates the entry.
//! - **Writes** report what changed to `CacheTrigger`, which plans the affected keys
//!   and patterns (`InvalidationPlan`) and deletes them before returning.
//!
//! The backing `CacheStore` is either the in-process LRU or Redis:
//!
//! ```toml
//! [cache]
//! backend = "redis"
//! redis_url = "redis://127.0.0.1:6379/0"
//! side_effects = "fail_closed"
//! ```

mod aside;
mod config;
mod consumer;
mod events;
mod keys;
mod lock;
mod planner;
mod redis_store;
mod store;
mod trigger;

pub use aside::CacheAside;
pub use config::{CacheConfig, SideEffectPolicy};
pub use consumer::{CacheConsumer, InvalidationReport};
pub use events::{CacheEvent, Epoch, EpochClock, EventKind};
pub use keys::{CacheKey, KeyPattern, glob_match};
pub use planner::InvalidationPlan;
pub use redis_store::RedisStore;
pub use store::{CacheError, CacheStore, MemoryStore};
pub use trigger::CacheTrigger;
