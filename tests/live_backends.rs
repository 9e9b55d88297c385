//! Live checks against real Redis and Meilisearch servers.
//!
//! - Marked `#[ignore]`; run with `cargo test -- --ignored` once the services are up.
//! - `COURSEHUB_TEST_REDIS_URL` and `COURSEHUB_TEST_MEILI_URL` override the local defaults.

use std::time::Duration;

use time::OffsetDateTime;

use coursehub::cache::{CacheStore, RedisStore};
use coursehub::search::{CourseDocument, MeiliIndex, SearchDocument, SearchIndex, SearchQuery, SearchType};

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[tokio::test]
#[ignore]
async fn live_redis_pattern_delete() -> TestResult<()> {
    let store = RedisStore::connect(&env_or(
        "COURSEHUB_TEST_REDIS_URL",
        "redis://127.0.0.1:6379/15",
    ))
    .await?;
    store.flush_all().await?;

    for page in 1..=3 {
        store
            .set(&format!("courses:7:{page}:10"), "[]".to_string())
            .await?;
    }
    store.set("courses:8:1:10", "[]".to_string()).await?;

    let mut deleted = store.delete_pattern("courses:7:*").await?;
    deleted.sort();
    assert_eq!(
        deleted,
        vec!["courses:7:1:10", "courses:7:2:10", "courses:7:3:10"]
    );
    assert!(store.get("courses:8:1:10").await?.is_some());

    // A stored empty list is a hit, not a miss.
    assert_eq!(store.get("courses:8:1:10").await?.as_deref(), Some("[]"));
    store.flush_all().await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn live_meili_round_trip() -> TestResult<()> {
    let index = MeiliIndex::new(
        env_or("COURSEHUB_TEST_MEILI_URL", "http://127.0.0.1:7700"),
        std::env::var("COURSEHUB_TEST_MEILI_KEY").ok(),
        Duration::from_secs(10),
    )?;
    index.configure().await?;
    index.clear(SearchType::Courses).await?;

    let doc: SearchDocument = CourseDocument {
        id: 4242,
        name: "Live search course".into(),
        image: None,
        content: Some("indexed from the live test".into()),
        likes_count: 0,
        updated_at: OffsetDateTime::now_utc(),
    }
    .into();
    index.add_documents(SearchType::Courses, &[doc]).await?;

    let query = SearchQuery {
        q: "live search".into(),
        offset: 0,
        limit: 10,
    };
    // Indexing is asynchronous on the server side.
    for _ in 0..20 {
        let hits = index.search(SearchType::Courses, &query).await?;
        if hits.hits.iter().any(|hit| hit["id"] == 4242) {
            index.delete_document(SearchType::Courses, 4242).await?;
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    Err("document never became searchable".into())
}
