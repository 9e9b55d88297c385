//! Chapter writes keep the parent counter, the search index and the cache in step.

mod common;

use coursehub::application::{
    admin::{categories::CategoryInput, chapters::ChapterInput, courses::CourseInput},
    error::ServiceError,
    repos::{CoursesRepo, CreateCourseParams},
};
use coursehub::cache::SideEffectPolicy;
use coursehub::domain::entities::{ChapterRecord, CourseRecord};
use coursehub::domain::types::ROLE_ADMIN;
use coursehub::search::{SearchDocument, SearchType};

use common::Harness;

async fn seed_course(h: &Harness, name: &str) -> CourseRecord {
    let category = h
        .admin_state
        .categories
        .create(CategoryInput {
            name: Some(format!("{name} category")),
            rank: None,
        })
        .await
        .unwrap();
    let author = h.repos.seed_user(&format!("author-{}", category.id), ROLE_ADMIN);
    h.admin_state
        .courses
        .create(
            author.id,
            CourseInput {
                category_id: Some(category.id),
                name: Some(name.to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
}

async fn add_chapter(h: &Harness, course_id: i64, title: &str) -> Result<ChapterRecord, ServiceError> {
    h.admin_state
        .chapters
        .create(ChapterInput {
            course_id: Some(course_id),
            title: Some(title.to_string()),
            content: Some(Some(format!("{title} notes"))),
            ..Default::default()
        })
        .await
}

fn chapters_count(h: &Harness, course_id: i64) -> i32 {
    h.repos.course(course_id).unwrap().chapters_count
}

#[tokio::test]
async fn create_counts_indexes_and_invalidates() {
    let h = Harness::new();
    let course = seed_course(&h, "Async Rust").await;
    let detail = h.public_state.catalog.course_detail(course.id).await.unwrap();
    assert!(detail.chapters.is_empty());
    assert!(h.store.contains(&format!("chapters:{}", course.id)));

    let chapter = add_chapter(&h, course.id, "Futures").await.unwrap();

    assert_eq!(chapters_count(&h, course.id), 1);
    match h.index.get(SearchType::Chapters, chapter.id) {
        Some(SearchDocument::Chapter(doc)) => {
            assert_eq!(doc.title, "Futures");
            assert_eq!(doc.course.id, course.id);
            assert_eq!(doc.course.name, "Async Rust");
        }
        other => panic!("expected chapter document, got {other:?}"),
    }
    assert!(!h.store.contains(&format!("chapters:{}", course.id)));
    assert!(!h.store.contains(&format!("course:{}", course.id)));

    let detail = h.public_state.catalog.course_detail(course.id).await.unwrap();
    assert_eq!(detail.course.chapters_count, 1);
    assert_eq!(detail.chapters.len(), 1);
}

#[tokio::test]
async fn moving_a_chapter_adjusts_both_courses() {
    let h = Harness::new();
    let from = seed_course(&h, "Networking").await;
    let to = seed_course(&h, "Storage").await;
    let chapter = add_chapter(&h, from.id, "Sockets").await.unwrap();

    h.admin_state
        .chapters
        .update(
            chapter.id,
            ChapterInput {
                course_id: Some(to.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(chapters_count(&h, from.id), 0);
    assert_eq!(chapters_count(&h, to.id), 1);
    match h.index.get(SearchType::Chapters, chapter.id) {
        Some(SearchDocument::Chapter(doc)) => assert_eq!(doc.course.id, to.id),
        other => panic!("expected chapter document, got {other:?}"),
    }
}

#[tokio::test]
async fn delete_decrements_and_drops_the_document() {
    let h = Harness::new();
    let course = seed_course(&h, "Compilers").await;
    let first = add_chapter(&h, course.id, "Lexing").await.unwrap();
    add_chapter(&h, course.id, "Parsing").await.unwrap();
    assert_eq!(chapters_count(&h, course.id), 2);

    h.admin_state.chapters.delete(first.id).await.unwrap();

    assert_eq!(chapters_count(&h, course.id), 1);
    assert!(h.index.get(SearchType::Chapters, first.id).is_none());
    assert_eq!(h.index.len(SearchType::Chapters), 1);
}

#[tokio::test]
async fn course_with_chapters_cannot_be_deleted() {
    let h = Harness::new();
    let course = seed_course(&h, "Databases").await;
    let chapter = add_chapter(&h, course.id, "Joins").await.unwrap();

    let err = h.admin_state.courses.delete(course.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    h.admin_state.chapters.delete(chapter.id).await.unwrap();
    h.admin_state.courses.delete(course.id).await.unwrap();
    assert!(h.repos.course(course.id).is_none());
    assert!(h.index.get(SearchType::Courses, course.id).is_none());
}

#[tokio::test]
async fn unknown_course_is_a_validation_error() {
    let h = Harness::new();
    let err = add_chapter(&h, 404, "Orphan").await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn fail_closed_surfaces_search_failures_after_the_write() {
    let h = Harness::build(SideEffectPolicy::FailClosed, true);
    let author = h.repos.seed_user("author", ROLE_ADMIN);
    let category = h
        .admin_state
        .categories
        .create(CategoryInput {
            name: Some("Systems".into()),
            rank: None,
        })
        .await
        .unwrap();

    let err = h
        .admin_state
        .courses
        .create(
            author.id,
            CourseInput {
                category_id: Some(category.id),
                name: Some("Kernels".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Search(_)));

    // The row itself was committed.
    let page = h
        .admin_state
        .courses
        .list(&Default::default(), Default::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}

/// A course stored without going through the search sync.
async fn stored_course(h: &Harness, name: &str) -> CourseRecord {
    let category = h
        .admin_state
        .categories
        .create(CategoryInput {
            name: Some(format!("{name} category")),
            rank: None,
        })
        .await
        .unwrap();
    let author = h.repos.seed_user(&format!("author-{}", category.id), ROLE_ADMIN);
    h.repos
        .create_course(CreateCourseParams {
            category_id: category.id,
            user_id: author.id,
            name: name.to_string(),
            image: None,
            recommended: false,
            introductory: false,
            content: None,
            free: false,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn failed_chapter_sync_still_counts_and_invalidates() {
    let h = Harness::build(SideEffectPolicy::FailClosed, true);
    let course = stored_course(&h, "Operating systems").await;
    h.public_state.catalog.course_detail(course.id).await.unwrap();
    assert!(h.store.contains(&format!("chapters:{}", course.id)));

    let err = add_chapter(&h, course.id, "Scheduling").await.unwrap_err();
    assert!(matches!(err, ServiceError::Search(_)));

    assert_eq!(chapters_count(&h, course.id), 1);
    assert!(!h.store.contains(&format!("chapters:{}", course.id)));
    assert!(!h.store.contains(&format!("course:{}", course.id)));
    let detail = h.public_state.catalog.course_detail(course.id).await.unwrap();
    assert_eq!(detail.course.chapters_count, 1);
    assert_eq!(detail.chapters.len(), 1);

    let chapter_id = detail.chapters[0].id;
    let err = h.admin_state.chapters.delete(chapter_id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Search(_)));

    assert_eq!(chapters_count(&h, course.id), 0);
    assert!(!h.store.contains(&format!("chapters:{}", course.id)));
    let detail = h.public_state.catalog.course_detail(course.id).await.unwrap();
    assert!(detail.chapters.is_empty());
}

#[tokio::test]
async fn failed_course_sync_still_invalidates() {
    let h = Harness::build(SideEffectPolicy::FailClosed, true);
    let course = stored_course(&h, "Distributed systems").await;
    h.public_state.catalog.course_detail(course.id).await.unwrap();
    assert!(h.store.contains(&format!("course:{}", course.id)));

    let err = h
        .admin_state
        .courses
        .update(
            course.id,
            CourseInput {
                name: Some("Consensus".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Search(_)));

    assert!(!h.store.contains(&format!("course:{}", course.id)));
    let detail = h.public_state.catalog.course_detail(course.id).await.unwrap();
    assert_eq!(detail.course.name, "Consensus");
}

#[tokio::test]
async fn log_and_continue_keeps_counters_moving() {
    let h = Harness::build(SideEffectPolicy::LogAndContinue, true);
    let course = seed_course(&h, "Embedded").await;

    let chapter = add_chapter(&h, course.id, "Interrupts").await.unwrap();

    assert_eq!(chapters_count(&h, course.id), 1);
    assert!(h.index.get(SearchType::Chapters, chapter.id).is_none());
}

#[tokio::test]
async fn reindex_rebuilds_both_indexes() {
    let h = Harness::new();
    let course = seed_course(&h, "Cryptography").await;
    add_chapter(&h, course.id, "Hashing").await.unwrap();
    add_chapter(&h, course.id, "Signatures").await.unwrap();

    let summary = h.admin_state.settings.reindex().await.unwrap();

    assert_eq!(summary.courses, 1);
    assert_eq!(summary.chapters, 2);
    assert_eq!(h.index.len(SearchType::Courses), 1);
    assert_eq!(h.index.len(SearchType::Chapters), 2);
}
