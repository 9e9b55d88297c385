//! Post-write orchestration for indexed entities.
//!
//! Each function runs after the store mutation has committed. Every step is attempted
//! even when an earlier one failed, and the first failure left unsettled by the
//! side-effect policy is returned. The store write is never undone.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use tracing::{info, instrument};

use crate::application::error::ServiceError;
use crate::application::repos::{ChaptersRepo, CoursesRepo};
use crate::cache::{CacheTrigger, SideEffectPolicy};
use crate::domain::entities::{ChapterRecord, CourseRecord};
use crate::search::{
    ChapterDocument, CourseDocument, SearchDocument, SearchError, SearchIndex, SearchType,
};

const METRIC_SYNC: &str = "coursehub_search_sync_total";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReindexSummary {
    pub courses: usize,
    pub chapters: usize,
}

#[derive(Clone)]
pub struct IndexSync {
    search: Arc<dyn SearchIndex>,
    courses: Arc<dyn CoursesRepo>,
    chapters: Arc<dyn ChaptersRepo>,
    cache: Arc<CacheTrigger>,
}

impl IndexSync {
    pub fn new(
        search: Arc<dyn SearchIndex>,
        courses: Arc<dyn CoursesRepo>,
        chapters: Arc<dyn ChaptersRepo>,
        cache: Arc<CacheTrigger>,
    ) -> Self {
        Self {
            search,
            courses,
            chapters,
            cache,
        }
    }

    fn policy(&self) -> SideEffectPolicy {
        self.cache.policy()
    }

    /// Bump the parent counter, add the chapter document, invalidate.
    #[instrument(skip_all, fields(chapter_id = chapter.id, course_id = course.id))]
    pub async fn chapter_created(
        &self,
        chapter: &ChapterRecord,
        course: &CourseRecord,
    ) -> Result<(), ServiceError> {
        let counted = self.increment(course.id).await;

        let doc = SearchDocument::from(ChapterDocument::project(chapter, course));
        let added = self.search.add_documents(SearchType::Chapters, &[doc]).await;
        let synced = self.settle_search("add", added);

        let invalidated = self.invalidate_chapter(chapter.id, course).await;
        counted.and(synced).and(invalidated)
    }

    /// Upsert the rebuilt document and invalidate. When the chapter moved to another
    /// course both counters and both cache families are adjusted.
    #[instrument(skip_all, fields(chapter_id = chapter.id, course_id = course.id))]
    pub async fn chapter_updated(
        &self,
        chapter: &ChapterRecord,
        course: &CourseRecord,
        moved_from: Option<&CourseRecord>,
    ) -> Result<(), ServiceError> {
        let mut counted = Ok(());
        if let Some(previous) = moved_from {
            counted = self
                .decrement(previous.id)
                .await
                .and(self.increment(course.id).await);
        }

        let doc = SearchDocument::from(ChapterDocument::project(chapter, course));
        let updated = self
            .search
            .update_documents(SearchType::Chapters, &[doc])
            .await;
        let synced = self.settle_search("update", updated);

        let mut invalidated = Ok(());
        if let Some(previous) = moved_from {
            invalidated = self.invalidate_chapter(chapter.id, previous).await;
        }
        let invalidated = invalidated.and(self.invalidate_chapter(chapter.id, course).await);
        counted.and(synced).and(invalidated)
    }

    /// Decrement the parent counter, drop the document, invalidate.
    #[instrument(skip_all, fields(chapter_id = chapter.id, course_id = course.id))]
    pub async fn chapter_destroyed(
        &self,
        chapter: &ChapterRecord,
        course: &CourseRecord,
    ) -> Result<(), ServiceError> {
        let counted = self.decrement(course.id).await;

        let deleted = self
            .search
            .delete_document(SearchType::Chapters, chapter.id)
            .await;
        let synced = self.settle_search("delete", deleted);

        let invalidated = self.invalidate_chapter(chapter.id, course).await;
        counted.and(synced).and(invalidated)
    }

    /// Upsert the course document after create or update.
    pub async fn course_saved(&self, course: &CourseRecord) -> Result<(), ServiceError> {
        let doc = SearchDocument::from(CourseDocument::project(course));
        let updated = self
            .search
            .update_documents(SearchType::Courses, &[doc])
            .await;
        self.settle_search("update", updated)
    }

    pub async fn course_destroyed(&self, course_id: i64) -> Result<(), ServiceError> {
        let deleted = self
            .search
            .delete_document(SearchType::Courses, course_id)
            .await;
        self.settle_search("delete", deleted)
    }

    /// Rebuild both indexes from the store. Failures always surface here.
    #[instrument(skip_all)]
    pub async fn reindex(&self) -> Result<ReindexSummary, ServiceError> {
        let courses = self.courses.list_all_courses().await?;
        let chapters = self.chapters.list_all_chapters().await?;

        let by_id: HashMap<i64, &CourseRecord> = courses.iter().map(|c| (c.id, c)).collect();
        let course_docs: Vec<SearchDocument> = courses
            .iter()
            .map(|course| CourseDocument::project(course).into())
            .collect();
        let chapter_docs: Vec<SearchDocument> = chapters
            .iter()
            .filter_map(|chapter| {
                by_id
                    .get(&chapter.course_id)
                    .map(|course| ChapterDocument::project(chapter, course).into())
            })
            .collect();

        for index in SearchType::ALL {
            self.search.clear(index).await?;
        }
        self.search
            .add_documents(SearchType::Courses, &course_docs)
            .await?;
        self.search
            .add_documents(SearchType::Chapters, &chapter_docs)
            .await?;
        counter!(METRIC_SYNC, "op" => "reindex").increment(1);

        self.cache.catalog_reindexed().await?;

        let summary = ReindexSummary {
            courses: course_docs.len(),
            chapters: chapter_docs.len(),
        };
        info!(
            courses = summary.courses,
            chapters = summary.chapters,
            "Search indexes rebuilt"
        );
        Ok(summary)
    }

    async fn increment(&self, course_id: i64) -> Result<(), ServiceError> {
        let counted = self.courses.increment_chapters_count(course_id).await;
        Ok(self.policy().settle("chapters_count", counted)?)
    }

    async fn decrement(&self, course_id: i64) -> Result<(), ServiceError> {
        let counted = self.courses.decrement_chapters_count(course_id).await;
        Ok(self.policy().settle("chapters_count", counted)?)
    }

    async fn invalidate_chapter(
        &self,
        chapter_id: i64,
        course: &CourseRecord,
    ) -> Result<(), ServiceError> {
        Ok(self
            .cache
            .chapter_changed(chapter_id, course.id, course.category_id)
            .await?)
    }

    fn settle_search(
        &self,
        op: &'static str,
        result: Result<(), SearchError>,
    ) -> Result<(), ServiceError> {
        if result.is_ok() {
            counter!(METRIC_SYNC, "op" => op).increment(1);
        }
        self.policy().settle("search_sync", result)?;
        Ok(())
    }
}
