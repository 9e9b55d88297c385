use std::sync::Arc;

use serde::Deserialize;

use crate::application::error::ServiceError;
use crate::application::index_sync::IndexSync;
use crate::application::pagination::{Page, PageParams};
use crate::application::repos::{
    ChapterQueryFilter, ChaptersRepo, CoursesRepo, CreateChapterParams, UpdateChapterParams,
};
use crate::domain::entities::{ChapterRecord, CourseRecord};
use crate::domain::error::DomainError;
use crate::domain::validation::Violations;

use super::{cleared, nullable, rank_value, trimmed};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterInput {
    pub course_id: Option<i64>,
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub content: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub video: Option<Option<String>>,
    pub rank: Option<i64>,
    pub free: Option<bool>,
}

#[derive(Clone)]
pub struct AdminChapterService {
    chapters: Arc<dyn ChaptersRepo>,
    courses: Arc<dyn CoursesRepo>,
    sync: IndexSync,
}

impl AdminChapterService {
    pub fn new(
        chapters: Arc<dyn ChaptersRepo>,
        courses: Arc<dyn CoursesRepo>,
        sync: IndexSync,
    ) -> Self {
        Self {
            chapters,
            courses,
            sync,
        }
    }

    /// Chapters are always listed within one course.
    pub async fn list(
        &self,
        course_id: Option<i64>,
        title: Option<String>,
        page: PageParams,
    ) -> Result<Page<ChapterRecord>, ServiceError> {
        let course_id = match course_id {
            Some(id) if id > 0 => id,
            _ => return Err(ServiceError::bad_request("courseId is required")),
        };
        let filter = ChapterQueryFilter {
            course_id,
            title: trimmed(title).filter(|t| !t.is_empty()),
        };
        Ok(self.chapters.list_admin_chapters(&filter, page).await?)
    }

    pub async fn get(&self, id: i64) -> Result<ChapterRecord, ServiceError> {
        self.chapters
            .find_chapter(id)
            .await?
            .ok_or(ServiceError::NotFound("chapter"))
    }

    pub async fn create(&self, input: ChapterInput) -> Result<ChapterRecord, ServiceError> {
        let mut v = Violations::new();
        v.positive("courseId", input.course_id);
        v.length("title", input.title.as_deref(), 2, 45);
        v.url("video", input.video.as_ref().and_then(Option::as_deref));
        if input.rank.is_some() {
            v.positive("rank", input.rank);
        }
        v.into_result()?;

        let course = self.existing_course(input.course_id.unwrap_or_default()).await?;

        let params = CreateChapterParams {
            course_id: course.id,
            title: trimmed(input.title).unwrap_or_default(),
            content: input.content.flatten(),
            video: cleared(input.video).flatten(),
            rank: rank_value(input.rank)?,
            free: input.free.unwrap_or(false),
        };
        let chapter = self.chapters.create_chapter(params).await?;

        self.sync.chapter_created(&chapter, &course).await?;
        Ok(chapter)
    }

    pub async fn update(
        &self,
        id: i64,
        input: ChapterInput,
    ) -> Result<ChapterRecord, ServiceError> {
        let existing = self.get(id).await?;

        let mut v = Violations::new();
        if input.course_id.is_some() {
            v.positive("courseId", input.course_id);
        }
        v.optional_length("title", input.title.as_deref(), 2, 45);
        v.url("video", input.video.as_ref().and_then(Option::as_deref));
        if input.rank.is_some() {
            v.positive("rank", input.rank);
        }
        v.into_result()?;

        let target_id = input.course_id.unwrap_or(existing.course_id);
        let course = self.existing_course(target_id).await?;
        let moved_from = if target_id != existing.course_id {
            self.courses.find_course(existing.course_id).await?
        } else {
            None
        };

        let params = UpdateChapterParams {
            course_id: input.course_id,
            title: trimmed(input.title),
            content: input.content,
            video: cleared(input.video),
            rank: input.rank.map(|r| rank_value(Some(r))).transpose()?,
            free: input.free,
        };
        let chapter = self.chapters.update_chapter(id, params).await?;

        self.sync
            .chapter_updated(&chapter, &course, moved_from.as_ref())
            .await?;
        Ok(chapter)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        let chapter = self.get(id).await?;
        let course = self
            .courses
            .find_course(chapter.course_id)
            .await?
            .ok_or_else(|| {
                DomainError::invariant(format!(
                    "chapter {id} references missing course {}",
                    chapter.course_id
                ))
            })?;

        self.chapters.delete_chapter(id).await?;
        self.sync.chapter_destroyed(&chapter, &course).await?;
        Ok(())
    }

    async fn existing_course(&self, course_id: i64) -> Result<CourseRecord, ServiceError> {
        self.courses
            .find_course(course_id)
            .await?
            .ok_or_else(|| ServiceError::validation("course does not exist"))
    }
}
