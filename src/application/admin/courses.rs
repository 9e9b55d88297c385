use std::sync::Arc;

use serde::Deserialize;

use crate::application::error::ServiceError;
use crate::application::index_sync::IndexSync;
use crate::application::pagination::{Page, PageParams};
use crate::application::repos::{
    CategoriesRepo, CourseQueryFilter, CoursesRepo, CreateCourseParams, UpdateCourseParams,
};
use crate::cache::CacheTrigger;
use crate::domain::entities::{AdminCourseRecord, CourseRecord};
use crate::domain::validation::Violations;

use super::{cleared, nullable, trimmed};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseInput {
    pub category_id: Option<i64>,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub image: Option<Option<String>>,
    pub recommended: Option<bool>,
    pub introductory: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub content: Option<Option<String>>,
    pub free: Option<bool>,
}

#[derive(Clone)]
pub struct AdminCourseService {
    courses: Arc<dyn CoursesRepo>,
    categories: Arc<dyn CategoriesRepo>,
    sync: IndexSync,
    cache: Arc<CacheTrigger>,
}

impl AdminCourseService {
    pub fn new(
        courses: Arc<dyn CoursesRepo>,
        categories: Arc<dyn CategoriesRepo>,
        sync: IndexSync,
        cache: Arc<CacheTrigger>,
    ) -> Self {
        Self {
            courses,
            categories,
            sync,
            cache,
        }
    }

    pub async fn list(
        &self,
        filter: &CourseQueryFilter,
        page: PageParams,
    ) -> Result<Page<AdminCourseRecord>, ServiceError> {
        Ok(self.courses.list_admin_courses(filter, page).await?)
    }

    pub async fn get(&self, id: i64) -> Result<AdminCourseRecord, ServiceError> {
        self.courses
            .find_admin_course(id)
            .await?
            .ok_or(ServiceError::NotFound("course"))
    }

    /// The author is always the signed-in admin.
    pub async fn create(
        &self,
        user_id: i64,
        input: CourseInput,
    ) -> Result<CourseRecord, ServiceError> {
        let mut v = Violations::new();
        v.positive("categoryId", input.category_id);
        v.length("name", input.name.as_deref(), 2, 45);
        v.url("image", input.image.as_ref().and_then(Option::as_deref));
        v.into_result()?;

        let category_id = input.category_id.unwrap_or_default();
        self.ensure_category(category_id).await?;

        let params = CreateCourseParams {
            category_id,
            user_id,
            name: trimmed(input.name).unwrap_or_default(),
            image: cleared(input.image).flatten(),
            recommended: input.recommended.unwrap_or(false),
            introductory: input.introductory.unwrap_or(false),
            content: input.content.flatten(),
            free: input.free.unwrap_or(false),
        };
        let course = self.courses.create_course(params).await?;

        let synced = self.sync.course_saved(&course).await;
        let invalidated = self
            .cache
            .course_changed(course.id, vec![course.category_id])
            .await
            .map_err(ServiceError::from);
        synced.and(invalidated)?;
        Ok(course)
    }

    pub async fn update(&self, id: i64, input: CourseInput) -> Result<CourseRecord, ServiceError> {
        let existing = self
            .courses
            .find_course(id)
            .await?
            .ok_or(ServiceError::NotFound("course"))?;

        let mut v = Violations::new();
        if input.category_id.is_some() {
            v.positive("categoryId", input.category_id);
        }
        v.optional_length("name", input.name.as_deref(), 2, 45);
        v.url("image", input.image.as_ref().and_then(Option::as_deref));
        v.into_result()?;

        if let Some(category_id) = input.category_id.filter(|c| *c != existing.category_id) {
            self.ensure_category(category_id).await?;
        }

        let params = UpdateCourseParams {
            category_id: input.category_id,
            name: trimmed(input.name),
            image: cleared(input.image),
            recommended: input.recommended,
            introductory: input.introductory,
            content: input.content,
            free: input.free,
        };
        let course = self.courses.update_course(id, params).await?;

        let synced = self.sync.course_saved(&course).await;
        let mut categories = vec![existing.category_id];
        if course.category_id != existing.category_id {
            categories.push(course.category_id);
        }
        let invalidated = self
            .cache
            .course_changed(course.id, categories)
            .await
            .map_err(ServiceError::from);
        synced.and(invalidated)?;
        Ok(course)
    }

    /// Refused with a conflict while the course still has chapters.
    pub async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        let course = self
            .courses
            .find_course(id)
            .await?
            .ok_or(ServiceError::NotFound("course"))?;

        let chapters = self.courses.count_chapters_in_course(id).await?;
        if chapters > 0 {
            return Err(ServiceError::conflict(format!(
                "course {id} still has {chapters} chapters"
            )));
        }

        self.courses.delete_course(id).await?;
        let synced = self.sync.course_destroyed(id).await;
        let invalidated = self
            .cache
            .course_changed(id, vec![course.category_id])
            .await
            .map_err(ServiceError::from);
        synced.and(invalidated)
    }

    async fn ensure_category(&self, category_id: i64) -> Result<(), ServiceError> {
        match self.categories.find_category(category_id).await? {
            Some(_) => Ok(()),
            None => Err(ServiceError::validation("category does not exist")),
        }
    }
}
