use std::sync::Arc;

use serde::Deserialize;

use crate::application::error::ServiceError;
use crate::application::repos::{
    CategoriesRepo, CategoryListScope, CategoryQueryFilter, CreateCategoryParams,
    UpdateCategoryParams,
};
use crate::cache::CacheTrigger;
use crate::domain::entities::CategoryRecord;
use crate::domain::validation::Violations;

use super::{rank_value, trimmed};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInput {
    pub name: Option<String>,
    pub rank: Option<i64>,
}

#[derive(Clone)]
pub struct AdminCategoryService {
    repo: Arc<dyn CategoriesRepo>,
    cache: Arc<CacheTrigger>,
}

impl AdminCategoryService {
    pub fn new(repo: Arc<dyn CategoriesRepo>, cache: Arc<CacheTrigger>) -> Self {
        Self { repo, cache }
    }

    pub async fn list(
        &self,
        filter: &CategoryQueryFilter,
    ) -> Result<Vec<CategoryRecord>, ServiceError> {
        Ok(self
            .repo
            .list_categories(CategoryListScope::Admin, filter)
            .await?)
    }

    pub async fn get(&self, id: i64) -> Result<CategoryRecord, ServiceError> {
        self.repo
            .find_category(id)
            .await?
            .ok_or(ServiceError::NotFound("category"))
    }

    pub async fn create(&self, input: CategoryInput) -> Result<CategoryRecord, ServiceError> {
        let mut v = Violations::new();
        v.length("name", input.name.as_deref(), 2, 45);
        if input.rank.is_some() {
            v.positive("rank", input.rank);
        }
        v.into_result()?;

        let params = CreateCategoryParams {
            name: trimmed(input.name).unwrap_or_default(),
            rank: rank_value(input.rank)?,
        };
        let category = self.repo.create_category(params).await?;
        self.cache.category_changed(category.id).await?;
        Ok(category)
    }

    pub async fn update(
        &self,
        id: i64,
        input: CategoryInput,
    ) -> Result<CategoryRecord, ServiceError> {
        self.get(id).await?;

        let mut v = Violations::new();
        v.optional_length("name", input.name.as_deref(), 2, 45);
        if input.rank.is_some() {
            v.positive("rank", input.rank);
        }
        v.into_result()?;

        let params = UpdateCategoryParams {
            name: trimmed(input.name),
            rank: input.rank.map(|r| rank_value(Some(r))).transpose()?,
        };
        let category = self.repo.update_category(id, params).await?;
        self.cache.category_changed(id).await?;
        Ok(category)
    }

    /// Refused with a conflict while any course still references the category.
    pub async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        self.get(id).await?;

        let courses = self.repo.count_courses_in_category(id).await?;
        if courses > 0 {
            return Err(ServiceError::conflict(format!(
                "category {id} still has {courses} courses"
            )));
        }

        self.repo.delete_category(id).await?;
        self.cache.category_changed(id).await?;
        Ok(())
    }
}
