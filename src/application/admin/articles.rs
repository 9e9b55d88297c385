use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::application::error::ServiceError;
use crate::application::pagination::{Page, PageParams};
use crate::application::repos::{
    ArticleQueryFilter, ArticlesRepo, CreateArticleParams, UpdateArticleParams,
};
use crate::cache::{CacheAside, CacheKey, CacheTrigger};
use crate::domain::entities::ArticleRecord;
use crate::domain::validation::Violations;

use super::trimmed;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleInput {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Body of the bulk trash, restore and purge endpoints: one id or an array of ids.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleIdsInput {
    #[serde(default)]
    pub id: Value,
}

impl ArticleIdsInput {
    pub fn ids(&self) -> Result<Vec<i64>, ServiceError> {
        let raw: Vec<&Value> = match &self.id {
            Value::Array(items) => items.iter().collect(),
            Value::Null => Vec::new(),
            single => vec![single],
        };
        if raw.is_empty() {
            return Err(ServiceError::validation("id is required"));
        }
        let mut ids = Vec::with_capacity(raw.len());
        for value in raw {
            let id = match value {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            };
            match id {
                Some(id) if id > 0 => ids.push(id),
                _ => return Err(ServiceError::validation("id must be a positive integer")),
            }
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}

#[derive(Clone)]
pub struct AdminArticleService {
    repo: Arc<dyn ArticlesRepo>,
    reader: CacheAside,
    cache: Arc<CacheTrigger>,
}

impl AdminArticleService {
    pub fn new(repo: Arc<dyn ArticlesRepo>, reader: CacheAside, cache: Arc<CacheTrigger>) -> Self {
        Self {
            repo,
            reader,
            cache,
        }
    }

    pub async fn list(
        &self,
        filter: &ArticleQueryFilter,
        page: PageParams,
    ) -> Result<Page<ArticleRecord>, ServiceError> {
        Ok(self.repo.list_admin_articles(filter, page).await?)
    }

    /// Cached under the same key the public detail uses; trashed rows are visible here.
    pub async fn get(&self, id: i64) -> Result<ArticleRecord, ServiceError> {
        let repo = self.repo.clone();
        self.reader
            .get_or_load(&CacheKey::Article(id), || async move {
                repo.find_article(id, true)
                    .await?
                    .ok_or(ServiceError::NotFound("article"))
            })
            .await
    }

    pub async fn create(&self, input: ArticleInput) -> Result<ArticleRecord, ServiceError> {
        let mut v = Violations::new();
        v.length("title", input.title.as_deref(), 2, 45);
        v.into_result()?;

        let params = CreateArticleParams {
            title: trimmed(input.title).unwrap_or_default(),
            content: input.content,
        };
        let article = self.repo.create_article(params).await?;
        self.cache.articles_changed(vec![article.id]).await?;
        Ok(article)
    }

    pub async fn update(
        &self,
        id: i64,
        input: ArticleInput,
    ) -> Result<ArticleRecord, ServiceError> {
        let mut v = Violations::new();
        v.optional_length("title", input.title.as_deref(), 2, 45);
        v.into_result()?;

        let params = UpdateArticleParams {
            title: trimmed(input.title),
            content: input.content,
        };
        let article = self.repo.update_article(id, params).await?;
        self.cache.articles_changed(vec![id]).await?;
        Ok(article)
    }

    /// Move articles to the trash. Returns the ids that changed.
    pub async fn trash(&self, input: &ArticleIdsInput) -> Result<Vec<i64>, ServiceError> {
        let ids = input.ids()?;
        let changed = self.repo.soft_delete_articles(&ids).await?;
        self.settle(changed).await
    }

    pub async fn restore(&self, input: &ArticleIdsInput) -> Result<Vec<i64>, ServiceError> {
        let ids = input.ids()?;
        let changed = self.repo.restore_articles(&ids).await?;
        self.settle(changed).await
    }

    /// Permanently delete, whether trashed or not.
    pub async fn purge(&self, input: &ArticleIdsInput) -> Result<Vec<i64>, ServiceError> {
        let ids = input.ids()?;
        let changed = self.repo.force_delete_articles(&ids).await?;
        self.settle(changed).await
    }

    async fn settle(&self, changed: Vec<i64>) -> Result<Vec<i64>, ServiceError> {
        if changed.is_empty() {
            return Err(ServiceError::NotFound("article"));
        }
        self.cache.articles_changed(changed.clone()).await?;
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(value: Value) -> Result<Vec<i64>, ServiceError> {
        ArticleIdsInput { id: value }.ids()
    }

    #[test]
    fn accepts_single_id_or_array() {
        assert_eq!(ids(json!(4)).unwrap(), vec![4]);
        assert_eq!(ids(json!("7")).unwrap(), vec![7]);
        assert_eq!(ids(json!([3, 1, 3])).unwrap(), vec![1, 3]);
    }

    #[test]
    fn rejects_missing_and_invalid_ids() {
        assert!(matches!(ids(Value::Null), Err(ServiceError::Validation(_))));
        assert!(matches!(ids(json!([])), Err(ServiceError::Validation(_))));
        assert!(matches!(ids(json!([1, -2])), Err(ServiceError::Validation(_))));
        assert!(matches!(ids(json!({"a": 1})), Err(ServiceError::Validation(_))));
    }
}
