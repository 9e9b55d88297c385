use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::application::{
    admin::articles::{ArticleIdsInput, ArticleInput},
    pagination::PageParams,
    repos::ArticleQueryFilter,
};
use crate::infra::http::{
    extract::{ApiJson, ApiPath, ApiQuery},
    response::ApiSuccess,
};

use super::{AdminState, ApiResult, service_error};

const SOURCE: &str = "infra::http::admin::articles";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ArticleListQuery {
    title: Option<String>,
    deleted: Option<String>,
    current_page: Option<String>,
    page_size: Option<String>,
}

impl ArticleListQuery {
    fn filter(&self) -> ArticleQueryFilter {
        ArticleQueryFilter {
            title: self.title.clone(),
            deleted: self.deleted.as_deref() == Some("true"),
        }
    }
}

pub(super) async fn list_articles(
    State(state): State<AdminState>,
    ApiQuery(query): ApiQuery<ArticleListQuery>,
) -> ApiResult<Value> {
    let page = PageParams::parse(query.current_page.as_deref(), query.page_size.as_deref());
    let articles = state
        .articles
        .list(&query.filter(), page)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Fetched the article list.",
        json!({ "articles": articles.items, "pagination": page.pagination(articles.total) }),
    ))
}

pub(super) async fn article_detail(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Value> {
    let article = state
        .articles
        .get(id)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Fetched the article.",
        json!({ "article": article }),
    ))
}

pub(super) async fn create_article(
    State(state): State<AdminState>,
    ApiJson(input): ApiJson<ArticleInput>,
) -> ApiResult<Value> {
    let article = state
        .articles
        .create(input)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::created(
        "Created the article.",
        json!({ "article": article }),
    ))
}

pub(super) async fn update_article(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<ArticleInput>,
) -> ApiResult<Value> {
    let article = state
        .articles
        .update(id, input)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Updated the article.",
        json!({ "article": article }),
    ))
}

pub(super) async fn trash_articles(
    State(state): State<AdminState>,
    ApiJson(input): ApiJson<ArticleIdsInput>,
) -> ApiResult<Value> {
    let ids = state
        .articles
        .trash(&input)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Moved the articles to the trash.",
        json!({ "ids": ids }),
    ))
}

pub(super) async fn restore_articles(
    State(state): State<AdminState>,
    ApiJson(input): ApiJson<ArticleIdsInput>,
) -> ApiResult<Value> {
    let ids = state
        .articles
        .restore(&input)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Restored the articles.",
        json!({ "ids": ids }),
    ))
}

pub(super) async fn purge_articles(
    State(state): State<AdminState>,
    ApiJson(input): ApiJson<ArticleIdsInput>,
) -> ApiResult<Value> {
    let ids = state
        .articles
        .purge(&input)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Permanently deleted the articles.",
        json!({ "ids": ids }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_literal_true_lists_the_trash() {
        let query = ArticleListQuery {
            deleted: Some("true".into()),
            ..Default::default()
        };
        assert!(query.filter().deleted);

        let query = ArticleListQuery {
            deleted: Some("1".into()),
            ..Default::default()
        };
        assert!(!query.filter().deleted);
        assert!(!ArticleListQuery::default().filter().deleted);
    }
}
