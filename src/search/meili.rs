//! Meilisearch backend.
//!
//! Write calls return once Meilisearch has accepted the task; documents become
//! searchable when the task is processed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use super::{SearchDocument, SearchError, SearchHits, SearchIndex, SearchQuery, SearchType, ensure_index};

#[derive(Debug, Clone)]
pub struct MeiliIndex {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    hits: Vec<serde_json::Value>,
    #[serde(default)]
    estimated_total_hits: Option<u64>,
    #[serde(default)]
    total_hits: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: Option<String>,
    code: Option<String>,
}

impl MeiliIndex {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match self.api_key.as_deref() {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, op: &'static str, builder: RequestBuilder) -> Result<reqwest::Response, SearchError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(backend_error(op, status, response).await)
    }

    async fn write_documents(
        &self,
        op: &'static str,
        method: Method,
        index: SearchType,
        docs: &[SearchDocument],
    ) -> Result<(), SearchError> {
        ensure_index(index, docs)?;
        if docs.is_empty() {
            return Ok(());
        }
        let path = format!("/indexes/{}/documents?primaryKey=id", index.as_str());
        self.send(op, self.request(method, &path).json(docs)).await?;
        debug!(index = %index, count = docs.len(), op, "Search documents submitted");
        Ok(())
    }
}

async fn backend_error(op: &'static str, status: StatusCode, response: reqwest::Response) -> SearchError {
    let detail = match response.json::<ErrorResponse>().await {
        Ok(body) => format!(
            "{} ({})",
            body.message.unwrap_or_default(),
            body.code.unwrap_or_default()
        ),
        Err(_) => String::from("unreadable error body"),
    };
    SearchError::backend(op, format!("status {status}: {detail}"))
}

#[async_trait]
impl SearchIndex for MeiliIndex {
    #[instrument(skip(self, docs), fields(index = %index))]
    async fn add_documents(&self, index: SearchType, docs: &[SearchDocument]) -> Result<(), SearchError> {
        self.write_documents("add_documents", Method::POST, index, docs)
            .await
    }

    #[instrument(skip(self, docs), fields(index = %index))]
    async fn update_documents(
        &self,
        index: SearchType,
        docs: &[SearchDocument],
    ) -> Result<(), SearchError> {
        self.write_documents("update_documents", Method::PUT, index, docs)
            .await
    }

    #[instrument(skip(self), fields(index = %index))]
    async fn delete_document(&self, index: SearchType, id: i64) -> Result<(), SearchError> {
        let path = format!("/indexes/{}/documents/{id}", index.as_str());
        self.send("delete_document", self.request(Method::DELETE, &path))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, query), fields(index = %index, q = %query.q))]
    async fn search(&self, index: SearchType, query: &SearchQuery) -> Result<SearchHits, SearchError> {
        let path = format!("/indexes/{}/search", index.as_str());
        let body = json!({
            "q": query.q,
            "offset": query.offset,
            "limit": query.limit,
            "attributesToHighlight": ["*"],
        });
        let response = self
            .send("search", self.request(Method::POST, &path).json(&body))
            .await?;
        let parsed: SearchResponse = response.json().await?;
        let estimated_total_hits = parsed
            .estimated_total_hits
            .or(parsed.total_hits)
            .unwrap_or(parsed.hits.len() as u64);
        Ok(SearchHits {
            hits: parsed.hits,
            estimated_total_hits,
        })
    }

    async fn clear(&self, index: SearchType) -> Result<(), SearchError> {
        let path = format!("/indexes/{}/documents", index.as_str());
        self.send("clear", self.request(Method::DELETE, &path)).await?;
        Ok(())
    }

    async fn configure(&self) -> Result<(), SearchError> {
        for index in SearchType::ALL {
            let path = format!("/indexes/{}/settings", index.as_str());
            let body = index_settings(index);
            self.send("configure", self.request(Method::PATCH, &path).json(&body))
                .await?;
        }
        Ok(())
    }
}

fn index_settings(index: SearchType) -> serde_json::Value {
    json!({
        "searchableAttributes": index.searchable_attributes(),
        "sortableAttributes": index.sortable_attributes(),
        "rankingRules": index.ranking_rules(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_put_sort_ahead_of_relevance() {
        let courses = index_settings(SearchType::Courses);
        assert_eq!(
            courses["rankingRules"],
            json!(["sort", "words", "typo", "proximity", "attribute", "exactness"])
        );
        assert_eq!(courses["searchableAttributes"], json!(["name", "content"]));
        assert_eq!(courses["sortableAttributes"], json!(["updatedAt", "likesCount"]));

        let chapters = index_settings(SearchType::Chapters);
        assert_eq!(chapters["rankingRules"][0], "sort");
        assert_eq!(chapters["searchableAttributes"], json!(["title", "content"]));
    }
}
