use std::sync::Arc;

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use serde_json::Value;

use crate::application::error::ServiceError;
use crate::application::pagination::{PageParams, Pagination};
use crate::search::{SearchIndex, SearchQuery, SearchType};

/// One page of hits, serialized as `{"<type>": [...], "pagination": {...}}`.
#[derive(Debug, Clone)]
pub struct SearchResultPage {
    pub search_type: SearchType,
    pub hits: Vec<Value>,
    pub pagination: Pagination,
}

impl Serialize for SearchResultPage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(self.search_type.as_str(), &self.hits)?;
        map.serialize_entry("pagination", &self.pagination)?;
        map.end()
    }
}

#[derive(Clone)]
pub struct SearchService {
    index: Arc<dyn SearchIndex>,
}

impl SearchService {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }

    pub async fn search(
        &self,
        q: Option<&str>,
        search_type: Option<&str>,
        page: PageParams,
    ) -> Result<SearchResultPage, ServiceError> {
        let search_type: SearchType = search_type
            .unwrap_or_default()
            .parse()
            .map_err(|_| ServiceError::bad_request("type must be courses or chapters"))?;

        let query = SearchQuery {
            q: q.unwrap_or_default().to_string(),
            offset: page.offset(),
            limit: page.limit(),
        };
        let result = self.index.search(search_type, &query).await?;

        Ok(SearchResultPage {
            search_type,
            hits: result.hits,
            pagination: page.pagination(result.estimated_total_hits),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{CourseDocument, MemoryIndex, SearchDocument};
    use time::macros::datetime;

    async fn service_with_course(name: &str) -> SearchService {
        let index = Arc::new(MemoryIndex::new());
        let doc: SearchDocument = CourseDocument {
            id: 9,
            name: name.into(),
            image: None,
            content: None,
            likes_count: 0,
            updated_at: datetime!(2025-01-01 00:00 UTC),
        }
        .into();
        index
            .add_documents(SearchType::Courses, &[doc])
            .await
            .unwrap();
        SearchService::new(index)
    }

    #[tokio::test]
    async fn unknown_type_is_bad_request() {
        let service = service_with_course("Rust").await;
        let err = service
            .search(Some("rust"), Some("articles"), PageParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));

        let err = service
            .search(Some("rust"), None, PageParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn result_is_keyed_by_type() {
        let service = service_with_course("Rust in Action").await;
        let page = service
            .search(Some("rust"), Some("courses"), PageParams::default())
            .await
            .unwrap();
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["courses"][0]["id"], 9);
        assert_eq!(json["pagination"]["total"], 1);
        assert_eq!(json["pagination"]["currentPage"], 1);
    }
}
