//! Full-text search over courses and chapters.
//!
//! Documents are projections of store rows keyed by the row id, so re-adding a
//! document replaces it. Two backends implement `SearchIndex`: Meilisearch over HTTP
//! and an in-process index used by tests and single-node setups.

mod meili;
mod memory;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{ChapterRecord, CourseRecord};

pub use meili::MeiliIndex;
pub use memory::MemoryIndex;

/// The indexes a client may search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Courses,
    Chapters,
}

impl SearchType {
    pub const ALL: [SearchType; 2] = [SearchType::Courses, SearchType::Chapters];

    pub fn as_str(self) -> &'static str {
        match self {
            SearchType::Courses => "courses",
            SearchType::Chapters => "chapters",
        }
    }

    pub fn searchable_attributes(self) -> &'static [&'static str] {
        match self {
            SearchType::Courses => &["name", "content"],
            SearchType::Chapters => &["title", "content"],
        }
    }

    /// Explicit sort first, then relevance.
    pub fn ranking_rules(self) -> &'static [&'static str] {
        &["sort", "words", "typo", "proximity", "attribute", "exactness"]
    }

    pub fn sortable_attributes(self) -> &'static [&'static str] {
        match self {
            SearchType::Courses => &["updatedAt", "likesCount"],
            SearchType::Chapters => &["updatedAt"],
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchType {
    type Err = SearchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "courses" => Ok(SearchType::Courses),
            "chapters" => Ok(SearchType::Chapters),
            other => Err(SearchError::UnknownType(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("unknown search type `{0}`")]
    UnknownType(String),
    #[error("document for `{found}` sent to the `{expected}` index")]
    WrongIndex {
        expected: SearchType,
        found: SearchType,
    },
    #[error("search backend failed during `{op}`: {message}")]
    Backend { op: &'static str, message: String },
    #[error("search request failed")]
    Http(#[from] reqwest::Error),
}

impl SearchError {
    pub fn backend(op: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            op,
            message: message.into(),
        }
    }

    /// Whether the caller, not the backend, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SearchError::UnknownType(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSnippet {
    pub id: i64,
    pub name: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterDocument {
    pub id: i64,
    pub title: String,
    pub content: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub course: CourseSnippet,
}

impl ChapterDocument {
    pub fn project(chapter: &ChapterRecord, course: &CourseRecord) -> Self {
        Self {
            id: chapter.id,
            title: chapter.title.clone(),
            content: chapter.content.clone(),
            updated_at: chapter.updated_at,
            course: CourseSnippet {
                id: course.id,
                name: course.name.clone(),
                image: course.image.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDocument {
    pub id: i64,
    pub name: String,
    pub image: Option<String>,
    pub content: Option<String>,
    pub likes_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl CourseDocument {
    pub fn project(course: &CourseRecord) -> Self {
        Self {
            id: course.id,
            name: course.name.clone(),
            image: course.image.clone(),
            content: course.content.clone(),
            likes_count: course.likes_count,
            updated_at: course.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchDocument {
    Chapter(ChapterDocument),
    Course(CourseDocument),
}

impl SearchDocument {
    pub fn id(&self) -> i64 {
        match self {
            SearchDocument::Chapter(doc) => doc.id,
            SearchDocument::Course(doc) => doc.id,
        }
    }

    pub fn index(&self) -> SearchType {
        match self {
            SearchDocument::Chapter(_) => SearchType::Chapters,
            SearchDocument::Course(_) => SearchType::Courses,
        }
    }

    /// Text of each searchable attribute, in ranking order.
    pub fn searchable_fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            SearchDocument::Chapter(doc) => vec![
                ("title", doc.title.as_str()),
                ("content", doc.content.as_deref().unwrap_or("")),
            ],
            SearchDocument::Course(doc) => vec![
                ("name", doc.name.as_str()),
                ("content", doc.content.as_deref().unwrap_or("")),
            ],
        }
    }
}

impl From<ChapterDocument> for SearchDocument {
    fn from(doc: ChapterDocument) -> Self {
        SearchDocument::Chapter(doc)
    }
}

impl From<CourseDocument> for SearchDocument {
    fn from(doc: CourseDocument) -> Self {
        SearchDocument::Course(doc)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub q: String,
    pub offset: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHits {
    /// Raw hits with a `_formatted` copy carrying `<em>` highlights.
    pub hits: Vec<serde_json::Value>,
    pub estimated_total_hits: u64,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Add documents, replacing any with the same id.
    async fn add_documents(
        &self,
        index: SearchType,
        docs: &[SearchDocument],
    ) -> Result<(), SearchError>;

    /// Add documents or merge their fields into existing ones.
    async fn update_documents(
        &self,
        index: SearchType,
        docs: &[SearchDocument],
    ) -> Result<(), SearchError>;

    async fn delete_document(&self, index: SearchType, id: i64) -> Result<(), SearchError>;

    async fn search(&self, index: SearchType, query: &SearchQuery)
    -> Result<SearchHits, SearchError>;

    /// Remove every document from one index.
    async fn clear(&self, index: SearchType) -> Result<(), SearchError>;

    /// Apply searchable and sortable attribute settings.
    async fn configure(&self) -> Result<(), SearchError>;
}

fn ensure_index(index: SearchType, docs: &[SearchDocument]) -> Result<(), SearchError> {
    match docs.iter().find(|doc| doc.index() != index) {
        Some(doc) => Err(SearchError::WrongIndex {
            expected: index,
            found: doc.index(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn type_selector_is_strict() {
        assert_eq!("courses".parse::<SearchType>().unwrap(), SearchType::Courses);
        assert_eq!(
            "chapters".parse::<SearchType>().unwrap(),
            SearchType::Chapters
        );
        let err = "articles".parse::<SearchType>().unwrap_err();
        assert!(err.is_client_error());
        assert!("Courses".parse::<SearchType>().is_err());
    }

    #[test]
    fn chapter_document_embeds_course_summary() {
        let doc = ChapterDocument {
            id: 3,
            title: "Ownership".into(),
            content: None,
            updated_at: datetime!(2025-05-01 08:00 UTC),
            course: CourseSnippet {
                id: 1,
                name: "Rust".into(),
                image: None,
            },
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["course"]["name"], "Rust");
        assert_eq!(json["content"], serde_json::Value::Null);
        assert_eq!(json["updatedAt"], "2025-05-01T08:00:00Z");
    }

    #[test]
    fn mixed_batches_are_rejected() {
        let doc = SearchDocument::Course(CourseDocument {
            id: 1,
            name: "Go".into(),
            image: None,
            content: None,
            likes_count: 0,
            updated_at: datetime!(2025-05-01 08:00 UTC),
        });
        assert!(ensure_index(SearchType::Courses, std::slice::from_ref(&doc)).is_ok());
        assert!(matches!(
            ensure_index(SearchType::Chapters, &[doc]),
            Err(SearchError::WrongIndex { .. })
        ));
    }
}
