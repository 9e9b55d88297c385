//! In-process search index.
//!
//! Matches the query as a case-insensitive substring of any searchable attribute
//! and highlights matches with `<em>` the way Meilisearch formats hits. Results are
//! ordered by attribute rank, then by id.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::{SearchDocument, SearchError, SearchHits, SearchIndex, SearchQuery, SearchType, ensure_index};

const HIGHLIGHT_PRE: &str = "<em>";
const HIGHLIGHT_POST: &str = "</em>";

#[derive(Debug, Default)]
pub struct MemoryIndex {
    indexes: DashMap<SearchType, BTreeMap<i64, SearchDocument>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: SearchType, id: i64) -> Option<SearchDocument> {
        self.indexes
            .get(&index)
            .and_then(|docs| docs.get(&id).cloned())
    }

    pub fn len(&self, index: SearchType) -> usize {
        self.indexes.get(&index).map(|docs| docs.len()).unwrap_or(0)
    }

    fn upsert(&self, index: SearchType, docs: &[SearchDocument]) -> Result<(), SearchError> {
        ensure_index(index, docs)?;
        let mut entry = self.indexes.entry(index).or_default();
        for doc in docs {
            entry.insert(doc.id(), doc.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn add_documents(&self, index: SearchType, docs: &[SearchDocument]) -> Result<(), SearchError> {
        self.upsert(index, docs)
    }

    async fn update_documents(
        &self,
        index: SearchType,
        docs: &[SearchDocument],
    ) -> Result<(), SearchError> {
        // Projections always carry every field, so merging equals replacing.
        self.upsert(index, docs)
    }

    async fn delete_document(&self, index: SearchType, id: i64) -> Result<(), SearchError> {
        if let Some(mut docs) = self.indexes.get_mut(&index) {
            docs.remove(&id);
        }
        Ok(())
    }

    async fn search(&self, index: SearchType, query: &SearchQuery) -> Result<SearchHits, SearchError> {
        let needle = query.q.trim();
        let mut ranked: Vec<(usize, i64, Value)> = Vec::new();

        if let Some(docs) = self.indexes.get(&index) {
            for doc in docs.values() {
                let mut best_rank: Option<usize> = None;
                let mut formatted = serde_json::Map::new();
                for (rank, (field, text)) in doc.searchable_fields().into_iter().enumerate() {
                    let (matched, marked) = highlight(text, needle);
                    if matched && best_rank.is_none() {
                        best_rank = Some(rank);
                    }
                    formatted.insert(field.to_string(), Value::String(marked));
                }
                let Some(rank) = best_rank.or(needle.is_empty().then_some(0)) else {
                    continue;
                };
                let mut hit = serde_json::to_value(doc)
                    .map_err(|err| SearchError::backend("search", err.to_string()))?;
                if let Value::Object(map) = &mut hit {
                    map.insert("_formatted".to_string(), Value::Object(formatted));
                }
                ranked.push((rank, doc.id(), hit));
            }
        }

        ranked.sort_by_key(|(rank, id, _)| (*rank, *id));
        let estimated_total_hits = ranked.len() as u64;
        let hits = ranked
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .map(|(_, _, hit)| hit)
            .collect();

        Ok(SearchHits {
            hits,
            estimated_total_hits,
        })
    }

    async fn clear(&self, index: SearchType) -> Result<(), SearchError> {
        self.indexes.remove(&index);
        Ok(())
    }

    async fn configure(&self) -> Result<(), SearchError> {
        Ok(())
    }
}

/// Wrap every case-insensitive occurrence of `needle` in `text` with highlight tags.
fn highlight(text: &str, needle: &str) -> (bool, String) {
    let hay: Vec<char> = text.chars().collect();
    let pat: Vec<char> = needle.chars().collect();
    if pat.is_empty() || pat.len() > hay.len() {
        return (false, text.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut matched = false;
    let mut i = 0;
    while i < hay.len() {
        let fits = i + pat.len() <= hay.len()
            && hay[i..i + pat.len()]
                .iter()
                .zip(&pat)
                .all(|(a, b)| same_letter(*a, *b));
        if fits {
            matched = true;
            out.push_str(HIGHLIGHT_PRE);
            out.extend(&hay[i..i + pat.len()]);
            out.push_str(HIGHLIGHT_POST);
            i += pat.len();
        } else {
            out.push(hay[i]);
            i += 1;
        }
    }
    (matched, out)
}

fn same_letter(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}
