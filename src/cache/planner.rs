//! Invalidation planning.
//!
//! The single place that knows which cache entries each mutation affects.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use super::events::{CacheEvent, EventKind};
use super::keys::{CacheKey, KeyPattern};

/// Keys and patterns to delete for a batch of events.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvalidationPlan {
    pub keys: BTreeSet<String>,
    pub patterns: BTreeSet<String>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ keys: {}, patterns: {} }}",
            self.keys.len(),
            self.patterns.len()
        )
    }
}

impl InvalidationPlan {
    /// Merge events into one plan, ignoring duplicate event ids.
    pub fn from_events(events: Vec<CacheEvent>) -> Self {
        let mut plan = Self::default();
        let mut seen_ids = HashSet::new();

        for event in events.into_iter().filter(|e| seen_ids.insert(e.id)) {
            plan.add(&event.kind);
        }

        plan.drop_patterns_covered_by_broader_ones();
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.patterns.is_empty()
    }

    fn key(&mut self, key: CacheKey) {
        self.keys.insert(key.to_string());
    }

    fn pattern(&mut self, pattern: KeyPattern) {
        self.patterns.insert(pattern.to_string());
    }

    fn add(&mut self, kind: &EventKind) {
        match kind {
            EventKind::CategoryChanged { category_id } => {
                self.key(CacheKey::Categories);
                self.key(CacheKey::Category(*category_id));
            }
            EventKind::CourseChanged {
                course_id,
                category_ids,
            } => {
                self.key(CacheKey::Course(*course_id));
                self.key(CacheKey::CourseChapters(*course_id));
                for category_id in category_ids {
                    self.pattern(KeyPattern::CourseListsIn(*category_id));
                }
            }
            EventKind::ChapterChanged {
                chapter_id,
                course_id,
                category_id,
            } => {
                self.key(CacheKey::Chapter(*chapter_id));
                self.key(CacheKey::CourseChapters(*course_id));
                self.key(CacheKey::Course(*course_id));
                self.pattern(KeyPattern::CourseListsIn(*category_id));
            }
            EventKind::ArticleChanged { article_ids } => {
                for id in article_ids {
                    self.key(CacheKey::Article(*id));
                }
                self.pattern(KeyPattern::ArticleLists);
            }
            EventKind::UserChanged { user_id } => self.key(CacheKey::User(*user_id)),
            EventKind::SettingUpdated => self.key(CacheKey::Setting),
            EventKind::MembershipChanged { membership_id } => {
                self.key(CacheKey::Memberships);
                self.key(CacheKey::Membership(*membership_id));
            }
            EventKind::CatalogReindexed => self.pattern(KeyPattern::AllCourseLists),
        }
    }

    fn drop_patterns_covered_by_broader_ones(&mut self) {
        let all_courses = KeyPattern::AllCourseLists.to_string();
        if self.patterns.contains(&all_courses) {
            self.patterns
                .retain(|p| p == &all_courses || !p.starts_with("courses:"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::events::EpochClock;

    fn plan(kinds: Vec<EventKind>) -> InvalidationPlan {
        let clock = EpochClock::new();
        InvalidationPlan::from_events(kinds.into_iter().map(|k| clock.stamp(k)).collect())
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn category_change_clears_list_and_detail() {
        let plan = plan(vec![EventKind::CategoryChanged { category_id: 4 }]);
        assert_eq!(plan.keys, set(&["categories", "category:4"]));
        assert!(plan.patterns.is_empty());
    }

    #[test]
    fn chapter_change_reaches_parent_course() {
        let plan = plan(vec![EventKind::ChapterChanged {
            chapter_id: 11,
            course_id: 3,
            category_id: 2,
        }]);
        assert_eq!(plan.keys, set(&["chapter:11", "chapters:3", "course:3"]));
        assert_eq!(plan.patterns, set(&["courses:2:*"]));
    }

    #[test]
    fn course_move_clears_both_categories() {
        let plan = plan(vec![EventKind::CourseChanged {
            course_id: 5,
            category_ids: vec![1, 2],
        }]);
        assert_eq!(plan.keys, set(&["chapters:5", "course:5"]));
        assert_eq!(plan.patterns, set(&["courses:1:*", "courses:2:*"]));
    }

    #[test]
    fn article_changes_use_the_list_pattern() {
        let plan = plan(vec![EventKind::ArticleChanged {
            article_ids: vec![1, 2],
        }]);
        assert_eq!(plan.keys, set(&["article:1", "article:2"]));
        assert_eq!(plan.patterns, set(&["articles:*"]));
    }

    #[test]
    fn reindex_subsumes_category_patterns() {
        let plan = plan(vec![
            EventKind::CourseChanged {
                course_id: 1,
                category_ids: vec![9],
            },
            EventKind::CatalogReindexed,
        ]);
        assert_eq!(plan.patterns, set(&["courses:*"]));
    }

    #[test]
    fn duplicate_events_are_planned_once() {
        let clock = EpochClock::new();
        let event = clock.stamp(EventKind::SettingUpdated);
        let plan = InvalidationPlan::from_events(vec![event.clone(), event]);
        assert_eq!(plan.keys, set(&["setting"]));
    }
}
