//! Cache key definitions.
//!
//! Every cached value is addressed by a `CacheKey`; list families that cannot be
//! enumerated from a single changed row are addressed by a `KeyPattern`.

use std::fmt;

/// A single cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Public category list.
    Categories,
    Category(i64),
    /// One page of a category's course list.
    CourseList {
        category_id: i64,
        page: u64,
        size: u64,
    },
    Course(i64),
    /// Public profile of a course author.
    User(i64),
    /// Chapter list of a course.
    CourseChapters(i64),
    Chapter(i64),
    /// One page of the public article list.
    ArticleList { page: u64, size: u64 },
    Article(i64),
    /// Site settings singleton.
    Setting,
    Memberships,
    Membership(i64),
    /// Captcha answer written by the captcha issuer.
    Captcha(String),
}

impl CacheKey {
    /// Short label used for metrics; never includes ids.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheKey::Categories => "categories",
            CacheKey::Category(_) => "category",
            CacheKey::CourseList { .. } => "courses",
            CacheKey::Course(_) => "course",
            CacheKey::User(_) => "user",
            CacheKey::CourseChapters(_) => "chapters",
            CacheKey::Chapter(_) => "chapter",
            CacheKey::ArticleList { .. } => "articles",
            CacheKey::Article(_) => "article",
            CacheKey::Setting => "setting",
            CacheKey::Memberships => "memberships",
            CacheKey::Membership(_) => "membership",
            CacheKey::Captcha(_) => "captcha",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Categories => f.write_str("categories"),
            CacheKey::Category(id) => write!(f, "category:{id}"),
            CacheKey::CourseList {
                category_id,
                page,
                size,
            } => write!(f, "courses:{category_id}:{page}:{size}"),
            CacheKey::Course(id) => write!(f, "course:{id}"),
            CacheKey::User(id) => write!(f, "user:{id}"),
            CacheKey::CourseChapters(course_id) => write!(f, "chapters:{course_id}"),
            CacheKey::Chapter(id) => write!(f, "chapter:{id}"),
            CacheKey::ArticleList { page, size } => write!(f, "articles:{page}:{size}"),
            CacheKey::Article(id) => write!(f, "article:{id}"),
            CacheKey::Setting => f.write_str("setting"),
            CacheKey::Memberships => f.write_str("memberships"),
            CacheKey::Membership(id) => write!(f, "membership:{id}"),
            CacheKey::Captcha(key) => write!(f, "captcha:{key}"),
        }
    }
}

/// A wildcard family of list keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPattern {
    /// Every page of one category's course list.
    CourseListsIn(i64),
    /// Every page of every course list.
    AllCourseLists,
    /// Every page of the public article list.
    ArticleLists,
}

impl KeyPattern {
    pub fn matches(&self, key: &str) -> bool {
        glob_match(&self.to_string(), key)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPattern::CourseListsIn(category_id) => write!(f, "courses:{category_id}:*"),
            KeyPattern::AllCourseLists => f.write_str("courses:*"),
            KeyPattern::ArticleLists => f.write_str("articles:*"),
        }
    }
}

/// Redis-style glob matching restricted to `*` and `?`.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut resume = 0usize;

    while k < key.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == key[k]) {
            p += 1;
            k += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            resume = k;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            resume += 1;
            k = resume;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_strings_are_stable() {
        assert_eq!(CacheKey::Categories.to_string(), "categories");
        assert_eq!(CacheKey::Category(3).to_string(), "category:3");
        assert_eq!(
            CacheKey::CourseList {
                category_id: 1,
                page: 2,
                size: 10
            }
            .to_string(),
            "courses:1:2:10"
        );
        assert_eq!(CacheKey::CourseChapters(9).to_string(), "chapters:9");
        assert_eq!(
            CacheKey::ArticleList { page: 1, size: 10 }.to_string(),
            "articles:1:10"
        );
        assert_eq!(CacheKey::Setting.to_string(), "setting");
    }

    #[test]
    fn category_pattern_does_not_bleed_into_other_categories() {
        let pattern = KeyPattern::CourseListsIn(1);
        assert!(pattern.matches("courses:1:1:10"));
        assert!(!pattern.matches("courses:12:1:10"));
        assert!(!pattern.matches("course:1"));
    }

    #[test]
    fn all_course_lists_skips_details() {
        let pattern = KeyPattern::AllCourseLists;
        assert!(pattern.matches("courses:7:3:20"));
        assert!(!pattern.matches("course:7"));
        assert!(!pattern.matches("chapters:7"));
    }

    #[test]
    fn glob_handles_question_mark_and_trailing_star() {
        assert!(glob_match("a?c*", "abcdef"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("a?c", "ac"));
        assert!(glob_match("articles:*", "articles:1:10"));
        assert!(!glob_match("articles:*", "article:1"));
    }
}
