//! Domain entities mirrored from persistent storage.
//!
//! Records serialize with camelCase keys, which is the shape served to clients and
//! stored in the cache. They also deserialize so cached values round-trip.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::types::OrderStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecord {
    pub id: i64,
    pub name: String,
    pub rank: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBrief {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRecord {
    pub id: i64,
    pub category_id: i64,
    pub user_id: i64,
    pub name: String,
    pub image: Option<String>,
    pub recommended: bool,
    pub introductory: bool,
    pub content: Option<String>,
    pub free: bool,
    pub likes_count: i32,
    pub chapters_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Course row as it appears in public lists: everything but the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub id: i64,
    pub category_id: i64,
    pub user_id: i64,
    pub name: String,
    pub image: Option<String>,
    pub recommended: bool,
    pub introductory: bool,
    pub free: bool,
    pub likes_count: i32,
    pub chapters_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Admin list row with the owning category and author inlined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCourseRecord {
    #[serde(flatten)]
    pub course: CourseRecord,
    pub category: Option<CategoryBrief>,
    pub user: Option<UserBrief>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterRecord {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub content: Option<String>,
    pub video: Option<String>,
    pub rank: i32,
    pub free: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Chapter row as listed under a course: no body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterSummary {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub video: Option<String>,
    pub rank: i32,
    pub free: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&ChapterRecord> for ChapterSummary {
    fn from(chapter: &ChapterRecord) -> Self {
        Self {
            id: chapter.id,
            course_id: chapter.course_id,
            title: chapter.title.clone(),
            video: chapter.video.clone(),
            rank: chapter.rank,
            free: chapter.free,
            created_at: chapter.created_at,
            updated_at: chapter.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleRecord {
    pub id: i64,
    pub title: String,
    pub content: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub deleted_at: Option<OffsetDateTime>,
}

impl ArticleRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A user as exposed to clients. The password digest never leaves the store layer
/// and the WeChat openid is kept out of responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub nickname: String,
    pub avatar: Option<String>,
    pub sex: i16,
    pub company: Option<String>,
    pub introduce: Option<String>,
    pub role: i16,
    #[serde(skip)]
    pub openid: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBrief {
    pub id: i64,
    pub username: String,
    pub nickname: String,
    pub avatar: Option<String>,
}

/// Credentials pair loaded only for sign-in.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: UserRecord,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingRecord {
    pub id: i64,
    pub name: Option<String>,
    pub icp: Option<String>,
    pub copyright: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRecord {
    pub id: i64,
    pub name: String,
    /// Price in cents.
    pub price: i64,
    pub duration_months: i32,
    pub rank: i32,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub id: i64,
    pub out_trade_no: String,
    pub user_id: i64,
    pub membership_id: i64,
    pub subject: String,
    /// Amount in cents.
    pub total_amount: i64,
    pub status: OrderStatus,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub paid_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
