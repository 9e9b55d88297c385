//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

use crate::application::pagination::{Page, PageParams};
use crate::domain::entities::{
    AdminCourseRecord, ArticleRecord, CategoryRecord, ChapterRecord, ChapterSummary,
    CourseRecord, CourseSummary, MembershipRecord, OrderRecord, SettingRecord, UserCredentials,
    UserRecord,
};
use crate::domain::types::{JobType, OrderStatus};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

// ----- categories -----

/// Public lists show newest first within a rank; admin lists oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryListScope {
    Public,
    Admin,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryQueryFilter {
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateCategoryParams {
    pub name: String,
    pub rank: i32,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateCategoryParams {
    pub name: Option<String>,
    pub rank: Option<i32>,
}

#[async_trait]
pub trait CategoriesRepo: Send + Sync {
    async fn list_categories(
        &self,
        scope: CategoryListScope,
        filter: &CategoryQueryFilter,
    ) -> Result<Vec<CategoryRecord>, RepoError>;

    async fn find_category(&self, id: i64) -> Result<Option<CategoryRecord>, RepoError>;

    async fn create_category(
        &self,
        params: CreateCategoryParams,
    ) -> Result<CategoryRecord, RepoError>;

    /// Returns `RepoError::NotFound` when the row does not exist.
    async fn update_category(
        &self,
        id: i64,
        params: UpdateCategoryParams,
    ) -> Result<CategoryRecord, RepoError>;

    async fn delete_category(&self, id: i64) -> Result<(), RepoError>;

    async fn count_courses_in_category(&self, category_id: i64) -> Result<u64, RepoError>;
}

// ----- courses -----

#[derive(Debug, Clone, Default)]
pub struct CourseQueryFilter {
    pub category_id: Option<i64>,
    pub user_id: Option<i64>,
    pub name: Option<String>,
    pub recommended: Option<bool>,
    pub introductory: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct CreateCourseParams {
    pub category_id: i64,
    pub user_id: i64,
    pub name: String,
    pub image: Option<String>,
    pub recommended: bool,
    pub introductory: bool,
    pub content: Option<String>,
    pub free: bool,
}

/// `None` keeps a column; `Some(None)` clears a nullable one.
#[derive(Debug, Clone, Default)]
pub struct UpdateCourseParams {
    pub category_id: Option<i64>,
    pub name: Option<String>,
    pub image: Option<Option<String>>,
    pub recommended: Option<bool>,
    pub introductory: Option<bool>,
    pub content: Option<Option<String>>,
    pub free: Option<bool>,
}

#[async_trait]
pub trait CoursesRepo: Send + Sync {
    async fn list_courses_in_category(
        &self,
        category_id: i64,
        page: PageParams,
    ) -> Result<Page<CourseSummary>, RepoError>;

    async fn list_admin_courses(
        &self,
        filter: &CourseQueryFilter,
        page: PageParams,
    ) -> Result<Page<AdminCourseRecord>, RepoError>;

    async fn find_course(&self, id: i64) -> Result<Option<CourseRecord>, RepoError>;

    async fn find_admin_course(&self, id: i64) -> Result<Option<AdminCourseRecord>, RepoError>;

    async fn create_course(&self, params: CreateCourseParams) -> Result<CourseRecord, RepoError>;

    async fn update_course(
        &self,
        id: i64,
        params: UpdateCourseParams,
    ) -> Result<CourseRecord, RepoError>;

    async fn delete_course(&self, id: i64) -> Result<(), RepoError>;

    async fn count_chapters_in_course(&self, course_id: i64) -> Result<u64, RepoError>;

    async fn increment_chapters_count(&self, course_id: i64) -> Result<(), RepoError>;

    /// Decrements but never below zero.
    async fn decrement_chapters_count(&self, course_id: i64) -> Result<(), RepoError>;

    async fn list_all_courses(&self) -> Result<Vec<CourseRecord>, RepoError>;
}

// ----- chapters -----

#[derive(Debug, Clone)]
pub struct ChapterQueryFilter {
    pub course_id: i64,
    pub title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateChapterParams {
    pub course_id: i64,
    pub title: String,
    pub content: Option<String>,
    pub video: Option<String>,
    pub rank: i32,
    pub free: bool,
}

/// `None` keeps a column; `Some(None)` clears a nullable one.
#[derive(Debug, Clone, Default)]
pub struct UpdateChapterParams {
    pub course_id: Option<i64>,
    pub title: Option<String>,
    pub content: Option<Option<String>>,
    pub video: Option<Option<String>>,
    pub rank: Option<i32>,
    pub free: Option<bool>,
}

#[async_trait]
pub trait ChaptersRepo: Send + Sync {
    /// Chapters of one course ordered rank ASC, id DESC, without bodies.
    async fn list_course_chapters(&self, course_id: i64)
    -> Result<Vec<ChapterSummary>, RepoError>;

    async fn list_admin_chapters(
        &self,
        filter: &ChapterQueryFilter,
        page: PageParams,
    ) -> Result<Page<ChapterRecord>, RepoError>;

    async fn find_chapter(&self, id: i64) -> Result<Option<ChapterRecord>, RepoError>;

    async fn create_chapter(&self, params: CreateChapterParams)
    -> Result<ChapterRecord, RepoError>;

    async fn update_chapter(
        &self,
        id: i64,
        params: UpdateChapterParams,
    ) -> Result<ChapterRecord, RepoError>;

    async fn delete_chapter(&self, id: i64) -> Result<(), RepoError>;

    async fn list_all_chapters(&self) -> Result<Vec<ChapterRecord>, RepoError>;
}

// ----- articles -----

#[derive(Debug, Clone, Default)]
pub struct ArticleQueryFilter {
    pub title: Option<String>,
    /// When true only soft-deleted rows are listed; otherwise only live rows.
    pub deleted: bool,
}

#[derive(Debug, Clone)]
pub struct CreateArticleParams {
    pub title: String,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateArticleParams {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[async_trait]
pub trait ArticlesRepo: Send + Sync {
    async fn list_public_articles(&self, page: PageParams)
    -> Result<Page<ArticleRecord>, RepoError>;

    async fn list_admin_articles(
        &self,
        filter: &ArticleQueryFilter,
        page: PageParams,
    ) -> Result<Page<ArticleRecord>, RepoError>;

    async fn find_article(
        &self,
        id: i64,
        include_deleted: bool,
    ) -> Result<Option<ArticleRecord>, RepoError>;

    async fn create_article(&self, params: CreateArticleParams)
    -> Result<ArticleRecord, RepoError>;

    /// Updates a live article; soft-deleted rows are `NotFound`.
    async fn update_article(
        &self,
        id: i64,
        params: UpdateArticleParams,
    ) -> Result<ArticleRecord, RepoError>;

    /// Each bulk operation returns the ids it actually changed.
    async fn soft_delete_articles(&self, ids: &[i64]) -> Result<Vec<i64>, RepoError>;

    async fn restore_articles(&self, ids: &[i64]) -> Result<Vec<i64>, RepoError>;

    async fn force_delete_articles(&self, ids: &[i64]) -> Result<Vec<i64>, RepoError>;
}

// ----- users -----

#[derive(Debug, Clone, Default)]
pub struct UserQueryFilter {
    pub email: Option<String>,
    pub username: Option<String>,
    pub nickname: Option<String>,
    pub role: Option<i16>,
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub email: String,
    pub username: String,
    pub nickname: String,
    pub password_hash: String,
    pub avatar: Option<String>,
    pub sex: i16,
    pub company: Option<String>,
    pub introduce: Option<String>,
    pub role: i16,
    pub openid: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateUserParams {
    pub email: Option<String>,
    pub username: Option<String>,
    pub nickname: Option<String>,
    pub password_hash: Option<String>,
    pub avatar: Option<String>,
    pub sex: Option<i16>,
    pub company: Option<String>,
    pub introduce: Option<String>,
    pub role: Option<i16>,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn list_admin_users(
        &self,
        filter: &UserQueryFilter,
        page: PageParams,
    ) -> Result<Page<UserRecord>, RepoError>;

    async fn find_user(&self, id: i64) -> Result<Option<UserRecord>, RepoError>;

    /// Look up by email or username.
    async fn find_credentials(&self, login: &str) -> Result<Option<UserCredentials>, RepoError>;

    async fn find_credentials_by_id(&self, id: i64)
    -> Result<Option<UserCredentials>, RepoError>;

    async fn find_user_by_openid(&self, openid: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;

    async fn update_user(
        &self,
        id: i64,
        params: UpdateUserParams,
    ) -> Result<UserRecord, RepoError>;

    async fn delete_user(&self, id: i64) -> Result<(), RepoError>;
}

// ----- settings -----

#[derive(Debug, Clone, Default)]
pub struct UpdateSettingParams {
    pub name: Option<String>,
    pub icp: Option<String>,
    pub copyright: Option<String>,
}

#[async_trait]
pub trait SettingsRepo: Send + Sync {
    async fn find_setting(&self) -> Result<Option<SettingRecord>, RepoError>;

    /// Updates the single settings row; `NotFound` when it was never seeded.
    async fn update_setting(&self, params: UpdateSettingParams)
    -> Result<SettingRecord, RepoError>;
}

// ----- memberships -----

#[derive(Debug, Clone)]
pub struct CreateMembershipParams {
    pub name: String,
    pub price: i64,
    pub duration_months: i32,
    pub rank: i32,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateMembershipParams {
    pub name: Option<String>,
    pub price: Option<i64>,
    pub duration_months: Option<i32>,
    pub rank: Option<i32>,
    pub description: Option<String>,
}

#[async_trait]
pub trait MembershipsRepo: Send + Sync {
    async fn list_memberships(&self) -> Result<Vec<MembershipRecord>, RepoError>;

    async fn find_membership(&self, id: i64) -> Result<Option<MembershipRecord>, RepoError>;

    async fn create_membership(
        &self,
        params: CreateMembershipParams,
    ) -> Result<MembershipRecord, RepoError>;

    async fn update_membership(
        &self,
        id: i64,
        params: UpdateMembershipParams,
    ) -> Result<MembershipRecord, RepoError>;

    async fn delete_membership(&self, id: i64) -> Result<(), RepoError>;
}

// ----- orders -----

#[derive(Debug, Clone, Default)]
pub struct OrderQueryFilter {
    pub user_id: Option<i64>,
    pub out_trade_no: Option<String>,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Clone)]
pub struct CreateOrderParams {
    pub out_trade_no: String,
    pub user_id: i64,
    pub membership_id: i64,
    pub subject: String,
    pub total_amount: i64,
}

#[async_trait]
pub trait OrdersRepo: Send + Sync {
    async fn create_order(&self, params: CreateOrderParams) -> Result<OrderRecord, RepoError>;

    async fn list_orders(
        &self,
        filter: &OrderQueryFilter,
        page: PageParams,
    ) -> Result<Page<OrderRecord>, RepoError>;

    async fn find_order(&self, id: i64) -> Result<Option<OrderRecord>, RepoError>;

    async fn find_order_by_trade_no(
        &self,
        out_trade_no: &str,
    ) -> Result<Option<OrderRecord>, RepoError>;
}

// ----- jobs -----

#[derive(Debug, Clone, Serialize)]
pub struct NewJobRecord {
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub run_at: OffsetDateTime,
    pub max_attempts: i32,
    pub priority: i32,
}

#[async_trait]
pub trait JobsRepo: Send + Sync {
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError>;
}
