#![allow(dead_code)]

//! In-memory store, router harness and request helpers shared by the
//! integration tests.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header::CONTENT_TYPE},
};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::Error as SqlxError;
use time::OffsetDateTime;
use tower::ServiceExt;

use coursehub::application::{
    admin::{
        articles::AdminArticleService, categories::AdminCategoryService,
        chapters::AdminChapterService, courses::AdminCourseService,
        memberships::AdminMembershipService, orders::AdminOrderService,
        settings::AdminSettingsService, users::AdminUserService,
    },
    auth::{AuthOptions, AuthService, TokenIssuer},
    catalog::{CatalogRepos, CatalogService},
    error::ServiceError,
    index_sync::IndexSync,
    orders::OrderService,
    pagination::{Page, PageParams},
    password::hash_password,
    repos::*,
    search::SearchService,
    wechat::{WechatService, WechatSession, WechatSessionClient},
};
use coursehub::cache::{
    CacheAside, CacheConfig, CacheConsumer, CacheStore, CacheTrigger, MemoryStore,
    SideEffectPolicy,
};
use coursehub::domain::entities::*;
use coursehub::domain::types::{OrderStatus, ROLE_ADMIN, ROLE_USER, SEX_UNDISCLOSED};
use coursehub::infra::http::{
    AdminState, HealthProbe, PublicState, build_admin_router, build_public_router,
};
use coursehub::search::{
    MemoryIndex, SearchDocument, SearchError, SearchHits, SearchIndex, SearchQuery, SearchType,
};

pub const MAX_BODY_BYTES: usize = 4 * 1024;
pub const PASSWORD: &str = "secret123";

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

fn paged<T: Clone>(rows: Vec<T>, page: PageParams) -> Page<T> {
    let total = rows.len() as u64;
    let items = rows
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect();
    Page { items, total }
}

fn contains(haystack: &str, needle: &Option<String>) -> bool {
    match needle.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() => haystack.contains(n),
        _ => true,
    }
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    categories: BTreeMap<i64, CategoryRecord>,
    courses: BTreeMap<i64, CourseRecord>,
    chapters: BTreeMap<i64, ChapterRecord>,
    articles: BTreeMap<i64, ArticleRecord>,
    users: BTreeMap<i64, (UserRecord, String)>,
    setting: Option<SettingRecord>,
    memberships: BTreeMap<i64, MembershipRecord>,
    orders: BTreeMap<i64, OrderRecord>,
    jobs: Vec<NewJobRecord>,
}

impl Tables {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Implements every repository trait over plain maps. Orderings and unique
/// constraints follow the Postgres schema.
#[derive(Default)]
pub struct MemoryRepos {
    tables: Mutex<Tables>,
    /// Number of repository reads served, for cache hit assertions.
    reads: Mutex<u64>,
}

impl MemoryRepos {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("tables lock")
    }

    fn read(&self) {
        *self.reads.lock().expect("reads lock") += 1;
    }

    pub fn reads(&self) -> u64 {
        *self.reads.lock().expect("reads lock")
    }

    pub fn queued_jobs(&self) -> Vec<NewJobRecord> {
        self.tables().jobs.clone()
    }

    pub fn course(&self, id: i64) -> Option<CourseRecord> {
        self.tables().courses.get(&id).cloned()
    }

    pub fn seed_setting(&self) {
        let mut t = self.tables();
        let id = t.id();
        t.setting = Some(SettingRecord {
            id,
            name: Some("Course Hub".into()),
            icp: None,
            copyright: Some("(c) Course Hub".into()),
            created_at: now(),
            updated_at: now(),
        });
    }

    pub fn seed_user(&self, username: &str, role: i16) -> UserRecord {
        let mut t = self.tables();
        let id = t.id();
        let user = UserRecord {
            id,
            email: format!("{username}@example.com"),
            username: username.into(),
            nickname: username.into(),
            avatar: None,
            sex: SEX_UNDISCLOSED,
            company: None,
            introduce: None,
            role,
            openid: None,
            created_at: now(),
            updated_at: now(),
        };
        t.users.insert(id, (user.clone(), hash_password(PASSWORD).unwrap()));
        user
    }

    pub fn seed_article(&self, title: &str, deleted: bool) -> ArticleRecord {
        let mut t = self.tables();
        let id = t.id();
        let article = ArticleRecord {
            id,
            title: title.into(),
            content: Some(format!("{title} body")),
            created_at: now(),
            updated_at: now(),
            deleted_at: deleted.then(now),
        };
        t.articles.insert(id, article.clone());
        article
    }
}

fn course_summary(c: &CourseRecord) -> CourseSummary {
    CourseSummary {
        id: c.id,
        category_id: c.category_id,
        user_id: c.user_id,
        name: c.name.clone(),
        image: c.image.clone(),
        recommended: c.recommended,
        introductory: c.introductory,
        free: c.free,
        likes_count: c.likes_count,
        chapters_count: c.chapters_count,
        created_at: c.created_at,
        updated_at: c.updated_at,
    }
}

fn user_brief(u: &UserRecord) -> UserBrief {
    UserBrief {
        id: u.id,
        username: u.username.clone(),
        nickname: u.nickname.clone(),
        avatar: u.avatar.clone(),
    }
}

#[async_trait]
impl CategoriesRepo for MemoryRepos {
    async fn list_categories(
        &self,
        scope: CategoryListScope,
        filter: &CategoryQueryFilter,
    ) -> Result<Vec<CategoryRecord>, RepoError> {
        self.read();
        let mut rows: Vec<CategoryRecord> = self
            .tables()
            .categories
            .values()
            .filter(|c| contains(&c.name, &filter.name))
            .cloned()
            .collect();
        rows.sort_by(|a, b| match scope {
            CategoryListScope::Public => a.rank.cmp(&b.rank).then(b.id.cmp(&a.id)),
            CategoryListScope::Admin => a.rank.cmp(&b.rank).then(a.id.cmp(&b.id)),
        });
        Ok(rows)
    }

    async fn find_category(&self, id: i64) -> Result<Option<CategoryRecord>, RepoError> {
        self.read();
        Ok(self.tables().categories.get(&id).cloned())
    }

    async fn create_category(
        &self,
        params: CreateCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        let mut t = self.tables();
        if t.categories.values().any(|c| c.name == params.name) {
            return Err(RepoError::Duplicate {
                constraint: "categories_name_key".into(),
            });
        }
        let id = t.id();
        let record = CategoryRecord {
            id,
            name: params.name,
            rank: params.rank,
            created_at: now(),
            updated_at: now(),
        };
        t.categories.insert(id, record.clone());
        Ok(record)
    }

    async fn update_category(
        &self,
        id: i64,
        params: UpdateCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        let mut t = self.tables();
        let row = t.categories.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(name) = params.name {
            row.name = name;
        }
        if let Some(rank) = params.rank {
            row.rank = rank;
        }
        row.updated_at = now();
        Ok(row.clone())
    }

    async fn delete_category(&self, id: i64) -> Result<(), RepoError> {
        let mut t = self.tables();
        if t.courses.values().any(|c| c.category_id == id) {
            return Err(RepoError::Integrity {
                message: "courses_category_id_fkey".into(),
            });
        }
        t.categories.remove(&id).map(|_| ()).ok_or(RepoError::NotFound)
    }

    async fn count_courses_in_category(&self, category_id: i64) -> Result<u64, RepoError> {
        Ok(self
            .tables()
            .courses
            .values()
            .filter(|c| c.category_id == category_id)
            .count() as u64)
    }
}

#[async_trait]
impl CoursesRepo for MemoryRepos {
    async fn list_courses_in_category(
        &self,
        category_id: i64,
        page: PageParams,
    ) -> Result<Page<CourseSummary>, RepoError> {
        self.read();
        let rows: Vec<CourseSummary> = self
            .tables()
            .courses
            .values()
            .rev()
            .filter(|c| c.category_id == category_id)
            .map(course_summary)
            .collect();
        Ok(paged(rows, page))
    }

    async fn list_admin_courses(
        &self,
        filter: &CourseQueryFilter,
        page: PageParams,
    ) -> Result<Page<AdminCourseRecord>, RepoError> {
        let t = self.tables();
        let rows: Vec<AdminCourseRecord> = t
            .courses
            .values()
            .rev()
            .filter(|c| filter.category_id.is_none_or(|id| c.category_id == id))
            .filter(|c| filter.user_id.is_none_or(|id| c.user_id == id))
            .filter(|c| filter.recommended.is_none_or(|r| c.recommended == r))
            .filter(|c| filter.introductory.is_none_or(|i| c.introductory == i))
            .filter(|c| contains(&c.name, &filter.name))
            .map(|c| admin_course(&t, c))
            .collect();
        Ok(paged(rows, page))
    }

    async fn find_course(&self, id: i64) -> Result<Option<CourseRecord>, RepoError> {
        self.read();
        Ok(self.tables().courses.get(&id).cloned())
    }

    async fn find_admin_course(&self, id: i64) -> Result<Option<AdminCourseRecord>, RepoError> {
        let t = self.tables();
        Ok(t.courses.get(&id).map(|c| admin_course(&t, c)))
    }

    async fn create_course(&self, params: CreateCourseParams) -> Result<CourseRecord, RepoError> {
        let mut t = self.tables();
        let id = t.id();
        let record = CourseRecord {
            id,
            category_id: params.category_id,
            user_id: params.user_id,
            name: params.name,
            image: params.image,
            recommended: params.recommended,
            introductory: params.introductory,
            content: params.content,
            free: params.free,
            likes_count: 0,
            chapters_count: 0,
            created_at: now(),
            updated_at: now(),
        };
        t.courses.insert(id, record.clone());
        Ok(record)
    }

    async fn update_course(
        &self,
        id: i64,
        params: UpdateCourseParams,
    ) -> Result<CourseRecord, RepoError> {
        let mut t = self.tables();
        let row = t.courses.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(v) = params.category_id {
            row.category_id = v;
        }
        if let Some(v) = params.name {
            row.name = v;
        }
        if let Some(image) = params.image {
            row.image = image;
        }
        if let Some(v) = params.recommended {
            row.recommended = v;
        }
        if let Some(v) = params.introductory {
            row.introductory = v;
        }
        if let Some(content) = params.content {
            row.content = content;
        }
        if let Some(v) = params.free {
            row.free = v;
        }
        row.updated_at = now();
        Ok(row.clone())
    }

    async fn delete_course(&self, id: i64) -> Result<(), RepoError> {
        self.tables()
            .courses
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }

    async fn count_chapters_in_course(&self, course_id: i64) -> Result<u64, RepoError> {
        Ok(self
            .tables()
            .chapters
            .values()
            .filter(|c| c.course_id == course_id)
            .count() as u64)
    }

    async fn increment_chapters_count(&self, course_id: i64) -> Result<(), RepoError> {
        if let Some(course) = self.tables().courses.get_mut(&course_id) {
            course.chapters_count += 1;
        }
        Ok(())
    }

    async fn decrement_chapters_count(&self, course_id: i64) -> Result<(), RepoError> {
        if let Some(course) = self.tables().courses.get_mut(&course_id) {
            course.chapters_count = (course.chapters_count - 1).max(0);
        }
        Ok(())
    }

    async fn list_all_courses(&self) -> Result<Vec<CourseRecord>, RepoError> {
        Ok(self.tables().courses.values().cloned().collect())
    }
}

fn admin_course(t: &Tables, c: &CourseRecord) -> AdminCourseRecord {
    AdminCourseRecord {
        course: c.clone(),
        category: t.categories.get(&c.category_id).map(|cat| CategoryBrief {
            id: cat.id,
            name: cat.name.clone(),
        }),
        user: t.users.get(&c.user_id).map(|(u, _)| user_brief(u)),
    }
}

fn chapter_order(a: &ChapterRecord, b: &ChapterRecord) -> std::cmp::Ordering {
    a.rank.cmp(&b.rank).then(b.id.cmp(&a.id))
}

#[async_trait]
impl ChaptersRepo for MemoryRepos {
    async fn list_course_chapters(
        &self,
        course_id: i64,
    ) -> Result<Vec<ChapterSummary>, RepoError> {
        self.read();
        let mut rows: Vec<ChapterRecord> = self
            .tables()
            .chapters
            .values()
            .filter(|c| c.course_id == course_id)
            .cloned()
            .collect();
        rows.sort_by(chapter_order);
        Ok(rows.iter().map(ChapterSummary::from).collect())
    }

    async fn list_admin_chapters(
        &self,
        filter: &ChapterQueryFilter,
        page: PageParams,
    ) -> Result<Page<ChapterRecord>, RepoError> {
        let mut rows: Vec<ChapterRecord> = self
            .tables()
            .chapters
            .values()
            .filter(|c| c.course_id == filter.course_id)
            .filter(|c| contains(&c.title, &filter.title))
            .cloned()
            .collect();
        rows.sort_by(chapter_order);
        Ok(paged(rows, page))
    }

    async fn find_chapter(&self, id: i64) -> Result<Option<ChapterRecord>, RepoError> {
        self.read();
        Ok(self.tables().chapters.get(&id).cloned())
    }

    async fn create_chapter(
        &self,
        params: CreateChapterParams,
    ) -> Result<ChapterRecord, RepoError> {
        let mut t = self.tables();
        let id = t.id();
        let record = ChapterRecord {
            id,
            course_id: params.course_id,
            title: params.title,
            content: params.content,
            video: params.video,
            rank: params.rank,
            free: params.free,
            created_at: now(),
            updated_at: now(),
        };
        t.chapters.insert(id, record.clone());
        Ok(record)
    }

    async fn update_chapter(
        &self,
        id: i64,
        params: UpdateChapterParams,
    ) -> Result<ChapterRecord, RepoError> {
        let mut t = self.tables();
        let row = t.chapters.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(v) = params.course_id {
            row.course_id = v;
        }
        if let Some(v) = params.title {
            row.title = v;
        }
        if let Some(content) = params.content {
            row.content = content;
        }
        if let Some(video) = params.video {
            row.video = video;
        }
        if let Some(v) = params.rank {
            row.rank = v;
        }
        if let Some(v) = params.free {
            row.free = v;
        }
        row.updated_at = now();
        Ok(row.clone())
    }

    async fn delete_chapter(&self, id: i64) -> Result<(), RepoError> {
        self.tables()
            .chapters
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }

    async fn list_all_chapters(&self) -> Result<Vec<ChapterRecord>, RepoError> {
        Ok(self.tables().chapters.values().cloned().collect())
    }
}

#[async_trait]
impl ArticlesRepo for MemoryRepos {
    async fn list_public_articles(
        &self,
        page: PageParams,
    ) -> Result<Page<ArticleRecord>, RepoError> {
        self.read();
        let rows: Vec<ArticleRecord> = self
            .tables()
            .articles
            .values()
            .rev()
            .filter(|a| !a.is_deleted())
            .cloned()
            .collect();
        Ok(paged(rows, page))
    }

    async fn list_admin_articles(
        &self,
        filter: &ArticleQueryFilter,
        page: PageParams,
    ) -> Result<Page<ArticleRecord>, RepoError> {
        let rows: Vec<ArticleRecord> = self
            .tables()
            .articles
            .values()
            .rev()
            .filter(|a| a.is_deleted() == filter.deleted)
            .filter(|a| contains(&a.title, &filter.title))
            .cloned()
            .collect();
        Ok(paged(rows, page))
    }

    async fn find_article(
        &self,
        id: i64,
        include_deleted: bool,
    ) -> Result<Option<ArticleRecord>, RepoError> {
        self.read();
        Ok(self
            .tables()
            .articles
            .get(&id)
            .filter(|a| include_deleted || !a.is_deleted())
            .cloned())
    }

    async fn create_article(
        &self,
        params: CreateArticleParams,
    ) -> Result<ArticleRecord, RepoError> {
        let mut t = self.tables();
        let id = t.id();
        let record = ArticleRecord {
            id,
            title: params.title,
            content: params.content,
            created_at: now(),
            updated_at: now(),
            deleted_at: None,
        };
        t.articles.insert(id, record.clone());
        Ok(record)
    }

    async fn update_article(
        &self,
        id: i64,
        params: UpdateArticleParams,
    ) -> Result<ArticleRecord, RepoError> {
        let mut t = self.tables();
        let row = t
            .articles
            .get_mut(&id)
            .filter(|a| !a.is_deleted())
            .ok_or(RepoError::NotFound)?;
        if let Some(v) = params.title {
            row.title = v;
        }
        if params.content.is_some() {
            row.content = params.content;
        }
        row.updated_at = now();
        Ok(row.clone())
    }

    async fn soft_delete_articles(&self, ids: &[i64]) -> Result<Vec<i64>, RepoError> {
        let mut t = self.tables();
        let mut changed = Vec::new();
        for id in ids {
            if let Some(a) = t.articles.get_mut(id).filter(|a| !a.is_deleted()) {
                a.deleted_at = Some(now());
                changed.push(*id);
            }
        }
        Ok(changed)
    }

    async fn restore_articles(&self, ids: &[i64]) -> Result<Vec<i64>, RepoError> {
        let mut t = self.tables();
        let mut changed = Vec::new();
        for id in ids {
            if let Some(a) = t.articles.get_mut(id).filter(|a| a.is_deleted()) {
                a.deleted_at = None;
                changed.push(*id);
            }
        }
        Ok(changed)
    }

    async fn force_delete_articles(&self, ids: &[i64]) -> Result<Vec<i64>, RepoError> {
        let mut t = self.tables();
        Ok(ids
            .iter()
            .copied()
            .filter(|id| t.articles.remove(id).is_some())
            .collect())
    }
}

#[async_trait]
impl UsersRepo for MemoryRepos {
    async fn list_admin_users(
        &self,
        filter: &UserQueryFilter,
        page: PageParams,
    ) -> Result<Page<UserRecord>, RepoError> {
        let rows: Vec<UserRecord> = self
            .tables()
            .users
            .values()
            .rev()
            .map(|(u, _)| u)
            .filter(|u| contains(&u.email, &filter.email))
            .filter(|u| contains(&u.username, &filter.username))
            .filter(|u| contains(&u.nickname, &filter.nickname))
            .filter(|u| filter.role.is_none_or(|r| u.role == r))
            .cloned()
            .collect();
        Ok(paged(rows, page))
    }

    async fn find_user(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        self.read();
        Ok(self.tables().users.get(&id).map(|(u, _)| u.clone()))
    }

    async fn find_credentials(&self, login: &str) -> Result<Option<UserCredentials>, RepoError> {
        Ok(self
            .tables()
            .users
            .values()
            .find(|(u, _)| u.email == login || u.username == login)
            .map(|(user, hash)| UserCredentials {
                user: user.clone(),
                password_hash: hash.clone(),
            }))
    }

    async fn find_credentials_by_id(
        &self,
        id: i64,
    ) -> Result<Option<UserCredentials>, RepoError> {
        Ok(self
            .tables()
            .users
            .get(&id)
            .map(|(user, hash)| UserCredentials {
                user: user.clone(),
                password_hash: hash.clone(),
            }))
    }

    async fn find_user_by_openid(&self, openid: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .tables()
            .users
            .values()
            .find(|(u, _)| u.openid.as_deref() == Some(openid))
            .map(|(u, _)| u.clone()))
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut t = self.tables();
        check_unique_user(&t, None, Some(&params.email), Some(&params.username))?;
        let id = t.id();
        let user = UserRecord {
            id,
            email: params.email,
            username: params.username,
            nickname: params.nickname,
            avatar: params.avatar,
            sex: params.sex,
            company: params.company,
            introduce: params.introduce,
            role: params.role,
            openid: params.openid,
            created_at: now(),
            updated_at: now(),
        };
        t.users.insert(id, (user.clone(), params.password_hash));
        Ok(user)
    }

    async fn update_user(
        &self,
        id: i64,
        params: UpdateUserParams,
    ) -> Result<UserRecord, RepoError> {
        let mut t = self.tables();
        check_unique_user(
            &t,
            Some(id),
            params.email.as_deref(),
            params.username.as_deref(),
        )?;
        let (user, hash) = t.users.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(v) = params.email {
            user.email = v;
        }
        if let Some(v) = params.username {
            user.username = v;
        }
        if let Some(v) = params.nickname {
            user.nickname = v;
        }
        if let Some(v) = params.password_hash {
            *hash = v;
        }
        if params.avatar.is_some() {
            user.avatar = params.avatar;
        }
        if let Some(v) = params.sex {
            user.sex = v;
        }
        if params.company.is_some() {
            user.company = params.company;
        }
        if params.introduce.is_some() {
            user.introduce = params.introduce;
        }
        if let Some(v) = params.role {
            user.role = v;
        }
        user.updated_at = now();
        Ok(user.clone())
    }

    async fn delete_user(&self, id: i64) -> Result<(), RepoError> {
        self.tables()
            .users
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }
}

fn check_unique_user(
    t: &Tables,
    except: Option<i64>,
    email: Option<&str>,
    username: Option<&str>,
) -> Result<(), RepoError> {
    for (user, _) in t.users.values().filter(|(u, _)| Some(u.id) != except) {
        if email == Some(user.email.as_str()) {
            return Err(RepoError::Duplicate {
                constraint: "users_email_key".into(),
            });
        }
        if username == Some(user.username.as_str()) {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".into(),
            });
        }
    }
    Ok(())
}

#[async_trait]
impl SettingsRepo for MemoryRepos {
    async fn find_setting(&self) -> Result<Option<SettingRecord>, RepoError> {
        self.read();
        Ok(self.tables().setting.clone())
    }

    async fn update_setting(
        &self,
        params: UpdateSettingParams,
    ) -> Result<SettingRecord, RepoError> {
        let mut t = self.tables();
        let row = t.setting.as_mut().ok_or(RepoError::NotFound)?;
        if params.name.is_some() {
            row.name = params.name;
        }
        if params.icp.is_some() {
            row.icp = params.icp;
        }
        if params.copyright.is_some() {
            row.copyright = params.copyright;
        }
        row.updated_at = now();
        Ok(row.clone())
    }
}

#[async_trait]
impl MembershipsRepo for MemoryRepos {
    async fn list_memberships(&self) -> Result<Vec<MembershipRecord>, RepoError> {
        self.read();
        let mut rows: Vec<MembershipRecord> =
            self.tables().memberships.values().cloned().collect();
        rows.sort_by(|a, b| a.rank.cmp(&b.rank).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn find_membership(&self, id: i64) -> Result<Option<MembershipRecord>, RepoError> {
        self.read();
        Ok(self.tables().memberships.get(&id).cloned())
    }

    async fn create_membership(
        &self,
        params: CreateMembershipParams,
    ) -> Result<MembershipRecord, RepoError> {
        let mut t = self.tables();
        let id = t.id();
        let record = MembershipRecord {
            id,
            name: params.name,
            price: params.price,
            duration_months: params.duration_months,
            rank: params.rank,
            description: params.description,
            created_at: now(),
            updated_at: now(),
        };
        t.memberships.insert(id, record.clone());
        Ok(record)
    }

    async fn update_membership(
        &self,
        id: i64,
        params: UpdateMembershipParams,
    ) -> Result<MembershipRecord, RepoError> {
        let mut t = self.tables();
        let row = t.memberships.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(v) = params.name {
            row.name = v;
        }
        if let Some(v) = params.price {
            row.price = v;
        }
        if let Some(v) = params.duration_months {
            row.duration_months = v;
        }
        if let Some(v) = params.rank {
            row.rank = v;
        }
        if params.description.is_some() {
            row.description = params.description;
        }
        row.updated_at = now();
        Ok(row.clone())
    }

    async fn delete_membership(&self, id: i64) -> Result<(), RepoError> {
        self.tables()
            .memberships
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl OrdersRepo for MemoryRepos {
    async fn create_order(&self, params: CreateOrderParams) -> Result<OrderRecord, RepoError> {
        let mut t = self.tables();
        let id = t.id();
        let record = OrderRecord {
            id,
            out_trade_no: params.out_trade_no,
            user_id: params.user_id,
            membership_id: params.membership_id,
            subject: params.subject,
            total_amount: params.total_amount,
            status: OrderStatus::Pending,
            paid_at: None,
            created_at: now(),
            updated_at: now(),
        };
        t.orders.insert(id, record.clone());
        Ok(record)
    }

    async fn list_orders(
        &self,
        filter: &OrderQueryFilter,
        page: PageParams,
    ) -> Result<Page<OrderRecord>, RepoError> {
        let rows: Vec<OrderRecord> = self
            .tables()
            .orders
            .values()
            .rev()
            .filter(|o| filter.user_id.is_none_or(|id| o.user_id == id))
            .filter(|o| filter.status.is_none_or(|s| o.status == s))
            .filter(|o| {
                filter
                    .out_trade_no
                    .as_deref()
                    .is_none_or(|no| o.out_trade_no == no)
            })
            .cloned()
            .collect();
        Ok(paged(rows, page))
    }

    async fn find_order(&self, id: i64) -> Result<Option<OrderRecord>, RepoError> {
        Ok(self.tables().orders.get(&id).cloned())
    }

    async fn find_order_by_trade_no(
        &self,
        out_trade_no: &str,
    ) -> Result<Option<OrderRecord>, RepoError> {
        Ok(self
            .tables()
            .orders
            .values()
            .find(|o| o.out_trade_no == out_trade_no)
            .cloned())
    }
}

#[async_trait]
impl JobsRepo for MemoryRepos {
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError> {
        let mut t = self.tables();
        t.jobs.push(job);
        Ok(t.jobs.len().to_string())
    }
}

/// Search backend whose writes always fail; reads delegate to a memory index.
pub struct FailingIndex {
    pub inner: Arc<MemoryIndex>,
}

fn unavailable() -> SearchError {
    SearchError::backend("sync", "search engine unavailable")
}

#[async_trait]
impl SearchIndex for FailingIndex {
    async fn add_documents(
        &self,
        _index: SearchType,
        _docs: &[SearchDocument],
    ) -> Result<(), SearchError> {
        Err(unavailable())
    }

    async fn update_documents(
        &self,
        _index: SearchType,
        _docs: &[SearchDocument],
    ) -> Result<(), SearchError> {
        Err(unavailable())
    }

    async fn delete_document(&self, _index: SearchType, _id: i64) -> Result<(), SearchError> {
        Err(unavailable())
    }

    async fn search(
        &self,
        index: SearchType,
        query: &SearchQuery,
    ) -> Result<SearchHits, SearchError> {
        self.inner.search(index, query).await
    }

    async fn clear(&self, _index: SearchType) -> Result<(), SearchError> {
        Err(unavailable())
    }

    async fn configure(&self) -> Result<(), SearchError> {
        Ok(())
    }
}

/// Maps every login code to a stable openid.
pub struct FakeWechat;

#[async_trait]
impl WechatSessionClient for FakeWechat {
    async fn code_to_session(&self, code: &str) -> Result<WechatSession, ServiceError> {
        if code == "rejected" {
            return Err(ServiceError::bad_request("wechat login failed: invalid code (40029)"));
        }
        Ok(WechatSession {
            openid: format!("openid-{code}"),
        })
    }
}

pub struct HealthyProbe;

#[async_trait]
impl HealthProbe for HealthyProbe {
    async fn ping(&self) -> Result<(), SqlxError> {
        Ok(())
    }
}

/// Both routers wired over one in-memory store, cache and search index.
pub struct Harness {
    pub repos: Arc<MemoryRepos>,
    pub store: Arc<MemoryStore>,
    pub index: Arc<MemoryIndex>,
    pub tokens: TokenIssuer,
    pub public_state: PublicState,
    pub admin_state: AdminState,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(SideEffectPolicy::FailClosed, false)
    }

    /// `failing_search` swaps in a backend whose writes always fail.
    pub fn build(policy: SideEffectPolicy, failing_search: bool) -> Self {
        let repos = MemoryRepos::new();
        repos.seed_setting();
        let store = Arc::new(MemoryStore::new(
            NonZeroUsize::new(1_000).expect("non-zero capacity"),
        ));
        let index = Arc::new(MemoryIndex::new());
        let search: Arc<dyn SearchIndex> = if failing_search {
            Arc::new(FailingIndex {
                inner: index.clone(),
            })
        } else {
            index.clone()
        };

        let config = CacheConfig {
            side_effects: policy,
            ..Default::default()
        };
        let cache_store: Arc<dyn CacheStore> = store.clone();
        let consumer = Arc::new(CacheConsumer::new(cache_store.clone()));
        let trigger = Arc::new(CacheTrigger::new(&config, consumer));
        let reader = CacheAside::new(cache_store.clone());
        let tokens = TokenIssuer::new("integration-secret", 7);

        let sync = IndexSync::new(search.clone(), repos.clone(), repos.clone(), trigger.clone());
        let auth = Arc::new(AuthService::new(
            repos.clone(),
            repos.clone(),
            cache_store,
            trigger.clone(),
            tokens.clone(),
            AuthOptions {
                require_captcha: false,
            },
        ));

        let catalog = CatalogService::new(
            CatalogRepos {
                categories: repos.clone(),
                courses: repos.clone(),
                chapters: repos.clone(),
                articles: repos.clone(),
                users: repos.clone(),
                settings: repos.clone(),
                memberships: repos.clone(),
            },
            reader.clone(),
        );

        let public_state = PublicState {
            catalog: Arc::new(catalog),
            search: Arc::new(SearchService::new(search)),
            auth: auth.clone(),
            wechat: Arc::new(WechatService::new(
                Arc::new(FakeWechat),
                repos.clone(),
                tokens.clone(),
            )),
            orders: Arc::new(OrderService::new(repos.clone(), repos.clone())),
        };

        let admin_state = AdminState {
            auth,
            categories: Arc::new(AdminCategoryService::new(repos.clone(), trigger.clone())),
            courses: Arc::new(AdminCourseService::new(
                repos.clone(),
                repos.clone(),
                sync.clone(),
                trigger.clone(),
            )),
            chapters: Arc::new(AdminChapterService::new(
                repos.clone(),
                repos.clone(),
                sync.clone(),
            )),
            articles: Arc::new(AdminArticleService::new(
                repos.clone(),
                reader.clone(),
                trigger.clone(),
            )),
            users: Arc::new(AdminUserService::new(repos.clone(), trigger.clone())),
            settings: Arc::new(AdminSettingsService::new(repos.clone(), sync, trigger.clone())),
            memberships: Arc::new(AdminMembershipService::new(
                repos.clone(),
                reader,
                trigger,
            )),
            orders: Arc::new(AdminOrderService::new(repos.clone())),
            health: Arc::new(HealthyProbe),
        };

        Self {
            repos,
            store,
            index,
            tokens,
            public_state,
            admin_state,
        }
    }

    pub fn public(&self) -> Router {
        build_public_router(self.public_state.clone(), MAX_BODY_BYTES)
    }

    pub fn admin(&self) -> Router {
        build_admin_router(self.admin_state.clone(), MAX_BODY_BYTES)
    }

    /// Seed an administrator and return a token for it.
    pub fn admin_token(&self) -> String {
        let admin = self.repos.seed_user("root", ROLE_ADMIN);
        self.tokens.issue(admin.id).expect("issue admin token")
    }

    pub fn user_token(&self, username: &str) -> (UserRecord, String) {
        let user = self.repos.seed_user(username, ROLE_USER);
        let token = self.tokens.issue(user.id).expect("issue user token");
        (user, token)
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Send one request through a fresh clone of the router.
pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("build request");

    let response = router.clone().oneshot(request).await.expect("router call");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    TestResponse { status, body }
}

pub async fn get(router: &Router, uri: &str, token: Option<&str>) -> TestResponse {
    send(router, Method::GET, uri, token, None).await
}

pub async fn post(router: &Router, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
    send(router, Method::POST, uri, token, Some(body)).await
}

pub async fn put(router: &Router, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
    send(router, Method::PUT, uri, token, Some(body)).await
}

pub async fn delete(router: &Router, uri: &str, token: Option<&str>) -> TestResponse {
    send(router, Method::DELETE, uri, token, None).await
}
