//! Public read paths. Every value is served through the cache-aside layer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::application::error::ServiceError;
use crate::application::pagination::{PageParams, Pagination};
use crate::application::repos::{
    ArticlesRepo, CategoriesRepo, CategoryListScope, CategoryQueryFilter, ChaptersRepo,
    CoursesRepo, MembershipsRepo, SettingsRepo, UsersRepo,
};
use crate::cache::{CacheAside, CacheKey};
use crate::domain::entities::{
    ArticleRecord, CategoryRecord, ChapterRecord, ChapterSummary, CourseRecord, CourseSummary,
    MembershipRecord, SettingRecord, UserBrief,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseListPage {
    pub courses: Vec<CourseSummary>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleListPage {
    pub articles: Vec<ArticleRecord>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseDetail {
    pub course: CourseRecord,
    pub category: Option<CategoryRecord>,
    pub user: Option<UserBrief>,
    pub chapters: Vec<ChapterSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChapterDetail {
    pub chapter: ChapterRecord,
    pub course: CourseRecord,
    pub chapters: Vec<ChapterSummary>,
}

#[derive(Clone)]
pub struct CatalogRepos {
    pub categories: Arc<dyn CategoriesRepo>,
    pub courses: Arc<dyn CoursesRepo>,
    pub chapters: Arc<dyn ChaptersRepo>,
    pub articles: Arc<dyn ArticlesRepo>,
    pub users: Arc<dyn UsersRepo>,
    pub settings: Arc<dyn SettingsRepo>,
    pub memberships: Arc<dyn MembershipsRepo>,
}

#[derive(Clone)]
pub struct CatalogService {
    repos: CatalogRepos,
    cache: CacheAside,
}

impl CatalogService {
    pub fn new(repos: CatalogRepos, cache: CacheAside) -> Self {
        Self { repos, cache }
    }

    pub async fn categories(&self) -> Result<Vec<CategoryRecord>, ServiceError> {
        let repo = self.repos.categories.clone();
        self.cache
            .get_or_load(&CacheKey::Categories, || async move {
                repo.list_categories(CategoryListScope::Public, &CategoryQueryFilter::default())
                    .await
                    .map_err(ServiceError::from)
            })
            .await
    }

    pub async fn courses(
        &self,
        category_id: Option<i64>,
        page: PageParams,
    ) -> Result<CourseListPage, ServiceError> {
        let category_id = match category_id {
            Some(id) if id > 0 => id,
            _ => return Err(ServiceError::bad_request("categoryId is required")),
        };
        let key = CacheKey::CourseList {
            category_id,
            page: page.current_page,
            size: page.page_size,
        };
        let repo = self.repos.courses.clone();
        self.cache
            .get_or_load(&key, || async move {
                let rows = repo.list_courses_in_category(category_id, page).await?;
                Ok(CourseListPage {
                    pagination: page.pagination(rows.total),
                    courses: rows.items,
                })
            })
            .await
    }

    pub async fn course_detail(&self, id: i64) -> Result<CourseDetail, ServiceError> {
        let course = self.course(id).await?;
        let category = self.category(course.category_id).await?;
        let user = self.author(course.user_id).await?;
        let chapters = self.course_chapters(course.id).await?;
        Ok(CourseDetail {
            course,
            category,
            user,
            chapters,
        })
    }

    pub async fn chapter_detail(&self, id: i64) -> Result<ChapterDetail, ServiceError> {
        let repo = self.repos.chapters.clone();
        let chapter = self
            .cache
            .get_or_load(&CacheKey::Chapter(id), || async move {
                repo.find_chapter(id)
                    .await?
                    .ok_or(ServiceError::NotFound("chapter"))
            })
            .await?;
        let course = self.course(chapter.course_id).await?;
        let chapters = self.course_chapters(course.id).await?;
        Ok(ChapterDetail {
            chapter,
            course,
            chapters,
        })
    }

    pub async fn articles(&self, page: PageParams) -> Result<ArticleListPage, ServiceError> {
        let key = CacheKey::ArticleList {
            page: page.current_page,
            size: page.page_size,
        };
        let repo = self.repos.articles.clone();
        self.cache
            .get_or_load(&key, || async move {
                let rows = repo.list_public_articles(page).await?;
                Ok(ArticleListPage {
                    pagination: page.pagination(rows.total),
                    articles: rows.items,
                })
            })
            .await
    }

    pub async fn article(&self, id: i64) -> Result<ArticleRecord, ServiceError> {
        let repo = self.repos.articles.clone();
        let article = self
            .cache
            .get_or_load(&CacheKey::Article(id), || async move {
                repo.find_article(id, false)
                    .await?
                    .ok_or(ServiceError::NotFound("article"))
            })
            .await?;
        // The admin detail view shares this key and may have cached a trashed row.
        if article.is_deleted() {
            return Err(ServiceError::NotFound("article"));
        }
        Ok(article)
    }

    pub async fn setting(&self) -> Result<SettingRecord, ServiceError> {
        let repo = self.repos.settings.clone();
        self.cache
            .get_or_load(&CacheKey::Setting, || async move {
                repo.find_setting()
                    .await?
                    .ok_or(ServiceError::NotFound("setting"))
            })
            .await
    }

    pub async fn memberships(&self) -> Result<Vec<MembershipRecord>, ServiceError> {
        let repo = self.repos.memberships.clone();
        self.cache
            .get_or_load(&CacheKey::Memberships, || async move {
                repo.list_memberships().await.map_err(ServiceError::from)
            })
            .await
    }

    async fn course(&self, id: i64) -> Result<CourseRecord, ServiceError> {
        let repo = self.repos.courses.clone();
        self.cache
            .get_or_load(&CacheKey::Course(id), || async move {
                repo.find_course(id)
                    .await?
                    .ok_or(ServiceError::NotFound("course"))
            })
            .await
    }

    async fn category(&self, id: i64) -> Result<Option<CategoryRecord>, ServiceError> {
        let repo = self.repos.categories.clone();
        self.cache
            .get_or_load(&CacheKey::Category(id), || async move {
                repo.find_category(id).await.map_err(ServiceError::from)
            })
            .await
    }

    async fn author(&self, id: i64) -> Result<Option<UserBrief>, ServiceError> {
        let repo = self.repos.users.clone();
        self.cache
            .get_or_load(&CacheKey::User(id), || async move {
                let user = repo.find_user(id).await?;
                Ok(user.map(|user| UserBrief {
                    id: user.id,
                    username: user.username,
                    nickname: user.nickname,
                    avatar: user.avatar,
                }))
            })
            .await
    }

    async fn course_chapters(&self, course_id: i64) -> Result<Vec<ChapterSummary>, ServiceError> {
        let repo = self.repos.chapters.clone();
        self.cache
            .get_or_load(&CacheKey::CourseChapters(course_id), || async move {
                repo.list_course_chapters(course_id)
                    .await
                    .map_err(ServiceError::from)
            })
            .await
    }
}
