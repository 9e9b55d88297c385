use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::{
        pagination::{Page, PageParams},
        repos::{
            CourseQueryFilter, CoursesRepo, CreateCourseParams, RepoError, UpdateCourseParams,
        },
    },
    domain::entities::{AdminCourseRecord, CategoryBrief, CourseRecord, CourseSummary, UserBrief},
};

use super::{
    PostgresRepositories, map_sqlx_error,
    util::{convert_count, like_pattern},
};

const COURSE_COLUMNS: &str = "c.id, c.category_id, c.user_id, c.name, c.image, c.recommended, \
    c.introductory, c.content, c.free, c.likes_count, c.chapters_count, c.created_at, c.updated_at";

const RETURNING_COLUMNS: &str = "id, category_id, user_id, name, image, recommended, \
    introductory, content, free, likes_count, chapters_count, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct CourseRow {
    id: i64,
    category_id: i64,
    user_id: i64,
    name: String,
    image: Option<String>,
    recommended: bool,
    introductory: bool,
    content: Option<String>,
    free: bool,
    likes_count: i32,
    chapters_count: i32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<CourseRow> for CourseRecord {
    fn from(row: CourseRow) -> Self {
        Self {
            id: row.id,
            category_id: row.category_id,
            user_id: row.user_id,
            name: row.name,
            image: row.image,
            recommended: row.recommended,
            introductory: row.introductory,
            content: row.content,
            free: row.free,
            likes_count: row.likes_count,
            chapters_count: row.chapters_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CourseSummaryRow {
    id: i64,
    category_id: i64,
    user_id: i64,
    name: String,
    image: Option<String>,
    recommended: bool,
    introductory: bool,
    free: bool,
    likes_count: i32,
    chapters_count: i32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<CourseSummaryRow> for CourseSummary {
    fn from(row: CourseSummaryRow) -> Self {
        Self {
            id: row.id,
            category_id: row.category_id,
            user_id: row.user_id,
            name: row.name,
            image: row.image,
            recommended: row.recommended,
            introductory: row.introductory,
            free: row.free,
            likes_count: row.likes_count,
            chapters_count: row.chapters_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AdminCourseRow {
    #[sqlx(flatten)]
    course: CourseRow,
    category_name: Option<String>,
    author_username: Option<String>,
    author_nickname: Option<String>,
    author_avatar: Option<String>,
}

impl From<AdminCourseRow> for AdminCourseRecord {
    fn from(row: AdminCourseRow) -> Self {
        let category = row.category_name.map(|name| CategoryBrief {
            id: row.course.category_id,
            name,
        });
        let user = match (row.author_username, row.author_nickname) {
            (Some(username), Some(nickname)) => Some(UserBrief {
                id: row.course.user_id,
                username,
                nickname,
                avatar: row.author_avatar,
            }),
            _ => None,
        };
        Self {
            course: row.course.into(),
            category,
            user,
        }
    }
}

impl PostgresRepositories {
    fn push_admin_course_select(qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push("SELECT ");
        qb.push(COURSE_COLUMNS);
        qb.push(
            ", cat.name AS category_name, u.username AS author_username, \
             u.nickname AS author_nickname, u.avatar AS author_avatar \
             FROM courses c \
             LEFT JOIN categories cat ON cat.id = c.category_id \
             LEFT JOIN users u ON u.id = c.user_id",
        );
    }

    fn apply_course_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q CourseQueryFilter) {
        qb.push(" WHERE 1=1");
        if let Some(category_id) = filter.category_id {
            qb.push(" AND c.category_id = ");
            qb.push_bind(category_id);
        }
        if let Some(user_id) = filter.user_id {
            qb.push(" AND c.user_id = ");
            qb.push_bind(user_id);
        }
        if let Some(name) = filter.name.as_deref().filter(|n| !n.is_empty()) {
            qb.push(" AND c.name ILIKE ");
            qb.push_bind(like_pattern(name));
        }
        if let Some(recommended) = filter.recommended {
            qb.push(" AND c.recommended = ");
            qb.push_bind(recommended);
        }
        if let Some(introductory) = filter.introductory {
            qb.push(" AND c.introductory = ");
            qb.push_bind(introductory);
        }
    }

    async fn set_chapters_count(&self, course_id: i64, delta: i32) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE courses
               SET chapters_count = GREATEST(chapters_count + $2, 0)
             WHERE id = $1
            "#,
        )
        .bind(course_id)
        .bind(delta)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl CoursesRepo for PostgresRepositories {
    async fn list_courses_in_category(
        &self,
        category_id: i64,
        page: PageParams,
    ) -> Result<Page<CourseSummary>, RepoError> {
        let (offset, limit) = page.sql_bounds();
        let rows = sqlx::query_as::<_, CourseSummaryRow>(
            r#"
            SELECT id, category_id, user_id, name, image, recommended, introductory, free,
                   likes_count, chapters_count, created_at, updated_at
              FROM courses
             WHERE category_id = $1
             ORDER BY id DESC
             OFFSET $2 LIMIT $3
            "#,
        )
        .bind(category_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses WHERE category_id = $1")
            .bind(category_id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(Page {
            items: rows.into_iter().map(CourseSummary::from).collect(),
            total: convert_count(total)?,
        })
    }

    async fn list_admin_courses(
        &self,
        filter: &CourseQueryFilter,
        page: PageParams,
    ) -> Result<Page<AdminCourseRecord>, RepoError> {
        let (offset, limit) = page.sql_bounds();

        let mut qb = QueryBuilder::new("");
        Self::push_admin_course_select(&mut qb);
        Self::apply_course_filter(&mut qb, filter);
        qb.push(" ORDER BY c.id DESC OFFSET ");
        qb.push_bind(offset);
        qb.push(" LIMIT ");
        qb.push_bind(limit);
        let rows = qb
            .build_query_as::<AdminCourseRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM courses c");
        Self::apply_course_filter(&mut count, filter);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(Page {
            items: rows.into_iter().map(AdminCourseRecord::from).collect(),
            total: convert_count(total)?,
        })
    }

    async fn find_course(&self, id: i64) -> Result<Option<CourseRecord>, RepoError> {
        let row = sqlx::query_as::<_, CourseRow>(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses c WHERE c.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(CourseRecord::from))
    }

    async fn find_admin_course(&self, id: i64) -> Result<Option<AdminCourseRecord>, RepoError> {
        let mut qb = QueryBuilder::new("");
        Self::push_admin_course_select(&mut qb);
        qb.push(" WHERE c.id = ");
        qb.push_bind(id);
        let row = qb
            .build_query_as::<AdminCourseRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(AdminCourseRecord::from))
    }

    async fn create_course(&self, params: CreateCourseParams) -> Result<CourseRecord, RepoError> {
        let row = sqlx::query_as::<_, CourseRow>(&format!(
            r#"
            INSERT INTO courses
                (category_id, user_id, name, image, recommended, introductory, content, free)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {RETURNING_COLUMNS}
            "#
        ))
        .bind(params.category_id)
        .bind(params.user_id)
        .bind(params.name)
        .bind(params.image.is_some())
        .bind(params.image)
        .bind(params.recommended)
        .bind(params.introductory)
        .bind(params.content.is_some())
        .bind(params.content)
        .bind(params.free)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update_course(
        &self,
        id: i64,
        params: UpdateCourseParams,
    ) -> Result<CourseRecord, RepoError> {
        let row = sqlx::query_as::<_, CourseRow>(&format!(
            r#"
            UPDATE courses
               SET category_id = COALESCE($2, category_id),
                   name = COALESCE($3, name),
                   image = CASE WHEN $4 THEN $5 ELSE image END,
                   recommended = COALESCE($6, recommended),
                   introductory = COALESCE($7, introductory),
                   content = CASE WHEN $8 THEN $9 ELSE content END,
                   free = COALESCE($10, free),
                   updated_at = now()
             WHERE id = $1
            RETURNING {RETURNING_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(params.category_id)
        .bind(params.name)
        .bind(params.image.is_some())
        .bind(params.image.flatten())
        .bind(params.recommended)
        .bind(params.introductory)
        .bind(params.content.is_some())
        .bind(params.content.flatten())
        .bind(params.free)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        row.map(CourseRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_course(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn count_chapters_in_course(&self, course_id: i64) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chapters WHERE course_id = $1")
            .bind(course_id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        convert_count(count)
    }

    async fn increment_chapters_count(&self, course_id: i64) -> Result<(), RepoError> {
        self.set_chapters_count(course_id, 1).await
    }

    async fn decrement_chapters_count(&self, course_id: i64) -> Result<(), RepoError> {
        self.set_chapters_count(course_id, -1).await
    }

    async fn list_all_courses(&self) -> Result<Vec<CourseRecord>, RepoError> {
        let rows = sqlx::query_as::<_, CourseRow>(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses c ORDER BY c.id ASC"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(CourseRecord::from).collect())
    }
}
