use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;

use crate::{
    application::{
        pagination::{Page, PageParams},
        repos::{
            ChapterQueryFilter, ChaptersRepo, CreateChapterParams, RepoError, UpdateChapterParams,
        },
    },
    domain::entities::{ChapterRecord, ChapterSummary},
};

use super::{
    PostgresRepositories, map_sqlx_error,
    util::{convert_count, like_pattern},
};

const CHAPTER_COLUMNS: &str =
    "id, course_id, title, content, video, rank, free, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ChapterRow {
    id: i64,
    course_id: i64,
    title: String,
    content: Option<String>,
    video: Option<String>,
    rank: i32,
    free: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ChapterRow> for ChapterRecord {
    fn from(row: ChapterRow) -> Self {
        Self {
            id: row.id,
            course_id: row.course_id,
            title: row.title,
            content: row.content,
            video: row.video,
            rank: row.rank,
            free: row.free,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ChapterSummaryRow {
    id: i64,
    course_id: i64,
    title: String,
    video: Option<String>,
    rank: i32,
    free: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ChapterSummaryRow> for ChapterSummary {
    fn from(row: ChapterSummaryRow) -> Self {
        Self {
            id: row.id,
            course_id: row.course_id,
            title: row.title,
            video: row.video,
            rank: row.rank,
            free: row.free,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl ChaptersRepo for PostgresRepositories {
    async fn list_course_chapters(
        &self,
        course_id: i64,
    ) -> Result<Vec<ChapterSummary>, RepoError> {
        let rows = sqlx::query_as::<_, ChapterSummaryRow>(
            r#"
            SELECT id, course_id, title, video, rank, free, created_at, updated_at
              FROM chapters
             WHERE course_id = $1
             ORDER BY rank ASC, id DESC
            "#,
        )
        .bind(course_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(ChapterSummary::from).collect())
    }

    async fn list_admin_chapters(
        &self,
        filter: &ChapterQueryFilter,
        page: PageParams,
    ) -> Result<Page<ChapterRecord>, RepoError> {
        let (offset, limit) = page.sql_bounds();
        let title = filter.title.as_deref().map(like_pattern);

        let mut qb = QueryBuilder::new(format!(
            "SELECT {CHAPTER_COLUMNS} FROM chapters WHERE course_id = "
        ));
        qb.push_bind(filter.course_id);
        if let Some(title) = title.clone() {
            qb.push(" AND title ILIKE ");
            qb.push_bind(title);
        }
        qb.push(" ORDER BY rank ASC, id DESC OFFSET ");
        qb.push_bind(offset);
        qb.push(" LIMIT ");
        qb.push_bind(limit);
        let rows = qb
            .build_query_as::<ChapterRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM chapters WHERE course_id = ");
        count.push_bind(filter.course_id);
        if let Some(title) = title {
            count.push(" AND title ILIKE ");
            count.push_bind(title);
        }
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(Page {
            items: rows.into_iter().map(ChapterRecord::from).collect(),
            total: convert_count(total)?,
        })
    }

    async fn find_chapter(&self, id: i64) -> Result<Option<ChapterRecord>, RepoError> {
        let row = sqlx::query_as::<_, ChapterRow>(&format!(
            "SELECT {CHAPTER_COLUMNS} FROM chapters WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(ChapterRecord::from))
    }

    async fn create_chapter(
        &self,
        params: CreateChapterParams,
    ) -> Result<ChapterRecord, RepoError> {
        let row = sqlx::query_as::<_, ChapterRow>(&format!(
            r#"
            INSERT INTO chapters (course_id, title, content, video, rank, free)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {CHAPTER_COLUMNS}
            "#
        ))
        .bind(params.course_id)
        .bind(params.title)
        .bind(params.content.is_some())
        .bind(params.content)
        .bind(params.video.is_some())
        .bind(params.video)
        .bind(params.rank)
        .bind(params.free)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update_chapter(
        &self,
        id: i64,
        params: UpdateChapterParams,
    ) -> Result<ChapterRecord, RepoError> {
        let row = sqlx::query_as::<_, ChapterRow>(&format!(
            r#"
            UPDATE chapters
               SET course_id = COALESCE($2, course_id),
                   title = COALESCE($3, title),
                   content = CASE WHEN $4 THEN $5 ELSE content END,
                   video = CASE WHEN $6 THEN $7 ELSE video END,
                   rank = COALESCE($8, rank),
                   free = COALESCE($9, free),
                   updated_at = now()
             WHERE id = $1
            RETURNING {CHAPTER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(params.course_id)
        .bind(params.title)
        .bind(params.content.is_some())
        .bind(params.content.flatten())
        .bind(params.video.is_some())
        .bind(params.video.flatten())
        .bind(params.rank)
        .bind(params.free)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        row.map(ChapterRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_chapter(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM chapters WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn list_all_chapters(&self) -> Result<Vec<ChapterRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ChapterRow>(&format!(
            "SELECT {CHAPTER_COLUMNS} FROM chapters ORDER BY id ASC"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(ChapterRecord::from).collect())
    }
}
