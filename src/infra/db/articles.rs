use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::{
        pagination::{Page, PageParams},
        repos::{
            ArticleQueryFilter, ArticlesRepo, CreateArticleParams, RepoError, UpdateArticleParams,
        },
    },
    domain::entities::ArticleRecord,
};

use super::{
    PostgresRepositories, map_sqlx_error,
    util::{convert_count, like_pattern},
};

const ARTICLE_COLUMNS: &str = "id, title, content, created_at, updated_at, deleted_at";

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: i64,
    title: String,
    content: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
}

impl From<ArticleRow> for ArticleRecord {
    fn from(row: ArticleRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

impl PostgresRepositories {
    fn apply_article_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ArticleQueryFilter) {
        if filter.deleted {
            qb.push(" WHERE deleted_at IS NOT NULL");
        } else {
            qb.push(" WHERE deleted_at IS NULL");
        }
        if let Some(title) = filter.title.as_deref().filter(|t| !t.is_empty()) {
            qb.push(" AND title ILIKE ");
            qb.push_bind(like_pattern(title));
        }
    }

    async fn page_articles(
        &self,
        filter: &ArticleQueryFilter,
        page: PageParams,
    ) -> Result<Page<ArticleRecord>, RepoError> {
        let (offset, limit) = page.sql_bounds();

        let mut qb = QueryBuilder::new(format!("SELECT {ARTICLE_COLUMNS} FROM articles"));
        Self::apply_article_filter(&mut qb, filter);
        qb.push(" ORDER BY id DESC OFFSET ");
        qb.push_bind(offset);
        qb.push(" LIMIT ");
        qb.push_bind(limit);
        let rows = qb
            .build_query_as::<ArticleRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM articles");
        Self::apply_article_filter(&mut count, filter);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(Page {
            items: rows.into_iter().map(ArticleRecord::from).collect(),
            total: convert_count(total)?,
        })
    }
}

#[async_trait]
impl ArticlesRepo for PostgresRepositories {
    async fn list_public_articles(
        &self,
        page: PageParams,
    ) -> Result<Page<ArticleRecord>, RepoError> {
        self.page_articles(&ArticleQueryFilter::default(), page).await
    }

    async fn list_admin_articles(
        &self,
        filter: &ArticleQueryFilter,
        page: PageParams,
    ) -> Result<Page<ArticleRecord>, RepoError> {
        self.page_articles(filter, page).await
    }

    async fn find_article(
        &self,
        id: i64,
        include_deleted: bool,
    ) -> Result<Option<ArticleRecord>, RepoError> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1 AND ($2 OR deleted_at IS NULL)"
        ))
        .bind(id)
        .bind(include_deleted)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(ArticleRecord::from))
    }

    async fn create_article(
        &self,
        params: CreateArticleParams,
    ) -> Result<ArticleRecord, RepoError> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "INSERT INTO articles (title, content) VALUES ($1, $2) RETURNING {ARTICLE_COLUMNS}"
        ))
        .bind(params.title)
        .bind(params.content)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update_article(
        &self,
        id: i64,
        params: UpdateArticleParams,
    ) -> Result<ArticleRecord, RepoError> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            r#"
            UPDATE articles
               SET title = COALESCE($2, title),
                   content = COALESCE($3, content),
                   updated_at = now()
             WHERE id = $1 AND deleted_at IS NULL
            RETURNING {ARTICLE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(params.title)
        .bind(params.content)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        row.map(ArticleRecord::from).ok_or(RepoError::NotFound)
    }

    async fn soft_delete_articles(&self, ids: &[i64]) -> Result<Vec<i64>, RepoError> {
        sqlx::query_scalar(
            r#"
            UPDATE articles SET deleted_at = now()
             WHERE id = ANY($1) AND deleted_at IS NULL
            RETURNING id
            "#,
        )
        .bind(ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn restore_articles(&self, ids: &[i64]) -> Result<Vec<i64>, RepoError> {
        sqlx::query_scalar(
            r#"
            UPDATE articles SET deleted_at = NULL
             WHERE id = ANY($1) AND deleted_at IS NOT NULL
            RETURNING id
            "#,
        )
        .bind(ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn force_delete_articles(&self, ids: &[i64]) -> Result<Vec<i64>, RepoError> {
        sqlx::query_scalar("DELETE FROM articles WHERE id = ANY($1) RETURNING id")
            .bind(ids)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}
