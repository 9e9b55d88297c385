use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::repos::{
        CategoriesRepo, CategoryListScope, CategoryQueryFilter, CreateCategoryParams, RepoError,
        UpdateCategoryParams,
    },
    domain::entities::CategoryRecord,
};

use super::{
    PostgresRepositories, map_sqlx_error,
    util::{convert_count, like_pattern},
};

const CATEGORY_COLUMNS: &str = "id, name, rank, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    name: String,
    rank: i32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<CategoryRow> for CategoryRecord {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            rank: row.rank,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl CategoriesRepo for PostgresRepositories {
    async fn list_categories(
        &self,
        scope: CategoryListScope,
        filter: &CategoryQueryFilter,
    ) -> Result<Vec<CategoryRecord>, RepoError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE 1=1"));
        if let Some(name) = filter.name.as_deref().filter(|n| !n.is_empty()) {
            qb.push(" AND name ILIKE ");
            qb.push_bind(like_pattern(name));
        }
        qb.push(match scope {
            CategoryListScope::Public => " ORDER BY rank ASC, id DESC",
            CategoryListScope::Admin => " ORDER BY rank ASC, id ASC",
        });

        let rows = qb
            .build_query_as::<CategoryRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(CategoryRecord::from).collect())
    }

    async fn find_category(&self, id: i64) -> Result<Option<CategoryRecord>, RepoError> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(CategoryRecord::from))
    }

    async fn create_category(
        &self,
        params: CreateCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            "INSERT INTO categories (name, rank) VALUES ($1, $2) RETURNING {CATEGORY_COLUMNS}"
        ))
        .bind(params.name)
        .bind(params.rank)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update_category(
        &self,
        id: i64,
        params: UpdateCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            r#"
            UPDATE categories
               SET name = COALESCE($2, name),
                   rank = COALESCE($3, rank),
                   updated_at = now()
             WHERE id = $1
            RETURNING {CATEGORY_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(params.name)
        .bind(params.rank)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        row.map(CategoryRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_category(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn count_courses_in_category(&self, category_id: i64) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses WHERE category_id = $1")
            .bind(category_id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        convert_count(count)
    }
}
