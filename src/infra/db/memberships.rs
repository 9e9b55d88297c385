use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{
        CreateMembershipParams, MembershipsRepo, RepoError, UpdateMembershipParams,
    },
    domain::entities::MembershipRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const MEMBERSHIP_COLUMNS: &str =
    "id, name, price, duration_months, rank, description, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct MembershipRow {
    id: i64,
    name: String,
    price: i64,
    duration_months: i32,
    rank: i32,
    description: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<MembershipRow> for MembershipRecord {
    fn from(row: MembershipRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            price: row.price,
            duration_months: row.duration_months,
            rank: row.rank,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl MembershipsRepo for PostgresRepositories {
    async fn list_memberships(&self) -> Result<Vec<MembershipRecord>, RepoError> {
        let rows = sqlx::query_as::<_, MembershipRow>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships ORDER BY rank ASC, id ASC"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(MembershipRecord::from).collect())
    }

    async fn find_membership(&self, id: i64) -> Result<Option<MembershipRecord>, RepoError> {
        let row = sqlx::query_as::<_, MembershipRow>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(MembershipRecord::from))
    }

    async fn create_membership(
        &self,
        params: CreateMembershipParams,
    ) -> Result<MembershipRecord, RepoError> {
        let row = sqlx::query_as::<_, MembershipRow>(&format!(
            r#"
            INSERT INTO memberships (name, price, duration_months, rank, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {MEMBERSHIP_COLUMNS}
            "#
        ))
        .bind(params.name)
        .bind(params.price)
        .bind(params.duration_months)
        .bind(params.rank)
        .bind(params.description)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update_membership(
        &self,
        id: i64,
        params: UpdateMembershipParams,
    ) -> Result<MembershipRecord, RepoError> {
        let row = sqlx::query_as::<_, MembershipRow>(&format!(
            r#"
            UPDATE memberships
               SET name = COALESCE($2, name),
                   price = COALESCE($3, price),
                   duration_months = COALESCE($4, duration_months),
                   rank = COALESCE($5, rank),
                   description = COALESCE($6, description),
                   updated_at = now()
             WHERE id = $1
            RETURNING {MEMBERSHIP_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(params.name)
        .bind(params.price)
        .bind(params.duration_months)
        .bind(params.rank)
        .bind(params.description)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        row.map(MembershipRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_membership(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM memberships WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
