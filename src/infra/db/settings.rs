use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{RepoError, SettingsRepo, UpdateSettingParams},
    domain::entities::SettingRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct SettingRow {
    id: i64,
    name: Option<String>,
    icp: Option<String>,
    copyright: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<SettingRow> for SettingRecord {
    fn from(row: SettingRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            icp: row.icp,
            copyright: row.copyright,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl SettingsRepo for PostgresRepositories {
    async fn find_setting(&self) -> Result<Option<SettingRecord>, RepoError> {
        let row = sqlx::query_as::<_, SettingRow>(
            r#"
            SELECT id, name, icp, copyright, created_at, updated_at
              FROM settings
             ORDER BY id ASC
             LIMIT 1
            "#,
        )
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(SettingRecord::from))
    }

    async fn update_setting(
        &self,
        params: UpdateSettingParams,
    ) -> Result<SettingRecord, RepoError> {
        let row = sqlx::query_as::<_, SettingRow>(
            r#"
            UPDATE settings
               SET name = COALESCE($1, name),
                   icp = COALESCE($2, icp),
                   copyright = COALESCE($3, copyright),
                   updated_at = now()
             WHERE id = (SELECT id FROM settings ORDER BY id ASC LIMIT 1)
            RETURNING id, name, icp, copyright, created_at, updated_at
            "#,
        )
        .bind(params.name)
        .bind(params.icp)
        .bind(params.copyright)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        row.map(SettingRecord::from).ok_or(RepoError::NotFound)
    }
}
