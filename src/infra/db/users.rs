use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::{
        pagination::{Page, PageParams},
        repos::{CreateUserParams, RepoError, UpdateUserParams, UserQueryFilter, UsersRepo},
    },
    domain::entities::{UserCredentials, UserRecord},
};

use super::{
    PostgresRepositories, map_sqlx_error,
    util::{convert_count, like_pattern},
};

const USER_COLUMNS: &str = "id, email, username, nickname, avatar, sex, company, introduce, \
    role, openid, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    username: String,
    nickname: String,
    avatar: Option<String>,
    sex: i16,
    company: Option<String>,
    introduce: Option<String>,
    role: i16,
    openid: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            username: row.username,
            nickname: row.nickname,
            avatar: row.avatar,
            sex: row.sex,
            company: row.company,
            introduce: row.introduce,
            role: row.role,
            openid: row.openid,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CredentialsRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

impl From<CredentialsRow> for UserCredentials {
    fn from(row: CredentialsRow) -> Self {
        Self {
            user: row.user.into(),
            password_hash: row.password_hash,
        }
    }
}

impl PostgresRepositories {
    fn apply_user_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &UserQueryFilter) {
        qb.push(" WHERE 1=1");
        let text_filters = [
            ("email", filter.email.as_deref()),
            ("username", filter.username.as_deref()),
            ("nickname", filter.nickname.as_deref()),
        ];
        for (column, value) in text_filters {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                qb.push(format!(" AND {column} ILIKE "));
                qb.push_bind(like_pattern(value));
            }
        }
        if let Some(role) = filter.role {
            qb.push(" AND role = ");
            qb.push_bind(role);
        }
    }
}

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn list_admin_users(
        &self,
        filter: &UserQueryFilter,
        page: PageParams,
    ) -> Result<Page<UserRecord>, RepoError> {
        let (offset, limit) = page.sql_bounds();

        let mut qb = QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users"));
        Self::apply_user_filter(&mut qb, filter);
        qb.push(" ORDER BY id DESC OFFSET ");
        qb.push_bind(offset);
        qb.push(" LIMIT ");
        qb.push_bind(limit);
        let rows = qb
            .build_query_as::<UserRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM users");
        Self::apply_user_filter(&mut count, filter);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(Page {
            items: rows.into_iter().map(UserRecord::from).collect(),
            total: convert_count(total)?,
        })
    }

    async fn find_user(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(UserRecord::from))
    }

    async fn find_credentials(&self, login: &str) -> Result<Option<UserCredentials>, RepoError> {
        let row = sqlx::query_as::<_, CredentialsRow>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1 OR username = $1"
        ))
        .bind(login)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(UserCredentials::from))
    }

    async fn find_credentials_by_id(
        &self,
        id: i64,
    ) -> Result<Option<UserCredentials>, RepoError> {
        let row = sqlx::query_as::<_, CredentialsRow>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(UserCredentials::from))
    }

    async fn find_user_by_openid(&self, openid: &str) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE openid = $1"
        ))
        .bind(openid)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(UserRecord::from))
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users
                (email, username, nickname, password_hash, avatar, sex, company, introduce,
                 role, openid)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(params.email)
        .bind(params.username)
        .bind(params.nickname)
        .bind(params.password_hash)
        .bind(params.avatar)
        .bind(params.sex)
        .bind(params.company)
        .bind(params.introduce)
        .bind(params.role)
        .bind(params.openid)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update_user(
        &self,
        id: i64,
        params: UpdateUserParams,
    ) -> Result<UserRecord, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET email = COALESCE($2, email),
                   username = COALESCE($3, username),
                   nickname = COALESCE($4, nickname),
                   password_hash = COALESCE($5, password_hash),
                   avatar = COALESCE($6, avatar),
                   sex = COALESCE($7, sex),
                   company = COALESCE($8, company),
                   introduce = COALESCE($9, introduce),
                   role = COALESCE($10, role),
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(params.email)
        .bind(params.username)
        .bind(params.nickname)
        .bind(params.password_hash)
        .bind(params.avatar)
        .bind(params.sex)
        .bind(params.company)
        .bind(params.introduce)
        .bind(params.role)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        row.map(UserRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_user(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
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
