use std::sync::Arc;

use serde::Deserialize;

use crate::application::error::ServiceError;
use crate::application::pagination::{Page, PageParams};
use crate::application::password::hash_password;
use crate::application::repos::{CreateUserParams, UpdateUserParams, UserQueryFilter, UsersRepo};
use crate::cache::CacheTrigger;
use crate::domain::entities::UserRecord;
use crate::domain::types::{ROLE_USER, SEX_UNDISCLOSED, is_known_role, is_known_sex};
use crate::domain::validation::Violations;

use super::trimmed;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInput {
    pub email: Option<String>,
    pub username: Option<String>,
    pub nickname: Option<String>,
    pub password: Option<String>,
    pub avatar: Option<String>,
    pub sex: Option<i16>,
    pub company: Option<String>,
    pub introduce: Option<String>,
    pub role: Option<i16>,
}

/// Rules shared by admin writes and self-service sign-up. On create every account
/// field is required; on update only the present ones are checked.
pub(crate) fn check_user_fields(v: &mut Violations, input: &UserInput, creating: bool) {
    if creating || input.email.is_some() {
        v.email("email", input.email.as_deref());
    }
    if creating {
        v.length("username", input.username.as_deref(), 2, 45);
        v.length("nickname", input.nickname.as_deref(), 2, 45);
        v.length("password", input.password.as_deref(), 6, 45);
    } else {
        v.optional_length("username", input.username.as_deref(), 2, 45);
        v.optional_length("nickname", input.nickname.as_deref(), 2, 45);
        v.optional_length("password", input.password.as_deref(), 6, 45);
    }
    v.url("avatar", input.avatar.as_deref());
    if let Some(sex) = input.sex {
        v.check(is_known_sex(sex), "sex must be 0, 1 or 2");
    }
    if let Some(role) = input.role {
        v.check(is_known_role(role), "role must be 0 or 100");
    }
}

#[derive(Clone)]
pub struct AdminUserService {
    repo: Arc<dyn UsersRepo>,
    cache: Arc<CacheTrigger>,
}

impl AdminUserService {
    pub fn new(repo: Arc<dyn UsersRepo>, cache: Arc<CacheTrigger>) -> Self {
        Self { repo, cache }
    }

    pub async fn list(
        &self,
        filter: &UserQueryFilter,
        page: PageParams,
    ) -> Result<Page<UserRecord>, ServiceError> {
        Ok(self.repo.list_admin_users(filter, page).await?)
    }

    pub async fn get(&self, id: i64) -> Result<UserRecord, ServiceError> {
        self.repo
            .find_user(id)
            .await?
            .ok_or(ServiceError::NotFound("user"))
    }

    pub async fn create(&self, input: UserInput) -> Result<UserRecord, ServiceError> {
        let mut v = Violations::new();
        check_user_fields(&mut v, &input, true);
        v.into_result()?;

        let params = CreateUserParams {
            email: trimmed(input.email).unwrap_or_default(),
            username: trimmed(input.username).unwrap_or_default(),
            nickname: trimmed(input.nickname).unwrap_or_default(),
            password_hash: hash_password(input.password.as_deref().unwrap_or_default())?,
            avatar: trimmed(input.avatar),
            sex: input.sex.unwrap_or(SEX_UNDISCLOSED),
            company: trimmed(input.company),
            introduce: input.introduce,
            role: input.role.unwrap_or(ROLE_USER),
            openid: None,
        };
        let user = self.repo.create_user(params).await?;
        self.cache.user_changed(user.id).await?;
        Ok(user)
    }

    pub async fn update(&self, id: i64, input: UserInput) -> Result<UserRecord, ServiceError> {
        let mut v = Violations::new();
        check_user_fields(&mut v, &input, false);
        v.into_result()?;

        let params = UpdateUserParams {
            email: trimmed(input.email),
            username: trimmed(input.username),
            nickname: trimmed(input.nickname),
            password_hash: input.password.as_deref().map(hash_password).transpose()?,
            avatar: trimmed(input.avatar),
            sex: input.sex,
            company: trimmed(input.company),
            introduce: input.introduce,
            role: input.role,
        };
        let user = self.repo.update_user(id, params).await?;
        self.cache.user_changed(id).await?;
        Ok(user)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        self.get(id).await?;
        self.repo.delete_user(id).await?;
        self.cache.user_changed(id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_requires_account_fields() {
        let mut v = Violations::new();
        check_user_fields(&mut v, &UserInput::default(), true);
        let err = v.into_result().unwrap_err();
        assert!(err.to_string().contains("email is required"));
        assert!(err.to_string().contains("password is required"));
    }

    #[test]
    fn update_checks_only_present_fields() {
        let mut v = Violations::new();
        let input = UserInput {
            sex: Some(2),
            ..Default::default()
        };
        check_user_fields(&mut v, &input, false);
        assert!(v.is_empty());

        let mut v = Violations::new();
        let input = UserInput {
            role: Some(50),
            ..Default::default()
        };
        check_user_fields(&mut v, &input, false);
        assert!(!v.is_empty());
    }
}
