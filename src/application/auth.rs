//! Sign-up, sign-in and bearer-token authentication.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

use crate::application::admin::users::{UserInput, check_user_fields};
use crate::application::admin::trimmed;
use crate::application::error::ServiceError;
use crate::application::jobs::{enqueue_mail_job, welcome_mail};
use crate::application::password::{hash_password, verify_password};
use crate::application::repos::{CreateUserParams, JobsRepo, UpdateUserParams, UsersRepo};
use crate::cache::{CacheKey, CacheStore, CacheTrigger};
use crate::domain::entities::UserRecord;
use crate::domain::types::{ROLE_ADMIN, ROLE_USER, SEX_UNDISCLOSED, is_known_sex};
use crate::domain::validation::Violations;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: i64,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Issues and verifies HS256 tokens carrying the user id.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: Arc<str>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_days: u32) -> Self {
        Self {
            secret: Arc::from(secret),
            ttl: Duration::days(i64::from(ttl_days)),
        }
    }

    pub fn issue(&self, user_id: i64) -> Result<String, ServiceError> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            user_id,
            iat: now.unix_timestamp(),
            exp: (now + self.ttl).unix_timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|err| ServiceError::Internal(format!("failed to sign token: {err}")))
    }

    /// Signature is checked by the library; expiry against our own clock.
    pub fn verify(&self, token: &str) -> Result<Claims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims = ["exp".to_string()].into_iter().collect();

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|err| ServiceError::unauthorized(format!("invalid token: {err}")))?;

        if data.claims.exp <= OffsetDateTime::now_utc().unix_timestamp() {
            return Err(ServiceError::unauthorized("token expired"));
        }
        Ok(data.claims)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpInput {
    pub email: Option<String>,
    pub username: Option<String>,
    pub nickname: Option<String>,
    pub password: Option<String>,
    pub captcha_key: Option<String>,
    pub captcha_text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInInput {
    pub login: Option<String>,
    pub password: Option<String>,
}

/// Self-service profile fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInput {
    pub nickname: Option<String>,
    pub sex: Option<i16>,
    pub company: Option<String>,
    pub introduce: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInput {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub current_password: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct AuthOptions {
    pub require_captcha: bool,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    jobs: Arc<dyn JobsRepo>,
    captchas: Arc<dyn CacheStore>,
    cache: Arc<CacheTrigger>,
    tokens: TokenIssuer,
    options: AuthOptions,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        jobs: Arc<dyn JobsRepo>,
        captchas: Arc<dyn CacheStore>,
        cache: Arc<CacheTrigger>,
        tokens: TokenIssuer,
        options: AuthOptions,
    ) -> Self {
        Self {
            users,
            jobs,
            captchas,
            cache,
            tokens,
            options,
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub async fn sign_up(&self, input: SignUpInput) -> Result<UserRecord, ServiceError> {
        if self.options.require_captcha {
            self.verify_captcha(input.captcha_key.as_deref(), input.captcha_text.as_deref())
                .await?;
        }

        let fields = UserInput {
            email: input.email,
            username: input.username,
            nickname: input.nickname,
            password: input.password,
            ..Default::default()
        };
        let mut v = Violations::new();
        check_user_fields(&mut v, &fields, true);
        v.into_result()?;

        let params = CreateUserParams {
            email: trimmed(fields.email).unwrap_or_default(),
            username: trimmed(fields.username).unwrap_or_default(),
            nickname: trimmed(fields.nickname).unwrap_or_default(),
            password_hash: hash_password(fields.password.as_deref().unwrap_or_default())?,
            avatar: None,
            sex: SEX_UNDISCLOSED,
            company: None,
            introduce: None,
            role: ROLE_USER,
            openid: None,
        };
        let user = self.users.create_user(params).await?;

        let queued = enqueue_mail_job(self.jobs.as_ref(), &welcome_mail(&user))
            .await
            .map(|job_id| debug!(job_id = %job_id, user_id = user.id, "Welcome mail queued"));
        self.cache.policy().settle("welcome_mail", queued)?;

        info!(user_id = user.id, "User signed up");
        Ok(user)
    }

    pub async fn sign_in(&self, input: SignInInput) -> Result<TokenResponse, ServiceError> {
        let user = self.check_credentials(input).await?;
        Ok(TokenResponse {
            token: self.tokens.issue(user.id)?,
        })
    }

    /// Same as `sign_in` but only administrators get a token.
    pub async fn admin_sign_in(&self, input: SignInInput) -> Result<TokenResponse, ServiceError> {
        let user = self.check_credentials(input).await?;
        if user.role != ROLE_ADMIN {
            return Err(ServiceError::unauthorized("administrator access required"));
        }
        Ok(TokenResponse {
            token: self.tokens.issue(user.id)?,
        })
    }

    /// Resolve a bearer token to a live user.
    pub async fn authenticate(&self, token: &str) -> Result<UserRecord, ServiceError> {
        let claims = self.tokens.verify(token)?;
        self.users
            .find_user(claims.user_id)
            .await?
            .ok_or_else(|| ServiceError::unauthorized("user no longer exists"))
    }

    pub async fn update_profile(
        &self,
        user_id: i64,
        input: ProfileInput,
    ) -> Result<UserRecord, ServiceError> {
        let mut v = Violations::new();
        v.optional_length("nickname", input.nickname.as_deref(), 2, 45);
        v.url("avatar", input.avatar.as_deref());
        if let Some(sex) = input.sex {
            v.check(is_known_sex(sex), "sex must be 0, 1 or 2");
        }
        v.into_result()?;

        let params = UpdateUserParams {
            nickname: trimmed(input.nickname),
            sex: input.sex,
            company: trimmed(input.company),
            introduce: input.introduce,
            avatar: trimmed(input.avatar),
            ..Default::default()
        };
        let user = self.users.update_user(user_id, params).await?;
        self.cache.user_changed(user_id).await?;
        Ok(user)
    }

    /// Changing login fields requires the current password.
    pub async fn update_account(
        &self,
        user_id: i64,
        input: AccountInput,
    ) -> Result<UserRecord, ServiceError> {
        let Some(current) = input.current_password.as_deref() else {
            return Err(ServiceError::validation("currentPassword is required"));
        };

        let fields = UserInput {
            email: input.email,
            username: input.username,
            password: input.password,
            ..Default::default()
        };
        let mut v = Violations::new();
        check_user_fields(&mut v, &fields, false);
        v.into_result()?;

        let credentials = self
            .users
            .find_credentials_by_id(user_id)
            .await?
            .ok_or(ServiceError::NotFound("user"))?;
        if !verify_password(current, &credentials.password_hash) {
            return Err(ServiceError::unauthorized("current password is incorrect"));
        }

        let params = UpdateUserParams {
            email: trimmed(fields.email),
            username: trimmed(fields.username),
            password_hash: fields.password.as_deref().map(hash_password).transpose()?,
            ..Default::default()
        };
        let user = self.users.update_user(user_id, params).await?;
        self.cache.user_changed(user_id).await?;
        Ok(user)
    }

    async fn check_credentials(&self, input: SignInInput) -> Result<UserRecord, ServiceError> {
        let mut v = Violations::new();
        v.check(
            input.login.as_deref().is_some_and(|l| !l.trim().is_empty()),
            "login is required",
        );
        v.check(
            input.password.as_deref().is_some_and(|p| !p.is_empty()),
            "password is required",
        );
        v.into_result()?;

        let login = input.login.as_deref().unwrap_or_default().trim();
        let password = input.password.as_deref().unwrap_or_default();

        let credentials = self
            .users
            .find_credentials(login)
            .await?
            .ok_or(ServiceError::NotFound("user"))?;
        if !verify_password(password, &credentials.password_hash) {
            return Err(ServiceError::unauthorized("password is incorrect"));
        }
        Ok(credentials.user)
    }

    /// The answer is stored by the captcha issuer; it is single-use.
    async fn verify_captcha(
        &self,
        key: Option<&str>,
        text: Option<&str>,
    ) -> Result<(), ServiceError> {
        let (Some(key), Some(text)) = (key.filter(|k| !k.is_empty()), text) else {
            return Err(ServiceError::validation("captcha is required"));
        };
        let cache_key = CacheKey::Captcha(key.to_string()).to_string();
        let stored = self
            .captchas
            .get(&cache_key)
            .await?
            .ok_or_else(|| ServiceError::validation("captcha has expired"))?;
        let expected = serde_json::from_str::<String>(&stored).unwrap_or(stored);

        let expected = expected.trim().to_ascii_lowercase();
        let given = text.trim().to_ascii_lowercase();
        if !bool::from(expected.as_bytes().ct_eq(given.as_bytes())) {
            return Err(ServiceError::validation("captcha is incorrect"));
        }
        self.captchas.delete(&[cache_key]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_user_id() {
        let issuer = TokenIssuer::new("secret", 30);
        let token = issuer.issue(42).unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = TokenIssuer::new("secret", 30).issue(1).unwrap();
        let err = TokenIssuer::new("other", 30).verify(&token).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = TokenIssuer::new("secret", 0).issue(1).unwrap();
        let err = TokenIssuer::new("secret", 0).verify(&token).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn garbage_token_is_rejected() {
        let err = TokenIssuer::new("secret", 30).verify("abc.def").unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }
}
