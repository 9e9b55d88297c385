//! WeChat mini-program login.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::application::auth::{TokenIssuer, TokenResponse};
use crate::application::error::ServiceError;
use crate::application::password::{hash_password, random_password};
use crate::application::repos::{CreateUserParams, UsersRepo};
use crate::domain::entities::UserRecord;
use crate::domain::types::{ROLE_USER, SEX_UNDISCLOSED};

pub const DEFAULT_NICKNAME: &str = "WeChat user";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WechatSession {
    pub openid: String,
}

/// Exchanges a login code for the user's openid.
#[async_trait]
pub trait WechatSessionClient: Send + Sync {
    async fn code_to_session(&self, code: &str) -> Result<WechatSession, ServiceError>;
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WechatSignInInput {
    pub code: Option<String>,
}

#[derive(Clone)]
pub struct WechatService {
    client: Arc<dyn WechatSessionClient>,
    users: Arc<dyn UsersRepo>,
    tokens: TokenIssuer,
}

impl WechatService {
    pub fn new(
        client: Arc<dyn WechatSessionClient>,
        users: Arc<dyn UsersRepo>,
        tokens: TokenIssuer,
    ) -> Self {
        Self {
            client,
            users,
            tokens,
        }
    }

    /// Find the account bound to the openid, creating one on first login.
    pub async fn sign_in(&self, input: WechatSignInInput) -> Result<TokenResponse, ServiceError> {
        let code = input
            .code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ServiceError::validation("code is required"))?;

        let session = self.client.code_to_session(code).await?;
        let user = match self.users.find_user_by_openid(&session.openid).await? {
            Some(user) => user,
            None => self.register(&session.openid).await?,
        };

        Ok(TokenResponse {
            token: self.tokens.issue(user.id)?,
        })
    }

    async fn register(&self, openid: &str) -> Result<UserRecord, ServiceError> {
        let handle = format!("wx-{}", Uuid::new_v4().simple());
        let params = CreateUserParams {
            email: format!("{handle}@clwy.cn"),
            username: handle,
            nickname: DEFAULT_NICKNAME.to_string(),
            password_hash: hash_password(&random_password())?,
            avatar: None,
            sex: SEX_UNDISCLOSED,
            company: None,
            introduce: None,
            role: ROLE_USER,
            openid: Some(openid.to_string()),
        };
        let user = self.users.create_user(params).await?;
        info!(user_id = user.id, "WeChat user registered");
        Ok(user)
    }
}
