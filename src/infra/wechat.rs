//! `jscode2session` client for mini-program login.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::application::error::ServiceError;
use crate::application::wechat::{WechatSession, WechatSessionClient};
use crate::config::WechatSettings;

use super::error::InfraError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpWechatClient {
    client: Client,
    endpoint: Url,
    appid: Option<String>,
    secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionResponse {
    openid: Option<String>,
    errcode: Option<i64>,
    errmsg: Option<String>,
}

impl HttpWechatClient {
    pub fn new(settings: &WechatSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| InfraError::configuration(format!("wechat client: {err}")))?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            appid: settings.appid.clone(),
            secret: settings.secret.clone(),
        })
    }
}

#[async_trait]
impl WechatSessionClient for HttpWechatClient {
    async fn code_to_session(&self, code: &str) -> Result<WechatSession, ServiceError> {
        let (Some(appid), Some(secret)) = (self.appid.as_deref(), self.secret.as_deref()) else {
            return Err(ServiceError::Internal(
                "wechat appid and secret are not configured".to_string(),
            ));
        };

        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("appid", appid)
            .append_pair("secret", secret)
            .append_pair("js_code", code)
            .append_pair("grant_type", "authorization_code");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| ServiceError::Upstream(format!("jscode2session: {err}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ServiceError::Upstream(format!("jscode2session: {err}")))?;
        if !status.is_success() {
            return Err(ServiceError::Upstream(format!(
                "jscode2session returned {status}"
            )));
        }
        debug!(status = status.as_u16(), "jscode2session answered");
        parse_session(&body)
    }
}

/// WeChat answers 200 with a JSON body even for rejected codes.
fn parse_session(body: &str) -> Result<WechatSession, ServiceError> {
    let parsed: SessionResponse = serde_json::from_str(body)
        .map_err(|err| ServiceError::Upstream(format!("jscode2session body: {err}")))?;

    if let Some(code) = parsed.errcode.filter(|code| *code != 0) {
        let message = parsed.errmsg.unwrap_or_default();
        warn!(errcode = code, errmsg = %message, "wechat rejected the login code");
        return Err(ServiceError::bad_request(format!(
            "wechat login failed: {message} ({code})"
        )));
    }

    parsed
        .openid
        .filter(|openid| !openid.is_empty())
        .map(|openid| WechatSession { openid })
        .ok_or_else(|| ServiceError::Upstream("jscode2session returned no openid".to_string()))
}
