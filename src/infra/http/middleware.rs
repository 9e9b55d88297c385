use std::{sync::Arc, time::Instant};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::{
    application::{auth::AuthService, error::ErrorReport},
    domain::types::ROLE_ADMIN,
};

use super::{error::ApiError, extract::CurrentUser};

const SOURCE: &str = "infra::http::middleware";
const TOKEN_HEADER: &str = "token";

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "coursehub::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "coursehub::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "client request error",
            );
        }
    }

    response
}

/// Requires a valid token and inserts the `CurrentUser`.
pub async fn user_auth(
    State(auth): State<Arc<AuthService>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match authenticate(&auth, request.headers()).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

/// Like `user_auth`, and the user must be an administrator.
pub async fn admin_auth(
    State(auth): State<Arc<AuthService>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let user = match authenticate(&auth, request.headers()).await {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };
    if user.0.role != ROLE_ADMIN {
        return ApiError::unauthorized(SOURCE, "administrator access required").into_response();
    }
    request.extensions_mut().insert(user);
    next.run(request).await
}

async fn authenticate(auth: &AuthService, headers: &HeaderMap) -> Result<CurrentUser, ApiError> {
    let token = extract_token(headers)
        .ok_or_else(|| ApiError::unauthorized(SOURCE, "a token is required"))?;
    auth.authenticate(&token)
        .await
        .map(CurrentUser)
        .map_err(|err| ApiError::from_service(SOURCE, err))
}

/// `Authorization: Bearer <token>`, falling back to a bare `token` header.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Bearer "));
    let raw = bearer.or_else(|| {
        headers
            .get(TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
    })?;
    let token = raw.trim();
    (!token.is_empty()).then(|| token.to_string())
}
