use axum::{Extension, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::application::{
    admin::users::UserInput,
    auth::{SignInInput, TokenResponse},
    pagination::PageParams,
    repos::UserQueryFilter,
};
use crate::infra::http::{
    extract::{ApiJson, ApiPath, ApiQuery, CurrentUser},
    response::ApiSuccess,
};

use super::{AdminState, ApiResult, service_error};

const SOURCE: &str = "infra::http::admin::users";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct UserListQuery {
    email: Option<String>,
    username: Option<String>,
    nickname: Option<String>,
    role: Option<String>,
    current_page: Option<String>,
    page_size: Option<String>,
}

pub(super) async fn sign_in(
    State(state): State<AdminState>,
    ApiJson(input): ApiJson<SignInInput>,
) -> ApiResult<TokenResponse> {
    let token = state
        .auth
        .admin_sign_in(input)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok("Signed in.", token))
}

pub(super) async fn current_admin(Extension(admin): Extension<CurrentUser>) -> ApiResult<Value> {
    Ok(ApiSuccess::ok(
        "Fetched the current user.",
        json!({ "user": admin.0 }),
    ))
}

pub(super) async fn list_users(
    State(state): State<AdminState>,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> ApiResult<Value> {
    let page = PageParams::parse(query.current_page.as_deref(), query.page_size.as_deref());
    let filter = UserQueryFilter {
        email: query.email,
        username: query.username,
        nickname: query.nickname,
        role: query.role.as_deref().and_then(|r| r.trim().parse().ok()),
    };
    let users = state
        .users
        .list(&filter, page)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Fetched the user list.",
        json!({ "users": users.items, "pagination": page.pagination(users.total) }),
    ))
}

pub(super) async fn user_detail(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Value> {
    let user = state.users.get(id).await.map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok("Fetched the user.", json!({ "user": user })))
}

pub(super) async fn create_user(
    State(state): State<AdminState>,
    ApiJson(input): ApiJson<UserInput>,
) -> ApiResult<Value> {
    let user = state
        .users
        .create(input)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::created(
        "Created the user.",
        json!({ "user": user }),
    ))
}

pub(super) async fn update_user(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<UserInput>,
) -> ApiResult<Value> {
    let user = state
        .users
        .update(id, input)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok("Updated the user.", json!({ "user": user })))
}

pub(super) async fn delete_user(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Value> {
    state
        .users
        .delete(id)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::message("Deleted the user."))
}
