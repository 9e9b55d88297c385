//! Public listener: catalog reads, search, sign-in and the signed-in user's
//! account and orders.

use std::sync::Arc;

use axum::{
    Extension, Router,
    extract::{DefaultBodyLimit, State},
    middleware,
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::application::{
    auth::{AccountInput, AuthService, ProfileInput, SignInInput, SignUpInput, TokenResponse},
    catalog::{ArticleListPage, CatalogService, ChapterDetail, CourseDetail, CourseListPage},
    error::ServiceError,
    orders::{CreateOrderInput, OrderService},
    pagination::{PageParams, PageQuery},
    search::{SearchResultPage, SearchService},
    wechat::{WechatService, WechatSignInInput},
};

use super::{
    error::ApiError,
    parse_id, route_not_found,
    extract::{ApiJson, ApiPath, ApiQuery, CurrentUser},
    middleware::{log_responses, set_request_context, user_auth},
    response::ApiSuccess,
};

const SOURCE: &str = "infra::http::public";

type ApiResult<T> = Result<ApiSuccess<T>, ApiError>;

#[derive(Clone)]
pub struct PublicState {
    pub catalog: Arc<CatalogService>,
    pub search: Arc<SearchService>,
    pub auth: Arc<AuthService>,
    pub wechat: Arc<WechatService>,
    pub orders: Arc<OrderService>,
}

pub fn build_public_router(state: PublicState, max_body_bytes: usize) -> Router {
    let signed_in = Router::new()
        .route("/chapters/{id}", get(chapter_detail))
        .route("/users/me", get(current_user))
        .route("/users/info", put(update_info))
        .route("/users/account", put(update_account))
        .route("/wechat/me", get(current_user))
        .route("/wechat/update_info", put(update_info))
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/{out_trade_no}", get(order_detail))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            user_auth,
        ));

    Router::new()
        .route("/categories", get(categories))
        .route("/courses", get(courses))
        .route("/courses/{id}", get(course_detail))
        .route("/articles", get(articles))
        .route("/articles/{id}", get(article_detail))
        .route("/settings", get(setting))
        .route("/memberships", get(memberships))
        .route("/search", get(search))
        .route("/auth/sign_up", post(sign_up))
        .route("/auth/sign_in", post(sign_in))
        .route("/wechat/sign_in", post(wechat_sign_in))
        .merge(signed_in)
        .fallback(route_not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

fn service_error(err: ServiceError) -> ApiError {
    ApiError::from_service(SOURCE, err)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoursesQuery {
    category_id: Option<String>,
    current_page: Option<String>,
    page_size: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams {
    q: Option<String>,
    #[serde(rename = "type")]
    search_type: Option<String>,
    current_page: Option<String>,
    page_size: Option<String>,
}

async fn categories(State(state): State<PublicState>) -> ApiResult<serde_json::Value> {
    let categories = state.catalog.categories().await.map_err(service_error)?;
    Ok(ApiSuccess::ok(
        "Fetched the category list.",
        json!({ "categories": categories }),
    ))
}

async fn courses(
    State(state): State<PublicState>,
    ApiQuery(query): ApiQuery<CoursesQuery>,
) -> ApiResult<CourseListPage> {
    let page = PageParams::parse(query.current_page.as_deref(), query.page_size.as_deref());
    let data = state
        .catalog
        .courses(parse_id(query.category_id.as_deref()), page)
        .await
        .map_err(service_error)?;
    Ok(ApiSuccess::ok("Fetched the course list.", data))
}

async fn course_detail(
    State(state): State<PublicState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<CourseDetail> {
    let data = state
        .catalog
        .course_detail(id)
        .await
        .map_err(service_error)?;
    Ok(ApiSuccess::ok("Fetched the course.", data))
}

async fn chapter_detail(
    State(state): State<PublicState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<ChapterDetail> {
    let data = state
        .catalog
        .chapter_detail(id)
        .await
        .map_err(service_error)?;
    Ok(ApiSuccess::ok("Fetched the chapter.", data))
}

async fn articles(
    State(state): State<PublicState>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<ArticleListPage> {
    let data = state
        .catalog
        .articles(query.params())
        .await
        .map_err(service_error)?;
    Ok(ApiSuccess::ok("Fetched the article list.", data))
}

async fn article_detail(
    State(state): State<PublicState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<serde_json::Value> {
    let article = state.catalog.article(id).await.map_err(service_error)?;
    Ok(ApiSuccess::ok(
        "Fetched the article.",
        json!({ "article": article }),
    ))
}

async fn setting(State(state): State<PublicState>) -> ApiResult<serde_json::Value> {
    let setting = state.catalog.setting().await.map_err(service_error)?;
    Ok(ApiSuccess::ok(
        "Fetched the site settings.",
        json!({ "setting": setting }),
    ))
}

async fn memberships(State(state): State<PublicState>) -> ApiResult<serde_json::Value> {
    let memberships = state.catalog.memberships().await.map_err(service_error)?;
    Ok(ApiSuccess::ok(
        "Fetched the membership list.",
        json!({ "memberships": memberships }),
    ))
}

async fn search(
    State(state): State<PublicState>,
    ApiQuery(query): ApiQuery<SearchParams>,
) -> ApiResult<SearchResultPage> {
    let page = PageParams::parse(query.current_page.as_deref(), query.page_size.as_deref());
    let data = state
        .search
        .search(query.q.as_deref(), query.search_type.as_deref(), page)
        .await
        .map_err(service_error)?;
    Ok(ApiSuccess::ok("Search completed.", data))
}

async fn sign_up(
    State(state): State<PublicState>,
    ApiJson(input): ApiJson<SignUpInput>,
) -> ApiResult<serde_json::Value> {
    let user = state.auth.sign_up(input).await.map_err(service_error)?;
    Ok(ApiSuccess::created(
        "Signed up.",
        json!({ "user": user }),
    ))
}

async fn sign_in(
    State(state): State<PublicState>,
    ApiJson(input): ApiJson<SignInInput>,
) -> ApiResult<TokenResponse> {
    let token = state.auth.sign_in(input).await.map_err(service_error)?;
    Ok(ApiSuccess::ok("Signed in.", token))
}

async fn wechat_sign_in(
    State(state): State<PublicState>,
    ApiJson(input): ApiJson<WechatSignInInput>,
) -> ApiResult<TokenResponse> {
    let token = state.wechat.sign_in(input).await.map_err(service_error)?;
    Ok(ApiSuccess::ok("Signed in.", token))
}

async fn current_user(Extension(user): Extension<CurrentUser>) -> ApiResult<serde_json::Value> {
    Ok(ApiSuccess::ok(
        "Fetched the current user.",
        json!({ "user": user.0 }),
    ))
}

async fn update_info(
    State(state): State<PublicState>,
    Extension(user): Extension<CurrentUser>,
    ApiJson(input): ApiJson<ProfileInput>,
) -> ApiResult<serde_json::Value> {
    let user = state
        .auth
        .update_profile(user.id(), input)
        .await
        .map_err(service_error)?;
    Ok(ApiSuccess::ok(
        "Updated the user profile.",
        json!({ "user": user }),
    ))
}

async fn update_account(
    State(state): State<PublicState>,
    Extension(user): Extension<CurrentUser>,
    ApiJson(input): ApiJson<AccountInput>,
) -> ApiResult<serde_json::Value> {
    let user = state
        .auth
        .update_account(user.id(), input)
        .await
        .map_err(service_error)?;
    Ok(ApiSuccess::ok(
        "Updated the account.",
        json!({ "user": user }),
    ))
}

async fn create_order(
    State(state): State<PublicState>,
    Extension(user): Extension<CurrentUser>,
    ApiJson(input): ApiJson<CreateOrderInput>,
) -> ApiResult<serde_json::Value> {
    let order = state
        .orders
        .create(user.id(), input)
        .await
        .map_err(service_error)?;
    Ok(ApiSuccess::created(
        "Created the order.",
        json!({ "order": order }),
    ))
}

async fn list_orders(
    State(state): State<PublicState>,
    Extension(user): Extension<CurrentUser>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<serde_json::Value> {
    let page = query.params();
    let orders = state
        .orders
        .list(user.id(), page)
        .await
        .map_err(service_error)?;
    Ok(ApiSuccess::ok(
        "Fetched the order list.",
        json!({ "orders": orders.items, "pagination": page.pagination(orders.total) }),
    ))
}

async fn order_detail(
    State(state): State<PublicState>,
    Extension(user): Extension<CurrentUser>,
    ApiPath(out_trade_no): ApiPath<String>,
) -> ApiResult<serde_json::Value> {
    let order = state
        .orders
        .get(user.id(), &out_trade_no)
        .await
        .map_err(service_error)?;
    Ok(ApiSuccess::ok(
        "Fetched the order.",
        json!({ "order": order }),
    ))
}
