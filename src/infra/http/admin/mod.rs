//! Admin listener. Everything except sign-in and the health probe requires an
//! administrator token.

mod articles;
mod catalog;
mod health;
mod settings;
mod users;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::application::{
    admin::{
        articles::AdminArticleService, categories::AdminCategoryService,
        chapters::AdminChapterService, courses::AdminCourseService,
        memberships::AdminMembershipService, orders::AdminOrderService,
        settings::AdminSettingsService, users::AdminUserService,
    },
    auth::AuthService,
    error::ServiceError,
};

use super::{
    HealthProbe,
    error::ApiError,
    middleware::{admin_auth, log_responses, set_request_context},
    route_not_found,
};

#[derive(Clone)]
pub struct AdminState {
    pub auth: Arc<AuthService>,
    pub categories: Arc<AdminCategoryService>,
    pub courses: Arc<AdminCourseService>,
    pub chapters: Arc<AdminChapterService>,
    pub articles: Arc<AdminArticleService>,
    pub users: Arc<AdminUserService>,
    pub settings: Arc<AdminSettingsService>,
    pub memberships: Arc<AdminMembershipService>,
    pub orders: Arc<AdminOrderService>,
    pub health: Arc<dyn HealthProbe>,
}

pub fn build_admin_router(state: AdminState, max_body_bytes: usize) -> Router {
    let protected = Router::new()
        .route(
            "/categories",
            get(catalog::list_categories).post(catalog::create_category),
        )
        .route(
            "/categories/{id}",
            get(catalog::category_detail)
                .put(catalog::update_category)
                .delete(catalog::delete_category),
        )
        .route(
            "/courses",
            get(catalog::list_courses).post(catalog::create_course),
        )
        .route(
            "/courses/{id}",
            get(catalog::course_detail)
                .put(catalog::update_course)
                .delete(catalog::delete_course),
        )
        .route(
            "/chapters",
            get(catalog::list_chapters).post(catalog::create_chapter),
        )
        .route(
            "/chapters/{id}",
            get(catalog::chapter_detail)
                .put(catalog::update_chapter)
                .delete(catalog::delete_chapter),
        )
        .route(
            "/articles",
            get(articles::list_articles).post(articles::create_article),
        )
        .route("/articles/delete", post(articles::trash_articles))
        .route("/articles/restore", post(articles::restore_articles))
        .route("/articles/force_delete", post(articles::purge_articles))
        .route(
            "/articles/{id}",
            get(articles::article_detail).put(articles::update_article),
        )
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/me", get(users::current_admin))
        .route(
            "/users/{id}",
            get(users::user_detail)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route(
            "/settings",
            get(settings::setting_detail).put(settings::update_setting),
        )
        .route("/settings/flush-all", get(settings::flush_cache))
        .route("/settings/search-reindex", get(settings::reindex))
        .route(
            "/memberships",
            get(settings::list_memberships).post(settings::create_membership),
        )
        .route(
            "/memberships/{id}",
            get(settings::membership_detail)
                .put(settings::update_membership)
                .delete(settings::delete_membership),
        )
        .route("/orders", get(settings::list_orders))
        .route("/orders/{id}", get(settings::order_detail))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            admin_auth,
        ));

    let admin = Router::new()
        .route("/auth/sign_in", post(users::sign_in))
        .merge(protected);

    Router::new()
        .nest("/admin", admin)
        .route("/_health/db", get(health::db_health))
        .fallback(route_not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

type ApiResult<T> = Result<super::response::ApiSuccess<T>, ApiError>;

fn service_error(source: &'static str) -> impl Fn(ServiceError) -> ApiError {
    move |err| ApiError::from_service(source, err)
}
