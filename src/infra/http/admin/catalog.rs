//! Categories, courses and chapters.

use axum::{Extension, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::application::{
    admin::{categories::CategoryInput, chapters::ChapterInput, courses::CourseInput},
    pagination::PageParams,
    repos::{CategoryQueryFilter, CourseQueryFilter},
};
use crate::infra::http::{
    extract::{ApiJson, ApiPath, ApiQuery, CurrentUser},
    parse_id,
    response::ApiSuccess,
};

use super::{AdminState, ApiResult, service_error};

const SOURCE: &str = "infra::http::admin::catalog";

#[derive(Debug, Default, Deserialize)]
pub(super) struct CategoryListQuery {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CourseListQuery {
    category_id: Option<String>,
    user_id: Option<String>,
    name: Option<String>,
    recommended: Option<bool>,
    introductory: Option<bool>,
    current_page: Option<String>,
    page_size: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ChapterListQuery {
    course_id: Option<String>,
    title: Option<String>,
    current_page: Option<String>,
    page_size: Option<String>,
}

pub(super) async fn list_categories(
    State(state): State<AdminState>,
    ApiQuery(query): ApiQuery<CategoryListQuery>,
) -> ApiResult<Value> {
    let filter = CategoryQueryFilter { name: query.name };
    let categories = state
        .categories
        .list(&filter)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Fetched the category list.",
        json!({ "categories": categories }),
    ))
}

pub(super) async fn category_detail(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Value> {
    let category = state
        .categories
        .get(id)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Fetched the category.",
        json!({ "category": category }),
    ))
}

pub(super) async fn create_category(
    State(state): State<AdminState>,
    ApiJson(input): ApiJson<CategoryInput>,
) -> ApiResult<Value> {
    let category = state
        .categories
        .create(input)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::created(
        "Created the category.",
        json!({ "category": category }),
    ))
}

pub(super) async fn update_category(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<CategoryInput>,
) -> ApiResult<Value> {
    let category = state
        .categories
        .update(id, input)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Updated the category.",
        json!({ "category": category }),
    ))
}

pub(super) async fn delete_category(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Value> {
    state
        .categories
        .delete(id)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::message("Deleted the category."))
}

pub(super) async fn list_courses(
    State(state): State<AdminState>,
    ApiQuery(query): ApiQuery<CourseListQuery>,
) -> ApiResult<Value> {
    let page = PageParams::parse(query.current_page.as_deref(), query.page_size.as_deref());
    let filter = CourseQueryFilter {
        category_id: parse_id(query.category_id.as_deref()),
        user_id: parse_id(query.user_id.as_deref()),
        name: query.name,
        recommended: query.recommended,
        introductory: query.introductory,
    };
    let courses = state
        .courses
        .list(&filter, page)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Fetched the course list.",
        json!({ "courses": courses.items, "pagination": page.pagination(courses.total) }),
    ))
}

pub(super) async fn course_detail(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Value> {
    let course = state
        .courses
        .get(id)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Fetched the course.",
        json!({ "course": course }),
    ))
}

pub(super) async fn create_course(
    State(state): State<AdminState>,
    Extension(admin): Extension<CurrentUser>,
    ApiJson(input): ApiJson<CourseInput>,
) -> ApiResult<Value> {
    let course = state
        .courses
        .create(admin.id(), input)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::created(
        "Created the course.",
        json!({ "course": course }),
    ))
}

pub(super) async fn update_course(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<CourseInput>,
) -> ApiResult<Value> {
    let course = state
        .courses
        .update(id, input)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Updated the course.",
        json!({ "course": course }),
    ))
}

pub(super) async fn delete_course(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Value> {
    state
        .courses
        .delete(id)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::message("Deleted the course."))
}

pub(super) async fn list_chapters(
    State(state): State<AdminState>,
    ApiQuery(query): ApiQuery<ChapterListQuery>,
) -> ApiResult<Value> {
    let page = PageParams::parse(query.current_page.as_deref(), query.page_size.as_deref());
    let chapters = state
        .chapters
        .list(parse_id(query.course_id.as_deref()), query.title, page)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Fetched the chapter list.",
        json!({ "chapters": chapters.items, "pagination": page.pagination(chapters.total) }),
    ))
}

pub(super) async fn chapter_detail(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Value> {
    let chapter = state
        .chapters
        .get(id)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Fetched the chapter.",
        json!({ "chapter": chapter }),
    ))
}

pub(super) async fn create_chapter(
    State(state): State<AdminState>,
    ApiJson(input): ApiJson<ChapterInput>,
) -> ApiResult<Value> {
    let chapter = state
        .chapters
        .create(input)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::created(
        "Created the chapter.",
        json!({ "chapter": chapter }),
    ))
}

pub(super) async fn update_chapter(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<ChapterInput>,
) -> ApiResult<Value> {
    let chapter = state
        .chapters
        .update(id, input)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Updated the chapter.",
        json!({ "chapter": chapter }),
    ))
}

pub(super) async fn delete_chapter(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Value> {
    state
        .chapters
        .delete(id)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::message("Deleted the chapter."))
}
