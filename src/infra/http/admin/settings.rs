//! Site settings, cache and index maintenance, memberships and orders.

use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::application::{
    admin::{memberships::MembershipInput, settings::SettingInput},
    index_sync::ReindexSummary,
    pagination::PageParams,
    repos::OrderQueryFilter,
};
use crate::domain::types::OrderStatus;
use crate::infra::http::{
    extract::{ApiJson, ApiPath, ApiQuery},
    parse_id,
    response::ApiSuccess,
};

use super::{AdminState, ApiResult, service_error};

const SOURCE: &str = "infra::http::admin::settings";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct OrderListQuery {
    user_id: Option<String>,
    out_trade_no: Option<String>,
    status: Option<OrderStatus>,
    current_page: Option<String>,
    page_size: Option<String>,
}

pub(super) async fn setting_detail(State(state): State<AdminState>) -> ApiResult<Value> {
    let setting = state.settings.get().await.map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Fetched the site settings.",
        json!({ "setting": setting }),
    ))
}

pub(super) async fn update_setting(
    State(state): State<AdminState>,
    ApiJson(input): ApiJson<SettingInput>,
) -> ApiResult<Value> {
    let setting = state
        .settings
        .update(input)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Updated the site settings.",
        json!({ "setting": setting }),
    ))
}

pub(super) async fn flush_cache(State(state): State<AdminState>) -> ApiResult<Value> {
    state
        .settings
        .flush_cache()
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::message("Flushed the cache."))
}

pub(super) async fn reindex(State(state): State<AdminState>) -> ApiResult<ReindexSummary> {
    let summary = state
        .settings
        .reindex()
        .await
        .map_err(service_error(SOURCE))?;
    info!(
        courses = summary.courses,
        chapters = summary.chapters,
        "Search indexes rebuilt from the admin API"
    );
    Ok(ApiSuccess::ok("Rebuilt the search indexes.", summary))
}

pub(super) async fn list_memberships(State(state): State<AdminState>) -> ApiResult<Value> {
    let memberships = state
        .memberships
        .list()
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Fetched the membership list.",
        json!({ "memberships": memberships }),
    ))
}

pub(super) async fn membership_detail(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Value> {
    let membership = state
        .memberships
        .get(id)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Fetched the membership.",
        json!({ "membership": membership }),
    ))
}

pub(super) async fn create_membership(
    State(state): State<AdminState>,
    ApiJson(input): ApiJson<MembershipInput>,
) -> ApiResult<Value> {
    let membership = state
        .memberships
        .create(input)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::created(
        "Created the membership.",
        json!({ "membership": membership }),
    ))
}

pub(super) async fn update_membership(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<MembershipInput>,
) -> ApiResult<Value> {
    let membership = state
        .memberships
        .update(id, input)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Updated the membership.",
        json!({ "membership": membership }),
    ))
}

pub(super) async fn delete_membership(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Value> {
    state
        .memberships
        .delete(id)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::message("Deleted the membership."))
}

pub(super) async fn list_orders(
    State(state): State<AdminState>,
    ApiQuery(query): ApiQuery<OrderListQuery>,
) -> ApiResult<Value> {
    let page = PageParams::parse(query.current_page.as_deref(), query.page_size.as_deref());
    let filter = OrderQueryFilter {
        user_id: parse_id(query.user_id.as_deref()),
        out_trade_no: query.out_trade_no.filter(|no| !no.trim().is_empty()),
        status: query.status,
    };
    let orders = state
        .orders
        .list(&filter, page)
        .await
        .map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok(
        "Fetched the order list.",
        json!({ "orders": orders.items, "pagination": page.pagination(orders.total) }),
    ))
}

pub(super) async fn order_detail(
    State(state): State<AdminState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Value> {
    let order = state.orders.get(id).await.map_err(service_error(SOURCE))?;
    Ok(ApiSuccess::ok("Fetched the order.", json!({ "order": order })))
}
