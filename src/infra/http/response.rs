//! Success envelope: `{status: true, message, data}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiSuccessBody<T> {
    pub status: bool,
    pub message: &'static str,
    pub data: T,
}

#[derive(Debug)]
pub struct ApiSuccess<T> {
    status: StatusCode,
    message: &'static str,
    data: T,
}

impl<T: Serialize> ApiSuccess<T> {
    pub fn ok(message: &'static str, data: T) -> Self {
        Self {
            status: StatusCode::OK,
            message,
            data,
        }
    }

    pub fn created(message: &'static str, data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            message,
            data,
        }
    }
}

impl ApiSuccess<serde_json::Value> {
    /// Success without a payload; `data` is an empty object.
    pub fn message(message: &'static str) -> Self {
        Self::ok(message, serde_json::json!({}))
    }
}

impl<T: Serialize> IntoResponse for ApiSuccess<T> {
    fn into_response(self) -> Response {
        let body = ApiSuccessBody {
            status: true,
            message: self.message,
            data: self.data,
        };
        (self.status, Json(body)).into_response()
    }
}
