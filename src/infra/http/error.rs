//! Failure envelope and the mapping from service errors to HTTP statuses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::application::{error::ErrorReport, error::ServiceError, repos::RepoError};

const GENERIC_SERVER_ERROR: &str = "internal server error";

/// Error kinds exposed to clients; the name is echoed in the envelope message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Validation,
    Unauthorized,
    NotFound,
    Conflict,
    PayloadTooLarge,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::BadRequest | ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequestError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Unauthorized => "UnauthorizedError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::Conflict => "ConflictError",
            ErrorKind::PayloadTooLarge => "PayloadTooLargeError",
            ErrorKind::Internal => "InternalServerError",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub status: bool,
    pub message: String,
    pub errors: Vec<String>,
}

#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    source: &'static str,
    errors: Vec<String>,
    /// Server-side diagnostics; never sent to the client.
    chain: Vec<String>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, source: &'static str, errors: Vec<String>) -> Self {
        Self {
            kind,
            source,
            chain: errors.clone(),
            errors,
        }
    }

    pub fn bad_request(source: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, source, vec![message.into()])
    }

    pub fn unauthorized(source: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, source, vec![message.into()])
    }

    pub fn not_found(source: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, source, vec![message.into()])
    }

    pub fn payload_too_large(source: &'static str) -> Self {
        Self::new(
            ErrorKind::PayloadTooLarge,
            source,
            vec!["request body is too large".to_string()],
        )
    }

    /// A 500 whose details only reach the logs.
    pub fn internal(source: &'static str, error: &dyn std::error::Error) -> Self {
        let report = ErrorReport::from_error(source, StatusCode::INTERNAL_SERVER_ERROR, error);
        Self {
            kind: ErrorKind::Internal,
            source,
            errors: vec![GENERIC_SERVER_ERROR.to_string()],
            chain: report.messages,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Map a service failure onto the client-facing taxonomy.
    pub fn from_service(source: &'static str, err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(messages) => {
                Self::new(ErrorKind::Validation, source, messages)
            }
            ServiceError::BadRequest(message) => Self::bad_request(source, message),
            ServiceError::Unauthorized(message) => Self::unauthorized(source, message),
            ServiceError::NotFound(entity) => Self::not_found(source, format!("{entity} not found")),
            ServiceError::Conflict(message) => Self::new(ErrorKind::Conflict, source, vec![message]),
            ServiceError::Repo(err) => Self::from_repo(source, err),
            ServiceError::Search(err) if err.is_client_error() => {
                Self::bad_request(source, err.to_string())
            }
            other => Self::internal(source, &other),
        }
    }

    pub fn from_repo(source: &'static str, err: RepoError) -> Self {
        match err {
            RepoError::Duplicate { constraint } => Self::new(
                ErrorKind::Validation,
                source,
                vec![format!("{} already exists", duplicate_field(&constraint))],
            ),
            RepoError::NotFound => Self::not_found(source, "resource not found"),
            RepoError::InvalidInput { message } => Self::bad_request(source, message),
            RepoError::Integrity { message } => {
                let mut err = Self::new(
                    ErrorKind::Conflict,
                    source,
                    vec!["the record is still referenced by other records".to_string()],
                );
                err.chain = vec![message];
                err
            }
            other => Self::internal(source, &other),
        }
    }
}

/// `users_email_key` → `email`.
fn duplicate_field(constraint: &str) -> &str {
    let trimmed = constraint.strip_suffix("_key").unwrap_or(constraint);
    match trimmed.split_once('_') {
        Some((_, field)) if !field.is_empty() => field,
        _ => trimmed,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        let body = ApiErrorBody {
            status: false,
            message: format!("Request failed: {}", self.kind.name()),
            errors: self.errors,
        };
        let mut response = (status, Json(body)).into_response();
        ErrorReport {
            source: self.source,
            status,
            messages: self.chain,
        }
        .attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheError;
    use crate::search::SearchError;

    #[test]
    fn taxonomy_maps_to_statuses() {
        let cases = [
            (ServiceError::validation("name is required"), 400),
            (ServiceError::bad_request("courseId is required"), 400),
            (ServiceError::unauthorized("bad token"), 401),
            (ServiceError::NotFound("course"), 404),
            (ServiceError::conflict("category 1 still has 2 courses"), 409),
            (ServiceError::Repo(RepoError::Integrity { message: "fk".into() }), 409),
            (ServiceError::Repo(RepoError::Timeout), 500),
            (ServiceError::Cache(CacheError::backend("delete", "down")), 500),
            (ServiceError::Search(SearchError::UnknownType("posts".into())), 400),
            (ServiceError::Search(SearchError::backend("search", "down")), 500),
        ];
        for (err, status) in cases {
            let api = ApiError::from_service("test", err);
            assert_eq!(api.kind().status().as_u16(), status);
        }
    }

    #[test]
    fn server_errors_hide_details() {
        let api = ApiError::from_service(
            "test",
            ServiceError::Cache(CacheError::backend("delete", "connection refused")),
        );
        assert_eq!(api.errors(), ["internal server error"]);
        assert!(api.chain.iter().any(|m| m.contains("connection refused")));
    }

    #[test]
    fn duplicate_names_the_field() {
        let api = ApiError::from_repo(
            "test",
            RepoError::Duplicate {
                constraint: "users_email_key".into(),
            },
        );
        assert_eq!(api.kind(), ErrorKind::Validation);
        assert_eq!(api.errors(), ["email already exists"]);
    }

    #[test]
    fn validation_keeps_every_message() {
        let api = ApiError::from_service(
            "test",
            ServiceError::Validation(vec!["a".into(), "b".into()]),
        );
        assert_eq!(api.errors().len(), 2);
    }
}
