mod admin;
pub mod error;
pub mod extract;
mod middleware;
mod public;
pub mod response;

pub use admin::{AdminState, build_admin_router};
pub use public::{PublicState, build_public_router};

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sqlx::Error as SqlxError;

use crate::application::error::ErrorReport;
use crate::infra::db::PostgresRepositories;

use self::error::ApiError;

/// Liveness of the primary store, served by `/_health/db`.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn ping(&self) -> Result<(), SqlxError>;
}

#[async_trait]
impl HealthProbe for PostgresRepositories {
    async fn ping(&self) -> Result<(), SqlxError> {
        self.health_check().await
    }
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

async fn route_not_found() -> Response {
    ApiError::not_found("infra::http::fallback", "route not found").into_response()
}

/// Numeric query values that fail to parse are treated as absent.
fn parse_id(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparsable_ids_are_absent() {
        assert_eq!(parse_id(Some("12")), Some(12));
        assert_eq!(parse_id(Some(" 3 ")), Some(3));
        assert_eq!(parse_id(Some("abc")), None);
        assert_eq!(parse_id(None), None);
    }

    #[test]
    fn failed_probe_is_unavailable() {
        let ok = db_health_response(Ok(()));
        assert_eq!(ok.status(), StatusCode::NO_CONTENT);
        let down = db_health_response(Err(SqlxError::PoolTimedOut));
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
