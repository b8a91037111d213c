//! Mapping of core errors onto HTTP responses

use crate::error::DashboardError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cluster_client::ClusterError;
use serde::Serialize;
use tracing::error;

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

/// A core error on its way out of a handler
#[derive(Debug)]
pub struct ApiError(pub DashboardError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<DashboardError> for ApiError {
    fn from(err: DashboardError) -> Self {
        Self(err)
    }
}

impl From<ClusterError> for ApiError {
    fn from(err: ClusterError) -> Self {
        Self(err.into())
    }
}

impl From<prometheus::Error> for ApiError {
    fn from(err: prometheus::Error) -> Self {
        Self(err.into())
    }
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            DashboardError::RemediationNotFound(_)
            | DashboardError::ScanNotFound(_)
            | DashboardError::CheckResultNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            DashboardError::InvalidRemediation { .. } | DashboardError::InvalidRequest(_) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST")
            }
            DashboardError::NotConnected => (StatusCode::SERVICE_UNAVAILABLE, "NOT_CONNECTED"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        if status.is_server_error() {
            error!(error = %self.0, code, "Request failed");
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
            code,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_errors_map_to_4xx() {
        assert_eq!(
            ApiError(DashboardError::RemediationNotFound("x".to_string())).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(DashboardError::ScanNotFound("x".to_string())).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(DashboardError::CheckResultNotFound("x".to_string())).status(),
            (StatusCode::NOT_FOUND, "NOT_FOUND")
        );
        assert_eq!(
            ApiError(DashboardError::InvalidRemediation {
                name: "x".to_string(),
                reason: "no object".to_string()
            })
            .into_response()
            .status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_server_errors() {
        assert_eq!(
            ApiError(DashboardError::NotConnected).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        let cluster = ApiError::from(ClusterError::Api {
            code: 500,
            message: "etcd timeout".to_string(),
        });
        assert_eq!(cluster.status(), (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"));
    }
}
