//! HTTP and WebSocket surface.
//!
//! Transport only: handlers decode the request, call into the core and map
//! the outcome. Long-running operations are spawned and report through the
//! hub; their endpoints answer 202 straight away.

mod error;
mod handlers;
mod ws;

pub use error::{ApiError, ApiResult};

use crate::config::DashboardConfig;
use crate::hub::HubHandle;
use crate::operator::Orchestrator;
use crate::remediation::RemediationEngine;
use crate::results::ResultsService;
use crate::scan::ScanService;
use axum::routing::{delete, get, post};
use axum::Router;
use prometheus::Registry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DashboardConfig>,
    pub orchestrator: Arc<Orchestrator>,
    pub engine: Arc<RemediationEngine>,
    pub scans: Arc<ScanService>,
    pub results: Arc<ResultsService>,
    pub hub: HubHandle,
    pub registry: Registry,
    /// Parent of every spawned run; cancelled on shutdown
    pub cancel: CancellationToken,
}

impl AppState {
    fn namespace(&self) -> &str {
        &self.config.namespace
    }
}

/// Create the dashboard router
pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Cluster and operator
        .route("/cluster/status", get(handlers::cluster_status))
        .route("/operator/status", get(handlers::operator_status))
        .route("/operator/install", post(handlers::install_operator))
        .route("/operator", delete(handlers::uninstall_operator))
        // Remediations
        .route("/remediations", get(handlers::list_remediations))
        .route(
            "/remediations/{name}",
            get(handlers::remediation_detail)
                .post(handlers::apply_remediation)
                .delete(handlers::remove_remediation),
        )
        .route("/remediations/severity/{severity}", post(handlers::apply_by_severity))
        // Scans
        .route("/scans", get(handlers::scan_status).post(handlers::create_scan))
        .route("/scans/recommended", post(handlers::create_recommended_scans))
        .route("/scans/periodic", post(handlers::create_periodic_scan))
        .route("/scans/{name}/rescan", post(handlers::rescan_suite))
        .route("/scans/{name}", delete(handlers::delete_scan))
        .route("/profiles", get(handlers::list_profiles))
        // Check results
        .route("/results", get(handlers::results))
        .route("/results/summary", get(handlers::results_summary))
        .route("/results/{name}", get(handlers::check_result));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/ws", get(ws::observe))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use cluster_client::MockClusterClient;
    use tower::ServiceExt;

    async fn status_of(app: Router, method: &str, uri: &str) -> StatusCode {
        let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        app.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_health_and_metrics_are_outside_api_prefix() {
        let (state, _observer) = create_test_state(None).await;
        let app = router(state);

        assert_eq!(status_of(app.clone(), "GET", "/health").await, StatusCode::OK);
        assert_eq!(status_of(app.clone(), "GET", "/metrics").await, StatusCode::OK);
        assert_eq!(status_of(app, "GET", "/api/health").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_routes_reach_handlers() {
        let (state, _observer) = create_test_state(Some(MockClusterClient::new())).await;
        let app = router(state);

        assert_eq!(status_of(app.clone(), "GET", "/api/remediations").await, StatusCode::OK);
        assert_eq!(status_of(app.clone(), "GET", "/api/scans").await, StatusCode::OK);
        assert_eq!(status_of(app.clone(), "GET", "/api/profiles").await, StatusCode::OK);
        assert_eq!(
            status_of(app.clone(), "POST", "/api/remediations/ocp4-cis-missing").await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(app.clone(), "POST", "/api/remediations/severity/urgent").await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(app.clone(), "POST", "/api/scans/unknown-suite/rescan").await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(app.clone(), "GET", "/api/results").await, StatusCode::OK);
        assert_eq!(
            status_of(app.clone(), "GET", "/api/results?severity=high&status=FAIL&scan=ocp4-cis").await,
            StatusCode::OK
        );
        assert_eq!(status_of(app.clone(), "GET", "/api/results/summary").await, StatusCode::OK);
        assert_eq!(
            status_of(app.clone(), "GET", "/api/results/ocp4-cis-missing").await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(app.clone(), "GET", "/api/remediations/ocp4-cis-missing").await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(app, "POST", "/api/scans/periodic").await, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_disconnected_cluster_status_still_answers() {
        let (state, _observer) = create_test_state(None).await;
        let app = router(state);

        assert_eq!(status_of(app.clone(), "GET", "/api/cluster/status").await, StatusCode::OK);
        assert_eq!(
            status_of(app, "GET", "/api/remediations").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
