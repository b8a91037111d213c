//! Request handlers

use super::{ApiError, ApiResult, AppState};
use crate::error::DashboardError;
use crate::metrics;
use crate::operator::relay_progress;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use compliance_types::{
    CheckResultDetail, ClusterStatus, Message, OperatorStatus, PeriodicScan, PeriodicScanOptions, ProfileInfo,
    RecommendedScans, RemediationDetail, RemediationInfo, RemediationResult, ResultFilter, ResultsSummary,
    ScanOptions, Severity, SuiteStatus,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{error, info};

/// Body of an install request. Both the body and the version are optional.
#[derive(Debug, Default, Deserialize)]
pub struct InstallRequest {
    #[serde(default)]
    pub version: Option<String>,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn metrics(State(state): State<AppState>) -> ApiResult<String> {
    Ok(metrics::export(&state.registry)?)
}

pub async fn cluster_status(State(state): State<AppState>) -> Json<ClusterStatus> {
    Json(state.orchestrator.cluster_status().await)
}

pub async fn operator_status(State(state): State<AppState>) -> Json<OperatorStatus> {
    Json(state.orchestrator.operator_status(state.namespace()).await)
}

/// Starts an install. Progress is broadcast as `install_progress`.
pub async fn install_operator(State(state): State<AppState>, body: Bytes) -> ApiResult<(StatusCode, Json<Value>)> {
    let request: InstallRequest = if body.is_empty() {
        InstallRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| DashboardError::InvalidRequest(format!("install body: {e}")))?
    };
    let version = request
        .version
        .filter(|v| !v.trim().is_empty())
        .or_else(|| state.config.operator_ref.clone());

    info!(namespace = state.namespace(), version = ?version, "Install requested");
    let progress = state
        .orchestrator
        .spawn_install(state.namespace().to_string(), version, state.cancel.child_token());
    tokio::spawn(async move {
        relay_progress(progress, state.hub.clone(), Message::InstallProgress, "install").await;
        let status = state.orchestrator.operator_status(state.namespace()).await;
        state.hub.broadcast(Message::OperatorStatus(status));
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "started" }))))
}

/// Starts an uninstall. Progress is broadcast as `uninstall_progress`.
pub async fn uninstall_operator(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    info!(namespace = state.namespace(), "Uninstall requested");
    let progress = state
        .orchestrator
        .spawn_uninstall(state.namespace().to_string(), state.cancel.child_token());
    tokio::spawn(async move {
        relay_progress(progress, state.hub.clone(), Message::UninstallProgress, "uninstall").await;
        let status = state.orchestrator.operator_status(state.namespace()).await;
        state.hub.broadcast(Message::OperatorStatus(status));
    });

    (StatusCode::ACCEPTED, Json(json!({ "status": "started" })))
}

pub async fn list_remediations(State(state): State<AppState>) -> ApiResult<Json<Vec<RemediationInfo>>> {
    Ok(Json(state.engine.list_remediations(state.namespace()).await?))
}

pub async fn remediation_detail(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<RemediationDetail>> {
    Ok(Json(state.engine.remediation_detail(state.namespace(), &name).await?))
}

pub async fn apply_remediation(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<RemediationResult>> {
    let outcome = state.engine.apply(state.namespace(), &name).await;
    publish_result(&state, &name, outcome)
}

pub async fn remove_remediation(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<RemediationResult>> {
    let outcome = state.engine.remove(state.namespace(), &name).await;
    publish_result(&state, &name, outcome)
}

/// Broadcasts the outcome of a single remediation call, failures included
fn publish_result(
    state: &AppState,
    name: &str,
    outcome: Result<RemediationResult, DashboardError>,
) -> ApiResult<Json<RemediationResult>> {
    match outcome {
        Ok(result) => {
            state.hub.broadcast(Message::RemediationResult(result.clone()));
            Ok(Json(result))
        }
        Err(e) => {
            state
                .hub
                .broadcast(Message::RemediationResult(RemediationResult::failed(name, e.to_string())));
            Err(ApiError(e))
        }
    }
}

/// Starts a severity batch. Each result is broadcast as `remediation_result`.
pub async fn apply_by_severity(
    State(state): State<AppState>,
    Path(severity): Path<String>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let severity = match severity.parse::<Severity>() {
        Ok(Severity::Unknown) | Err(_) => {
            return Err(DashboardError::InvalidRequest(format!(
                "severity must be high, medium or low, got {severity}"
            ))
            .into());
        }
        Ok(severity) => severity,
    };

    info!(namespace = state.namespace(), %severity, "Severity batch requested");
    let cancel = state.cancel.child_token();
    tokio::spawn(async move {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let hub = state.hub.clone();
        let relay = tokio::spawn(async move {
            while let Some(result) = rx.recv().await {
                hub.broadcast(Message::RemediationResult(result));
            }
        });

        if let Err(e) = state
            .engine
            .apply_by_severity(state.namespace(), severity, &tx, &cancel)
            .await
        {
            error!(%severity, error = %e, "Severity batch failed");
            state
                .hub
                .broadcast(Message::error(format!("Applying {severity} remediations failed: {e}")));
        }
        drop(tx);
        if let Err(e) = relay.await {
            error!(error = %e, "Result relay task failed");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "started", "severity": severity })),
    ))
}

pub async fn scan_status(State(state): State<AppState>) -> ApiResult<Json<Vec<SuiteStatus>>> {
    Ok(Json(state.scans.scan_status(state.namespace()).await?))
}

pub async fn create_scan(
    State(state): State<AppState>,
    Json(options): Json<ScanOptions>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    state.scans.create_scan(state.namespace(), &options).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "created", "name": options.name })),
    ))
}

/// Writes the periodic scan setting and bindings. An empty body takes every default.
pub async fn create_periodic_scan(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<PeriodicScan>)> {
    let options: PeriodicScanOptions = if body.is_empty() {
        PeriodicScanOptions::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| DashboardError::InvalidRequest(format!("periodic scan body: {e}")))?
    };
    info!(namespace = state.namespace(), schedule = %options.schedule, "Periodic scan requested");
    let scan = state.scans.create_periodic_scan(state.namespace(), &options).await?;
    Ok((StatusCode::CREATED, Json(scan)))
}

pub async fn create_recommended_scans(State(state): State<AppState>) -> ApiResult<Json<RecommendedScans>> {
    Ok(Json(state.scans.create_recommended_scans(state.namespace()).await?))
}

pub async fn rescan_suite(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Json<Value>> {
    let scans = state.scans.rescan_suite(state.namespace(), &name).await?;
    Ok(Json(json!({ "status": "rescanning", "suite": name, "scans": scans })))
}

pub async fn delete_scan(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<StatusCode> {
    state.scans.delete_scan(state.namespace(), &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_profiles(State(state): State<AppState>) -> ApiResult<Json<Vec<ProfileInfo>>> {
    Ok(Json(state.scans.list_profiles(state.namespace()).await?))
}

/// Full grouped results without a filter, the matching list with one
pub async fn results(State(state): State<AppState>, Query(filter): Query<ResultFilter>) -> ApiResult<Response> {
    if filter.is_empty() {
        Ok(Json(state.results.compliance_results(state.namespace()).await?).into_response())
    } else {
        Ok(Json(state.results.filtered_results(state.namespace(), &filter).await?).into_response())
    }
}

pub async fn results_summary(State(state): State<AppState>) -> ApiResult<Json<ResultsSummary>> {
    Ok(Json(state.results.summary(state.namespace()).await?))
}

pub async fn check_result(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<CheckResultDetail>> {
    Ok(Json(state.results.check_result(state.namespace(), &name).await?))
}
