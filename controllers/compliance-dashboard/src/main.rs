//! Compliance Dashboard
//!
//! Control plane for the OpenShift Compliance Operator:
//! - Installs and uninstalls the operator, streaming step progress
//! - Applies and removes remediations, alone or by severity
//! - Creates, schedules, reruns and reports on compliance scans
//! - Summarizes and filters check results
//! - Relays compliance record changes to every connected browser
//!
//! The dashboard starts without a cluster connection when no kubeconfig is
//! available; cluster operations then report that the client is not connected.

mod api;
mod backoff;
mod config;
mod error;
mod hub;
mod metrics;
mod operator;
mod poll;
mod release;
mod remediation;
mod resources;
mod results;
mod scan;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::api::AppState;
use crate::backoff::{WatchBackoff, BASE_DELAY, NOT_RECOGNIZED_DELAY};
use crate::config::{DashboardConfig, LogFormat};
use crate::error::DashboardError;
use crate::hub::{Hub, COMMAND_CAPACITY};
use crate::metrics::DashboardMetrics;
use crate::operator::Orchestrator;
use crate::release::GitHubReleaseIndex;
use crate::remediation::RemediationEngine;
use crate::results::ResultsService;
use crate::scan::ScanService;
use crate::watcher::WatchBridge;
use cluster_client::{ClusterClientTrait, KubeClusterClient};
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), DashboardError> {
    let config = DashboardConfig::from_env()?;
    init_tracing(config.log_format);

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("TLS crypto provider already installed");
    }

    info!("Starting Compliance Dashboard");
    info!("Configuration:");
    info!("  Namespace: {}", config.namespace);
    info!("  Port: {}", config.port);
    info!("  Watch max backoff: {}s", config.watch_max_backoff.as_secs());
    info!("  Operator ref: {}", config.operator_ref.as_deref().unwrap_or("latest release"));

    let client: Option<Arc<dyn ClusterClientTrait>> = match KubeClusterClient::try_default().await {
        Ok(client) => {
            info!("Connected to cluster");
            Some(Arc::new(client))
        }
        Err(e) => {
            warn!(error = %e, "No cluster connection, starting disconnected");
            None
        }
    };

    let registry = Registry::new();
    let metrics = DashboardMetrics::register(&registry)?;
    let cancel = CancellationToken::new();

    let (hub, hub_handle) = Hub::new(metrics.clone(), COMMAND_CAPACITY, config.observer_queue);
    let hub_task = tokio::spawn(hub.run(cancel.clone()));

    let watch_units = match &client {
        Some(client) => {
            WatchBridge::new(Arc::clone(client), hub_handle.clone(), config.namespace.clone(), metrics)
                .with_backoff(WatchBackoff::new(BASE_DELAY, config.watch_max_backoff, NOT_RECOGNIZED_DELAY))
                .start(&cancel)
        }
        None => Vec::new(),
    };

    let state = AppState {
        orchestrator: Arc::new(Orchestrator::new(client.clone(), Arc::new(GitHubReleaseIndex::new()?))),
        engine: Arc::new(RemediationEngine::new(client.clone())),
        scans: Arc::new(ScanService::new(client.clone())),
        results: Arc::new(ResultsService::new(client)),
        hub: hub_handle,
        registry,
        cancel: cancel.clone(),
        config: Arc::new(config),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Listening");

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested");
        shutdown.cancel();
    });

    let server_cancel = cancel.clone();
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async move { server_cancel.cancelled().await })
        .await?;

    // The server can also stop on its own; make sure everything else follows
    cancel.cancel();
    for unit in watch_units {
        if let Err(e) = unit.await {
            warn!(error = %e, "Watch unit ended abnormally");
        }
    }
    if let Err(e) = hub_task.await {
        warn!(error = %e, "Hub ended abnormally");
    }

    info!("Compliance Dashboard stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
