//! Dashboard configuration.
//!
//! Loaded from environment variables once at startup. The cluster connection
//! itself is resolved by the kube client (`KUBECONFIG` or in-cluster config).

use crate::backoff::MAX_DELAY;
use crate::error::DashboardError;
use std::time::Duration;

pub const DEFAULT_NAMESPACE: &str = "openshift-compliance";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_OBSERVER_QUEUE: usize = 256;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Namespace the operator is installed into and watched in
    pub namespace: String,
    pub port: u16,
    /// Pinned operator version; resolved from the release index when unset
    pub operator_ref: Option<String>,
    pub log_format: LogFormat,
    /// Outbound queue depth per connected observer
    pub observer_queue: usize,
    /// Cap on the delay between failed watch opens
    pub watch_max_backoff: Duration,
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self, DashboardError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DashboardError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("DASHBOARD_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| {
                DashboardError::InvalidConfig(format!("DASHBOARD_PORT must be a port number, got {raw}"))
            })?,
            None => DEFAULT_PORT,
        };

        let log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(DashboardError::InvalidConfig(format!(
                    "LOG_FORMAT must be text or json, got {other}"
                )));
            }
        };

        let observer_queue = match get("HUB_OBSERVER_QUEUE") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    DashboardError::InvalidConfig(format!("HUB_OBSERVER_QUEUE must be a positive integer, got {raw}"))
                })?,
            None => DEFAULT_OBSERVER_QUEUE,
        };

        let watch_max_backoff = match get("WATCH_MAX_BACKOFF_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    DashboardError::InvalidConfig(format!("WATCH_MAX_BACKOFF_SECS must be a positive integer, got {raw}"))
                })?,
            None => MAX_DELAY,
        };

        Ok(Self {
            namespace: get("COMPLIANCE_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            port,
            operator_ref: get("COMPLIANCE_OPERATOR_REF"),
            log_format,
            observer_queue,
            watch_max_backoff,
        })
    }
}
