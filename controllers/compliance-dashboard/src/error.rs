//! Dashboard error types.
//!
//! Errors returned directly to callers of single-item operations. Long-running
//! runs (install, uninstall, severity batches) report failures as records in
//! their output stream instead.

use cluster_client::ClusterError;
use thiserror::Error;

/// Errors that can occur in the compliance dashboard.
#[derive(Debug, Error)]
pub enum DashboardError {
    /// Cluster API error
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// No cluster client is configured
    #[error("Kubernetes client is not connected")]
    NotConnected,

    /// Named remediation record does not exist
    #[error("Remediation not found: {0}")]
    RemediationNotFound(String),

    /// Remediation record exists but its target object is unusable
    #[error("Invalid remediation {name}: {reason}")]
    InvalidRemediation { name: String, reason: String },

    /// Named check result does not exist
    #[error("Check result not found: {0}")]
    CheckResultNotFound(String),

    /// Named scan or suite does not exist
    #[error("Scan not found: {0}")]
    ScanNotFound(String),

    /// Invalid request input
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Outbound HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Release index answered but without a usable release
    #[error("Release lookup failed: {0}")]
    Release(String),

    /// Remediation object could not be rendered
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Metrics registration failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Listener or server I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DashboardError {
    /// True when the caller asked for something absent or malformed, as
    /// opposed to the cluster operation failing.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            DashboardError::RemediationNotFound(_)
                | DashboardError::InvalidRemediation { .. }
                | DashboardError::ScanNotFound(_)
                | DashboardError::CheckResultNotFound(_)
                | DashboardError::InvalidRequest(_)
        )
    }
}
