//! Latest operator release lookup

use crate::error::DashboardError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const LATEST_RELEASE_URL: &str =
    "https://api.github.com/repos/ComplianceAsCode/compliance-operator/releases/latest";

/// Source of the newest published operator version
#[async_trait]
pub trait ReleaseIndex: Send + Sync {
    /// Tag of the latest release, e.g. `v1.7.0`
    async fn latest(&self) -> Result<String, DashboardError>;
}

#[derive(Deserialize)]
struct Release {
    #[serde(default)]
    tag_name: String,
}

/// GitHub releases API client
pub struct GitHubReleaseIndex {
    client: Client,
    url: String,
}

impl GitHubReleaseIndex {
    pub fn new() -> Result<Self, DashboardError> {
        Self::with_url(LATEST_RELEASE_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Result<Self, DashboardError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("compliance-dashboard/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl ReleaseIndex for GitHubReleaseIndex {
    async fn latest(&self) -> Result<String, DashboardError> {
        debug!(url = %self.url, "Fetching latest release");
        let release: Release = self
            .client
            .get(&self.url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if release.tag_name.is_empty() {
            return Err(DashboardError::Release("response carried no tag_name".to_string()));
        }
        Ok(release.tag_name)
    }
}

/// Index that always answers the same way
#[cfg(test)]
pub struct FixedReleaseIndex(pub Option<String>);

#[cfg(test)]
#[async_trait]
impl ReleaseIndex for FixedReleaseIndex {
    async fn latest(&self) -> Result<String, DashboardError> {
        self.0
            .clone()
            .ok_or_else(|| DashboardError::Release("release index unreachable".to_string()))
    }
}
