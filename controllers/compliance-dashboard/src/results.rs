//! Check result queries.
//!
//! Reads every ComplianceCheckResult in the namespace and projects it into
//! summaries, severity groupings and filtered lists. An operator that is not
//! installed yields empty results rather than an error.

use crate::error::DashboardError;
use crate::resources;
use crate::scan::SUITE_LABEL;
use chrono::{SecondsFormat, Utc};
use cluster_client::{ClusterClientTrait, ClusterError, Document};
use compliance_types::{
    CheckResult, CheckResultDetail, CheckStatus, ComplianceData, ResultFilter, ResultsSummary, Severity,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Label naming the scan that produced a result
pub const SCAN_NAME_LABEL: &str = "compliance.openshift.io/scan-name";

pub struct ResultsService {
    client: Option<Arc<dyn ClusterClientTrait>>,
}

impl ResultsService {
    pub fn new(client: Option<Arc<dyn ClusterClientTrait>>) -> Self {
        Self { client }
    }

    fn connected(&self) -> Result<&dyn ClusterClientTrait, DashboardError> {
        self.client.as_deref().ok_or(DashboardError::NotConnected)
    }

    /// Summary plus failing, passing and manual checks grouped for display
    pub async fn compliance_results(&self, namespace: &str) -> Result<ComplianceData, DashboardError> {
        let results = self.load(namespace).await?;

        let mut data = ComplianceData {
            scan_date: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            ..ComplianceData::default()
        };
        for result in results {
            data.summary.count(&result);
            match result.status {
                CheckStatus::Fail => data.remediations.push(result),
                CheckStatus::Pass => data.passing_checks.push(result),
                CheckStatus::Manual => data.manual_checks.push(result),
                _ => {}
            }
        }
        debug!(namespace, total = data.summary.total_checks, failing = data.summary.failing, "Compliance results assembled");
        Ok(data)
    }

    pub async fn summary(&self, namespace: &str) -> Result<ResultsSummary, DashboardError> {
        let mut summary = ResultsSummary::default();
        for result in &self.load(namespace).await? {
            summary.count(result);
        }
        Ok(summary)
    }

    /// Results matching every field set in `filter`, ordered by name
    pub async fn filtered_results(&self, namespace: &str, filter: &ResultFilter) -> Result<Vec<CheckResult>, DashboardError> {
        Ok(self
            .load(namespace)
            .await?
            .into_iter()
            .filter(|result| filter.matches(result))
            .collect())
    }

    /// One result with its guidance and the remediation that fixes it, if any.
    ///
    /// A remediation belongs to a check when its name is the check's name or
    /// starts with the check's name followed by `-`.
    pub async fn check_result(&self, namespace: &str, name: &str) -> Result<CheckResultDetail, DashboardError> {
        let client = self.connected()?;
        let record = match client
            .get(&resources::compliance(resources::CHECK_RESULTS), namespace, name)
            .await
        {
            Ok(record) => record,
            Err(e) if e.is_not_found() || matches!(e, ClusterError::ResourceNotRecognized(_)) => {
                return Err(DashboardError::CheckResultNotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let remediation_name = match client
            .list(&resources::compliance(resources::REMEDIATIONS), namespace, None)
            .await
        {
            Ok(remediations) => {
                let prefix = format!("{name}-");
                remediations
                    .iter()
                    .map(Document::name)
                    .find(|candidate| *candidate == name || candidate.starts_with(&prefix))
                    .map(str::to_string)
            }
            Err(e) => {
                warn!(namespace, check = name, error = %e, "Listing remediations failed, none matched");
                None
            }
        };

        Ok(CheckResultDetail {
            result: check_result(&record),
            id: record.nested_string(&["id"]),
            instructions: record.nested_string(&["instructions"]),
            rationale: record.nested_string(&["rationale"]),
            has_remediation: remediation_name.is_some(),
            remediation_name,
        })
    }

    async fn load(&self, namespace: &str) -> Result<Vec<CheckResult>, DashboardError> {
        let client = self.connected()?;
        let records = match client
            .list(&resources::compliance(resources::CHECK_RESULTS), namespace, None)
            .await
        {
            Ok(records) => records,
            Err(ClusterError::ResourceNotRecognized(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut results: Vec<CheckResult> = records.iter().map(check_result).collect();
        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }
}

fn check_result(record: &Document) -> CheckResult {
    CheckResult {
        name: record.name().to_string(),
        status: CheckStatus::from_record(record.nested_str(&["status"]).unwrap_or_default()),
        severity: Severity::from_record(record.nested_str(&["severity"]).unwrap_or_default()),
        description: record.nested_string(&["description"]),
        scan_name: record.label(SCAN_NAME_LABEL).unwrap_or_default().to_string(),
        suite: record.label(SUITE_LABEL).unwrap_or_default().to_string(),
    }
}

#[cfg(test)]
#[path = "results_test.rs"]
mod results_test;
