//! Check result listings, summaries and filters

use crate::remediation::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one compliance check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum CheckStatus {
    Pass,
    Fail,
    Manual,
    Skip,
    NotApplicable,
    Info,
    Error,
    Inconsistent,
    #[default]
    #[serde(other)]
    Unknown,
}

impl CheckStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Manual => "MANUAL",
            CheckStatus::Skip => "SKIP",
            CheckStatus::NotApplicable => "NOT-APPLICABLE",
            CheckStatus::Info => "INFO",
            CheckStatus::Error => "ERROR",
            CheckStatus::Inconsistent => "INCONSISTENT",
            CheckStatus::Unknown => "UNKNOWN",
        }
    }

    /// Case-insensitive parse for values read from cluster records
    #[must_use]
    pub fn from_record(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "PASS" => CheckStatus::Pass,
            "FAIL" => CheckStatus::Fail,
            "MANUAL" => CheckStatus::Manual,
            "SKIP" => CheckStatus::Skip,
            "NOT-APPLICABLE" => CheckStatus::NotApplicable,
            "INFO" => CheckStatus::Info,
            "ERROR" => CheckStatus::Error,
            "INCONSISTENT" => CheckStatus::Inconsistent,
            _ => CheckStatus::Unknown,
        }
    }

    /// Counted under `skipped` in a summary
    #[must_use]
    pub fn is_skipped(self) -> bool {
        matches!(self, CheckStatus::Skip | CheckStatus::NotApplicable)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One check result record, summarized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scan_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub suite: String,
}

/// A check result with its guidance and matching remediation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResultDetail {
    #[serde(flatten)]
    pub result: CheckResult,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instructions: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rationale: String,
    pub has_remediation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation_name: Option<String>,
}

/// Per-severity counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub unknown: usize,
}

impl SeverityCounts {
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Unknown => self.unknown += 1,
        }
    }
}

/// Totals over every check result in a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultsSummary {
    pub total_checks: usize,
    pub passing: usize,
    pub failing: usize,
    pub manual: usize,
    /// SKIP and NOT-APPLICABLE
    pub skipped: usize,
    /// Any other status
    pub other: usize,
    pub failing_by_severity: SeverityCounts,
}

impl ResultsSummary {
    pub fn count(&mut self, result: &CheckResult) {
        self.total_checks += 1;
        match result.status {
            CheckStatus::Pass => self.passing += 1,
            CheckStatus::Fail => {
                self.failing += 1;
                self.failing_by_severity.add(result.severity);
            }
            CheckStatus::Manual => self.manual += 1,
            status if status.is_skipped() => self.skipped += 1,
            _ => self.other += 1,
        }
    }
}

/// Check results grouped by severity
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeverityMap {
    pub high: Vec<CheckResult>,
    pub medium: Vec<CheckResult>,
    pub low: Vec<CheckResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unknown: Vec<CheckResult>,
}

impl SeverityMap {
    pub fn push(&mut self, result: CheckResult) {
        match result.severity {
            Severity::High => self.high.push(result),
            Severity::Medium => self.medium.push(result),
            Severity::Low => self.low.push(result),
            Severity::Unknown => self.unknown.push(result),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.high.len() + self.medium.len() + self.low.len() + self.unknown.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Full results view: summary, failing checks to remediate, passing and manual checks
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComplianceData {
    pub scan_date: String,
    pub summary: ResultsSummary,
    pub remediations: SeverityMap,
    pub passing_checks: SeverityMap,
    pub manual_checks: Vec<CheckResult>,
}

/// Check result query. Unset fields match everything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultFilter {
    pub severity: Option<String>,
    pub status: Option<String>,
    /// Case-insensitive substring of the name or description
    pub search: Option<String>,
    /// Scan that produced the result
    pub scan: Option<String>,
}

impl ResultFilter {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        [&self.severity, &self.status, &self.search, &self.scan]
            .iter()
            .all(|field| set(field).is_none())
    }

    #[must_use]
    pub fn matches(&self, result: &CheckResult) -> bool {
        if let Some(severity) = set(&self.severity)
            && !severity.eq_ignore_ascii_case(result.severity.as_str())
        {
            return false;
        }
        if let Some(status) = set(&self.status)
            && !status.eq_ignore_ascii_case(result.status.as_str())
        {
            return false;
        }
        if let Some(scan) = set(&self.scan)
            && scan != result.scan_name.as_str()
        {
            return false;
        }
        if let Some(search) = set(&self.search) {
            let needle = search.to_lowercase();
            return result.name.to_lowercase().contains(&needle)
                || result.description.to_lowercase().contains(&needle);
        }
        true
    }
}

fn set(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, status: CheckStatus, severity: Severity, scan: &str) -> CheckResult {
        CheckResult {
            name: name.to_string(),
            status,
            severity,
            description: format!("Verify {name}"),
            scan_name: scan.to_string(),
            suite: String::new(),
        }
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&CheckStatus::NotApplicable).unwrap(), "\"NOT-APPLICABLE\"");
        let status: CheckStatus = serde_json::from_str("\"SOMETHING-NEW\"").unwrap();
        assert_eq!(status, CheckStatus::Unknown);
        assert_eq!(CheckStatus::from_record("not-applicable"), CheckStatus::NotApplicable);
        assert_eq!(CheckStatus::from_record("fail"), CheckStatus::Fail);
    }

    #[test]
    fn test_summary_counts_skip_and_not_applicable_together() {
        let mut summary = ResultsSummary::default();
        for status in [
            CheckStatus::Pass,
            CheckStatus::Fail,
            CheckStatus::Manual,
            CheckStatus::Skip,
            CheckStatus::NotApplicable,
            CheckStatus::Error,
        ] {
            summary.count(&result("c", status, Severity::High, "s"));
        }

        assert_eq!(summary.total_checks, 6);
        assert_eq!((summary.passing, summary.failing, summary.manual), (1, 1, 1));
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.other, 1);
        assert_eq!(summary.failing_by_severity.high, 1);
    }

    #[test]
    fn test_filter_fields_combine() {
        let check = result("ocp4-cis-audit-log-forwarding", CheckStatus::Fail, Severity::Medium, "ocp4-cis");
        let filter = |severity: &str, status: &str, search: &str, scan: &str| ResultFilter {
            severity: Some(severity.to_string()),
            status: Some(status.to_string()),
            search: Some(search.to_string()),
            scan: Some(scan.to_string()),
        };

        assert!(ResultFilter::default().matches(&check));
        assert!(filter("", "", "", "").is_empty());
        assert!(filter("MEDIUM", "fail", "AUDIT", "ocp4-cis").matches(&check));
        assert!(filter("", "", "verify OCP4", "").matches(&check));
        assert!(!filter("high", "", "", "").matches(&check));
        assert!(!filter("", "pass", "", "").matches(&check));
        assert!(!filter("", "", "", "ocp4-e8").matches(&check));
        assert!(!filter("", "", "kubelet", "").matches(&check));
    }
}
