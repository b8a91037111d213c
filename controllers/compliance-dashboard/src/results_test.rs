//! Unit tests for check result queries

use super::*;
use crate::resources::COMPLIANCE_API_VERSION;
use crate::test_utils::create_test_document;
use cluster_client::{MockClusterClient, MockFailure};
use serde_json::json;

const NS: &str = "openshift-compliance";

fn service(client: &MockClusterClient) -> ResultsService {
    ResultsService::new(Some(Arc::new(client.clone())))
}

fn seed_result(client: &MockClusterClient, name: &str, status: &str, severity: &str, scan: &str) {
    client.insert(
        &resources::compliance(resources::CHECK_RESULTS),
        NS,
        create_test_document(
            COMPLIANCE_API_VERSION,
            "ComplianceCheckResult",
            NS,
            name,
            json!({
                "metadata": { "labels": { SCAN_NAME_LABEL: scan, SUITE_LABEL: "periodic-e8" } },
                "id": format!("xccdf_org.ssgproject.content_rule_{name}"),
                "status": status,
                "severity": severity,
                "description": format!("Check {name}"),
                "instructions": "Run oc get",
                "rationale": "Reduces exposure",
            }),
        ),
    );
}

fn seed_remediation(client: &MockClusterClient, name: &str) {
    client.insert(
        &resources::compliance(resources::REMEDIATIONS),
        NS,
        create_test_document(COMPLIANCE_API_VERSION, "ComplianceRemediation", NS, name, json!({})),
    );
}

fn seed_mixed(client: &MockClusterClient) {
    seed_result(client, "ocp4-e8-api-server-audit-log-path", "FAIL", "high", "ocp4-e8");
    seed_result(client, "ocp4-e8-etcd-unique-ca", "PASS", "medium", "ocp4-e8");
    seed_result(client, "ocp4-e8-kubelet-anonymous-auth", "fail", "Medium", "ocp4-e8");
    seed_result(client, "rhcos4-e8-worker-audit-rules", "MANUAL", "low", "rhcos4-e8-worker");
    seed_result(client, "rhcos4-e8-worker-sshd-banner", "SKIP", "low", "rhcos4-e8-worker");
    seed_result(client, "rhcos4-e8-worker-usbguard", "NOT-APPLICABLE", "medium", "rhcos4-e8-worker");
    seed_result(client, "rhcos4-e8-worker-selinux", "ERROR", "high", "rhcos4-e8-worker");
}

#[tokio::test]
async fn test_compliance_results_group_by_status_and_severity() {
    let client = MockClusterClient::new();
    seed_mixed(&client);

    let data = service(&client).compliance_results(NS).await.unwrap();

    assert_eq!(data.summary.total_checks, 7);
    assert_eq!(data.summary.passing, 1);
    assert_eq!(data.summary.failing, 2);
    assert_eq!(data.summary.manual, 1);
    assert_eq!(data.summary.skipped, 2);
    assert_eq!(data.summary.other, 1);
    assert_eq!(data.summary.failing_by_severity.high, 1);
    assert_eq!(data.summary.failing_by_severity.medium, 1);

    assert_eq!(data.remediations.high[0].name, "ocp4-e8-api-server-audit-log-path");
    assert_eq!(data.remediations.medium[0].name, "ocp4-e8-kubelet-anonymous-auth");
    assert_eq!(data.remediations.medium[0].status, CheckStatus::Fail);
    assert_eq!(data.passing_checks.len(), 1);
    assert_eq!(data.manual_checks[0].scan_name, "rhcos4-e8-worker");
    assert_eq!(data.manual_checks[0].suite, "periodic-e8");
    assert!(data.scan_date.ends_with('Z'), "{}", data.scan_date);
}

#[tokio::test]
async fn test_summary_matches_full_results() {
    let client = MockClusterClient::new();
    seed_mixed(&client);
    let service = service(&client);

    let summary = service.summary(NS).await.unwrap();

    assert_eq!(summary, service.compliance_results(NS).await.unwrap().summary);
}

#[tokio::test]
async fn test_missing_operator_gives_empty_results() {
    let client = MockClusterClient::new();
    client.fail("list", resources::CHECK_RESULTS, MockFailure::NotRecognized);
    let service = service(&client);

    let data = service.compliance_results(NS).await.unwrap();
    assert_eq!(data.summary, ResultsSummary::default());
    assert!(data.remediations.is_empty());
    assert!(service.filtered_results(NS, &ResultFilter::default()).await.unwrap().is_empty());

    client.fail("list", resources::CHECK_RESULTS, MockFailure::Api(500, "etcd timeout".to_string()));
    assert!(matches!(service.summary(NS).await, Err(DashboardError::Cluster(_))));
}

#[tokio::test]
async fn test_filtered_results() {
    let client = MockClusterClient::new();
    seed_mixed(&client);
    let service = service(&client);
    let names = |results: Vec<CheckResult>| results.into_iter().map(|r| r.name).collect::<Vec<_>>();

    let failing_medium = ResultFilter {
        status: Some("FAIL".to_string()),
        severity: Some("MEDIUM".to_string()),
        ..ResultFilter::default()
    };
    assert_eq!(
        names(service.filtered_results(NS, &failing_medium).await.unwrap()),
        ["ocp4-e8-kubelet-anonymous-auth"]
    );

    let by_scan = ResultFilter {
        scan: Some("rhcos4-e8-worker".to_string()),
        search: Some("SSHD".to_string()),
        ..ResultFilter::default()
    };
    assert_eq!(
        names(service.filtered_results(NS, &by_scan).await.unwrap()),
        ["rhcos4-e8-worker-sshd-banner"]
    );

    let not_applicable = ResultFilter {
        status: Some("not-applicable".to_string()),
        ..ResultFilter::default()
    };
    assert_eq!(
        names(service.filtered_results(NS, &not_applicable).await.unwrap()),
        ["rhcos4-e8-worker-usbguard"]
    );

    assert_eq!(service.filtered_results(NS, &ResultFilter::default()).await.unwrap().len(), 7);
}

#[tokio::test]
async fn test_check_result_detail_matches_remediation_by_prefix() {
    let client = MockClusterClient::new();
    seed_result(&client, "rhcos4-e8-worker-audit-rules", "FAIL", "medium", "rhcos4-e8-worker");
    seed_result(&client, "ocp4-e8-etcd-unique-ca", "PASS", "medium", "ocp4-e8");
    seed_remediation(&client, "rhcos4-e8-worker-audit-rules-executable");
    seed_remediation(&client, "rhcos4-e8-worker-audit-rulesx");
    let service = service(&client);

    let detail = service.check_result(NS, "rhcos4-e8-worker-audit-rules").await.unwrap();

    assert_eq!(detail.result.status, CheckStatus::Fail);
    assert_eq!(detail.result.severity, Severity::Medium);
    assert_eq!(detail.id, "xccdf_org.ssgproject.content_rule_rhcos4-e8-worker-audit-rules");
    assert_eq!(detail.instructions, "Run oc get");
    assert_eq!(detail.rationale, "Reduces exposure");
    assert!(detail.has_remediation);
    assert_eq!(
        detail.remediation_name.as_deref(),
        Some("rhcos4-e8-worker-audit-rules-executable")
    );

    let passing = service.check_result(NS, "ocp4-e8-etcd-unique-ca").await.unwrap();
    assert!(!passing.has_remediation);
    assert_eq!(passing.remediation_name, None);
}

#[tokio::test]
async fn test_check_result_exact_name_match_and_missing() {
    let client = MockClusterClient::new();
    seed_result(&client, "ocp4-e8-api-server-audit-log-path", "FAIL", "high", "ocp4-e8");
    seed_remediation(&client, "ocp4-e8-api-server-audit-log-path");
    let service = service(&client);

    let detail = service.check_result(NS, "ocp4-e8-api-server-audit-log-path").await.unwrap();
    assert_eq!(detail.remediation_name.as_deref(), Some("ocp4-e8-api-server-audit-log-path"));

    let err = service.check_result(NS, "ocp4-e8-nope").await.unwrap_err();
    assert!(matches!(err, DashboardError::CheckResultNotFound(ref name) if name == "ocp4-e8-nope"));
    assert!(err.is_caller_error());
}

#[tokio::test]
async fn test_remediation_listing_failure_leaves_detail_unmatched() {
    let client = MockClusterClient::new();
    seed_result(&client, "ocp4-e8-api-server-audit-log-path", "FAIL", "high", "ocp4-e8");
    seed_remediation(&client, "ocp4-e8-api-server-audit-log-path");
    client.fail("list", resources::REMEDIATIONS, MockFailure::Api(500, "etcd timeout".to_string()));

    let detail = service(&client)
        .check_result(NS, "ocp4-e8-api-server-audit-log-path")
        .await
        .unwrap();

    assert!(!detail.has_remediation);
}

#[tokio::test]
async fn test_disconnected_results_service() {
    let service = ResultsService::new(None);

    assert!(matches!(service.summary(NS).await, Err(DashboardError::NotConnected)));
    assert!(matches!(service.check_result(NS, "x").await, Err(DashboardError::NotConnected)));
}
