//! Unit tests for the remediation engine

use super::*;
use crate::remediation::addressing::KindRoute;
use crate::remediation::ROLE_LABEL;
use crate::resources::COMPLIANCE_API_VERSION;
use crate::test_utils::create_test_document;
use cluster_client::{Gvr, MockClusterClient, MockFailure};
use serde_json::Value;
use tokio::time::Instant;

const NS: &str = "openshift-compliance";

fn engine(client: &MockClusterClient) -> RemediationEngine {
    RemediationEngine::new(Some(Arc::new(client.clone())))
}

fn remediations() -> Gvr {
    resources::compliance(resources::REMEDIATIONS)
}

fn machine_configs() -> Gvr {
    Gvr::new("machineconfiguration.openshift.io", "v1", "machineconfigs")
}

fn machine_config(name: &str, role: &str) -> Value {
    json!({
        "apiVersion": "machineconfiguration.openshift.io/v1",
        "kind": "MachineConfig",
        "metadata": { "name": name, "labels": { ROLE_LABEL: role } },
        "spec": { "config": { "ignition": { "version": "3.1.0" } } }
    })
}

fn config_map(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": name },
        "data": { "audit": "enabled" }
    })
}

/// Seeds a remediation and, when `severity` is set, its check result
fn seed(client: &MockClusterClient, name: &str, severity: Option<&str>, target: Value) {
    client.insert(
        &remediations(),
        NS,
        create_test_document(
            COMPLIANCE_API_VERSION,
            "ComplianceRemediation",
            NS,
            name,
            json!({ "spec": { "apply": false, "current": { "object": target } } }),
        ),
    );
    if let Some(severity) = severity {
        client.insert(
            &resources::compliance(resources::CHECK_RESULTS),
            NS,
            create_test_document(
                COMPLIANCE_API_VERSION,
                "ComplianceCheckResult",
                NS,
                name,
                json!({ "status": "FAIL", "severity": severity }),
            ),
        );
    }
}

fn seed_pool(client: &MockClusterClient, role: &str, updated: bool) {
    let body = if updated {
        json!({ "status": { "conditions": [{ "type": "Updated", "status": "True" }] } })
    } else {
        json!({ "status": { "conditions": [{ "type": "Updating", "status": "True" }] } })
    };
    client.insert(
        &resources::machine_config_pools(),
        "",
        create_test_document("machineconfiguration.openshift.io/v1", "MachineConfigPool", "", role, body),
    );
}

fn apply_flag_of(client: &MockClusterClient, name: &str) -> Option<bool> {
    client
        .object(&remediations(), NS, name)
        .and_then(|doc| doc.nested_bool(&["spec", "apply"]))
}

fn drain(mut rx: mpsc::UnboundedReceiver<RemediationResult>) -> Vec<RemediationResult> {
    let mut results = Vec::new();
    while let Ok(result) = rx.try_recv() {
        results.push(result);
    }
    results
}

#[tokio::test]
async fn test_apply_machine_config_is_cluster_scoped() {
    let client = MockClusterClient::new();
    seed(
        &client,
        "ocp4-cis-kubelet-enable-protect-kernel-defaults",
        Some("high"),
        machine_config("75-ocp4-cis-kubelet-enable-protect-kernel-defaults", "master"),
    );

    let result = engine(&client)
        .apply(NS, "ocp4-cis-kubelet-enable-protect-kernel-defaults")
        .await
        .unwrap();

    assert!(result.applied);
    assert_eq!(result.error, None);
    assert_eq!(
        result.message,
        "Applied MachineConfig 75-ocp4-cis-kubelet-enable-protect-kernel-defaults \
         (MachineConfig - nodes with role master will reboot)"
    );
    let stored = client
        .object(&machine_configs(), "", "75-ocp4-cis-kubelet-enable-protect-kernel-defaults")
        .unwrap();
    assert_eq!(stored.namespace(), None);
    assert_eq!(apply_flag_of(&client, "ocp4-cis-kubelet-enable-protect-kernel-defaults"), Some(true));
}

#[tokio::test]
async fn test_apply_existing_object_updates_at_current_version() {
    let client = MockClusterClient::new();
    seed(&client, "rhcos4-moderate-worker-sshd", None, machine_config("75-sshd", "worker"));
    client.insert(
        &machine_configs(),
        "",
        create_test_document(
            "machineconfiguration.openshift.io/v1",
            "MachineConfig",
            "",
            "75-sshd",
            json!({ "spec": { "config": { "ignition": { "version": "2.2.0" } } } }),
        ),
    );

    let result = engine(&client).apply(NS, "rhcos4-moderate-worker-sshd").await.unwrap();

    assert!(result.applied);
    assert!(client.call_position("update machineconfigs 75-sshd").is_some());
    let stored = client.object(&machine_configs(), "", "75-sshd").unwrap();
    assert_eq!(
        stored.nested_str(&["spec", "config", "ignition", "version"]),
        Some("3.1.0")
    );
}

#[tokio::test]
async fn test_object_namespace_overrides_default() {
    let client = MockClusterClient::new();
    let mut target = config_map("audit-policy");
    target["metadata"]["namespace"] = json!("openshift-config");
    seed(&client, "ocp4-cis-audit-profile-set", None, target);

    let result = engine(&client).apply(NS, "ocp4-cis-audit-profile-set").await.unwrap();

    assert_eq!(result.message, "Applied ConfigMap audit-policy");
    let config_maps = Gvr::new("", "v1", "configmaps");
    assert!(client.object(&config_maps, "openshift-config", "audit-policy").is_some());
    assert!(client.object(&config_maps, NS, "audit-policy").is_none());
}

#[tokio::test]
async fn test_unnamed_object_takes_remediation_name() {
    let client = MockClusterClient::new();
    seed(
        &client,
        "ocp4-cis-api-server-encryption-provider-cipher",
        Some("medium"),
        json!({
            "apiVersion": "config.openshift.io/v1",
            "kind": "APIServer",
            "spec": { "encryption": { "type": "aescbc" } }
        }),
    );

    let result = engine(&client)
        .apply(NS, "ocp4-cis-api-server-encryption-provider-cipher")
        .await
        .unwrap();

    assert_eq!(result.message, "Applied APIServer ocp4-cis-api-server-encryption-provider-cipher");
    let api_servers = Gvr::new("config.openshift.io", "v1", "apiservers");
    assert!(client
        .object(&api_servers, "", "ocp4-cis-api-server-encryption-provider-cipher")
        .is_some());
}

#[tokio::test]
async fn test_missing_remediation_is_caller_error() {
    let client = MockClusterClient::new();

    let err = engine(&client).apply(NS, "ocp4-cis-nope").await.unwrap_err();

    assert!(matches!(err, DashboardError::RemediationNotFound(ref name) if name == "ocp4-cis-nope"));
    assert!(err.is_caller_error());
}

#[tokio::test]
async fn test_remediation_without_target_is_invalid() {
    let client = MockClusterClient::new();
    client.insert(
        &remediations(),
        NS,
        create_test_document(
            COMPLIANCE_API_VERSION,
            "ComplianceRemediation",
            NS,
            "ocp4-cis-empty",
            json!({ "spec": { "apply": false } }),
        ),
    );
    seed(&client, "ocp4-cis-kindless", None, json!({ "apiVersion": "v1", "metadata": { "name": "x" } }));

    for name in ["ocp4-cis-empty", "ocp4-cis-kindless"] {
        let err = engine(&client).apply(NS, name).await.unwrap_err();
        assert!(matches!(err, DashboardError::InvalidRemediation { .. }), "{name}: {err}");
        assert!(err.is_caller_error());
    }
    assert!(client.call_position("create").is_none());
}

#[tokio::test]
async fn test_apply_flag_failure_does_not_fail_apply() {
    let client = MockClusterClient::new();
    seed(&client, "ocp4-cis-audit", None, config_map("audit"));
    client.fail("patch", resources::REMEDIATIONS, MockFailure::Api(500, "etcd timeout".to_string()));

    let result = engine(&client).apply(NS, "ocp4-cis-audit").await.unwrap();

    assert!(result.applied);
    assert_eq!(apply_flag_of(&client, "ocp4-cis-audit"), Some(false));
}

#[tokio::test]
async fn test_create_failure_is_server_error() {
    let client = MockClusterClient::new();
    seed(&client, "ocp4-cis-audit", None, config_map("audit"));
    client.fail("create", "configmaps", MockFailure::Api(403, "forbidden".to_string()));

    let err = engine(&client).apply(NS, "ocp4-cis-audit").await.unwrap_err();

    assert!(matches!(err, DashboardError::Cluster(_)));
    assert!(!err.is_caller_error());
    assert_eq!(apply_flag_of(&client, "ocp4-cis-audit"), Some(false));
}

#[tokio::test]
async fn test_disconnected_engine() {
    let engine = RemediationEngine::new(None);

    assert!(matches!(engine.apply(NS, "x").await, Err(DashboardError::NotConnected)));
    assert!(matches!(engine.remove(NS, "x").await, Err(DashboardError::NotConnected)));
    assert!(matches!(engine.list_remediations(NS).await, Err(DashboardError::NotConnected)));
    assert!(matches!(engine.remediation_detail(NS, "x").await, Err(DashboardError::NotConnected)));
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    let client = MockClusterClient::new();
    seed(&client, "rhcos4-moderate-worker-sshd", None, machine_config("75-sshd", "worker"));
    let engine = engine(&client);
    engine.apply(NS, "rhcos4-moderate-worker-sshd").await.unwrap();

    let removed = engine.remove(NS, "rhcos4-moderate-worker-sshd").await.unwrap();
    assert!(!removed.applied);
    assert_eq!(removed.message, "Removed MachineConfig 75-sshd");
    assert!(client.object(&machine_configs(), "", "75-sshd").is_none());
    assert_eq!(apply_flag_of(&client, "rhcos4-moderate-worker-sshd"), Some(false));

    let again = engine.remove(NS, "rhcos4-moderate-worker-sshd").await.unwrap();
    assert!(!again.applied);
    assert_eq!(again.message, "Object MachineConfig 75-sshd was already removed");
}

#[tokio::test]
async fn test_apply_twice_then_remove_twice() {
    let client = MockClusterClient::new();
    seed(&client, "ocp4-cis-audit-profile-set", Some("medium"), config_map("audit-policy"));
    let engine = engine(&client);
    let config_maps = Gvr::new("", "v1", "configmaps");

    let first = engine.apply(NS, "ocp4-cis-audit-profile-set").await.unwrap();
    let second = engine.apply(NS, "ocp4-cis-audit-profile-set").await.unwrap();

    assert!(first.applied && second.applied);
    let stored = client.objects(&config_maps);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].nested(&["data"]), Some(&json!({ "audit": "enabled" })));
    assert_eq!(apply_flag_of(&client, "ocp4-cis-audit-profile-set"), Some(true));

    let removed = engine.remove(NS, "ocp4-cis-audit-profile-set").await.unwrap();
    assert_eq!(removed.message, "Removed ConfigMap audit-policy");
    let again = engine.remove(NS, "ocp4-cis-audit-profile-set").await.unwrap();
    assert!(again.message.contains("already removed"), "{}", again.message);
    assert!(client.objects(&config_maps).is_empty());
    assert_eq!(apply_flag_of(&client, "ocp4-cis-audit-profile-set"), Some(false));
}

#[tokio::test]
async fn test_injected_route_addresses_irregular_plural() {
    let client = MockClusterClient::new();
    seed(
        &client,
        "ocp4-cis-configure-network-policies",
        Some("high"),
        json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "NetworkPolicy",
            "metadata": { "name": "deny-by-default", "namespace": "openshift-monitoring" },
            "spec": { "podSelector": {} }
        }),
    );
    let engine = RemediationEngine::with_table(
        Some(Arc::new(client.clone())),
        AddressingTable::default().with_route("NetworkPolicy", KindRoute::namespaced(None, "networkpolicies")),
    );

    let result = engine.apply(NS, "ocp4-cis-configure-network-policies").await.unwrap();

    assert_eq!(result.message, "Applied NetworkPolicy deny-by-default");
    let policies = Gvr::new("networking.k8s.io", "v1", "networkpolicies");
    assert!(client.object(&policies, "openshift-monitoring", "deny-by-default").is_some());
    assert!(client.call_position("create networkpolicys").is_none());

    engine.remove(NS, "ocp4-cis-configure-network-policies").await.unwrap();
    assert!(client.object(&policies, "openshift-monitoring", "deny-by-default").is_none());
}

#[tokio::test]
async fn test_remediation_detail_renders_object() {
    let client = MockClusterClient::new();
    seed(
        &client,
        "rhcos4-e8-worker-sshd-disable-root-login",
        Some("high"),
        machine_config("75-sshd-disable-root-login", "worker"),
    );

    let detail = engine(&client)
        .remediation_detail(NS, "rhcos4-e8-worker-sshd-disable-root-login")
        .await
        .unwrap();

    assert_eq!(detail.info.kind, "MachineConfig");
    assert_eq!(detail.info.severity, Severity::High);
    assert!(detail.info.reboot_needed);
    assert_eq!(detail.info.role, "worker");
    assert!(!detail.info.applied);
    assert_eq!(detail.api_version, "machineconfiguration.openshift.io/v1");
    assert_eq!(detail.target_namespace, "");
    assert!(detail.object_yaml.contains("kind: MachineConfig"), "{}", detail.object_yaml);
    assert!(detail.object_yaml.contains("75-sshd-disable-root-login"));
}

#[tokio::test]
async fn test_remediation_detail_without_check_result() {
    let client = MockClusterClient::new();
    seed(&client, "ocp4-cis-audit", None, config_map("audit"));

    let detail = engine(&client).remediation_detail(NS, "ocp4-cis-audit").await.unwrap();

    assert_eq!(detail.info.severity, Severity::Unknown);
    assert_eq!(detail.target_namespace, NS);
    assert!(!detail.info.reboot_needed);

    let err = engine(&client).remediation_detail(NS, "ocp4-cis-nope").await.unwrap_err();
    assert!(matches!(err, DashboardError::RemediationNotFound(_)));
}

#[tokio::test]
async fn test_remove_failure_is_reported() {
    let client = MockClusterClient::new();
    seed(&client, "ocp4-cis-audit", None, config_map("audit"));
    client.fail("delete", "configmaps", MockFailure::Api(500, "etcd timeout".to_string()));

    let err = engine(&client).remove(NS, "ocp4-cis-audit").await.unwrap_err();

    assert!(matches!(err, DashboardError::Cluster(_)));
}

#[tokio::test]
async fn test_list_remediations_joins_severity() {
    let client = MockClusterClient::new();
    seed(
        &client,
        "ocp4-cis-api-server-encryption",
        Some("HIGH"),
        json!({ "apiVersion": "config.openshift.io/v1", "kind": "APIServer" }),
    );
    seed(
        &client,
        "rhcos4-moderate-master-sshd",
        Some("medium"),
        json!({ "apiVersion": "machineconfiguration.openshift.io/v1", "kind": "MachineConfig" }),
    );
    seed(&client, "ocp4-cis-orphan", None, config_map("orphan"));
    client
        .merge_patch(&remediations(), NS, "ocp4-cis-api-server-encryption", &json!({ "spec": { "apply": "true" } }))
        .await
        .unwrap();

    let infos = engine(&client).list_remediations(NS).await.unwrap();
    let by_name = |name: &str| infos.iter().find(|info| info.name == name).unwrap();

    assert_eq!(infos.len(), 3);
    let api_server = by_name("ocp4-cis-api-server-encryption");
    assert_eq!(api_server.severity, Severity::High);
    assert_eq!(api_server.kind, "APIServer");
    assert!(api_server.applied);
    assert!(!api_server.reboot_needed);

    let sshd = by_name("rhcos4-moderate-master-sshd");
    assert_eq!(sshd.severity, Severity::Medium);
    assert!(sshd.reboot_needed);
    assert_eq!(sshd.role, "master");
    assert!(!sshd.applied);

    assert_eq!(by_name("ocp4-cis-orphan").severity, Severity::Unknown);
}

#[tokio::test]
async fn test_list_remediations_without_operator_is_empty() {
    let client = MockClusterClient::new();
    client.fail("list", resources::REMEDIATIONS, MockFailure::NotRecognized);

    assert!(engine(&client).list_remediations(NS).await.unwrap().is_empty());

    client.fail("list", resources::REMEDIATIONS, MockFailure::Api(500, "etcd timeout".to_string()));
    assert!(engine(&client).list_remediations(NS).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_apply_by_severity_waits_for_pool_after_machine_config() {
    let client = MockClusterClient::new();
    seed(&client, "a-high-worker-sysctl", Some("high"), machine_config("75-a", "worker"));
    seed(&client, "b-high-audit", Some("high"), config_map("b-audit"));
    seed(&client, "c-medium-audit", Some("medium"), config_map("c-audit"));
    seed_pool(&client, "worker", true);
    let (tx, rx) = mpsc::unbounded_channel();
    let start = Instant::now();

    let attempted = engine(&client)
        .apply_by_severity(NS, Severity::High, &tx, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(attempted, 2);
    drop(tx);
    let results = drain(rx);
    let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["a-high-worker-sysctl", "b-high-audit"]);
    assert!(results.iter().all(|r| r.applied));
    assert_eq!(start.elapsed(), Duration::from_secs(30));

    let pool_check = client.call_position("get machineconfigpools worker").unwrap();
    let next_create = client.call_position("create configmaps b-audit").unwrap();
    assert!(pool_check < next_create);
    assert!(client.call_position("create configmaps c-audit").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_pool_timeout_is_not_an_error() {
    let client = MockClusterClient::new();
    seed(&client, "a-high-worker-sysctl", Some("high"), machine_config("75-a", "worker"));
    seed(&client, "b-high-audit", Some("high"), config_map("b-audit"));
    seed_pool(&client, "worker", false);
    let (tx, rx) = mpsc::unbounded_channel();
    let start = Instant::now();

    let attempted = engine(&client)
        .apply_by_severity(NS, Severity::High, &tx, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(attempted, 2);
    assert_eq!(start.elapsed(), POOL_CONVERGENCE.budget());
    drop(tx);
    assert!(drain(rx).iter().all(|r| r.applied));
}

#[tokio::test(start_paused = true)]
async fn test_failed_attempt_is_reported_and_still_throttled() {
    let client = MockClusterClient::new();
    seed(&client, "a-high-worker-sysctl", Some("high"), machine_config("75-a", "worker"));
    seed(&client, "b-high-audit", Some("high"), config_map("b-audit"));
    seed_pool(&client, "worker", true);
    client.fail("create", "machineconfigs", MockFailure::Api(500, "admission denied".to_string()));
    let (tx, rx) = mpsc::unbounded_channel();
    let start = Instant::now();

    engine(&client)
        .apply_by_severity(NS, Severity::High, &tx, &CancellationToken::new())
        .await
        .unwrap();

    drop(tx);
    let results = drain(rx);
    assert_eq!(results.len(), 2);
    assert!(!results[0].applied);
    assert!(results[0].error.as_deref().is_some_and(|e| e.contains("admission denied")));
    assert!(results[1].applied);
    assert_eq!(start.elapsed(), Duration::from_secs(30));
}

#[tokio::test]
async fn test_cancelled_batch_attempts_nothing() {
    let client = MockClusterClient::new();
    seed(&client, "b-high-audit", Some("high"), config_map("b-audit"));
    let (tx, _rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let attempted = engine(&client)
        .apply_by_severity(NS, Severity::High, &tx, &cancel)
        .await
        .unwrap();

    assert_eq!(attempted, 0);
    assert!(client.call_position("create").is_none());
}
