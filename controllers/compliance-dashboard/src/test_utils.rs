//! Test utilities for orchestrator, engine and API tests
//!
//! Builders for the typed objects the mock client serves, helpers for
//! draining progress streams, and a ready-made dashboard state.

use crate::api::AppState;
use crate::config::DashboardConfig;
use crate::hub::{Hub, Subscription, COMMAND_CAPACITY};
use crate::metrics::DashboardMetrics;
use crate::operator::Orchestrator;
use crate::release::FixedReleaseIndex;
use crate::remediation::RemediationEngine;
use crate::results::ResultsService;
use crate::scan::ScanService;
use cluster_client::{ClusterClientTrait, Document, MockClusterClient};
use compliance_types::StepProgress;
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateWaiting, ContainerStatus, Node, NodeStatus, NodeSystemInfo, Pod, PodCondition,
    PodStatus as K8sPodStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use prometheus::Registry;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Helper to create a pod in `phase` with a Ready condition
pub fn create_test_pod(namespace: &str, name: &str, phase: &str, ready: bool) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        status: Some(K8sPodStatus {
            phase: Some(phase.to_string()),
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Helper to create a pending pod whose container is stuck waiting for `reason`
pub fn create_waiting_pod(namespace: &str, name: &str, reason: &str) -> Pod {
    let mut pod = create_test_pod(namespace, name, "Pending", false);
    if let Some(status) = pod.status.as_mut() {
        status.container_statuses = Some(vec![ContainerStatus {
            name: "registry-server".to_string(),
            state: Some(ContainerState {
                waiting: Some(ContainerStateWaiting {
                    reason: Some(reason.to_string()),
                    message: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);
    }
    pod
}

/// Helper to create a node with the given CPU architecture and labels
pub fn create_test_node(name: &str, architecture: &str, labels: &[(&str, &str)]) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        },
        status: Some(NodeStatus {
            node_info: Some(NodeSystemInfo {
                architecture: architecture.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Helper to create a namespaced document, deep-merging `body` over the type and metadata
pub fn create_test_document(api_version: &str, kind: &str, namespace: &str, name: &str, body: Value) -> Document {
    let mut doc = Document::with_type(api_version, kind, name);
    if !namespace.is_empty() {
        doc.set_namespace(namespace);
    }
    let mut value = doc.into_value();
    merge(&mut value, body);
    Document::new(value)
}

fn merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                merge(target.entry(key).or_insert(Value::Null), value);
            }
        }
        (target, patch) => *target = patch,
    }
}

/// Collects every record of a finished run
pub fn drain(mut rx: mpsc::UnboundedReceiver<StepProgress>) -> Vec<StepProgress> {
    let mut records = Vec::new();
    while let Ok(record) = rx.try_recv() {
        records.push(record);
    }
    records
}

/// Step names in emission order, consecutive duplicates collapsed
pub fn step_names(records: &[StepProgress]) -> Vec<&str> {
    let mut names: Vec<&str> = records.iter().map(|r| r.step.as_str()).collect();
    names.dedup();
    names
}

/// Dashboard state over an optional mock cluster, with one observer already registered
pub async fn create_test_state(client: Option<MockClusterClient>) -> (AppState, Subscription) {
    let client: Option<Arc<dyn ClusterClientTrait>> = client.map(|c| Arc::new(c) as Arc<dyn ClusterClientTrait>);
    let registry = Registry::new();
    let metrics = DashboardMetrics::register(&registry).unwrap();
    let (hub, handle) = Hub::new(metrics, COMMAND_CAPACITY, 64);
    let cancel = CancellationToken::new();
    tokio::spawn(hub.run(cancel.clone()));
    let observer = handle.register().await;

    let state = AppState {
        config: Arc::new(DashboardConfig::from_lookup(|_| None).unwrap()),
        orchestrator: Arc::new(Orchestrator::new(client.clone(), Arc::new(FixedReleaseIndex(None)))),
        engine: Arc::new(RemediationEngine::new(client.clone())),
        scans: Arc::new(ScanService::new(client.clone())),
        results: Arc::new(ResultsService::new(client)),
        hub: handle,
        registry,
        cancel,
    };
    (state, observer)
}
