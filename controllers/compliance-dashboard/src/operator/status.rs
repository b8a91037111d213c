//! Operator and cluster status snapshots

use super::{node_is_arm, pod_phase, pod_ready, pod_waiting_reason, Orchestrator, ARM_ARCHITECTURE, SUBSCRIPTION_NAME};
use crate::resources;
use compliance_types::{BundleStatus, ClusterStatus, OperatorStatus, PodStatus};
use tracing::warn;

impl Orchestrator {
    /// Current install state of the operator in `namespace`.
    ///
    /// Reports not installed when disconnected or when the subscription has
    /// no installed CSV yet. Pod and bundle lists are best-effort.
    pub async fn operator_status(&self, namespace: &str) -> OperatorStatus {
        let Some(client) = self.client.as_deref() else {
            return OperatorStatus::default();
        };

        let Ok(subscription) = client.get(&resources::subscriptions(), namespace, SUBSCRIPTION_NAME).await else {
            return OperatorStatus::default();
        };
        let csv = subscription.nested_string(&["status", "installedCSV"]);
        if csv.is_empty() {
            return OperatorStatus::default();
        }

        let mut status = OperatorStatus {
            installed: true,
            ..Default::default()
        };

        if let Ok(doc) = client.get(&resources::cluster_service_versions(), namespace, &csv).await {
            status.csv_phase = doc.nested_string(&["status", "phase"]);
        }
        status.version = csv;

        match client.list_pods(namespace).await {
            Ok(pods) => {
                status.pods = pods
                    .iter()
                    .map(|pod| PodStatus {
                        name: pod.metadata.name.clone().unwrap_or_default(),
                        phase: pod_phase(pod).to_string(),
                        ready: pod_ready(pod),
                        reason: pod_waiting_reason(pod).map(str::to_string),
                    })
                    .collect();
            }
            Err(e) => warn!(namespace, error = %e, "Listing operator pods failed"),
        }

        match client
            .list(&resources::compliance(resources::PROFILE_BUNDLES), namespace, None)
            .await
        {
            Ok(bundles) => {
                status.profile_bundles = bundles
                    .iter()
                    .map(|bundle| BundleStatus {
                        name: bundle.name().to_string(),
                        data_stream_status: bundle.nested_string(&["status", "dataStreamStatus"]),
                    })
                    .collect();
            }
            Err(e) => warn!(namespace, error = %e, "Listing profile bundles failed"),
        }

        status
    }

    /// Connectivity, server version and node architecture summary
    pub async fn cluster_status(&self) -> ClusterStatus {
        let Some(client) = self.client.as_deref() else {
            return ClusterStatus::default();
        };

        let mut status = ClusterStatus {
            connected: true,
            architecture: "amd64".to_string(),
            ..Default::default()
        };

        match client.server_version().await {
            Ok(version) => status.server_version = version,
            Err(e) => warn!(error = %e, "Reading server version failed"),
        }

        match client.list_nodes().await {
            Ok(nodes) => {
                status.arm_nodes = nodes.iter().filter(|node| node_is_arm(node)).count();
                if status.arm_nodes > 0 {
                    status.architecture = ARM_ARCHITECTURE.to_string();
                }
                if let Some(first) = nodes.first() {
                    let openshift = first
                        .metadata
                        .labels
                        .as_ref()
                        .is_some_and(|labels| labels.keys().any(|key| key.contains("openshift")));
                    status.platform = if openshift { "OpenShift" } else { "Kubernetes" }.to_string();
                }
            }
            Err(e) => warn!(error = %e, "Listing nodes failed"),
        }

        status
    }
}
