//! Install sequence

use super::{
    checkpoint, ensure_created, node_is_arm, pod_phase, pod_ready, pod_waiting_reason, Orchestrator, ProgressSink, StepFailure,
    FALLBACK_REF, MARKETPLACE_NAMESPACE, OPERATOR_NAME, SUBSCRIPTION_NAME,
};
use crate::poll::{poll_until, PollError, PollPolicy, Attempt};
use crate::resources;
use cluster_client::{ClusterClientTrait, Document};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// First release that ships arm64 images
const MIN_ARM_VERSION: (u64, u64, u64) = (1, 7, 0);

const CERTIFIED_CATALOG: &str = "redhat-operators";
const CERTIFIED_CHANNEL: &str = "stable";
const COMMUNITY_CHANNEL: &str = "alpha";
const COMMUNITY_CATALOG_IMAGE: &str = "ghcr.io/complianceascode/compliance-operator-catalog";
const JOB_PERMISSIONS: &str = "compliance-operator-job-permissions";

/// Waiting container reasons that mean a marketplace pod will not recover on its own
const MARKETPLACE_ERROR_STATES: [&str; 5] = [
    "ImagePullBackOff",
    "ErrImagePull",
    "CrashLoopBackOff",
    "CreateContainerConfigError",
    "InvalidImageName",
];

const CSV_POLL: PollPolicy = PollPolicy::new(Duration::from_secs(10), 30);
const POD_POLL: PollPolicy = PollPolicy::new(Duration::from_secs(10), 30);
const BUNDLE_POLL: PollPolicy = PollPolicy::new(Duration::from_secs(10), 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstallSource {
    Certified,
    Community,
}

impl Orchestrator {
    /// Installs the operator into `namespace`, reporting every step to `sink`.
    ///
    /// `version_ref` pins the operator version; `None` resolves the latest
    /// release. The sink is closed when this returns.
    pub async fn install(&self, namespace: &str, version_ref: Option<&str>, sink: ProgressSink, cancel: &CancellationToken) {
        info!(namespace, "Starting operator install");
        match self.run_install(namespace, version_ref, &sink, cancel).await {
            Ok(()) => {
                info!(namespace, "Operator install complete");
                sink.complete("complete", "Compliance Operator installed successfully");
            }
            Err(failure) => {
                warn!(namespace, step = failure.step, message = %failure.message, "Operator install failed");
                sink.fail(failure.step, failure.message);
            }
        }
    }

    async fn run_install(
        &self,
        namespace: &str,
        version_ref: Option<&str>,
        sink: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(), StepFailure> {
        let client = self.connected()?;

        checkpoint(cancel, "marketplace")?;
        sink.step("marketplace", "Checking marketplace health...");
        check_marketplace_health(client)
            .await
            .map_err(|reason| StepFailure::new("marketplace", format!("Marketplace health check failed: {reason}")))?;
        sink.step("marketplace", "Marketplace is healthy");

        checkpoint(cancel, "version")?;
        let version = self.resolve_version(version_ref, sink).await;
        sink.step("version", format!("Using Compliance Operator ref: {version}"));

        checkpoint(cancel, "arch")?;
        sink.step("arch", "Checking cluster architecture...");
        let arm_nodes = count_arm_nodes(client)
            .await
            .map_err(|e| StepFailure::new("arch", format!("Architecture check failed: {e}")))?;
        if arm_nodes > 0 && !supports_arm(&version) {
            return Err(StepFailure::new(
                "arch",
                format!("Version {version} does not support ARM64 ({arm_nodes} ARM nodes detected). Use v1.7.0+."),
            ));
        }
        if arm_nodes > 0 {
            sink.step("arch", format!("ARM64 compatible ({arm_nodes} ARM nodes)"));
        } else {
            sink.step("arch", "x86_64 cluster detected");
        }

        checkpoint(cancel, "namespace")?;
        sink.step("namespace", format!("Creating namespace {namespace}..."));
        match client.create_namespace(namespace).await {
            Ok(_) => {}
            Err(e) if e.is_already_exists() => debug!(namespace, "Namespace already exists"),
            Err(e) => return Err(StepFailure::new("namespace", format!("Failed to create namespace: {e}"))),
        }
        sink.step("namespace", format!("Namespace {namespace} ready"));

        checkpoint(cancel, "source")?;
        sink.step("source", "Checking for Red Hat certified operator...");
        let source = detect_source(client).await;
        match source {
            InstallSource::Certified => sink.step("source", "Red Hat certified operator available"),
            InstallSource::Community => sink.step("source", "Certified operator not available, using community catalog"),
        }

        checkpoint(cancel, "install")?;
        let label = match source {
            InstallSource::Certified => "Red Hat certified",
            InstallSource::Community => "community",
        };
        sink.step("install", format!("Installing {label} Compliance Operator..."));
        provision(client, namespace, source, &version)
            .await
            .map_err(|e| StepFailure::new("install", format!("{label} operator install failed: {e}")))?;

        checkpoint(cancel, "csv")?;
        sink.step("csv", "Waiting for ClusterServiceVersion...");
        let csv = wait_for_csv(client, namespace, cancel)
            .await
            .map_err(|e| StepFailure::from_poll("csv", "CSV wait failed", e))?;
        sink.step("csv", format!("CSV {csv} succeeded"));

        checkpoint(cancel, "rbac")?;
        sink.step("rbac", "Applying supplemental RBAC for Job creation...");
        match apply_job_permissions(client, namespace).await {
            Ok(()) => sink.step("rbac", "Supplemental RBAC applied"),
            Err(e) => {
                warn!(namespace, error = %e, "Supplemental RBAC failed");
                sink.warn("rbac", format!("Supplemental RBAC failed: {e}"));
            }
        }

        checkpoint(cancel, "pods")?;
        sink.step("pods", "Waiting for operator pods to be ready...");
        match wait_for_pods(client, namespace, cancel).await {
            Ok(()) => sink.step("pods", "Operator pods are ready"),
            Err(PollError::Cancelled) => return Err(StepFailure::cancelled("pods")),
            Err(e) => {
                warn!(namespace, error = %e, "Operator pods not ready");
                sink.warn("pods", format!("Some operator pods may not be ready: {e}"));
            }
        }

        checkpoint(cancel, "bundles")?;
        sink.step("bundles", "Waiting for ProfileBundles to become VALID...");
        match wait_for_bundles(client, namespace, cancel).await {
            Ok(()) => sink.step("bundles", "ProfileBundles are VALID"),
            Err(PollError::Cancelled) => return Err(StepFailure::cancelled("bundles")),
            Err(e) => {
                warn!(namespace, error = %e, "ProfileBundles not valid");
                sink.warn("bundles", format!("ProfileBundles may not be valid: {e}"));
            }
        }

        Ok(())
    }

    async fn resolve_version(&self, version_ref: Option<&str>, sink: &ProgressSink) -> String {
        if let Some(version) = version_ref.filter(|v| !v.trim().is_empty()) {
            return version.trim().to_string();
        }
        sink.step("version", "Resolving latest release from GitHub...");
        match self.releases.latest().await {
            Ok(tag) => tag,
            Err(e) => {
                warn!(error = %e, fallback = FALLBACK_REF, "Could not fetch latest release");
                FALLBACK_REF.to_string()
            }
        }
    }
}

/// Whether `version` ships arm64 images.
///
/// Refs that are not `vMAJOR.MINOR[.PATCH]` (branches such as `master`) are
/// assumed to track current code and are accepted.
#[must_use]
pub fn supports_arm(version: &str) -> bool {
    parse_version(version).is_none_or(|v| v >= MIN_ARM_VERSION)
}

fn parse_version(version: &str) -> Option<(u64, u64, u64)> {
    let version = version.strip_prefix('v').unwrap_or(version);
    let core = version.split(['-', '+']).next()?;
    let mut parts = core.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = match parts.next() {
        Some(patch) => patch.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

async fn check_marketplace_health(client: &dyn ClusterClientTrait) -> Result<(), String> {
    client
        .get_namespace(MARKETPLACE_NAMESPACE)
        .await
        .map_err(|e| format!("namespace {MARKETPLACE_NAMESPACE} not found: {e}"))?;

    let pods = client
        .list_pods(MARKETPLACE_NAMESPACE)
        .await
        .map_err(|e| format!("listing pods in {MARKETPLACE_NAMESPACE}: {e}"))?;

    for pod in &pods {
        if matches!(pod_phase(pod), "Running" | "Succeeded") {
            continue;
        }
        if let Some(reason) = pod_waiting_reason(pod).filter(|r| MARKETPLACE_ERROR_STATES.contains(r)) {
            let name = pod.metadata.name.as_deref().unwrap_or_default();
            return Err(format!("pod {name} in error state: {reason}"));
        }
    }
    Ok(())
}

async fn count_arm_nodes(client: &dyn ClusterClientTrait) -> Result<usize, cluster_client::ClusterError> {
    let nodes = client.list_nodes().await?;
    Ok(nodes.iter().filter(|node| node_is_arm(node)).count())
}

/// Certified when the certified catalog exists and resolves the operator package
async fn detect_source(client: &dyn ClusterClientTrait) -> InstallSource {
    if let Err(e) = client
        .get(&resources::catalog_sources(), MARKETPLACE_NAMESPACE, CERTIFIED_CATALOG)
        .await
    {
        if !e.is_not_found() {
            warn!(error = %e, "Certified catalog check failed, falling back to community");
        }
        return InstallSource::Community;
    }

    match client
        .get(&resources::package_manifests(), MARKETPLACE_NAMESPACE, OPERATOR_NAME)
        .await
    {
        Ok(manifest) if manifest.nested_str(&["status", "catalogSource"]) == Some(CERTIFIED_CATALOG) => {
            InstallSource::Certified
        }
        Ok(_) => InstallSource::Community,
        Err(e) => {
            if !e.is_not_found() {
                warn!(error = %e, "Package manifest check failed, falling back to community");
            }
            InstallSource::Community
        }
    }
}

async fn provision(
    client: &dyn ClusterClientTrait,
    namespace: &str,
    source: InstallSource,
    version: &str,
) -> Result<(), String> {
    if source == InstallSource::Community {
        ensure_created(client, &resources::catalog_sources(), MARKETPLACE_NAMESPACE, &community_catalog(version))
            .await
            .map_err(|e| format!("creating CatalogSource: {e}"))?;
    }
    ensure_created(client, &resources::operator_groups(), namespace, &operator_group(namespace))
        .await
        .map_err(|e| format!("creating OperatorGroup: {e}"))?;
    ensure_created(client, &resources::subscriptions(), namespace, &subscription(namespace, source))
        .await
        .map_err(|e| format!("creating Subscription: {e}"))?;
    Ok(())
}

fn community_catalog(version: &str) -> Document {
    Document::new(json!({
        "apiVersion": "operators.coreos.com/v1alpha1",
        "kind": "CatalogSource",
        "metadata": {
            "name": OPERATOR_NAME,
            "namespace": MARKETPLACE_NAMESPACE,
        },
        "spec": {
            "displayName": "Compliance Operator Upstream",
            "image": format!("{COMMUNITY_CATALOG_IMAGE}:{version}"),
            "publisher": "github.com/complianceascode/compliance-operator",
            "sourceType": "grpc",
            "grpcPodConfig": {
                "tolerations": [
                    { "key": "node-role.kubernetes.io/master", "operator": "Exists", "effect": "NoSchedule" },
                    { "key": "node-role.kubernetes.io/control-plane", "operator": "Exists", "effect": "NoSchedule" },
                ],
            },
        },
    }))
}

fn operator_group(namespace: &str) -> Document {
    Document::new(json!({
        "apiVersion": "operators.coreos.com/v1",
        "kind": "OperatorGroup",
        "metadata": { "name": OPERATOR_NAME, "namespace": namespace },
        "spec": { "targetNamespaces": [namespace] },
    }))
}

fn subscription(namespace: &str, source: InstallSource) -> Document {
    let (channel, catalog) = match source {
        InstallSource::Certified => (CERTIFIED_CHANNEL, CERTIFIED_CATALOG),
        InstallSource::Community => (COMMUNITY_CHANNEL, OPERATOR_NAME),
    };
    Document::new(json!({
        "apiVersion": "operators.coreos.com/v1alpha1",
        "kind": "Subscription",
        "metadata": { "name": SUBSCRIPTION_NAME, "namespace": namespace },
        "spec": {
            "channel": channel,
            "installPlanApproval": "Automatic",
            "name": OPERATOR_NAME,
            "source": catalog,
            "sourceNamespace": MARKETPLACE_NAMESPACE,
        },
    }))
}

/// Waits for the subscription to name its installed CSV, then for that CSV to succeed
async fn wait_for_csv(client: &dyn ClusterClientTrait, namespace: &str, cancel: &CancellationToken) -> Result<String, PollError> {
    let subscriptions = &resources::subscriptions();
    let csv_name = poll_until(CSV_POLL, cancel, move || async move {
        match client.get(subscriptions, namespace, SUBSCRIPTION_NAME).await {
            Ok(sub) => match sub.nested_str(&["status", "installedCSV"]) {
                Some(name) if !name.is_empty() => Attempt::Ready(name.to_string()),
                _ => Attempt::Pending("installedCSV not populated".to_string()),
            },
            Err(e) => Attempt::Pending(format!("reading subscription: {e}")),
        }
    })
    .await?;

    let csvs = &resources::cluster_service_versions();
    let csv = csv_name.as_str();
    poll_until(CSV_POLL, cancel, move || async move {
        match client.get(csvs, namespace, csv).await {
            Ok(doc) => match doc.nested_str(&["status", "phase"]) {
                Some("Succeeded") => Attempt::Ready(()),
                phase => Attempt::Pending(format!("CSV {csv} phase {}", phase.unwrap_or("unknown"))),
            },
            Err(e) => Attempt::Pending(format!("reading CSV {csv}: {e}")),
        }
    })
    .await?;

    Ok(csv_name)
}

async fn apply_job_permissions(client: &dyn ClusterClientTrait, namespace: &str) -> Result<(), cluster_client::ClusterError> {
    let metadata = ObjectMeta {
        name: Some(JOB_PERMISSIONS.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    };
    let role = Role {
        metadata: metadata.clone(),
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["batch".to_string()]),
            resources: Some(vec!["jobs".to_string()]),
            verbs: ["create", "delete", "get", "list", "watch", "update", "patch"]
                .map(String::from)
                .to_vec(),
            ..Default::default()
        }]),
    };
    match client.create_role(namespace, &role).await {
        Ok(_) => {}
        Err(e) if e.is_already_exists() => debug!(namespace, "Job permissions role already exists"),
        Err(e) => return Err(e),
    }

    let binding = RoleBinding {
        metadata,
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: JOB_PERMISSIONS.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: OPERATOR_NAME.to_string(),
            namespace: Some(namespace.to_string()),
            api_group: None,
        }]),
    };
    match client.create_role_binding(namespace, &binding).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_already_exists() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Every pod that has not completed reports Ready, and there is at least one
async fn wait_for_pods(client: &dyn ClusterClientTrait, namespace: &str, cancel: &CancellationToken) -> Result<(), PollError> {
    poll_until(POD_POLL, cancel, move || async move {
        let pods = match client.list_pods(namespace).await {
            Ok(pods) => pods,
            Err(e) => return Attempt::Pending(format!("listing pods: {e}")),
        };
        let active: Vec<_> = pods.iter().filter(|pod| pod_phase(pod) != "Succeeded").collect();
        let not_ready = active.iter().filter(|pod| !pod_ready(pod)).count();
        if active.is_empty() {
            Attempt::Pending("no operator pods yet".to_string())
        } else if not_ready == 0 {
            Attempt::Ready(())
        } else {
            Attempt::Pending(format!("{not_ready} of {} pods not ready", active.len()))
        }
    })
    .await
}

async fn wait_for_bundles(client: &dyn ClusterClientTrait, namespace: &str, cancel: &CancellationToken) -> Result<(), PollError> {
    let bundles = &resources::compliance(resources::PROFILE_BUNDLES);
    poll_until(BUNDLE_POLL, cancel, move || async move {
        match client.list(bundles, namespace, None).await {
            Ok(items) if items.is_empty() => Attempt::Pending("no ProfileBundles yet".to_string()),
            Ok(items) => match items
                .iter()
                .find(|b| b.nested_str(&["status", "dataStreamStatus"]) != Some("VALID"))
            {
                Some(pending) => Attempt::Pending(format!("ProfileBundle {} not VALID", pending.name())),
                None => Attempt::Ready(()),
            },
            Err(e) => Attempt::Pending(format!("listing ProfileBundles: {e}")),
        }
    })
    .await
}
