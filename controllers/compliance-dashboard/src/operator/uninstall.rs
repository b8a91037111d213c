//! Uninstall sequence
//!
//! Best-effort teardown: individual cleanup failures are logged and the run
//! moves on. Only the namespace deletion can fail the run.

use super::{checkpoint, Orchestrator, ProgressSink, StepFailure, MARKETPLACE_NAMESPACE, OPERATOR_NAME, SUBSCRIPTION_NAME};
use crate::poll::{poll_until, PollError, PollPolicy, Attempt};
use crate::resources;
use cluster_client::{ClusterClientTrait, ClusterError, Gvr};
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Compliance kinds removed before the operator itself, in order
const CLEANUP_KINDS: [(&str, &str); 8] = [
    ("ComplianceCheckResults", resources::CHECK_RESULTS),
    ("ComplianceRemediations", resources::REMEDIATIONS),
    ("ComplianceSuites", resources::SUITES),
    ("ComplianceScans", resources::SCANS),
    ("ScanSettingBindings", resources::SCAN_SETTING_BINDINGS),
    ("ScanSettings", resources::SCAN_SETTINGS),
    ("ProfileBundles", resources::PROFILE_BUNDLES),
    ("Profiles", resources::PROFILES),
];

const NAMESPACE_POLL: PollPolicy = PollPolicy::new(Duration::from_secs(5), 30);

impl Orchestrator {
    /// Removes the operator and everything it manages from `namespace`
    pub async fn uninstall(&self, namespace: &str, sink: ProgressSink, cancel: &CancellationToken) {
        info!(namespace, "Starting operator uninstall");
        match self.run_uninstall(namespace, &sink, cancel).await {
            Ok(()) => {
                info!(namespace, "Operator uninstall complete");
                sink.complete("complete", "Compliance Operator uninstalled successfully");
            }
            Err(failure) => {
                warn!(namespace, step = failure.step, message = %failure.message, "Operator uninstall failed");
                sink.fail(failure.step, failure.message);
            }
        }
    }

    async fn run_uninstall(&self, namespace: &str, sink: &ProgressSink, cancel: &CancellationToken) -> Result<(), StepFailure> {
        let client = self.connected()?;

        for (label, resource) in CLEANUP_KINDS {
            checkpoint(cancel, "cleanup")?;
            sink.step("cleanup", format!("Removing {label}..."));
            remove_all(client, &resources::compliance(resource), namespace, true).await;
        }
        sink.step("cleanup", "Compliance resources removed");

        checkpoint(cancel, "subscription")?;
        sink.step("subscription", "Deleting Subscription...");
        delete_if_present(client, &resources::subscriptions(), namespace, SUBSCRIPTION_NAME).await;
        sink.step("subscription", "Subscription deleted");

        checkpoint(cancel, "csv")?;
        sink.step("csv", "Deleting ClusterServiceVersion...");
        remove_all(client, &resources::cluster_service_versions(), namespace, false).await;
        sink.step("csv", "ClusterServiceVersion deleted");

        checkpoint(cancel, "operatorgroup")?;
        sink.step("operatorgroup", "Deleting OperatorGroup...");
        delete_if_present(client, &resources::operator_groups(), namespace, OPERATOR_NAME).await;
        sink.step("operatorgroup", "OperatorGroup deleted");

        // Only present after a community install
        checkpoint(cancel, "catalogsource")?;
        sink.step("catalogsource", "Deleting CatalogSource...");
        delete_if_present(client, &resources::catalog_sources(), MARKETPLACE_NAMESPACE, OPERATOR_NAME).await;
        sink.step("catalogsource", "CatalogSource deleted");

        checkpoint(cancel, "namespace")?;
        sink.step("namespace", format!("Deleting namespace {namespace}..."));
        match client.delete_namespace(namespace).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => debug!(namespace, "Namespace already gone"),
            Err(e) => return Err(StepFailure::new("namespace", format!("Failed to delete namespace: {e}"))),
        }
        wait_for_namespace_gone(client, namespace, cancel)
            .await
            .map_err(|e| match e {
                PollError::Cancelled => StepFailure::cancelled("namespace"),
                PollError::Exhausted { .. } => {
                    StepFailure::new("namespace", format!("Timed out waiting for namespace deletion: {e}"))
                }
            })?;
        sink.step("namespace", "Namespace deleted");

        Ok(())
    }
}

/// Deletes every object of `gvr` in `namespace`, optionally clearing finalizers first
async fn remove_all(client: &dyn ClusterClientTrait, gvr: &Gvr, namespace: &str, strip_finalizers: bool) {
    let items = match client.list(gvr, namespace, None).await {
        Ok(items) => items,
        Err(ClusterError::ResourceNotRecognized(_)) => {
            debug!(resource = %gvr, "Resource kind not served, nothing to remove");
            return;
        }
        Err(e) => {
            warn!(resource = %gvr, error = %e, "Listing for cleanup failed");
            return;
        }
    };

    let clear_finalizers = json!({ "metadata": { "finalizers": null } });
    for item in &items {
        let name = item.name();
        if strip_finalizers {
            if let Err(e) = client.merge_patch(gvr, namespace, name, &clear_finalizers).await {
                debug!(resource = %gvr, name, error = %e, "Clearing finalizers failed");
            }
        }
        match client.delete(gvr, namespace, name).await {
            Ok(()) => debug!(resource = %gvr, name, "Deleted"),
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(resource = %gvr, name, error = %e, "Delete failed"),
        }
    }
}

async fn delete_if_present(client: &dyn ClusterClientTrait, gvr: &Gvr, namespace: &str, name: &str) {
    match client.delete(gvr, namespace, name).await {
        Ok(()) => debug!(resource = %gvr, name, "Deleted"),
        Err(e) if e.is_not_found() => debug!(resource = %gvr, name, "Already absent"),
        Err(e) => warn!(resource = %gvr, name, error = %e, "Delete failed"),
    }
}

async fn wait_for_namespace_gone(client: &dyn ClusterClientTrait, namespace: &str, cancel: &CancellationToken) -> Result<(), PollError> {
    poll_until(NAMESPACE_POLL, cancel, move || async move {
        match client.get_namespace(namespace).await {
            Err(e) if e.is_not_found() => Attempt::Ready(()),
            Ok(_) => Attempt::Pending(format!("namespace {namespace} still terminating")),
            Err(e) => Attempt::Pending(format!("reading namespace {namespace}: {e}")),
        }
    })
    .await
}
