//! Apply, remove and batch-apply remediations

use super::addressing::{resolve_addressing, Addressing, AddressingTable};
use super::{apply_flag, detect_role, TARGET_PATH};
use crate::error::DashboardError;
use crate::poll::{poll_until, PollError, PollPolicy, Attempt};
use crate::resources;
use cluster_client::{ClusterClientTrait, ClusterError, Document};
use compliance_types::{RemediationDetail, RemediationInfo, RemediationResult, Severity};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Wait for a machine config pool after each node configuration change:
/// first check after 30s, then every 30s, for up to 10 minutes.
pub const POOL_CONVERGENCE: PollPolicy = PollPolicy::new(Duration::from_secs(30), 20).with_initial_delay();

/// A remediation's embedded object, ready to be written
#[derive(Debug)]
struct Target {
    object: Document,
    kind: String,
    addressing: Addressing,
}

impl Target {
    fn name(&self) -> &str {
        self.object.name()
    }
}

/// Turns remediation records into applied or removed cluster objects
pub struct RemediationEngine {
    client: Option<Arc<dyn ClusterClientTrait>>,
    table: AddressingTable,
}

impl RemediationEngine {
    pub fn new(client: Option<Arc<dyn ClusterClientTrait>>) -> Self {
        Self::with_table(client, AddressingTable::default())
    }

    /// Engine resolving target objects through `table` instead of the built-in routes
    pub fn with_table(client: Option<Arc<dyn ClusterClientTrait>>, table: AddressingTable) -> Self {
        Self { client, table }
    }

    fn connected(&self) -> Result<&dyn ClusterClientTrait, DashboardError> {
        self.client.as_deref().ok_or(DashboardError::NotConnected)
    }

    /// Creates or updates the object embedded in remediation `name`.
    ///
    /// An existing object is updated at its current resource version. The
    /// record's apply flag is set afterwards; failing to set it is logged only.
    pub async fn apply(&self, namespace: &str, name: &str) -> Result<RemediationResult, DashboardError> {
        let client = self.connected()?;
        let (remediation, mut target) = self.load(client, namespace, name).await?;

        let gvr = &target.addressing.gvr;
        let object_namespace = target.addressing.namespace.as_str();
        match client.create(gvr, object_namespace, &target.object).await {
            Ok(_) => debug!(remediation = name, resource = %gvr, object = target.name(), "Created remediation object"),
            Err(e) if e.is_already_exists() => {
                let current = client.get(gvr, object_namespace, target.name()).await?;
                if let Some(version) = current.resource_version() {
                    target.object.set_resource_version(version);
                }
                client.update(gvr, object_namespace, &target.object).await?;
                debug!(remediation = name, resource = %gvr, object = target.name(), "Updated remediation object");
            }
            Err(e) => return Err(e.into()),
        }

        self.set_apply_flag(client, namespace, name, true).await;

        let mut message = format!("Applied {} {}", target.kind, target.name());
        if target.addressing.reboots_nodes {
            let role = detect_role(&remediation);
            message.push_str(&format!(" ({} - nodes with role {role} will reboot)", target.kind));
        }
        info!(remediation = name, %message, "Remediation applied");

        Ok(RemediationResult {
            name: name.to_string(),
            applied: true,
            message,
            error: None,
        })
    }

    /// Deletes the object embedded in remediation `name`. An object that is
    /// already gone counts as removed.
    pub async fn remove(&self, namespace: &str, name: &str) -> Result<RemediationResult, DashboardError> {
        let client = self.connected()?;
        let (_, target) = self.load(client, namespace, name).await?;

        let message = match client
            .delete(&target.addressing.gvr, &target.addressing.namespace, target.name())
            .await
        {
            Ok(()) => format!("Removed {} {}", target.kind, target.name()),
            Err(e) if e.is_not_found() => format!("Object {} {} was already removed", target.kind, target.name()),
            Err(e) => return Err(e.into()),
        };

        self.set_apply_flag(client, namespace, name, false).await;
        info!(remediation = name, %message, "Remediation removed");

        Ok(RemediationResult {
            name: name.to_string(),
            applied: false,
            message,
            error: None,
        })
    }

    /// Every remediation in `namespace`, with severity joined from the check
    /// result of the same name. An uninstalled operator yields an empty list.
    pub async fn list_remediations(&self, namespace: &str) -> Result<Vec<RemediationInfo>, DashboardError> {
        let client = self.connected()?;

        let remediations = match client
            .list(&resources::compliance(resources::REMEDIATIONS), namespace, None)
            .await
        {
            Ok(items) => items,
            Err(ClusterError::ResourceNotRecognized(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let severities: HashMap<String, Severity> = match client
            .list(&resources::compliance(resources::CHECK_RESULTS), namespace, None)
            .await
        {
            Ok(results) => results
                .iter()
                .map(|result| {
                    (
                        result.name().to_string(),
                        Severity::from_record(result.nested_str(&["severity"]).unwrap_or_default()),
                    )
                })
                .collect(),
            Err(e) => {
                warn!(namespace, error = %e, "Listing check results failed, severities unknown");
                HashMap::new()
            }
        };

        Ok(remediations
            .iter()
            .map(|remediation| {
                let kind = remediation.nested_string(&["spec", "current", "object", "kind"]);
                RemediationInfo {
                    name: remediation.name().to_string(),
                    namespace: namespace.to_string(),
                    severity: severities.get(remediation.name()).copied().unwrap_or_default(),
                    applied: apply_flag(remediation),
                    reboot_needed: self.table.route(&kind).is_some_and(|route| route.reboots_nodes),
                    role: detect_role(remediation),
                    kind,
                }
            })
            .collect())
    }

    /// One remediation with its target object rendered as YAML. Severity comes
    /// from the check result of the same name; a missing result leaves it unknown.
    pub async fn remediation_detail(&self, namespace: &str, name: &str) -> Result<RemediationDetail, DashboardError> {
        let client = self.connected()?;
        let (remediation, target) = self.load(client, namespace, name).await?;

        let severity = match client
            .get(&resources::compliance(resources::CHECK_RESULTS), namespace, name)
            .await
        {
            Ok(result) => Severity::from_record(result.nested_str(&["severity"]).unwrap_or_default()),
            Err(e) => {
                debug!(remediation = name, error = %e, "No check result for remediation");
                Severity::Unknown
            }
        };

        Ok(RemediationDetail {
            api_version: target.object.api_version().to_string(),
            target_namespace: target.addressing.namespace.clone(),
            object_yaml: serde_yaml::to_string(target.object.as_value())?,
            info: RemediationInfo {
                name: name.to_string(),
                namespace: namespace.to_string(),
                severity,
                applied: apply_flag(&remediation),
                reboot_needed: target.addressing.reboots_nodes,
                role: detect_role(&remediation),
                kind: target.kind,
            },
        })
    }

    /// Applies every remediation of `severity`, one at a time, in listing order.
    ///
    /// One result per attempt goes to `results`. After any attempt on a kind
    /// that reboots nodes the batch waits for the role's pool to report
    /// `Updated`; giving up on that wait is not an error. Returns the number
    /// of attempts made.
    pub async fn apply_by_severity(
        &self,
        namespace: &str,
        severity: Severity,
        results: &mpsc::UnboundedSender<RemediationResult>,
        cancel: &CancellationToken,
    ) -> Result<usize, DashboardError> {
        let client = self.connected()?;
        let selected: Vec<RemediationInfo> = self
            .list_remediations(namespace)
            .await?
            .into_iter()
            .filter(|info| info.severity == severity)
            .collect();
        info!(namespace, %severity, count = selected.len(), "Applying remediations by severity");

        let mut attempted = 0;
        for info in &selected {
            if cancel.is_cancelled() {
                info!(attempted, "Severity batch cancelled");
                break;
            }
            let result = match self.apply(namespace, &info.name).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(remediation = %info.name, error = %e, "Remediation failed, continuing batch");
                    RemediationResult::failed(&info.name, e.to_string())
                }
            };
            attempted += 1;
            if results.send(result).is_err() {
                debug!("Result reader dropped");
            }

            if info.reboot_needed {
                self.wait_for_pool(client, &info.role, cancel).await;
            }
        }
        Ok(attempted)
    }

    async fn load(
        &self,
        client: &dyn ClusterClientTrait,
        namespace: &str,
        name: &str,
    ) -> Result<(Document, Target), DashboardError> {
        let remediation = match client
            .get(&resources::compliance(resources::REMEDIATIONS), namespace, name)
            .await
        {
            Ok(doc) => doc,
            Err(e) if e.is_not_found() => return Err(DashboardError::RemediationNotFound(name.to_string())),
            Err(e) => return Err(e.into()),
        };

        let invalid = |reason: &str| DashboardError::InvalidRemediation {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        let mut object = remediation
            .nested_document(&TARGET_PATH)
            .ok_or_else(|| invalid("remediation has no spec.current.object"))?;
        let kind = object.kind().to_string();
        if kind.is_empty() || object.api_version().is_empty() {
            return Err(invalid("remediation object missing kind or apiVersion"));
        }

        let mut addressing = resolve_addressing(&self.table, &kind, object.api_version(), namespace);
        if let Some(own) = object.namespace() {
            addressing.namespace = own.to_string();
        }
        if object.name().is_empty() {
            object.set_name(name);
        }

        Ok((
            remediation,
            Target {
                object,
                kind,
                addressing,
            },
        ))
    }

    async fn set_apply_flag(&self, client: &dyn ClusterClientTrait, namespace: &str, name: &str, applied: bool) {
        let patch = json!({ "spec": { "apply": applied } });
        if let Err(e) = client
            .merge_patch(&resources::compliance(resources::REMEDIATIONS), namespace, name, &patch)
            .await
        {
            warn!(remediation = name, applied, error = %e, "Failed to record apply flag");
        }
    }

    async fn wait_for_pool(&self, client: &dyn ClusterClientTrait, role: &str, cancel: &CancellationToken) {
        let role = if role.is_empty() { "worker" } else { role };
        let pools = resources::machine_config_pools();
        let pools = &pools;
        info!(pool = role, "Waiting for machine config pool to converge");

        let outcome = poll_until(POOL_CONVERGENCE, cancel, move || async move {
            match client.get(pools, "", role).await {
                Ok(pool) if pool_updated(&pool) => Attempt::Ready(()),
                Ok(_) => Attempt::Pending(format!("pool {role} is still updating")),
                Err(e) => Attempt::Pending(e.to_string()),
            }
        })
        .await;

        match outcome {
            Ok(()) => info!(pool = role, "Machine config pool updated"),
            Err(PollError::Cancelled) => debug!(pool = role, "Pool wait cancelled"),
            Err(e) => warn!(pool = role, error = %e, "Gave up waiting for machine config pool, continuing"),
        }
    }
}

fn pool_updated(pool: &Document) -> bool {
    pool.nested_slice(&["status", "conditions"]).iter().any(|condition| {
        condition.get("type").and_then(|v| v.as_str()) == Some("Updated")
            && condition.get("status").and_then(|v| v.as_str()) == Some("True")
    })
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;
