//! Cluster watch bridge.
//!
//! Runs one independent unit per watched compliance resource. Each unit keeps
//! a watch open against the API server, projects every change down to a few
//! fields and publishes it on the hub. Units never share state, so backoff in
//! one does not slow the others.

use crate::backoff::{FailureKind, WatchBackoff};
use crate::hub::HubHandle;
use crate::metrics::DashboardMetrics;
use crate::poll::sleep_unless_cancelled;
use crate::remediation::apply_flag;
use crate::resources;
use cluster_client::{ClusterClientTrait, ClusterError, ClusterWatchEvent, Document, Gvr};
use compliance_types::{Message, MessageKind, WatchEvent, WatchEventKind};
use futures::StreamExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Which fields of a changed object travel in the event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// `status`, `severity`, `description`
    CheckResult,
    /// `kind` of the embedded target object, `applied` flag
    Remediation,
    /// `status.phase`, `status.result`
    Phase,
}

/// One watched resource and how its events are published
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchedResource {
    pub resource: &'static str,
    pub resource_type: &'static str,
    pub kind: MessageKind,
    pub projection: Projection,
}

impl WatchedResource {
    #[must_use]
    pub fn gvr(&self) -> Gvr {
        resources::compliance(self.resource)
    }
}

pub const WATCHED_RESOURCES: [WatchedResource; 4] = [
    WatchedResource {
        resource: resources::CHECK_RESULTS,
        resource_type: "ComplianceCheckResult",
        kind: MessageKind::CheckResult,
        projection: Projection::CheckResult,
    },
    WatchedResource {
        resource: resources::REMEDIATIONS,
        resource_type: "ComplianceRemediation",
        kind: MessageKind::Remediation,
        projection: Projection::Remediation,
    },
    WatchedResource {
        resource: resources::SUITES,
        resource_type: "ComplianceSuite",
        kind: MessageKind::ScanStatus,
        projection: Projection::Phase,
    },
    WatchedResource {
        resource: resources::SCANS,
        resource_type: "ComplianceScan",
        kind: MessageKind::ScanStatus,
        projection: Projection::Phase,
    },
];

/// Small kind-specific view of an object; never the full object
#[must_use]
pub fn project(projection: Projection, object: &Document) -> BTreeMap<String, Value> {
    let mut data = BTreeMap::new();
    match projection {
        Projection::CheckResult => {
            for field in ["status", "severity", "description"] {
                data.insert(field.to_string(), Value::from(object.nested_string(&[field])));
            }
        }
        Projection::Remediation => {
            data.insert(
                "kind".to_string(),
                Value::from(object.nested_string(&["spec", "current", "object", "kind"])),
            );
            data.insert("applied".to_string(), Value::from(apply_flag(object)));
        }
        Projection::Phase => {
            data.insert("phase".to_string(), Value::from(object.nested_string(&["status", "phase"])));
            data.insert("result".to_string(), Value::from(object.nested_string(&["status", "result"])));
        }
    }
    data
}

/// Translates one watch notification. Non-object events yield `None`.
#[must_use]
pub fn translate(resource: &WatchedResource, event: ClusterWatchEvent) -> Option<Message> {
    let (event_type, object) = match event {
        ClusterWatchEvent::Added(object) => (WatchEventKind::Added, object),
        ClusterWatchEvent::Modified(object) => (WatchEventKind::Modified, object),
        ClusterWatchEvent::Deleted(object) => (WatchEventKind::Deleted, object),
        ClusterWatchEvent::Other => return None,
    };
    let event = WatchEvent {
        event_type,
        resource_type: resource.resource_type.to_string(),
        name: object.name().to_string(),
        namespace: object.namespace().unwrap_or_default().to_string(),
        data: project(resource.projection, &object),
    };
    Message::from_watch_event(resource.kind, event)
}

/// Bridges cluster watches onto the hub
pub struct WatchBridge {
    client: Arc<dyn ClusterClientTrait>,
    hub: HubHandle,
    namespace: String,
    metrics: DashboardMetrics,
    resources: Vec<WatchedResource>,
    backoff: WatchBackoff,
}

impl WatchBridge {
    pub fn new(client: Arc<dyn ClusterClientTrait>, hub: HubHandle, namespace: impl Into<String>, metrics: DashboardMetrics) -> Self {
        Self {
            client,
            hub,
            namespace: namespace.into(),
            metrics,
            resources: WATCHED_RESOURCES.to_vec(),
            backoff: WatchBackoff::default(),
        }
    }

    /// Replaces the backoff template each unit starts from
    #[must_use]
    pub fn with_backoff(mut self, backoff: WatchBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Spawns one unit per watched resource
    pub fn start(self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        info!(namespace = %self.namespace, resources = self.resources.len(), "Starting watch bridge");
        self.resources
            .iter()
            .map(|resource| {
                let unit = WatchUnit {
                    client: Arc::clone(&self.client),
                    hub: self.hub.clone(),
                    namespace: self.namespace.clone(),
                    metrics: self.metrics.clone(),
                    resource: *resource,
                    backoff: self.backoff.clone(),
                };
                tokio::spawn(unit.run(cancel.clone()))
            })
            .collect()
    }
}

struct WatchUnit {
    client: Arc<dyn ClusterClientTrait>,
    hub: HubHandle,
    namespace: String,
    metrics: DashboardMetrics,
    resource: WatchedResource,
    backoff: WatchBackoff,
}

impl WatchUnit {
    async fn run(mut self, cancel: CancellationToken) {
        let gvr = self.resource.gvr();
        let name = self.resource.resource_type;

        while !cancel.is_cancelled() {
            let opened = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                opened = self.client.watch(&gvr, &self.namespace) => opened,
            };

            let failure = match opened {
                Ok(mut stream) => {
                    self.backoff.reset();
                    info!(resource = name, "Watch established");
                    loop {
                        let next = tokio::select! {
                            biased;
                            () = cancel.cancelled() => return,
                            next = stream.next() => next,
                        };
                        match next {
                            Some(Ok(event)) => self.publish(event),
                            Some(Err(e)) => {
                                warn!(resource = name, error = %e, "Watch stream failed");
                                break Some(FailureKind::Other);
                            }
                            None => {
                                debug!(resource = name, "Watch closed by server, reopening");
                                break None;
                            }
                        }
                    }
                }
                Err(ClusterError::ResourceNotRecognized(_)) => {
                    warn!(resource = name, "Resource kind not served, operator likely not installed");
                    Some(FailureKind::NotRecognized)
                }
                Err(e) => {
                    warn!(resource = name, error = %e, "Failed to open watch");
                    Some(FailureKind::Other)
                }
            };

            // Only failures count as reconnects. A clean close waits the base interval.
            let delay = match failure {
                Some(kind) => {
                    self.metrics.watch_reconnects.with_label_values(&[name]).inc();
                    let delay = self.backoff.next_delay(kind);
                    debug!(resource = name, ?delay, "Backing off before reconnect");
                    delay
                }
                None => self.backoff.reopen_delay(),
            };
            if !sleep_unless_cancelled(delay, &cancel).await {
                break;
            }
        }
        debug!(resource = name, "Watch unit stopped");
    }

    fn publish(&self, event: ClusterWatchEvent) {
        if let Some(message) = translate(&self.resource, event) {
            debug!(resource = self.resource.resource_type, kind = %message.kind(), "Publishing watch event");
            self.metrics
                .watch_events
                .with_label_values(&[self.resource.resource_type])
                .inc();
            self.hub.broadcast(message);
        }
    }
}

#[cfg(test)]
#[path = "watcher_test.rs"]
mod watcher_test;
