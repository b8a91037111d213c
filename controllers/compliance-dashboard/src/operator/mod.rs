//! Install/uninstall orchestrator.
//!
//! Both sequences are linear and fail-fast. Each step reports progress
//! through a [`ProgressSink`]; a run always ends with exactly one record
//! whose `done` flag is set, carrying an error when the run failed.
//! Callers that need a stream spawn the run with [`Orchestrator::spawn_install`]
//! or [`Orchestrator::spawn_uninstall`] and read the returned receiver.

mod install;
mod status;
mod uninstall;

pub use install::supports_arm;

use crate::hub::HubHandle;
use crate::poll::PollError;
use crate::release::ReleaseIndex;
use cluster_client::{ClusterClientTrait, ClusterError, Document, Gvr};
use compliance_types::{Message, StepProgress};
use k8s_openapi::api::core::v1::{Node, Pod};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

pub const OPERATOR_NAME: &str = "compliance-operator";
pub const SUBSCRIPTION_NAME: &str = "compliance-operator-sub";
pub const MARKETPLACE_NAMESPACE: &str = "openshift-marketplace";
pub const ARM_ARCHITECTURE: &str = "arm64";
/// Ref used when no version was requested and the release index is unreachable
pub const FALLBACK_REF: &str = "master";

/// Write end of a run's progress stream.
///
/// Sends never block. Dropping the sink closes the stream.
pub struct ProgressSink {
    tx: mpsc::UnboundedSender<StepProgress>,
}

impl ProgressSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StepProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn step(&self, step: &str, message: impl Into<String>) {
        self.send(StepProgress::step(step, message));
    }

    /// Non-terminal degraded condition
    pub fn warn(&self, step: &str, message: impl Into<String>) {
        self.send(StepProgress::warning(step, message));
    }

    pub fn fail(&self, step: &str, message: impl Into<String>) {
        self.send(StepProgress::failed(step, message));
    }

    pub fn complete(&self, step: &str, message: impl Into<String>) {
        self.send(StepProgress::complete(step, message));
    }

    fn send(&self, record: StepProgress) {
        // A gone reader does not stop the run
        if self.tx.send(record).is_err() {
            debug!("Progress reader dropped");
        }
    }
}

/// Why a run stopped early
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StepFailure {
    pub step: &'static str,
    pub message: String,
}

impl StepFailure {
    pub fn new(step: &'static str, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
        }
    }

    pub fn cancelled(step: &'static str) -> Self {
        Self::new(step, format!("Cancelled before {step} finished"))
    }

    /// Maps a failed convergence wait, keeping cancellation distinct
    pub fn from_poll(step: &'static str, context: &str, err: PollError) -> Self {
        match err {
            PollError::Cancelled => Self::cancelled(step),
            PollError::Exhausted { .. } => Self::new(step, format!("{context}: {err}")),
        }
    }
}

/// Stops the run if cancellation was requested before `step` starts
fn checkpoint(cancel: &CancellationToken, step: &'static str) -> Result<(), StepFailure> {
    if cancel.is_cancelled() {
        return Err(StepFailure::cancelled(step));
    }
    Ok(())
}

/// Drives install, uninstall and status queries against the cluster
pub struct Orchestrator {
    client: Option<Arc<dyn ClusterClientTrait>>,
    releases: Arc<dyn ReleaseIndex>,
}

impl Orchestrator {
    pub fn new(client: Option<Arc<dyn ClusterClientTrait>>, releases: Arc<dyn ReleaseIndex>) -> Self {
        Self { client, releases }
    }

    fn connected(&self) -> Result<&dyn ClusterClientTrait, StepFailure> {
        self.client
            .as_deref()
            .ok_or_else(|| StepFailure::new("init", "Kubernetes client is not connected"))
    }

    /// Runs the install on its own task and returns its progress stream
    pub fn spawn_install(
        self: &Arc<Self>,
        namespace: String,
        version_ref: Option<String>,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<StepProgress> {
        let (sink, rx) = ProgressSink::channel();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.install(&namespace, version_ref.as_deref(), sink, &cancel).await;
        });
        rx
    }

    /// Runs the uninstall on its own task and returns its progress stream
    pub fn spawn_uninstall(
        self: &Arc<Self>,
        namespace: String,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<StepProgress> {
        let (sink, rx) = ProgressSink::channel();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.uninstall(&namespace, sink, &cancel).await;
        });
        rx
    }
}

/// Publishes every record of a progress stream on the hub.
///
/// A stream that closes without a `done` record is a bug in the producer;
/// observers get an `error` message instead of waiting forever.
pub async fn relay_progress(
    mut progress: mpsc::UnboundedReceiver<StepProgress>,
    hub: HubHandle,
    wrap: fn(StepProgress) -> Message,
    operation: &'static str,
) {
    let mut finished = false;
    while let Some(record) = progress.recv().await {
        finished |= record.done;
        hub.broadcast(wrap(record));
    }
    if !finished {
        error!(operation, "Progress stream closed without a terminal record");
        hub.broadcast(Message::error(format!("{operation} ended without reporting completion")));
    }
}

/// Creates `object`, treating an existing object of the same name as success
pub(crate) async fn ensure_created(
    client: &dyn ClusterClientTrait,
    gvr: &Gvr,
    namespace: &str,
    object: &Document,
) -> Result<(), ClusterError> {
    match client.create(gvr, namespace, object).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_already_exists() => {
            debug!(resource = %gvr, name = object.name(), "Already exists");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

pub(crate) fn pod_phase(pod: &Pod) -> &str {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        .unwrap_or_default()
}

pub(crate) fn pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

pub(crate) fn node_is_arm(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|status| status.node_info.as_ref())
        .is_some_and(|info| info.architecture == ARM_ARCHITECTURE)
}

/// Reason of the first container stuck waiting, if any
pub(crate) fn pod_waiting_reason(pod: &Pod) -> Option<&str> {
    pod.status
        .as_ref()?
        .container_statuses
        .as_ref()?
        .iter()
        .find_map(|cs| cs.state.as_ref()?.waiting.as_ref()?.reason.as_deref())
}
