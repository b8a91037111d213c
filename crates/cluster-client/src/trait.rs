//! ClusterClient trait for mocking
//!
//! This trait abstracts the cluster API client so the orchestration code can
//! be unit tested against an in-memory double. The concrete
//! `KubeClusterClient` implements it over `kube`.

use crate::document::Document;
use crate::error::ClusterError;
use crate::gvr::Gvr;
use futures::stream::BoxStream;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use serde_json::Value;

/// One change notification from a watch subscription
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterWatchEvent {
    Added(Document),
    Modified(Document),
    Deleted(Document),
    /// Bookmarks and anything else the server sends that is not an object change
    Other,
}

/// Stream of watch events; ends when the server closes the subscription
pub type WatchStream = BoxStream<'static, Result<ClusterWatchEvent, ClusterError>>;

/// Trait for cluster API operations
///
/// Safe for concurrent use by any number of callers. For the dynamic calls
/// an empty `namespace` addresses a cluster-scoped resource.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    /// API server git version (e.g. `v1.30.4`)
    async fn server_version(&self) -> Result<String, ClusterError>;

    // Typed operations
    async fn get_namespace(&self, name: &str) -> Result<Namespace, ClusterError>;
    async fn create_namespace(&self, name: &str) -> Result<Namespace, ClusterError>;
    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError>;
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, ClusterError>;
    async fn list_nodes(&self) -> Result<Vec<Node>, ClusterError>;
    async fn create_role(&self, namespace: &str, role: &Role) -> Result<Role, ClusterError>;
    async fn create_role_binding(&self, namespace: &str, binding: &RoleBinding) -> Result<RoleBinding, ClusterError>;

    // Dynamic operations
    async fn get(&self, gvr: &Gvr, namespace: &str, name: &str) -> Result<Document, ClusterError>;

    /// Lists objects, optionally filtered by an equality label selector (`k=v,k2=v2`)
    async fn list(&self, gvr: &Gvr, namespace: &str, label_selector: Option<&str>) -> Result<Vec<Document>, ClusterError>;
    async fn create(&self, gvr: &Gvr, namespace: &str, object: &Document) -> Result<Document, ClusterError>;

    /// Replaces an object. The object must carry the resource version it was read at.
    async fn update(&self, gvr: &Gvr, namespace: &str, object: &Document) -> Result<Document, ClusterError>;
    async fn delete(&self, gvr: &Gvr, namespace: &str, name: &str) -> Result<(), ClusterError>;

    /// JSON merge patch (RFC 7386); `null` values remove fields
    async fn merge_patch(&self, gvr: &Gvr, namespace: &str, name: &str, patch: &Value) -> Result<Document, ClusterError>;

    /// Opens a long-lived watch. Fails with `ResourceNotRecognized` when the
    /// server does not serve the resource kind.
    async fn watch(&self, gvr: &Gvr, namespace: &str) -> Result<WatchStream, ClusterError>;
}
