//! Mock ClusterClient for unit testing
//!
//! In-memory implementation of `ClusterClientTrait` so orchestration code can
//! be tested without an API server.
//!
//! - Objects are keyed by (resource, namespace, name). Group and version are
//!   not part of the key.
//! - `create` rejects an existing object with `AlreadyExists`.
//! - `update` requires the stored resource version. A missing or stale
//!   version is a `Conflict`, so callers that skip the re-fetch are caught.
//! - Failures can be injected per (verb, resource).
//! - Create reactions merge-patch an object right after creation, standing
//!   in for a controller that converges it.
//! - Watch sessions are scripted per resource. Once the script runs out the
//!   watch stays open with no events.
//! - Every call is appended to a log for ordering assertions.

mod store;
#[cfg(test)]
mod tests;

use crate::cluster_trait::{ClusterClientTrait, ClusterWatchEvent, WatchStream};
use crate::document::Document;
use crate::error::ClusterError;
use crate::gvr::Gvr;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use store::ObjectStore;
use tokio::time::Instant;

/// Error to return from an injected failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    NotFound,
    AlreadyExists,
    Conflict,
    NotRecognized,
    Api(u16, String),
}

impl MockFailure {
    fn to_error(&self, what: &str) -> ClusterError {
        match self {
            MockFailure::NotFound => ClusterError::NotFound(what.to_string()),
            MockFailure::AlreadyExists => ClusterError::AlreadyExists(what.to_string()),
            MockFailure::Conflict => ClusterError::Conflict(what.to_string()),
            MockFailure::NotRecognized => ClusterError::ResourceNotRecognized(what.to_string()),
            MockFailure::Api(code, message) => ClusterError::Api {
                code: *code,
                message: message.clone(),
            },
        }
    }
}

/// One scripted watch subscription
#[derive(Debug, Clone)]
pub enum MockWatch {
    /// Opens, yields the events, then ends as if the server closed it
    Events(Vec<ClusterWatchEvent>),
    /// Fails to open
    Fail(MockFailure),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock ClusterClient for testing
#[derive(Clone, Default)]
pub struct MockClusterClient {
    pub(crate) store: Arc<Mutex<ObjectStore>>,
    pub(crate) namespaces: Arc<Mutex<BTreeSet<String>>>,
    pub(crate) sticky_namespaces: Arc<Mutex<BTreeSet<String>>>,
    pub(crate) pods: Arc<Mutex<Vec<Pod>>>,
    pub(crate) nodes: Arc<Mutex<Vec<Node>>>,
    pub(crate) roles: Arc<Mutex<BTreeSet<(String, String)>>>,
    pub(crate) role_bindings: Arc<Mutex<BTreeSet<(String, String)>>>,
    pub(crate) failures: Arc<Mutex<HashMap<(String, String), MockFailure>>>,
    pub(crate) create_reactions: Arc<Mutex<HashMap<String, Value>>>,
    pub(crate) watches: Arc<Mutex<HashMap<String, VecDeque<MockWatch>>>>,
    pub(crate) watch_opens: Arc<Mutex<HashMap<String, Vec<Instant>>>>,
    pub(crate) calls: Arc<Mutex<Vec<String>>>,
    pub(crate) server_version: Arc<Mutex<String>>,
}

impl std::fmt::Debug for MockClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClusterClient")
            .field("calls", &lock(&self.calls).len())
            .finish_non_exhaustive()
    }
}

impl MockClusterClient {
    /// Create a new, empty mock client
    pub fn new() -> Self {
        let client = Self::default();
        *lock(&client.server_version) = "v1.30.0".to_string();
        client
    }

    /// Seed a dynamic object. Its resource version is assigned by the store.
    pub fn insert(&self, gvr: &Gvr, namespace: &str, object: Document) {
        lock(&self.store).put(&gvr.resource, namespace, object.into_value());
    }

    /// Current state of a stored object
    pub fn object(&self, gvr: &Gvr, namespace: &str, name: &str) -> Option<Document> {
        lock(&self.store).get(&gvr.resource, namespace, name).map(Document::new)
    }

    /// Every stored object of a resource, in key order
    pub fn objects(&self, gvr: &Gvr) -> Vec<Document> {
        lock(&self.store)
            .list(&gvr.resource, "")
            .into_iter()
            .map(Document::new)
            .collect()
    }

    pub fn add_namespace(&self, name: &str) {
        lock(&self.namespaces).insert(name.to_string());
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        lock(&self.namespaces).contains(name)
    }

    /// Namespace survives `delete_namespace`, as if stuck terminating
    pub fn make_namespace_sticky(&self, name: &str) {
        lock(&self.sticky_namespaces).insert(name.to_string());
    }

    pub fn add_pod(&self, pod: Pod) {
        lock(&self.pods).push(pod);
    }

    pub fn add_node(&self, node: Node) {
        lock(&self.nodes).push(node);
    }

    pub fn has_role(&self, namespace: &str, name: &str) -> bool {
        lock(&self.roles).contains(&(namespace.to_string(), name.to_string()))
    }

    pub fn has_role_binding(&self, namespace: &str, name: &str) -> bool {
        lock(&self.role_bindings).contains(&(namespace.to_string(), name.to_string()))
    }

    pub fn set_server_version(&self, version: &str) {
        *lock(&self.server_version) = version.to_string();
    }

    /// Every later `verb` call on `resource` fails with `failure`.
    ///
    /// Verbs: `get`, `list`, `create`, `update`, `delete`, `patch`, `watch`.
    /// Typed calls use the plural name (`namespaces`, `pods`, `nodes`,
    /// `roles`, `rolebindings`).
    pub fn fail(&self, verb: &str, resource: &str, failure: MockFailure) {
        lock(&self.failures).insert((verb.to_string(), resource.to_string()), failure);
    }

    pub fn clear_failure(&self, verb: &str, resource: &str) {
        lock(&self.failures).remove(&(verb.to_string(), resource.to_string()));
    }

    /// After a successful create on `resource`, merge `patch` into the new object
    pub fn on_create(&self, resource: &str, patch: Value) {
        lock(&self.create_reactions).insert(resource.to_string(), patch);
    }

    /// Queue a scripted watch session for `resource`
    pub fn push_watch(&self, resource: &str, session: MockWatch) {
        lock(&self.watches)
            .entry(resource.to_string())
            .or_default()
            .push_back(session);
    }

    /// Instants at which watches on `resource` were opened (successfully or not)
    pub fn watch_opens(&self, resource: &str) -> Vec<Instant> {
        lock(&self.watch_opens).get(resource).cloned().unwrap_or_default()
    }

    /// Call log entries, formatted `"{verb} {resource} {name}"`
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Position of the first call log entry starting with `prefix`
    pub fn call_position(&self, prefix: &str) -> Option<usize> {
        lock(&self.calls).iter().position(|c| c.starts_with(prefix))
    }

    fn record(&self, verb: &str, resource: &str, name: &str) -> Result<(), ClusterError> {
        let entry = format!("{verb} {resource} {name}");
        lock(&self.calls).push(entry.trim_end().to_string());
        match lock(&self.failures).get(&(verb.to_string(), resource.to_string())) {
            Some(failure) => Err(failure.to_error(&format!("{resource} {name}"))),
            None => Ok(()),
        }
    }

    fn namespace_object(name: &str) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn server_version(&self) -> Result<String, ClusterError> {
        self.record("get", "version", "")?;
        Ok(lock(&self.server_version).clone())
    }

    async fn get_namespace(&self, name: &str) -> Result<Namespace, ClusterError> {
        self.record("get", "namespaces", name)?;
        if lock(&self.namespaces).contains(name) {
            Ok(Self::namespace_object(name))
        } else {
            Err(ClusterError::NotFound(format!("namespace {name}")))
        }
    }

    async fn create_namespace(&self, name: &str) -> Result<Namespace, ClusterError> {
        self.record("create", "namespaces", name)?;
        if lock(&self.namespaces).insert(name.to_string()) {
            Ok(Self::namespace_object(name))
        } else {
            Err(ClusterError::AlreadyExists(format!("namespace {name}")))
        }
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        self.record("delete", "namespaces", name)?;
        if !lock(&self.namespaces).contains(name) {
            return Err(ClusterError::NotFound(format!("namespace {name}")));
        }
        if !lock(&self.sticky_namespaces).contains(name) {
            lock(&self.namespaces).remove(name);
        }
        Ok(())
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, ClusterError> {
        self.record("list", "pods", namespace)?;
        Ok(lock(&self.pods)
            .iter()
            .filter(|pod| pod.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, ClusterError> {
        self.record("list", "nodes", "")?;
        Ok(lock(&self.nodes).clone())
    }

    async fn create_role(&self, namespace: &str, role: &Role) -> Result<Role, ClusterError> {
        let name = role.metadata.name.clone().unwrap_or_default();
        self.record("create", "roles", &name)?;
        if lock(&self.roles).insert((namespace.to_string(), name.clone())) {
            Ok(role.clone())
        } else {
            Err(ClusterError::AlreadyExists(format!("role {namespace}/{name}")))
        }
    }

    async fn create_role_binding(&self, namespace: &str, binding: &RoleBinding) -> Result<RoleBinding, ClusterError> {
        let name = binding.metadata.name.clone().unwrap_or_default();
        self.record("create", "rolebindings", &name)?;
        if lock(&self.role_bindings).insert((namespace.to_string(), name.clone())) {
            Ok(binding.clone())
        } else {
            Err(ClusterError::AlreadyExists(format!("rolebinding {namespace}/{name}")))
        }
    }

    async fn get(&self, gvr: &Gvr, namespace: &str, name: &str) -> Result<Document, ClusterError> {
        self.record("get", &gvr.resource, name)?;
        lock(&self.store)
            .get(&gvr.resource, namespace, name)
            .map(Document::new)
            .ok_or_else(|| ClusterError::NotFound(format!("{} {name}", gvr.resource)))
    }

    async fn list(&self, gvr: &Gvr, namespace: &str, label_selector: Option<&str>) -> Result<Vec<Document>, ClusterError> {
        self.record("list", &gvr.resource, "")?;
        Ok(lock(&self.store)
            .list(&gvr.resource, namespace)
            .into_iter()
            .map(Document::new)
            .filter(|doc| label_selector.is_none_or(|selector| store::selector_matches(selector, doc)))
            .collect())
    }

    async fn create(&self, gvr: &Gvr, namespace: &str, object: &Document) -> Result<Document, ClusterError> {
        let name = object.name().to_string();
        self.record("create", &gvr.resource, &name)?;
        if name.is_empty() {
            return Err(ClusterError::InvalidObject(format!("{} create without metadata.name", gvr.resource)));
        }
        let mut store = lock(&self.store);
        if store.get(&gvr.resource, namespace, &name).is_some() {
            return Err(ClusterError::AlreadyExists(format!("{} {name}", gvr.resource)));
        }
        let mut value = object.as_value().clone();
        if let Some(reaction) = lock(&self.create_reactions).get(&gvr.resource) {
            store::apply_merge_patch(&mut value, reaction);
        }
        Ok(Document::new(store.put(&gvr.resource, namespace, value)))
    }

    async fn update(&self, gvr: &Gvr, namespace: &str, object: &Document) -> Result<Document, ClusterError> {
        let name = object.name().to_string();
        self.record("update", &gvr.resource, &name)?;
        let mut store = lock(&self.store);
        let current = store
            .get(&gvr.resource, namespace, &name)
            .map(Document::new)
            .ok_or_else(|| ClusterError::NotFound(format!("{} {name}", gvr.resource)))?;
        if object.resource_version().is_none() || object.resource_version() != current.resource_version() {
            return Err(ClusterError::Conflict(format!(
                "{} {name}: resource version {:?} does not match {:?}",
                gvr.resource,
                object.resource_version(),
                current.resource_version()
            )));
        }
        Ok(Document::new(store.put(&gvr.resource, namespace, object.as_value().clone())))
    }

    async fn delete(&self, gvr: &Gvr, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.record("delete", &gvr.resource, name)?;
        lock(&self.store)
            .remove(&gvr.resource, namespace, name)
            .map(|_| ())
            .ok_or_else(|| ClusterError::NotFound(format!("{} {name}", gvr.resource)))
    }

    async fn merge_patch(&self, gvr: &Gvr, namespace: &str, name: &str, patch: &Value) -> Result<Document, ClusterError> {
        self.record("patch", &gvr.resource, name)?;
        let mut store = lock(&self.store);
        let mut value = store
            .get(&gvr.resource, namespace, name)
            .ok_or_else(|| ClusterError::NotFound(format!("{} {name}", gvr.resource)))?;
        store::apply_merge_patch(&mut value, patch);
        Ok(Document::new(store.put(&gvr.resource, namespace, value)))
    }

    async fn watch(&self, gvr: &Gvr, _namespace: &str) -> Result<WatchStream, ClusterError> {
        lock(&self.watch_opens)
            .entry(gvr.resource.clone())
            .or_default()
            .push(Instant::now());
        self.record("watch", &gvr.resource, "")?;
        let session = lock(&self.watches)
            .get_mut(&gvr.resource)
            .and_then(VecDeque::pop_front);
        match session {
            Some(MockWatch::Events(events)) => Ok(futures::stream::iter(events.into_iter().map(Ok)).boxed()),
            Some(MockWatch::Fail(failure)) => Err(failure.to_error(&gvr.to_string())),
            None => Ok(futures::stream::pending().boxed()),
        }
    }
}
