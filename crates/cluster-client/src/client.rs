//! Kubernetes API client
//!
//! Implements `ClusterClientTrait` over `kube`. Typed calls use the
//! `k8s-openapi` structs; dynamic calls go through `Api<DynamicObject>` built
//! from a [`Gvr`] so any served resource kind can be addressed without
//! discovery.

use crate::cluster_trait::{ClusterClientTrait, ClusterWatchEvent, WatchStream};
use crate::document::Document;
use crate::error::ClusterError;
use crate::gvr::Gvr;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams, WatchEvent, WatchParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::Client;
use serde_json::Value;
use tracing::debug;

/// Cluster client backed by a `kube::Client`
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from `KUBECONFIG`, `~/.kube/config` or the in-cluster
    /// service account, in that order.
    pub async fn try_default() -> Result<Self, ClusterError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn dynamic_api(&self, gvr: &Gvr, namespace: &str) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk(&gvr.group, &gvr.version, "");
        let resource = ApiResource::from_gvk_with_plural(&gvk, &gvr.resource);
        if namespace.is_empty() {
            Api::all_with(self.client.clone(), &resource)
        } else {
            Api::namespaced_with(self.client.clone(), namespace, &resource)
        }
    }
}

fn describe(gvr: &Gvr, namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        format!("{} {}", gvr.resource, name)
    } else {
        format!("{} {}/{}", gvr.resource, namespace, name)
    }
}

fn to_dynamic(object: &Document) -> Result<DynamicObject, ClusterError> {
    Ok(serde_json::from_value(object.as_value().clone())?)
}

fn to_document(object: &DynamicObject) -> Result<Document, ClusterError> {
    Ok(Document::new(serde_json::to_value(object)?))
}

fn translate_event(event: kube::Result<WatchEvent<DynamicObject>>) -> Result<ClusterWatchEvent, ClusterError> {
    match event {
        Ok(WatchEvent::Added(obj)) => to_document(&obj).map(ClusterWatchEvent::Added),
        Ok(WatchEvent::Modified(obj)) => to_document(&obj).map(ClusterWatchEvent::Modified),
        Ok(WatchEvent::Deleted(obj)) => to_document(&obj).map(ClusterWatchEvent::Deleted),
        Ok(WatchEvent::Error(status)) => Err(ClusterError::Api {
            code: status.code,
            message: status.message.clone(),
        }),
        Ok(_) => Ok(ClusterWatchEvent::Other),
        Err(e) => Err(ClusterError::Kube(e)),
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for KubeClusterClient {
    async fn server_version(&self) -> Result<String, ClusterError> {
        let info = self.client.apiserver_version().await?;
        Ok(info.git_version)
    }

    async fn get_namespace(&self, name: &str) -> Result<Namespace, ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.get(name)
            .await
            .map_err(|e| ClusterError::from_object_call(e, &format!("namespace {name}")))
    }

    async fn create_namespace(&self, name: &str) -> Result<Namespace, ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        api.create(&PostParams::default(), &namespace)
            .await
            .map_err(|e| ClusterError::from_object_call(e, &format!("namespace {name}")))
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| ClusterError::from_object_call(e, &format!("namespace {name}")))?;
        Ok(())
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, ClusterError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api
            .list(&ListParams::default())
            .await
            .map_err(|e| ClusterError::from_collection_call(e, &format!("pods in {namespace}")))?;
        Ok(pods.items)
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, ClusterError> {
        let api: Api<Node> = Api::all(self.client.clone());
        let nodes = api
            .list(&ListParams::default())
            .await
            .map_err(|e| ClusterError::from_collection_call(e, "nodes"))?;
        Ok(nodes.items)
    }

    async fn create_role(&self, namespace: &str, role: &Role) -> Result<Role, ClusterError> {
        let api: Api<Role> = Api::namespaced(self.client.clone(), namespace);
        let name = role.metadata.name.clone().unwrap_or_default();
        api.create(&PostParams::default(), role)
            .await
            .map_err(|e| ClusterError::from_object_call(e, &format!("role {namespace}/{name}")))
    }

    async fn create_role_binding(&self, namespace: &str, binding: &RoleBinding) -> Result<RoleBinding, ClusterError> {
        let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
        let name = binding.metadata.name.clone().unwrap_or_default();
        api.create(&PostParams::default(), binding)
            .await
            .map_err(|e| ClusterError::from_object_call(e, &format!("rolebinding {namespace}/{name}")))
    }

    async fn get(&self, gvr: &Gvr, namespace: &str, name: &str) -> Result<Document, ClusterError> {
        let api = self.dynamic_api(gvr, namespace);
        let object = api
            .get(name)
            .await
            .map_err(|e| ClusterError::from_object_call(e, &describe(gvr, namespace, name)))?;
        to_document(&object)
    }

    async fn list(&self, gvr: &Gvr, namespace: &str, label_selector: Option<&str>) -> Result<Vec<Document>, ClusterError> {
        let api = self.dynamic_api(gvr, namespace);
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let list = api
            .list(&params)
            .await
            .map_err(|e| ClusterError::from_collection_call(e, &gvr.to_string()))?;
        debug!(resource = %gvr, count = list.items.len(), "Listed objects");
        list.items.iter().map(to_document).collect()
    }

    async fn create(&self, gvr: &Gvr, namespace: &str, object: &Document) -> Result<Document, ClusterError> {
        let api = self.dynamic_api(gvr, namespace);
        let created = api
            .create(&PostParams::default(), &to_dynamic(object)?)
            .await
            .map_err(|e| ClusterError::from_object_call(e, &describe(gvr, namespace, object.name())))?;
        to_document(&created)
    }

    async fn update(&self, gvr: &Gvr, namespace: &str, object: &Document) -> Result<Document, ClusterError> {
        let name = object.name();
        if name.is_empty() {
            return Err(ClusterError::InvalidObject(format!("{gvr} update without metadata.name")));
        }
        let api = self.dynamic_api(gvr, namespace);
        let replaced = api
            .replace(name, &PostParams::default(), &to_dynamic(object)?)
            .await
            .map_err(|e| ClusterError::from_object_call(e, &describe(gvr, namespace, name)))?;
        to_document(&replaced)
    }

    async fn delete(&self, gvr: &Gvr, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let api = self.dynamic_api(gvr, namespace);
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| ClusterError::from_object_call(e, &describe(gvr, namespace, name)))?;
        Ok(())
    }

    async fn merge_patch(&self, gvr: &Gvr, namespace: &str, name: &str, patch: &Value) -> Result<Document, ClusterError> {
        let api = self.dynamic_api(gvr, namespace);
        let patched = api
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| ClusterError::from_object_call(e, &describe(gvr, namespace, name)))?;
        to_document(&patched)
    }

    async fn watch(&self, gvr: &Gvr, namespace: &str) -> Result<WatchStream, ClusterError> {
        let api = self.dynamic_api(gvr, namespace);
        let stream = api
            .watch(&WatchParams::default(), "0")
            .await
            .map_err(|e| ClusterError::from_collection_call(e, &gvr.to_string()))?;
        Ok(stream.map(translate_event).boxed())
    }
}
