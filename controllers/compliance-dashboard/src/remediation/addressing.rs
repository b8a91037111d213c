//! Where a remediation's target object lives.
//!
//! Known kinds are routed through a static table; anything else falls back to
//! lowercasing the kind and appending `s`, in the caller's namespace. The
//! fallback is wrong for irregular plurals, which is why the table is
//! injectable.

use super::MACHINE_CONFIG_KIND;
use cluster_client::gvr::split_api_version;
use cluster_client::Gvr;
use std::collections::HashMap;

/// Routing for one known kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindRoute {
    /// Fixed group/version; `None` takes them from the object's apiVersion
    pub group_version: Option<(&'static str, &'static str)>,
    pub resource: &'static str,
    pub cluster_scoped: bool,
    /// Applying the kind restarts nodes
    pub reboots_nodes: bool,
}

impl KindRoute {
    #[must_use]
    pub const fn cluster(group: &'static str, version: &'static str, resource: &'static str) -> Self {
        Self {
            group_version: Some((group, version)),
            resource,
            cluster_scoped: true,
            reboots_nodes: false,
        }
    }

    #[must_use]
    pub const fn namespaced(group_version: Option<(&'static str, &'static str)>, resource: &'static str) -> Self {
        Self {
            group_version,
            resource,
            cluster_scoped: false,
            reboots_nodes: false,
        }
    }
}

/// Resolved location of a target object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addressing {
    pub gvr: Gvr,
    /// Empty for cluster-scoped kinds
    pub namespace: String,
    pub reboots_nodes: bool,
}

/// Kind to route lookup
#[derive(Debug, Clone)]
pub struct AddressingTable {
    routes: HashMap<&'static str, KindRoute>,
}

impl Default for AddressingTable {
    fn default() -> Self {
        let machine_config = KindRoute {
            reboots_nodes: true,
            ..KindRoute::cluster("machineconfiguration.openshift.io", "v1", "machineconfigs")
        };
        Self::empty()
            .with_route(MACHINE_CONFIG_KIND, machine_config)
            .with_route(
                "KubeletConfig",
                KindRoute::cluster("machineconfiguration.openshift.io", "v1", "kubeletconfigs"),
            )
            .with_route("APIServer", KindRoute::cluster("config.openshift.io", "v1", "apiservers"))
            .with_route("OAuth", KindRoute::cluster("config.openshift.io", "v1", "oauths"))
            .with_route(
                "IngressController",
                KindRoute::namespaced(Some(("operator.openshift.io", "v1")), "ingresscontrollers"),
            )
            .with_route("ConfigMap", KindRoute::namespaced(None, "configmaps"))
            .with_route("Secret", KindRoute::namespaced(None, "secrets"))
    }
}

impl AddressingTable {
    /// A table with no known kinds; everything takes the fallback
    #[must_use]
    pub fn empty() -> Self {
        Self { routes: HashMap::new() }
    }

    #[must_use]
    pub fn with_route(mut self, kind: &'static str, route: KindRoute) -> Self {
        self.routes.insert(kind, route);
        self
    }

    #[must_use]
    pub fn route(&self, kind: &str) -> Option<&KindRoute> {
        self.routes.get(kind)
    }
}

/// Resolves a target object's resource and namespace through `table`.
///
/// Cluster-scoped kinds always get an empty namespace. Unknown kinds take
/// `lowercase(kind) + "s"` in `default_namespace`.
#[must_use]
pub fn resolve_addressing(table: &AddressingTable, kind: &str, api_version: &str, default_namespace: &str) -> Addressing {
    let (group, version) = split_api_version(api_version);
    match table.route(kind) {
        Some(route) => {
            let (group, version) = match route.group_version {
                Some((group, version)) => (group.to_string(), version.to_string()),
                None => (group, version),
            };
            Addressing {
                gvr: Gvr::new(group, version, route.resource),
                namespace: if route.cluster_scoped {
                    String::new()
                } else {
                    default_namespace.to_string()
                },
                reboots_nodes: route.reboots_nodes,
            }
        }
        None => Addressing {
            gvr: Gvr::new(group, version, format!("{}s", kind.to_lowercase())),
            namespace: default_namespace.to_string(),
            reboots_nodes: false,
        },
    }
}
