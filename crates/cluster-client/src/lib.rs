//! Cluster API client
//!
//! Capability layer over the Kubernetes API server used by the compliance
//! dashboard. Exposes typed calls for namespaces, pods, nodes and RBAC
//! objects, plus a dynamic variant addressed by [`Gvr`] for arbitrary kinds
//! (operator subscriptions, compliance records, remediation targets).
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClientTrait, Gvr, KubeClusterClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeClusterClient::try_default().await?;
//!
//! let suites = Gvr::new("compliance.openshift.io", "v1alpha1", "compliancesuites");
//! for suite in client.list(&suites, "openshift-compliance", None).await? {
//!     println!("{} {:?}", suite.name(), suite.nested_str(&["status", "phase"]));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Objects returned by the dynamic calls are [`Document`]s: a JSON tree with
//! typed accessors for nested fields. An empty namespace argument addresses a
//! cluster-scoped resource.

pub mod client;
pub mod document;
pub mod error;
pub mod gvr;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeClusterClient;
pub use cluster_trait::{ClusterClientTrait, ClusterWatchEvent, WatchStream};
pub use document::Document;
pub use error::ClusterError;
pub use gvr::Gvr;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockClusterClient, MockFailure, MockWatch};
