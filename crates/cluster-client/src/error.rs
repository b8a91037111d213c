//! Cluster client errors

use thiserror::Error;

/// Errors that can occur when talking to the cluster API server
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Named object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create rejected because the object already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Update rejected because the resource version is stale
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The API server does not serve this resource kind (CRD not installed)
    #[error("Resource not recognized: {0}")]
    ResourceNotRecognized(String),

    /// API server returned an error status
    #[error("API error ({code}): {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Server message
        message: String,
    },

    /// Transport or client-side kube error
    #[error("Kubernetes client error: {0}")]
    Kube(#[from] kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Object is missing fields required for the call
    #[error("Invalid object: {0}")]
    InvalidObject(String),
}

impl ClusterError {
    /// True for a missing object
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }

    /// True when a create hit an existing object
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ClusterError::AlreadyExists(_))
    }

    /// Maps a kube error for a single named object.
    ///
    /// A 404 on a get/delete means the object is gone.
    pub(crate) fn from_object_call(err: kube::Error, what: &str) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => ClusterError::NotFound(what.to_string()),
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                ClusterError::AlreadyExists(what.to_string())
            }
            kube::Error::Api(ae) if ae.code == 409 => {
                ClusterError::Conflict(format!("{what}: {}", ae.message))
            }
            kube::Error::Api(ae) => ClusterError::Api {
                code: ae.code,
                message: ae.message.clone(),
            },
            other => ClusterError::Kube(other),
        }
    }

    /// Maps a kube error for a collection call (list/watch).
    ///
    /// A 404 on a collection means the resource kind itself is unknown.
    pub(crate) fn from_collection_call(err: kube::Error, what: &str) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => {
                ClusterError::ResourceNotRecognized(what.to_string())
            }
            other => ClusterError::from_object_call(other, what),
        }
    }
}
