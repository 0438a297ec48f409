//! Cluster-level error type.

use thiserror::Error;

/// Errors returned by a [`ClusterResolver`](crate::ClusterResolver) or a
/// [`ClusterHandle`](crate::ClusterHandle).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// No cluster is registered under the requested ID.
    #[error("unknown cluster '{0}'")]
    UnknownCluster(String),

    /// The cluster exists but its API could not be reached.
    #[error("cluster '{cluster_id}' is unreachable: {message}")]
    Unreachable {
        cluster_id: String,
        message: String,
    },

    /// The API server answered with an error.
    #[error("cluster api error: {0}")]
    Api(String),
}
