//! The collaborator contracts for reaching a cluster.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{ClusterError, Deployment, LabelSelector, Service};

/// Turns a cluster ID into a handle on that cluster's API.
///
/// Timeouts and cancellation belong to the implementation's transport.
#[async_trait]
pub trait ClusterResolver: Send + Sync {
    async fn resolve(&self, cluster_id: &str) -> Result<Arc<dyn ClusterHandle>, ClusterError>;
}

/// Read access to one cluster.
#[async_trait]
pub trait ClusterHandle: Send + Sync {
    /// Fetch a service. `Ok(None)` means the API answered "not found".
    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, ClusterError>;

    /// List the deployments in `namespace` whose pod template labels match
    /// `selector`.
    async fn list_deployments(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<Deployment>, ClusterError>;
}
