//! `SnapshotResolver`: clusters served from an in-memory snapshot.
//!
//! Backs the `plan` command (a snapshot file exported from live clusters) and
//! the engine tests. Every call is recorded in order so tests can assert what
//! was, and was not, looked up.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ClusterError, ClusterHandle, ClusterResolver, Deployment, LabelSelector, Service};

/// Objects of a single cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterState {
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub deployments: Vec<Deployment>,
}

/// Serialized form: cluster ID → objects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    #[serde(default)]
    pub clusters: BTreeMap<String, ClusterState>,
}

/// One recorded call against the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    Resolve(String),
    GetService { namespace: String, name: String },
    ListDeployments { namespace: String, selector: String },
}

/// Failure injected into a cluster.
#[derive(Debug, Clone)]
enum Fault {
    Unreachable(String),
    Api(String),
    ListDeployments(String),
}

type CallLog = Arc<Mutex<Vec<ClusterCall>>>;

fn record(calls: &CallLog, call: ClusterCall) {
    calls
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(call);
}

/// A [`ClusterResolver`] over a [`ClusterSnapshot`].
#[derive(Debug, Clone, Default)]
pub struct SnapshotResolver {
    clusters: BTreeMap<String, Arc<ClusterState>>,
    faults: BTreeMap<String, Fault>,
    calls: CallLog,
}

impl SnapshotResolver {
    pub fn new(snapshot: ClusterSnapshot) -> Self {
        Self {
            clusters: snapshot
                .clusters
                .into_iter()
                .map(|(id, state)| (id, Arc::new(state)))
                .collect(),
            faults: BTreeMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add (or replace) a cluster.
    pub fn with_cluster(mut self, cluster_id: impl Into<String>, state: ClusterState) -> Self {
        self.clusters.insert(cluster_id.into(), Arc::new(state));
        self
    }

    /// Make `resolve` fail for `cluster_id`.
    pub fn with_unreachable(mut self, cluster_id: impl Into<String>, message: impl Into<String>) -> Self {
        self.faults
            .insert(cluster_id.into(), Fault::Unreachable(message.into()));
        self
    }

    /// Make every API call on `cluster_id` fail after it resolves.
    pub fn with_api_error(mut self, cluster_id: impl Into<String>, message: impl Into<String>) -> Self {
        self.faults.insert(cluster_id.into(), Fault::Api(message.into()));
        self
    }

    /// Make only `list_deployments` fail on `cluster_id`.
    pub fn with_list_error(mut self, cluster_id: impl Into<String>, message: impl Into<String>) -> Self {
        self.faults
            .insert(cluster_id.into(), Fault::ListDeployments(message.into()));
        self
    }

    /// All calls seen so far, in order.
    pub fn calls(&self) -> Vec<ClusterCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ClusterResolver for SnapshotResolver {
    async fn resolve(&self, cluster_id: &str) -> Result<Arc<dyn ClusterHandle>, ClusterError> {
        record(&self.calls, ClusterCall::Resolve(cluster_id.to_owned()));

        let (api_error, list_error) = match self.faults.get(cluster_id) {
            Some(Fault::Unreachable(message)) => {
                return Err(ClusterError::Unreachable {
                    cluster_id: cluster_id.to_owned(),
                    message: message.clone(),
                });
            }
            Some(Fault::Api(message)) => (Some(message.clone()), None),
            Some(Fault::ListDeployments(message)) => (None, Some(message.clone())),
            None => (None, None),
        };

        let state = self
            .clusters
            .get(cluster_id)
            .cloned()
            .ok_or_else(|| ClusterError::UnknownCluster(cluster_id.to_owned()))?;

        debug!(cluster_id, "resolved snapshot cluster");
        let handle: Arc<dyn ClusterHandle> = Arc::new(SnapshotCluster {
            state,
            api_error,
            list_error,
            calls: Arc::clone(&self.calls),
        });
        Ok(handle)
    }
}

/// Handle on one snapshot cluster.
struct SnapshotCluster {
    state: Arc<ClusterState>,
    api_error: Option<String>,
    list_error: Option<String>,
    calls: CallLog,
}

impl SnapshotCluster {
    fn check_api(&self) -> Result<(), ClusterError> {
        match &self.api_error {
            Some(message) => Err(ClusterError::Api(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ClusterHandle for SnapshotCluster {
    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, ClusterError> {
        record(
            &self.calls,
            ClusterCall::GetService {
                namespace: namespace.to_owned(),
                name: name.to_owned(),
            },
        );
        self.check_api()?;

        Ok(self
            .state
            .services
            .iter()
            .find(|s| s.namespace == namespace && s.name == name)
            .cloned())
    }

    async fn list_deployments(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<Deployment>, ClusterError> {
        record(
            &self.calls,
            ClusterCall::ListDeployments {
                namespace: namespace.to_owned(),
                selector: selector.to_string(),
            },
        );
        self.check_api()?;
        if let Some(message) = &self.list_error {
            return Err(ClusterError::Api(message.clone()));
        }

        Ok(self
            .state
            .deployments
            .iter()
            .filter(|d| d.namespace == namespace && selector.matches(&d.template_labels))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"
clusters:
  prod:
    services:
      - name: web
        namespace: shop
        cluster_ip: 10.0.0.12
        selector: { app: web }
    deployments:
      - name: web-v1
        namespace: shop
        replicas: 4
        template_labels: { app: web, version: v1 }
      - name: worker
        namespace: shop
        template_labels: { app: worker }
"#;

    fn resolver() -> SnapshotResolver {
        let snapshot: ClusterSnapshot = serde_yaml::from_str(SNAPSHOT).expect("valid snapshot");
        SnapshotResolver::new(snapshot)
    }

    #[tokio::test]
    async fn lookups_are_served_from_snapshot() {
        let resolver = resolver();
        let handle = resolver.resolve("prod").await.expect("cluster exists");

        let service = handle
            .get_service("shop", "web")
            .await
            .expect("api ok")
            .expect("service exists");
        let deployments = handle
            .list_deployments("shop", &service.label_selector())
            .await
            .expect("api ok");

        assert_eq!(deployments.len(), 1);
        assert_eq!(deployments[0].name, "web-v1");
        assert_eq!(deployments[0].desired_replicas(), 4);
    }

    #[tokio::test]
    async fn missing_service_is_none() {
        let handle = resolver().resolve("prod").await.expect("cluster exists");
        let service = handle.get_service("shop", "ghost").await.expect("api ok");
        assert!(service.is_none());
    }

    #[tokio::test]
    async fn unknown_and_unreachable_clusters_fail() {
        let resolver = resolver().with_unreachable("staging", "connection refused");

        assert!(matches!(
            resolver.resolve("dev").await,
            Err(ClusterError::UnknownCluster(id)) if id == "dev"
        ));
        assert!(matches!(
            resolver.resolve("staging").await,
            Err(ClusterError::Unreachable { .. })
        ));
    }

    #[tokio::test]
    async fn api_error_surfaces_on_calls() {
        let resolver = resolver().with_api_error("prod", "etcdserver: request timed out");
        let handle = resolver.resolve("prod").await.expect("resolve succeeds");
        assert!(matches!(
            handle.get_service("shop", "web").await,
            Err(ClusterError::Api(_))
        ));
    }

    #[tokio::test]
    async fn list_error_only_affects_deployment_listing() {
        let resolver = resolver().with_list_error("prod", "deployments.apps is forbidden");
        let handle = resolver.resolve("prod").await.expect("resolve succeeds");

        let service = handle
            .get_service("shop", "web")
            .await
            .expect("service lookup still works")
            .expect("service exists");
        assert!(matches!(
            handle.list_deployments("shop", &service.label_selector()).await,
            Err(ClusterError::Api(message)) if message == "deployments.apps is forbidden"
        ));
    }

    #[tokio::test]
    async fn calls_are_recorded_in_order() {
        let resolver = resolver();
        let handle = resolver.resolve("prod").await.expect("cluster exists");
        let _ = handle.get_service("shop", "web").await;

        assert_eq!(
            resolver.calls(),
            vec![
                ClusterCall::Resolve("prod".into()),
                ClusterCall::GetService {
                    namespace: "shop".into(),
                    name: "web".into()
                },
            ]
        );
    }
}
