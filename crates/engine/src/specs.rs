//! Typed views of job configuration.
//!
//! These are materialised from [`Job::spec`](crate::models::Job::spec) for the
//! duration of one lifecycle call and never cached.

use serde::{Deserialize, Serialize};

/// Workload kind recorded on resolved canary targets.
pub const WORKLOAD_TYPE_DEPLOYMENT: &str = "deployment";

/// Upper bound of [`CanaryTarget::canary_percentage`].
pub const MAX_CANARY_PERCENTAGE: u32 = 100;

// ---------------------------------------------------------------------------
// Canary deploy
// ---------------------------------------------------------------------------

/// A deployable unit selected through its Kubernetes service.
///
/// `workload_type` and `workload_name` are filled in by live resolution; the
/// user only picks `k8s_service_name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanaryTarget {
    pub k8s_service_name: String,
    pub workload_type: String,
    pub workload_name: String,
    pub container_name: String,
    pub image: String,
    pub canary_percentage: u32,
    /// Seconds the executor waits for the canary rollout.
    pub deploy_timeout: u64,
}

impl CanaryTarget {
    /// Identity used to match targets across workflow revisions.
    pub fn identity(&self) -> (&str, &str, &str) {
        (&self.workload_type, &self.workload_name, &self.container_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanaryDeployJobSpec {
    pub cluster_id: String,
    pub namespace: String,
    pub docker_registry_id: String,
    /// Targets that will be executed.
    pub targets: Vec<CanaryTarget>,
    /// Candidate pool offered for selection; never executed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub target_options: Vec<CanaryTarget>,
}

// ---------------------------------------------------------------------------
// Canary release
// ---------------------------------------------------------------------------

/// The part of a canary-release job's spec that deploy jobs care about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanaryReleaseJobSpec {
    /// Name of the canary-deploy job this release finalises.
    pub from_job: String,
    pub release_timeout: u64,
}

// ---------------------------------------------------------------------------
// Generated task payload
// ---------------------------------------------------------------------------

/// Fully resolved coordinates of one canary deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTaskCanaryDeploySpec {
    pub namespace: String,
    pub cluster_id: String,
    pub docker_registry_id: String,
    pub deploy_timeout: u64,
    pub k8s_service_name: String,
    pub workload_type: String,
    pub workload_name: String,
    pub container_name: String,
    pub canary_percentage: u32,
    pub canary_replica: i32,
    pub image: String,
}
