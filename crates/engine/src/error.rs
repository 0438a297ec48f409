//! Lifecycle error types.

use cluster::ClusterError;
use thiserror::Error;

use crate::license::LicenseError;
use crate::models::JobType;
use crate::store::StoreError;

/// Why a target could not be resolved against its cluster.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionFailure {
    #[error("failed to get service: {0}")]
    ServiceLookup(ClusterError),

    #[error("service not found")]
    ServiceNotFound,

    #[error("headless service is not supported by canary deployment")]
    HeadlessService,

    #[error("list deployments error: {0}")]
    DeploymentLookup(ClusterError),

    #[error("no deployment found")]
    NoDeployment,

    #[error("more than one deployment found ({0})")]
    MultipleDeployments(usize),
}

/// Pre-save validation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LintFailure {
    #[error("no canary release job quotes it")]
    NoQuotingRelease,

    #[error("more than one canary release job quotes it: {0:?}")]
    MultipleQuotingReleases(Vec<String>),

    #[error("canary release job '{release}' must run after it")]
    ReleaseNotAfterDeploy { release: String },

    #[error("target '{service}' has canary percentage {percentage}, expected 0-100")]
    PercentageOutOfRange { service: String, percentage: u32 },
}

/// Errors produced by the job lifecycle protocol.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Stored or supplied configuration does not match the job type's shape.
    #[error("job '{job}': spec does not match {job_type}: {message}")]
    Parse {
        job: String,
        job_type: JobType,
        message: String,
    },

    /// The workflow document could not be fetched.
    #[error("failed to find workflow '{workflow}': {source}")]
    WorkflowNotFound {
        workflow: String,
        #[source]
        source: StoreError,
    },

    /// The workflow exists but holds no job with this name and type.
    #[error("job '{job}' ({job_type}) not found in workflow '{workflow}'")]
    JobNotFound {
        workflow: String,
        job: String,
        job_type: JobType,
    },

    /// The job's cluster could not be resolved to a client.
    #[error("job '{job}': failed to get kube client for cluster '{cluster_id}': {source}")]
    ClusterUnavailable {
        job: String,
        cluster_id: String,
        #[source]
        source: ClusterError,
    },

    /// Live cluster state could not be resolved for a target.
    #[error("job '{job}': cluster '{cluster_id}', service '{service}': {failure}")]
    Resolution {
        job: String,
        cluster_id: String,
        service: String,
        failure: ResolutionFailure,
    },

    #[error("job '{job}': {failure}")]
    Validation { job: String, failure: LintFailure },

    #[error("job '{job}': {source}")]
    LicenseInvalid {
        job: String,
        #[source]
        source: LicenseError,
    },

    /// No lifecycle is registered for this job type.
    #[error("unsupported job type '{0}'")]
    UnsupportedJobType(JobType),
}
