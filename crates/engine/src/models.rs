//! Core domain models for workflow documents and generated tasks.
//!
//! A [`Job`] keeps its configuration as an opaque JSON payload. Job types
//! decode it into their own spec structure on every lifecycle call and write
//! the result back with [`Job::store_spec`].

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::specs::JobTaskCanaryDeploySpec;
use crate::EngineError;

// ---------------------------------------------------------------------------
// JobType
// ---------------------------------------------------------------------------

/// Tag selecting the lifecycle implementation of a job.
///
/// Tags this crate does not know are kept verbatim so documents written by
/// other job kinds survive a load/save cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobType {
    CanaryDeploy,
    CanaryRelease,
    Other(String),
}

impl JobType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::CanaryDeploy => "k8s-canary-deploy",
            Self::CanaryRelease => "k8s-canary-release",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for JobType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "k8s-canary-deploy" => Self::CanaryDeploy,
            "k8s-canary-release" => Self::CanaryRelease,
            _ => Self::Other(tag),
        }
    }
}

impl From<JobType> for String {
    fn from(job_type: JobType) -> Self {
        job_type.as_str().to_owned()
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ErrorPolicy
// ---------------------------------------------------------------------------

/// What the execution engine does when a task of this job fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicyKind {
    #[default]
    Stop,
    IgnoreError,
    Retry,
    ManualCheck,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPolicy {
    #[serde(default)]
    pub policy: ErrorPolicyKind,
    /// Only meaningful for [`ErrorPolicyKind::Retry`].
    #[serde(default)]
    pub maximum_retry: u32,
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One declarative step of a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// Type-specific configuration, opaque at this level.
    #[serde(default)]
    pub spec: Value,
    #[serde(default)]
    pub error_policy: ErrorPolicy,
}

impl Job {
    pub fn new(name: impl Into<String>, job_type: JobType, spec: Value) -> Self {
        Self {
            name: name.into(),
            job_type,
            spec,
            error_policy: ErrorPolicy::default(),
        }
    }

    /// True when `other` names the same job (name and type).
    pub fn same_identity(&self, other: &Job) -> bool {
        self.name == other.name && self.job_type == other.job_type
    }

    /// Decode the stored spec as a structured value.
    pub fn decode_spec<S: DeserializeOwned>(&self) -> Result<S, EngineError> {
        serde_json::from_value(self.spec.clone()).map_err(|e| self.parse_error(e))
    }

    /// Decode authored configuration.
    ///
    /// A string payload is template-expanded YAML text and is parsed as such;
    /// anything else is decoded like [`Job::decode_spec`].
    pub fn decode_authored_spec<S: DeserializeOwned>(&self) -> Result<S, EngineError> {
        match &self.spec {
            Value::String(text) => serde_yaml::from_str(text).map_err(|e| self.parse_error(e)),
            _ => self.decode_spec(),
        }
    }

    /// Replace the stored payload with `spec`.
    pub fn store_spec<S: Serialize>(&mut self, spec: &S) -> Result<(), EngineError> {
        let value = serde_json::to_value(spec).map_err(|e| self.parse_error(e))?;
        self.spec = value;
        Ok(())
    }

    fn parse_error(&self, err: impl fmt::Display) -> EngineError {
        EngineError::Parse {
            job: self.name.clone(),
            job_type: self.job_type.clone(),
            message: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage / WorkflowDefinition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    /// Jobs of a parallel stage run concurrently and share one rank.
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub jobs: Vec<Job>,
}

/// A named workflow document: ordered stages of ordered jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

impl WorkflowDefinition {
    /// All jobs in flattened (stage, job) order.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.stages.iter().flat_map(|stage| stage.jobs.iter())
    }

    /// First job with the given name and type.
    pub fn find_job(&self, name: &str, job_type: &JobType) -> Option<&Job> {
        self.jobs()
            .find(|job| job.name == name && &job.job_type == job_type)
    }

    /// Position of the first job named `name`.
    pub fn locate_job(&self, name: &str) -> Option<(usize, usize)> {
        self.stages.iter().enumerate().find_map(|(si, stage)| {
            stage
                .jobs
                .iter()
                .position(|job| job.name == name)
                .map(|ji| (si, ji))
        })
    }
}

// ---------------------------------------------------------------------------
// JobTask
// ---------------------------------------------------------------------------

/// Type-specific payload of a generated task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobTaskSpec {
    CanaryDeploy(JobTaskCanaryDeploySpec),
}

/// An execution-ready sub-task produced by `to_jobs`.
///
/// A point-in-time snapshot; nothing mutates it after generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTask {
    pub name: String,
    pub key: String,
    pub display_name: String,
    /// Name of the job this task was generated from.
    pub origin_name: String,
    pub job_info: BTreeMap<String, String>,
    pub job_type: JobType,
    pub spec: JobTaskSpec,
    pub error_policy: ErrorPolicy,
}
