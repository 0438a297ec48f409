//! The job lifecycle protocol.
//!
//! Every job type implements [`JobLifecycle`]. Implementations are stateless:
//! each call receives the job it works on (a working copy the caller persists
//! on success), a read-only snapshot of the workflow the job belongs to, and
//! the collaborators in a [`LifecycleContext`].
//!
//! Authoring calls may run in any order and any number of times. `to_jobs` is
//! the single execution-time call for a trigger.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use cluster::ClusterResolver;

use crate::jobs::CanaryDeployJob;
use crate::license::LicenseChecker;
use crate::models::{Job, JobTask, JobType, WorkflowDefinition};
use crate::store::WorkflowStore;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// External collaborators available to lifecycle calls.
#[derive(Clone)]
pub struct LifecycleContext {
    /// Persisted workflow documents.
    pub store: Arc<dyn WorkflowStore>,
    /// Access to live clusters, used only by `to_jobs`.
    pub clusters: Arc<dyn ClusterResolver>,
    /// Feature gate consulted by `lint_job`.
    pub license: Arc<dyn LicenseChecker>,
}

impl LifecycleContext {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        clusters: Arc<dyn ClusterResolver>,
        license: Arc<dyn LicenseChecker>,
    ) -> Self {
        Self {
            store,
            clusters,
            license,
        }
    }
}

impl fmt::Debug for LifecycleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleContext").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

/// The contract every job type fulfils.
///
/// Each method decodes `job.spec` into the type's own structure before doing
/// anything else and fails with [`EngineError::Parse`] on a shape mismatch.
/// On success the updated typed spec is written back into `job.spec`.
#[async_trait]
pub trait JobLifecycle: Send + Sync {
    fn job_type(&self) -> JobType;

    /// Parse freshly authored (possibly template-expanded) configuration.
    fn instantiate(&self, job: &mut Job) -> Result<(), EngineError>;

    /// Re-parse the stored spec for editing.
    fn set_preset(&self, job: &mut Job) -> Result<(), EngineError>;

    /// Fill the candidate pool from the persisted version of `workflow`.
    async fn set_options(
        &self,
        job: &mut Job,
        workflow: &WorkflowDefinition,
        ctx: &LifecycleContext,
    ) -> Result<(), EngineError>;

    /// Drop the candidate pool.
    fn clear_options(&self, job: &mut Job) -> Result<(), EngineError>;

    /// Empty the executed selection.
    fn clear_selection_field(&self, job: &mut Job) -> Result<(), EngineError>;

    /// Reconcile the job against the latest stored version of `workflow`.
    async fn update_with_latest_setting(
        &self,
        job: &mut Job,
        workflow: &WorkflowDefinition,
        ctx: &LifecycleContext,
    ) -> Result<(), EngineError>;

    /// Overlay the executed selection of `args`; a different job is ignored.
    fn merge_args(&self, job: &mut Job, args: &Job) -> Result<(), EngineError>;

    /// Resolve live state and expand the job into tasks. All or nothing.
    async fn to_jobs(
        &self,
        job: &mut Job,
        workflow: &WorkflowDefinition,
        task_id: i64,
        ctx: &LifecycleContext,
    ) -> Result<Vec<JobTask>, EngineError>;

    /// Pre-save validation against the whole workflow.
    fn lint_job(
        &self,
        job: &Job,
        workflow: &WorkflowDefinition,
        ctx: &LifecycleContext,
    ) -> Result<(), EngineError>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps job types to their lifecycle implementation.
#[derive(Clone, Default)]
pub struct JobRegistry {
    handlers: HashMap<JobType, Arc<dyn JobLifecycle>>,
}

impl JobRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every job type this crate implements.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CanaryDeployJob));
        registry
    }

    /// Register `handler` under its own job type, replacing any previous one.
    pub fn register(&mut self, handler: Arc<dyn JobLifecycle>) {
        self.handlers.insert(handler.job_type(), handler);
    }

    pub fn contains(&self, job_type: &JobType) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Lifecycle for `job_type`.
    ///
    /// # Errors
    /// [`EngineError::UnsupportedJobType`] if nothing is registered.
    pub fn get(&self, job_type: &JobType) -> Result<Arc<dyn JobLifecycle>, EngineError> {
        self.handlers
            .get(job_type)
            .cloned()
            .ok_or_else(|| EngineError::UnsupportedJobType(job_type.clone()))
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}
