//! Workflow-level driver for the lifecycle protocol.
//!
//! `WorkflowController` applies one lifecycle operation to every job of a
//! workflow, in flattened (stage, job) order, dispatching through the
//! [`JobRegistry`]. Jobs whose type has no registered lifecycle are skipped.
//!
//! Mutating operations work on a copy of the workflow and only replace the
//! caller's document once every job succeeded.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::lifecycle::{JobLifecycle, JobRegistry, LifecycleContext};
use crate::models::{Job, JobTask, WorkflowDefinition};
use crate::EngineError;

/// Tasks generated for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTasks {
    pub stage: String,
    pub parallel: bool,
    pub tasks: Vec<JobTask>,
}

/// Applies lifecycle operations across a workflow.
#[derive(Debug, Clone)]
pub struct WorkflowController {
    registry: JobRegistry,
    ctx: LifecycleContext,
}

impl WorkflowController {
    pub fn new(registry: JobRegistry, ctx: LifecycleContext) -> Self {
        Self { registry, ctx }
    }

    fn handler_for(&self, job: &Job) -> Option<Arc<dyn JobLifecycle>> {
        match self.registry.get(&job.job_type) {
            Ok(handler) => Some(handler),
            Err(_) => {
                debug!("skipping job '{}': no lifecycle for type '{}'", job.name, job.job_type);
                None
            }
        }
    }

    /// Parse the authored configuration of every job.
    pub fn instantiate(&self, workflow: &mut WorkflowDefinition) -> Result<(), EngineError> {
        let mut working = workflow.clone();
        for stage in &mut working.stages {
            for job in &mut stage.jobs {
                if let Some(handler) = self.handler_for(job) {
                    handler.instantiate(job)?;
                }
            }
        }
        *workflow = working;
        Ok(())
    }

    /// Reconcile every job against the latest stored version of the workflow.
    #[instrument(skip_all, fields(workflow = %workflow.name))]
    pub async fn update_with_latest_setting(
        &self,
        workflow: &mut WorkflowDefinition,
    ) -> Result<(), EngineError> {
        let mut working = workflow.clone();
        for stage in &mut working.stages {
            for job in &mut stage.jobs {
                if let Some(handler) = self.handler_for(job) {
                    handler
                        .update_with_latest_setting(job, workflow, &self.ctx)
                        .await?;
                }
            }
        }
        *workflow = working;
        Ok(())
    }

    /// Overlay the selections of `args` onto the matching jobs.
    pub fn merge_args(
        &self,
        workflow: &mut WorkflowDefinition,
        args: &WorkflowDefinition,
    ) -> Result<(), EngineError> {
        let mut working = workflow.clone();
        for stage in &mut working.stages {
            for job in &mut stage.jobs {
                let Some(arg) = args.find_job(&job.name, &job.job_type) else {
                    continue;
                };
                if let Some(handler) = self.handler_for(job) {
                    handler.merge_args(job, arg)?;
                }
            }
        }
        *workflow = working;
        Ok(())
    }

    /// Validate every job; the first failure is returned.
    pub fn lint(&self, workflow: &WorkflowDefinition) -> Result<(), EngineError> {
        for job in workflow.jobs() {
            if let Some(handler) = self.handler_for(job) {
                handler.lint_job(job, workflow, &self.ctx)?;
            }
        }
        Ok(())
    }

    /// Expand every job into tasks for trigger `task_id`.
    ///
    /// Fail-fast across the whole workflow: any error discards all tasks and
    /// leaves `workflow` untouched. On success the resolved targets are
    /// recorded on the jobs.
    #[instrument(skip_all, fields(workflow = %workflow.name, task_id = task_id))]
    pub async fn generate_tasks(
        &self,
        workflow: &mut WorkflowDefinition,
        task_id: i64,
    ) -> Result<Vec<StageTasks>, EngineError> {
        let mut working = workflow.clone();
        let mut stages = Vec::with_capacity(working.stages.len());

        for stage in &mut working.stages {
            let mut tasks = Vec::new();
            for job in &mut stage.jobs {
                if let Some(handler) = self.handler_for(job) {
                    tasks.extend(handler.to_jobs(job, workflow, task_id, &self.ctx).await?);
                }
            }
            stages.push(StageTasks {
                stage: stage.name.clone(),
                parallel: stage.parallel,
                tasks,
            });
        }

        let total: usize = stages.iter().map(|s| s.tasks.len()).sum();
        info!("generated {} tasks for workflow '{}'", total, workflow.name);

        *workflow = working;
        Ok(stages)
    }
}
