//! Canary deployment: roll a percentage of a Deployment's replicas onto a new
//! image, addressed through the Kubernetes Service in front of it.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use cluster::{ClusterHandle, Deployment};
use tracing::{debug, error, info, instrument};

use crate::error::{LintFailure, ResolutionFailure};
use crate::lifecycle::{JobLifecycle, LifecycleContext};
use crate::models::{Job, JobTask, JobTaskSpec, JobType, WorkflowDefinition};
use crate::naming::{task_display_name, task_key, task_name, JOB_NAME_KEY};
use crate::rank::job_rank_map;
use crate::specs::{
    CanaryDeployJobSpec, CanaryReleaseJobSpec, CanaryTarget, JobTaskCanaryDeploySpec,
    MAX_CANARY_PERCENTAGE, WORKLOAD_TYPE_DEPLOYMENT,
};
use crate::EngineError;

/// `JobInfo` key holding the target's service name.
const SERVICE_NAME_KEY: &str = "k8s_service_name";

/// Lifecycle of `k8s-canary-deploy` jobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanaryDeployJob;

// ---------------------------------------------------------------------------
// Algorithms
// ---------------------------------------------------------------------------

/// Canary replicas for `percentage` of `replicas`, rounded up.
///
/// Any non-zero percentage of a non-empty deployment yields at least one.
pub fn canary_replica(replicas: i32, percentage: u32) -> i32 {
    let scaled = i64::from(replicas.max(0)) * i64::from(percentage);
    let ceiled = (scaled + 99) / 100;
    i32::try_from(ceiled).unwrap_or(i32::MAX)
}

/// Keep, in `latest` order, the `current` targets whose identity still exists
/// in `latest`. Survivors keep the user's field values.
pub fn merge_targets(current: &[CanaryTarget], latest: &[CanaryTarget]) -> Vec<CanaryTarget> {
    let user_configured: HashMap<_, _> = current.iter().map(|t| (t.identity(), t)).collect();

    latest
        .iter()
        .filter_map(|t| user_configured.get(&t.identity()).map(|&user| user.clone()))
        .collect()
}

/// Three-way merge of `current` with the latest stored spec.
///
/// A cluster change clears namespace and selection, a namespace change clears
/// the selection. The registry is always taken from `latest`.
pub fn reconcile(current: &mut CanaryDeployJobSpec, latest: &CanaryDeployJobSpec) {
    if current.cluster_id != latest.cluster_id {
        current.cluster_id = latest.cluster_id.clone();
        current.namespace.clear();
        current.targets.clear();
    } else if current.namespace != latest.namespace {
        current.namespace = latest.namespace.clone();
        current.targets.clear();
    }

    current.docker_registry_id = latest.docker_registry_id.clone();
    current.targets = merge_targets(&current.targets, &latest.targets);
}

fn check_percentage(job: &Job, target: &CanaryTarget) -> Result<(), EngineError> {
    if target.canary_percentage > MAX_CANARY_PERCENTAGE {
        return Err(EngineError::Validation {
            job: job.name.clone(),
            failure: LintFailure::PercentageOutOfRange {
                service: target.k8s_service_name.clone(),
                percentage: target.canary_percentage,
            },
        });
    }
    Ok(())
}

/// Find the single Deployment behind `service_name`.
async fn resolve_deployment(
    cluster: &dyn ClusterHandle,
    namespace: &str,
    service_name: &str,
) -> Result<Deployment, ResolutionFailure> {
    let service = cluster
        .get_service(namespace, service_name)
        .await
        .map_err(ResolutionFailure::ServiceLookup)?
        .ok_or(ResolutionFailure::ServiceNotFound)?;

    if service.is_headless() {
        return Err(ResolutionFailure::HeadlessService);
    }

    let mut deployments = cluster
        .list_deployments(namespace, &service.label_selector())
        .await
        .map_err(ResolutionFailure::DeploymentLookup)?;

    match deployments.len() {
        0 => Err(ResolutionFailure::NoDeployment),
        1 => Ok(deployments.remove(0)),
        n => Err(ResolutionFailure::MultipleDeployments(n)),
    }
}

/// The canary-deploy spec of this job as stored in the persisted workflow.
async fn stored_spec(
    job: &Job,
    workflow: &WorkflowDefinition,
    ctx: &LifecycleContext,
) -> Result<CanaryDeployJobSpec, EngineError> {
    let stored = ctx
        .store
        .find(&workflow.name)
        .await
        .map_err(|source| {
            error!("Failed to find workflow '{}': {}", workflow.name, source);
            EngineError::WorkflowNotFound {
                workflow: workflow.name.clone(),
                source,
            }
        })?;

    let stored_job = stored
        .find_job(&job.name, &job.job_type)
        .ok_or_else(|| EngineError::JobNotFound {
            workflow: workflow.name.clone(),
            job: job.name.clone(),
            job_type: job.job_type.clone(),
        })?;

    stored_job.decode_spec()
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[async_trait]
impl JobLifecycle for CanaryDeployJob {
    fn job_type(&self) -> JobType {
        JobType::CanaryDeploy
    }

    fn instantiate(&self, job: &mut Job) -> Result<(), EngineError> {
        let spec: CanaryDeployJobSpec = job.decode_authored_spec()?;
        job.store_spec(&spec)
    }

    fn set_preset(&self, job: &mut Job) -> Result<(), EngineError> {
        let spec: CanaryDeployJobSpec = job.decode_spec()?;
        job.store_spec(&spec)
    }

    #[instrument(skip_all, fields(workflow = %workflow.name, job = %job.name))]
    async fn set_options(
        &self,
        job: &mut Job,
        workflow: &WorkflowDefinition,
        ctx: &LifecycleContext,
    ) -> Result<(), EngineError> {
        let mut spec: CanaryDeployJobSpec = job.decode_spec()?;
        let original = stored_spec(job, workflow, ctx).await?;

        spec.target_options = original.targets;
        debug!("{} target options loaded", spec.target_options.len());
        job.store_spec(&spec)
    }

    fn clear_options(&self, job: &mut Job) -> Result<(), EngineError> {
        let mut spec: CanaryDeployJobSpec = job.decode_spec()?;
        spec.target_options = Vec::new();
        job.store_spec(&spec)
    }

    fn clear_selection_field(&self, job: &mut Job) -> Result<(), EngineError> {
        let mut spec: CanaryDeployJobSpec = job.decode_spec()?;
        spec.targets = Vec::new();
        job.store_spec(&spec)
    }

    #[instrument(skip_all, fields(workflow = %workflow.name, job = %job.name))]
    async fn update_with_latest_setting(
        &self,
        job: &mut Job,
        workflow: &WorkflowDefinition,
        ctx: &LifecycleContext,
    ) -> Result<(), EngineError> {
        let mut spec: CanaryDeployJobSpec = job.decode_spec()?;
        let latest = stored_spec(job, workflow, ctx).await?;

        let before = spec.targets.len();
        reconcile(&mut spec, &latest);
        if spec.targets.len() != before {
            info!(
                "job '{}': {} of {} selected targets kept after reconciliation",
                job.name,
                spec.targets.len(),
                before
            );
        }

        job.store_spec(&spec)
    }

    fn merge_args(&self, job: &mut Job, args: &Job) -> Result<(), EngineError> {
        if !job.same_identity(args) {
            return Ok(());
        }

        let mut spec: CanaryDeployJobSpec = job.decode_spec()?;
        let args_spec: CanaryDeployJobSpec = args.decode_spec()?;
        spec.targets = args_spec.targets;
        job.store_spec(&spec)
    }

    #[instrument(skip_all, fields(workflow = %workflow.name, job = %job.name, task_id = task_id))]
    async fn to_jobs(
        &self,
        job: &mut Job,
        workflow: &WorkflowDefinition,
        task_id: i64,
        ctx: &LifecycleContext,
    ) -> Result<Vec<JobTask>, EngineError> {
        let mut spec: CanaryDeployJobSpec = job.decode_spec()?;

        let cluster = ctx.clusters.resolve(&spec.cluster_id).await.map_err(|source| {
            error!("Failed to get kube client for cluster '{}': {}", spec.cluster_id, source);
            EngineError::ClusterUnavailable {
                job: job.name.clone(),
                cluster_id: spec.cluster_id.clone(),
                source,
            }
        })?;

        let mut tasks = Vec::with_capacity(spec.targets.len());

        for (sub_task, target) in spec.targets.iter_mut().enumerate() {
            check_percentage(job, target)?;

            let deployment =
                resolve_deployment(&*cluster, &spec.namespace, &target.k8s_service_name)
                    .await
                    .map_err(|failure| {
                        error!(
                            "job '{}': service '{}' in {}/{}: {}",
                            job.name, target.k8s_service_name, spec.cluster_id, spec.namespace, failure
                        );
                        EngineError::Resolution {
                            job: job.name.clone(),
                            cluster_id: spec.cluster_id.clone(),
                            service: target.k8s_service_name.clone(),
                            failure,
                        }
                    })?;

            target.workload_name = deployment.name.clone();
            target.workload_type = WORKLOAD_TYPE_DEPLOYMENT.to_owned();
            let replica = canary_replica(deployment.desired_replicas(), target.canary_percentage);

            let service = target.k8s_service_name.as_str();
            let task = JobTask {
                name: task_name(workflow, &job.name, sub_task),
                key: task_key(&job.name, &[service]),
                display_name: task_display_name(&job.name, &[service]),
                origin_name: job.name.clone(),
                job_info: BTreeMap::from([
                    (JOB_NAME_KEY.to_owned(), job.name.clone()),
                    (SERVICE_NAME_KEY.to_owned(), service.to_owned()),
                ]),
                job_type: JobType::CanaryDeploy,
                spec: JobTaskSpec::CanaryDeploy(JobTaskCanaryDeploySpec {
                    namespace: spec.namespace.clone(),
                    cluster_id: spec.cluster_id.clone(),
                    docker_registry_id: spec.docker_registry_id.clone(),
                    deploy_timeout: target.deploy_timeout,
                    k8s_service_name: target.k8s_service_name.clone(),
                    workload_type: WORKLOAD_TYPE_DEPLOYMENT.to_owned(),
                    workload_name: deployment.name,
                    container_name: target.container_name.clone(),
                    canary_percentage: target.canary_percentage,
                    canary_replica: replica,
                    image: target.image.clone(),
                }),
                error_policy: job.error_policy.clone(),
            };

            debug!(
                "task {}: generated '{}' ({} canary replicas)",
                task_id, task.name, replica
            );
            tasks.push(task);
        }

        job.store_spec(&spec)?;
        Ok(tasks)
    }

    fn lint_job(
        &self,
        job: &Job,
        workflow: &WorkflowDefinition,
        ctx: &LifecycleContext,
    ) -> Result<(), EngineError> {
        ctx.license
            .check_professional_license()
            .map_err(|source| EngineError::LicenseInvalid {
                job: job.name.clone(),
                source,
            })?;

        let spec: CanaryDeployJobSpec = job.decode_authored_spec()?;
        for target in &spec.targets {
            check_percentage(job, target)?;
        }

        let mut quoting = Vec::new();
        for candidate in workflow.jobs() {
            if candidate.job_type != JobType::CanaryRelease {
                continue;
            }
            let release: CanaryReleaseJobSpec = candidate.decode_authored_spec()?;
            if release.from_job == job.name {
                quoting.push(candidate.name.clone());
            }
        }

        let validation = |failure| EngineError::Validation {
            job: job.name.clone(),
            failure,
        };

        let release = match quoting.as_slice() {
            [] => return Err(validation(LintFailure::NoQuotingRelease)),
            [release] => release,
            _ => return Err(validation(LintFailure::MultipleQuotingReleases(quoting.clone()))),
        };

        let ranks = job_rank_map(&workflow.stages);
        let deploy_rank = ranks.get(job.name.as_str()).copied().unwrap_or(0);
        let release_rank = ranks.get(release.as_str()).copied().unwrap_or(0);
        if deploy_rank >= release_rank {
            return Err(validation(LintFailure::ReleaseNotAfterDeploy {
                release: release.clone(),
            }));
        }

        Ok(())
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target(workload: &str, container: &str, percentage: u32) -> CanaryTarget {
        CanaryTarget {
            k8s_service_name: format!("{workload}-svc"),
            workload_type: WORKLOAD_TYPE_DEPLOYMENT.into(),
            workload_name: workload.into(),
            container_name: container.into(),
            image: format!("registry.local/{workload}:v2"),
            canary_percentage: percentage,
            deploy_timeout: 600,
        }
    }

    fn spec(cluster: &str, namespace: &str, targets: Vec<CanaryTarget>) -> CanaryDeployJobSpec {
        CanaryDeployJobSpec {
            cluster_id: cluster.into(),
            namespace: namespace.into(),
            docker_registry_id: "reg-1".into(),
            targets,
            target_options: Vec::new(),
        }
    }

    fn job_with(spec: &CanaryDeployJobSpec) -> Job {
        Job::new(
            "d1",
            JobType::CanaryDeploy,
            serde_json::to_value(spec).unwrap(),
        )
    }

    #[test]
    fn canary_replica_rounds_up() {
        assert_eq!(canary_replica(3, 34), 2);
        assert_eq!(canary_replica(10, 10), 1);
        assert_eq!(canary_replica(0, 100), 0);
        assert_eq!(canary_replica(4, 50), 2);
        assert_eq!(canary_replica(7, 1), 1);
        assert_eq!(canary_replica(5, 0), 0);
    }

    #[test]
    fn merge_keeps_intersection_in_latest_order_with_user_values() {
        let current = vec![target("a", "app", 10), target("b", "app", 20), target("c", "app", 30)];
        let latest = vec![target("c", "app", 99), target("x", "app", 99), target("a", "app", 99)];

        let merged = merge_targets(&current, &latest);

        assert_eq!(merged, vec![target("c", "app", 30), target("a", "app", 10)]);
    }

    #[test]
    fn merge_distinguishes_containers_of_one_workload() {
        let current = vec![target("a", "app", 10)];
        let latest = vec![target("a", "sidecar", 50)];
        assert!(merge_targets(&current, &latest).is_empty());
    }

    #[test]
    fn cluster_change_resets_namespace_and_selection() {
        let mut current = spec("c1", "shop", vec![target("a", "app", 10)]);
        let latest = spec("c2", "shop", vec![target("a", "app", 50)]);

        reconcile(&mut current, &latest);

        assert_eq!(current.cluster_id, "c2");
        assert_eq!(current.namespace, "");
        assert!(current.targets.is_empty());
    }

    #[test]
    fn namespace_change_resets_selection() {
        let mut current = spec("c1", "shop", vec![target("a", "app", 10)]);
        let latest = spec("c1", "shop-v2", vec![target("a", "app", 50)]);

        reconcile(&mut current, &latest);

        assert_eq!(current.namespace, "shop-v2");
        assert!(current.targets.is_empty());
    }

    #[test]
    fn registry_is_always_adopted() {
        let mut current = spec("c1", "shop", vec![target("a", "app", 10)]);
        let mut latest = spec("c1", "shop", vec![target("a", "app", 50)]);
        latest.docker_registry_id = "reg-2".into();

        reconcile(&mut current, &latest);

        assert_eq!(current.docker_registry_id, "reg-2");
        assert_eq!(current.targets, vec![target("a", "app", 10)]);
    }

    #[test]
    fn instantiate_accepts_yaml_text() {
        let mut job = Job::new(
            "d1",
            JobType::CanaryDeploy,
            json!("cluster_id: c1\nnamespace: shop\ntargets:\n  - k8s_service_name: web\n    canary_percentage: 25\n"),
        );

        CanaryDeployJob.instantiate(&mut job).unwrap();

        let spec: CanaryDeployJobSpec = job.decode_spec().unwrap();
        assert_eq!(spec.cluster_id, "c1");
        assert_eq!(spec.targets[0].canary_percentage, 25);
    }

    #[test]
    fn set_preset_rejects_malformed_spec() {
        let mut job = Job::new("d1", JobType::CanaryDeploy, json!({ "targets": 7 }));
        assert!(matches!(
            CanaryDeployJob.set_preset(&mut job),
            Err(EngineError::Parse { .. })
        ));
    }

    #[test]
    fn clear_options_and_selection() {
        let mut s = spec("c1", "shop", vec![target("a", "app", 10)]);
        s.target_options = vec![target("b", "app", 0)];
        let mut job = job_with(&s);

        CanaryDeployJob.clear_options(&mut job).unwrap();
        CanaryDeployJob.clear_options(&mut job).unwrap();
        let cleared: CanaryDeployJobSpec = job.decode_spec().unwrap();
        assert!(cleared.target_options.is_empty());
        assert_eq!(cleared.targets.len(), 1);

        CanaryDeployJob.clear_selection_field(&mut job).unwrap();
        let cleared: CanaryDeployJobSpec = job.decode_spec().unwrap();
        assert!(cleared.targets.is_empty());
        assert_eq!(cleared.cluster_id, "c1");
    }

    #[test]
    fn merge_args_overlays_targets_of_same_job_only() {
        let mut job = job_with(&spec("c1", "shop", vec![target("a", "app", 10)]));
        let override_spec = spec("other", "other", vec![target("b", "app", 40)]);

        let mut stranger = job_with(&override_spec);
        stranger.name = "d2".into();
        CanaryDeployJob.merge_args(&mut job, &stranger).unwrap();
        let unchanged: CanaryDeployJobSpec = job.decode_spec().unwrap();
        assert_eq!(unchanged.targets, vec![target("a", "app", 10)]);

        CanaryDeployJob
            .merge_args(&mut job, &job_with(&override_spec))
            .unwrap();
        let merged: CanaryDeployJobSpec = job.decode_spec().unwrap();
        assert_eq!(merged.targets, vec![target("b", "app", 40)]);
        assert_eq!(merged.cluster_id, "c1");
        assert_eq!(merged.namespace, "shop");
    }
}
