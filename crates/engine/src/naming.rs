//! Deterministic names for generated tasks.
//!
//! The same job, target and sub-task index always produce the same names, so
//! re-runs of a trigger can be correlated.

use crate::models::WorkflowDefinition;

/// `JobInfo` key holding the originating job name.
pub const JOB_NAME_KEY: &str = "job_name";

/// `job-{stage}-{job}-{sub_task}-{job_name}`.
///
/// A job missing from `workflow` is placed at stage 0, job 0.
pub fn task_name(workflow: &WorkflowDefinition, job_name: &str, sub_task: usize) -> String {
    let (stage_index, job_index) = workflow.locate_job(job_name).unwrap_or((0, 0));
    format!("job-{stage_index}-{job_index}-{sub_task}-{job_name}")
}

/// `{job_name}.{part}.{part}…`
pub fn task_key(job_name: &str, parts: &[&str]) -> String {
    std::iter::once(job_name)
        .chain(parts.iter().copied())
        .collect::<Vec<_>>()
        .join(".")
}

/// `{job_name}-{part}-{part}…`
pub fn task_display_name(job_name: &str, parts: &[&str]) -> String {
    std::iter::once(job_name)
        .chain(parts.iter().copied())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Job, JobType, Stage};
    use serde_json::Value;

    #[test]
    fn names_encode_position_and_target() {
        let workflow = WorkflowDefinition {
            name: "wf".into(),
            stages: vec![
                Stage {
                    name: "build".into(),
                    parallel: false,
                    jobs: vec![Job::new("b", JobType::Other("build".into()), Value::Null)],
                },
                Stage {
                    name: "canary".into(),
                    parallel: false,
                    jobs: vec![
                        Job::new("x", JobType::Other("build".into()), Value::Null),
                        Job::new("d1", JobType::CanaryDeploy, Value::Null),
                    ],
                },
            ],
        };

        assert_eq!(task_name(&workflow, "d1", 3), "job-1-1-3-d1");
        assert_eq!(task_key("d1", &["svc-a"]), "d1.svc-a");
        assert_eq!(task_display_name("d1", &["svc-a"]), "d1-svc-a");
    }
}
