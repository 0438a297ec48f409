//! Job ranks: the execution order used by ordering checks.
//!
//! Rules:
//! 1. Stages run in order; every stage boundary advances the rank.
//! 2. Jobs of a sequential stage each take the next rank.
//! 3. Jobs of a parallel stage share one rank.

use std::collections::HashMap;

use crate::models::Stage;

/// Map every job name to its rank.
///
/// A job name that appears twice keeps the rank of its last occurrence.
pub fn job_rank_map(stages: &[Stage]) -> HashMap<&str, usize> {
    let mut ranks = HashMap::new();
    let mut index = 0usize;

    for stage in stages {
        for job in &stage.jobs {
            if !stage.parallel {
                index += 1;
            }
            ranks.insert(job.name.as_str(), index);
        }
        index += 1;
    }

    ranks
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Job, JobType};
    use serde_json::Value;

    fn stage(name: &str, parallel: bool, jobs: &[&str]) -> Stage {
        Stage {
            name: name.into(),
            parallel,
            jobs: jobs
                .iter()
                .map(|j| Job::new(*j, JobType::Other("mock".into()), Value::Null))
                .collect(),
        }
    }

    #[test]
    fn sequential_stages_rank_in_flattened_order() {
        let stages = vec![stage("s1", false, &["a", "b"]), stage("s2", false, &["c"])];
        let ranks = job_rank_map(&stages);

        assert!(ranks["a"] < ranks["b"]);
        assert!(ranks["b"] < ranks["c"]);
    }

    #[test]
    fn parallel_stage_jobs_share_a_rank() {
        let stages = vec![
            stage("s1", true, &["a", "b"]),
            stage("s2", true, &["c"]),
        ];
        let ranks = job_rank_map(&stages);

        assert_eq!(ranks["a"], ranks["b"]);
        assert!(ranks["b"] < ranks["c"]);
    }

    #[test]
    fn empty_workflow_has_no_ranks() {
        assert!(job_rank_map(&[]).is_empty());
    }
}
