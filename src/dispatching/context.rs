use std::collections::HashMap;

use crate::models::Job;

/// What the rules may know about the job list beyond the job itself.
#[derive(Debug, Clone, Default)]
pub struct SchedulingContext {
    /// Position of each job in the submitted list.
    pub creation_order: HashMap<String, usize>,
}

impl SchedulingContext {
    /// Records the submission order of `jobs`.
    pub fn for_jobs(jobs: &[Job]) -> Self {
        Self {
            creation_order: jobs
                .iter()
                .enumerate()
                .map(|(i, j)| (j.id.clone(), i))
                .collect(),
        }
    }

    pub fn position(&self, job_id: &str) -> Option<usize> {
        self.creation_order.get(job_id).copied()
    }
}
