//! Built-in ordering rules.

use super::{DispatchingRule, RuleScore, SchedulingContext};
use crate::models::Job;

/// First In First Out.
///
/// Submission order; a job the context does not know is ranked by its
/// release time.
#[derive(Debug, Clone, Copy)]
pub struct Fifo;

impl DispatchingRule for Fifo {
    fn name(&self) -> &'static str {
        "FIFO"
    }

    fn evaluate(&self, job: &Job, context: &SchedulingContext) -> RuleScore {
        context
            .position(&job.id)
            .map_or(job.release_minutes as f64, |p| p as f64)
    }
}

/// Earliest Due Date.
///
/// # Reference
/// Jackson (1955), optimal for maximum lateness on a single machine.
#[derive(Debug, Clone, Copy)]
pub struct Edd;

impl DispatchingRule for Edd {
    fn name(&self) -> &'static str {
        "EDD"
    }

    fn evaluate(&self, job: &Job, _: &SchedulingContext) -> RuleScore {
        job.due_minutes as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_position_and_fallback() {
        let jobs = vec![Job::new("B").with_release(50), Job::new("A")];
        let ctx = SchedulingContext::for_jobs(&jobs);
        assert!((Fifo.evaluate(&jobs[0], &ctx) - 0.0).abs() < 1e-10);
        assert!((Fifo.evaluate(&jobs[1], &ctx) - 1.0).abs() < 1e-10);

        let stranger = Job::new("C").with_release(70);
        assert!((Fifo.evaluate(&stranger, &ctx) - 70.0).abs() < 1e-10);
    }

    #[test]
    fn test_edd_scores_due_time() {
        let j = Job::new("A").with_due(300);
        assert!((Edd.evaluate(&j, &SchedulingContext::default()) - 300.0).abs() < 1e-10);
    }
}
