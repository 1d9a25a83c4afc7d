use std::cmp::Ordering;

use super::{DispatchingRule, SchedulingContext};
use crate::models::Job;

/// Order applied when every rule ties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TieBreaker {
    /// Keep the submitted order.
    #[default]
    InputOrder,
    /// Lexicographic job id.
    ById,
}

/// Lexicographic chain of rules.
///
/// Each job is scored once per rule; jobs are then compared rule by rule
/// and the first difference decides.
#[derive(Debug, Default)]
pub struct RuleEngine {
    rules: Vec<Box<dyn DispatchingRule>>,
    tie_breaker: TieBreaker,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the primary rule.
    pub fn with_rule<R: DispatchingRule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Appends a rule consulted only on ties of the earlier ones.
    pub fn then_by<R: DispatchingRule + 'static>(self, rule: R) -> Self {
        self.with_rule(rule)
    }

    pub fn with_final_tie_breaker(mut self, tie_breaker: TieBreaker) -> Self {
        self.tie_breaker = tie_breaker;
        self
    }

    /// Indices into `jobs`, first-scheduled first.
    pub fn sort_indices(&self, jobs: &[Job], context: &SchedulingContext) -> Vec<usize> {
        let scores: Vec<Vec<f64>> = jobs
            .iter()
            .map(|job| self.rules.iter().map(|r| r.evaluate(job, context)).collect())
            .collect();

        let mut indices: Vec<usize> = (0..jobs.len()).collect();
        indices.sort_by(|&a, &b| {
            scores[a]
                .iter()
                .zip(&scores[b])
                .map(|(x, y)| x.total_cmp(y))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
                .then_with(|| match self.tie_breaker {
                    TieBreaker::InputOrder => Ordering::Equal,
                    TieBreaker::ById => jobs[a].id.cmp(&jobs[b].id),
                })
        });
        indices
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatching::rules;

    #[test]
    fn test_edd_ordering() {
        let jobs = vec![
            Job::new("late").with_due(500),
            Job::new("early").with_due(100),
            Job::new("middle").with_due(300),
        ];
        let ctx = SchedulingContext::for_jobs(&jobs);
        let engine = RuleEngine::new().with_rule(rules::Edd);
        assert_eq!(engine.sort_indices(&jobs, &ctx), vec![1, 2, 0]);
    }

    #[test]
    fn test_second_rule_breaks_ties() {
        let jobs = vec![
            Job::new("A").with_due(100),
            Job::new("B").with_due(50),
            Job::new("C").with_due(100),
        ];
        let ctx = SchedulingContext::for_jobs(&jobs);
        let engine = RuleEngine::new().with_rule(rules::Edd).then_by(rules::Fifo);
        assert_eq!(engine.sort_indices(&jobs, &ctx), vec![1, 0, 2]);
        assert_eq!(engine.rule_names(), vec!["EDD", "FIFO"]);
    }

    #[test]
    fn test_final_tie_breaker() {
        let jobs = vec![Job::new("B").with_due(100), Job::new("A").with_due(100)];
        let ctx = SchedulingContext::default();
        let stable = RuleEngine::new().with_rule(rules::Edd);
        assert_eq!(stable.sort_indices(&jobs, &ctx), vec![0, 1]);

        let by_id = RuleEngine::new()
            .with_rule(rules::Edd)
            .with_final_tie_breaker(TieBreaker::ById);
        assert_eq!(by_id.sort_indices(&jobs, &ctx), vec![1, 0]);
    }

    #[test]
    fn test_empty_jobs() {
        let engine = RuleEngine::new().with_rule(rules::Fifo);
        assert!(engine.sort_indices(&[], &SchedulingContext::default()).is_empty());
    }
}
