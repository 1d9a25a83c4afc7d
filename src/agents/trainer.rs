//! Episode loop shared by training and evaluation.

use tracing::debug;

use super::{Agent, AgentKind, Transition, UpdateStats};
use crate::encoder::StateEncoder;
use crate::env::{SchedulingEnv, StateMetrics};
use crate::error::{Result, SchedulingError};
use crate::models::{Machine, SchedulingSolution};

/// What happened during one episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    pub reward: f64,
    pub steps: usize,
    /// Ended by completion or horizon rather than by the step limit.
    pub terminated: bool,
    pub failed_actions: usize,
    pub metrics: StateMetrics,
    /// Last update performed during the episode.
    pub update: Option<UpdateStats>,
}

/// Runs one episode from `solution`.
///
/// In training mode actions are sampled and experience is observed; SAC
/// updates after every step and PPO once at the end. In eval mode actions
/// are greedy and the agent is left untouched.
pub fn run_episode(
    env: &mut SchedulingEnv,
    encoder: &StateEncoder,
    agent: &mut dyn Agent,
    solution: &SchedulingSolution,
    machines: &[Machine],
    seed: u64,
) -> Result<EpisodeSummary> {
    let training = agent.is_training();
    env.reset(solution, machines, 0, seed)?;
    let mut state = encoder.encode(current(env)?);
    let mut mask = env.action_mask()?;

    let mut reward = 0.0;
    let mut steps = 0;
    let mut failed_actions = 0;
    let mut update = None;
    let terminated = loop {
        let action = agent.select_action(&state, &mask, !training)?;
        let result = env.step(&action)?;
        let next_state = encoder.encode(current(env)?);
        let next_mask = env.action_mask()?;
        reward += result.reward;
        steps += 1;
        if result.info.action_failed() {
            failed_actions += 1;
        }

        if training {
            agent.observe(Transition {
                state,
                mask,
                action,
                reward: result.reward,
                next_state: next_state.clone(),
                next_mask: next_mask.clone(),
                done: result.terminated,
            })?;
            if agent.kind() == AgentKind::Sac {
                if let Some(stats) = agent.update()? {
                    update = Some(stats);
                }
            }
        }
        if result.done() {
            break result.terminated;
        }
        state = next_state;
        mask = next_mask;
    };

    if training {
        if agent.kind() == AgentKind::Ppo {
            if let Some(stats) = agent.update()? {
                update = Some(stats);
            }
        }
        agent.decay_epsilon();
        agent.end_episode(reward, steps);
    }
    let metrics = current(env)?.metrics(env.config().horizon_minutes());
    debug!(reward, steps, terminated, failed_actions, "episode finished");
    Ok(EpisodeSummary {
        reward,
        steps,
        terminated,
        failed_actions,
        metrics,
        update,
    })
}

fn current(env: &SchedulingEnv) -> Result<&crate::env::EnvState> {
    env.state()
        .ok_or_else(|| SchedulingError::EnvironmentNotReady("reset has not been called".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{create_agent, ActionDims, PpoConfig, SacConfig};
    use crate::env::EnvConfig;
    use crate::models::{default_epoch, Job, Operation, SchedulingProblem};
    use crate::scheduler::BaselineScheduler;

    fn setup() -> (SchedulingProblem, SchedulingSolution, SchedulingEnv, StateEncoder) {
        let problem = SchedulingProblem::new(default_epoch())
            .with_machine(Machine::new("M1", "CNC"))
            .with_machine(Machine::new("M2", "CNC"))
            .with_job(
                Job::new("J1")
                    .with_due(200)
                    .with_operation(Operation::new("J1_O1", "J1", 1).with_duration(30).with_machine("M1"))
                    .with_operation(Operation::new("J1_O2", "J1", 2).with_duration(30).with_machine("M2")),
            );
        let solution = BaselineScheduler::fifo().schedule(&problem);
        let config = EnvConfig::default()
            .with_capacity(4, 2)
            .with_disruption_probability(0.0)
            .with_max_steps(40);
        let encoder = StateEncoder::from_config(&config);
        (problem, solution, SchedulingEnv::new(config), encoder)
    }

    #[test]
    fn test_ppo_episode_updates_and_clears() {
        let (problem, solution, mut env, encoder) = setup();
        let ppo = PpoConfig::default().with_hidden_dim(16).with_batch_size(8);
        let mut agent = create_agent(
            AgentKind::Ppo,
            encoder.dim(),
            ActionDims::new(4, 2),
            &ppo,
            &SacConfig::default(),
            5,
        )
        .unwrap();
        let eps = agent.epsilon();
        let summary = run_episode(&mut env, &encoder, agent.as_mut(), &solution, &problem.machines, 1).unwrap();
        assert!(summary.steps > 0 && summary.steps <= 40);
        let stats = summary.update.unwrap();
        assert_eq!(stats.samples, summary.steps);
        assert!(agent.epsilon() < eps);
    }

    #[test]
    fn test_eval_episode_leaves_agent_untouched() {
        let (problem, solution, mut env, encoder) = setup();
        let sac = SacConfig::default().with_hidden_dim(16);
        let mut agent = create_agent(
            AgentKind::Sac,
            encoder.dim(),
            ActionDims::new(4, 2),
            &PpoConfig::default(),
            &sac,
            5,
        )
        .unwrap();
        agent.set_training(false);
        let eps = agent.epsilon();
        let a = run_episode(&mut env, &encoder, agent.as_mut(), &solution, &problem.machines, 1).unwrap();
        let b = run_episode(&mut env, &encoder, agent.as_mut(), &solution, &problem.machines, 1).unwrap();
        assert!(a.update.is_none());
        assert!((agent.epsilon() - eps).abs() < 1e-12);
        assert_eq!(a.steps, b.steps);
        assert!((a.reward - b.reward).abs() < 1e-9);
    }
}
