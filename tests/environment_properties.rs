//! Simulator clock, reward shaping and disruption recovery.

use hybrid_schedule::env::{
    Action, ActionType, Disruption, EnvConfig, MachineStatus, OpStatus, SchedulingEnv,
};
use hybrid_schedule::models::{default_epoch, Job, Machine, Operation, SchedulingProblem};
use hybrid_schedule::reward::{RewardCalculator, RewardConfig, RewardStrategy};
use hybrid_schedule::scheduler::BaselineScheduler;

fn op(id: &str, job: &str, seq: i32, minutes: i64, machine: &str) -> Operation {
    Operation::new(id, job, seq).with_duration(minutes).with_machine(machine)
}

fn two_jobs() -> SchedulingProblem {
    SchedulingProblem::new(default_epoch())
        .with_machine(Machine::new("M1", "CNC"))
        .with_machine(Machine::new("M2", "CNC"))
        .with_job(
            Job::new("J1")
                .with_due(60)
                .with_operation(op("J1_O1", "J1", 1, 30, "M1"))
                .with_operation(op("J1_O2", "J1", 2, 45, "M2")),
        )
        .with_job(
            Job::new("J2")
                .with_due(200)
                .with_operation(op("J2_O1", "J2", 1, 50, "M1")),
        )
}

fn env_for(problem: &SchedulingProblem, config: EnvConfig) -> SchedulingEnv {
    let solution = BaselineScheduler::fifo().schedule(problem);
    let mut env = SchedulingEnv::new(config.with_disruption_probability(0.0).with_capacity(6, 3));
    env.reset(&solution, &problem.machines, 0, 7).unwrap();
    env
}

#[test]
fn test_noop_advances_clock_without_early_completion() {
    let problem = two_jobs();
    let mut env = env_for(&problem, EnvConfig::default());
    for n in 1..=5 {
        env.step(&Action::noop()).unwrap();
        let s = env.state().unwrap();
        assert_eq!(s.clock, 15 * n);
        for o in s.operations.iter().filter(|o| o.status == OpStatus::Completed) {
            let end = o.actual_end.unwrap();
            assert!(end <= s.clock);
            assert!(end >= o.actual_start.unwrap() + o.duration);
        }
    }
}

#[test]
fn test_shaping_telescopes_to_dense_return() {
    let problem = two_jobs();
    let shaped = RewardConfig::default()
        .with_strategy(RewardStrategy::Shaped)
        .with_gamma(1.0);
    let dense = RewardConfig::default().with_strategy(RewardStrategy::Dense);
    let mut shaped_env = env_for(&problem, EnvConfig::default().with_reward(shaped.clone()));
    let mut dense_env = env_for(&problem, EnvConfig::default().with_reward(dense));

    let horizon = shaped_env.config().horizon_minutes();
    let initial = shaped_env.state().unwrap().metrics(horizon);
    let phi0 = RewardCalculator::new(shaped).potential(&initial);

    let mut shaped_sum = 0.0;
    let mut dense_sum = 0.0;
    loop {
        let a = shaped_env.step(&Action::noop()).unwrap();
        let b = dense_env.step(&Action::noop()).unwrap();
        shaped_sum += a.reward;
        dense_sum += b.reward;
        assert_eq!(a.terminated, b.terminated);
        if a.done() {
            assert!(a.terminated);
            break;
        }
    }
    assert!((shaped_sum - (dense_sum - phi0)).abs() < 1e-9);
}

#[test]
fn test_breakdown_reassign_and_recovery() {
    let problem = SchedulingProblem::new(default_epoch())
        .with_machine(Machine::new("M1", "CNC"))
        .with_machine(Machine::new("M2", "CNC"))
        .with_machine(Machine::new("M3", "CNC"))
        .with_job(
            Job::new("J1")
                .with_due(120)
                .with_operation(op("O1", "J1", 1, 30, "M1"))
                .with_operation(op("O2", "J1", 2, 30, "M2")),
        );
    let mut env = env_for(&problem, EnvConfig::default());

    env.step(&Action::noop()).unwrap();
    let o1 = env.state().unwrap().op_index("O1").unwrap();
    assert!(env
        .inject_disruption(Disruption::machine_breakdown(0, 15, 30))
        .unwrap());
    assert_eq!(env.state().unwrap().operations[o1].status, OpStatus::Delayed);

    let r = env.step(&Action::new(ActionType::Reassign, o1, 2)).unwrap();
    assert!(!r.info.action_failed());
    let s = env.state().unwrap();
    assert_eq!(s.clock, 30);
    assert_eq!(s.operations[o1].machine, 2);
    assert_eq!(s.machines[0].status, MachineStatus::Breakdown);

    env.step(&Action::noop()).unwrap();
    let s = env.state().unwrap();
    assert_eq!(s.clock, 45);
    assert_eq!(s.machines[0].status, MachineStatus::Available);
    assert_eq!(s.machines[0].breakdown_until, None);
    assert_eq!(s.operations[o1].status, OpStatus::InProgress);
    assert_eq!(s.machines[2].current_op, Some(o1));
}

#[test]
fn test_reassign_to_broken_machine_rejected() {
    let problem = two_jobs();
    let mut env = env_for(&problem, EnvConfig::default());
    env.inject_disruption(Disruption::machine_breakdown(1, 0, 60))
        .unwrap();
    let o3 = env.state().unwrap().op_index("J2_O1").unwrap();
    let r = env.step(&Action::new(ActionType::Reassign, o3, 1)).unwrap();
    assert!(r.info.action_failed());
    assert_eq!(env.state().unwrap().operations[o3].machine, 0);
}
