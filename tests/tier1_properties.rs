//! End-to-end checks of the constraint scheduler.

use std::collections::HashMap;

use hybrid_schedule::models::{
    default_epoch, Job, Machine, Operation, SchedulingConfig, SchedulingProblem, SchedulingSolution,
    WorkingHourSlot,
};
use hybrid_schedule::scheduler::{BaselineScheduler, ConstraintScheduler, Improvement};

fn op(id: &str, job: &str, seq: i32, minutes: i64, machine: &str) -> Operation {
    Operation::new(id, job, seq).with_duration(minutes).with_machine(machine)
}

fn shop() -> SchedulingProblem {
    SchedulingProblem::new(default_epoch())
        .with_machine(Machine::new("M1", "CNC").with_slot(WorkingHourSlot::from_hours(6, 22)))
        .with_machine(Machine::new("M2", "LATHE").with_slot(WorkingHourSlot::from_hours(6, 22)))
        .with_machine(Machine::new("M3", "PAINT"))
        .with_job(
            Job::new("J1")
                .with_due(900)
                .with_operation(op("J1_O1", "J1", 1, 40, "M1"))
                .with_operation(op("J1_O2", "J1", 2, 30, "M2").with_setup(10))
                .with_operation(op("J1_O3", "J1", 3, 20, "M3")),
        )
        .with_job(
            Job::new("J2")
                .with_due(800)
                .with_release(400)
                .with_operation(op("J2_O1", "J2", 1, 50, "M2"))
                .with_operation(op("J2_O2", "J2", 2, 25, "M1"))
                .with_operation(op("J2_O3", "J2", 3, 15, "M3")),
        )
        .with_job(
            Job::new("J3")
                .with_due(1000)
                .with_priority(3)
                .with_operation(op("J3_O1", "J3", 1, 35, "M1"))
                .with_operation(op("J3_O2", "J3", 2, 45, "M3")),
        )
}

fn config() -> SchedulingConfig {
    SchedulingConfig::default()
        .with_min_gap(5)
        .with_time_limit(30.0)
}

fn solve(problem: &SchedulingProblem, config: &SchedulingConfig) -> SchedulingSolution {
    ConstraintScheduler::new(config.clone()).solve(problem)
}

#[test]
fn test_schedule_within_horizon() {
    let problem = shop();
    let config = config();
    let solution = solve(&problem, &config);
    assert!(solution.status.has_schedule(), "status {:?}", solution.status);
    assert_eq!(solution.operations.len(), problem.operation_count());

    let horizon = config.horizon_for(&problem);
    for op in &solution.operations {
        assert!(op.start >= 0);
        assert_eq!(op.end, op.start + op.duration);
        assert!(op.end <= horizon);
    }
}

#[test]
fn test_precedence_with_gap() {
    let problem = shop();
    let config = config();
    let solution = solve(&problem, &config);
    for job in &problem.jobs {
        let ops = solution.operations_for_job(&job.id);
        for pair in ops.windows(2) {
            assert!(
                pair[1].start >= pair[0].end + config.min_gap_minutes,
                "{} starts before {} ends",
                pair[1].operation_id,
                pair[0].operation_id
            );
        }
        assert!(ops[0].start >= job.release_minutes);
    }
}

#[test]
fn test_no_overlap_per_machine() {
    let problem = shop();
    let solution = solve(&problem, &config());
    for machine in &problem.machines {
        let ops = solution.operations_on_machine(&machine.id);
        for pair in ops.windows(2) {
            assert!(pair[0].end <= pair[1].start, "overlap on {}", machine.id);
        }
    }
}

#[test]
fn test_operations_inside_working_hours() {
    let problem = shop();
    let config = config();
    let solution = solve(&problem, &config);
    let horizon = config.horizon_for(&problem);
    let windows: HashMap<String, _> = problem
        .machines
        .iter()
        .map(|m| (m.id.clone(), m.working_windows(problem.planning_start, horizon, &problem.calendars)))
        .collect();
    for op in &solution.operations {
        let fits = windows[&op.machine_id]
            .iter()
            .any(|w| w.fits(op.start, op.duration));
        assert!(fits, "{} outside working hours", op.operation_id);
    }
}

#[test]
fn test_resolve_is_deterministic() {
    let problem = shop();
    let config = config();
    let a = solve(&problem, &config);
    let b = solve(&problem, &config);
    assert_eq!(a.makespan, b.makespan);
    assert_eq!(a.total_tardiness, b.total_tardiness);
}

#[test]
fn test_two_by_two_scenario() {
    let problem = SchedulingProblem::new(default_epoch())
        .with_machine(Machine::new("M1", "CNC"))
        .with_job(
            Job::new("J1")
                .with_due(100)
                .with_operation(op("J1_O1", "J1", 1, 30, "M1"))
                .with_operation(op("J1_O2", "J1", 2, 30, "M1")),
        )
        .with_job(
            Job::new("J2")
                .with_due(40)
                .with_operation(op("J2_O1", "J2", 1, 20, "M1"))
                .with_operation(op("J2_O2", "J2", 2, 20, "M1")),
        );

    let fifo = BaselineScheduler::fifo().schedule(&problem);
    assert_eq!(fifo.late_jobs, 1);

    let optimized = solve(&problem, &SchedulingConfig::default().with_time_limit(10.0));
    assert!(optimized.status.has_schedule());
    assert_eq!(optimized.late_jobs, 0);
    assert_eq!(optimized.makespan, 100);

    let delta = Improvement::between(&fifo, &optimized);
    assert_eq!(delta.late_jobs_reduced, 1);
}
