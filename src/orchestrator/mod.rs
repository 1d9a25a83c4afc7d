//! Hybrid orchestration: Tier-1 solve, then Tier-2 real-time adjustment.
//!
//! # Run Lifecycle
//!
//! 1. `schedule(problem)` solves with the constraint scheduler and opens a
//!    run with a fresh id. When Tier 2 is enabled and a schedule exists, a
//!    live environment is reset to it and the configured agent is loaded
//!    through the registry.
//! 2. `handle_disruption` injects an external event into the live
//!    environment and asks the agent for one recommendation per affected
//!    operation.
//! 3. `apply_adjustment` applies an action to the live environment and
//!    mirrors the result into the authoritative schedule. Repeating it for
//!    the same operation within a run returns the first outcome.
//!
//! The live environment samples no random disruptions; every event comes
//! from `handle_disruption`.

mod datasource;
mod registry;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use datasource::{DataSource, ExportReport, ExportedRun, InMemoryDataSource, JsonFileDataSource};
pub use registry::{AgentKey, AgentRegistry};

use crate::agents::{probe_backend, ActionDims, ActionDistribution};
use crate::config::HybridConfig;
use crate::cp::ScheduleCpBuilder;
use crate::encoder::StateEncoder;
use crate::env::{
    Action, ActionMask, ActionType, Disruption, DisruptionTarget, DisruptionType, EnvState, OpSlot,
    SchedulingEnv, StateChange,
};
use crate::error::{Result, SchedulingError};
use crate::models::{ScheduledOperation, SchedulingProblem, SchedulingSolution, TimeWindow};
use crate::scheduler::ConstraintScheduler;

/// Alternatives reported next to each recommendation.
const ALTERNATIVES: usize = 3;

/// A suggested action in terms of ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub action_type: ActionType,
    pub target_operation: Option<String>,
    pub target_machine: Option<String>,
    /// Joint probability under the agent's policy.
    pub confidence: f64,
}

/// The agent's preferred action plus the next best ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action_type: ActionType,
    pub target_operation: Option<String>,
    pub target_machine: Option<String>,
    pub confidence: f64,
    pub alternatives: Vec<Alternative>,
}

/// Outcome of [`HybridOrchestrator::apply_adjustment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentResult {
    pub success: bool,
    /// Schedule fields changed by the adjustment.
    pub updated_fields: Vec<String>,
    /// Why the adjustment was rejected.
    pub message: Option<String>,
}

impl AdjustmentResult {
    fn applied(fields: &[&str]) -> Self {
        Self {
            success: true,
            updated_fields: fields.iter().map(|f| f.to_string()).collect(),
            message: None,
        }
    }

    fn rejected(message: String) -> Self {
        Self {
            success: false,
            updated_fields: Vec::new(),
            message: Some(message),
        }
    }
}

/// Summary returned by [`HybridOrchestrator::schedule`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRun {
    pub run_id: Uuid,
    pub solution: SchedulingSolution,
    /// Whether the live environment and agent are ready.
    pub tier2_ready: bool,
}

/// Tier-2 state for a run.
struct LiveTwin {
    env: SchedulingEnv,
    encoder: StateEncoder,
    key: AgentKey,
}

struct ActiveRun {
    run_id: Uuid,
    problem: SchedulingProblem,
    solution: SchedulingSolution,
    windows: HashMap<String, Vec<TimeWindow>>,
    twin: Option<LiveTwin>,
    /// Operation id → first successful adjustment.
    applied: HashMap<String, AdjustmentResult>,
}

/// Sequences Tier 1 and Tier 2 for one scheduling run at a time.
pub struct HybridOrchestrator {
    config: HybridConfig,
    registry: AgentRegistry,
    run: Option<ActiveRun>,
}

impl std::fmt::Debug for HybridOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridOrchestrator")
            .field("run_id", &self.run_id())
            .field("registry", &self.registry)
            .finish()
    }
}

impl HybridOrchestrator {
    /// Creates an orchestrator.
    ///
    /// With Tier 2 enabled the tensor backend is probed first, so a missing
    /// backend fails here rather than during a run.
    pub fn new(config: HybridConfig) -> Result<Self> {
        if config.orchestrator.enable_tier2 {
            probe_backend()?;
        }
        let o = &config.orchestrator;
        let mut registry = AgentRegistry::new(o.registry_capacity, config.ppo.clone(), config.sac.clone(), o.seed);
        if let Some(dir) = &o.checkpoint_dir {
            registry = registry.with_checkpoint_dir(dir);
        }
        Ok(Self {
            config,
            registry,
            run: None,
        })
    }

    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut AgentRegistry {
        &mut self.registry
    }

    pub fn run_id(&self) -> Option<Uuid> {
        self.run.as_ref().map(|r| r.run_id)
    }

    /// Authoritative schedule of the active run.
    pub fn solution(&self) -> Option<&SchedulingSolution> {
        self.run.as_ref().map(|r| &r.solution)
    }

    pub fn problem(&self) -> Option<&SchedulingProblem> {
        self.run.as_ref().map(|r| &r.problem)
    }

    /// Live environment state of the active run.
    pub fn live_state(&self) -> Option<&EnvState> {
        self.run.as_ref()?.twin.as_ref()?.env.state()
    }

    /// Solves `problem` and opens a new run.
    pub fn schedule(&mut self, problem: SchedulingProblem) -> Result<ScheduleRun> {
        let run_id = Uuid::new_v4();
        let scheduler = ConstraintScheduler::new(self.config.solver.clone());
        let solution = scheduler.solve(&problem);
        let windows = ScheduleCpBuilder::new(&problem, &self.config.solver).windows().clone();
        info!(%run_id, status = ?solution.status, makespan = solution.makespan, "tier 1 finished");

        let twin = if self.config.orchestrator.enable_tier2 && solution.status.has_schedule() {
            Some(self.start_twin(&problem, &solution)?)
        } else {
            None
        };
        let tier2_ready = twin.is_some();
        if tier2_ready {
            info!(%run_id, agent = %self.config.orchestrator.agent, "tier 2 ready");
        }

        self.run = Some(ActiveRun {
            run_id,
            problem,
            solution: solution.clone(),
            windows,
            twin,
            applied: HashMap::new(),
        });
        Ok(ScheduleRun {
            run_id,
            solution,
            tier2_ready,
        })
    }

    /// Loads a problem from `source` and schedules it.
    pub fn schedule_from(&mut self, source: &dyn DataSource, problem_id: &str) -> Result<ScheduleRun> {
        let problem = source.load_problem(problem_id)?;
        self.schedule(problem)
    }

    /// Exports the authoritative schedule of the active run.
    pub fn export(&self, sink: &mut dyn DataSource) -> Result<ExportReport> {
        let run = self.run.as_ref().ok_or(SchedulingError::NoActiveRun)?;
        sink.export_solution(run.run_id, &run.solution)
    }

    fn start_twin(&mut self, problem: &SchedulingProblem, solution: &SchedulingSolution) -> Result<LiveTwin> {
        let env_config = self.config.environment.clone().with_disruption_probability(0.0);
        let encoder = StateEncoder::from_config(&env_config);
        let dims = ActionDims::new(env_config.max_operations, env_config.max_machines);
        let mut env = SchedulingEnv::new(env_config);
        env.reset(solution, &problem.machines, 0, self.config.orchestrator.seed)?;

        let key = AgentKey::new(self.config.orchestrator.agent, encoder.dim(), dims);
        self.registry.get(key)?;
        Ok(LiveTwin { env, encoder, key })
    }

    fn active(&mut self) -> Result<(&mut ActiveRun, &mut AgentRegistry)> {
        let run = self.run.as_mut().ok_or(SchedulingError::NoActiveRun)?;
        Ok((run, &mut self.registry))
    }

    /// Advances the live environment by `steps` no-op steps and returns the
    /// new clock.
    pub fn advance(&mut self, steps: usize) -> Result<i64> {
        let (run, _) = self.active()?;
        let twin = run.twin.as_mut().ok_or_else(tier2_disabled)?;
        for _ in 0..steps {
            if twin.env.step(&Action::noop())?.done() {
                break;
            }
        }
        twin.env
            .state()
            .map(|s| s.clock)
            .ok_or_else(|| SchedulingError::EnvironmentNotReady("no state".into()))
    }

    /// The agent's recommendation for the current live state.
    pub fn recommend_adjustment(&mut self) -> Result<Recommendation> {
        let (run, registry) = self.active()?;
        let twin = run.twin.as_ref().ok_or_else(tier2_disabled)?;
        let mask = twin.env.action_mask()?;
        let state = live(&twin.env)?;
        let agent = registry.get(twin.key)?;
        let dist = agent.action_distribution(&twin.encoder.encode(state), &mask)?;
        Ok(recommend(&dist, &mask, state))
    }

    /// Injects an external disruption and recommends one adjustment per
    /// affected operation.
    ///
    /// `resource` is a machine id for machine-level events (breakdown,
    /// worker absence, rush order) and an operation id otherwise.
    pub fn handle_disruption(
        &mut self,
        kind: DisruptionType,
        resource: &str,
        duration_minutes: i64,
    ) -> Result<Vec<Recommendation>> {
        let cap = self.config.orchestrator.max_recommendations;
        let (run, registry) = self.active()?;
        let run_id = run.run_id;
        let twin = run.twin.as_mut().ok_or_else(tier2_disabled)?;

        let state = live(&twin.env)?;
        let target = if kind.targets_machine() {
            let m = state
                .machine_index(resource)
                .ok_or_else(|| SchedulingError::UnknownMachine(resource.to_string()))?;
            DisruptionTarget::Machine(m)
        } else {
            let o = state
                .op_index(resource)
                .ok_or_else(|| SchedulingError::UnknownOperation(resource.to_string()))?;
            DisruptionTarget::Operation(o)
        };
        let disruption = Disruption::new(kind, target, state.clock, duration_minutes);
        if !twin.env.inject_disruption(disruption)? {
            warn!(%run_id, ?kind, resource, "disruption not applicable");
            return Ok(Vec::new());
        }

        let state = live(&twin.env)?;
        let affected = affected_operations(state, target);
        let mask = twin.env.action_mask()?;
        let encoded = twin.encoder.encode(state);
        let agent = registry.get(twin.key)?;

        let mut out = Vec::new();
        for index in affected.into_iter().take(cap) {
            let op_mask = mask.clone().only_operation(index);
            if !op_mask.has_operation() {
                continue;
            }
            let dist = agent.action_distribution(&encoded, &op_mask)?;
            out.push(recommend(&dist, &op_mask, state));
        }
        info!(%run_id, ?kind, resource, recommendations = out.len(), "disruption handled");
        Ok(out)
    }

    /// Applies an adjustment to the live environment and the authoritative
    /// schedule.
    ///
    /// `machine_id` defaults to the operation's current machine. Rejected
    /// actions return `success = false` and leave both untouched.
    pub fn apply_adjustment(
        &mut self,
        action_type: ActionType,
        operation_id: &str,
        machine_id: Option<&str>,
    ) -> Result<AdjustmentResult> {
        let (run, _) = self.active()?;
        let run_id = run.run_id;
        if let Some(previous) = run.applied.get(operation_id) {
            debug!(%run_id, operation_id, "adjustment already applied");
            return Ok(previous.clone());
        }
        let twin = run.twin.as_mut().ok_or_else(tier2_disabled)?;

        let state = live(&twin.env)?;
        let op = state
            .op_index(operation_id)
            .ok_or_else(|| SchedulingError::UnknownOperation(operation_id.to_string()))?;
        let machine = match machine_id {
            Some(id) => state
                .machine_index(id)
                .ok_or_else(|| SchedulingError::UnknownMachine(id.to_string()))?,
            None => state.operations[op].machine,
        };

        let change = match twin.env.apply_external(&Action::new(action_type, op, machine)) {
            Ok(change) => change,
            Err(SchedulingError::InvalidAction(e)) => {
                warn!(%run_id, operation_id, ?action_type, error = %e, "adjustment rejected");
                return Ok(AdjustmentResult::rejected(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        let state = live(&twin.env)?;
        let fields = mirror_change(&mut run.solution, state, &change);
        run.solution.recompute_metrics(&run.windows);
        let result = AdjustmentResult::applied(fields);
        run.applied.insert(operation_id.to_string(), result.clone());
        info!(%run_id, operation_id, ?action_type, fields = ?result.updated_fields, "adjustment applied");
        Ok(result)
    }
}

fn tier2_disabled() -> SchedulingError {
    SchedulingError::EnvironmentNotReady("tier 2 is disabled or the run has no schedule".into())
}

fn live(env: &SchedulingEnv) -> Result<&EnvState> {
    env.state()
        .ok_or_else(|| SchedulingError::EnvironmentNotReady("reset has not been called".into()))
}

/// Adjustable operations touched by a disruption, in planned start order.
fn affected_operations(state: &EnvState, target: DisruptionTarget) -> Vec<usize> {
    let mut affected: Vec<usize> = match target {
        DisruptionTarget::Machine(m) => (0..state.operations.len())
            .filter(|&i| state.operations[i].machine == m)
            .collect(),
        DisruptionTarget::Operation(o) => {
            let hit = &state.operations[o];
            (0..state.operations.len())
                .filter(|&i| {
                    let op = &state.operations[i];
                    i == o || (op.job_id == hit.job_id && op.sequence > hit.sequence)
                })
                .collect()
        }
    };
    affected.retain(|&i| state.operations[i].status.is_adjustable());
    affected.sort_by_key(|&i| (state.operations[i].start, i));
    affected
}

fn describe(action: &Action, state: &EnvState, confidence: f64) -> Alternative {
    Alternative {
        action_type: action.action_type,
        target_operation: state
            .operations
            .get(action.operation)
            .filter(|o| o.is_live())
            .map(|o| o.operation_id.clone()),
        target_machine: state
            .machines
            .get(action.machine)
            .filter(|m| m.is_live())
            .map(|m| m.machine_id.clone()),
        confidence,
    }
}

fn recommend(dist: &ActionDistribution, mask: &ActionMask, state: &EnvState) -> Recommendation {
    let best = dist.best(mask);
    let head = describe(&best, state, dist.joint(&best));
    let alternatives = dist
        .ranked(mask, ALTERNATIVES + 1)
        .into_iter()
        .filter(|(a, _)| *a != best)
        .take(ALTERNATIVES)
        .map(|(a, p)| describe(&a, state, p))
        .collect();
    Recommendation {
        action_type: head.action_type,
        target_operation: head.target_operation,
        target_machine: head.target_machine,
        confidence: head.confidence,
        alternatives,
    }
}

/// Writes an environment slot into the schedule, adding it if missing.
fn upsert(solution: &mut SchedulingSolution, slot: &OpSlot, state: &EnvState) {
    let machine_id = state
        .machines
        .get(slot.machine)
        .map(|m| m.machine_id.clone())
        .unwrap_or_default();
    match solution.operation_mut(&slot.operation_id) {
        Some(op) => {
            op.machine_id = machine_id;
            op.start = slot.start;
            op.end = slot.end;
            op.duration = slot.duration;
            op.setup = op.setup.min(slot.duration);
            op.priority = slot.priority;
        }
        None => solution.operations.push(ScheduledOperation {
            operation_id: slot.operation_id.clone(),
            job_id: slot.job_id.clone(),
            machine_id,
            start: slot.start,
            end: slot.end,
            duration: slot.duration,
            setup: 0,
            sequence: slot.sequence,
            due: slot.due,
            priority: slot.priority,
            is_late: false,
            tardiness_minutes: 0,
        }),
    }
}

/// Mirrors an applied change into the schedule; returns the changed fields.
fn mirror_change(solution: &mut SchedulingSolution, state: &EnvState, change: &StateChange) -> &'static [&'static str] {
    match *change {
        StateChange::None => &[],
        StateChange::Reassign { op, .. } => {
            upsert(solution, &state.operations[op], state);
            &["machine_id"]
        }
        StateChange::Shift { op, .. } => {
            upsert(solution, &state.operations[op], state);
            &["start", "end"]
        }
        StateChange::SetPriority { op, .. } => {
            upsert(solution, &state.operations[op], state);
            &["priority"]
        }
        StateChange::Split { op, into, .. } => {
            upsert(solution, &state.operations[op], state);
            upsert(solution, &state.operations[into], state);
            &["duration", "end", "operations"]
        }
        StateChange::Merge { op, .. } => {
            solution
                .operations
                .retain(|o| state.op_index(&o.operation_id).is_some());
            upsert(solution, &state.operations[op], state);
            &["duration", "end", "operations"]
        }
    }
}
