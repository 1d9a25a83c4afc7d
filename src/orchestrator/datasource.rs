//! Problem loading and solution export boundary.
//!
//! The engine never touches storage directly; callers hand it a
//! [`DataSource`]. Exports are upserts keyed by `(run id, operation id)`,
//! so retrying an export after a partial failure is safe.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, SchedulingError};
use crate::models::{ScheduledOperation, SchedulingProblem, SchedulingSolution, SolutionStatus};

/// Outcome of one export call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReport {
    pub run_id: Uuid,
    /// Records created or changed.
    pub written: usize,
    /// Records already stored with identical content.
    pub unchanged: usize,
}

/// Stored form of an exported run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedRun {
    pub run_id: Uuid,
    pub status: SolutionStatus,
    pub makespan: i64,
    pub total_tardiness: i64,
    pub on_time_jobs: usize,
    pub late_jobs: usize,
    pub machine_utilization: BTreeMap<String, f64>,
    pub solve_time_ms: u64,
    pub optimality_gap: f64,
    /// Operation id → scheduled operation.
    pub operations: BTreeMap<String, ScheduledOperation>,
}

impl ExportedRun {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            status: SolutionStatus::Error,
            makespan: 0,
            total_tardiness: 0,
            on_time_jobs: 0,
            late_jobs: 0,
            machine_utilization: BTreeMap::new(),
            solve_time_ms: 0,
            optimality_gap: 0.0,
            operations: BTreeMap::new(),
        }
    }

    /// Upserts `solution` into this record.
    fn merge(&mut self, solution: &SchedulingSolution) -> ExportReport {
        self.status = solution.status;
        self.makespan = solution.makespan;
        self.total_tardiness = solution.total_tardiness;
        self.on_time_jobs = solution.on_time_jobs;
        self.late_jobs = solution.late_jobs;
        self.machine_utilization = solution
            .machine_utilization
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        self.solve_time_ms = solution.solve_time.as_millis() as u64;
        self.optimality_gap = solution.optimality_gap;

        let mut report = ExportReport {
            run_id: self.run_id,
            written: 0,
            unchanged: 0,
        };
        for op in &solution.operations {
            match self.operations.get(&op.operation_id) {
                Some(existing) if existing == op => report.unchanged += 1,
                _ => {
                    self.operations.insert(op.operation_id.clone(), op.clone());
                    report.written += 1;
                }
            }
        }
        report
    }
}

/// External store for problems and solutions.
pub trait DataSource {
    fn load_problem(&self, problem_id: &str) -> Result<SchedulingProblem>;

    /// Stores `solution` under `run_id`. Repeating the call is harmless.
    fn export_solution(&mut self, run_id: Uuid, solution: &SchedulingSolution) -> Result<ExportReport>;
}

/// Data source backed by in-process maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataSource {
    problems: HashMap<String, SchedulingProblem>,
    runs: HashMap<Uuid, ExportedRun>,
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_problem(mut self, id: impl Into<String>, problem: SchedulingProblem) -> Self {
        self.problems.insert(id.into(), problem);
        self
    }

    pub fn run(&self, run_id: &Uuid) -> Option<&ExportedRun> {
        self.runs.get(run_id)
    }
}

impl DataSource for InMemoryDataSource {
    fn load_problem(&self, problem_id: &str) -> Result<SchedulingProblem> {
        self.problems.get(problem_id).cloned().ok_or_else(|| {
            let e = std::io::Error::new(std::io::ErrorKind::NotFound, format!("problem '{problem_id}' not found"));
            SchedulingError::Io(e)
        })
    }

    fn export_solution(&mut self, run_id: Uuid, solution: &SchedulingSolution) -> Result<ExportReport> {
        let report = self
            .runs
            .entry(run_id)
            .or_insert_with(|| ExportedRun::new(run_id))
            .merge(solution);
        debug!(%run_id, written = report.written, unchanged = report.unchanged, "solution exported");
        Ok(report)
    }
}

/// Data source reading and writing JSON files.
///
/// ```text
/// <root>/problems/<problem_id>.json
/// <root>/runs/<run_id>.json
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileDataSource {
    root: PathBuf,
}

impl JsonFileDataSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn problem_path(&self, problem_id: &str) -> PathBuf {
        self.root.join("problems").join(format!("{problem_id}.json"))
    }

    fn run_path(&self, run_id: Uuid) -> PathBuf {
        self.root.join("runs").join(format!("{run_id}.json"))
    }

    /// Writes a problem file.
    pub fn store_problem(&self, problem_id: &str, problem: &SchedulingProblem) -> Result<()> {
        write_json(&self.problem_path(problem_id), problem)
    }

    pub fn read_run(&self, run_id: Uuid) -> Result<Option<ExportedRun>> {
        let path = self.run_path(run_id);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&fs::read(path)?)?))
    }
}

impl DataSource for JsonFileDataSource {
    fn load_problem(&self, problem_id: &str) -> Result<SchedulingProblem> {
        let bytes = fs::read(self.problem_path(problem_id))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn export_solution(&mut self, run_id: Uuid, solution: &SchedulingSolution) -> Result<ExportReport> {
        let mut run = self.read_run(run_id)?.unwrap_or_else(|| ExportedRun::new(run_id));
        let report = run.merge(solution);
        write_json(&self.run_path(run_id), &run)?;
        debug!(%run_id, written = report.written, unchanged = report.unchanged, "solution exported");
        Ok(report)
    }
}

/// Writes through a temporary file so readers never see a partial document.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{default_epoch, Job, Machine, Operation};
    use crate::scheduler::BaselineScheduler;

    fn problem() -> SchedulingProblem {
        SchedulingProblem::new(default_epoch())
            .with_machine(Machine::new("M1", "CNC"))
            .with_job(
                Job::new("J1")
                    .with_due(100)
                    .with_operation(Operation::new("J1_O1", "J1", 1).with_duration(30).with_machine("M1"))
                    .with_operation(Operation::new("J1_O2", "J1", 2).with_duration(20).with_machine("M1")),
            )
    }

    #[test]
    fn test_in_memory_export_is_idempotent() {
        let solution = BaselineScheduler::fifo().schedule(&problem());
        let run_id = Uuid::new_v4();
        let mut ds = InMemoryDataSource::new();

        let first = ds.export_solution(run_id, &solution).unwrap();
        assert_eq!(first.written, 2);
        let second = ds.export_solution(run_id, &solution).unwrap();
        assert_eq!(second.written, 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(ds.run(&run_id).unwrap().operations.len(), 2);
    }

    #[test]
    fn test_in_memory_missing_problem() {
        let ds = InMemoryDataSource::new().with_problem("p1", problem());
        assert!(ds.load_problem("p1").is_ok());
        assert!(matches!(ds.load_problem("p2"), Err(SchedulingError::Io(_))));
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut ds = JsonFileDataSource::new(dir.path());
        ds.store_problem("p1", &problem()).unwrap();
        let loaded = ds.load_problem("p1").unwrap();
        assert_eq!(loaded, problem());

        let mut solution = BaselineScheduler::fifo().schedule(&loaded);
        let run_id = Uuid::new_v4();
        assert_eq!(ds.export_solution(run_id, &solution).unwrap().written, 2);

        solution.operations[1].place_at(60);
        let report = ds.export_solution(run_id, &solution).unwrap();
        assert_eq!((report.written, report.unchanged), (1, 1));

        let stored = ds.read_run(run_id).unwrap().unwrap();
        assert_eq!(stored.operations["J1_O2"].start, 60);
        assert!(ds.read_run(Uuid::new_v4()).unwrap().is_none());
    }
}
