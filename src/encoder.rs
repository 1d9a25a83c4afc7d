//! Flat state encoding for the agents.
//!
//! # Layout
//!
//! ```text
//! [ op_0 (8) | op_1 (8) | ... | m_0 (6) | m_1 (6) | ... | global (9) | embedding (k) ]
//! ```
//!
//! Operation block, per slot:
//!
//! | Offset | Feature | Range |
//! |--------|---------|-------|
//! | 0 | (start − clock) / H | [-1, 1] |
//! | 1 | (end − clock) / H | [-1, 1] |
//! | 2 | (due − clock) / H | [-1, 1] |
//! | 3 | duration / H | [0, 1] |
//! | 4 | status code / 4 | [0, 1] |
//! | 5 | priority / cap | [0, 1] |
//! | 6 | machine index / (machines − 1) | [0, 1] |
//! | 7 | late flag | {0, 1} |
//!
//! Machine block, per slot:
//!
//! | Offset | Feature |
//! |--------|---------|
//! | 0 | status code / 3 |
//! | 1 | utilization |
//! | 2 | remaining assigned work / H |
//! | 3 | capacity / 10 |
//! | 4 | time until available / H |
//! | 5 | share of waiting operations queued here |
//!
//! Global block: time progress, pending / in-progress / completed / delayed
//! ratios, late ratio, average utilization, active disruptions / 10, and
//! workload balance (1 − coefficient of variation of remaining work).
//!
//! Empty slots encode as zeros. An optional fixed-size embedding is
//! appended after the global block, zero-filled when absent.

use crate::env::{EnvConfig, EnvState, MachineStatus, OpStatus};

pub const OP_FEATURES: usize = 8;
pub const MACHINE_FEATURES: usize = 6;
pub const GLOBAL_FEATURES: usize = 9;

/// Encodes [`EnvState`]s into fixed-length vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct StateEncoder {
    max_operations: usize,
    max_machines: usize,
    horizon_minutes: i64,
    priority_cap: i32,
    embedding_dim: usize,
}

impl StateEncoder {
    pub fn new(max_operations: usize, max_machines: usize, horizon_minutes: i64) -> Self {
        Self {
            max_operations,
            max_machines,
            horizon_minutes: horizon_minutes.max(1),
            priority_cap: 10,
            embedding_dim: 0,
        }
    }

    /// Encoder matching an environment's capacities.
    pub fn from_config(config: &EnvConfig) -> Self {
        Self::new(config.max_operations, config.max_machines, config.horizon_minutes())
            .with_priority_cap(config.priority_cap)
    }

    pub fn with_priority_cap(mut self, cap: i32) -> Self {
        self.priority_cap = cap.max(1);
        self
    }

    /// Reserves `dim` trailing values for an external embedding.
    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    pub fn max_operations(&self) -> usize {
        self.max_operations
    }

    pub fn max_machines(&self) -> usize {
        self.max_machines
    }

    /// Length of an encoded vector.
    pub fn dim(&self) -> usize {
        self.max_operations * OP_FEATURES
            + self.max_machines * MACHINE_FEATURES
            + GLOBAL_FEATURES
            + self.embedding_dim
    }

    pub fn op_offset(&self, slot: usize) -> usize {
        slot * OP_FEATURES
    }

    pub fn machine_offset(&self, slot: usize) -> usize {
        self.max_operations * OP_FEATURES + slot * MACHINE_FEATURES
    }

    pub fn global_offset(&self) -> usize {
        self.machine_offset(self.max_machines)
    }

    pub fn embedding_offset(&self) -> usize {
        self.global_offset() + GLOBAL_FEATURES
    }

    pub fn encode(&self, state: &EnvState) -> Vec<f32> {
        self.encode_with_embedding(state, None)
    }

    /// Encodes `state`, appending `embedding` truncated or zero-padded to
    /// the configured size.
    pub fn encode_with_embedding(&self, state: &EnvState, embedding: Option<&[f32]>) -> Vec<f32> {
        let mut out = vec![0.0f32; self.dim()];
        let h = self.horizon_minutes as f64;
        let clock = state.clock;
        let signed = |v: f64| v.clamp(-1.0, 1.0) as f32;
        let unit = |v: f64| v.clamp(0.0, 1.0) as f32;

        let machine_norm = self.max_machines.saturating_sub(1).max(1) as f64;
        for (i, op) in state.operations.iter().take(self.max_operations).enumerate() {
            if !op.is_live() {
                continue;
            }
            let o = self.op_offset(i);
            out[o] = signed((op.start - clock) as f64 / h);
            out[o + 1] = signed((op.end - clock) as f64 / h);
            out[o + 2] = signed((op.due - clock) as f64 / h);
            out[o + 3] = unit(op.duration as f64 / h);
            out[o + 4] = unit(op.status.code() as f64 / 4.0);
            out[o + 5] = unit(op.priority as f64 / self.priority_cap as f64);
            out[o + 6] = unit(op.machine as f64 / machine_norm);
            let late = op.tardiness > 0 || (op.status != OpStatus::Completed && op.is_late());
            out[o + 7] = if late { 1.0 } else { 0.0 };
        }

        let waiting: Vec<usize> = state
            .operations
            .iter()
            .filter(|o| matches!(o.status, OpStatus::Pending | OpStatus::Delayed))
            .map(|o| o.machine)
            .collect();
        let mut remaining = Vec::new();
        for (j, m) in state.machines.iter().take(self.max_machines).enumerate() {
            if !m.is_live() {
                continue;
            }
            let o = self.machine_offset(j);
            let work = state.remaining_work(j);
            remaining.push(work as f64);
            let until = match m.status {
                MachineStatus::Breakdown => m.breakdown_until.map_or(h, |t| (t - clock) as f64),
                MachineStatus::Busy => m
                    .current_op
                    .map_or(0.0, |i| (state.operations[i].end - clock) as f64),
                _ => 0.0,
            };
            let queued = waiting.iter().filter(|&&w| w == j).count();
            out[o] = unit(m.status.code() as f64 / 3.0);
            out[o + 1] = unit(state.machine_utilization(j));
            out[o + 2] = unit(work as f64 / h);
            out[o + 3] = unit(m.capacity as f64 / 10.0);
            out[o + 4] = unit(until / h);
            out[o + 5] = if waiting.is_empty() {
                0.0
            } else {
                unit(queued as f64 / waiting.len() as f64)
            };
        }

        let g = self.global_offset();
        let counts = state.status_counts();
        let live = counts.total().max(1) as f64;
        let late = state
            .operations
            .iter()
            .filter(|o| o.is_live() && (o.tardiness > 0 || o.is_late()))
            .count();
        out[g] = unit((clock - state.start_time) as f64 / h);
        out[g + 1] = unit(counts.pending as f64 / live);
        out[g + 2] = unit(counts.in_progress as f64 / live);
        out[g + 3] = unit(counts.completed as f64 / live);
        out[g + 4] = unit(counts.delayed as f64 / live);
        out[g + 5] = unit(late as f64 / live);
        out[g + 6] = unit(state.average_utilization());
        out[g + 7] = unit(state.disruptions.len() as f64 / 10.0);
        out[g + 8] = unit(balance(&remaining));

        if let Some(embedding) = embedding {
            let e = self.embedding_offset();
            for (dst, &src) in out[e..].iter_mut().zip(embedding) {
                *dst = src.clamp(-1.0, 1.0);
            }
        }
        out
    }
}

/// 1 − coefficient of variation; 1 when all loads are equal or zero.
fn balance(loads: &[f64]) -> f64 {
    if loads.is_empty() {
        return 1.0;
    }
    let n = loads.len() as f64;
    let mean = loads.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return 1.0;
    }
    let var = loads.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / n;
    1.0 - var.sqrt() / mean
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{MachineSlot, OpSlot};

    fn state() -> EnvState {
        let mut s = EnvState::empty(3, 2, 0);
        s.clock = 60;
        s.machines[0] = MachineSlot::available("M1", 2, 0);
        s.operations[0] = OpSlot {
            status: OpStatus::Pending,
            operation_id: "O1".into(),
            job_id: "J1".into(),
            start: 120,
            end: 180,
            duration: 60,
            due: 150,
            priority: 5,
            ..OpSlot::empty()
        };
        s
    }

    #[test]
    fn test_dimensions_and_offsets() {
        let enc = StateEncoder::new(3, 2, 600).with_embedding_dim(4);
        assert_eq!(enc.dim(), 3 * 8 + 2 * 6 + 9 + 4);
        assert_eq!(enc.machine_offset(0), 24);
        assert_eq!(enc.global_offset(), 36);
        assert_eq!(enc.embedding_offset(), 45);
        assert_eq!(enc.encode(&state()).len(), enc.dim());
    }

    #[test]
    fn test_operation_features() {
        let enc = StateEncoder::new(3, 2, 600);
        let v = enc.encode(&state());
        assert!((v[0] - 0.1).abs() < 1e-6);
        assert!((v[1] - 0.2).abs() < 1e-6);
        assert!((v[2] - 0.15).abs() < 1e-6);
        assert!((v[3] - 0.1).abs() < 1e-6);
        assert!((v[4] - 0.25).abs() < 1e-6);
        assert!((v[5] - 0.5).abs() < 1e-6);
        assert!((v[7] - 1.0).abs() < 1e-6);
        // Empty slots stay zero.
        assert!(v[8..24].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_machine_and_global_features() {
        let enc = StateEncoder::new(3, 2, 600);
        let v = enc.encode(&state());
        let m = enc.machine_offset(0);
        assert!((v[m] - 1.0 / 3.0).abs() < 1e-6);
        assert!((v[m + 2] - 0.1).abs() < 1e-6);
        assert!((v[m + 3] - 0.2).abs() < 1e-6);
        assert!((v[m + 5] - 1.0).abs() < 1e-6);

        let g = enc.global_offset();
        assert!((v[g] - 0.1).abs() < 1e-6);
        assert!((v[g + 1] - 1.0).abs() < 1e-6);
        assert!((v[g + 5] - 1.0).abs() < 1e-6);
        assert!((v[g + 8] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_values_are_clipped() {
        let mut s = state();
        s.operations[0].move_to(-10_000);
        s.operations[0].priority = 99;
        let v = StateEncoder::new(3, 2, 600).encode(&s);
        assert!(v.iter().all(|&x| (-1.0..=1.0).contains(&x)));
        assert_eq!(v[0], -1.0);
        assert_eq!(v[5], 1.0);
    }

    #[test]
    fn test_embedding_appended() {
        let enc = StateEncoder::new(3, 2, 600).with_embedding_dim(3);
        let v = enc.encode_with_embedding(&state(), Some(&[0.5, -2.0]));
        let e = enc.embedding_offset();
        assert_eq!(&v[e..], &[0.5f32, -1.0, 0.0]);
    }

    #[test]
    fn test_balance() {
        assert!((balance(&[10.0, 10.0]) - 1.0).abs() < 1e-10);
        assert!((balance(&[0.0, 20.0]) - 0.0).abs() < 1e-10);
        assert!((balance(&[]) - 1.0).abs() < 1e-10);
    }
}
