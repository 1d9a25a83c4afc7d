//! Policy, value, and Q networks over the factorized action space.
//!
//! Every network is a two-layer ReLU trunk followed by one linear head per
//! action component (type, operation, machine). Invalid components are
//! masked by adding a large negative constant to their logits before the
//! softmax.

use candle_core::{Device, Module, Result, Tensor, D};
use candle_nn::ops::log_softmax;
use candle_nn::{linear, Linear, VarBuilder};

use crate::env::{Action, ActionMask, ActionType};

/// Logit offset applied to masked entries.
const MASK_PENALTY: f64 = 1e9;

/// Cardinalities of the three action components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionDims {
    pub action_types: usize,
    pub operations: usize,
    pub machines: usize,
}

impl ActionDims {
    pub fn new(operations: usize, machines: usize) -> Self {
        Self {
            action_types: ActionType::COUNT,
            operations,
            machines,
        }
    }

    pub fn as_array(&self) -> [usize; 3] {
        [self.action_types, self.operations, self.machines]
    }

    /// Sum of `ln |A_c|` over the components.
    pub fn log_cardinality(&self) -> f64 {
        self.as_array().iter().map(|&n| (n.max(1) as f64).ln()).sum()
    }
}

/// One tensor per action component.
#[derive(Debug, Clone)]
pub struct Components {
    pub action_type: Tensor,
    pub operation: Tensor,
    pub machine: Tensor,
}

impl Components {
    pub fn parts(&self) -> [&Tensor; 3] {
        [&self.action_type, &self.operation, &self.machine]
    }

    pub fn try_map<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&Tensor) -> Result<Tensor>,
    {
        Ok(Self {
            action_type: f(&self.action_type)?,
            operation: f(&self.operation)?,
            machine: f(&self.machine)?,
        })
    }

    pub fn try_zip<F>(&self, other: &Self, mut f: F) -> Result<Self>
    where
        F: FnMut(&Tensor, &Tensor) -> Result<Tensor>,
    {
        Ok(Self {
            action_type: f(&self.action_type, &other.action_type)?,
            operation: f(&self.operation, &other.operation)?,
            machine: f(&self.machine, &other.machine)?,
        })
    }

    pub fn detach(&self) -> Self {
        Self {
            action_type: self.action_type.detach(),
            operation: self.operation.detach(),
            machine: self.machine.detach(),
        }
    }

    /// Per-row sum over every component, shape `[batch]`.
    pub fn sum_rows(&self) -> Result<Tensor> {
        let [a, b, c] = self.parts();
        (a.sum(D::Minus1)? + b.sum(D::Minus1)?)? + c.sum(D::Minus1)?
    }

    /// Sum of the entries selected by `actions`, shape `[batch]`.
    pub fn gather(&self, actions: &[Action], device: &Device) -> Result<Tensor> {
        let n = actions.len();
        let index = |f: fn(&Action) -> usize| -> Result<Tensor> {
            let idx: Vec<u32> = actions.iter().map(|a| f(a) as u32).collect();
            Tensor::from_vec(idx, (n, 1), device)
        };
        let t = self
            .action_type
            .gather(&index(|a| a.action_type.index())?, D::Minus1)?
            .squeeze(D::Minus1)?;
        let o = self
            .operation
            .gather(&index(|a| a.operation)?, D::Minus1)?
            .squeeze(D::Minus1)?;
        let m = self
            .machine
            .gather(&index(|a| a.machine)?, D::Minus1)?
            .squeeze(D::Minus1)?;
        (t + o)? + m
    }

    /// First row of each component as plain vectors.
    pub fn first_row(&self) -> Result<[Vec<f32>; 3]> {
        Ok([
            self.action_type.get(0)?.to_vec1::<f32>()?,
            self.operation.get(0)?.to_vec1::<f32>()?,
            self.machine.get(0)?.to_vec1::<f32>()?,
        ])
    }
}

/// Builds 0/1 mask tensors for a batch of masks.
pub fn mask_tensors(masks: &[&ActionMask], dims: ActionDims, device: &Device) -> Result<Components> {
    let n = masks.len();
    let build = |width: usize, pick: fn(&ActionMask) -> &Vec<bool>| -> Result<Tensor> {
        let mut data = Vec::with_capacity(n * width);
        for mask in masks {
            let row = pick(mask);
            data.extend((0..width).map(|i| if row.get(i) == Some(&true) { 1.0f32 } else { 0.0 }));
        }
        Tensor::from_vec(data, (n, width), device)
    };
    Ok(Components {
        action_type: build(dims.action_types, |m| &m.action_types)?,
        operation: build(dims.operations, |m| &m.operations)?,
        machine: build(dims.machines, |m| &m.machines)?,
    })
}

/// Log-probabilities of masked logits.
pub fn masked_log_probs(logits: &Components, masks: &Components) -> Result<Components> {
    logits.try_zip(masks, |l, m| {
        let offset = m.affine(MASK_PENALTY, -MASK_PENALTY)?;
        log_softmax(&(l + offset)?, D::Minus1)
    })
}

/// Entropy of the factorized distribution, shape `[batch]`.
pub fn entropy(log_probs: &Components) -> Result<Tensor> {
    log_probs
        .try_map(|lp| lp.exp()? * lp)?
        .sum_rows()?
        .neg()
}

/// Two-layer ReLU trunk.
#[derive(Debug, Clone)]
pub struct Trunk {
    l1: Linear,
    l2: Linear,
}

impl Trunk {
    pub fn new(input: usize, hidden: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            l1: linear(input, hidden, vb.pp("l1"))?,
            l2: linear(hidden, hidden, vb.pp("l2"))?,
        })
    }
}

impl Module for Trunk {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.l2.forward(&self.l1.forward(xs)?.relu()?)?.relu()
    }
}

/// One linear head per action component.
#[derive(Debug, Clone)]
struct Heads {
    action_type: Linear,
    operation: Linear,
    machine: Linear,
}

impl Heads {
    fn new(hidden: usize, dims: ActionDims, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            action_type: linear(hidden, dims.action_types, vb.pp("type"))?,
            operation: linear(hidden, dims.operations, vb.pp("operation"))?,
            machine: linear(hidden, dims.machines, vb.pp("machine"))?,
        })
    }

    fn forward(&self, h: &Tensor) -> Result<Components> {
        Ok(Components {
            action_type: self.action_type.forward(h)?,
            operation: self.operation.forward(h)?,
            machine: self.machine.forward(h)?,
        })
    }
}

/// Factorized categorical policy.
#[derive(Debug, Clone)]
pub struct PolicyNet {
    trunk: Trunk,
    heads: Heads,
}

impl PolicyNet {
    pub fn new(state_dim: usize, hidden: usize, dims: ActionDims, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            trunk: Trunk::new(state_dim, hidden, vb.pp("trunk"))?,
            heads: Heads::new(hidden, dims, vb.pp("heads"))?,
        })
    }

    pub fn logits(&self, states: &Tensor) -> Result<Components> {
        self.heads.forward(&self.trunk.forward(states)?)
    }

    pub fn log_probs(&self, states: &Tensor, masks: &Components) -> Result<Components> {
        masked_log_probs(&self.logits(states)?, masks)
    }
}

/// State-value critic.
#[derive(Debug, Clone)]
pub struct ValueNet {
    trunk: Trunk,
    head: Linear,
}

impl ValueNet {
    pub fn new(state_dim: usize, hidden: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            trunk: Trunk::new(state_dim, hidden, vb.pp("trunk"))?,
            head: linear(hidden, 1, vb.pp("head"))?,
        })
    }

    /// Values, shape `[batch]`.
    pub fn forward(&self, states: &Tensor) -> Result<Tensor> {
        self.head.forward(&self.trunk.forward(states)?)?.squeeze(D::Minus1)
    }
}

/// Additive factorized Q: `Q(s, a) = Q_type(s, t) + Q_op(s, o) + Q_machine(s, m)`.
#[derive(Debug, Clone)]
pub struct QNet {
    trunk: Trunk,
    heads: Heads,
}

impl QNet {
    pub fn new(state_dim: usize, hidden: usize, dims: ActionDims, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            trunk: Trunk::new(state_dim, hidden, vb.pp("trunk"))?,
            heads: Heads::new(hidden, dims, vb.pp("heads"))?,
        })
    }

    pub fn forward(&self, states: &Tensor) -> Result<Components> {
        self.heads.forward(&self.trunk.forward(states)?)
    }
}

/// Stacks flat state vectors into a `[batch, dim]` tensor.
pub fn stack_states<'a, I>(states: I, dim: usize, device: &Device) -> Result<Tensor>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut data = Vec::new();
    let mut rows = 0;
    for s in states {
        if s.len() != dim {
            return Err(candle_core::Error::Msg(format!(
                "state has {} features, expected {dim}",
                s.len()
            )));
        }
        data.extend_from_slice(s);
        rows += 1;
    }
    Tensor::from_vec(data, (rows, dim), device)
}
