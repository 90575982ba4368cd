use tracing::{debug, trace};

use crate::backend::shape_helpers::normalize_axis;
use crate::backend::{ArgRole, Memory, ReferenceBackend, ReferenceKernel};
use crate::displace::{BackendAttempt, DisplaceError};
use crate::graph::{AttrValue, Graph, LogicalTensor, OpId, OpKind, Operation, Partition};

/// Inverts a transpose permutation: `new_order[(order[k] + n) % n] = k`.
///
/// Negative axes are accepted and normalized. Returns `None` when `order` is not a
/// permutation of `0..n`.
pub fn invert_permutation(order: &[i64]) -> Option<Vec<i64>> {
    let rank = order.len();
    let mut new_order = vec![-1i64; rank];
    for (position, &axis) in order.iter().enumerate() {
        let axis = normalize_axis(axis, rank)?;
        if new_order[axis] != -1 {
            return None;
        }
        new_order[axis] = i64::try_from(position).ok()?;
    }
    Some(new_order)
}

/// Builds the reverse-execution description of a go-through op.
///
/// Works on a copy: inputs and outputs swap places, quantize and dequantize trade kinds while
/// keeping their scales and zero points, and a transpose gets the inverse `order`. Type casts
/// and reshapes need nothing else since the swapped tensors already carry the target type and
/// shape. Any other kind is an invariant violation.
pub fn invert_operation(op: &Operation) -> Result<Operation, DisplaceError> {
    let mut inverted = op.clone();
    std::mem::swap(&mut inverted.inputs, &mut inverted.outputs);

    match op.kind {
        OpKind::Quantize => inverted.kind = OpKind::Dequantize,
        OpKind::Dequantize => inverted.kind = OpKind::Quantize,
        OpKind::StaticTranspose => {
            let order = op
                .attr_s64_vec("order")
                .ok_or_else(|| DisplaceError::InvalidAttribute {
                    op: op.id,
                    name: "order",
                    reason: "missing".to_string(),
                })?;
            let new_order =
                invert_permutation(order).ok_or_else(|| DisplaceError::InvalidAttribute {
                    op: op.id,
                    name: "order",
                    reason: format!("{order:?} is not a permutation"),
                })?;
            inverted
                .attrs
                .insert("order".to_string(), AttrValue::S64Vec(new_order));
        }
        OpKind::TypeCast | OpKind::StaticReshape => {}
        other => {
            return Err(DisplaceError::InvariantViolation {
                op: op.id,
                kind: other,
            })
        }
    }
    Ok(inverted)
}

/// One executed reverse hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayStep {
    pub op: OpId,
    pub forward_kind: OpKind,
    pub inverted_kind: OpKind,
    /// Tensor the hop's result stands for.
    pub output: LogicalTensor,
}

/// Data carried back to the first tensor whose producer lies outside the partition.
#[derive(Debug, Clone)]
pub struct Replay {
    pub memory: Memory,
    pub tensor: LogicalTensor,
    pub steps: Vec<ReplayStep>,
}

#[derive(Debug)]
pub enum ReplayOutcome {
    Completed(Replay),
    /// The backend declined one of the inverted ops; nothing was produced.
    Skipped { op: OpId, reason: String },
}

/// Carries `memory`, which holds data for `start`, upstream until the producer of the current
/// tensor is absent or outside `partition`, executing every producer inverted.
pub fn replay_upstream<B: ReferenceBackend>(
    graph: &Graph,
    partition: &Partition,
    backend: &B,
    start: &LogicalTensor,
    memory: Memory,
) -> Result<ReplayOutcome, DisplaceError> {
    let mut tensor = start.clone();
    let mut memory = memory;
    let mut steps = Vec::new();

    while let Some(parent) = graph
        .producer_of(tensor.id)
        .filter(|parent| partition.contains(parent.id))
    {
        let inverted = invert_operation(parent)?;
        trace!(
            op = %parent.id,
            from = %parent.kind,
            to = %inverted.kind,
            "executing inverted op"
        );

        let mut kernel = match BackendAttempt::classify(backend.create_kernel(&inverted))? {
            BackendAttempt::Ready(kernel) => kernel,
            BackendAttempt::Declined(err) => return Ok(skipped(parent.id, err.to_string())),
        };
        if let BackendAttempt::Declined(err) =
            BackendAttempt::classify(kernel.init_memory_args())?
        {
            return Ok(skipped(parent.id, err.to_string()));
        }

        // The kernel's own source descriptor wins over the graph's: some kernels describe
        // their operands with extra unit dimensions.
        let src_desc = kernel
            .arg(ArgRole::Src)
            .map(|src| src.desc().clone())
            .ok_or(DisplaceError::MissingArgument {
                kind: inverted.kind,
                role: ArgRole::Src,
            })?;
        kernel.replace_arg(ArgRole::Src, memory.with_desc(src_desc)?)?;
        if let BackendAttempt::Declined(err) = BackendAttempt::classify(kernel.execute())? {
            return Ok(skipped(parent.id, err.to_string()));
        }

        memory = kernel
            .take_arg(ArgRole::Dst)
            .ok_or(DisplaceError::MissingArgument {
                kind: inverted.kind,
                role: ArgRole::Dst,
            })?;
        tensor = inverted
            .outputs
            .first()
            .cloned()
            .ok_or(DisplaceError::MalformedOp {
                op: parent.id,
                reason: "go-through op without an input",
            })?;
        steps.push(ReplayStep {
            op: parent.id,
            forward_kind: parent.kind,
            inverted_kind: inverted.kind,
            output: tensor.clone(),
        });
    }

    Ok(ReplayOutcome::Completed(Replay {
        memory,
        tensor,
        steps,
    }))
}

fn skipped(op: OpId, reason: String) -> ReplayOutcome {
    debug!(op = %op, reason = %reason, "reverse execution declined by backend");
    ReplayOutcome::Skipped { op, reason }
}
