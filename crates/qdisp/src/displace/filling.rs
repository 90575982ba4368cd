use tracing::trace;

use crate::backend::{ArgRole, Driver, Memory, ReferenceBackend, ReferenceKernel};
use crate::displace::{BackendAttempt, DisplaceError};
use crate::graph::{DataType, OpKind, Operation};

/// Copies `main_op` with data types adjusted so that a reference backend accepts it for
/// filling its arguments with `data_type`-range data.
///
/// - the first input takes `data_type`;
/// - the second input takes `data_type` too, except that matmul/conv/deconv have no u8 weights
///   and get `s8` instead;
/// - pooling and binary ops produce `data_type` (no x8 -> f32 pooling, no x8x8 -> bf16 binary);
/// - anything else produces `f32` unless it already produces `bf16`.
pub fn quantize_filling_op(main_op: &Operation, data_type: DataType) -> Operation {
    let mut op = main_op.clone();
    let driver = Driver::of(op.kind);
    let no_u8_weights = matches!(
        op.kind,
        OpKind::MatMul | OpKind::Convolution | OpKind::ConvTranspose
    );

    if let Some(src) = op.inputs.get_mut(0) {
        src.data_type = data_type;
    }
    if let Some(weights) = op.inputs.get_mut(1) {
        weights.data_type = if no_u8_weights && data_type == DataType::U8 {
            DataType::S8
        } else {
            data_type
        };
    }
    if let Some(dst) = op.outputs.get_mut(0) {
        if matches!(driver, Driver::Pool | Driver::Binary) {
            dst.data_type = data_type;
        } else if dst.data_type != DataType::Bf16 {
            dst.data_type = DataType::F32;
        }
    }
    op
}

/// Asks `backend` to fill the arguments of `filling_op` and returns the buffer bound to `role`.
///
/// A declined configuration yields [`BackendAttempt::Declined`]; invalid arguments and
/// execution failures are errors.
pub fn synthesize<B: ReferenceBackend>(
    backend: &B,
    filling_op: &Operation,
    role: ArgRole,
) -> Result<BackendAttempt<Memory>, DisplaceError> {
    let mut kernel = match BackendAttempt::classify(backend.create_kernel(filling_op))? {
        BackendAttempt::Ready(kernel) => kernel,
        BackendAttempt::Declined(err) => return Ok(BackendAttempt::Declined(err)),
    };
    if let BackendAttempt::Declined(err) = BackendAttempt::classify(kernel.init_memory_args())? {
        return Ok(BackendAttempt::Declined(err));
    }

    let memory = kernel
        .take_arg(role)
        .ok_or(DisplaceError::MissingArgument {
            kind: filling_op.kind,
            role,
        })?;
    trace!(
        kind = %filling_op.kind,
        role = %role,
        dtype = %memory.data_type(),
        elements = memory.element_count(),
        "synthesized quantize filling"
    );
    Ok(BackendAttempt::Ready(memory))
}
