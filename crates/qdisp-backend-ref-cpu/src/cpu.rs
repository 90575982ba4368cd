use std::collections::BTreeMap;

use qdisp::backend::shape_helpers::{
    broadcast_dims, broadcast_offset, checked_element_count_or_error, contiguous_strides,
    normalize_axis, unravel_index,
};
use qdisp::backend::{
    ArgRole, BackendError, BackendResult, Driver, Memory, MemoryDesc, ReferenceBackend,
    ReferenceKernel, TensorData,
};
use qdisp::graph::{DataType, OpKind, Operation};
use tracing::trace;

use crate::config::RefCpuConfig;
use crate::fill::{arg_rng, fill_source};
use crate::quant::QuantParams;

/// Single-threaded reference backend executing one op at a time on host buffers.
#[derive(Debug, Clone, Default)]
pub struct RefCpuBackend {
    config: RefCpuConfig,
}

impl RefCpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RefCpuConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::with_config(RefCpuConfig::from_env())
    }

    pub fn config(&self) -> &RefCpuConfig {
        &self.config
    }
}

impl ReferenceBackend for RefCpuBackend {
    type Kernel = RefCpuKernel;

    fn backend_name(&self) -> &str {
        "ref-cpu"
    }

    fn create_kernel(&self, op: &Operation) -> BackendResult<Self::Kernel> {
        let driver = Driver::of(op.kind);
        let declared = declare_args(op, driver)?;
        check_data_types(op, driver, &declared)?;
        check_shapes(op, driver, &declared)?;
        trace!(
            op = %op.id,
            kind = %op.kind,
            args = declared.len(),
            "created ref-cpu kernel"
        );
        Ok(RefCpuKernel {
            op: op.clone(),
            driver,
            declared,
            args: BTreeMap::new(),
            seed: self.config.seed,
        })
    }
}

/// Kernel for one operation together with its bound argument buffers.
#[derive(Debug, Clone)]
pub struct RefCpuKernel {
    op: Operation,
    driver: Driver,
    declared: BTreeMap<ArgRole, MemoryDesc>,
    args: BTreeMap<ArgRole, Memory>,
    seed: u64,
}

impl RefCpuKernel {
    /// Descriptor the kernel expects for `role`, if it has such an argument.
    pub fn declared(&self, role: ArgRole) -> Option<&MemoryDesc> {
        self.declared.get(&role)
    }

    pub fn roles(&self) -> impl Iterator<Item = ArgRole> + '_ {
        self.declared.keys().copied()
    }

    fn bound(&self, role: ArgRole) -> BackendResult<&Memory> {
        self.args.get(&role).ok_or_else(|| {
            BackendError::execution(format!(
                "{} kernel: argument `{role}` is not bound",
                self.op.kind
            ))
        })
    }
}

impl ReferenceKernel for RefCpuKernel {
    fn op(&self) -> &Operation {
        &self.op
    }

    fn init_memory_args(&mut self) -> BackendResult<()> {
        let divisor = self.op.kind == OpKind::Divide;
        for (&role, desc) in &self.declared {
            let memory = if role == ArgRole::Dst {
                Memory::zeroed(desc.clone())
            } else {
                let mut rng = arg_rng(self.seed, self.op.id, role);
                fill_source(desc, &mut rng, divisor && role == ArgRole::Src1)?
            };
            self.args.insert(role, memory);
        }
        Ok(())
    }

    fn arg(&self, role: ArgRole) -> Option<&Memory> {
        self.args.get(&role)
    }

    fn replace_arg(&mut self, role: ArgRole, memory: Memory) -> BackendResult<()> {
        let desc = self.declared.get(&role).ok_or_else(|| {
            BackendError::invalid_arguments(self.op.kind, format!("no `{role}` argument"))
        })?;
        if memory.data_type() != desc.data_type {
            return Err(BackendError::invalid_arguments(
                self.op.kind,
                format!(
                    "`{role}` expects {}, got {}",
                    desc.data_type,
                    memory.data_type()
                ),
            ));
        }
        let memory = memory.with_desc(desc.clone())?;
        self.args.insert(role, memory);
        Ok(())
    }

    fn take_arg(&mut self, role: ArgRole) -> Option<Memory> {
        self.args.remove(&role)
    }

    fn execute(&mut self) -> BackendResult<()> {
        let dst_desc = self
            .declared
            .get(&ArgRole::Dst)
            .cloned()
            .ok_or_else(|| BackendError::execution("kernel without a destination"))?;
        let data = match self.driver {
            Driver::Matmul => {
                let bias = self.args.get(&ArgRole::Bias);
                op_matmul(
                    self.bound(ArgRole::Src)?,
                    self.bound(ArgRole::Weights)?,
                    bias,
                    &dst_desc,
                )?
            }
            Driver::Binary => op_binary(
                self.op.kind,
                self.bound(ArgRole::Src)?,
                self.bound(ArgRole::Src1)?,
                &dst_desc,
            )?,
            Driver::Reorder => op_reorder(&self.op, self.bound(ArgRole::Src)?, &dst_desc)?,
            Driver::Transpose => op_transpose(&self.op, self.bound(ArgRole::Src)?, &dst_desc)?,
            Driver::Reshape => self.bound(ArgRole::Src)?.data().convert(dst_desc.data_type),
            Driver::Conv | Driver::Deconv | Driver::Pool | Driver::Other => {
                return Err(BackendError::unimplemented(
                    self.op.kind,
                    "execution not supported in ref-cpu backend",
                ))
            }
        };
        self.args.insert(ArgRole::Dst, Memory::from_data(dst_desc, data)?);
        Ok(())
    }
}

fn declare_args(op: &Operation, driver: Driver) -> BackendResult<BTreeMap<ArgRole, MemoryDesc>> {
    let (min_inputs, max_inputs) = match driver {
        Driver::Conv | Driver::Deconv | Driver::Matmul => (2, 3),
        Driver::Binary => (2, 2),
        Driver::Pool | Driver::Reorder | Driver::Transpose | Driver::Reshape => (1, 1),
        Driver::Other => {
            return Err(BackendError::unimplemented(
                op.kind,
                "no ref-cpu kernel for this op kind",
            ))
        }
    };
    if op.inputs.len() < min_inputs || op.inputs.len() > max_inputs {
        return Err(BackendError::invalid_arguments(
            op.kind,
            format!(
                "expected {min_inputs}..={max_inputs} inputs, got {}",
                op.inputs.len()
            ),
        ));
    }
    let dst = match op.outputs.as_slice() {
        [dst] => dst,
        outputs => {
            return Err(BackendError::invalid_arguments(
                op.kind,
                format!("expected one output, got {}", outputs.len()),
            ))
        }
    };

    let mut declared = BTreeMap::new();
    for (offset, input) in op.inputs.iter().enumerate() {
        let role = driver.input_role(offset).ok_or_else(|| {
            BackendError::invalid_arguments(op.kind, format!("no argument for input {offset}"))
        })?;
        checked_element_count_or_error(&input.dims, || {
            BackendError::invalid_arguments(op.kind, format!("input {offset} is too large"))
        })?;
        let mut desc = MemoryDesc::from(input);
        // Matmul operands are at least 2D: a vector source is one row, a vector weight one column.
        if driver == Driver::Matmul && desc.dims.len() == 1 {
            match role {
                ArgRole::Src => desc.dims.insert(0, 1),
                ArgRole::Weights => desc.dims.push(1),
                _ => {}
            }
        }
        declared.insert(role, desc);
    }
    checked_element_count_or_error(&dst.dims, || {
        BackendError::invalid_arguments(op.kind, "output is too large")
    })?;
    declared.insert(ArgRole::Dst, MemoryDesc::from(dst));
    Ok(declared)
}

fn declared_type(declared: &BTreeMap<ArgRole, MemoryDesc>, role: ArgRole) -> Option<DataType> {
    declared.get(&role).map(|desc| desc.data_type)
}

fn check_data_types(
    op: &Operation,
    driver: Driver,
    declared: &BTreeMap<ArgRole, MemoryDesc>,
) -> BackendResult<()> {
    let unsupported = |reason: String| Err(BackendError::unsupported(op.kind, reason));
    let src = declared_type(declared, ArgRole::Src);
    let dst = declared_type(declared, ArgRole::Dst);
    let (Some(src), Some(dst)) = (src, dst) else {
        return Ok(());
    };

    match driver {
        Driver::Conv | Driver::Deconv | Driver::Matmul => {
            let Some(weights) = declared_type(declared, ArgRole::Weights) else {
                return Ok(());
            };
            if weights == DataType::U8 {
                return unsupported("u8 weights".to_string());
            }
            let pair_ok = matches!(
                (src, weights),
                (DataType::F32, DataType::F32)
                    | (DataType::Bf16, DataType::Bf16)
                    | (DataType::F16, DataType::F16)
                    | (DataType::U8 | DataType::S8, DataType::S8)
            );
            if !pair_ok {
                return unsupported(format!("{src} source with {weights} weights"));
            }
            let dst_ok = if src.is_int8() {
                matches!(
                    dst,
                    DataType::F32 | DataType::Bf16 | DataType::S32 | DataType::S8 | DataType::U8
                )
            } else {
                dst.is_float()
            };
            if !dst_ok {
                return unsupported(format!("{src} source with {dst} destination"));
            }
        }
        Driver::Pool => {
            if src.is_integer() && dst != src {
                return unsupported(format!("{src} pooling into {dst}"));
            }
        }
        Driver::Binary => {
            let src1 = declared_type(declared, ArgRole::Src1).unwrap_or(src);
            if (src.is_integer() || src1.is_integer())
                && matches!(dst, DataType::Bf16 | DataType::F16)
            {
                return unsupported(format!("{src} x {src1} into {dst}"));
            }
        }
        Driver::Reorder => match op.kind {
            OpKind::Quantize if !(src.is_float() && dst.is_int8()) => {
                return unsupported(format!("quantize {src} into {dst}"));
            }
            OpKind::Dequantize
                if !(matches!(src, DataType::S8 | DataType::U8 | DataType::S32)
                    && dst.is_float()) =>
            {
                return unsupported(format!("dequantize {src} into {dst}"));
            }
            OpKind::TypeCast if src.is_integer() && dst.is_integer() => {
                return unsupported(format!("integer cast {src} into {dst}"));
            }
            _ => {}
        },
        Driver::Transpose | Driver::Reshape | Driver::Other => {}
    }
    Ok(())
}

fn check_shapes(
    op: &Operation,
    driver: Driver,
    declared: &BTreeMap<ArgRole, MemoryDesc>,
) -> BackendResult<()> {
    let invalid = |reason: String| Err(BackendError::invalid_arguments(op.kind, reason));
    let (Some(src), Some(dst)) = (declared.get(&ArgRole::Src), declared.get(&ArgRole::Dst)) else {
        return Ok(());
    };

    match driver {
        Driver::Matmul => {
            let Some(weights) = declared.get(&ArgRole::Weights) else {
                return Ok(());
            };
            let Some(out_dims) = matmul_out_dims(&src.dims, &weights.dims) else {
                return invalid(format!(
                    "incompatible operands {:?} x {:?}",
                    src.dims, weights.dims
                ));
            };
            if out_dims.iter().product::<usize>() != dst.element_count() {
                return invalid(format!(
                    "destination {:?} does not hold a {:?} product",
                    dst.dims, out_dims
                ));
            }
            if let Some(bias) = declared.get(&ArgRole::Bias) {
                if broadcast_dims(&out_dims, &bias.dims).as_deref() != Some(out_dims.as_slice()) {
                    return invalid(format!(
                        "bias {:?} does not broadcast to {:?}",
                        bias.dims, out_dims
                    ));
                }
            }
        }
        Driver::Binary => {
            let Some(src1) = declared.get(&ArgRole::Src1) else {
                return Ok(());
            };
            match broadcast_dims(&src.dims, &src1.dims) {
                Some(dims) if dims.iter().product::<usize>() == dst.element_count() => {}
                _ => {
                    return invalid(format!(
                        "{:?} and {:?} do not broadcast to {:?}",
                        src.dims, src1.dims, dst.dims
                    ))
                }
            }
        }
        Driver::Reorder | Driver::Reshape => {
            if src.element_count() != dst.element_count() {
                return invalid(format!("{:?} cannot become {:?}", src.dims, dst.dims));
            }
            if matches!(op.kind, OpKind::Quantize | OpKind::Dequantize) {
                let float_dims = if op.kind == OpKind::Quantize {
                    &src.dims
                } else {
                    &dst.dims
                };
                QuantParams::from_op(op, float_dims)?;
            }
        }
        Driver::Transpose => {
            let order = transpose_order(op, src.dims.len())?;
            let expected: Vec<usize> = order.iter().map(|&axis| src.dims[axis]).collect();
            if expected != dst.dims {
                return invalid(format!(
                    "transposing {:?} by {:?} does not give {:?}",
                    src.dims, order, dst.dims
                ));
            }
        }
        Driver::Conv | Driver::Deconv | Driver::Pool | Driver::Other => {}
    }
    Ok(())
}

/// Normalized `order` attribute; must be a permutation of `0..rank`.
fn transpose_order(op: &Operation, rank: usize) -> BackendResult<Vec<usize>> {
    let order = op
        .attr_s64_vec("order")
        .ok_or_else(|| BackendError::invalid_arguments(op.kind, "missing `order`"))?;
    if order.len() != rank {
        return Err(BackendError::invalid_arguments(
            op.kind,
            format!("order {order:?} does not match rank {rank}"),
        ));
    }
    let mut seen = vec![false; rank];
    let mut normalized = Vec::with_capacity(rank);
    for &axis in order {
        match normalize_axis(axis, rank) {
            Some(axis) if !seen[axis] => {
                seen[axis] = true;
                normalized.push(axis);
            }
            _ => {
                return Err(BackendError::invalid_arguments(
                    op.kind,
                    format!("order {order:?} is not a permutation"),
                ))
            }
        }
    }
    Ok(normalized)
}

/// `[batch.., M, N]` for operands `[batch.., M, K]` and `[batch.., K, N]`.
fn matmul_out_dims(src: &[usize], weights: &[usize]) -> Option<Vec<usize>> {
    if src.len() < 2 || weights.len() < 2 {
        return None;
    }
    let (src_batch, src_mat) = src.split_at(src.len() - 2);
    let (weights_batch, weights_mat) = weights.split_at(weights.len() - 2);
    if src_mat[1] != weights_mat[0] {
        return None;
    }
    let mut out = broadcast_dims(src_batch, weights_batch)?;
    out.push(src_mat[0]);
    out.push(weights_mat[1]);
    Some(out)
}

fn op_matmul(
    src: &Memory,
    weights: &Memory,
    bias: Option<&Memory>,
    dst: &MemoryDesc,
) -> BackendResult<TensorData> {
    let out_dims = matmul_out_dims(src.dims(), weights.dims())
        .ok_or_else(|| BackendError::execution("matmul operand shapes changed after creation"))?;
    let rank = out_dims.len();
    let (m, n) = (out_dims[rank - 2], out_dims[rank - 1]);
    let k = src.dims()[src.dims().len() - 1];
    let batch_dims = &out_dims[..rank - 2];
    let src_batch = &src.dims()[..src.dims().len() - 2];
    let weights_batch = &weights.dims()[..weights.dims().len() - 2];

    let lhs = src.data().to_f64_vec();
    let rhs = weights.data().to_f64_vec();
    let bias_values = bias.map(|bias| (bias.dims(), bias.data().to_f64_vec()));

    let mut output = Vec::with_capacity(dst.element_count());
    for index in 0..out_dims.iter().product::<usize>() {
        let coord = unravel_index(index, &out_dims);
        let batch_coord = &coord[..batch_dims.len()];
        let (row, col) = (coord[rank - 2], coord[rank - 1]);
        let lhs_base = broadcast_offset(batch_coord, src_batch) * m * k;
        let rhs_base = broadcast_offset(batch_coord, weights_batch) * k * n;
        let mut sum = 0.0f64;
        for kk in 0..k {
            sum += lhs[lhs_base + row * k + kk] * rhs[rhs_base + kk * n + col];
        }
        if let Some((dims, values)) = &bias_values {
            sum += values[broadcast_offset(&coord, dims)];
        }
        output.push(sum);
    }
    Ok(TensorData::from_f64(dst.data_type, output))
}

fn op_binary(
    kind: OpKind,
    lhs: &Memory,
    rhs: &Memory,
    dst: &MemoryDesc,
) -> BackendResult<TensorData> {
    let out_dims = broadcast_dims(lhs.dims(), rhs.dims())
        .ok_or_else(|| BackendError::execution("binary operands do not broadcast"))?;
    let a = lhs.data().to_f64_vec();
    let b = rhs.data().to_f64_vec();
    let mut output = Vec::with_capacity(dst.element_count());
    for index in 0..out_dims.iter().product::<usize>() {
        let coord = unravel_index(index, &out_dims);
        let x = a[broadcast_offset(&coord, lhs.dims())];
        let y = b[broadcast_offset(&coord, rhs.dims())];
        let value = match kind {
            OpKind::Add => x + y,
            OpKind::Subtract => x - y,
            OpKind::Multiply => x * y,
            OpKind::Divide => x / y,
            OpKind::Maximum => x.max(y),
            OpKind::Minimum => x.min(y),
            other => {
                return Err(BackendError::unimplemented(
                    other,
                    "not an elementwise binary op",
                ))
            }
        };
        output.push(value);
    }
    Ok(TensorData::from_f64(dst.data_type, output))
}

fn op_reorder(op: &Operation, src: &Memory, dst: &MemoryDesc) -> BackendResult<TensorData> {
    match op.kind {
        OpKind::Quantize => {
            let params = QuantParams::from_op(op, src.dims())?;
            Ok(params.quantize(&src.data().to_f64_vec(), src.dims(), dst.data_type))
        }
        OpKind::Dequantize => {
            let params = QuantParams::from_op(op, &dst.dims)?;
            Ok(params.dequantize(&src.data().to_f64_vec(), &dst.dims, dst.data_type))
        }
        _ => Ok(src.data().convert(dst.data_type)),
    }
}

fn op_transpose(op: &Operation, src: &Memory, dst: &MemoryDesc) -> BackendResult<TensorData> {
    let order = transpose_order(op, src.dims().len())?;
    let values = src.data().to_f64_vec();
    let src_strides = contiguous_strides(src.dims());
    let mut output = Vec::with_capacity(dst.element_count());
    for index in 0..dst.element_count() {
        let out_coord = unravel_index(index, &dst.dims);
        let src_index: usize = out_coord
            .iter()
            .zip(order.iter())
            .map(|(&coord, &axis)| coord * src_strides[axis])
            .sum();
        output.push(values[src_index]);
    }
    Ok(TensorData::from_f64(dst.data_type, output))
}
