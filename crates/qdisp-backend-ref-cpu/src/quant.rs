use qdisp::backend::shape_helpers::{contiguous_strides, normalize_axis};
use qdisp::backend::{BackendError, BackendResult, TensorData};
use qdisp::graph::{DataType, Operation};

/// Static quantization parameters read from a quantize/dequantize op.
///
/// Attributes: `qtype` (`"per_tensor"` by default, or `"per_channel"`), `axis` (default 1),
/// `scales` and optional `zps` (zeros when absent).
#[derive(Debug, Clone, PartialEq)]
pub struct QuantParams {
    pub axis: Option<usize>,
    pub scales: Vec<f32>,
    pub zps: Vec<i64>,
}

impl QuantParams {
    /// Reads and validates the parameters against the float-side tensor `dims`.
    pub fn from_op(op: &Operation, dims: &[usize]) -> BackendResult<Self> {
        let scales = op
            .attr_f32_vec("scales")
            .ok_or_else(|| BackendError::invalid_arguments(op.kind, "missing `scales`"))?
            .to_vec();
        if scales.iter().any(|scale| !scale.is_finite() || *scale == 0.0) {
            return Err(BackendError::invalid_arguments(
                op.kind,
                "scales must be finite and non-zero",
            ));
        }

        let axis = match op.attr_str("qtype").unwrap_or("per_tensor") {
            "per_tensor" => None,
            "per_channel" => {
                let axis = op.attr_s64("axis").unwrap_or(1);
                let axis = normalize_axis(axis, dims.len()).ok_or_else(|| {
                    BackendError::invalid_arguments(
                        op.kind,
                        format!("axis {axis} out of range for rank {}", dims.len()),
                    )
                })?;
                Some(axis)
            }
            other => {
                return Err(BackendError::invalid_arguments(
                    op.kind,
                    format!("unknown qtype `{other}`"),
                ))
            }
        };
        let channels = axis.map_or(1, |axis| dims[axis]);
        if scales.len() != channels {
            return Err(BackendError::invalid_arguments(
                op.kind,
                format!("expected {channels} scales, got {}", scales.len()),
            ));
        }

        let zps = match op.attr_s64_vec("zps") {
            Some(zps) if zps.len() == channels => zps.to_vec(),
            Some(zps) => {
                return Err(BackendError::invalid_arguments(
                    op.kind,
                    format!("expected {channels} zero points, got {}", zps.len()),
                ))
            }
            None => vec![0; channels],
        };

        Ok(Self { axis, scales, zps })
    }

    /// `(stride, channels)` of the per-channel axis.
    fn channel_layout(&self, dims: &[usize]) -> Option<(usize, usize)> {
        self.axis.map(|axis| (contiguous_strides(dims)[axis], dims[axis]))
    }

    /// `dst = saturate(round(src / scale) + zp)`.
    pub fn quantize(&self, src: &[f64], dims: &[usize], dst: DataType) -> TensorData {
        let layout = self.channel_layout(dims);
        let values = src.iter().enumerate().map(|(index, &value)| {
            let channel = channel_of(index, layout);
            let scale = f64::from(self.scales[channel]);
            (value / scale).round_ties_even() + self.zps[channel] as f64
        });
        TensorData::from_f64(dst, values)
    }

    /// `dst = (src - zp) * scale`.
    pub fn dequantize(&self, src: &[f64], dims: &[usize], dst: DataType) -> TensorData {
        let layout = self.channel_layout(dims);
        let values = src.iter().enumerate().map(|(index, &value)| {
            let channel = channel_of(index, layout);
            (value - self.zps[channel] as f64) * f64::from(self.scales[channel])
        });
        TensorData::from_f64(dst, values)
    }
}

fn channel_of(index: usize, layout: Option<(usize, usize)>) -> usize {
    match layout {
        Some((stride, channels)) => (index / stride) % channels,
        None => 0,
    }
}
