//! Host memory buffers exchanged with reference backends.

use half::{bf16, f16};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::{DataType, LogicalTensor};

/// Data type and dense row-major dimensions of a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryDesc {
    pub data_type: DataType,
    pub dims: Vec<usize>,
}

impl MemoryDesc {
    pub fn new(data_type: DataType, dims: &[usize]) -> Self {
        Self {
            data_type,
            dims: dims.to_vec(),
        }
    }

    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn byte_len(&self) -> usize {
        self.element_count() * self.data_type.size_in_bytes()
    }
}

impl From<&LogicalTensor> for MemoryDesc {
    fn from(tensor: &LogicalTensor) -> Self {
        Self::new(tensor.data_type, &tensor.dims)
    }
}

/// Typed element storage.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    Bf16(Vec<bf16>),
    F16(Vec<f16>),
    S32(Vec<i32>),
    S8(Vec<i8>),
    U8(Vec<u8>),
}

impl TensorData {
    pub fn zeroed(data_type: DataType, len: usize) -> Self {
        match data_type {
            DataType::F32 => TensorData::F32(vec![0.0; len]),
            DataType::Bf16 => TensorData::Bf16(vec![bf16::ZERO; len]),
            DataType::F16 => TensorData::F16(vec![f16::ZERO; len]),
            DataType::S32 => TensorData::S32(vec![0; len]),
            DataType::S8 => TensorData::S8(vec![0; len]),
            DataType::U8 => TensorData::U8(vec![0; len]),
        }
    }

    /// Converts `values` into `data_type`, rounding half to even and saturating integers.
    pub fn from_f64(data_type: DataType, values: impl IntoIterator<Item = f64>) -> Self {
        let values = values.into_iter();
        match data_type {
            DataType::F32 => TensorData::F32(values.map(|v| v as f32).collect()),
            DataType::Bf16 => TensorData::Bf16(values.map(bf16::from_f64).collect()),
            DataType::F16 => TensorData::F16(values.map(f16::from_f64).collect()),
            DataType::S32 => {
                TensorData::S32(values.map(|v| saturate(v, DataType::S32) as i32).collect())
            }
            DataType::S8 => {
                TensorData::S8(values.map(|v| saturate(v, DataType::S8) as i8).collect())
            }
            DataType::U8 => {
                TensorData::U8(values.map(|v| saturate(v, DataType::U8) as u8).collect())
            }
        }
    }

    pub fn from_f32(data_type: DataType, values: &[f32]) -> Self {
        Self::from_f64(data_type, values.iter().map(|&v| f64::from(v)))
    }

    pub fn data_type(&self) -> DataType {
        match self {
            TensorData::F32(_) => DataType::F32,
            TensorData::Bf16(_) => DataType::Bf16,
            TensorData::F16(_) => DataType::F16,
            TensorData::S32(_) => DataType::S32,
            TensorData::S8(_) => DataType::S8,
            TensorData::U8(_) => DataType::U8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(values) => values.len(),
            TensorData::Bf16(values) => values.len(),
            TensorData::F16(values) => values.len(),
            TensorData::S32(values) => values.len(),
            TensorData::S8(values) => values.len(),
            TensorData::U8(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widens every element to `f64`; exact for all supported types.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            TensorData::F32(values) => values.iter().map(|&v| f64::from(v)).collect(),
            TensorData::Bf16(values) => values.iter().map(|v| v.to_f64()).collect(),
            TensorData::F16(values) => values.iter().map(|v| v.to_f64()).collect(),
            TensorData::S32(values) => values.iter().map(|&v| f64::from(v)).collect(),
            TensorData::S8(values) => values.iter().map(|&v| f64::from(v)).collect(),
            TensorData::U8(values) => values.iter().map(|&v| f64::from(v)).collect(),
        }
    }

    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self {
            TensorData::F32(values) => values.clone(),
            other => other.to_f64_vec().into_iter().map(|v| v as f32).collect(),
        }
    }

    /// Returns a copy converted to `data_type`.
    pub fn convert(&self, data_type: DataType) -> Self {
        if self.data_type() == data_type {
            return self.clone();
        }
        Self::from_f64(data_type, self.to_f64_vec())
    }
}

fn saturate(value: f64, data_type: DataType) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    let rounded = value.round_ties_even();
    match data_type.range() {
        Some((lo, hi)) => rounded.clamp(lo as f64, hi as f64),
        None => rounded,
    }
}

/// Dense buffer bound to a kernel argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Memory {
    desc: MemoryDesc,
    data: TensorData,
}

impl Memory {
    pub fn zeroed(desc: MemoryDesc) -> Self {
        let data = TensorData::zeroed(desc.data_type, desc.element_count());
        Self { desc, data }
    }

    pub fn from_data(desc: MemoryDesc, data: TensorData) -> Result<Self, MemoryError> {
        if data.data_type() != desc.data_type {
            return Err(MemoryError::DataTypeMismatch {
                expected: desc.data_type,
                actual: data.data_type(),
            });
        }
        if data.len() != desc.element_count() {
            return Err(MemoryError::ElementCountMismatch {
                expected: desc.element_count(),
                actual: data.len(),
            });
        }
        Ok(Self { desc, data })
    }

    pub fn from_f32(desc: MemoryDesc, values: &[f32]) -> Result<Self, MemoryError> {
        let data = TensorData::from_f32(desc.data_type, values);
        Self::from_data(desc, data)
    }

    pub fn desc(&self) -> &MemoryDesc {
        &self.desc
    }

    pub fn data_type(&self) -> DataType {
        self.desc.data_type
    }

    pub fn dims(&self) -> &[usize] {
        &self.desc.dims
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn element_count(&self) -> usize {
        self.data.len()
    }

    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.data.to_f32_vec()
    }

    pub fn into_data(self) -> TensorData {
        self.data
    }

    /// Rebinds the buffer to `desc`, keeping element order.
    ///
    /// Dimensions may change freely as long as the element count is preserved (a kernel may
    /// describe the same data with inserted unit dimensions). A data type change converts.
    pub fn with_desc(self, desc: MemoryDesc) -> Result<Self, MemoryError> {
        if desc.element_count() != self.data.len() {
            return Err(MemoryError::ElementCountMismatch {
                expected: desc.element_count(),
                actual: self.data.len(),
            });
        }
        let data = if desc.data_type == self.data.data_type() {
            self.data
        } else {
            self.data.convert(desc.data_type)
        };
        Ok(Self { desc, data })
    }

    /// Overwrites this buffer with `src`, converting into this buffer's data type.
    pub fn reorder_from(&mut self, src: &Memory) -> Result<(), MemoryError> {
        if src.element_count() != self.desc.element_count() {
            return Err(MemoryError::ElementCountMismatch {
                expected: self.desc.element_count(),
                actual: src.element_count(),
            });
        }
        self.data = src.data.convert(self.desc.data_type);
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("element count mismatch: expected {expected}, got {actual}")]
    ElementCountMismatch { expected: usize, actual: usize },
    #[error("data type mismatch: expected {expected}, got {actual}")]
    DataTypeMismatch { expected: DataType, actual: DataType },
}
