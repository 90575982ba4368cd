use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::graph::index::GraphError;

/// Enumerates scalar element types a logical tensor may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    F32,
    Bf16,
    F16,
    S32,
    S8,
    U8,
}

impl DataType {
    /// Canonical lower-case name (`"f32"`, `"u8"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::F32 => "f32",
            DataType::Bf16 => "bf16",
            DataType::F16 => "f16",
            DataType::S32 => "s32",
            DataType::S8 => "s8",
            DataType::U8 => "u8",
        }
    }

    /// Returns `true` for signed and unsigned integer types.
    pub fn is_integer(self) -> bool {
        matches!(self, DataType::S32 | DataType::S8 | DataType::U8)
    }

    /// Returns `true` for the 8-bit quantized storage types.
    pub fn is_int8(self) -> bool {
        matches!(self, DataType::S8 | DataType::U8)
    }

    /// Returns `true` for floating-point types.
    pub fn is_float(self) -> bool {
        matches!(self, DataType::F32 | DataType::Bf16 | DataType::F16)
    }

    pub fn size_in_bytes(self) -> usize {
        match self {
            DataType::F32 | DataType::S32 => 4,
            DataType::Bf16 | DataType::F16 => 2,
            DataType::S8 | DataType::U8 => 1,
        }
    }

    /// Representable value range for integer types.
    pub fn range(self) -> Option<(i64, i64)> {
        match self {
            DataType::S32 => Some((i32::MIN as i64, i32::MAX as i64)),
            DataType::S8 => Some((i8::MIN as i64, i8::MAX as i64)),
            DataType::U8 => Some((u8::MIN as i64, u8::MAX as i64)),
            DataType::F32 | DataType::Bf16 | DataType::F16 => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "f32" => Ok(DataType::F32),
            "bf16" => Ok(DataType::Bf16),
            "f16" => Ok(DataType::F16),
            "s32" => Ok(DataType::S32),
            "s8" => Ok(DataType::S8),
            "u8" => Ok(DataType::U8),
            other => Err(GraphError::UnknownDataType {
                name: other.to_string(),
            }),
        }
    }
}

/// Identity of a logical tensor, unique within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TensorId(pub usize);

/// Identity of an operation, unique within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId(pub usize);

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Immutable value descriptor of a tensor flowing through the graph. Not a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalTensor {
    pub id: TensorId,
    pub data_type: DataType,
    pub dims: Vec<usize>,
}

impl LogicalTensor {
    pub fn new(id: TensorId, data_type: DataType, dims: impl Into<Vec<usize>>) -> Self {
        Self {
            id,
            data_type,
            dims: dims.into(),
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }
}

/// Operation kinds understood by the graph model.
///
/// Names follow the canonical graph op vocabulary (`"MatMul"`, `"StaticTranspose"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpKind {
    Abs,
    Add,
    AvgPool,
    BatchNormInference,
    BiasAdd,
    Clamp,
    Concat,
    Convolution,
    ConvTranspose,
    Dequantize,
    Divide,
    DynamicDequantize,
    DynamicQuantize,
    Elu,
    Exp,
    Gelu,
    HardSwish,
    Interpolate,
    LayerNorm,
    LeakyRelu,
    Log,
    MatMul,
    Maximum,
    MaxPool,
    Minimum,
    Multiply,
    Pow,
    Quantize,
    ReduceMax,
    ReduceMean,
    ReduceSum,
    Relu,
    Reorder,
    Select,
    Sigmoid,
    SoftMax,
    Sqrt,
    Square,
    StaticReshape,
    StaticTranspose,
    Subtract,
    Tanh,
    TypeCast,
    Wildcard,
}

impl OpKind {
    const NAMES: [(OpKind, &'static str); 44] = [
        (OpKind::Abs, "Abs"),
        (OpKind::Add, "Add"),
        (OpKind::AvgPool, "AvgPool"),
        (OpKind::BatchNormInference, "BatchNormInference"),
        (OpKind::BiasAdd, "BiasAdd"),
        (OpKind::Clamp, "Clamp"),
        (OpKind::Concat, "Concat"),
        (OpKind::Convolution, "Convolution"),
        (OpKind::ConvTranspose, "ConvTranspose"),
        (OpKind::Dequantize, "Dequantize"),
        (OpKind::Divide, "Divide"),
        (OpKind::DynamicDequantize, "DynamicDequantize"),
        (OpKind::DynamicQuantize, "DynamicQuantize"),
        (OpKind::Elu, "Elu"),
        (OpKind::Exp, "Exp"),
        (OpKind::Gelu, "GELU"),
        (OpKind::HardSwish, "HardSwish"),
        (OpKind::Interpolate, "Interpolate"),
        (OpKind::LayerNorm, "LayerNorm"),
        (OpKind::LeakyRelu, "LeakyReLU"),
        (OpKind::Log, "Log"),
        (OpKind::MatMul, "MatMul"),
        (OpKind::Maximum, "Maximum"),
        (OpKind::MaxPool, "MaxPool"),
        (OpKind::Minimum, "Minimum"),
        (OpKind::Multiply, "Multiply"),
        (OpKind::Pow, "Pow"),
        (OpKind::Quantize, "Quantize"),
        (OpKind::ReduceMax, "ReduceMax"),
        (OpKind::ReduceMean, "ReduceMean"),
        (OpKind::ReduceSum, "ReduceSum"),
        (OpKind::Relu, "ReLU"),
        (OpKind::Reorder, "Reorder"),
        (OpKind::Select, "Select"),
        (OpKind::Sigmoid, "Sigmoid"),
        (OpKind::SoftMax, "SoftMax"),
        (OpKind::Sqrt, "Sqrt"),
        (OpKind::Square, "Square"),
        (OpKind::StaticReshape, "StaticReshape"),
        (OpKind::StaticTranspose, "StaticTranspose"),
        (OpKind::Subtract, "Subtract"),
        (OpKind::Tanh, "Tanh"),
        (OpKind::TypeCast, "TypeCast"),
        (OpKind::Wildcard, "Wildcard"),
    ];

    /// Canonical op kind string.
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Abs => "Abs",
            OpKind::Add => "Add",
            OpKind::AvgPool => "AvgPool",
            OpKind::BatchNormInference => "BatchNormInference",
            OpKind::BiasAdd => "BiasAdd",
            OpKind::Clamp => "Clamp",
            OpKind::Concat => "Concat",
            OpKind::Convolution => "Convolution",
            OpKind::ConvTranspose => "ConvTranspose",
            OpKind::Dequantize => "Dequantize",
            OpKind::Divide => "Divide",
            OpKind::DynamicDequantize => "DynamicDequantize",
            OpKind::DynamicQuantize => "DynamicQuantize",
            OpKind::Elu => "Elu",
            OpKind::Exp => "Exp",
            OpKind::Gelu => "GELU",
            OpKind::HardSwish => "HardSwish",
            OpKind::Interpolate => "Interpolate",
            OpKind::LayerNorm => "LayerNorm",
            OpKind::LeakyRelu => "LeakyReLU",
            OpKind::Log => "Log",
            OpKind::MatMul => "MatMul",
            OpKind::Maximum => "Maximum",
            OpKind::MaxPool => "MaxPool",
            OpKind::Minimum => "Minimum",
            OpKind::Multiply => "Multiply",
            OpKind::Pow => "Pow",
            OpKind::Quantize => "Quantize",
            OpKind::ReduceMax => "ReduceMax",
            OpKind::ReduceMean => "ReduceMean",
            OpKind::ReduceSum => "ReduceSum",
            OpKind::Relu => "ReLU",
            OpKind::Reorder => "Reorder",
            OpKind::Select => "Select",
            OpKind::Sigmoid => "Sigmoid",
            OpKind::SoftMax => "SoftMax",
            OpKind::Sqrt => "Sqrt",
            OpKind::Square => "Square",
            OpKind::StaticReshape => "StaticReshape",
            OpKind::StaticTranspose => "StaticTranspose",
            OpKind::Subtract => "Subtract",
            OpKind::Tanh => "Tanh",
            OpKind::TypeCast => "TypeCast",
            OpKind::Wildcard => "Wildcard",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::NAMES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(kind, _)| *kind)
            .ok_or_else(|| GraphError::UnknownOpKind {
                name: s.to_string(),
            })
    }
}

impl Serialize for OpKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OpKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Attribute payload attached to an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    F32(f32),
    S64(i64),
    F32Vec(Vec<f32>),
    S64Vec(Vec<i64>),
    Str(String),
    Bool(bool),
}

/// Ordered attribute mapping keyed by attribute name.
pub type Attributes = BTreeMap<String, AttrValue>;

/// Single node of the graph: kind, ordered tensor descriptors and attributes.
///
/// Operations are plain values; rewriting one (e.g. for reverse execution) always happens on a
/// clone and never touches the graph's own record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OpId,
    pub kind: OpKind,
    pub inputs: Vec<LogicalTensor>,
    pub outputs: Vec<LogicalTensor>,
    #[serde(default)]
    pub attrs: Attributes,
}

impl Operation {
    pub fn new(id: OpId, kind: OpKind) -> Self {
        Self {
            id,
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
            attrs: Attributes::new(),
        }
    }

    pub fn with_inputs(mut self, inputs: impl Into<Vec<LogicalTensor>>) -> Self {
        self.inputs = inputs.into();
        self
    }

    pub fn with_outputs(mut self, outputs: impl Into<Vec<LogicalTensor>>) -> Self {
        self.outputs = outputs.into();
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.insert(name.into(), value);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    pub fn attr_s64(&self, name: &str) -> Option<i64> {
        match self.attrs.get(name) {
            Some(AttrValue::S64(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn attr_s64_vec(&self, name: &str) -> Option<&[i64]> {
        match self.attrs.get(name) {
            Some(AttrValue::S64Vec(values)) => Some(values),
            _ => None,
        }
    }

    pub fn attr_f32_vec(&self, name: &str) -> Option<&[f32]> {
        match self.attrs.get(name) {
            Some(AttrValue::F32Vec(values)) => Some(values),
            _ => None,
        }
    }

    pub fn attr_str(&self, name: &str) -> Option<&str> {
        match self.attrs.get(name) {
            Some(AttrValue::Str(value)) => Some(value),
            _ => None,
        }
    }
}
