use crate::graph::OpKind;

/// Numerically significant ops whose inputs receive quantization-aware data.
pub const MAIN_OP_KINDS: [OpKind; 11] = [
    OpKind::Convolution,
    OpKind::ConvTranspose,
    OpKind::AvgPool,
    OpKind::MaxPool,
    OpKind::MatMul,
    OpKind::Add,
    OpKind::Divide,
    OpKind::Maximum,
    OpKind::Minimum,
    OpKind::Multiply,
    OpKind::Subtract,
];

/// Ops a boundary search may walk through: layout/type packaging and quantization mapping.
pub const GO_THROUGH_OP_KINDS: [OpKind; 5] = [
    OpKind::StaticTranspose,
    OpKind::StaticReshape,
    OpKind::TypeCast,
    OpKind::Quantize,
    OpKind::Dequantize,
];

pub fn is_main_op(kind: OpKind) -> bool {
    MAIN_OP_KINDS.contains(&kind)
}

pub fn is_go_through_op(kind: OpKind) -> bool {
    GO_THROUGH_OP_KINDS.contains(&kind)
}
