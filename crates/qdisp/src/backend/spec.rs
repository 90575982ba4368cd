use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::memory::{Memory, MemoryError};
use crate::graph::{OpKind, Operation};

/// Runtime argument a kernel buffer is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArgRole {
    /// First (or only) source operand.
    Src,
    /// Second operand of a binary kernel.
    Src1,
    Weights,
    Bias,
    Dst,
}

impl ArgRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ArgRole::Src => "src",
            ArgRole::Src1 => "src1",
            ArgRole::Weights => "weights",
            ArgRole::Bias => "bias",
            ArgRole::Dst => "dst",
        }
    }
}

impl fmt::Display for ArgRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kernel family a graph op lowers to in a reference backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Driver {
    Conv,
    Deconv,
    Pool,
    Matmul,
    Binary,
    Reorder,
    Transpose,
    Reshape,
    Other,
}

impl Driver {
    pub fn of(kind: OpKind) -> Self {
        match kind {
            OpKind::Convolution => Driver::Conv,
            OpKind::ConvTranspose => Driver::Deconv,
            OpKind::AvgPool | OpKind::MaxPool => Driver::Pool,
            OpKind::MatMul => Driver::Matmul,
            OpKind::Add
            | OpKind::Divide
            | OpKind::Maximum
            | OpKind::Minimum
            | OpKind::Multiply
            | OpKind::Subtract => Driver::Binary,
            OpKind::Quantize | OpKind::Dequantize | OpKind::TypeCast | OpKind::Reorder => {
                Driver::Reorder
            }
            OpKind::StaticTranspose => Driver::Transpose,
            OpKind::StaticReshape => Driver::Reshape,
            _ => Driver::Other,
        }
    }

    /// Maps an op input offset to the kernel argument it feeds.
    pub fn input_role(self, offset: usize) -> Option<ArgRole> {
        match (self, offset) {
            (Driver::Conv | Driver::Deconv | Driver::Matmul, 0) => Some(ArgRole::Src),
            (Driver::Conv | Driver::Deconv | Driver::Matmul, 1) => Some(ArgRole::Weights),
            (Driver::Conv | Driver::Deconv | Driver::Matmul, 2) => Some(ArgRole::Bias),
            (Driver::Binary, 0) => Some(ArgRole::Src),
            (Driver::Binary, 1) => Some(ArgRole::Src1),
            (Driver::Pool | Driver::Reorder | Driver::Transpose | Driver::Reshape, 0) => {
                Some(ArgRole::Src)
            }
            _ => None,
        }
    }
}

/// Backend error surfaced to the displacer.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The data type / device configuration is not supported.
    #[error("{op} configuration unsupported: {reason}")]
    Unsupported { op: OpKind, reason: String },
    /// The backend has no implementation for the request.
    #[error("{op} is not implemented: {reason}")]
    Unimplemented { op: OpKind, reason: String },
    #[error("invalid arguments for {op}: {reason}")]
    InvalidArguments { op: OpKind, reason: String },
    #[error("backend execution failure: {message}")]
    Execution { message: String },
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl BackendError {
    pub fn unsupported(op: OpKind, reason: impl Into<String>) -> Self {
        BackendError::Unsupported {
            op,
            reason: reason.into(),
        }
    }

    pub fn unimplemented(op: OpKind, reason: impl Into<String>) -> Self {
        BackendError::Unimplemented {
            op,
            reason: reason.into(),
        }
    }

    pub fn invalid_arguments(op: OpKind, reason: impl Into<String>) -> Self {
        BackendError::InvalidArguments {
            op,
            reason: reason.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        BackendError::Execution {
            message: message.into(),
        }
    }

    /// Returns `true` when the backend declined the request rather than failing it.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            BackendError::Unsupported { .. } | BackendError::Unimplemented { .. }
        )
    }
}

/// Convenience alias for results returned by backend routines.
pub type BackendResult<T> = Result<T, BackendError>;

/// Reference execution backend that turns single operation descriptions into kernels.
pub trait ReferenceBackend {
    type Kernel: ReferenceKernel;

    /// Returns a human-readable backend identifier (e.g. `"ref-cpu"`).
    fn backend_name(&self) -> &str;

    /// Builds a runnable kernel for `op`.
    ///
    /// Fails with [`BackendError::Unsupported`] or [`BackendError::Unimplemented`] when the
    /// backend cannot serve the configuration, and [`BackendError::InvalidArguments`] when the
    /// description itself is malformed.
    fn create_kernel(&self, op: &Operation) -> BackendResult<Self::Kernel>;
}

/// Kernel created by a [`ReferenceBackend`] with its argument buffers.
pub trait ReferenceKernel {
    /// The operation description the kernel was created from.
    fn op(&self) -> &Operation;

    /// Allocates every declared argument and fills sources with reference data.
    fn init_memory_args(&mut self) -> BackendResult<()>;

    fn arg(&self, role: ArgRole) -> Option<&Memory>;

    /// Rebinds `role` to `memory`; the buffer must match the declared argument's size.
    fn replace_arg(&mut self, role: ArgRole, memory: Memory) -> BackendResult<()>;

    /// Moves the buffer bound to `role` out of the kernel.
    fn take_arg(&mut self, role: ArgRole) -> Option<Memory>;

    fn execute(&mut self) -> BackendResult<()>;
}

impl<B: ReferenceBackend + ?Sized> ReferenceBackend for &B {
    type Kernel = B::Kernel;

    fn backend_name(&self) -> &str {
        (**self).backend_name()
    }

    fn create_kernel(&self, op: &Operation) -> BackendResult<Self::Kernel> {
        (**self).create_kernel(op)
    }
}
