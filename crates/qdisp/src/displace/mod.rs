//! Quantization boundary displacement.
//!
//! Filling partition inputs with arbitrary values produces data that, once dequantized, falls
//! outside the range the low-precision compute op was calibrated for. This module finds the
//! dequantize boundaries in front of every main compute op ([`BoundaryScanner`]) and, per
//! external input, synthesizes range-correct data at the compute op and replays the chain of
//! transparent ops backwards to the partition input ([`PartitionDataDisplacer`]).

pub mod displacer;
pub mod filling;
pub mod kinds;
pub mod reverse;
pub mod scanner;

use thiserror::Error;

use crate::backend::{ArgRole, BackendError, BackendResult, MemoryError};
use crate::graph::{OpId, OpKind};

pub use displacer::{DisplacerBuilder, Displacement, PartitionDataDisplacer};
pub use filling::{quantize_filling_op, synthesize};
pub use kinds::{is_go_through_op, is_main_op, GO_THROUGH_OP_KINDS, MAIN_OP_KINDS};
pub use reverse::{
    invert_operation, invert_permutation, replay_upstream, Replay, ReplayOutcome, ReplayStep,
};
pub use scanner::{BoundaryMap, BoundaryRecord, BoundaryScanner};

/// Errors that fail a displacement.
#[derive(Debug, Error)]
pub enum DisplaceError {
    #[error("displacer was built without a graph")]
    MissingGraph,
    #[error("{kind} has no kernel argument for input offset {offset}")]
    NoArgRole { kind: OpKind, offset: usize },
    #[error("kernel for {kind} did not provide a `{role}` argument")]
    MissingArgument { kind: OpKind, role: ArgRole },
    /// A chain handed to reverse execution contains an op that has no inverse.
    #[error("{op} ({kind}) cannot be executed in reverse")]
    InvariantViolation { op: OpId, kind: OpKind },
    #[error("{op} has an invalid `{name}` attribute: {reason}")]
    InvalidAttribute {
        op: OpId,
        name: &'static str,
        reason: String,
    },
    #[error("{op} is malformed: {reason}")]
    MalformedOp { op: OpId, reason: &'static str },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl DisplaceError {
    /// Returns `true` when scanner and replay disagree about which ops form a chain.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, DisplaceError::InvariantViolation { .. })
    }
}

/// Result of a backend call that may be declined without failing.
#[derive(Debug)]
pub enum BackendAttempt<T> {
    Ready(T),
    /// Unsupported or unimplemented configuration.
    Declined(BackendError),
}

impl<T> BackendAttempt<T> {
    /// Splits skip-worthy backend errors from hard failures.
    pub fn classify(result: BackendResult<T>) -> Result<Self, DisplaceError> {
        match result {
            Ok(value) => Ok(BackendAttempt::Ready(value)),
            Err(err) if err.is_skip() => Ok(BackendAttempt::Declined(err)),
            Err(err) => Err(err.into()),
        }
    }
}
