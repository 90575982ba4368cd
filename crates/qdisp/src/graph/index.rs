use std::collections::HashMap;

use smallvec::SmallVec;
use thiserror::Error;

use crate::graph::spec::{OpId, Operation, TensorId};

/// Lookup tables over a chronologically ordered operation arena.
///
/// Every entry is an arena position, never a reference, so the index stays valid for as long
/// as the arena it was built from is left untouched.
#[derive(Debug, Clone, Default)]
pub struct GraphIndex {
    pos_of: HashMap<OpId, usize>,
    producer_of: HashMap<TensorId, usize>,
    consumers: HashMap<TensorId, SmallVec<[usize; 4]>>,
}

impl GraphIndex {
    /// Builds indices for `ops` and validates id uniqueness and chronological order.
    pub fn build(ops: &[Operation]) -> Result<Self, GraphError> {
        let mut pos_of = HashMap::with_capacity(ops.len());
        let mut producer_of = HashMap::new();
        let mut consumers: HashMap<TensorId, SmallVec<[usize; 4]>> = HashMap::new();

        for (pos, op) in ops.iter().enumerate() {
            if pos_of.insert(op.id, pos).is_some() {
                return Err(GraphError::DuplicateOp { op: op.id });
            }
            for output in &op.outputs {
                if producer_of.insert(output.id, pos).is_some() {
                    return Err(GraphError::DuplicateProducer {
                        tensor: output.id,
                        op: op.id,
                    });
                }
            }
        }

        for (pos, op) in ops.iter().enumerate() {
            for input in &op.inputs {
                if let Some(&producer) = producer_of.get(&input.id) {
                    if producer >= pos {
                        return Err(GraphError::NotChronological {
                            tensor: input.id,
                            consumer: op.id,
                            producer: ops[producer].id,
                        });
                    }
                }
                let users = consumers.entry(input.id).or_default();
                if users.last() != Some(&pos) {
                    users.push(pos);
                }
            }
        }

        Ok(Self {
            pos_of,
            producer_of,
            consumers,
        })
    }

    /// Arena position of the operation with the given id.
    pub fn position(&self, op: OpId) -> Option<usize> {
        self.pos_of.get(&op).copied()
    }

    /// Arena position of the operation producing `tensor`; `None` marks a graph-level input.
    pub fn producer_position(&self, tensor: TensorId) -> Option<usize> {
        self.producer_of.get(&tensor).copied()
    }

    /// Arena positions of the operations consuming `tensor`, in chronological order.
    pub fn consumer_positions(&self, tensor: TensorId) -> &[usize] {
        self.consumers
            .get(&tensor)
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.pos_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pos_of.is_empty()
    }
}

/// Errors surfaced while building or parsing a graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("operation id {op} appears more than once")]
    DuplicateOp { op: OpId },
    #[error("tensor {tensor} is produced twice (second producer {op})")]
    DuplicateProducer { tensor: TensorId, op: OpId },
    #[error("{consumer} consumes {tensor} before its producer {producer}")]
    NotChronological {
        tensor: TensorId,
        consumer: OpId,
        producer: OpId,
    },
    #[error("unknown op kind `{name}`")]
    UnknownOpKind { name: String },
    #[error("unknown data type `{name}`")]
    UnknownDataType { name: String },
}
