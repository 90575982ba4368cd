//! Read-only graph model consumed by the boundary scanner and the displacer.
//!
//! A [`Graph`] owns its operations in a stable arena sorted in chronological order (every op
//! appears after the producers of the tensors it consumes). All cross references go through
//! the [`GraphIndex`], which maps ids to arena positions, so no walk ever holds a live alias
//! into a container that could change underneath it.

pub mod builder;
pub mod index;
pub mod partition;
pub mod spec;

pub use builder::{GraphBuilder, TensorDesc};
pub use index::{GraphError, GraphIndex};
pub use partition::Partition;
pub use spec::{
    AttrValue, Attributes, DataType, LogicalTensor, OpId, OpKind, Operation, TensorId,
};

/// Chronologically ordered operation list plus its lookup index.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    ops: Vec<Operation>,
    index: GraphIndex,
}

impl Graph {
    /// Validates `ops` and builds the lookup index.
    pub fn new(ops: Vec<Operation>) -> Result<Self, GraphError> {
        let index = GraphIndex::build(&ops)?;
        Ok(Self { ops, index })
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn op(&self, id: OpId) -> Option<&Operation> {
        self.index.position(id).map(|pos| &self.ops[pos])
    }

    /// Returns the operation producing `tensor`, or `None` when it is a graph-level input.
    pub fn producer_of(&self, tensor: TensorId) -> Option<&Operation> {
        self.index
            .producer_position(tensor)
            .map(|pos| &self.ops[pos])
    }

    /// Returns the operations consuming `tensor`, in chronological order.
    pub fn consumers_of(&self, tensor: TensorId) -> impl Iterator<Item = &Operation> + '_ {
        self.index
            .consumer_positions(tensor)
            .iter()
            .map(move |&pos| &self.ops[pos])
    }

    pub fn index(&self) -> &GraphIndex {
        &self.index
    }
}
