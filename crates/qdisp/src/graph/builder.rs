use crate::graph::index::GraphError;
use crate::graph::spec::{Attributes, DataType, LogicalTensor, OpId, OpKind, Operation, TensorId};
use crate::graph::Graph;

/// Data type and dimensions of a tensor that does not have an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDesc {
    pub data_type: DataType,
    pub dims: Vec<usize>,
}

impl TensorDesc {
    pub fn new(data_type: DataType, dims: &[usize]) -> Self {
        Self {
            data_type,
            dims: dims.to_vec(),
        }
    }
}

/// Lightweight builder for constructing graphs programmatically.
///
/// Ops are recorded in emission order, which is chronological by construction as long as
/// every input comes from [`GraphBuilder::input`] or a previous `emit*` call.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    next_tensor: usize,
    next_op: usize,
    ops: Vec<Operation>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a graph-level input tensor (one without a producer).
    pub fn input(&mut self, data_type: DataType, dims: &[usize]) -> LogicalTensor {
        let id = self.allocate_tensor();
        LogicalTensor::new(id, data_type, dims)
    }

    /// Appends an operation and returns its id together with its freshly allocated outputs.
    pub fn emit(
        &mut self,
        kind: OpKind,
        inputs: &[&LogicalTensor],
        outputs: Vec<TensorDesc>,
        attrs: Attributes,
    ) -> (OpId, Vec<LogicalTensor>) {
        let id = OpId(self.next_op);
        self.next_op += 1;
        let outputs: Vec<LogicalTensor> = outputs
            .into_iter()
            .map(|desc| LogicalTensor::new(self.allocate_tensor(), desc.data_type, desc.dims))
            .collect();
        self.ops.push(Operation {
            id,
            kind,
            inputs: inputs.iter().map(|tensor| (*tensor).clone()).collect(),
            outputs: outputs.clone(),
            attrs,
        });
        (id, outputs)
    }

    /// Single-output convenience wrapper around [`GraphBuilder::emit`].
    pub fn emit_single(
        &mut self,
        kind: OpKind,
        inputs: &[&LogicalTensor],
        output: TensorDesc,
        attrs: Attributes,
    ) -> (OpId, LogicalTensor) {
        let (id, mut outputs) = self.emit(kind, inputs, vec![output], attrs);
        let output = outputs.remove(0);
        (id, output)
    }

    pub fn finish(self) -> Result<Graph, GraphError> {
        Graph::new(self.ops)
    }

    fn allocate_tensor(&mut self) -> TensorId {
        let id = TensorId(self.next_tensor);
        self.next_tensor += 1;
        id
    }
}
