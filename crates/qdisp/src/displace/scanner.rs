use std::collections::{btree_map::Entry, BTreeMap};

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::displace::kinds::{is_go_through_op, is_main_op};
use crate::graph::{Graph, LogicalTensor, OpId, OpKind, Operation, Partition, TensorId};

/// Where quantize filling applies and which main-op argument it stands for.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRecord {
    /// Copy of the consuming main op, detached from the graph.
    pub main_op: Operation,
    /// Input offset of `main_op` the chain starts from.
    pub input_offset: usize,
    /// The accepted dequantize's input tensor.
    pub tensor: LogicalTensor,
    /// Ops walked from the main op input up to and including the accepted dequantize.
    pub chain: SmallVec<[OpId; 4]>,
}

/// Immutable mapping from boundary tensor id to its record.
#[derive(Debug, Clone, Default)]
pub struct BoundaryMap {
    records: BTreeMap<TensorId, BoundaryRecord>,
}

impl BoundaryMap {
    pub fn get(&self, tensor: TensorId) -> Option<&BoundaryRecord> {
        self.records.get(&tensor)
    }

    pub fn contains(&self, tensor: TensorId) -> bool {
        self.records.contains_key(&tensor)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in ascending tensor id order.
    pub fn iter(&self) -> impl Iterator<Item = (TensorId, &BoundaryRecord)> + '_ {
        self.records.iter().map(|(id, record)| (*id, record))
    }
}

/// One-time analysis locating dequantize boundaries in front of main ops.
///
/// ```text
/// partition input
/// |
/// [go through op]*
/// |
/// x <- quantize filling lands here (boundary tensor)
/// |
/// dequantize <- first dequantize without a producer inside the partition
/// |
/// [go through op]*
/// |
/// main op (every input is searched)
/// ```
pub struct BoundaryScanner;

impl BoundaryScanner {
    /// Scans `graph` restricted to `partition`.
    ///
    /// Relies on the graph being chronologically sorted: ops are visited in arena order and
    /// the first record found for a tensor id wins.
    pub fn scan(graph: &Graph, partition: &Partition) -> BoundaryMap {
        let mut records = BTreeMap::new();

        for main_op in graph.ops() {
            if !partition.contains(main_op.id) || !is_main_op(main_op.kind) {
                continue;
            }
            for (offset, input) in main_op.inputs.iter().enumerate() {
                let Some((tensor, chain)) = search_boundary(graph, partition, input) else {
                    continue;
                };
                match records.entry(tensor.id) {
                    Entry::Occupied(_) => {
                        trace!(
                            tensor = %tensor.id,
                            op = %main_op.id,
                            offset,
                            "boundary already recorded, keeping first"
                        );
                    }
                    Entry::Vacant(slot) => {
                        debug!(
                            tensor = %tensor.id,
                            dtype = %tensor.data_type,
                            op = %main_op.id,
                            kind = %main_op.kind,
                            offset,
                            hops = chain.len(),
                            "recorded quantize boundary"
                        );
                        slot.insert(BoundaryRecord {
                            main_op: main_op.clone(),
                            input_offset: offset,
                            tensor,
                            chain,
                        });
                    }
                }
            }
        }

        BoundaryMap { records }
    }
}

/// Walks from `start` towards the graph inputs through go-through ops only.
fn search_boundary(
    graph: &Graph,
    partition: &Partition,
    start: &LogicalTensor,
) -> Option<(LogicalTensor, SmallVec<[OpId; 4]>)> {
    let mut chain = SmallVec::new();
    let mut current = start.id;
    loop {
        let parent = graph.producer_of(current)?;
        chain.push(parent.id);

        if parent.kind == OpKind::Dequantize {
            // Accepted when nothing inside the partition feeds it, even if the graph does.
            let dq_input = parent.inputs.first()?;
            let accepted = match graph.producer_of(dq_input.id) {
                None => true,
                Some(prev) => !partition.contains(prev.id),
            };
            if accepted {
                return Some((dq_input.clone(), chain));
            }
        }

        if !is_go_through_op(parent.kind) {
            return None;
        }
        current = parent.inputs.first()?.id;
    }
}
