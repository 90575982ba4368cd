use tracing::{debug, warn};

use crate::backend::{Driver, Memory, ReferenceBackend};
use crate::config::DisplacerConfig;
use crate::displace::filling::{quantize_filling_op, synthesize};
use crate::displace::reverse::{replay_upstream, ReplayOutcome, ReplayStep};
use crate::displace::scanner::{BoundaryMap, BoundaryScanner};
use crate::displace::{BackendAttempt, DisplaceError};
use crate::graph::{Graph, Partition, TensorId};

/// What a successful [`PartitionDataDisplacer::displace`] call did to the target buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Displacement {
    /// Not a boundary (or displacement disabled); the caller's filling stands.
    PassThrough,
    /// The backend could not help; the target buffer is untouched.
    Skipped { reason: String },
    /// The target buffer now holds quantization-range data.
    Displaced {
        boundary: TensorId,
        landed: TensorId,
        steps: Vec<ReplayStep>,
    },
}

impl Displacement {
    pub fn is_displaced(&self) -> bool {
        matches!(self, Displacement::Displaced { .. })
    }
}

/// Replaces the filling of partition inputs that sit in front of a dequantize boundary.
///
/// Boundaries are discovered once at construction; every `displace` call afterwards only
/// consults the resulting map.
pub struct PartitionDataDisplacer<'g, B> {
    graph: &'g Graph,
    partition: Partition,
    boundaries: BoundaryMap,
    backend: B,
    config: DisplacerConfig,
}

impl<'g, B: ReferenceBackend> PartitionDataDisplacer<'g, B> {
    pub fn builder(backend: B) -> DisplacerBuilder<'g, B> {
        DisplacerBuilder {
            graph: None,
            partition: Partition::default(),
            backend,
            config: DisplacerConfig::default(),
        }
    }

    pub fn boundaries(&self) -> &BoundaryMap {
        &self.boundaries
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &DisplacerConfig {
        &self.config
    }

    /// Overwrites `target` with quantization-range data when `tensor` is a recorded boundary.
    ///
    /// `target` is only written once the whole chain has been replayed; on
    /// [`Displacement::PassThrough`], [`Displacement::Skipped`] and on error it keeps its
    /// previous contents.
    pub fn displace(
        &self,
        tensor: TensorId,
        target: &mut Memory,
    ) -> Result<Displacement, DisplaceError> {
        if !self.config.enabled {
            return Ok(Displacement::PassThrough);
        }
        let Some(record) = self.boundaries.get(tensor) else {
            return Ok(Displacement::PassThrough);
        };

        let main_op = &record.main_op;
        let role = Driver::of(main_op.kind)
            .input_role(record.input_offset)
            .ok_or(DisplaceError::NoArgRole {
                kind: main_op.kind,
                offset: record.input_offset,
            })?;

        let filling_op = quantize_filling_op(main_op, record.tensor.data_type);
        let memory = match synthesize(&self.backend, &filling_op, role)? {
            BackendAttempt::Ready(memory) => memory,
            BackendAttempt::Declined(err) => {
                debug!(
                    tensor = %tensor,
                    backend = self.backend.backend_name(),
                    reason = %err,
                    "quantize filling declined, keeping original data"
                );
                return Ok(Displacement::Skipped {
                    reason: err.to_string(),
                });
            }
        };

        let replay = match replay_upstream(
            self.graph,
            &self.partition,
            &self.backend,
            &record.tensor,
            memory,
        )? {
            ReplayOutcome::Completed(replay) => replay,
            ReplayOutcome::Skipped { op, reason } => {
                return Ok(Displacement::Skipped {
                    reason: format!("{op}: {reason}"),
                })
            }
        };

        if let Err(err) = target.reorder_from(&replay.memory) {
            warn!(
                tensor = %tensor,
                landed = %replay.tensor.id,
                error = %err,
                "displaced data does not fit the target buffer"
            );
            return Err(err.into());
        }
        debug!(
            tensor = %tensor,
            main_op = %main_op.id,
            role = %role,
            steps = replay.steps.len(),
            "displaced partition input"
        );
        Ok(Displacement::Displaced {
            boundary: record.tensor.id,
            landed: replay.tensor.id,
            steps: replay.steps,
        })
    }
}

/// Builder for [`PartitionDataDisplacer`]; a graph is mandatory.
pub struct DisplacerBuilder<'g, B> {
    graph: Option<&'g Graph>,
    partition: Partition,
    backend: B,
    config: DisplacerConfig,
}

impl<'g, B: ReferenceBackend> DisplacerBuilder<'g, B> {
    pub fn graph(mut self, graph: &'g Graph) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn partition(mut self, partition: Partition) -> Self {
        self.partition = partition;
        self
    }

    pub fn config(mut self, config: DisplacerConfig) -> Self {
        self.config = config;
        self
    }

    /// Scans the partition for boundaries.
    pub fn build(self) -> Result<PartitionDataDisplacer<'g, B>, DisplaceError> {
        let graph = self.graph.ok_or(DisplaceError::MissingGraph)?;
        let boundaries = BoundaryScanner::scan(graph, &self.partition);
        debug!(
            ops = self.partition.len(),
            boundaries = boundaries.len(),
            "partition scanned for quantize boundaries"
        );
        Ok(PartitionDataDisplacer {
            graph,
            partition: self.partition,
            boundaries,
            backend: self.backend,
            config: self.config,
        })
    }
}
