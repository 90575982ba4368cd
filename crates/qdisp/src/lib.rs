//! Quantization-aware input displacement for compiled graph partitions.
//!
//! The crate is split into the read-only [`graph`] model, the [`backend`] contract a reference
//! execution backend implements, and the [`displace`] engine that ties them together.

pub mod backend;
pub mod config;
pub mod displace;
pub mod env;
pub mod graph;

pub use backend::{ArgRole, Memory, MemoryDesc, ReferenceBackend, ReferenceKernel};
pub use config::DisplacerConfig;
pub use displace::{
    BoundaryMap, BoundaryRecord, BoundaryScanner, DisplaceError, Displacement,
    PartitionDataDisplacer,
};
pub use graph::{
    DataType, Graph, GraphBuilder, LogicalTensor, OpId, OpKind, Operation, Partition, TensorId,
};
