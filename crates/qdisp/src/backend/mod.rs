//! Contract between the displacer and a reference execution backend.
//!
//! A backend turns a single [`Operation`](crate::graph::Operation) description into a kernel,
//! fills its argument buffers with reference data and executes it. The displacer only talks to
//! backends through [`ReferenceBackend`] and [`ReferenceKernel`], so any implementation (the
//! in-tree reference CPU backend, a recording test double, a native engine binding) can serve it.

pub mod memory;
pub mod shape_helpers;
pub mod spec;

pub use memory::{Memory, MemoryDesc, MemoryError, TensorData};
pub use spec::{
    ArgRole, BackendError, BackendResult, Driver, ReferenceBackend, ReferenceKernel,
};
