use std::collections::BTreeSet;
use std::sync::Mutex;

use qdisp::backend::{BackendError, BackendResult, ReferenceBackend};
use qdisp::graph::{OpKind, Operation};

/// Test-only backend wrapper that records every kernel request and can decline chosen kinds.
pub struct RecordingBackend<B> {
    inner: B,
    declined: BTreeSet<OpKind>,
    unimplemented: BTreeSet<OpKind>,
    requests: Mutex<Vec<Operation>>,
}

impl<B: ReferenceBackend> RecordingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            declined: BTreeSet::new(),
            unimplemented: BTreeSet::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Makes `create_kernel` report `kind` as an unsupported configuration.
    pub fn decline(mut self, kind: OpKind) -> Self {
        self.declined.insert(kind);
        self
    }

    /// Makes `create_kernel` report `kind` as unimplemented.
    pub fn unimplemented(mut self, kind: OpKind) -> Self {
        self.unimplemented.insert(kind);
        self
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn recorded_ops(&self) -> Vec<Operation> {
        self.requests
            .lock()
            .expect("backend mutex poisoned")
            .clone()
    }

    pub fn recorded_kinds(&self) -> Vec<OpKind> {
        self.recorded_ops().iter().map(|op| op.kind).collect()
    }
}

impl<B: ReferenceBackend> ReferenceBackend for RecordingBackend<B> {
    type Kernel = B::Kernel;

    fn backend_name(&self) -> &str {
        "recording"
    }

    fn create_kernel(&self, op: &Operation) -> BackendResult<Self::Kernel> {
        self.requests
            .lock()
            .expect("backend mutex poisoned")
            .push(op.clone());
        if self.declined.contains(&op.kind) {
            return Err(BackendError::unsupported(op.kind, "declined by recording backend"));
        }
        if self.unimplemented.contains(&op.kind) {
            return Err(BackendError::unimplemented(
                op.kind,
                "unimplemented in recording backend",
            ));
        }
        self.inner.create_kernel(op)
    }
}
