use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::graph::spec::OpId;

/// Subset of a graph's operations compiled and executed as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    ops: BTreeSet<OpId>,
}

impl Partition {
    pub fn new(ops: impl IntoIterator<Item = OpId>) -> Self {
        Self {
            ops: ops.into_iter().collect(),
        }
    }

    pub fn contains(&self, op: OpId) -> bool {
        self.ops.contains(&op)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Member ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = OpId> + '_ {
        self.ops.iter().copied()
    }
}

impl FromIterator<OpId> for Partition {
    fn from_iter<T: IntoIterator<Item = OpId>>(iter: T) -> Self {
        Self::new(iter)
    }
}
