//! Cluster membership and majority arithmetic
//!
//! The cluster is a fixed set of peers. A transaction is collectively
//! authorized once a strict majority of them signed it.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::types::NodeId;

/// Quorum size for a cluster of `total` members: ⌊n/2⌋ + 1
pub fn majority(total: usize) -> usize {
    total / 2 + 1
}

/// Whether `signatures` reach the quorum of a cluster of `total` members
pub fn has_majority(signatures: usize, total: usize) -> bool {
    signatures >= majority(total)
}

/// Ordered, deduplicated snapshot of cluster members
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMembership {
    members: Vec<NodeId>,
}

impl ClusterMembership {
    /// Create membership from any list of node ids (sorted and deduplicated)
    pub fn new(members: impl IntoIterator<Item = NodeId>) -> Result<Self> {
        let mut members: Vec<NodeId> = members.into_iter().collect();
        members.sort();
        members.dedup();
        if members.is_empty() {
            return Err(CoreError::EmptyCluster);
        }
        Ok(Self { members })
    }

    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn quorum(&self) -> usize {
        majority(self.members.len())
    }

    pub fn is_member(&self, node: &NodeId) -> bool {
        self.members.binary_search(node).is_ok()
    }

    /// Members other than `local`
    pub fn peers<'a>(&'a self, local: &'a NodeId) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.members.iter().filter(move |m| *m != local)
    }
}
