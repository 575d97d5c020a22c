//! Messenger abstraction over the peer transport

use async_trait::async_trait;

use oracle_core::NodeId;

use crate::error::Result;
use crate::message::ClusterMessage;

/// Peer channel used by runners and the trades refresher
///
/// Delivery is at most once per call. Receivers must tolerate duplicates and
/// reordering.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Identity of the local node
    fn local_id(&self) -> NodeId;

    /// Peers currently reachable
    fn connected_peers(&self) -> usize;

    /// Send to every connected peer, returning how many were reached
    async fn broadcast(&self, message: ClusterMessage) -> Result<usize>;

    /// Send to a single peer
    async fn send_to(&self, peer: &NodeId, message: ClusterMessage) -> Result<()>;
}
