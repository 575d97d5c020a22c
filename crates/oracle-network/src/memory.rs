//! # In-Memory Transport
//!
//! Loopback hub connecting messengers inside one process. Each joined node
//! gets a messenger and an inbound channel of envelopes. Nodes can be
//! disconnected and reconnected; on reconnect every other connected peer
//! receives `State { Ready }` from the returning node, which is what a real
//! transport reports after a connection is re-established.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use oracle_core::NodeId;

use crate::error::{NetworkError, Result};
use crate::message::{ClusterMessage, Envelope, PeerState};
use crate::messenger::Messenger;

/// Inbound side of a hub connection
pub type Inbox = mpsc::UnboundedReceiver<Envelope>;

struct PeerSlot {
    tx: mpsc::UnboundedSender<Envelope>,
    connected: bool,
}

/// Shared loopback hub
#[derive(Clone, Default)]
pub struct InMemoryHub {
    peers: Arc<RwLock<HashMap<NodeId, PeerSlot>>>,
}

impl InMemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node, replacing any previous registration
    pub fn join(&self, node: NodeId) -> (InMemoryMessenger, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.peers
            .write()
            .insert(node, PeerSlot { tx, connected: true });
        tracing::debug!("Node {} joined in-memory hub", node);

        let messenger = InMemoryMessenger {
            local: node,
            hub: self.clone(),
        };
        (messenger, rx)
    }

    /// Drop a node's connection; messages to and from it fail until reconnect
    pub fn disconnect(&self, node: &NodeId) {
        if let Some(slot) = self.peers.write().get_mut(node) {
            slot.connected = false;
            tracing::debug!("Node {} disconnected", node);
        }
    }

    /// Restore a node's connection and announce it to the other peers
    pub fn reconnect(&self, node: &NodeId) {
        let mut peers = self.peers.write();
        let was_connected = match peers.get_mut(node) {
            Some(slot) => std::mem::replace(&mut slot.connected, true),
            None => return,
        };
        if was_connected {
            return;
        }

        // each side learns that the other is ready again
        for (id, slot) in peers.iter() {
            if id == node || !slot.connected {
                continue;
            }
            let _ = slot.tx.send(Envelope::new(
                *node,
                ClusterMessage::State {
                    state: PeerState::Ready,
                },
            ));
            if let Some(own) = peers.get(node) {
                let _ = own.tx.send(Envelope::new(
                    *id,
                    ClusterMessage::State {
                        state: PeerState::Ready,
                    },
                ));
            }
        }
        tracing::debug!("Node {} reconnected", node);
    }

    pub fn is_connected(&self, node: &NodeId) -> bool {
        self.peers
            .read()
            .get(node)
            .map(|slot| slot.connected)
            .unwrap_or(false)
    }

    /// Number of currently connected nodes
    pub fn connected_count(&self) -> usize {
        self.peers.read().values().filter(|s| s.connected).count()
    }
}

/// Messenger bound to one node of an `InMemoryHub`
#[derive(Clone)]
pub struct InMemoryMessenger {
    local: NodeId,
    hub: InMemoryHub,
}

#[async_trait]
impl Messenger for InMemoryMessenger {
    fn local_id(&self) -> NodeId {
        self.local
    }

    fn connected_peers(&self) -> usize {
        let peers = self.hub.peers.read();
        if !peers.get(&self.local).map(|s| s.connected).unwrap_or(false) {
            return 0;
        }
        peers
            .iter()
            .filter(|(id, slot)| **id != self.local && slot.connected)
            .count()
    }

    async fn broadcast(&self, message: ClusterMessage) -> Result<usize> {
        let peers = self.hub.peers.read();
        if !peers.get(&self.local).map(|s| s.connected).unwrap_or(false) {
            return Ok(0);
        }

        let mut delivered = 0;
        for (id, slot) in peers.iter() {
            if *id == self.local || !slot.connected {
                continue;
            }
            if slot
                .tx
                .send(Envelope::new(self.local, message.clone()))
                .is_ok()
            {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    async fn send_to(&self, peer: &NodeId, message: ClusterMessage) -> Result<()> {
        let peers = self.hub.peers.read();
        let local_connected = peers.get(&self.local).map(|s| s.connected).unwrap_or(false);
        let slot = peers
            .get(peer)
            .ok_or_else(|| NetworkError::UnknownPeer(peer.to_string()))?;
        if !slot.connected || !local_connected {
            return Err(NetworkError::PeerUnavailable(peer.to_string()));
        }
        slot.tx
            .send(Envelope::new(self.local, message))
            .map_err(|_| NetworkError::Closed)
    }
}
