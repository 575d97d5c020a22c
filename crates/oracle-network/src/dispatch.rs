//! Inbound message routing

use async_trait::async_trait;

use oracle_core::{ContractId, NodeId, TxHash};
use oracle_crypto::NodeSignature;

use crate::message::{ClusterMessage, Envelope, PeerState, TradesPayload};

/// Handler table for inbound messages, one method per variant
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_signature(
        &self,
        from: NodeId,
        contract_id: ContractId,
        hash: TxHash,
        signature: NodeSignature,
    );

    async fn on_state(&self, from: NodeId, state: PeerState);

    async fn on_trades(&self, from: NodeId, payload: TradesPayload);
}

/// Route an envelope to the matching handler method
pub async fn dispatch<H>(handler: &H, envelope: Envelope)
where
    H: MessageHandler + ?Sized,
{
    let Envelope { from, message } = envelope;
    tracing::trace!("Dispatching {} from {}", message.kind(), from);

    match message {
        ClusterMessage::Signature {
            contract_id,
            hash,
            signature,
        } => handler.on_signature(from, contract_id, hash, signature).await,
        ClusterMessage::State { state } => handler.on_state(from, state).await,
        ClusterMessage::Trades(payload) => handler.on_trades(from, payload).await,
    }
}
