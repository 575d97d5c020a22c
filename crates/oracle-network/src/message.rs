//! # Cluster Messages
//!
//! Closed set of messages exchanged between cluster peers. Adding a variant
//! forces every `MessageHandler` to handle it.

use serde::{Deserialize, Serialize};

use oracle_core::{Asset, AssetKey, ContractId, NodeId, TxHash};
use oracle_crypto::NodeSignature;

use crate::error::Result;

/// Connection state announced by a peer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerState {
    /// Peer (re)connected and can receive signatures
    Ready,
}

/// Trade volumes of one asset from one source, as sent on the wire
///
/// Amounts are decimal integer strings so that any precision survives the
/// trip; receivers normalize them before use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawVolumeSample {
    pub source: String,
    pub volume: String,
    pub quote_volume: String,
}

impl RawVolumeSample {
    pub fn new(
        source: impl Into<String>,
        volume: impl Into<String>,
        quote_volume: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            volume: volume.into(),
            quote_volume: quote_volume.into(),
        }
    }
}

/// One node's trades for a key at one minute
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradesPayload {
    /// Source and base asset the samples belong to
    pub key: AssetKey,

    /// Sender's assets map, in index order
    pub assets: Vec<Asset>,

    /// Minute-aligned timestamp (ms)
    pub timestamp: u64,

    /// Samples per asset index
    pub trades: Vec<Vec<RawVolumeSample>>,
}

/// Message exchanged between cluster peers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterMessage {
    /// Signature over a pending transaction hash
    Signature {
        contract_id: ContractId,
        hash: TxHash,
        signature: NodeSignature,
    },

    /// Peer connection state
    State { state: PeerState },

    /// Self-reported trade volumes
    Trades(TradesPayload),
}

impl ClusterMessage {
    /// Short variant name for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ClusterMessage::Signature { .. } => "signature",
            ClusterMessage::State { .. } => "state",
            ClusterMessage::Trades(_) => "trades",
        }
    }
}

/// Message tagged with the peer that sent it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender, as authenticated by the transport
    pub from: NodeId,

    pub message: ClusterMessage,
}

impl Envelope {
    pub fn new(from: NodeId, message: ClusterMessage) -> Self {
        Self { from, message }
    }

    /// Encode for the wire
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from the wire
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oracle_crypto::{transaction_hash, NodeKeyPair};

    #[test]
    fn test_signature_envelope_wire_format() {
        let keypair = NodeKeyPair::generate();
        let hash = transaction_hash("testnet", b"tx");
        let envelope = Envelope::new(
            keypair.node_id(),
            ClusterMessage::Signature {
                contract_id: ContractId::new("CORACLE"),
                hash,
                signature: keypair.sign(&hash),
            },
        );

        let decoded = Envelope::from_bytes(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.message.kind(), "signature");
    }

    #[test]
    fn test_garbage_is_codec_error() {
        let err = Envelope::from_bytes(&[0xff, 0x01]).unwrap_err();
        assert!(matches!(err, crate::NetworkError::Codec(_)));
    }
}
