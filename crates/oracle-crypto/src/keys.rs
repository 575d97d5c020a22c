//! Key management for cluster nodes
//!
//! A node is identified by its Ed25519 public key. Peers sign the hash of a
//! candidate transaction; the signer id travels with the signature so
//! receivers can deduplicate by signer and verify against membership.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use oracle_core::{NodeId, TxHash};

use crate::error::{CryptoError, Result};

/// Ed25519 signature length
pub const SIGNATURE_SIZE: usize = 64;

/// Signature over a transaction hash, tagged with its signer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSignature {
    /// Signer public key
    pub signer: NodeId,

    /// Ed25519 signature bytes (64)
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

impl NodeSignature {
    pub fn new(signer: NodeId, signature: [u8; SIGNATURE_SIZE]) -> Self {
        Self {
            signer,
            signature: signature.to_vec(),
        }
    }

    /// Check the signature against `hash`
    pub fn verify(&self, hash: &TxHash) -> Result<()> {
        verify_signature(&self.signer, hash, &self.signature)
    }
}

/// Verify an Ed25519 signature made by `signer` over `hash`
pub fn verify_signature(signer: &NodeId, hash: &TxHash, signature: &[u8]) -> Result<()> {
    let key = VerifyingKey::from_bytes(signer.as_bytes())
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    let signature =
        Signature::from_slice(signature).map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    key.verify(hash.as_bytes(), &signature)
        .map_err(|_| CryptoError::VerificationFailed)
}

/// Node signing keypair
pub struct NodeKeyPair {
    signing_key: SigningKey,
    node_id: NodeId,
}

impl NodeKeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Restore from a 32-byte secret seed
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(secret))
    }

    /// Restore from a hex-encoded 32-byte secret seed
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(secret_hex.trim())
                .map_err(|e| CryptoError::InvalidSecretKey(e.to_string()))?,
        );
        let seed: &[u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidSecretKey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self::from_secret_bytes(seed))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let node_id = NodeId::new(signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            node_id,
        }
    }

    /// Public identity of this node
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Secret seed as hex (for key files)
    pub fn secret_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.signing_key.to_bytes()))
    }

    /// Sign a transaction hash
    pub fn sign(&self, hash: &TxHash) -> NodeSignature {
        let signature = self.signing_key.sign(hash.as_bytes());
        NodeSignature::new(self.node_id, signature.to_bytes())
    }
}

impl std::fmt::Debug for NodeKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeKeyPair")
            .field("node_id", &self.node_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::transaction_hash;

    #[test]
    fn test_keypair_generation() {
        let keypair = NodeKeyPair::generate();
        assert_ne!(keypair.node_id().as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = NodeKeyPair::generate();
        let hash = transaction_hash("testnet", b"payload");

        let signature = keypair.sign(&hash);
        assert_eq!(signature.signer, keypair.node_id());
        assert_eq!(signature.signature.len(), SIGNATURE_SIZE);
        assert!(signature.verify(&hash).is_ok());
    }

    #[test]
    fn test_verify_rejects_other_hash() {
        let keypair = NodeKeyPair::generate();
        let signature = keypair.sign(&transaction_hash("testnet", b"a"));
        assert_eq!(
            signature.verify(&transaction_hash("testnet", b"b")),
            Err(CryptoError::VerificationFailed)
        );
    }

    #[test]
    fn test_verify_rejects_wrong_signer() {
        let a = NodeKeyPair::generate();
        let b = NodeKeyPair::generate();
        let hash = transaction_hash("testnet", b"payload");
        let mut signature = a.sign(&hash);
        signature.signer = b.node_id();
        assert!(signature.verify(&hash).is_err());
    }

    #[test]
    fn test_secret_hex_roundtrip() {
        let keypair = NodeKeyPair::generate();
        let restored = NodeKeyPair::from_secret_hex(&keypair.secret_hex()).unwrap();
        assert_eq!(keypair.node_id(), restored.node_id());
    }

    #[test]
    fn test_malformed_secret() {
        assert!(matches!(
            NodeKeyPair::from_secret_hex("abcd"),
            Err(CryptoError::InvalidSecretKey(_))
        ));
        assert!(NodeKeyPair::from_secret_hex("zz").is_err());
    }
}
