//! Pending transaction awaiting a quorum of signatures

use oracle_core::{majority, NodeId, TxHash};
use oracle_crypto::NodeSignature;

use crate::error::Result;
use crate::transaction::{SignedTransaction, TransactionKind, UnsignedTransaction};

/// Partially signed candidate transaction
///
/// At most one signature per signer is kept, in arrival order.
#[derive(Clone, Debug)]
pub struct PendingTransaction {
    hash: TxHash,
    kind: TransactionKind,
    timestamp: u64,
    tx: UnsignedTransaction,
    signatures: Vec<NodeSignature>,
}

impl PendingTransaction {
    /// Wrap `tx` built for the tick at `timestamp`
    pub fn new(tx: UnsignedTransaction, timestamp: u64, network_passphrase: &str) -> Result<Self> {
        let hash = tx.hash(network_passphrase)?;
        Ok(Self {
            hash,
            kind: tx.kind(),
            timestamp,
            tx,
            signatures: Vec::new(),
        })
    }

    pub fn hash(&self) -> TxHash {
        self.hash
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn tx(&self) -> &UnsignedTransaction {
        &self.tx
    }

    pub fn signatures(&self) -> &[NodeSignature] {
        &self.signatures
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    pub fn has_signer(&self, signer: &NodeId) -> bool {
        self.signatures.iter().any(|s| s.signer == *signer)
    }

    /// Signature made by `signer`, if present
    pub fn signature_of(&self, signer: &NodeId) -> Option<&NodeSignature> {
        self.signatures.iter().find(|s| s.signer == *signer)
    }

    /// Append a signature; `false` if its signer already signed
    pub fn add_signature(&mut self, signature: NodeSignature) -> bool {
        if self.has_signer(&signature.signer) {
            return false;
        }
        self.signatures.push(signature);
        true
    }

    pub fn is_ready_to_submit(&self, total_members: usize) -> bool {
        self.signatures.len() >= majority(total_members)
    }

    /// First quorum signatures in arrival order
    pub fn majority_signatures(&self, total_members: usize) -> &[NodeSignature] {
        let quorum = majority(total_members).min(self.signatures.len());
        &self.signatures[..quorum]
    }

    /// Attach the quorum signatures for submission
    pub fn into_signed(self, total_members: usize) -> SignedTransaction {
        let signatures = self.majority_signatures(total_members).to_vec();
        SignedTransaction {
            hash: self.hash,
            tx: self.tx,
            signatures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{keypairs, price_update_tx};
    use proptest::prelude::*;

    #[test]
    fn test_duplicate_signer_counted_once() {
        let keys = keypairs(3);
        let mut pending = PendingTransaction::new(price_update_tx(60_000), 60_000, "testnet").unwrap();
        let hash = pending.hash();

        assert!(pending.add_signature(keys[0].sign(&hash)));
        assert!(!pending.add_signature(keys[0].sign(&hash)));
        assert_eq!(pending.signature_count(), 1);
        assert!(!pending.is_ready_to_submit(3));

        assert!(pending.add_signature(keys[1].sign(&hash)));
        assert!(pending.is_ready_to_submit(3));
    }

    #[test]
    fn test_majority_signatures_arrival_order() {
        let keys = keypairs(7);
        let mut pending = PendingTransaction::new(price_update_tx(60_000), 60_000, "testnet").unwrap();
        let hash = pending.hash();
        for key in keys.iter().rev() {
            pending.add_signature(key.sign(&hash));
        }

        let chosen = pending.majority_signatures(7);
        assert_eq!(chosen.len(), 4);
        assert_eq!(chosen[0].signer, keys[6].node_id());
        assert_eq!(chosen[3].signer, keys[3].node_id());

        let signed = pending.into_signed(7);
        assert_eq!(signed.signatures.len(), 4);
        assert_eq!(signed.hash, hash);
    }

    #[test]
    fn test_metadata() {
        let pending = PendingTransaction::new(price_update_tx(120_000), 120_000, "testnet").unwrap();
        assert_eq!(pending.kind(), TransactionKind::PriceUpdate);
        assert_eq!(pending.timestamp(), 120_000);
        assert_eq!(pending.hash(), pending.tx().hash("testnet").unwrap());
        assert!(pending.majority_signatures(3).is_empty());
    }

    proptest! {
        #[test]
        fn prop_signers_counted_once(order in proptest::collection::vec(0usize..7, 0..30)) {
            let keys = keypairs(7);
            let mut pending = PendingTransaction::new(price_update_tx(60_000), 60_000, "testnet").unwrap();
            let hash = pending.hash();

            let mut first_seen: Vec<usize> = Vec::new();
            for &i in &order {
                let added = pending.add_signature(keys[i].sign(&hash));
                prop_assert_eq!(added, !first_seen.contains(&i));
                if added {
                    first_seen.push(i);
                }
            }

            prop_assert_eq!(pending.signature_count(), first_seen.len());
            prop_assert_eq!(pending.is_ready_to_submit(7), first_seen.len() >= 4);

            let chosen = pending.majority_signatures(7);
            prop_assert_eq!(chosen.len(), first_seen.len().min(4));
            for (signature, &i) in chosen.iter().zip(&first_seen) {
                prop_assert_eq!(signature.signer, keys[i].node_id());
            }
        }
    }
}
