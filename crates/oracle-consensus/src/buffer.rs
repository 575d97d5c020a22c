//! Signatures received before their transaction exists locally
//!
//! Peers build the same transaction at slightly different moments, so a
//! signature can arrive before the local runner produced the matching
//! pending transaction. Such signatures wait here, keyed by hash, until the
//! runner picks them up or they expire.

use hashbrown::HashMap;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use oracle_core::TxHash;
use oracle_crypto::NodeSignature;

/// How long an early signature is kept
pub const SIGNATURE_TTL: Duration = Duration::from_secs(60);

struct BufferedSignatures {
    received_at: Instant,
    signatures: Vec<NodeSignature>,
}

/// Early signature store shared by every runner of a node
pub struct PendingSignatureBuffer {
    entries: Mutex<HashMap<TxHash, BufferedSignatures>>,
    ttl: Duration,
}

impl Default for PendingSignatureBuffer {
    fn default() -> Self {
        Self::new(SIGNATURE_TTL)
    }
}

impl PendingSignatureBuffer {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Buffer `signature` for `hash`; `false` if that signer is already buffered
    pub fn insert(&self, hash: TxHash, signature: NodeSignature) -> bool {
        let mut entries = self.entries.lock();
        let entry = entries.entry(hash).or_insert_with(|| BufferedSignatures {
            received_at: Instant::now(),
            signatures: Vec::new(),
        });
        if entry.signatures.iter().any(|s| s.signer == signature.signer) {
            return false;
        }
        entry.signatures.push(signature);
        true
    }

    /// Remove and return the live signatures buffered for `hash`
    pub fn take(&self, hash: &TxHash) -> Vec<NodeSignature> {
        match self.entries.lock().remove(hash) {
            Some(entry) if entry.received_at.elapsed() <= self.ttl => entry.signatures,
            _ => Vec::new(),
        }
    }

    /// Drop expired entries, returning how many were removed
    pub fn cleanup(&self) -> usize {
        let ttl = self.ttl;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.received_at.elapsed() <= ttl);
        let removed = before - entries.len();
        if removed > 0 {
            tracing::trace!("Expired {} buffered signature sets", removed);
        }
        removed
    }

    /// Number of buffered hashes
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Total buffered signatures across all hashes
    pub fn signature_count(&self) -> usize {
        self.entries
            .lock()
            .values()
            .map(|e| e.signatures.len())
            .sum()
    }
}
