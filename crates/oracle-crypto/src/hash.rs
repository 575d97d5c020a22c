//! BLAKE3 hashing utilities
//!
//! Transaction hashes are domain separated by the network passphrase so a
//! payload signed for one network can never be replayed on another.

use oracle_core::TxHash;

/// Hash data using BLAKE3 (256-bit output)
pub fn hash_blake3(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Hash multiple items together
pub fn hash_concat(items: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for item in items {
        hasher.update(item);
    }
    *hasher.finalize().as_bytes()
}

/// Deterministic hash of an encoded transaction payload
pub fn transaction_hash(network_passphrase: &str, payload: &[u8]) -> TxHash {
    let network_id = hash_blake3(network_passphrase.as_bytes());
    TxHash::new(hash_concat(&[&network_id, payload]))
}
