//! # Oracle Cryptography
//!
//! Cryptographic primitives for the oracle cluster:
//! - BLAKE3 hashing of unsigned transaction payloads
//! - Ed25519 node keys signing transaction hashes
//! - Signature verification against cluster membership
//!
//! | Function | Algorithm | Output |
//! |----------|-----------|--------|
//! | Transaction hash | BLAKE3 (domain separated by network passphrase) | 32 bytes |
//! | Signatures | Ed25519 | 64 bytes |

pub mod error;
pub mod hash;
pub mod keys;

pub use error::*;
pub use hash::*;
pub use keys::*;

/// Cryptographic prelude
pub mod prelude {
    pub use crate::error::{CryptoError, Result};
    pub use crate::hash::{hash_blake3, hash_concat, transaction_hash};
    pub use crate::keys::{verify_signature, NodeKeyPair, NodeSignature};
}
