//! # Oracle Core
//!
//! Core data structures shared by every crate of the oracle cluster node.
//!
//! This crate provides the fundamental building blocks:
//! - `NodeId`, `ContractId`, `TxHash` - identifiers exchanged between peers
//! - `ClusterMembership` - the fixed peer set and its quorum
//! - `price` - deterministic fixed-point price math (VWAP, median, cross price)
//! - `time` - minute-aligned timestamp helpers
//!
//! ## Agreement without a leader
//!
//! Every node runs the same computations over the same inputs. Anything that
//! ends up inside a transaction must therefore be computed with integer
//! arithmetic only, otherwise two nodes could hash different payloads and
//! never collect a quorum of signatures.
//!
//! ```text
//!   market data ──► trades cache ──► price math ──► candidate transaction
//!                        ▲                                  │
//!                        │ peer samples                     ▼
//!                   cluster gossip ◄──────────── signatures (quorum = n/2 + 1)
//! ```

pub mod error;
pub mod membership;
pub mod price;
pub mod time;
pub mod types;

pub use error::*;
pub use membership::*;
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{CoreError, Result};
    pub use crate::membership::{has_majority, majority, ClusterMembership};
    pub use crate::price::{cross_price, median, vwap, Price};
    pub use crate::time::{align_to, is_minute_aligned, now_ms, MINUTE_MS};
    pub use crate::types::*;
}
