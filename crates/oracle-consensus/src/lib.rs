//! # Oracle Consensus
//!
//! Collective transaction authorship for the oracle cluster.
//!
//! Every node runs the same deterministic pipeline for each managed
//! contract. Given identical chain state and trade data, all honest nodes
//! build byte-identical transactions, so signatures over the transaction
//! hash can be gathered from peers and combined without any leader.
//!
//! ## Pipeline
//!
//! ```text
//!  tick(ts) ──► ContractStrategy::build_candidate ──► UnsignedTransaction
//!                                                        │ hash
//!                                                        ▼
//!   peers ◄── Signature ── self-sign ──► PendingTransaction ◄── early signatures
//!                                                        │ majority reached
//!                                                        ▼
//!                                   SubmissionPolicy ──► ChainRpc
//! ```
//!
//! ## Modules
//!
//! - `runner` - per-contract state machine
//! - `manager` - runner registry and inbound message routing
//! - `strategy` - contract-specific transaction building
//! - `pending` / `buffer` - signature collection
//! - `submission` - retry policy around the chain endpoint
//! - `ledger` - in-memory chain used by tests and local clusters

pub mod buffer;
pub mod config;
pub mod context;
pub mod error;
pub mod ledger;
pub mod manager;
pub mod pending;
pub mod rpc;
pub mod runner;
pub mod stats;
pub mod strategy;
pub mod submission;
pub mod transaction;

#[cfg(test)]
mod test_support;

pub use buffer::*;
pub use config::*;
pub use context::*;
pub use error::*;
pub use ledger::*;
pub use manager::*;
pub use pending::*;
pub use rpc::*;
pub use runner::*;
pub use stats::*;
pub use strategy::{for_contract, Candidate, ContractStrategy, SYSTEM_TIMEFRAME_MS};
pub use submission::*;
pub use transaction::*;
