//! # Oracle Trades
//!
//! Per-minute trade volumes reported by every cluster member, and the
//! majority-validated view prices are computed from.
//!
//! ## Layout
//!
//! ```text
//!  Trades
//!   ├── node A: NodeTradesCache
//!   │     └── (source, base asset) ──► minute ──► [asset index] ──► [samples]
//!   ├── node B: NodeTradesCache
//!   └── ...
//! ```
//!
//! Samples are addressed by the asset's position in an append-only
//! `AssetsMap`, which keeps gossip payloads compact. Consensus reads start
//! from the local node's samples; peers can only confirm them.

pub mod assets;
pub mod cache;
pub mod consensus;
pub mod error;
pub mod refresher;
pub mod sample;
pub mod source;

pub use assets::*;
pub use cache::*;
pub use consensus::*;
pub use error::*;
pub use refresher::*;
pub use sample::*;
pub use source::*;
