//! # Oracle Network
//!
//! Peer messaging layer of the oracle cluster.
//!
//! The websocket transport itself lives outside this crate. What is defined
//! here is the contract between the transport and the node:
//! - `ClusterMessage` - closed set of messages exchanged between peers
//! - `Envelope` - a message tagged with its (transport-authenticated) sender
//! - `Messenger` - broadcast / point-to-point send
//! - `MessageHandler` + `dispatch` - exhaustive inbound routing
//! - `InMemoryHub` - loopback transport for tests and single-process clusters
//!
//! ## Message Flow
//!
//! ```text
//!  Runner ──Signature──► Messenger::broadcast ──► peers ──► dispatch ──► Runner
//!  peer reconnects ──State(Ready)──► dispatch ──► Runner re-sends own signature
//!  TradesRefresher ──Trades──► peers ──► dispatch ──► Trades cache
//! ```

pub mod dispatch;
pub mod error;
pub mod memory;
pub mod message;
pub mod messenger;

pub use dispatch::*;
pub use error::*;
pub use memory::*;
pub use message::*;
pub use messenger::*;
