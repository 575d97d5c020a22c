//! # Oracle Node
//!
//! Process-level wiring of an oracle cluster member: TOML configuration,
//! the shared node context, runner lifecycle, the inbound message pump,
//! the trades refresher and Prometheus metrics.

pub mod config;
pub mod error;
pub mod metrics;
pub mod node;
pub mod stats;

pub use config::NodeConfig;
pub use error::{ConfigError, Result};
pub use node::{NodeState, OracleNode};
pub use stats::NodeStatistics;
