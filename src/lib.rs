//! Mining Companion Library
//!
//! Unattended agent for a mining wallet held on a remote full node: keeps
//! the node's miner addresses in line with the wallet, waits for sync,
//! periodically moves mined funds out and publishes balances as metrics.

pub mod amount;
pub mod balance;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod mining;
pub mod node;
pub mod server;
pub mod transfer;
pub mod wallet;

// Re-export commonly used types
pub use amount::Amount;
pub use config::Config;
pub use error::{Error, Result};
