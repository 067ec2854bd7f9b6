//! Mining wallet lifecycle on the node

pub mod bootstrap;

pub use bootstrap::{Provisioning, WalletBootstrap};
