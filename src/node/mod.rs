//! Full node access
//!
//! Everything the companion knows about the chain comes through
//! [`NodeClient`]. The production implementation is [`HttpNodeClient`];
//! the trait keeps the schedulers testable against a scripted node.
//!
//! Implementations must be safe to share between tasks: the reconciler,
//! the transfer engine and the balance observer all hold the same
//! `Arc<dyn NodeClient>` and call it concurrently.

pub mod client;
#[cfg(test)]
pub(crate) mod mock;
pub mod types;

use async_trait::async_trait;

use crate::amount::Amount;
use crate::error::Result;

pub use client::HttpNodeClient;
pub use types::{
    AddressAmount, AddressBalance, Confirmed, PeerInfo, TxResult, TxStatus, WalletAddresses,
    WalletCreated, WalletInfo,
};

#[async_trait]
pub trait NodeClient: Send + Sync {
    // Wallets
    async fn list_wallets(&self) -> Result<Vec<WalletInfo>>;

    async fn wallet_status(&self, name: &str) -> Result<WalletInfo>;

    async fn create_wallet(
        &self,
        name: &str,
        password: &str,
        is_miner: bool,
        passphrase: Option<&str>,
    ) -> Result<WalletCreated>;

    async fn restore_wallet(
        &self,
        password: &str,
        mnemonic: &str,
        name: &str,
        is_miner: bool,
        passphrase: Option<&str>,
    ) -> Result<WalletInfo>;

    async fn unlock_wallet(&self, name: &str, password: &str, passphrase: Option<&str>) -> Result<()>;

    async fn wallet_addresses(&self, name: &str) -> Result<WalletAddresses>;

    async fn change_active_address(&self, name: &str, address: &str) -> Result<()>;

    async fn wallet_balances(&self, name: &str) -> Result<Vec<AddressAmount>>;

    // Mining

    /// Fails with [`Error::MinerAddressesUnset`](crate::Error::MinerAddressesUnset)
    /// when the node has none configured yet
    async fn miner_addresses(&self) -> Result<Vec<String>>;

    async fn set_miner_addresses(&self, addresses: &[String]) -> Result<()>;

    async fn node_is_mining(&self) -> Result<bool>;

    async fn start_mining(&self) -> Result<()>;

    // Transfers
    async fn address_balance(&self, address: &str) -> Result<AddressBalance>;

    /// Transfer `amount` from the wallet's active address
    async fn transfer(&self, wallet: &str, to: &str, amount: &Amount) -> Result<TxResult>;

    /// Move everything spendable from every wallet address to `to`
    async fn sweep_all(&self, wallet: &str, to: &str) -> Result<Vec<TxResult>>;

    async fn transaction_status(&self, tx_id: &str, from_group: u32, to_group: u32) -> Result<TxStatus>;

    // Peers
    async fn inter_clique_peer_info(&self) -> Result<Vec<PeerInfo>>;
}
