//! Startup wallet provisioning
//!
//! Makes sure the mining wallet exists on the node and is unlocked:
//! restore it from the configured mnemonic, or create a fresh miner wallet,
//! then unlock it. Every failure here is fatal to startup.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::WalletConfig;
use crate::error::Result;
use crate::node::{NodeClient, WalletInfo};

/// How the wallet came to be available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioning {
    Existing,
    Restored,
    Created,
}

pub struct WalletBootstrap {
    node: Arc<dyn NodeClient>,
    config: WalletConfig,
}

impl WalletBootstrap {
    pub fn new(node: Arc<dyn NodeClient>, config: WalletConfig) -> Self {
        Self { node, config }
    }

    fn passphrase(&self) -> Option<&str> {
        Some(self.config.mnemonic_passphrase.as_str()).filter(|p| !p.is_empty())
    }

    /// Create or restore the wallet if missing, then unlock it
    pub async fn create_and_unlock(&self) -> Result<(WalletInfo, Provisioning)> {
        let name = self.config.name.as_str();

        let exists = self
            .node
            .list_wallets()
            .await?
            .iter()
            .any(|wallet| wallet.name == name);

        let provisioning = if exists {
            debug!("Wallet {} already present on the node", name);
            Provisioning::Existing
        } else if !self.config.mnemonic.is_empty() {
            info!("Wallet {} not found, restoring it from the configured mnemonic", name);
            self.node
                .restore_wallet(
                    &self.config.password,
                    &self.config.mnemonic,
                    name,
                    true,
                    self.passphrase(),
                )
                .await?;
            Provisioning::Restored
        } else {
            info!("Wallet {} not found, creating a new miner wallet", name);
            let created = self
                .node
                .create_wallet(name, &self.config.password, true, self.passphrase())
                .await?;
            if self.config.print_mnemonic {
                warn!(
                    "[SENSITIVE] The mnemonic of the newly created wallet is [ {} ]. \
                     It will never be printed again, write it down somewhere safe!",
                    created.mnemonic
                );
            }
            Provisioning::Created
        };

        let mut wallet = self.node.wallet_status(name).await?;
        if wallet.locked {
            self.node
                .unlock_wallet(name, &self.config.password, self.passphrase())
                .await?;
            info!("Wallet {} unlocked", name);
            wallet.locked = false;
        }

        Ok((wallet, provisioning))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::node::mock::MockNode;

    fn config(mnemonic: &str) -> WalletConfig {
        WalletConfig {
            name: "miner".to_string(),
            password: "pw".to_string(),
            mnemonic: mnemonic.to_string(),
            ..WalletConfig::default()
        }
    }

    #[tokio::test]
    async fn test_existing_unlocked_wallet_is_left_alone() {
        let node = Arc::new(MockNode::with_wallet("miner", false));
        let bootstrap = WalletBootstrap::new(node.clone(), config(""));

        let (wallet, how) = bootstrap.create_and_unlock().await.unwrap();
        assert_eq!(how, Provisioning::Existing);
        assert!(!wallet.locked);
        assert_eq!(node.count("unlock_wallet"), 0);
        assert_eq!(node.count("create_wallet"), 0);
    }

    #[tokio::test]
    async fn test_locked_wallet_gets_unlocked() {
        let node = Arc::new(MockNode::with_wallet("miner", true));
        let bootstrap = WalletBootstrap::new(node.clone(), config(""));

        let (wallet, _) = bootstrap.create_and_unlock().await.unwrap();
        assert!(!wallet.locked);
        assert_eq!(node.count("unlock_wallet"), 1);
    }

    #[tokio::test]
    async fn test_missing_wallet_is_created() {
        let node = Arc::new(MockNode::new());
        let bootstrap = WalletBootstrap::new(node.clone(), config(""));

        let (wallet, how) = bootstrap.create_and_unlock().await.unwrap();
        assert_eq!(how, Provisioning::Created);
        assert_eq!(wallet.name, "miner");
        assert_eq!(
            node.calls(),
            vec!["list_wallets", "create_wallet", "wallet_status", "unlock_wallet"]
        );
    }

    #[tokio::test]
    async fn test_missing_wallet_is_restored_from_mnemonic() {
        let node = Arc::new(MockNode::new());
        let bootstrap = WalletBootstrap::new(node.clone(), config("vault alarm sad"));

        let (_, how) = bootstrap.create_and_unlock().await.unwrap();
        assert_eq!(how, Provisioning::Restored);
        assert_eq!(node.count("create_wallet"), 0);
        assert_eq!(node.state.lock().unwrap().mnemonic, "vault alarm sad");
    }

    #[tokio::test]
    async fn test_node_failure_is_fatal() {
        let node = Arc::new(MockNode::new());
        node.fail("list_wallets");
        let bootstrap = WalletBootstrap::new(node.clone(), config(""));

        let err = bootstrap.create_and_unlock().await.unwrap_err();
        assert!(matches!(err, Error::RemoteUnavailable(_)));
        assert_eq!(node.count("create_wallet"), 0);
    }
}
