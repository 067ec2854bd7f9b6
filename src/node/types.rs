//! Data exchanged with the full node

use serde::{Deserialize, Serialize};

use crate::amount::Amount;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WalletInfo {
    #[serde(rename = "walletName")]
    pub name: String,
    pub locked: bool,
}

/// Result of a wallet creation; the mnemonic is only ever returned once
#[derive(Debug, Clone, Deserialize)]
pub struct WalletCreated {
    #[serde(rename = "walletName")]
    pub name: String,
    pub mnemonic: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletAddresses {
    pub active_address: String,
    pub addresses: Vec<String>,
}

/// Balance of one wallet address
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AddressAmount {
    pub address: String,
    pub balance: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressBalance {
    pub balance: Amount,
    pub locked_balance: Amount,
    #[serde(rename = "utxoNum")]
    pub utxo_count: u64,
}

impl AddressBalance {
    /// Spendable part of the balance
    pub fn available(&self) -> Amount {
        self.balance.subtract(&self.locked_balance)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxResult {
    pub tx_id: String,
    pub from_group: u32,
    pub to_group: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmed {
    pub block_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxStatus {
    pub confirmed: Option<Confirmed>,
}

impl TxStatus {
    pub fn confirmed(block_hash: impl Into<String>) -> Self {
        Self {
            confirmed: Some(Confirmed {
                block_hash: block_hash.into(),
            }),
        }
    }

    pub fn pending() -> Self {
        Self::default()
    }
}

/// Sync state of one inter-clique peer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    #[serde(default)]
    pub clique_id: Option<String>,
    pub is_synced: bool,
}

impl PeerInfo {
    pub fn synced(synced: bool) -> Self {
        Self {
            clique_id: None,
            is_synced: synced,
        }
    }
}
